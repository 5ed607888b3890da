//! Core data types flowing through the rollup pipeline
//!
//! # Key Types
//!
//! - **`Resource`**: Identity of the thing being measured (a host, an interface, ...)
//! - **`Sample`**: A raw, typed observation of one metric at one instant
//! - **`Measurement`**: A derived floating point value under an output label
//! - **`Row`**: All elements sharing a timestamp for one resource, keyed by name
//! - **`Results`**: The ordered rows produced by a query
//!
//! # Example
//!
//! ```rust
//! use kuba_rollup::time::Timestamp;
//! use kuba_rollup::types::{Resource, Row, Sample};
//! use kuba_rollup::value::ValueType;
//!
//! let resource = Resource::new("router1:eth0");
//! let ts = Timestamp::from_epoch_seconds(900_000_000);
//!
//! let mut row = Row::new(ts, resource.clone());
//! row.add_element(Sample::new(ts, resource.clone(), "ifInOctets", ValueType::Counter(10)));
//! row.add_element(Sample::new(ts, resource, "ifInOctets", ValueType::Counter(12)));
//!
//! // Same-named elements replace each other
//! assert_eq!(row.len(), 1);
//! assert_eq!(row.element("ifInOctets").unwrap().value(), ValueType::Counter(12));
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::time::Timestamp;
use crate::value::{MetricType, ValueType};

/// Free-form key/value metadata carried by samples and measurements
pub type Attributes = HashMap<String, String>;

/// Merge `source` into `target`; later keys overwrite earlier ones
///
/// `target` stays `None` until some attributes are actually contributed.
pub fn merge_attributes(target: &mut Option<Attributes>, source: Option<&Attributes>) {
    if let Some(source) = source {
        let merged = target.get_or_insert_with(Attributes::new);
        for (key, value) in source {
            merged.insert(key.clone(), value.clone());
        }
    }
}

// ============================================================================
// Resource
// ============================================================================

/// Identity of a measured resource
///
/// Cheap to clone; rows and elements of a query all share one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resource(Arc<str>);

impl Resource {
    /// Create a resource identifier
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Identifier string
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Resource {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Resource {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Resource::from)
    }
}

// ============================================================================
// Elements
// ============================================================================

/// Common view over the things a [`Row`] can hold
pub trait Element: Clone + fmt::Debug + Send {
    /// Key of the element within its row
    fn name(&self) -> &str;

    /// Instant the element belongs to
    fn timestamp(&self) -> Timestamp;

    /// Resource the element describes
    fn resource(&self) -> &Resource;

    /// Attached metadata, if any
    fn attributes(&self) -> Option<&Attributes>;
}

/// A raw observation of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    timestamp: Timestamp,
    resource: Resource,
    name: String,
    value: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attributes: Option<Attributes>,
}

impl Sample {
    /// Create a sample without attributes
    pub fn new(
        timestamp: Timestamp,
        resource: Resource,
        name: impl Into<String>,
        value: ValueType,
    ) -> Self {
        Self {
            timestamp,
            resource,
            name: name.into(),
            value,
            attributes: None,
        }
    }

    /// Attach attributes
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Same sample carrying a different value
    pub fn with_value(mut self, value: ValueType) -> Self {
        self.value = value;
        self
    }

    /// Typed value
    pub fn value(&self) -> ValueType {
        self.value
    }

    /// Kind of metric, taken from the value
    pub fn metric_type(&self) -> MetricType {
        self.value.metric_type()
    }
}

impl Element for Sample {
    fn name(&self) -> &str {
        &self.name
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn attributes(&self) -> Option<&Attributes> {
        self.attributes.as_ref()
    }
}

/// A derived value under an output label; NaN means unknown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    timestamp: Timestamp,
    resource: Resource,
    name: String,
    value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attributes: Option<Attributes>,
}

impl Measurement {
    /// Create a measurement
    pub fn new(
        timestamp: Timestamp,
        resource: Resource,
        name: impl Into<String>,
        value: f64,
        attributes: Option<Attributes>,
    ) -> Self {
        Self {
            timestamp,
            resource,
            name: name.into(),
            value,
            attributes,
        }
    }

    /// An unknown (NaN) measurement
    pub fn unknown(timestamp: Timestamp, resource: Resource, name: impl Into<String>) -> Self {
        Self::new(timestamp, resource, name, f64::NAN, None)
    }

    /// Measured value
    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Element for Measurement {
    fn name(&self) -> &str {
        &self.name
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn resource(&self) -> &Resource {
        &self.resource
    }

    fn attributes(&self) -> Option<&Attributes> {
        self.attributes.as_ref()
    }
}

// ============================================================================
// Rows
// ============================================================================

/// Elements sharing one timestamp and resource
///
/// Elements keep insertion order and are unique by name; adding an element
/// whose name is already present replaces it in place. Rows are small (one
/// element per requested metric), so lookups scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row<T> {
    timestamp: Timestamp,
    resource: Resource,
    elements: Vec<T>,
}

impl<T: Element> Row<T> {
    /// Create an empty row
    pub fn new(timestamp: Timestamp, resource: Resource) -> Self {
        Self::with_capacity(timestamp, resource, 0)
    }

    /// Create an empty row with room for `capacity` elements
    pub fn with_capacity(timestamp: Timestamp, resource: Resource, capacity: usize) -> Self {
        Self {
            timestamp,
            resource,
            elements: Vec::with_capacity(capacity),
        }
    }

    /// Row timestamp
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Row resource
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Add an element, replacing any element of the same name
    pub fn add_element(&mut self, element: T) {
        match self.elements.iter_mut().find(|e| e.name() == element.name()) {
            Some(existing) => *existing = element,
            None => self.elements.push(element),
        }
    }

    /// Element by name
    pub fn element(&self, name: &str) -> Option<&T> {
        self.elements.iter().find(|e| e.name() == name)
    }

    /// Elements in insertion order
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Take the elements out of the row
    pub fn into_elements(self) -> Vec<T> {
        self.elements
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when the row holds no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Ordered rows produced by a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Results<T> {
    rows: Vec<Row<T>>,
}

impl<T: Element> Results<T> {
    /// Empty result set
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Append a row
    pub fn push(&mut self, row: Row<T>) {
        self.rows.push(row);
    }

    /// Rows in order
    pub fn rows(&self) -> &[Row<T>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows were produced
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate rows in order
    pub fn iter(&self) -> std::slice::Iter<'_, Row<T>> {
        self.rows.iter()
    }
}

impl<T: Element> Default for Results<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IntoIterator for Results<T> {
    type Item = Row<T>;
    type IntoIter = std::vec::IntoIter<Row<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<T: Element> FromIterator<Row<T>> for Results<T> {
    fn from_iter<I: IntoIterator<Item = Row<T>>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(seconds: i64) -> Timestamp {
        Timestamp::from_epoch_seconds(seconds)
    }

    #[test]
    fn test_row_preserves_insertion_order() {
        let resource = Resource::new("localhost");
        let mut row = Row::new(ts(0), resource.clone());
        for name in ["c", "a", "b"] {
            row.add_element(Measurement::new(ts(0), resource.clone(), name, 1.0, None));
        }
        let names: Vec<&str> = row.elements().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_row_replaces_in_place() {
        let resource = Resource::new("localhost");
        let mut row = Row::new(ts(0), resource.clone());
        row.add_element(Measurement::new(ts(0), resource.clone(), "a", 1.0, None));
        row.add_element(Measurement::new(ts(0), resource.clone(), "b", 2.0, None));
        row.add_element(Measurement::new(ts(0), resource, "a", 3.0, None));

        assert_eq!(row.len(), 2);
        assert_eq!(row.elements()[0].value(), 3.0);
        assert!(row.element("missing").is_none());
    }

    #[test]
    fn test_merge_attributes() {
        let mut merged = None;
        merge_attributes(&mut merged, None);
        assert!(merged.is_none());

        let first: Attributes = [("a".to_string(), "1".to_string())].into_iter().collect();
        let second: Attributes = [
            ("a".to_string(), "2".to_string()),
            ("b".to_string(), "1".to_string()),
        ]
        .into_iter()
        .collect();
        merge_attributes(&mut merged, Some(&first));
        merge_attributes(&mut merged, Some(&second));

        let merged = merged.unwrap();
        assert_eq!(merged.get("a").map(String::as_str), Some("2"));
        assert_eq!(merged.get("b").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_measurement_serializes_nan_as_null() {
        let m = Measurement::unknown(ts(1), Resource::new("r"), "in");
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["name"], "in");
        assert_eq!(json["timestamp"], 1000);
        assert!(json["value"].is_null());
        assert!(json.get("attributes").is_none());
    }
}
