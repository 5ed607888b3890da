//! Result descriptors
//!
//! A [`ResultDescriptor`] says what a query produces: the primary interval
//! (step), the datasources read from raw samples, calculations derived from
//! other labels, and which labels are exported. Descriptors are assembled with
//! a [`ResultDescriptorBuilder`] and validated once, when built; afterwards
//! they are immutable and shared between pipeline stages behind an `Arc`.
//!
//! # Example
//!
//! ```rust
//! use kuba_rollup::aggregation::{functions, ConsolidationFunction};
//! use kuba_rollup::query::ResultDescriptor;
//! use kuba_rollup::time::Duration;
//!
//! let descriptor = ResultDescriptor::builder()
//!     .step(Duration::seconds(300))
//!     .datasource("in", "ifInOctets", ConsolidationFunction::Average)
//!     .datasource("out", "ifOutOctets", ConsolidationFunction::Average)
//!     .calculate("total", functions::sum, &["in", "out"])
//!     .expression("bits", "total * 8")
//!     .export(["in", "out", "bits"])
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(descriptor.source_names(), ["ifInOctets", "ifOutOctets"]);
//! assert_eq!(descriptor.datasources()[0].heartbeat(), Duration::seconds(600));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::aggregation::{CalculationFunction, ConsolidationFunction};
use crate::error::DescriptorError;
use crate::query::parser::Expression;
use crate::time::Duration;

/// Default primary interval
pub const DEFAULT_STEP: Duration = Duration::millis(300_000);

/// Default heartbeat, as a multiple of the step
pub const DEFAULT_HEARTBEAT_MULTIPLIER: i64 = 2;

/// Default X-files factor
pub const DEFAULT_XFF: f64 = 0.5;

// ============================================================================
// Datasources and calculations
// ============================================================================

/// A labelled view of one raw metric
#[derive(Debug, Clone, PartialEq)]
pub struct Datasource {
    label: String,
    source: String,
    heartbeat: Duration,
    xff: f64,
    function: ConsolidationFunction,
}

impl Datasource {
    /// Create a datasource with explicit heartbeat and XFF
    pub fn new(
        label: impl Into<String>,
        source: impl Into<String>,
        heartbeat: Duration,
        xff: f64,
        function: ConsolidationFunction,
    ) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            heartbeat,
            xff,
            function,
        }
    }

    /// Output label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Raw metric name read from samples
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Largest tolerated gap between consecutive samples
    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Fraction of known primary points a bucket must exceed
    pub fn xff(&self) -> f64 {
        self.xff
    }

    /// Consolidation function
    pub fn function(&self) -> ConsolidationFunction {
        self.function
    }
}

/// Calculation input
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Value of another label in the same row
    Label(String),
    /// Numeric literal
    Constant(f64),
}

/// A value derived from other labels of the same row
#[derive(Clone)]
pub struct Calculation {
    label: String,
    function: Arc<dyn CalculationFunction>,
    args: Vec<Operand>,
}

impl Calculation {
    /// Output label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Inputs, in the order the function receives them
    pub fn args(&self) -> &[Operand] {
        &self.args
    }

    /// Evaluate over resolved input values
    pub fn apply(&self, values: &[f64]) -> f64 {
        self.function.apply(values)
    }
}

impl fmt::Debug for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calculation")
            .field("label", &self.label)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Descriptor
// ============================================================================

/// Validated description of a query's output
#[derive(Debug, Clone)]
pub struct ResultDescriptor {
    step: Duration,
    datasources: Vec<Datasource>,
    calculations: Vec<Calculation>,
    exports: Vec<String>,
    source_names: Vec<String>,
}

impl ResultDescriptor {
    /// Start building a descriptor with default step, heartbeat and XFF
    pub fn builder() -> ResultDescriptorBuilder {
        ResultDescriptorBuilder::new()
    }

    /// Primary data interval
    pub fn step(&self) -> Duration {
        self.step
    }

    /// Datasources in definition order
    pub fn datasources(&self) -> &[Datasource] {
        &self.datasources
    }

    /// Datasource by label
    pub fn datasource(&self, label: &str) -> Option<&Datasource> {
        self.datasources.iter().find(|ds| ds.label == label)
    }

    /// Calculations in definition order
    pub fn calculations(&self) -> &[Calculation] {
        &self.calculations
    }

    /// Exported labels in export order
    pub fn exports(&self) -> &[String] {
        &self.exports
    }

    /// Distinct raw metric names read by the datasources, in definition order
    pub fn source_names(&self) -> &[String] {
        &self.source_names
    }

    /// Every label, datasources first
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.datasources
            .iter()
            .map(|ds| ds.label.as_str())
            .chain(self.calculations.iter().map(|c| c.label.as_str()))
    }
}

// ============================================================================
// Builder
// ============================================================================

struct PendingDatasource {
    label: String,
    source: String,
    heartbeat: Option<Duration>,
    xff: Option<f64>,
    function: ConsolidationFunction,
}

struct PendingCalculation {
    label: String,
    function: Result<Arc<dyn CalculationFunction>, String>,
    args: Vec<String>,
}

enum Definition {
    Datasource(PendingDatasource),
    Calculation(PendingCalculation),
}

/// Fluent builder for [`ResultDescriptor`]
///
/// Definitions are checked in the order they were added, so a calculation
/// may only read labels defined before it. Heartbeat and XFF defaults are
/// resolved against the final step when [`build`](Self::build) runs.
pub struct ResultDescriptorBuilder {
    step: Duration,
    heartbeat_multiplier: i64,
    default_xff: f64,
    definitions: Vec<Definition>,
    exports: Vec<String>,
}

impl ResultDescriptorBuilder {
    /// Builder with default step, heartbeat multiplier and XFF
    pub fn new() -> Self {
        Self {
            step: DEFAULT_STEP,
            heartbeat_multiplier: DEFAULT_HEARTBEAT_MULTIPLIER,
            default_xff: DEFAULT_XFF,
            definitions: Vec::new(),
            exports: Vec::new(),
        }
    }

    /// Primary data interval
    pub fn step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Multiple of the step used when a datasource has no heartbeat
    pub fn heartbeat_multiplier(mut self, multiplier: i64) -> Self {
        self.heartbeat_multiplier = multiplier;
        self
    }

    /// XFF used when a datasource has none
    pub fn default_xff(mut self, xff: f64) -> Self {
        self.default_xff = xff;
        self
    }

    /// Datasource with default heartbeat and XFF
    pub fn datasource(
        self,
        label: impl Into<String>,
        source: impl Into<String>,
        function: ConsolidationFunction,
    ) -> Self {
        self.pending_datasource(label.into(), source.into(), None, None, function)
    }

    /// Datasource with explicit heartbeat and default XFF
    pub fn datasource_with_heartbeat(
        self,
        label: impl Into<String>,
        source: impl Into<String>,
        heartbeat: Duration,
        function: ConsolidationFunction,
    ) -> Self {
        self.pending_datasource(label.into(), source.into(), Some(heartbeat), None, function)
    }

    /// Datasource whose unset heartbeat and XFF take the builder defaults
    pub fn datasource_with_options(
        self,
        label: impl Into<String>,
        source: impl Into<String>,
        heartbeat: Option<Duration>,
        xff: Option<f64>,
        function: ConsolidationFunction,
    ) -> Self {
        self.pending_datasource(label.into(), source.into(), heartbeat, xff, function)
    }

    /// Fully specified datasource
    pub fn add_datasource(self, datasource: Datasource) -> Self {
        let Datasource {
            label,
            source,
            heartbeat,
            xff,
            function,
        } = datasource;
        self.pending_datasource(label, source, Some(heartbeat), Some(xff), function)
    }

    fn pending_datasource(
        mut self,
        label: String,
        source: String,
        heartbeat: Option<Duration>,
        xff: Option<f64>,
        function: ConsolidationFunction,
    ) -> Self {
        self.definitions.push(Definition::Datasource(PendingDatasource {
            label,
            source,
            heartbeat,
            xff,
            function,
        }));
        self
    }

    /// N-ary calculation over earlier labels
    ///
    /// Arguments that are not defined labels but parse as numbers are passed
    /// as constants.
    pub fn calculate<F>(self, label: impl Into<String>, function: F, args: &[&str]) -> Self
    where
        F: CalculationFunction + 'static,
    {
        let args = args.iter().map(|arg| arg.to_string()).collect();
        self.pending_calculation(label.into(), Ok(Arc::new(function)), args)
    }

    /// Calculation of one argument
    pub fn calculate_unary<F>(self, label: impl Into<String>, function: F, arg: &str) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        let function = move |args: &[f64]| args.first().map_or(f64::NAN, |v| function(*v));
        self.calculate(label, function, &[arg])
    }

    /// Calculation of two arguments
    pub fn calculate_binary<F>(
        self,
        label: impl Into<String>,
        function: F,
        left: &str,
        right: &str,
    ) -> Self
    where
        F: Fn(f64, f64) -> f64 + Send + Sync + 'static,
    {
        let function = move |args: &[f64]| match args {
            [l, r] => function(*l, *r),
            _ => f64::NAN,
        };
        self.calculate(label, function, &[left, right])
    }

    /// Calculation written as an arithmetic expression over earlier labels
    pub fn expression(self, label: impl Into<String>, expression: &str) -> Self {
        match Expression::parse(expression) {
            Ok(parsed) => {
                let args = parsed.labels().to_vec();
                self.pending_calculation(label.into(), Ok(Arc::new(parsed)), args)
            }
            Err(reason) => self.pending_calculation(label.into(), Err(reason), Vec::new()),
        }
    }

    fn pending_calculation(
        mut self,
        label: String,
        function: Result<Arc<dyn CalculationFunction>, String>,
        args: Vec<String>,
    ) -> Self {
        self.definitions
            .push(Definition::Calculation(PendingCalculation { label, function, args }));
        self
    }

    /// Labels to export, appended to any already exported
    pub fn export<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exports.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Validate and freeze the descriptor
    pub fn build(self) -> Result<ResultDescriptor, DescriptorError> {
        if self.step.is_zero() {
            return Err(DescriptorError::ZeroStep);
        }

        let default_heartbeat = self.step.times(self.heartbeat_multiplier);
        let mut datasources = Vec::new();
        let mut calculations = Vec::new();
        let mut defined: Vec<String> = Vec::new();

        for definition in self.definitions {
            match definition {
                Definition::Datasource(pending) => {
                    check_unique(&defined, &pending.label)?;

                    let heartbeat = pending.heartbeat.unwrap_or(default_heartbeat);
                    if heartbeat < self.step {
                        return Err(DescriptorError::HeartbeatTooShort {
                            label: pending.label,
                            heartbeat: heartbeat.to_string(),
                            step: self.step.to_string(),
                        });
                    }

                    let xff = pending.xff.unwrap_or(self.default_xff);
                    if !(0.0..=1.0).contains(&xff) {
                        return Err(DescriptorError::InvalidXff {
                            label: pending.label,
                            xff,
                        });
                    }

                    defined.push(pending.label.clone());
                    datasources.push(Datasource::new(
                        pending.label,
                        pending.source,
                        heartbeat,
                        xff,
                        pending.function,
                    ));
                }
                Definition::Calculation(pending) => {
                    check_unique(&defined, &pending.label)?;

                    let function = pending.function.map_err(|reason| {
                        DescriptorError::InvalidExpression {
                            label: pending.label.clone(),
                            reason,
                        }
                    })?;
                    if pending.args.is_empty() {
                        return Err(DescriptorError::NoArguments(pending.label));
                    }

                    let args = pending
                        .args
                        .into_iter()
                        .map(|arg| resolve_operand(&defined, arg, &pending.label))
                        .collect::<Result<Vec<_>, _>>()?;

                    defined.push(pending.label.clone());
                    calculations.push(Calculation {
                        label: pending.label,
                        function,
                        args,
                    });
                }
            }
        }

        let mut exports: Vec<String> = Vec::with_capacity(self.exports.len());
        for label in self.exports {
            if !defined.contains(&label) {
                return Err(DescriptorError::UnknownLabel {
                    label,
                    referrer: "export".to_string(),
                });
            }
            if !exports.contains(&label) {
                exports.push(label);
            }
        }

        let mut source_names: Vec<String> = Vec::new();
        for ds in &datasources {
            if !source_names.iter().any(|s| s == ds.source()) {
                source_names.push(ds.source().to_string());
            }
        }

        Ok(ResultDescriptor {
            step: self.step,
            datasources,
            calculations,
            exports,
            source_names,
        })
    }
}

impl Default for ResultDescriptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn check_unique(defined: &[String], label: &str) -> Result<(), DescriptorError> {
    if defined.iter().any(|l| l == label) {
        return Err(DescriptorError::DuplicateLabel(label.to_string()));
    }
    Ok(())
}

fn resolve_operand(
    defined: &[String],
    arg: String,
    referrer: &str,
) -> Result<Operand, DescriptorError> {
    if defined.contains(&arg) {
        return Ok(Operand::Label(arg));
    }
    match arg.trim().parse::<f64>() {
        Ok(constant) => Ok(Operand::Constant(constant)),
        Err(_) => Err(DescriptorError::UnknownLabel {
            label: arg,
            referrer: referrer.to_string(),
        }),
    }
}
