//! Export Operator - projection onto the exported labels

use crate::query::error::QueryResult;
use crate::query::operators::{BoxedOperator, RowOperator};
use crate::types::{Element, Measurement, Row};

/// Narrows each row to exactly `exports`, in that order
///
/// Labels absent upstream are filled with unknown measurements, so every
/// output row has the same shape.
pub struct Export {
    input: BoxedOperator<Measurement>,
    exports: Vec<String>,
}

impl Export {
    /// Project `input` onto `exports`
    pub fn new(input: BoxedOperator<Measurement>, exports: Vec<String>) -> Self {
        Self { input, exports }
    }
}

impl RowOperator<Measurement> for Export {
    fn next_row(&mut self) -> QueryResult<Option<Row<Measurement>>> {
        let Some(row) = self.input.next_row()? else {
            return Ok(None);
        };

        let timestamp = row.timestamp();
        let resource = row.resource().clone();
        let mut elements = row.into_elements();
        let mut output = Row::with_capacity(timestamp, resource.clone(), self.exports.len());

        for label in &self.exports {
            let measurement = match elements.iter().position(|m| m.name() == label) {
                Some(position) => elements.swap_remove(position),
                None => Measurement::unknown(timestamp, resource.clone(), label.as_str()),
            };
            output.add_element(measurement);
        }

        Ok(Some(output))
    }

    fn name(&self) -> &'static str {
        "Export"
    }
}
