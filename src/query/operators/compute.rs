//! Compute Operator - calculated measurements

use std::sync::Arc;

use crate::query::descriptor::{Operand, ResultDescriptor};
use crate::query::error::{QueryError, QueryResult};
use crate::query::operators::{BoxedOperator, RowOperator};
use crate::types::{Measurement, Row};

/// Appends one measurement per calculation, in definition order
///
/// Later calculations may read the output of earlier ones. An input label
/// missing from the row is a consistency error.
pub struct Compute {
    input: BoxedOperator<Measurement>,
    descriptor: Arc<ResultDescriptor>,
    arguments: Vec<f64>,
}

impl Compute {
    /// Evaluate the descriptor's calculations over `input`
    pub fn new(input: BoxedOperator<Measurement>, descriptor: Arc<ResultDescriptor>) -> Self {
        Self {
            input,
            descriptor,
            arguments: Vec::new(),
        }
    }
}

impl RowOperator<Measurement> for Compute {
    fn next_row(&mut self) -> QueryResult<Option<Row<Measurement>>> {
        let Some(mut row) = self.input.next_row()? else {
            return Ok(None);
        };

        for calculation in self.descriptor.calculations() {
            self.arguments.clear();
            for operand in calculation.args() {
                let value = match operand {
                    Operand::Constant(value) => *value,
                    Operand::Label(label) => row
                        .element(label)
                        .map(Measurement::value)
                        .ok_or_else(|| {
                            QueryError::consistency(format!(
                                "missing measurement '{}' for calculation '{}' at {}",
                                label,
                                calculation.label(),
                                row.timestamp()
                            ))
                        })?,
                };
                self.arguments.push(value);
            }

            let value = calculation.apply(&self.arguments);
            row.add_element(Measurement::new(
                row.timestamp(),
                row.resource().clone(),
                calculation.label(),
                value,
                None,
            ));
        }

        Ok(Some(row))
    }

    fn name(&self) -> &'static str {
        "Compute"
    }
}
