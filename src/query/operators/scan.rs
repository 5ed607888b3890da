//! Scan Operator - entry point of the pipeline
//!
//! Wraps a row stream obtained from a sample source and enforces what every
//! downstream stage relies on: rows belong to the queried resource and arrive
//! in strictly ascending timestamp order.

use tracing::warn;

use crate::query::error::{QueryError, QueryResult};
use crate::query::operators::RowOperator;
use crate::source::RowStream;
use crate::time::Timestamp;
use crate::types::{Element, Resource, Row};

/// Validating adapter from a source stream to a [`RowOperator`]
pub struct RowScan<T> {
    rows: RowStream<T>,
    resource: Resource,
    last: Option<Timestamp>,
}

impl<T: Element> RowScan<T> {
    /// Scan `rows`, which must all belong to `resource`
    pub fn new(resource: Resource, rows: RowStream<T>) -> Self {
        Self {
            rows,
            resource,
            last: None,
        }
    }

    /// Scan rows held in memory
    pub fn from_rows(resource: Resource, rows: Vec<Row<T>>) -> Self
    where
        T: 'static,
    {
        Self::new(resource, Box::new(rows.into_iter().map(Ok)))
    }
}

impl<T: Element> RowOperator<T> for RowScan<T> {
    fn next_row(&mut self) -> QueryResult<Option<Row<T>>> {
        let Some(row) = self.rows.next().transpose()? else {
            return Ok(None);
        };

        if row.resource() != &self.resource {
            warn!(
                expected = %self.resource,
                actual = %row.resource(),
                "Row for unexpected resource"
            );
            return Err(QueryError::consistency(format!(
                "row for resource '{}' in scan of '{}'",
                row.resource(),
                self.resource
            )));
        }

        if let Some(last) = self.last {
            if row.timestamp() <= last {
                warn!(
                    resource = %self.resource,
                    previous = %last,
                    current = %row.timestamp(),
                    "Rows out of order"
                );
                return Err(QueryError::consistency(format!(
                    "row at {} does not follow row at {}",
                    row.timestamp(),
                    last
                )));
            }
        }

        self.last = Some(row.timestamp());
        Ok(Some(row))
    }

    fn name(&self) -> &'static str {
        "RowScan"
    }
}
