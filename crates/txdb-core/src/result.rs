//! Buffered query results
//!
//! A query on a shared transaction never hands out a live cursor. Every result
//! set is read into memory first and the caller gets a [`Rows`] value it owns
//! outright, so holding one open never blocks the transaction it came from.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::{ColumnMeta, Row};

/// One fully read result set
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    columns: Vec<ColumnMeta>,
    rows: Vec<Row>,
}

impl ResultSet {
    /// Create a result set from its columns and rows
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Columns of the result set
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Column names in ordinal order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Shared column name list, as used by [`Row`]
    pub fn column_name_list(&self) -> Arc<[String]> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Buffered rows
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of buffered rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take the rows out of the set
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// The buffered result of a query, positioned on one of its result sets.
///
/// `Rows` iterates over the rows of the current result set. Moving to the
/// next set with [`Rows::next_result_set`] discards whatever is left of the
/// current one. A query that returned no result set at all looks like a single
/// empty set without columns.
#[derive(Debug, Clone)]
pub struct Rows {
    columns: Vec<ColumnMeta>,
    rows: std::vec::IntoIter<Row>,
    remaining: VecDeque<ResultSet>,
}

impl Rows {
    /// Create a buffer over the given result sets, positioned on the first
    pub fn new(sets: Vec<ResultSet>) -> Self {
        let mut remaining: VecDeque<ResultSet> = sets.into();
        let first = remaining.pop_front().unwrap_or_default();
        Self {
            columns: first.columns,
            rows: first.rows.into_iter(),
            remaining,
        }
    }

    /// Columns of the current result set
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Column names of the current result set
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rows not yet read from the current result set
    pub fn remaining_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether another result set follows the current one
    pub fn has_next_result_set(&self) -> bool {
        !self.remaining.is_empty()
    }

    /// Move to the next result set. Returns `false`, leaving the buffer where it
    /// is, when there is none.
    pub fn next_result_set(&mut self) -> bool {
        match self.remaining.pop_front() {
            Some(set) => {
                self.columns = set.columns;
                self.rows = set.rows.into_iter();
                true
            }
            None => false,
        }
    }

    /// Read the rest of the current result set into a vector
    pub fn collect_rows(&mut self) -> Vec<Row> {
        self.by_ref().collect()
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use pretty_assertions::assert_eq;

    fn set(names: &[&str], values: Vec<Vec<Value>>) -> ResultSet {
        let columns: Vec<ColumnMeta> = names
            .iter()
            .enumerate()
            .map(|(idx, name)| ColumnMeta::new(*name, idx))
            .collect();
        let shared: Arc<[String]> = names.iter().map(|n| n.to_string()).collect();
        let rows = values
            .into_iter()
            .map(|v| Row::new(shared.clone(), v))
            .collect();
        ResultSet::new(columns, rows)
    }

    #[test]
    fn test_empty_rows() {
        let mut rows = Rows::new(Vec::new());
        assert!(rows.columns().is_empty());
        assert_eq!(rows.next(), None);
        assert!(!rows.has_next_result_set());
        assert!(!rows.next_result_set());
    }

    #[test]
    fn test_walks_result_sets_in_order() {
        let mut rows = Rows::new(vec![
            set(&["id"], vec![vec![Value::Int64(1)], vec![Value::Int64(2)]]),
            set(&["name"], vec![vec![Value::from("jane")]]),
        ]);

        assert_eq!(rows.column_names(), vec!["id"]);
        assert_eq!(rows.remaining_rows(), 2);
        assert!(rows.has_next_result_set());
        assert_eq!(rows.next().map(Row::into_values), Some(vec![Value::Int64(1)]));

        // the unread row of the first set is discarded
        assert!(rows.next_result_set());
        assert_eq!(rows.column_names(), vec!["name"]);
        assert!(!rows.has_next_result_set());
        let rest = rows.collect_rows();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].get_by_name("name"), Some(&Value::from("jane")));

        assert!(!rows.next_result_set());
        assert_eq!(rows.column_names(), vec!["name"]);
    }

    #[test]
    fn test_result_set_accessors() {
        let rs = set(&["a", "b"], vec![vec![Value::Null, Value::Bool(true)]]);
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.column_names(), vec!["a", "b"]);
        assert_eq!(&*rs.column_name_list(), &["a".to_string(), "b".to_string()]);
        assert_eq!(rs.rows()[0].get(1), Some(&Value::Bool(true)));
    }
}
