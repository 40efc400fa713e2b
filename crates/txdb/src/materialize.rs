//! Reading a cursor into a buffered result

use std::sync::Arc;

use txdb_core::{Cursor, Result, ResultSet, Row, Rows, TxdbError};

/// Read every row of every result set of `cursor` into memory.
///
/// Values are copied as the cursor reports them. Any error while reading
/// aborts the whole read and nothing buffered so far is returned. When `limit`
/// is set, a query producing more rows than that in total fails with
/// [`TxdbError::ResultTooLarge`].
pub(crate) async fn materialize(
    mut cursor: Box<dyn Cursor + '_>,
    limit: Option<usize>,
) -> Result<Rows> {
    let mut sets = Vec::new();
    let mut total = 0usize;

    loop {
        let columns = cursor.columns().to_vec();
        let names: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();

        let mut rows = Vec::new();
        while let Some(values) = cursor.next_row().await? {
            if values.len() != columns.len() {
                return Err(TxdbError::Query(format!(
                    "row has {} values but the result set has {} columns",
                    values.len(),
                    columns.len()
                )));
            }
            total += 1;
            if let Some(limit) = limit
                && total > limit
            {
                return Err(TxdbError::ResultTooLarge { limit });
            }
            rows.push(Row::new(names.clone(), values));
        }

        tracing::trace!(columns = columns.len(), rows = rows.len(), "result set buffered");
        sets.push(ResultSet::new(columns, rows));

        if !cursor.next_result_set().await? {
            break;
        }
    }

    Ok(Rows::new(sets))
}
