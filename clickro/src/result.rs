//! Materialized query result.
use std::sync::{Arc, OnceLock};

use crate::{
    Result, Row, Value,
    context::Orientation,
    native::{Block, ColumnType},
    response::QuerySummary,
    row::{FromRow, Index},
};

/// Whole result of a query.
///
/// Blocks are kept columnar as received, the row and column matrices are
/// built once on first access.
#[derive(Debug)]
pub struct QueryResult {
    names: Arc<[String]>,
    types: Vec<Arc<ColumnType>>,
    blocks: Vec<Block>,
    summary: QuerySummary,
    use_none: bool,
    orientation: Orientation,
    rows: OnceLock<Vec<Vec<Value>>>,
    columns: OnceLock<Vec<Vec<Value>>>,
}

impl QueryResult {
    pub(crate) fn new(
        header: Option<Block>,
        blocks: Vec<Block>,
        summary: QuerySummary,
        use_none: bool,
        orientation: Orientation,
    ) -> Self {
        let source = header.as_ref().or(blocks.first());
        let names: Arc<[String]> =
            source.map_or_else(|| Arc::from([]), |b| b.names().map(String::from).collect());
        let types = source
            .map(|b| b.columns().iter().map(|c| c.column_type().clone()).collect())
            .unwrap_or_default();

        Self {
            names,
            types,
            blocks,
            summary,
            use_none,
            orientation,
            rows: OnceLock::new(),
            columns: OnceLock::new(),
        }
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column_types(&self) -> &[Arc<ColumnType>] {
        &self.types
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn row_count(&self) -> usize {
        self.blocks.iter().map(Block::rows).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn query_id(&self) -> &str {
        self.summary.query_id()
    }

    pub fn summary(&self) -> &QuerySummary {
        &self.summary
    }

    /// Row matrix.
    pub fn result_rows(&self) -> &[Vec<Value>] {
        self.rows.get_or_init(|| self.rows().collect())
    }

    /// Column matrix.
    pub fn result_columns(&self) -> &[Vec<Value>] {
        self.columns.get_or_init(|| {
            (0..self.names.len())
                .map(|c| self.column_at(c).collect())
                .collect()
        })
    }

    /// Row or column matrix, per the query [`Orientation`].
    pub fn result_set(&self) -> &[Vec<Value>] {
        match self.orientation {
            Orientation::Rows => self.result_rows(),
            Orientation::Columns => self.result_columns(),
        }
    }

    /// Iterate rows without building the row matrix.
    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        self.blocks.iter().flat_map(move |block| {
            (0..block.rows()).map(move |r| {
                (0..block.columns().len())
                    .map(|c| block.value(r, c, self.use_none).unwrap_or(Value::Null))
                    .collect()
            })
        })
    }

    /// Iterate rows with their column names.
    pub fn named_rows(&self) -> impl Iterator<Item = Row> + '_ {
        self.rows().map(|values| Row::new(self.names.clone(), values))
    }

    /// Iterate values of one column.
    pub fn column<I: Index>(&self, index: I) -> Result<impl Iterator<Item = Value> + '_> {
        let c = index.position(&self.names)?;
        Ok(self.column_at(c))
    }

    fn column_at(&self, c: usize) -> impl Iterator<Item = Value> + '_ {
        self.blocks.iter().flat_map(move |block| {
            (0..block.rows()).map(move |r| block.value(r, c, self.use_none).unwrap_or(Value::Null))
        })
    }

    pub fn first_row(&self) -> Option<Row> {
        self.named_rows().next()
    }

    /// First column of the first row.
    pub fn first_item(&self) -> Option<Value> {
        let block = self.blocks.first()?;
        block.value(0, 0, self.use_none)
    }

    /// Project every row into `R`.
    pub fn decode<R: FromRow>(&self) -> Result<Vec<R>> {
        self.named_rows()
            .map(|row| R::from_row(row).map_err(Into::into))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::native::{Column, TypeRegistry};

    fn block(registry: &TypeRegistry, ids: &[u32], names: &[&str]) -> Block {
        let ids = ids.iter().map(|&v| Value::UInt32(v)).collect::<Vec<_>>();
        let names = names.iter().map(|&v| Value::from(v)).collect::<Vec<_>>();
        let column = |name: &'static str, ty: &str, values: &[Value]| {
            let refs = values.iter().collect::<Vec<_>>();
            Column::from_values(name, registry.resolve(ty).unwrap(), &refs).unwrap()
        };
        Block::from_columns(vec![
            column("id", "UInt32", &ids),
            column("name", "Nullable(String)", &names),
        ])
    }

    fn sample(orientation: Orientation) -> QueryResult {
        let registry = TypeRegistry::default();
        let blocks = vec![block(&registry, &[1, 2], &["a", "b"]), block(&registry, &[3], &["c"])];
        QueryResult::new(None, blocks, QuerySummary::default(), true, orientation)
    }

    #[test]
    fn row_and_column_views() {
        let result = sample(Orientation::Rows);
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.column_names(), ["id", "name"]);
        assert_eq!(result.column_types()[1].to_string(), "Nullable(String)");

        assert_eq!(
            result.result_rows(),
            [
                vec![Value::UInt32(1), Value::from("a")],
                vec![Value::UInt32(2), Value::from("b")],
                vec![Value::UInt32(3), Value::from("c")],
            ]
        );
        assert_eq!(
            result.result_columns(),
            [
                vec![Value::UInt32(1), Value::UInt32(2), Value::UInt32(3)],
                vec![Value::from("a"), Value::from("b"), Value::from("c")],
            ]
        );
        assert_eq!(result.result_set(), result.result_rows());
        assert_eq!(sample(Orientation::Columns).result_set().len(), 2);
    }

    #[test]
    fn lazy_iterators() {
        let result = sample(Orientation::Rows);
        let names = result.column("name").unwrap().collect::<Vec<_>>();
        assert_eq!(names, [Value::from("a"), Value::from("b"), Value::from("c")]);
        assert!(result.column("missing").is_err());

        let row = result.named_rows().nth(2).unwrap();
        assert_eq!(row.get("id"), Some(&Value::UInt32(3)));

        assert_eq!(result.first_item(), Some(Value::UInt32(1)));
        assert_eq!(result.first_row().unwrap().try_get::<_, String>("name").unwrap(), "a");

        let decoded = result.decode::<(u32, String)>().unwrap();
        assert_eq!(decoded[1], (2, "b".to_owned()));
    }

    #[test]
    fn empty_result_keeps_header() {
        let registry = TypeRegistry::default();
        let header = block(&registry, &[], &[]);
        let result = QueryResult::new(Some(header), vec![], QuerySummary::default(), true, Orientation::Rows);
        assert!(result.is_empty());
        assert_eq!(result.column_names(), ["id", "name"]);
        assert!(result.first_row().is_none());
        assert!(result.first_item().is_none());
        assert_eq!(result.result_columns(), [Vec::<Value>::new(), Vec::new()]);
    }
}
