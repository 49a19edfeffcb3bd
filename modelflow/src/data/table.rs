//! Columnar table with numeric and categorical columns.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Errors raised by table operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    /// A column has a different length from the others.
    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        /// The offending column.
        column: String,
        /// The expected row count.
        expected: usize,
        /// The actual row count.
        actual: usize,
    },

    /// Two columns share a name.
    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),

    /// A referenced column does not exist.
    #[error("No column named '{0}'")]
    MissingColumn(String),

    /// A numeric column was expected.
    #[error("Column '{0}' is not numeric")]
    NotNumeric(String),

    /// A value is missing where a complete column is required.
    #[error("Column '{column}' has a missing value at row {row}")]
    MissingValue {
        /// The column.
        column: String,
        /// The row index.
        row: usize,
    },

    /// A record value cannot be stored in the column.
    #[error("Column '{column}' cannot hold value {value}")]
    InvalidValue {
        /// The column.
        column: String,
        /// The rejected value, rendered as JSON.
        value: String,
    },
}

/// The values of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    /// Floating point values; `None` is missing.
    Numeric(Vec<Option<f64>>),
    /// String categories; `None` is missing.
    Categorical(Vec<Option<String>>),
}

impl ColumnData {
    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    /// Returns true if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the column type.
    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Numeric(_) => ColumnType::Numeric,
            Self::Categorical(_) => ColumnType::Categorical,
        }
    }

    /// Returns the number of missing values.
    #[must_use]
    pub fn missing_count(&self) -> usize {
        match self {
            Self::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            Self::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        match self {
            Self::Numeric(v) => Self::Numeric(indices.iter().map(|&i| v[i]).collect()),
            Self::Categorical(v) => Self::Categorical(indices.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// The type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Floating point values.
    Numeric,
    /// String categories.
    Categorical,
}

/// Name and type of a column, used to rebuild rows at inference time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column values.
    pub data: ColumnData,
}

impl Column {
    /// Creates a numeric column.
    #[must_use]
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    /// Creates a categorical column.
    #[must_use]
    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values),
        }
    }

    /// Returns the column schema.
    #[must_use]
    pub fn schema(&self) -> ColumnSchema {
        ColumnSchema {
            name: self.name.clone(),
            column_type: self.data.column_type(),
        }
    }
}

/// A rectangular, column-oriented table.
///
/// Column order is significant and preserved by every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Creates a table, checking that columns are unique and equally long.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let rows = columns.first().map_or(0, |c| c.data.len());
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            if column.data.len() != rows {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected: rows,
                    actual: column.data.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Builds a table from JSON records following a schema.
    ///
    /// Absent keys and JSON nulls become missing values. Numbers are accepted
    /// for categorical columns and rendered as strings.
    pub fn from_records(
        schema: &[ColumnSchema],
        records: &[BTreeMap<String, serde_json::Value>],
    ) -> Result<Self, TableError> {
        let columns = schema
            .iter()
            .map(|col| {
                let data = match col.column_type {
                    ColumnType::Numeric => ColumnData::Numeric(
                        records
                            .iter()
                            .map(|r| numeric_cell(&col.name, r.get(&col.name)))
                            .collect::<Result<_, _>>()?,
                    ),
                    ColumnType::Categorical => ColumnData::Categorical(
                        records
                            .iter()
                            .map(|r| categorical_cell(&col.name, r.get(&col.name)))
                            .collect::<Result<_, _>>()?,
                    ),
                };
                Ok(Column {
                    name: col.name.clone(),
                    data,
                })
            })
            .collect::<Result<Vec<_>, TableError>>()?;
        let mut table = Self::new(columns)?;
        table.rows = records.len();
        Ok(table)
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Returns all columns in order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns the schema of every column.
    #[must_use]
    pub fn schema(&self) -> Vec<ColumnSchema> {
        self.columns.iter().map(Column::schema).collect()
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if the column exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Returns the values of a numeric column.
    pub fn numeric(&self, name: &str) -> Result<&[Option<f64>], TableError> {
        match self.column(name).map(|c| &c.data) {
            Some(ColumnData::Numeric(values)) => Ok(values),
            Some(ColumnData::Categorical(_)) => Err(TableError::NotNumeric(name.to_string())),
            None => Err(TableError::MissingColumn(name.to_string())),
        }
    }

    /// Returns the values of a numeric column, failing on missing values.
    pub fn numeric_complete(&self, name: &str) -> Result<Vec<f64>, TableError> {
        self.numeric(name)?
            .iter()
            .enumerate()
            .map(|(row, v)| {
                v.ok_or_else(|| TableError::MissingValue {
                    column: name.to_string(),
                    row,
                })
            })
            .collect()
    }

    /// Names of numeric columns, excluding `except`.
    #[must_use]
    pub fn numeric_columns(&self, except: &str) -> Vec<String> {
        self.columns_of(ColumnType::Numeric, except)
    }

    /// Names of categorical columns, excluding `except`.
    #[must_use]
    pub fn categorical_columns(&self, except: &str) -> Vec<String> {
        self.columns_of(ColumnType::Categorical, except)
    }

    fn columns_of(&self, column_type: ColumnType, except: &str) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.data.column_type() == column_type && c.name != except)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Returns a new table with the rows at `indices`, in that order.
    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(indices),
                })
                .collect(),
            rows: indices.len(),
        }
    }

    /// Returns a new table keeping rows where `mask` is true.
    #[must_use]
    pub fn filter(&self, mask: &[bool]) -> Self {
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(i, _)| i)
            .collect();
        self.take(&indices)
    }

    /// Replaces a column in place, or appends it if absent.
    pub fn set_column(&mut self, column: Column) -> Result<(), TableError> {
        if !self.columns.is_empty() && column.data.len() != self.rows {
            return Err(TableError::LengthMismatch {
                column: column.name,
                expected: self.rows,
                actual: column.data.len(),
            });
        }
        if self.columns.is_empty() {
            self.rows = column.data.len();
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Removes a column and returns it.
    pub fn remove_column(&mut self, name: &str) -> Result<Column, TableError> {
        let pos = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))?;
        Ok(self.columns.remove(pos))
    }

    /// Returns a copy without the named column, if present.
    #[must_use]
    pub fn without_column(&self, name: &str) -> Self {
        let mut table = self.clone();
        table.columns.retain(|c| c.name != name);
        table
    }

    /// Collects the named numeric columns into a row-major matrix.
    pub fn to_matrix(&self, names: &[String]) -> Result<Matrix, TableError> {
        let columns = names
            .iter()
            .map(|n| self.numeric_complete(n))
            .collect::<Result<Vec<_>, _>>()?;
        let mut data = Vec::with_capacity(self.rows * names.len());
        for row in 0..self.rows {
            data.extend(columns.iter().map(|col| col[row]));
        }
        Ok(Matrix {
            rows: self.rows,
            cols: names.len(),
            data,
        })
    }
}

fn numeric_cell(column: &str, value: Option<&serde_json::Value>) -> Result<Option<f64>, TableError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => Ok(n.as_f64()),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
            .map(Some)
            .ok_or_else(|| TableError::InvalidValue {
                column: column.to_string(),
                value: format!("{s:?}"),
            }),
        Some(other) => Err(TableError::InvalidValue {
            column: column.to_string(),
            value: other.to_string(),
        }),
    }
}

fn categorical_cell(
    column: &str,
    value: Option<&serde_json::Value>,
) -> Result<Option<String>, TableError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_json::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(TableError::InvalidValue {
            column: column.to_string(),
            value: other.to_string(),
        }),
    }
}

/// A dense row-major matrix of features.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Creates a matrix from row-major data.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    #[must_use]
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), rows * cols, "matrix data does not match shape");
        Self { rows, cols, data }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns one row.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Returns a single cell.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::new(vec![
            Column::numeric("sqft", vec![Some(1000.0), None, Some(1500.0)]),
            Column::categorical(
                "city",
                vec![Some("a".to_string()), Some("b".to_string()), None],
            ),
            Column::numeric("price", vec![Some(1.0), Some(2.0), Some(3.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_table_shape() {
        let table = sample();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 3);
        assert_eq!(table.column_names(), vec!["sqft", "city", "price"]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Table::new(vec![
            Column::numeric("a", vec![Some(1.0)]),
            Column::numeric("b", vec![Some(1.0), Some(2.0)]),
        ])
        .unwrap_err();
        assert!(matches!(err, TableError::LengthMismatch { .. }));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Table::new(vec![
            Column::numeric("a", vec![]),
            Column::numeric("a", vec![]),
        ])
        .unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("a".to_string()));
    }

    #[test]
    fn test_take_and_filter() {
        let table = sample();
        let taken = table.take(&[2, 0]);
        assert_eq!(taken.numeric("sqft").unwrap(), &[Some(1500.0), Some(1000.0)]);

        let filtered = table.filter(&[true, false, true]);
        assert_eq!(filtered.num_rows(), 2);
        assert_eq!(filtered.numeric("price").unwrap(), &[Some(1.0), Some(3.0)]);
    }

    #[test]
    fn test_column_partitions_exclude_target() {
        let table = sample();
        assert_eq!(table.numeric_columns("price"), vec!["sqft".to_string()]);
        assert_eq!(table.categorical_columns("price"), vec!["city".to_string()]);
    }

    #[test]
    fn test_to_matrix_requires_complete_values() {
        let table = sample();
        let err = table.to_matrix(&["sqft".to_string()]).unwrap_err();
        assert_eq!(
            err,
            TableError::MissingValue {
                column: "sqft".to_string(),
                row: 1
            }
        );

        let matrix = table.to_matrix(&["price".to_string()]).unwrap();
        assert_eq!(matrix.rows(), 3);
        assert_eq!(matrix.row(2), &[3.0]);
    }

    #[test]
    fn test_from_records() {
        let schema = vec![
            ColumnSchema {
                name: "sqft".to_string(),
                column_type: ColumnType::Numeric,
            },
            ColumnSchema {
                name: "city".to_string(),
                column_type: ColumnType::Categorical,
            },
        ];
        let mut record = BTreeMap::new();
        record.insert("sqft".to_string(), json!("1200"));
        let table = Table::from_records(&schema, &[record]).unwrap();

        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.numeric("sqft").unwrap(), &[Some(1200.0)]);
        assert_eq!(table.column("city").unwrap().data.missing_count(), 1);
    }

    #[test]
    fn test_from_records_rejects_objects() {
        let schema = vec![ColumnSchema {
            name: "sqft".to_string(),
            column_type: ColumnType::Numeric,
        }];
        let mut record = BTreeMap::new();
        record.insert("sqft".to_string(), json!({"nested": 1}));
        assert!(Table::from_records(&schema, &[record]).is_err());
    }

    #[test]
    fn test_from_records_rejects_non_finite_strings() {
        let schema = vec![ColumnSchema {
            name: "sqft".to_string(),
            column_type: ColumnType::Numeric,
        }];
        for text in ["NaN", "inf", "-infinity", "1e999"] {
            let mut record = BTreeMap::new();
            record.insert("sqft".to_string(), json!(text));
            assert!(
                matches!(
                    Table::from_records(&schema, &[record]),
                    Err(TableError::InvalidValue { .. })
                ),
                "{text} accepted"
            );
        }
    }
}
