//! Tabular data: an in-memory columnar table and a CSV loader.

mod loader;
mod table;

pub use loader::{load_csv, read_csv, CsvOptions};
pub use table::{Column, ColumnData, ColumnSchema, ColumnType, Matrix, Table, TableError};
