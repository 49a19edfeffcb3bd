//! CSV loading with column type inference.

use super::{Column, Table};
use crate::errors::DataSourceError;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Cell spellings treated as missing values.
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null", "none"];

/// CSV-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvOptions {
    /// Field delimiter.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Columns that are always read as categorical.
    #[serde(default)]
    pub categorical: Vec<String>,
}

fn default_delimiter() -> char {
    ','
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            categorical: Vec::new(),
        }
    }
}

/// Loads a CSV file with a header row into a table.
///
/// A column is numeric when every non-missing cell parses as a float;
/// otherwise it is categorical.
pub fn load_csv(path: &Path, options: &CsvOptions) -> Result<Table, DataSourceError> {
    let file = std::fs::File::open(path).map_err(|source| DataSourceError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    read_csv(file, path, options)
}

/// Reads CSV data from any reader; `path` is used for error messages only.
pub fn read_csv<R: std::io::Read>(
    reader: R,
    path: &Path,
    options: &CsvOptions,
) -> Result<Table, DataSourceError> {
    let delimiter = u8::try_from(options.delimiter).map_err(|_| DataSourceError::Malformed {
        path: path.to_path_buf(),
        message: format!("delimiter {:?} is not a single byte", options.delimiter),
    })?;
    let malformed = |e: csv::Error| DataSourceError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(DataSourceError::Malformed {
            path: path.to_path_buf(),
            message: "missing header row".to_string(),
        });
    }

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(malformed)?;
        for (i, column) in cells.iter_mut().enumerate() {
            let raw = record.get(i).unwrap_or("");
            let missing = MISSING_MARKERS.contains(&raw.to_ascii_lowercase().as_str());
            column.push((!missing).then(|| raw.to_string()));
        }
    }

    if cells.first().map_or(true, Vec::is_empty) {
        return Err(DataSourceError::Empty {
            path: path.to_path_buf(),
        });
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| infer_column(name, values, options))
        .collect();

    let table = Table::new(columns).map_err(|e| DataSourceError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    debug!(
        path = %path.display(),
        rows = table.num_rows(),
        columns = table.num_columns(),
        "Loaded CSV"
    );
    Ok(table)
}

fn infer_column(name: String, values: Vec<Option<String>>, options: &CsvOptions) -> Column {
    if !options.categorical.contains(&name) {
        let parsed: Option<Vec<Option<f64>>> = values
            .iter()
            .map(|v| match v {
                None => Some(None),
                Some(s) => s.parse::<f64>().ok().filter(|x| x.is_finite()).map(Some),
            })
            .collect();
        if let Some(numbers) = parsed {
            return Column::numeric(name, numbers);
        }
    }
    Column::categorical(name, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColumnType;
    use std::io::Write;

    fn read(text: &str, options: &CsvOptions) -> Result<Table, DataSourceError> {
        read_csv(text.as_bytes(), Path::new("test.csv"), options)
    }

    #[test]
    fn test_infers_types_and_missing() {
        let table = read(
            "sqft,city,price\n1000,north,200\n,south,NA\n1200,north,250\n",
            &CsvOptions::default(),
        )
        .unwrap();

        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column("city").unwrap().data.column_type(), ColumnType::Categorical);
        assert_eq!(table.numeric("sqft").unwrap(), &[Some(1000.0), None, Some(1200.0)]);
        assert_eq!(table.numeric("price").unwrap()[1], None);
    }

    #[test]
    fn test_forced_categorical() {
        let options = CsvOptions {
            categorical: vec!["zip".to_string()],
            ..CsvOptions::default()
        };
        let table = read("zip,price\n10001,1\n10002,2\n", &options).unwrap();
        assert_eq!(table.column("zip").unwrap().data.column_type(), ColumnType::Categorical);
    }

    #[test]
    fn test_empty_source() {
        let err = read("sqft,price\n", &CsvOptions::default()).unwrap_err();
        assert!(matches!(err, DataSourceError::Empty { .. }));
    }

    #[test]
    fn test_ragged_rows_are_malformed() {
        let err = read("a,b\n1,2\n3\n", &CsvOptions::default()).unwrap_err();
        assert!(matches!(err, DataSourceError::Malformed { .. }));
    }

    #[test]
    fn test_unreadable_path() {
        let err = load_csv(Path::new("/definitely/not/here.csv"), &CsvOptions::default()).unwrap_err();
        assert!(matches!(err, DataSourceError::Unreadable { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sqft;price").unwrap();
        writeln!(file, "900;100").unwrap();
        let options = CsvOptions {
            delimiter: ';',
            ..CsvOptions::default()
        };
        let table = load_csv(file.path(), &options).unwrap();
        assert_eq!(table.numeric("sqft").unwrap(), &[Some(900.0)]);
    }
}
