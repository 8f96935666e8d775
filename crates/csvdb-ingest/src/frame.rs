//! In-memory tabular frames parsed from CSV files
//!
//! A [`Frame`] stores its data column by column, each column typed by
//! inspecting every non-missing cell:
//!
//! | inferred from                           | [`ColumnType`] | SQL type           |
//! |-----------------------------------------|----------------|--------------------|
//! | all cells parse as `i64`                | `BigInt`       | `BIGINT`           |
//! | all cells parse as `f64`, or no cells   | `Double`       | `DOUBLE PRECISION` |
//! | all cells are `True`/`true`/`FALSE`/... | `Boolean`      | `BOOLEAN`          |
//! | anything else                           | `Text`         | `TEXT`             |
//!
//! Missing-value markers (see [`is_missing`]) become nulls. Text cells are
//! kept verbatim; numeric and boolean detection ignores surrounding spaces.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Cell texts read as missing values.
const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Errors raised while turning a file into a [`Frame`]
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Zero-byte file, or nothing but blank lines
    #[error("no columns to parse from file")]
    NoColumns,

    #[error("expected {expected} fields in line {line}, saw {found}")]
    TooManyFields {
        line: u64,
        expected: usize,
        found: usize,
    },
}

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    Boolean,
    Text,
}

impl ColumnType {
    /// Postgres type used when creating the destination table
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Typed cell storage for one column; `None` is a null cell
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    BigInt(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Boolean(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

/// A borrowed view of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Null,
    BigInt(i64),
    Double(f64),
    Boolean(bool),
    Text(&'a str),
}

impl std::fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn column_type(&self) -> ColumnType {
        match self.data {
            ColumnData::BigInt(_) => ColumnType::BigInt,
            ColumnData::Double(_) => ColumnType::Double,
            ColumnData::Boolean(_) => ColumnType::Boolean,
            ColumnData::Text(_) => ColumnType::Text,
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::BigInt(v) => v.len(),
            ColumnData::Double(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `row`; out-of-range rows read as null
    pub fn value(&self, row: usize) -> Value<'_> {
        let value = match &self.data {
            ColumnData::BigInt(v) => v.get(row).copied().flatten().map(Value::BigInt),
            ColumnData::Double(v) => v.get(row).copied().flatten().map(Value::Double),
            ColumnData::Boolean(v) => v.get(row).copied().flatten().map(Value::Boolean),
            ColumnData::Text(v) => v.get(row).and_then(|c| c.as_deref()).map(Value::Text),
        };
        value.unwrap_or(Value::Null)
    }
}

/// Named, typed columns of equal length, rows in file order
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
    row_count: usize,
}

impl Frame {
    /// Parse the file at `path`. The first non-blank line is the header.
    pub fn from_path(path: &Path, delimiter: u8) -> Result<Self, ParseError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), delimiter)
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, ParseError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        if headers.is_empty() {
            return Err(ParseError::NoColumns);
        }

        let names = column_names(&headers);
        let width = names.len();
        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
        let mut row_count = 0;

        for result in rdr.records() {
            let record = result?;

            if record.len() > width {
                return Err(ParseError::TooManyFields {
                    line: record.position().map(|p| p.line()).unwrap_or_default(),
                    expected: width,
                    found: record.len(),
                });
            }

            // Short rows are padded with nulls
            for (idx, column) in cells.iter_mut().enumerate() {
                let cell = record.get(idx).filter(|c| !is_missing(c));
                column.push(cell.map(str::to_string));
            }
            row_count += 1;
        }

        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, raw)| Column {
                name,
                data: typed_column(raw),
            })
            .collect();

        Ok(Self { columns, row_count })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Cells of row `idx` in column order
    pub fn row(&self, idx: usize) -> Option<Vec<Value<'_>>> {
        (idx < self.row_count).then(|| self.columns.iter().map(|c| c.value(idx)).collect())
    }
}

/// Whether a raw cell reads as a missing value
pub fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell)
}

/// Header names with blanks replaced by `Unnamed: <idx>` and repeats suffixed `.1`, `.2`, ...
fn column_names(headers: &csv::StringRecord) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut repeats: HashMap<String, usize> = HashMap::new();
    let mut names = Vec::with_capacity(headers.len());

    for (idx, header) in headers.iter().enumerate() {
        let base = if header.is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            header.to_string()
        };

        let mut name = base.clone();
        let count = repeats.entry(base.clone()).or_insert(0);
        while used.contains(&name) {
            *count += 1;
            name = format!("{}.{}", base, count);
        }

        used.insert(name.clone());
        names.push(name);
    }

    names
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.trim() {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

fn infer_type(raw: &[Option<String>]) -> ColumnType {
    let mut present = raw.iter().flatten().map(|c| c.trim()).peekable();
    if present.peek().is_none() {
        return ColumnType::Double;
    }

    let present: Vec<&str> = present.collect();
    if present.iter().all(|c| c.parse::<i64>().is_ok()) {
        ColumnType::BigInt
    } else if present.iter().all(|c| c.parse::<f64>().is_ok()) {
        ColumnType::Double
    } else if present.iter().all(|c| parse_bool(c).is_some()) {
        ColumnType::Boolean
    } else {
        ColumnType::Text
    }
}

fn typed_column(raw: Vec<Option<String>>) -> ColumnData {
    match infer_type(&raw) {
        ColumnType::BigInt => ColumnData::BigInt(
            raw.iter()
                .map(|c| c.as_deref().and_then(|c| c.trim().parse().ok()))
                .collect(),
        ),
        ColumnType::Double => ColumnData::Double(
            raw.iter()
                .map(|c| c.as_deref().and_then(|c| c.trim().parse().ok()))
                .collect(),
        ),
        ColumnType::Boolean => ColumnData::Boolean(
            raw.iter()
                .map(|c| c.as_deref().and_then(parse_bool))
                .collect(),
        ),
        ColumnType::Text => ColumnData::Text(raw),
    }
}
