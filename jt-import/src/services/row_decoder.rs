//! Row decoding for delimited reference-data files
//!
//! A `HeaderMap` is built once per file from the header record; every data
//! record is then wrapped in a `DecodedRow` that offers typed accessors by
//! column name. Lookups never fail: a missing column, a short record or a
//! blank cell all read as absent, and numeric coercion failures come back as
//! `Field::Unparsable` for the caller to decide on.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use csv::StringRecord;

use crate::error::{ImportError, Stage};

/// Outcome of reading one typed field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// Column missing, or cell blank/whitespace
    Absent,
    /// Cell present but not coercible; carries the trimmed raw text
    Unparsable(String),
    Value(T),
}

impl<T> Field<T> {
    /// Parsed value, discarding why it might be missing
    pub fn value(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Column name → index, built once per file
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    index: HashMap<String, usize>,
}

impl HeaderMap {
    /// Build from a header record
    ///
    /// Names are trimmed and a leading UTF-8 BOM is dropped. When a name
    /// repeats, the first occurrence wins.
    pub fn from_record(headers: &StringRecord) -> Self {
        let mut index = HashMap::with_capacity(headers.len());
        for (position, name) in headers.iter().enumerate() {
            let name = name.trim_start_matches('\u{feff}').trim();
            if name.is_empty() {
                continue;
            }
            index.entry(name.to_string()).or_insert(position);
        }
        Self { index }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

/// One data record addressed by column name
#[derive(Debug, Clone)]
pub struct DecodedRow {
    headers: Arc<HeaderMap>,
    record: StringRecord,
    line: u64,
}

impl DecodedRow {
    pub fn new(headers: Arc<HeaderMap>, record: StringRecord, line: u64) -> Self {
        Self {
            headers,
            record,
            line,
        }
    }

    /// 1-based line number in the source file (header is line 1)
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Trimmed cell text; `None` when the column is missing or the cell is blank
    pub fn text(&self, column: &str) -> Option<&str> {
        let position = self.headers.position(column)?;
        let value = self.record.get(position)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// Owned copy of `text`
    pub fn text_owned(&self, column: &str) -> Option<String> {
        self.text(column).map(str::to_string)
    }

    /// Integer identifier, tolerating a `.0`-style fractional suffix
    pub fn long(&self, column: &str) -> Field<i64> {
        match self.text(column) {
            None => Field::Absent,
            Some(raw) => match parse_identifier(raw) {
                Some(value) => Field::Value(value),
                None => Field::Unparsable(raw.to_string()),
            },
        }
    }

    /// Decimal amount
    pub fn decimal(&self, column: &str) -> Field<Decimal> {
        match self.text(column) {
            None => Field::Absent,
            Some(raw) => match parse_decimal(raw) {
                Some(value) => Field::Value(value),
                None => Field::Unparsable(raw.to_string()),
            },
        }
    }
}

/// Parse an integer identifier that may carry a spreadsheet float artifact
///
/// `"482913"`, `"482913.0"` and `"482913.00"` all yield 482913. The part after
/// the dot must be digits only; anything else is unparsable.
pub fn parse_identifier(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (integer, fraction) = match raw.split_once('.') {
        Some((integer, fraction)) => (integer, fraction),
        None => (raw, ""),
    };

    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    integer.parse::<i64>().ok()
}

/// Parse a decimal amount, accepting plain and scientific notation
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// One item read from a source file
#[derive(Debug)]
pub enum SourceItem {
    Row(DecodedRow),
    /// Record the CSV layer could not decode (e.g. invalid UTF-8)
    Malformed { line: u64, reason: String },
}

/// Header-addressed rows from one delimited file
pub struct RowSource<R> {
    reader: csv::Reader<R>,
    headers: Arc<HeaderMap>,
    path: PathBuf,
}

impl RowSource<File> {
    /// Open a file, reporting a missing file as `SourceNotFound`
    pub fn open(stage: Stage, path: &Path) -> Result<Self, ImportError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                ImportError::SourceNotFound {
                    stage,
                    path: path.to_path_buf(),
                }
            } else {
                ImportError::SourceRead {
                    path: path.to_path_buf(),
                    source: csv::Error::from(e),
                }
            }
        })?;

        Self::from_reader(file, path)
    }
}

impl<R: Read> RowSource<R> {
    /// Wrap any reader; `label` names the source in errors and logs
    pub fn from_reader(reader: R, label: &Path) -> Result<Self, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let header_record = reader.headers().map_err(|e| ImportError::SourceRead {
            path: label.to_path_buf(),
            source: e,
        })?;
        let headers = Arc::new(HeaderMap::from_record(header_record));

        Ok(Self {
            reader,
            headers,
            path: label.to_path_buf(),
        })
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate the data records
    ///
    /// I/O failures end the file (`Err`); anything else wrong with a single
    /// record is yielded as `SourceItem::Malformed` and reading continues.
    pub fn items(self) -> impl Iterator<Item = Result<SourceItem, ImportError>> {
        let RowSource {
            reader,
            headers,
            path,
        } = self;

        let mut failed = false;
        reader
            .into_records()
            .map_while(move |result| {
                if failed {
                    return None;
                }
                Some(match result {
                    Ok(record) => {
                        let line = record.position().map(|p| p.line()).unwrap_or(0);
                        Ok(SourceItem::Row(DecodedRow::new(
                            Arc::clone(&headers),
                            record,
                            line,
                        )))
                    }
                    Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => {
                        failed = true;
                        Err(ImportError::SourceRead {
                            path: path.clone(),
                            source: err,
                        })
                    }
                    Err(err) => Ok(SourceItem::Malformed {
                        line: err.position().map(|p| p.line()).unwrap_or(0),
                        reason: err.to_string(),
                    }),
                })
            })
    }
}
