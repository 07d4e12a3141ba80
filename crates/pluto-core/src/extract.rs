//! Raw and intermediate extract I/O.
//!
//! The raw extract is a delimited text file with a header row and untyped
//! cells. It is re-written as an intermediate extract holding only the
//! reconciled columns, every one as text, behind a leading `ROWID` column, and
//! that file is what the staging table is loaded from.

use std::fs::File;
use std::io::{BufWriter, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{ArrayRef, RecordBatch, UInt64Array};
use arrow_csv::WriterBuilder;
use arrow_schema::{DataType, Field, Schema};
use tracing::{debug, info};

use crate::error::{IoErrorExt, Result, SchemaError};
use crate::reconcile::ReconciledFields;
use crate::schema::FieldSpec;
use crate::table::TypedTable;

/// Name of the row index column of the intermediate extract.
pub const ROWID_COLUMN: &str = "ROWID";

/// A raw extract held in memory as text records.
#[derive(Debug, Clone)]
pub struct RawExtract {
    path: PathBuf,
    header: Vec<String>,
    records: Vec<csv::StringRecord>,
}

impl RawExtract {
    /// Read a delimited extract with a header row.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Read`](crate::error::IoError::Read) if the file is
    /// unreadable or a record has a different number of cells than the header.
    pub fn read(path: &Path, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_path(path)
            .with_read_context("CSV", path)?;

        let header = reader
            .headers()
            .with_read_context("CSV", path)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();

        let records = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_read_context("CSV", path)?;

        info!(
            "Read {} records with {} columns from {}",
            records.len(),
            header.len(),
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            header,
            records,
        })
    }

    /// Where the extract was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header row.
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Number of data records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the extract has no data records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The reconciled columns as an all-text table, in reconciled order.
    ///
    /// Columns are named by logical name; empty cells become null.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be built.
    pub fn project(&self, fields: &ReconciledFields) -> Result<TypedTable> {
        let specs = fields
            .fields()
            .iter()
            .map(|f| FieldSpec::text(f.logical_name.as_str()))
            .collect::<Vec<_>>();
        let indices = fields.fields().iter().map(|f| f.source_index).collect::<Vec<_>>();
        TypedTable::from_text_rows(
            specs,
            self.records
                .iter()
                .map(|record| indices.iter().map(|&idx| record.get(idx)).collect()),
        )
    }
}

/// Options for writing the intermediate extract.
#[derive(Debug, Clone)]
pub struct CsvWriterOptions {
    /// Column delimiter (default: b',')
    pub delimiter: u8,
    /// Whether to write header row (default: true)
    pub has_header: bool,
    /// Whether to prepend the `ROWID` index column (default: true)
    pub with_row_index: bool,
    /// Null value representation (default: empty string)
    pub null_value: String,
}

impl Default for CsvWriterOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            with_row_index: true,
            null_value: String::new(),
        }
    }
}

impl CsvWriterOptions {
    /// Create new writer options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set column delimiter
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set whether to write header row
    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Set whether to prepend the row index column
    #[must_use]
    pub fn with_row_index(mut self, with_row_index: bool) -> Self {
        self.with_row_index = with_row_index;
        self
    }

    /// Set null value representation
    #[must_use]
    pub fn with_null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = null_value.into();
        self
    }
}

/// Write a table as CSV.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_csv<W: IoWrite>(writer: W, table: &TypedTable, options: &CsvWriterOptions) -> std::result::Result<(), arrow_schema::ArrowError> {
    let mut builder = WriterBuilder::new()
        .with_delimiter(options.delimiter)
        .with_header(options.has_header);
    if !options.null_value.is_empty() {
        builder = builder.with_null(options.null_value.clone());
    }

    let batch = if options.with_row_index {
        with_row_index(table.batch())?
    } else {
        table.batch().clone()
    };

    let mut csv_writer = builder.build(writer);
    csv_writer.write(&batch)
}

fn with_row_index(batch: &RecordBatch) -> std::result::Result<RecordBatch, arrow_schema::ArrowError> {
    let mut fields = vec![Arc::new(Field::new(ROWID_COLUMN, DataType::UInt64, false))];
    fields.extend(batch.schema().fields().iter().cloned());
    let mut columns: Vec<ArrayRef> = vec![Arc::new(UInt64Array::from_iter_values(0..batch.num_rows() as u64))];
    columns.extend(batch.columns().iter().cloned());
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}

/// Write the intermediate extract to `path`; returns the number of rows.
///
/// # Errors
///
/// Returns an [`IoError::Write`](crate::error::IoError::Write) on failure.
pub fn write_intermediate(path: &Path, table: &TypedTable, options: &CsvWriterOptions) -> Result<usize> {
    let file = File::create(path).with_write_context("CSV", path)?;
    let mut writer = BufWriter::new(file);
    write_csv(&mut writer, table, options).with_write_context("CSV", path)?;
    writer.flush().with_write_context("CSV", path)?;
    info!("Wrote {} rows to {}", table.num_rows(), path.display());
    Ok(table.num_rows())
}

/// Write the positional column declaration next to the intermediate extract.
///
/// # Errors
///
/// Returns an [`IoError::Write`](crate::error::IoError::Write) on failure.
pub fn write_schema_ini(directory: &Path, csv_name: &str, fields: &ReconciledFields) -> Result<PathBuf> {
    let path = directory.join("schema.ini");
    let contents = fields.render_schema_ini(csv_name);
    for line in contents.lines().skip(1) {
        debug!("Writing to schema ini - {}", line);
    }
    std::fs::write(&path, contents).with_write_context("INI", &path)?;
    Ok(path)
}

/// Re-read the intermediate extract as all-text rows named by display name.
///
/// Every reconciled field must be present in the file's header; the `ROWID`
/// column and any other column are ignored.
///
/// # Errors
///
/// - [`IoError::Read`](crate::error::IoError::Read) if the file is unreadable
/// - [`SchemaError::MissingField`] if a reconciled column is absent
pub fn read_intermediate(path: &Path, fields: &ReconciledFields, delimiter: u8) -> Result<TypedTable> {
    let extract = RawExtract::read(path, delimiter)?;
    let mut indices = Vec::with_capacity(fields.len());
    for field in fields.fields() {
        let idx = extract
            .header()
            .iter()
            .position(|h| *h == field.logical_name)
            .ok_or_else(|| SchemaError::MissingField {
                field: field.logical_name.clone(),
            })?;
        indices.push(idx);
    }

    let specs = fields
        .fields()
        .iter()
        .map(|f| FieldSpec::text(f.spec.name.as_str()))
        .collect::<Vec<_>>();
    TypedTable::from_text_rows(
        specs,
        extract
            .records
            .iter()
            .map(|record| indices.iter().map(|&idx| record.get(idx)).collect()),
    )
}
