//! Typed tabular storage backed by Arrow record batches.
//!
//! [`TypedTable`] pairs a [`RecordBatch`] with the [`FieldSpec`]s it was created
//! from, so stores can round-trip alias, precision, scale and length alongside
//! the data. [`coerce_rows`] implements the append semantics every store shares.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::compute::{concat_batches, take_record_batch};
use arrow_array::builder::StringBuilder;
use arrow_array::{
    Array, ArrayRef, Float64Array, RecordBatch, RecordBatchOptions, StringArray, UInt32Array,
};
use arrow_cast::display::array_value_to_string;
use arrow_cast::{CastOptions, cast_with_options};
use arrow_schema::{DataType, Schema, SchemaRef};

use crate::error::{BackendError, Result, SchemaError, SourcePosition};
use crate::schema::{FieldSpec, StorageType};

/// How rows are matched to the destination schema on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendMode {
    /// Match columns by name (case-insensitive) and force every value into the
    /// destination storage type. Missing columns become null; extra columns are
    /// ignored; a value that does not parse fails the whole append.
    Coerce,
    /// Source and destination must have identical column names and types.
    Exact,
}

/// A table whose columns are typed per their [`FieldSpec`].
#[derive(Debug, Clone)]
pub struct TypedTable {
    fields: Vec<FieldSpec>,
    batch: RecordBatch,
}

/// Arrow schema for a list of fields.
#[must_use]
pub fn schema_for(fields: &[FieldSpec]) -> SchemaRef {
    Arc::new(Schema::new(
        fields.iter().map(FieldSpec::arrow_field).collect::<Vec<_>>(),
    ))
}

impl TypedTable {
    /// An empty table with the given columns.
    #[must_use]
    pub fn empty(fields: Vec<FieldSpec>) -> Self {
        let batch = RecordBatch::new_empty(schema_for(&fields));
        Self { fields, batch }
    }

    /// Build a table from columns already typed per `fields`.
    ///
    /// `num_rows` is only consulted when `fields` is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the arrays do not match the declared types or lengths.
    pub fn try_new(fields: Vec<FieldSpec>, columns: Vec<ArrayRef>, num_rows: usize) -> Result<Self> {
        let schema = schema_for(&fields);
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        let batch = if columns.is_empty() {
            RecordBatch::try_new_with_options(schema, columns, &options)?
        } else {
            RecordBatch::try_new(schema, columns)?
        };
        Ok(Self { fields, batch })
    }

    /// Build an all-text table from rows of optional strings.
    ///
    /// Empty strings are stored as null. Other values are kept verbatim,
    /// surrounding whitespace included.
    ///
    /// # Errors
    ///
    /// Returns an error if a row has a different arity than `fields`.
    pub fn from_text_rows<'a, I>(fields: Vec<FieldSpec>, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<Option<&'a str>>>,
    {
        let fields: Vec<FieldSpec> = fields.iter().map(FieldSpec::as_text).collect();
        let mut builders: Vec<StringBuilder> = fields.iter().map(|_| StringBuilder::new()).collect();
        let mut num_rows = 0;

        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != fields.len() {
                return Err(BackendError::Format {
                    format: "rows".to_string(),
                    path: std::path::PathBuf::new(),
                    message: format!(
                        "row {} has {} values, expected {}",
                        row_idx + 1,
                        row.len(),
                        fields.len()
                    ),
                }
                .into());
            }
            for (builder, value) in builders.iter_mut().zip(row) {
                match value {
                    Some(v) if !v.is_empty() => builder.append_value(v),
                    _ => builder.append_null(),
                }
            }
            num_rows += 1;
        }

        let columns = builders
            .into_iter()
            .map(|mut b| Arc::new(b.finish()) as ArrayRef)
            .collect();
        Self::try_new(fields, columns, num_rows)
    }

    /// Field declarations in column order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// The underlying record batch.
    #[must_use]
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Position of a column, matched case-insensitively.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Field declaration of a column, matched case-insensitively.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.column_index(name).map(|idx| &self.fields[idx])
    }

    /// Column array, matched case-insensitively.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.column_index(name).map(|idx| self.batch.column(idx))
    }

    /// Display form of a single cell, `None` for null.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be formatted.
    pub fn value_string(&self, column: usize, row: usize) -> Result<Option<String>> {
        let array = self.batch.column(column);
        if array.is_null(row) {
            return Ok(None);
        }
        Ok(Some(array_value_to_string(array, row)?))
    }

    /// Values of a column as doubles; nulls and unparseable text become `None`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::FieldNotFound`] if the column does not exist.
    pub fn doubles(&self, table: &str, name: &str) -> Result<Vec<Option<f64>>> {
        let array = self.column(name).ok_or_else(|| BackendError::FieldNotFound {
            name: table.to_string(),
            field: name.to_string(),
        })?;
        let cast = cast_with_options(&trim_text(array), &DataType::Float64, &CastOptions::default())?;
        let doubles = cast
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.iter().collect())
            .unwrap_or_default();
        Ok(doubles)
    }

    /// Rows at the given positions, in the given order.
    ///
    /// # Errors
    ///
    /// Returns an error if an index is out of bounds.
    pub fn take(&self, indices: &[u32]) -> Result<Self> {
        let indices = UInt32Array::from(indices.to_vec());
        let batch = take_record_batch(&self.batch, &indices)?;
        Ok(Self {
            fields: self.fields.clone(),
            batch,
        })
    }

    /// Rows of `self` followed by rows of `other`; both must share a schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schemas differ.
    pub fn concat(&self, other: &Self) -> Result<Self> {
        if self.fields.is_empty() {
            return Self::try_new(Vec::new(), Vec::new(), self.num_rows() + other.num_rows());
        }
        let batch = concat_batches(&self.batch.schema(), [&self.batch, &other.batch])?;
        Ok(Self {
            fields: self.fields.clone(),
            batch,
        })
    }

    /// Append a column.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::FieldExists`] if the name is taken, or an error if
    /// the array does not match the declared type or row count.
    pub fn with_column(&self, table: &str, spec: FieldSpec, array: ArrayRef) -> Result<Self> {
        if self.column_index(&spec.name).is_some() {
            return Err(BackendError::FieldExists {
                name: table.to_string(),
                field: spec.name,
            }
            .into());
        }
        let mut fields = self.fields.clone();
        let mut columns = self.batch.columns().to_vec();
        fields.push(spec);
        columns.push(array);
        Self::try_new(fields, columns, self.num_rows())
    }

    /// Append an all-null column.
    ///
    /// # Errors
    ///
    /// Same as [`TypedTable::with_column`].
    pub fn with_null_column(&self, table: &str, spec: FieldSpec) -> Result<Self> {
        let array = arrow_array::new_null_array(&spec.storage_type.data_type(), self.num_rows());
        self.with_column(table, spec.with_nullable(true), array)
    }

    /// Replace the values of an existing column.
    ///
    /// # Errors
    ///
    /// Returns an error if the array does not match the column's type or the
    /// row count.
    pub fn replace_column(&self, index: usize, array: ArrayRef) -> Result<Self> {
        let mut columns = self.batch.columns().to_vec();
        columns[index] = array;
        Self::try_new(self.fields.clone(), columns, self.num_rows())
    }

    /// Rename a column, keeping its declaration otherwise intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuilt batch is invalid.
    pub fn rename_column(&self, index: usize, new_name: &str) -> Result<Self> {
        let mut fields = self.fields.clone();
        fields[index].name = new_name.to_string();
        if fields[index].alias.is_empty() || fields[index].alias == self.fields[index].name {
            fields[index].alias = new_name.to_string();
        }
        Self::try_new(fields, self.batch.columns().to_vec(), self.num_rows())
    }

    /// Keep only the columns for which `keep` returns true.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuilt batch is invalid.
    pub fn retain_columns(&self, mut keep: impl FnMut(&FieldSpec) -> bool) -> Result<Self> {
        let (fields, columns): (Vec<_>, Vec<_>) = self
            .fields
            .iter()
            .zip(self.batch.columns())
            .filter(|(f, _)| keep(f))
            .map(|(f, c)| (f.clone(), Arc::clone(c)))
            .unzip();
        Self::try_new(fields, columns, self.num_rows())
    }

    /// Positions of rows whose `column` value equals one of `values`.
    ///
    /// Numeric columns compare numerically, so `"2"` selects `2.0`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::FieldNotFound`] if the column does not exist.
    pub fn positions_matching(&self, table: &str, column: &str, values: &[String]) -> Result<Vec<u32>> {
        let idx = self.column_index(column).ok_or_else(|| BackendError::FieldNotFound {
            name: table.to_string(),
            field: column.to_string(),
        })?;
        let mut rows = Vec::new();
        if self.fields[idx].storage_type == StorageType::Text {
            for row in 0..self.num_rows() {
                if let Some(value) = self.value_string(idx, row)?
                    && values.iter().any(|v| *v == value)
                {
                    rows.push(row as u32);
                }
            }
        } else {
            let wanted: Vec<f64> = values.iter().filter_map(|v| v.trim().parse().ok()).collect();
            for (row, value) in self.doubles(table, column)?.into_iter().enumerate() {
                if let Some(value) = value
                    && wanted.iter().any(|w| *w == value)
                {
                    rows.push(row as u32);
                }
            }
        }
        Ok(rows)
    }

    /// First non-null value that occurs more than once in `column`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::FieldNotFound`] if the column does not exist.
    pub fn first_duplicate(&self, table: &str, column: &str) -> Result<Option<String>> {
        let idx = self.column_index(column).ok_or_else(|| BackendError::FieldNotFound {
            name: table.to_string(),
            field: column.to_string(),
        })?;
        let mut seen = HashSet::with_capacity(self.num_rows());
        for row in 0..self.num_rows() {
            if let Some(value) = self.value_string(idx, row)?
                && !seen.insert(value.clone())
            {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Force `source` rows into the `dest` schema.
///
/// This is the append used by every store: it returns the rows to add to the
/// destination, typed per `dest`, or the first value that does not fit. No rows
/// are produced when any value fails.
///
/// # Errors
///
/// - [`SchemaError::AppendMismatch`] in [`AppendMode::Exact`] when schemas differ
/// - [`SchemaError::Coercion`] when a value does not parse under its type, or
///   a text value is longer than the declared length
/// - [`SchemaError::NullViolation`] when a non-nullable column receives nulls
pub fn coerce_rows(
    source: &TypedTable,
    dest_name: &str,
    dest: &[FieldSpec],
    mode: AppendMode,
) -> Result<TypedTable> {
    if mode == AppendMode::Exact {
        let same = source.fields.len() == dest.len()
            && source
                .fields
                .iter()
                .zip(dest)
                .all(|(s, d)| s.name == d.name && s.storage_type == d.storage_type);
        if !same {
            return Err(SchemaError::AppendMismatch {
                table: dest_name.to_string(),
                message: format!(
                    "source columns [{}] differ from destination columns [{}]",
                    source.column_names().join(", "),
                    dest.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ")
                ),
            }
            .into());
        }
    }

    let strict = CastOptions {
        safe: false,
        ..CastOptions::default()
    };
    let num_rows = source.num_rows();
    let mut columns = Vec::with_capacity(dest.len());

    for spec in dest {
        let target = spec.storage_type.data_type();
        let column = match source.column_index(&spec.name) {
            None => arrow_array::new_null_array(&target, num_rows),
            Some(src_idx) => {
                let array = source.batch.column(src_idx);
                if array.data_type() == &target {
                    Arc::clone(array)
                } else {
                    let array = if target == DataType::Utf8 {
                        Arc::clone(array)
                    } else {
                        trim_text(array)
                    };
                    cast_with_options(&array, &target, &strict).map_err(|_| {
                        locate_coercion_failure(&array, src_idx, spec, &strict)
                    })?
                }
            },
        };
        if let Some(src_idx) = source.column_index(&spec.name) {
            check_text_length(&column, src_idx, spec)?;
        }
        if !spec.nullable && column.null_count() > 0 {
            return Err(SchemaError::NullViolation {
                field: spec.name.clone(),
                count: column.null_count(),
            }
            .into());
        }
        columns.push(column);
    }

    TypedTable::try_new(dest.to_vec(), columns, num_rows)
}

/// Trim string values ahead of a numeric cast; blank values become null.
fn trim_text(array: &ArrayRef) -> ArrayRef {
    match array.as_any().downcast_ref::<StringArray>() {
        Some(strings) => {
            let trimmed: StringArray = strings
                .iter()
                .map(|v| v.map(str::trim).filter(|v| !v.is_empty()))
                .collect();
            Arc::new(trimmed)
        },
        None => Arc::clone(array),
    }
}

fn check_text_length(column: &ArrayRef, src_idx: usize, spec: &FieldSpec) -> Result<()> {
    if spec.storage_type != StorageType::Text || spec.length == 0 {
        return Ok(());
    }
    let Some(strings) = column.as_any().downcast_ref::<StringArray>() else {
        return Ok(());
    };
    let limit = spec.length as usize;
    for (row, value) in strings.iter().enumerate() {
        if let Some(value) = value
            && value.chars().count() > limit
        {
            return Err(SchemaError::Coercion {
                field: spec.name.clone(),
                storage_type: spec.storage_type,
                value: value.to_string(),
                position: SourcePosition {
                    record: Some(row as u64 + 1),
                    field: Some(src_idx as u64 + 1),
                },
            }
            .into());
        }
    }
    Ok(())
}

fn locate_coercion_failure(
    array: &ArrayRef,
    src_idx: usize,
    spec: &FieldSpec,
    options: &CastOptions<'_>,
) -> SchemaError {
    let target = spec.storage_type.data_type();
    for row in 0..array.len() {
        if array.is_null(row) {
            continue;
        }
        let single = array.slice(row, 1);
        if cast_with_options(&single, &target, options).is_err() {
            return SchemaError::Coercion {
                field: spec.name.clone(),
                storage_type: spec.storage_type,
                value: array_value_to_string(array, row).unwrap_or_default(),
                position: SourcePosition {
                    record: Some(row as u64 + 1),
                    field: Some(src_idx as u64 + 1),
                },
            };
        }
    }
    SchemaError::Coercion {
        field: spec.name.clone(),
        storage_type: spec.storage_type,
        value: String::new(),
        position: SourcePosition::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlutoError;
    use arrow_array::Int16Array;

    fn text_table(rows: &[[&str; 3]]) -> TypedTable {
        let fields = vec![
            FieldSpec::text("BBL"),
            FieldSpec::text("NumBldgs"),
            FieldSpec::text("Address"),
        ];
        TypedTable::from_text_rows(
            fields,
            rows.iter().map(|r| r.iter().map(|v| Some(*v)).collect()),
        )
        .unwrap()
    }

    fn typed_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("bbl", "BBL", StorageType::Double).with_nullable(false),
            FieldSpec::new("numbldgs", "NumBldgs", StorageType::Integer16),
            FieldSpec::new("address", "Address", StorageType::Text).with_length(28),
        ]
    }

    #[test]
    fn test_from_text_rows_maps_empty_to_null() {
        let table = text_table(&[["1001", "", "1 MAIN ST"], ["1002", " 3 ", ""]]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.value_string(1, 0).unwrap(), None);
        assert_eq!(table.value_string(1, 1).unwrap(), Some(" 3 ".to_string()));
        assert_eq!(table.value_string(2, 1).unwrap(), None);
    }

    #[test]
    fn test_coerce_trims_numeric_and_keeps_text_padding() {
        let table = text_table(&[["1001", " 3 ", "  1 MAIN ST "], [" 1002", "  ", "B"]]);
        let typed = coerce_rows(&table, "final", &typed_fields(), AppendMode::Coerce).unwrap();
        assert_eq!(typed.doubles("final", "BBL").unwrap(), vec![Some(1001.0), Some(1002.0)]);
        assert_eq!(typed.value_string(1, 0).unwrap(), Some("3".to_string()));
        assert_eq!(typed.value_string(1, 1).unwrap(), None);
        assert_eq!(typed.value_string(2, 0).unwrap(), Some("  1 MAIN ST ".to_string()));

        // Text columns read as numbers tolerate the padding too.
        assert_eq!(table.doubles("t", "NumBldgs").unwrap(), vec![Some(3.0), None]);
    }

    #[test]
    fn test_coerce_rejects_text_longer_than_declared() {
        let table = TypedTable::from_text_rows(vec![FieldSpec::text("PLUTOMapID")], [vec![Some("22222")]]).unwrap();
        let dest = [FieldSpec::new("plutomapid", "PLUTOMapID", StorageType::Text).with_length(1)];
        let err = coerce_rows(&table, "final", &dest, AppendMode::Coerce).unwrap_err();
        match err {
            PlutoError::Schema(SchemaError::Coercion {
                field,
                value,
                position,
                ..
            }) => {
                assert_eq!(field, "PLUTOMapID");
                assert_eq!(value, "22222");
                assert_eq!(position.record, Some(1));
                assert_eq!(position.field, Some(1));
            },
            other => panic!("unexpected error: {other:?}"),
        }

        // Length counts characters, not bytes; zero means unbounded.
        let accented = TypedTable::from_text_rows(vec![FieldSpec::text("PLUTOMapID")], [vec![Some("é")]]).unwrap();
        assert!(coerce_rows(&accented, "final", &dest, AppendMode::Coerce).is_ok());
        let unbounded = [FieldSpec::new("plutomapid", "PLUTOMapID", StorageType::Text)];
        assert!(coerce_rows(&table, "final", &unbounded, AppendMode::Coerce).is_ok());
    }

    #[test]
    fn test_coerce_types_values() {
        let table = text_table(&[["1001", "2", "1 MAIN ST"], ["1002", "", "2 MAIN ST"]]);
        let typed = coerce_rows(&table, "final", &typed_fields(), AppendMode::Coerce).unwrap();
        assert_eq!(typed.num_rows(), 2);

        let bbl = typed.doubles("final", "bbl").unwrap();
        assert_eq!(bbl, vec![Some(1001.0), Some(1002.0)]);

        let bldgs = typed
            .column("NumBldgs")
            .unwrap()
            .as_any()
            .downcast_ref::<Int16Array>()
            .unwrap();
        assert_eq!(bldgs.value(0), 2);
        assert!(bldgs.is_null(1));

        let address = typed
            .column("Address")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(address.value(1), "2 MAIN ST");
    }

    #[test]
    fn test_coerce_reports_first_bad_value() {
        let table = text_table(&[["1001", "2", "A"], ["1002", "two", "B"]]);
        let err = coerce_rows(&table, "final", &typed_fields(), AppendMode::Coerce).unwrap_err();
        match err {
            PlutoError::Schema(SchemaError::Coercion {
                field,
                storage_type,
                value,
                position,
            }) => {
                assert_eq!(field, "NumBldgs");
                assert_eq!(storage_type, StorageType::Integer16);
                assert_eq!(value, "two");
                assert_eq!(position.record, Some(2));
                assert_eq!(position.field, Some(2));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_coerce_rejects_short_overflow() {
        let table = text_table(&[["1001", "70000", "A"]]);
        let err = coerce_rows(&table, "final", &typed_fields(), AppendMode::Coerce).unwrap_err();
        assert!(matches!(err, PlutoError::Schema(SchemaError::Coercion { .. })));
    }

    #[test]
    fn test_coerce_null_violation() {
        let table = text_table(&[["", "1", "A"]]);
        let err = coerce_rows(&table, "final", &typed_fields(), AppendMode::Coerce).unwrap_err();
        assert!(matches!(
            err,
            PlutoError::Schema(SchemaError::NullViolation { ref field, count: 1 }) if field == "BBL"
        ));
    }

    #[test]
    fn test_coerce_fills_missing_columns_with_null() {
        let table = TypedTable::from_text_rows(
            vec![FieldSpec::text("bbl")],
            vec![vec![Some("1001")]],
        )
        .unwrap();
        let typed = coerce_rows(&table, "final", &typed_fields(), AppendMode::Coerce).unwrap();
        assert_eq!(typed.num_rows(), 1);
        assert_eq!(typed.value_string(2, 0).unwrap(), None);
    }

    #[test]
    fn test_exact_mode_requires_same_schema() {
        let table = text_table(&[["1001", "2", "A"]]);
        let err = coerce_rows(&table, "final", &typed_fields(), AppendMode::Exact).unwrap_err();
        assert!(matches!(err, PlutoError::Schema(SchemaError::AppendMismatch { .. })));

        let same = coerce_rows(&table, "copy", table.fields(), AppendMode::Exact).unwrap();
        assert_eq!(same.num_rows(), 1);
    }

    #[test]
    fn test_positions_matching_text_and_numeric() {
        let table = text_table(&[["1001", "2", "A"], ["1002", "4", "B"], ["1003", "1", "C"]]);
        assert_eq!(
            table
                .positions_matching("t", "NumBldgs", &["2".to_string(), "4".to_string()])
                .unwrap(),
            vec![0, 1]
        );

        let typed = coerce_rows(&table, "t", &typed_fields(), AppendMode::Coerce).unwrap();
        assert_eq!(
            typed
                .positions_matching("t", "NumBldgs", &["4".to_string()])
                .unwrap(),
            vec![1]
        );
    }

    #[test]
    fn test_first_duplicate() {
        let table = text_table(&[["1001", "2", "A"], ["1002", "4", "B"], ["1001", "1", "C"]]);
        assert_eq!(
            table.first_duplicate("t", "BBL").unwrap(),
            Some("1001".to_string())
        );
        assert_eq!(table.first_duplicate("t", "Address").unwrap(), None);
    }

    #[test]
    fn test_take_concat_rename_retain() {
        let table = text_table(&[["1001", "2", "A"], ["1002", "4", "B"]]);
        let second = table.take(&[1]).unwrap();
        assert_eq!(second.value_string(0, 0).unwrap(), Some("1002".to_string()));

        let both = table.concat(&second).unwrap();
        assert_eq!(both.num_rows(), 3);

        let renamed = both.rename_column(2, "Addr").unwrap();
        assert_eq!(renamed.column_names(), vec!["BBL", "NumBldgs", "Addr"]);

        let retained = renamed.retain_columns(|f| f.name != "NumBldgs").unwrap();
        assert_eq!(retained.column_names(), vec!["BBL", "Addr"]);
        assert_eq!(retained.num_rows(), 3);
    }

    #[test]
    fn test_with_column_rejects_existing_name() {
        let table = text_table(&[["1001", "2", "A"]]);
        let err = table
            .with_null_column("t", FieldSpec::new("bbl", "bbl", StorageType::Double))
            .unwrap_err();
        assert!(matches!(err, PlutoError::Backend(BackendError::FieldExists { .. })));
    }
}
