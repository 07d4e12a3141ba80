//! Schema registry: declarative field definitions for the typed table.
//!
//! A schema resource is a JSON object mapping each logical field name (the
//! raw extract's column header) to a seven element array:
//!
//! ```text
//! "bbl": ["BBL", "DOUBLE", 10, 0, "", "BBL", "NULLABLE"]
//!         name   type      precision scale length alias nullable
//! ```
//!
//! Numeric slots accept numbers, numeric strings, `""` or `null` (unset).
//! Nullability accepts booleans or the `NULLABLE` / `NON_NULLABLE` keywords.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use arrow_schema::{DataType, Field};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SchemaError};

const EMBEDDED_SCHEMA: &str = include_str!("../resources/mappluto_schema.json");

/// Length given to text columns that do not declare one.
pub const DEFAULT_TEXT_LENGTH: u32 = 255;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageType {
    /// Variable length text
    #[serde(rename = "TEXT")]
    Text,
    /// 16-bit signed integer
    #[serde(rename = "SHORT")]
    Integer16,
    /// 32-bit signed integer
    #[serde(rename = "LONG")]
    Integer32,
    /// Double-precision float
    #[serde(rename = "DOUBLE")]
    Double,
}

impl StorageType {
    /// The keyword used in schema resources and column declaration files.
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            StorageType::Text => "TEXT",
            StorageType::Integer16 => "SHORT",
            StorageType::Integer32 => "LONG",
            StorageType::Double => "DOUBLE",
        }
    }

    /// Arrow type backing this storage type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            StorageType::Text => DataType::Utf8,
            StorageType::Integer16 => DataType::Int16,
            StorageType::Integer32 => DataType::Int32,
            StorageType::Double => DataType::Float64,
        }
    }

    /// Returns `true` for the integer types.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self, StorageType::Integer16 | StorageType::Integer32)
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TEXT" | "STRING" => Ok(StorageType::Text),
            "SHORT" | "INTEGER16" | "SMALLINTEGER" => Ok(StorageType::Integer16),
            "LONG" | "INTEGER32" | "INTEGER" => Ok(StorageType::Integer32),
            "DOUBLE" => Ok(StorageType::Double),
            other => Err(other.to_string()),
        }
    }
}

/// Declaration of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column header in the raw extract
    pub logical_name: String,
    /// Column name in every store
    pub name: String,
    /// Storage type
    pub storage_type: StorageType,
    /// Total digits (numeric types)
    #[serde(default)]
    pub precision: u32,
    /// Digits after the decimal point (DOUBLE only)
    #[serde(default)]
    pub scale: u32,
    /// Maximum characters (TEXT only)
    #[serde(default)]
    pub length: u32,
    /// Human readable alias
    #[serde(default)]
    pub alias: String,
    /// Whether empty values are allowed
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl FieldSpec {
    /// Creates a nullable field with no precision, scale, length or alias.
    #[must_use]
    pub fn new(
        logical_name: impl Into<String>,
        name: impl Into<String>,
        storage_type: StorageType,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            name: name.into(),
            storage_type,
            precision: 0,
            scale: 0,
            length: 0,
            alias: String::new(),
            nullable: true,
        }
    }

    /// A pass-through text column whose logical and stored names are equal.
    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name, StorageType::Text).with_length(DEFAULT_TEXT_LENGTH)
    }

    /// Set the precision.
    #[must_use]
    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    /// Set the scale.
    #[must_use]
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    /// Set the length.
    #[must_use]
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    /// Set the alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Set nullability.
    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// The all-text twin of this field used by the staging store.
    ///
    /// Staging columns are always nullable; nullability is enforced when the
    /// staging rows are appended into the typed table.
    #[must_use]
    pub fn as_text(&self) -> Self {
        let length = if self.storage_type == StorageType::Text && self.length > 0 {
            self.length
        } else {
            DEFAULT_TEXT_LENGTH
        };
        Self {
            logical_name: self.logical_name.clone(),
            name: self.name.clone(),
            storage_type: StorageType::Text,
            precision: 0,
            scale: 0,
            length,
            alias: self.alias.clone(),
            nullable: true,
        }
    }

    /// Clears the slots that do not apply to the storage type.
    ///
    /// TEXT keeps only length, DOUBLE keeps precision and scale, the integer
    /// types keep precision.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        match self.storage_type {
            StorageType::Text => {
                self.precision = 0;
                self.scale = 0;
            },
            StorageType::Double => self.length = 0,
            StorageType::Integer16 | StorageType::Integer32 => {
                self.scale = 0;
                self.length = 0;
            },
        }
        self
    }

    /// Arrow field carrying the declaration as metadata.
    #[must_use]
    pub fn arrow_field(&self) -> Field {
        let mut metadata = HashMap::new();
        if !self.alias.is_empty() {
            metadata.insert("alias".to_string(), self.alias.clone());
        }
        if self.precision > 0 {
            metadata.insert("precision".to_string(), self.precision.to_string());
        }
        if self.scale > 0 {
            metadata.insert("scale".to_string(), self.scale.to_string());
        }
        if self.length > 0 {
            metadata.insert("length".to_string(), self.length.to_string());
        }
        Field::new(&self.name, self.storage_type.data_type(), self.nullable).with_metadata(metadata)
    }
}

/// Where a schema comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// A JSON resource on disk
    File(PathBuf),
    /// The schema compiled into the binary
    Embedded,
}

impl SchemaSource {
    /// Load the registry from this source.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Load`] if the resource is unreadable or malformed.
    pub fn load(&self) -> Result<SchemaRegistry> {
        match self {
            SchemaSource::File(path) => SchemaRegistry::load(path),
            SchemaSource::Embedded => SchemaRegistry::embedded(),
        }
    }
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaSource::File(path) => write!(f, "{}", path.display()),
            SchemaSource::Embedded => f.write_str("embedded"),
        }
    }
}

/// Immutable, ordered set of field declarations keyed by logical name.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    source: String,
    fields: Vec<FieldSpec>,
    by_logical: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Read and parse a schema resource from disk.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Load`] if the file is unreadable or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let source_name = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| SchemaError::Load {
            source_name: source_name.clone(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&text, &source_name)
    }

    /// The MapPLUTO schema compiled into the crate.
    ///
    /// # Errors
    ///
    /// Only fails if the embedded resource itself is malformed.
    pub fn embedded() -> Result<Self> {
        Self::from_json_str(EMBEDDED_SCHEMA, "embedded")
    }

    /// Parse a schema resource.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] describing the first malformed entry.
    pub fn from_json_str(text: &str, source_name: &str) -> Result<Self> {
        let load_error = |message: String| SchemaError::Load {
            source_name: source_name.to_string(),
            message,
        };

        let root: serde_json::Map<String, Value> =
            serde_json::from_str(text).map_err(|e| load_error(e.to_string()))?;

        let mut fields = Vec::with_capacity(root.len());
        for (logical, entry) in root {
            let spec = parse_entry(&logical, &entry).map_err(|e| match e {
                EntryError::Malformed(message) => {
                    load_error(format!("field '{logical}': {message}"))
                },
                EntryError::Schema(err) => err,
            })?;
            debug!(
                "Schema field {} -> {} {} (precision {}, scale {}, length {})",
                spec.logical_name,
                spec.name,
                spec.storage_type,
                spec.precision,
                spec.scale,
                spec.length
            );
            fields.push(spec);
        }

        Self::from_fields(source_name, fields)
    }

    /// Build a registry from already parsed fields.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateField`] if two fields share a logical
    /// or stored name.
    pub fn from_fields(source_name: &str, fields: Vec<FieldSpec>) -> Result<Self> {
        let mut by_logical = HashMap::with_capacity(fields.len());
        let mut names = HashMap::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            if by_logical.insert(field.logical_name.clone(), idx).is_some() {
                return Err(SchemaError::DuplicateField {
                    field: field.logical_name.clone(),
                }
                .into());
            }
            if names.insert(field.name.to_ascii_uppercase(), idx).is_some() {
                return Err(SchemaError::DuplicateField {
                    field: field.name.clone(),
                }
                .into());
            }
        }
        Ok(Self {
            source: source_name.to_string(),
            fields,
            by_logical,
        })
    }

    /// Where this registry was loaded from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Look up a field by logical name.
    #[must_use]
    pub fn get(&self, logical_name: &str) -> Option<&FieldSpec> {
        self.by_logical.get(logical_name).map(|&idx| &self.fields[idx])
    }

    /// Returns `true` if the logical name is declared.
    #[must_use]
    pub fn contains(&self, logical_name: &str) -> bool {
        self.by_logical.contains_key(logical_name)
    }

    /// All fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no field is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

enum EntryError {
    Malformed(String),
    Schema(SchemaError),
}

fn parse_entry(logical: &str, entry: &Value) -> std::result::Result<FieldSpec, EntryError> {
    let slots = entry
        .as_array()
        .ok_or_else(|| EntryError::Malformed("expected an array".to_string()))?;
    if slots.len() != 7 {
        return Err(EntryError::Malformed(format!(
            "expected 7 entries, found {}",
            slots.len()
        )));
    }

    let name = slots[0]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EntryError::Malformed("name must be a non-empty string".to_string()))?;
    let declared = slots[1]
        .as_str()
        .ok_or_else(|| EntryError::Malformed("type must be a string".to_string()))?;
    let storage_type = declared.parse::<StorageType>().map_err(|declared| {
        EntryError::Schema(SchemaError::UnknownStorageType {
            field: logical.to_string(),
            declared,
        })
    })?;

    let precision = int_slot(&slots[2], "precision")?;
    let scale = int_slot(&slots[3], "scale")?;
    let length = int_slot(&slots[4], "length")?;
    let alias = match &slots[5] {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => {
            return Err(EntryError::Malformed(format!(
                "alias must be a string, found {other}"
            )));
        },
    };
    let nullable = nullable_slot(&slots[6])?;

    Ok(FieldSpec {
        logical_name: logical.to_string(),
        name: name.to_string(),
        storage_type,
        precision,
        scale,
        length,
        alias,
        nullable,
    }
    .normalized())
}

fn int_slot(value: &Value, slot: &str) -> std::result::Result<u32, EntryError> {
    let malformed = || EntryError::Malformed(format!("{slot} must be a non-negative integer"));
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(malformed),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s.trim().parse::<u32>().map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}

fn nullable_slot(value: &Value) -> std::result::Result<bool, EntryError> {
    match value {
        Value::Null => Ok(true),
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_uppercase().as_str() {
            "NULLABLE" | "TRUE" | "" => Ok(true),
            "NON_NULLABLE" | "FALSE" => Ok(false),
            other => Err(EntryError::Malformed(format!(
                "unknown nullability '{other}'"
            ))),
        },
        other => Err(EntryError::Malformed(format!(
            "nullable must be a boolean or keyword, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlutoError;

    const SAMPLE: &str = r#"{
        "borough": ["Borough", "TEXT", "", "", 2, "Borough", "NULLABLE"],
        "lotarea": ["LotArea", "LONG", 10, 3, 9, "Lot Area", true],
        "bbl": ["BBL", "DOUBLE", 10, 0, "", "BBL", "NON_NULLABLE"]
    }"#;

    #[test]
    fn test_parse_preserves_order_and_slots() {
        let registry = SchemaRegistry::from_json_str(SAMPLE, "sample").unwrap();
        let names: Vec<_> = registry.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Borough", "LotArea", "BBL"]);

        let borough = registry.get("borough").unwrap();
        assert_eq!(borough.storage_type, StorageType::Text);
        assert_eq!(borough.length, 2);
        assert_eq!(borough.precision, 0);

        let bbl = registry.get("bbl").unwrap();
        assert_eq!(bbl.storage_type, StorageType::Double);
        assert_eq!(bbl.precision, 10);
        assert!(!bbl.nullable);
        assert_eq!(registry.source(), "sample");
    }

    #[test]
    fn test_inapplicable_slots_are_cleared() {
        let registry = SchemaRegistry::from_json_str(SAMPLE, "sample").unwrap();
        let lotarea = registry.get("lotarea").unwrap();
        assert_eq!(lotarea.precision, 10);
        assert_eq!(lotarea.scale, 0);
        assert_eq!(lotarea.length, 0);
    }

    #[test]
    fn test_unknown_storage_type() {
        let err = SchemaRegistry::from_json_str(
            r#"{"zip": ["ZipCode", "BLOB", 0, 0, 0, "", true]}"#,
            "bad",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PlutoError::Schema(SchemaError::UnknownStorageType { ref field, ref declared })
                if field == "zip" && declared == "BLOB"
        ));
    }

    #[test]
    fn test_wrong_arity_is_load_error() {
        let err = SchemaRegistry::from_json_str(r#"{"zip": ["ZipCode", "TEXT"]}"#, "bad")
            .unwrap_err();
        assert!(matches!(err, PlutoError::Schema(SchemaError::Load { .. })));
        assert!(err.to_string().contains("expected 7 entries"));
    }

    #[test]
    fn test_not_an_object_is_load_error() {
        let err = SchemaRegistry::from_json_str("[1, 2]", "bad").unwrap_err();
        assert!(matches!(err, PlutoError::Schema(SchemaError::Load { .. })));
    }

    #[test]
    fn test_duplicate_display_name() {
        let err = SchemaRegistry::from_json_str(
            r#"{"a": ["Same", "TEXT", 0, 0, 5, "", true],
                "b": ["SAME", "TEXT", 0, 0, 5, "", true]}"#,
            "dup",
        )
        .unwrap_err();
        assert!(matches!(err, PlutoError::Schema(SchemaError::DuplicateField { .. })));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = SchemaSource::File(PathBuf::from("/nonexistent/schema.json"))
            .load()
            .unwrap_err();
        assert!(matches!(err, PlutoError::Schema(SchemaError::Load { .. })));
    }

    #[test]
    fn test_embedded_schema_loads() {
        let registry = SchemaSource::Embedded.load().unwrap();
        assert!(registry.len() > 50);
        assert_eq!(registry.get("bbl").unwrap().storage_type, StorageType::Double);
        assert_eq!(registry.get("plutomapid").unwrap().name, "PLUTOMapID");
        assert!(!registry.contains("geom"));
    }

    #[test]
    fn test_storage_type_keywords() {
        assert_eq!("short".parse::<StorageType>(), Ok(StorageType::Integer16));
        assert_eq!("Integer".parse::<StorageType>(), Ok(StorageType::Integer32));
        assert_eq!(StorageType::Integer32.to_string(), "LONG");
        assert!("FLOAT".parse::<StorageType>().is_err());
    }

    #[test]
    fn test_text_twin() {
        let spec = FieldSpec::new("bbl", "BBL", StorageType::Double)
            .with_precision(10)
            .with_nullable(false);
        let text = spec.as_text();
        assert_eq!(text.storage_type, StorageType::Text);
        assert_eq!(text.name, "BBL");
        assert_eq!(text.length, DEFAULT_TEXT_LENGTH);
        assert!(text.nullable);
    }

    #[test]
    fn test_arrow_field_metadata() {
        let field = FieldSpec::new("bbl", "BBL", StorageType::Double)
            .with_precision(10)
            .with_alias("Borough Block Lot")
            .arrow_field();
        assert_eq!(field.name(), "BBL");
        assert_eq!(field.data_type(), &DataType::Float64);
        assert_eq!(field.metadata().get("precision").unwrap(), "10");
        assert_eq!(field.metadata().get("alias").unwrap(), "Borough Block Lot");
    }
}
