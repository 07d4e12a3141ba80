//! Formatting helpers for field definitions and column types.

use arrow_schema::DataType;

use crate::schema::{FieldSpec, StorageType};

/// Extension trait for formatting Arrow [`DataType`] into storage labels.
///
/// # Examples
///
/// ```
/// use arrow_schema::DataType;
/// use pluto_core::utils::ArrowDataTypeExt;
///
/// assert_eq!(DataType::Float64.format(), "Double");
/// assert_eq!(DataType::Utf8.format(), "Text");
/// ```
pub trait ArrowDataTypeExt {
    /// Format the data type into a human-readable string.
    fn format(&self) -> String;
}

impl ArrowDataTypeExt for DataType {
    fn format(&self) -> String {
        match self {
            DataType::Utf8 | DataType::LargeUtf8 => "Text".to_string(),
            DataType::Int16 => "Short".to_string(),
            DataType::Int32 => "Long".to_string(),
            DataType::Int64 => "Int64".to_string(),
            DataType::UInt64 => "RowId".to_string(),
            DataType::Float64 => "Double".to_string(),
            DataType::Null => "Null".to_string(),
            _ => format!("{self:?}"),
        }
    }
}

/// Extension trait describing a [`FieldSpec`]'s storage in one token,
/// e.g. `TEXT(1)` or `DOUBLE(10,0)`.
pub trait FieldSpecExt {
    /// Storage keyword with its size qualifiers.
    fn storage_label(&self) -> String;

    /// `NULLABLE` or `NON_NULLABLE`.
    fn nullability(&self) -> &'static str;
}

impl FieldSpecExt for FieldSpec {
    fn storage_label(&self) -> String {
        let keyword = self.storage_type.keyword();
        match self.storage_type {
            StorageType::Text => format!("{keyword}({})", self.length),
            StorageType::Double if self.precision > 0 => {
                format!("{keyword}({},{})", self.precision, self.scale)
            },
            StorageType::Integer16 | StorageType::Integer32 if self.precision > 0 => {
                format!("{keyword}({})", self.precision)
            },
            _ => keyword.to_string(),
        }
    }

    fn nullability(&self) -> &'static str {
        if self.nullable {
            "NULLABLE"
        } else {
            "NON_NULLABLE"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_storage_types() {
        assert_eq!(DataType::Int16.format(), "Short");
        assert_eq!(DataType::Int32.format(), "Long");
        assert_eq!(DataType::Float64.format(), "Double");
        assert_eq!(DataType::UInt64.format(), "RowId");
    }

    #[test]
    fn test_format_other() {
        assert_eq!(DataType::Boolean.format(), "Boolean");
    }

    #[test]
    fn test_storage_label() {
        let text = FieldSpec::text("PLUTOMapID").with_length(1);
        assert_eq!(text.storage_label(), "TEXT(1)");

        let bbl = FieldSpec::new("bbl", "BBL", StorageType::Double)
            .with_precision(10)
            .with_scale(0);
        assert_eq!(bbl.storage_label(), "DOUBLE(10,0)");

        let lots = FieldSpec::new("numbldgs", "NumBldgs", StorageType::Integer16);
        assert_eq!(lots.storage_label(), "SHORT");
        assert_eq!(lots.nullability(), "NULLABLE");
    }
}
