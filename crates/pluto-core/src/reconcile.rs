//! Field reconciliation between the schema registry and a raw extract header.
//!
//! [`reconcile`] walks the raw header in order, drops excluded columns and
//! resolves every remaining column to a [`FieldSpec`]. The result fixes the
//! column order of every downstream store and renders the positional column
//! declaration (`schema.ini`) used when the intermediate extract is re-read.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result, SchemaError};
use crate::schema::{FieldSpec, SchemaRegistry};

/// Columns written ahead of the reconciled fields in the intermediate extract.
///
/// The intermediate extract carries a leading row index, so the first
/// reconciled field is `Col2` in the column declaration.
pub const INDEX_COLUMN_OFFSET: usize = 2;

/// What to do with a raw column that has no schema entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnregisteredPolicy {
    /// Keep the column as TEXT and log a warning
    #[default]
    PassThrough,
    /// Fail with [`SchemaError::UnknownFieldType`]
    Reject,
}

impl FromStr for UnregisteredPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "pass-through" | "passthrough" => Ok(UnregisteredPolicy::PassThrough),
            "reject" => Ok(UnregisteredPolicy::Reject),
            other => Err(ConfigError::InvalidOption {
                option: "unregistered_fields".to_string(),
                message: format!("'{other}' is not one of pass-through, reject"),
            }),
        }
    }
}

/// A raw column that survived reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledField {
    /// Column header in the raw extract
    pub logical_name: String,
    /// Index of the column in the raw header
    pub source_index: usize,
    /// Declaration used for the typed table
    pub spec: FieldSpec,
    /// Whether the schema registry declares the field
    pub registered: bool,
}

/// Ordered result of reconciling a raw header against a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciledFields {
    fields: Vec<ReconciledField>,
    excluded: Vec<String>,
}

impl ReconciledFields {
    /// Fields in raw header order.
    #[must_use]
    pub fn fields(&self) -> &[ReconciledField] {
        &self.fields
    }

    /// Raw columns dropped by the exclusion set, in header order.
    #[must_use]
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Logical names in order.
    #[must_use]
    pub fn logical_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.logical_name.as_str()).collect()
    }

    /// Logical names of retained columns without a schema entry.
    #[must_use]
    pub fn unregistered(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| !f.registered)
            .map(|f| f.logical_name.as_str())
            .collect()
    }

    /// Number of reconciled fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if every column was excluded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 0-based position of a field among the reconciled fields.
    #[must_use]
    pub fn position(&self, logical_name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.logical_name == logical_name)
    }

    /// Declarations of the typed table, in order.
    #[must_use]
    pub fn typed_fields(&self) -> Vec<FieldSpec> {
        self.fields.iter().map(|f| f.spec.clone()).collect()
    }

    /// Declarations of the all-text staging table, in order.
    #[must_use]
    pub fn staging_fields(&self) -> Vec<FieldSpec> {
        self.fields.iter().map(|f| f.spec.as_text()).collect()
    }

    /// Render the positional column declaration for the intermediate extract.
    ///
    /// ```text
    /// [pluto_19v2_09_30_2019.csv]
    /// Col2=borough TEXT
    /// Col3=block LONG
    /// ```
    #[must_use]
    pub fn render_schema_ini(&self, csv_name: &str) -> String {
        let mut out = format!("[{csv_name}]\n");
        for (position, field) in self.fields.iter().enumerate() {
            let _ = writeln!(
                out,
                "Col{}={} {}",
                position + INDEX_COLUMN_OFFSET,
                field.logical_name,
                field.spec.storage_type.keyword()
            );
        }
        out
    }
}

/// Reconcile a raw header against the registry.
///
/// Columns are kept in header order unless listed in `exclusions`. Every
/// registry field must be present in the header or excluded. Columns without a
/// registry entry are handled per `policy`.
///
/// # Errors
///
/// - [`SchemaError::DuplicateColumn`] if the header repeats a column
/// - [`SchemaError::MissingField`] if a registry field is absent and not excluded
/// - [`SchemaError::UnknownFieldType`] for an unregistered column under
///   [`UnregisteredPolicy::Reject`]
pub fn reconcile(
    raw_header: &[String],
    registry: &SchemaRegistry,
    exclusions: &[String],
    policy: UnregisteredPolicy,
) -> Result<ReconciledFields> {
    let exclusions: HashSet<&str> = exclusions.iter().map(String::as_str).collect();
    let mut seen = HashSet::with_capacity(raw_header.len());
    let mut reconciled = ReconciledFields::default();

    for (source_index, column) in raw_header.iter().enumerate() {
        if !seen.insert(column.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                column: column.clone(),
            }
            .into());
        }
        if exclusions.contains(column.as_str()) {
            debug!("Dropping {} from the raw extract", column);
            reconciled.excluded.push(column.clone());
            continue;
        }

        let (spec, registered) = match registry.get(column) {
            Some(spec) => (spec.clone(), true),
            None => match policy {
                UnregisteredPolicy::PassThrough => {
                    warn!("Field '{}' has no schema entry; keeping it as TEXT", column);
                    (FieldSpec::text(column.as_str()), false)
                },
                UnregisteredPolicy::Reject => {
                    return Err(SchemaError::UnknownFieldType {
                        field: column.clone(),
                    }
                    .into());
                },
            },
        };
        reconciled.fields.push(ReconciledField {
            logical_name: column.clone(),
            source_index,
            spec,
            registered,
        });
    }

    if let Some(missing) = registry
        .fields()
        .iter()
        .find(|f| !seen.contains(f.logical_name.as_str()) && !exclusions.contains(f.logical_name.as_str()))
    {
        return Err(SchemaError::MissingField {
            field: missing.logical_name.clone(),
        }
        .into());
    }

    info!(
        "Reconciled {} fields ({} excluded, {} unregistered)",
        reconciled.len(),
        reconciled.excluded.len(),
        reconciled.unregistered().len()
    );
    Ok(reconciled)
}
