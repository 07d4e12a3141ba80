//! Attribute join of the typed table onto the parcel geometry.
//!
//! The geometry source carries a parcel key (BBL) that may be stored as text.
//! [`resolve_join_key`] finds a double-precision key field or promotes the
//! textual one into `<key>_Dbl`; [`join_by_key`] then performs an inner join
//! and [`clean_joined_fields`] strips the columns inherited from the geometry
//! source.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{ArrayRef, Float64Array, Int32Array, UInt32Array};
use arrow::compute::take;
use geo::{BooleanOps, MultiPolygon};
use tracing::{debug, info};

use crate::error::{JoinKeyError, Result};
use crate::features::FeatureCollection;
use crate::schema::{FieldSpec, StorageType};
use crate::store::{GeometryStore, Workspace};
use crate::table::TypedTable;

/// Suffix of the promoted double-precision key field.
pub const PROMOTED_SUFFIX: &str = "_Dbl";

/// Key field used on the geometry side of the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKeyField {
    /// A double-precision key field already existed
    Existing(String),
    /// A textual key was cast into a new double field
    Promoted {
        /// The textual source field
        source: String,
        /// The new double field
        field: String,
    },
}

impl JoinKeyField {
    /// Name of the field to join on.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            JoinKeyField::Existing(name) => name,
            JoinKeyField::Promoted { field, .. } => field,
        }
    }
}

/// Make sure the join geometry exists in `workspace`.
///
/// A feature class whose name contains `sentinel` is kept as is. Otherwise the
/// first `.geojson` file in `data_path` whose name contains `source_marker` is
/// imported as `layer`.
///
/// # Errors
///
/// Returns [`JoinKeyError::NotFound`] if neither exists.
pub fn ensure_join_source(
    store: &mut dyn GeometryStore,
    workspace: &Workspace,
    layer: &str,
    sentinel: &str,
    data_path: &Path,
    source_marker: &str,
) -> Result<String> {
    if let Some(existing) = store
        .list_feature_classes(workspace)?
        .into_iter()
        .find(|name| name.contains(sentinel))
    {
        info!("Join source {} present in {}", existing, workspace);
        return Ok(existing);
    }

    let candidate = store.list_files(data_path)?.into_iter().find(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.contains(source_marker) && name.to_ascii_lowercase().ends_with(".geojson")
    });
    let Some(source) = candidate else {
        return Err(JoinKeyError::NotFound {
            key: source_marker.to_string(),
            layer: data_path.display().to_string(),
        }
        .into());
    };

    let count = store.import_features(&source, workspace, layer)?;
    info!(
        "Imported {} features from {} as {}",
        count,
        source.display(),
        layer
    );
    Ok(layer.to_string())
}

/// Find or build the double-precision key field on `layer`.
///
/// Field names are matched by case-insensitive substring, so `BBL`, `bbl` and
/// `BBL_Dbl` all qualify. A double field wins; otherwise the first matching
/// field is cast into `<key>_Dbl`, which is added to the layer.
///
/// # Errors
///
/// - [`JoinKeyError::NotFound`] if no field name contains `key`
/// - [`JoinKeyError::Uncastable`] if a textual key value is not a number
pub fn resolve_join_key(
    store: &mut dyn GeometryStore,
    workspace: &Workspace,
    layer: &str,
    key: &str,
) -> Result<JoinKeyField> {
    let features = store.read_features(workspace, layer)?;
    let needle = key.to_ascii_uppercase();
    let candidates: Vec<&FieldSpec> = features
        .attributes()
        .fields()
        .iter()
        .filter(|f| f.name.to_ascii_uppercase().contains(&needle))
        .collect();

    if let Some(field) = candidates
        .iter()
        .find(|f| f.storage_type == StorageType::Double)
    {
        info!(
            "{} contains {} with {} type; joining on it",
            layer, field.name, field.storage_type
        );
        return Ok(JoinKeyField::Existing(field.name.clone()));
    }

    let Some(source) = candidates.first() else {
        return Err(JoinKeyError::NotFound {
            key: key.to_string(),
            layer: layer.to_string(),
        }
        .into());
    };
    let source = source.name.clone();
    let promoted = format!("{key}{PROMOTED_SUFFIX}");
    info!(
        "{} lacks a double {} field; casting {} into {}",
        layer, key, source, promoted
    );

    let values = cast_key_values(&features, layer, &source)?;
    let spec = FieldSpec::new(promoted.clone(), promoted.clone(), StorageType::Double);
    store.add_field(workspace, layer, &spec)?;

    let features = store.read_features(workspace, layer)?;
    let idx = features
        .attributes()
        .column_index(&promoted)
        .ok_or_else(|| JoinKeyError::NotFound {
            key: promoted.clone(),
            layer: layer.to_string(),
        })?;
    let attributes = features
        .attributes()
        .replace_column(idx, Arc::new(Float64Array::from(values)))?;
    store.write_features(workspace, layer, &features.with_attributes(attributes)?)?;

    Ok(JoinKeyField::Promoted {
        source,
        field: promoted,
    })
}

fn cast_key_values(features: &FeatureCollection, layer: &str, field: &str) -> Result<Vec<Option<f64>>> {
    let attributes = features.attributes();
    let Some(idx) = attributes.column_index(field) else {
        return Err(JoinKeyError::NotFound {
            key: field.to_string(),
            layer: layer.to_string(),
        }
        .into());
    };
    let mut values = Vec::with_capacity(attributes.num_rows());
    for row in 0..attributes.num_rows() {
        let value = match attributes.value_string(idx, row)? {
            None => None,
            Some(text) if text.trim().is_empty() => None,
            Some(text) => Some(text.trim().parse::<f64>().map_err(|_| JoinKeyError::Uncastable {
                layer: layer.to_string(),
                field: field.to_string(),
                value: text.clone(),
            })?),
        };
        values.push(value);
    }
    Ok(values)
}

/// Hashable form of a key; `None` for NaN.
fn key_bits(value: f64) -> Option<u64> {
    if value.is_nan() {
        None
    } else if value == 0.0 {
        Some(0.0_f64.to_bits())
    } else {
        Some(value.to_bits())
    }
}

/// Inner join of `table` onto `features` by numeric key equality.
///
/// Every feature whose key equals a table key receives the first table row with
/// that key; features without a match, and table rows without a feature, are
/// dropped. Result columns are qualified by origin: `<layer>_<field>` for the
/// geometry attributes, `<table>_OBJECTID` for the table row number and
/// `<table>_<field>` for the table columns.
///
/// # Errors
///
/// - [`JoinKeyError::NotFound`] if `layer_key` is not a field of the layer
/// - [`JoinKeyError::MissingTableKey`] if `table_key` is not a column of the table
pub fn join_by_key(
    features: &FeatureCollection,
    layer: &str,
    layer_key: &str,
    table: &TypedTable,
    table_name: &str,
    table_key: &str,
) -> Result<FeatureCollection> {
    if features.attributes().column_index(layer_key).is_none() {
        return Err(JoinKeyError::NotFound {
            key: layer_key.to_string(),
            layer: layer.to_string(),
        }
        .into());
    }
    if table.column_index(table_key).is_none() {
        return Err(JoinKeyError::MissingTableKey {
            table: table_name.to_string(),
            key: table_key.to_string(),
        }
        .into());
    }

    let mut rows_by_key: HashMap<u64, u32> = HashMap::with_capacity(table.num_rows());
    for (row, value) in table.doubles(table_name, table_key)?.into_iter().enumerate() {
        if let Some(bits) = value.and_then(key_bits) {
            rows_by_key.entry(bits).or_insert(row as u32);
        }
    }

    let mut feature_rows = Vec::new();
    let mut table_rows = Vec::new();
    for (feature, value) in features
        .attributes()
        .doubles(layer, layer_key)?
        .into_iter()
        .enumerate()
    {
        if let Some(&row) = value.and_then(key_bits).and_then(|b| rows_by_key.get(&b)) {
            feature_rows.push(feature as u32);
            table_rows.push(row);
        }
    }
    debug!(
        "Join matched {} of {} features against {} rows",
        feature_rows.len(),
        features.len(),
        table.num_rows()
    );

    let feature_indices = UInt32Array::from(feature_rows.clone());
    let table_indices = UInt32Array::from(table_rows.clone());
    let mut fields = Vec::new();
    let mut columns: Vec<ArrayRef> = Vec::new();

    let geometry_attributes = features.attributes();
    for (spec, column) in geometry_attributes
        .fields()
        .iter()
        .zip(geometry_attributes.batch().columns())
    {
        fields.push(qualified(spec, layer).with_nullable(true));
        columns.push(take(column.as_ref(), &feature_indices, None)?);
    }

    fields.push(
        FieldSpec::new("OBJECTID", format!("{table_name}_OBJECTID"), StorageType::Integer32)
            .with_nullable(false),
    );
    columns.push(Arc::new(Int32Array::from(
        table_rows.iter().map(|r| *r as i32 + 1).collect::<Vec<_>>(),
    )));

    for (spec, column) in table.fields().iter().zip(table.batch().columns()) {
        fields.push(qualified(spec, table_name));
        columns.push(take(column.as_ref(), &table_indices, None)?);
    }

    let attributes = TypedTable::try_new(fields, columns, feature_rows.len())?;
    let geometries = feature_rows
        .iter()
        .map(|&i| features.geometries()[i as usize].clone())
        .collect();
    FeatureCollection::new(attributes, geometries, features.spatial_reference().cloned())
}

fn qualified(spec: &FieldSpec, origin: &str) -> FieldSpec {
    let mut out = spec.clone();
    out.name = format!("{origin}_{}", spec.name);
    if out.alias.is_empty() {
        out.alias = spec.name.clone();
    }
    out
}

/// Drop inherited columns and restore bare table column names.
///
/// Columns whose name contains any of `drop_markers` are removed, as is the
/// `<table>_OBJECTID` row number. The `<table>_` prefix is then stripped from
/// the remaining columns.
///
/// # Errors
///
/// Returns an error if the rebuilt attribute table is invalid.
pub fn clean_joined_fields(
    joined: &FeatureCollection,
    table_name: &str,
    drop_markers: &[String],
) -> Result<FeatureCollection> {
    let object_id = format!("{table_name}_OBJECTID");
    let prefix = format!("{table_name}_");

    let mut attributes = joined.attributes().retain_columns(|f| {
        let drop = f.name.contains(&object_id) || drop_markers.iter().any(|m| f.name.contains(m.as_str()));
        if drop {
            debug!("Deleting joined field {}", f.name);
        }
        !drop
    })?;

    for idx in 0..attributes.fields().len() {
        let name = attributes.fields()[idx].name.clone();
        if let Some(bare) = name.strip_prefix(&prefix) {
            let bare = bare.to_string();
            debug!("Renaming joined field {} to {}", name, bare);
            attributes = attributes.rename_column(idx, &bare)?;
        }
    }

    joined.with_attributes(attributes)
}

/// Merge features sharing a key into one feature per key.
///
/// Geometries are unioned; the attributes of the first feature in each group
/// are kept. Features with a null key form one group.
///
/// # Errors
///
/// Returns [`JoinKeyError::NotFound`] if `key` is not a field of the layer.
pub fn dissolve_by_key(features: &FeatureCollection, layer: &str, key: &str) -> Result<FeatureCollection> {
    if features.attributes().column_index(key).is_none() {
        return Err(JoinKeyError::NotFound {
            key: key.to_string(),
            layer: layer.to_string(),
        }
        .into());
    }

    let mut order: Vec<u32> = Vec::new();
    let mut groups: HashMap<Option<u64>, usize> = HashMap::new();
    let mut merged: Vec<MultiPolygon<f64>> = Vec::new();
    for (idx, value) in features.attributes().doubles(layer, key)?.into_iter().enumerate() {
        let group_key = value.and_then(key_bits);
        let geometry = &features.geometries()[idx];
        match groups.get(&group_key) {
            Some(&slot) => merged[slot] = merged[slot].union(geometry),
            None => {
                groups.insert(group_key, merged.len());
                order.push(idx as u32);
                merged.push(geometry.clone());
            },
        }
    }

    info!(
        "Dissolved {} features into {} by {}",
        features.len(),
        merged.len(),
        key
    );
    let attributes = features.attributes().take(&order)?;
    FeatureCollection::new(attributes, merged, features.spatial_reference().cloned())
}
