//! Typed table materialization.
//!
//! Every run is a full rebuild: the working workspaces are cleared (except the
//! join geometry), then the intermediate extract is loaded in two phases,
//! first into an all-text staging table and from there into the typed table,
//! so that the destination schema decides how every value is parsed.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::reconcile::ReconciledFields;
use crate::store::{GeometryStore, Workspace};
use crate::table::{AppendMode, TypedTable};

/// Objects removed and kept by [`refresh_workspace`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Deleted tables and feature classes
    pub deleted: Vec<String>,
    /// Feature classes kept because their name contains the sentinel marker
    pub preserved: Vec<String>,
}

/// Delete every table, and every feature class whose name lacks `sentinel`.
///
/// # Errors
///
/// Returns a backend error if the workspace cannot be listed or an object
/// cannot be deleted.
pub fn refresh_workspace(
    store: &mut dyn GeometryStore,
    workspace: &Workspace,
    sentinel: &str,
) -> Result<RefreshSummary> {
    let mut summary = RefreshSummary::default();

    for table in store.list_tables(workspace)? {
        debug!("Deleting {} from {}", table, workspace);
        store.delete(workspace, &table)?;
        summary.deleted.push(table);
    }
    for feature_class in store.list_feature_classes(workspace)? {
        if feature_class.contains(sentinel) {
            warn!(
                "{} is preserved; delete it from {} manually to regenerate it",
                feature_class, workspace
            );
            summary.preserved.push(feature_class);
        } else {
            debug!("Deleting {} from {}", feature_class, workspace);
            store.delete(workspace, &feature_class)?;
            summary.deleted.push(feature_class);
        }
    }

    info!(
        "Refreshed {}: {} deleted, {} preserved",
        workspace,
        summary.deleted.len(),
        summary.preserved.len()
    );
    Ok(summary)
}

/// Row counts of a successful materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeSummary {
    /// Rows loaded into the staging table
    pub staged: usize,
    /// Rows loaded into the typed table
    pub typed: usize,
}

/// Load `rows` into a new staging table and from there into a new typed table.
///
/// `rows` are the intermediate extract's text rows named by display name.
/// Both tables are created from `fields`. If either append fails the typed
/// table is deleted, so no partially typed table is left behind.
///
/// # Errors
///
/// - [`BackendError::AlreadyExists`](crate::error::BackendError::AlreadyExists)
///   if either table already exists
/// - [`SchemaError::Coercion`](crate::error::SchemaError::Coercion) or
///   [`SchemaError::NullViolation`](crate::error::SchemaError::NullViolation)
///   if a value does not fit its declared type or text length
pub fn materialize(
    store: &mut dyn GeometryStore,
    workspace: &Workspace,
    staging_table: &str,
    typed_table: &str,
    rows: &TypedTable,
    fields: &ReconciledFields,
) -> Result<MaterializeSummary> {
    info!("Creating {} with {} text fields", staging_table, fields.len());
    store.create_table(workspace, staging_table, &fields.staging_fields())?;
    info!("Creating {} with {} typed fields", typed_table, fields.len());
    store.create_table(workspace, typed_table, &fields.typed_fields())?;

    let loaded = store
        .append_rows(workspace, staging_table, rows, AppendMode::Coerce)
        .and_then(|staged| {
            info!("Appended {} rows into {}", staged, staging_table);
            store
                .append(workspace, staging_table, typed_table, AppendMode::Coerce)
                .map(|typed| (staged, typed))
        });
    let (staged, typed) = match loaded {
        Ok(counts) => counts,
        Err(err) => {
            warn!("Loading {} failed; deleting it", typed_table);
            if let Err(cleanup) = store.delete(workspace, typed_table) {
                warn!("Could not delete {}: {}", typed_table, cleanup);
            }
            return Err(err);
        },
    };
    info!("Appended {} rows into {}", typed, typed_table);

    Ok(MaterializeSummary { staged, typed })
}

/// Select the rows of `source` whose `field` is one of `codes` into
/// `destination`; returns `None` when `skip_existing` is set and the
/// destination is already present.
///
/// # Errors
///
/// Returns [`BackendError::FieldNotFound`](crate::error::BackendError::FieldNotFound)
/// if `field` is not a column of `source`.
#[allow(clippy::too_many_arguments)]
pub fn select_unmappables(
    store: &mut dyn GeometryStore,
    source_workspace: &Workspace,
    source: &str,
    workspace: &Workspace,
    destination: &str,
    field: &str,
    codes: &[String],
    skip_existing: bool,
) -> Result<Option<usize>> {
    if skip_existing && store.exists(workspace, destination)?.is_some() {
        info!("{} already exists in {}; skipping", destination, workspace);
        return Ok(None);
    }
    let selected = store.select_rows(source_workspace, source, workspace, destination, field, codes)?;
    info!(
        "Selected {} rows with {} in [{}] into {}",
        selected,
        field,
        codes.join(", "),
        destination
    );
    Ok(Some(selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PlutoError, SchemaError};
    use crate::features::FeatureCollection;
    use crate::reconcile::{UnregisteredPolicy, reconcile};
    use crate::schema::{FieldSpec, SchemaRegistry, StorageType};
    use crate::store::{MemoryStore, ObjectKind};

    fn fields() -> ReconciledFields {
        let registry = SchemaRegistry::from_fields(
            "test",
            vec![
                FieldSpec::new("bbl", "BBL", StorageType::Double),
                FieldSpec::new("numbldgs", "NumBldgs", StorageType::Integer16),
                FieldSpec::new("plutomapid", "PLUTOMapID", StorageType::Text).with_length(1),
            ],
        )
        .unwrap();
        let header = ["bbl", "numbldgs", "plutomapid"].map(String::from);
        reconcile(&header, &registry, &[], UnregisteredPolicy::Reject).unwrap()
    }

    fn rows(values: &[[&str; 3]]) -> TypedTable {
        TypedTable::from_text_rows(
            vec![
                FieldSpec::text("BBL"),
                FieldSpec::text("NumBldgs"),
                FieldSpec::text("PLUTOMapID"),
            ],
            values.iter().map(|r| r.iter().map(|v| Some(*v)).collect()),
        )
        .unwrap()
    }

    fn workspace(store: &mut MemoryStore) -> Workspace {
        let ws = Workspace::new("/fgdb/MapPLUTO_WaterArea.gdb");
        store.create_workspace(&ws).unwrap();
        ws
    }

    #[test]
    fn test_refresh_keeps_sentinel_feature_classes() {
        let mut store = MemoryStore::new();
        let ws = workspace(&mut store);
        let empty = FeatureCollection::new(TypedTable::empty(Vec::new()), Vec::new(), None).unwrap();
        store.write_features(&ws, "Join_File", &empty).unwrap();
        store.write_features(&ws, "MapPLUTO_01_01_2019_Water_Included", &empty).unwrap();
        store.create_table(&ws, "MapPLUTO_final", &[]).unwrap();

        let summary = refresh_workspace(&mut store, &ws, "Join").unwrap();
        assert_eq!(summary.preserved, vec!["Join_File".to_string()]);
        assert_eq!(summary.deleted.len(), 2);
        assert_eq!(store.list_feature_classes(&ws).unwrap(), vec!["Join_File".to_string()]);
        assert!(store.list_tables(&ws).unwrap().is_empty());
    }

    #[test]
    fn test_two_phase_load_types_values() {
        let mut store = MemoryStore::new();
        let ws = workspace(&mut store);
        let summary = materialize(
            &mut store,
            &ws,
            "MapPLUTO_intermediary",
            "MapPLUTO_final",
            &rows(&[["1001", "2", "1"], ["1002", "", "2"]]),
            &fields(),
        )
        .unwrap();
        assert_eq!(summary, MaterializeSummary { staged: 2, typed: 2 });

        let typed = store.read_table(&ws, "MapPLUTO_final").unwrap();
        assert_eq!(typed.fields()[1].storage_type, StorageType::Integer16);
        assert_eq!(typed.doubles("MapPLUTO_final", "BBL").unwrap(), vec![Some(1001.0), Some(1002.0)]);

        let staging = store.read_table(&ws, "MapPLUTO_intermediary").unwrap();
        assert!(staging.fields().iter().all(|f| f.storage_type == StorageType::Text));
    }

    #[test]
    fn test_failed_typed_append_leaves_no_typed_table() {
        let mut store = MemoryStore::new();
        let ws = workspace(&mut store);
        let err = materialize(
            &mut store,
            &ws,
            "MapPLUTO_intermediary",
            "MapPLUTO_final",
            &rows(&[["1001", "2", "1"], ["1002", "many", "2"]]),
            &fields(),
        )
        .unwrap_err();
        assert!(matches!(err, PlutoError::Schema(SchemaError::Coercion { .. })));
        assert_eq!(store.exists(&ws, "MapPLUTO_final").unwrap(), None);
        assert_eq!(
            store.exists(&ws, "MapPLUTO_intermediary").unwrap(),
            Some(ObjectKind::Table)
        );
    }

    #[test]
    fn test_overlong_text_leaves_no_typed_table() {
        let mut store = MemoryStore::new();
        let ws = workspace(&mut store);
        let err = materialize(
            &mut store,
            &ws,
            "MapPLUTO_intermediary",
            "MapPLUTO_final",
            &rows(&[["1001", "2", "1"], ["1002", "1", "22222"]]),
            &fields(),
        )
        .unwrap_err();
        match err {
            PlutoError::Schema(SchemaError::Coercion { field, position, .. }) => {
                assert_eq!(field, "PLUTOMapID");
                assert_eq!(position.record, Some(2));
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.exists(&ws, "MapPLUTO_final").unwrap(), None);
    }

    #[test]
    fn test_select_unmappables() {
        let mut store = MemoryStore::new();
        let ws = workspace(&mut store);
        materialize(
            &mut store,
            &ws,
            "MapPLUTO_intermediary",
            "MapPLUTO_final",
            &rows(&[["1001", "2", "1"], ["1002", "1", "2"], ["1003", "1", "4"]]),
            &fields(),
        )
        .unwrap();

        let codes = ["2".to_string(), "4".to_string()];
        let selected = select_unmappables(
            &mut store, &ws, "MapPLUTO_final", &ws, "UNMAPPABLES", "PLUTOMapID", &codes, false,
        )
        .unwrap();
        assert_eq!(selected, Some(2));

        let skipped = select_unmappables(
            &mut store, &ws, "MapPLUTO_final", &ws, "UNMAPPABLES", "PLUTOMapID", &codes[..1], true,
        )
        .unwrap();
        assert_eq!(skipped, None);
        assert_eq!(store.read_table(&ws, "UNMAPPABLES").unwrap().num_rows(), 2);
    }
}
