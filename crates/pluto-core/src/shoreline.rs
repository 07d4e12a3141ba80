//! Shoreline source discovery.
//!
//! Tax map exports land in one directory as workspaces whose names embed the
//! export date (`DOF_Export_TaxMap_20190830.gdb`). The newest export's
//! shoreline subdirectory holds the polygon layer the parcels are erased with.

use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{Result, ShorelineError};
use crate::store::{GeometryStore, Workspace};

static EXPORT_DATE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(\d{8})"));

/// A dated export workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportWorkspace {
    /// The export workspace
    pub workspace: Workspace,
    /// Date embedded in its name
    pub date: NaiveDate,
}

/// Date embedded in an export name, if any 8-digit run parses as `YYYYMMDD`.
#[must_use]
pub fn export_date(name: &str) -> Option<NaiveDate> {
    let pattern = EXPORT_DATE.as_ref().ok()?;
    pattern
        .captures_iter(name)
        .filter_map(|c| c.get(1))
        .find_map(|m| NaiveDate::parse_from_str(m.as_str(), "%Y%m%d").ok())
}

/// The export under `root` with the latest embedded date.
///
/// Workspaces whose names carry no parseable date are skipped.
///
/// # Errors
///
/// Returns [`ShorelineError::NoExports`] if no dated workspace exists.
pub fn newest_export(store: &dyn GeometryStore, root: &Path) -> Result<ExportWorkspace> {
    let mut newest: Option<ExportWorkspace> = None;
    for workspace in store.list_workspaces(root)? {
        let Some(date) = export_date(&workspace.name()) else {
            warn!("Skipping {}: no YYYYMMDD date in its name", workspace);
            continue;
        };
        debug!("Found export {} dated {}", workspace, date);
        if newest.as_ref().is_none_or(|n| date > n.date) {
            newest = Some(ExportWorkspace { workspace, date });
        }
    }

    let newest = newest.ok_or_else(|| ShorelineError::NoExports {
        root: root.to_path_buf(),
    })?;
    info!("Newest export is {} ({})", newest.workspace, newest.date);
    Ok(newest)
}

/// First feature class in `<export>/<subdir>` whose name contains `marker`.
///
/// # Errors
///
/// Returns [`ShorelineError::NoShoreline`] if none matches, or a backend error
/// if the subdirectory is not a workspace.
pub fn find_shoreline(
    store: &dyn GeometryStore,
    export: &ExportWorkspace,
    subdir: &str,
    marker: &str,
) -> Result<(Workspace, String)> {
    let workspace = export.workspace.child(subdir);
    let found = store
        .list_feature_classes(&workspace)?
        .into_iter()
        .find(|name| name.contains(marker));
    match found {
        Some(name) => {
            info!("Using shoreline {} in {}", name, workspace);
            Ok((workspace, name))
        },
        None => Err(ShorelineError::NoShoreline {
            workspace: workspace.path().to_path_buf(),
            marker: marker.to_string(),
        }
        .into()),
    }
}
