//! Output curation: copy the working workspaces into the versioned output
//! tree, then keep, rename or delete their contents per the retention registry.
//!
//! A publish writes `publish_<label>_<date>.json` into the output directory.
//! Publishing the same variant and date again is refused unless forced, in
//! which case the previously published workspaces are removed and rebuilt from
//! the working workspaces.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{IoErrorExt, PublishError, Result};
use crate::manifest::{
    ArtifactEntry, Disposition, PublishManifest, WorkspaceManifest, WorkspaceRole, find_rule,
};
use crate::store::{GeometryStore, ObjectKind, Workspace};
use crate::types::RunParameters;

/// `<x_path>/<release>/output/<originals|corrections>`.
#[must_use]
pub fn output_directory(x_path: &Path, params: &RunParameters) -> PathBuf {
    x_path
        .join(&params.release)
        .join("output")
        .join(params.variant.output_dir())
}

/// Publish the two working workspaces into `output_dir`.
///
/// # Errors
///
/// - [`PublishError::AlreadyPublished`] if this variant and date were already
///   published and `params.force` is not set
/// - a backend error if a copy, rename or delete fails
pub fn publish(
    store: &mut dyn GeometryStore,
    params: &RunParameters,
    water_area: &Workspace,
    shoreline_clip: &Workspace,
    output_dir: &Path,
) -> Result<PublishManifest> {
    store.ensure_directory(output_dir)?;

    let manifest_path = output_dir.join(params.publish_manifest());
    let targets = [
        (
            WorkspaceRole::WaterArea,
            water_area,
            Workspace::new(output_dir.join(params.published_water_workspace())),
        ),
        (
            WorkspaceRole::ShorelineClip,
            shoreline_clip,
            Workspace::new(output_dir.join(params.published_clip_workspace())),
        ),
    ];

    let manifest_exists = store.read_text(&manifest_path)?.is_some();
    let stale: Vec<&Workspace> = targets
        .iter()
        .map(|(_, _, published)| published)
        .filter(|published| store.workspace_exists(published))
        .collect();

    if manifest_exists || !stale.is_empty() {
        if !params.force {
            let manifest = if manifest_exists {
                manifest_path
            } else {
                stale[0].path().to_path_buf()
            };
            return Err(PublishError::AlreadyPublished { manifest }.into());
        }
        let stale: Vec<Workspace> = stale.into_iter().cloned().collect();
        for published in &stale {
            warn!("Removing previously published {}", published);
            store.delete_workspace(published)?;
        }
    }

    let mut workspaces = Vec::with_capacity(targets.len());
    for (role, working, published) in &targets {
        info!("Publishing {} to {}", working, published);
        store.copy_workspace(working, published)?;
        workspaces.push(curate(store, params, *role, published)?);
    }

    let manifest = PublishManifest {
        release: params.release.clone(),
        variant: params.variant.label().to_string(),
        date: params.date.to_string(),
        workspaces,
    };
    let json = serde_json::to_string_pretty(&manifest).with_write_context("JSON", &manifest_path)?;
    store.write_text(&manifest_path, &json)?;
    info!("Wrote publish manifest {}", manifest_path.display());
    Ok(manifest)
}

/// Apply the retention registry to one published workspace.
///
/// # Errors
///
/// Returns a backend error if an artifact cannot be renamed or deleted.
pub fn curate(
    store: &mut dyn GeometryStore,
    params: &RunParameters,
    role: WorkspaceRole,
    workspace: &Workspace,
) -> Result<WorkspaceManifest> {
    let date = params.date.to_string();
    let suffix = params.variant.published_suffix();

    let mut listing: Vec<(String, ObjectKind)> = store
        .list_feature_classes(workspace)?
        .into_iter()
        .map(|name| (name, ObjectKind::FeatureClass))
        .collect();
    listing.extend(
        store
            .list_tables(workspace)?
            .into_iter()
            .map(|name| (name, ObjectKind::Table)),
    );

    let mut artifacts = Vec::with_capacity(listing.len());
    for (name, kind) in listing {
        let rule = find_rule(&name, &date, role).filter(|r| r.kind == kind);
        let entry = match rule {
            None => {
                debug!("Deleting {} from {}", name, workspace);
                store.delete(workspace, &name)?;
                ArtifactEntry {
                    name,
                    kind: kind.as_str().to_string(),
                    disposition: Disposition::Delete,
                    published_name: None,
                }
            },
            Some(rule) => {
                let published = rule.published_name(suffix);
                let disposition = if published == name {
                    Disposition::Retain
                } else {
                    debug!("Renaming {} to {} in {}", name, published, workspace);
                    store.rename(workspace, &name, &published)?;
                    Disposition::Rename
                };
                ArtifactEntry {
                    name,
                    kind: kind.as_str().to_string(),
                    disposition,
                    published_name: Some(published),
                }
            },
        };
        artifacts.push(entry);
    }

    info!(
        "Curated {} ({}): {} kept, {} deleted",
        workspace,
        role.as_str(),
        artifacts
            .iter()
            .filter(|a| a.disposition != Disposition::Delete)
            .count(),
        artifacts
            .iter()
            .filter(|a| a.disposition == Disposition::Delete)
            .count()
    );
    Ok(WorkspaceManifest {
        role,
        path: workspace.path().to_path_buf(),
        artifacts,
    })
}
