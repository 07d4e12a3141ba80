//! Storage and geometry backend capability interface.
//!
//! Every pipeline stage talks to its backend through [`GeometryStore`]. Each call
//! names the [`Workspace`] it operates in; there is no "current workspace".
//!
//! Implementations provide the primitive operations (create, append, list,
//! delete, rename, read, write, index). Join, erase, selection and reprojection
//! are provided on top of those primitives so every backend shares the same
//! semantics.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::erase::erase_features;
use crate::error::{BackendError, Result};
use crate::features::{FeatureCollection, SpatialReference};
use crate::join::join_by_key;
use crate::schema::FieldSpec;
use crate::table::{AppendMode, TypedTable};

pub mod memory;

pub use memory::MemoryStore;

/// Handle to a workspace (a geodatabase-like container of tables and feature
/// classes), identified by its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Creates a handle; the workspace itself may not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Workspace location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last path component, e.g. `MapPLUTO_WaterArea.gdb`.
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Handle for a workspace next to this one.
    #[must_use]
    pub fn sibling(&self, name: &str) -> Self {
        match self.path.parent() {
            Some(parent) => Self::new(parent.join(name)),
            None => Self::new(name),
        }
    }

    /// Handle for a workspace nested under this one.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        Self::new(self.path.join(name))
    }
}

impl fmt::Display for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Kind of object held in a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Attribute-only table
    Table,
    /// Geometry plus attributes
    FeatureClass,
}

impl ObjectKind {
    /// Human readable label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Table => "table",
            ObjectKind::FeatureClass => "feature class",
        }
    }
}

/// Attribute index declared on an object.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IndexSpec {
    /// Index name
    pub name: String,
    /// Indexed field
    pub field: String,
    /// Whether values must be unique
    pub unique: bool,
}

/// A storage and geometry backend.
///
/// The trait is object safe; the pipeline holds a `&mut dyn GeometryStore`.
pub trait GeometryStore {
    /// Create a workspace; a no-op if it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] if the backend cannot create it.
    fn create_workspace(&mut self, workspace: &Workspace) -> Result<()>;

    /// Returns `true` if the workspace exists.
    fn workspace_exists(&self, workspace: &Workspace) -> bool;

    /// Workspaces directly under `parent`, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] if `parent` cannot be listed.
    fn list_workspaces(&self, parent: &Path) -> Result<Vec<Workspace>>;

    /// Copy a whole workspace.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WorkspaceNotFound`] if `from` is missing or
    /// [`BackendError::AlreadyExists`] if `to` exists.
    fn copy_workspace(&mut self, from: &Workspace, to: &Workspace) -> Result<()>;

    /// Delete a workspace and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WorkspaceNotFound`] if it does not exist.
    fn delete_workspace(&mut self, workspace: &Workspace) -> Result<()>;

    /// Create a plain directory (and its parents) if absent.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] on failure.
    fn ensure_directory(&mut self, path: &Path) -> Result<()>;

    /// Table names in the workspace, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WorkspaceNotFound`] if it does not exist.
    fn list_tables(&self, workspace: &Workspace) -> Result<Vec<String>>;

    /// Feature class names in the workspace, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WorkspaceNotFound`] if it does not exist.
    fn list_feature_classes(&self, workspace: &Workspace) -> Result<Vec<String>>;

    /// Kind of the named object, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WorkspaceNotFound`] if the workspace does not exist.
    fn exists(&self, workspace: &Workspace, name: &str) -> Result<Option<ObjectKind>>;

    /// Delete a table or feature class.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if it does not exist.
    fn delete(&mut self, workspace: &Workspace, name: &str) -> Result<()>;

    /// Rename a table or feature class.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] or [`BackendError::AlreadyExists`].
    fn rename(&mut self, workspace: &Workspace, from: &str, to: &str) -> Result<()>;

    /// Create an empty table with the given columns.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::AlreadyExists`] if the name is taken.
    fn create_table(&mut self, workspace: &Workspace, name: &str, fields: &[FieldSpec]) -> Result<()>;

    /// Add an all-null column to a table or feature class.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::FieldExists`] if the column is already present.
    fn add_field(&mut self, workspace: &Workspace, name: &str, field: &FieldSpec) -> Result<()>;

    /// Append rows into an existing table, typed per the destination.
    ///
    /// All-or-nothing: if any value fails, the destination is unchanged.
    /// Returns the number of rows appended.
    ///
    /// # Errors
    ///
    /// See [`coerce_rows`](crate::table::coerce_rows).
    fn append_rows(
        &mut self,
        workspace: &Workspace,
        destination: &str,
        rows: &TypedTable,
        mode: AppendMode,
    ) -> Result<usize>;

    /// Read a table.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] or [`BackendError::WrongKind`].
    fn read_table(&self, workspace: &Workspace, name: &str) -> Result<TypedTable>;

    /// Create or replace a table.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WrongKind`] if a feature class holds the name.
    fn write_table(&mut self, workspace: &Workspace, name: &str, table: &TypedTable) -> Result<()>;

    /// Read a feature class.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] or [`BackendError::WrongKind`].
    fn read_features(&self, workspace: &Workspace, name: &str) -> Result<FeatureCollection>;

    /// Create or replace a feature class. Existing indexes are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WrongKind`] if a table holds the name.
    fn write_features(
        &mut self,
        workspace: &Workspace,
        name: &str,
        features: &FeatureCollection,
    ) -> Result<()>;

    /// Import a foreign geometry file as a feature class; returns the feature count.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Format`] if the file cannot be decoded.
    fn import_features(&mut self, source: &Path, workspace: &Workspace, name: &str) -> Result<usize>;

    /// Build an attribute index.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::FieldNotFound`], or [`BackendError::DuplicateKey`]
    /// when `unique` is requested and a value repeats.
    fn add_index(
        &mut self,
        workspace: &Workspace,
        name: &str,
        field: &str,
        index_name: &str,
        unique: bool,
    ) -> Result<()>;

    /// Indexes declared on an object.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if the object does not exist.
    fn indexes(&self, workspace: &Workspace, name: &str) -> Result<Vec<IndexSpec>>;

    /// Plain files directly inside `directory`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] if the directory cannot be listed.
    fn list_files(&self, directory: &Path) -> Result<Vec<PathBuf>>;

    /// Read a small text file, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] if it exists but cannot be read.
    fn read_text(&self, path: &Path) -> Result<Option<String>>;

    /// Write a small text file, replacing it.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Io`] on failure.
    fn write_text(&mut self, path: &Path, contents: &str) -> Result<()>;

    /// Messages describing the operations performed so far, most recent last.
    fn diagnostics(&self) -> Vec<String>;

    /// Append one table into another.
    ///
    /// # Errors
    ///
    /// See [`GeometryStore::append_rows`].
    fn append(
        &mut self,
        workspace: &Workspace,
        source: &str,
        destination: &str,
        mode: AppendMode,
    ) -> Result<usize> {
        let rows = self.read_table(workspace, source)?;
        debug!(
            "Appending {} rows from {} into {} ({:?})",
            rows.num_rows(),
            source,
            destination,
            mode
        );
        self.append_rows(workspace, destination, &rows, mode)
    }

    /// Copy the rows of `source` whose `field` is one of `values` into a new
    /// table `destination`; returns the number of rows selected.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::FieldNotFound`] if `field` is missing.
    fn select_rows(
        &mut self,
        source_workspace: &Workspace,
        source: &str,
        workspace: &Workspace,
        destination: &str,
        field: &str,
        values: &[String],
    ) -> Result<usize> {
        let table = self.read_table(source_workspace, source)?;
        let positions = table.positions_matching(source, field, values)?;
        let selected = table.take(&positions)?;
        self.write_table(workspace, destination, &selected)?;
        Ok(selected.num_rows())
    }

    /// Inner join of a table onto a feature class by key.
    ///
    /// # Errors
    ///
    /// See [`join_by_key`].
    fn spatial_join(
        &self,
        workspace: &Workspace,
        layer: &str,
        layer_key: &str,
        table_workspace: &Workspace,
        table: &str,
        table_key: &str,
    ) -> Result<FeatureCollection> {
        let features = self.read_features(workspace, layer)?;
        let rows = self.read_table(table_workspace, table)?;
        join_by_key(&features, layer, layer_key, &rows, table, table_key)
    }

    /// Subtract the `eraser` polygons from every `subject` feature.
    ///
    /// # Errors
    ///
    /// See [`erase_features`].
    fn erase(
        &self,
        workspace: &Workspace,
        subject: &str,
        eraser_workspace: &Workspace,
        eraser: &str,
    ) -> Result<FeatureCollection> {
        let features = self.read_features(workspace, subject)?;
        let shoreline = self.read_features(eraser_workspace, eraser)?;
        erase_features(&features, &shoreline)
    }

    /// Reproject a stored feature class in place.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Projection`] if either reference is unusable.
    fn reproject(&mut self, workspace: &Workspace, name: &str, target: &SpatialReference) -> Result<()> {
        let features = self.read_features(workspace, name)?;
        let projected = features.reproject(target)?;
        self.write_features(workspace, name, &projected)
    }

    /// Declared spatial reference of a feature class.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] or [`BackendError::WrongKind`].
    fn spatial_reference(&self, workspace: &Workspace, name: &str) -> Result<Option<SpatialReference>> {
        Ok(self.read_features(workspace, name)?.spatial_reference().cloned())
    }
}

/// Error for an object of the wrong kind.
pub(crate) fn wrong_kind(name: &str, expected: ObjectKind) -> BackendError {
    BackendError::WrongKind {
        name: name.to_string(),
        expected: expected.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_names() {
        let ws = Workspace::new("/data/fgdb/MapPLUTO_WaterArea.gdb");
        assert_eq!(ws.name(), "MapPLUTO_WaterArea.gdb");
        assert_eq!(
            ws.sibling("MapPLUTO_ShorelineClip.gdb").path(),
            Path::new("/data/fgdb/MapPLUTO_ShorelineClip.gdb")
        );
        assert_eq!(ws.child("DCP").path(), Path::new("/data/fgdb/MapPLUTO_WaterArea.gdb/DCP"));
    }

    #[test]
    fn test_object_kind_labels() {
        assert_eq!(ObjectKind::Table.as_str(), "table");
        assert_eq!(ObjectKind::FeatureClass.as_str(), "feature class");
    }
}
