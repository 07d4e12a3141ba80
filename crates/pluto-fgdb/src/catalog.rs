//! `catalog.json`: the object listing of a folder workspace.

use std::fs;
use std::path::{Path, PathBuf};

use pluto_core::error::{BackendError, Result, backend_io};
use pluto_core::features::SpatialReference;
use pluto_core::schema::FieldSpec;
use pluto_core::store::{IndexSpec, ObjectKind};
use serde::{Deserialize, Serialize};

/// File name of the catalog inside a workspace directory.
pub const CATALOG_FILE: &str = "catalog.json";

/// Kind of a catalogued object, as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// CSV table
    Table,
    /// GeoJSON feature class
    FeatureClass,
}

impl EntryKind {
    /// File extension of the object's data file.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            EntryKind::Table => "csv",
            EntryKind::FeatureClass => "geojson",
        }
    }
}

impl From<EntryKind> for ObjectKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Table => ObjectKind::Table,
            EntryKind::FeatureClass => ObjectKind::FeatureClass,
        }
    }
}

impl From<ObjectKind> for EntryKind {
    fn from(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Table => EntryKind::Table,
            ObjectKind::FeatureClass => EntryKind::FeatureClass,
        }
    }
}

/// One table or feature class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Object name, as created
    pub name: String,
    /// Table or feature class
    pub kind: EntryKind,
    /// Column declarations in storage order
    pub fields: Vec<FieldSpec>,
    /// Declared reference of a feature class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_reference: Option<SpatialReference>,
    /// Attribute indexes
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl CatalogEntry {
    /// Data file of this entry inside `directory`.
    #[must_use]
    pub fn data_file(&self, directory: &Path) -> PathBuf {
        directory.join(format!("{}.{}", self.name, self.kind.extension()))
    }
}

/// Every object of a workspace, sorted by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Catalogued objects
    pub objects: Vec<CatalogEntry>,
}

impl Catalog {
    /// Read the catalog of the workspace at `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WorkspaceNotFound`] if there is no catalog, or a
    /// format error if it cannot be decoded.
    pub fn load(directory: &Path) -> Result<Self> {
        let path = directory.join(CATALOG_FILE);
        if !path.is_file() {
            return Err(BackendError::WorkspaceNotFound {
                path: directory.to_path_buf(),
            }
            .into());
        }
        let text = fs::read_to_string(&path).map_err(|e| backend_io("read catalog", &path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            BackendError::Format {
                format: "catalog".to_string(),
                path: path.clone(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Write the catalog into `directory`.
    ///
    /// # Errors
    ///
    /// Returns a backend I/O error on failure.
    pub fn save(&mut self, directory: &Path) -> Result<()> {
        self.objects.sort_by(|a, b| a.name.cmp(&b.name));
        let path = directory.join(CATALOG_FILE);
        let text = serde_json::to_string_pretty(self).map_err(|e| BackendError::Format {
            format: "catalog".to_string(),
            path: path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&path, text).map_err(|e| backend_io("write catalog", &path, e))
    }

    /// Entry whose name matches case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.objects.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Mutable entry whose name matches case-insensitively.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut CatalogEntry> {
        self.objects
            .iter_mut()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Remove and return the entry whose name matches case-insensitively.
    pub fn remove(&mut self, name: &str) -> Option<CatalogEntry> {
        let idx = self
            .objects
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))?;
        Some(self.objects.remove(idx))
    }

    /// Names of every entry of the given kind, sorted.
    #[must_use]
    pub fn names(&self, kind: ObjectKind) -> Vec<String> {
        let kind = EntryKind::from(kind);
        let mut names: Vec<String> = self
            .objects
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.name.clone())
            .collect();
        names.sort();
        names
    }
}
