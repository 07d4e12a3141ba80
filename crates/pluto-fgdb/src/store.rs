//! [`FolderStore`]: workspaces as plain directories.
//!
//! ```text
//! MapPLUTO_WaterArea.gdb/
//!   catalog.json                          object names, kinds, fields, indexes
//!   MapPLUTO_final.csv                    tables
//!   MapPLUTO_09_30_2019_Water_Included.geojson
//! ```
//!
//! A directory is a workspace when it holds a `catalog.json`. Object names are
//! case-insensitive, like the catalog lookups.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use pluto_core::error::{BackendError, PlutoError, Result, backend_io};
use pluto_core::extract::{CsvWriterOptions, write_csv};
use pluto_core::features::FeatureCollection;
use pluto_core::schema::FieldSpec;
use pluto_core::store::{GeometryStore, IndexSpec, ObjectKind, Workspace};
use pluto_core::table::{AppendMode, TypedTable, coerce_rows};
use tracing::debug;
use walkdir::WalkDir;

use crate::catalog::{CATALOG_FILE, Catalog, CatalogEntry, EntryKind};
use crate::geojson;

/// A [`GeometryStore`] over the local file system.
#[derive(Debug, Default)]
pub struct FolderStore {
    messages: Vec<String>,
}

impl FolderStore {
    /// A store with no diagnostics yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn note(&mut self, message: String) {
        debug!("{}", message);
        self.messages.push(message);
    }

    fn entry(catalog: &Catalog, workspace: &Workspace, name: &str) -> Result<CatalogEntry> {
        catalog
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(workspace, name))
    }

    fn read_table_file(entry: &CatalogEntry, directory: &Path) -> Result<TypedTable> {
        let path = entry.data_file(directory);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(|e| csv_error(&path, &e))?;
        let header: Vec<String> = reader
            .headers()
            .map_err(|e| csv_error(&path, &e))?
            .iter()
            .map(str::to_string)
            .collect();
        let positions: Vec<Option<usize>> = entry
            .fields
            .iter()
            .map(|f| header.iter().position(|h| h.eq_ignore_ascii_case(&f.name)))
            .collect();

        let records = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| csv_error(&path, &e))?;
        let text = TypedTable::from_text_rows(
            entry.fields.clone(),
            records.iter().map(|record| {
                positions
                    .iter()
                    .map(|p| p.and_then(|idx| record.get(idx)))
                    .collect::<Vec<_>>()
            }),
        )?;
        coerce_rows(&text, &entry.name, &entry.fields, AppendMode::Coerce)
    }

    fn write_table_file(path: &Path, table: &TypedTable) -> Result<()> {
        let file = File::create(path).map_err(|e| backend_io("write", path, e))?;
        write_csv(file, table, &CsvWriterOptions::new().with_row_index(false))?;
        Ok(())
    }

    fn read_features_file(entry: &CatalogEntry, directory: &Path) -> Result<FeatureCollection> {
        geojson::read_features(
            &entry.data_file(directory),
            Some(&entry.fields),
            entry.spatial_reference.clone(),
        )
    }

    /// Write data and catalog entry for an object, replacing any previous one.
    fn store(
        &mut self,
        workspace: &Workspace,
        name: &str,
        kind: EntryKind,
        table: Option<&TypedTable>,
        features: Option<&FeatureCollection>,
        indexes: Vec<IndexSpec>,
    ) -> Result<()> {
        let directory = workspace.path();
        let mut catalog = Catalog::load(directory)?;
        if let Some(existing) = catalog.get(name) {
            if existing.kind != kind {
                return Err(wrong_kind(name, kind.into()));
            }
            let stale = existing.data_file(directory);
            if let Some(existing) = catalog.remove(name) {
                debug!("Replacing {} in {}", existing.name, workspace);
            }
            if stale.exists() {
                fs::remove_file(&stale).map_err(|e| backend_io("replace", &stale, e))?;
            }
        }

        let (fields, spatial_reference) = match (table, features) {
            (Some(table), _) => (table.fields().to_vec(), None),
            (None, Some(features)) => (
                features.attributes().fields().to_vec(),
                features.spatial_reference().cloned(),
            ),
            (None, None) => (Vec::new(), None),
        };
        let entry = CatalogEntry {
            name: name.to_string(),
            kind,
            fields,
            spatial_reference,
            indexes,
        };
        let path = entry.data_file(directory);
        match (table, features) {
            (Some(table), _) => Self::write_table_file(&path, table)?,
            (None, Some(features)) => geojson::write_features(&path, features)?,
            (None, None) => {},
        }
        catalog.objects.push(entry);
        catalog.save(directory)
    }
}

fn not_found(workspace: &Workspace, name: &str) -> PlutoError {
    BackendError::NotFound {
        workspace: workspace.path().to_path_buf(),
        name: name.to_string(),
    }
    .into()
}

fn wrong_kind(name: &str, expected: ObjectKind) -> PlutoError {
    BackendError::WrongKind {
        name: name.to_string(),
        expected: expected.as_str(),
    }
    .into()
}

fn csv_error(path: &Path, err: &csv::Error) -> PlutoError {
    BackendError::Format {
        format: "CSV".to_string(),
        path: path.to_path_buf(),
        message: err.to_string(),
    }
    .into()
}

fn is_workspace(path: &Path) -> bool {
    path.join(CATALOG_FILE).is_file()
}

fn contains_workspace(path: &Path) -> bool {
    WalkDir::new(path)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .any(|e| e.file_type().is_file() && e.file_name() == CATALOG_FILE)
}

impl GeometryStore for FolderStore {
    fn create_workspace(&mut self, workspace: &Workspace) -> Result<()> {
        if is_workspace(workspace.path()) {
            return Ok(());
        }
        fs::create_dir_all(workspace.path()).map_err(|e| backend_io("create workspace", workspace.path(), e))?;
        Catalog::default().save(workspace.path())?;
        self.note(format!("Created workspace {workspace}"));
        Ok(())
    }

    fn workspace_exists(&self, workspace: &Workspace) -> bool {
        is_workspace(workspace.path())
    }

    fn list_workspaces(&self, parent: &Path) -> Result<Vec<Workspace>> {
        if !parent.is_dir() {
            return Ok(Vec::new());
        }
        let mut found: Vec<PathBuf> = fs::read_dir(parent)
            .map_err(|e| backend_io("list", parent, e))?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir() && contains_workspace(p))
            .collect();
        found.sort();
        Ok(found.into_iter().map(Workspace::new).collect())
    }

    fn copy_workspace(&mut self, from: &Workspace, to: &Workspace) -> Result<()> {
        if !is_workspace(from.path()) {
            return Err(BackendError::WorkspaceNotFound {
                path: from.path().to_path_buf(),
            }
            .into());
        }
        if to.path().exists() {
            return Err(BackendError::AlreadyExists {
                workspace: to.path().to_path_buf(),
                name: to.name(),
            }
            .into());
        }
        for entry in WalkDir::new(from.path()) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                backend_io("copy", path, std::io::Error::other(e.to_string()))
            })?;
            let relative = entry.path().strip_prefix(from.path()).unwrap_or(entry.path());
            let target = to.path().join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| backend_io("copy", &target, e))?;
            } else {
                fs::copy(entry.path(), &target).map_err(|e| backend_io("copy", &target, e))?;
            }
        }
        self.note(format!("Copied {from} to {to}"));
        Ok(())
    }

    fn delete_workspace(&mut self, workspace: &Workspace) -> Result<()> {
        if !is_workspace(workspace.path()) {
            return Err(BackendError::WorkspaceNotFound {
                path: workspace.path().to_path_buf(),
            }
            .into());
        }
        fs::remove_dir_all(workspace.path()).map_err(|e| backend_io("delete workspace", workspace.path(), e))?;
        self.note(format!("Deleted workspace {workspace}"));
        Ok(())
    }

    fn ensure_directory(&mut self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| backend_io("create directory", path, e))
    }

    fn list_tables(&self, workspace: &Workspace) -> Result<Vec<String>> {
        Ok(Catalog::load(workspace.path())?.names(ObjectKind::Table))
    }

    fn list_feature_classes(&self, workspace: &Workspace) -> Result<Vec<String>> {
        Ok(Catalog::load(workspace.path())?.names(ObjectKind::FeatureClass))
    }

    fn exists(&self, workspace: &Workspace, name: &str) -> Result<Option<ObjectKind>> {
        Ok(Catalog::load(workspace.path())?
            .get(name)
            .map(|e| e.kind.into()))
    }

    fn delete(&mut self, workspace: &Workspace, name: &str) -> Result<()> {
        let directory = workspace.path();
        let mut catalog = Catalog::load(directory)?;
        let entry = catalog.remove(name).ok_or_else(|| not_found(workspace, name))?;
        let path = entry.data_file(directory);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| backend_io("delete", &path, e))?;
        }
        catalog.save(directory)?;
        self.note(format!("Deleted {} from {workspace}", entry.name));
        Ok(())
    }

    fn rename(&mut self, workspace: &Workspace, from: &str, to: &str) -> Result<()> {
        let directory = workspace.path();
        let mut catalog = Catalog::load(directory)?;
        let entry = Self::entry(&catalog, workspace, from)?;
        if let Some(existing) = catalog.get(to)
            && !existing.name.eq_ignore_ascii_case(&entry.name)
        {
            return Err(BackendError::AlreadyExists {
                workspace: directory.to_path_buf(),
                name: to.to_string(),
            }
            .into());
        }
        let old_path = entry.data_file(directory);
        if let Some(entry) = catalog.get_mut(from) {
            entry.name = to.to_string();
        }
        let renamed = Self::entry(&catalog, workspace, to)?;
        let new_path = renamed.data_file(directory);
        fs::rename(&old_path, &new_path).map_err(|e| backend_io("rename", &old_path, e))?;
        catalog.save(directory)?;
        self.note(format!("Renamed {from} to {to} in {workspace}"));
        Ok(())
    }

    fn create_table(&mut self, workspace: &Workspace, name: &str, fields: &[FieldSpec]) -> Result<()> {
        if Catalog::load(workspace.path())?.get(name).is_some() {
            return Err(BackendError::AlreadyExists {
                workspace: workspace.path().to_path_buf(),
                name: name.to_string(),
            }
            .into());
        }
        let table = TypedTable::empty(fields.to_vec());
        self.store(workspace, name, EntryKind::Table, Some(&table), None, Vec::new())?;
        self.note(format!("Created table {name} with {} fields", fields.len()));
        Ok(())
    }

    fn add_field(&mut self, workspace: &Workspace, name: &str, field: &FieldSpec) -> Result<()> {
        let directory = workspace.path();
        let entry = Self::entry(&Catalog::load(directory)?, workspace, name)?;
        match entry.kind {
            EntryKind::Table => {
                let table = Self::read_table_file(&entry, directory)?.with_null_column(name, field.clone())?;
                self.store(workspace, name, entry.kind, Some(&table), None, entry.indexes)?;
            },
            EntryKind::FeatureClass => {
                let features = Self::read_features_file(&entry, directory)?;
                let attributes = features.attributes().with_null_column(name, field.clone())?;
                let features = features.with_attributes(attributes)?;
                self.store(workspace, name, entry.kind, None, Some(&features), entry.indexes)?;
            },
        }
        self.note(format!("Added field {} to {name}", field.name));
        Ok(())
    }

    fn append_rows(
        &mut self,
        workspace: &Workspace,
        destination: &str,
        rows: &TypedTable,
        mode: AppendMode,
    ) -> Result<usize> {
        let directory = workspace.path();
        let entry = Self::entry(&Catalog::load(directory)?, workspace, destination)?;
        if entry.kind != EntryKind::Table {
            return Err(wrong_kind(destination, ObjectKind::Table));
        }
        let table = Self::read_table_file(&entry, directory)?;
        let typed = coerce_rows(rows, destination, table.fields(), mode)?;
        let combined = table.concat(&typed)?;
        for index in entry.indexes.iter().filter(|i| i.unique) {
            if let Some(value) = combined.first_duplicate(destination, &index.field)? {
                return Err(BackendError::DuplicateKey {
                    name: destination.to_string(),
                    field: index.field.clone(),
                    index: index.name.clone(),
                    value,
                }
                .into());
            }
        }
        Self::write_table_file(&entry.data_file(directory), &combined)?;
        let appended = typed.num_rows();
        self.note(format!("Appended {appended} rows into {destination}"));
        Ok(appended)
    }

    fn read_table(&self, workspace: &Workspace, name: &str) -> Result<TypedTable> {
        let entry = Self::entry(&Catalog::load(workspace.path())?, workspace, name)?;
        if entry.kind != EntryKind::Table {
            return Err(wrong_kind(name, ObjectKind::Table));
        }
        Self::read_table_file(&entry, workspace.path())
    }

    fn write_table(&mut self, workspace: &Workspace, name: &str, table: &TypedTable) -> Result<()> {
        self.store(workspace, name, EntryKind::Table, Some(table), None, Vec::new())?;
        self.note(format!("Wrote table {name} ({} rows)", table.num_rows()));
        Ok(())
    }

    fn read_features(&self, workspace: &Workspace, name: &str) -> Result<FeatureCollection> {
        let entry = Self::entry(&Catalog::load(workspace.path())?, workspace, name)?;
        if entry.kind != EntryKind::FeatureClass {
            return Err(wrong_kind(name, ObjectKind::FeatureClass));
        }
        Self::read_features_file(&entry, workspace.path())
    }

    fn write_features(
        &mut self,
        workspace: &Workspace,
        name: &str,
        features: &FeatureCollection,
    ) -> Result<()> {
        self.store(workspace, name, EntryKind::FeatureClass, None, Some(features), Vec::new())?;
        self.note(format!("Wrote feature class {name} ({} features)", features.len()));
        Ok(())
    }

    fn import_features(&mut self, source: &Path, workspace: &Workspace, name: &str) -> Result<usize> {
        let features = geojson::read_features(source, None, None)?;
        self.write_features(workspace, name, &features)?;
        self.note(format!("Imported {} as {name}", source.display()));
        Ok(features.len())
    }

    fn add_index(
        &mut self,
        workspace: &Workspace,
        name: &str,
        field: &str,
        index_name: &str,
        unique: bool,
    ) -> Result<()> {
        let directory = workspace.path();
        let mut catalog = Catalog::load(directory)?;
        let entry = Self::entry(&catalog, workspace, name)?;
        let attributes = match entry.kind {
            EntryKind::Table => Self::read_table_file(&entry, directory)?,
            EntryKind::FeatureClass => Self::read_features_file(&entry, directory)?
                .attributes()
                .clone(),
        };
        if attributes.column_index(field).is_none() {
            return Err(BackendError::FieldNotFound {
                name: name.to_string(),
                field: field.to_string(),
            }
            .into());
        }
        if unique && let Some(value) = attributes.first_duplicate(name, field)? {
            return Err(BackendError::DuplicateKey {
                name: name.to_string(),
                field: field.to_string(),
                index: index_name.to_string(),
                value,
            }
            .into());
        }
        if let Some(entry) = catalog.get_mut(name) {
            entry.indexes.retain(|i| !i.name.eq_ignore_ascii_case(index_name));
            entry.indexes.push(IndexSpec {
                name: index_name.to_string(),
                field: field.to_string(),
                unique,
            });
        }
        catalog.save(directory)?;
        self.note(format!("Added index {index_name} on {name}.{field}"));
        Ok(())
    }

    fn indexes(&self, workspace: &Workspace, name: &str) -> Result<Vec<IndexSpec>> {
        Ok(Self::entry(&Catalog::load(workspace.path())?, workspace, name)?.indexes)
    }

    fn list_files(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        if !directory.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(directory)
            .map_err(|e| backend_io("list", directory, e))?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    fn read_text(&self, path: &Path) -> Result<Option<String>> {
        if !path.is_file() {
            return Ok(None);
        }
        fs::read_to_string(path)
            .map(Some)
            .map_err(|e| backend_io("read", path, e))
    }

    fn write_text(&mut self, path: &Path, contents: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| backend_io("write", parent, e))?;
        }
        fs::write(path, contents).map_err(|e| backend_io("write", path, e))?;
        self.note(format!("Wrote {}", path.display()));
        Ok(())
    }

    fn diagnostics(&self) -> Vec<String> {
        self.messages.clone()
    }
}
