//! In-memory [`GeometryStore`], used by the pipeline tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{BackendError, Result, backend_io};
use crate::features::FeatureCollection;
use crate::schema::FieldSpec;
use crate::store::{GeometryStore, IndexSpec, ObjectKind, Workspace, wrong_kind};
use crate::table::{AppendMode, TypedTable, coerce_rows};

#[derive(Debug, Clone)]
enum Data {
    Table(TypedTable),
    Features(FeatureCollection),
}

impl Data {
    fn kind(&self) -> ObjectKind {
        match self {
            Data::Table(_) => ObjectKind::Table,
            Data::Features(_) => ObjectKind::FeatureClass,
        }
    }

    fn attributes(&self) -> &TypedTable {
        match self {
            Data::Table(table) => table,
            Data::Features(features) => features.attributes(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Data,
    indexes: Vec<IndexSpec>,
}

#[derive(Debug, Clone, Default)]
struct WorkspaceData {
    objects: BTreeMap<String, StoredObject>,
}

impl WorkspaceData {
    /// Stored key for a name; names are case-insensitive.
    fn key(&self, name: &str) -> Option<String> {
        self.objects
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn names(&self, kind: ObjectKind) -> Vec<String> {
        self.objects
            .iter()
            .filter(|(_, o)| o.data.kind() == kind)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

/// A [`GeometryStore`] that keeps every workspace in memory.
///
/// Foreign geometry files are registered with [`MemoryStore::register_file`]
/// and then picked up by [`GeometryStore::import_features`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    workspaces: BTreeMap<PathBuf, WorkspaceData>,
    directories: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, String>,
    foreign: BTreeMap<PathBuf, FeatureCollection>,
    messages: Vec<String>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a geometry file available for import at `path`.
    pub fn register_file(&mut self, path: impl Into<PathBuf>, features: FeatureCollection) {
        self.foreign.insert(path.into(), features);
    }

    /// Returns `true` if [`GeometryStore::ensure_directory`] created `path`.
    #[must_use]
    pub fn directory_exists(&self, path: &Path) -> bool {
        self.directories.contains(path)
    }

    fn note(&mut self, message: String) {
        self.messages.push(message);
    }

    fn workspace(&self, workspace: &Workspace) -> Result<&WorkspaceData> {
        self.workspaces
            .get(workspace.path())
            .ok_or_else(|| workspace_not_found(workspace))
    }

    fn workspace_mut(&mut self, workspace: &Workspace) -> Result<&mut WorkspaceData> {
        self.workspaces
            .get_mut(workspace.path())
            .ok_or_else(|| workspace_not_found(workspace))
    }

    fn object(&self, workspace: &Workspace, name: &str) -> Result<&StoredObject> {
        let data = self.workspace(workspace)?;
        data.key(name)
            .and_then(|k| data.objects.get(&k))
            .ok_or_else(|| not_found(workspace, name))
    }

    fn object_mut(&mut self, workspace: &Workspace, name: &str) -> Result<&mut StoredObject> {
        let data = self.workspace_mut(workspace)?;
        let key = data.key(name).ok_or_else(|| not_found(workspace, name))?;
        data.objects
            .get_mut(&key)
            .ok_or_else(|| not_found(workspace, name))
    }

    fn put(&mut self, workspace: &Workspace, name: &str, data: Data) -> Result<()> {
        let ws = self.workspace_mut(workspace)?;
        if let Some(key) = ws.key(name) {
            let existing = ws.objects.get(&key).map(|o| o.data.kind());
            if existing != Some(data.kind()) {
                return Err(wrong_kind(name, data.kind()).into());
            }
            ws.objects.remove(&key);
        }
        ws.objects.insert(
            name.to_string(),
            StoredObject {
                data,
                indexes: Vec::new(),
            },
        );
        Ok(())
    }
}

fn workspace_not_found(workspace: &Workspace) -> crate::error::PlutoError {
    BackendError::WorkspaceNotFound {
        path: workspace.path().to_path_buf(),
    }
    .into()
}

fn not_found(workspace: &Workspace, name: &str) -> crate::error::PlutoError {
    BackendError::NotFound {
        workspace: workspace.path().to_path_buf(),
        name: name.to_string(),
    }
    .into()
}

/// Child of `parent` on the way to `path`, if `path` is strictly below it.
fn child_towards(parent: &Path, path: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(parent).ok()?;
    rest.components()
        .next()
        .map(|first| parent.join(first.as_os_str()))
}

impl GeometryStore for MemoryStore {
    fn create_workspace(&mut self, workspace: &Workspace) -> Result<()> {
        if !self.workspaces.contains_key(workspace.path()) {
            self.workspaces
                .insert(workspace.path().to_path_buf(), WorkspaceData::default());
            self.note(format!("Created workspace {workspace}"));
        }
        Ok(())
    }

    fn workspace_exists(&self, workspace: &Workspace) -> bool {
        self.workspaces.contains_key(workspace.path())
    }

    fn list_workspaces(&self, parent: &Path) -> Result<Vec<Workspace>> {
        let children: BTreeSet<PathBuf> = self
            .workspaces
            .keys()
            .filter_map(|p| child_towards(parent, p))
            .collect();
        Ok(children
            .into_iter()
            .filter(|p| {
                self.workspaces.contains_key(p)
                    || self.workspaces.keys().any(|w| w.starts_with(p) && w != p)
            })
            .map(Workspace::new)
            .collect())
    }

    fn copy_workspace(&mut self, from: &Workspace, to: &Workspace) -> Result<()> {
        let data = self.workspace(from)?.clone();
        if self.workspaces.contains_key(to.path()) {
            return Err(BackendError::AlreadyExists {
                workspace: to.path().to_path_buf(),
                name: to.name(),
            }
            .into());
        }
        self.workspaces.insert(to.path().to_path_buf(), data);
        self.note(format!("Copied {from} to {to}"));
        Ok(())
    }

    fn delete_workspace(&mut self, workspace: &Workspace) -> Result<()> {
        self.workspace(workspace)?;
        let root = workspace.path();
        self.workspaces.retain(|p, _| !p.starts_with(root));
        self.files.retain(|p, _| !p.starts_with(root));
        self.note(format!("Deleted workspace {workspace}"));
        Ok(())
    }

    fn ensure_directory(&mut self, path: &Path) -> Result<()> {
        self.directories.insert(path.to_path_buf());
        Ok(())
    }

    fn list_tables(&self, workspace: &Workspace) -> Result<Vec<String>> {
        Ok(self.workspace(workspace)?.names(ObjectKind::Table))
    }

    fn list_feature_classes(&self, workspace: &Workspace) -> Result<Vec<String>> {
        Ok(self.workspace(workspace)?.names(ObjectKind::FeatureClass))
    }

    fn exists(&self, workspace: &Workspace, name: &str) -> Result<Option<ObjectKind>> {
        let data = self.workspace(workspace)?;
        Ok(data
            .key(name)
            .and_then(|k| data.objects.get(&k))
            .map(|o| o.data.kind()))
    }

    fn delete(&mut self, workspace: &Workspace, name: &str) -> Result<()> {
        let data = self.workspace_mut(workspace)?;
        let key = data.key(name).ok_or_else(|| not_found(workspace, name))?;
        data.objects.remove(&key);
        self.note(format!("Deleted {name} from {workspace}"));
        Ok(())
    }

    fn rename(&mut self, workspace: &Workspace, from: &str, to: &str) -> Result<()> {
        let data = self.workspace_mut(workspace)?;
        let key = data.key(from).ok_or_else(|| not_found(workspace, from))?;
        if let Some(existing) = data.key(to)
            && existing != key
        {
            return Err(BackendError::AlreadyExists {
                workspace: workspace.path().to_path_buf(),
                name: to.to_string(),
            }
            .into());
        }
        if let Some(object) = data.objects.remove(&key) {
            data.objects.insert(to.to_string(), object);
        }
        self.note(format!("Renamed {from} to {to} in {workspace}"));
        Ok(())
    }

    fn create_table(&mut self, workspace: &Workspace, name: &str, fields: &[FieldSpec]) -> Result<()> {
        if self.workspace(workspace)?.key(name).is_some() {
            return Err(BackendError::AlreadyExists {
                workspace: workspace.path().to_path_buf(),
                name: name.to_string(),
            }
            .into());
        }
        self.put(workspace, name, Data::Table(TypedTable::empty(fields.to_vec())))?;
        self.note(format!("Created table {name} with {} fields", fields.len()));
        Ok(())
    }

    fn add_field(&mut self, workspace: &Workspace, name: &str, field: &FieldSpec) -> Result<()> {
        let object = self.object_mut(workspace, name)?;
        object.data = match &object.data {
            Data::Table(table) => Data::Table(table.with_null_column(name, field.clone())?),
            Data::Features(features) => {
                let attributes = features.attributes().with_null_column(name, field.clone())?;
                Data::Features(features.with_attributes(attributes)?)
            },
        };
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
        let object = self.object_mut(workspace, destination)?;
        let Data::Table(table) = &object.data else {
            return Err(wrong_kind(destination, ObjectKind::Table).into());
        };
        let typed = coerce_rows(rows, destination, table.fields(), mode)?;
        let combined = table.concat(&typed)?;
        for index in object.indexes.iter().filter(|i| i.unique) {
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
        object.data = Data::Table(combined);
        let appended = typed.num_rows();
        self.note(format!("Appended {appended} rows into {destination}"));
        Ok(appended)
    }

    fn read_table(&self, workspace: &Workspace, name: &str) -> Result<TypedTable> {
        match &self.object(workspace, name)?.data {
            Data::Table(table) => Ok(table.clone()),
            Data::Features(_) => Err(wrong_kind(name, ObjectKind::Table).into()),
        }
    }

    fn write_table(&mut self, workspace: &Workspace, name: &str, table: &TypedTable) -> Result<()> {
        self.put(workspace, name, Data::Table(table.clone()))?;
        self.note(format!("Wrote table {name} ({} rows)", table.num_rows()));
        Ok(())
    }

    fn read_features(&self, workspace: &Workspace, name: &str) -> Result<FeatureCollection> {
        match &self.object(workspace, name)?.data {
            Data::Features(features) => Ok(features.clone()),
            Data::Table(_) => Err(wrong_kind(name, ObjectKind::FeatureClass).into()),
        }
    }

    fn write_features(
        &mut self,
        workspace: &Workspace,
        name: &str,
        features: &FeatureCollection,
    ) -> Result<()> {
        self.put(workspace, name, Data::Features(features.clone()))?;
        self.note(format!("Wrote feature class {name} ({} features)", features.len()));
        Ok(())
    }

    fn import_features(&mut self, source: &Path, workspace: &Workspace, name: &str) -> Result<usize> {
        let features = self.foreign.get(source).cloned().ok_or_else(|| {
            backend_io(
                "import",
                source,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )
        })?;
        self.write_features(workspace, name, &features)?;
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
        let object = self.object_mut(workspace, name)?;
        let attributes = object.data.attributes();
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
        object.indexes.retain(|i| !i.name.eq_ignore_ascii_case(index_name));
        object.indexes.push(IndexSpec {
            name: index_name.to_string(),
            field: field.to_string(),
            unique,
        });
        self.note(format!("Added index {index_name} on {name}.{field}"));
        Ok(())
    }

    fn indexes(&self, workspace: &Workspace, name: &str) -> Result<Vec<IndexSpec>> {
        Ok(self.object(workspace, name)?.indexes.clone())
    }

    fn list_files(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        let files: BTreeSet<PathBuf> = self
            .files
            .keys()
            .chain(self.foreign.keys())
            .filter(|p| p.parent() == Some(directory))
            .cloned()
            .collect();
        Ok(files.into_iter().collect())
    }

    fn read_text(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.files.get(path).cloned())
    }

    fn write_text(&mut self, path: &Path, contents: &str) -> Result<()> {
        self.files.insert(path.to_path_buf(), contents.to_string());
        self.note(format!("Wrote {}", path.display()));
        Ok(())
    }

    fn diagnostics(&self) -> Vec<String> {
        self.messages.clone()
    }
}
