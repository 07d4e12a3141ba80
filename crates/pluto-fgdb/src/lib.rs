//! `pluto-fgdb` stores MapPLUTO workspaces on the local file system.
//!
//! Each workspace is a directory holding a `catalog.json`, one CSV file per
//! table and one `GeoJSON` file per feature class. [`FolderStore`] implements
//! [`pluto_core::store::GeometryStore`] over that layout, so the pipeline runs
//! unchanged against real files.

pub mod catalog;
pub mod geojson;
pub mod store;

pub use store::FolderStore;
