//! `pluto-core` is the core library of the MapPLUTO build, turning a raw
//! parcel attribute extract into published, shoreline-clipped parcel layers.
//!
//! This crate includes:
//! - **Schema registry**: Declarative field definitions ([`schema`]) and the
//!   reconciliation of an extract's header against them ([`reconcile`]).
//! - **Materialization**: The intermediate extract ([`extract`]) and the
//!   staged, typed tables built from it ([`materialize`]).
//! - **Geometry**: Join source repair ([`repair`]), key join onto parcel
//!   geometry ([`join`]), shoreline discovery ([`shoreline`]) and erase
//!   ([`erase`]).
//! - **Publishing**: The retention registry ([`manifest`]) and output curation
//!   ([`publish`]).
//! - **Backends**: The [`store::GeometryStore`] capability interface with an
//!   in-memory implementation.
//!
//! The [`pipeline`] module runs every stage in order for one release variant.

pub mod config;
pub mod erase;
pub mod error;
pub mod extract;
pub mod features;
pub mod join;
pub mod manifest;
pub mod materialize;
pub mod pipeline;
pub mod publish;
pub mod reconcile;
pub mod repair;
pub mod schema;
pub mod shoreline;
pub mod store;
pub mod table;
pub mod types;
pub mod utils;

pub use error::{PlutoError, Result};
