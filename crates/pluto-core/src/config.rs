//! Run configuration.
//!
//! A TOML file with a `[paths]` section naming every input and output location
//! and an optional `[pipeline]` section whose keys all have defaults:
//!
//! ```toml
//! [paths]
//! log_path = "/pluto/logs/mappluto.log"
//! data_path = "/pluto/{version}/data{borough}"
//! output_csv = "/pluto/{version}/data{borough}/pluto{borough_suffix}_{date}.csv"
//! fgdb_path = "/pluto/fgdb"
//! x_path = "/publish/mappluto"
//! dof_path = "/dof/exports"
//! corrections_input_csv = "/pluto/{version}/pluto_corrections{borough_suffix}.csv"
//! corrections_schema_path = "/pluto/schema/mappluto_corrections.json"
//!
//! [pipeline]
//! dissolve = true
//! ```
//!
//! Path values are templates over `{version}`, `{borough}`,
//! `{borough_suffix}` and `{date}`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::reconcile::UnregisteredPolicy;
use crate::schema::SchemaSource;
use crate::store::Workspace;
use crate::types::{CLIP_WORKSPACE, ReleaseVariant, RunParameters, WATER_WORKSPACE};

static PLACEHOLDER: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}"));

/// The `[paths]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Flat log receiving fatal failure reports
    pub log_path: Option<String>,
    /// Directory of non-spatial inputs and outputs
    pub data_path: Option<String>,
    /// Intermediate extract path
    pub output_csv: Option<String>,
    /// Directory holding the working workspaces
    pub fgdb_path: Option<String>,
    /// Water-included working workspace; defaults under `fgdb_path`
    pub gdb_path_water_area: Option<String>,
    /// Shoreline-clipped working workspace; defaults under `fgdb_path`
    pub gdb_path_shoreline_clip: Option<String>,
    /// Root of the published output tree
    pub x_path: Option<String>,
    /// Directory of dated tax map exports
    pub dof_path: Option<String>,
    /// Raw extract of the original variant
    pub original_input_csv: Option<String>,
    /// Schema of the original variant; embedded schema when absent
    pub original_schema_path: Option<String>,
    /// Raw extract of the corrected variant
    pub corrections_input_csv: Option<String>,
    /// Schema of the corrected variant
    pub corrections_schema_path: Option<String>,
}

/// The `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Raw columns dropped before reconciliation
    pub exclusions: Vec<String>,
    /// Parcel key joining the table to the geometry
    pub join_key: String,
    /// Name of the imported join geometry
    pub join_layer: String,
    /// File name marker of the join geometry in `data_path`
    pub join_source_marker: String,
    /// Feature classes whose name contains this survive the refresh
    pub sentinel_marker: String,
    /// Name marker of the shoreline feature class
    pub shoreline_marker: String,
    /// Subdirectory of an export holding the shoreline
    pub shoreline_subdir: String,
    /// Field flagging unmappable lots
    pub unmappable_field: String,
    /// Codes selected into the water-included unmappables table
    pub unmappable_codes: Vec<String>,
    /// Codes selected into the shoreline-clipped unmappables table
    pub clipped_unmappable_codes: Vec<String>,
    /// Handling of raw columns without a schema entry
    pub unregistered_fields: UnregisteredPolicy,
    /// Dissolve the join geometry by key before joining
    pub dissolve: bool,
    /// Workspace of the layer whose spatial reference is the output reference
    pub reference_workspace: Option<String>,
    /// Layer whose spatial reference is the output reference
    pub reference_layer: Option<String>,
    /// Joined columns containing this marker come from the geometry source
    pub geometry_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            exclusions: [
                "geom",
                "mappluto_f",
                "rpaddate",
                "dcasdate",
                "zoningdate",
                "landmkdate",
                "basempdate",
                "masdate",
                "polidate",
                "edesigdate",
                "exemptland",
            ]
            .map(String::from)
            .to_vec(),
            join_key: "BBL".to_string(),
            join_layer: "Join_File".to_string(),
            join_source_marker: "dcp_mappluto".to_string(),
            sentinel_marker: "Join".to_string(),
            shoreline_marker: "Shoreline_Polygon".to_string(),
            shoreline_subdir: "DCP".to_string(),
            unmappable_field: "PLUTOMapID".to_string(),
            unmappable_codes: vec!["2".to_string(), "4".to_string()],
            clipped_unmappable_codes: vec!["2".to_string()],
            unregistered_fields: UnregisteredPolicy::PassThrough,
            dissolve: false,
            reference_workspace: None,
            reference_layer: None,
            geometry_prefix: "dcp_mappluto_{version}".to_string(),
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Input and output locations
    pub paths: PathsConfig,
    /// Pipeline options
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Every location of a run, with templates expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// Flat log receiving fatal failure reports
    pub log_path: PathBuf,
    /// Directory of non-spatial inputs and outputs
    pub data_path: PathBuf,
    /// Intermediate extract path
    pub output_csv: PathBuf,
    /// Directory holding the working workspaces
    pub fgdb_path: PathBuf,
    /// Water-included working workspace
    pub water_area: Workspace,
    /// Shoreline-clipped working workspace
    pub shoreline_clip: Workspace,
    /// Root of the published output tree
    pub x_path: PathBuf,
    /// Directory of dated tax map exports
    pub dof_path: PathBuf,
    /// Raw extract for the selected variant
    pub input_csv: PathBuf,
    /// Schema for the selected variant
    pub schema: SchemaSource,
    /// Reference layer for reprojection, if configured
    pub reference: Option<(Workspace, String)>,
    /// Geometry source marker with `{version}` expanded
    pub geometry_prefix: String,
}

impl Config {
    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Parse configuration text; `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid configuration.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Expand every path for a run.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingKey`] if a required path is absent
    /// - [`ConfigError::UnresolvedPlaceholder`] if a template keeps a `{...}`
    /// - [`ConfigError::InvalidOption`] if only one of `reference_workspace`
    ///   and `reference_layer` is set
    pub fn resolve(&self, params: &RunParameters) -> Result<ResolvedPaths> {
        let p = &self.paths;
        let path = |key: &str, value: &Option<String>| -> Result<PathBuf> {
            let template = value.as_deref().ok_or_else(|| ConfigError::MissingKey {
                key: format!("paths.{key}"),
            })?;
            expand(key, template, params).map(PathBuf::from)
        };
        let optional = |key: &str, value: &Option<String>| -> Result<Option<PathBuf>> {
            value
                .as_deref()
                .map(|template| expand(key, template, params).map(PathBuf::from))
                .transpose()
        };

        let fgdb_path = path("fgdb_path", &p.fgdb_path)?;
        let water_area = optional("gdb_path_water_area", &p.gdb_path_water_area)?
            .unwrap_or_else(|| fgdb_path.join(WATER_WORKSPACE));
        let shoreline_clip = optional("gdb_path_shoreline_clip", &p.gdb_path_shoreline_clip)?
            .unwrap_or_else(|| fgdb_path.join(CLIP_WORKSPACE));

        let (input_csv, schema) = match params.variant {
            ReleaseVariant::Original => (
                path("original_input_csv", &p.original_input_csv)?,
                optional("original_schema_path", &p.original_schema_path)?
                    .map_or(SchemaSource::Embedded, SchemaSource::File),
            ),
            ReleaseVariant::Corrected => (
                path("corrections_input_csv", &p.corrections_input_csv)?,
                SchemaSource::File(path("corrections_schema_path", &p.corrections_schema_path)?),
            ),
        };

        let pipeline = &self.pipeline;
        let reference = match (&pipeline.reference_workspace, &pipeline.reference_layer) {
            (Some(workspace), Some(layer)) => Some((
                Workspace::new(expand("pipeline.reference_workspace", workspace, params)?),
                layer.clone(),
            )),
            (None, None) => None,
            _ => {
                return Err(ConfigError::InvalidOption {
                    option: "reference_layer".to_string(),
                    message: "reference_workspace and reference_layer must be set together"
                        .to_string(),
                }
                .into());
            },
        };

        let resolved = ResolvedPaths {
            log_path: path("log_path", &p.log_path)?,
            data_path: path("data_path", &p.data_path)?,
            output_csv: path("output_csv", &p.output_csv)?,
            water_area: Workspace::new(water_area),
            shoreline_clip: Workspace::new(shoreline_clip),
            fgdb_path,
            x_path: path("x_path", &p.x_path)?,
            dof_path: path("dof_path", &p.dof_path)?,
            input_csv,
            schema,
            reference,
            geometry_prefix: expand("pipeline.geometry_prefix", &pipeline.geometry_prefix, params)?,
        };
        debug!("Resolved paths: {:?}", resolved);
        Ok(resolved)
    }
}

/// Expand `{version}`, `{borough}`, `{borough_suffix}` and `{date}`.
///
/// # Errors
///
/// Returns [`ConfigError::UnresolvedPlaceholder`] if any other `{...}` remains.
pub fn expand(key: &str, template: &str, params: &RunParameters) -> Result<String> {
    let expanded = template
        .replace("{version}", &params.release)
        .replace("{borough_suffix}", params.borough.suffix())
        .replace("{borough}", params.borough.name())
        .replace("{date}", &params.date.to_string());

    if let Ok(pattern) = PLACEHOLDER.as_ref()
        && let Some(found) = pattern.find(&expanded)
    {
        return Err(ConfigError::UnresolvedPlaceholder {
            key: key.to_string(),
            placeholder: found.as_str().to_string(),
        }
        .into());
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlutoError;
    use crate::types::{Borough, RunDate};

    const SAMPLE: &str = r#"
        [paths]
        log_path = "/pluto/logs/mappluto.log"
        data_path = "/pluto/{version}/data{borough}"
        output_csv = "/pluto/{version}/data{borough}/pluto{borough_suffix}_{date}.csv"
        fgdb_path = "/pluto/fgdb"
        x_path = "/publish"
        dof_path = "/dof"
        original_input_csv = "/pluto/{version}/pluto{borough_suffix}.csv"
        corrections_input_csv = "/pluto/{version}/pluto_corr{borough_suffix}.csv"
        corrections_schema_path = "/pluto/schema/corrections.json"

        [pipeline]
        dissolve = true
        unregistered_fields = "reject"
    "#;

    fn params(variant: ReleaseVariant) -> RunParameters {
        let mut params = RunParameters::new("19v2", variant);
        params.borough = Borough::StatenIsland;
        params.date = RunDate::parse("09_30_2019").unwrap();
        params
    }

    fn config() -> Config {
        Config::from_toml_str(SAMPLE, Path::new("sample.toml")).unwrap()
    }

    #[test]
    fn test_pipeline_defaults_and_overrides() {
        let config = config();
        assert!(config.pipeline.dissolve);
        assert_eq!(config.pipeline.unregistered_fields, UnregisteredPolicy::Reject);
        assert_eq!(config.pipeline.join_key, "BBL");
        assert_eq!(config.pipeline.exclusions.len(), 11);
        assert_eq!(config.pipeline.clipped_unmappable_codes, vec!["2".to_string()]);
    }

    #[test]
    fn test_resolve_expands_templates() {
        let resolved = config().resolve(&params(ReleaseVariant::Corrected)).unwrap();
        assert_eq!(resolved.data_path, PathBuf::from("/pluto/19v2/datastatenisland"));
        assert_eq!(
            resolved.output_csv,
            PathBuf::from("/pluto/19v2/datastatenisland/pluto_staten_island_09_30_2019.csv")
        );
        assert_eq!(
            resolved.water_area.path(),
            Path::new("/pluto/fgdb/MapPLUTO_WaterArea.gdb")
        );
        assert_eq!(
            resolved.schema,
            SchemaSource::File(PathBuf::from("/pluto/schema/corrections.json"))
        );
        assert_eq!(resolved.geometry_prefix, "dcp_mappluto_19v2");
        assert_eq!(resolved.reference, None);
    }

    #[test]
    fn test_original_variant_uses_embedded_schema() {
        let resolved = config().resolve(&params(ReleaseVariant::Original)).unwrap();
        assert_eq!(resolved.schema, SchemaSource::Embedded);
        assert_eq!(
            resolved.input_csv,
            PathBuf::from("/pluto/19v2/pluto_staten_island.csv")
        );
    }

    #[test]
    fn test_missing_key() {
        let mut config = config();
        config.paths.dof_path = None;
        let err = config.resolve(&params(ReleaseVariant::Original)).unwrap_err();
        assert!(matches!(
            err,
            PlutoError::Config(ConfigError::MissingKey { ref key }) if key == "paths.dof_path"
        ));
    }

    #[test]
    fn test_unresolved_placeholder() {
        let mut config = config();
        config.paths.x_path = Some("/publish/{0}".to_string());
        let err = config.resolve(&params(ReleaseVariant::Original)).unwrap_err();
        assert!(matches!(
            err,
            PlutoError::Config(ConfigError::UnresolvedPlaceholder { ref placeholder, .. })
                if placeholder == "{0}"
        ));
    }

    #[test]
    fn test_reference_needs_both_keys() {
        let mut config = config();
        config.pipeline.reference_layer = Some("Tax_Lot_Polygon".to_string());
        let err = config.resolve(&params(ReleaseVariant::Original)).unwrap_err();
        assert!(matches!(err, PlutoError::Config(ConfigError::InvalidOption { .. })));

        config.pipeline.reference_workspace = Some("/ref/{version}.gdb".to_string());
        let resolved = config.resolve(&params(ReleaseVariant::Original)).unwrap();
        let (workspace, layer) = resolved.reference.unwrap();
        assert_eq!(workspace.path(), Path::new("/ref/19v2.gdb"));
        assert_eq!(layer, "Tax_Lot_Polygon");
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let err = Config::from_toml_str("[paths]\nlogpath = \"x\"\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, PlutoError::Config(ConfigError::Parse { .. })));
    }
}
