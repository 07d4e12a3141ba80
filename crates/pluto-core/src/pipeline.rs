//! The MapPLUTO run: one parameterized pipeline for both release variants.
//!
//! Stages run strictly in order against explicit workspaces. Each stage yields
//! a [`StageRecord`]; the first failure stops the run and the remaining stages
//! are recorded as skipped. Nothing is rolled back and nothing is retried.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{PipelineConfig, ResolvedPaths};
use crate::error::{IoErrorExt, PlutoError, Result};
use crate::extract::{CsvWriterOptions, RawExtract, read_intermediate, write_intermediate, write_schema_ini};
use crate::join::{clean_joined_fields, dissolve_by_key, ensure_join_source, resolve_join_key};
use crate::manifest::PublishManifest;
use crate::materialize::{materialize, refresh_workspace, select_unmappables};
use crate::publish::{output_directory, publish};
use crate::reconcile::{ReconciledFields, reconcile};
use crate::repair::repair_features;
use crate::schema::SchemaRegistry;
use crate::shoreline::{find_shoreline, newest_export};
use crate::store::GeometryStore;
use crate::types::{RunParameters, SHORE_INDEX, STAGING_TABLE, TYPED_TABLE, UNMAPPABLES, WATER_INDEX};

const DELIMITER: u8 = b',';

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Create directories and working workspaces
    Bootstrap,
    /// Load the schema registry
    Schema,
    /// Read the raw extract and reconcile its header
    Reconcile,
    /// Write the intermediate extract and its column declaration
    Extract,
    /// Refresh the workspaces and load the typed table
    Materialize,
    /// Join the typed table onto the parcel geometry
    Join,
    /// Erase the shoreline from the joined parcels
    Erase,
    /// Copy and curate the published workspaces
    Publish,
}

impl Stage {
    /// Every stage, in execution order.
    pub const ALL: [Stage; 8] = [
        Stage::Bootstrap,
        Stage::Schema,
        Stage::Reconcile,
        Stage::Extract,
        Stage::Materialize,
        Stage::Join,
        Stage::Erase,
        Stage::Publish,
    ];

    /// Returns the string representation of this stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Bootstrap => "bootstrap",
            Stage::Schema => "schema",
            Stage::Reconcile => "reconcile",
            Stage::Extract => "extract",
            Stage::Materialize => "materialize",
            Stage::Join => "join",
            Stage::Erase => "erase",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// The stage completed
    Succeeded,
    /// The stage failed and stopped the run
    Failed,
    /// The stage did not run because an earlier one failed
    Skipped,
}

impl StageStatus {
    /// Returns the string representation of this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Succeeded => "ok",
            StageStatus::Failed => "FAILED",
            StageStatus::Skipped => "skipped",
        }
    }
}

/// What happened in one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    /// The stage
    pub stage: Stage,
    /// Its outcome
    pub status: StageStatus,
    /// Wall time spent in the stage
    pub elapsed: Duration,
    /// Summary on success, error message on failure
    pub detail: String,
}

/// Result of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// One record per stage, in execution order
    pub records: Vec<StageRecord>,
    /// The error that stopped the run
    pub error: Option<(Stage, PlutoError)>,
    /// Publish manifest of a completed run
    pub manifest: Option<PublishManifest>,
    /// Rows in the typed table
    pub typed_rows: Option<usize>,
    /// Features in the water-included feature class
    pub water_included: Option<usize>,
    /// Features in the shoreline-clipped feature class
    pub shoreline_clipped: Option<usize>,
}

impl RunReport {
    /// Returns `true` if every stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Total wall time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.records.iter().map(|r| r.elapsed).sum()
    }

    /// The failure block appended to the flat log, `None` for a successful run.
    ///
    /// Lists the failing stage, the error with its source chain and the
    /// backend's diagnostic messages.
    #[must_use]
    pub fn failure_block(&self, timestamp: &str, diagnostics: &[String]) -> Option<String> {
        let (stage, error) = self.error.as_ref()?;
        let mut block = format!("[{timestamp}] MapPLUTO run failed at stage '{stage}'\n");
        block.push_str("PIPELINE ERRORS:\n");
        block.push_str(&format!("Error Kind: {}\n", error.kind()));
        block.push_str(&format!("Error Info:\n{}\n", error.user_message()));
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            block.push_str(&format!("Caused by: {cause}\n"));
            source = cause.source();
        }
        if let Some(suggestion) = error.recovery_suggestion() {
            block.push_str(&format!("Suggestion: {suggestion}\n"));
        }
        block.push_str("BACKEND MESSAGES:\n");
        for message in diagnostics {
            block.push_str(message);
            block.push('\n');
        }
        Some(block)
    }
}

/// A configured run over a store.
pub struct Pipeline<'a> {
    store: &'a mut dyn GeometryStore,
    params: RunParameters,
    paths: ResolvedPaths,
    options: PipelineConfig,
    registry: Option<SchemaRegistry>,
    raw: Option<RawExtract>,
    fields: Option<ReconciledFields>,
}

impl<'a> Pipeline<'a> {
    /// Prepare a run; nothing is touched until [`Pipeline::run`].
    pub fn new(
        store: &'a mut dyn GeometryStore,
        params: RunParameters,
        paths: ResolvedPaths,
        options: PipelineConfig,
    ) -> Self {
        Self {
            store,
            params,
            paths,
            options,
            registry: None,
            raw: None,
            fields: None,
        }
    }

    /// Run every stage, stopping at the first failure.
    pub fn run(mut self) -> RunReport {
        info!(
            "Starting MapPLUTO {} {} run for {}",
            self.params.release,
            self.params.variant,
            self.params.date
        );
        let mut report = RunReport::default();

        for stage in Stage::ALL {
            if report.error.is_some() {
                report.records.push(StageRecord {
                    stage,
                    status: StageStatus::Skipped,
                    elapsed: Duration::ZERO,
                    detail: String::new(),
                });
                continue;
            }

            let started = Instant::now();
            let outcome = self.run_stage(stage, &mut report);
            let elapsed = started.elapsed();
            match outcome {
                Ok(detail) => {
                    info!("Stage {} complete in {:.2?}: {}", stage, elapsed, detail);
                    report.records.push(StageRecord {
                        stage,
                        status: StageStatus::Succeeded,
                        elapsed,
                        detail,
                    });
                },
                Err(err) => {
                    warn!("Stage {} failed: {}", stage, err);
                    report.records.push(StageRecord {
                        stage,
                        status: StageStatus::Failed,
                        elapsed,
                        detail: err.user_message(),
                    });
                    report.error = Some((stage, err));
                },
            }
        }

        if report.is_success() {
            info!("MapPLUTO run finished in {:.2?}", report.elapsed());
        }
        report
    }

    fn run_stage(&mut self, stage: Stage, report: &mut RunReport) -> Result<String> {
        match stage {
            Stage::Bootstrap => self.bootstrap(),
            Stage::Schema => self.load_schema(),
            Stage::Reconcile => self.reconcile(),
            Stage::Extract => self.extract(),
            Stage::Materialize => self.materialize(report),
            Stage::Join => self.join(report),
            Stage::Erase => self.erase(report),
            Stage::Publish => self.publish(report),
        }
    }

    fn bootstrap(&mut self) -> Result<String> {
        for directory in [&self.paths.data_path, &self.paths.fgdb_path, &self.paths.x_path] {
            self.store.ensure_directory(directory)?;
        }
        for workspace in [&self.paths.water_area, &self.paths.shoreline_clip] {
            self.store.create_workspace(workspace)?;
        }
        Ok(format!(
            "workspaces {} and {} ready",
            self.paths.water_area.name(),
            self.paths.shoreline_clip.name()
        ))
    }

    fn load_schema(&mut self) -> Result<String> {
        let registry = self.paths.schema.load()?;
        let detail = format!("{} fields from {}", registry.len(), registry.source());
        self.registry = Some(registry);
        Ok(detail)
    }

    fn reconcile(&mut self) -> Result<String> {
        let registry = self.registry.as_ref().ok_or_else(|| missing_state("schema registry"))?;
        let raw = RawExtract::read(&self.paths.input_csv, DELIMITER)?;
        let fields = reconcile(
            raw.header(),
            registry,
            &self.options.exclusions,
            self.options.unregistered_fields,
        )?;
        let detail = format!(
            "{} of {} columns kept, {} excluded, {} unregistered",
            fields.len(),
            raw.header().len(),
            fields.excluded().len(),
            fields.unregistered().len()
        );
        self.raw = Some(raw);
        self.fields = Some(fields);
        Ok(detail)
    }

    fn extract(&mut self) -> Result<String> {
        let raw = self.raw.as_ref().ok_or_else(|| missing_state("raw extract"))?;
        let fields = self.fields.as_ref().ok_or_else(|| missing_state("reconciled fields"))?;
        let output = &self.paths.output_csv;
        let directory = output
            .parent()
            .unwrap_or(self.paths.data_path.as_path())
            .to_path_buf();
        std::fs::create_dir_all(&directory).with_write_context("CSV", &directory)?;

        let rows = write_intermediate(output, &raw.project(fields)?, &CsvWriterOptions::default())?;
        let csv_name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ini = write_schema_ini(&directory, &csv_name, fields)?;
        Ok(format!(
            "{} rows to {}, column declaration {}",
            rows,
            output.display(),
            ini.display()
        ))
    }

    fn materialize(&mut self, report: &mut RunReport) -> Result<String> {
        let fields = self.fields.as_ref().ok_or_else(|| missing_state("reconciled fields"))?;
        let water = &self.paths.water_area;
        let clip = &self.paths.shoreline_clip;
        let sentinel = &self.options.sentinel_marker;

        let rows = read_intermediate(&self.paths.output_csv, fields, DELIMITER)?;
        let refreshed_water = refresh_workspace(self.store, water, sentinel)?;
        let refreshed_clip = refresh_workspace(self.store, clip, sentinel)?;

        let summary = materialize(self.store, water, STAGING_TABLE, TYPED_TABLE, &rows, fields)?;
        report.typed_rows = Some(summary.typed);

        let unmappable = select_unmappables(
            self.store,
            water,
            TYPED_TABLE,
            water,
            UNMAPPABLES,
            &self.options.unmappable_field,
            &self.options.unmappable_codes,
            false,
        )?
        .unwrap_or_default();

        Ok(format!(
            "{} rows typed, {} unmappable, {} objects refreshed",
            summary.typed,
            unmappable,
            refreshed_water.deleted.len() + refreshed_clip.deleted.len()
        ))
    }

    fn join(&mut self, report: &mut RunReport) -> Result<String> {
        let water = self.paths.water_area.clone();
        let options = &self.options;

        let layer = ensure_join_source(
            self.store,
            &water,
            &options.join_layer,
            &options.sentinel_marker,
            &self.paths.data_path,
            &options.join_source_marker,
        )?;
        let key = resolve_join_key(self.store, &water, &layer, &options.join_key)?;

        let source = self.store.read_features(&water, &layer)?;
        let (repaired, repair) = repair_features(&source)?;
        if repair.changed() {
            info!(
                "Rewriting {} after repair ({} repaired, {} removed)",
                layer, repair.repaired, repair.removed
            );
            self.store.write_features(&water, &layer, &repaired)?;
        }

        let join_layer = if self.params.dissolve || options.dissolve {
            let dissolved_name = format!("{}_Dissolved", options.join_layer);
            let features = self.store.read_features(&water, &layer)?;
            let dissolved = dissolve_by_key(&features, &layer, key.name())?;
            self.store.write_features(&water, &dissolved_name, &dissolved)?;
            dissolved_name
        } else {
            layer.clone()
        };

        let joined = self.store.spatial_join(
            &water,
            &join_layer,
            key.name(),
            &water,
            TYPED_TABLE,
            &options.join_key,
        )?;
        let markers = vec![
            self.paths.geometry_prefix.clone(),
            options.join_layer.clone(),
            join_layer.clone(),
        ];
        let mut cleaned = clean_joined_fields(&joined, TYPED_TABLE, &markers)?;

        if let Some((reference_workspace, reference_layer)) = &self.paths.reference {
            match self.store.spatial_reference(reference_workspace, reference_layer)? {
                Some(target) => {
                    info!("Reprojecting joined parcels to {}", target);
                    cleaned = cleaned.reproject(&target)?;
                },
                None => warn!(
                    "{} declares no spatial reference; keeping the join geometry's",
                    reference_layer
                ),
            }
        }

        let water_included = self.params.water_included();
        self.store.write_features(&water, &water_included, &cleaned)?;
        self.store
            .add_index(&water, &water_included, &options.join_key, WATER_INDEX, true)?;
        report.water_included = Some(cleaned.len());

        Ok(format!(
            "{} features in {} (key {})",
            cleaned.len(),
            water_included,
            key.name()
        ))
    }

    fn erase(&mut self, report: &mut RunReport) -> Result<String> {
        let water = self.paths.water_area.clone();
        let clip = self.paths.shoreline_clip.clone();
        let options = &self.options;

        let export = newest_export(self.store, &self.paths.dof_path)?;
        let (shoreline_workspace, shoreline) = find_shoreline(
            self.store,
            &export,
            &options.shoreline_subdir,
            &options.shoreline_marker,
        )?;

        let water_included = self.params.water_included();
        let clipped_name = self.params.shoreline_clipped();
        let clipped = self
            .store
            .erase(&water, &water_included, &shoreline_workspace, &shoreline)?;
        self.store.write_features(&clip, &clipped_name, &clipped)?;
        self.store
            .add_index(&clip, &clipped_name, &options.join_key, SHORE_INDEX, true)?;
        report.shoreline_clipped = Some(clipped.len());

        select_unmappables(
            self.store,
            &water,
            TYPED_TABLE,
            &clip,
            UNMAPPABLES,
            &options.unmappable_field,
            &options.clipped_unmappable_codes,
            true,
        )?;

        Ok(format!(
            "{} features in {} (shoreline {} from {})",
            clipped.len(),
            clipped_name,
            shoreline,
            export.date
        ))
    }

    fn publish(&mut self, report: &mut RunReport) -> Result<String> {
        let output_dir = output_directory(&self.paths.x_path, &self.params);
        let manifest = publish(
            self.store,
            &self.params,
            &self.paths.water_area,
            &self.paths.shoreline_clip,
            &output_dir,
        )?;
        let detail = format!(
            "{} workspaces published to {}",
            manifest.workspaces.len(),
            output_dir.display()
        );
        report.manifest = Some(manifest);
        Ok(detail)
    }
}

fn missing_state(what: &str) -> PlutoError {
    crate::error::BackendError::Geometry {
        message: format!("{what} is not available; an earlier stage did not run"),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;

    #[test]
    fn test_stage_order() {
        let names: Vec<_> = Stage::ALL.iter().map(Stage::as_str).collect();
        assert_eq!(
            names,
            vec![
                "bootstrap",
                "schema",
                "reconcile",
                "extract",
                "materialize",
                "join",
                "erase",
                "publish"
            ]
        );
    }

    #[test]
    fn test_failure_block_lists_stage_error_and_diagnostics() {
        let report = RunReport {
            error: Some((
                Stage::Materialize,
                SchemaError::MissingField {
                    field: "bbl".to_string(),
                }
                .into(),
            )),
            ..RunReport::default()
        };
        let block = report
            .failure_block("2019-09-30 14:00:00", &["Created table MapPLUTO_final".to_string()])
            .unwrap();
        assert!(block.starts_with("[2019-09-30 14:00:00] MapPLUTO run failed at stage 'materialize'\n"));
        assert!(block.contains("PIPELINE ERRORS:\n"));
        assert!(block.contains("Error Kind: schema\n"));
        assert!(block.contains("'bbl'"));
        assert!(block.ends_with("BACKEND MESSAGES:\nCreated table MapPLUTO_final\n"));
    }

    #[test]
    fn test_successful_report_has_no_failure_block() {
        let report = RunReport::default();
        assert!(report.is_success());
        assert!(report.failure_block("now", &[]).is_none());
    }
}
