//! Display utilities for formatting CLI output.
//!
//! This module provides table row structures and formatting functions
//! for presenting run reports, schemas and reconciled fields.

use tabled::{Table, Tabled};

use pluto_core::manifest::Disposition;
use pluto_core::pipeline::RunReport;
use pluto_core::reconcile::ReconciledFields;
use pluto_core::schema::SchemaRegistry;
use pluto_core::utils::FieldSpecExt;

/// Table row representation for one pipeline stage.
#[derive(Tabled)]
pub struct StageRow {
    /// Stage name.
    #[tabled(rename = "Stage")]
    pub stage: String,
    /// `ok`, `FAILED` or `skipped`.
    #[tabled(rename = "Status")]
    pub status: String,
    /// Wall time of the stage.
    #[tabled(rename = "Elapsed")]
    pub elapsed: String,
    /// Summary or error message.
    #[tabled(rename = "Detail")]
    pub detail: String,
}

/// Table row representation for a schema declaration.
#[derive(Tabled)]
pub struct FieldRow {
    /// Column header in the raw extract.
    #[tabled(rename = "Logical Name")]
    pub logical_name: String,
    /// Column name in the stores.
    #[tabled(rename = "Field")]
    pub name: String,
    /// Storage keyword with its size qualifiers.
    #[tabled(rename = "Type")]
    pub storage: String,
    /// Descriptive alias.
    #[tabled(rename = "Alias")]
    pub alias: String,
    /// Whether the field can contain null values.
    #[tabled(rename = "Nullable")]
    pub nullable: String,
}

/// Table row representation for a reconciled column.
#[derive(Tabled)]
pub struct ReconciledRow {
    /// Positional column declaration, e.g. `Col2`.
    #[tabled(rename = "Column")]
    pub column: String,
    /// Column header in the raw extract.
    #[tabled(rename = "Logical Name")]
    pub logical_name: String,
    /// Storage keyword with its size qualifiers.
    #[tabled(rename = "Type")]
    pub storage: String,
    /// Whether the schema declares the column.
    #[tabled(rename = "Registered")]
    pub registered: String,
}

/// Rows of the stage table of a run.
#[must_use]
pub fn stage_rows(report: &RunReport) -> Vec<StageRow> {
    report
        .records
        .iter()
        .map(|r| StageRow {
            stage: r.stage.to_string(),
            status: r.status.as_str().to_string(),
            elapsed: format!("{:.2?}", r.elapsed),
            detail: r.detail.clone(),
        })
        .collect()
}

/// Rows of the field table of a schema.
#[must_use]
pub fn field_rows(registry: &SchemaRegistry) -> Vec<FieldRow> {
    registry
        .fields()
        .iter()
        .map(|f| FieldRow {
            logical_name: f.logical_name.clone(),
            name: f.name.clone(),
            storage: f.storage_label(),
            alias: f.alias.clone(),
            nullable: if f.nullable { "Yes" } else { "No" }.to_string(),
        })
        .collect()
}

/// Rows of the reconciled field table.
#[must_use]
pub fn reconciled_rows(fields: &ReconciledFields) -> Vec<ReconciledRow> {
    fields
        .fields()
        .iter()
        .enumerate()
        .map(|(position, f)| ReconciledRow {
            column: format!("Col{}", position + pluto_core::reconcile::INDEX_COLUMN_OFFSET),
            logical_name: f.logical_name.clone(),
            storage: f.spec.storage_label(),
            registered: if f.registered { "Yes" } else { "No" }.to_string(),
        })
        .collect()
}

/// Display a run report: the stage table, then the published artifacts.
pub fn display_run_report(report: &RunReport) {
    println!("\n=== Stages ===");
    println!("{}", Table::new(stage_rows(report)));

    if let Some(count) = report.water_included {
        println!("Water-included features: {count}");
    }
    if let Some(count) = report.shoreline_clipped {
        println!("Shoreline-clipped features: {count}");
    }

    if let Some(manifest) = &report.manifest {
        println!(
            "\nPublished {} {} release dated {}:",
            manifest.release, manifest.variant, manifest.date
        );
        for workspace in &manifest.workspaces {
            println!("  {}", workspace.path.display());
            for artifact in workspace.with_disposition(Disposition::Rename) {
                if let Some(published) = &artifact.published_name {
                    println!("    {} -> {published}", artifact.name);
                }
            }
            for artifact in workspace.with_disposition(Disposition::Retain) {
                println!("    {}", artifact.name);
            }
        }
    }
    println!("\nTotal: {:.2?}", report.elapsed());
}

/// Display a schema in a formatted table.
pub fn display_schema(registry: &SchemaRegistry) {
    println!("\nSchema: {} ({} fields)", registry.source(), registry.len());
    println!("{}", Table::new(field_rows(registry)));
}

/// Display reconciled fields and the rendered column declaration.
pub fn display_reconciled(fields: &ReconciledFields, schema_ini: &str) {
    println!("\n=== Reconciled Fields ({}) ===", fields.len());
    println!("{}", Table::new(reconciled_rows(fields)));

    if !fields.excluded().is_empty() {
        println!("Excluded: {}", fields.excluded().join(", "));
    }
    let unregistered = fields.unregistered();
    if !unregistered.is_empty() {
        println!("Unregistered (kept as TEXT): {}", unregistered.join(", "));
    }

    println!("\n=== schema.ini ===");
    print!("{schema_ini}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pluto_core::pipeline::{Stage, StageRecord, StageStatus};
    use pluto_core::reconcile::{UnregisteredPolicy, reconcile};
    use pluto_core::schema::{FieldSpec, StorageType};
    use std::time::Duration;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_fields(
            "test",
            vec![
                FieldSpec::new("bbl", "BBL", StorageType::Double)
                    .with_precision(10)
                    .with_alias("BBL"),
                FieldSpec::text("address").with_length(28).with_nullable(false),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_stage_row_creation() {
        let report = RunReport {
            records: vec![
                StageRecord {
                    stage: Stage::Schema,
                    status: StageStatus::Succeeded,
                    elapsed: Duration::from_millis(5),
                    detail: "2 fields".to_string(),
                },
                StageRecord {
                    stage: Stage::Publish,
                    status: StageStatus::Skipped,
                    elapsed: Duration::ZERO,
                    detail: String::new(),
                },
            ],
            ..RunReport::default()
        };
        let rows = stage_rows(&report);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stage, Stage::Schema.to_string());
        assert_eq!(rows[0].status, "ok");
        assert_eq!(rows[0].detail, "2 fields");
        assert_eq!(rows[1].status, "skipped");
    }

    #[test]
    fn test_field_row_creation() {
        let rows = field_rows(&registry());
        assert_eq!(rows[0].name, "BBL");
        assert_eq!(rows[0].storage, "DOUBLE(10,0)");
        assert_eq!(rows[0].nullable, "Yes");
        assert_eq!(rows[1].storage, "TEXT(28)");
        assert_eq!(rows[1].nullable, "No");
    }

    #[test]
    fn test_reconciled_row_creation() {
        let header: Vec<String> = ["bbl", "address", "geom", "extra"]
            .map(String::from)
            .to_vec();
        let fields = reconcile(
            &header,
            &registry(),
            &["geom".to_string()],
            UnregisteredPolicy::PassThrough,
        )
        .unwrap();
        let rows = reconciled_rows(&fields);
        let columns: Vec<&str> = rows.iter().map(|r| r.column.as_str()).collect();
        assert_eq!(columns, vec!["Col2", "Col3", "Col4"]);
        assert_eq!(rows[2].logical_name, "extra");
        assert_eq!(rows[2].registered, "No");
        assert_eq!(rows[0].registered, "Yes");
    }
}
