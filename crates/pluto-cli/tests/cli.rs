use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SCHEMA: &str = r#"{
  "bbl": ["BBL", "DOUBLE", 10, 0, "", "BBL", "NULLABLE"],
  "address": ["Address", "TEXT", "", "", 28, "Address", "NULLABLE"],
  "plutomapid": ["PLUTOMapID", "TEXT", "", "", 1, "PLUTO Map ID", "NULLABLE"]
}"#;

const EXTRACT: &str = "\
bbl,address,plutomapid,geom
1001,1 MAIN ST,1,
1002,2 MAIN ST,1,
1003,3 MAIN ST,4,
";

const SHORELINE_CATALOG: &str = r#"{
  "objects": [
    {
      "name": "Shoreline_Polygon",
      "kind": "feature_class",
      "fields": [{"logical_name": "Name", "name": "Name", "storage_type": "TEXT", "length": 255}]
    }
  ]
}"#;

const SHORELINE: &str = r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[15,-5],[35,-5],[35,15],[15,15],[15,-5]]]},"properties":{"Name":"water"}}]}"#;

const PARCELS: &str = r#"{"type":"FeatureCollection","features":[
{"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,10],[0,0]]]},"properties":{"BBL":"1001"}},
{"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[20,0],[30,0],[30,10],[20,10],[20,0]]]},"properties":{"BBL":"1002"}},
{"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[40,0],[50,0],[50,10],[40,10],[40,0]]]},"properties":{"BBL":"1003"}}
]}"#;

fn write_fixture(root: &Path) -> std::path::PathBuf {
    fs::write(root.join("schema.json"), SCHEMA).unwrap();
    fs::write(root.join("pluto_19v2.csv"), EXTRACT).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(root.join("data/dcp_mappluto_19v2.geojson"), PARCELS).unwrap();

    let dcp = root.join("dof/DOF_Export_TaxMap_20190830.gdb/DCP");
    fs::create_dir_all(&dcp).unwrap();
    fs::write(dcp.join("catalog.json"), SHORELINE_CATALOG).unwrap();
    fs::write(dcp.join("Shoreline_Polygon.geojson"), SHORELINE).unwrap();

    let config = root.join("pluto.toml");
    fs::write(
        &config,
        format!(
            r"
[paths]
log_path = '{root}/logs/mappluto.log'
data_path = '{root}/data'
output_csv = '{root}/data/pluto_{{version}}_intermediate.csv'
fgdb_path = '{root}/fgdb'
x_path = '{root}/x'
dof_path = '{root}/dof'
original_input_csv = '{root}/pluto_{{version}}.csv'
original_schema_path = '{root}/schema.json'
",
            root = root.display()
        ),
    )
    .unwrap();
    config
}

fn pluto() -> Command {
    Command::cargo_bin("pluto").unwrap()
}

#[test]
fn test_help_lists_commands() {
    pluto()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("schema"))
        .stdout(predicate::str::contains("reconcile"));
}

#[test]
fn test_schema_embedded() {
    pluto()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("Schema: embedded"))
        .stdout(predicate::str::contains("Borough"));
}

#[test]
fn test_schema_missing_file_fails() {
    pluto()
        .args(["schema", "--path", "/nonexistent/schema.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/schema.json"));
}

#[test]
fn test_reconcile_prints_schema_ini() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());
    let input = dir.path().join("pluto_19v2.csv");
    let schema = dir.path().join("schema.json");

    pluto()
        .arg("reconcile")
        .arg("--input")
        .arg(&input)
        .arg("--schema")
        .arg(&schema)
        .assert()
        .success()
        .stdout(predicate::str::contains("[pluto_19v2.csv]"))
        .stdout(predicate::str::contains("Col2=bbl DOUBLE"))
        .stdout(predicate::str::contains("Col4=plutomapid TEXT"))
        .stdout(predicate::str::contains("Excluded: geom"));
}

#[test]
fn test_run_publishes_release() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let config = write_fixture(root);

    pluto()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .args(["--release", "19v2", "--date", "09_30_2019"])
        .assert()
        .success()
        .stdout(predicate::str::contains("publish"))
        .stdout(predicate::str::contains("Shoreline-clipped features: 2"));

    let out = root.join("x/19v2/output/originals");
    assert!(out.join("MapPLUTO_ShorelineClip_Original_09_30_2019.gdb/MapPLUTO.geojson").is_file());
    assert!(out.join("MapPLUTO_WaterArea_Original_09_30_2019.gdb/MapPLUTO_UNCLIPPED.geojson").is_file());

    let manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(out.join("publish_Original_09_30_2019.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest["release"], "19v2");
    assert!(!root.join("logs/mappluto.log").exists());

    // Publishing the same release twice is refused unless forced.
    pluto()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .args(["--release", "19v2", "--date", "09_30_2019"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PIPELINE ERRORS:"));
    assert!(root.join("logs/mappluto.log").is_file());

    pluto()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .args(["--release", "19v2", "--date", "09_30_2019", "--force"])
        .assert()
        .success();
}

#[test]
fn test_failed_run_appends_log() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let config = write_fixture(root);
    fs::write(root.join("pluto_19v2.csv"), "bbl,address\n1001,1 MAIN ST\n").unwrap();

    pluto()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .args(["--release", "19v2", "--date", "09_30_2019"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("stage 'reconcile'"))
        .stderr(predicate::str::contains("plutomapid"));

    let log = fs::read_to_string(root.join("logs/mappluto.log")).unwrap();
    assert!(log.contains("PIPELINE ERRORS:"));
    assert!(log.contains("Error Kind: schema"));
    assert!(log.contains("BACKEND MESSAGES:"));
}

#[test]
fn test_run_rejects_bad_date() {
    pluto()
        .args(["run", "--config", "pluto.toml", "--release", "19v2", "--date", "2019-09-30"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("MM_DD_YYYY"));
}
