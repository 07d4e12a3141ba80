//! End-to-end run of the pipeline against folder workspaces on disk.

use std::fs;
use std::path::Path;

use geo::{MultiPolygon, polygon};
use pluto_core::config::Config;
use pluto_core::features::FeatureCollection;
use pluto_core::manifest::PublishManifest;
use pluto_core::pipeline::Pipeline;
use pluto_core::schema::FieldSpec;
use pluto_core::store::{GeometryStore, Workspace};
use pluto_core::table::TypedTable;
use pluto_core::types::{ReleaseVariant, RunDate, RunParameters};
use pluto_fgdb::FolderStore;
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
1003,3 MAIN ST,1,
1004,4 MAIN ST,2,
1005,5 MAIN ST,4,
";

fn square_feature(bbl: &str, x: f64) -> String {
    format!(
        r#"{{"type":"Feature","geometry":{{"type":"Polygon","coordinates":[[[{x},0],[{x1},0],[{x1},10],[{x},10],[{x},0]]]}},"properties":{{"BBL":"{bbl}"}}}}"#,
        x1 = x + 10.0
    )
}

fn join_source() -> String {
    let features: Vec<String> = [("1001", 0.0), ("1002", 20.0), ("1003", 40.0), ("1006", 60.0)]
        .iter()
        .map(|(bbl, x)| square_feature(bbl, *x))
        .collect();
    format!(
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"EPSG:2263"}}}},"features":[{}]}}"#,
        features.join(",")
    )
}

fn shoreline() -> FeatureCollection {
    let attributes = TypedTable::from_text_rows(vec![FieldSpec::text("Name")], [vec![Some("water")]]).unwrap();
    let water = MultiPolygon(vec![polygon![
        (x: 15.0, y: -5.0),
        (x: 35.0, y: -5.0),
        (x: 35.0, y: 15.0),
        (x: 15.0, y: 15.0),
    ]]);
    FeatureCollection::new(attributes, vec![water], None).unwrap()
}

fn setup(root: &Path) -> Config {
    fs::write(root.join("schema.json"), SCHEMA).unwrap();
    fs::write(root.join("pluto_19v2.csv"), EXTRACT).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(root.join("data/dcp_mappluto_19v2.geojson"), join_source()).unwrap();

    let toml = format!(
        r"
[paths]
log_path = '{root}/mappluto.log'
data_path = '{root}/data'
output_csv = '{root}/data/pluto_{{version}}_intermediate.csv'
fgdb_path = '{root}/fgdb'
x_path = '{root}/x'
dof_path = '{root}/dof'
original_input_csv = '{root}/pluto_{{version}}.csv'
original_schema_path = '{root}/schema.json'
",
        root = root.display()
    );
    Config::from_toml_str(&toml, Path::new("pluto.toml")).unwrap()
}

#[test]
fn test_pipeline_on_disk() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let mut config = setup(root);

    let mut store = FolderStore::new();
    let dcp = Workspace::new(root.join("dof/DOF_Export_TaxMap_20190830.gdb/DCP"));
    store.create_workspace(&dcp).unwrap();
    store.write_features(&dcp, "Shoreline_Polygon", &shoreline()).unwrap();

    let mut params = RunParameters::new("19v2", ReleaseVariant::Corrected);
    params.date = RunDate::parse("09_30_2019").unwrap();

    // The corrected variant needs its own inputs.
    config.paths.corrections_input_csv = config.paths.original_input_csv.clone();
    config.paths.corrections_schema_path = config.paths.original_schema_path.clone();
    let paths = config.resolve(&params).unwrap();

    let report = Pipeline::new(&mut store, params, paths, config.pipeline).run();
    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.water_included, Some(3));
    assert_eq!(report.shoreline_clipped, Some(2));

    let out = root.join("x/19v2/output/corrections");
    let published_clip = Workspace::new(out.join("MapPLUTO_ShorelineClip_Corrected_09_30_2019.gdb"));
    let published_water = Workspace::new(out.join("MapPLUTO_WaterArea_Corrected_09_30_2019.gdb"));
    assert_eq!(
        store.list_feature_classes(&published_clip).unwrap(),
        vec!["MapPLUTO_Corrected".to_string()]
    );
    assert_eq!(
        store.list_feature_classes(&published_water).unwrap(),
        vec!["MapPLUTO_UNCLIPPED_Corrected".to_string()]
    );
    assert!(published_clip.path().join("MapPLUTO_Corrected.geojson").is_file());
    assert!(published_water.path().join("NOT_MAPPED_LOTS_UNCLIPPED.csv").is_file());
    assert!(!published_water.path().join("MapPLUTO_final.csv").exists());

    let clipped = store.read_features(&published_clip, "MapPLUTO_Corrected").unwrap();
    assert_eq!(
        clipped.attributes().doubles("MapPLUTO_Corrected", "BBL").unwrap(),
        vec![Some(1001.0), Some(1003.0)]
    );
    assert_eq!(clipped.spatial_reference().unwrap().name(), "EPSG:2263");
    assert_eq!(
        store.indexes(&published_clip, "MapPLUTO_Corrected").unwrap()[0].name,
        "BBL_Shore"
    );

    let manifest: PublishManifest =
        serde_json::from_str(&fs::read_to_string(out.join("publish_Corrected_09_30_2019.json")).unwrap())
            .unwrap();
    assert_eq!(manifest.date, "09_30_2019");
    assert_eq!(manifest.workspaces.len(), 2);

    assert!(root.join("data/schema.ini").is_file());
    assert!(!root.join("mappluto.log").exists());
}
