//! `GeoJSON` encoding of feature classes.
//!
//! A feature class is stored as one `FeatureCollection`. Attribute values are
//! written as JSON numbers for numeric columns and strings otherwise; the
//! declared reference travels in a legacy `crs` member so foreign files that
//! carry one are understood on import.

use std::convert::TryFrom;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geo::{Geometry, MultiPolygon};
use geojson::{Feature, FeatureCollection as GeoJsonCollection, GeoJson, JsonObject, JsonValue};
use pluto_core::error::{BackendError, PlutoError, Result, backend_io};
use pluto_core::features::{FeatureCollection, SpatialReference};
use pluto_core::schema::{FieldSpec, StorageType};
use pluto_core::table::{AppendMode, TypedTable, coerce_rows};
use tracing::{debug, warn};

/// Parsed `GeoJSON` feature with stringified properties and polygon geometry.
#[derive(Debug, Clone)]
struct FeatureRecord {
    properties: JsonObject,
    geometry: MultiPolygon<f64>,
}

fn format_error(path: &Path, message: impl Into<String>) -> PlutoError {
    BackendError::Format {
        format: "GeoJSON".to_string(),
        path: path.to_path_buf(),
        message: message.into(),
    }
    .into()
}

/// Read a feature file.
///
/// With `fields`, properties are typed per those declarations. Without, every
/// property becomes a text column in first-seen order and the reference is
/// taken from the file's `crs` member.
///
/// # Errors
///
/// Returns [`BackendError::Format`] if the file is not a polygon
/// `FeatureCollection`, or a coercion error if a property does not fit its
/// declared type.
pub fn read_features(
    path: &Path,
    fields: Option<&[FieldSpec]>,
    spatial_reference: Option<SpatialReference>,
) -> Result<FeatureCollection> {
    let file = File::open(path).map_err(|e| backend_io("open", path, e))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).map_err(|e| format_error(path, e.to_string()))?;

    let (records, crs) = match geojson {
        GeoJson::FeatureCollection(collection) => {
            let crs = crs_name(collection.foreign_members.as_ref());
            let records = collection
                .features
                .into_iter()
                .map(|f| feature_to_record(f, path))
                .collect::<Result<Vec<_>>>()?;
            (records, crs)
        },
        GeoJson::Feature(feature) => (vec![feature_to_record(feature, path)?], None),
        GeoJson::Geometry(_) => {
            return Err(format_error(path, "expected a FeatureCollection, found a bare geometry"));
        },
    };

    let spatial_reference = match (spatial_reference, crs) {
        (Some(declared), _) => Some(declared),
        (None, Some(name)) => match SpatialReference::parse(&name) {
            Ok(sr) => Some(sr),
            Err(err) => {
                warn!("Ignoring crs '{}' of {}: {}", name, path.display(), err);
                None
            },
        },
        (None, None) => None,
    };

    let fields: Vec<FieldSpec> = match fields {
        Some(fields) => fields.to_vec(),
        None => infer_fields(&records),
    };

    let values: Vec<Vec<Option<String>>> = records
        .iter()
        .map(|record| {
            fields
                .iter()
                .map(|field| property_text(&record.properties, &field.name))
                .collect()
        })
        .collect();
    let text = TypedTable::from_text_rows(
        fields.clone(),
        values
            .iter()
            .map(|row| row.iter().map(Option::as_deref).collect::<Vec<_>>()),
    )?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let attributes = coerce_rows(&text, &name, &fields, AppendMode::Coerce)?;

    let geometries = records.into_iter().map(|r| r.geometry).collect();
    debug!("Read {} features from {}", attributes.num_rows(), path.display());
    FeatureCollection::new(attributes, geometries, spatial_reference)
}

/// Write a feature class as a `GeoJSON` `FeatureCollection`.
///
/// # Errors
///
/// Returns a backend I/O error if the file cannot be written.
pub fn write_features(path: &Path, features: &FeatureCollection) -> Result<()> {
    let attributes = features.attributes();
    let mut out = Vec::with_capacity(features.len());

    for (row, polygon) in features.geometries().iter().enumerate() {
        let mut properties = JsonObject::new();
        for (col, field) in attributes.fields().iter().enumerate() {
            let value = attributes.value_string(col, row)?;
            properties.insert(field.name.clone(), property_value(field, value));
        }
        out.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(polygon))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }

    let foreign_members = features.spatial_reference().map(|sr| {
        let mut crs = JsonObject::new();
        crs.insert("type".to_string(), JsonValue::from("name"));
        crs.insert(
            "properties".to_string(),
            serde_json::json!({ "name": sr.name() }),
        );
        let mut members = JsonObject::new();
        members.insert("crs".to_string(), JsonValue::Object(crs));
        members
    });

    let collection = GeoJsonCollection {
        bbox: None,
        features: out,
        foreign_members,
    };
    std::fs::write(path, GeoJson::from(collection).to_string()).map_err(|e| backend_io("write", path, e))
}

fn feature_to_record(feature: Feature, path: &Path) -> Result<FeatureRecord> {
    let geometry = feature
        .geometry
        .ok_or_else(|| format_error(path, "feature without geometry"))?;
    let geometry = Geometry::<f64>::try_from(geometry)
        .map_err(|e| format_error(path, format!("Failed to convert GeoJSON geometry: {e}")))?;
    let geometry = match geometry {
        Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
        Geometry::MultiPolygon(polygons) => polygons,
        other => {
            return Err(format_error(
                path,
                format!("expected polygon geometry, found {}", describe_geometry(&other)),
            ));
        },
    };

    Ok(FeatureRecord {
        properties: feature.properties.unwrap_or_default(),
        geometry,
    })
}

fn infer_fields(records: &[FeatureRecord]) -> Vec<FieldSpec> {
    let mut fields: Vec<FieldSpec> = Vec::new();
    for record in records {
        for key in record.properties.keys() {
            if !fields.iter().any(|f| f.name.eq_ignore_ascii_case(key)) {
                fields.push(FieldSpec::text(key.clone()));
            }
        }
    }
    fields
}

fn property_text(properties: &JsonObject, name: &str) -> Option<String> {
    let value = properties
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)?;
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn property_value(field: &FieldSpec, value: Option<String>) -> JsonValue {
    let Some(value) = value else {
        return JsonValue::Null;
    };
    let number = match field.storage_type {
        StorageType::Text => None,
        StorageType::Integer16 | StorageType::Integer32 => value.parse::<i64>().ok().map(JsonValue::from),
        StorageType::Double => value
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number),
    };
    number.unwrap_or(JsonValue::String(value))
}

fn crs_name(members: Option<&JsonObject>) -> Option<String> {
    members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Helper to describe geometry kinds for error messages.
fn describe_geometry(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "point",
        Geometry::MultiPoint(_) => "multipoint",
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => "line",
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
            "polygon"
        },
        Geometry::GeometryCollection(_) => "geometry collection",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PARCELS: &str = r#"{
  "type": "FeatureCollection",
  "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::2263"}},
  "features": [
    {"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]},"properties":{"BBL":"1001","Shape_Area":1.0}},
    {"type":"Feature","geometry":{"type":"MultiPolygon","coordinates":[[[[2,0],[3,0],[3,1],[2,1],[2,0]]]]},"properties":{"BBL":1002,"Shape_Area":null}}
  ]
}"#;

    #[test]
    fn test_import_infers_text_fields_and_crs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dcp_mappluto_19v2.geojson");
        std::fs::write(&path, PARCELS).unwrap();

        let features = read_features(&path, None, None).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features.attributes().column_names(), vec!["BBL", "Shape_Area"]);
        assert_eq!(
            features.attributes().value_string(0, 1).unwrap().as_deref(),
            Some("1002")
        );
        assert_eq!(features.attributes().value_string(1, 1).unwrap(), None);
        assert_eq!(features.spatial_reference().unwrap().name(), "EPSG:2263");
    }

    #[test]
    fn test_write_then_read_with_declared_fields() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.geojson");
        std::fs::write(&source, PARCELS).unwrap();
        let fields = vec![
            FieldSpec::new("bbl", "BBL", StorageType::Double),
            FieldSpec::text("Shape_Area"),
        ];
        let features = read_features(&source, Some(&fields), None).unwrap();

        let target = dir.path().join("MapPLUTO.geojson");
        write_features(&target, &features).unwrap();
        let text = std::fs::read_to_string(&target).unwrap();
        assert!(text.contains("\"BBL\":1001.0") || text.contains("\"BBL\":1001"));
        assert!(text.contains("EPSG:2263"));

        let back = read_features(&target, Some(&fields), None).unwrap();
        assert_eq!(
            back.attributes().doubles("MapPLUTO", "BBL").unwrap(),
            vec![Some(1001.0), Some(1002.0)]
        );
        assert_eq!(back.geometries(), features.geometries());
    }

    #[test]
    fn test_rejects_points() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("points.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Point","coordinates":[1,2]},"properties":{}}]}"#,
        )
        .unwrap();
        let err = read_features(&path, None, None).unwrap_err();
        assert!(matches!(err, PlutoError::Backend(BackendError::Format { .. })));
    }
}
