//! Feature collections: parcel polygons with typed attributes.

use std::fmt;

use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, Result};
use crate::table::TypedTable;

/// Coordinate reference system, kept as a PROJ.4 definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialReference {
    name: String,
    proj4: String,
}

impl SpatialReference {
    /// Parse `EPSG:<code>`, an OGC URN or a raw PROJ.4 string.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Projection`] for unknown EPSG codes or
    /// unrecognised text.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.starts_with('+') {
            return Ok(Self {
                name: text.to_string(),
                proj4: text.to_string(),
            });
        }
        let upper = text.to_ascii_uppercase();
        if upper.starts_with("EPSG:") || upper.starts_with("URN:OGC:DEF:CRS:EPSG:") {
            let code = upper
                .rsplit(':')
                .next()
                .and_then(|c| c.parse::<u32>().ok())
                .ok_or_else(|| BackendError::Projection {
                    message: format!("invalid EPSG reference '{text}'"),
                })?;
            return Self::from_epsg(code);
        }
        Err(BackendError::Projection {
            message: format!("unrecognised spatial reference '{text}'"),
        }
        .into())
    }

    /// Built-in definitions for the references this pipeline meets.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Projection`] for codes without a definition.
    pub fn from_epsg(code: u32) -> Result<Self> {
        let proj4 = match code {
            4326 => "+proj=longlat +datum=WGS84 +no_defs",
            4269 => "+proj=longlat +datum=NAD83 +no_defs",
            3857 => {
                "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
            },
            // NAD83 / New York Long Island (ftUS)
            2263 => {
                "+proj=lcc +lat_0=40.1666666666667 +lon_0=-74 +lat_1=41.0333333333333 \
                 +lat_2=40.6666666666667 +x_0=300000.0000000001 +y_0=0 +datum=NAD83 \
                 +units=us-ft +no_defs"
            },
            other => {
                return Err(BackendError::Projection {
                    message: format!("no built-in definition for EPSG:{other}"),
                }
                .into());
            },
        };
        Ok(Self {
            name: format!("EPSG:{code}"),
            proj4: proj4.to_string(),
        })
    }

    /// Display name (`EPSG:<code>` or the PROJ.4 string).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// PROJ.4 definition.
    #[must_use]
    pub fn proj4(&self) -> &str {
        &self.proj4
    }

    /// Returns `true` for longitude/latitude references.
    #[must_use]
    pub fn is_geographic(&self) -> bool {
        self.proj4.contains("+proj=longlat") || self.proj4.contains("+proj=latlong")
    }

    fn proj(&self) -> Result<Proj> {
        Proj::from_proj_string(&self.proj4).map_err(|e| {
            BackendError::Projection {
                message: format!("failed to build PROJ.4 '{}': {e}", self.proj4),
            }
            .into()
        })
    }
}

impl PartialEq for SpatialReference {
    fn eq(&self, other: &Self) -> bool {
        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        normalize(&self.proj4) == normalize(&other.proj4)
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Polygon geometries with one attribute row per geometry.
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    attributes: TypedTable,
    geometries: Vec<MultiPolygon<f64>>,
    spatial_reference: Option<SpatialReference>,
}

impl FeatureCollection {
    /// Pair attribute rows with geometries.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Geometry`] if the counts differ.
    pub fn new(
        attributes: TypedTable,
        geometries: Vec<MultiPolygon<f64>>,
        spatial_reference: Option<SpatialReference>,
    ) -> Result<Self> {
        if attributes.num_rows() != geometries.len() {
            return Err(BackendError::Geometry {
                message: format!(
                    "{} attribute rows for {} geometries",
                    attributes.num_rows(),
                    geometries.len()
                ),
            }
            .into());
        }
        Ok(Self {
            attributes,
            geometries,
            spatial_reference,
        })
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    /// Returns `true` if there are no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Attribute table.
    #[must_use]
    pub fn attributes(&self) -> &TypedTable {
        &self.attributes
    }

    /// Geometries, aligned with attribute rows.
    #[must_use]
    pub fn geometries(&self) -> &[MultiPolygon<f64>] {
        &self.geometries
    }

    /// Declared spatial reference.
    #[must_use]
    pub fn spatial_reference(&self) -> Option<&SpatialReference> {
        self.spatial_reference.as_ref()
    }

    /// Replace the attribute table, keeping geometries.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Geometry`] if the row count changes.
    pub fn with_attributes(&self, attributes: TypedTable) -> Result<Self> {
        Self::new(
            attributes,
            self.geometries.clone(),
            self.spatial_reference.clone(),
        )
    }

    /// Features at the given positions.
    ///
    /// # Errors
    ///
    /// Returns an error if an index is out of bounds.
    pub fn take(&self, indices: &[u32]) -> Result<Self> {
        let attributes = self.attributes.take(indices)?;
        let geometries = indices
            .iter()
            .map(|&i| self.geometries[i as usize].clone())
            .collect();
        Self::new(attributes, geometries, self.spatial_reference.clone())
    }

    /// Split into attributes, geometries and reference.
    #[must_use]
    pub fn into_parts(self) -> (TypedTable, Vec<MultiPolygon<f64>>, Option<SpatialReference>) {
        (self.attributes, self.geometries, self.spatial_reference)
    }

    /// Transform every coordinate into `target`.
    ///
    /// A collection already in `target` is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Projection`] if the collection has no spatial
    /// reference or a coordinate cannot be transformed.
    pub fn reproject(&self, target: &SpatialReference) -> Result<Self> {
        let source = self.spatial_reference.as_ref().ok_or_else(|| BackendError::Projection {
            message: "collection declares no spatial reference".to_string(),
        })?;
        if source == target {
            return Ok(self.clone());
        }

        let geometries = reproject_polygons(&self.geometries, source, target)?;
        Self::new(self.attributes.clone(), geometries, Some(target.clone()))
    }
}

/// Transform polygons from `source` into `target`.
///
/// # Errors
///
/// Returns [`BackendError::Projection`] if a coordinate cannot be transformed.
pub fn reproject_polygons(
    polygons: &[MultiPolygon<f64>],
    source: &SpatialReference,
    target: &SpatialReference,
) -> Result<Vec<MultiPolygon<f64>>> {
    let from = source.proj()?;
    let to = target.proj()?;
    let radians_in = source.is_geographic();
    let degrees_out = target.is_geographic();

    polygons
        .iter()
        .map(|shape| {
            shape.try_map_coords(|coord: Coord<f64>| {
                let mut point = if radians_in {
                    (coord.x.to_radians(), coord.y.to_radians(), 0.0)
                } else {
                    (coord.x, coord.y, 0.0)
                };
                transform(&from, &to, &mut point).map_err(|e| BackendError::Projection {
                    message: format!("cannot transform ({}, {}): {e}", coord.x, coord.y),
                })?;
                Ok::<_, BackendError>(if degrees_out {
                    Coord {
                        x: point.0.to_degrees(),
                        y: point.1.to_degrees(),
                    }
                } else {
                    Coord {
                        x: point.0,
                        y: point.1,
                    }
                })
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use geo::polygon;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    fn collection(sr: Option<SpatialReference>) -> FeatureCollection {
        let attributes =
            TypedTable::from_text_rows(vec![FieldSpec::text("BBL")], vec![vec![Some("1001")]])
                .unwrap();
        FeatureCollection::new(attributes, vec![square(0.0, 0.0, 1.0)], sr).unwrap()
    }

    #[test]
    fn test_parse_references() {
        assert_eq!(SpatialReference::parse("EPSG:2263").unwrap().name(), "EPSG:2263");
        assert_eq!(
            SpatialReference::parse("urn:ogc:def:crs:EPSG::4326").unwrap(),
            SpatialReference::from_epsg(4326).unwrap()
        );
        assert!(SpatialReference::parse("+proj=longlat +datum=WGS84 +no_defs")
            .unwrap()
            .is_geographic());
        assert!(SpatialReference::parse("EPSG:99999").is_err());
        assert!(SpatialReference::parse("State Plane").is_err());
    }

    #[test]
    fn test_new_checks_lengths() {
        let attributes = TypedTable::empty(vec![FieldSpec::text("BBL")]);
        assert!(FeatureCollection::new(attributes, vec![square(0.0, 0.0, 1.0)], None).is_err());
    }

    #[test]
    fn test_reproject_same_reference_is_noop() {
        let wgs84 = SpatialReference::from_epsg(4326).unwrap();
        let fc = collection(Some(wgs84.clone()));
        let out = fc.reproject(&wgs84).unwrap();
        assert_eq!(out.geometries(), fc.geometries());
    }

    #[test]
    fn test_reproject_without_reference_fails() {
        let fc = collection(None);
        assert!(fc.reproject(&SpatialReference::from_epsg(4326).unwrap()).is_err());
    }

    #[test]
    fn test_reproject_origin_to_mercator() {
        let fc = collection(Some(SpatialReference::from_epsg(4326).unwrap()));
        let mercator = SpatialReference::from_epsg(3857).unwrap();
        let out = fc.reproject(&mercator).unwrap();
        let first = out.geometries()[0].0[0].exterior().0[0];
        assert!(first.x.abs() < 1e-6);
        assert!(first.y.abs() < 1e-6);
        let second = out.geometries()[0].0[0].exterior().0[1];
        assert!((second.x - 111_319.49).abs() < 1.0);
        assert_eq!(out.spatial_reference(), Some(&mercator));
    }
}
