//! Shoreline erase: subtract water polygons from the parcel features.

use geo::{Area, BooleanOps, BoundingRect, Intersects, MultiPolygon, Rect};
use rstar::{AABB, RTree, RTreeObject};
use tracing::{debug, info};

use crate::error::Result;
use crate::features::{FeatureCollection, reproject_polygons};

/// A bounding box in an R-tree, associated with an eraser polygon by index.
#[derive(Debug, Clone)]
struct BoundingBox {
    idx: usize,
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Subtract every `eraser` polygon from every feature of `features`.
///
/// Features that touch no eraser polygon are returned unchanged, features
/// entirely covered disappear, and the rest are clipped to their remaining
/// area. Attributes follow their feature. When both collections declare a
/// spatial reference and they differ, the eraser is reprojected first.
///
/// # Errors
///
/// Returns [`BackendError::Projection`](crate::error::BackendError::Projection)
/// if the eraser cannot be brought into the features' reference.
pub fn erase_features(features: &FeatureCollection, eraser: &FeatureCollection) -> Result<FeatureCollection> {
    if eraser.is_empty() {
        info!("Eraser is empty; {} features unchanged", features.len());
        return Ok(features.clone());
    }

    let eraser_polygons = match (features.spatial_reference(), eraser.spatial_reference()) {
        (Some(target), Some(source)) if target != source => {
            debug!("Reprojecting eraser from {} to {}", source, target);
            reproject_polygons(eraser.geometries(), source, target)?
        },
        _ => eraser.geometries().to_vec(),
    };

    let rtree = RTree::bulk_load(
        eraser_polygons
            .iter()
            .enumerate()
            .filter_map(|(idx, poly)| poly.bounding_rect().map(|bbox| BoundingBox { idx, bbox }))
            .collect(),
    );

    let mut kept = Vec::with_capacity(features.len());
    let mut geometries = Vec::with_capacity(features.len());
    let mut clipped = 0usize;

    for (idx, shape) in features.geometries().iter().enumerate() {
        let Some(rect) = shape.bounding_rect() else {
            kept.push(idx as u32);
            geometries.push(shape.clone());
            continue;
        };
        let search = AABB::from_corners(rect.min().into(), rect.max().into());
        let cutters: Vec<&MultiPolygon<f64>> = rtree
            .locate_in_envelope_intersecting(&search)
            .map(|b| &eraser_polygons[b.idx])
            .filter(|cutter| shape.intersects(*cutter))
            .collect();

        if cutters.is_empty() {
            kept.push(idx as u32);
            geometries.push(shape.clone());
            continue;
        }

        let mut remainder = shape.clone();
        for cutter in cutters {
            remainder = remainder.difference(cutter);
            if remainder.0.is_empty() {
                break;
            }
        }
        if remainder.0.is_empty() || remainder.unsigned_area() <= 0.0 {
            continue;
        }
        clipped += 1;
        kept.push(idx as u32);
        geometries.push(remainder);
    }

    info!(
        "Erase kept {} of {} features ({} clipped)",
        kept.len(),
        features.len(),
        clipped
    );
    let attributes = features.attributes().take(&kept)?;
    FeatureCollection::new(attributes, geometries, features.spatial_reference().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::SpatialReference;
    use crate::schema::FieldSpec;
    use crate::table::TypedTable;
    use geo::polygon;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ]])
    }

    fn collection(shapes: Vec<MultiPolygon<f64>>) -> FeatureCollection {
        const KEYS: [&str; 3] = ["1001", "1002", "1003"];
        let attributes = TypedTable::from_text_rows(
            vec![FieldSpec::text("BBL")],
            (0..shapes.len()).map(|i| vec![Some(KEYS[i])]),
        )
        .unwrap();
        FeatureCollection::new(attributes, shapes, None).unwrap()
    }

    #[test]
    fn test_erase_drops_clips_and_keeps() {
        let parcels = collection(vec![
            rect(0.0, 0.0, 1.0, 1.0),
            rect(10.0, 10.0, 11.0, 11.0),
            rect(20.0, 0.0, 22.0, 1.0),
        ]);
        let shoreline = collection(vec![rect(9.0, 9.0, 12.0, 12.0), rect(21.0, -1.0, 30.0, 2.0)]);

        let erased = erase_features(&parcels, &shoreline).unwrap();
        assert_eq!(erased.len(), 2);
        assert_eq!(erased.geometries()[0], parcels.geometries()[0]);
        assert!((erased.geometries()[1].unsigned_area() - 1.0).abs() < 1e-9);

        let keys = erased.attributes().doubles("t", "BBL").unwrap();
        assert_eq!(keys, vec![Some(1001.0), Some(1003.0)]);
    }

    #[test]
    fn test_erase_with_empty_eraser_is_identity() {
        let parcels = collection(vec![rect(0.0, 0.0, 1.0, 1.0)]);
        let empty = FeatureCollection::new(TypedTable::empty(vec![FieldSpec::text("BBL")]), Vec::new(), None).unwrap();
        let erased = erase_features(&parcels, &empty).unwrap();
        assert_eq!(erased.geometries(), parcels.geometries());
        assert_eq!(erased.len(), 1);
    }

    #[test]
    fn test_erase_with_nearby_but_disjoint_eraser() {
        let parcels = collection(vec![rect(0.0, 0.0, 1.0, 1.0)]);
        // Bounding boxes overlap but the polygons do not.
        let l_shape = MultiPolygon(vec![polygon![
            (x: 0.5, y: 2.0),
            (x: 3.0, y: 2.0),
            (x: 3.0, y: -1.0),
            (x: 2.0, y: -1.0),
            (x: 2.0, y: 1.5),
            (x: 0.5, y: 1.5),
        ]]);
        let erased = erase_features(&parcels, &collection(vec![l_shape])).unwrap();
        assert_eq!(erased.geometries(), parcels.geometries());
    }

    #[test]
    fn test_erase_reprojects_eraser_into_feature_reference() {
        let mercator = SpatialReference::from_epsg(3857).unwrap();
        let wgs84 = SpatialReference::from_epsg(4326).unwrap();
        let (attributes, shapes, _) = collection(vec![
            rect(0.0, 0.0, 100_000.0, 100_000.0),
            rect(333_000.0, 0.0, 443_000.0, 100_000.0),
        ])
        .into_parts();
        let parcels = FeatureCollection::new(attributes, shapes, Some(mercator.clone())).unwrap();
        let (attributes, shapes, _) = collection(vec![rect(-1.0, -1.0, 2.0, 2.0)]).into_parts();
        let shoreline = FeatureCollection::new(attributes, shapes, Some(wgs84)).unwrap();

        // Read as metres the shoreline would only nick the first parcel.
        let erased = erase_features(&parcels, &shoreline).unwrap();
        assert_eq!(erased.len(), 1);
        assert_eq!(erased.geometries()[0], parcels.geometries()[1]);
        assert_eq!(erased.spatial_reference(), Some(&mercator));
        assert_eq!(
            erased.attributes().doubles("t", "BBL").unwrap(),
            vec![Some(1002.0)]
        );
    }
}
