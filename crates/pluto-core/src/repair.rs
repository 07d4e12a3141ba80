//! Geometry repair for the join source.
//!
//! Parcel exports carry the usual digitizing defects: repeated vertices,
//! collapsed rings and self-intersecting outlines. Each polygon is cleaned,
//! rebuilt through a union when it is still invalid, and oriented with
//! counter-clockwise exteriors. Features left without area are removed.

use geo::{
    Area, BooleanOps, LineString, MultiPolygon, Orient, Polygon, RemoveRepeatedPoints, Validation,
    orient::Direction,
};
use tracing::{debug, info};

use crate::error::Result;
use crate::features::FeatureCollection;

/// Counts of a [`repair_features`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Features whose geometry changed
    pub repaired: usize,
    /// Features removed because nothing of their geometry survived
    pub removed: usize,
}

impl RepairSummary {
    /// Returns `true` if any feature changed or was removed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.repaired > 0 || self.removed > 0
    }
}

fn usable_ring(ring: &LineString<f64>) -> Option<LineString<f64>> {
    let ring = ring.remove_repeated_points();
    let polygon = Polygon::new(ring, Vec::new());
    if polygon.exterior().0.len() < 4 || polygon.unsigned_area() <= 0.0 {
        return None;
    }
    Some(polygon.exterior().clone())
}

/// Repaired copy of one geometry; empty when nothing usable remains.
#[must_use]
pub fn repair_geometry(shape: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let cleaned: Vec<Polygon<f64>> = shape
        .iter()
        .filter_map(|polygon| {
            let exterior = usable_ring(polygon.exterior())?;
            let interiors = polygon.interiors().iter().filter_map(usable_ring).collect();
            Some(Polygon::new(exterior, interiors))
        })
        .collect();
    let mut repaired = MultiPolygon::new(cleaned);

    if !repaired.0.is_empty() && !repaired.is_valid() {
        repaired = repaired.union(&MultiPolygon::new(Vec::new()));
        repaired.0.retain(|p| p.unsigned_area() > 0.0);
    }
    repaired.orient(Direction::Default)
}

/// Repair every geometry of `features`, dropping features with no area left.
///
/// # Errors
///
/// Returns an error if the surviving attribute rows cannot be selected.
pub fn repair_features(features: &FeatureCollection) -> Result<(FeatureCollection, RepairSummary)> {
    let mut summary = RepairSummary::default();
    let mut kept = Vec::with_capacity(features.len());
    let mut geometries = Vec::with_capacity(features.len());

    for (idx, shape) in features.geometries().iter().enumerate() {
        let repaired = repair_geometry(shape);
        if repaired.0.is_empty() {
            debug!("Removing feature {} with no usable geometry", idx + 1);
            summary.removed += 1;
            continue;
        }
        if repaired != *shape {
            summary.repaired += 1;
        }
        kept.push(idx as u32);
        geometries.push(repaired);
    }

    info!(
        "Repair checked {} features: {} repaired, {} removed",
        features.len(),
        summary.repaired,
        summary.removed
    );
    let attributes = features.attributes().take(&kept)?;
    let repaired = FeatureCollection::new(attributes, geometries, features.spatial_reference().cloned())?;
    Ok((repaired, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use crate::table::TypedTable;
    use geo::polygon;

    fn collection(shapes: Vec<MultiPolygon<f64>>) -> FeatureCollection {
        let keys: Vec<String> = (0..shapes.len()).map(|i| (1001 + i).to_string()).collect();
        let attributes = TypedTable::from_text_rows(
            vec![FieldSpec::text("BBL")],
            keys.iter().map(|k| vec![Some(k.as_str())]),
        )
        .unwrap();
        FeatureCollection::new(attributes, shapes, None).unwrap()
    }

    fn square() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
        ]])
    }

    #[test]
    fn test_valid_geometry_is_unchanged() {
        assert_eq!(repair_geometry(&square()), square());
    }

    #[test]
    fn test_repeated_points_and_clockwise_ring() {
        let shape = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 0.0),
        ]]);
        let repaired = repair_geometry(&shape);
        assert_eq!(repaired.0[0].exterior().0.len(), 5);
        assert!(repaired.signed_area() > 0.0);
        assert!((repaired.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bowtie_becomes_valid() {
        let bowtie = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
        ]]);
        assert!(!bowtie.is_valid());
        let repaired = repair_geometry(&bowtie);
        assert!(repaired.is_valid());
        assert!((repaired.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_collapsed_hole_is_dropped() {
        let with_sliver = MultiPolygon(vec![polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0)],
            interiors: [[(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 3.0, y: 1.0)]],
        )]);
        let repaired = repair_geometry(&with_sliver);
        assert!(repaired.0[0].interiors().is_empty());
        assert!((repaired.unsigned_area() - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_repair_features_removes_empty_geometry() {
        let line = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 2.0, y: 0.0),
        ]]);
        let features = collection(vec![square(), line, square()]);
        let (repaired, summary) = repair_features(&features).unwrap();
        assert_eq!(summary, RepairSummary { repaired: 0, removed: 1 });
        assert!(summary.changed());
        assert_eq!(
            repaired.attributes().doubles("t", "BBL").unwrap(),
            vec![Some(1001.0), Some(1003.0)]
        );
    }

    #[test]
    fn test_repair_features_on_clean_input() {
        let (repaired, summary) = repair_features(&collection(vec![square()])).unwrap();
        assert!(!summary.changed());
        assert_eq!(repaired.geometries(), &[square()]);
    }
}
