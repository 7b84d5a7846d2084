use crate::core::geometry::{closest_on_segment, line_parts, IndexedSegment, COORD_EPSILON};
use crate::domain::model::Layer;
use geo::{Coord, Geometry, MultiPoint, Point};
use rstar::RTree;
use serde::{Deserialize, Serialize};

/// 點吸附方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapBehavior {
    /// 吸附到參考幾何上最近的位置
    #[default]
    ClosestPoint,
    /// 容差內有頂點就吸附到頂點，否則退回最近位置
    PreferVertices,
}

/// 以參考線建立的吸附器，每個群組建立一次
pub struct PointSnapper {
    segments: RTree<IndexedSegment>,
    vertices: RTree<[f64; 2]>,
    tolerance: f64,
    behavior: SnapBehavior,
}

impl PointSnapper {
    pub fn new(reference: &Layer, tolerance: f64, behavior: SnapBehavior) -> Self {
        let mut segments = Vec::new();
        let mut vertices = Vec::new();

        for (feature, f) in reference.features.iter().enumerate() {
            for (part, line) in line_parts(&f.geometry).into_iter().enumerate() {
                vertices.extend(line.0.iter().map(|c| [c.x, c.y]));
                for (segment, l) in line.lines().enumerate() {
                    segments.push(IndexedSegment {
                        line: l,
                        feature,
                        part,
                        segment,
                    });
                }
            }
        }

        Self {
            segments: RTree::bulk_load(segments),
            vertices: RTree::bulk_load(vertices),
            tolerance,
            behavior,
        }
    }

    pub fn has_reference(&self) -> bool {
        self.segments.size() > 0
    }

    /// 回傳吸附後的座標；容差外或已在參考幾何上時原樣回傳
    pub fn snap_coord(&self, c: Coord<f64>) -> Coord<f64> {
        if self.tolerance <= 0.0 {
            return c;
        }

        let query = [c.x, c.y];
        let Some((segment, d2)) = self.segments.nearest_neighbor_iter_with_distance_2(&query).next() else {
            return c;
        };
        if d2 <= COORD_EPSILON * COORD_EPSILON || d2 > self.tolerance * self.tolerance {
            return c;
        }

        if self.behavior == SnapBehavior::PreferVertices {
            if let Some((vertex, v2)) = self.vertices.nearest_neighbor_iter_with_distance_2(&query).next() {
                if v2 <= self.tolerance * self.tolerance {
                    return Coord {
                        x: vertex[0],
                        y: vertex[1],
                    };
                }
            }
        }

        closest_on_segment(segment.line, c)
    }

    pub fn snap_geometry(&self, geometry: &Geometry<f64>) -> Geometry<f64> {
        match geometry {
            Geometry::Point(p) => Geometry::Point(Point::from(self.snap_coord(p.0))),
            Geometry::MultiPoint(mp) => Geometry::MultiPoint(MultiPoint::new(
                mp.0.iter().map(|p| Point::from(self.snap_coord(p.0))).collect(),
            )),
            other => other.clone(),
        }
    }

    pub fn snap_layer(&self, points: &Layer, name: impl Into<String>) -> Layer {
        let mut out = Layer::new(name, points.crs.clone(), points.geometry_type, points.fields.clone());
        out.features = points
            .features
            .iter()
            .map(|f| {
                let mut snapped = f.clone();
                snapped.geometry = self.snap_geometry(&f.geometry);
                snapped
            })
            .collect();
        out
    }
}

/// 把點吸附到參考線上；沒有參考線時所有點維持原位
pub fn snap_points(points: &Layer, reference: &Layer, tolerance: f64, behavior: SnapBehavior) -> Layer {
    let snapper = PointSnapper::new(reference, tolerance, behavior);
    let name = format!("snapped_{}", points.name);
    let out = snapper.snap_layer(points, name);

    let moved = points
        .features
        .iter()
        .zip(&out.features)
        .filter(|(a, b)| a.geometry != b.geometry)
        .count();
    tracing::debug!("📍 Snapped {}/{} points of '{}'", moved, points.len(), points.name);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Crs, Feature, Field, FieldKind, Fields, GeometryType};
    use geo::{line_string, point};
    use serde_json::Value;

    fn reference() -> Layer {
        let fields = Fields::new(vec![Field::new("name", FieldKind::String)]);
        Layer::new("canals_A", Crs::unknown(), GeometryType::LineString, fields).with_features(vec![Feature::new(
            1,
            line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0)].into(),
            vec![Value::from("A")],
        )])
    }

    fn points(coords: &[(f64, f64)]) -> Layer {
        let fields = Fields::new(vec![Field::new("canal", FieldKind::String)]);
        Layer::new("points_A", Crs::unknown(), GeometryType::Point, fields).with_features(
            coords
                .iter()
                .enumerate()
                .map(|(i, (x, y))| Feature::new(i as u64 + 1, point!(x: *x, y: *y).into(), vec![Value::from("A")]))
                .collect(),
        )
    }

    fn coord(layer: &Layer, i: usize) -> Coord<f64> {
        match &layer.features[i].geometry {
            Geometry::Point(p) => p.0,
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    #[test]
    fn test_points_within_tolerance_land_on_line() {
        let pts = points(&[(3.0, 0.4), (10.3, 5.0)]);

        let out = snap_points(&pts, &reference(), 0.5, SnapBehavior::ClosestPoint);

        let near = |a: Coord<f64>, b: Coord<f64>| (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9;
        assert!(near(coord(&out, 0), Coord { x: 3.0, y: 0.0 }));
        assert!(near(coord(&out, 1), Coord { x: 10.0, y: 5.0 }));
        assert_eq!(out.fields, pts.fields);
    }

    #[test]
    fn test_points_beyond_tolerance_are_unchanged() {
        let pts = points(&[(3.0, 0.6)]);

        let out = snap_points(&pts, &reference(), 0.5, SnapBehavior::ClosestPoint);

        assert_eq!(out.features[0], pts.features[0]);
    }

    #[test]
    fn test_snap_is_idempotent() {
        let pts = points(&[(3.3, 0.2), (7.1, -0.45), (9.8, 3.7), (12.0, 12.0)]);
        let snapper = PointSnapper::new(&reference(), 0.5, SnapBehavior::ClosestPoint);

        let once = snapper.snap_layer(&pts, "once");
        let twice = snapper.snap_layer(&once, "twice");

        assert_eq!(once.features, twice.features);
    }

    #[test]
    fn test_empty_reference_is_a_no_op() {
        let pts = points(&[(3.0, 0.1)]);
        let empty = reference().materialize("empty", &[]);

        let snapper = PointSnapper::new(&empty, 0.5, SnapBehavior::ClosestPoint);
        assert!(!snapper.has_reference());
        assert_eq!(snapper.snap_layer(&pts, "out").features, pts.features);
    }

    #[test]
    fn test_prefer_vertices_picks_node() {
        let pts = points(&[(9.7, 0.2)]);

        let out = snap_points(&pts, &reference(), 0.5, SnapBehavior::PreferVertices);

        assert_eq!(coord(&out, 0), Coord { x: 10.0, y: 0.0 });
    }

    #[test]
    fn test_zero_tolerance_does_not_move() {
        let pts = points(&[(3.0, 0.1)]);

        let out = snap_points(&pts, &reference(), 0.0, SnapBehavior::ClosestPoint);

        assert_eq!(out.features, pts.features);
    }
}
