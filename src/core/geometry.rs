use geo::{Closest, ClosestPoint, Coord, Geometry, Line, LineString, MultiLineString, Point};
use rstar::{PointDistance, RTreeObject, AABB};
use std::cmp::Ordering;

/// 視為同一座標的距離
pub(crate) const COORD_EPSILON: f64 = 1e-9;

pub(crate) fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

pub(crate) fn same_coord(a: Coord<f64>, b: Coord<f64>) -> bool {
    distance(a, b) <= COORD_EPSILON
}

pub(crate) fn closest_on_segment(line: Line<f64>, target: Coord<f64>) -> Coord<f64> {
    match line.closest_point(&Point::from(target)) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => p.0,
        Closest::Indeterminate => line.start,
    }
}

/// 線段加上它在圖層中的位置 (要素、部件、線段序號)
#[derive(Clone, Copy, Debug)]
pub(crate) struct IndexedSegment {
    pub line: Line<f64>,
    pub feature: usize,
    pub part: usize,
    pub segment: usize,
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (a, b) = (self.line.start, self.line.end);
        AABB::from_corners([a.x.min(b.x), a.y.min(b.y)], [a.x.max(b.x), a.y.max(b.y)])
    }
}

impl PointDistance for IndexedSegment {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let target = Coord {
            x: point[0],
            y: point[1],
        };
        let d = distance(closest_on_segment(self.line, target), target);
        d * d
    }
}

/// 取出線要素的所有部件；非線幾何回傳空集合
pub(crate) fn line_parts(geometry: &Geometry<f64>) -> Vec<LineString<f64>> {
    match geometry {
        Geometry::LineString(ls) => vec![ls.clone()],
        Geometry::MultiLineString(mls) => mls.0.clone(),
        Geometry::Line(line) => vec![LineString::from(vec![line.start, line.end])],
        _ => Vec::new(),
    }
}

pub(crate) fn from_parts(mut parts: Vec<LineString<f64>>, multi: bool) -> Geometry<f64> {
    if !multi && parts.len() == 1 {
        Geometry::LineString(parts.remove(0))
    } else {
        Geometry::MultiLineString(MultiLineString::new(parts))
    }
}

/// 把 (線段序號, 座標) 插入到部件中，已存在的頂點不重複插入
pub(crate) fn insert_vertices(part: &mut LineString<f64>, mut insertions: Vec<(usize, Coord<f64>)>) {
    if insertions.is_empty() || part.0.len() < 2 {
        return;
    }

    let coords = &part.0;
    insertions.sort_by(|(seg_a, a), (seg_b, b)| {
        seg_a.cmp(seg_b).then_with(|| {
            let start = coords[*seg_a];
            distance(start, *a)
                .partial_cmp(&distance(start, *b))
                .unwrap_or(Ordering::Equal)
        })
    });

    let mut result: Vec<Coord<f64>> = Vec::with_capacity(coords.len() + insertions.len());
    let mut pending = insertions.into_iter().peekable();

    for (i, coord) in coords.iter().enumerate() {
        push_distinct(&mut result, *coord);
        if i + 1 == coords.len() {
            break;
        }
        let next = coords[i + 1];
        while let Some((segment, c)) = pending.peek().copied() {
            if segment != i {
                break;
            }
            pending.next();
            if !same_coord(c, next) {
                push_distinct(&mut result, c);
            }
        }
    }

    part.0 = result;
}

fn push_distinct(coords: &mut Vec<Coord<f64>>, c: Coord<f64>) {
    match coords.last() {
        Some(last) if same_coord(*last, c) => {}
        _ => coords.push(c),
    }
}

/// 在指定的切點把部件切成多段；切點必須已經是頂點
pub(crate) fn split_at(part: &LineString<f64>, cuts: &[Coord<f64>]) -> Vec<LineString<f64>> {
    let coords = &part.0;
    if coords.len() < 3 || cuts.is_empty() {
        return vec![part.clone()];
    }

    let mut pieces = Vec::new();
    let mut current = vec![coords[0]];
    for (i, coord) in coords.iter().enumerate().skip(1) {
        current.push(*coord);
        let interior = i + 1 < coords.len();
        if interior && cuts.iter().any(|c| same_coord(*c, *coord)) {
            pieces.push(LineString::from(std::mem::replace(&mut current, vec![*coord])));
        }
    }
    pieces.push(LineString::from(current));
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    #[test]
    fn test_insert_vertices_orders_along_segment() {
        let mut part = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0)];
        insert_vertices(
            &mut part,
            vec![
                (0, Coord { x: 7.0, y: 0.0 }),
                (1, Coord { x: 10.0, y: 5.0 }),
                (0, Coord { x: 3.0, y: 0.0 }),
                (0, Coord { x: 0.0, y: 0.0 }),
            ],
        );

        let xs: Vec<(f64, f64)> = part.0.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(
            xs,
            vec![(0.0, 0.0), (3.0, 0.0), (7.0, 0.0), (10.0, 0.0), (10.0, 5.0), (10.0, 10.0)]
        );
    }

    #[test]
    fn test_split_at_interior_vertex() {
        let part = line_string![(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 10.0, y: 0.0)];
        let pieces = split_at(&part, &[Coord { x: 5.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 }]);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].0.last(), Some(&Coord { x: 5.0, y: 0.0 }));
        assert_eq!(pieces[1].0.first(), Some(&Coord { x: 5.0, y: 0.0 }));
    }

    #[test]
    fn test_segment_distance_uses_closest_point() {
        let segment = IndexedSegment {
            line: Line::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 0.0 }),
            feature: 0,
            part: 0,
            segment: 0,
        };
        assert!((segment.distance_2(&[5.0, 3.0]) - 9.0).abs() < 1e-12);
        assert!((segment.distance_2(&[13.0, 4.0]) - 25.0).abs() < 1e-12);
    }
}
