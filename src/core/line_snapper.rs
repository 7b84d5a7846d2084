//! Canal network snapping.
//!
//! Endpoints of canal lines lying within the canal tolerance of each other are
//! merged onto one coordinate, dangling endpoints are pulled onto a nearby
//! segment of another canal, and a vertex is inserted wherever two canals cross
//! or touch. Every crossing also becomes an intersection point that shares the
//! delivery-point schema, so it can later be merged with the snapped points.

use crate::core::geometry::{
    from_parts, insert_vertices, line_parts, same_coord, split_at, IndexedSegment,
};
use crate::domain::model::{Feature, Field, FieldKind, Fields, GeometryType, Layer};
use crate::utils::error::Result;
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Geometry, LineString, Point};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

pub const UUID_FIELD: &str = "uuid";
pub const LINE_A_FIELD: &str = "line_a";
pub const LINE_B_FIELD: &str = "line_b";

/// 點識別碼的產生方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierStrategy {
    /// 每次執行重新產生 (UUID v4)
    #[default]
    Random,
    /// 由要素內容推導 (UUID v5)，同樣的輸入得到同樣的識別碼
    Content,
}

#[derive(Debug, Clone)]
pub struct LineSnapParams {
    pub tolerance: f64,
    pub canal_field: String,
    pub point_field: String,
    pub type_field: Option<String>,
    pub type_value: Option<String>,
    pub identifiers: IdentifierStrategy,
    pub split_lines: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapStats {
    pub endpoints_merged: usize,
    pub junctions_closed: usize,
    pub intersections: usize,
}

/// 渠道吸附的三個產出
#[derive(Debug, Clone)]
pub struct SnappedNetwork {
    pub canals: Layer,
    pub intersections: Layer,
    pub points: Layer,
    pub stats: SnapStats,
}

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    feature: usize,
    part: usize,
    at_start: bool,
}

type Insertions = HashMap<(usize, usize), Vec<(usize, Coord<f64>)>>;

pub fn snap_lines(canals: &Layer, points: &Layer, params: &LineSnapParams) -> Result<SnappedNetwork> {
    canals.require_geometry(GeometryType::LineString)?;
    points.require_geometry(GeometryType::Point)?;
    let canal_key = canals.field_index(&params.canal_field)?;
    let point_key = points.field_index(&params.point_field)?;
    let type_index = match &params.type_field {
        Some(field) => Some(points.field_index(field)?),
        None => None,
    };

    let mut stats = SnapStats::default();
    let multi: Vec<bool> = canals
        .features
        .iter()
        .map(|f| matches!(f.geometry, Geometry::MultiLineString(_)))
        .collect();
    let mut parts: Vec<Vec<LineString<f64>>> =
        canals.features.iter().map(|f| line_parts(&f.geometry)).collect();

    if params.tolerance > 0.0 {
        let unmatched = merge_endpoints(&mut parts, params.tolerance, &mut stats);
        close_junctions(&mut parts, &unmatched, params.tolerance, &mut stats);
    } else {
        tracing::debug!("Canal tolerance {} disables endpoint snapping", params.tolerance);
    }

    let crossings = find_crossings(&mut parts);
    stats.intersections = crossings.values().map(Vec::len).sum();

    let canals_out = rebuild_canals(canals, parts, &multi, &crossings, params.split_lines);

    let schema = delivery_schema(&points.fields);
    let uuid_index = schema.index_of(UUID_FIELD).unwrap_or(0);
    let line_a_index = schema.index_of(LINE_A_FIELD).unwrap_or(0);
    let line_b_index = schema.index_of(LINE_B_FIELD).unwrap_or(0);
    let ids = IdAssigner::new(params.identifiers);

    let mut points_out = Layer::new(
        "points_with_uuid",
        points.crs.clone(),
        GeometryType::Point,
        schema.clone(),
    );
    for (index, feature) in points.features.iter().enumerate() {
        let mut attributes = feature.attributes.clone();
        attributes.resize(schema.len(), Value::Null);
        let mut out = Feature::new(feature.fid, feature.geometry.clone(), attributes);
        out.set_attribute(uuid_index, Value::String(ids.for_point(index, feature)));
        points_out.features.push(out);
    }

    let mut intersections = Layer::new("intersections", points.crs.clone(), GeometryType::Point, schema.clone());
    let tag = match (type_index, &params.type_value) {
        (Some(index), Some(value)) => Some((index, value.clone())),
        _ => None,
    };
    for ((a, b), coords) in &crossings {
        let key_a = canals.features[*a].attribute(canal_key).clone();
        let key_b = canals.features[*b].attribute(canal_key).clone();
        for c in coords {
            let fid = intersections.features.len() as u64 + 1;
            let mut feature = Feature::new(fid, Point::from(*c).into(), vec![Value::Null; schema.len()]);
            feature.set_attribute(point_key, key_a.clone());
            feature.set_attribute(line_a_index, name_like(&key_a));
            feature.set_attribute(line_b_index, name_like(&key_b));
            if let Some((index, value)) = &tag {
                feature.set_attribute(*index, Value::String(value.clone()));
            }
            let id = ids.for_intersection(*a, *b, *c);
            feature.set_attribute(uuid_index, Value::String(id));
            intersections.features.push(feature);
        }
    }

    tracing::debug!(
        "🔗 Canal snapping: {} endpoints merged, {} junctions closed, {} intersections",
        stats.endpoints_merged,
        stats.junctions_closed,
        stats.intersections
    );

    Ok(SnappedNetwork {
        canals: canals_out,
        intersections,
        points: points_out,
        stats,
    })
}

/// 點圖層結構加上識別碼與兩個渠道名稱欄位
pub fn delivery_schema(point_fields: &Fields) -> Fields {
    let mut fields = point_fields.clone();
    fields.push_or_reuse(Field::new(UUID_FIELD, FieldKind::String));
    fields.push_or_reuse(Field::new(LINE_A_FIELD, FieldKind::String));
    fields.push_or_reuse(Field::new(LINE_B_FIELD, FieldKind::String));
    fields
}

fn name_like(value: &Value) -> Value {
    match value {
        Value::Null | Value::String(_) => value.clone(),
        other => Value::String(other.to_string()),
    }
}

fn endpoint_coord(parts: &[Vec<LineString<f64>>], e: Endpoint) -> Option<Coord<f64>> {
    let coords = &parts[e.feature][e.part].0;
    if e.at_start {
        coords.first().copied()
    } else {
        coords.last().copied()
    }
}

fn set_endpoint(parts: &mut [Vec<LineString<f64>>], e: Endpoint, c: Coord<f64>) {
    let coords = &mut parts[e.feature][e.part].0;
    let slot = if e.at_start { coords.first_mut() } else { coords.last_mut() };
    if let Some(slot) = slot {
        *slot = c;
    }
}

/// 端點依輸入順序貪婪分群：第一個未分配的端點成為錨點，容差內其他端點移到錨點上。
/// 回傳沒有任何同伴的端點。
fn merge_endpoints(parts: &mut [Vec<LineString<f64>>], tolerance: f64, stats: &mut SnapStats) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();
    let mut coords: Vec<Coord<f64>> = Vec::new();
    for (feature, feature_parts) in parts.iter().enumerate() {
        for (part, line) in feature_parts.iter().enumerate() {
            if let (Some(first), Some(last)) = (line.0.first(), line.0.last()) {
                if line.0.len() < 2 {
                    continue;
                }
                endpoints.push(Endpoint { feature, part, at_start: true });
                coords.push(*first);
                endpoints.push(Endpoint { feature, part, at_start: false });
                coords.push(*last);
            }
        }
    }

    let tree = RTree::bulk_load(
        coords
            .iter()
            .enumerate()
            .map(|(i, c)| GeomWithData::new([c.x, c.y], i))
            .collect(),
    );

    let mut anchor_of: Vec<Option<usize>> = vec![None; endpoints.len()];
    let mut cluster_size = vec![0usize; endpoints.len()];
    for i in 0..endpoints.len() {
        if anchor_of[i].is_some() {
            continue;
        }
        anchor_of[i] = Some(i);
        cluster_size[i] = 1;

        let mut members: Vec<usize> = tree
            .locate_within_distance([coords[i].x, coords[i].y], tolerance * tolerance)
            .map(|item| item.data)
            .filter(|&j| j != i && anchor_of[j].is_none())
            .filter(|&j| (endpoints[j].feature, endpoints[j].part) != (endpoints[i].feature, endpoints[i].part))
            .collect();
        members.sort_unstable();

        for j in members {
            anchor_of[j] = Some(i);
            cluster_size[i] += 1;
            if !same_coord(coords[i], coords[j]) {
                set_endpoint(parts, endpoints[j], coords[i]);
                stats.endpoints_merged += 1;
            }
        }
    }

    endpoints
        .iter()
        .enumerate()
        .filter(|(i, _)| anchor_of[*i].map(|a| cluster_size[a] == 1).unwrap_or(true))
        .map(|(_, e)| *e)
        .collect()
}

/// 孤立端點吸附到容差內其他渠道最近的線段上，並在該線段插入頂點
fn close_junctions(parts: &mut [Vec<LineString<f64>>], dangling: &[Endpoint], tolerance: f64, stats: &mut SnapStats) {
    if dangling.is_empty() {
        return;
    }

    let tree = RTree::bulk_load(segments(parts));
    let limit = tolerance * tolerance;
    let mut insertions: Insertions = HashMap::new();

    for endpoint in dangling {
        let Some(origin) = endpoint_coord(parts, *endpoint) else {
            continue;
        };
        let target = tree
            .nearest_neighbor_iter_with_distance_2(&[origin.x, origin.y])
            .take_while(|(_, d2)| *d2 <= limit)
            .find(|(segment, _)| segment.feature != endpoint.feature)
            .map(|(segment, _)| *segment);

        if let Some(segment) = target {
            let snapped = crate::core::geometry::closest_on_segment(segment.line, origin);
            set_endpoint(parts, *endpoint, snapped);
            insertions
                .entry((segment.feature, segment.part))
                .or_default()
                .push((segment.segment, snapped));
            stats.junctions_closed += 1;
        }
    }

    apply_insertions(parts, insertions);
}

fn segments(parts: &[Vec<LineString<f64>>]) -> Vec<IndexedSegment> {
    let mut out = Vec::new();
    for (feature, feature_parts) in parts.iter().enumerate() {
        for (part, line) in feature_parts.iter().enumerate() {
            for (segment, l) in line.lines().enumerate() {
                out.push(IndexedSegment { line: l, feature, part, segment });
            }
        }
    }
    out
}

fn apply_insertions(parts: &mut [Vec<LineString<f64>>], insertions: Insertions) {
    for ((feature, part), points) in insertions {
        if let Some(line) = parts.get_mut(feature).and_then(|p| p.get_mut(part)) {
            insert_vertices(line, points);
        }
    }
}

/// 找出不同渠道之間所有交叉或接觸點，依 (較小索引, 較大索引) 分組，並把交點插入兩條線
fn find_crossings(parts: &mut [Vec<LineString<f64>>]) -> BTreeMap<(usize, usize), Vec<Coord<f64>>> {
    let tree = RTree::bulk_load(segments(parts));
    let mut crossings: BTreeMap<(usize, usize), Vec<Coord<f64>>> = BTreeMap::new();
    let mut insertions: Insertions = HashMap::new();

    let mut candidates: Vec<(IndexedSegment, IndexedSegment)> = tree
        .intersection_candidates_with_other_tree(&tree)
        .filter(|(a, b)| a.feature < b.feature)
        .map(|(a, b)| (*a, *b))
        .collect();
    candidates.sort_by_key(|(a, b)| (a.feature, b.feature, a.part, a.segment, b.part, b.segment));

    for (a, b) in candidates {
        let hits = match line_intersection(a.line, b.line) {
            Some(LineIntersection::SinglePoint { intersection, .. }) => vec![intersection],
            Some(LineIntersection::Collinear { intersection }) => {
                vec![intersection.start, intersection.end]
            }
            None => continue,
        };

        for c in hits {
            let pair = crossings.entry((a.feature, b.feature)).or_default();
            if !pair.iter().any(|known| same_coord(*known, c)) {
                pair.push(c);
            }
            for s in [a, b] {
                if !same_coord(c, s.line.start) && !same_coord(c, s.line.end) {
                    insertions.entry((s.feature, s.part)).or_default().push((s.segment, c));
                }
            }
        }
    }

    apply_insertions(parts, insertions);
    crossings
}

fn rebuild_canals(
    canals: &Layer,
    parts: Vec<Vec<LineString<f64>>>,
    multi: &[bool],
    crossings: &BTreeMap<(usize, usize), Vec<Coord<f64>>>,
    split_lines: bool,
) -> Layer {
    let mut out = Layer::new("snapped_canals", canals.crs.clone(), GeometryType::LineString, canals.fields.clone());

    if !split_lines {
        out.features = canals
            .features
            .iter()
            .zip(parts)
            .zip(multi)
            .map(|((feature, feature_parts), is_multi)| {
                Feature::new(feature.fid, from_parts(feature_parts, *is_multi), feature.attributes.clone())
            })
            .collect();
        return out;
    }

    let mut cuts: HashMap<usize, Vec<Coord<f64>>> = HashMap::new();
    for ((a, b), coords) in crossings {
        cuts.entry(*a).or_default().extend(coords.iter().copied());
        cuts.entry(*b).or_default().extend(coords.iter().copied());
    }

    for (index, (feature, feature_parts)) in canals.features.iter().zip(parts).enumerate() {
        let feature_cuts = cuts.get(&index).map(Vec::as_slice).unwrap_or(&[]);
        for part in feature_parts {
            for piece in split_at(&part, feature_cuts) {
                let fid = out.features.len() as u64 + 1;
                out.features.push(Feature::new(fid, Geometry::LineString(piece), feature.attributes.clone()));
            }
        }
    }

    out
}

/// 識別碼依要素在輸入圖層中的位置產生，fid 重複也不會共用
struct IdAssigner {
    strategy: IdentifierStrategy,
}

impl IdAssigner {
    fn new(strategy: IdentifierStrategy) -> Self {
        Self { strategy }
    }

    fn for_point(&self, index: usize, feature: &Feature) -> String {
        match self.strategy {
            IdentifierStrategy::Random => Uuid::new_v4().to_string(),
            IdentifierStrategy::Content => {
                let content = format!(
                    "point:{}:{}:{:?}:{}",
                    index,
                    feature.fid,
                    feature.geometry,
                    Value::Array(feature.attributes.clone())
                );
                Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()).to_string()
            }
        }
    }

    /// `a`、`b` 為兩條渠道在輸入圖層中的索引
    fn for_intersection(&self, a: usize, b: usize, c: Coord<f64>) -> String {
        match self.strategy {
            IdentifierStrategy::Random => Uuid::new_v4().to_string(),
            IdentifierStrategy::Content => {
                let content = format!("intersection:{}:{}:{:?}:{:?}", a, b, c.x, c.y);
                Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()).to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Crs;
    use geo::{line_string, point};

    fn canals(lines: Vec<(&str, LineString<f64>)>) -> Layer {
        let fields = Fields::new(vec![Field::new("name", FieldKind::String)]);
        Layer::new("canals", Crs::new("EPSG:32637"), GeometryType::LineString, fields).with_features(
            lines
                .into_iter()
                .enumerate()
                .map(|(i, (name, line))| Feature::new(i as u64 + 1, line.into(), vec![Value::from(name)]))
                .collect(),
        )
    }

    fn points(items: Vec<(&str, f64, f64)>) -> Layer {
        let fields = Fields::new(vec![
            Field::new("canal", FieldKind::String),
            Field::new("kind", FieldKind::String),
        ]);
        Layer::new("points", Crs::new("EPSG:32637"), GeometryType::Point, fields).with_features(
            items
                .into_iter()
                .enumerate()
                .map(|(i, (canal, x, y))| {
                    Feature::new(i as u64 + 1, point!(x: x, y: y).into(), vec![Value::from(canal), Value::from("tap")])
                })
                .collect(),
        )
    }

    fn params(tolerance: f64) -> LineSnapParams {
        LineSnapParams {
            tolerance,
            canal_field: "name".to_string(),
            point_field: "canal".to_string(),
            type_field: Some("kind".to_string()),
            type_value: Some("intersection".to_string()),
            identifiers: IdentifierStrategy::Random,
            split_lines: false,
        }
    }

    fn coords(layer: &Layer, index: usize) -> Vec<Coord<f64>> {
        line_parts(&layer.features[index].geometry).remove(0).0
    }

    #[test]
    fn test_close_endpoints_are_merged() {
        let layer = canals(vec![
            ("A", line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]),
            ("B", line_string![(x: 10.3, y: 0.2), (x: 20.0, y: 5.0)]),
        ]);

        let network = snap_lines(&layer, &points(vec![]), &params(0.5)).unwrap();

        assert_eq!(coords(&network.canals, 1)[0], Coord { x: 10.0, y: 0.0 });
        assert_eq!(network.stats.endpoints_merged, 1);
        assert_eq!(network.intersections.len(), 1);
        let p = &network.intersections.features[0];
        assert_eq!(p.geometry, Geometry::Point(point!(x: 10.0, y: 0.0)));
    }

    #[test]
    fn test_zero_tolerance_keeps_gap() {
        let layer = canals(vec![
            ("A", line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]),
            ("B", line_string![(x: 10.001, y: 0.0), (x: 20.0, y: 0.0)]),
        ]);

        let network = snap_lines(&layer, &points(vec![]), &params(0.0)).unwrap();

        let gap = coords(&network.canals, 1)[0].x - coords(&network.canals, 0)[1].x;
        assert!((gap - 0.001).abs() < 1e-12);
        assert!(network.intersections.is_empty());
        assert_eq!(network.canals, {
            let mut expected = layer.clone();
            expected.name = "snapped_canals".to_string();
            expected
        });
    }

    #[test]
    fn test_crossing_inserts_vertices_and_tags_intersection() {
        let layer = canals(vec![
            ("A", line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]),
            ("B", line_string![(x: 5.0, y: -5.0), (x: 5.0, y: 5.0)]),
        ]);

        let network = snap_lines(&layer, &points(vec![("A", 1.0, 1.0)]), &params(0.5)).unwrap();

        assert_eq!(coords(&network.canals, 0).len(), 3);
        let inserted = coords(&network.canals, 1)[1];
        assert!((inserted.x - 5.0).abs() < 1e-9 && inserted.y.abs() < 1e-9);

        let schema = &network.intersections.fields;
        let p = &network.intersections.features[0];
        assert_eq!(p.attribute(schema.index_of("canal").unwrap()), &Value::from("A"));
        assert_eq!(p.attribute(schema.index_of("kind").unwrap()), &Value::from("intersection"));
        assert_eq!(p.attribute(schema.index_of(LINE_A_FIELD).unwrap()), &Value::from("A"));
        assert_eq!(p.attribute(schema.index_of(LINE_B_FIELD).unwrap()), &Value::from("B"));
        assert_eq!(network.intersections.fields, network.points.fields);
    }

    #[test]
    fn test_dangling_endpoint_closes_t_junction() {
        let layer = canals(vec![
            ("A", line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]),
            ("B", line_string![(x: 4.0, y: 0.3), (x: 4.0, y: 8.0)]),
        ]);

        let network = snap_lines(&layer, &points(vec![]), &params(0.5)).unwrap();

        assert_eq!(network.stats.junctions_closed, 1);
        assert_eq!(coords(&network.canals, 1)[0], Coord { x: 4.0, y: 0.0 });
        assert!(coords(&network.canals, 0).contains(&Coord { x: 4.0, y: 0.0 }));
        assert_eq!(network.intersections.len(), 1);
    }

    #[test]
    fn test_split_lines_cuts_at_crossings() {
        let layer = canals(vec![
            ("A", line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]),
            ("B", line_string![(x: 5.0, y: -5.0), (x: 5.0, y: 5.0)]),
        ]);
        let mut p = params(0.5);
        p.split_lines = true;

        let network = snap_lines(&layer, &points(vec![]), &p).unwrap();

        assert_eq!(network.canals.len(), 4);
        let names: Vec<&Value> = network.canals.features.iter().map(|f| f.attribute(0)).collect();
        assert_eq!(names.iter().filter(|n| ***n == Value::from("A")).count(), 2);
    }

    #[test]
    fn test_points_get_unique_identifiers() {
        let layer = canals(vec![("A", line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)])]);
        let pts = points(vec![("A", 1.0, 1.0), ("A", 2.0, 1.0)]);

        let network = snap_lines(&layer, &pts, &params(0.5)).unwrap();

        let uuid = network.points.fields.index_of(UUID_FIELD).unwrap();
        let a = network.points.features[0].attribute(uuid).as_str().unwrap().to_string();
        let b = network.points.features[1].attribute(uuid).as_str().unwrap().to_string();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_eq!(network.points.features[0].geometry, pts.features[0].geometry);
    }

    #[test]
    fn test_content_identifiers_are_repeatable() {
        let layer = canals(vec![("A", line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)])]);
        let pts = points(vec![("A", 1.0, 1.0)]);
        let mut p = params(0.5);
        p.identifiers = IdentifierStrategy::Content;

        let first = snap_lines(&layer, &pts, &p).unwrap();
        let second = snap_lines(&layer, &pts, &p).unwrap();

        assert_eq!(first.points.features, second.points.features);
    }

    #[test]
    fn test_points_sharing_a_fid_get_distinct_identifiers() {
        let layer = canals(vec![("A", line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)])]);
        let mut pts = points(vec![("A", 1.0, 1.0), ("A", 1.0, 1.0)]);
        for feature in &mut pts.features {
            feature.fid = 1;
        }

        for strategy in [IdentifierStrategy::Random, IdentifierStrategy::Content] {
            let mut p = params(0.5);
            p.identifiers = strategy;
            let network = snap_lines(&layer, &pts, &p).unwrap();

            let uuid = network.points.fields.index_of(UUID_FIELD).unwrap();
            let ids: Vec<&Value> = network.points.features.iter().map(|f| f.attribute(uuid)).collect();
            assert_eq!(network.points.features[0].fid, network.points.features[1].fid);
            assert_ne!(ids[0], ids[1], "{:?}", strategy);
        }
    }

    #[test]
    fn test_unknown_canal_field_is_rejected() {
        let layer = canals(vec![("A", line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)])]);
        let mut p = params(0.5);
        p.canal_field = "Name".to_string();

        assert!(snap_lines(&layer, &points(vec![]), &p).is_err());
    }
}
