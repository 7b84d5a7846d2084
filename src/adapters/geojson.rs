//! GeoJSON FeatureCollection ⇄ `Layer`。
//!
//! 屬性結構依欄位第一次出現的順序推斷；舊版 `crs` 成員（`{"type":"name"}`）
//! 會被讀入並在寫出時保留，座標本身不做任何轉換。

use crate::domain::model::{Crs, Feature, Field, FieldKind, Fields, GeometryType, Layer};
use crate::utils::error::{ConflateError, Result};
use geojson::feature::Id;
use geojson::{FeatureCollection, GeoJson, JsonObject};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

fn epsg_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)EPSG:+(\d+)$").expect("valid EPSG pattern"))
}

/// 把 `urn:ogc:def:crs:EPSG::32637` 之類的名稱正規化成 `EPSG:32637`
fn normalize_crs_name(name: &str) -> String {
    match epsg_pattern().captures(name.trim()) {
        Some(caps) => format!("EPSG:{}", &caps[1]),
        None => name.trim().to_string(),
    }
}

fn read_crs(members: Option<&JsonObject>) -> Option<Crs> {
    let name = members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    Some(Crs::new(normalize_crs_name(name)))
}

fn crs_member(crs: &Crs) -> Option<Value> {
    let id = crs.id()?;
    let name = match epsg_pattern().captures(id) {
        Some(caps) => format!("urn:ogc:def:crs:EPSG::{}", &caps[1]),
        None => id.to_string(),
    };
    Some(json!({ "type": "name", "properties": { "name": name } }))
}

/// 解析 GeoJSON 位元組為圖層。
///
/// 沒有幾何的要素會被略過；幾何類型不符的要素保留下來，交給管線的輸入檢查回報。
/// 沒有 `crs` 成員時使用 `default_crs`。
pub fn read_layer(bytes: &[u8], name: &str, geometry_type: GeometryType, default_crs: &Crs) -> Result<Layer> {
    let text = std::str::from_utf8(bytes).map_err(|e| ConflateError::ProcessingError {
        stage: "read".to_string(),
        details: format!("{} is not valid UTF-8: {}", name, e),
    })?;
    let text = text.trim_start_matches('\u{feff}');

    let collection = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection,
        GeoJson::Feature(feature) => FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        },
        GeoJson::Geometry(_) => {
            return Err(ConflateError::ProcessingError {
                stage: "read".to_string(),
                details: format!("{} holds a bare geometry, expected a FeatureCollection", name),
            })
        }
    };

    let crs = read_crs(collection.foreign_members.as_ref()).unwrap_or_else(|| default_crs.clone());

    let mut fields = Fields::default();
    let mut kinds: Vec<Option<FieldKind>> = Vec::new();
    let mut rows: Vec<(Option<Id>, geo::Geometry<f64>, JsonObject)> = Vec::with_capacity(collection.features.len());
    let mut skipped = 0usize;

    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            skipped += 1;
            continue;
        };
        let geometry = geo::Geometry::<f64>::try_from(geometry)?;
        let properties = feature.properties.unwrap_or_default();

        for (key, value) in &properties {
            let index = match fields.index_of(key) {
                Some(index) => index,
                None => {
                    kinds.push(None);
                    fields.push_or_reuse(Field::new(key.clone(), FieldKind::Any))
                }
            };
            if let Some(kind) = FieldKind::of(value) {
                kinds[index] = Some(match kinds[index] {
                    Some(seen) => seen.widen(kind),
                    None => kind,
                });
            }
        }
        rows.push((feature.id, geometry, properties));
    }

    if skipped > 0 {
        tracing::warn!("⚠️ Skipped {} features without geometry in '{}'", skipped, name);
    }

    // 全為 NULL 的欄位視為字串
    let fields = Fields::new(
        fields
            .iter()
            .zip(&kinds)
            .map(|(field, kind)| Field::new(field.name.clone(), kind.unwrap_or(FieldKind::String)))
            .collect(),
    );

    // 明確的數字 id 優先保留；沒有 id 或重複的 id 從最大值之後重新編號
    let explicit: Vec<Option<u64>> = rows
        .iter()
        .map(|(id, _, _)| match id {
            Some(Id::Number(n)) => n.as_u64(),
            _ => None,
        })
        .collect();
    let mut next_fid = explicit.iter().flatten().max().map_or(1, |max| max.saturating_add(1));
    let mut used: HashSet<u64> = HashSet::with_capacity(rows.len());

    let features = rows
        .into_iter()
        .zip(explicit)
        .map(|((_, geometry, mut properties), id)| {
            let fid = match id {
                Some(fid) if used.insert(fid) => fid,
                _ => {
                    let fid = next_fid;
                    next_fid += 1;
                    used.insert(fid);
                    fid
                }
            };

            let attributes = fields
                .iter()
                .map(|field| properties.remove(&field.name).unwrap_or(Value::Null))
                .collect();
            Feature::new(fid, geometry, attributes)
        })
        .collect();

    let layer = Layer::new(name, crs, geometry_type, fields).with_features(features);
    tracing::debug!(
        "📖 Read '{}': {} features, fields [{}], {}",
        layer.name,
        layer.len(),
        layer.fields.names().join(", "),
        layer.crs
    );
    Ok(layer)
}

/// 把圖層寫成 FeatureCollection，fid 作為要素 id
pub fn write_layer(layer: &Layer) -> Result<Vec<u8>> {
    let features = layer
        .features
        .iter()
        .map(|feature| {
            let properties: JsonObject = layer
                .fields
                .iter()
                .enumerate()
                .map(|(i, field)| (field.name.clone(), feature.attribute(i).clone()))
                .collect();
            geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&feature.geometry))),
                id: Some(Id::Number(feature.fid.into())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let foreign_members = crs_member(&layer.crs).map(|crs| {
        let mut members = JsonObject::new();
        members.insert("crs".to_string(), crs);
        members
    });

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    };
    Ok(serde_json::to_vec_pretty(&collection)?)
}
