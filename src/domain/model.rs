use crate::utils::error::{ConflateError, Result};
use geo::Geometry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// 座標參考系統，只做傳遞，不做轉換
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs(Option<String>);

impl Crs {
    pub fn new(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    pub fn unknown() -> Self {
        Self(None)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_known(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id().unwrap_or("unknown"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    LineString,
}

impl GeometryType {
    /// 依幾何判斷圖層類型，多部件幾何歸入對應的單一類型
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(GeometryType::Point),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Some(GeometryType::LineString)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GeometryType::Point => "point",
            GeometryType::LineString => "line",
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Real,
    Boolean,
    Any,
}

impl FieldKind {
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(FieldKind::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(FieldKind::Integer),
            Value::Number(_) => Some(FieldKind::Real),
            Value::String(_) => Some(FieldKind::String),
            Value::Array(_) | Value::Object(_) => Some(FieldKind::Any),
        }
    }

    /// 合併兩個觀察到的型別，整數與實數合併為實數，其餘衝突為 Any
    pub fn widen(self, other: FieldKind) -> FieldKind {
        match (self, other) {
            (a, b) if a == b => a,
            (FieldKind::Integer, FieldKind::Real) | (FieldKind::Real, FieldKind::Integer) => {
                FieldKind::Real
            }
            _ => FieldKind::Any,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// 有序的欄位結構，屬性向量依此順序對齊
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fields(Vec<Field>);

impl Fields {
    pub fn new(fields: Vec<Field>) -> Self {
        Self(fields)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.0.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|f| f.name.clone()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn get(&self, index: usize) -> Option<&Field> {
        self.0.get(index)
    }

    /// 新增欄位；同名欄位已存在時沿用原欄位並回傳其索引
    pub fn push_or_reuse(&mut self, field: Field) -> usize {
        match self.index_of(&field.name) {
            Some(index) => index,
            None => {
                self.0.push(field);
                self.0.len() - 1
            }
        }
    }

    /// 描述與另一個結構的差異，完全相同時回傳 None
    pub fn difference(&self, other: &Fields) -> Option<String> {
        if self == other {
            return None;
        }

        let missing: Vec<&str> = self
            .0
            .iter()
            .filter(|f| !other.contains(&f.name))
            .map(|f| f.name.as_str())
            .collect();
        let extra: Vec<&str> = other
            .0
            .iter()
            .filter(|f| !self.contains(&f.name))
            .map(|f| f.name.as_str())
            .collect();

        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(format!("missing fields [{}]", missing.join(", ")));
        }
        if !extra.is_empty() {
            parts.push(format!("unexpected fields [{}]", extra.join(", ")));
        }
        if parts.is_empty() {
            parts.push(format!(
                "field order or types differ: expected [{}], found [{}]",
                describe(self),
                describe(other)
            ));
        }

        Some(parts.join("; "))
    }
}

fn describe(fields: &Fields) -> String {
    fields
        .iter()
        .map(|f| format!("{}:{:?}", f.name, f.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub fid: u64,
    pub geometry: Geometry<f64>,
    pub attributes: Vec<Value>,
}

impl Feature {
    pub fn new(fid: u64, geometry: Geometry<f64>, attributes: Vec<Value>) -> Self {
        Self {
            fid,
            geometry,
            attributes,
        }
    }

    /// 超出範圍的索引視為 NULL
    pub fn attribute(&self, index: usize) -> &Value {
        self.attributes.get(index).unwrap_or(&Value::Null)
    }

    pub fn set_attribute(&mut self, index: usize, value: Value) {
        if self.attributes.len() <= index {
            self.attributes.resize(index + 1, Value::Null);
        }
        self.attributes[index] = value;
    }
}

/// 交給輸出端的圖層結構描述
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSchema {
    pub fields: Fields,
    pub geometry_type: GeometryType,
    pub crs: Crs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub crs: Crs,
    pub geometry_type: GeometryType,
    pub fields: Fields,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn new(name: impl Into<String>, crs: Crs, geometry_type: GeometryType, fields: Fields) -> Self {
        Self {
            name: name.into(),
            crs,
            geometry_type,
            fields,
            features: Vec::new(),
        }
    }

    pub fn with_features(mut self, features: Vec<Feature>) -> Self {
        self.features = features;
        self
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn schema(&self) -> LayerSchema {
        LayerSchema {
            fields: self.fields.clone(),
            geometry_type: self.geometry_type,
            crs: self.crs.clone(),
        }
    }

    pub fn field_index(&self, field: &str) -> Result<usize> {
        self.fields
            .index_of(field)
            .ok_or_else(|| ConflateError::FieldNotFoundError {
                layer: self.name.clone(),
                field: field.to_string(),
            })
    }

    /// 確認圖層宣告的類型以及每個要素的幾何都符合預期
    pub fn require_geometry(&self, expected: GeometryType) -> Result<()> {
        let mismatch = |found: String| ConflateError::GeometryTypeError {
            layer: self.name.clone(),
            expected: expected.to_string(),
            found,
        };

        if self.geometry_type != expected {
            return Err(mismatch(self.geometry_type.to_string()));
        }

        for feature in &self.features {
            match GeometryType::of(&feature.geometry) {
                Some(kind) if kind == expected => {}
                Some(kind) => return Err(mismatch(kind.to_string())),
                None => return Err(mismatch("unsupported".to_string())),
            }
        }

        Ok(())
    }

    /// 依索引複製出子圖層，結構與 CRS 不變
    pub fn materialize(&self, name: impl Into<String>, indices: &[usize]) -> Layer {
        let features = indices
            .iter()
            .filter_map(|&i| self.features.get(i).cloned())
            .collect();

        Layer {
            name: name.into(),
            crs: self.crs.clone(),
            geometry_type: self.geometry_type,
            fields: self.fields.clone(),
            features,
        }
    }
}

/// 三個具名輸出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputKind {
    SnappedCanals,
    PointsWithUuid,
    SnappedPoints,
}

impl OutputKind {
    pub const ALL: [OutputKind; 3] = [
        OutputKind::SnappedCanals,
        OutputKind::PointsWithUuid,
        OutputKind::SnappedPoints,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            OutputKind::SnappedCanals => "SNAPPEDCANALS",
            OutputKind::PointsWithUuid => "POINTSWITHUUID",
            OutputKind::SnappedPoints => "SNAPPEDPOINTS",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Canceled,
}

/// 執行結果：輸出名稱對應到輸出端回傳的目的地識別
#[derive(Debug, Clone, PartialEq)]
pub struct ConflationResult {
    pub status: RunStatus,
    pub outputs: HashMap<OutputKind, String>,
    pub groups_processed: usize,
    pub empty_groups: Vec<String>,
}

impl ConflationResult {
    pub fn new() -> Self {
        Self {
            status: RunStatus::Completed,
            outputs: HashMap::new(),
            groups_processed: 0,
            empty_groups: Vec::new(),
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.status == RunStatus::Canceled
    }

    pub fn get(&self, output: OutputKind) -> Option<&str> {
        self.outputs.get(&output).map(String::as_str)
    }

    pub fn contains(&self, output: OutputKind) -> bool {
        self.outputs.contains_key(&output)
    }
}

impl Default for ConflationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// 讀入的兩個來源圖層
#[derive(Debug, Clone)]
pub struct InputLayers {
    pub canals: Layer,
    pub points: Layer,
}

/// 轉換階段的產出：執行結果加上已寫入記憶體輸出端的圖層
#[derive(Debug, Clone)]
pub struct ConflationOutput {
    pub result: ConflationResult,
    pub layers: HashMap<OutputKind, Layer>,
    pub duration: std::time::Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point};

    fn fields() -> Fields {
        Fields::new(vec![
            Field::new("name", FieldKind::String),
            Field::new("depth", FieldKind::Real),
        ])
    }

    #[test]
    fn test_fields_difference_reports_missing_and_extra() {
        let other = Fields::new(vec![
            Field::new("name", FieldKind::String),
            Field::new("width", FieldKind::Real),
        ]);

        let details = fields().difference(&other).unwrap();
        assert!(details.contains("missing fields [depth]"));
        assert!(details.contains("unexpected fields [width]"));
        assert!(fields().difference(&fields()).is_none());
    }

    #[test]
    fn test_fields_difference_reports_kind_change() {
        let other = Fields::new(vec![
            Field::new("name", FieldKind::String),
            Field::new("depth", FieldKind::Integer),
        ]);
        assert!(fields().difference(&other).unwrap().contains("types differ"));
    }

    #[test]
    fn test_push_or_reuse_keeps_existing_field() {
        let mut fields = fields();
        assert_eq!(fields.push_or_reuse(Field::new("depth", FieldKind::Any)), 1);
        assert_eq!(fields.push_or_reuse(Field::new("uuid", FieldKind::String)), 2);
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_require_geometry_rejects_mixed_layer() {
        let layer = Layer::new("canals", Crs::unknown(), GeometryType::LineString, fields())
            .with_features(vec![
                Feature::new(1, line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)].into(), vec![]),
                Feature::new(2, point!(x: 1.0, y: 1.0).into(), vec![]),
            ]);

        let err = layer.require_geometry(GeometryType::LineString).unwrap_err();
        assert!(matches!(err, ConflateError::GeometryTypeError { .. }));
    }

    #[test]
    fn test_materialize_copies_selected_features() {
        let layer = Layer::new("points", Crs::new("EPSG:3857"), GeometryType::Point, fields())
            .with_features(vec![
                Feature::new(1, point!(x: 0.0, y: 0.0).into(), vec![]),
                Feature::new(2, point!(x: 1.0, y: 0.0).into(), vec![]),
                Feature::new(3, point!(x: 2.0, y: 0.0).into(), vec![]),
            ]);

        let subset = layer.materialize("subset", &[2, 0]);
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.features[0].fid, 3);
        assert_eq!(subset.crs, Crs::new("EPSG:3857"));
        assert_eq!(subset.fields, layer.fields);
    }

    #[test]
    fn test_set_attribute_extends_short_rows() {
        let mut feature = Feature::new(1, point!(x: 0.0, y: 0.0).into(), vec![]);
        feature.set_attribute(2, Value::from("x"));
        assert_eq!(feature.attributes.len(), 3);
        assert_eq!(feature.attribute(0), &Value::Null);
        assert_eq!(feature.attribute(5), &Value::Null);
    }
}
