//! 參數預設值目錄：每個 `*.json` 檔案對應一個參數，檔名即參數名稱。

use crate::domain::model::Layer;
use crate::utils::error::{ConflateError, Result};
use crate::utils::proximity::find_field;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

pub const CANALS_FIELD: &str = "CANALSFIELD";
pub const POINTS_FIELD: &str = "POINTSFIELD";
pub const TYPE_FIELD: &str = "TYPEFIELD";
pub const TYPE_VALUE: &str = "TYPEVALUE";
pub const TOLERANCE_CANALS: &str = "TOLERANCECANALS";
pub const TOLERANCE_POINTS: &str = "TOLERANCEPOINTS";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterOptions {
    values: HashMap<String, Value>,
}

impl ParameterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 字串值；清單取第一個字串元素
    pub fn string(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// 讀取目錄下所有 `.json` 檔；目錄不存在時回傳空集合。
///
/// 檔案可帶 UTF-8 BOM。
pub fn parse_options<P: AsRef<Path>>(dir: P) -> Result<ParameterOptions> {
    let dir = dir.as_ref();
    let mut options = ParameterOptions::new();
    if !dir.is_dir() {
        tracing::debug!("No options directory at {}", dir.display());
        return Ok(options);
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let content = std::fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(content.trim_start_matches('\u{feff}')).map_err(|e| {
            ConflateError::InvalidConfigValueError {
                field: format!("options.{}", name),
                value: path.display().to_string(),
                reason: format!("invalid JSON: {}", e),
            }
        })?;
        options.insert(name, value);
    }

    tracing::debug!("Loaded {} parameter options from {}", options.len(), dir.display());
    Ok(options)
}

/// 決定要使用的欄位名稱。
///
/// 明確設定的欄位必須完全存在；否則以選項預設值在圖層欄位中找最相近的名稱，
/// 完全沒有相似欄位時視為錯誤。沒有選項預設值時回傳 `None`。
pub fn resolve_field(
    explicit: Option<&str>,
    options: &ParameterOptions,
    option_name: &str,
    layer: &Layer,
) -> Result<Option<String>> {
    if let Some(field) = explicit {
        layer.field_index(field)?;
        return Ok(Some(field.to_string()));
    }

    let Some(sample) = options.string(option_name) else {
        return Ok(None);
    };
    match match_default(&sample, option_name, layer) {
        Some(found) => Ok(Some(found)),
        None => Err(ConflateError::FieldNotFoundError {
            layer: layer.name.clone(),
            field: sample,
        }),
    }
}

/// 與 `resolve_field` 相同，但選項預設值找不到相似欄位時回傳 `None`
pub fn resolve_optional_field(
    explicit: Option<&str>,
    options: &ParameterOptions,
    option_name: &str,
    layer: &Layer,
) -> Result<Option<String>> {
    if explicit.is_some() {
        return resolve_field(explicit, options, option_name, layer);
    }

    let Some(sample) = options.string(option_name) else {
        return Ok(None);
    };
    let found = match_default(&sample, option_name, layer);
    if found.is_none() {
        tracing::warn!(
            "⚠️ '{}' default '{}' matches no field of '{}', ignoring it",
            option_name,
            sample,
            layer.name
        );
    }
    Ok(found)
}

fn match_default(sample: &str, option_name: &str, layer: &Layer) -> Option<String> {
    let names = layer.fields.names();
    let found = find_field(sample, &names)?;
    if found != sample {
        tracing::info!("🔎 '{}' default '{}' matched to field '{}' of '{}'", option_name, sample, found, layer.name);
    }
    Some(found.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Crs, Field, FieldKind, Fields, GeometryType};
    use serde_json::json;

    fn layer() -> Layer {
        Layer::new(
            "canals",
            Crs::unknown(),
            GeometryType::LineString,
            Fields::new(vec![
                Field::new("fid_1", FieldKind::Integer),
                Field::new("Canal_Name", FieldKind::String),
            ]),
        )
    }

    #[test]
    fn test_parse_options_reads_json_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CANALSFIELD.json"), "\u{feff}\"canal\"").unwrap();
        std::fs::write(dir.path().join("TOLERANCECANALS.json"), "0.5").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let options = parse_options(dir.path()).unwrap();

        assert_eq!(options.len(), 2);
        assert_eq!(options.string(CANALS_FIELD).as_deref(), Some("canal"));
        assert_eq!(options.number(TOLERANCE_CANALS), Some(0.5));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let options = parse_options(dir.path().join("nope")).unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn test_invalid_option_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("TYPEVALUE.json"), "{not json").unwrap();

        let err = parse_options(dir.path()).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_resolve_field_explicit_must_exist() {
        let options = ParameterOptions::new();
        assert_eq!(
            resolve_field(Some("Canal_Name"), &options, CANALS_FIELD, &layer()).unwrap(),
            Some("Canal_Name".to_string())
        );
        assert!(resolve_field(Some("canal"), &options, CANALS_FIELD, &layer()).is_err());
    }

    #[test]
    fn test_unrelated_option_default_is_not_guessed() {
        let mut options = ParameterOptions::new();
        options.insert(CANALS_FIELD, json!("gorp"));
        options.insert(TYPE_FIELD, json!("xyz"));

        let err = resolve_field(None, &options, CANALS_FIELD, &layer()).unwrap_err();
        assert!(matches!(err, ConflateError::FieldNotFoundError { .. }));
        assert_eq!(resolve_optional_field(None, &options, TYPE_FIELD, &layer()).unwrap(), None);
        assert!(resolve_optional_field(Some("xyz"), &options, TYPE_FIELD, &layer()).is_err());
    }

    #[test]
    fn test_resolve_field_matches_option_default() {
        let mut options = ParameterOptions::new();
        options.insert(CANALS_FIELD, json!(["canal name", "other"]));

        assert_eq!(
            resolve_field(None, &options, CANALS_FIELD, &layer()).unwrap(),
            Some("Canal_Name".to_string())
        );
        assert_eq!(resolve_field(None, &options, TYPE_FIELD, &layer()).unwrap(), None);
    }
}
