use crate::config::options::{
    resolve_field, resolve_optional_field, ParameterOptions, CANALS_FIELD, POINTS_FIELD, TOLERANCE_CANALS,
    TOLERANCE_POINTS, TYPE_FIELD, TYPE_VALUE,
};
use crate::core::conflation::ConflationParams;
use crate::core::line_snapper::IdentifierStrategy;
use crate::core::point_snapper::SnapBehavior;
use crate::domain::model::{Crs, InputLayers, OutputKind};
use crate::utils::error::{ConflateError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_requires, validate_tolerance, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflateConfig {
    pub run: RunConfig,
    pub input: InputConfig,
    #[serde(default)]
    pub fields: FieldsConfig,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub snapping: SnappingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub canals: String,
    pub points: String,
    /// 沒有 `crs` 成員的 GeoJSON 使用此 CRS
    pub default_crs: Option<String>,
    /// 參數預設值目錄，相對路徑以設定檔所在目錄為準
    pub options_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldsConfig {
    pub canal_key: Option<String>,
    pub point_key: Option<String>,
    pub type_field: Option<String>,
    pub type_value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToleranceConfig {
    pub canals: Option<f64>,
    pub points: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnappingConfig {
    #[serde(default)]
    pub point_behavior: SnapBehavior,
    #[serde(default)]
    pub identifiers: IdentifierStrategy,
    #[serde(default)]
    pub split_lines: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default)]
    pub filenames: FilenameConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            filenames: FilenameConfig::default(),
        }
    }
}

fn default_output_path() -> String {
    "./output".to_string()
}

/// 輸出檔名，可使用 `{timestamp}` 佔位符
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilenameConfig {
    pub snapped_canals: Option<String>,
    pub points_with_uuid: Option<String>,
    pub snapped_points: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
}

impl ConflateConfig {
    /// 從 TOML 檔案載入配置，`options_dir` 以設定檔目錄為基準
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let mut config = Self::from_toml_str(&content)?;

        if let (Some(dir), Some(parent)) = (&config.input.options_dir, path.as_ref().parent()) {
            if Path::new(dir).is_relative() {
                config.input.options_dir = Some(parent.join(dir).to_string_lossy().into_owned());
            }
        }
        Ok(config)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content)?;

        toml::from_str(&processed).map_err(|e| ConflateError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn default_crs(&self) -> Crs {
        self.input
            .default_crs
            .as_deref()
            .map(Crs::new)
            .unwrap_or_else(Crs::unknown)
    }

    pub fn options_dir(&self) -> Option<PathBuf> {
        self.input.options_dir.as_ref().map(PathBuf::from)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().is_some_and(|m| m.enabled)
    }

    /// 輸出檔名，`{timestamp}` 會換成 `timestamp`
    pub fn output_filename(&self, output: OutputKind, timestamp: &str) -> String {
        let names = &self.output.filenames;
        let configured = match output {
            OutputKind::SnappedCanals => names.snapped_canals.as_deref(),
            OutputKind::PointsWithUuid => names.points_with_uuid.as_deref(),
            OutputKind::SnappedPoints => names.snapped_points.as_deref(),
        };
        let name = configured
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.geojson", output.key().to_lowercase()));
        name.replace("{timestamp}", timestamp)
    }

    pub fn summary_filename(&self, timestamp: &str) -> String {
        self.output
            .filenames
            .summary
            .as_deref()
            .unwrap_or("summary.json")
            .replace("{timestamp}", timestamp)
    }

    /// 以設定值為主、選項目錄為輔，對照實際圖層決定管線參數
    pub fn conflation_params(&self, options: &ParameterOptions, input: &InputLayers) -> Result<ConflationParams> {
        let fields = &self.fields;
        let canal_field = resolve_field(fields.canal_key.as_deref(), options, CANALS_FIELD, &input.canals)?
            .ok_or_else(|| ConflateError::MissingConfigError {
                field: "fields.canal_key".to_string(),
            })?;
        let point_field = resolve_field(fields.point_key.as_deref(), options, POINTS_FIELD, &input.points)?
            .ok_or_else(|| ConflateError::MissingConfigError {
                field: "fields.point_key".to_string(),
            })?;
        let mut type_field =
            resolve_optional_field(fields.type_field.as_deref(), options, TYPE_FIELD, &input.points)?;
        // 推測出的型別欄位不可覆寫點的渠道鍵
        if fields.type_field.is_none() && type_field.as_deref() == Some(point_field.as_str()) {
            tracing::warn!("⚠️ '{}' default resolved to the point key '{}', ignoring it", TYPE_FIELD, point_field);
            type_field = None;
        }
        let mut type_value = fields.type_value.clone().or_else(|| options.string(TYPE_VALUE));
        if type_field.is_none() && type_value.is_some() {
            tracing::warn!("⚠️ No type field resolved, intersections will not be tagged");
            type_value = None;
        }

        let canal_tolerance = self
            .tolerance
            .canals
            .or_else(|| options.number(TOLERANCE_CANALS))
            .ok_or_else(|| ConflateError::MissingConfigError {
                field: "tolerance.canals".to_string(),
            })?;
        let point_tolerance = self
            .tolerance
            .points
            .or_else(|| options.number(TOLERANCE_POINTS))
            .ok_or_else(|| ConflateError::MissingConfigError {
                field: "tolerance.points".to_string(),
            })?;

        let params = ConflationParams {
            canal_field,
            point_field,
            type_field,
            type_value,
            canal_tolerance,
            point_tolerance,
            point_behavior: self.snapping.point_behavior,
            identifiers: self.snapping.identifiers,
            split_lines: self.snapping.split_lines,
        };
        params.validate()?;
        Ok(params)
    }
}

/// 替換環境變數 (例如 ${DATA_DIR})，未設定的變數原樣保留
fn substitute_env_vars(content: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConflateError::ConfigError {
        message: format!("invalid substitution pattern: {}", e),
    })?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });

    Ok(result.into_owned())
}

impl Validate for ConflateConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("run.name", &self.run.name)?;
        validate_path("input.canals", &self.input.canals)?;
        validate_path("input.points", &self.input.points)?;
        validate_path("output.path", &self.output.path)?;
        if let Some(tolerance) = self.tolerance.canals {
            validate_tolerance("tolerance.canals", tolerance)?;
        }
        if let Some(tolerance) = self.tolerance.points {
            validate_tolerance("tolerance.points", tolerance)?;
        }
        // 選項目錄可以補上型別欄位
        if self.input.options_dir.is_none() {
            validate_requires(
                ("fields.type_value", self.fields.type_value.is_some()),
                ("fields.type_field", self.fields.type_field.is_some()),
            )?;
        }
        Ok(())
    }
}
