use crate::adapters::geojson::{read_layer, write_layer};
use crate::config::options::{parse_options, ParameterOptions};
use crate::config::toml_config::ConflateConfig;
use crate::core::conflation::{Conflation, ConflationParams};
use crate::core::feedback::{CancellationToken, ProgressFeedback};
use crate::core::sinks::MemorySinks;
use crate::domain::model::{ConflationOutput, GeometryType, InputLayers, Layer, OutputKind, RunStatus};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::{ConflateError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

/// 從 Storage 讀 GeoJSON、執行管線、寫回 GeoJSON 與執行摘要
pub struct FilePipeline<S: Storage> {
    storage: S,
    config: ConflateConfig,
    options: ParameterOptions,
    token: CancellationToken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSummary {
    pub path: String,
    pub features: usize,
}

/// 寫在輸出目錄中的執行摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run: String,
    pub status: RunStatus,
    pub outputs: BTreeMap<String, OutputSummary>,
    pub groups_processed: usize,
    pub empty_groups: Vec<String>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Local>,
}

impl<S: Storage> FilePipeline<S> {
    /// 建立管線並讀取選項目錄（若有設定）
    pub fn new(storage: S, config: ConflateConfig) -> Result<Self> {
        let options = match config.options_dir() {
            Some(dir) => parse_options(dir)?,
            None => ParameterOptions::new(),
        };
        Ok(Self::with_options(storage, config, options))
    }

    pub fn with_options(storage: S, config: ConflateConfig, options: ParameterOptions) -> Self {
        Self {
            storage,
            config,
            options,
            token: CancellationToken::new(),
        }
    }

    /// 共用同一個取消旗標，例如交給 Ctrl-C 處理器
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn config(&self) -> &ConflateConfig {
        &self.config
    }

    /// 只讀取輸入並解析參數，不執行任何幾何運算也不寫檔
    pub async fn plan(&self) -> Result<ConflationParams> {
        let input = self.extract().await?;
        let params = self.config.conflation_params(&self.options, &input)?;
        Conflation::new(params.clone()).validate_inputs(&input.canals, &input.points)?;
        Ok(params)
    }

    async fn read_input(&self, path: &str, geometry_type: GeometryType) -> Result<Layer> {
        let bytes = self.storage.read_file(path).await?;
        let name = Path::new(path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(path);
        read_layer(&bytes, name, geometry_type, &self.config.default_crs())
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for FilePipeline<S> {
    async fn extract(&self) -> Result<InputLayers> {
        let canals = self
            .read_input(&self.config.input.canals, GeometryType::LineString)
            .await?;
        let points = self
            .read_input(&self.config.input.points, GeometryType::Point)
            .await?;
        Ok(InputLayers { canals, points })
    }

    async fn transform(&self, input: InputLayers) -> Result<ConflationOutput> {
        let params = self.config.conflation_params(&self.options, &input)?;
        tracing::debug!("Conflation parameters: {:?}", params);

        let token = self.token.clone();
        let started = Instant::now();
        let (result, layers) = tokio::task::spawn_blocking(move || {
            let feedback = ProgressFeedback::new(token);
            let mut sinks = MemorySinks::new();
            let result = Conflation::new(params).run(&input.canals, &input.points, &mut sinks, &feedback)?;
            Ok::<_, ConflateError>((result, sinks.into_layers()))
        })
        .await
        .map_err(|e| ConflateError::ProcessingError {
            stage: "conflation".to_string(),
            details: format!("worker task failed: {}", e),
        })??;

        Ok(ConflationOutput {
            result,
            layers,
            duration: started.elapsed(),
        })
    }

    async fn load(&self, output: ConflationOutput) -> Result<String> {
        let now = Local::now();
        let timestamp = now.format("%Y%m%d_%H%M%S").to_string();
        let out_dir = Path::new(&self.config.output.path);

        let mut outputs = BTreeMap::new();
        for kind in OutputKind::ALL {
            let Some(layer) = output.layers.get(&kind) else {
                continue;
            };
            let path = out_dir
                .join(self.config.output_filename(kind, &timestamp))
                .to_string_lossy()
                .into_owned();
            self.storage.write_file(&path, &write_layer(layer)?).await?;
            tracing::info!("📁 {} -> {} ({} features)", kind, path, layer.len());
            outputs.insert(
                kind.key().to_string(),
                OutputSummary {
                    path,
                    features: layer.len(),
                },
            );
        }

        let summary = RunSummary {
            run: self.config.run.name.clone(),
            status: output.result.status,
            outputs,
            groups_processed: output.result.groups_processed,
            empty_groups: output.result.empty_groups.clone(),
            duration_ms: output.duration.as_millis() as u64,
            finished_at: now,
        };
        let summary_path = out_dir
            .join(self.config.summary_filename(&timestamp))
            .to_string_lossy()
            .into_owned();
        self.storage
            .write_file(&summary_path, &serde_json::to_vec_pretty(&summary)?)
            .await?;

        if summary.status == RunStatus::Canceled {
            tracing::warn!("⚠️ Run canceled, {} of {} outputs written", summary.outputs.len(), OutputKind::ALL.len());
        }
        tracing::info!("📊 Summary: {}", serde_json::to_string(&summary)?);

        Ok(self.config.output.path.clone())
    }
}
