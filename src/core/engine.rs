use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

/// 依序執行 extract → transform → load 的外層引擎
pub struct ConflateEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> ConflateEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting conflation run");
        self.monitor.log_stats("Start");

        tracing::info!("📥 Reading input layers...");
        let input = self.pipeline.extract().await?;
        tracing::info!(
            "Read {} canals and {} points",
            input.canals.len(),
            input.points.len()
        );
        self.monitor.log_stats("Extract");

        tracing::info!("🔧 Conflating...");
        let output = self.pipeline.transform(input).await?;
        tracing::info!(
            "Produced {} outputs in {:?} ({:?})",
            output.result.outputs.len(),
            output.duration,
            output.result.status
        );
        self.monitor.log_stats("Transform");

        tracing::info!("💾 Writing outputs...");
        let location = self.pipeline.load(output).await?;
        self.monitor.log_stats("Load");
        self.monitor.log_final_stats();

        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        ConflationOutput, ConflationResult, Crs, Fields, GeometryType, InputLayers, Layer,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingPipeline {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Pipeline for CountingPipeline {
        async fn extract(&self) -> Result<InputLayers> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let empty = |name: &str, kind| Layer::new(name, Crs::unknown(), kind, Fields::default());
            Ok(InputLayers {
                canals: empty("canals", GeometryType::LineString),
                points: empty("points", GeometryType::Point),
            })
        }

        async fn transform(&self, _input: InputLayers) -> Result<ConflationOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ConflationOutput {
                result: ConflationResult::new(),
                layers: HashMap::new(),
                duration: Duration::from_millis(1),
            })
        }

        async fn load(&self, _output: ConflationOutput) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("out".to_string())
        }
    }

    #[tokio::test]
    async fn test_engine_runs_every_phase() {
        let engine = ConflateEngine::new(CountingPipeline::default());

        let location = engine.run().await.unwrap();

        assert_eq!(location, "out");
        assert_eq!(engine.pipeline.calls.load(Ordering::SeqCst), 3);
    }
}
