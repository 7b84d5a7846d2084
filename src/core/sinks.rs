use crate::domain::model::{Feature, Layer, LayerSchema, OutputKind};
use crate::domain::ports::FeatureSink;
use crate::utils::error::{ConflateError, Result};
use std::collections::HashMap;

/// 把輸出保存在記憶體中的輸出端，執行結束後由呼叫方取回圖層
#[derive(Debug, Default)]
pub struct MemorySinks {
    layers: HashMap<OutputKind, Layer>,
}

impl MemorySinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, output: OutputKind) -> Option<&Layer> {
        self.layers.get(&output)
    }

    pub fn into_layers(self) -> HashMap<OutputKind, Layer> {
        self.layers
    }
}

impl FeatureSink for MemorySinks {
    fn create(&mut self, output: OutputKind, schema: &LayerSchema) -> Result<String> {
        let layer = Layer::new(
            output.key().to_lowercase(),
            schema.crs.clone(),
            schema.geometry_type,
            schema.fields.clone(),
        );
        self.layers.insert(output, layer);
        Ok(format!("memory:{}", output.key()))
    }

    fn add_features(&mut self, output: OutputKind, features: &[Feature]) -> Result<()> {
        let layer = self
            .layers
            .get_mut(&output)
            .ok_or_else(|| ConflateError::ProcessingError {
                stage: "sink".to_string(),
                details: format!("output {} was written before it was created", output),
            })?;
        layer.features.extend_from_slice(features);
        Ok(())
    }
}
