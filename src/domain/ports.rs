use crate::domain::model::{
    ConflationOutput, Feature, InputLayers, LayerSchema, OutputKind,
};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 輸出端：呼叫方提供目的地，管線只負責寫入要素
pub trait FeatureSink {
    /// 建立指定輸出並回傳目的地識別
    fn create(&mut self, output: OutputKind, schema: &LayerSchema) -> Result<String>;

    fn add_features(&mut self, output: OutputKind, features: &[Feature]) -> Result<()>;
}

/// 進度回報與協作式取消
pub trait Feedback {
    fn is_canceled(&self) -> bool;

    fn set_current_step(&self, step: usize, total: usize);

    /// 每處理完一個群組呼叫一次；沒有對應渠道的群組 `lines == 0`
    fn report_group(&self, _key: &str, _points: usize, _lines: usize) {}

    fn push_info(&self, _message: &str) {}
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<InputLayers>;
    async fn transform(&self, input: InputLayers) -> Result<ConflationOutput>;
    async fn load(&self, output: ConflationOutput) -> Result<String>;
}
