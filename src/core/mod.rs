pub mod conflation;
pub mod engine;
pub mod feedback;
pub(crate) mod geometry;
pub mod grouper;
pub mod line_snapper;
pub mod merger;
pub mod point_snapper;
pub mod sinks;

pub use crate::domain::model::{ConflationResult, Layer, OutputKind, RunStatus};
pub use crate::domain::ports::{FeatureSink, Feedback, Pipeline, Storage};
pub use crate::utils::error::Result;
