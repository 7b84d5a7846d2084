//! Pipeline orchestration: `SnapLines → SplitMergePoints → MergeResults → Done`,
//! with `Canceled` reachable from any step.

use crate::core::grouper::split_by_key;
use crate::core::line_snapper::{snap_lines, IdentifierStrategy, LineSnapParams};
use crate::core::merger::merge_layers;
use crate::core::point_snapper::{snap_points, SnapBehavior};
use crate::domain::model::{ConflationResult, GeometryType, Layer, OutputKind, RunStatus};
use crate::domain::ports::{FeatureSink, Feedback};
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_requires, validate_tolerance, Validate};
use serde::{Deserialize, Serialize};

pub const TOTAL_STEPS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    SnapLines,
    SplitMergePoints,
    MergeResults,
    Done,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflationParams {
    pub canal_field: String,
    pub point_field: String,
    pub type_field: Option<String>,
    pub type_value: Option<String>,
    pub canal_tolerance: f64,
    pub point_tolerance: f64,
    #[serde(default)]
    pub point_behavior: SnapBehavior,
    #[serde(default)]
    pub identifiers: IdentifierStrategy,
    #[serde(default)]
    pub split_lines: bool,
}

impl ConflationParams {
    pub fn new(
        canal_field: impl Into<String>,
        point_field: impl Into<String>,
        canal_tolerance: f64,
        point_tolerance: f64,
    ) -> Self {
        Self {
            canal_field: canal_field.into(),
            point_field: point_field.into(),
            type_field: None,
            type_value: None,
            canal_tolerance,
            point_tolerance,
            point_behavior: SnapBehavior::default(),
            identifiers: IdentifierStrategy::default(),
            split_lines: false,
        }
    }

    /// 交點以 field=value 標記為點類型
    pub fn with_intersection_type(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.type_field = Some(field.into());
        self.type_value = Some(value.into());
        self
    }

    fn line_snap_params(&self) -> LineSnapParams {
        LineSnapParams {
            tolerance: self.canal_tolerance,
            canal_field: self.canal_field.clone(),
            point_field: self.point_field.clone(),
            type_field: self.type_field.clone(),
            type_value: self.type_value.clone(),
            identifiers: self.identifiers,
            split_lines: self.split_lines,
        }
    }
}

impl Validate for ConflationParams {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("fields.canal_key", &self.canal_field)?;
        validate_non_empty_string("fields.point_key", &self.point_field)?;
        validate_tolerance("tolerance.canals", self.canal_tolerance)?;
        validate_tolerance("tolerance.points", self.point_tolerance)?;
        validate_requires(
            ("fields.type_value", self.type_value.is_some()),
            ("fields.type_field", self.type_field.is_some()),
        )?;
        if let Some(field) = &self.type_field {
            validate_non_empty_string("fields.type_field", field)?;
        }
        Ok(())
    }
}

pub struct Conflation {
    params: ConflationParams,
}

impl Conflation {
    pub fn new(params: ConflationParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ConflationParams {
        &self.params
    }

    /// 在任何幾何運算之前檢查參數、欄位與幾何類型
    pub fn validate_inputs(&self, canals: &Layer, points: &Layer) -> Result<()> {
        self.params.validate()?;
        canals.require_geometry(GeometryType::LineString)?;
        points.require_geometry(GeometryType::Point)?;
        canals.field_index(&self.params.canal_field)?;
        points.field_index(&self.params.point_field)?;
        if let Some(field) = &self.params.type_field {
            points.field_index(field)?;
        }
        Ok(())
    }

    pub fn run<S: FeatureSink>(
        &self,
        canals: &Layer,
        points: &Layer,
        sink: &mut S,
        feedback: &dyn Feedback,
    ) -> Result<ConflationResult> {
        self.validate_inputs(canals, points)?;

        let mut result = ConflationResult::new();
        let mut step = PipelineStep::SnapLines;

        if feedback.is_canceled() {
            return Ok(canceled(result, step));
        }

        let network = snap_lines(canals, points, &self.params.line_snap_params())?;
        feedback.push_info(&format!(
            "🔗 Canals snapped: {} features, {} intersections",
            network.canals.len(),
            network.intersections.len()
        ));
        feedback.set_current_step(1, TOTAL_STEPS);

        if feedback.is_canceled() {
            return Ok(canceled(result, step));
        }

        write_output(sink, &mut result, OutputKind::SnappedCanals, &network.canals)?;
        write_output(sink, &mut result, OutputKind::PointsWithUuid, &network.points)?;

        step = advance(step, PipelineStep::SplitMergePoints);
        let groups = split_by_key(
            &network.points,
            &network.canals,
            &self.params.point_field,
            &self.params.canal_field,
        )?;
        let mut snapped_layers: Vec<Layer> = Vec::with_capacity(groups.len() + 1);

        for group in groups {
            if feedback.is_canceled() {
                return Ok(canceled(result, step));
            }

            let key = group.key.to_string();
            if group.lines.is_empty() {
                result.empty_groups.push(key.clone());
            }
            feedback.report_group(&key, group.points.len(), group.lines.len());

            snapped_layers.push(snap_points(
                &group.points,
                &group.lines,
                self.params.point_tolerance,
                self.params.point_behavior,
            ));
            result.groups_processed += 1;
        }
        feedback.set_current_step(2, TOTAL_STEPS);

        if feedback.is_canceled() {
            return Ok(canceled(result, step));
        }

        step = advance(step, PipelineStep::MergeResults);
        let mut layers: Vec<&Layer> = snapped_layers.iter().collect();
        layers.push(&network.intersections);
        let merged = merge_layers("snapped_points", &layers, &network.points.crs)?;
        feedback.set_current_step(3, TOTAL_STEPS);

        if feedback.is_canceled() {
            return Ok(canceled(result, step));
        }

        write_output(sink, &mut result, OutputKind::SnappedPoints, &merged)?;
        advance(step, PipelineStep::Done);

        tracing::info!(
            "✅ Conflation finished: {} groups, {} snapped points ({} empty groups)",
            result.groups_processed,
            merged.len(),
            result.empty_groups.len()
        );
        Ok(result)
    }
}

fn advance(from: PipelineStep, to: PipelineStep) -> PipelineStep {
    tracing::debug!("Pipeline step {:?} -> {:?}", from, to);
    to
}

fn canceled(mut result: ConflationResult, step: PipelineStep) -> ConflationResult {
    advance(step, PipelineStep::Canceled);
    tracing::warn!(
        "🛑 Conflation canceled during {:?}, returning {} of {} outputs",
        step,
        result.outputs.len(),
        OutputKind::ALL.len()
    );
    result.status = RunStatus::Canceled;
    result
}

fn write_output<S: FeatureSink>(
    sink: &mut S,
    result: &mut ConflationResult,
    output: OutputKind,
    layer: &Layer,
) -> Result<()> {
    let id = sink.create(output, &layer.schema())?;
    sink.add_features(output, &layer.features)?;
    tracing::debug!("💾 {} -> {} ({} features)", output, id, layer.len());
    result.outputs.insert(output, id);
    Ok(())
}
