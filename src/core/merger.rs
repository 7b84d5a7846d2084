use crate::domain::model::{Crs, Layer};
use crate::utils::error::{ConflateError, Result};

/// 依輸入順序合併多個點圖層。
///
/// 所有圖層的欄位結構必須完全一致，否則整次合併失敗、不產生任何輸出。
/// 不做去重；目標 CRS 直接套用到合併結果，不做座標轉換。要素 fid 從 1 重新編號。
pub fn merge_layers(name: &str, layers: &[&Layer], crs: &Crs) -> Result<Layer> {
    let first = layers.first().ok_or(ConflateError::EmptyMergeError)?;

    for layer in &layers[1..] {
        if layer.geometry_type != first.geometry_type {
            return Err(ConflateError::SchemaMismatchError {
                layer: layer.name.clone(),
                details: format!(
                    "geometry type {} differs from {}",
                    layer.geometry_type, first.geometry_type
                ),
            });
        }
        if let Some(details) = first.fields.difference(&layer.fields) {
            return Err(ConflateError::SchemaMismatchError {
                layer: layer.name.clone(),
                details,
            });
        }
        if layer.crs != *crs && layer.crs.is_known() {
            tracing::debug!(
                "Layer '{}' declares {}, merged output uses {}",
                layer.name,
                layer.crs,
                crs
            );
        }
    }

    let total: usize = layers.iter().map(|l| l.len()).sum();
    let mut merged = Layer::new(name, crs.clone(), first.geometry_type, first.fields.clone());
    merged.features.reserve(total);
    for layer in layers {
        for feature in &layer.features {
            let mut feature = feature.clone();
            feature.fid = merged.features.len() as u64 + 1;
            merged.features.push(feature);
        }
    }

    tracing::debug!("🧩 Merged {} layers into {} features", layers.len(), merged.len());
    Ok(merged)
}
