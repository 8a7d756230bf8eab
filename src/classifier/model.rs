use anyhow::{bail, ensure, Context, Result};
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use crate::config::MlConfig;
use crate::pose::{FeatureVector, PoseLabel, FEATURE_COUNT};

/// 特徴ベクトル → クラス確率
pub trait PoseModel: Send {
    /// 出力確率列に対応するラベル
    fn classes(&self) -> &[PoseLabel];

    /// `classes()` と同じ長さの確率を返す
    fn predict_proba(&mut self, features: &FeatureVector) -> Result<Vec<f32>>;
}

/// クラス名の列をラベルに変換。未知の名前があればエラー
pub fn parse_classes(names: &[String]) -> Result<Vec<PoseLabel>> {
    ensure!(!names.is_empty(), "model class list is empty");
    names
        .iter()
        .map(|n| {
            n.parse::<PoseLabel>()
                .with_context(|| format!("model class {:?} is not a pose label", n))
        })
        .collect()
}

/// ONNX Runtime で動く姿勢分類器
pub struct OnnxPoseModel {
    session: Session,
    classes: Vec<PoseLabel>,
    input_name: String,
    output_name: String,
}

impl OnnxPoseModel {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P, config: &MlConfig) -> Result<Self> {
        let classes = parse_classes(&config.classes)?;
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .context("Failed to load ONNX model")?;

        Ok(Self {
            session,
            classes,
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
        })
    }
}

impl PoseModel for OnnxPoseModel {
    fn classes(&self) -> &[PoseLabel] {
        &self.classes
    }

    /// 入力: [1, 109] の f32 テンソル
    /// 出力: [1, n_classes] の確率
    fn predict_proba(&mut self, features: &FeatureVector) -> Result<Vec<f32>> {
        let input = Array2::from_shape_vec((1, FEATURE_COUNT), features.as_slice().to_vec())?;
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Inference failed")?;

        let output: ndarray::ArrayViewD<f32> = outputs[self.output_name.as_str()]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let proba: Vec<f32> = output.iter().copied().collect();
        if proba.len() != self.classes.len() {
            bail!(
                "model returned {} probabilities for {} classes",
                proba.len(),
                self.classes.len()
            );
        }
        Ok(proba)
    }
}

/// `model_path`、失敗したら `fallback_model_path` を読む
///
/// Returns `None` when neither loads; the ML path is then disabled for the
/// session and the rule-based labels stay authoritative.
pub fn load_with_fallback(config: &MlConfig) -> Option<OnnxPoseModel> {
    for path in [&config.model_path, &config.fallback_model_path] {
        match OnnxPoseModel::new(path, config) {
            Ok(model) => {
                tracing::info!("pose model loaded from {}", path);
                return Some(model);
            }
            Err(e) => tracing::warn!("pose model {} not loaded: {:#}", path, e),
        }
    }
    tracing::error!("no pose model available, ML classification disabled");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_classes() {
        let classes = parse_classes(&MlConfig::default().classes).unwrap();
        assert_eq!(classes.len(), PoseLabel::COUNT);
        assert_eq!(classes[0], PoseLabel::Crouching);
        assert_eq!(classes[8], PoseLabel::WalkingRight);
    }

    #[test]
    fn test_parse_rejects_unknown_class() {
        let names = vec!["standing".to_string(), "default".to_string()];
        assert!(parse_classes(&names).is_err());
        assert!(parse_classes(&[]).is_err());
    }

    #[test]
    fn test_missing_models_disable_ml() {
        let config = MlConfig {
            model_path: "no/such/model.onnx".to_string(),
            fallback_model_path: "no/such/fallback.onnx".to_string(),
            ..MlConfig::default()
        };
        assert!(load_with_fallback(&config).is_none());
    }
}
