//! 模型工件
//!
//! 训练流程不在本仓库范围内；这里只定义训练产物的持久化格式与
//! 加载校验。一个 JSON 文档承载三组参数：标准化 scaler、
//! 监督分类头和无监督异常头。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use sentinel_shared::transaction::FEATURE_COUNT;

use crate::error::{Result, ScoringError};

/// 特征标准化参数
///
/// 推理时按 (x - mean) / std 逐列缩放，列序与训练数据一致。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// 监督分类头参数（逻辑回归形式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierParams {
    pub weights: Vec<f64>,
    pub bias: f64,
    /// 欺诈判定阈值：fraud_probability >= threshold 判为欺诈。
    /// 阈值是显式参数而非隐式默认值，可在配置层覆盖。
    pub threshold: f64,
}

/// 无监督异常头参数
///
/// 分数遵循 decision_function 符号约定：offset 减去标准化后
/// 特征的平均绝对偏移，低于 threshold 判为离群点。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyParams {
    pub offset: f64,
    #[serde(default)]
    pub threshold: f64,
}

/// 完整模型工件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_version: String,
    pub scaler: ScalerParams,
    pub classifier: ClassifierParams,
    pub anomaly: AnomalyParams,
}

impl ModelArtifact {
    /// 从磁盘加载并校验模型工件
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ScoringError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let artifact: Self = serde_json::from_str(&contents)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// 校验工件参数的形状与取值范围
    ///
    /// 形状不匹配的模型一旦放行，推理结果会静默失真，
    /// 因此任何一项不满足都拒绝加载。
    pub fn validate(&self) -> Result<()> {
        if self.model_version.is_empty() {
            return Err(ScoringError::InvalidArtifact(
                "model_version 不能为空".to_string(),
            ));
        }

        Self::check_len("scaler.mean", self.scaler.mean.len())?;
        Self::check_len("scaler.std", self.scaler.std.len())?;
        Self::check_len("classifier.weights", self.classifier.weights.len())?;

        Self::check_finite("scaler.mean", &self.scaler.mean)?;
        Self::check_finite("classifier.weights", &self.classifier.weights)?;

        for (idx, std) in self.scaler.std.iter().enumerate() {
            if !std.is_finite() || *std <= 0.0 {
                return Err(ScoringError::InvalidArtifact(format!(
                    "scaler.std[{idx}] 必须为正的有限数，实际为 {std}"
                )));
            }
        }

        if !self.classifier.bias.is_finite() {
            return Err(ScoringError::InvalidArtifact(
                "classifier.bias 必须为有限数".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.classifier.threshold) {
            return Err(ScoringError::InvalidArtifact(format!(
                "classifier.threshold 必须落在 [0, 1]，实际为 {}",
                self.classifier.threshold
            )));
        }

        if !self.anomaly.offset.is_finite() || !self.anomaly.threshold.is_finite() {
            return Err(ScoringError::InvalidArtifact(
                "anomaly 参数必须为有限数".to_string(),
            ));
        }

        Ok(())
    }

    fn check_len(name: &str, len: usize) -> Result<()> {
        if len != FEATURE_COUNT {
            return Err(ScoringError::InvalidArtifact(format!(
                "{name} 长度应为 {FEATURE_COUNT}，实际为 {len}"
            )));
        }
        Ok(())
    }

    fn check_finite(name: &str, values: &[f64]) -> Result<()> {
        for (idx, value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(ScoringError::InvalidArtifact(format!(
                    "{name}[{idx}] 必须为有限数"
                )));
            }
        }
        Ok(())
    }
}
