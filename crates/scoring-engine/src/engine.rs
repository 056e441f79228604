//! 评分引擎实现
//!
//! 加载后的引擎是纯函数：输出只取决于工件参数和输入向量。
//! 没有任何每次调用的可变状态，多个调用方可以无锁并发调用 `predict`。

use std::path::Path;

use tracing::info;

use sentinel_shared::transaction::{
    AnomalyVerdict, FEATURE_COUNT, Prediction, SupervisedVerdict,
};

use crate::artifact::ModelArtifact;
use crate::error::{Result, ScoringError};

/// 评分引擎
///
/// 进程启动时加载一次，之后只读。持有者通过 `Arc` 在消费者和
/// API handler 之间共享，无需任何锁。
pub struct ScoringEngine {
    version: String,
    mean: [f64; FEATURE_COUNT],
    std: [f64; FEATURE_COUNT],
    weights: [f64; FEATURE_COUNT],
    bias: f64,
    fraud_threshold: f64,
    anomaly_offset: f64,
    anomaly_threshold: f64,
}

impl ScoringEngine {
    /// 从已校验的工件构造引擎
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        artifact.validate()?;

        Ok(Self {
            version: artifact.model_version,
            mean: to_array(&artifact.scaler.mean),
            std: to_array(&artifact.scaler.std),
            weights: to_array(&artifact.classifier.weights),
            bias: artifact.classifier.bias,
            fraud_threshold: artifact.classifier.threshold,
            anomaly_offset: artifact.anomaly.offset,
            anomaly_threshold: artifact.anomaly.threshold,
        })
    }

    /// 从磁盘加载模型工件并构造引擎
    ///
    /// 加载失败是致命错误：依赖引擎的服务不应在没有模型的情况下
    /// 进入就绪状态，调用方应直接终止启动。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let engine = Self::from_artifact(ModelArtifact::load(path)?)?;

        info!(
            model_version = %engine.version,
            fraud_threshold = engine.fraud_threshold,
            path = %path.display(),
            "评分模型已加载"
        );
        Ok(engine)
    }

    /// 覆盖工件内置的欺诈判定阈值
    pub fn with_fraud_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ScoringError::InvalidArtifact(format!(
                "欺诈判定阈值必须落在 [0, 1]，实际为 {threshold}"
            )));
        }
        self.fraud_threshold = threshold;
        Ok(self)
    }

    /// 模型版本号
    pub fn version(&self) -> &str {
        &self.version
    }

    /// 当前生效的欺诈判定阈值
    pub fn fraud_threshold(&self) -> f64 {
        self.fraud_threshold
    }

    /// 对单个特征向量评分
    ///
    /// 输入必须是 [time, V1..V28, amount] 的固定列序，
    /// 由 `Transaction::feature_vector` 统一产出。
    pub fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Prediction {
        // 标准化
        let mut scaled = [0.0_f64; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            scaled[i] = (features[i] - self.mean[i]) / self.std[i];
        }

        // 监督头：逻辑回归
        let mut logit = self.bias;
        for i in 0..FEATURE_COUNT {
            logit += self.weights[i] * scaled[i];
        }
        let fraud_probability = sigmoid(logit);

        // 无监督头：offset 减去平均绝对偏移，越低越异常
        let mean_abs: f64 =
            scaled.iter().map(|v| v.abs()).sum::<f64>() / FEATURE_COUNT as f64;
        let anomaly_score = self.anomaly_offset - mean_abs;

        Prediction {
            supervised: SupervisedVerdict {
                fraud_probability,
                is_fraud: fraud_probability >= self.fraud_threshold,
            },
            unsupervised: AnomalyVerdict {
                anomaly_score,
                is_anomaly: anomaly_score < self.anomaly_threshold,
            },
            model_version: self.version.clone(),
        }
    }
}

/// sigmoid 函数，对极端 logit 自然饱和到 0 或 1
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn to_array(values: &[f64]) -> [f64; FEATURE_COUNT] {
    // 长度已由 artifact.validate() 保证
    let mut out = [0.0_f64; FEATURE_COUNT];
    out.copy_from_slice(values);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{AnomalyParams, ClassifierParams, ScalerParams};
    use sentinel_shared::transaction::Transaction;

    /// 恒等缩放、零权重的中性工件
    fn neutral_artifact() -> ModelArtifact {
        ModelArtifact {
            model_version: "v1-test".to_string(),
            scaler: ScalerParams {
                mean: vec![0.0; FEATURE_COUNT],
                std: vec![1.0; FEATURE_COUNT],
            },
            classifier: ClassifierParams {
                weights: vec![0.0; FEATURE_COUNT],
                bias: 0.0,
                threshold: 0.6,
            },
            anomaly: AnomalyParams {
                offset: 0.5,
                threshold: 0.0,
            },
        }
    }

    /// 以基准交易为中心的工件：对基准输入 z 全为 0
    fn centered_artifact() -> ModelArtifact {
        let mut mean = vec![0.0; FEATURE_COUNT];
        mean[0] = 12345.0; // time
        mean[29] = 150.5; // amount
        ModelArtifact {
            model_version: "v1-test".to_string(),
            scaler: ScalerParams {
                mean,
                std: vec![1.0; FEATURE_COUNT],
            },
            classifier: ClassifierParams {
                weights: vec![0.0; FEATURE_COUNT],
                bias: 0.0,
                threshold: 0.6,
            },
            anomaly: AnomalyParams {
                offset: 0.5,
                threshold: 0.0,
            },
        }
    }

    #[test]
    fn test_baseline_fixture_prediction() {
        // 回归基线：time=12345, amount=150.50, V1..V28 全零
        let engine = ScoringEngine::from_artifact(centered_artifact()).unwrap();
        let tx = Transaction::with_time_amount(12345.0, 150.50);

        let prediction = engine.predict(&tx.feature_vector());

        // 零 logit 恰好落在 0.5；阈值 0.6 下不判为欺诈
        assert_eq!(prediction.supervised.fraud_probability, 0.5);
        assert!(!prediction.supervised.is_fraud);
        // z 全零时异常分数即为 offset，0.5 >= 0 不判为异常
        assert_eq!(prediction.unsupervised.anomaly_score, 0.5);
        assert!(!prediction.unsupervised.is_anomaly);
        assert_eq!(prediction.model_version, "v1-test");
    }

    #[test]
    fn test_predict_is_deterministic() {
        let engine = ScoringEngine::from_artifact(neutral_artifact()).unwrap();
        let mut tx = Transaction::with_time_amount(7200.0, 88.8);
        tx.v3 = 1.7;
        tx.v14 = -2.4;

        let first = engine.predict(&tx.feature_vector());
        let second = engine.predict(&tx.feature_vector());
        assert_eq!(first, second);
    }

    #[test]
    fn test_probability_always_in_unit_interval() {
        let mut artifact = neutral_artifact();
        // 大权重配合大输入值，验证 sigmoid 两端饱和而不越界
        artifact.classifier.weights = vec![10.0; FEATURE_COUNT];
        let engine = ScoringEngine::from_artifact(artifact).unwrap();

        let extreme_high = Transaction::with_time_amount(1.0e6, 1.0e6);
        let p = engine
            .predict(&extreme_high.feature_vector())
            .supervised
            .fraud_probability;
        assert!((0.0..=1.0).contains(&p));
        assert!(p > 0.999);

        let extreme_low = Transaction::with_time_amount(-1.0e6, 0.0);
        let p = engine
            .predict(&extreme_low.feature_vector())
            .supervised
            .fraud_probability;
        assert!((0.0..=1.0).contains(&p));
        assert!(p < 0.001);
    }

    #[test]
    fn test_anomaly_sign_convention() {
        let engine = ScoringEngine::from_artifact(centered_artifact()).unwrap();

        // 偏离训练分布越远，分数越低
        let mut far = Transaction::with_time_amount(12345.0, 150.5);
        for v in [
            &mut far.v1, &mut far.v2, &mut far.v3, &mut far.v4, &mut far.v5,
        ] {
            *v = 50.0;
        }
        let prediction = engine.predict(&far.feature_vector());
        assert!(prediction.unsupervised.anomaly_score < 0.0);
        assert!(prediction.unsupervised.is_anomaly);

        // 中心点不是异常
        let center = Transaction::with_time_amount(12345.0, 150.5);
        let prediction = engine.predict(&center.feature_vector());
        assert!(!prediction.unsupervised.is_anomaly);
    }

    #[test]
    fn test_fraud_threshold_boundary() {
        // p = 0.5 时的判定完全由阈值决定
        let mut artifact = neutral_artifact();
        artifact.classifier.threshold = 0.5;
        let engine = ScoringEngine::from_artifact(artifact).unwrap();
        let tx = Transaction::with_time_amount(0.0, 0.0);
        assert!(engine.predict(&tx.feature_vector()).supervised.is_fraud);

        let mut artifact = neutral_artifact();
        artifact.classifier.threshold = 0.51;
        let engine = ScoringEngine::from_artifact(artifact).unwrap();
        assert!(!engine.predict(&tx.feature_vector()).supervised.is_fraud);
    }

    #[test]
    fn test_with_fraud_threshold_override() {
        let engine = ScoringEngine::from_artifact(neutral_artifact())
            .unwrap()
            .with_fraud_threshold(0.3)
            .unwrap();
        assert_eq!(engine.fraud_threshold(), 0.3);

        // p = 0.5 >= 0.3，覆盖后判为欺诈
        let tx = Transaction::with_time_amount(0.0, 0.0);
        assert!(engine.predict(&tx.feature_vector()).supervised.is_fraud);
    }

    #[test]
    fn test_with_fraud_threshold_rejects_out_of_range() {
        let engine = ScoringEngine::from_artifact(neutral_artifact()).unwrap();
        assert!(engine.with_fraud_threshold(1.5).is_err());

        let engine = ScoringEngine::from_artifact(neutral_artifact()).unwrap();
        assert!(engine.with_fraud_threshold(-0.2).is_err());
    }

    #[test]
    fn test_scaling_affects_logit() {
        // 单一特征的权重与缩放配合：z = (10 - 0) / 2 = 5, logit = 5
        let mut artifact = neutral_artifact();
        artifact.scaler.std[1] = 2.0;
        artifact.classifier.weights[1] = 1.0;
        let engine = ScoringEngine::from_artifact(artifact).unwrap();

        let mut tx = Transaction::with_time_amount(0.0, 0.0);
        tx.v1 = 10.0;
        let p = engine
            .predict(&tx.feature_vector())
            .supervised
            .fraud_probability;
        let expected = 1.0 / (1.0 + (-5.0_f64).exp());
        assert!((p - expected).abs() < 1e-12);
    }

    #[test]
    fn test_from_artifact_rejects_invalid() {
        let mut artifact = neutral_artifact();
        artifact.scaler.std[0] = 0.0;
        assert!(ScoringEngine::from_artifact(artifact).is_err());
    }
}
