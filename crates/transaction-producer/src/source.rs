//! 交易数据源
//!
//! 两种来源统一为 `Iterator<Item = Transaction>`：
//! - ReplaySource：回放 JSON Lines 数据集，一行一笔交易；
//! - SyntheticSource：按欺诈画像无限生成合成交易。

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use sentinel_shared::observability::metrics;
use sentinel_shared::transaction::Transaction;

use crate::error::ProducerError;

// ---------------------------------------------------------------------------
// ReplaySource
// ---------------------------------------------------------------------------

/// JSON Lines 数据集回放源
///
/// 无法解析的行记录日志并计入错误指标后跳过，回放不因单行损坏中断。
pub struct ReplaySource<R> {
    reader: R,
    line_no: u64,
    skipped: u64,
}

impl ReplaySource<BufReader<File>> {
    /// 打开磁盘上的回放数据集
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProducerError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ProducerError::ReplayOpen {
            path: path.display().to_string(),
            source,
        })?;

        info!(path = %path.display(), "回放数据集已打开");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplaySource<R> {
    /// 从任意 BufRead 构造，便于测试时直接回放内存缓冲
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            skipped: 0,
        }
    }

    /// 已跳过的损坏行数
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<R: BufRead> Iterator for ReplaySource<R> {
    type Item = Transaction;

    fn next(&mut self) -> Option<Transaction> {
        let mut line = String::new();
        loop {
            line.clear();
            self.line_no += 1;

            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!(line = self.line_no, error = %e, "读取回放数据集失败，停止回放");
                    return None;
                }
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<Transaction>(trimmed) {
                Ok(tx) => return Some(tx),
                Err(e) => {
                    self.skipped += 1;
                    metrics::record_error("replay_parse");
                    warn!(line = self.line_no, error = %e, "回放行解析失败，跳过");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SyntheticSource
// ---------------------------------------------------------------------------

/// 欺诈交易的高发时段（小时）
const FRAUD_HOURS: [u32; 5] = [0, 1, 2, 3, 23];

/// 合成交易生成器
///
/// 欺诈画像：大额（1000..5000）、深夜时段、宽分布特征（σ=3）；
/// 正常画像：小额（10..500）、白天时段、标准分布特征（σ=1）。
pub struct SyntheticSource {
    fraud_ratio: f64,
}

impl SyntheticSource {
    /// 创建合成数据源，fraud_ratio 会被截断到 [0, 1]
    pub fn new(fraud_ratio: f64) -> Self {
        Self {
            fraud_ratio: fraud_ratio.clamp(0.0, 1.0),
        }
    }

    /// 生成一笔合成交易
    pub fn generate(&self) -> Transaction {
        let mut rng = rand::thread_rng();
        let is_fraud = rng.gen_bool(self.fraud_ratio);

        let (amount, hour, sigma) = if is_fraud {
            let amount = rng.gen_range(1000.0..5000.0);
            let hour = *FRAUD_HOURS.choose(&mut rng).unwrap_or(&0);
            (amount, hour, 3.0)
        } else {
            let amount = rng.gen_range(10.0..500.0);
            let hour = rng.gen_range(8..22);
            (amount, hour, 1.0)
        };

        let time = f64::from(hour * 3600 + rng.gen_range(0..3600));
        // 金额保留两位小数
        let amount = (amount * 100.0_f64).round() / 100.0;

        let mut tx = Transaction::with_time_amount(time, amount);
        for feature in [
            &mut tx.v1, &mut tx.v2, &mut tx.v3, &mut tx.v4, &mut tx.v5, &mut tx.v6, &mut tx.v7,
            &mut tx.v8, &mut tx.v9, &mut tx.v10, &mut tx.v11, &mut tx.v12, &mut tx.v13,
            &mut tx.v14, &mut tx.v15, &mut tx.v16, &mut tx.v17, &mut tx.v18, &mut tx.v19,
            &mut tx.v20, &mut tx.v21, &mut tx.v22, &mut tx.v23, &mut tx.v24, &mut tx.v25,
            &mut tx.v26, &mut tx.v27, &mut tx.v28,
        ] {
            *feature = gauss(&mut rng, 0.0, sigma);
        }

        tx
    }
}

impl Iterator for SyntheticSource {
    type Item = Transaction;

    fn next(&mut self) -> Option<Transaction> {
        Some(self.generate())
    }
}

/// Box-Muller 变换采样正态分布
fn gauss<R: Rng>(rng: &mut R, mean: f64, std: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    mean + std * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

// ---------------------------------------------------------------------------
// TransactionSource
// ---------------------------------------------------------------------------

/// 生产者可用的交易来源
pub enum TransactionSource {
    Replay(ReplaySource<BufReader<File>>),
    Synthetic(SyntheticSource),
}

impl TransactionSource {
    /// 根据配置选择来源：指定了回放路径用回放，否则用合成生成器
    pub fn from_config(
        replay_path: Option<&str>,
        fraud_ratio: f64,
    ) -> Result<Self, ProducerError> {
        match replay_path {
            Some(path) => Ok(Self::Replay(ReplaySource::open(path)?)),
            None => Ok(Self::Synthetic(SyntheticSource::new(fraud_ratio))),
        }
    }
}

impl Iterator for TransactionSource {
    type Item = Transaction;

    fn next(&mut self) -> Option<Transaction> {
        match self {
            Self::Replay(source) => source.next(),
            Self::Synthetic(source) => source.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_replay_source_parses_lines() {
        let data = concat!(
            r#"{"time": 100.0, "amount": 25.0, "V1": 0.5}"#,
            "\n",
            r#"{"time": 200.0, "amount": 50.0}"#,
            "\n",
        );
        let mut source = ReplaySource::new(Cursor::new(data));

        let first = source.next().expect("第一行应能解析");
        assert_eq!(first.time, 100.0);
        assert_eq!(first.v1, 0.5);

        let second = source.next().expect("第二行应能解析");
        assert_eq!(second.amount, 50.0);
        // 缺失的特征默认为 0.0
        assert_eq!(second.v1, 0.0);

        assert!(source.next().is_none());
        assert_eq!(source.skipped(), 0);
    }

    #[test]
    fn test_replay_source_skips_malformed_lines() {
        let data = concat!(
            r#"{"time": 1.0, "amount": 2.0}"#,
            "\n",
            "not json at all\n",
            "\n",
            r#"{"time": 3.0, "amount": 4.0}"#,
            "\n",
        );
        let mut source = ReplaySource::new(Cursor::new(data));

        assert_eq!(source.next().unwrap().time, 1.0);
        // 损坏行与空行被跳过，直接拿到第三条有效记录
        assert_eq!(source.next().unwrap().time, 3.0);
        assert!(source.next().is_none());
        assert_eq!(source.skipped(), 1);
    }

    #[test]
    fn test_replay_source_open_missing_file() {
        let result = ReplaySource::open("/nonexistent/replay.jsonl");
        assert!(matches!(result, Err(ProducerError::ReplayOpen { .. })));
    }

    #[test]
    fn test_synthetic_source_is_infinite() {
        let mut source = SyntheticSource::new(0.1);
        for _ in 0..100 {
            assert!(source.next().is_some());
        }
    }

    #[test]
    fn test_synthetic_amounts_and_time_in_profile() {
        // 全欺诈与全正常两种画像的取值范围
        let fraud_source = SyntheticSource::new(1.0);
        for _ in 0..200 {
            let tx = fraud_source.generate();
            assert!(tx.amount >= 1000.0 && tx.amount < 5000.01);
            let hour = (tx.time / 3600.0).floor() as u32;
            assert!(FRAUD_HOURS.contains(&hour), "欺诈时段异常: {hour}");
        }

        let legit_source = SyntheticSource::new(0.0);
        for _ in 0..200 {
            let tx = legit_source.generate();
            assert!(tx.amount >= 10.0 && tx.amount < 500.01);
            let hour = (tx.time / 3600.0).floor() as u32;
            assert!((8..22).contains(&hour), "正常时段异常: {hour}");
        }
    }

    #[test]
    fn test_synthetic_amount_never_negative() {
        let source = SyntheticSource::new(0.5);
        for _ in 0..500 {
            let tx = source.generate();
            assert!(tx.amount >= 0.0);
            assert!(tx.feature_vector().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_fraud_ratio_clamped() {
        // 超出范围的比例不应导致 gen_bool panic
        let source = SyntheticSource::new(1.7);
        let _ = source.generate();
        let source = SyntheticSource::new(-0.3);
        let _ = source.generate();
    }

    #[test]
    fn test_gauss_distribution_rough_shape() {
        let mut rng = rand::thread_rng();
        let n = 10_000;
        let sum: f64 = (0..n).map(|_| gauss(&mut rng, 0.0, 1.0)).sum();
        let mean = sum / n as f64;
        // 样本均值应接近 0（宽松容差，避免测试抖动）
        assert!(mean.abs() < 0.1, "样本均值偏离过大: {mean}");
    }

    #[test]
    fn test_from_config_selects_synthetic() {
        let source = TransactionSource::from_config(None, 0.1).unwrap();
        assert!(matches!(source, TransactionSource::Synthetic(_)));
    }
}
