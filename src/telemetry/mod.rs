//! Synthetic telemetry generation
//!
//! 物理モデルに基づくパラメトリック分布から、正常 / 異常ラベル付きの
//! 特徴量ベクトルを生成する。
//!
//! ## 主要機能
//!
//! - **一括生成**: コンタミネーション比率どおりの件数で正常・異常を生成しシャッフル
//! - **ストリーミング**: ランダムウォークで状態を進める遅延シーケンス（[`stream`]）
//!
//! ## 使用例
//!
//! ```rust,no_run
//! use aerosec::telemetry::{adsb::AdsbProfile, SyntheticGenerator};
//!
//! # fn example() -> aerosec::Result<()> {
//! let mut generator = SyntheticGenerator::new(AdsbProfile::new()?, Some(42));
//! let dataset = generator.generate(500, 0.1)?;
//! assert_eq!(dataset.anomaly_count(), 50);
//! # Ok(())
//! # }
//! ```

pub mod adsb;
pub mod avionics;
pub mod stream;

use crate::config::{check_fraction, check_sample_count};
use crate::error::{Error, Result};
use crate::events::{self, SharedSink, SimEvent};
use ndarray::Array2;
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use tracing::debug;

/// 1パイプラインあたりの特徴量数
pub const FEATURE_COUNT: usize = 3;

/// 特徴量名の組
pub type FeatureNames = [&'static str; FEATURE_COUNT];

/// ラベル付き特徴量レコード（生成後は不変）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// 特徴量（プロファイルの FEATURE_NAMES と同じ順序）
    pub features: [f64; FEATURE_COUNT],
    /// 正解ラベル（true = 異常）
    pub is_anomalous: bool,
}

/// 生成済みデータセット
#[derive(Debug, Clone)]
pub struct Dataset {
    pipeline: &'static str,
    feature_names: FeatureNames,
    records: Vec<FeatureRecord>,
}

impl Dataset {
    pub fn new(
        pipeline: &'static str,
        feature_names: FeatureNames,
        records: Vec<FeatureRecord>,
    ) -> Self {
        Self {
            pipeline,
            feature_names,
            records,
        }
    }

    pub fn pipeline(&self) -> &'static str {
        self.pipeline
    }

    pub fn feature_names(&self) -> &FeatureNames {
        &self.feature_names
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 異常ラベルの件数
    pub fn anomaly_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_anomalous).count()
    }

    /// (n_samples, 3) の特徴量行列
    pub fn feature_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.records.len(), FEATURE_COUNT), |(i, j)| {
            self.records[i].features[j]
        })
    }

    /// 正解ラベル列
    pub fn labels(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.is_anomalous).collect()
    }

    /// 特徴量名で列を取り出す
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.feature_names.iter().position(|n| *n == name)?;
        Some(self.records.iter().map(|r| r.features[index]).collect())
    }
}

/// 1特徴量の生成分布
#[derive(Debug, Clone)]
pub enum FeatureSampler {
    /// 正規分布 N(mean, std_dev)
    Gaussian(Normal),
    /// 定数（離散状態フラグなど）
    Constant(f64),
}

impl FeatureSampler {
    /// 正規分布サンプラーを作成（std_dev > 0）
    pub fn gaussian(mean: f64, std_dev: f64) -> Result<Self> {
        let normal = Normal::new(mean, std_dev).map_err(|e| {
            Error::invalid(
                "std_dev",
                format!("invalid normal distribution N({}, {}): {}", mean, std_dev, e),
            )
        })?;
        Ok(FeatureSampler::Gaussian(normal))
    }

    pub fn constant(value: f64) -> Self {
        FeatureSampler::Constant(value)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            FeatureSampler::Gaussian(normal) => normal.sample(rng),
            FeatureSampler::Constant(value) => *value,
        }
    }
}

/// 3特徴量の同時分布（各特徴量は独立）
#[derive(Debug, Clone)]
pub struct FeatureDistribution([FeatureSampler; FEATURE_COUNT]);

impl FeatureDistribution {
    pub fn new(samplers: [FeatureSampler; FEATURE_COUNT]) -> Self {
        Self(samplers)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; FEATURE_COUNT] {
        [
            self.0[0].sample(rng),
            self.0[1].sample(rng),
            self.0[2].sample(rng),
        ]
    }
}

/// パイプライン固有の特徴量セットと正常 / 異常レジーム
pub trait TelemetryProfile {
    /// パイプライン名（イベント・レポート用）
    const NAME: &'static str;
    /// 特徴量名
    const FEATURE_NAMES: FeatureNames;

    /// 正常レジームから1件サンプリング
    fn sample_normal<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; FEATURE_COUNT];

    /// 異常レジームから1件サンプリング
    fn sample_anomalous<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; FEATURE_COUNT];
}

/// シード可能な乱数生成器を作成
pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// 一括生成器
pub struct SyntheticGenerator<P: TelemetryProfile> {
    profile: P,
    rng: StdRng,
    sink: SharedSink,
}

impl<P: TelemetryProfile> SyntheticGenerator<P> {
    /// 新しい生成器を作成（seed = None の場合は非決定的）
    pub fn new(profile: P, seed: Option<u64>) -> Self {
        Self {
            profile,
            rng: seeded_rng(seed),
            sink: events::noop(),
        }
    }

    /// イベントシンクを注入
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn profile(&self) -> &P {
        &self.profile
    }

    /// ラベル付きデータセットを生成
    ///
    /// 正常件数 = floor(n * (1 - c))、異常件数 = floor(n * c)。
    /// n * c に端数がある場合（例: n = 7, c = 0.5 → 3 + 3）、合計は n より1件少なくなる。
    pub fn generate(&mut self, n_samples: usize, contamination: f64) -> Result<Dataset> {
        check_sample_count("n_samples", n_samples)?;
        check_fraction("contamination", contamination)?;

        let (n_normal, n_anomalous) = split_counts(n_samples, contamination);
        debug!(
            pipeline = P::NAME,
            n_normal, n_anomalous, "generating synthetic dataset"
        );

        let mut records = Vec::with_capacity(n_normal + n_anomalous);
        for _ in 0..n_normal {
            records.push(FeatureRecord {
                features: self.profile.sample_normal(&mut self.rng),
                is_anomalous: false,
            });
        }
        for _ in 0..n_anomalous {
            records.push(FeatureRecord {
                features: self.profile.sample_anomalous(&mut self.rng),
                is_anomalous: true,
            });
        }

        records.shuffle(&mut self.rng);

        self.sink.record(SimEvent::DatasetGenerated {
            pipeline: P::NAME.to_string(),
            total: records.len(),
            anomalies: n_anomalous,
        });

        Ok(Dataset::new(P::NAME, P::FEATURE_NAMES, records))
    }
}

/// (正常件数, 異常件数) を切り捨てで算出
///
/// 両方を切り捨てるため、n * c が整数でなければ合計は n - 1 になる。
pub fn split_counts(n_samples: usize, contamination: f64) -> (usize, usize) {
    let n = n_samples as f64;
    let n_normal = (n * (1.0 - contamination)).floor() as usize;
    let n_anomalous = (n * contamination).floor() as usize;
    (n_normal, n_anomalous)
}
