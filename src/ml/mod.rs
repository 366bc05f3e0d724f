//! Unsupervised anomaly detection
//!
//! ラベルを使わずに正常データの境界・密度を学習し、新しい点を
//! 正常（inlier）/ 異常（outlier）に分類する。
//!
//! ## 主要機能
//!
//! - **特徴量スケーリング**: 標準化 / Min-Max 正規化（[`scaler`]）
//! - **Isolation Forest**: ランダム分割の深さによる密度ベース検知（[`isolation_forest`]）
//! - **One-Class SVM**: RBFカーネルによる境界ベース検知（[`one_class_svm`]）
//! - **評価**: precision / recall / f1（[`metrics`]）
//!
//! 学習は新しい不変のモデル値を返し、推論はモデルを変更しない。

pub mod isolation_forest;
pub mod metrics;
pub mod one_class_svm;
pub mod scaler;

use crate::error::{Error, Result};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

pub use isolation_forest::{Contamination, IsolationForest, IsolationForestModel};
pub use metrics::{evaluate, ClassificationReport};
pub use one_class_svm::{Gamma, OneClassSvm, OneClassSvmModel};
pub use scaler::{ScalerState, ScalingStrategy};

/// 検知結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// 学習した正常領域の内側
    Inlier,
    /// 正常領域の外側
    Outlier,
}

impl Label {
    /// ドメイン表記: 1 = 異常, 0 = 正常
    pub fn as_flag(self) -> u8 {
        match self {
            Label::Inlier => 0,
            Label::Outlier => 1,
        }
    }

    pub fn is_outlier(self) -> bool {
        self == Label::Outlier
    }

    /// 決定関数値から判定（負 = 外れ値）
    pub fn from_decision(value: f64) -> Self {
        if value < 0.0 {
            Label::Outlier
        } else {
            Label::Inlier
        }
    }
}

/// 教師なし検知器（ハイパーパラメータ）
pub trait AnomalyDetector {
    /// 学習済みモデル
    type Model: FittedDetector;

    /// 検知器名（ログ・イベント用）
    fn name(&self) -> &'static str;

    /// スケーリング済み特徴量から学習（ラベルは使用しない）
    fn fit(&self, x: ArrayView2<'_, f64>) -> Result<Self::Model>;
}

/// 学習済み検知モデル
pub trait FittedDetector {
    /// 入力次元数
    fn n_features(&self) -> usize;

    /// 決定関数（負の値が外れ値、大きいほど正常）
    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    /// 各点を inlier / outlier に分類
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        Ok(self
            .decision_function(x)?
            .iter()
            .map(|&d| Label::from_decision(d))
            .collect())
    }
}

/// 学習入力の形状を検証
pub(crate) fn check_training_input(x: ArrayView2<'_, f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(Error::EmptyInput("training samples"));
    }
    if x.ncols() == 0 {
        return Err(Error::EmptyInput("feature columns"));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid(
            "features",
            "training data contains NaN or infinite values",
        ));
    }
    Ok(())
}

/// 推論入力の列数を検証
pub(crate) fn check_feature_count(expected: usize, x: ArrayView2<'_, f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(Error::DimensionMismatch {
            expected,
            got: x.ncols(),
        });
    }
    Ok(())
}

/// 線形補間パーセンタイル（q は 0〜100）
pub(crate) fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}
