//! Feature scaling
//!
//! 学習データから一度だけパラメータを推定し、学習時・推論時で同一の線形変換を適用する。

use super::check_feature_count;
use crate::error::{DegenerateKind, Error, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// 分散・範囲をゼロとみなす閾値
const DEGENERATE_EPSILON: f64 = 1e-12;

/// スケーリング方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingStrategy {
    /// 平均を引き標準偏差で割る
    Standardize,
    /// 観測範囲で [0, 1] に写像
    MinMax,
}

impl ScalingStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ScalingStrategy::Standardize => "standard",
            ScalingStrategy::MinMax => "min_max",
        }
    }

    /// 学習データからスケーラー状態を推定
    ///
    /// 分散（標準化）または範囲（Min-Max）がゼロの列があれば
    /// [`Error::DegenerateFeature`] を返す。NaN / Inf は生成しない。
    pub fn fit(&self, x: ArrayView2<'_, f64>) -> Result<ScalerState> {
        self.fit_named(x, &[])
    }

    /// 列名付きで推定（エラーメッセージ用）
    pub fn fit_named(&self, x: ArrayView2<'_, f64>, names: &[&str]) -> Result<ScalerState> {
        super::check_training_input(x)?;

        let column_name = |index: usize| {
            names
                .get(index)
                .map(|n| n.to_string())
                .unwrap_or_else(|| format!("feature_{}", index))
        };

        match self {
            ScalingStrategy::Standardize => {
                let mean = x
                    .mean_axis(Axis(0))
                    .ok_or(Error::EmptyInput("training samples"))?;
                // 母標準偏差 (ddof = 0)
                let scale = x.std_axis(Axis(0), 0.0);

                if let Some(index) = scale.iter().position(|s| *s <= DEGENERATE_EPSILON) {
                    return Err(Error::DegenerateFeature {
                        index,
                        name: column_name(index),
                        kind: DegenerateKind::ZeroVariance,
                    });
                }

                Ok(ScalerState::Standard { mean, scale })
            }
            ScalingStrategy::MinMax => {
                let min = x.fold_axis(Axis(0), f64::INFINITY, |acc, v| acc.min(*v));
                let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, v| acc.max(*v));
                let range = &max - &min;

                if let Some(index) = range.iter().position(|r| *r <= DEGENERATE_EPSILON) {
                    return Err(Error::DegenerateFeature {
                        index,
                        name: column_name(index),
                        kind: DegenerateKind::ZeroRange,
                    });
                }

                Ok(ScalerState::MinMax { min, range })
            }
        }
    }
}

/// 学習済みスケーラー状態（不変）
#[derive(Debug, Clone, PartialEq)]
pub enum ScalerState {
    /// 標準化パラメータ
    Standard { mean: Array1<f64>, scale: Array1<f64> },
    /// Min-Max パラメータ
    MinMax { min: Array1<f64>, range: Array1<f64> },
}

impl ScalerState {
    pub fn strategy(&self) -> ScalingStrategy {
        match self {
            ScalerState::Standard { .. } => ScalingStrategy::Standardize,
            ScalerState::MinMax { .. } => ScalingStrategy::MinMax,
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            ScalerState::Standard { mean, .. } => mean.len(),
            ScalerState::MinMax { min, .. } => min.len(),
        }
    }

    /// 変換を適用（状態は変更しない）
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        check_feature_count(self.n_features(), x)?;

        let scaled = match self {
            ScalerState::Standard { mean, scale } => (&x - mean) / scale,
            ScalerState::MinMax { min, range } => (&x - min) / range,
        };
        Ok(scaled)
    }

    /// 逆変換（元の単位に戻す）
    pub fn inverse_transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        check_feature_count(self.n_features(), x)?;

        let original = match self {
            ScalerState::Standard { mean, scale } => &x * scale + mean,
            ScalerState::MinMax { min, range } => &x * range + min,
        };
        Ok(original)
    }
}
