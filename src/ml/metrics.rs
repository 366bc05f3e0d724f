//! Detection quality metrics
//!
//! 正解ラベル（true = 異常）と予測を比較し、クラス別 precision / recall / f1 を算出する。
//! 分母が 0 の指標は 0.0 とする。

use super::Label;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 1クラス分の指標
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(true_positive: usize, false_positive: usize, false_negative: usize) -> Self {
        let precision = ratio(true_positive, true_positive + false_positive);
        let recall = ratio(true_positive, true_positive + false_negative);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            precision,
            recall,
            f1,
            support: true_positive + false_negative,
        }
    }
}

/// 混同行列（陽性 = 異常）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    /// 予測が異常だった件数
    pub fn predicted_anomalies(&self) -> usize {
        self.true_positive + self.false_positive
    }

    /// 正解が異常の件数
    pub fn actual_anomalies(&self) -> usize {
        self.true_positive + self.false_negative
    }
}

/// 分類レポート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// 表示名 [正常, 異常]
    pub class_names: [String; 2],
    pub normal: ClassMetrics,
    pub anomalous: ClassMetrics,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion: ConfusionMatrix,
}

impl ClassificationReport {
    /// クラス表示名を差し替える
    pub fn with_class_names(mut self, normal: impl Into<String>, anomalous: impl Into<String>) -> Self {
        self.class_names = [normal.into(), anomalous.into()];
        self
    }

    /// 異常クラスの precision
    pub fn precision(&self) -> f64 {
        self.anomalous.precision
    }

    /// 異常クラスの recall
    pub fn recall(&self) -> f64 {
        self.anomalous.recall
    }

    /// 異常クラスの f1
    pub fn f1(&self) -> f64 {
        self.anomalous.f1
    }
}

/// 予測を評価
pub fn evaluate(truth: &[bool], predicted: &[Label]) -> Result<ClassificationReport> {
    if truth.len() != predicted.len() {
        return Err(Error::DimensionMismatch {
            expected: truth.len(),
            got: predicted.len(),
        });
    }
    if truth.is_empty() {
        return Err(Error::EmptyInput("labels"));
    }

    let mut confusion = ConfusionMatrix::default();
    for (&actual, label) in truth.iter().zip(predicted) {
        match (actual, label.is_outlier()) {
            (false, false) => confusion.true_negative += 1,
            (false, true) => confusion.false_positive += 1,
            (true, false) => confusion.false_negative += 1,
            (true, true) => confusion.true_positive += 1,
        }
    }

    let anomalous = ClassMetrics::from_counts(
        confusion.true_positive,
        confusion.false_positive,
        confusion.false_negative,
    );
    // 正常クラスを陽性とみなした場合
    let normal = ClassMetrics::from_counts(
        confusion.true_negative,
        confusion.false_negative,
        confusion.false_positive,
    );

    let total = confusion.total();
    let accuracy = ratio(confusion.true_positive + confusion.true_negative, total);

    let macro_avg = ClassMetrics {
        precision: (normal.precision + anomalous.precision) / 2.0,
        recall: (normal.recall + anomalous.recall) / 2.0,
        f1: (normal.f1 + anomalous.f1) / 2.0,
        support: total,
    };

    let weight = |metric: fn(&ClassMetrics) -> f64| {
        (metric(&normal) * normal.support as f64 + metric(&anomalous) * anomalous.support as f64)
            / total as f64
    };
    let weighted_avg = ClassMetrics {
        precision: weight(|m| m.precision),
        recall: weight(|m| m.recall),
        f1: weight(|m| m.f1),
        support: total,
    };

    Ok(ClassificationReport {
        class_names: ["Normal".to_string(), "Anomalous".to_string()],
        normal,
        anomalous,
        accuracy,
        macro_avg,
        weighted_avg,
        confusion,
    })
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .class_names
            .iter()
            .map(|n| n.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        )?;
        writeln!(f)?;

        let row = |f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics| {
            writeln!(
                f,
                "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name,
                m.precision,
                m.recall,
                m.f1,
                m.support,
                width = width
            )
        };

        row(f, &self.class_names[0], &self.normal)?;
        row(f, &self.class_names[1], &self.anomalous)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.confusion.total(),
            width = width
        )?;
        row(f, "macro avg", &self.macro_avg)?;
        row(f, "weighted avg", &self.weighted_avg)
    }
}
