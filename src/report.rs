//! Evaluation export
//!
//! ダッシュボード（外部）向けに評価結果をプレーンな JSON として書き出す。
//! 描画は行わない。

use crate::error::Result;
use crate::ml::metrics::{ClassMetrics, ConfusionMatrix};
use crate::pipeline::{Evaluation, PipelineKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// 1点分のエクスポート行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    /// 特徴量名 → 値（元の単位）
    pub features: BTreeMap<String, f64>,
    /// 正解（1 = 異常）
    pub true_label: u8,
    /// 予測（1 = 異常）
    pub predicted_label: u8,
}

/// 散布図の軸ヒント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotAxes {
    pub x: String,
    pub y: String,
}

/// 評価メトリクス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetrics {
    pub class_names: [String; 2],
    pub normal: ClassMetrics,
    pub anomalous: ClassMetrics,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
}

/// ダッシュボード向けエクスポート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationExport {
    /// エクスポート識別子
    pub export_id: Uuid,
    pub pipeline: String,
    pub generated_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub plot_axes: Option<PlotAxes>,
    pub metrics: ExportMetrics,
    pub detected: usize,
    pub ground_truth: usize,
    pub rows: Vec<ExportRow>,
}

impl EvaluationExport {
    pub fn from_evaluation(evaluation: &Evaluation) -> Self {
        let rows = evaluation
            .features
            .rows()
            .into_iter()
            .zip(&evaluation.true_labels)
            .zip(&evaluation.predicted_labels)
            .map(|((row, &truth), predicted)| ExportRow {
                features: evaluation
                    .feature_names
                    .iter()
                    .cloned()
                    .zip(row.iter().copied())
                    .collect(),
                true_label: u8::from(truth),
                predicted_label: predicted.as_flag(),
            })
            .collect();

        let plot_axes = PipelineKind::from_name(&evaluation.pipeline).map(|kind| {
            let (x, y) = kind.plot_axes();
            PlotAxes {
                x: x.to_string(),
                y: y.to_string(),
            }
        });

        let report = &evaluation.report;
        Self {
            export_id: Uuid::new_v4(),
            pipeline: evaluation.pipeline.clone(),
            generated_at: Utc::now(),
            feature_names: evaluation.feature_names.clone(),
            plot_axes,
            metrics: ExportMetrics {
                class_names: report.class_names.clone(),
                normal: report.normal,
                anomalous: report.anomalous,
                accuracy: report.accuracy,
                confusion: report.confusion,
            },
            detected: evaluation.detected(),
            ground_truth: evaluation.ground_truth(),
            rows,
        }
    }

    /// JSON ファイルとして書き出す（親ディレクトリは作成する）
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;

        info!(
            export_id = %self.export_id,
            pipeline = %self.pipeline,
            rows = self.rows.len(),
            path = %path.display(),
            "evaluation exported"
        );
        Ok(())
    }

    /// JSON ファイルから読み込む
    pub fn read_json(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// コンソール向けの要約行
pub fn summary_line(evaluation: &Evaluation) -> String {
    format!(
        "[SUMMARY] Detected {} threats (Ground Truth: {})",
        evaluation.detected(),
        evaluation.ground_truth()
    )
}

/// コンソール向けの評価レポート全体
pub fn render(evaluation: &Evaluation) -> String {
    let title = match PipelineKind::from_name(&evaluation.pipeline) {
        Some(PipelineKind::Adsb) => "ADS-B Spoofing Detection (Isolation Forest)",
        Some(PipelineKind::Avionics) => "ARINC 429 Bus Anomaly Detection (One-Class SVM)",
        None => "Anomaly Detection",
    };
    format!(
        "=== {} ===\n\n{}\n{}\n",
        title,
        evaluation.report,
        summary_line(evaluation)
    )
}
