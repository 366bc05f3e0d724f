//! Detection pipelines
//!
//! Generator → Scaler → Detector を明示的なデータの受け渡しで合成する。
//! 各段は独立した値（[`Dataset`], [`ScalerState`], [`DetectorModel`]）を返し、
//! パイプライン全体で共有される可変状態は持たない。
//!
//! | パイプライン | 特徴量 | スケーリング | 検知器 |
//! |---|---|---|---|
//! | ADS-B | altitude_delta, velocity_delta, rssi | 標準化 | Isolation Forest |
//! | Avionics | airspeed, altitude, gear_status | Min-Max | One-Class SVM |

use crate::config::{AdsbSettings, AvionicsSettings, IsolationForestSettings, OneClassSvmSettings};
use crate::error::{Error, Result};
use crate::events::{SharedSink, SimEvent};
use crate::ml::{
    evaluate, AnomalyDetector, ClassificationReport, Contamination, FittedDetector, Gamma,
    IsolationForest, IsolationForestModel, Label, OneClassSvm, OneClassSvmModel, ScalerState,
    ScalingStrategy,
};
use crate::telemetry::adsb::AdsbProfile;
use crate::telemetry::avionics::AvionicsProfile;
use crate::telemetry::{Dataset, FeatureNames, SyntheticGenerator, TelemetryProfile};
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::info;

/// パイプライン種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// ADS-B 偽装検知
    Adsb,
    /// ARINC 429 バス異常検知
    Avionics,
}

impl PipelineKind {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineKind::Adsb => AdsbProfile::NAME,
            PipelineKind::Avionics => AvionicsProfile::NAME,
        }
    }

    /// パイプライン名から逆引き
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            n if n == AdsbProfile::NAME => Some(PipelineKind::Adsb),
            n if n == AvionicsProfile::NAME => Some(PipelineKind::Avionics),
            _ => None,
        }
    }

    /// レポート用クラス名 [正常, 異常]
    pub fn class_names(&self) -> [&'static str; 2] {
        match self {
            PipelineKind::Adsb => ["Normal", "Spoofed"],
            PipelineKind::Avionics => ["Nominal Telemetry", "Logic Bomb Injection"],
        }
    }

    /// 散布図の軸 (x, y)
    pub fn plot_axes(&self) -> (&'static str, &'static str) {
        match self {
            PipelineKind::Adsb => ("velocity_delta", "altitude_delta"),
            PipelineKind::Avionics => ("airspeed", "altitude"),
        }
    }

    /// パイプライン固有のスケーリング方式
    pub fn scaling(&self) -> ScalingStrategy {
        match self {
            PipelineKind::Adsb => ScalingStrategy::Standardize,
            PipelineKind::Avionics => ScalingStrategy::MinMax,
        }
    }
}

/// 検知器の指定
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorSpec {
    IsolationForest(IsolationForest),
    OneClassSvm(OneClassSvm),
}

impl DetectorSpec {
    /// 設定から Isolation Forest を構築
    pub fn isolation_forest(settings: &IsolationForestSettings, seed: Option<u64>) -> Self {
        let mut forest = IsolationForest::new()
            .with_n_estimators(settings.n_estimators)
            .with_max_samples(settings.max_samples)
            .with_contamination(Contamination::Fraction(settings.contamination));
        if let Some(seed) = seed {
            forest = forest.with_random_state(seed);
        }
        DetectorSpec::IsolationForest(forest)
    }

    /// 設定から One-Class SVM を構築
    pub fn one_class_svm(settings: &OneClassSvmSettings) -> Self {
        DetectorSpec::OneClassSvm(
            OneClassSvm::new()
                .with_nu(settings.nu)
                .with_gamma(Gamma::Value(settings.gamma))
                .with_tol(settings.tol)
                .with_max_iter(settings.max_iter),
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            DetectorSpec::IsolationForest(d) => d.name(),
            DetectorSpec::OneClassSvm(d) => d.name(),
        }
    }

    /// ハイパーパラメータのみ検証（データ生成前に呼ぶ）
    pub fn validate(&self) -> Result<()> {
        match self {
            DetectorSpec::IsolationForest(d) => d.validate(),
            DetectorSpec::OneClassSvm(d) => d.validate(),
        }
    }

    /// スケーリング済み特徴量で学習
    pub fn fit(&self, x: ArrayView2<'_, f64>) -> Result<DetectorModel> {
        Ok(match self {
            DetectorSpec::IsolationForest(d) => DetectorModel::IsolationForest(d.fit(x)?),
            DetectorSpec::OneClassSvm(d) => DetectorModel::OneClassSvm(d.fit(x)?),
        })
    }
}

/// 学習済み検知モデル
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorModel {
    IsolationForest(IsolationForestModel),
    OneClassSvm(OneClassSvmModel),
}

impl FittedDetector for DetectorModel {
    fn n_features(&self) -> usize {
        match self {
            DetectorModel::IsolationForest(m) => m.n_features(),
            DetectorModel::OneClassSvm(m) => m.n_features(),
        }
    }

    fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        match self {
            DetectorModel::IsolationForest(m) => m.decision_function(x),
            DetectorModel::OneClassSvm(m) => m.decision_function(x),
        }
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        match self {
            DetectorModel::IsolationForest(m) => m.predict(x),
            DetectorModel::OneClassSvm(m) => m.predict(x),
        }
    }
}

/// 学習済みパイプライン（スケーラー + 検知モデル）
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedPipeline {
    pipeline: &'static str,
    feature_names: FeatureNames,
    scaler: ScalerState,
    model: DetectorModel,
}

impl TrainedPipeline {
    pub fn pipeline(&self) -> &'static str {
        self.pipeline
    }

    pub fn feature_names(&self) -> &FeatureNames {
        &self.feature_names
    }

    pub fn scaler(&self) -> &ScalerState {
        &self.scaler
    }

    pub fn model(&self) -> &DetectorModel {
        &self.model
    }

    /// 生の特徴量行列をスケーリング
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.scaler.transform(x)
    }

    /// 生の特徴量行列を分類
    pub fn predict_matrix(&self, x: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        let scaled = self.scaler.transform(x)?;
        self.model.predict(scaled.view())
    }

    /// 生の特徴量行列の決定関数値
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let scaled = self.scaler.transform(x)?;
        self.model.decision_function(scaled.view())
    }

    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<Label>> {
        self.predict_matrix(dataset.feature_matrix().view())
    }

    /// データセットを分類し正解ラベルと比較
    pub fn evaluate(&self, dataset: &Dataset) -> Result<Evaluation> {
        let features = dataset.feature_matrix();
        let predicted_labels = self.predict_matrix(features.view())?;
        let true_labels = dataset.labels();

        let mut report = evaluate(&true_labels, &predicted_labels)?;
        if let Some(kind) = PipelineKind::from_name(dataset.pipeline()) {
            let [normal, anomalous] = kind.class_names();
            report = report.with_class_names(normal, anomalous);
        }

        Ok(Evaluation {
            pipeline: dataset.pipeline().to_string(),
            feature_names: dataset.feature_names().iter().map(|n| n.to_string()).collect(),
            features,
            true_labels,
            predicted_labels,
            report,
        })
    }
}

/// 学習（ラベルは使用しない）
///
/// スケーラーは特徴量のみから推定し、検知器はスケーリング後の特徴量のみで学習する。
pub fn train(
    dataset: &Dataset,
    strategy: ScalingStrategy,
    detector: &DetectorSpec,
    sink: &SharedSink,
) -> Result<TrainedPipeline> {
    if dataset.is_empty() {
        return Err(Error::EmptyInput("dataset"));
    }

    let features = dataset.feature_matrix();
    let scaler = strategy.fit_named(features.view(), dataset.feature_names())?;
    sink.record(SimEvent::ScalerFitted {
        pipeline: dataset.pipeline().to_string(),
        strategy: strategy.name().to_string(),
        features: scaler.n_features(),
    });

    let scaled = scaler.transform(features.view())?;
    let model = detector.fit(scaled.view())?;
    sink.record(SimEvent::ModelFitted {
        pipeline: dataset.pipeline().to_string(),
        detector: detector.name().to_string(),
        samples: dataset.len(),
    });

    Ok(TrainedPipeline {
        pipeline: dataset.pipeline(),
        feature_names: *dataset.feature_names(),
        scaler,
        model,
    })
}

/// 評価結果（ダッシュボード向けのプレーンデータ）
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub pipeline: String,
    pub feature_names: Vec<String>,
    /// 元の単位の特徴量 (n_samples, 3)
    pub features: Array2<f64>,
    pub true_labels: Vec<bool>,
    pub predicted_labels: Vec<Label>,
    pub report: ClassificationReport,
}

impl Evaluation {
    /// 異常と判定した件数
    pub fn detected(&self) -> usize {
        self.predicted_labels.iter().filter(|l| l.is_outlier()).count()
    }

    /// 正解の異常件数
    pub fn ground_truth(&self) -> usize {
        self.true_labels.iter().filter(|l| **l).count()
    }

    /// 評価完了イベント
    pub fn completed_event(&self) -> SimEvent {
        SimEvent::EvaluationCompleted {
            pipeline: self.pipeline.clone(),
            precision: self.report.precision(),
            recall: self.report.recall(),
            f1: self.report.f1(),
        }
    }
}

/// 学習済み状態を保持するセッション
///
/// 学習前の変換・推論は [`Error::NotFitted`] で失敗する。
/// `train` は既存の状態を丸ごと置き換える（追加学習はしない）。
pub struct AnalysisSession {
    strategy: ScalingStrategy,
    detector: DetectorSpec,
    sink: SharedSink,
    trained: Option<TrainedPipeline>,
}

impl AnalysisSession {
    pub fn new(strategy: ScalingStrategy, detector: DetectorSpec) -> Self {
        Self {
            strategy,
            detector,
            sink: crate::events::noop(),
            trained: None,
        }
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// 学習して状態を置き換える
    pub fn train(&mut self, dataset: &Dataset) -> Result<&TrainedPipeline> {
        let trained = train(dataset, self.strategy, &self.detector, &self.sink)?;
        Ok(&*self.trained.insert(trained))
    }

    pub fn trained(&self) -> Result<&TrainedPipeline> {
        self.trained.as_ref().ok_or(Error::NotFitted("pipeline"))
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.trained
            .as_ref()
            .ok_or(Error::NotFitted("scaler"))?
            .transform(x)
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<Label>> {
        self.trained
            .as_ref()
            .ok_or(Error::NotFitted("detector"))?
            .predict_matrix(x)
    }

    pub fn evaluate(&self, dataset: &Dataset) -> Result<Evaluation> {
        let evaluation = self.trained()?.evaluate(dataset)?;
        self.sink.record(evaluation.completed_event());
        Ok(evaluation)
    }
}

/// 生成 → 学習 → 同一データで評価
fn run<P: TelemetryProfile>(
    kind: PipelineKind,
    profile: P,
    n_samples: usize,
    contamination: f64,
    seed: Option<u64>,
    detector: DetectorSpec,
    sink: SharedSink,
) -> Result<Evaluation> {
    // データ生成前にハイパーパラメータを検証
    detector.validate()?;

    let mut generator = SyntheticGenerator::new(profile, seed).with_sink(sink.clone());
    let dataset = generator.generate(n_samples, contamination)?;

    let mut session = AnalysisSession::new(kind.scaling(), detector).with_sink(sink);
    session.train(&dataset)?;
    let evaluation = session.evaluate(&dataset)?;

    info!(
        pipeline = kind.name(),
        detected = evaluation.detected(),
        ground_truth = evaluation.ground_truth(),
        f1 = evaluation.report.f1(),
        "pipeline evaluation completed"
    );

    Ok(evaluation)
}

/// ADS-B 偽装検知パイプライン（標準化 + Isolation Forest）
pub fn run_adsb(settings: &AdsbSettings, sink: SharedSink) -> Result<Evaluation> {
    run(
        PipelineKind::Adsb,
        AdsbProfile::new()?,
        settings.n_samples,
        settings.contamination,
        settings.seed,
        DetectorSpec::isolation_forest(&settings.detector, settings.seed),
        sink,
    )
}

/// ARINC 429 バス異常検知パイプライン（Min-Max + One-Class SVM）
///
/// contamination = 0 の場合 gear_status 列の範囲がゼロになり、
/// スケーラー学習が [`Error::DegenerateFeature`] で失敗する。
pub fn run_avionics(settings: &AvionicsSettings, sink: SharedSink) -> Result<Evaluation> {
    run(
        PipelineKind::Avionics,
        AvionicsProfile::new()?,
        settings.n_samples,
        settings.contamination,
        settings.seed,
        DetectorSpec::one_class_svm(&settings.detector),
        sink,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, MemorySink};
    use crate::telemetry::FeatureRecord;
    use std::sync::Arc;

    fn small_dataset() -> Dataset {
        let records = (0..40)
            .map(|i| FeatureRecord {
                features: [i as f64 % 7.0, (i * 3) as f64 % 11.0, (i % 5) as f64],
                is_anomalous: i % 10 == 0,
            })
            .collect();
        Dataset::new("adsb", AdsbProfile::FEATURE_NAMES, records)
    }

    fn forest() -> DetectorSpec {
        DetectorSpec::IsolationForest(
            IsolationForest::new()
                .with_n_estimators(10)
                .with_random_state(1),
        )
    }

    #[test]
    fn test_session_requires_training() {
        let session = AnalysisSession::new(ScalingStrategy::Standardize, forest());
        let x = small_dataset().feature_matrix();

        assert!(!session.is_trained());
        assert!(matches!(
            session.transform(x.view()),
            Err(Error::NotFitted("scaler"))
        ));
        assert!(matches!(
            session.predict(x.view()),
            Err(Error::NotFitted("detector"))
        ));
        assert!(matches!(
            session.evaluate(&small_dataset()),
            Err(Error::NotFitted(_))
        ));
    }

    #[test]
    fn test_session_train_then_predict() {
        let dataset = small_dataset();
        let mut session = AnalysisSession::new(ScalingStrategy::Standardize, forest());
        session.train(&dataset).unwrap();

        let labels = session.predict(dataset.feature_matrix().view()).unwrap();
        assert_eq!(labels.len(), dataset.len());
        assert!(session.is_trained());
    }

    #[test]
    fn test_train_emits_events() {
        let sink = MemorySink::new();
        let shared: SharedSink = Arc::new(sink.clone());
        train(&small_dataset(), ScalingStrategy::MinMax, &forest(), &shared).unwrap();

        let kinds: Vec<SimEvent> = sink.records().into_iter().map(|r| r.event).collect();
        assert!(matches!(kinds[0], SimEvent::ScalerFitted { features: 3, .. }));
        assert!(matches!(kinds[1], SimEvent::ModelFitted { samples: 40, .. }));
    }

    #[test]
    fn test_invalid_detector_fails_before_generation() {
        let sink = MemorySink::new();
        let mut settings = AdsbSettings::default();
        settings.detector.contamination = 0.9;

        let err = run_adsb(&settings, Arc::new(sink.clone())).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_class_names_follow_pipeline() {
        let dataset = small_dataset();
        let trained = train(
            &dataset,
            ScalingStrategy::Standardize,
            &forest(),
            &events::noop(),
        )
        .unwrap();
        let evaluation = trained.evaluate(&dataset).unwrap();

        assert_eq!(evaluation.report.class_names[1], "Spoofed");
        assert_eq!(evaluation.features.shape(), &[40, 3]);
        assert_eq!(evaluation.ground_truth(), 4);
    }

    #[test]
    fn test_pipeline_kind_lookup() {
        assert_eq!(PipelineKind::from_name("adsb"), Some(PipelineKind::Adsb));
        assert_eq!(
            PipelineKind::from_name("avionics"),
            Some(PipelineKind::Avionics)
        );
        assert_eq!(PipelineKind::from_name("other"), None);
        assert_eq!(
            PipelineKind::Avionics.scaling(),
            ScalingStrategy::MinMax
        );
    }
}
