//! Structured simulation events
//!
//! 生成器・検知器が発行する監査イベント。文字列ではなく構造化データとして
//! シンクに渡し、出力形式（コンソール / JSONL）はシンク側が決める。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// イベントレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Critical,
}

/// シミュレーションイベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimEvent {
    /// データセット生成完了
    DatasetGenerated {
        pipeline: String,
        total: usize,
        anomalies: usize,
    },
    /// スケーラー学習完了
    ScalerFitted {
        pipeline: String,
        strategy: String,
        features: usize,
    },
    /// 検知モデル学習完了
    ModelFitted {
        pipeline: String,
        detector: String,
        samples: usize,
    },
    /// 評価完了
    EvaluationCompleted {
        pipeline: String,
        precision: f64,
        recall: f64,
        f1: f64,
    },
    /// ストリーム中の異常
    StreamAnomaly { source: String, step: u64 },
    /// ストリーム終了
    StreamStopped {
        source: String,
        emitted: u64,
        cancelled: bool,
    },
}

impl SimEvent {
    /// イベント種別ごとの既定レベル
    pub fn default_level(&self) -> EventLevel {
        match self {
            SimEvent::StreamAnomaly { .. } => EventLevel::Critical,
            SimEvent::StreamStopped {
                cancelled: true, ..
            } => EventLevel::Warning,
            _ => EventLevel::Info,
        }
    }
}

/// タイムスタンプ付きイベントレコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub event: SimEvent,
}

impl EventRecord {
    pub fn new(event: SimEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            level: event.default_level(),
            event,
        }
    }
}

/// イベントの受け口
pub trait EventSink: Send + Sync {
    fn emit(&self, record: EventRecord);

    /// 既定レベルでイベントを発行
    fn record(&self, event: SimEvent) {
        self.emit(EventRecord::new(event));
    }
}

/// 何もしないシンク（デフォルト）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _record: EventRecord) {}
}

/// tracing にフィールド付きイベントとして転送するシンク
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, record: EventRecord) {
        let payload = serde_json::to_string(&record.event).unwrap_or_default();
        match record.level {
            EventLevel::Debug => tracing::debug!(
                target: "aerosec::audit",
                event_time = %record.timestamp.to_rfc3339(),
                event = %payload,
                "{}",
                describe(&record.event)
            ),
            EventLevel::Info => tracing::info!(
                target: "aerosec::audit",
                event_time = %record.timestamp.to_rfc3339(),
                event = %payload,
                "{}",
                describe(&record.event)
            ),
            EventLevel::Warning => tracing::warn!(
                target: "aerosec::audit",
                event_time = %record.timestamp.to_rfc3339(),
                event = %payload,
                "{}",
                describe(&record.event)
            ),
            EventLevel::Critical => tracing::error!(
                target: "aerosec::audit",
                event_time = %record.timestamp.to_rfc3339(),
                event = %payload,
                "{}",
                describe(&record.event)
            ),
        }
    }
}

/// コンソール向けの短い説明文
fn describe(event: &SimEvent) -> String {
    match event {
        SimEvent::DatasetGenerated {
            pipeline,
            total,
            anomalies,
        } => format!("[{}] generated {} records ({} anomalous)", pipeline, total, anomalies),
        SimEvent::ScalerFitted {
            pipeline,
            strategy,
            features,
        } => format!("[{}] {} scaler fitted on {} features", pipeline, strategy, features),
        SimEvent::ModelFitted {
            pipeline,
            detector,
            samples,
        } => format!("[{}] {} trained on {} samples", pipeline, detector, samples),
        SimEvent::EvaluationCompleted {
            pipeline,
            precision,
            recall,
            f1,
        } => format!(
            "[{}] precision={:.3} recall={:.3} f1={:.3}",
            pipeline, precision, recall, f1
        ),
        SimEvent::StreamAnomaly { source, step } => {
            format!("[{}] anomaly injected at step {}", source, step)
        }
        SimEvent::StreamStopped {
            source,
            emitted,
            cancelled,
        } => {
            if *cancelled {
                format!("[{}] stream cancelled after {} records", source, emitted)
            } else {
                format!("[{}] stream finished after {} records", source, emitted)
            }
        }
    }
}

/// メモリ上にイベントを蓄積するシンク
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 蓄積済みレコードのスナップショット
    pub fn records(&self) -> Vec<EventRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn emit(&self, record: EventRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// 共有シンクのハンドル
pub type SharedSink = Arc<dyn EventSink>;

/// NoopSink を共有ハンドルとして返す
pub fn noop() -> SharedSink {
    Arc::new(NoopSink)
}
