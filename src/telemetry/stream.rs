//! Streaming control
//!
//! ストリーミング生成器の共通部分: ステップ上限、キャンセル、イベント発行。
//! キャンセルはステップ境界でのみ確認するため、レコードは常に完全な形で出力される。

use crate::events::{self, SharedSink, SimEvent};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// ストリームが出力する1レコード
pub trait StreamItem {
    /// ステップ番号（0始まり）
    fn step(&self) -> u64;
    /// 異常フラグ
    fn is_anomalous(&self) -> bool;
}

/// ストリームの進行状態
pub struct StreamControl {
    source: &'static str,
    cancel: CancellationToken,
    max_steps: Option<u64>,
    emitted: u64,
    finished: bool,
    sink: SharedSink,
}

impl StreamControl {
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            cancel: CancellationToken::new(),
            max_steps: None,
            emitted: 0,
            finished: false,
            sink: events::noop(),
        }
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// 次のステップを開始できればステップ番号を返す
    pub fn begin_step(&mut self) -> Option<u64> {
        if self.finished {
            return None;
        }

        if self.cancel.is_cancelled() {
            self.finish(true);
            return None;
        }

        if let Some(max) = self.max_steps {
            if self.emitted >= max {
                self.finish(false);
                return None;
            }
        }

        Some(self.emitted)
    }

    /// ステップ完了（レコードを出力した）
    pub fn complete(&mut self, step: u64, is_anomalous: bool) {
        self.emitted = step + 1;
        if is_anomalous {
            self.sink.record(SimEvent::StreamAnomaly {
                source: self.source.to_string(),
                step,
            });
        }
    }

    /// 呼び出し側からストリームを終了する（終了済みなら何もしない）
    pub fn stop(&mut self, cancelled: bool) {
        if !self.finished {
            self.finish(cancelled);
        }
    }

    fn finish(&mut self, cancelled: bool) {
        self.finished = true;
        debug!(
            source = self.source,
            emitted = self.emitted,
            cancelled,
            "stream stopped"
        );
        self.sink.record(SimEvent::StreamStopped {
            source: self.source.to_string(),
            emitted: self.emitted,
            cancelled,
        });
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// このストリームのキャンセルトークン
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
