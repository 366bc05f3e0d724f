//! Mission Loop, Configuration and Export Integration Tests

use aerosec::config::{SimConfig, StreamSettings};
use aerosec::events::{self, EventRecord, EventSink, MemorySink, SimEvent};
use aerosec::mission::run_mission;
use aerosec::pipeline::run_adsb;
use aerosec::report::EvaluationExport;
use aerosec::telemetry::adsb::AdsbStream;
use aerosec::telemetry::avionics::ArincBusStream;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn stream_settings(steps: u64, delay_ms: u64) -> StreamSettings {
    StreamSettings {
        steps,
        delay_ms,
        spoof_probability: 0.1,
        injection_probability: 0.05,
        seed: Some(42),
    }
}

#[tokio::test]
async fn test_mission_completes_all_cycles() {
    let sink = MemorySink::new();
    let mut out = Vec::new();
    let summary = run_mission(
        &stream_settings(30, 0),
        CancellationToken::new(),
        Arc::new(sink.clone()),
        &mut out,
    )
    .await
    .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(summary.cycles, 30);
    assert!(!summary.cancelled);
    assert_eq!(text.lines().count(), 30);
    assert!(text.lines().last().unwrap().starts_with("Cycle 030 |"));

    let anomaly_events = sink
        .records()
        .iter()
        .filter(|r| matches!(r.event, SimEvent::StreamAnomaly { .. }))
        .count() as u64;
    assert_eq!(anomaly_events, summary.adsb_alerts + summary.bus_alerts);
}

#[tokio::test]
async fn test_mission_cancelled_during_delay() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        canceller.cancel();
    });

    let mut out = Vec::new();
    let summary = run_mission(&stream_settings(1_000, 50), token, events::noop(), &mut out)
        .await
        .unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(summary.cancelled);
    assert!(summary.cycles >= 1 && summary.cycles < 1_000);
    // 出力行はすべて完全
    assert_eq!(text.lines().count() as u64, summary.cycles);
    assert!(text.lines().all(|l| l.ends_with(']')));
}

/// 最初の ADS-B 異常でキャンセルするシンク
struct CancelOnSpoof {
    inner: MemorySink,
    token: CancellationToken,
}

impl EventSink for CancelOnSpoof {
    fn emit(&self, record: EventRecord) {
        if let SimEvent::StreamAnomaly { source, .. } = &record.event {
            if source == AdsbStream::SOURCE {
                self.token.cancel();
            }
        }
        self.inner.emit(record);
    }
}

#[tokio::test]
async fn test_mission_cancelled_mid_cycle_keeps_streams_in_step() {
    let token = CancellationToken::new();
    let memory = MemorySink::new();
    let sink = Arc::new(CancelOnSpoof {
        inner: memory.clone(),
        token: token.clone(),
    });

    let mut settings = stream_settings(10, 0);
    settings.spoof_probability = 1.0;
    settings.injection_probability = 0.0;

    let mut out = Vec::new();
    let summary = run_mission(&settings, token, sink, &mut out).await.unwrap();

    // 異常を出したサイクルは完全に出力・集計される
    let text = String::from_utf8(out).unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.adsb_alerts, 1);
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("Cycle 001 |"));
    assert!(text.trim_end().ends_with("[ALERT: GHOST AIRCRAFT]"));

    let events: Vec<SimEvent> = memory.records().into_iter().map(|r| r.event).collect();
    let anomalies = events
        .iter()
        .filter(|e| matches!(e, SimEvent::StreamAnomaly { .. }))
        .count() as u64;
    assert_eq!(anomalies, summary.adsb_alerts + summary.bus_alerts);

    for source in [AdsbStream::SOURCE, ArincBusStream::SOURCE] {
        let stopped: Vec<&SimEvent> = events
            .iter()
            .filter(|e| matches!(e, SimEvent::StreamStopped { source: s, .. } if s == source))
            .collect();
        assert_eq!(
            stopped,
            vec![&SimEvent::StreamStopped {
                source: source.to_string(),
                emitted: 1,
                cancelled: true,
            }]
        );
    }
}

#[tokio::test]
async fn test_completed_mission_stops_each_stream_once() {
    let sink = MemorySink::new();
    let mut out = Vec::new();
    let summary = run_mission(
        &stream_settings(5, 0),
        CancellationToken::new(),
        Arc::new(sink.clone()),
        &mut out,
    )
    .await
    .unwrap();

    assert!(!summary.cancelled);
    let stopped: Vec<SimEvent> = sink
        .records()
        .into_iter()
        .map(|r| r.event)
        .filter(|e| matches!(e, SimEvent::StreamStopped { .. }))
        .collect();
    assert_eq!(stopped.len(), 2);
    assert!(stopped.iter().all(|e| matches!(
        e,
        SimEvent::StreamStopped { emitted: 5, cancelled: false, .. }
    )));
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aerosec.toml");
    std::fs::write(&path, "[avionics.detector]\nnu = 0.0\n").unwrap();

    let err = SimConfig::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("avionics.detector.nu"));
}

#[test]
fn test_evaluation_export_written_as_json() {
    let mut config = SimConfig::default();
    config.adsb.n_samples = 200;
    let evaluation = run_adsb(&config.adsb, events::noop()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exports").join("adsb_evaluation.json");
    let export = EvaluationExport::from_evaluation(&evaluation);
    export.write_json(&path).unwrap();

    let restored = EvaluationExport::read_json(&path).unwrap();
    assert_eq!(restored.rows.len(), 200);
    assert_eq!(restored.ground_truth, 20);
    assert_eq!(restored.pipeline, "adsb");
    assert_eq!(restored.plot_axes.unwrap().x, "velocity_delta");
}
