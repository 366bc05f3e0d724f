//! Streaming Generator Integration Tests
//!
//! ステップ単位の前進、キャンセル、イベント発行を検証します。

use aerosec::events::{EventLevel, MemorySink, SimEvent};
use aerosec::telemetry::adsb::{AdsbProfile, AdsbStream};
use aerosec::telemetry::avionics::{ArincBusStream, GEAR_EXTENDED, GEAR_RETRACTED};
use aerosec::telemetry::stream::StreamItem;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// シナリオC: 100ステップ進めてからキャンセル
#[test]
fn test_stream_cancelled_after_exactly_100_steps() {
    let token = CancellationToken::new();
    let mut stream = AdsbStream::new(AdsbProfile::new().unwrap(), 0.1, Some(42))
        .unwrap()
        .with_cancellation(token.clone());

    let mut packets = Vec::new();
    for _ in 0..100 {
        packets.push(stream.advance().expect("stream ended early"));
    }
    token.cancel();

    assert!(stream.advance().is_none());
    assert!(stream.next().is_none());
    assert_eq!(stream.emitted(), 100);
    assert_eq!(packets.len(), 100);

    for (i, packet) in packets.iter().enumerate() {
        assert_eq!(packet.step(), i as u64);
        assert!(packet.altitude.is_finite());
        assert!(packet.velocity.is_finite());
        assert!(packet.rssi.is_finite());
        assert_eq!(packet.icao24.len(), 6);
    }
}

#[test]
fn test_bus_stream_cancellation_from_another_thread() {
    let token = CancellationToken::new();
    let stream = ArincBusStream::new("ARINC-429-BUS-A", 0.05, Some(3))
        .unwrap()
        .with_cancellation(token.clone());

    let handle = std::thread::spawn(move || {
        let mut stream = stream;
        let mut count = 0u64;
        while let Some(word) = stream.advance() {
            assert!(word.data == GEAR_RETRACTED || word.data == GEAR_EXTENDED);
            count += 1;
            if count == 250 {
                token.cancel();
            }
        }
        (count, stream.emitted())
    });

    let (count, emitted) = handle.join().unwrap();
    assert_eq!(count, 250);
    assert_eq!(emitted, 250);
}

#[test]
fn test_stream_events_report_anomalies_and_stop() {
    let sink = MemorySink::new();
    let stream = ArincBusStream::new("ARINC-429-BUS-A", 1.0, Some(9))
        .unwrap()
        .with_max_steps(3)
        .with_sink(Arc::new(sink.clone()));

    let words: Vec<_> = stream.collect();
    assert_eq!(words.len(), 3);
    assert!(words.iter().all(|w| w.is_anomalous()));

    let records = sink.records();
    assert_eq!(records.len(), 4);
    assert!(records[..3]
        .iter()
        .all(|r| r.level == EventLevel::Critical));
    assert_eq!(
        records[3].event,
        SimEvent::StreamStopped {
            source: ArincBusStream::SOURCE.to_string(),
            emitted: 3,
            cancelled: false,
        }
    );
}

#[test]
fn test_spoofed_packets_are_transient() {
    let mut stream = AdsbStream::new(AdsbProfile::new().unwrap(), 0.5, Some(77))
        .unwrap()
        .with_max_steps(200);

    let mut last_state = stream.state();
    while let Some(packet) = stream.advance() {
        if packet.is_spoofed {
            // 偽装パケットは状態を動かさない
            assert_eq!(stream.state(), last_state);
        } else {
            assert_eq!(stream.state(), (packet.altitude, packet.velocity));
        }
        last_state = stream.state();
    }
    assert_eq!(stream.emitted(), 200);
}

#[test]
fn test_same_seed_same_stream() {
    let collect = || {
        AdsbStream::new(AdsbProfile::new().unwrap(), 0.2, Some(5))
            .unwrap()
            .with_max_steps(50)
            .map(|p| (p.altitude, p.velocity, p.is_spoofed))
            .collect::<Vec<_>>()
    };
    assert_eq!(collect(), collect());
}

/// テスト用のログ出力先
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 異常はシンク経由でのみ通知され、INFO 以上のログには出ない
#[test]
fn test_stream_anomalies_reported_through_sink_only() {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let sink = MemorySink::new();
    tracing::subscriber::with_default(subscriber, || {
        let adsb = AdsbStream::new(AdsbProfile::new().unwrap(), 1.0, Some(1))
            .unwrap()
            .with_max_steps(5)
            .with_sink(Arc::new(sink.clone()));
        let bus = ArincBusStream::new("ARINC-429-BUS-A", 1.0, Some(2))
            .unwrap()
            .with_max_steps(5)
            .with_sink(Arc::new(sink.clone()));
        assert_eq!(adsb.count(), 5);
        assert_eq!(bus.count(), 5);
    });

    let anomalies = sink
        .records()
        .iter()
        .filter(|r| matches!(r.event, SimEvent::StreamAnomaly { .. }))
        .count();
    assert_eq!(anomalies, 10);
    assert!(log.0.lock().unwrap().is_empty());
}
