//! Synthetic Generator Integration Tests
//!
//! 一括生成の件数・ラベル・シャッフルを両パイプラインで検証します。

use aerosec::events::{EventLevel, MemorySink, SimEvent};
use aerosec::telemetry::adsb::AdsbProfile;
use aerosec::telemetry::avionics::{AvionicsProfile, GEAR_RETRACTED};
use aerosec::telemetry::{split_counts, SyntheticGenerator, TelemetryProfile};
use aerosec::Error;
use std::sync::Arc;

#[test]
fn test_adsb_counts_at_boundary_contaminations() {
    let mut generator = SyntheticGenerator::new(AdsbProfile::new().unwrap(), Some(42));

    for (contamination, expected) in [(0.0, 0), (1.0, 100), (0.1, 10)] {
        let dataset = generator.generate(100, contamination).unwrap();
        assert_eq!(dataset.len(), 100, "contamination = {}", contamination);
        assert_eq!(dataset.anomaly_count(), expected);
    }
}

#[test]
fn test_avionics_counts_at_boundary_contaminations() {
    let mut generator = SyntheticGenerator::new(AvionicsProfile::new().unwrap(), Some(99));

    for (contamination, expected) in [(0.0, 0), (1.0, 100), (0.1, 10)] {
        let dataset = generator.generate(100, contamination).unwrap();
        assert_eq!(dataset.len(), 100);
        assert_eq!(dataset.anomaly_count(), expected);
    }
}

/// 正常件数の切り捨てで合計が1件少なくなる場合
#[test]
fn test_truncation_may_drop_one_record() {
    // 0.7 * 10 = 7.000000000000001, 0.3 * 10 = 3.0000000000000004
    let (n_normal, n_anomalous) = split_counts(10, 0.3);
    assert_eq!(n_anomalous, 3);
    assert!(n_normal + n_anomalous == 10 || n_normal + n_anomalous == 9);

    let mut generator = SyntheticGenerator::new(AdsbProfile::new().unwrap(), Some(1));
    for n in [3usize, 7, 10, 33, 101] {
        for c in [0.05, 0.3, 0.45, 0.9] {
            let dataset = generator.generate(n, c).unwrap();
            let expected_anomalies = (n as f64 * c).floor() as usize;
            assert_eq!(dataset.anomaly_count(), expected_anomalies);
            assert!(dataset.len() == n || dataset.len() + 1 == n);
        }
    }
}

/// シナリオB: コンタミネーション 0 のバスデータ
#[test]
fn test_bus_traffic_without_contamination() {
    let mut generator = SyntheticGenerator::new(AvionicsProfile::new().unwrap(), Some(99));
    let dataset = generator.generate(500, 0.0).unwrap();

    assert_eq!(dataset.anomaly_count(), 0);
    let gear = dataset.column("gear_status").unwrap();
    assert_eq!(gear.len(), 500);
    assert!(gear.iter().all(|g| *g == GEAR_RETRACTED));
}

#[test]
fn test_same_seed_same_dataset() {
    let mut a = SyntheticGenerator::new(AdsbProfile::new().unwrap(), Some(7));
    let mut b = SyntheticGenerator::new(AdsbProfile::new().unwrap(), Some(7));

    let first = a.generate(200, 0.1).unwrap();
    let second = b.generate(200, 0.1).unwrap();
    assert_eq!(first.records(), second.records());
}

#[test]
fn test_invalid_parameters_fail_before_generation() {
    let sink = MemorySink::new();
    let mut generator =
        SyntheticGenerator::new(AdsbProfile::new().unwrap(), Some(1)).with_sink(Arc::new(sink.clone()));

    assert!(matches!(
        generator.generate(0, 0.1),
        Err(Error::InvalidParameter { name: "n_samples", .. })
    ));
    assert!(matches!(
        generator.generate(100, 1.5),
        Err(Error::InvalidParameter {
            name: "contamination",
            ..
        })
    ));
    assert!(generator.generate(100, f64::NAN).is_err());
    assert!(sink.is_empty());
}

#[test]
fn test_dataset_generated_event() {
    let sink = MemorySink::new();
    let mut generator =
        SyntheticGenerator::new(AvionicsProfile::new().unwrap(), Some(3)).with_sink(Arc::new(sink.clone()));
    generator.generate(40, 0.25).unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, EventLevel::Info);
    assert_eq!(
        records[0].event,
        SimEvent::DatasetGenerated {
            pipeline: AvionicsProfile::NAME.to_string(),
            total: 40,
            anomalies: 10,
        }
    );
}
