//! ADS-B telemetry
//!
//! 正常な航跡（小さな高度・速度変化、強い受信信号）と、偽装された
//! 「ゴースト航空機」（物理的にあり得ないジャンプ、弱い信号）を生成する。

use super::stream::{StreamControl, StreamItem};
use super::{FeatureDistribution, FeatureNames, FeatureSampler, TelemetryProfile, FEATURE_COUNT};
use crate::config::check_fraction;
use crate::error::Result;
use crate::events::SharedSink;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 巡航開始時の高度 (ft)
pub const CRUISE_ALTITUDE_FT: f64 = 32_000.0;
/// 巡航開始時の速度 (kt)
pub const CRUISE_VELOCITY_KT: f64 = 480.0;

/// ADS-B 特徴量プロファイル
#[derive(Debug, Clone)]
pub struct AdsbProfile {
    normal: FeatureDistribution,
    spoofed: FeatureDistribution,
}

impl AdsbProfile {
    /// 代表的なパラメータで作成
    ///
    /// - 正常: altitude_delta N(0, 50), velocity_delta N(0, 10), rssi N(-50, 5)
    /// - 偽装: altitude_delta N(0, 2000), velocity_delta N(0, 500), rssi N(-90, 10)
    pub fn new() -> Result<Self> {
        Ok(Self {
            normal: FeatureDistribution::new([
                FeatureSampler::gaussian(0.0, 50.0)?,
                FeatureSampler::gaussian(0.0, 10.0)?,
                FeatureSampler::gaussian(-50.0, 5.0)?,
            ]),
            spoofed: FeatureDistribution::new([
                FeatureSampler::gaussian(0.0, 2000.0)?,
                FeatureSampler::gaussian(0.0, 500.0)?,
                FeatureSampler::gaussian(-90.0, 10.0)?,
            ]),
        })
    }

    /// 任意の分布で作成
    pub fn with_distributions(normal: FeatureDistribution, spoofed: FeatureDistribution) -> Self {
        Self { normal, spoofed }
    }
}

impl TelemetryProfile for AdsbProfile {
    const NAME: &'static str = "adsb";
    const FEATURE_NAMES: FeatureNames = ["altitude_delta", "velocity_delta", "rssi"];

    fn sample_normal<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; FEATURE_COUNT] {
        self.normal.sample(rng)
    }

    fn sample_anomalous<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; FEATURE_COUNT] {
        self.spoofed.sample(rng)
    }
}

/// ADS-B パケット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsbPacket {
    /// ストリーム内のステップ番号（0始まり）
    pub step: u64,
    /// ICAO 24bit アドレス
    pub icao24: String,
    pub callsign: String,
    /// 報告高度 (ft)
    pub altitude: f64,
    /// 報告速度 (kt)
    pub velocity: f64,
    /// 受信信号強度 (dBm)
    pub rssi: f64,
    pub timestamp: DateTime<Utc>,
    /// 偽装パケットかどうか
    pub is_spoofed: bool,
}

impl StreamItem for AdsbPacket {
    fn step(&self) -> u64 {
        self.step
    }

    fn is_anomalous(&self) -> bool {
        self.is_spoofed
    }
}

/// ADS-B ストリーム
///
/// 正常ステップは高度・速度にランダムな増分を積み上げる（ランダムウォーク）。
/// 偽装ステップは現在状態からの一時的なジャンプで、状態は更新しない。
pub struct AdsbStream {
    profile: AdsbProfile,
    rng: StdRng,
    spoof_probability: f64,
    altitude: f64,
    velocity: f64,
    icao24: String,
    callsign: String,
    control: StreamControl,
}

impl AdsbStream {
    pub const SOURCE: &'static str = "adsb-stream";

    pub fn new(profile: AdsbProfile, spoof_probability: f64, seed: Option<u64>) -> Result<Self> {
        check_fraction("spoof_probability", spoof_probability)?;

        Ok(Self {
            profile,
            rng: super::seeded_rng(seed),
            spoof_probability,
            altitude: CRUISE_ALTITUDE_FT,
            velocity: CRUISE_VELOCITY_KT,
            icao24: "E48C01".to_string(),
            callsign: "FAB2026".to_string(),
            control: StreamControl::new(Self::SOURCE),
        })
    }

    /// 最大ステップ数を設定
    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.control = self.control.with_max_steps(steps);
        self
    }

    /// キャンセルトークンを設定
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.control = self.control.with_cancellation(token);
        self
    }

    /// イベントシンクを注入
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.control = self.control.with_sink(sink);
        self
    }

    pub fn with_identity(mut self, icao24: impl Into<String>, callsign: impl Into<String>) -> Self {
        self.icao24 = icao24.into();
        self.callsign = callsign.into();
        self
    }

    /// 1ステップ進める
    pub fn advance(&mut self) -> Option<AdsbPacket> {
        self.next()
    }

    /// 現在の（正常）物理状態 (高度, 速度)
    pub fn state(&self) -> (f64, f64) {
        (self.altitude, self.velocity)
    }

    pub fn emitted(&self) -> u64 {
        self.control.emitted()
    }

    /// ストリームを終了し、`StreamStopped` を1回だけ発行する
    pub fn stop(&mut self, cancelled: bool) {
        self.control.stop(cancelled);
    }
}

impl Iterator for AdsbStream {
    type Item = AdsbPacket;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self.control.begin_step()?;
        let is_spoofed = self.rng.gen_bool(self.spoof_probability);

        let (altitude, velocity, rssi) = if is_spoofed {
            let [alt_delta, vel_delta, rssi] = self.profile.sample_anomalous(&mut self.rng);
            debug!(step, alt_delta, "spoofed ADS-B packet generated");
            (self.altitude + alt_delta, self.velocity + vel_delta, rssi)
        } else {
            let [alt_delta, vel_delta, rssi] = self.profile.sample_normal(&mut self.rng);
            self.altitude += alt_delta;
            self.velocity += vel_delta;
            (self.altitude, self.velocity, rssi)
        };

        let packet = AdsbPacket {
            step,
            icao24: self.icao24.clone(),
            callsign: self.callsign.clone(),
            altitude,
            velocity,
            rssi,
            timestamp: Utc::now(),
            is_spoofed,
        };

        self.control.complete(step, is_spoofed);
        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::SyntheticGenerator;

    #[test]
    fn test_adsb_generation_counts() {
        let mut generator = SyntheticGenerator::new(AdsbProfile::new().unwrap(), Some(42));
        let dataset = generator.generate(100, 0.1).unwrap();

        assert_eq!(dataset.len(), 100);
        assert_eq!(dataset.anomaly_count(), 10);
        assert_eq!(dataset.feature_names(), &AdsbProfile::FEATURE_NAMES);
    }

    #[test]
    fn test_spoofed_records_have_weaker_signal() {
        let mut generator = SyntheticGenerator::new(AdsbProfile::new().unwrap(), Some(3));
        let dataset = generator.generate(1000, 0.5).unwrap();

        let mean_rssi = |anomalous: bool| {
            let values: Vec<f64> = dataset
                .records()
                .iter()
                .filter(|r| r.is_anomalous == anomalous)
                .map(|r| r.features[2])
                .collect();
            values.iter().sum::<f64>() / values.len() as f64
        };

        assert!(mean_rssi(false) > -55.0);
        assert!(mean_rssi(true) < -80.0);
    }

    #[test]
    fn test_stream_without_spoofing_is_random_walk() {
        let mut stream = AdsbStream::new(AdsbProfile::new().unwrap(), 0.0, Some(11))
            .unwrap()
            .with_max_steps(20);

        let mut previous = (CRUISE_ALTITUDE_FT, CRUISE_VELOCITY_KT);
        for packet in stream.by_ref() {
            assert!(!packet.is_spoofed);
            // 報告値 = 現在の状態
            assert_ne!((packet.altitude, packet.velocity), previous);
            previous = (packet.altitude, packet.velocity);
        }
        assert_eq!(stream.state(), previous);
        assert_eq!(stream.emitted(), 20);
    }

    #[test]
    fn test_spoofed_packets_do_not_move_state() {
        let mut stream = AdsbStream::new(AdsbProfile::new().unwrap(), 1.0, Some(5))
            .unwrap()
            .with_max_steps(10);

        for packet in stream.by_ref() {
            assert!(packet.is_spoofed);
        }
        assert_eq!(stream.state(), (CRUISE_ALTITUDE_FT, CRUISE_VELOCITY_KT));
    }

    #[test]
    fn test_stream_rejects_invalid_probability() {
        assert!(AdsbStream::new(AdsbProfile::new().unwrap(), 1.5, None).is_err());
    }
}
