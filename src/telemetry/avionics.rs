//! ARINC 429 avionics bus telemetry
//!
//! 巡航中（Mach 0.78 前後）の対気速度・高度と脚位置ディスクリートを模擬する。
//! 不正注入は「巡航速度のまま脚下げ」という文脈上危険な状態として表現する。
//! ワードのビットレベル符号化は行わず、値はすべて浮動小数点で保持する。

use super::stream::{StreamControl, StreamItem};
use super::{FeatureDistribution, FeatureNames, FeatureSampler, TelemetryProfile, FEATURE_COUNT};
use crate::config::check_fraction;
use crate::error::Result;
use crate::events::SharedSink;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 脚位置: UP & LOCKED
pub const GEAR_RETRACTED: f64 = 0.0;
/// 脚位置: DOWN
pub const GEAR_EXTENDED: f64 = 1.0;

/// ラベル 270（8進）: 脚位置ディスクリート
pub const LABEL_GEAR_DISCRETE: u16 = 0o270;
/// SSM: Normal Operation
pub const SSM_NORMAL_OPERATION: u8 = 0b11;

/// ARINC 429 バス特徴量プロファイル
#[derive(Debug, Clone)]
pub struct AvionicsProfile {
    nominal: FeatureDistribution,
    injected: FeatureDistribution,
}

impl AvionicsProfile {
    /// 代表的なパラメータで作成
    ///
    /// - 正常: airspeed N(480, 10) KTAS, altitude N(32000, 500) ft, gear_status = 0
    /// - 注入: 同じ運動状態のまま gear_status = 1
    pub fn new() -> Result<Self> {
        let airspeed = FeatureSampler::gaussian(480.0, 10.0)?;
        let altitude = FeatureSampler::gaussian(32_000.0, 500.0)?;

        Ok(Self {
            nominal: FeatureDistribution::new([
                airspeed.clone(),
                altitude.clone(),
                FeatureSampler::constant(GEAR_RETRACTED),
            ]),
            injected: FeatureDistribution::new([
                airspeed,
                altitude,
                FeatureSampler::constant(GEAR_EXTENDED),
            ]),
        })
    }

    pub fn with_distributions(nominal: FeatureDistribution, injected: FeatureDistribution) -> Self {
        Self { nominal, injected }
    }
}

impl TelemetryProfile for AvionicsProfile {
    const NAME: &'static str = "avionics";
    const FEATURE_NAMES: FeatureNames = ["airspeed", "altitude", "gear_status"];

    fn sample_normal<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; FEATURE_COUNT] {
        self.nominal.sample(rng)
    }

    fn sample_anomalous<R: Rng + ?Sized>(&self, rng: &mut R) -> [f64; FEATURE_COUNT] {
        self.injected.sample(rng)
    }
}

/// ARINC 429 ワード（フィールドは平文の数値）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArincWord {
    pub step: u64,
    /// 8bit ラベル
    pub label: u16,
    /// Source/Destination Identifier
    pub sdi: u8,
    /// ペイロード（脚位置ディスクリート）
    pub data: f64,
    /// Sign/Status Matrix
    pub ssm: u8,
    /// 奇数パリティビット
    pub parity: u8,
    /// 同一サイクルの対気速度 (KTAS)
    pub airspeed: f64,
    /// 同一サイクルの高度 (ft)
    pub altitude: f64,
    /// 不正注入かどうか
    pub is_injection: bool,
}

impl StreamItem for ArincWord {
    fn step(&self) -> u64 {
        self.step
    }

    fn is_anomalous(&self) -> bool {
        self.is_injection
    }
}

/// ARINC 429 バストラフィックストリーム
///
/// 対気速度・高度は巡航値まわりの小さな揺らぎ。注入は各サイクル独立に発生する。
pub struct ArincBusStream {
    bus_name: String,
    rng: StdRng,
    injection_probability: f64,
    airspeed_jitter: FeatureSampler,
    altitude_jitter: FeatureSampler,
    control: StreamControl,
}

impl ArincBusStream {
    pub const SOURCE: &'static str = "arinc429-bus";

    pub fn new(
        bus_name: impl Into<String>,
        injection_probability: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        check_fraction("injection_probability", injection_probability)?;

        Ok(Self {
            bus_name: bus_name.into(),
            rng: super::seeded_rng(seed),
            injection_probability,
            airspeed_jitter: FeatureSampler::gaussian(480.0, 2.0)?,
            altitude_jitter: FeatureSampler::gaussian(32_000.0, 20.0)?,
            control: StreamControl::new(Self::SOURCE),
        })
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.control = self.control.with_max_steps(steps);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.control = self.control.with_cancellation(token);
        self
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.control = self.control.with_sink(sink);
        self
    }

    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    /// 1サイクル進める
    pub fn advance(&mut self) -> Option<ArincWord> {
        self.next()
    }

    pub fn emitted(&self) -> u64 {
        self.control.emitted()
    }

    /// ストリームを終了し、`StreamStopped` を1回だけ発行する
    pub fn stop(&mut self, cancelled: bool) {
        self.control.stop(cancelled);
    }
}

impl Iterator for ArincBusStream {
    type Item = ArincWord;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self.control.begin_step()?;
        let is_injection = self.rng.gen_bool(self.injection_probability);

        let airspeed = self.airspeed_jitter.sample(&mut self.rng);
        let altitude = self.altitude_jitter.sample(&mut self.rng);

        if is_injection {
            debug!(
                bus = %self.bus_name,
                cycle = step,
                "gear-down injection generated"
            );
        }

        let word = ArincWord {
            step,
            label: LABEL_GEAR_DISCRETE,
            sdi: 0,
            data: if is_injection {
                GEAR_EXTENDED
            } else {
                GEAR_RETRACTED
            },
            // 注入ワードも形式上は正常に見える
            ssm: SSM_NORMAL_OPERATION,
            parity: 1,
            airspeed,
            altitude,
            is_injection,
        };

        self.control.complete(step, is_injection);
        Some(word)
    }
}
