//! Mission loop
//!
//! ADS-B ストリームと ARINC 429 バスストリームを同期して進め、
//! サイクルごとに1行のステータスを出力する。遅延は表示用のみ。

use crate::config::StreamSettings;
use crate::error::Result;
use crate::events::SharedSink;
use crate::telemetry::adsb::{AdsbProfile, AdsbStream};
use crate::telemetry::avionics::ArincBusStream;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 監視対象バス
pub const BUS_NAME: &str = "ARINC-429-BUS-A";
/// ADS-B 受信局
pub const SENSOR_ID: &str = "RADAR-SBGR-01";

const STATUS_OK: &str = "[OK]";
const STATUS_GHOST_AIRCRAFT: &str = "[ALERT: GHOST AIRCRAFT]";
const STATUS_UNCOMMANDED_ACTUATION: &str = "[ALERT: UNCOMMANDED ACTUATION]";

/// ミッション結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionSummary {
    /// 完了したサイクル数
    pub cycles: u64,
    /// 偽装 ADS-B パケット数
    pub adsb_alerts: u64,
    /// バス不正注入数
    pub bus_alerts: u64,
    /// 途中でキャンセルされたか
    pub cancelled: bool,
}

/// ミッションループを実行
///
/// キャンセルはサイクル境界と待機中に確認し、出力途中の行は残さない。
/// 終了時には両ストリームがそれぞれ `StreamStopped` を1回発行する。
pub async fn run_mission<W: Write>(
    settings: &StreamSettings,
    cancel: CancellationToken,
    sink: SharedSink,
    out: &mut W,
) -> Result<MissionSummary> {
    let mut adsb = AdsbStream::new(AdsbProfile::new()?, settings.spoof_probability, settings.seed)?
        .with_max_steps(settings.steps)
        .with_sink(sink.clone());
    let mut bus = ArincBusStream::new(
        BUS_NAME,
        settings.injection_probability,
        settings.seed.map(|s| s.wrapping_add(1)),
    )?
    .with_max_steps(settings.steps)
    .with_sink(sink);

    info!(
        sensor = SENSOR_ID,
        bus = bus.bus_name(),
        steps = settings.steps,
        "Main engines start. Telemetry stream active."
    );

    let delay = Duration::from_millis(settings.delay_ms);
    let mut summary = MissionSummary::default();

    // キャンセルはサイクル先頭でのみ確認し、両ストリームを同じだけ進める
    loop {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let (Some(packet), Some(word)) = (adsb.advance(), bus.advance()) else {
            break;
        };

        summary.cycles += 1;
        if packet.is_spoofed {
            summary.adsb_alerts += 1;
        }
        if word.is_injection {
            summary.bus_alerts += 1;
        }

        // 同一サイクルではバス注入を優先表示
        let status = if word.is_injection {
            STATUS_UNCOMMANDED_ACTUATION
        } else if packet.is_spoofed {
            STATUS_GHOST_AIRCRAFT
        } else {
            STATUS_OK
        };

        writeln!(
            out,
            "Cycle {:03} | Alt: {:.1} ft | Vel: {:.1} kts | {}",
            summary.cycles, packet.altitude, packet.velocity, status
        )?;
        out.flush()?;

        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    adsb.stop(summary.cancelled);
    bus.stop(summary.cancelled);

    if summary.cancelled {
        warn!(cycles = summary.cycles, "Mission aborted by operator");
    } else {
        info!(
            cycles = summary.cycles,
            adsb_alerts = summary.adsb_alerts,
            bus_alerts = summary.bus_alerts,
            "Mission complete"
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;

    fn settings(steps: u64) -> StreamSettings {
        StreamSettings {
            steps,
            delay_ms: 0,
            spoof_probability: 0.0,
            injection_probability: 0.0,
            seed: Some(7),
        }
    }

    #[tokio::test]
    async fn test_mission_writes_one_line_per_cycle() {
        let mut out = Vec::new();
        let summary = run_mission(&settings(5), CancellationToken::new(), events::noop(), &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(summary.cycles, 5);
        assert!(!summary.cancelled);
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().all(|l| l.ends_with("[OK]")));
        assert!(text.starts_with("Cycle 001 | Alt: "));
    }

    #[tokio::test]
    async fn test_pre_cancelled_mission_emits_nothing() {
        let token = CancellationToken::new();
        token.cancel();

        let mut out = Vec::new();
        let summary = run_mission(&settings(10), token, events::noop(), &mut out)
            .await
            .unwrap();

        assert_eq!(summary.cycles, 0);
        assert!(summary.cancelled);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_bus_injection_takes_precedence() {
        let mut config = settings(3);
        config.spoof_probability = 1.0;
        config.injection_probability = 1.0;

        let mut out = Vec::new();
        let summary = run_mission(&config, CancellationToken::new(), events::noop(), &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(summary.adsb_alerts, 3);
        assert_eq!(summary.bus_alerts, 3);
        assert!(text.lines().all(|l| l.ends_with(STATUS_UNCOMMANDED_ACTUATION)));
    }
}
