//! Simulation configuration
//!
//! デフォルト値 → TOML設定ファイル → 環境変数 (AEROSEC__*) の順で上書きされる。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 設定ファイルの探索パス（明示指定がない場合）
const CONFIG_SEARCH_PATHS: &[&str] = &["aerosec.toml", "config/aerosec.toml"];

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SimConfig {
    pub adsb: AdsbSettings,
    pub avionics: AvionicsSettings,
    pub stream: StreamSettings,
    pub logging: LoggingSettings,
}

/// ADS-B パイプライン設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AdsbSettings {
    /// 生成するメッセージ数
    pub n_samples: usize,
    /// 偽装メッセージの割合 [0, 1]
    pub contamination: f64,
    /// 乱数シード（None の場合はエントロピーから生成）
    pub seed: Option<u64>,
    pub detector: IsolationForestSettings,
}

impl Default for AdsbSettings {
    fn default() -> Self {
        Self {
            n_samples: 1000,
            contamination: 0.1,
            seed: Some(42),
            detector: IsolationForestSettings::default(),
        }
    }
}

/// Isolation Forest ハイパーパラメータ
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IsolationForestSettings {
    /// ツリー数
    pub n_estimators: usize,
    /// 各ツリーのサブサンプルサイズ上限
    pub max_samples: usize,
    /// 判定しきい値を決める学習データの外れ値割合 (0, 0.5]
    pub contamination: f64,
}

impl Default for IsolationForestSettings {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
        }
    }
}

/// ARINC 429 バスパイプライン設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AvionicsSettings {
    pub n_samples: usize,
    pub contamination: f64,
    pub seed: Option<u64>,
    pub detector: OneClassSvmSettings,
}

impl Default for AvionicsSettings {
    fn default() -> Self {
        Self {
            n_samples: 1000,
            contamination: 0.05,
            seed: Some(99),
            detector: OneClassSvmSettings::default(),
        }
    }
}

/// One-Class SVM ハイパーパラメータ
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OneClassSvmSettings {
    /// 学習データの外れ値割合の上限 / サポートベクター割合の下限 (0, 1]
    pub nu: f64,
    /// RBFカーネル係数
    pub gamma: f64,
    /// SMO 停止許容誤差
    pub tol: f64,
    /// SMO 最大反復回数
    pub max_iter: usize,
}

impl Default for OneClassSvmSettings {
    fn default() -> Self {
        Self {
            nu: 0.05,
            gamma: 0.1,
            tol: 1e-3,
            max_iter: 1_000_000,
        }
    }
}

/// ストリーミング（ミッションループ）設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StreamSettings {
    /// サイクル数
    pub steps: u64,
    /// 表示用の人工的な遅延（ミリ秒）
    pub delay_ms: u64,
    /// ADS-B 偽装パケット注入確率
    pub spoof_probability: f64,
    /// ARINC 429 不正ワード注入確率
    pub injection_probability: f64,
    pub seed: Option<u64>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            steps: 50,
            delay_ms: 100,
            spoof_probability: 0.1,
            injection_probability: 0.05,
            seed: None,
        }
    }
}

/// ログ出力形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 人間向けコンソール出力
    #[default]
    Pretty,
    /// 1行1レコードのJSON
    Json,
}

/// ログ設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// ログレベル (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
    /// 監査ログ（JSONL）の出力先
    pub audit_log: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            audit_log: None,
        }
    }
}

impl SimConfig {
    /// 設定ファイルから読み込み、環境変数で上書き
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        // デフォルト値を設定
        settings = settings.add_source(config::Config::try_from(&SimConfig::default())?);

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                settings = settings.add_source(config::File::from(path));
            }
            None => {
                if let Some(found) = CONFIG_SEARCH_PATHS
                    .iter()
                    .map(Path::new)
                    .find(|p| p.exists())
                {
                    tracing::debug!(path = %found.display(), "loading config file");
                    settings = settings.add_source(config::File::from(found));
                }
            }
        }

        // 環境変数で上書き (例: AEROSEC__ADSB__N_SAMPLES=2000)
        settings = settings.add_source(
            config::Environment::with_prefix("AEROSEC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: SimConfig = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 全パラメータを検証（生成・学習の前に失敗させる）
    pub fn validate(&self) -> Result<()> {
        check_sample_count("adsb.n_samples", self.adsb.n_samples)?;
        check_fraction("adsb.contamination", self.adsb.contamination)?;
        check_nonzero("adsb.detector.n_estimators", self.adsb.detector.n_estimators)?;
        check_nonzero("adsb.detector.max_samples", self.adsb.detector.max_samples)?;
        check_detector_contamination(
            "adsb.detector.contamination",
            self.adsb.detector.contamination,
        )?;

        check_sample_count("avionics.n_samples", self.avionics.n_samples)?;
        check_fraction("avionics.contamination", self.avionics.contamination)?;
        check_nu("avionics.detector.nu", self.avionics.detector.nu)?;
        check_positive("avionics.detector.gamma", self.avionics.detector.gamma)?;
        check_positive("avionics.detector.tol", self.avionics.detector.tol)?;
        check_nonzero("avionics.detector.max_iter", self.avionics.detector.max_iter)?;

        check_fraction("stream.spoof_probability", self.stream.spoof_probability)?;
        check_fraction(
            "stream.injection_probability",
            self.stream.injection_probability,
        )?;

        Ok(())
    }

    /// サンプル設定ファイルを生成
    pub fn sample_toml() -> Result<String> {
        let body = toml::to_string_pretty(&SimConfig::default())
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(format!(
            r#"# aerosec configuration
#
# aerosec.toml または config/aerosec.toml として保存してください
# 環境変数での上書きも可能です (例: AEROSEC__ADSB__N_SAMPLES=2000)
#
# [adsb]      ADS-B 偽装検知 (標準化 + Isolation Forest)
# [avionics]  ARINC 429 バス異常検知 (Min-Max 正規化 + One-Class SVM)
# [stream]    ミッションループ用ストリーム設定

{}"#,
            body
        ))
    }
}

/// サンプル数 > 0
pub fn check_sample_count(name: &'static str, n: usize) -> Result<()> {
    if n == 0 {
        return Err(Error::invalid(name, "must be a positive integer, got 0"));
    }
    Ok(())
}

/// 割合・確率が [0, 1] に収まること
pub fn check_fraction(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(Error::invalid(
            name,
            format!("must be within [0, 1], got {}", value),
        ));
    }
    Ok(())
}

/// 検知器のコンタミネーションは (0, 0.5]
pub fn check_detector_contamination(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > 0.5 {
        return Err(Error::invalid(
            name,
            format!("must be within (0, 0.5], got {}", value),
        ));
    }
    Ok(())
}

/// nu は (0, 1]
pub fn check_nu(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        return Err(Error::invalid(
            name,
            format!("must be within (0, 1], got {}", value),
        ));
    }
    Ok(())
}

pub fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::invalid(
            name,
            format!("must be a positive number, got {}", value),
        ));
    }
    Ok(())
}

pub fn check_nonzero(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(Error::invalid(name, "must be greater than 0"));
    }
    Ok(())
}
