//! ログシステム
//!
//! コンソール出力（pretty / json）と、監査用のJSONLファイル出力を構成する。

use crate::config::{LogFormat, LoggingSettings};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error)
    pub level: String,
    /// コンソール出力形式
    pub format: LogFormat,
    /// コンソール出力有効
    pub console_enabled: bool,
    /// 監査ログファイル（JSONL）
    pub audit_log: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            console_enabled: true,
            audit_log: None,
        }
    }
}

impl LogConfig {
    /// 設定からログ設定を作成
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            format: settings.format,
            console_enabled: true,
            audit_log: settings.audit_log.clone(),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// コンソール出力制御
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    /// 監査ログ出力先を設定
    pub fn with_audit_log<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.audit_log = Some(path.into());
        self
    }

    /// RUST_LOG が設定されていればそれを優先
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// ログシステム初期化後に保持するハンドル
///
/// ドロップすると監査ログのバッファがフラッシュされる。
#[derive(Debug, Default)]
pub struct LogGuard {
    _audit: Option<WorkerGuard>,
}

/// ログシステムを初期化
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let console = if config.console_enabled {
        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .boxed(),
        };
        Some(layer)
    } else {
        None
    };

    let (audit, guard) = match &config.audit_log {
        Some(path) => {
            let (dir, file_name) = split_audit_path(path)?;
            ensure_log_dir(&dir)?;

            let (writer, guard) = non_blocking(rolling::never(&dir, file_name));
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_current_span(false)
                .with_span_list(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(console)
        .with(audit)
        .try_init()
        .context("tracing subscriber already initialized")?;

    tracing::debug!(
        level = %config.level,
        audit_log = ?config.audit_log,
        "logging initialized"
    );

    Ok(LogGuard { _audit: guard })
}

/// 監査ログのパスをディレクトリとファイル名に分割
fn split_audit_path(path: &Path) -> Result<(PathBuf, String)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("invalid audit log path: {}", path.display()))?
        .to_string();

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((dir, file_name))
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log dir {}", dir.display()))?;
    }
    Ok(())
}
