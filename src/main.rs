use aerosec::config::{LogFormat, SimConfig};
use aerosec::events::{SharedSink, TracingSink};
use aerosec::logging::{init_logging, LogConfig};
use aerosec::mission::run_mission;
use aerosec::pipeline::{run_adsb, run_avionics, PipelineKind};
use aerosec::report::{self, EvaluationExport};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "aerosec")]
#[command(version, about = "Synthetic avionics telemetry and unsupervised anomaly detection", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "AEROSEC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Console log format
    #[arg(long, global = true, value_enum)]
    log_format: Option<FormatArg>,

    /// Append structured audit events to this JSONL file
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a labeled dataset, train a detector and print the evaluation
    Simulate {
        /// Pipeline to run
        #[arg(value_enum, default_value_t = Target::All)]
        target: Target,

        /// Number of samples to generate
        #[arg(short, long)]
        samples: Option<usize>,

        /// Fraction of anomalous samples in [0, 1]
        #[arg(short, long)]
        contamination: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Directory for JSON evaluation exports
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Run the real-time mission loop over both telemetry streams
    Mission {
        /// Number of cycles
        #[arg(long)]
        steps: Option<u64>,

        /// Delay between cycles in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Probability of a spoofed ADS-B packet per cycle
        #[arg(long)]
        spoof_prob: Option<f64>,

        /// Probability of a bus injection per cycle
        #[arg(long)]
        injection_prob: Option<f64>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print a sample configuration file
    SampleConfig,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Adsb,
    Avionics,
    All,
}

impl Target {
    fn pipelines(self) -> &'static [PipelineKind] {
        match self {
            Target::Adsb => &[PipelineKind::Adsb],
            Target::Avionics => &[PipelineKind::Avionics],
            Target::All => &[PipelineKind::Adsb, PipelineKind::Avionics],
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Pretty,
    Json,
}

impl From<FormatArg> for LogFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Pretty => LogFormat::Pretty,
            FormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::SampleConfig = cli.command {
        return match SimConfig::sample_toml() {
            Ok(sample) => {
                println!("{}", sample);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let config = match SimConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut log_config = LogConfig::from_settings(&config.logging);
    if let Some(level) = &cli.log_level {
        log_config = log_config.with_level(level.clone());
    }
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format.into());
    }
    if let Some(path) = &cli.audit_log {
        log_config = log_config.with_audit_log(path.clone());
    }

    // ガードはプロセス終了まで保持（監査ログのフラッシュ）
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, mut config: SimConfig) -> Result<()> {
    let sink: SharedSink = Arc::new(TracingSink);

    match command {
        Commands::Simulate {
            target,
            samples,
            contamination,
            seed,
            export,
        } => {
            if let Some(n) = samples {
                config.adsb.n_samples = n;
                config.avionics.n_samples = n;
            }
            if let Some(c) = contamination {
                config.adsb.contamination = c;
                config.avionics.contamination = c;
            }
            if seed.is_some() {
                config.adsb.seed = seed;
                config.avionics.seed = seed;
            }
            config.validate()?;

            for kind in target.pipelines() {
                info!(pipeline = kind.name(), "running simulation");
                let evaluation = match kind {
                    PipelineKind::Adsb => run_adsb(&config.adsb, sink.clone()),
                    PipelineKind::Avionics => run_avionics(&config.avionics, sink.clone()),
                }
                .with_context(|| format!("{} pipeline failed", kind.name()))?;

                println!("{}", report::render(&evaluation));

                if let Some(dir) = &export {
                    let path = dir.join(format!("{}_evaluation.json", evaluation.pipeline));
                    EvaluationExport::from_evaluation(&evaluation)
                        .write_json(&path)
                        .with_context(|| format!("failed to export {}", path.display()))?;
                    println!("Exported {}", path.display());
                }
            }
        }
        Commands::Mission {
            steps,
            delay_ms,
            spoof_prob,
            injection_prob,
            seed,
        } => {
            let stream = &mut config.stream;
            if let Some(steps) = steps {
                stream.steps = steps;
            }
            if let Some(delay) = delay_ms {
                stream.delay_ms = delay;
            }
            if let Some(p) = spoof_prob {
                stream.spoof_probability = p;
            }
            if let Some(p) = injection_prob {
                stream.injection_probability = p;
            }
            if seed.is_some() {
                stream.seed = seed;
            }
            config.validate()?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            println!("{}", "=".repeat(60));
            println!("   AEROSEC FLIGHT MISSION SIMULATION");
            println!("{}", "=".repeat(60));

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let summary = run_mission(&config.stream, cancel, sink, &mut out).await?;
            drop(out);

            println!("{}", "=".repeat(60));
            println!(
                "   MISSION {}: {} cycles, {} ghost aircraft, {} bus injections",
                if summary.cancelled { "ABORTED" } else { "COMPLETE" },
                summary.cycles,
                summary.adsb_alerts,
                summary.bus_alerts
            );
            println!("{}", "=".repeat(60));
        }
        Commands::SampleConfig => {
            println!("{}", SimConfig::sample_toml()?);
        }
    }

    Ok(())
}
