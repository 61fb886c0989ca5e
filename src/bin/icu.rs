//! ICU CLI - Command-line interface for Synheart ICU
//!
//! Commands:
//! - serve: Run the HTTP/WebSocket monitor
//! - simulate: Generate telemetry samples offline
//! - doctor: Diagnose configuration and advisor availability
//! - schema: Describe the telemetry frame

use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use synheart_icu::{Monitor, MonitorConfig, MonitorError, TelemetrySample};
use synheart_icu::{ICU_VERSION, PRODUCER_NAME};

/// ICU - Simulated ICU monitoring backend
#[derive(Parser)]
#[command(name = "icu")]
#[command(author = "Synheart AI Inc")]
#[command(version = ICU_VERSION)]
#[command(about = "Stream synthetic ICU vital signs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WebSocket monitor
    Serve {
        /// Listen address (overrides ICU_BIND_ADDR)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Milliseconds between telemetry ticks (overrides ICU_TICK_MS)
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Stabilization target in bpm
        #[arg(long)]
        target: Option<i32>,

        /// Gemini API key (overrides GEMINI_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Gemini model name (overrides GEMINI_MODEL)
        #[arg(long)]
        model: Option<String>,
    },

    /// Generate telemetry samples offline
    Simulate {
        /// Number of ticks to generate
        #[arg(short, long, default_value = "10")]
        ticks: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Operating mode to simulate
        #[arg(long, default_value = "normal")]
        mode: SimMode,

        /// Stabilization target in bpm
        #[arg(long, default_value = "75")]
        target: i32,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Diagnose configuration and advisor availability
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe the telemetry frame
    Schema {
        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum SimMode {
    /// Neither flag set
    Normal,
    /// Code blue active
    Alert,
    /// Automated stabilization active
    Stabilizing,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one sample per line)
    Ndjson,
    /// JSON array of samples
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(d) = "synheart_icu=info".parse() {
        filter = filter.add_directive(d);
    }

    // stdout is reserved for command output
    fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn run(cli: Cli) -> Result<(), IcuCliError> {
    match cli.command {
        Commands::Serve {
            bind,
            tick_ms,
            target,
            api_key,
            model,
        } => {
            let mut config = MonitorConfig::from_env()?;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(ms) = tick_ms {
                config.tick_interval = Duration::from_millis(ms);
            }
            if let Some(target) = target {
                config.stabilization_target = target;
            }
            if let Some(key) = api_key {
                config.advisor_api_key = Some(key);
            }
            if let Some(model) = model {
                config.advisor_model = model;
            }
            config.validate()?;
            cmd_serve(config)
        }

        Commands::Simulate {
            ticks,
            seed,
            mode,
            target,
            output_format,
        } => cmd_simulate(ticks, seed, mode, target, output_format),

        Commands::Doctor { json } => cmd_doctor(json),

        Commands::Schema { json_schema } => cmd_schema(json_schema),
    }
}

fn cmd_serve(config: MonitorConfig) -> Result<(), IcuCliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(synheart_icu::run_server(config))?;
    Ok(())
}

fn cmd_simulate(
    ticks: usize,
    seed: Option<u64>,
    mode: SimMode,
    target: i32,
    output_format: OutputFormat,
) -> Result<(), IcuCliError> {
    if ticks == 0 {
        return Err(IcuCliError::NoTicks);
    }

    let config = MonitorConfig {
        stabilization_target: target,
        ..MonitorConfig::default()
    };
    let monitor = Monitor::from_config(config)?;

    match mode {
        SimMode::Normal => {}
        SimMode::Alert => monitor.set_code_blue(),
        SimMode::Stabilizing => monitor.set_stabilize(),
    }

    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut generator = monitor.generator(rng);

    let samples: Vec<TelemetrySample> = (0..ticks).map(|_| monitor.tick(&mut generator)).collect();

    let mut stdout = io::stdout();
    write!(stdout, "{}", format_output(&samples, &output_format)?)?;
    stdout.flush()?;
    Ok(())
}

fn cmd_doctor(json: bool) -> Result<(), IcuCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "icu_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("ICU version {}", ICU_VERSION),
    });

    match MonitorConfig::from_env() {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Tick every {} ms, target {} bpm, history of {}",
                    config.tick_interval.as_millis(),
                    config.stabilization_target,
                    config.history_capacity
                ),
            });

            let bind_check = match std::net::TcpListener::bind(config.bind_addr) {
                Ok(_) => DoctorCheck {
                    name: "bind_addr".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("{} is available", config.bind_addr),
                },
                Err(e) => DoctorCheck {
                    name: "bind_addr".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot bind {}: {}", config.bind_addr, e),
                },
            };
            checks.push(bind_check);

            let advisor_check = if config.advisor_api_key.is_some() {
                DoctorCheck {
                    name: "advisor".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Gemini advisor configured ({})", config.advisor_model),
                }
            } else {
                DoctorCheck {
                    name: "advisor".to_string(),
                    status: CheckStatus::Warning,
                    message: "GEMINI_API_KEY not set, analyses use canned fallbacks".to_string(),
                }
            };
            checks.push(advisor_check);
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            });
        }
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ICU_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("ICU Doctor Report");
        println!("=================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(IcuCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(json_schema: bool) -> Result<(), IcuCliError> {
    if json_schema {
        println!("{}", get_sample_json_schema());
        return Ok(());
    }

    println!("Telemetry frame (one JSON text frame per tick on /ws/vitals)");
    println!();
    println!("- heart_rate: Simulated heart rate in bpm");
    println!("    normal 60-110, code blue 120-140, stabilizing converges on the target");
    println!("- baseline_ghost: Resting reference line (72 bpm)");
    println!("- bp: Blood pressure \"S/D\", systolic 110-130, diastolic 70-90");
    println!("- accuracy: Sensor accuracy 80.5-84.9, one decimal");
    println!("- system_alert: Code blue flag at tick time");
    println!("- intervention_active: Stabilization flag at tick time");
    println!("- neural_heatmap: 8x8 matrix of values 0.1-0.9, two decimals");
    Ok(())
}

// Helper functions

fn format_output(samples: &[TelemetrySample], format: &OutputFormat) -> Result<String, IcuCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for sample in samples {
                lines.push(serde_json::to_string(sample)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(samples)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(samples)?),
    }
}

fn get_sample_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://synheart.ai/schemas/icu.telemetry_sample.v1.json",
        "title": "icu.telemetry_sample.v1",
        "description": "Synheart ICU telemetry frame",
        "type": "object",
        "required": [
            "heart_rate", "baseline_ghost", "bp", "accuracy",
            "system_alert", "intervention_active", "neural_heatmap"
        ],
        "properties": {
            "heart_rate": { "type": "integer" },
            "baseline_ghost": { "type": "integer" },
            "bp": { "type": "string", "pattern": "^[0-9]+/[0-9]+$" },
            "accuracy": { "type": "number", "minimum": 80.5, "maximum": 84.9 },
            "system_alert": { "type": "boolean" },
            "intervention_active": { "type": "boolean" },
            "neural_heatmap": {
                "type": "array",
                "minItems": 8,
                "maxItems": 8,
                "items": {
                    "type": "array",
                    "minItems": 8,
                    "maxItems": 8,
                    "items": { "type": "number", "minimum": 0.1, "maximum": 0.9 }
                }
            }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum IcuCliError {
    Io(io::Error),
    Monitor(MonitorError),
    Json(serde_json::Error),
    NoTicks,
    DoctorFailed,
}

impl From<io::Error> for IcuCliError {
    fn from(e: io::Error) -> Self {
        IcuCliError::Io(e)
    }
}

impl From<MonitorError> for IcuCliError {
    fn from(e: MonitorError) -> Self {
        IcuCliError::Monitor(e)
    }
}

impl From<serde_json::Error> for IcuCliError {
    fn from(e: serde_json::Error) -> Self {
        IcuCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<IcuCliError> for CliError {
    fn from(e: IcuCliError) -> Self {
        match e {
            IcuCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the listen address and permissions".to_string()),
            },
            IcuCliError::Monitor(e) => {
                let hint = match &e {
                    MonitorError::Config(_) => Some("Check ICU_* and GEMINI_* variables".to_string()),
                    _ => None,
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint,
                }
            }
            IcuCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            IcuCliError::NoTicks => CliError {
                code: "NO_TICKS".to_string(),
                message: "Nothing to simulate".to_string(),
                hint: Some("Pass --ticks with a positive count".to_string()),
            },
            IcuCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
