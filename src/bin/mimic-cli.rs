//! Mimic CLI - Command-line interface for the Mimic engine
//!
//! Provides subcommands for checking, dumping and dry-running scripts,
//! and for writing a default engine configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimic::capability::{Capabilities, DryRunInput, PresetText, PresetVision};
use mimic::config::{EngineConfig, Repeat};
use mimic::engine::{RunReport, Session, run_realtime, run_session};
use mimic::script::load_script;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mimic")]
#[command(about = "Interpreter and scheduler for input-automation replay scripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a script and summarise its structure
    Check {
        /// Script file
        script: PathBuf,
    },

    /// Print the loaded program as JSON
    Dump {
        /// Script file
        script: PathBuf,
    },

    /// Dry-run a script: every action is logged instead of performed
    Run {
        /// Script file
        script: PathBuf,

        /// Engine configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Playback speed multiplier
        #[arg(long)]
        speed: Option<f64>,

        /// Number of rounds (0 repeats forever)
        #[arg(long)]
        repeat: Option<u32>,

        /// Pause between rounds in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// End the run after this many milliseconds
        #[arg(long)]
        time_limit_ms: Option<u64>,

        /// Image names reported as visible on screen
        #[arg(long, value_delimiter = ',')]
        present: Vec<String>,

        /// Strings reported as visible to text recognition
        #[arg(long, value_delimiter = ',')]
        text: Vec<String>,

        /// Use the virtual clock instead of waiting out delays
        #[arg(long = "virtual")]
        virtual_clock: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the default engine configuration
    Config {
        /// Output file
        #[arg(default_value = "mimic.json")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { script } => {
            let program = load_script(&script)?;
            println!("Program: {}", program.name);
            println!("Fingerprint: {}", program.fingerprint);
            println!("Instructions: {}", program.len());
            println!("Labels: {}", program.labels.len());
            for label in &program.labels {
                let quota = label
                    .quota
                    .map(|quota| quota.to_string())
                    .unwrap_or_else(|| "unlimited".to_string());
                println!("  #{} (line {}, {}, quota {})", label.name, label.line, label.scope, quota);
            }
            println!("Parallel blocks: {}", program.parallels.len());
            for block in &program.parallels {
                let names: Vec<_> = block.threads.iter().map(|thread| thread.name.as_str()).collect();
                println!("  line {}: {}", block.line, names.join(", "));
            }
            println!("Triggers: {}", program.triggers.len());
            for trigger in &program.triggers {
                println!("  line {}: {}", trigger.line, trigger.kind.label());
            }
            println!("State machines: {}", program.machines.len());
            for machine in &program.machines {
                let names: Vec<_> = machine.states.iter().map(|state| state.name.as_str()).collect();
                println!("  {} (line {}): {}", machine.name, machine.line, names.join(", "));
            }
        }

        Commands::Dump { script } => {
            let program = load_script(&script)?;
            let json = serde_json::to_string_pretty(&program).context("Failed to serialize program")?;
            println!("{}", json);
        }

        Commands::Run {
            script,
            config,
            speed,
            repeat,
            interval_ms,
            time_limit_ms,
            present,
            text,
            virtual_clock,
            json,
        } => {
            let program = load_script(&script)?;
            let mut config = match config {
                Some(path) => EngineConfig::load(&path)?,
                None => EngineConfig::default(),
            };
            if let Some(speed) = speed {
                config.playback.speed = speed;
            }
            if let Some(repeat) = repeat {
                config.playback.repeat = match repeat {
                    0 => Repeat::Forever,
                    n => Repeat::Times(n),
                };
            }
            if let Some(interval) = interval_ms {
                config.playback.repeat_interval_ms = interval;
            }
            if time_limit_ms.is_some() {
                config.playback.time_limit_ms = time_limit_ms;
            }

            let caps = Capabilities::new(DryRunInput::echoing())
                .with_vision(PresetVision::with_images(present))
                .with_text(PresetText::with_texts(text));
            let session = Session::new(program, caps, config).context("Invalid playback options")?;

            let control = session.control();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, stopping");
                    control.stop();
                }
            });

            let report = if virtual_clock {
                tokio::task::spawn_blocking(move || run_session(session))
                    .await
                    .context("Run task failed")?
            } else {
                run_realtime(session).await
            };
            print_report(&report, json)?;
        }

        Commands::Config { path } => {
            EngineConfig::default().write(&path)?;
            println!("Wrote default configuration to {:?}", path);
        }
    }

    Ok(())
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        println!("{}", json);
        return Ok(());
    }

    println!("Session: {}", report.session);
    println!("Status: {:?}", report.status);
    println!("Elapsed: {} ms", report.elapsed_ms);
    println!("Rounds: {}", report.rounds);
    println!("Instructions executed: {}", report.instructions_executed);
    if report.drift_warnings > 0 {
        println!("Drift warnings: {}", report.drift_warnings);
    }
    if report.is_degraded() {
        println!("Faults:");
        for fault in &report.faults {
            println!("  {} line {} at {} ms: {}", fault.origin, fault.line, fault.at_ms, fault.reason);
        }
    }
    Ok(())
}
