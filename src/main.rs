mod app;
mod ui;

use anyhow::{Context, Result};
use app::{poll_event, App, AppAction};
use chrono::{DateTime, Utc};
use clap::Parser;
use crossterm::event::Event;
use netprobe::logging::{init_logging, LogTarget};
use netprobe::{MeasurementResult, ProbeEvent, Prober, Settings, TestPhase};
use ratatui::DefaultTerminal;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use ui::draw_ui;

#[derive(Debug, Parser)]
#[command(version, about = "Measure latency, download and upload throughput")]
struct Cli {
    /// TOML file with settings overrides
    #[arg(short, long, env = "NETPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Run once and print a one-line summary
    #[arg(long, conflicts_with = "json")]
    plain: bool,

    /// Run once and print a JSON report
    #[arg(long)]
    json: bool,

    /// Append logs to this file while the interactive view is open
    #[arg(long, env = "NETPROBE_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[arg(long, env = "NETPROBE_PING_URL")]
    ping_url: Option<String>,

    #[arg(long, env = "NETPROBE_DOWNLOAD_URL")]
    download_url: Option<String>,

    #[arg(long, env = "NETPROBE_UPLOAD_URL")]
    upload_url: Option<String>,

    #[arg(long, env = "NETPROBE_PING_TIMEOUT_MS")]
    ping_timeout_ms: Option<u64>,

    #[arg(long, env = "NETPROBE_DOWNLOAD_DURATION_MS")]
    download_duration_ms: Option<u64>,

    #[arg(long, env = "NETPROBE_DOWNLOAD_HARD_TIMEOUT_MS")]
    download_hard_timeout_ms: Option<u64>,

    #[arg(long, env = "NETPROBE_UPLOAD_MAX_BYTES")]
    upload_max_bytes: Option<usize>,

    /// Send requests without the random cache-busting query parameter
    #[arg(long)]
    no_cache_bust: bool,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_toml_file(path)?,
            None => Settings::default(),
        };

        if let Some(url) = &self.ping_url {
            settings.ping_url = url.clone();
        }
        if let Some(url) = &self.download_url {
            settings.download_url = url.clone();
        }
        if let Some(url) = &self.upload_url {
            settings.upload_url = url.clone();
        }
        if let Some(ms) = self.ping_timeout_ms {
            settings.ping_timeout_ms = ms;
        }
        if let Some(ms) = self.download_duration_ms {
            settings.download_duration_ms = ms;
        }
        if let Some(ms) = self.download_hard_timeout_ms {
            settings.download_hard_timeout_ms = ms;
        }
        if let Some(bytes) = self.upload_max_bytes {
            settings.upload_max_bytes = bytes;
        }
        if self.no_cache_bust {
            settings.cache_bust = false;
        }

        settings.validate().context("invalid settings")?;
        Ok(settings)
    }
}

#[derive(Debug, Serialize)]
struct Report {
    measured_at: DateTime<Utc>,
    #[serde(flatten)]
    result: MeasurementResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    if cli.plain || cli.json {
        init_logging(LogTarget::Stderr)?;
        let prober = Prober::new(settings)?;
        let result = prober.run().await;

        if cli.json {
            let report = Report {
                measured_at: Utc::now(),
                result,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("{result}");
        }
        return Ok(());
    }

    match &cli.log_file {
        Some(path) => init_logging(LogTarget::File(path))?,
        None => init_logging(LogTarget::Off)?,
    }

    let mut terminal = ratatui::init();
    terminal.clear()?;

    let result = run_app(&mut terminal, settings).await;

    ratatui::restore();
    result
}

async fn run_app(terminal: &mut DefaultTerminal, settings: Settings) -> Result<()> {
    let mut app = App::new(settings);
    let mut probe_rx: Option<mpsc::Receiver<ProbeEvent>> = None;

    loop {
        terminal.draw(|frame| draw_ui(frame, &app))?;

        if let Some(rx) = probe_rx.as_mut() {
            loop {
                match rx.try_recv() {
                    Ok(event) => app.handle_probe_event(event),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        if app.phase != TestPhase::Idle {
                            app.complete_test();
                        }
                        probe_rx = None;
                        break;
                    }
                }
            }
        }

        if let Some(Event::Key(key)) = poll_event(Duration::from_millis(30))? {
            if let Some(action) = app.handle_key_event(key) {
                match action {
                    AppAction::Quit => break,
                    AppAction::StartTest => {
                        probe_rx = app.start_test();
                    }
                    AppAction::CancelTest => {
                        app.cancel_test();
                        probe_rx = None;
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
