use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use netprobe::settings::{Settings, SettingsField, MIB};
use netprobe::{
    DownloadProgress, MeasurementResult, ProbeEvent, Prober, TestPhase, UploadStage, UploadTrial,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppView {
    Main,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Download,
    Upload,
    Ping,
}

impl Panel {
    pub fn next(self) -> Self {
        match self {
            Panel::Download => Panel::Upload,
            Panel::Upload => Panel::Ping,
            Panel::Ping => Panel::Download,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Panel::Download => Panel::Ping,
            Panel::Upload => Panel::Download,
            Panel::Ping => Panel::Upload,
        }
    }
}

pub struct App {
    pub phase: TestPhase,
    pub should_quit: bool,

    // Per-metric results as they arrive; the final result replaces them.
    pub ping_ms: Option<f64>,
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
    pub result: Option<MeasurementResult>,
    pub error: Option<String>,

    // UI state
    pub view: AppView,
    pub selected_panel: Panel,
    pub expanded: bool,

    // Settings
    pub settings: Settings,
    pub selected_setting: SettingsField,

    // Progress tracking
    pub download_progress: f64,
    pub download_samples: Vec<f64>,
    pub upload_trials: Vec<(UploadStage, UploadTrial)>,

    cancel: Option<CancellationToken>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self {
            phase: TestPhase::Idle,
            should_quit: false,
            ping_ms: None,
            download_mbps: None,
            upload_mbps: None,
            result: None,
            error: None,
            view: AppView::Main,
            selected_panel: Panel::Download,
            expanded: false,
            settings,
            selected_setting: SettingsField::DownloadDuration,
            download_progress: 0.0,
            download_samples: Vec::new(),
            upload_trials: Vec::new(),
            cancel: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase != TestPhase::Idle && self.phase != TestPhase::Complete
    }

    pub fn handle_key_event(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }

        match self.view {
            AppView::Main => self.handle_main_key(key),
            AppView::Settings => self.handle_settings_key(key),
        }
    }

    fn handle_main_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                Some(AppAction::Quit)
            }
            KeyCode::Char('s') => {
                if !self.is_running() {
                    self.view = AppView::Settings;
                }
                None
            }
            KeyCode::Enter => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if !self.is_running() {
                    Some(AppAction::StartTest)
                } else {
                    self.expanded = true;
                    None
                }
            }
            KeyCode::Esc => {
                if self.expanded {
                    self.expanded = false;
                    None
                } else if self.is_running() {
                    Some(AppAction::CancelTest)
                } else {
                    None
                }
            }
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('j') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.next();
                }
                None
            }
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('k') => {
                if !self.expanded {
                    self.selected_panel = self.selected_panel.prev();
                }
                None
            }
            KeyCode::Char(' ') => {
                self.expanded = !self.expanded;
                None
            }
            _ => None,
        }
    }

    fn handle_settings_key(&mut self, key: event::KeyEvent) -> Option<AppAction> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter => {
                self.view = AppView::Main;
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_setting = self.selected_setting.prev();
                None
            }
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                self.selected_setting = self.selected_setting.next();
                None
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.decrease_setting();
                None
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.increase_setting();
                None
            }
            _ => None,
        }
    }

    fn increase_setting(&mut self) {
        match self.selected_setting {
            SettingsField::DownloadDuration => {
                let secs = (self.settings.download_duration_secs() + 1).min(30);
                self.settings.set_download_duration_secs(secs);
            }
            SettingsField::PingTimeout => {
                self.settings.ping_timeout_ms = (self.settings.ping_timeout_ms + 1_000).min(10_000);
            }
            SettingsField::UploadCeiling => {
                let mib = (self.settings.upload_max_mib() + 5).min(100);
                self.settings.upload_max_bytes = mib * MIB;
            }
        }
    }

    fn decrease_setting(&mut self) {
        match self.selected_setting {
            SettingsField::DownloadDuration => {
                let secs = self.settings.download_duration_secs().saturating_sub(1).max(1);
                self.settings.set_download_duration_secs(secs);
            }
            SettingsField::PingTimeout => {
                self.settings.ping_timeout_ms =
                    self.settings.ping_timeout_ms.saturating_sub(1_000).max(1_000);
            }
            SettingsField::UploadCeiling => {
                let floor = self.settings.upload_probe_bytes.div_ceil(MIB).max(5);
                let mib = self.settings.upload_max_mib().saturating_sub(5).max(floor);
                self.settings.upload_max_bytes = mib * MIB;
            }
        }
    }

    pub fn reset_for_new_test(&mut self) {
        self.phase = TestPhase::Idle;
        self.ping_ms = None;
        self.download_mbps = None;
        self.upload_mbps = None;
        self.result = None;
        self.error = None;
        self.download_progress = 0.0;
        self.download_samples.clear();
        self.upload_trials.clear();
        self.expanded = false;
    }

    pub fn handle_probe_event(&mut self, event: ProbeEvent) {
        match event {
            ProbeEvent::PhaseStarted(phase) => self.phase = phase,
            ProbeEvent::LatencyMeasured(ping_ms) => self.ping_ms = ping_ms,
            ProbeEvent::DownloadProgress(progress) => self.update_download_progress(progress),
            ProbeEvent::DownloadComplete(mbps) => {
                self.download_mbps = mbps;
                self.download_progress = 1.0;
            }
            ProbeEvent::UploadTrialFinished { stage, trial } => {
                self.upload_trials.push((stage, trial));
            }
            ProbeEvent::UploadComplete(mbps) => self.upload_mbps = mbps,
            ProbeEvent::Finished(result) => {
                self.ping_ms = result.ping_ms();
                self.download_mbps = result.download_mbps();
                self.upload_mbps = result.upload_mbps();
                self.result = Some(result);
                self.complete_test();
            }
        }
    }

    fn update_download_progress(&mut self, progress: DownloadProgress) {
        let window = self.settings.download_duration().as_secs_f64();
        self.download_progress = (progress.elapsed.as_secs_f64() / window).min(1.0);
        self.download_samples = progress.speed_samples;
    }

    /// 0 before the probe trial lands, half after it, full once reported.
    pub fn upload_progress(&self) -> f64 {
        if self.phase == TestPhase::Complete {
            1.0
        } else if self.upload_trials.is_empty() {
            0.0
        } else {
            0.5
        }
    }

    pub fn complete_test(&mut self) {
        self.phase = TestPhase::Complete;
        self.cancel = None;
    }

    pub fn start_test(&mut self) -> Option<mpsc::Receiver<ProbeEvent>> {
        self.reset_for_new_test();

        let prober = match Prober::new(self.settings.clone()) {
            Ok(prober) => prober,
            Err(err) => {
                self.error = Some(err.to_string());
                return None;
            }
        };

        let (tx, rx) = mpsc::channel(256);
        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        self.phase = TestPhase::Ping;

        tokio::spawn(async move {
            prober.run_with(Some(tx), cancel).await;
        });

        Some(rx)
    }

    pub fn cancel_test(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.phase = TestPhase::Idle;
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AppAction {
    Quit,
    StartTest,
    CancelTest,
}

pub fn poll_event(timeout: Duration) -> anyhow::Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}
