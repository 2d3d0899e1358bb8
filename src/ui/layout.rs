use crate::app::{App, AppView, Panel};
use netprobe::settings::{SettingsField, MIB};
use netprobe::{TestPhase, UploadStage, UploadTrial};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

// Color Palette - Elegant & Minimal
const ACCENT: Color = Color::Rgb(100, 149, 237);      // Cornflower blue
const SUCCESS: Color = Color::Rgb(134, 194, 156);     // Soft green
const SUCCESS_DIM: Color = Color::Rgb(80, 120, 90);
const INFO: Color = Color::Rgb(147, 180, 220);        // Soft blue
const INFO_DIM: Color = Color::Rgb(90, 110, 140);
const WARN: Color = Color::Rgb(220, 180, 130);        // Soft amber
const ERROR: Color = Color::Rgb(220, 120, 120);
const TEXT_PRIMARY: Color = Color::Rgb(230, 230, 230);
const TEXT_SECONDARY: Color = Color::Rgb(160, 160, 160);
const TEXT_MUTED: Color = Color::Rgb(100, 100, 100);
const BORDER: Color = Color::Rgb(60, 60, 65);
const BORDER_ACTIVE: Color = Color::Rgb(100, 100, 110);

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let area = frame.area();

    match app.view {
        AppView::Main => {
            if app.expanded {
                draw_expanded_view(frame, area, app);
            } else {
                draw_normal_view(frame, area, app);
            }
        }
        AppView::Settings => {
            draw_settings_view(frame, area, app);
        }
    }
}

fn draw_normal_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(1),
    ])
    .split(area);

    draw_header(frame, chunks[0], app);

    let panels = Layout::horizontal([
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
    ])
    .split(chunks[1]);

    draw_download_panel(frame, panels[0], app, app.selected_panel == Panel::Download);
    draw_upload_panel(frame, panels[1], app, app.selected_panel == Panel::Upload);
    draw_ping_panel(frame, panels[2], app, app.selected_panel == Panel::Ping);

    draw_help(frame, chunks[2], app);
}

fn draw_expanded_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(1),
    ])
    .split(area);

    draw_header(frame, chunks[0], app);

    match app.selected_panel {
        Panel::Download => draw_download_expanded(frame, chunks[1], app),
        Panel::Upload => draw_upload_expanded(frame, chunks[1], app),
        Panel::Ping => draw_ping_panel(frame, chunks[1], app, true),
    }

    draw_help(frame, chunks[2], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::horizontal([
        Constraint::Length(12),
        Constraint::Min(10),
        Constraint::Length(20),
    ])
    .split(inner);

    let title = Paragraph::new("netprobe")
        .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD));
    frame.render_widget(title, chunks[0]);

    let (status, color) = match (&app.error, app.phase) {
        (Some(err), _) => (err.as_str(), ERROR),
        (None, TestPhase::Idle) => ("Ready", TEXT_MUTED),
        (None, TestPhase::Ping) => ("Measuring latency...", WARN),
        (None, TestPhase::Download) => ("Testing download...", SUCCESS),
        (None, TestPhase::Upload) => ("Testing upload...", INFO),
        (None, TestPhase::Complete) => match &app.result {
            Some(result) if result.is_empty() => ("Measurement unavailable", WARN),
            _ => ("Complete", ACCENT),
        },
    };

    let status_text = Paragraph::new(status)
        .style(Style::default().fg(color))
        .alignment(Alignment::Center);
    frame.render_widget(status_text, chunks[1]);

    let phase_text = create_phase_text(app.phase);
    frame.render_widget(
        Paragraph::new(phase_text).alignment(Alignment::Right),
        chunks[2],
    );
}

fn create_phase_text(phase: TestPhase) -> Line<'static> {
    let phases = [
        (TestPhase::Ping, "ping"),
        (TestPhase::Download, "down"),
        (TestPhase::Upload, "up"),
    ];

    let mut spans = Vec::new();

    for (i, (p, label)) in phases.iter().enumerate() {
        let is_active = phase == *p;
        let is_complete = match phase {
            TestPhase::Download => *p == TestPhase::Ping,
            TestPhase::Upload => *p == TestPhase::Ping || *p == TestPhase::Download,
            TestPhase::Complete => true,
            _ => false,
        };

        let style = if is_active {
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
        } else if is_complete {
            Style::default().fg(TEXT_SECONDARY)
        } else {
            Style::default().fg(TEXT_MUTED)
        };

        spans.push(Span::styled(*label, style));

        if i < phases.len() - 1 {
            spans.push(Span::styled(" / ", Style::default().fg(TEXT_MUTED)));
        }
    }

    Line::from(spans)
}

fn panel_block(title: &str, color: Color, selected: bool) -> Block<'static> {
    let border_color = if selected { BORDER_ACTIVE } else { BORDER };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Span::styled(
            format!(" {} ", title),
            Style::default().fg(if selected { color } else { TEXT_SECONDARY }),
        ))
}

fn draw_value(frame: &mut Frame, area: Rect, text: String) {
    frame.render_widget(
        Paragraph::new(text)
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        area,
    );
}

fn draw_caption(frame: &mut Frame, area: Rect, text: String) {
    frame.render_widget(
        Paragraph::new(text)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

// Panels
fn draw_download_panel(frame: &mut Frame, area: Rect, app: &App, selected: bool) {
    let block = panel_block("Download", SUCCESS, selected);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    draw_value(frame, chunks[0], format_speed(current_download_speed(app)));
    draw_progress_bar(frame, chunks[1], download_progress(app), SUCCESS, SUCCESS_DIM);

    if !app.download_samples.is_empty() {
        draw_sparkline(frame, chunks[2], &app.download_samples, SUCCESS);
    }
}

fn draw_upload_panel(frame: &mut Frame, area: Rect, app: &App, selected: bool) {
    let block = panel_block("Upload", INFO, selected);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(3),
    ])
    .split(inner);

    draw_value(frame, chunks[0], format_speed(app.upload_mbps));
    draw_progress_bar(frame, chunks[1], upload_progress(app), INFO, INFO_DIM);

    let lines: Vec<Line> = app
        .upload_trials
        .iter()
        .map(|(stage, trial)| trial_line(*stage, trial))
        .collect();
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), chunks[2]);
}

fn draw_ping_panel(frame: &mut Frame, area: Rect, app: &App, selected: bool) {
    let block = panel_block("Latency", WARN, selected);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .split(inner);

    let value = match app.ping_ms {
        Some(ms) => format!("{:.0} ms", ms),
        None => "—".to_string(),
    };
    draw_value(frame, chunks[0], value);
    draw_caption(
        frame,
        chunks[1],
        format!("timeout {} s", app.settings.ping_timeout_ms / 1_000),
    );
}

fn trial_line(stage: UploadStage, trial: &UploadTrial) -> Line<'static> {
    let label = match stage {
        UploadStage::Probe => "probe",
        UploadStage::Scaled => "scaled",
    };
    let size = format!("{:.1} MiB", trial.payload_bytes as f64 / MIB as f64);
    let outcome = match trial.mbps() {
        Some(mbps) => Span::styled(
            format!("{} in {:.2} s", format_speed(Some(mbps)), trial.elapsed_secs),
            Style::default().fg(TEXT_SECONDARY),
        ),
        None => Span::styled("failed", Style::default().fg(ERROR)),
    };

    Line::from(vec![
        Span::styled(format!("{label} {size}  ·  "), Style::default().fg(TEXT_MUTED)),
        outcome,
    ])
}

fn draw_progress_bar(frame: &mut Frame, area: Rect, ratio: f64, color: Color, dim_color: Color) {
    if area.width < 4 {
        return;
    }

    let width = (area.width - 2) as usize;
    let filled = ((ratio * width as f64) as usize).min(width);
    let empty = width.saturating_sub(filled);

    let bar = Line::from(vec![
        Span::raw(" "),
        Span::styled("━".repeat(filled), Style::default().fg(color)),
        Span::styled("━".repeat(empty), Style::default().fg(dim_color)),
        Span::raw(" "),
    ]);

    frame.render_widget(Paragraph::new(bar), area);
}

fn draw_sparkline(frame: &mut Frame, area: Rect, data: &[f64], color: Color) {
    if data.is_empty() || area.width < 4 || area.height < 2 {
        return;
    }

    let (min_val, max_val) = get_data_range(data);
    let range = (max_val - min_val).max(1.0);

    let points: Vec<(f64, f64)> = data
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(&points);

    let chart = Chart::new(vec![dataset])
        .x_axis(Axis::default().bounds([0.0, data.len() as f64]))
        .y_axis(Axis::default().bounds([min_val - range * 0.1, max_val + range * 0.1]));

    frame.render_widget(chart, area);
}

// Expanded views
fn draw_download_expanded(frame: &mut Frame, area: Rect, app: &App) {
    let block = panel_block("Download", SUCCESS, true);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(4),
    ])
    .split(inner);

    let (avg, max, min) = get_stats(&app.download_samples);
    let stats = Line::from(vec![
        Span::styled(
            format_speed(current_download_speed(app)),
            Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("avg {}", format_speed(avg)), Style::default().fg(TEXT_MUTED)),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("max {}", format_speed(max)), Style::default().fg(TEXT_MUTED)),
        Span::styled("  ·  ", Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("min {}", format_speed(min)), Style::default().fg(TEXT_MUTED)),
    ]);
    frame.render_widget(Paragraph::new(stats).alignment(Alignment::Center), chunks[0]);

    draw_progress_bar(frame, chunks[1], download_progress(app), SUCCESS, SUCCESS_DIM);
    draw_detailed_chart(frame, chunks[2], &app.download_samples, SUCCESS, "Mbps");
}

fn draw_upload_expanded(frame: &mut Frame, area: Rect, app: &App) {
    let block = panel_block("Upload", INFO, true);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(1),
        Constraint::Min(4),
    ])
    .split(inner);

    draw_value(frame, chunks[0], format_speed(app.upload_mbps));
    draw_progress_bar(frame, chunks[1], upload_progress(app), INFO, INFO_DIM);

    let mut lines: Vec<Line> = app
        .upload_trials
        .iter()
        .map(|(stage, trial)| trial_line(*stage, trial))
        .collect();
    lines.push(Line::from(Span::styled(
        format!(
            "probe {:.0} MiB · slow above {:.1} s · ceiling {} MiB",
            app.settings.upload_probe_bytes as f64 / MIB as f64,
            app.settings.upload_slow_threshold_secs,
            app.settings.upload_max_mib(),
        ),
        Style::default().fg(TEXT_MUTED),
    )));
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), chunks[2]);
}

fn draw_detailed_chart(frame: &mut Frame, area: Rect, data: &[f64], color: Color, unit: &str) {
    if data.is_empty() || area.width < 10 || area.height < 3 {
        return;
    }

    let (min_val, max_val) = get_data_range(data);
    let range = (max_val - min_val).max(0.1);
    let y_min = (min_val - range * 0.1).max(0.0);
    let y_max = max_val + range * 0.1;

    let points: Vec<(f64, f64)> = data
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();

    let avg = data.iter().sum::<f64>() / data.len() as f64;
    let avg_line: Vec<(f64, f64)> = vec![(0.0, avg), (data.len() as f64, avg)];

    let datasets = vec![
        Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(color))
            .data(&points),
        Dataset::default()
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(TEXT_MUTED))
            .data(&avg_line),
    ];

    let y_labels = vec![
        Span::styled(format!("{:.0}", y_min), Style::default().fg(TEXT_MUTED)),
        Span::styled(format!("{:.0} {}", y_max, unit), Style::default().fg(TEXT_MUTED)),
    ];

    let chart = Chart::new(datasets)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(BORDER))
                .bounds([0.0, data.len() as f64]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(BORDER))
                .bounds([y_min, y_max])
                .labels(y_labels),
        );

    frame.render_widget(chart, area);
}

// Settings
fn draw_settings_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(10),
        Constraint::Length(1),
    ])
    .split(area);

    let header_block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(Style::default().fg(BORDER));
    let header_inner = header_block.inner(chunks[0]);
    frame.render_widget(header_block, chunks[0]);

    frame.render_widget(
        Paragraph::new("Settings")
            .style(Style::default().fg(TEXT_PRIMARY).add_modifier(Modifier::BOLD)),
        header_inner,
    );

    let content_area = Layout::horizontal([
        Constraint::Length(2),
        Constraint::Min(30),
        Constraint::Length(2),
    ])
    .split(chunks[1])[1];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(BORDER));
    let inner = block.inner(content_area);
    frame.render_widget(block, content_area);

    let rows = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .split(inner);

    draw_setting_row(
        frame,
        rows[0],
        "Download window",
        &format!("{} s", app.settings.download_duration_secs()),
        app.selected_setting == SettingsField::DownloadDuration,
    );

    draw_setting_row(
        frame,
        rows[1],
        "Ping timeout",
        &format!("{} s", app.settings.ping_timeout_ms / 1_000),
        app.selected_setting == SettingsField::PingTimeout,
    );

    draw_setting_row(
        frame,
        rows[2],
        "Upload ceiling",
        &format!("{} MiB", app.settings.upload_max_mib()),
        app.selected_setting == SettingsField::UploadCeiling,
    );

    let help = "↑↓ select · ←→ adjust · enter done";
    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        chunks[2],
    );
}

fn draw_setting_row(frame: &mut Frame, area: Rect, label: &str, value: &str, selected: bool) {
    let chunks = Layout::horizontal([
        Constraint::Length(18),
        Constraint::Min(10),
    ])
    .split(area);

    let label_style = if selected {
        Style::default().fg(ACCENT)
    } else {
        Style::default().fg(TEXT_SECONDARY)
    };

    frame.render_widget(
        Paragraph::new(format!(" {}", label)).style(label_style),
        chunks[0],
    );

    let value_text = if selected {
        format!("< {} >", value)
    } else {
        value.to_string()
    };

    let value_style = if selected {
        Style::default().fg(TEXT_PRIMARY)
    } else {
        Style::default().fg(TEXT_MUTED)
    };

    frame.render_widget(Paragraph::new(value_text).style(value_style), chunks[1]);
}

fn draw_help(frame: &mut Frame, area: Rect, app: &App) {
    let help = if app.expanded {
        "esc close · q quit"
    } else if app.is_running() {
        "tab select · space expand · esc cancel · q quit"
    } else {
        "enter start · s settings · tab select · space expand · q quit"
    };

    frame.render_widget(
        Paragraph::new(help)
            .style(Style::default().fg(TEXT_MUTED))
            .alignment(Alignment::Center),
        area,
    );
}

// Helpers
fn current_download_speed(app: &App) -> Option<f64> {
    match app.phase {
        TestPhase::Download => app.download_samples.last().copied(),
        _ => app.download_mbps,
    }
}

fn get_data_range(data: &[f64]) -> (f64, f64) {
    let min = data.iter().cloned().fold(f64::MAX, f64::min);
    let max = data.iter().cloned().fold(f64::MIN, f64::max);
    (if min == f64::MAX { 0.0 } else { min }, if max == f64::MIN { 0.0 } else { max })
}

fn get_stats(data: &[f64]) -> (Option<f64>, Option<f64>, Option<f64>) {
    if data.is_empty() {
        return (None, None, None);
    }
    let avg = data.iter().sum::<f64>() / data.len() as f64;
    let (min, max) = get_data_range(data);
    (Some(avg), Some(max), Some(min))
}

fn download_progress(app: &App) -> f64 {
    match app.phase {
        TestPhase::Download => app.download_progress,
        TestPhase::Upload | TestPhase::Complete => 1.0,
        _ => 0.0,
    }
}

fn upload_progress(app: &App) -> f64 {
    match app.phase {
        TestPhase::Upload | TestPhase::Complete => app.upload_progress(),
        _ => 0.0,
    }
}

fn format_speed(mbps: Option<f64>) -> String {
    match mbps {
        Some(mbps) if mbps >= 1000.0 => format!("{:.1} Gbps", mbps / 1000.0),
        Some(mbps) if mbps >= 1.0 => format!("{:.1} Mbps", mbps),
        Some(mbps) if mbps > 0.0 => format!("{:.0} Kbps", mbps * 1000.0),
        _ => "—".to_string(),
    }
}
