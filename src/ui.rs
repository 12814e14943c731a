//! UI rendering and layout utilities

use crate::constants::ui::{BAR_BORDER_WIDTH, GAUGE_MAX_DB};
use crate::state::AppState;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

fn gauge_ratio(db: f64) -> f64 {
    (db / GAUGE_MAX_DB).clamp(0.0, 1.0)
}

/// Create a gradient bar showing the last reading
pub fn create_gradient_bar(width: usize, ratio: f64) -> Line<'static> {
    let filled = (ratio * width as f64) as usize;
    let partial_fill = (ratio * width as f64) - filled as f64;
    let mut spans = Vec::new();

    for i in 0..width {
        let color = if i < width / 3 {
            Color::Green
        } else if i < 2 * width / 3 {
            Color::Yellow
        } else {
            Color::Red
        };

        let ch = if i < filled {
            '█'
        } else if i == filled && partial_fill > 0.0 {
            match (partial_fill * 8.0) as usize {
                0 | 1 => '░',
                2 | 3 => '▒',
                4 | 5 => '▓',
                _ => '█',
            }
        } else {
            '░'
        };
        spans.push(Span::styled(ch.to_string(), Style::default().fg(color)));
    }

    Line::from(spans)
}

/// Scale labels (0, 40, 80, 120) with a threshold marker
pub fn create_db_labels(width: usize, threshold_db: f64) -> Line<'static> {
    if width == 0 {
        return Line::default();
    }
    let threshold_pos = (gauge_ratio(threshold_db) * (width - 1) as f64).round() as usize;
    let mut spans = Vec::new();
    let mut i = 0;

    while i < width {
        if i == threshold_pos {
            spans.push(Span::styled("▲".to_string(), Style::default().fg(Color::White)));
            i += 1;
            continue;
        }

        let label = if i == 0 {
            "0"
        } else if i == width / 3 {
            "40"
        } else if i == 2 * width / 3 {
            "80"
        } else if i + 3 == width {
            "120"
        } else {
            " "
        };
        // Keep multi-character labels from overrunning the marker or the edge
        let label = if label.len() > 1
            && ((i..i + label.len()).contains(&threshold_pos) || i + label.len() > width)
        {
            " "
        } else {
            label
        };

        let color = if i < width / 3 {
            Color::Green
        } else if i < 2 * width / 3 {
            Color::Yellow
        } else {
            Color::Red
        };
        i += label.len();
        spans.push(Span::styled(label.to_string(), Style::default().fg(color)));
    }

    Line::from(spans)
}

/// Render the complete UI
pub fn render_ui(f: &mut Frame, state: &AppState) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(3),
        ])
        .split(size);

    let settings = format!(
        "Device: {}  Clip: {}  Threshold: {:.1} dB  Interval: {}s",
        state.device_name, state.clip_name, state.threshold_db, state.interval_secs
    );
    let settings_text =
        Paragraph::new(settings).block(Block::default().title("Settings").borders(Borders::ALL));
    f.render_widget(settings_text, chunks[0]);

    let status_color = if state.running { Color::Green } else { Color::DarkGray };
    let status_text = Paragraph::new(Span::styled(state.status(), Style::default().fg(status_color)))
        .block(Block::default().title("Status").borders(Borders::ALL));
    f.render_widget(status_text, chunks[1]);

    let bar_width = (chunks[2].width as usize).saturating_sub(BAR_BORDER_WIDTH);
    let ratio = state.last_reading.map(gauge_ratio).unwrap_or(0.0);
    let title = match state.last_reading {
        Some(db) => format!("Last reading: {:.1} dB", db),
        None => "Last reading: none yet".to_string(),
    };
    let gauge = Paragraph::new(vec![
        create_gradient_bar(bar_width, ratio),
        create_db_labels(bar_width, state.threshold_db),
    ])
    .block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(gauge, chunks[2]);

    // Newest lines at the bottom, showing as many as fit
    let visible = (chunks[3].height as usize).saturating_sub(BAR_BORDER_WIDTH);
    let skip = state.log.len().saturating_sub(visible);
    let items: Vec<ListItem> = state
        .log
        .iter()
        .skip(skip)
        .map(|line| ListItem::new(line.as_str()))
        .collect();
    let log = List::new(items).block(Block::default().title("Log").borders(Borders::ALL));
    f.render_widget(log, chunks[3]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn bar_fills_proportionally() {
        let bar = text(&create_gradient_bar(10, 0.5));
        assert_eq!(bar.chars().count(), 10);
        assert_eq!(bar.chars().filter(|c| *c == '█').count(), 5);
    }

    #[test]
    fn labels_fit_width_and_mark_threshold() {
        for width in [12, 40, 77] {
            let labels = text(&create_db_labels(width, 60.0));
            assert_eq!(labels.chars().count(), width, "width {}", width);
            assert_eq!(labels.chars().filter(|c| *c == '▲').count(), 1);
        }
        assert_eq!(text(&create_db_labels(0, 50.0)), "");
    }
}
