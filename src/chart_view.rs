//! Draws chart messages with ratatui widgets.
//!
//! A payload is validated and turned into a [`ChartBlock`] once per frame;
//! the block knows its own height so the message list can lay it out before
//! drawing. Drawing failures never propagate past [`render_chart_block`].

use std::time::Instant;

use insight_core::chart::{
    build_chart, format_value, ChartKind, ChartRendering, ChartSpec, LegendPosition,
    TableFallback,
};
use insight_core::{validate_chart_data, Theme};
use ratatui::{
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Cell, Chart, Dataset, GraphType,
        Paragraph, Row, Table, Wrap,
    },
    Frame,
};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::theme::{to_color, Palette};

/// Rows used by bar and line charts, borders included.
pub const CHART_HEIGHT: u16 = 14;
const MAX_LIST_ROWS: usize = 12;
const MAX_RAW_LINES: usize = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChartRenderError {
    #[error("area {width}x{height} is too small")]
    TooSmall { width: u16, height: u16 },

    #[error("chart has no dataset")]
    NoDataset,

    #[error("chart contains non-finite values")]
    NonFinite,

    #[error("{0}")]
    Degenerate(&'static str),
}

/// What a chart message turns into on screen.
#[derive(Debug, Clone)]
pub enum ChartBlock {
    Chart(ChartSpec),
    Table(TableFallback),
    Invalid { reason: String, raw: Vec<String> },
}

impl ChartBlock {
    pub fn prepare(payload: &Value, theme: Theme) -> Self {
        match validate_chart_data(payload) {
            Ok(valid) => match build_chart(&valid, theme) {
                ChartRendering::Chart(spec) => ChartBlock::Chart(spec),
                ChartRendering::Table(table) => ChartBlock::Table(table),
            },
            Err(e) => {
                let pretty = serde_json::to_string_pretty(payload).unwrap_or_default();
                let mut raw: Vec<String> = pretty.lines().map(str::to_string).collect();
                if raw.len() > MAX_RAW_LINES {
                    raw.truncate(MAX_RAW_LINES);
                    raw.push("…".to_string());
                }
                ChartBlock::Invalid {
                    reason: e.to_string(),
                    raw,
                }
            }
        }
    }

    pub fn height(&self) -> u16 {
        let rows = match self {
            ChartBlock::Chart(spec) => match spec.kind {
                ChartKind::Pie => return pie_height(spec.data.labels.len()),
                ChartKind::Bar | ChartKind::Line => return CHART_HEIGHT,
            },
            ChartBlock::Table(table) => table.rows.len().min(MAX_LIST_ROWS) + 1,
            ChartBlock::Invalid { raw, .. } => raw.len() + 1,
        };
        rows as u16 + 2
    }
}

fn pie_height(slices: usize) -> u16 {
    // stacked row + spacer + one row per slice (plus an overflow row)
    let rows = slices.min(MAX_LIST_ROWS) + usize::from(slices > MAX_LIST_ROWS);
    (rows + 2 + 2) as u16
}

/// Draws `block`, replacing any drawing failure with an inline error line.
pub fn render_chart_block(
    frame: &mut Frame,
    area: Rect,
    block: &ChartBlock,
    palette: &Palette,
    created: Instant,
) {
    match block {
        ChartBlock::Chart(spec) => {
            let progress = spec.options.animation.progress(created.elapsed());
            let outer = Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(to_color(spec.options.grid_color)))
                .title(Span::styled(
                    format!(" {} ", spec.options.title),
                    Style::default()
                        .fg(to_color(spec.options.text_color))
                        .add_modifier(Modifier::BOLD),
                ));
            let inner = outer.inner(area);
            frame.render_widget(outer, area);

            let result = match spec.kind {
                ChartKind::Bar => draw_bar(frame, inner, spec, progress),
                ChartKind::Line => draw_line(frame, inner, spec, progress),
                ChartKind::Pie => draw_pie(frame, inner, spec, progress),
            };
            if let Err(e) = result {
                warn!(kind = spec.kind.as_str(), error = %e, "chart draw failed");
                let msg = Paragraph::new(format!("Chart failed to render: {}", e))
                    .style(palette.error())
                    .wrap(Wrap { trim: true });
                frame.render_widget(msg, inner);
            }
        }
        ChartBlock::Table(table) => render_table(frame, area, table, palette),
        ChartBlock::Invalid { reason, raw } => {
            let mut lines = vec![Line::from(Span::styled(
                format!("Chart data could not be displayed: {}", reason),
                palette.error(),
            ))];
            lines.extend(
                raw.iter()
                    .map(|l| Line::from(Span::styled(l.clone(), palette.subtitle()))),
            );
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.error))
                .title(" Chart data ");
            frame.render_widget(Paragraph::new(lines).block(block), area);
        }
    }
}

fn check_values(spec: &ChartSpec) -> Result<&[f64], ChartRenderError> {
    let dataset = spec.data.datasets.first().ok_or(ChartRenderError::NoDataset)?;
    if dataset.data.is_empty() {
        return Err(ChartRenderError::NoDataset);
    }
    if dataset.data.iter().any(|v| !v.is_finite()) {
        return Err(ChartRenderError::NonFinite);
    }
    Ok(&dataset.data)
}

fn legend_line(spec: &ChartSpec) -> Line<'static> {
    let Some(dataset) = spec.data.datasets.first() else {
        return Line::default();
    };
    let color = dataset
        .border_color
        .first()
        .copied()
        .map(to_color)
        .unwrap_or_default();
    Line::from(vec![
        Span::styled("■ ", Style::default().fg(color)),
        Span::styled(
            dataset.label.clone(),
            Style::default().fg(to_color(spec.options.text_color)),
        ),
    ])
}

/// Splits off the legend row according to the legend position.
fn split_legend(area: Rect, position: LegendPosition) -> (Rect, Rect) {
    let legend_height = 1.min(area.height);
    let rest = area.height - legend_height;
    match position {
        LegendPosition::Top => (
            Rect::new(area.x, area.y, area.width, legend_height),
            Rect::new(area.x, area.y + legend_height, area.width, rest),
        ),
    }
}

fn draw_bar(
    frame: &mut Frame,
    area: Rect,
    spec: &ChartSpec,
    progress: f64,
) -> Result<(), ChartRenderError> {
    let values = check_values(spec)?;
    if values.iter().any(|v| *v < 0.0) {
        return Err(ChartRenderError::Degenerate("bar chart cannot show negative values"));
    }

    // Every bar needs a column plus a gap.
    if area.height < 4 || values.len() > usize::from(area.width) / 2 {
        return Err(ChartRenderError::TooSmall {
            width: area.width,
            height: area.height,
        });
    }
    let count = values.len() as u16;

    let (legend_area, chart_area) = split_legend(area, spec.options.legend_position);
    frame.render_widget(Paragraph::new(legend_line(spec)), legend_area);

    let dataset = &spec.data.datasets[0];
    let tooltip = Style::default()
        .bg(to_color(spec.options.tooltip.background))
        .fg(to_color(spec.options.tooltip.text));
    let bar_gap = 1;
    let bar_width = ((area.width - (count - 1) * bar_gap) / count).clamp(1, 12);

    let bars: Vec<Bar> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let color = dataset
                .background_color
                .get(i)
                .copied()
                .map(to_color)
                .unwrap_or_default();
            let label: String = spec.data.labels[i].chars().take(bar_width as usize).collect();
            Bar::default()
                .value((v * progress * 100.0).round() as u64)
                .text_value(format_value(*v))
                .label(Line::from(label))
                .style(Style::default().fg(color))
                .value_style(tooltip)
        })
        .collect();

    let max = values.iter().cloned().fold(0.0_f64, f64::max);
    let chart = BarChart::default()
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width)
        .bar_gap(bar_gap)
        .max(((max * 100.0).round() as u64).max(1))
        .label_style(Style::default().fg(to_color(spec.options.text_color)));
    frame.render_widget(chart, chart_area);
    Ok(())
}

fn draw_line(
    frame: &mut Frame,
    area: Rect,
    spec: &ChartSpec,
    progress: f64,
) -> Result<(), ChartRenderError> {
    let values = check_values(spec)?;
    if area.width < 12 || area.height < 5 {
        return Err(ChartRenderError::TooSmall {
            width: area.width,
            height: area.height,
        });
    }

    let dataset = &spec.data.datasets[0];
    let series_color = dataset
        .border_color
        .first()
        .copied()
        .map(to_color)
        .unwrap_or_default();
    let text_style = Style::default().fg(to_color(spec.options.text_color));
    let grid_style = Style::default().fg(to_color(spec.options.grid_color));

    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64, v * progress))
        .collect();

    let min = values.iter().cloned().fold(0.0_f64, f64::min);
    let mut max = values.iter().cloned().fold(0.0_f64, f64::max);
    if (max - min).abs() < f64::EPSILON {
        max = min + 1.0;
    }
    let x_max = (values.len() as f64 - 1.0).max(1.0);

    let first = spec.data.labels.first().cloned().unwrap_or_default();
    let last = spec.data.labels.last().cloned().unwrap_or_default();
    let x_labels = if values.len() > 1 {
        vec![Span::styled(first, text_style), Span::styled(last, text_style)]
    } else {
        vec![Span::styled(first, text_style)]
    };
    let y_labels = vec![
        Span::styled(format_value(min), text_style),
        Span::styled(format_value((min + max) / 2.0), text_style),
        Span::styled(format_value(max), text_style),
    ];

    let chart = Chart::new(vec![Dataset::default()
        .name(dataset.label.clone())
        .marker(Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(series_color))
        .data(&points)])
    .x_axis(
        Axis::default()
            .style(grid_style)
            .bounds([0.0, x_max])
            .labels(x_labels),
    )
    .y_axis(
        Axis::default()
            .style(grid_style)
            .bounds([min, max])
            .labels(y_labels),
    )
    .legend_position(Some(match spec.options.legend_position {
        LegendPosition::Top => ratatui::widgets::LegendPosition::Top,
    }))
    .hidden_legend_constraints((Constraint::Ratio(1, 1), Constraint::Ratio(1, 1)));

    frame.render_widget(chart, area);
    Ok(())
}

/// Boundaries of each slice within `width` cells, from cumulative shares.
fn slice_cells(values: &[f64], width: u16, progress: f64) -> Vec<u16> {
    let total: f64 = values.iter().sum();
    let mut cells = Vec::with_capacity(values.len());
    let mut cumulative = 0.0;
    let mut drawn = 0u16;
    for v in values {
        cumulative += v / total;
        let edge = (cumulative * progress * width as f64).round() as u16;
        let edge = edge.min(width);
        cells.push(edge.saturating_sub(drawn));
        drawn = edge.max(drawn);
    }
    cells
}

fn draw_pie(
    frame: &mut Frame,
    area: Rect,
    spec: &ChartSpec,
    progress: f64,
) -> Result<(), ChartRenderError> {
    let values = check_values(spec)?;
    if values.iter().any(|v| *v < 0.0) {
        return Err(ChartRenderError::Degenerate("pie chart cannot show negative values"));
    }
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Err(ChartRenderError::Degenerate("pie chart needs a positive total"));
    }
    if area.width < 10 || area.height < 3 {
        return Err(ChartRenderError::TooSmall {
            width: area.width,
            height: area.height,
        });
    }

    let dataset = &spec.data.datasets[0];
    let color_at = |i: usize| {
        dataset
            .background_color
            .get(i)
            .copied()
            .map(to_color)
            .unwrap_or_default()
    };
    let text_style = Style::default().fg(to_color(spec.options.text_color));

    let stacked: Vec<Span> = slice_cells(values, area.width, progress)
        .into_iter()
        .enumerate()
        .filter(|(_, n)| *n > 0)
        .map(|(i, n)| Span::styled("█".repeat(n as usize), Style::default().fg(color_at(i))))
        .collect();

    let mut lines = vec![Line::from(stacked), Line::default()];
    let label_width = spec
        .data
        .labels
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .min(20);
    for (i, (label, v)) in spec.data.labels.iter().zip(values).enumerate().take(MAX_LIST_ROWS) {
        let share = v / total * 100.0;
        let label: String = label.chars().take(label_width).collect();
        lines.push(Line::from(vec![
            Span::styled("■ ", Style::default().fg(color_at(i))),
            Span::styled(format!("{:<width$}", label, width = label_width), text_style),
            Span::styled(format!("  {:>5.1}%  ", share * progress), text_style),
            Span::styled(format_value(*v), text_style.add_modifier(Modifier::DIM)),
        ]));
    }
    if values.len() > MAX_LIST_ROWS {
        lines.push(Line::from(Span::styled(
            format!("… {} more", values.len() - MAX_LIST_ROWS),
            text_style.add_modifier(Modifier::DIM),
        )));
    }

    frame.render_widget(Paragraph::new(lines), area);
    Ok(())
}

fn render_table(frame: &mut Frame, area: Rect, table: &TableFallback, palette: &Palette) {
    let header = Row::new(vec![Cell::from("Label"), Cell::from("Value")])
        .style(Style::default().fg(palette.accent).add_modifier(Modifier::BOLD));
    let rows: Vec<Row> = table
        .rows
        .iter()
        .take(MAX_LIST_ROWS)
        .map(|(label, value)| Row::new(vec![Cell::from(label.clone()), Cell::from(value.clone())]))
        .collect();

    let widget = Table::new(rows, [Constraint::Percentage(60), Constraint::Percentage(40)])
        .header(header)
        .style(Style::default().fg(palette.text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(palette.border())
                .title(format!(" {} ", table.title)),
        );
    frame.render_widget(widget, area);
}
