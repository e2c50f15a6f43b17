//! Chart payload validation and chart specification building.
//!
//! The specification produced here is renderer-agnostic: the TUI turns it
//! into ratatui widgets, and the one-shot CLI only uses the tabular form.

use std::borrow::Cow;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ChartDataError;
use crate::theme::Theme;

pub const DEFAULT_TITLE: &str = "Chart";
pub const DEFAULT_SERIES_LABEL: &str = "Value";
pub const ANIMATION_DURATION: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bar" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "pie" => Some(ChartKind::Pie),
            _ => None,
        }
    }
}

/// Validated chart data.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPayload {
    pub kind: ChartKind,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub title: Option<String>,
    pub series_label: Option<String>,
}

/// Validates a candidate payload.
///
/// Accepts the flat `{kind|type, labels, values, title?, seriesLabel?}` shape
/// and the Chart.js-style `{type, data: {labels, datasets: [{label, data}]}}`
/// shape emitted by the analytics backend's query tool.
pub fn validate_chart_data(raw: &Value) -> Result<ChartPayload, ChartDataError> {
    let normalized = normalize(raw);
    let obj = normalized.as_object().ok_or(ChartDataError::NotAnObject)?;

    let kind_value = obj
        .get("kind")
        .or_else(|| obj.get("type"))
        .filter(|v| !v.is_null())
        .ok_or(ChartDataError::MissingField("kind"))?;
    let labels_value = obj
        .get("labels")
        .filter(|v| !v.is_null())
        .ok_or(ChartDataError::MissingField("labels"))?;
    let values_value = obj
        .get("values")
        .filter(|v| !v.is_null())
        .ok_or(ChartDataError::MissingField("values"))?;

    let kind = kind_value
        .as_str()
        .and_then(ChartKind::from_str)
        .ok_or_else(|| ChartDataError::UnsupportedKind(display_scalar(kind_value)))?;

    let labels = labels_value
        .as_array()
        .ok_or(ChartDataError::NotAnArray("labels"))?;
    let values = values_value
        .as_array()
        .ok_or(ChartDataError::NotAnArray("values"))?;

    if labels.len() != values.len() {
        return Err(ChartDataError::LengthMismatch {
            labels: labels.len(),
            values: values.len(),
        });
    }
    if labels.is_empty() {
        return Err(ChartDataError::Empty);
    }

    let values = values
        .iter()
        .enumerate()
        .map(|(index, v)| {
            coerce_number(v).ok_or_else(|| ChartDataError::NonNumeric {
                index,
                value: display_scalar(v),
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    Ok(ChartPayload {
        kind,
        labels: labels.iter().map(display_scalar).collect(),
        values,
        title: string_field(obj, &["title"]),
        series_label: string_field(obj, &["seriesLabel", "series_label", "label"]),
    })
}

/// Flattens Chart.js-style payloads; anything else is returned as-is.
fn normalize(raw: &Value) -> Cow<'_, Value> {
    let Some(obj) = raw.as_object() else {
        return Cow::Borrowed(raw);
    };
    if obj.contains_key("values") {
        return Cow::Borrowed(raw);
    }
    let Some(data) = obj.get("data").and_then(Value::as_object) else {
        return Cow::Borrowed(raw);
    };

    let mut flat = Map::new();
    if let Some(kind) = obj.get("kind").or_else(|| obj.get("type")) {
        flat.insert("kind".into(), kind.clone());
    }
    if let Some(labels) = data.get("labels") {
        flat.insert("labels".into(), labels.clone());
    }
    let first_dataset = data
        .get("datasets")
        .and_then(Value::as_array)
        .and_then(|sets| sets.first());
    if let Some(dataset) = first_dataset {
        if let Some(values) = dataset.get("data") {
            flat.insert("values".into(), values.clone());
        }
        if let Some(label) = dataset.get("label") {
            flat.insert("seriesLabel".into(), label.clone());
        }
    }
    let title = obj
        .get("title")
        .or_else(|| raw.pointer("/options/plugins/title/text"))
        .cloned();
    if let Some(title) = title {
        flat.insert("title".into(), title);
    }
    Cow::Owned(Value::Object(flat))
}

fn coerce_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn display_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Palette
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const LIGHT_PALETTE: [Rgb; 10] = [
    Rgb(78, 121, 167),
    Rgb(242, 142, 43),
    Rgb(225, 87, 89),
    Rgb(118, 183, 178),
    Rgb(89, 161, 79),
    Rgb(237, 201, 72),
    Rgb(176, 122, 161),
    Rgb(255, 157, 167),
    Rgb(156, 117, 95),
    Rgb(186, 176, 172),
];

pub const DARK_PALETTE: [Rgb; 10] = [
    Rgb(138, 180, 248),
    Rgb(253, 214, 99),
    Rgb(242, 139, 130),
    Rgb(129, 201, 149),
    Rgb(197, 138, 249),
    Rgb(120, 217, 236),
    Rgb(252, 173, 112),
    Rgb(255, 139, 203),
    Rgb(168, 218, 181),
    Rgb(215, 174, 251),
];

pub fn palette(theme: Theme) -> &'static [Rgb; 10] {
    match theme {
        Theme::Light => &LIGHT_PALETTE,
        Theme::Dark => &DARK_PALETTE,
    }
}

/// `count` colors taken from the theme palette, wrapping by index.
pub fn generate_colors(theme: Theme, count: usize) -> Vec<Rgb> {
    let palette = palette(theme);
    (0..count).map(|i| palette[i % palette.len()]).collect()
}

// ---------------------------------------------------------------------------
// Chart specification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegendPosition {
    Top,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TooltipMode {
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    EaseOutQuart,
}

impl Easing {
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::EaseOutQuart => 1.0 - (1.0 - t).powi(4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationOptions {
    pub duration: Duration,
    pub easing: Easing,
}

impl AnimationOptions {
    /// Eased completion in `[0, 1]` after `elapsed`.
    pub fn progress(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        self.easing
            .apply(elapsed.as_secs_f64() / self.duration.as_secs_f64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TooltipOptions {
    pub mode: TooltipMode,
    pub intersect: bool,
    pub background: Rgb,
    pub text: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartOptions {
    pub title: String,
    pub legend_position: LegendPosition,
    pub text_color: Rgb,
    pub grid_color: Rgb,
    pub tooltip: TooltipOptions,
    pub animation: AnimationOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<f64>,
    pub background_color: Vec<Rgb>,
    pub border_color: Vec<Rgb>,
    pub border_width: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub data: ChartData,
    pub options: ChartOptions,
}

/// Two-column label/value rendering used when values cannot be charted.
#[derive(Debug, Clone, PartialEq)]
pub struct TableFallback {
    pub title: String,
    pub rows: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartRendering {
    Chart(ChartSpec),
    Table(TableFallback),
}

pub fn build_chart(payload: &ChartPayload, theme: Theme) -> ChartRendering {
    let title = payload
        .title
        .clone()
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    if payload.values.is_empty() || payload.values.iter().any(|v| !v.is_finite()) {
        return ChartRendering::Table(table_fallback(payload, title));
    }

    let colors = generate_colors(theme, payload.values.len());
    let (background_color, border_color) = match payload.kind {
        ChartKind::Pie | ChartKind::Bar => (colors.clone(), colors),
        ChartKind::Line => {
            let series = vec![palette(theme)[0]];
            (series.clone(), series)
        }
    };

    let dataset = ChartDataset {
        label: payload
            .series_label
            .clone()
            .unwrap_or_else(|| DEFAULT_SERIES_LABEL.to_string()),
        data: payload.values.clone(),
        background_color,
        border_color,
        border_width: 1,
    };

    ChartRendering::Chart(ChartSpec {
        kind: payload.kind,
        data: ChartData {
            labels: payload.labels.clone(),
            datasets: vec![dataset],
        },
        options: chart_options(title, theme),
    })
}

fn chart_options(title: String, theme: Theme) -> ChartOptions {
    let (text_color, grid_color, tooltip_bg, tooltip_text) = match theme {
        Theme::Light => (
            Rgb(33, 37, 41),
            Rgb(222, 226, 230),
            Rgb(255, 255, 255),
            Rgb(33, 37, 41),
        ),
        Theme::Dark => (
            Rgb(230, 237, 243),
            Rgb(68, 76, 86),
            Rgb(33, 38, 45),
            Rgb(230, 237, 243),
        ),
    };
    ChartOptions {
        title,
        legend_position: LegendPosition::Top,
        text_color,
        grid_color,
        tooltip: TooltipOptions {
            mode: TooltipMode::Index,
            intersect: false,
            background: tooltip_bg,
            text: tooltip_text,
        },
        animation: AnimationOptions {
            duration: ANIMATION_DURATION,
            easing: Easing::EaseOutQuart,
        },
    }
}

pub fn table_fallback(payload: &ChartPayload, title: String) -> TableFallback {
    let rows = payload
        .labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let value = payload
                .values
                .get(i)
                .filter(|v| v.is_finite())
                .map(|v| format_value(*v))
                .unwrap_or_else(|| "-".to_string());
            (label.clone(), value)
        })
        .collect();
    TableFallback { title, rows }
}

/// Compact number formatting: integers without a fractional part, others to
/// two decimals.
pub fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{:.2}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_minimal_bar_payload() {
        let payload =
            validate_chart_data(&json!({"kind": "bar", "labels": ["a", "b"], "values": [1, 2]}))
                .unwrap();
        assert_eq!(payload.kind, ChartKind::Bar);
        assert_eq!(payload.labels, vec!["a", "b"]);
        assert_eq!(payload.values, vec![1.0, 2.0]);
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = validate_chart_data(&json!({"kind": "bar", "labels": ["a", "b"], "values": [1]}))
            .unwrap_err();
        assert_eq!(err, ChartDataError::LengthMismatch { labels: 2, values: 1 });
    }

    #[test]
    fn rejects_null_value() {
        let err = validate_chart_data(&json!({"kind": "bar", "labels": ["a"], "values": [null]}))
            .unwrap_err();
        assert!(matches!(err, ChartDataError::NonNumeric { index: 0, .. }));
    }

    #[test]
    fn accepts_type_alias_and_numeric_strings() {
        let payload = validate_chart_data(
            &json!({"type": "Pie", "labels": ["x", 2], "values": ["1.5", 3]}),
        )
        .unwrap();
        assert_eq!(payload.kind, ChartKind::Pie);
        assert_eq!(payload.labels, vec!["x", "2"]);
        assert_eq!(payload.values, vec![1.5, 3.0]);
    }

    #[test]
    fn rejects_unknown_kind_and_missing_fields() {
        assert_eq!(
            validate_chart_data(&json!({"kind": "radar", "labels": ["a"], "values": [1]})),
            Err(ChartDataError::UnsupportedKind("radar".into()))
        );
        assert_eq!(
            validate_chart_data(&json!({"labels": ["a"], "values": [1]})),
            Err(ChartDataError::MissingField("kind"))
        );
        assert_eq!(
            validate_chart_data(&json!({"kind": "bar", "labels": "a", "values": [1]})),
            Err(ChartDataError::NotAnArray("labels"))
        );
        assert_eq!(
            validate_chart_data(&json!({"kind": "bar", "labels": [], "values": []})),
            Err(ChartDataError::Empty)
        );
        assert_eq!(validate_chart_data(&json!([1, 2])), Err(ChartDataError::NotAnObject));
    }

    #[test]
    fn rejects_non_finite_strings() {
        let err = validate_chart_data(&json!({"kind": "line", "labels": ["a"], "values": ["NaN"]}))
            .unwrap_err();
        assert!(matches!(err, ChartDataError::NonNumeric { .. }));
    }

    #[test]
    fn normalizes_chartjs_shape() {
        let raw = json!({
            "type": "line",
            "data": {
                "labels": ["Jan", "Feb"],
                "datasets": [{"label": "revenue", "data": [10, 12], "backgroundColor": ["#FF6384"]}]
            },
            "options": {"plugins": {"title": {"display": true, "text": "Query Results"}}}
        });
        let payload = validate_chart_data(&raw).unwrap();
        assert_eq!(payload.kind, ChartKind::Line);
        assert_eq!(payload.values, vec![10.0, 12.0]);
        assert_eq!(payload.series_label.as_deref(), Some("revenue"));
        assert_eq!(payload.title.as_deref(), Some("Query Results"));
    }

    #[test]
    fn dark_palette_wraps_after_ten_colors() {
        let colors = generate_colors(Theme::Dark, 12);
        assert_eq!(colors.len(), 12);
        assert_eq!(&colors[..10], &DARK_PALETTE[..]);
        assert_eq!(colors[10], DARK_PALETTE[0]);
        assert_eq!(colors[11], DARK_PALETTE[1]);
    }

    #[test]
    fn pie_gets_one_color_per_slice() {
        let payload = ChartPayload {
            kind: ChartKind::Pie,
            labels: vec!["a".into(), "b".into(), "c".into()],
            values: vec![1.0, 2.0, 3.0],
            title: None,
            series_label: None,
        };
        let ChartRendering::Chart(spec) = build_chart(&payload, Theme::Light) else {
            panic!("expected a chart");
        };
        let dataset = &spec.data.datasets[0];
        assert_eq!(dataset.background_color, LIGHT_PALETTE[..3].to_vec());
        assert_eq!(spec.options.title, DEFAULT_TITLE);
        assert_eq!(dataset.label, DEFAULT_SERIES_LABEL);
        assert_eq!(spec.options.legend_position, LegendPosition::Top);
        assert_eq!(spec.options.tooltip.mode, TooltipMode::Index);
        assert!(!spec.options.tooltip.intersect);
        assert_eq!(spec.options.animation.duration, ANIMATION_DURATION);
    }

    #[test]
    fn line_uses_single_series_color() {
        let payload = ChartPayload {
            kind: ChartKind::Line,
            labels: vec!["a".into(), "b".into()],
            values: vec![1.0, 2.0],
            title: Some("Trend".into()),
            series_label: Some("orders".into()),
        };
        let ChartRendering::Chart(spec) = build_chart(&payload, Theme::Dark) else {
            panic!("expected a chart");
        };
        assert_eq!(spec.data.datasets[0].border_color, vec![DARK_PALETTE[0]]);
        assert_eq!(spec.options.title, "Trend");
    }

    #[test]
    fn non_finite_values_fall_back_to_table() {
        let payload = ChartPayload {
            kind: ChartKind::Bar,
            labels: vec!["a".into(), "b".into()],
            values: vec![1.0, f64::NAN],
            title: None,
            series_label: None,
        };
        let ChartRendering::Table(table) = build_chart(&payload, Theme::Dark) else {
            panic!("expected table fallback");
        };
        assert_eq!(table.rows, vec![("a".into(), "1".into()), ("b".into(), "-".into())]);
    }

    #[test]
    fn easing_reaches_full_scale() {
        let anim = AnimationOptions {
            duration: ANIMATION_DURATION,
            easing: Easing::EaseOutQuart,
        };
        assert_eq!(anim.progress(Duration::ZERO), 0.0);
        assert_eq!(anim.progress(Duration::from_secs(2)), 1.0);
        let half = anim.progress(Duration::from_millis(500));
        assert!(half > 0.9 && half < 1.0);
    }

    #[test]
    fn formats_values_compactly() {
        assert_eq!(format_value(3.0), "3");
        assert_eq!(format_value(2.5), "2.50");
    }
}
