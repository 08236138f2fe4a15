//! Panel configuration as stored in the key-value database, and the tunable
//! constants of the chart.
//!
//! The database hands out one JSON document per `(group, panel)`. Keys keep
//! their database spelling (`"Log axis"`, `"Show values"`, ...). Several keys
//! are stored either as a scalar or as an array depending on how many
//! variables the panel has, so they go through [`OneOrMany`].

use serde::Deserialize;

use crate::error::{ChartError, Result};
use crate::plan::Color;

pub const DEFAULT_PALETTE: [&str; 16] = [
    "#00AAFF", "#FF9000", "#FF00A0", "#00C030", "#A0C0D0", "#D0A060", "#C04010", "#807060",
    "#F0C000", "#2090A0", "#D040D0", "#90B000", "#B0B040", "#B0B0FF", "#FFA0A0", "#A0FFA0",
];

pub const DEFAULT_TIMESPAN_BUTTONS: [&str; 7] = ["10m", "1h", "3h", "12h", "24h", "3d", "7d"];

const VARIABLES_HINT: &str = "\"Event:Tag\" or \"Event:Tag[index]\" strings";
const TIMESCALE_HINT: &str = "a duration such as \"90\", \"10m\", \"1h\" or \"7d\"";

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }
}

/// `Minimum`/`Maximum` are numbers, or the strings `"Infinity"`/`"-Infinity"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AxisBound {
    Number(f64),
    Text(String),
}

impl AxisBound {
    fn value(&self) -> Option<f64> {
        match self {
            AxisBound::Number(v) => Some(*v),
            AxisBound::Text(s) => match s.trim() {
                "Infinity" | "inf" => Some(f64::INFINITY),
                "-Infinity" | "-inf" => Some(f64::NEG_INFINITY),
                other => other.parse().ok(),
            },
        }
    }
}

/// Raw panel document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PanelConfig {
    #[serde(rename = "Timescale")]
    pub timescale: Option<String>,
    #[serde(rename = "Minimum")]
    pub minimum: Option<AxisBound>,
    #[serde(rename = "Maximum")]
    pub maximum: Option<AxisBound>,
    #[serde(rename = "Log axis", default)]
    pub log_axis: bool,
    #[serde(rename = "Variables")]
    pub variables: Option<OneOrMany<String>>,
    #[serde(rename = "Label")]
    pub label: Option<OneOrMany<String>>,
    #[serde(rename = "Colour")]
    pub colour: Option<OneOrMany<String>>,
    #[serde(rename = "Formula")]
    pub formula: Option<OneOrMany<String>>,
    #[serde(rename = "Show values", default)]
    pub show_values: bool,
    #[serde(rename = "Show fill", default = "default_true")]
    pub show_fill: bool,
    #[serde(rename = "Show run markers", default)]
    pub show_run_markers: bool,
    #[serde(rename = "Buttons")]
    pub buttons: Option<OneOrMany<String>>,
    #[serde(rename = "Zoom buttons", default)]
    pub zoom_buttons: bool,
}

fn default_true() -> bool {
    true
}

impl PanelConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ChartError::Decode(format!("panel configuration: {e}")))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ChartError::Decode(format!("panel configuration: {e}")))
    }
}

/// One plotted variable, addressed the way the history service knows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub event: String,
    pub tag: String,
    pub index: u32,
}

impl SeriesKey {
    pub fn new(event: impl Into<String>, tag: impl Into<String>, index: u32) -> Self {
        SeriesKey {
            event: event.into(),
            tag: tag.into(),
            index,
        }
    }

    /// Parses `"Event:Tag"` or `"Event:Tag[index]"`.
    pub fn parse(spec: &str) -> Result<Self> {
        let (event, rest) = spec
            .split_once(':')
            .ok_or_else(|| ChartError::config("Variables", VARIABLES_HINT))?;
        if event.is_empty() || rest.is_empty() {
            return Err(ChartError::config("Variables", VARIABLES_HINT));
        }
        match rest.split_once('[') {
            Some((tag, idx)) => {
                let index = idx
                    .trim_end_matches(']')
                    .trim()
                    .parse()
                    .map_err(|_| ChartError::config("Variables", VARIABLES_HINT))?;
                Ok(SeriesKey::new(event, tag, index))
            }
            None => Ok(SeriesKey::new(event, rest, 0)),
        }
    }

    pub fn is_run_transition(&self) -> bool {
        self.event == RUN_TRANSITIONS
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.index == 0 {
            write!(f, "{}:{}", self.event, self.tag)
        } else {
            write!(f, "{}:{}[{}]", self.event, self.tag, self.index)
        }
    }
}

pub const RUN_TRANSITIONS: &str = "Run transitions";

#[derive(Debug, Clone)]
pub struct SeriesSpec {
    pub key: SeriesKey,
    /// Legend text; falls back to the tag part of the variable name.
    pub label: String,
    pub color: Color,
    pub formula: Option<String>,
}

/// Validated panel settings.
#[derive(Debug, Clone)]
pub struct PanelSettings {
    pub group: String,
    pub panel: String,
    pub time_scale: f64,
    /// Fixed lower bound, `None` for autoscale.
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub log_axis: bool,
    pub series: Vec<SeriesSpec>,
    /// Legend rows carry the current value.
    pub show_values: bool,
    pub show_fill: bool,
    pub show_run_markers: bool,
    pub timespan_buttons: Vec<String>,
    pub show_zoom_buttons: bool,
}

impl PanelSettings {
    pub fn from_config(group: &str, panel: &str, cfg: &PanelConfig) -> Result<Self> {
        if group.is_empty() {
            return Err(ChartError::config(
                "group",
                "a non-empty history group name (data-group=\"<Group>\")",
            ));
        }
        if panel.is_empty() {
            return Err(ChartError::config(
                "panel",
                "a non-empty history panel name (data-panel=\"<Panel>\")",
            ));
        }

        let timescale = cfg
            .timescale
            .as_deref()
            .ok_or_else(|| ChartError::config("Timescale", TIMESCALE_HINT))?;
        let time_scale =
            time_to_sec(timescale).map_err(|_| ChartError::config("Timescale", TIMESCALE_HINT))?;
        if time_scale <= 0.0 {
            return Err(ChartError::config("Timescale", TIMESCALE_HINT));
        }

        let variables = cfg
            .variables
            .as_ref()
            .map(OneOrMany::to_vec)
            .unwrap_or_default();
        if variables.is_empty() {
            return Err(ChartError::config("Variables", VARIABLES_HINT));
        }

        let labels = cfg.label.as_ref().map(OneOrMany::to_vec).unwrap_or_default();
        let colours = cfg.colour.as_ref().map(OneOrMany::to_vec).unwrap_or_default();
        let formulas = cfg.formula.as_ref().map(OneOrMany::to_vec).unwrap_or_default();

        let mut series = Vec::with_capacity(variables.len());
        for (i, var) in variables.iter().enumerate() {
            let key = SeriesKey::parse(var)?;
            let label = match labels.get(i) {
                Some(l) if !l.is_empty() => l.clone(),
                _ => var[var.find(':').map_or(0, |p| p + 1)..].to_string(),
            };
            let color = colours
                .get(i)
                .and_then(|c| Color::from_hex(c))
                .or_else(|| Color::from_hex(DEFAULT_PALETTE[i % DEFAULT_PALETTE.len()]))
                .unwrap_or(Color::BLACK);
            let formula = formulas.get(i).filter(|f| !f.trim().is_empty()).cloned();
            series.push(SeriesSpec {
                key,
                label,
                color,
                formula,
            });
        }

        if cfg.show_run_markers {
            for tag in ["State", "Run number"] {
                series.push(SeriesSpec {
                    key: SeriesKey::new(RUN_TRANSITIONS, tag, 0),
                    label: tag.to_string(),
                    color: Color::GREY,
                    formula: None,
                });
            }
        }

        // equal bounds mean "autoscale both ends"
        let min = cfg.minimum.as_ref().and_then(AxisBound::value);
        let max = cfg.maximum.as_ref().and_then(AxisBound::value);
        let both_auto = min == max;
        let minimum = min.filter(|v| v.is_finite() && !both_auto);
        let maximum = max.filter(|v| v.is_finite() && !both_auto);

        let timespan_buttons = cfg
            .buttons
            .as_ref()
            .map(OneOrMany::to_vec)
            .unwrap_or_else(|| DEFAULT_TIMESPAN_BUTTONS.iter().map(|s| s.to_string()).collect());

        Ok(PanelSettings {
            group: group.to_string(),
            panel: panel.to_string(),
            time_scale,
            minimum,
            maximum,
            log_axis: cfg.log_axis,
            series,
            show_values: cfg.show_values,
            show_fill: cfg.show_fill,
            show_run_markers: cfg.show_run_markers,
            timespan_buttons,
            show_zoom_buttons: cfg.zoom_buttons,
        })
    }

    pub fn keys(&self) -> Vec<SeriesKey> {
        self.series.iter().map(|s| s.key.clone()).collect()
    }
}

/// Converts `"90"`, `"10m"`, `"3h"`, `"7d"` into seconds.
pub fn time_to_sec(text: &str) -> Result<f64> {
    let text = text.trim();
    let (number, unit) = match text.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&text[..i], Some(c.to_ascii_lowercase())),
        _ => (text, None),
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| ChartError::UserInput(format!("'{text}' is not a duration")))?;
    let factor = match unit {
        None | Some('s') => 1.0,
        Some('m') => 60.0,
        Some('h') => 3600.0,
        Some('d') => 86400.0,
        Some(u) => return Err(ChartError::UserInput(format!("unknown time unit '{u}' in '{text}'"))),
    };
    Ok(value * factor)
}

/// Tunable constants. None of these are tied to a hard requirement, so hosts
/// may override any of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChartParams {
    /// Bucket rendering kicks in once mean samples per pixel column exceeds this.
    pub aggregation_threshold: f64,
    /// Wheel zoom keeps the axis extent within this ratio of its reference extent.
    pub max_zoom_ratio: f64,
    /// Upper limit on the time span of one sample request, in seconds.
    pub max_request_span: f64,
    /// Nothing is requested before this time.
    pub history_floor: f64,
    pub poll_interval: f64,
    pub hidden_poll_interval: f64,
    pub inertia_tick: f64,
    pub inertia_decay: f64,
    /// Inertia stops below this speed, in pixels per second.
    pub inertia_stop_speed: f64,
    pub redraw_min_interval: f64,
    pub url_debounce: f64,
    pub min_zoom_box_px: f64,
    pub hit_radius_px: f64,
    /// Wheel pan per 100 wheel units, as a fraction of the window width.
    pub wheel_pan_fraction: f64,
    pub font_size: f32,
    /// Image history playback, seconds per frame.
    pub play_interval: f64,
}

impl Default for ChartParams {
    fn default() -> Self {
        ChartParams {
            aggregation_threshold: 2.0,
            max_zoom_ratio: 1000.0,
            max_request_span: 30.0 * 86400.0,
            history_floor: 0.0,
            poll_interval: 1.0,
            hidden_poll_interval: 0.5,
            inertia_tick: 0.05,
            inertia_decay: 0.85,
            inertia_stop_speed: 5.0,
            redraw_min_interval: 1.0 / 30.0,
            url_debounce: 0.5,
            min_zoom_box_px: 5.0,
            hit_radius_px: 10.0,
            wheel_pan_fraction: 0.1,
            font_size: 14.0,
            play_interval: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(time_to_sec("90").unwrap(), 90.0);
        assert_eq!(time_to_sec("10m").unwrap(), 600.0);
        assert_eq!(time_to_sec("1h").unwrap(), 3600.0);
        assert_eq!(time_to_sec("7D").unwrap(), 7.0 * 86400.0);
        assert!(matches!(time_to_sec("abc"), Err(ChartError::UserInput(_))));
        assert!(time_to_sec("5y").is_err());
    }

    #[test]
    fn series_key_syntax() {
        assert_eq!(
            SeriesKey::parse("Scaler:Rate[3]").unwrap(),
            SeriesKey::new("Scaler", "Rate", 3)
        );
        assert_eq!(
            SeriesKey::parse("Slow:Temp").unwrap(),
            SeriesKey::new("Slow", "Temp", 0)
        );
        assert!(SeriesKey::parse("NoColon").is_err());
    }

    #[test]
    fn scalar_or_array_variables() {
        let cfg = PanelConfig::from_json(
            r##"{"Timescale":"1h","Variables":"Slow:Temp","Label":"","Colour":"#FF0000",
                 "Minimum":0,"Maximum":0}"##,
        )
        .unwrap();
        let settings = PanelSettings::from_config("G", "P", &cfg).unwrap();
        assert_eq!(settings.series.len(), 1);
        assert_eq!(settings.series[0].label, "Temp");
        assert_eq!(settings.series[0].color, Color::rgb(255, 0, 0));
        assert_eq!(settings.time_scale, 3600.0);
        assert!(settings.minimum.is_none() && settings.maximum.is_none());
    }

    #[test]
    fn fixed_bounds_and_run_markers() {
        let cfg = PanelConfig::from_json(
            r#"{"Timescale":"10m","Variables":["A:x","B:y[1]"],
                 "Minimum":-5,"Maximum":"Infinity","Show run markers":true}"#,
        )
        .unwrap();
        let settings = PanelSettings::from_config("G", "P", &cfg).unwrap();
        assert_eq!(settings.minimum, Some(-5.0));
        assert_eq!(settings.maximum, None);
        assert_eq!(settings.series.len(), 4);
        assert!(settings.series[2].key.is_run_transition());
        assert_eq!(settings.timespan_buttons.len(), DEFAULT_TIMESPAN_BUTTONS.len());
    }

    #[test]
    fn missing_fields_name_the_field() {
        let cfg = PanelConfig::from_json(r#"{"Variables":"A:x"}"#).unwrap();
        match PanelSettings::from_config("G", "P", &cfg) {
            Err(ChartError::Config { field, .. }) => assert_eq!(field, "Timescale"),
            other => panic!("unexpected {other:?}"),
        }
        let cfg = PanelConfig::from_json(r#"{"Timescale":"1h"}"#).unwrap();
        match PanelSettings::from_config("G", "P", &cfg) {
            Err(ChartError::Config { field, .. }) => assert_eq!(field, "Variables"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(PanelSettings::from_config("", "P", &cfg).is_err());
    }
}
