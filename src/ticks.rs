//! Axis tick planning for value axes (linear and log) and the time axis.
//!
//! Stateless and recomputed every frame. Three nested tick sets come out of
//! every axis: `minor` ⊇ `major` ⊇ `labeled`, where each step is a whole
//! multiple of the one below it.

use chrono::{DateTime, Offset, TimeZone};

use crate::window::LOG_MIN;

/// Text metrics the tick planner needs to avoid overlapping labels.
pub trait TextMeasure {
    fn width(&self, text: &str) -> f64;
    fn height(&self) -> f64;
}

/// Fixed advance per character, good enough for digits and time labels.
#[derive(Debug, Clone, Copy)]
pub struct MonospaceEstimate {
    pub char_width: f64,
    pub height: f64,
}

impl MonospaceEstimate {
    pub fn for_font_size(size: f64) -> Self {
        MonospaceEstimate {
            char_width: size * 0.6,
            height: size,
        }
    }
}

impl TextMeasure for MonospaceEstimate {
    fn width(&self, text: &str) -> f64 {
        text.chars().count() as f64 * self.char_width
    }

    fn height(&self) -> f64 {
        self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub value: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisTicks {
    pub minor: Vec<f64>,
    pub major: Vec<f64>,
    pub labeled: Vec<Label>,
    /// Steps in axis units. On a log axis they count decades.
    pub minor_step: f64,
    pub major_step: f64,
    pub label_step: f64,
    /// Log axis only: `minor` also holds the 2..9 ticks inside each decade.
    pub sub_decades: bool,
}

/// `{1, 2, 5} × 10^k`, indexed so that consecutive indices are consecutive
/// nice steps.
fn ladder(k: i32) -> f64 {
    [1.0, 2.0, 5.0][k.rem_euclid(3) as usize] * 10f64.powi(k.div_euclid(3))
}

/// Smallest ladder index whose step is at least `min_step`.
fn ladder_index(min_step: f64) -> i32 {
    let mut k = 3 * min_step.log10().floor() as i32;
    while ladder(k) < min_step {
        k += 1;
    }
    while ladder(k - 1) >= min_step {
        k -= 1;
    }
    k
}

fn divides(a: i32, b: i32) -> bool {
    let r = ladder(b) / ladder(a);
    (r - r.round()).abs() < 1e-6
}

/// Whole multiples of `step` inside `[min, max]`.
fn multiples(min: f64, max: f64, step: f64) -> Vec<f64> {
    let first = (min / step - 1e-9).ceil() as i64;
    let last = (max / step + 1e-9).floor() as i64;
    if last < first || last - first > 100_000 {
        return Vec::new();
    }
    (first..=last).map(|i| i as f64 * step).collect()
}

/// Ticks for a value axis spanning `extent_px` pixels.
pub fn generate_ticks(min: f64, max: f64, extent_px: f64, log_axis: bool, text: &dyn TextMeasure) -> AxisTicks {
    if !(max > min) || !min.is_finite() || !max.is_finite() || !(extent_px > 0.0) {
        return AxisTicks::default();
    }
    if log_axis {
        log_ticks(min, max, extent_px, text)
    } else {
        linear_ticks(min, max, extent_px, text)
    }
}

fn linear_ticks(min: f64, max: f64, extent_px: f64, text: &dyn TextMeasure) -> AxisTicks {
    let span = max - min;
    let px = |k: i32| ladder(k) / span * extent_px;

    // minor ticks at least 6 px apart
    let mut minor = ladder_index(span / (extent_px / 6.0));
    let mut major = minor + 1;
    while !divides(minor, major) {
        major += 1;
    }
    let mut label = major;
    while px(label) < 1.5 * text.height() && ladder(label) <= span {
        label += 1;
        if label > major + 1 || !divides(major, label) {
            major = label;
        }
        while !divides(minor, major) {
            minor += 1;
        }
    }

    let (minor_step, major_step, label_step) = (ladder(minor), ladder(major), ladder(label));
    let digits = significant_digits(min, max, label_step);
    let labeled = multiples(min, max, label_step)
        .into_iter()
        .map(|value| Label {
            value,
            text: strip_zeros(&to_precision(value, digits)),
        })
        .collect();

    AxisTicks {
        minor: multiples(min, max, minor_step),
        major: multiples(min, max, major_step),
        labeled,
        minor_step,
        major_step,
        label_step,
        sub_decades: false,
    }
}

/// Digits needed to tell neighbouring labels apart, never fewer than 6.
fn significant_digits(min: f64, max: f64, label_step: f64) -> usize {
    let exp = |v: f64| v.abs().log10().floor() as i32;
    let step_exp = exp(label_step);
    let n = |v: f64| if v == 0.0 { 1 } else { exp(v) - step_exp + 1 };
    n(min).max(n(max)).max(6) as usize
}

fn log_ticks(min: f64, max: f64, extent_px: f64, text: &dyn TextMeasure) -> AxisTicks {
    let lo = min.max(LOG_MIN);
    let hi = max.max(lo * 10.0);
    let (l0, l1) = (lo.log10(), hi.log10());
    let decade_px = extent_px / (l1 - l0);
    let pos = |v: f64| (v.log10() - l0) * decade_px;

    // decades per label from the 1-2-5 ladder
    let mut k = 0;
    while ladder(k) * decade_px < 1.5 * text.height() && ladder(k) < (l1 - l0) {
        k += 1;
    }
    let label_step = ladder(k);

    let d0 = l0.floor() as i32;
    let d1 = l1.ceil() as i32;
    let in_range = |v: f64| v >= lo * (1.0 - 1e-12) && v <= hi * (1.0 + 1e-12);
    let decades: Vec<(i32, f64)> = (d0..=d1)
        .map(|d| (d, 10f64.powi(d)))
        .filter(|(_, v)| in_range(*v))
        .collect();

    let sub_decades = decade_px >= 40.0;
    let mut minor = Vec::new();
    for d in d0..=d1 {
        let base = 10f64.powi(d);
        let steps: &[f64] = if sub_decades {
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
        } else {
            &[1.0]
        };
        minor.extend(steps.iter().map(|m| m * base).filter(|v| in_range(*v)));
    }

    let step = label_step.round() as i32;
    let mut labeled: Vec<Label> = decades
        .iter()
        .filter(|(d, _)| d.rem_euclid(step.max(1)) == 0)
        .map(|&(_, value)| Label {
            value,
            text: strip_zeros(&to_precision(value, 4)),
        })
        .collect();

    if sub_decades && step == 1 {
        let gap = text.height() + 2.0;
        for m in [5.0, 2.0, 3.0, 4.0, 6.0, 7.0, 8.0, 9.0] {
            for d in d0..=d1 {
                let value = m * 10f64.powi(d);
                if !in_range(value) {
                    continue;
                }
                let p = pos(value);
                let edge = text.height() / 2.0;
                let fits = p >= edge && p <= extent_px - edge;
                if fits && labeled.iter().all(|l| (pos(l.value) - p).abs() >= gap) {
                    labeled.push(Label {
                        value,
                        text: strip_zeros(&to_precision(value, 4)),
                    });
                }
            }
        }
        labeled.sort_by(|a, b| a.value.total_cmp(&b.value));
    }

    AxisTicks {
        minor,
        major: decades.iter().map(|d| d.1).collect(),
        labeled,
        minor_step: 1.0,
        major_step: 1.0,
        label_step,
        sub_decades,
    }
}

const DAY: f64 = 86400.0;
const TIME_LADDER: [f64; 13] = [
    1.0, 5.0, 10.0, 60.0, 120.0, 300.0, 900.0, 1800.0, 3600.0, 10800.0, 21600.0, 43200.0, DAY,
];

/// Time ladder step. Past one day the step keeps doubling.
fn time_step(i: usize) -> f64 {
    match TIME_LADDER.get(i) {
        Some(s) => *s,
        None => DAY * 2f64.powi((i + 1 - TIME_LADDER.len()) as i32),
    }
}

/// Ticks for the time axis. Steps are aligned to local midnight of `tz`.
/// Labels carry the date when `t_max` is not today.
pub fn time_ticks<Tz: TimeZone>(
    t_min: f64,
    t_max: f64,
    width_px: f64,
    now: f64,
    tz: &Tz,
    text: &dyn TextMeasure,
) -> AxisTicks
where
    Tz::Offset: std::fmt::Display,
{
    if !(t_max > t_min) || !t_min.is_finite() || !t_max.is_finite() || !(width_px > 0.0) {
        return AxisTicks::default();
    }
    let span = t_max - t_min;
    let px = |step: f64| step / span * width_px;
    let force_date = needs_date(t_max, now, tz);

    // minor ticks at least 5 px apart
    let mut tick = 0;
    while px(time_step(tick)) < 5.0 && time_step(tick) < span {
        tick += 1;
    }
    let mut major = tick;
    let mut label = tick;
    loop {
        let sample = time_label(t_min, time_step(label), force_date, tz);
        if text.width(&sample) <= 0.8 * px(time_step(label)) || time_step(label) > 4.0 * span {
            break;
        }
        label += 1;
        if label > major + 1 {
            major += 1;
        }
        if major > tick + 1 {
            tick += 1;
        }
    }
    // 2 min does not divide 5 min
    while major < label && !divides_f64(time_step(major), time_step(label)) {
        major += 1;
    }
    while tick < major && !divides_f64(time_step(tick), time_step(major)) {
        tick += 1;
    }

    let offset = local_offset(t_min, tz);
    let aligned = |step: f64| -> Vec<f64> {
        multiples(t_min + offset, t_max + offset, step)
            .into_iter()
            .map(|t| t - offset)
            .collect()
    };
    let label_step = time_step(label);
    let labeled = aligned(label_step)
        .into_iter()
        .map(|value| Label {
            value,
            text: time_label(value, label_step, force_date, tz),
        })
        .collect();

    AxisTicks {
        minor: aligned(time_step(tick)),
        major: aligned(time_step(major)),
        labeled,
        minor_step: time_step(tick),
        major_step: time_step(major),
        label_step,
        sub_decades: false,
    }
}

fn divides_f64(step: f64, outer: f64) -> bool {
    let r = outer / step;
    (r - r.round()).abs() < 1e-9
}

fn local_offset<Tz: TimeZone>(t: f64, tz: &Tz) -> f64 {
    to_datetime(t, tz).map_or(0.0, |d| d.offset().fix().local_minus_utc() as f64)
}

fn to_datetime<Tz: TimeZone>(t: f64, tz: &Tz) -> Option<DateTime<Tz>> {
    let secs = t.floor();
    let nanos = ((t - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999)).map(|d| d.with_timezone(tz))
}

/// True when `t_max` lies on another calendar day than `now`, or more than a
/// day back.
pub fn needs_date<Tz: TimeZone>(t_max: f64, now: f64, tz: &Tz) -> bool {
    match (to_datetime(t_max, tz), to_datetime(now, tz)) {
        (Some(a), Some(b)) => a.date_naive() != b.date_naive() || now - t_max > DAY,
        _ => true,
    }
}

/// Label text for a tick at `t` on an axis whose label step is `step`.
pub fn time_label<Tz: TimeZone>(t: f64, step: f64, force_date: bool, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let Some(d) = to_datetime(t, tz) else {
        return format!("{t}");
    };
    let fmt = if force_date {
        if step < 60.0 {
            "%d %b %y %H:%M:%S"
        } else if step < DAY {
            "%d %b %y %H:%M"
        } else {
            "%d %b %y"
        }
    } else if step < 60.0 {
        "%H:%M:%S"
    } else if step < 3.0 * 3600.0 {
        "%H:%M"
    } else if step < DAY {
        "%d %b %y %H:%M"
    } else {
        "%d %b %y"
    };
    d.format(fmt).to_string()
}

/// Full date and time, used by the hover tooltip and the legend.
pub fn full_time<Tz: TimeZone>(t: f64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match to_datetime(t, tz) {
        Some(d) => d.format("%d %b %y %H:%M:%S").to_string(),
        None => format!("{t}"),
    }
}

/// `Number.prototype.toPrecision`: `digits` significant digits, switching to
/// exponent form for very small or very large magnitudes.
pub fn to_precision(v: f64, digits: usize) -> String {
    let digits = digits.clamp(1, 100);
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let sci = format!("{:.*e}", digits - 1, v);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if exp < -6 || exp >= digits as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{}", exp.abs())
    } else {
        format!("{:.*}", (digits as i32 - 1 - exp).max(0) as usize, v)
    }
}

/// Drops trailing zeros of the fraction (and a bare decimal point), keeping
/// any exponent.
pub fn strip_zeros(s: &str) -> String {
    let s = s.trim();
    if !s.contains('.') {
        return s.to_string();
    }
    let (num, exp) = match s.find('e') {
        Some(i) => s.split_at(i),
        None => (s, ""),
    };
    let num = num.trim_end_matches('0').trim_end_matches('.');
    format!("{num}{exp}")
}

/// Significant digits for legend values so that the visible range still
/// resolves.
pub fn legend_precision(y_min: f64, y_max: f64) -> usize {
    let rel = (1.0 - y_max / y_min).abs();
    let n = if rel.is_finite() && rel > 0.0 {
        (-rel.log10()).ceil() as i64 + 3
    } else {
        0
    };
    n.clamp(5, 17) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    const TEXT: MonospaceEstimate = MonospaceEstimate {
        char_width: 7.0,
        height: 12.0,
    };

    fn evenly_spaced(v: &[f64], step: f64) -> bool {
        v.windows(2).all(|w| ((w[1] - w[0]) - step).abs() < step * 1e-9)
    }

    fn is_multiple(a: f64, b: f64) -> bool {
        let r = a / b;
        (r - r.round()).abs() < 1e-6
    }

    #[test]
    fn linear_steps_nest() {
        for &(min, max, px) in &[
            (0.0, 1.0, 400.0),
            (-3.7, 12.2, 250.0),
            (1e-6, 3e-6, 90.0),
            (1000.0, 1000.5, 600.0),
            (-1e9, 1e9, 30.0),
        ] {
            let t = generate_ticks(min, max, px, false, &TEXT);
            assert!(t.minor_step <= t.major_step && t.major_step <= t.label_step, "{min}..{max}");
            assert!(is_multiple(t.major_step, t.minor_step));
            assert!(is_multiple(t.label_step, t.major_step));
            assert!(evenly_spaced(&t.minor, t.minor_step));
            assert!(evenly_spaced(&t.major, t.major_step));
            let labels: Vec<f64> = t.labeled.iter().map(|l| l.value).collect();
            assert!(evenly_spaced(&labels, t.label_step));
            assert!(t.minor_step / (max - min) * px >= 6.0 - 1e-9);
        }
    }

    #[test]
    fn labels_do_not_crowd() {
        let t = generate_ticks(0.0, 100.0, 100.0, false, &TEXT);
        assert!(t.label_step / 100.0 * 100.0 >= 1.5 * 12.0);
        assert_eq!(t.labeled[0].text, "0");
        assert!(t.labeled.iter().any(|l| l.text == "20"));
    }

    #[test]
    fn label_text_is_clean() {
        let t = generate_ticks(0.0, 1.0, 500.0, false, &TEXT);
        let texts: Vec<&str> = t.labeled.iter().map(|l| l.text.as_str()).collect();
        assert!(texts.contains(&"0.3"), "{texts:?}");
    }

    #[test]
    fn degenerate_range() {
        assert_eq!(generate_ticks(1.0, 1.0, 100.0, false, &TEXT), AxisTicks::default());
        assert_eq!(generate_ticks(0.0, f64::NAN, 100.0, false, &TEXT), AxisTicks::default());
    }

    #[test]
    fn log_axis_per_decade() {
        let t = generate_ticks(1e-3, 1e3, 600.0, true, &TEXT);
        assert_eq!(t.major.len(), 7);
        assert!(t.sub_decades);
        assert!(t.labeled.iter().any(|l| l.text == "1e-3" || l.text == "0.001"));
        assert!(t.labeled.iter().any(|l| l.text == "1000"));
        let mut pos: Vec<f64> = t.labeled.iter().map(|l| (l.value.log10() + 3.0) * 100.0).collect();
        pos.sort_by(f64::total_cmp);
        assert!(pos.windows(2).all(|w| w[1] - w[0] >= 12.0));
    }

    #[test]
    fn log_axis_thins_decade_labels() {
        let t = generate_ticks(1e-20, 1e20, 100.0, true, &TEXT);
        assert!(t.label_step > 1.0);
        assert!(!t.sub_decades);
        assert!(t.labeled.len() < t.major.len());
    }

    #[test]
    fn time_axis_aligned_and_nested() {
        // 2024-03-01 00:00:00 UTC
        let t0 = 1_709_251_200.0;
        let t = time_ticks(t0, t0 + 3600.0, 600.0, t0 + 3600.0, &Utc, &TEXT);
        assert!(t.minor_step <= t.major_step && t.major_step <= t.label_step);
        assert!(is_multiple(t.label_step, t.major_step));
        assert!(is_multiple(t.major_step, t.minor_step));
        assert!(t.minor_step / 3600.0 * 600.0 >= 5.0);
        for l in &t.labeled {
            assert!(is_multiple(l.value, t.label_step));
            assert!(TEXT.width(&l.text) <= 0.8 * t.label_step / 3600.0 * 600.0);
        }
        assert_eq!(t.labeled[0].text, "00:00");
    }

    #[test]
    fn minute_scale_spans_label_every_two_or_five_minutes() {
        let t0 = 1_709_251_200.0;
        let t = time_ticks(t0, t0 + 900.0, 600.0, t0 + 900.0, &Utc, &TEXT);
        assert_eq!((t.minor_step, t.major_step, t.label_step), (10.0, 60.0, 120.0));
        assert_eq!(t.labeled[1].text, "00:02");

        let t = time_ticks(t0, t0 + 1800.0, 600.0, t0 + 1800.0, &Utc, &TEXT);
        assert_eq!(t.label_step, 300.0);
        assert!(is_multiple(t.label_step, t.major_step));
        assert!(is_multiple(t.major_step, t.minor_step));
        assert_eq!(t.labeled.len(), 7);
    }

    #[test]
    fn time_axis_uses_local_midnight() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        // 2024-03-01 00:00 local = 2024-02-29 23:00 UTC
        let t0 = 1_709_251_200.0 - 3600.0;
        let t = time_ticks(t0 - 86400.0 * 3.0, t0 + 86400.0 * 3.0, 400.0, t0, &tz, &TEXT);
        assert!(t.label_step >= DAY);
        assert!(t.labeled.iter().all(|l| is_multiple(l.value + 3600.0, DAY)));
    }

    #[test]
    fn date_forced_for_past_days() {
        let now = 1_709_251_200.0 + 12.0 * 3600.0;
        assert!(!needs_date(now - 3600.0, now, &Utc));
        assert!(needs_date(now - 13.0 * 3600.0, now, &Utc));
        assert_eq!(time_label(now, 30.0, true, &Utc), "01 Mar 24 12:00:00");
        assert_eq!(time_label(now, 30.0, false, &Utc), "12:00:00");
        assert_eq!(time_label(now, 7200.0, false, &Utc), "12:00");
        assert_eq!(time_label(now, 2.0 * DAY, false, &Utc), "01 Mar 24");
    }

    #[test]
    fn precision_formatting() {
        assert_eq!(to_precision(1.5, 6), "1.50000");
        assert_eq!(to_precision(0.0, 3), "0.00");
        assert_eq!(to_precision(1234567.0, 3), "1.23e+6");
        assert_eq!(to_precision(0.000000123, 2), "1.2e-7");
        assert_eq!(to_precision(9.99999, 3), "10.0");
        assert_eq!(strip_zeros("1.50000"), "1.5");
        assert_eq!(strip_zeros("2.000e+6"), "2e+6");
        assert_eq!(strip_zeros("100"), "100");
        assert_eq!(legend_precision(100.0, 100.001), 8);
        assert_eq!(legend_precision(0.0, 1.0), 5);
    }
}
