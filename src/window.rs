//! The visible window of a history panel and its scale transforms.
//!
//! All pixel coordinates here are local to the plot area: `x = 0` is the
//! left edge at `t_min`, `y = 0` is the top edge at `y_max`.

use crate::config::PanelSettings;
use crate::dataset::SampleStore;

/// Lower bound substituted for a non-positive minimum on a log axis.
pub const LOG_MIN: f64 = 1e-20;
/// Upper bound substituted for a non-positive maximum on a log axis.
pub const LOG_MAX: f64 = 1e-18;

#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub t_min: f64,
    pub t_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    /// Unpadded data range (autoscale) or the configured bounds.
    pub y_min0: f64,
    pub y_max0: f64,
    pub log_axis: bool,
    pub autoscale_min: bool,
    pub autoscale_max: bool,
    /// Set once the user zoomed or panned the value axis; autoscale then
    /// leaves `y_min`/`y_max` alone.
    pub y_zoomed: bool,
    /// Live mode: `t_max` tracks the current time.
    pub follow_now: bool,
}

impl Window {
    pub fn new(settings: &PanelSettings, now: f64) -> Self {
        let y_min0 = settings.minimum.unwrap_or(-0.5);
        let y_max0 = settings.maximum.unwrap_or(0.5);
        let mut w = Window {
            t_min: now - settings.time_scale,
            t_max: now,
            y_min: y_min0,
            y_max: y_max0,
            y_min0,
            y_max0,
            log_axis: settings.log_axis,
            autoscale_min: settings.minimum.is_none(),
            autoscale_max: settings.maximum.is_none(),
            y_zoomed: false,
            follow_now: true,
        };
        w.clamp_log();
        w
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.t_max - self.t_min
    }

    /// Value range with the log clamp applied.
    pub fn y_range(&self) -> (f64, f64) {
        if self.log_axis {
            (
                if self.y_min <= 0.0 { LOG_MIN } else { self.y_min },
                if self.y_max <= 0.0 { LOG_MAX } else { self.y_max },
            )
        } else {
            (self.y_min, self.y_max)
        }
    }

    fn clamp_log(&mut self) {
        let (lo, hi) = self.y_range();
        self.y_min = lo;
        self.y_max = hi;
    }

    #[inline]
    pub fn t_to_x(&self, t: f64, width_px: f64) -> f64 {
        (t - self.t_min) / (self.t_max - self.t_min) * width_px
    }

    #[inline]
    pub fn x_to_t(&self, x: f64, width_px: f64) -> f64 {
        x / width_px * (self.t_max - self.t_min) + self.t_min
    }

    pub fn v_to_y(&self, v: f64, height_px: f64) -> f64 {
        let (lo, hi) = self.y_range();
        if self.log_axis {
            let v = if v <= 0.0 { LOG_MIN } else { v };
            height_px - (v.log10() - lo.log10()) / (hi.log10() - lo.log10()) * height_px
        } else {
            height_px - (v - lo) / (hi - lo) * height_px
        }
    }

    pub fn y_to_v(&self, y: f64, height_px: f64) -> f64 {
        let (lo, hi) = self.y_range();
        let f = (height_px - y) / height_px;
        if self.log_axis {
            10f64.powf(lo.log10() + f * (hi.log10() - lo.log10()))
        } else {
            lo + f * (hi - lo)
        }
    }

    /// Recomputes the value range from the samples inside the window.
    ///
    /// Run-transition pseudo series never take part. Empty data gives
    /// `[-0.5, 0.5]`, a flat line is widened by 0.5 each way, and autoscaled
    /// ends get a 10% margin. A result that is not finite is discarded and the
    /// previous bounds are kept.
    pub fn autoscale(&mut self, store: &SampleStore) {
        if !self.autoscale_min && !self.autoscale_max {
            self.y_min = self.y_min0;
            self.y_max = self.y_max0;
            self.clamp_log();
            return;
        }

        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for series in store.iter().filter(|s| !s.key().is_run_transition()) {
            let r = series.range(self.t_min, self.t_max);
            for s in series.samples().range(r) {
                if !s.v.is_finite() || (self.log_axis && s.v <= 0.0) {
                    continue;
                }
                lo = lo.min(s.v);
                hi = hi.max(s.v);
            }
        }

        let (mut min0, mut max0) = if lo > hi { (-0.5, 0.5) } else { (lo, hi) };
        if !self.autoscale_min {
            min0 = self.y_min0;
        }
        if !self.autoscale_max {
            max0 = self.y_max0;
        }
        if min0 == max0 {
            min0 -= 0.5;
            max0 += 0.5;
        }
        if !min0.is_finite() || !max0.is_finite() {
            log::warn!("autoscale produced [{min0}, {max0}], keeping previous bounds");
            return;
        }
        self.y_min0 = min0;
        self.y_max0 = max0;

        if !self.y_zoomed {
            let pad = (max0 - min0) / 10.0;
            self.y_min = if self.autoscale_min { min0 - pad } else { min0 };
            self.y_max = if self.autoscale_max { max0 + pad } else { max0 };
        }
        self.clamp_log();
    }

    /// Scales the time extent by `factor` around `anchor`. While following
    /// live data only `t_min` moves. Rejected (returns `false`) under the
    /// rules of [`zoom_extent`].
    pub fn zoom_time(&mut self, anchor: f64, factor: f64, reference: f64, max_ratio: f64, now: f64) -> bool {
        let anchor = if self.follow_now { self.t_max } else { anchor };
        match zoom_extent((self.t_min, self.t_max), anchor, factor, reference, max_ratio, now) {
            Some((t_min, t_max)) => {
                self.t_min = t_min;
                self.t_max = t_max;
                true
            }
            None => false,
        }
    }

    /// Scales the value extent by `factor` around `anchor`, in log space on a
    /// log axis. The reference extent is the unpadded data range.
    pub fn zoom_value(&mut self, anchor: f64, factor: f64, max_ratio: f64) -> bool {
        if !(factor.is_finite() && factor > 0.0) {
            return false;
        }
        let (lo, hi) = self.y_range();
        let (y_min, y_max, extent, reference) = if self.log_axis {
            let a = anchor.max(LOG_MIN).log10();
            let (l, h) = (lo.log10(), hi.log10());
            let nl = a - (a - l) * factor;
            let nh = a + (h - a) * factor;
            let (r0, r1) = (self.y_min0.max(LOG_MIN).log10(), self.y_max0.max(LOG_MIN).log10());
            (10f64.powf(nl), 10f64.powf(nh), nh - nl, r1 - r0)
        } else {
            let nl = anchor - (anchor - lo) * factor;
            let nh = anchor + (hi - anchor) * factor;
            (nl, nh, nh - nl, self.y_max0 - self.y_min0)
        };
        if !(extent > 0.0) || !y_min.is_finite() || !y_max.is_finite() {
            return false;
        }
        if reference > 0.0 && !within_ratio(extent, reference, max_ratio) {
            return false;
        }
        self.y_min = y_min;
        self.y_max = y_max;
        self.y_zoomed = true;
        true
    }

    pub fn pan_time(&mut self, dt: f64) {
        if dt != 0.0 {
            self.t_min += dt;
            self.t_max += dt;
            self.follow_now = false;
        }
    }

    /// Pans by `dt` but never moves `t_max` past `now`. Returns whether the
    /// window moved.
    pub fn pan_time_until(&mut self, dt: f64, now: f64) -> bool {
        let dt = pan_until(self.t_max, dt, now);
        if dt == 0.0 {
            return false;
        }
        self.pan_time(dt);
        true
    }

    /// Shifts the value range by a fraction of its height.
    pub fn pan_value(&mut self, fraction: f64) {
        let (lo, hi) = self.y_range();
        if self.log_axis {
            let d = (hi.log10() - lo.log10()) * fraction;
            self.y_min = 10f64.powf(lo.log10() + d);
            self.y_max = 10f64.powf(hi.log10() + d);
        } else {
            let d = (hi - lo) * fraction;
            self.y_min = lo + d;
            self.y_max = hi + d;
        }
        self.y_zoomed = true;
    }

    /// Sets an explicit time range and leaves live mode.
    pub fn set_time_range(&mut self, t0: f64, t1: f64) {
        let (t0, t1) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
        self.t_min = t0;
        self.t_max = if t1 - t0 < 1.0 { t0 + 1.0 } else { t1 };
        self.follow_now = false;
    }

    pub fn set_value_range(&mut self, v0: f64, v1: f64) {
        let (v0, v1) = if v0 <= v1 { (v0, v1) } else { (v1, v0) };
        if v1 > v0 && v0.is_finite() && v1.is_finite() {
            self.y_min = v0;
            self.y_max = v1;
            self.y_zoomed = true;
            self.clamp_log();
        }
    }

    /// Keeps the width and moves `t_max` to `now`.
    pub fn scroll_to(&mut self, now: f64) {
        let w = self.width();
        self.t_max = now;
        self.t_min = now - w;
    }

    /// Back to live mode over `time_scale` with autoscaled values.
    pub fn reset(&mut self, time_scale: f64, now: f64, store: &SampleStore) {
        self.t_max = now;
        self.t_min = now - time_scale;
        self.follow_now = true;
        self.y_zoomed = false;
        self.autoscale(store);
    }
}

/// `[t_min, t_max]` scaled by `factor` around `anchor`, or `None` if the
/// result is empty, more than `max_ratio` away from `reference`, or would
/// push `t_max` further into the future than it already is.
pub fn zoom_extent(
    (t_min, t_max): (f64, f64),
    anchor: f64,
    factor: f64,
    reference: f64,
    max_ratio: f64,
    now: f64,
) -> Option<(f64, f64)> {
    if !(factor.is_finite() && factor > 0.0) {
        return None;
    }
    let lo = anchor - (anchor - t_min) * factor;
    let hi = anchor + (t_max - anchor) * factor;
    let extent = hi - lo;
    if !(extent > 0.0) || !within_ratio(extent, reference, max_ratio) {
        return None;
    }
    if hi > now && hi > t_max {
        return None;
    }
    Some((lo, hi))
}

/// The part of a time pan `dt` that keeps `t_max` at or before `now`. A
/// forward pan is shortened to end at `now`; backward pans are untouched.
pub fn pan_until(t_max: f64, dt: f64, now: f64) -> f64 {
    let dt = if dt > 0.0 { dt.min((now - t_max).max(0.0)) } else { dt };
    if dt.is_finite() { dt } else { 0.0 }
}

fn within_ratio(extent: f64, reference: f64, max_ratio: f64) -> bool {
    if !(reference > 0.0) {
        return true;
    }
    extent / reference < max_ratio && reference / extent < max_ratio
}
