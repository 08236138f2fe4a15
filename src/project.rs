//! Sample → screen projection and per-pixel-column aggregation.
//!
//! With tens of thousands of samples in a few hundred pixels a polyline is
//! mostly overdraw. Samples sharing a pixel column are folded into a
//! [`Bucket`] and drawn as one vertical min/max stroke plus a connector from
//! the previous column, which looks identical and costs one segment per
//! column.

use crate::dataset::{Sample, SampleStore, Series};
use crate::window::Window;

/// Visible part of one series in plot-local pixels. `x`, `y`, `t`, `v` are
/// parallel; `x` is non-decreasing and inside `[0, width]`. The nearest
/// samples just outside the window are kept apart in `lead` and `trail` so
/// lines can run to the plot edge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenPoints {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub t: Vec<f64>,
    pub v: Vec<f64>,
    pub lead: Option<[f64; 2]>,
    pub trail: Option<[f64; 2]>,
}

impl ScreenPoints {
    pub fn len(&self) -> usize { self.x.len() }
    pub fn is_empty(&self) -> bool { self.x.is_empty() }

    /// Lead, visible points and trail, in drawing order.
    pub fn polyline(&self) -> Vec<[f64; 2]> {
        let mut out = Vec::with_capacity(self.x.len() + 2);
        out.extend(self.lead);
        out.extend(self.x.iter().zip(&self.y).map(|(&x, &y)| [x, y]));
        out.extend(self.trail);
        out
    }
}

/// Samples that fell into one pixel column. Values are in data space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub column: i64,
    pub n: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub first: f64,
    pub last: f64,
}

fn project_sample(s: &Sample, window: &Window, w: f64, h: f64) -> Option<[f64; 2]> {
    s.v.is_finite().then(|| [window.t_to_x(s.t, w), window.v_to_y(s.v, h)])
}

pub fn project(series: &Series, window: &Window, width: f64, height: f64) -> ScreenPoints {
    let r = series.range(window.t_min, window.t_max);
    let mut out = ScreenPoints {
        x: Vec::with_capacity(r.len()),
        y: Vec::with_capacity(r.len()),
        t: Vec::with_capacity(r.len()),
        v: Vec::with_capacity(r.len()),
        ..Default::default()
    };
    let samples = series.samples();
    for s in samples.range(r.clone()) {
        if let Some([x, y]) = project_sample(s, window, width, height) {
            out.x.push(x.clamp(0.0, width));
            out.y.push(y);
            out.t.push(s.t);
            out.v.push(s.v);
        }
    }
    out.lead = r
        .start
        .checked_sub(1)
        .and_then(|i| samples.get(i))
        .and_then(|s| project_sample(s, window, width, height));
    out.trail = samples
        .get(r.end)
        .and_then(|s| project_sample(s, window, width, height));
    out
}

/// Folds runs of samples with the same `floor(x)` into buckets.
pub fn aggregate(points: &ScreenPoints) -> Vec<Bucket> {
    let mut out: Vec<Bucket> = Vec::new();
    for (&x, &v) in points.x.iter().zip(&points.v) {
        let column = x.floor() as i64;
        match out.last_mut() {
            Some(b) if b.column == column => {
                b.n += 1;
                b.min = b.min.min(v);
                b.max = b.max.max(v);
                b.avg += (v - b.avg) / b.n as f64;
                b.last = v;
            }
            _ => out.push(Bucket {
                column,
                n: 1,
                min: v,
                max: v,
                avg: v,
                first: v,
                last: v,
            }),
        }
    }
    out
}

/// Projection of one series plus its buckets, if bucket rendering applies.
#[derive(Debug, Clone, Default)]
pub struct SeriesProjection {
    pub points: ScreenPoints,
    pub buckets: Vec<Bucket>,
    pub bucket_mode: bool,
}

impl SeriesProjection {
    pub fn build(series: &Series, window: &Window, width: f64, height: f64, threshold: f64) -> Self {
        let points = project(series, window, width, height);
        if series.key().is_run_transition() {
            return SeriesProjection {
                points,
                ..Default::default()
            };
        }
        let buckets = aggregate(&points);
        let mean = if buckets.is_empty() {
            0.0
        } else {
            points.len() as f64 / buckets.len() as f64
        };
        SeriesProjection {
            points,
            buckets,
            bucket_mode: mean > threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CacheKey {
    t_min: f64,
    t_max: f64,
    y_range: (f64, f64),
    log_axis: bool,
    width: f64,
    height: f64,
    revision: u64,
    series: usize,
}

/// Recomputes projections only when the window, the viewport or the sample
/// store changed since the previous frame.
#[derive(Default)]
pub struct ProjectionCache {
    key: Option<CacheKey>,
    series: Vec<SeriesProjection>,
    rebuilds: u64,
}

impl ProjectionCache {
    pub fn get(
        &mut self,
        store: &SampleStore,
        window: &Window,
        width: f64,
        height: f64,
        threshold: f64,
    ) -> &[SeriesProjection] {
        let key = CacheKey {
            t_min: window.t_min,
            t_max: window.t_max,
            y_range: window.y_range(),
            log_axis: window.log_axis,
            width,
            height,
            revision: store.revision(),
            series: store.len(),
        };
        if self.key != Some(key) {
            self.series = store
                .iter()
                .map(|s| SeriesProjection::build(s, window, width, height, threshold))
                .collect();
            self.key = Some(key);
            self.rebuilds += 1;
        }
        &self.series
    }

    /// Last computed projections, without checking for staleness.
    pub fn current(&self) -> &[SeriesProjection] {
        &self.series
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PanelSettings, SeriesKey, SeriesSpec};
    use crate::plan::Color;

    fn settings() -> PanelSettings {
        PanelSettings {
            group: "G".into(),
            panel: "P".into(),
            time_scale: 20.0,
            minimum: None,
            maximum: None,
            log_axis: false,
            series: vec![SeriesSpec {
                key: SeriesKey::new("E", "T", 0),
                label: "T".into(),
                color: Color::BLACK,
                formula: None,
            }],
            show_values: true,
            show_fill: true,
            show_run_markers: false,
            timespan_buttons: vec![],
            show_zoom_buttons: false,
        }
    }

    fn store(samples: Vec<Sample>) -> SampleStore {
        let s = settings();
        let mut store = SampleStore::new(&s.series).unwrap();
        store.merge(&[samples]);
        store
    }

    #[test]
    fn three_samples_over_two_hundred_pixels() {
        let store = store(vec![Sample::new(0.0, 1.0), Sample::new(10.0, 2.0), Sample::new(20.0, 3.0)]);
        let mut w = Window::new(&settings(), 20.0);
        w.autoscale(&store);
        let p = SeriesProjection::build(store.get(0).unwrap(), &w, 200.0, 100.0, 2.0);
        assert_eq!(p.points.x, vec![0.0, 100.0, 200.0]);
        assert!(!p.bucket_mode);
        assert!(p.points.lead.is_none() && p.points.trail.is_none());
    }

    #[test]
    fn edge_samples_are_kept_outside() {
        let samples = (0..10).map(|i| Sample::new(i as f64 * 10.0, i as f64)).collect();
        let store = store(samples);
        let mut w = Window::new(&settings(), 55.0);
        w.t_min = 25.0;
        let p = project(store.get(0).unwrap(), &w, 300.0, 100.0);
        assert_eq!(p.t, vec![30.0, 40.0, 50.0]);
        assert!(p.x.iter().all(|&x| (0.0..=300.0).contains(&x)));
        assert!(p.lead.unwrap()[0] < 0.0);
        assert!(p.trail.unwrap()[0] > 300.0);
        assert_eq!(p.polyline().len(), 5);
    }

    #[test]
    fn dense_data_switches_to_buckets() {
        let samples = (0..10_000)
            .map(|i| Sample::new(i as f64 / 100.0, ((i * 7919) % 101) as f64))
            .collect();
        let store = store(samples);
        let mut w = Window::new(&settings(), 99.99);
        w.t_min = 0.0;
        w.autoscale(&store);
        let p = SeriesProjection::build(store.get(0).unwrap(), &w, 100.0, 100.0, 2.0);
        assert!(p.bucket_mode);
        assert!((99..=101).contains(&p.buckets.len()));
        for b in &p.buckets {
            assert!(b.min <= b.avg && b.avg <= b.max);
        }
        assert!(p.buckets.windows(2).all(|w| w[0].column < w[1].column));
        assert_eq!(p.buckets.iter().map(|b| b.n).sum::<usize>(), 10_000);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let samples = (0..500).map(|i| Sample::new(i as f64, (i % 13) as f64)).collect();
        let store = store(samples);
        let mut w = Window::new(&settings(), 499.0);
        w.t_min = 0.0;
        let p = project(store.get(0).unwrap(), &w, 50.0, 40.0);
        assert_eq!(aggregate(&p), aggregate(&p));
    }

    #[test]
    fn cache_rebuilds_only_on_change() {
        let mut st = store(vec![Sample::new(5.0, 1.0)]);
        let w = Window::new(&settings(), 20.0);
        let mut cache = ProjectionCache::default();
        cache.get(&st, &w, 100.0, 50.0, 2.0);
        cache.get(&st, &w, 100.0, 50.0, 2.0);
        assert_eq!(cache.rebuilds(), 1);
        st.merge(&[vec![Sample::new(6.0, 2.0)]]);
        assert_eq!(cache.get(&st, &w, 100.0, 50.0, 2.0)[0].points.len(), 2);
        assert_eq!(cache.rebuilds(), 2);
        cache.get(&st, &w, 120.0, 50.0, 2.0);
        assert_eq!(cache.rebuilds(), 3);
    }
}
