//! Pointer, wheel and keyboard handling for one panel.
//!
//! Input is given in canvas pixels with a wall-clock time in seconds. The
//! controller moves the [`Window`] directly and reports what else has to
//! happen (redraw, data loading, commands that need the rest of the panel)
//! in a [`Response`].

use crate::config::ChartParams;
use crate::dataset::SampleStore;
use crate::hit;
use crate::plan::Layout;
use crate::project::SeriesProjection;
use crate::window::{Window, LOG_MIN};

/// Press-to-release time below which a press counts as a click.
const QUICK_CLICK: f64 = 0.2;
/// Two clicks closer than this make a double click.
const DOUBLE_CLICK: f64 = 0.5;
/// Drag velocity older than this is not carried into inertia.
const INERTIA_WINDOW: f64 = 0.1;

/// Corner button bar, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Legend,
    ResetAxes,
    JumpToNow,
    Timespan,
    Download,
    Help,
}

pub const BUTTONS: [Button; 6] = [
    Button::Legend,
    Button::ResetAxes,
    Button::JumpToNow,
    Button::Timespan,
    Button::Download,
    Button::Help,
];

impl Button {
    pub fn glyph(self) -> &'static str {
        match self {
            Button::Legend => "L",
            Button::ResetAxes => "R",
            Button::JumpToNow => ">",
            Button::Timespan => "T",
            Button::Download => "D",
            Button::Help => "?",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Button::Legend => "Show / hide legend",
            Button::ResetAxes => "Reset histogram axes",
            Button::JumpToNow => "Jump to current time",
            Button::Timespan => "Select timespan...",
            Button::Download => "Download image/data...",
            Button::Help => "Show help",
        }
    }

    pub fn is_play(self) -> bool {
        self == Button::JumpToNow
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomIcon {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionState {
    Idle,
    Dragging { start: (f64, f64), origin: Window },
    /// Zoom box on the time ruler, canvas x of both edges.
    ZoomBoxX { x1: f64, x2: f64 },
    /// Zoom box on the value ruler, canvas y of both edges.
    ZoomBoxY { y1: f64, y2: f64 },
    MarkerActive { series: usize, index: usize },
}

/// Things only the panel can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    Button(Button),
    FollowNow,
    ResetAxes,
    /// Drop manual value zoom and autoscale again.
    RevertAutoscale,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Response {
    pub redraw: bool,
    /// The window moved; time range may need loading and values rescaling.
    pub view_changed: bool,
    /// Inertia timer should start ticking.
    pub start_inertia: bool,
    pub actions: Vec<UiAction>,
}

impl Response {
    fn redraw() -> Self {
        Response {
            redraw: true,
            ..Default::default()
        }
    }

    fn moved() -> Self {
        Response {
            redraw: true,
            view_changed: true,
            ..Default::default()
        }
    }

    fn action(a: UiAction) -> Self {
        Response {
            actions: vec![a],
            ..Default::default()
        }
    }
}

/// What the controller looks at besides the window.
pub struct InputContext<'a> {
    pub layout: &'a Layout,
    pub store: &'a SampleStore,
    /// Same order as the store, built for the layout's plot size.
    pub projections: &'a [SeriesProjection],
    /// Reference extent for the time zoom guard.
    pub time_scale: f64,
    pub params: &'a ChartParams,
}

#[derive(Debug, Clone)]
pub struct Interaction {
    pub state: InteractionState,
    pub solo: Option<usize>,
    pub show_legend: bool,
    /// Inertia, in seconds of axis time per second of wall time.
    velocity: f64,
    last_move: Option<(f64, f64)>,
    pressed_at: Option<f64>,
    last_quick_click: f64,
}

impl Default for Interaction {
    fn default() -> Self {
        Interaction {
            state: InteractionState::Idle,
            solo: None,
            show_legend: true,
            velocity: 0.0,
            last_move: None,
            pressed_at: None,
            last_quick_click: f64::NEG_INFINITY,
        }
    }
}

impl Interaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, InteractionState::Dragging { .. })
    }

    pub fn inertia_active(&self) -> bool {
        self.velocity != 0.0
    }

    pub fn stop_inertia(&mut self) {
        self.velocity = 0.0;
    }

    pub fn toggle_legend(&mut self) {
        self.show_legend = !self.show_legend;
    }

    pub fn toggle_solo(&mut self, series: usize) {
        self.solo = if self.solo == Some(series) { None } else { Some(series) };
    }

    /// Drops a hover marker, for example after the window moved under it.
    pub fn clear_marker(&mut self) {
        if matches!(self.state, InteractionState::MarkerActive { .. }) {
            self.state = InteractionState::Idle;
        }
    }

    fn eligible<'a>(&'a self, store: &'a SampleStore) -> impl Fn(usize) -> bool + 'a {
        move |i| {
            self.solo.map_or(true, |s| s == i)
                && store.get(i).is_some_and(|s| !s.key().is_run_transition())
        }
    }

    pub fn pointer_down(&mut self, x: f64, y: f64, now: f64, window: &mut Window, cx: &InputContext<'_>) -> Response {
        self.stop_inertia();
        let l = cx.layout;

        if let Some(k) = l.button_at(x, y) {
            self.state = InteractionState::Idle;
            return Response::action(UiAction::Button(BUTTONS[k]));
        }
        if let Some(icon) = l.zoom_icon_at(x, y) {
            zoom_icon(window, icon);
            self.clear_marker();
            return Response::moved();
        }

        if l.in_time_ruler(x, y) {
            self.state = InteractionState::ZoomBoxX { x1: x, x2: x };
            Response::redraw()
        } else if l.in_value_ruler(x, y) {
            self.state = InteractionState::ZoomBoxY { y1: y, y2: y };
            Response::redraw()
        } else if l.in_plot(x, y) {
            self.state = InteractionState::Dragging {
                start: (x, y),
                origin: window.clone(),
            };
            self.pressed_at = Some(now);
            self.last_move = Some((x, now));
            Response::redraw()
        } else {
            Response::default()
        }
    }

    pub fn pointer_move(&mut self, x: f64, y: f64, now: f64, window: &mut Window, cx: &InputContext<'_>) -> Response {
        let l = cx.layout;
        match &mut self.state {
            InteractionState::Dragging { start, origin } => {
                let (pw, ph) = (l.plot_width(), l.plot_height());
                let dt = -(x - start.0) / pw * origin.width();
                if dt != 0.0 {
                    window.t_min = origin.t_min + dt;
                    window.t_max = origin.t_max + dt;
                    window.follow_now = false;
                }
                if origin.y_zoomed {
                    let f = (y - start.1) / ph;
                    if window.log_axis {
                        let (lo, hi) = (origin.y_min.max(LOG_MIN).log10(), origin.y_max.max(LOG_MIN).log10());
                        let d = f * (hi - lo);
                        window.y_min = 10f64.powf(lo + d);
                        window.y_max = 10f64.powf(hi + d);
                    } else {
                        let d = f * (origin.y_max - origin.y_min);
                        window.y_min = origin.y_min + d;
                        window.y_max = origin.y_max + d;
                    }
                }
                if let Some((lx, lt)) = self.last_move {
                    if now > lt {
                        self.velocity = -(x - lx) / pw * window.width() / (now - lt);
                    }
                }
                self.last_move = Some((x, now));
                Response::moved()
            }
            InteractionState::ZoomBoxX { x2, .. } => {
                *x2 = x.clamp(l.x1, l.x2);
                Response::redraw()
            }
            InteractionState::ZoomBoxY { y2, .. } => {
                *y2 = y.clamp(l.y2, l.y1);
                Response::redraw()
            }
            InteractionState::Idle | InteractionState::MarkerActive { .. } => self.hover(x, y, cx),
        }
    }

    fn hover(&mut self, x: f64, y: f64, cx: &InputContext<'_>) -> Response {
        let l = cx.layout;
        let next = if l.in_plot(x, y) {
            let (px, py) = l.to_plot(x, y);
            hit::nearest(cx.projections, px, py, cx.params.hit_radius_px, self.eligible(cx.store))
                .map_or(InteractionState::Idle, |h| InteractionState::MarkerActive {
                    series: h.series,
                    index: h.index,
                })
        } else {
            InteractionState::Idle
        };
        if next != self.state {
            self.state = next;
            Response::redraw()
        } else {
            Response::default()
        }
    }

    pub fn pointer_up(&mut self, x: f64, y: f64, now: f64, window: &mut Window, cx: &InputContext<'_>) -> Response {
        let l = cx.layout;
        let state = std::mem::replace(&mut self.state, InteractionState::Idle);
        match state {
            InteractionState::Dragging { .. } => {
                let quick = self.pressed_at.take().is_some_and(|p| now - p < QUICK_CLICK);
                if quick {
                    self.stop_inertia();
                    if now - self.last_quick_click < DOUBLE_CLICK {
                        self.last_quick_click = f64::NEG_INFINITY;
                        return self.double_click(x, y, cx);
                    }
                    self.last_quick_click = now;
                    return Response::redraw();
                }
                let recent = self.last_move.is_some_and(|(_, t)| now - t <= INERTIA_WINDOW);
                let speed_px = self.velocity.abs() / window.width() * l.plot_width();
                if recent && speed_px > cx.params.inertia_stop_speed {
                    Response {
                        redraw: true,
                        start_inertia: true,
                        ..Default::default()
                    }
                } else {
                    self.stop_inertia();
                    Response::redraw()
                }
            }
            InteractionState::ZoomBoxX { x1, x2 } => {
                if (x2 - x1).abs() > cx.params.min_zoom_box_px {
                    let pw = l.plot_width();
                    let t0 = window.x_to_t(x1.min(x2) - l.x1, pw);
                    let t1 = window.x_to_t(x1.max(x2) - l.x1, pw);
                    window.set_time_range(t0, t1);
                    Response::moved()
                } else {
                    Response::redraw()
                }
            }
            InteractionState::ZoomBoxY { y1, y2 } => {
                if (y2 - y1).abs() > cx.params.min_zoom_box_px {
                    let ph = l.plot_height();
                    let v0 = window.y_to_v(y1.max(y2) - l.y2, ph);
                    let v1 = window.y_to_v(y1.min(y2) - l.y2, ph);
                    window.set_value_range(v0, v1);
                    Response::moved()
                } else {
                    Response::redraw()
                }
            }
            other => {
                self.state = other;
                Response::default()
            }
        }
    }

    /// Drops whatever the pointer was doing: a drag stops where it is and an
    /// unfinished zoom box is discarded.
    pub fn pointer_leave(&mut self) -> Response {
        match std::mem::replace(&mut self.state, InteractionState::Idle) {
            InteractionState::Idle => Response::default(),
            _ => Response::redraw(),
        }
    }

    /// Solo toggle on the nearest point, or on the legend row under the
    /// pointer.
    pub fn double_click(&mut self, x: f64, y: f64, cx: &InputContext<'_>) -> Response {
        let l = cx.layout;
        let (px, py) = l.to_plot(x, y);
        let store = cx.store;
        let plottable = |i: usize| store.get(i).is_some_and(|s| !s.key().is_run_transition());
        if let Some(h) = hit::nearest(cx.projections, px, py, cx.params.hit_radius_px, plottable) {
            self.toggle_solo(h.series);
            return Response::redraw();
        }
        if self.show_legend {
            if let Some(row) = l.legend_row_at(x, y).filter(|&r| plottable(r)) {
                self.toggle_solo(row);
                return Response::redraw();
            }
        }
        Response::default()
    }

    pub fn wheel(
        &mut self,
        x: f64,
        y: f64,
        delta: (f64, f64),
        mods: Modifiers,
        now: f64,
        window: &mut Window,
        cx: &InputContext<'_>,
    ) -> Response {
        let l = cx.layout;
        if !l.in_plot(x, y) {
            return Response::default();
        }
        let (px, py) = l.to_plot(x, y);
        let (dx, dy) = delta;
        let changed = if mods.shift || mods.alt {
            let anchor = window.y_to_v(py, l.plot_height());
            window.zoom_value(anchor, wheel_factor(dy), cx.params.max_zoom_ratio)
        } else if mods.ctrl || mods.meta {
            let anchor = window.x_to_t(px, l.plot_width());
            window.zoom_time(anchor, wheel_factor(dy), cx.time_scale, cx.params.max_zoom_ratio, now)
        } else {
            let d = if dx != 0.0 { dx } else { dy };
            window.pan_time_until(d / 100.0 * cx.params.wheel_pan_fraction * window.width(), now)
        };
        if changed {
            self.stop_inertia();
            self.clear_marker();
            Response::moved()
        } else {
            Response::default()
        }
    }

    pub fn key(&mut self, key: Key) -> Response {
        match key {
            Key::Char('u') => Response::action(UiAction::FollowNow),
            Key::Char('r') => Response::action(UiAction::ResetAxes),
            Key::Char('y') => Response::action(UiAction::RevertAutoscale),
            Key::Escape => {
                if self.solo.take().is_some() {
                    Response::redraw()
                } else {
                    Response::default()
                }
            }
            Key::Char(_) | Key::Left | Key::Right => Response::default(),
        }
    }

    /// One inertia tick. Returns `false` once the motion has died out.
    pub fn inertia_step(&mut self, window: &mut Window, plot_width: f64, params: &ChartParams) -> bool {
        if self.velocity == 0.0 {
            return false;
        }
        window.pan_time(self.velocity * params.inertia_tick);
        self.velocity *= params.inertia_decay;
        let speed_px = self.velocity.abs() / window.width() * plot_width;
        if speed_px < params.inertia_stop_speed {
            self.velocity = 0.0;
            return false;
        }
        true
    }
}

/// Zoom factor for a wheel step: `1 + d` out, `1 / (1 + d)` in, with `d`
/// capped at 0.5 per event, so opposite steps cancel exactly.
pub fn wheel_factor(delta: f64) -> f64 {
    let step = (delta / 100.0).clamp(-0.5, 0.5);
    if step >= 0.0 {
        1.0 + step
    } else {
        1.0 / (1.0 - step)
    }
}

fn zoom_icon(window: &mut Window, icon: ZoomIcon) {
    let f = match icon {
        ZoomIcon::In => 0.5,
        ZoomIcon::Out => 2.0,
    };
    let c = if window.follow_now {
        window.t_max
    } else {
        (window.t_min + window.t_max) / 2.0
    };
    window.t_min = c - (c - window.t_min) * f;
    window.t_max = c + (window.t_max - c) * f;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PanelConfig, PanelSettings};
    use crate::dataset::Sample;
    use crate::project::ProjectionCache;

    struct Fixture {
        settings: PanelSettings,
        store: SampleStore,
        window: Window,
        layout: Layout,
        cache: ProjectionCache,
        params: ChartParams,
    }

    impl Fixture {
        fn new() -> Self {
            let cfg = PanelConfig::from_json(r#"{"Timescale":"100","Variables":["A:x","B:y"]}"#).unwrap();
            let settings = PanelSettings::from_config("G", "P", &cfg).unwrap();
            let mut store = SampleStore::new(&settings.series).unwrap();
            store.merge(&[
                (0..=10).map(|i| Sample::new(1000.0 + 10.0 * i as f64, 0.0)).collect(),
                (0..=10).map(|i| Sample::new(1005.0 + 10.0 * i as f64, 10.0)).collect(),
            ]);
            let mut window = Window::new(&settings, 1100.0);
            window.autoscale(&store);
            // plot is 100 x 100 pixels at (40, 26)
            let layout = Layout::new(170.0, 151.0, 25.0);
            Fixture {
                settings,
                store,
                window,
                layout,
                cache: ProjectionCache::default(),
                params: ChartParams::default(),
            }
        }

        fn run<R>(&mut self, f: impl FnOnce(&mut Window, &InputContext<'_>) -> R) -> R {
            let projections = self.cache.get(
                &self.store,
                &self.window,
                self.layout.plot_width(),
                self.layout.plot_height(),
                2.0,
            );
            let cx = InputContext {
                layout: &self.layout,
                store: &self.store,
                projections,
                time_scale: self.settings.time_scale,
                params: &self.params,
            };
            f(&mut self.window, &cx)
        }
    }

    #[test]
    fn drag_pans_time() {
        let mut fx = Fixture::new();
        let mut ia = Interaction::new();
        fx.run(|w, cx| ia.pointer_down(90.0, 60.0, 0.0, w, cx));
        assert!(ia.is_dragging());
        let r = fx.run(|w, cx| ia.pointer_move(110.0, 60.0, 0.5, w, cx));
        assert!(r.view_changed);
        assert_eq!((fx.window.t_min, fx.window.t_max), (980.0, 1080.0));
        assert!(!fx.window.follow_now);
        // slow release: no inertia
        let r = fx.run(|w, cx| ia.pointer_up(110.0, 60.0, 2.0, w, cx));
        assert!(!r.start_inertia);
        assert_eq!(ia.state, InteractionState::Idle);
    }

    #[test]
    fn fast_release_starts_inertia_that_dies_out() {
        let mut fx = Fixture::new();
        let mut ia = Interaction::new();
        fx.run(|w, cx| ia.pointer_down(90.0, 60.0, 0.0, w, cx));
        fx.run(|w, cx| ia.pointer_move(100.0, 60.0, 0.30, w, cx));
        fx.run(|w, cx| ia.pointer_move(120.0, 60.0, 0.32, w, cx));
        let r = fx.run(|w, cx| ia.pointer_up(120.0, 60.0, 0.35, w, cx));
        assert!(r.start_inertia);
        let before = fx.window.t_min;
        let mut ticks = 0;
        while ia.inertia_step(&mut fx.window, 100.0, &fx.params) {
            ticks += 1;
            assert!(ticks < 1000);
        }
        assert!(fx.window.t_min < before);
        assert!(!ia.inertia_active());
    }

    #[test]
    fn zoom_box_needs_minimum_width() {
        let mut fx = Fixture::new();
        let mut ia = Interaction::new();
        let ruler_y = fx.layout.y1 + 5.0;
        fx.run(|w, cx| ia.pointer_down(50.0, ruler_y, 0.0, w, cx));
        fx.run(|w, cx| ia.pointer_move(53.0, ruler_y, 0.1, w, cx));
        let r = fx.run(|w, cx| ia.pointer_up(53.0, ruler_y, 0.2, w, cx));
        assert!(!r.view_changed);

        fx.run(|w, cx| ia.pointer_down(50.0, ruler_y, 1.0, w, cx));
        fx.run(|w, cx| ia.pointer_move(90.0, ruler_y, 1.1, w, cx));
        let r = fx.run(|w, cx| ia.pointer_up(90.0, ruler_y, 1.2, w, cx));
        assert!(r.view_changed);
        assert!((fx.window.t_min - 1010.0).abs() < 1e-9);
        assert!((fx.window.t_max - 1050.0).abs() < 1e-9);
        assert!(!fx.window.follow_now);
    }

    #[test]
    fn leaving_the_canvas_ends_drags_and_zoom_boxes() {
        let mut fx = Fixture::new();
        let mut ia = Interaction::new();
        fx.run(|w, cx| ia.pointer_down(90.0, 60.0, 0.0, w, cx));
        assert!(ia.is_dragging());
        assert_eq!(ia.pointer_leave(), Response::redraw());
        assert_eq!(ia.state, InteractionState::Idle);
        // no button held any more: moving does not pan
        let before = fx.window.clone();
        fx.run(|w, cx| ia.pointer_move(130.0, 60.0, 0.5, w, cx));
        assert_eq!((fx.window.t_min, fx.window.t_max), (before.t_min, before.t_max));

        let ruler_y = fx.layout.y1 + 5.0;
        fx.run(|w, cx| ia.pointer_down(50.0, ruler_y, 1.0, w, cx));
        fx.run(|w, cx| ia.pointer_move(90.0, ruler_y, 1.1, w, cx));
        ia.pointer_leave();
        assert_eq!(ia.state, InteractionState::Idle);
        let r = fx.run(|w, cx| ia.pointer_up(90.0, ruler_y, 1.2, w, cx));
        assert!(!r.view_changed);
        assert_eq!(ia.pointer_leave(), Response::default());
    }

    #[test]
    fn value_zoom_box() {
        let mut fx = Fixture::new();
        let mut ia = Interaction::new();
        fx.run(|w, cx| ia.pointer_down(20.0, 36.0, 0.0, w, cx));
        assert!(matches!(ia.state, InteractionState::ZoomBoxY { .. }));
        fx.run(|w, cx| ia.pointer_move(20.0, 76.0, 0.1, w, cx));
        fx.run(|w, cx| ia.pointer_up(20.0, 76.0, 0.2, w, cx));
        assert!(fx.window.y_zoomed);
        assert!(fx.window.y_max > fx.window.y_min);
    }

    #[test]
    fn wheel_zoom_round_trip() {
        let mut fx = Fixture::new();
        fx.window.follow_now = false;
        fx.window.t_min = 1000.0;
        fx.window.t_max = 1080.0;
        let start = fx.window.clone();
        let mut ia = Interaction::new();
        let ctrl = Modifiers {
            ctrl: true,
            ..Default::default()
        };
        let r = fx.run(|w, cx| ia.wheel(70.0, 60.0, (0.0, -40.0), ctrl, 1100.0, w, cx));
        assert!(r.view_changed);
        assert!(fx.window.width() < start.width());
        fx.run(|w, cx| ia.wheel(70.0, 60.0, (0.0, 40.0), ctrl, 1100.0, w, cx));
        assert!((fx.window.t_min - start.t_min).abs() < 1e-9);
        assert!((fx.window.t_max - start.t_max).abs() < 1e-9);
    }

    #[test]
    fn plain_wheel_pans() {
        let mut fx = Fixture::new();
        let mut ia = Interaction::new();
        // the live window already ends at now
        let r = fx.run(|w, cx| ia.wheel(70.0, 60.0, (0.0, 100.0), Modifiers::default(), 1100.0, w, cx));
        assert!(!r.view_changed);
        assert_eq!((fx.window.t_min, fx.window.t_max), (1000.0, 1100.0));
        fx.run(|w, cx| ia.wheel(70.0, 60.0, (0.0, -100.0), Modifiers::default(), 1100.0, w, cx));
        assert_eq!((fx.window.t_min, fx.window.t_max), (990.0, 1090.0));
        assert!(!fx.window.follow_now);
        // forward again stops at now
        fx.run(|w, cx| ia.wheel(70.0, 60.0, (0.0, 300.0), Modifiers::default(), 1100.0, w, cx));
        assert_eq!((fx.window.t_min, fx.window.t_max), (1000.0, 1100.0));
        // outside the plot nothing happens
        let r = fx.run(|w, cx| ia.wheel(5.0, 5.0, (0.0, 100.0), Modifiers::default(), 1100.0, w, cx));
        assert_eq!(r, Response::default());
    }

    #[test]
    fn hover_and_double_click_solo() {
        let mut fx = Fixture::new();
        let mut ia = Interaction::new();
        // series 1 has a sample at 1055, high in the plot
        let (px, py) = {
            let projections = fx.cache.get(&fx.store, &fx.window, 100.0, 100.0, 2.0);
            let p = &projections[1].points;
            let i = p.t.iter().position(|&t| t == 1055.0).unwrap();
            (p.x[i] + fx.layout.x1, p.y[i] + fx.layout.y2)
        };
        let r = fx.run(|w, cx| ia.pointer_move(px + 2.0, py, 0.0, w, cx));
        assert!(r.redraw);
        assert!(matches!(ia.state, InteractionState::MarkerActive { series: 1, .. }));

        for t in [1.0, 1.3] {
            fx.run(|w, cx| ia.pointer_down(px, py, t, w, cx));
            fx.run(|w, cx| ia.pointer_up(px, py, t + 0.05, w, cx));
        }
        assert_eq!(ia.solo, Some(1));
        assert_eq!(ia.key(Key::Escape), Response::redraw());
        assert_eq!(ia.solo, None);
    }

    #[test]
    fn buttons_and_keys_become_actions() {
        let mut fx = Fixture::new();
        let mut ia = Interaction::new();
        let r = fx.run(|w, cx| {
            let b = cx.layout.button_rect(1);
            ia.pointer_down(b.x + 1.0, b.y + 1.0, 0.0, w, cx)
        });
        assert_eq!(r.actions, vec![UiAction::Button(Button::ResetAxes)]);
        assert_eq!(ia.key(Key::Char('u')).actions, vec![UiAction::FollowNow]);
        assert_eq!(ia.key(Key::Char('y')).actions, vec![UiAction::RevertAutoscale]);
        assert_eq!(ia.key(Key::Char('q')), Response::default());
    }

    #[test]
    fn zoom_icons_halve_and_double() {
        let mut fx = Fixture::new();
        fx.layout.show_zoom_buttons = true;
        fx.window.follow_now = false;
        let mut ia = Interaction::new();
        let r = fx.run(|w, cx| {
            let b = cx.layout.zoom_icon_rect(ZoomIcon::In);
            ia.pointer_down(b.x + 1.0, b.y + 1.0, 0.0, w, cx)
        });
        assert!(r.view_changed);
        assert_eq!((fx.window.t_min, fx.window.t_max), (1025.0, 1075.0));
        fx.run(|w, cx| {
            let b = cx.layout.zoom_icon_rect(ZoomIcon::Out);
            ia.pointer_down(b.x + 1.0, b.y + 1.0, 0.0, w, cx)
        });
        assert_eq!((fx.window.t_min, fx.window.t_max), (1000.0, 1100.0));
    }

    #[test]
    fn wheel_factors_cancel() {
        for d in [3.0, 40.0, 120.0] {
            assert!((wheel_factor(d) * wheel_factor(-d) - 1.0).abs() < 1e-12);
        }
        assert_eq!(wheel_factor(500.0), 1.5);
    }
}
