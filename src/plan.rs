//! Frame contents as a flat list of shapes.
//!
//! Everything the painter draws is decided here, from the panel state, in
//! paint order. Coordinates are canvas pixels with the origin top left.

use chrono::TimeZone;

use crate::config::PanelSettings;
use crate::dataset::SampleStore;
use crate::interaction::{Interaction, InteractionState, ZoomIcon, BUTTONS};
use crate::project::SeriesProjection;
use crate::ticks::{
    full_time, generate_ticks, legend_precision, strip_zeros, time_ticks, to_precision, AxisTicks, TextMeasure,
};
use crate::window::Window;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(0xFF, 0xFF, 0xFF);
    pub const GREY: Color = Color::rgb(0x80, 0x80, 0x80);
    pub const LIGHT_GREY: Color = Color::rgb(0xE0, 0xE0, 0xE0);
    pub const TEXT: Color = Color::rgb(0x40, 0x40, 0x40);
    pub const BUTTON: Color = Color::rgb(0xF0, 0xF0, 0xF0);
    pub const BUTTON_OFF: Color = Color::rgb(0xFF, 0xC0, 0xC0);
    pub const RED: Color = Color::rgb(0xFF, 0x00, 0x00);
    pub const GREEN: Color = Color::rgb(0x00, 0xA0, 0x00);
    pub const ORANGE: Color = Color::rgb(0xF9, 0xA6, 0x00);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color { r, g, b, a }
    }

    pub fn with_alpha(self, alpha: f64) -> Self {
        Color {
            a: (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
            ..self
        }
    }

    /// `#RRGGBB` or `#RGB`, the `#` optional.
    pub fn from_hex(text: &str) -> Option<Self> {
        let text = text.trim();
        let h = text.strip_prefix('#').unwrap_or(text);
        let digits = |i: usize, n: usize| u8::from_str_radix(h.get(i..i + n)?, 16).ok();
        match h.len() {
            6 => Some(Color::rgb(digits(0, 2)?, digits(2, 2)?, digits(4, 2)?)),
            3 => Some(Color::rgb(digits(0, 1)? * 17, digits(1, 1)? * 17, digits(2, 1)? * 17)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Rect { x, y, w, h }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Fill { rect: Rect, color: Color },
    Stroke { rect: Rect, color: Color },
    /// Open polyline; `dash` is `[on, off]` in pixels.
    Line { points: Vec<[f64; 2]>, color: Color, dash: Option<[f64; 2]> },
    /// Region between a polyline and the horizontal line `y = base`.
    Area { points: Vec<[f64; 2]>, base: f64, color: Color },
    /// Diagonal lines `spacing` pixels apart, clipped to `rect`.
    Hatch { rect: Rect, color: Color, spacing: f64 },
    /// `y` is the top of the text line.
    Text { x: f64, y: f64, text: String, color: Color, align: Align, size: f32 },
}

pub const BUTTON_SIZE: f64 = 28.0;
pub const ZOOM_ICON_SIZE: f64 = 24.0;
pub const LEGEND_ROW: f64 = 17.0;
const LEGEND_PAD: f64 = 4.0;
const LEGEND_SWATCH: f64 = 25.0;

/// Where the plot area, the rulers, the buttons and the legend sit.
///
/// The plot spans `x1..x2` horizontally and `y2..y1` vertically (`y1` is the
/// bottom edge). The strip below `y1` is the time ruler, the strip left of
/// `x1` the value ruler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub width: f64,
    pub height: f64,
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
    pub show_zoom_buttons: bool,
    pub legend: Option<Rect>,
}

impl Layout {
    pub fn new(width: f64, height: f64, axis_label_width: f64) -> Self {
        Layout {
            width,
            height,
            x1: axis_label_width + 15.0,
            x2: width - 30.0,
            y1: height - 25.0,
            y2: 26.0,
            show_zoom_buttons: false,
            legend: None,
        }
    }

    /// A bare time ruler followed by a playback toggle, the zoom icons and
    /// one button. Used by the image history strip.
    pub fn strip(width: f64, height: f64) -> Self {
        Layout {
            width,
            height,
            x1: 5.0,
            x2: width - 30.0 - 3.0 * ZOOM_ICON_SIZE - 5.0,
            y1: height - 20.0,
            y2: 2.0,
            show_zoom_buttons: true,
            legend: None,
        }
    }

    pub fn plot_width(&self) -> f64 { (self.x2 - self.x1).max(1.0) }
    pub fn plot_height(&self) -> f64 { (self.y1 - self.y2).max(1.0) }

    pub fn in_plot(&self, x: f64, y: f64) -> bool {
        x > self.x1 && x < self.x2 && y > self.y2 && y < self.y1
    }

    pub fn in_time_ruler(&self, x: f64, y: f64) -> bool {
        x > self.x1 && x < self.x2 && y >= self.y1
    }

    pub fn in_value_ruler(&self, x: f64, y: f64) -> bool {
        x <= self.x1 && y > self.y2 && y < self.y1
    }

    /// Canvas to plot-local coordinates.
    pub fn to_plot(&self, x: f64, y: f64) -> (f64, f64) {
        (x - self.x1, y - self.y2)
    }

    pub fn button_rect(&self, k: usize) -> Rect {
        Rect::new(self.width - 30.0, 6.0 + k as f64 * BUTTON_SIZE, BUTTON_SIZE, BUTTON_SIZE)
    }

    pub fn button_at(&self, x: f64, y: f64) -> Option<usize> {
        (0..BUTTONS.len()).find(|&k| self.button_rect(k).contains(x, y))
    }

    pub fn zoom_icon_rect(&self, icon: ZoomIcon) -> Rect {
        let offset = match icon {
            ZoomIcon::In => 48.0,
            ZoomIcon::Out => 24.0,
        };
        Rect::new(self.width - 30.0 - offset, self.y1 - ZOOM_ICON_SIZE, ZOOM_ICON_SIZE, ZOOM_ICON_SIZE)
    }

    pub fn zoom_icon_at(&self, x: f64, y: f64) -> Option<ZoomIcon> {
        if !self.show_zoom_buttons {
            return None;
        }
        [ZoomIcon::In, ZoomIcon::Out]
            .into_iter()
            .find(|&icon| self.zoom_icon_rect(icon).contains(x, y))
    }

    pub fn legend_row_at(&self, x: f64, y: f64) -> Option<usize> {
        let r = self.legend?;
        if !r.contains(x, y) || y < r.y + LEGEND_PAD {
            return None;
        }
        Some(((y - r.y - LEGEND_PAD) / LEGEND_ROW).floor() as usize)
    }
}

/// Value-axis ticks for a canvas of the given height, and the width of the
/// widest label.
pub fn value_axis(window: &Window, height: f64, text: &dyn TextMeasure) -> (AxisTicks, f64) {
    let (lo, hi) = window.y_range();
    let extent = (height - 25.0 - 26.0).max(1.0);
    let ticks = generate_ticks(lo, hi, extent, window.log_axis, text);
    let w = ticks
        .labeled
        .iter()
        .map(|l| text.width(&l.text))
        .fold(0.0, f64::max);
    (ticks, w)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub width: f64,
    pub height: f64,
    pub layout: Layout,
    pub shapes: Vec<Shape>,
}

impl RenderPlan {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.shapes.iter().filter_map(|s| match s {
            Shape::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn has_text(&self, needle: &str) -> bool {
        self.texts().any(|t| t.contains(needle))
    }

    pub(crate) fn fill(&mut self, rect: Rect, color: Color) {
        self.shapes.push(Shape::Fill { rect, color });
    }

    pub(crate) fn stroke(&mut self, rect: Rect, color: Color) {
        self.shapes.push(Shape::Stroke { rect, color });
    }

    pub(crate) fn line(&mut self, points: Vec<[f64; 2]>, color: Color) {
        if points.len() >= 2 {
            self.shapes.push(Shape::Line { points, color, dash: None });
        }
    }

    pub(crate) fn text(&mut self, x: f64, y: f64, text: impl Into<String>, color: Color, align: Align, size: f32) {
        self.shapes.push(Shape::Text {
            x,
            y,
            text: text.into(),
            color,
            align,
            size,
        });
    }
}

/// Everything a frame is built from.
pub struct Scene<'a, Tz: TimeZone> {
    pub settings: &'a PanelSettings,
    pub window: &'a Window,
    pub store: &'a SampleStore,
    /// Built for `layout.plot_width()` by `layout.plot_height()`.
    pub projections: &'a [SeriesProjection],
    pub layout: Layout,
    pub value_ticks: &'a AxisTicks,
    pub interaction: &'a Interaction,
    pub pending: bool,
    /// Per series, newest sample time known to the service (0 for none).
    pub last_written: &'a [f64],
    pub now: f64,
    pub tz: &'a Tz,
    pub text: &'a dyn TextMeasure,
    pub font_size: f32,
}

/// Builds the frame, and the final layout (with the legend box) that hit
/// tests against this frame must use.
pub fn build<Tz: TimeZone>(scene: &Scene<'_, Tz>) -> RenderPlan
where
    Tz::Offset: std::fmt::Display,
{
    let l = scene.layout;
    let mut plan = RenderPlan {
        width: l.width,
        height: l.height,
        layout: l,
        shapes: Vec::new(),
    };
    let fs = scene.font_size;

    plan.fill(Rect::new(0.0, 0.0, l.width, l.height), Color::WHITE);
    plan.text(
        4.0,
        4.0,
        format!("{} - {}", scene.settings.group, scene.settings.panel),
        Color::TEXT,
        Align::Left,
        fs,
    );

    axes(&mut plan, scene);
    future_hatch(&mut plan, scene);
    series(&mut plan, scene);
    if scene.settings.show_run_markers {
        run_markers(&mut plan, scene);
    }
    if scene.interaction.show_legend {
        legend(&mut plan, scene);
    }
    notices(&mut plan, scene);
    buttons(&mut plan, scene);
    overlay(&mut plan, scene);
    marker(&mut plan, scene);
    plan
}

fn axes<Tz: TimeZone>(plan: &mut RenderPlan, scene: &Scene<'_, Tz>)
where
    Tz::Offset: std::fmt::Display,
{
    let l = scene.layout;
    let w = scene.window;
    let fs = scene.font_size;
    let th = scene.text.height();

    // value axis: major grid lines, minor ticks on the ruler, labels
    let vy = |v: f64| l.y2 + w.v_to_y(v, l.plot_height());
    for &v in &scene.value_ticks.major {
        let y = vy(v);
        plan.line(vec![[l.x1, y], [l.x2, y]], Color::LIGHT_GREY);
    }
    for &v in &scene.value_ticks.minor {
        let y = vy(v);
        let len = if scene.value_ticks.major.contains(&v) { 8.0 } else { 4.0 };
        plan.line(vec![[l.x1 - len, y], [l.x1, y]], Color::GREY);
    }
    for label in &scene.value_ticks.labeled {
        plan.text(l.x1 - 10.0, vy(label.value) - th / 2.0, label.text.clone(), Color::TEXT, Align::Right, fs);
    }

    // time axis
    let tt = time_ticks(w.t_min, w.t_max, l.plot_width(), scene.now, scene.tz, scene.text);
    let tx = |t: f64| l.x1 + w.t_to_x(t, l.plot_width());
    for &t in &tt.major {
        let x = tx(t);
        plan.line(vec![[x, l.y2], [x, l.y1]], Color::LIGHT_GREY);
    }
    for &t in &tt.minor {
        let x = tx(t);
        let len = if tt.major.contains(&t) { 8.0 } else { 4.0 };
        plan.line(vec![[x, l.y1], [x, l.y1 + len]], Color::GREY);
    }
    for label in &tt.labeled {
        plan.text(tx(label.value), l.y1 + 9.0, label.text.clone(), Color::TEXT, Align::Center, fs);
    }

    plan.stroke(Rect::new(l.x1, l.y2, l.x2 - l.x1, l.y1 - l.y2), Color::GREY);
}

fn future_hatch<Tz: TimeZone>(plan: &mut RenderPlan, scene: &Scene<'_, Tz>) {
    let l = scene.layout;
    let w = scene.window;
    if w.t_max <= scene.now {
        return;
    }
    let x = (l.x1 + w.t_to_x(scene.now, l.plot_width())).max(l.x1);
    if x < l.x2 {
        plan.shapes.push(Shape::Hatch {
            rect: Rect::new(x, l.y2, l.x2 - x, l.y1 - l.y2),
            color: Color::LIGHT_GREY,
            spacing: 10.0,
        });
    }
}

fn visible(scene: &Scene<'_, impl TimeZone>, i: usize) -> bool {
    scene.interaction.solo.map_or(true, |s| s == i)
}

/// Stroke path of a bucketed series: into each column at its first value,
/// up to the max, down to the min, out at the last value.
fn bucket_path(p: &SeriesProjection, window: &Window, height: f64, ox: f64, oy: f64) -> Vec<[f64; 2]> {
    let mut out = Vec::with_capacity(p.buckets.len() * 4 + 2);
    out.extend(p.points.lead.map(|[x, y]| [x + ox, y + oy]));
    for b in &p.buckets {
        let x = b.column as f64 + ox;
        for v in [b.first, b.max, b.min, b.last] {
            out.push([x, window.v_to_y(v, height) + oy]);
        }
    }
    out.extend(p.points.trail.map(|[x, y]| [x + ox, y + oy]));
    out
}

fn series<Tz: TimeZone>(plan: &mut RenderPlan, scene: &Scene<'_, Tz>) {
    let l = scene.layout;
    for (i, (s, p)) in scene.store.iter().zip(scene.projections).enumerate() {
        if s.key().is_run_transition() || !visible(scene, i) {
            continue;
        }
        let path: Vec<[f64; 2]> = if p.bucket_mode {
            bucket_path(p, scene.window, l.plot_height(), l.x1, l.y2)
        } else {
            p.points.polyline().into_iter().map(|[x, y]| [x + l.x1, y + l.y2]).collect()
        };
        if path.len() < 2 {
            continue;
        }
        // lead and trail lie outside the plot; the painter clips
        if scene.settings.show_fill {
            plan.shapes.push(Shape::Area {
                points: path.clone(),
                base: l.y1,
                color: s.color().with_alpha(0.1),
            });
        }
        plan.line(path, s.color());
    }
}

fn run_markers<Tz: TimeZone>(plan: &mut RenderPlan, scene: &Scene<'_, Tz>) {
    let l = scene.layout;
    let find = |tag: &str| {
        scene
            .store
            .iter()
            .position(|s| s.key().is_run_transition() && s.key().tag == tag)
    };
    let (Some(state), Some(run)) = (find("State"), find("Run number")) else {
        return;
    };
    let Some(points) = scene.projections.get(state).map(|p| &p.points) else {
        return;
    };
    let run_numbers = scene.store.get(run);
    let fs = scene.font_size;
    for i in 0..points.len() {
        let x = points.x[i] + l.x1;
        let color = match points.v[i] as i64 {
            1 => Color::RED,
            3 => Color::GREEN,
            _ => Color::ORANGE,
        };
        plan.shapes.push(Shape::Line {
            points: vec![[x, l.y1], [x, l.y2]],
            color,
            dash: Some([8.0, 2.0]),
        });
        let Some(number) = run_numbers.and_then(|s| s.at_or_before(points.t[i])) else {
            continue;
        };
        let (lx, align) = match points.v[i] as i64 {
            1 => (x - 5.0, Align::Right),
            _ => (x + 3.0, Align::Left),
        };
        plan.text(lx, l.y2 + 4.0, format!("{}", number.v as i64), color, align, fs);
    }
}

fn format_value(v: f64, window: &Window) -> String {
    let (lo, hi) = window.y_range();
    strip_zeros(&to_precision(v, legend_precision(lo, hi)))
}

fn legend<Tz: TimeZone>(plan: &mut RenderPlan, scene: &Scene<'_, Tz>)
where
    Tz::Offset: std::fmt::Display,
{
    let l = scene.layout;
    let fs = scene.font_size;
    let marker_t = match scene.interaction.state {
        InteractionState::MarkerActive { series, index } => {
            scene.projections.get(series).and_then(|p| p.points.t.get(index)).copied()
        }
        _ => None,
    };

    let mut rows: Vec<(usize, String)> = Vec::new();
    for (i, s) in scene.store.iter().enumerate() {
        if s.key().is_run_transition() {
            continue;
        }
        let mut row = s.label().to_string();
        if scene.settings.show_values {
            let at = marker_t.unwrap_or(scene.window.t_max);
            let value = match s.at_or_before(at) {
                Some(sample) => format_value(sample.v, scene.window),
                None => match scene.last_written.get(i).copied().filter(|&t| t > 0.0) {
                    Some(t) => format!("last data: {}", full_time(t, scene.tz)),
                    None => "no data".to_string(),
                },
            };
            row = format!("{row}: {value}");
        }
        rows.push((i, row));
    }
    if rows.is_empty() {
        return;
    }

    let text_w = rows.iter().map(|(_, r)| scene.text.width(r)).fold(0.0, f64::max);
    let rect = Rect::new(
        l.x1,
        l.y2,
        LEGEND_SWATCH + text_w + 10.0,
        rows.len() as f64 * LEGEND_ROW + 2.0 * LEGEND_PAD,
    );
    plan.layout.legend = Some(rect);
    plan.fill(rect, Color::WHITE.with_alpha(0.8));
    plan.stroke(rect, Color::GREY);
    for (row, (i, text)) in rows.into_iter().enumerate() {
        let y = rect.y + LEGEND_PAD + row as f64 * LEGEND_ROW;
        let dimmed = !visible(scene, i);
        let color = match scene.store.get(i) {
            Some(s) if !dimmed => s.color(),
            _ => Color::LIGHT_GREY,
        };
        let mid = y + LEGEND_ROW / 2.0;
        plan.line(vec![[rect.x + 5.0, mid], [rect.x + 20.0, mid]], color);
        let text_color = if dimmed { Color::GREY } else { Color::TEXT };
        plan.text(rect.x + LEGEND_SWATCH, y + 1.0, text, text_color, Align::Left, fs);
    }
}

fn notices<Tz: TimeZone>(plan: &mut RenderPlan, scene: &Scene<'_, Tz>) {
    let l = scene.layout;
    let cx = (l.x1 + l.x2) / 2.0;
    if scene.pending {
        plan.text(cx, l.y2 + 4.0, "Updating data ...", Color::RED, Align::Center, scene.font_size);
    } else if scene.store.total_samples() == 0 {
        let cy = (l.y1 + l.y2) / 2.0 - scene.text.height() / 2.0;
        plan.text(cx, cy, "No data available", Color::RED, Align::Center, scene.font_size * 1.5);
    }
}

fn buttons<Tz: TimeZone>(plan: &mut RenderPlan, scene: &Scene<'_, Tz>) {
    let l = scene.layout;
    for (k, b) in BUTTONS.iter().enumerate() {
        let r = l.button_rect(k);
        let fill = if b.is_play() && !scene.window.follow_now {
            Color::BUTTON_OFF
        } else {
            Color::BUTTON
        };
        plan.fill(r, fill);
        plan.stroke(r, Color::GREY);
        plan.text(r.x + r.w / 2.0, r.y + 6.0, b.glyph(), Color::TEXT, Align::Center, scene.font_size);
    }

    zoom_icons(plan, &l);
}

pub(crate) fn zoom_icons(plan: &mut RenderPlan, l: &Layout) {
    if !l.show_zoom_buttons {
        return;
    }
    for icon in [ZoomIcon::In, ZoomIcon::Out] {
        let r = l.zoom_icon_rect(icon);
        plan.fill(r, Color::BUTTON.with_alpha(0.5));
        plan.stroke(r, Color::GREY);
        let (cx, cy) = (r.x + 12.0, r.y + 12.0);
        plan.line(vec![[r.x + 5.0, cy], [r.x + 19.0, cy]], Color::TEXT);
        if icon == ZoomIcon::In {
            plan.line(vec![[cx, r.y + 5.0], [cx, r.y + 19.0]], Color::TEXT);
        }
    }
}

fn overlay<Tz: TimeZone>(plan: &mut RenderPlan, scene: &Scene<'_, Tz>) {
    let l = scene.layout;
    match scene.interaction.state {
        InteractionState::ZoomBoxX { x1, x2 } => {
            let (a, b) = (x1.min(x2), x1.max(x2));
            plan.fill(Rect::new(a, l.y2, b - a, l.y1 - l.y2), Color::GREY.with_alpha(0.2));
            plan.line(vec![[a, l.y1], [a, l.y2]], Color::GREY);
            plan.line(vec![[b, l.y1], [b, l.y2]], Color::GREY);
        }
        InteractionState::ZoomBoxY { y1, y2 } => {
            let (a, b) = (y1.min(y2), y1.max(y2));
            plan.fill(Rect::new(l.x1, a, l.x2 - l.x1, b - a), Color::GREY.with_alpha(0.2));
            plan.line(vec![[l.x1, a], [l.x2, a]], Color::GREY);
            plan.line(vec![[l.x1, b], [l.x2, b]], Color::GREY);
        }
        _ => {}
    }
}

fn marker<Tz: TimeZone>(plan: &mut RenderPlan, scene: &Scene<'_, Tz>)
where
    Tz::Offset: std::fmt::Display,
{
    let InteractionState::MarkerActive { series, index } = scene.interaction.state else {
        return;
    };
    let (Some(s), Some(p)) = (scene.store.get(series), scene.projections.get(series)) else {
        return;
    };
    if index >= p.points.len() {
        return;
    }
    let l = scene.layout;
    let x = p.points.x[index] + l.x1;
    let y = p.points.y[index] + l.y2;
    plan.stroke(Rect::new(x - 4.0, y - 4.0, 8.0, 8.0), s.color());
    plan.shapes.push(Shape::Line {
        points: vec![[x, l.y2], [x, l.y1]],
        color: Color::GREY,
        dash: Some([4.0, 4.0]),
    });

    let lines = [
        format!("{}: {}", s.label(), format_value(p.points.v[index], scene.window)),
        full_time(p.points.t[index], scene.tz),
    ];
    let th = scene.text.height();
    let w = lines.iter().map(|t| scene.text.width(t)).fold(0.0, f64::max) + 10.0;
    let h = 2.0 * (th + 2.0) + 6.0;
    let mut bx = x + 10.0;
    if bx + w > l.x2 {
        bx = x - 10.0 - w;
    }
    let by = (y - h - 10.0).clamp(l.y2, (l.y1 - h).max(l.y2));
    let rect = Rect::new(bx, by, w, h);
    plan.fill(rect, Color::WHITE);
    plan.stroke(rect, s.color());
    for (k, line) in lines.into_iter().enumerate() {
        plan.text(bx + 5.0, by + 3.0 + k as f64 * (th + 2.0), line, Color::TEXT, Align::Left, scene.font_size);
    }
}

/// What to do about a redraw request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RedrawDecision {
    Draw,
    /// Too soon after the last frame; draw at this time instead.
    Defer(f64),
    /// A deferred redraw is already pending.
    Coalesced,
}

/// Caps unforced redraws to one per `min_interval` seconds.
#[derive(Debug, Clone)]
pub struct RedrawScheduler {
    min_interval: f64,
    last_draw: Option<f64>,
    deferred: bool,
}

impl RedrawScheduler {
    pub fn new(min_interval: f64) -> Self {
        RedrawScheduler {
            min_interval,
            last_draw: None,
            deferred: false,
        }
    }

    pub fn request(&mut self, now: f64, force: bool) -> RedrawDecision {
        match self.last_draw {
            Some(last) if !force && now - last < self.min_interval => {
                if self.deferred {
                    RedrawDecision::Coalesced
                } else {
                    self.deferred = true;
                    RedrawDecision::Defer(last + self.min_interval)
                }
            }
            _ => RedrawDecision::Draw,
        }
    }

    pub fn drawn(&mut self, now: f64) {
        self.last_draw = Some(now);
        self.deferred = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PanelConfig, PanelSettings};
    use crate::dataset::Sample;
    use crate::project::ProjectionCache;
    use crate::ticks::MonospaceEstimate;
    use chrono::Utc;

    #[test]
    fn hex_colors() {
        assert_eq!(Color::from_hex("#00AAFF"), Some(Color::rgb(0, 0xAA, 0xFF)));
        assert_eq!(Color::from_hex("f00"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::from_hex("#12345"), None);
        assert_eq!(Color::from_hex("#GG0000"), None);
        assert_eq!(Color::RED.with_alpha(0.1).a, 26);
    }

    #[test]
    fn layout_regions() {
        let l = Layout::new(800.0, 400.0, 40.0);
        assert_eq!((l.x1, l.x2, l.y1, l.y2), (55.0, 770.0, 375.0, 26.0));
        assert!(l.in_plot(100.0, 100.0));
        assert!(l.in_time_ruler(100.0, 380.0));
        assert!(l.in_value_ruler(20.0, 100.0));
        assert_eq!(l.button_at(780.0, 10.0), Some(0));
        assert_eq!(l.button_at(780.0, 6.0 + 28.0 * 2.0 + 1.0), Some(2));
        assert_eq!(l.zoom_icon_at(800.0 - 30.0 - 40.0, 360.0), None);
        let l = Layout {
            show_zoom_buttons: true,
            ..l
        };
        assert_eq!(l.zoom_icon_at(800.0 - 30.0 - 40.0, 360.0), Some(ZoomIcon::In));
        assert_eq!(l.zoom_icon_at(800.0 - 30.0 - 10.0, 360.0), Some(ZoomIcon::Out));
    }

    #[test]
    fn legend_rows() {
        let l = Layout {
            legend: Some(Rect::new(55.0, 26.0, 100.0, 2.0 * LEGEND_ROW + 8.0)),
            ..Layout::new(800.0, 400.0, 40.0)
        };
        assert_eq!(l.legend_row_at(60.0, 26.0 + 4.0 + 1.0), Some(0));
        assert_eq!(l.legend_row_at(60.0, 26.0 + 4.0 + LEGEND_ROW + 1.0), Some(1));
        assert_eq!(l.legend_row_at(300.0, 40.0), None);
    }

    #[test]
    fn redraw_rate_limit() {
        let mut r = RedrawScheduler::new(0.1);
        assert_eq!(r.request(0.0, false), RedrawDecision::Draw);
        r.drawn(0.0);
        assert_eq!(r.request(0.05, false), RedrawDecision::Defer(0.1));
        assert_eq!(r.request(0.06, false), RedrawDecision::Coalesced);
        assert_eq!(r.request(0.07, true), RedrawDecision::Draw);
        r.drawn(0.07);
        assert_eq!(r.request(0.2, false), RedrawDecision::Draw);
    }

    fn scene_parts() -> (PanelSettings, SampleStore, Window) {
        let cfg = PanelConfig::from_json(
            r#"{"Timescale":"100","Variables":["A:x","B:y"],"Show values":true,"Show fill":true}"#,
        )
        .unwrap();
        let settings = PanelSettings::from_config("Group", "Panel", &cfg).unwrap();
        let mut store = SampleStore::new(&settings.series).unwrap();
        store.merge(&[
            (0..=100).map(|i| Sample::new(1000.0 + i as f64, i as f64)).collect(),
            Vec::new(),
        ]);
        let mut window = Window::new(&settings, 1100.0);
        window.autoscale(&store);
        (settings, store, window)
    }

    #[test]
    fn plan_contents() {
        let (settings, store, window) = scene_parts();
        let text = MonospaceEstimate::for_font_size(12.0);
        let (value_ticks, label_w) = value_axis(&window, 300.0, &text);
        let layout = Layout::new(600.0, 300.0, label_w);
        let mut cache = ProjectionCache::default();
        let projections = cache.get(&store, &window, layout.plot_width(), layout.plot_height(), 2.0);
        let interaction = Interaction::default();
        let last_written = [0.0, 0.0];
        let plan = build(&Scene {
            settings: &settings,
            window: &window,
            store: &store,
            projections,
            layout,
            value_ticks: &value_ticks,
            interaction: &interaction,
            pending: false,
            last_written: &last_written,
            now: 1100.0,
            tz: &Utc,
            text: &text,
            font_size: 12.0,
        });

        assert!(plan.has_text("Group - Panel"));
        assert!(plan.has_text("x: 100"));
        assert!(plan.has_text("y: no data"));
        assert!(!plan.has_text("Updating data"));
        assert!(plan.layout.legend.is_some());
        let areas = plan.shapes.iter().filter(|s| matches!(s, Shape::Area { .. })).count();
        assert_eq!(areas, 1);
        assert!(matches!(plan.shapes[0], Shape::Fill { .. }));
    }

    #[test]
    fn future_is_hatched() {
        let (settings, store, mut window) = scene_parts();
        window.t_max = 1200.0;
        let text = MonospaceEstimate::for_font_size(12.0);
        let (value_ticks, label_w) = value_axis(&window, 300.0, &text);
        let layout = Layout::new(600.0, 300.0, label_w);
        let interaction = Interaction::default();
        let plan = build(&Scene {
            settings: &settings,
            window: &window,
            store: &store,
            projections: &[],
            layout,
            value_ticks: &value_ticks,
            interaction: &interaction,
            pending: true,
            last_written: &[],
            now: 1100.0,
            tz: &Utc,
            text: &text,
            font_size: 12.0,
        });
        assert!(plan.shapes.iter().any(|s| matches!(s, Shape::Hatch { .. })));
        assert!(plan.has_text("Updating data ..."));
    }
}
