//! Image history: a time ruler over an index of timestamped images, with
//! one current frame. Loading, timers and the command/completion flow work
//! like [`crate::panel::Panel`]; the host loads image bytes itself when it
//! sees [`Effect::ShowImage`].

use std::collections::HashMap;

use chrono::TimeZone;

use crate::config::{time_to_sec, ChartParams, PanelConfig};
use crate::error::{ChartError, Result};
use crate::interaction::{wheel_factor, Button, Key, ZoomIcon};
use crate::loader::{Command, Completion, FetchKind, FetchRange, HistoryService, LoadState, Reply, Request, RequestId};
use crate::panel::{next_generation, query_param, set_query_params, Effect, InputEvent};
use crate::plan::{self, Align, Color, Layout, Rect, RedrawDecision, RedrawScheduler, RenderPlan, Shape, ZOOM_ICON_SIZE};
use crate::ticks::{full_time, time_ticks, MonospaceEstimate, TextMeasure};
use crate::timer::{TimerKind, TimerQueue};
use crate::window::{pan_until, zoom_extent};
use crate::wire::{ImageIndex, ImageIndexRequest};

const DEFAULT_TIME_SCALE: f64 = 86400.0;

/// Pointer travel below which a press and release count as a click.
const CLICK_SLOP_PX: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ImageEntry {
    pub time: f64,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageSettings {
    pub image_set: String,
    pub time_scale: f64,
}

impl ImageSettings {
    /// Reads the image panel document. Only `Timescale` is used; it defaults
    /// to one day.
    pub fn from_value(image_set: &str, value: serde_json::Value) -> Result<Self> {
        if image_set.is_empty() {
            return Err(ChartError::config(
                "panel",
                "a non-empty image panel name (data-panel=\"<Panel>\")",
            ));
        }
        let cfg = PanelConfig::from_value(value)?;
        let time_scale = match cfg.timescale.as_deref() {
            Some(t) => time_to_sec(t).map_err(|_| ChartError::config("Timescale", "a duration such as \"1d\""))?,
            None => DEFAULT_TIME_SCALE,
        };
        if !(time_scale > 0.0) {
            return Err(ChartError::config("Timescale", "a positive duration"));
        }
        Ok(ImageSettings {
            image_set: image_set.to_string(),
            time_scale,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    x0: f64,
    t_min0: f64,
    t_max0: f64,
    moved: bool,
    last_x: f64,
    last_t: f64,
}

pub struct ImageHistory {
    settings: ImageSettings,
    params: ChartParams,
    t_min: f64,
    t_max: f64,
    follow_now: bool,
    entries: Vec<ImageEntry>,
    /// Selected frame time; `None` tracks the newest image.
    current: Option<f64>,
    shown: Option<String>,
    playing: bool,
    drag: Option<Drag>,
    velocity: f64,
    load: LoadState,
    timers: TimerQueue,
    redraw: RedrawScheduler,
    text: MonospaceEstimate,
    size: (f64, f64),
    generation: u64,
    disposed: bool,
    visible: bool,
    next_id: RequestId,
    inflight: HashMap<RequestId, FetchRange>,
    commands: Vec<Command>,
    effects: Vec<Effect>,
    repaint: bool,
    query: String,
    last_query: Option<String>,
}

impl ImageHistory {
    /// Starts in live mode over the configured time scale, or centred on the
    /// frame named by `T` in the page query.
    pub fn init(settings: ImageSettings, params: ChartParams, now: f64, query: &str) -> ImageHistory {
        let scale = settings.time_scale;
        let mut h = ImageHistory {
            t_min: now - scale,
            t_max: now,
            follow_now: true,
            entries: Vec::new(),
            current: None,
            shown: None,
            playing: false,
            drag: None,
            velocity: 0.0,
            load: LoadState::new(),
            timers: TimerQueue::new(),
            redraw: RedrawScheduler::new(params.redraw_min_interval),
            text: MonospaceEstimate::for_font_size(params.font_size as f64),
            size: (640.0, 60.0),
            generation: next_generation(),
            disposed: false,
            visible: true,
            next_id: 0,
            inflight: HashMap::new(),
            commands: Vec::new(),
            effects: Vec::new(),
            repaint: false,
            query: query.trim_start_matches('?').to_string(),
            last_query: None,
            settings,
            params,
        };
        let restored = query_param(query, "T")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|t| t.is_finite());
        if let Some(t) = restored {
            h.current = Some(t);
            h.follow_now = false;
            h.t_min = t - scale / 2.0;
            h.t_max = t + scale / 2.0;
        }

        log::debug!("init image history {} generation {}", h.settings.image_set, h.generation);
        let ranges = h.load.initial(h.t_min, scale, now, &h.params);
        for r in ranges {
            h.request(r);
        }
        h.schedule_scroll(now);
        h.redraw(true, now);
        h
    }

    pub fn from_config(
        image_set: &str,
        config: serde_json::Value,
        params: ChartParams,
        now: f64,
        query: &str,
    ) -> Result<ImageHistory> {
        let settings = ImageSettings::from_value(image_set, config)?;
        Ok(ImageHistory::init(settings, params, now, query))
    }

    pub async fn load<S: HistoryService>(
        service: &S,
        image_set: &str,
        params: ChartParams,
        now: f64,
        query: &str,
    ) -> Result<ImageHistory> {
        let config = service.read_image_config(image_set).await?;
        ImageHistory::from_config(image_set, config, params, now, query)
    }

    pub fn dispose(&mut self) {
        log::debug!("dispose image history {}", self.settings.image_set);
        self.disposed = true;
        self.playing = false;
        self.timers.clear();
        self.inflight.clear();
        self.commands.clear();
        self.effects.clear();
        self.repaint = false;
    }

    pub fn settings(&self) -> &ImageSettings { &self.settings }
    pub fn entries(&self) -> &[ImageEntry] { &self.entries }
    pub fn time_range(&self) -> (f64, f64) { (self.t_min, self.t_max) }
    pub fn is_following(&self) -> bool { self.follow_now }
    pub fn is_playing(&self) -> bool { self.playing }
    pub fn is_disposed(&self) -> bool { self.disposed }
    pub fn generation(&self) -> u64 { self.generation }
    pub fn timers(&self) -> &TimerQueue { &self.timers }
    pub fn load_state(&self) -> &LoadState { &self.load }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn take_repaint(&mut self) -> bool {
        std::mem::replace(&mut self.repaint, false)
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.timers.next_deadline()
    }

    fn layout(&self) -> Layout {
        Layout::strip(self.size.0, self.size.1)
    }

    fn play_rect(l: &Layout) -> Rect {
        Rect::new(l.width - 30.0 - 3.0 * ZOOM_ICON_SIZE, l.y1 - ZOOM_ICON_SIZE, ZOOM_ICON_SIZE, ZOOM_ICON_SIZE)
    }

    fn request(&mut self, r: FetchRange) {
        if self.disposed {
            return;
        }
        log::debug!("request image index {:?} [{}, {}]", r.kind, r.start, r.end);
        self.next_id += 1;
        let id = self.next_id;
        let request = Request::ImageIndex(ImageIndexRequest {
            image: self.settings.image_set.clone(),
            start: r.start.floor(),
            end: r.end.ceil(),
        });
        self.inflight.insert(id, r);
        self.commands.push(Command {
            generation: self.generation,
            id,
            request,
        });
    }

    fn backfill(&mut self) {
        if let Some(r) = self.load.backfill(self.t_min, self.t_max - self.t_min, &self.params) {
            self.request(r);
        }
    }

    /// Adds index entries, keeping them sorted with one entry per time.
    /// Returns how many were new.
    fn merge(&mut self, index: ImageIndex) -> Result<usize> {
        if index.time.len() != index.filename.len() {
            return Err(ChartError::Decode(format!(
                "image index has {} times but {} file names",
                index.time.len(),
                index.filename.len()
            )));
        }
        let before = self.entries.len();
        self.entries.extend(
            index
                .time
                .into_iter()
                .zip(index.filename)
                .filter(|(t, _)| t.is_finite())
                .map(|(time, filename)| ImageEntry { time, filename }),
        );
        self.entries.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.entries.dedup_by(|a, b| a.time == b.time);
        Ok(self.entries.len() - before)
    }

    pub fn complete(&mut self, c: Completion, now: f64) {
        if c.generation != self.generation || self.disposed {
            log::debug!("dropping image index reply {} of generation {}", c.id, c.generation);
            return;
        }
        let Some(r) = self.inflight.remove(&c.id) else {
            return;
        };
        let merged = c.result.and_then(|reply| match reply {
            Reply::ImageIndex(index) => self.merge(index),
            other => Err(ChartError::Decode(format!("expected an image index, got {other:?}"))),
        });
        match merged {
            Ok(n) => {
                let newest = self.entries.last().map(|e| e.time);
                self.load.complete(&r, true, newest);
                if n > 0 {
                    self.sync_shown();
                }
            }
            Err(e) => {
                log::warn!("image index [{}, {}] failed: {e}", r.start, r.end);
                self.load.complete(&r, false, None);
                self.effects.push(Effect::Alert(e.to_string()));
            }
        }
        match r.kind {
            FetchKind::Initial if self.load.initial_done() => {
                self.timers.ensure(TimerKind::Poll, now + self.params.poll_interval);
                self.backfill();
            }
            FetchKind::Poll => {
                self.timers.reschedule(TimerKind::Poll, now + self.params.poll_interval);
            }
            FetchKind::Backward => self.backfill(),
            _ => {}
        }
        self.redraw(false, now);
    }

    fn current_index(&self) -> Option<usize> {
        match self.current {
            None => self.entries.len().checked_sub(1),
            Some(t) => self.entries.partition_point(|e| e.time <= t).checked_sub(1),
        }
    }

    /// Newest entry at or before the current frame time.
    pub fn current_entry(&self) -> Option<&ImageEntry> {
        self.current_index().and_then(|i| self.entries.get(i))
    }

    pub fn current_time(&self) -> Option<f64> {
        self.current.or_else(|| self.entries.last().map(|e| e.time))
    }

    fn at_newest(&self) -> bool {
        match self.current_index() {
            Some(i) => i + 1 >= self.entries.len(),
            None => self.entries.is_empty(),
        }
    }

    fn sync_shown(&mut self) {
        let Some(e) = self.current_entry() else {
            return;
        };
        if self.shown.as_deref() != Some(e.filename.as_str()) {
            let (filename, time) = (e.filename.clone(), e.time);
            self.shown = Some(filename.clone());
            self.effects.push(Effect::ShowImage { filename, time });
        }
    }

    /// Makes `t` the current frame, moving the window if `t` is outside it.
    fn select(&mut self, t: f64, now: f64) {
        self.current = Some(t);
        if t < self.t_min || t > self.t_max {
            let half = (self.t_max - self.t_min) / 2.0;
            self.t_min = t - half;
            self.t_max = t + half;
            self.follow_now = false;
            self.backfill();
        }
        self.sync_shown();
        self.redraw(false, now);
    }

    fn advance(&mut self) -> Option<f64> {
        let next = self.current_index().map_or(0, |i| i + 1);
        self.entries.get(next).map(|e| e.time)
    }

    pub fn step_back(&mut self, now: f64) {
        self.stop();
        match self.current_index() {
            Some(i) if i > 0 => {
                let t = self.entries[i - 1].time;
                self.select(t, now);
            }
            _ => log::debug!("no older image loaded"),
        }
    }

    pub fn step_forward(&mut self, now: f64) {
        self.stop();
        if let Some(t) = self.advance() {
            self.select(t, now);
        }
    }

    /// Back to live mode showing the newest image.
    pub fn jump_to_newest(&mut self, now: f64) {
        self.stop();
        self.velocity = 0.0;
        self.current = None;
        self.follow_now = true;
        let width = self.t_max - self.t_min;
        self.t_max = now;
        self.t_min = now - width;
        self.sync_shown();
        self.backfill();
        self.redraw(false, now);
    }

    /// Plays forward one frame per `play_interval`. From the newest frame,
    /// playback restarts at the oldest frame in the window.
    pub fn play(&mut self, now: f64) {
        if self.playing || self.entries.is_empty() {
            return;
        }
        if self.at_newest() {
            let first = self.entries.partition_point(|e| e.time < self.t_min);
            let Some(t) = self.entries.get(first).map(|e| e.time) else {
                return;
            };
            self.select(t, now);
            if self.at_newest() {
                return;
            }
        }
        self.playing = true;
        self.timers.reschedule(TimerKind::Play, now + self.params.play_interval);
        self.redraw(false, now);
    }

    pub fn stop(&mut self) {
        if self.playing {
            self.playing = false;
            self.timers.cancel_kind(TimerKind::Play);
        }
    }

    pub fn toggle_play(&mut self, now: f64) {
        if self.playing {
            self.stop();
            self.redraw(false, now);
        } else {
            self.play(now);
        }
    }

    pub fn zoom_icon(&mut self, icon: ZoomIcon, now: f64) {
        let d = self.t_max - self.t_min;
        match (icon, self.follow_now) {
            (ZoomIcon::In, false) => {
                self.t_min += d / 4.0;
                self.t_max -= d / 4.0;
            }
            (ZoomIcon::In, true) => self.t_min += d / 2.0,
            (ZoomIcon::Out, false) => {
                self.t_min -= d / 2.0;
                self.t_max += d / 2.0;
            }
            (ZoomIcon::Out, true) => self.t_min -= d,
        }
        self.velocity = 0.0;
        self.backfill();
        self.redraw(false, now);
    }

    /// The last `span` up to now, in live mode.
    pub fn select_timespan(&mut self, span: &str, now: f64) -> Result<()> {
        let seconds = time_to_sec(span)?;
        if !(seconds > 0.0) {
            return Err(ChartError::UserInput(format!("'{span}' is not a positive duration")));
        }
        self.stop();
        self.velocity = 0.0;
        self.follow_now = true;
        self.t_max = now;
        self.t_min = now - seconds;
        self.sync_shown();
        self.backfill();
        self.redraw(false, now);
        Ok(())
    }

    pub fn set_range(&mut self, t0: f64, t1: f64, now: f64) -> Result<()> {
        if !(t1 > t0) {
            return Err(ChartError::UserInput("the end of the range must be after its start".to_string()));
        }
        self.stop();
        self.velocity = 0.0;
        self.follow_now = false;
        self.t_min = t0;
        self.t_max = t1;
        self.backfill();
        self.redraw(false, now);
        Ok(())
    }

    fn time_at(&self, x: f64) -> f64 {
        let l = self.layout();
        self.t_min + (x - l.x1) / l.plot_width() * (self.t_max - self.t_min)
    }

    fn x_of(&self, t: f64) -> f64 {
        let l = self.layout();
        l.x1 + (t - self.t_min) / (self.t_max - self.t_min) * l.plot_width()
    }

    fn in_ruler(&self, x: f64, y: f64) -> bool {
        let l = self.layout();
        x >= l.x1 && x <= l.x2 && y >= 0.0 && y <= l.height
    }

    /// Selects the image at or before the time under `x`, or the first one
    /// after it.
    fn select_at(&mut self, x: f64, now: f64) {
        let t = self.time_at(x);
        let i = self.entries.partition_point(|e| e.time <= t);
        let target = i
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .or_else(|| self.entries.get(i))
            .map(|e| e.time);
        if let Some(t) = target {
            self.stop();
            self.select(t, now);
        }
    }

    fn shift(&mut self, dt: f64) {
        self.t_min += dt;
        self.t_max += dt;
    }

    pub fn handle(&mut self, event: InputEvent, now: f64) {
        if self.disposed {
            return;
        }
        let l = self.layout();
        match event {
            InputEvent::PointerDown { x, y } => {
                self.velocity = 0.0;
                if l.button_rect(0).contains(x, y) {
                    self.jump_to_newest(now);
                } else if let Some(icon) = l.zoom_icon_at(x, y) {
                    self.zoom_icon(icon, now);
                } else if Self::play_rect(&l).contains(x, y) {
                    self.toggle_play(now);
                } else if self.in_ruler(x, y) {
                    self.drag = Some(Drag {
                        x0: x,
                        t_min0: self.t_min,
                        t_max0: self.t_max,
                        moved: false,
                        last_x: x,
                        last_t: now,
                    });
                }
            }
            InputEvent::PointerMove { x, .. } => {
                let Some(mut d) = self.drag else {
                    return;
                };
                if (x - d.x0).abs() >= CLICK_SLOP_PX {
                    d.moved = true;
                }
                if d.moved {
                    let dt = (d.x0 - x) / l.plot_width() * (d.t_max0 - d.t_min0);
                    self.t_min = d.t_min0 + dt;
                    self.t_max = d.t_max0 + dt;
                    self.follow_now = false;
                    if now > d.last_t {
                        self.velocity = (x - d.last_x) / (now - d.last_t);
                    }
                    d.last_x = x;
                    d.last_t = now;
                    self.backfill();
                    self.redraw(false, now);
                }
                self.drag = Some(d);
            }
            InputEvent::PointerUp { x, .. } => {
                let Some(d) = self.drag.take() else {
                    return;
                };
                if !d.moved {
                    self.select_at(x, now);
                } else if self.velocity.abs() > self.params.inertia_stop_speed && now - d.last_t < 0.1 {
                    self.timers.reschedule(TimerKind::Inertia, now + self.params.inertia_tick);
                } else {
                    self.velocity = 0.0;
                }
            }
            InputEvent::PointerLeave => {
                self.drag = None;
            }
            InputEvent::Wheel { x, y, dx, dy, mods } => {
                if !self.in_ruler(x, y) {
                    return;
                }
                let width = self.t_max - self.t_min;
                if mods.ctrl || mods.meta {
                    let anchor = if self.follow_now { self.t_max } else { self.time_at(x) };
                    let zoomed = zoom_extent(
                        (self.t_min, self.t_max),
                        anchor,
                        wheel_factor(dy),
                        self.settings.time_scale,
                        self.params.max_zoom_ratio,
                        now,
                    );
                    let Some((t_min, t_max)) = zoomed else {
                        return;
                    };
                    self.t_min = t_min;
                    self.t_max = t_max;
                } else {
                    let d = if dx != 0.0 { dx } else { dy };
                    let dt = pan_until(self.t_max, d / 100.0 * self.params.wheel_pan_fraction * width, now);
                    if dt == 0.0 {
                        return;
                    }
                    self.shift(dt);
                    self.follow_now = false;
                }
                self.velocity = 0.0;
                self.backfill();
                self.redraw(false, now);
            }
            InputEvent::Key(key) => match key {
                Key::Left => self.step_back(now),
                Key::Right => self.step_forward(now),
                Key::Char('u') => self.jump_to_newest(now),
                Key::Char(' ') | Key::Char('p') => self.toggle_play(now),
                Key::Escape => {
                    self.stop();
                    self.redraw(false, now);
                }
                Key::Char(_) => {}
            },
        }
    }

    pub fn tick(&mut self, now: f64) {
        if self.disposed {
            return;
        }
        for kind in self.timers.expire(now) {
            match kind {
                TimerKind::Poll => {
                    if !self.visible {
                        self.timers
                            .reschedule(TimerKind::Poll, now + self.params.hidden_poll_interval);
                        continue;
                    }
                    match self.load.poll(now) {
                        Some(r) => self.request(r),
                        None => {
                            self.timers.reschedule(TimerKind::Poll, now + self.params.poll_interval);
                        }
                    }
                    self.backfill();
                }
                TimerKind::Scroll => {
                    if self.follow_now && self.drag.is_none() {
                        let width = self.t_max - self.t_min;
                        self.t_max = now;
                        self.t_min = now - width;
                        self.redraw(false, now);
                    }
                    self.schedule_scroll(now);
                }
                TimerKind::Play => {
                    if !self.playing {
                        continue;
                    }
                    match self.advance() {
                        Some(t) => {
                            self.select(t, now);
                            if self.at_newest() {
                                self.stop();
                            } else {
                                self.timers.reschedule(TimerKind::Play, now + self.params.play_interval);
                            }
                        }
                        None => self.stop(),
                    }
                }
                TimerKind::Inertia => {
                    let l = self.layout();
                    let width = self.t_max - self.t_min;
                    self.shift(-self.velocity * self.params.inertia_tick / l.plot_width() * width);
                    self.velocity *= self.params.inertia_decay;
                    if self.velocity.abs() > self.params.inertia_stop_speed {
                        self.timers.reschedule(TimerKind::Inertia, now + self.params.inertia_tick);
                    } else {
                        self.velocity = 0.0;
                    }
                    self.backfill();
                    self.redraw(false, now);
                }
                TimerKind::UrlUpdate => {
                    let query = self.url_query();
                    if self.last_query.as_deref() != Some(query.as_str()) {
                        self.last_query = Some(query.clone());
                        self.effects.push(Effect::SetQuery(query));
                    }
                }
                TimerKind::Redraw => self.redraw(true, now),
            }
        }
    }

    fn schedule_scroll(&mut self, now: f64) {
        let step = ((self.t_max - self.t_min) / self.layout().plot_width()).clamp(0.1, 60.0);
        self.timers.reschedule(TimerKind::Scroll, now + step);
    }

    pub fn set_visible(&mut self, visible: bool, now: f64) {
        let was = self.visible;
        self.visible = visible;
        if visible && !was && self.load.initial_done() {
            self.timers.reschedule(TimerKind::Poll, now);
        }
    }

    pub fn resize(&mut self, width: f64, height: f64, now: f64) {
        if width > 0.0 && height > 0.0 && (width, height) != self.size {
            self.size = (width, height);
            self.redraw(true, now);
        }
    }

    pub fn redraw(&mut self, force: bool, now: f64) {
        if self.disposed {
            return;
        }
        match self.redraw.request(now, force) {
            RedrawDecision::Draw => {
                self.repaint = true;
                self.redraw.drawn(now);
                self.timers.reschedule(TimerKind::UrlUpdate, now + self.params.url_debounce);
            }
            RedrawDecision::Defer(at) => self.timers.ensure(TimerKind::Redraw, at),
            RedrawDecision::Coalesced => {}
        }
    }

    /// Page query with `T` set to the selected frame, or removed while the
    /// newest image is tracked.
    pub fn url_query(&self) -> String {
        let t = self.current.map(|t| format!("{}", t.floor()));
        set_query_params(&self.query, &[("T", t)])
    }

    pub fn plan<Tz: TimeZone>(&self, now: f64, tz: &Tz) -> RenderPlan
    where
        Tz::Offset: std::fmt::Display,
    {
        let l = self.layout();
        let fs = self.params.font_size;
        let mut plan = RenderPlan {
            width: l.width,
            height: l.height,
            layout: l,
            shapes: Vec::new(),
        };
        plan.fill(Rect::new(0.0, 0.0, l.width, l.height), Color::WHITE);

        if self.t_max > now {
            let x = self.x_of(now).max(l.x1);
            if x < l.x2 {
                plan.shapes.push(Shape::Hatch {
                    rect: Rect::new(x, l.y2, l.x2 - x, l.y1 - l.y2),
                    color: Color::LIGHT_GREY,
                    spacing: 10.0,
                });
            }
        }

        // ruler
        let tt = time_ticks(self.t_min, self.t_max, l.plot_width(), now, tz, &self.text);
        plan.line(vec![[l.x1, l.y1], [l.x2, l.y1]], Color::GREY);
        for &t in &tt.minor {
            let x = self.x_of(t);
            let len = if tt.major.contains(&t) { 8.0 } else { 4.0 };
            plan.line(vec![[x, l.y1], [x, l.y1 + len]], Color::GREY);
        }
        for label in &tt.labeled {
            plan.text(self.x_of(label.value), l.y1 + 9.0, label.text.clone(), Color::TEXT, Align::Center, fs);
        }

        // one mark per image
        let lo = self.entries.partition_point(|e| e.time < self.t_min);
        let hi = self.entries.partition_point(|e| e.time <= self.t_max);
        for e in &self.entries[lo..hi.max(lo)] {
            let x = self.x_of(e.time);
            plan.line(vec![[x, l.y1 - 10.0], [x, l.y1]], Color::GREY);
        }

        let mid = (l.x1 + l.x2) / 2.0;
        if let Some(e) = self.current_entry() {
            let x = self.x_of(e.time);
            if x >= l.x1 && x <= l.x2 {
                plan.line(vec![[x, l.y2], [x, l.y1]], Color::RED);
            }
            let label = format!("{} {}", full_time(e.time, tz), e.filename);
            let (tx, align) = if x < mid { (x.max(l.x1) + 4.0, Align::Left) } else { (x.min(l.x2) - 4.0, Align::Right) };
            plan.text(tx, l.y2, label, Color::TEXT, align, fs);
        }

        if self.load.is_busy() {
            plan.text(mid, l.y2, "Updating data ...", Color::RED, Align::Center, fs);
        } else if self.entries.is_empty() {
            let y = (l.y1 + l.y2) / 2.0 - self.text.height() / 2.0;
            plan.text(mid, y, "No images available", Color::RED, Align::Center, fs);
        }

        // controls
        let r = Self::play_rect(&l);
        plan.fill(r, Color::BUTTON);
        plan.stroke(r, Color::GREY);
        let glyph = if self.playing { "||" } else { ">" };
        plan.text(r.x + r.w / 2.0, r.y + 4.0, glyph, Color::TEXT, Align::Center, fs);
        plan::zoom_icons(&mut plan, &l);
        let b = l.button_rect(0);
        plan.fill(b, if self.follow_now { Color::BUTTON } else { Color::BUTTON_OFF });
        plan.stroke(b, Color::GREY);
        plan.text(b.x + b.w / 2.0, b.y + 6.0, Button::JumpToNow.glyph(), Color::TEXT, Align::Center, fs);
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::Modifiers;
    use chrono::Utc;

    const DAY: f64 = 86400.0;

    fn history(now: f64, query: &str) -> ImageHistory {
        let cfg = serde_json::json!({ "Timescale": "1d" });
        let mut h = ImageHistory::from_config("Cam", cfg, ChartParams::default(), now, query).unwrap();
        h.resize(400.0, 60.0, now);
        h
    }

    fn index(times: &[f64]) -> Reply {
        Reply::ImageIndex(ImageIndex {
            time: times.to_vec(),
            filename: times.iter().map(|t| format!("{t}.jpg")).collect(),
        })
    }

    fn feed(h: &mut ImageHistory, times: &[f64], now: f64) {
        for cmd in h.take_commands() {
            let result = if matches!(&cmd.request, Request::ImageIndex(r) if r.start <= times[0]) {
                Ok(index(times))
            } else {
                Ok(index(&[]))
            };
            let c = Completion {
                generation: h.generation(),
                id: cmd.id,
                result,
            };
            h.complete(c, now);
        }
    }

    #[test]
    fn defaults_to_one_day() {
        let s = ImageSettings::from_value("Cam", serde_json::json!({})).unwrap();
        assert_eq!(s.time_scale, DAY);
        assert!(ImageSettings::from_value("", serde_json::json!({})).is_err());
    }

    #[test]
    fn initial_index_shows_newest() {
        let now = 10.0 * DAY;
        let mut h = history(now, "");
        let cmds = h.take_commands();
        assert_eq!(cmds.len(), 1);
        let Request::ImageIndex(req) = &cmds[0].request else {
            panic!("expected an image index request");
        };
        assert_eq!((req.image.as_str(), req.start, req.end), ("Cam", now - 2.0 * DAY, now));
        h.complete(
            Completion {
                generation: h.generation(),
                id: cmds[0].id,
                result: Ok(index(&[now - 30.0, now - 20.0, now - 10.0])),
            },
            now,
        );
        assert_eq!(h.entries().len(), 3);
        assert_eq!(h.current_entry().map(|e| e.time), Some(now - 10.0));
        let effects = h.take_effects();
        assert!(effects.contains(&Effect::ShowImage {
            filename: format!("{}.jpg", now - 10.0),
            time: now - 10.0
        }));
    }

    #[test]
    fn mismatched_index_is_an_alert() {
        let now = 10.0 * DAY;
        let mut h = history(now, "");
        let cmd = h.take_commands().remove(0);
        let bad = Reply::ImageIndex(ImageIndex {
            time: vec![1.0, 2.0],
            filename: vec!["a".into()],
        });
        h.complete(
            Completion {
                generation: h.generation(),
                id: cmd.id,
                result: Ok(bad),
            },
            now,
        );
        assert!(h.entries().is_empty());
        assert!(matches!(h.take_effects().as_slice(), [Effect::Alert(_)]));
    }

    #[test]
    fn stepping_and_url() {
        let now = 10.0 * DAY;
        let mut h = history(now, "x=1");
        feed(&mut h, &[now - 300.0, now - 200.0, now - 100.0], now);
        h.step_back(now);
        assert_eq!(h.current_entry().map(|e| e.time), Some(now - 200.0));
        h.handle(InputEvent::Key(Key::Left), now);
        assert_eq!(h.current_entry().map(|e| e.time), Some(now - 300.0));
        // nothing older is loaded
        h.step_back(now);
        assert_eq!(h.current_entry().map(|e| e.time), Some(now - 300.0));
        assert_eq!(h.url_query(), format!("x=1&T={}", now - 300.0));
        h.step_forward(now);
        assert_eq!(h.current_time(), Some(now - 200.0));
        h.jump_to_newest(now);
        assert_eq!(h.current_entry().map(|e| e.time), Some(now - 100.0));
        assert_eq!(h.url_query(), "x=1");
    }

    #[test]
    fn restores_frame_from_query() {
        let now = 10.0 * DAY;
        let t = 5.0 * DAY;
        let mut h = history(now, &format!("T={t}"));
        assert!(!h.is_following());
        assert_eq!(h.time_range(), (t - DAY / 2.0, t + DAY / 2.0));
        feed(&mut h, &[t - 60.0, t + 60.0], now);
        assert_eq!(h.current_entry().map(|e| e.time), Some(t - 60.0));
    }

    #[test]
    fn playback_stops_at_newest() {
        let now = 10.0 * DAY;
        let mut h = history(now, "");
        feed(&mut h, &[now - 30.0, now - 20.0, now - 10.0], now);
        h.play(now);
        assert!(h.is_playing());
        // restarted at the oldest frame in the window
        assert_eq!(h.current_time(), Some(now - 30.0));
        let step = ChartParams::default().play_interval;
        h.tick(now + step);
        assert_eq!(h.current_time(), Some(now - 20.0));
        assert!(h.is_playing());
        h.tick(now + 2.0 * step);
        assert_eq!(h.current_time(), Some(now - 10.0));
        assert!(!h.is_playing());
        assert!(!h.timers().is_scheduled(TimerKind::Play));
    }

    #[test]
    fn click_on_ruler_selects_frame() {
        let now = 10.0 * DAY;
        let mut h = history(now, "");
        feed(&mut h, &[now - 0.75 * DAY, now - 0.25 * DAY], now);
        let l = Layout::strip(400.0, 60.0);
        let x = l.x1 + 0.5 * l.plot_width();
        h.handle(InputEvent::PointerDown { x, y: 20.0 }, now);
        h.handle(InputEvent::PointerUp { x, y: 20.0 }, now);
        assert_eq!(h.current_time(), Some(now - 0.75 * DAY));
    }

    #[test]
    fn drag_pans_and_leaves_live_mode() {
        let now = 10.0 * DAY;
        let mut h = history(now, "");
        let l = Layout::strip(400.0, 60.0);
        let x = l.x1 + 100.0;
        h.handle(InputEvent::PointerDown { x, y: 20.0 }, now);
        h.handle(InputEvent::PointerMove { x: x + l.plot_width() / 4.0, y: 20.0 }, now + 0.5);
        h.handle(InputEvent::PointerUp { x: x + l.plot_width() / 4.0, y: 20.0 }, now + 2.0);
        assert!(!h.is_following());
        let (t0, t1) = h.time_range();
        assert!((t1 - (now - DAY / 4.0)).abs() < 1e-6);
        assert!((t1 - t0 - DAY).abs() < 1e-6);
        assert!(!h.timers().is_scheduled(TimerKind::Inertia));
    }

    #[test]
    fn zoom_icons_and_wheel() {
        let now = 10.0 * DAY;
        let mut h = history(now, "");
        h.zoom_icon(ZoomIcon::In, now);
        assert_eq!(h.time_range(), (now - DAY / 2.0, now));
        h.zoom_icon(ZoomIcon::Out, now);
        assert_eq!(h.time_range(), (now - DAY, now));
        let l = Layout::strip(400.0, 60.0);
        let wheel = |dy: f64, ctrl: bool| InputEvent::Wheel {
            x: l.x1 + 10.0,
            y: 20.0,
            dx: 0.0,
            dy,
            mods: Modifiers { ctrl, ..Modifiers::default() },
        };
        // already at now: scrolling forward does nothing
        h.handle(wheel(100.0, false), now);
        assert!(h.is_following());
        assert_eq!(h.time_range(), (now - DAY, now));
        h.handle(wheel(-100.0, false), now);
        assert!(!h.is_following());
        assert_eq!(h.time_range(), (now - DAY - 8_640.0, now - 8_640.0));
        h.handle(wheel(300.0, false), now);
        assert_eq!(h.time_range(), (now - DAY, now));

        // zooming in stops at a thousandth of the configured scale
        for _ in 0..200 {
            h.handle(wheel(-100.0, true), now);
        }
        let (t0, t1) = h.time_range();
        assert!(t1 - t0 > DAY / 1000.0, "{}", t1 - t0);
        assert!(t1 <= now);
    }

    #[test]
    fn plan_marks_current_frame() {
        let now = 10.0 * DAY;
        let mut h = history(now, "");
        let empty = h.plan(now, &Utc);
        assert!(empty.has_text("Updating data"));
        feed(&mut h, &[now - 100.0], now);
        let plan = h.plan(now, &Utc);
        assert!(plan.has_text(&format!("{}.jpg", now - 100.0)));
        assert!(plan
            .shapes
            .iter()
            .any(|s| matches!(s, Shape::Line { color, .. } if *color == Color::RED)));
    }

    #[test]
    fn dispose_drops_replies() {
        let now = 10.0 * DAY;
        let mut h = history(now, "");
        let cmd = h.take_commands().remove(0);
        h.dispose();
        h.complete(
            Completion {
                generation: h.generation(),
                id: cmd.id,
                result: Ok(index(&[now - 1.0])),
            },
            now,
        );
        assert!(h.entries().is_empty());
        assert!(h.timers().is_empty());
    }

    #[test]
    fn explicit_range_and_timespan() {
        let now = 10.0 * DAY;
        let mut h = history(now, "");
        h.set_range(now - 3.0 * DAY, now - 2.0 * DAY, now).unwrap();
        assert_eq!(h.time_range(), (now - 3.0 * DAY, now - 2.0 * DAY));
        assert!(!h.is_following());
        assert!(h.set_range(5.0, 5.0, now).is_err());

        h.select_timespan("2h", now).unwrap();
        assert_eq!(h.time_range(), (now - 7200.0, now));
        assert!(h.is_following());
        assert!(matches!(h.select_timespan("0", now), Err(ChartError::UserInput(_))));
    }
}
