//! One history panel: the sample store, the window, loading, timers and
//! input, tied together behind an explicit `init`/`dispose` lifecycle.
//!
//! A panel never performs I/O or sleeps. The host drains
//! [`Panel::take_commands`], runs them (see [`crate::loader::execute`]) and
//! hands the [`Completion`]s back; it calls [`Panel::tick`] at
//! [`Panel::next_deadline`]; it acts on [`Panel::take_effects`] and paints
//! [`Panel::plan`] whenever [`Panel::take_repaint`] says so.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use serde::Serialize;
use url::form_urlencoded;

use crate::config::{time_to_sec, ChartParams, PanelConfig, PanelSettings};
use crate::dataset::SampleStore;
use crate::error::{ChartError, Result};
use crate::export;
use crate::interaction::{Button, InputContext, Interaction, Key, Modifiers, Response, UiAction};
use crate::loader::{Command, Completion, FetchKind, FetchRange, HistoryService, LoadState, Reply, Request, RequestId};
use crate::plan::{self, Layout, RedrawDecision, RedrawScheduler, RenderPlan, Scene};
use crate::project::ProjectionCache;
use crate::ticks::MonospaceEstimate;
use crate::timer::{TimerKind, TimerQueue};
use crate::window::Window;
use crate::wire::{decode_samples, LastWrittenRequest, SampleRequest};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Every panel instance gets a fresh generation, so completions issued by a
/// disposed predecessor can never be mistaken for its own.
pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Menu entries that are not plain durations.
pub const JUMP_BACK: &str = "<<";
pub const JUMP_OLDEST: &str = "<<<";

/// Something the host has to do on the panel's behalf. Serialises as
/// `{"type": ..., "data": ...}` for web pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum Effect {
    /// Non-blocking error message.
    Alert(String),
    /// Offer these entries; the choice goes to [`Panel::choose_timespan`].
    ShowTimespanMenu(Vec<String>),
    ShowDownloadMenu,
    ShowHelp,
    /// New page query string (without `?`).
    SetQuery(String),
    SaveCsv { filename: String, contents: String },
    /// Snapshot the canvas and save it under this name.
    SavePng { filename: String },
    /// Image history: show this file as the current frame.
    ShowImage { filename: String, time: f64 },
}

/// Host input, in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    PointerLeave,
    Wheel { x: f64, y: f64, dx: f64, dy: f64, mods: Modifiers },
    Key(Key),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    Csv,
    Png,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastWrittenUse {
    Legend,
    /// Newest data before the window, over all series.
    JumpBack,
    /// Oldest last-written time over all series.
    JumpOldest,
}

#[derive(Debug, Clone)]
enum Pending {
    Samples(FetchRange),
    LastWritten { purpose: LastWrittenUse, time: f64 },
}

pub struct Panel {
    settings: PanelSettings,
    params: ChartParams,
    store: SampleStore,
    window: Window,
    last_good: Window,
    load: LoadState,
    cache: ProjectionCache,
    interaction: Interaction,
    timers: TimerQueue,
    redraw: RedrawScheduler,
    text: MonospaceEstimate,
    layout: Layout,
    size: (f64, f64),
    generation: u64,
    disposed: bool,
    visible: bool,
    next_id: RequestId,
    inflight: HashMap<RequestId, Pending>,
    commands: Vec<Command>,
    effects: Vec<Effect>,
    last_written: Vec<f64>,
    repaint: bool,
    query: String,
    last_query: Option<String>,
}

impl Panel {
    /// Sets up the panel and queues the initial requests. `query` is the page
    /// query string; `A`/`B` in it restore a previous time range.
    pub fn init(settings: PanelSettings, params: ChartParams, now: f64, query: &str) -> Result<Panel> {
        let store = SampleStore::new(&settings.series)?;
        let mut window = Window::new(&settings, now);
        if let Some((a, b)) = time_range_from_query(query) {
            window.set_time_range(a, b);
        }
        let text = MonospaceEstimate::for_font_size(params.font_size as f64);
        let n = store.len();
        let mut panel = Panel {
            last_good: window.clone(),
            window,
            store,
            load: LoadState::new(),
            cache: ProjectionCache::default(),
            interaction: Interaction::new(),
            timers: TimerQueue::new(),
            redraw: RedrawScheduler::new(params.redraw_min_interval),
            text,
            layout: Layout::new(640.0, 400.0, 40.0),
            size: (640.0, 400.0),
            generation: next_generation(),
            disposed: false,
            visible: true,
            next_id: 0,
            inflight: HashMap::new(),
            commands: Vec::new(),
            effects: Vec::new(),
            last_written: vec![0.0; n],
            repaint: false,
            query: query.trim_start_matches('?').to_string(),
            last_query: None,
            settings,
            params,
        };

        log::debug!(
            "init panel {}/{} generation {}",
            panel.settings.group,
            panel.settings.panel,
            panel.generation
        );
        // one window's width of look-behind, whether live or restored
        let ranges = panel
            .load
            .initial(panel.window.t_min, panel.window.width(), now, &panel.params);
        for r in ranges {
            panel.request_samples(r);
        }
        panel.request_last_written(LastWrittenUse::Legend, now);
        panel.schedule_scroll(now);
        panel.redraw(true, now);
        Ok(panel)
    }

    /// Validates a raw panel document and initializes from it.
    pub fn from_config(
        group: &str,
        panel: &str,
        config: serde_json::Value,
        params: ChartParams,
        now: f64,
        query: &str,
    ) -> Result<Panel> {
        let cfg = PanelConfig::from_value(config)?;
        let settings = PanelSettings::from_config(group, panel, &cfg)?;
        Panel::init(settings, params, now, query)
    }

    /// Reads the panel document from the service, then initializes.
    pub async fn load<S: HistoryService>(
        service: &S,
        group: &str,
        panel: &str,
        params: ChartParams,
        now: f64,
        query: &str,
    ) -> Result<Panel> {
        let config = service.read_panel_config(group, panel).await?;
        Panel::from_config(group, panel, config, params, now, query)
    }

    /// Stops all timers and forgets outstanding requests; replies that still
    /// arrive are dropped.
    pub fn dispose(&mut self) {
        log::debug!("dispose panel {}/{}", self.settings.group, self.settings.panel);
        self.disposed = true;
        self.timers.clear();
        self.inflight.clear();
        self.commands.clear();
        self.effects.clear();
        self.repaint = false;
    }

    pub fn settings(&self) -> &PanelSettings { &self.settings }
    pub fn params(&self) -> &ChartParams { &self.params }
    pub fn store(&self) -> &SampleStore { &self.store }
    pub fn window(&self) -> &Window { &self.window }
    pub fn load_state(&self) -> &LoadState { &self.load }
    pub fn interaction(&self) -> &Interaction { &self.interaction }
    pub fn layout(&self) -> &Layout { &self.layout }
    pub fn timers(&self) -> &TimerQueue { &self.timers }
    pub fn last_written(&self) -> &[f64] { &self.last_written }
    pub fn generation(&self) -> u64 { self.generation }
    pub fn is_disposed(&self) -> bool { self.disposed }
    pub fn in_flight(&self) -> usize { self.inflight.len() }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// True once per frame that has to be painted.
    pub fn take_repaint(&mut self) -> bool {
        std::mem::replace(&mut self.repaint, false)
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.timers.next_deadline()
    }

    fn command(&mut self, request: Request, pending: Pending) {
        if self.disposed {
            return;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.inflight.insert(id, pending);
        self.commands.push(Command {
            generation: self.generation,
            id,
            request,
        });
    }

    fn request_samples(&mut self, r: FetchRange) {
        log::debug!("request {:?} [{}, {}]", r.kind, r.start, r.end);
        let req = SampleRequest::new(r.start, r.end, &self.store.keys());
        self.command(Request::Samples(req), Pending::Samples(r));
    }

    fn request_last_written(&mut self, purpose: LastWrittenUse, time: f64) {
        let req = LastWrittenRequest::new(time, &self.store.keys());
        self.command(Request::LastWritten(req), Pending::LastWritten { purpose, time });
    }

    fn backfill(&mut self) {
        if let Some(r) = self.load.backfill(self.window.t_min, self.window.width(), &self.params) {
            self.request_samples(r);
        }
    }

    /// Feeds a finished request back in. Replies for another generation, for
    /// a disposed panel or for an unknown id are dropped.
    pub fn complete(&mut self, c: Completion, now: f64) {
        if c.generation != self.generation || self.disposed {
            log::debug!("dropping reply {} of generation {}", c.id, c.generation);
            return;
        }
        let Some(pending) = self.inflight.remove(&c.id) else {
            log::debug!("dropping reply for unknown request {}", c.id);
            return;
        };
        match pending {
            Pending::Samples(r) => self.complete_samples(r, c.result, now),
            Pending::LastWritten { purpose, time } => self.complete_last_written(purpose, time, c.result, now),
        }
    }

    fn complete_samples(&mut self, r: FetchRange, result: Result<Reply>, now: f64) {
        let decoded = result.and_then(|reply| match reply {
            Reply::Samples(buf) => decode_samples(&buf, self.store.len()),
            other => Err(ChartError::Decode(format!("expected samples, got {other:?}"))),
        });
        match decoded {
            Ok(per_series) => {
                let inserted = self.store.merge(&per_series);
                self.load.complete(&r, true, self.store.last_timestamp());
                if inserted > 0 {
                    log::debug!("{inserted} new sample(s) from {:?}", r.kind);
                    self.window.autoscale(&self.store);
                    self.commit_window();
                }
            }
            Err(e) => {
                log::warn!("{:?} request [{}, {}] failed: {e}", r.kind, r.start, r.end);
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
            FetchKind::Backward | FetchKind::Range => self.backfill(),
            _ => {}
        }
        self.redraw(false, now);
    }

    fn complete_last_written(&mut self, purpose: LastWrittenUse, time: f64, result: Result<Reply>, now: f64) {
        let values = match result {
            Ok(Reply::LastWritten(v)) => v,
            Ok(other) => {
                self.effects
                    .push(Effect::Alert(format!("expected last-written times, got {other:?}")));
                return;
            }
            Err(e) => {
                log::warn!("get_last_written failed: {e}");
                self.effects.push(Effect::Alert(e.to_string()));
                return;
            }
        };
        // a service may report times past the one asked for
        let values: Vec<f64> = values.into_iter().map(|t| t.min(time)).collect();
        let known = values.iter().copied().filter(|&t| t > 0.0);
        let target = match purpose {
            LastWrittenUse::Legend => {
                self.last_written = values.clone();
                self.last_written.resize(self.store.len(), 0.0);
                self.redraw(false, now);
                return;
            }
            LastWrittenUse::JumpBack => known.reduce(f64::max),
            LastWrittenUse::JumpOldest => known.reduce(f64::min),
        };
        let Some(last) = target else {
            self.effects.push(Effect::Alert("No older data available".to_string()));
            return;
        };
        let scale = self.window.width();
        self.window.t_max = last + scale / 5.0;
        self.window.t_min = self.window.t_max - scale;
        self.window.follow_now = false;
        self.interaction.clear_marker();
        // backfill pages toward the jump target; fetch the view itself now
        let end = self.window.t_max.min(self.load.t_min_requested);
        if self.window.t_min < end {
            for r in self.load.range(self.window.t_min, end, &self.params) {
                self.request_samples(r);
            }
        }
        self.view_changed(now);
    }

    /// Runs every timer that is due.
    pub fn tick(&mut self, now: f64) {
        if self.disposed {
            return;
        }
        for kind in self.timers.expire(now) {
            match kind {
                TimerKind::Poll => self.on_poll(now),
                TimerKind::Scroll => {
                    if self.window.follow_now && !self.interaction.is_dragging() {
                        self.window.scroll_to(now);
                        self.window.autoscale(&self.store);
                        self.commit_window();
                        self.redraw(false, now);
                    }
                    self.schedule_scroll(now);
                }
                TimerKind::Inertia => {
                    let more = self
                        .interaction
                        .inertia_step(&mut self.window, self.layout.plot_width(), &self.params);
                    if more {
                        self.timers.reschedule(TimerKind::Inertia, now + self.params.inertia_tick);
                    }
                    self.view_changed(now);
                }
                TimerKind::UrlUpdate => {
                    let query = self.url_query();
                    if self.last_query.as_deref() != Some(query.as_str()) {
                        self.last_query = Some(query.clone());
                        self.effects.push(Effect::SetQuery(query));
                    }
                }
                TimerKind::Redraw => self.redraw(true, now),
                TimerKind::Play => {}
            }
        }
    }

    fn on_poll(&mut self, now: f64) {
        if !self.visible {
            self.timers.reschedule(TimerKind::Poll, now + self.params.hidden_poll_interval);
            return;
        }
        match self.load.poll(now) {
            Some(r) => self.request_samples(r),
            None => {
                self.timers.reschedule(TimerKind::Poll, now + self.params.poll_interval);
            }
        }
        // pick up a backfill that failed earlier
        self.backfill();
    }

    /// Live scrolling advances about one pixel per step.
    fn schedule_scroll(&mut self, now: f64) {
        let step = (self.window.width() / self.layout.plot_width()).clamp(0.1, 60.0);
        self.timers.reschedule(TimerKind::Scroll, now + step);
    }

    /// Page visibility. Polling pauses while hidden and resumes at once.
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
            self.layout = Layout {
                legend: self.layout.legend,
                ..Layout::new(width, height, self.layout.x1 - 15.0)
            };
            self.redraw(true, now);
        }
    }

    /// Requests a frame. Unforced requests are rate limited.
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

    /// Keeps the window as the last good one, or restores that one if the
    /// current bounds are not finite.
    fn commit_window(&mut self) {
        let w = &self.window;
        let finite = [w.t_min, w.t_max, w.y_min, w.y_max].iter().all(|v| v.is_finite());
        if finite && w.t_max > w.t_min && w.y_max > w.y_min {
            self.last_good = self.window.clone();
        } else {
            log::warn!("discarding invalid window {w:?}");
            self.window = self.last_good.clone();
        }
    }

    fn view_changed(&mut self, now: f64) {
        self.window.autoscale(&self.store);
        self.commit_window();
        self.backfill();
        self.redraw(false, now);
    }

    pub fn handle(&mut self, event: InputEvent, now: f64) {
        if self.disposed {
            return;
        }
        let (pw, ph) = (self.layout.plot_width(), self.layout.plot_height());
        let projections = self
            .cache
            .get(&self.store, &self.window, pw, ph, self.params.aggregation_threshold);
        let cx = InputContext {
            layout: &self.layout,
            store: &self.store,
            projections,
            time_scale: self.settings.time_scale,
            params: &self.params,
        };
        let ia = &mut self.interaction;
        let w = &mut self.window;
        let resp = match event {
            InputEvent::PointerDown { x, y } => ia.pointer_down(x, y, now, w, &cx),
            InputEvent::PointerMove { x, y } => ia.pointer_move(x, y, now, w, &cx),
            InputEvent::PointerUp { x, y } => ia.pointer_up(x, y, now, w, &cx),
            InputEvent::PointerLeave => ia.pointer_leave(),
            InputEvent::Wheel { x, y, dx, dy, mods } => ia.wheel(x, y, (dx, dy), mods, now, w, &cx),
            InputEvent::Key(k) => ia.key(k),
        };
        self.apply(resp, now);
    }

    fn apply(&mut self, resp: Response, now: f64) {
        if resp.start_inertia {
            self.timers.reschedule(TimerKind::Inertia, now + self.params.inertia_tick);
        }
        for action in resp.actions {
            self.act(action, now);
        }
        if resp.view_changed {
            self.view_changed(now);
        } else if resp.redraw {
            self.redraw(false, now);
        }
    }

    fn act(&mut self, action: UiAction, now: f64) {
        match action {
            UiAction::FollowNow => self.follow_now(now),
            UiAction::ResetAxes => self.reset_axes(now),
            UiAction::RevertAutoscale => self.revert_autoscale(now),
            UiAction::Button(b) => self.press(b, now),
        }
    }

    pub fn press(&mut self, button: Button, now: f64) {
        match button {
            Button::Legend => {
                self.interaction.toggle_legend();
                self.redraw(true, now);
            }
            Button::ResetAxes => self.reset_axes(now),
            Button::JumpToNow => self.follow_now(now),
            Button::Timespan => {
                let mut entries = self.settings.timespan_buttons.clone();
                entries.push(JUMP_BACK.to_string());
                entries.push(JUMP_OLDEST.to_string());
                self.effects.push(Effect::ShowTimespanMenu(entries));
            }
            Button::Download => self.effects.push(Effect::ShowDownloadMenu),
            Button::Help => self.effects.push(Effect::ShowHelp),
        }
    }

    /// Back to live mode over the configured time scale, autoscaled.
    pub fn reset_axes(&mut self, now: f64) {
        self.interaction.stop_inertia();
        self.interaction.clear_marker();
        self.window.reset(self.settings.time_scale, now, &self.store);
        self.view_changed(now);
    }

    /// Live mode, keeping the current width.
    pub fn follow_now(&mut self, now: f64) {
        self.interaction.stop_inertia();
        self.window.follow_now = true;
        self.window.scroll_to(now);
        self.view_changed(now);
    }

    pub fn revert_autoscale(&mut self, now: f64) {
        self.window.y_zoomed = false;
        self.view_changed(now);
    }

    /// A timespan menu entry: a duration such as `"3h"`, or one of the jumps.
    pub fn choose_timespan(&mut self, entry: &str, now: f64) -> Result<()> {
        match entry {
            JUMP_BACK => {
                self.request_last_written(LastWrittenUse::JumpBack, self.window.t_min);
                Ok(())
            }
            JUMP_OLDEST => {
                self.request_last_written(LastWrittenUse::JumpOldest, self.window.t_min);
                Ok(())
            }
            span => self.select_timespan(span, now),
        }
    }

    /// The last `span` up to now, in live mode.
    pub fn select_timespan(&mut self, span: &str, now: f64) -> Result<()> {
        let seconds = time_to_sec(span)?;
        if !(seconds > 0.0) {
            return Err(ChartError::UserInput(format!("'{span}' is not a positive duration")));
        }
        self.window.t_max = now;
        self.window.t_min = now - seconds;
        self.window.follow_now = true;
        self.view_changed(now);
        Ok(())
    }

    /// An explicit range, as typed by the user (`A` to `B`).
    pub fn set_range_text<Tz: TimeZone>(&mut self, a: &str, b: &str, tz: &Tz, now: f64) -> Result<()> {
        let t0 = parse_user_time(a, tz)?;
        let t1 = parse_user_time(b, tz)?;
        self.set_range(t0, t1, now)
    }

    pub fn set_range(&mut self, t0: f64, t1: f64, now: f64) -> Result<()> {
        if !(t1 > t0) {
            return Err(ChartError::UserInput("the end of the range must be after its start".to_string()));
        }
        self.interaction.stop_inertia();
        self.interaction.clear_marker();
        self.window.set_time_range(t0, t1);
        self.view_changed(now);
        Ok(())
    }

    pub fn download<Tz: TimeZone>(&mut self, kind: DownloadKind, tz: &Tz) -> Result<()>
    where
        Tz::Offset: std::fmt::Display,
    {
        let (g, p) = (&self.settings.group, &self.settings.panel);
        let (t0, t1) = (self.window.t_min, self.window.t_max);
        let effect = match kind {
            DownloadKind::Csv => Effect::SaveCsv {
                filename: export::file_name(g, p, t0, t1, tz, "csv"),
                contents: export::csv_string(&self.store, t0, t1)?,
            },
            DownloadKind::Png => Effect::SavePng {
                filename: export::file_name(g, p, t0, t1, tz, "png"),
            },
        };
        self.effects.push(effect);
        Ok(())
    }

    /// Page query with `A`/`B` set to the window, or removed in live mode.
    pub fn url_query(&self) -> String {
        let range = if self.window.follow_now {
            [("A", None), ("B", None)]
        } else {
            [
                ("A", Some(format!("{}", self.window.t_min.floor()))),
                ("B", Some(format!("{}", self.window.t_max.ceil()))),
            ]
        };
        set_query_params(&self.query, &range)
    }

    /// Builds the frame and remembers its layout for hit testing.
    pub fn plan<Tz: TimeZone>(&mut self, now: f64, tz: &Tz) -> RenderPlan
    where
        Tz::Offset: std::fmt::Display,
    {
        let (w, h) = self.size;
        let (value_ticks, label_w) = plan::value_axis(&self.window, h, &self.text);
        let mut layout = Layout::new(w, h, label_w);
        layout.show_zoom_buttons = self.settings.show_zoom_buttons;
        let projections = self.cache.get(
            &self.store,
            &self.window,
            layout.plot_width(),
            layout.plot_height(),
            self.params.aggregation_threshold,
        );
        let frame = plan::build(&Scene {
            settings: &self.settings,
            window: &self.window,
            store: &self.store,
            projections,
            layout,
            value_ticks: &value_ticks,
            interaction: &self.interaction,
            pending: self.load.is_busy(),
            last_written: &self.last_written,
            now,
            tz,
            text: &self.text,
            font_size: self.params.font_size,
        });
        self.layout = frame.layout;
        frame
    }
}

/// Value of `key` in a query string.
pub fn query_param(query: &str, key: &str) -> Option<String> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Replaces (or with `None` removes) the given keys, keeping all others.
pub fn set_query_params(query: &str, params: &[(&str, Option<String>)]) -> String {
    let mut out = form_urlencoded::Serializer::new(String::new());
    for (k, v) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
        if !params.iter().any(|(key, _)| *key == k) {
            out.append_pair(&k, &v);
        }
    }
    for (k, v) in params {
        if let Some(v) = v {
            out.append_pair(k, v);
        }
    }
    out.finish()
}

/// `A`/`B` from a page query, if both are times and `B > A`.
pub fn time_range_from_query(query: &str) -> Option<(f64, f64)> {
    let a: f64 = query_param(query, "A")?.parse().ok()?;
    let b: f64 = query_param(query, "B")?.parse().ok()?;
    (a.is_finite() && b.is_finite() && b > a).then_some((a, b))
}

/// Unix seconds, or a local date/time `YYYY-MM-DD[ HH:MM[:SS]]`.
pub fn parse_user_time<Tz: TimeZone>(text: &str, tz: &Tz) -> Result<f64> {
    let text = text.trim();
    if let Ok(t) = text.parse::<f64>() {
        if t.is_finite() {
            return Ok(t);
        }
    }
    let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| ChartError::UserInput(format!("'{text}' is not a date (YYYY-MM-DD HH:MM:SS)")))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|d| d.timestamp() as f64)
        .ok_or_else(|| ChartError::UserInput(format!("'{text}' does not exist in the local time zone")))
}
