//! The winit application hosting one or more charts, natively in windows
//! and on the web in page canvases.

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use chrono::Local;
use web_time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoopProxy};
use winit::keyboard::{Key as WinitKey, NamedKey};
use winit::window::{Window, WindowId};

use crate::config::ChartParams;
use crate::error::{ChartError, Result};
use crate::gpu::Surface;
use crate::images::ImageHistory;
use crate::interaction::{Key, Modifiers};
use crate::loader::{self, Command, Completion, HistoryService};
use crate::panel::{parse_user_time, DownloadKind, Effect, InputEvent, Panel};
use crate::plan::RenderPlan;

/// Pixels per wheel line, as browsers report a wheel notch.
const WHEEL_LINE_PX: f64 = 100.0;

/// Commands run synchronously per event loop turn natively.
#[cfg(not(target_arch = "wasm32"))]
const SYNC_COMMANDS_PER_TURN: usize = 16;

/// Wall clock in seconds since the Unix epoch.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Requests from outside the canvas: menu choices and dialogs.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    ChooseTimespan(String),
    /// Start and end as typed, local time or Unix seconds.
    SetRange(String, String),
    Download(DownloadKind),
}

/// A chart the host can drive without knowing which kind it is.
pub trait Widget {
    fn resize(&mut self, width: f64, height: f64, now: f64);
    fn handle(&mut self, event: InputEvent, now: f64);
    fn tick(&mut self, now: f64);
    fn next_deadline(&self) -> Option<f64>;
    fn take_commands(&mut self) -> Vec<Command>;
    fn complete(&mut self, completion: Completion, now: f64);
    fn take_effects(&mut self) -> Vec<Effect>;
    fn take_repaint(&mut self) -> bool;
    fn set_visible(&mut self, visible: bool, now: f64);
    /// The frame to paint, labelled in local time.
    fn frame(&mut self, now: f64) -> RenderPlan;
    fn command(&mut self, command: HostCommand, now: f64) -> Result<()>;
    fn dispose(&mut self);
}

impl Widget for Panel {
    fn resize(&mut self, width: f64, height: f64, now: f64) { Panel::resize(self, width, height, now) }
    fn handle(&mut self, event: InputEvent, now: f64) { Panel::handle(self, event, now) }
    fn tick(&mut self, now: f64) { Panel::tick(self, now) }
    fn next_deadline(&self) -> Option<f64> { Panel::next_deadline(self) }
    fn take_commands(&mut self) -> Vec<Command> { Panel::take_commands(self) }
    fn complete(&mut self, completion: Completion, now: f64) { Panel::complete(self, completion, now) }
    fn take_effects(&mut self) -> Vec<Effect> { Panel::take_effects(self) }
    fn take_repaint(&mut self) -> bool { Panel::take_repaint(self) }
    fn set_visible(&mut self, visible: bool, now: f64) { Panel::set_visible(self, visible, now) }
    fn frame(&mut self, now: f64) -> RenderPlan { self.plan(now, &Local) }
    fn dispose(&mut self) { Panel::dispose(self) }

    fn command(&mut self, command: HostCommand, now: f64) -> Result<()> {
        match command {
            HostCommand::ChooseTimespan(entry) => self.choose_timespan(&entry, now),
            HostCommand::SetRange(a, b) => self.set_range_text(&a, &b, &Local, now),
            HostCommand::Download(kind) => self.download(kind, &Local),
        }
    }
}

impl Widget for ImageHistory {
    fn resize(&mut self, width: f64, height: f64, now: f64) { ImageHistory::resize(self, width, height, now) }
    fn handle(&mut self, event: InputEvent, now: f64) { ImageHistory::handle(self, event, now) }
    fn tick(&mut self, now: f64) { ImageHistory::tick(self, now) }
    fn next_deadline(&self) -> Option<f64> { ImageHistory::next_deadline(self) }
    fn take_commands(&mut self) -> Vec<Command> { ImageHistory::take_commands(self) }
    fn complete(&mut self, completion: Completion, now: f64) { ImageHistory::complete(self, completion, now) }
    fn take_effects(&mut self) -> Vec<Effect> { ImageHistory::take_effects(self) }
    fn take_repaint(&mut self) -> bool { ImageHistory::take_repaint(self) }
    fn set_visible(&mut self, visible: bool, now: f64) { ImageHistory::set_visible(self, visible, now) }
    fn frame(&mut self, now: f64) -> RenderPlan { self.plan(now, &Local) }
    fn dispose(&mut self) { ImageHistory::dispose(self) }

    fn command(&mut self, command: HostCommand, now: f64) -> Result<()> {
        match command {
            HostCommand::ChooseTimespan(span) => self.select_timespan(&span, now),
            HostCommand::SetRange(a, b) => {
                let t0 = parse_user_time(&a, &Local)?;
                let t1 = parse_user_time(&b, &Local)?;
                self.set_range(t0, t1, now)
            }
            HostCommand::Download(_) => Err(ChartError::UserInput("image histories have no download".to_string())),
        }
    }
}

/// What a canvas shows.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Panel { group: String, panel: String },
    Images { image_set: String },
}

impl Target {
    pub fn title(&self) -> String {
        match self {
            Target::Panel { group, panel } => format!("{group} / {panel}"),
            Target::Images { image_set } => format!("Images / {image_set}"),
        }
    }

    /// Reads the configuration document and builds the widget.
    pub async fn load<S: HistoryService>(
        &self,
        service: &S,
        params: ChartParams,
        now: f64,
        query: &str,
    ) -> Result<Box<dyn Widget>> {
        let widget: Box<dyn Widget> = match self {
            Target::Panel { group, panel } => Box::new(Panel::load(service, group, panel, params, now, query).await?),
            Target::Images { image_set } => Box::new(ImageHistory::load(service, image_set, params, now, query).await?),
        };
        Ok(widget)
    }
}

/// Event loop messages: attachments from the page, and results of the
/// futures the host spawned.
pub enum HostEvent {
    Attach { name: String, target: Target },
    Detach { name: String },
    Command { name: String, command: HostCommand },
    SurfaceReady { slot: SlotKey, surface: Result<Surface> },
    Loaded { slot: SlotKey, widget: Result<Box<dyn Widget>> },
    Completion { slot: SlotKey, completion: Completion },
}

/// A slot index plus the attachment it was handed out for, so results for
/// a detached chart never reach whatever reuses its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotKey {
    index: usize,
    epoch: u64,
}

/// Attached charts. Detaching frees the entry for the next attachment.
struct Slots<T> {
    entries: Vec<(u64, Option<T>)>,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Slots { entries: Vec::new() }
    }

    fn insert(&mut self, value: T) -> SlotKey {
        let index = match self.entries.iter().position(|(_, v)| v.is_none()) {
            Some(i) => i,
            None => {
                self.entries.push((0, None));
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[index];
        entry.0 += 1;
        entry.1 = Some(value);
        SlotKey { index, epoch: entry.0 }
    }

    fn remove(&mut self, index: usize) -> Option<T> {
        self.entries.get_mut(index)?.1.take()
    }

    fn key(&self, index: usize) -> Option<SlotKey> {
        match self.entries.get(index)? {
            (epoch, Some(_)) => Some(SlotKey { index, epoch: *epoch }),
            (_, None) => None,
        }
    }

    /// The index behind `key` if that attachment is still there.
    fn resolve(&self, key: SlotKey) -> Option<usize> {
        (self.key(key.index) == Some(key)).then_some(key.index)
    }

    fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)?.1.as_ref()
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)?.1.as_mut()
    }

    fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, (_, v))| Some((i, v.as_ref()?)))
    }

    fn indices(&self) -> Vec<usize> {
        self.iter().map(|(i, _)| i).collect()
    }

    fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.entries.len()
    }
}

/// A menu shown natively as a numbered log message.
#[derive(Debug, Clone, PartialEq)]
enum Menu {
    Timespan(Vec<String>),
    Download,
}

const HELP: &str = "\
drag the plot: pan in time (and in value once zoomed), release while moving to coast
drag along the time or value ruler: zoom to the marked range
wheel: pan in time; ctrl+wheel: zoom time; shift+wheel: zoom values
click: marker on the nearest point; double click: show only that series
u: follow now; r: reset axes; y: autoscale values; escape: show all series";

struct Slot {
    name: String,
    target: Target,
    window: Arc<Window>,
    surface: Option<Surface>,
    widget: Option<Box<dyn Widget>>,
    queue: VecDeque<Command>,
    cursor: (f64, f64),
    mods: Modifiers,
    menu: Option<Menu>,
}

impl Slot {
    fn logical_size(&self) -> (f64, f64) {
        let size = self.window.inner_size().to_logical::<f64>(self.window.scale_factor());
        (size.width, size.height)
    }
}

pub struct App<S: HistoryService + 'static> {
    service: Rc<S>,
    params: ChartParams,
    query: String,
    fonts: Vec<Vec<u8>>,
    #[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
    proxy: EventLoopProxy<HostEvent>,
    slots: Slots<Slot>,
    /// Attached once the event loop is running.
    pending: Vec<(String, Target)>,
    #[cfg(target_arch = "wasm32")]
    notify: Option<js_sys::Function>,
}

impl<S: HistoryService + 'static> App<S> {
    pub fn new(service: S, params: ChartParams, query: String, fonts: Vec<Vec<u8>>, proxy: EventLoopProxy<HostEvent>) -> Self {
        App {
            service: Rc::new(service),
            params,
            query,
            fonts,
            proxy,
            slots: Slots::new(),
            pending: Vec::new(),
            #[cfg(target_arch = "wasm32")]
            notify: None,
        }
    }

    /// Charts to open as soon as the application resumes.
    pub fn with_targets(mut self, targets: impl IntoIterator<Item = Target>) -> Self {
        self.pending.extend(targets.into_iter().map(|t| (t.title(), t)));
        self
    }

    /// Page callback receiving `(canvas id, effect)` for effects the page
    /// handles itself.
    #[cfg(target_arch = "wasm32")]
    pub fn with_notify(mut self, notify: js_sys::Function) -> Self {
        self.notify = Some(notify);
        self
    }

    fn slot_by_window(&self, id: WindowId) -> Option<usize> {
        self.slots.iter().find(|(_, s)| s.window.id() == id).map(|(i, _)| i)
    }

    fn slot_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().find(|(_, s)| s.name == name).map(|(i, _)| i)
    }

    fn attach(&mut self, event_loop: &ActiveEventLoop, name: String, target: Target) {
        if self.slot_by_name(&name).is_some() {
            log::warn!("{name} is already attached");
            return;
        }
        let attributes = Window::default_attributes().with_title(target.title());

        #[cfg(target_arch = "wasm32")]
        let attributes = {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;
            let canvas = web_sys::window()
                .and_then(|w| w.document())
                .and_then(|d| d.get_element_by_id(&name))
                .and_then(|e| e.dyn_into::<web_sys::HtmlCanvasElement>().ok());
            if canvas.is_none() {
                log::warn!("no canvas with id {name}; appending one");
            }
            attributes.with_append(canvas.is_none()).with_canvas(canvas)
        };

        let window = match event_loop.create_window(attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("cannot create a window for {name}: {e}");
                return;
            }
        };
        let slot = self.slots.insert(Slot {
            name,
            target: target.clone(),
            window: window.clone(),
            surface: None,
            widget: None,
            queue: VecDeque::new(),
            cursor: (0.0, 0.0),
            mods: Modifiers::default(),
            menu: None,
        });
        log::debug!("attach {} as slot {}", target.title(), slot.index);

        #[cfg(not(target_arch = "wasm32"))]
        {
            let surface = pollster::block_on(Surface::new(window, &self.fonts));
            self.surface_ready(slot, surface);
            let widget = pollster::block_on(target.load(&*self.service, self.params.clone(), now(), &self.query));
            self.loaded(slot, widget);
        }

        #[cfg(target_arch = "wasm32")]
        {
            // neither the device nor the configuration can be awaited on the main thread
            let (proxy, service, fonts) = (self.proxy.clone(), self.service.clone(), self.fonts.clone());
            let (params, query) = (self.params.clone(), self.query.clone());
            wasm_bindgen_futures::spawn_local(async move {
                let surface = Surface::new(window, &fonts).await;
                let _ = proxy.send_event(HostEvent::SurfaceReady { slot, surface });
                let widget = target.load(&*service, params, now(), &query).await;
                let _ = proxy.send_event(HostEvent::Loaded { slot, widget });
            });
        }
    }

    fn surface_ready(&mut self, key: SlotKey, surface: Result<Surface>) {
        let Some(slot) = self.slots.resolve(key) else {
            return;
        };
        match surface {
            Ok(surface) => {
                if let Some(s) = self.slots.get_mut(slot) {
                    s.surface = Some(surface);
                    s.window.request_redraw();
                }
            }
            Err(e) => log::error!("no surface for slot {slot}: {e}"),
        }
    }

    fn loaded(&mut self, key: SlotKey, widget: Result<Box<dyn Widget>>) {
        let Some(slot) = self.slots.resolve(key) else {
            return;
        };
        let Some(s) = self.slots.get_mut(slot) else {
            return;
        };
        match widget {
            Ok(mut widget) => {
                let (w, h) = s.logical_size();
                widget.resize(w, h, now());
                s.widget = Some(widget);
                self.pump(slot);
            }
            Err(e) => {
                let message = format!("{}: {e}", s.target.title());
                self.alert(&message);
            }
        }
    }

    /// Disposes the widget and drops the slot with its window and surface.
    fn detach(&mut self, slot: usize) {
        if let Some(mut s) = self.slots.remove(slot) {
            log::debug!("detach slot {slot}");
            if let Some(w) = s.widget.as_mut() {
                w.dispose();
            }
        }
    }

    /// Runs queued commands, applies effects and asks for a redraw if needed.
    fn pump(&mut self, slot: usize) {
        #[cfg(target_arch = "wasm32")]
        let Some(key) = self.slots.key(slot) else {
            return;
        };
        let Some(s) = self.slots.get_mut(slot) else {
            return;
        };
        let Some(widget) = s.widget.as_mut() else {
            return;
        };
        s.queue.extend(widget.take_commands());

        #[cfg(not(target_arch = "wasm32"))]
        for _ in 0..SYNC_COMMANDS_PER_TURN {
            let Some(cmd) = s.queue.pop_front() else {
                break;
            };
            let completion = pollster::block_on(loader::execute(&*self.service, cmd));
            widget.complete(completion, now());
            s.queue.extend(widget.take_commands());
        }

        #[cfg(target_arch = "wasm32")]
        for cmd in s.queue.drain(..) {
            let (proxy, service) = (self.proxy.clone(), self.service.clone());
            wasm_bindgen_futures::spawn_local(async move {
                let completion = loader::execute(&*service, cmd).await;
                let _ = proxy.send_event(HostEvent::Completion { slot: key, completion });
            });
        }

        let effects = widget.take_effects();
        if widget.take_repaint() {
            s.window.request_redraw();
        }
        for effect in effects {
            self.apply(slot, effect);
        }
    }

    fn alert(&self, message: &str) {
        log::warn!("{message}");
        #[cfg(target_arch = "wasm32")]
        if let Some(w) = web_sys::window() {
            let _ = w.alert_with_message(message);
        }
    }

    fn set_query(&self, query: &str) {
        #[cfg(target_arch = "wasm32")]
        if let Some(w) = web_sys::window() {
            let path = w.location().pathname().unwrap_or_default();
            let url = if query.is_empty() { path } else { format!("{path}?{query}") };
            if let Ok(history) = w.history() {
                let _ = history.replace_state_with_url(&wasm_bindgen::JsValue::NULL, "", Some(&url));
            }
        }
        #[cfg(not(target_arch = "wasm32"))]
        log::info!("view: ?{query}");
    }

    fn apply(&mut self, slot: usize, effect: Effect) {
        match effect {
            Effect::Alert(message) => self.alert(&message),
            Effect::SetQuery(query) => self.set_query(&query),
            other => self.forward(slot, other),
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn forward(&mut self, slot: usize, effect: Effect) {
        let (Some(notify), Some(s)) = (self.notify.as_ref(), self.slots.get(slot)) else {
            log::debug!("no page callback for {effect:?}");
            return;
        };
        let value = serde_json::to_string(&effect)
            .ok()
            .and_then(|text| js_sys::JSON::parse(&text).ok());
        if let Some(value) = value {
            let name = wasm_bindgen::JsValue::from_str(&s.name);
            if let Err(e) = notify.call2(&wasm_bindgen::JsValue::NULL, &name, &value) {
                log::warn!("page callback failed: {e:?}");
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn forward(&mut self, slot: usize, effect: Effect) {
        let Some(s) = self.slots.get_mut(slot) else {
            return;
        };
        let result = match effect {
            Effect::ShowTimespanMenu(entries) => {
                let listing: Vec<String> = entries.iter().enumerate().map(|(k, e)| format!("{}={e}", k + 1)).collect();
                log::info!("timespan (press a digit): {}", listing.join("  "));
                s.menu = Some(Menu::Timespan(entries));
                Ok(())
            }
            Effect::ShowDownloadMenu => {
                log::info!("download (press a digit): 1=CSV  2=PNG");
                s.menu = Some(Menu::Download);
                Ok(())
            }
            Effect::ShowHelp => {
                log::info!("{HELP}");
                Ok(())
            }
            Effect::ShowImage { filename, time } => {
                log::info!("current image {filename} at {time}");
                Ok(())
            }
            Effect::SaveCsv { filename, contents } => std::fs::write(&filename, contents)
                .map(|_| log::info!("saved {filename}"))
                .map_err(ChartError::from),
            Effect::SavePng { filename } => match (s.widget.as_mut(), s.surface.as_mut()) {
                (Some(widget), Some(surface)) => {
                    let plan = widget.frame(now());
                    surface
                        .snapshot(&plan)
                        .and_then(|png| std::fs::write(&filename, png).map_err(ChartError::from))
                        .map(|_| log::info!("saved {filename}"))
                }
                _ => Err(ChartError::Render("nothing to snapshot yet".to_string())),
            },
            Effect::Alert(_) | Effect::SetQuery(_) => Ok(()),
        };
        if let Err(e) = result {
            self.alert(&e.to_string());
        }
    }

    fn command(&mut self, slot: usize, command: HostCommand) {
        let Some(widget) = self.slots.get_mut(slot).and_then(|s| s.widget.as_mut()) else {
            return;
        };
        if let Err(e) = widget.command(command, now()) {
            self.alert(&e.to_string());
        }
        self.pump(slot);
    }

    /// A digit answering the open native menu, if there is one.
    fn menu_choice(&mut self, slot: usize, key: Key) -> Option<HostCommand> {
        let s = self.slots.get_mut(slot)?;
        let Key::Char(c) = key else {
            if key == Key::Escape {
                s.menu = None;
            }
            return None;
        };
        let k = c.to_digit(10)? as usize;
        let choice = match s.menu.as_ref()? {
            Menu::Timespan(entries) => HostCommand::ChooseTimespan(entries.get(k.checked_sub(1)?)?.clone()),
            Menu::Download => match k {
                1 => HostCommand::Download(DownloadKind::Csv),
                2 => HostCommand::Download(DownloadKind::Png),
                _ => return None,
            },
        };
        s.menu = None;
        Some(choice)
    }

    fn input(&mut self, slot: usize, event: InputEvent) {
        if let Some(w) = self.slots.get_mut(slot).and_then(|s| s.widget.as_mut()) {
            w.handle(event, now());
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop, slot: usize) {
        let Some(s) = self.slots.get_mut(slot) else {
            return;
        };
        let (Some(widget), Some(surface)) = (s.widget.as_mut(), s.surface.as_mut()) else {
            return;
        };
        let plan = widget.frame(now());
        match surface.render(&plan) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => surface.resize(surface.size),
            Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
            Err(e) => log::warn!("{e:?}"),
        }
    }
}

fn key(key: &WinitKey) -> Option<Key> {
    match key {
        WinitKey::Named(NamedKey::Escape) => Some(Key::Escape),
        WinitKey::Named(NamedKey::ArrowLeft) => Some(Key::Left),
        WinitKey::Named(NamedKey::ArrowRight) => Some(Key::Right),
        WinitKey::Named(NamedKey::Space) => Some(Key::Char(' ')),
        WinitKey::Character(s) => s.chars().next().map(Key::Char),
        _ => None,
    }
}

impl<S: HistoryService + 'static> ApplicationHandler<HostEvent> for App<S> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        for (name, target) in std::mem::take(&mut self.pending) {
            self.attach(event_loop, name, target);
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: HostEvent) {
        match event {
            HostEvent::Attach { name, target } => self.attach(event_loop, name, target),
            HostEvent::Detach { name } => {
                if let Some(slot) = self.slot_by_name(&name) {
                    self.detach(slot);
                }
            }
            HostEvent::Command { name, command } => match self.slot_by_name(&name) {
                Some(slot) => self.command(slot, command),
                None => log::warn!("command for unknown chart {name}"),
            },
            HostEvent::SurfaceReady { slot, surface } => self.surface_ready(slot, surface),
            HostEvent::Loaded { slot, widget } => self.loaded(slot, widget),
            HostEvent::Completion { slot, completion } => {
                let Some(slot) = self.slots.resolve(slot) else {
                    return;
                };
                if let Some(w) = self.slots.get_mut(slot).and_then(|s| s.widget.as_mut()) {
                    w.complete(completion, now());
                    self.pump(slot);
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(slot) = self.slot_by_window(window_id) else {
            return;
        };
        let Some(scale) = self.slots.get(slot).map(|s| s.window.scale_factor()) else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => {
                self.detach(slot);
                if self.slots.is_empty() {
                    event_loop.exit();
                }
                return;
            }
            WindowEvent::Resized(size) => {
                let Some(s) = self.slots.get_mut(slot) else {
                    return;
                };
                if let Some(surface) = s.surface.as_mut() {
                    surface.resize(size);
                }
                let (w, h) = s.logical_size();
                if let Some(widget) = s.widget.as_mut() {
                    widget.resize(w, h, now());
                }
                s.window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop, slot);
                return;
            }
            WindowEvent::Occluded(hidden) => {
                if let Some(w) = self.slots.get_mut(slot).and_then(|s| s.widget.as_mut()) {
                    w.set_visible(!hidden, now());
                }
            }
            WindowEvent::ModifiersChanged(m) => {
                let state = m.state();
                if let Some(s) = self.slots.get_mut(slot) {
                    s.mods = Modifiers {
                        shift: state.shift_key(),
                        ctrl: state.control_key(),
                        alt: state.alt_key(),
                        meta: state.super_key(),
                    };
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let p = position.to_logical::<f64>(scale);
                if let Some(s) = self.slots.get_mut(slot) {
                    s.cursor = (p.x, p.y);
                }
                self.input(slot, InputEvent::PointerMove { x: p.x, y: p.y });
            }
            WindowEvent::CursorLeft { .. } => self.input(slot, InputEvent::PointerLeave),
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let Some((x, y)) = self.slots.get(slot).map(|s| s.cursor) else {
                    return;
                };
                let event = match state {
                    ElementState::Pressed => InputEvent::PointerDown { x, y },
                    ElementState::Released => InputEvent::PointerUp { x, y },
                };
                self.input(slot, event);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                // winit reports scrolling up as positive, the opposite of the DOM
                let (dx, dy) = match delta {
                    MouseScrollDelta::LineDelta(x, y) => (-x as f64 * WHEEL_LINE_PX, -y as f64 * WHEEL_LINE_PX),
                    MouseScrollDelta::PixelDelta(p) => (-p.x / scale, -p.y / scale),
                };
                let Some(((x, y), mods)) = self.slots.get(slot).map(|s| (s.cursor, s.mods)) else {
                    return;
                };
                self.input(slot, InputEvent::Wheel { x, y, dx, dy, mods });
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                if let Some(k) = key(&event.logical_key) {
                    match self.menu_choice(slot, k) {
                        Some(command) => self.command(slot, command),
                        None => self.input(slot, InputEvent::Key(k)),
                    }
                }
            }
            _ => return,
        }
        self.pump(slot);
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let t = now();
        for slot in self.slots.indices() {
            if let Some(w) = self.slots.get_mut(slot).and_then(|s| s.widget.as_mut()) {
                if w.next_deadline().is_some_and(|d| d <= t) {
                    w.tick(t);
                }
            }
            self.pump(slot);
        }

        let busy = self.slots.iter().any(|(_, s)| !s.queue.is_empty());
        let next = self
            .slots
            .iter()
            .filter_map(|(_, s)| s.widget.as_ref()?.next_deadline())
            .reduce(f64::min);
        let flow = match (busy, next) {
            (true, _) => ControlFlow::Poll,
            (false, Some(deadline)) => {
                ControlFlow::WaitUntil(Instant::now() + Duration::from_secs_f64((deadline - now()).max(0.0)))
            }
            (false, None) => ControlFlow::Wait,
        };
        event_loop.set_control_flow(flow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemoryHistory;

    #[test]
    fn detached_slots_are_reused_and_stale_keys_rejected() {
        let mut slots = Slots::new();
        let a = slots.insert("a");
        let b = slots.insert("b");
        assert_eq!(slots.remove(a.index), Some("a"));
        assert_eq!(slots.resolve(a), None);
        assert!(slots.remove(a.index).is_none());

        let c = slots.insert("c");
        assert_eq!(c.index, a.index);
        assert_ne!(c, a);
        assert_eq!(slots.capacity(), 2);
        // a result for the first attachment must not land on its successor
        assert_eq!(slots.resolve(a), None);
        assert_eq!(slots.resolve(c), Some(c.index));
        assert_eq!(slots.get(c.index), Some(&"c"));
        assert_eq!(slots.resolve(b), Some(b.index));

        for _ in 0..10 {
            let k = slots.insert("d");
            slots.remove(k.index);
        }
        assert_eq!(slots.capacity(), 3);
        slots.remove(b.index);
        slots.remove(c.index);
        assert!(slots.is_empty());
        assert!(slots.indices().is_empty());
    }

    #[test]
    fn targets_load_their_widgets() {
        let mut service = MemoryHistory::new();
        service.insert_panel("G", "P", serde_json::json!({ "Variables": "A:x", "Timescale": "1h" }));
        service.insert_image_config("Cam", serde_json::json!({}));
        let params = ChartParams::default();

        let panel = Target::Panel {
            group: "G".into(),
            panel: "P".into(),
        };
        let mut w = pollster::block_on(panel.load(&service, params.clone(), 1000.0, "")).unwrap();
        assert!(!w.take_commands().is_empty());

        let images = Target::Images { image_set: "Cam".into() };
        let mut w = pollster::block_on(images.load(&service, params.clone(), 1000.0, "")).unwrap();
        assert!(matches!(
            w.command(HostCommand::Download(DownloadKind::Csv), 1000.0),
            Err(ChartError::UserInput(_))
        ));

        let missing = Target::Images { image_set: "None".into() };
        assert!(pollster::block_on(missing.load(&service, params, 1000.0, "")).is_err());
    }

    #[test]
    fn widget_commands_reach_the_panel() {
        let mut service = MemoryHistory::new();
        service.insert_panel("G", "P", serde_json::json!({ "Variables": "A:x", "Timescale": "1h" }));
        let target = Target::Panel {
            group: "G".into(),
            panel: "P".into(),
        };
        let mut w = pollster::block_on(target.load(&service, ChartParams::default(), 1000.0, "")).unwrap();
        w.command(HostCommand::Download(DownloadKind::Csv), 1000.0).unwrap();
        assert!(w.take_effects().iter().any(|e| matches!(e, Effect::SaveCsv { .. })));
        assert!(w.command(HostCommand::SetRange("20".into(), "10".into()), 1000.0).is_err());
    }

    #[test]
    fn winit_keys() {
        assert_eq!(key(&WinitKey::Named(NamedKey::Escape)), Some(Key::Escape));
        assert_eq!(key(&WinitKey::Named(NamedKey::Space)), Some(Key::Char(' ')));
        assert_eq!(key(&WinitKey::Character("u".into())), Some(Key::Char('u')));
        assert_eq!(key(&WinitKey::Named(NamedKey::Tab)), None);
    }
}
