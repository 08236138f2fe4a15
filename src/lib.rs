//! Interactive history charts for time series, drawn with wgpu.
//!
//! A [`Panel`] plots variables fetched from a [`HistoryService`]; an
//! [`ImageHistory`] pages through timestamped images. Both do no I/O of
//! their own. The winit host in [`app`] runs their requests, timers and
//! effects, natively or in a web page.

pub mod app;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod formula;
pub mod gpu;
pub mod hit;
pub mod images;
pub mod interaction;
pub mod loader;
pub mod panel;
pub mod plan;
pub mod project;
pub mod source;
pub mod ticks;
pub mod timer;
pub mod window;
pub mod wire;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
use winit::event_loop::EventLoop;

pub use app::{now, App, HostCommand, HostEvent, Target, Widget};
pub use config::{ChartParams, PanelConfig, PanelSettings, SeriesKey};
pub use error::{ChartError, Result};
pub use images::ImageHistory;
pub use loader::{execute, Command, Completion, HistoryService};
pub use panel::{DownloadKind, Effect, InputEvent, Panel};
pub use plan::RenderPlan;
#[cfg(target_arch = "wasm32")]
pub use source::HostRpc;
pub use source::MemoryHistory;

fn init_logging() {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            std::panic::set_hook(Box::new(console_error_panic_hook::hook));
            if let Err(e) = console_log::init_with_level(log::Level::Warn) {
                web_sys::console::log_1(&format!("logger: {e}").into());
            }
        } else {
            // a second call, as from tests, keeps the first logger
            let _ = env_logger::try_init();
        }
    }
}

/// Opens one window per target and runs until the last one is closed.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_native<S: HistoryService + 'static>(
    service: S,
    targets: Vec<Target>,
    params: ChartParams,
    query: &str,
) -> Result<()> {
    init_logging();
    let event_loop = EventLoop::<HostEvent>::with_user_event()
        .build()
        .map_err(|e| ChartError::Render(e.to_string()))?;
    let proxy = event_loop.create_proxy();
    let mut app = App::new(service, params, query.to_string(), Vec::new(), proxy).with_targets(targets);
    event_loop.run_app(&mut app).map_err(|e| ChartError::Render(e.to_string()))
}

#[cfg(target_arch = "wasm32")]
thread_local! {
    static PROXY: std::cell::RefCell<Option<winit::event_loop::EventLoopProxy<HostEvent>>> =
        const { std::cell::RefCell::new(None) };
}

#[cfg(target_arch = "wasm32")]
fn send(event: HostEvent) -> std::result::Result<(), JsValue> {
    PROXY.with(|cell| {
        let proxy = cell.borrow();
        let proxy = proxy
            .as_ref()
            .ok_or_else(|| JsValue::from_str("chart host not started; call start_host() first"))?;
        proxy
            .send_event(event)
            .map_err(|_| JsValue::from_str("chart host has stopped"))
    })
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run() {
    init_logging();
}

/// Starts the event loop. `rpc(method, params)` returns a promise with the
/// reply; `notify(canvas_id, effect)` receives menus, help, downloads and
/// image selections; `fonts` is an array of font files (the web has no
/// system fonts).
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn start_host(rpc: js_sys::Function, notify: js_sys::Function, fonts: js_sys::Array) -> std::result::Result<(), JsValue> {
    use winit::platform::web::EventLoopExtWebSys;

    let event_loop = EventLoop::<HostEvent>::with_user_event()
        .build()
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let proxy = event_loop.create_proxy();
    let fonts = fonts.iter().map(|f| js_sys::Uint8Array::new(&f).to_vec()).collect();
    let query = web_sys::window()
        .and_then(|w| w.location().search().ok())
        .unwrap_or_default();
    let app = App::new(HostRpc::new(rpc), ChartParams::default(), query, fonts, proxy.clone()).with_notify(notify);
    PROXY.with(|cell| *cell.borrow_mut() = Some(proxy));
    event_loop.spawn_app(app);
    Ok(())
}

/// Shows the history panel `group/panel` in the canvas with this id.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn attach_panel(canvas_id: &str, group: &str, panel: &str) -> std::result::Result<(), JsValue> {
    send(HostEvent::Attach {
        name: canvas_id.to_string(),
        target: Target::Panel {
            group: group.to_string(),
            panel: panel.to_string(),
        },
    })
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn attach_images(canvas_id: &str, image_set: &str) -> std::result::Result<(), JsValue> {
    send(HostEvent::Attach {
        name: canvas_id.to_string(),
        target: Target::Images {
            image_set: image_set.to_string(),
        },
    })
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn detach(canvas_id: &str) -> std::result::Result<(), JsValue> {
    send(HostEvent::Detach {
        name: canvas_id.to_string(),
    })
}

/// A timespan menu choice: a duration such as `"8h"`, `"<<"` or `"<<<"`.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn choose_timespan(canvas_id: &str, entry: &str) -> std::result::Result<(), JsValue> {
    send(HostEvent::Command {
        name: canvas_id.to_string(),
        command: HostCommand::ChooseTimespan(entry.to_string()),
    })
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn set_range(canvas_id: &str, start: &str, end: &str) -> std::result::Result<(), JsValue> {
    send(HostEvent::Command {
        name: canvas_id.to_string(),
        command: HostCommand::SetRange(start.to_string(), end.to_string()),
    })
}

/// `kind` is `"csv"` or `"png"`.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn download(canvas_id: &str, kind: &str) -> std::result::Result<(), JsValue> {
    let kind = match kind {
        "csv" => DownloadKind::Csv,
        "png" => DownloadKind::Png,
        other => return Err(JsValue::from_str(&format!("unknown download kind '{other}'"))),
    };
    send(HostEvent::Command {
        name: canvas_id.to_string(),
        command: HostCommand::Download(kind),
    })
}
