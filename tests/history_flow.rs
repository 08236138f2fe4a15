//! End-to-end behaviour of a panel driven against an in-memory history.

use chrono::Utc;
use histplot::config::{PanelConfig, PanelSettings, SeriesKey};
use histplot::dataset::{Sample, SampleStore};
use histplot::loader::{ensure_range, Request};
use histplot::project::{aggregate, project, SeriesProjection};
use histplot::ticks::{generate_ticks, MonospaceEstimate};
use histplot::window::{Window, LOG_MIN};
use histplot::{execute, ChartParams, DownloadKind, Effect, MemoryHistory, Panel};

fn settings(config: serde_json::Value) -> PanelSettings {
    let cfg = PanelConfig::from_value(config).unwrap();
    PanelSettings::from_config("G", "P", &cfg).unwrap()
}

fn history(key: &str, samples: &[(f64, f64)]) -> MemoryHistory {
    let mut h = MemoryHistory::new();
    h.insert_samples(
        SeriesKey::parse(key).unwrap(),
        samples.iter().map(|&(t, v)| Sample::new(t, v)),
    );
    h
}

/// Runs queued commands until the panel stops asking. Returns how many ran.
fn drive(panel: &mut Panel, service: &MemoryHistory, now: f64) -> usize {
    let mut ran = 0;
    loop {
        let cmds = panel.take_commands();
        if cmds.is_empty() {
            return ran;
        }
        for cmd in cmds {
            ran += 1;
            let done = pollster::block_on(execute(service, cmd));
            panel.complete(done, now);
        }
    }
}

#[test]
fn three_samples_over_two_hundred_pixels() {
    let s = settings(serde_json::json!({"Timescale": "20", "Variables": ["A:x"]}));
    let service = history("A:x", &[(0.0, 1.0), (10.0, 2.0), (20.0, 3.0)]);
    let mut store = SampleStore::new(&s.series).unwrap();
    let inserted = pollster::block_on(ensure_range(&service, &mut store, 0.0, 20.0, 5.0)).unwrap();
    assert_eq!(inserted, 3);

    let window = Window::new(&s, 20.0);
    let series = store.get(0).unwrap();
    let points = project(series, &window, 200.0, 100.0);
    assert_eq!(points.x, vec![0.0, 100.0, 200.0]);
    assert!(points.lead.is_none() && points.trail.is_none());

    let p = SeriesProjection::build(series, &window, 200.0, 100.0, 2.0);
    assert!(!p.bucket_mode);

    let csv = histplot::export::csv_string(&store, window.t_min, window.t_max).unwrap();
    assert_eq!(csv.lines().count(), 1 + 3);
}

#[test]
fn dense_series_folds_into_one_bucket_per_column() {
    let s = settings(serde_json::json!({"Timescale": "10000", "Variables": ["A:x"]}));
    let samples: Vec<(f64, f64)> = (0..10_000).map(|i| (i as f64, (i % 37) as f64)).collect();
    let service = history("A:x", &samples);
    let mut store = SampleStore::new(&s.series).unwrap();
    pollster::block_on(ensure_range(&service, &mut store, 0.0, 10_000.0, 1_000.0)).unwrap();
    assert_eq!(store.total_samples(), 10_000);

    let window = Window::new(&s, 10_000.0);
    let p = SeriesProjection::build(store.get(0).unwrap(), &window, 100.0, 50.0, 2.0);
    assert!(p.bucket_mode);
    assert!((99..=101).contains(&p.buckets.len()), "{} buckets", p.buckets.len());
    for b in &p.buckets {
        assert!(b.min <= b.avg && b.avg <= b.max, "{b:?}");
    }
    // folding an already folded column changes nothing
    let again = aggregate(&p.points);
    assert_eq!(again, p.buckets);
}

#[test]
fn merges_in_any_order_stay_sorted_and_unique() {
    let s = settings(serde_json::json!({"Timescale": "100", "Variables": ["A:x"]}));
    let samples: Vec<(f64, f64)> = (0..100).map(|i| (i as f64, i as f64)).collect();
    let service = history("A:x", &samples);
    let mut store = SampleStore::new(&s.series).unwrap();
    for (a, b) in [(50.0, 99.0), (0.0, 30.0), (20.0, 60.0), (0.0, 99.0)] {
        pollster::block_on(ensure_range(&service, &mut store, a, b, 7.0)).unwrap();
    }
    let times: Vec<f64> = store.get(0).unwrap().samples().iter().map(|p| p.t).collect();
    assert_eq!(times.len(), 100);
    assert!(times.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn projection_stays_inside_the_plot() {
    let s = settings(serde_json::json!({"Timescale": "50", "Variables": ["A:x"]}));
    let samples: Vec<(f64, f64)> = (0..200).map(|i| (i as f64 * 0.7, (i as f64).sin())).collect();
    let service = history("A:x", &samples);
    let mut store = SampleStore::new(&s.series).unwrap();
    pollster::block_on(ensure_range(&service, &mut store, 0.0, 140.0, 30.0)).unwrap();

    let mut window = Window::new(&s, 100.0);
    window.autoscale(&store);
    let points = project(store.get(0).unwrap(), &window, 333.0, 100.0);
    assert!(!points.is_empty());
    assert!(points.x.windows(2).all(|w| w[0] <= w[1]));
    assert!(points.x.iter().all(|&x| (0.0..=333.0).contains(&x)));
    assert!(points.lead.is_some() && points.trail.is_some());
}

#[test]
fn tick_steps_nest_and_are_evenly_spaced() {
    let text = MonospaceEstimate::for_font_size(12.0);
    for (min, max, px) in [(0.0, 1.0, 300.0), (-37.0, 1234.0, 480.0), (0.001, 0.0042, 90.0)] {
        let t = generate_ticks(min, max, px, false, &text);
        assert!(t.label_step >= t.major_step && t.major_step >= t.minor_step, "{t:?}");
        for w in t.major.windows(2) {
            assert!(((w[1] - w[0]) - t.major_step).abs() < t.major_step * 1e-6);
        }
        for w in t.labeled.windows(2) {
            assert!(((w[1].value - w[0].value) - t.label_step).abs() < t.label_step * 1e-6);
        }
    }
}

#[test]
fn zoom_in_then_out_restores_the_window() {
    let s = settings(serde_json::json!({"Timescale": "1000", "Variables": ["A:x"]}));
    let mut window = Window::new(&s, 5_000.0);
    window.set_time_range(1_000.0, 2_000.0);
    assert!(window.zoom_time(1_300.0, 0.5, 1_000.0, 1e6, 5_000.0));
    assert!(window.zoom_time(1_300.0, 2.0, 1_000.0, 1e6, 5_000.0));
    assert!((window.t_min - 1_000.0).abs() < 1e-9);
    assert!((window.t_max - 2_000.0).abs() < 1e-9);
}

#[test]
fn log_axis_replaces_zero_minimum() {
    let s = settings(serde_json::json!({
        "Timescale": "100",
        "Variables": ["A:x"],
        "Minimum": 0,
        "Maximum": 100,
        "Log axis": true,
    }));
    let window = Window::new(&s, 100.0);
    assert_eq!(window.y_range(), (LOG_MIN, 100.0));
    assert!(window.v_to_y(0.0, 100.0).is_finite());
}

#[test]
fn panel_loads_pages_back_and_exports() {
    let mut service = history("A:x", &(0..10_000).map(|i| (i as f64, 1.0)).collect::<Vec<_>>());
    service.insert_panel("G", "P", serde_json::json!({"Timescale": "100", "Variables": ["A:x"]}));
    let config = pollster::block_on(histplot::loader::HistoryService::read_panel_config(&service, "G", "P")).unwrap();
    let mut panel = Panel::from_config("G", "P", config, ChartParams::default(), 10_000.0, "").unwrap();

    drive(&mut panel, &service, 10_000.0);
    assert!(panel.load_state().initial_done());
    assert_eq!(panel.store().extent(), Some((9_800.0, 9_999.0)));
    assert_eq!(panel.last_written(), &[9_999.0]);

    // one backward request at a time however far the view moves
    panel.set_range(9_000.0, 9_100.0, 10_000.0).unwrap();
    panel.set_range(8_000.0, 8_100.0, 10_000.0).unwrap();
    let cmds = panel.take_commands();
    let backward: Vec<_> = cmds
        .iter()
        .filter_map(|c| match &c.request {
            Request::Samples(r) if r.end <= 9_800.0 => Some((r.start, r.end)),
            _ => None,
        })
        .collect();
    assert_eq!(backward, vec![(8_900.0, 9_800.0)]);
    assert!(panel.load_state().backward_in_flight());
    for cmd in cmds {
        let done = pollster::block_on(execute(&service, cmd));
        panel.complete(done, 10_000.0);
    }
    drive(&mut panel, &service, 10_000.0);
    assert!(!panel.load_state().backward_in_flight());
    assert!(panel.load_state().t_min_requested <= 7_900.0);
    assert_eq!(panel.store().extent(), Some((7_900.0, 9_999.0)));

    panel.download(DownloadKind::Csv, &Utc).unwrap();
    match panel.take_effects().pop() {
        Some(Effect::SaveCsv { contents, .. }) => assert_eq!(contents.lines().count(), 1 + 101),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn jump_back_fetches_the_old_view() {
    let mut service = history("A:x", &[(100.0, 1.0), (200.0, 2.0)]);
    service.insert_panel("G", "P", serde_json::json!({"Timescale": "10", "Variables": ["A:x"]}));
    let config = pollster::block_on(histplot::loader::HistoryService::read_panel_config(&service, "G", "P")).unwrap();
    let mut panel = Panel::from_config("G", "P", config, ChartParams::default(), 10_000.0, "").unwrap();
    drive(&mut panel, &service, 10_000.0);
    assert_eq!(panel.store().total_samples(), 0);

    panel.choose_timespan(histplot::panel::JUMP_BACK, 10_000.0).unwrap();
    drive(&mut panel, &service, 10_000.0);
    assert_eq!(panel.window().t_max, 202.0);
    assert!(panel.store().total_samples() >= 1);
    assert_eq!(panel.load_state().pending_request_count, 0);
}
