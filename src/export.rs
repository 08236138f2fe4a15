//! Data and image downloads.

use std::io::{Cursor, Write};

use chrono::{DateTime, TimeZone};

use crate::dataset::SampleStore;
use crate::error::{ChartError, Result};

/// `group-panel-YYYYMMDD-HHMMSS-YYYYMMDD-HHMMSS.ext`, both times local.
pub fn file_name<Tz: TimeZone>(group: &str, panel: &str, t_min: f64, t_max: f64, tz: &Tz, ext: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = |t: f64| {
        DateTime::from_timestamp(t.floor() as i64, 0)
            .map(|d| d.with_timezone(tz).format("%Y%m%d-%H%M%S").to_string())
            .unwrap_or_else(|| "00000000-000000".to_string())
    };
    format!("{group}-{panel}-{}-{}.{ext}", stamp(t_min), stamp(t_max))
}

/// Writes every sample inside `[t_min, t_max]` as one table. Rows are the
/// union of all timestamps; a series without a sample at a row's time gets
/// an empty cell. Returns the number of data rows.
pub fn write_csv<W: Write>(out: W, store: &SampleStore, t_min: f64, t_max: f64) -> Result<usize> {
    let columns: Vec<_> = store.iter().filter(|s| !s.key().is_run_transition()).collect();
    let mut wtr = csv::Writer::from_writer(out);

    let mut header = vec!["Time".to_string()];
    header.extend(columns.iter().map(|s| s.label().to_string()));
    wtr.write_record(&header)?;

    let ranges: Vec<_> = columns.iter().map(|s| s.range(t_min, t_max)).collect();
    let mut times: Vec<f64> = columns
        .iter()
        .zip(&ranges)
        .flat_map(|(s, r)| s.samples().range(r.clone()).map(|p| p.t))
        .collect();
    times.sort_by(f64::total_cmp);
    times.dedup();

    // one cursor per column, all advancing with the row time
    let mut cursors: Vec<usize> = ranges.iter().map(|r| r.start).collect();
    let mut record = Vec::with_capacity(columns.len() + 1);
    for &t in &times {
        record.clear();
        record.push(t.to_string());
        for (k, s) in columns.iter().enumerate() {
            let end = ranges[k].end;
            while cursors[k] < end && s.get(cursors[k]).is_some_and(|p| p.t < t) {
                cursors[k] += 1;
            }
            match s.get(cursors[k]).filter(|p| cursors[k] < end && p.t == t) {
                Some(p) => record.push(p.v.to_string()),
                None => record.push(String::new()),
            }
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(times.len())
}

pub fn csv_string(store: &SampleStore, t_min: f64, t_max: f64) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, store, t_min, t_max)?;
    String::from_utf8(buf).map_err(|e| ChartError::Decode(e.to_string()))
}

/// Encodes tightly packed RGBA8 pixels as PNG.
pub fn encode_png(width: u32, height: u32, rgba: Vec<u8>) -> Result<Vec<u8>> {
    let img = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| ChartError::Image(format!("pixel buffer does not match {width}x{height}")))?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| ChartError::Image(e.to_string()))?;
    Ok(out.into_inner())
}
