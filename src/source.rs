//! History service implementations: an in-memory store (also backing the
//! native CSV viewer and the tests) and, on wasm32, a bridge to the page's
//! JSON-RPC client.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::config::SeriesKey;
use crate::dataset::Sample;
use crate::error::{ChartError, Result};
use crate::loader::HistoryService;
use crate::wire::{encode_samples, ImageIndex, ImageIndexRequest, LastWrittenRequest, SampleRequest};

/// Everything held in memory, sorted by time per variable.
#[derive(Debug, Default, Clone)]
pub struct MemoryHistory {
    series: HashMap<SeriesKey, Vec<Sample>>,
    images: HashMap<String, Vec<(f64, String)>>,
    panels: HashMap<(String, String), serde_json::Value>,
    image_panels: HashMap<String, serde_json::Value>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_samples(&mut self, key: SeriesKey, samples: impl IntoIterator<Item = Sample>) {
        let entry = self.series.entry(key).or_default();
        entry.extend(samples);
        entry.sort_by(|a, b| a.t.total_cmp(&b.t));
        entry.dedup_by(|a, b| a.t == b.t);
    }

    pub fn insert_image(&mut self, image_set: &str, time: f64, filename: impl Into<String>) {
        let entry = self.images.entry(image_set.to_string()).or_default();
        entry.push((time, filename.into()));
        entry.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    pub fn insert_panel(&mut self, group: &str, panel: &str, config: serde_json::Value) {
        self.panels.insert((group.to_string(), panel.to_string()), config);
    }

    pub fn insert_image_config(&mut self, image_set: &str, config: serde_json::Value) {
        self.image_panels.insert(image_set.to_string(), config);
    }

    pub fn keys(&self) -> Vec<SeriesKey> {
        let mut keys: Vec<SeriesKey> = self.series.keys().cloned().collect();
        keys.sort_by(|a, b| (&a.event, &a.tag, a.index).cmp(&(&b.event, &b.tag, b.index)));
        keys
    }

    /// Oldest and newest sample time over all variables.
    pub fn extent(&self) -> Option<(f64, f64)> {
        let first = self.series.values().filter_map(|s| s.first()).map(|s| s.t).reduce(f64::min)?;
        let last = self.series.values().filter_map(|s| s.last()).map(|s| s.t).reduce(f64::max)?;
        Some((first, last))
    }

    /// Loads a table whose first column is the Unix time in seconds and
    /// whose other columns are named after variables (`Event:Tag[index]`).
    /// Empty cells are skipped.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b',')
            .trim(csv::Trim::All)
            .from_reader(reader);
        let keys = rdr
            .headers()?
            .iter()
            .skip(1)
            .map(SeriesKey::parse)
            .collect::<Result<Vec<_>>>()?;

        let mut columns: Vec<Vec<Sample>> = vec![Vec::new(); keys.len()];
        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            let t: f64 = record
                .get(0)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ChartError::Decode(format!("row {}: bad time", row + 1)))?;
            for (i, cell) in record.iter().skip(1).enumerate().take(keys.len()) {
                if cell.is_empty() {
                    continue;
                }
                let v: f64 = cell
                    .parse()
                    .map_err(|_| ChartError::Decode(format!("row {}: bad value '{cell}'", row + 1)))?;
                columns[i].push(Sample::new(t, v));
            }
        }

        let mut out = MemoryHistory::new();
        for (key, samples) in keys.into_iter().zip(columns) {
            out.insert_samples(key, samples);
        }
        Ok(out)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    fn samples_in(&self, key: &SeriesKey, start: f64, end: f64) -> Vec<Sample> {
        let Some(s) = self.series.get(key) else {
            return Vec::new();
        };
        let lo = s.partition_point(|p| p.t < start);
        let hi = s.partition_point(|p| p.t <= end);
        s[lo..hi.max(lo)].to_vec()
    }
}

impl HistoryService for MemoryHistory {
    async fn read_samples(&self, req: SampleRequest) -> Result<Vec<f64>> {
        let per_series: Vec<Vec<Sample>> = req
            .keys()
            .iter()
            .map(|k| self.samples_in(k, req.start, req.end))
            .collect();
        Ok(encode_samples(&per_series))
    }

    async fn get_last_written(&self, req: LastWrittenRequest) -> Result<Vec<f64>> {
        Ok(req
            .keys()
            .iter()
            .map(|k| {
                self.series
                    .get(k)
                    .and_then(|s| {
                        let i = s.partition_point(|p| p.t <= req.time);
                        i.checked_sub(1).map(|i| s[i].t)
                    })
                    .unwrap_or(0.0)
            })
            .collect())
    }

    async fn read_image_index(&self, req: ImageIndexRequest) -> Result<ImageIndex> {
        let mut out = ImageIndex::default();
        if let Some(entries) = self.images.get(&req.image) {
            for (t, name) in entries.iter().filter(|(t, _)| *t >= req.start && *t <= req.end) {
                out.time.push(*t);
                out.filename.push(name.clone());
            }
        }
        Ok(out)
    }

    async fn read_panel_config(&self, group: &str, panel: &str) -> Result<serde_json::Value> {
        self.panels
            .get(&(group.to_string(), panel.to_string()))
            .cloned()
            .ok_or_else(|| ChartError::Transport(format!("no panel '/History/Display/{group}/{panel}'")))
    }

    async fn read_image_config(&self, image_set: &str) -> Result<serde_json::Value> {
        self.image_panels
            .get(image_set)
            .cloned()
            .ok_or_else(|| ChartError::Transport(format!("no image panel '/History/Images/{image_set}'")))
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::HostRpc;

#[cfg(target_arch = "wasm32")]
mod web {
    use serde::de::DeserializeOwned;
    use serde::Deserialize;
    use wasm_bindgen::{JsCast, JsValue};

    use super::*;

    /// Calls into the page through `rpc(method, params) -> Promise<result>`.
    pub struct HostRpc {
        rpc: js_sys::Function,
    }

    #[derive(Deserialize)]
    struct LastWritten {
        last_written: Vec<f64>,
    }

    #[derive(Deserialize)]
    struct DbCopy {
        data: Vec<serde_json::Value>,
    }

    fn js_error(e: JsValue) -> ChartError {
        ChartError::Transport(e.as_string().unwrap_or_else(|| format!("{e:?}")))
    }

    impl HostRpc {
        pub fn new(rpc: js_sys::Function) -> Self {
            HostRpc { rpc }
        }

        async fn call(&self, method: &str, params: &impl serde::Serialize) -> Result<JsValue> {
            let text = serde_json::to_string(params)?;
            let params = js_sys::JSON::parse(&text).map_err(js_error)?;
            let promise = self
                .rpc
                .call2(&JsValue::NULL, &JsValue::from_str(method), &params)
                .map_err(js_error)?;
            let promise: js_sys::Promise = promise.dyn_into().map_err(js_error)?;
            wasm_bindgen_futures::JsFuture::from(promise).await.map_err(js_error)
        }

        async fn call_json<T: DeserializeOwned>(&self, method: &str, params: &impl serde::Serialize) -> Result<T> {
            let value = self.call(method, params).await?;
            let text: String = js_sys::JSON::stringify(&value).map_err(js_error)?.into();
            serde_json::from_str(&text).map_err(|e| ChartError::Decode(format!("{method}: {e}")))
        }

        async fn db_entry(&self, path: &str) -> Result<serde_json::Value> {
            let params = serde_json::json!({ "paths": [path] });
            let reply: DbCopy = self.call_json("db_copy", &params).await?;
            reply
                .data
                .into_iter()
                .next()
                .filter(|v| !v.is_null())
                .ok_or_else(|| ChartError::config("panel", format!("an entry {path}")))
        }
    }

    impl HistoryService for HostRpc {
        async fn read_samples(&self, req: SampleRequest) -> Result<Vec<f64>> {
            let value = self.call("hs_read_arraybuffer", &req).await?;
            if !value.is_instance_of::<js_sys::ArrayBuffer>() {
                return Err(ChartError::Decode("hs_read_arraybuffer: reply is not an ArrayBuffer".into()));
            }
            Ok(js_sys::Float64Array::new(&value).to_vec())
        }

        async fn get_last_written(&self, req: LastWrittenRequest) -> Result<Vec<f64>> {
            let reply: LastWritten = self.call_json("hs_get_last_written", &req).await?;
            Ok(reply.last_written)
        }

        async fn read_image_index(&self, req: ImageIndexRequest) -> Result<ImageIndex> {
            self.call_json("hs_read_image_index", &req).await
        }

        async fn read_panel_config(&self, group: &str, panel: &str) -> Result<serde_json::Value> {
            self.db_entry(&format!("/History/Display/{group}/{panel}")).await
        }

        async fn read_image_config(&self, image_set: &str) -> Result<serde_json::Value> {
            self.db_entry(&format!("/History/Images/{image_set}")).await
        }
    }
}
