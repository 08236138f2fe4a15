//! Request parameters and the binary sample buffer of the history service.
//!
//! A sample reply is a flat array of `f64`:
//!
//! ```text
//! [reserved, n, count_0 .. count_{n-1}, t, v, t, v, ...]
//! ```
//!
//! with the `(t, v)` pairs of series 0 first, then series 1, and so on.

use serde::{Deserialize, Serialize};

use crate::config::SeriesKey;
use crate::dataset::Sample;
use crate::error::{ChartError, Result};

/// Parameters of a `hs_read_arraybuffer` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    #[serde(rename = "start_time")]
    pub start: f64,
    #[serde(rename = "end_time")]
    pub end: f64,
    pub events: Vec<String>,
    pub tags: Vec<String>,
    pub index: Vec<u32>,
}

impl SampleRequest {
    pub fn new(start: f64, end: f64, keys: &[SeriesKey]) -> Self {
        let (events, tags, index) = split_keys(keys);
        SampleRequest {
            start: start.floor(),
            end: end.ceil(),
            events,
            tags,
            index,
        }
    }

    pub fn keys(&self) -> Vec<SeriesKey> {
        join_keys(&self.events, &self.tags, &self.index)
    }
}

/// Parameters of a `hs_get_last_written` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastWrittenRequest {
    pub time: f64,
    pub events: Vec<String>,
    pub tags: Vec<String>,
    pub index: Vec<u32>,
}

impl LastWrittenRequest {
    pub fn new(time: f64, keys: &[SeriesKey]) -> Self {
        let (events, tags, index) = split_keys(keys);
        LastWrittenRequest {
            time,
            events,
            tags,
            index,
        }
    }

    pub fn keys(&self) -> Vec<SeriesKey> {
        join_keys(&self.events, &self.tags, &self.index)
    }
}

/// Parameters of an image index lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageIndexRequest {
    pub image: String,
    #[serde(rename = "start_time")]
    pub start: f64,
    #[serde(rename = "end_time")]
    pub end: f64,
}

/// Reply of an image index lookup: parallel arrays, ascending by time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageIndex {
    pub time: Vec<f64>,
    pub filename: Vec<String>,
}

fn split_keys(keys: &[SeriesKey]) -> (Vec<String>, Vec<String>, Vec<u32>) {
    let events = keys.iter().map(|k| k.event.clone()).collect();
    let tags = keys.iter().map(|k| k.tag.clone()).collect();
    let index = keys.iter().map(|k| k.index).collect();
    (events, tags, index)
}

fn join_keys(events: &[String], tags: &[String], index: &[u32]) -> Vec<SeriesKey> {
    events
        .iter()
        .zip(tags)
        .enumerate()
        .map(|(i, (e, t))| SeriesKey::new(e.as_str(), t.as_str(), index.get(i).copied().unwrap_or(0)))
        .collect()
}

/// Decodes a sample reply into one sample list per series.
///
/// A buffer holding nothing beyond `[reserved, n]` means "no new data" and
/// yields `n_series` empty lists.
pub fn decode_samples(buf: &[f64], n_series: usize) -> Result<Vec<Vec<Sample>>> {
    let mut out = vec![Vec::new(); n_series];
    if buf.len() <= 2 {
        return Ok(out);
    }

    let n = count(buf[1], "series count")?;
    if n != n_series {
        return Err(ChartError::Decode(format!(
            "reply holds {n} series, {n_series} were requested"
        )));
    }
    let header = 2 + n;
    if buf.len() < header {
        return Err(ChartError::Decode(format!(
            "header claims {n} series but buffer has {} values",
            buf.len()
        )));
    }

    let mut pos = header;
    for (i, samples) in out.iter_mut().enumerate() {
        let m = count(buf[2 + i], "sample count")?;
        let pairs = m
            .checked_mul(2)
            .and_then(|len| pos.checked_add(len))
            .and_then(|end| buf.get(pos..end))
            .ok_or_else(|| {
                ChartError::Decode(format!(
                    "series {i} claims {m} samples, buffer ends after {} values",
                    buf.len()
                ))
            })?;
        samples.extend(pairs.chunks_exact(2).map(|p| Sample::new(p[0], p[1])));
        pos += pairs.len();
    }
    Ok(out)
}

fn count(v: f64, what: &str) -> Result<usize> {
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
        Ok(v as usize)
    } else {
        Err(ChartError::Decode(format!("invalid {what} {v}")))
    }
}

/// Encodes per-series samples in the reply layout. Used by in-process
/// services.
pub fn encode_samples(per_series: &[Vec<Sample>]) -> Vec<f64> {
    let total: usize = per_series.iter().map(Vec::len).sum();
    let mut buf = Vec::with_capacity(2 + per_series.len() + 2 * total);
    buf.push(0.0);
    buf.push(per_series.len() as f64);
    buf.extend(per_series.iter().map(|s| s.len() as f64));
    for s in per_series {
        for p in s {
            buf.push(p.t);
            buf.push(p.v);
        }
    }
    buf
}
