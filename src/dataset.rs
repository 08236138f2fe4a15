use std::collections::VecDeque;
use std::ops::Range;

use crate::config::{SeriesKey, SeriesSpec};
use crate::error::Result;
use crate::formula::Formula;
use crate::plan::Color;

/// One timestamped value. Time is in seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub t: f64,
    pub v: f64,
}

impl Sample {
    pub fn new(t: f64, v: f64) -> Self {
        Sample { t, v }
    }
}

/// Samples of one variable, ascending by time with no repeated timestamps.
///
/// Fetched ranges usually land just left of the oldest sample (backfill) or
/// just right of the newest (tail poll), so both ends are O(1). Anything that
/// lands inside the loaded extent goes through a full merge.
pub struct Series {
    pub spec: SeriesSpec,
    formula: Option<Formula>,
    samples: VecDeque<Sample>,
}

impl Series {
    pub fn new(spec: SeriesSpec) -> Result<Self> {
        let formula = spec.formula.as_deref().map(Formula::parse).transpose()?;
        Ok(Series {
            spec,
            formula,
            samples: VecDeque::new(),
        })
    }

    pub fn key(&self) -> &SeriesKey { &self.spec.key }
    pub fn label(&self) -> &str { &self.spec.label }
    pub fn color(&self) -> Color { self.spec.color }

    pub fn len(&self) -> usize { self.samples.len() }
    pub fn is_empty(&self) -> bool { self.samples.is_empty() }
    pub fn samples(&self) -> &VecDeque<Sample> { &self.samples }
    pub fn get(&self, i: usize) -> Option<Sample> { self.samples.get(i).copied() }
    pub fn first(&self) -> Option<Sample> { self.samples.front().copied() }
    pub fn last(&self) -> Option<Sample> { self.samples.back().copied() }

    /// Indices of the samples with `t0 <= t <= t1`.
    pub fn range(&self, t0: f64, t1: f64) -> Range<usize> {
        let lo = self.samples.partition_point(|s| s.t < t0);
        let hi = self.samples.partition_point(|s| s.t <= t1);
        lo..hi.max(lo)
    }

    /// Newest sample at or before `t`.
    pub fn at_or_before(&self, t: f64) -> Option<Sample> {
        let i = self.samples.partition_point(|s| s.t <= t);
        i.checked_sub(1).and_then(|i| self.get(i))
    }

    /// Merges raw samples from the history service. The formula, if any, is
    /// applied on the way in. Returns how many samples were inserted.
    pub fn merge(&mut self, incoming: &[Sample]) -> usize {
        let mut fresh: Vec<Sample> = incoming
            .iter()
            .filter(|s| s.t.is_finite())
            .map(|s| match &self.formula {
                Some(f) => Sample::new(s.t, f.apply(s.t, s.v)),
                None => *s,
            })
            .collect();
        if fresh.is_empty() {
            return 0;
        }
        if !fresh.windows(2).all(|w| w[0].t <= w[1].t) {
            fresh.sort_by(|a, b| a.t.total_cmp(&b.t));
        }
        fresh.dedup_by(|later, earlier| later.t == earlier.t);

        let before = self.samples.len();
        let (Some(head), Some(tail)) = (self.samples.front().copied(), self.samples.back().copied()) else {
            self.samples.extend(fresh);
            return self.samples.len();
        };

        let fresh_first = fresh[0].t;
        let fresh_last = fresh[fresh.len() - 1].t;
        if fresh_last < head.t {
            for s in fresh.into_iter().rev() {
                self.samples.push_front(s);
            }
        } else if fresh_first > tail.t {
            self.samples.extend(fresh);
        } else {
            // overlap with the loaded extent
            let old = std::mem::take(&mut self.samples);
            let mut merged = VecDeque::with_capacity(old.len() + fresh.len());
            let mut a = old.into_iter().peekable();
            let mut b = fresh.into_iter().peekable();
            loop {
                match (a.peek(), b.peek()) {
                    (Some(x), Some(y)) => {
                        if x.t < y.t {
                            merged.push_back(*x);
                            a.next();
                        } else if y.t < x.t {
                            merged.push_back(*y);
                            b.next();
                        } else {
                            // existing sample wins
                            merged.push_back(*x);
                            a.next();
                            b.next();
                        }
                    }
                    (Some(_), None) => merged.extend(a.by_ref()),
                    (None, Some(_)) => merged.extend(b.by_ref()),
                    (None, None) => break,
                }
            }
            self.samples = merged;
        }
        self.samples.len() - before
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// All series of one panel, in configuration order.
///
/// `revision` changes whenever any series gains samples, which is what the
/// projection cache keys on.
pub struct SampleStore {
    series: Vec<Series>,
    revision: u64,
}

impl SampleStore {
    pub fn new(specs: &[SeriesSpec]) -> Result<Self> {
        let series = specs.iter().cloned().map(Series::new).collect::<Result<Vec<_>>>()?;
        Ok(SampleStore { series, revision: 0 })
    }

    pub fn len(&self) -> usize { self.series.len() }
    pub fn is_empty(&self) -> bool { self.series.is_empty() }
    pub fn revision(&self) -> u64 { self.revision }
    pub fn get(&self, i: usize) -> Option<&Series> { self.series.get(i) }
    pub fn iter(&self) -> impl Iterator<Item = &Series> { self.series.iter() }

    pub fn keys(&self) -> Vec<SeriesKey> {
        self.series.iter().map(|s| s.key().clone()).collect()
    }

    /// Merges one decoded response, one sample list per series.
    pub fn merge(&mut self, per_series: &[Vec<Sample>]) -> usize {
        let mut inserted = 0;
        for (series, incoming) in self.series.iter_mut().zip(per_series) {
            inserted += series.merge(incoming);
        }
        if inserted > 0 {
            self.revision += 1;
        }
        inserted
    }

    pub fn total_samples(&self) -> usize {
        self.series.iter().map(Series::len).sum()
    }

    /// Oldest and newest timestamp over all series.
    pub fn extent(&self) -> Option<(f64, f64)> {
        let first = self.series.iter().filter_map(Series::first).map(|s| s.t).reduce(f64::min)?;
        let last = self.series.iter().filter_map(Series::last).map(|s| s.t).reduce(f64::max)?;
        Some((first, last))
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.extent().map(|(_, last)| last)
    }

    pub fn clear(&mut self) {
        for s in &mut self.series {
            s.clear();
        }
        self.revision += 1;
    }
}
