// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Render and compile metrics.
//!
//! The [`MetricsCollector`] records per-template timings, cache hits and
//! misses, errors, filter usage and the include graph. Recording is gated by
//! an atomic flag; while disabled every `record_*` call returns before taking
//! the lock or allocating.
//!
//! All state sits behind a single mutex so that counters and bounded
//! histories are always updated together.

use crate::error::{Result, VeinError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::trace;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Running timing statistics with a bounded history of recent records.
#[derive(Debug, Clone, Serialize)]
pub struct TimingStats<R> {
    /// Number of recorded events.
    pub count: u64,
    /// Sum of all durations.
    pub total_ms: f64,
    /// Shortest duration.
    pub min_ms: f64,
    /// Longest duration.
    pub max_ms: f64,
    /// Most recent records, oldest first.
    pub history: VecDeque<R>,
}

impl<R> Default for TimingStats<R> {
    fn default() -> Self {
        Self {
            count: 0,
            total_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
            history: VecDeque::new(),
        }
    }
}

impl<R> TimingStats<R> {
    fn record(&mut self, duration_ms: f64, record: R, history_limit: usize) {
        if self.count == 0 {
            self.min_ms = duration_ms;
            self.max_ms = duration_ms;
        } else {
            self.min_ms = self.min_ms.min(duration_ms);
            self.max_ms = self.max_ms.max(duration_ms);
        }
        self.count += 1;
        self.total_ms += duration_ms;

        self.history.push_back(record);
        while self.history.len() > history_limit {
            self.history.pop_front();
        }
    }

    /// Mean duration, or 0 when nothing was recorded.
    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

/// One render in a template's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRecord {
    /// Render duration.
    pub duration_ms: f64,
    /// A sample of the top-level data keys.
    pub data_keys: Vec<String>,
    /// Unix time in milliseconds.
    pub timestamp: u64,
}

/// One compile in a template's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileRecord {
    /// Compile duration.
    pub duration_ms: f64,
    /// Tokens produced by the tokenizer.
    pub token_count: usize,
    /// Lines in the template source.
    pub line_count: usize,
    /// Unix time in milliseconds.
    pub timestamp: u64,
}

/// A recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    /// The template that failed.
    pub template: String,
    /// The error message.
    pub message: String,
    /// Unix time in milliseconds.
    pub timestamp: u64,
}

/// Cache lookups for one template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that required a compile.
    pub misses: u64,
}

/// Aggregated nested renders from one parent to one child.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IncludeStats {
    /// Number of nested renders.
    pub count: u64,
    /// Total time spent in them.
    pub total_ms: f64,
}

/// Aggregate view over everything recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
    /// Renders across all templates.
    pub total_renders: u64,
    /// Compiles across all templates.
    pub total_compiles: u64,
    /// Time spent rendering.
    pub total_render_ms: f64,
    /// Mean render time.
    pub average_render_ms: f64,
    /// Cache hits.
    pub cache_hits: u64,
    /// Cache misses.
    pub cache_misses: u64,
    /// Hits as a percentage of lookups (0 when there were none).
    pub cache_hit_rate: f64,
    /// Errors recorded.
    pub total_errors: u64,
    /// Errors per template.
    pub errors_by_template: BTreeMap<String, u64>,
    /// Templates with at least one render.
    pub templates_rendered: usize,
}

/// A template ranked by [`MetricsCollector::slowest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowTemplate {
    /// Template name.
    pub name: String,
    /// Mean render time.
    pub average_ms: f64,
    /// Renders recorded.
    pub count: u64,
}

/// A serializable snapshot of all metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsExport {
    /// Whether recording was enabled at export time.
    pub enabled: bool,
    /// Aggregate values.
    pub summary: MetricsSummary,
    /// Render statistics per template.
    pub renders: BTreeMap<String, TimingStats<RenderRecord>>,
    /// Compile statistics per template.
    pub compiles: BTreeMap<String, TimingStats<CompileRecord>>,
    /// Cache lookups per template.
    pub cache: BTreeMap<String, CacheStats>,
    /// Times each filter appeared in a rendered template.
    pub filters: BTreeMap<String, u64>,
    /// Nested renders by parent, then child.
    pub includes: BTreeMap<String, BTreeMap<String, IncludeStats>>,
    /// Most recent errors, oldest first.
    pub recent_errors: Vec<ErrorRecord>,
}

#[derive(Debug, Default)]
struct MetricsState {
    renders: HashMap<String, TimingStats<RenderRecord>>,
    compiles: HashMap<String, TimingStats<CompileRecord>>,
    cache: HashMap<String, CacheStats>,
    cache_hits: u64,
    cache_misses: u64,
    errors: VecDeque<ErrorRecord>,
    error_counts: HashMap<String, u64>,
    filters: HashMap<String, u64>,
    includes: HashMap<String, HashMap<String, IncludeStats>>,
}

/// Thread-safe metrics recorder.
#[derive(Debug)]
pub struct MetricsCollector {
    enabled: AtomicBool,
    history_limit: usize,
    state: Mutex<MetricsState>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(false, 100)
    }
}

impl MetricsCollector {
    /// Creates a collector keeping `history_limit` records per template.
    pub fn new(enabled: bool, history_limit: usize) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            history_limit,
            state: Mutex::new(MetricsState::default()),
        }
    }

    /// Starts recording.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Stops recording; existing data is kept.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Returns true while recording.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a compile.
    pub fn record_compile(&self, name: &str, duration_ms: f64, token_count: usize, line_count: usize) {
        if !self.is_enabled() {
            return;
        }
        let record = CompileRecord {
            duration_ms,
            token_count,
            line_count,
            timestamp: now_ms(),
        };
        let mut state = self.lock();
        state
            .compiles
            .entry(name.to_string())
            .or_default()
            .record(duration_ms, record, self.history_limit);
    }

    /// Records a completed render.
    pub fn record_render(&self, name: &str, duration_ms: f64, data_keys: &[String]) {
        if !self.is_enabled() {
            return;
        }
        trace!("render {} took {:.3}ms", name, duration_ms);
        let record = RenderRecord {
            duration_ms,
            data_keys: data_keys.to_vec(),
            timestamp: now_ms(),
        };
        let mut state = self.lock();
        state
            .renders
            .entry(name.to_string())
            .or_default()
            .record(duration_ms, record, self.history_limit);
    }

    /// Records a cache hit.
    pub fn record_cache_hit(&self, name: &str) {
        if !self.is_enabled() {
            return;
        }
        let mut state = self.lock();
        state.cache_hits += 1;
        state.cache.entry(name.to_string()).or_default().hits += 1;
    }

    /// Records a cache miss.
    pub fn record_cache_miss(&self, name: &str) {
        if !self.is_enabled() {
            return;
        }
        let mut state = self.lock();
        state.cache_misses += 1;
        state.cache.entry(name.to_string()).or_default().misses += 1;
    }

    /// Records a failure.
    pub fn record_error(&self, name: &str, message: &str) {
        if !self.is_enabled() {
            return;
        }
        let record = ErrorRecord {
            template: name.to_string(),
            message: message.to_string(),
            timestamp: now_ms(),
        };
        let mut state = self.lock();
        *state.error_counts.entry(name.to_string()).or_default() += 1;
        state.errors.push_back(record);
        while state.errors.len() > self.history_limit {
            state.errors.pop_front();
        }
    }

    /// Records that a rendered template used a filter.
    pub fn record_filter_usage(&self, filter: &str) {
        if !self.is_enabled() {
            return;
        }
        *self.lock().filters.entry(filter.to_string()).or_default() += 1;
    }

    /// Records a nested render of `child` from `parent`.
    pub fn record_include(&self, parent: &str, child: &str, duration_ms: f64) {
        if !self.is_enabled() {
            return;
        }
        let mut state = self.lock();
        let stats = state
            .includes
            .entry(parent.to_string())
            .or_default()
            .entry(child.to_string())
            .or_default();
        stats.count += 1;
        stats.total_ms += duration_ms;
    }

    /// Render statistics for one template.
    pub fn render_stats(&self, name: &str) -> Option<TimingStats<RenderRecord>> {
        self.lock().renders.get(name).cloned()
    }

    /// Compile statistics for one template.
    pub fn compile_stats(&self, name: &str) -> Option<TimingStats<CompileRecord>> {
        self.lock().compiles.get(name).cloned()
    }

    /// Cache lookups for one template.
    pub fn cache_stats(&self, name: &str) -> CacheStats {
        self.lock().cache.get(name).copied().unwrap_or_default()
    }

    /// Aggregate totals.
    pub fn summary(&self) -> MetricsSummary {
        summarize(&self.lock())
    }

    /// Templates ordered by mean render time, slowest first.
    pub fn slowest(&self, limit: usize) -> Vec<SlowTemplate> {
        let state = self.lock();
        let mut ranked: Vec<SlowTemplate> = state
            .renders
            .iter()
            .map(|(name, stats)| SlowTemplate {
                name: name.clone(),
                average_ms: stats.average_ms(),
                count: stats.count,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.average_ms
                .total_cmp(&a.average_ms)
                .then_with(|| a.name.cmp(&b.name))
        });
        ranked.truncate(limit);
        ranked
    }

    /// Snapshot of everything recorded.
    pub fn export(&self) -> MetricsExport {
        let state = self.lock();
        MetricsExport {
            enabled: self.is_enabled(),
            summary: summarize(&state),
            renders: state.renders.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            compiles: state.compiles.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            cache: state.cache.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            filters: state.filters.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            includes: state
                .includes
                .iter()
                .map(|(parent, children)| {
                    let children = children.iter().map(|(k, v)| (k.clone(), *v)).collect();
                    (parent.clone(), children)
                })
                .collect(),
            recent_errors: state.errors.iter().cloned().collect(),
        }
    }

    /// [`export`](Self::export) as pretty JSON.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.export())
            .map_err(|e| VeinError::Config(format!("failed to serialize metrics: {e}")))
    }

    /// Clears all recorded data; the enabled flag is unchanged.
    pub fn reset(&self) {
        *self.lock() = MetricsState::default();
    }
}

fn summarize(state: &MetricsState) -> MetricsSummary {
    let total_renders: u64 = state.renders.values().map(|s| s.count).sum();
    let total_render_ms: f64 = state.renders.values().map(|s| s.total_ms).sum();
    let lookups = state.cache_hits + state.cache_misses;

    MetricsSummary {
        total_renders,
        total_compiles: state.compiles.values().map(|s| s.count).sum(),
        total_render_ms,
        average_render_ms: if total_renders == 0 {
            0.0
        } else {
            total_render_ms / total_renders as f64
        },
        cache_hits: state.cache_hits,
        cache_misses: state.cache_misses,
        cache_hit_rate: if lookups == 0 {
            0.0
        } else {
            state.cache_hits as f64 * 100.0 / lookups as f64
        },
        total_errors: state.error_counts.values().sum(),
        errors_by_template: state
            .error_counts
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect(),
        templates_rendered: state.renders.len(),
    }
}
