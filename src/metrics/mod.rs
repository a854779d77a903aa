mod types;

pub use types::{MetricsSnapshot, TickMetrics};

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::DetectionSource;

const MAX_RECENT_TICKS: usize = 20;

/// Per-session detection statistics, shared between the loop and the
/// session snapshot.
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

#[derive(Default)]
struct MetricsState {
    recent_ticks: VecDeque<TickMetrics>,
    tick_count: u64,
    model_tick_count: u64,
    fallback_tick_count: u64,
    timeout_count: u64,
    model_inference_ms_total: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::default())),
        }
    }

    pub async fn record_tick(&self, metrics: TickMetrics) {
        let mut state = self.inner.lock().await;

        state.tick_count += 1;
        match metrics.source {
            DetectionSource::Model => {
                state.model_tick_count += 1;
                state.model_inference_ms_total += metrics.inference_ms;
            }
            DetectionSource::MotionFallback => state.fallback_tick_count += 1,
        }
        if metrics.timed_out {
            state.timeout_count += 1;
        }

        state.recent_ticks.push_back(metrics);
        if state.recent_ticks.len() > MAX_RECENT_TICKS {
            state.recent_ticks.pop_front();
        }
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let state = self.inner.lock().await;
        let average_inference_ms = (state.model_tick_count > 0)
            .then(|| state.model_inference_ms_total / state.model_tick_count);

        MetricsSnapshot {
            recent_ticks: state.recent_ticks.iter().cloned().collect(),
            tick_count: state.tick_count,
            model_tick_count: state.model_tick_count,
            fallback_tick_count: state.fallback_tick_count,
            timeout_count: state.timeout_count,
            average_inference_ms,
        }
    }

    pub async fn reset(&self) {
        *self.inner.lock().await = MetricsState::default();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tick(source: DetectionSource, inference_ms: u64, timed_out: bool) -> TickMetrics {
        TickMetrics {
            timestamp: Utc::now(),
            source,
            score: 50,
            inference_ms,
            timed_out,
        }
    }

    #[tokio::test]
    async fn counts_sources_and_averages_model_latency() {
        let metrics = MetricsCollector::new();
        metrics.record_tick(tick(DetectionSource::Model, 100, false)).await;
        metrics.record_tick(tick(DetectionSource::Model, 300, false)).await;
        metrics.record_tick(tick(DetectionSource::MotionFallback, 2500, true)).await;

        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.tick_count, 3);
        assert_eq!(snapshot.model_tick_count, 2);
        assert_eq!(snapshot.fallback_tick_count, 1);
        assert_eq!(snapshot.timeout_count, 1);
        assert_eq!(snapshot.average_inference_ms, Some(200));
    }

    #[tokio::test]
    async fn keeps_only_recent_ticks() {
        let metrics = MetricsCollector::new();
        for i in 0..(MAX_RECENT_TICKS as u64 + 5) {
            metrics.record_tick(tick(DetectionSource::Model, i, false)).await;
        }
        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.recent_ticks.len(), MAX_RECENT_TICKS);
        assert_eq!(snapshot.recent_ticks[0].inference_ms, 5);

        metrics.reset().await;
        assert_eq!(metrics.get_snapshot().await.tick_count, 0);
    }
}
