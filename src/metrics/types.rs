use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::DetectionSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickMetrics {
    pub timestamp: DateTime<Utc>,
    pub source: DetectionSource,
    pub score: u8,
    pub inference_ms: u64,
    /// Inference ran past its budget and the tick fell back to motion.
    pub timed_out: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub recent_ticks: Vec<TickMetrics>,
    pub tick_count: u64,
    pub model_tick_count: u64,
    pub fallback_tick_count: u64,
    pub timeout_count: u64,
    pub average_inference_ms: Option<u64>,
}
