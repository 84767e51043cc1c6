use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub predictions: u64,
    pub rejected_inputs: u64,
    pub failed_predictions: u64,
    pub uptime: String,
}

#[derive(Debug, Default)]
struct StatsCounters {
    requests: u64,
    predictions: u64,
    rejected_inputs: u64,
    failed_predictions: u64,
}

pub struct TelemetryStore {
    start_time: SystemTime,
    stats: Mutex<StatsCounters>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        TelemetryStore {
            start_time: SystemTime::now(),
            stats: Mutex::new(StatsCounters::default()),
        }
    }

    pub async fn record_request(&self) {
        let mut stats = self.stats.lock().await;
        stats.requests = stats.requests.saturating_add(1);
    }

    pub async fn record_prediction(&self) {
        let mut stats = self.stats.lock().await;
        stats.predictions = stats.predictions.saturating_add(1);
    }

    pub async fn record_rejected_input(&self) {
        let mut stats = self.stats.lock().await;
        stats.rejected_inputs = stats.rejected_inputs.saturating_add(1);
    }

    pub async fn record_failed_prediction(&self) {
        let mut stats = self.stats.lock().await;
        stats.failed_predictions = stats.failed_predictions.saturating_add(1);
    }

    pub async fn snapshot_stats(&self) -> StatsSnapshot {
        let stats = self.stats.lock().await;
        StatsSnapshot {
            requests: stats.requests,
            predictions: stats.predictions,
            rejected_inputs: stats.rejected_inputs,
            failed_predictions: stats.failed_predictions,
            uptime: format_uptime(
                SystemTime::now()
                    .duration_since(self.start_time)
                    .unwrap_or(Duration::from_secs(0)),
            ),
        }
    }
}

fn format_uptime(duration: Duration) -> String {
    let total_minutes = duration.as_secs() / 60;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;
    format!("{}d {}h {}m", days, hours, minutes)
}
