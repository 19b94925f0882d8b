//! Wire types for the control endpoint.

use serde::{Deserialize, Serialize};

/// Response body of the status resource.
///
/// ```json
/// { "cpu": { "highPriority": 0.42 }, "replicas": 3 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppStatus {
    pub cpu: CpuStatus,
    pub replicas: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStatus {
    /// Fraction of CPU used by the high-priority workload class.
    pub high_priority: f64,
}

impl AppStatus {
    /// Utilization the scaling policy acts on.
    pub fn utilization(&self) -> f64 {
        self.cpu.high_priority
    }

    /// Whether the reported utilization is a usable fraction in `[0, 1]`.
    pub fn has_valid_utilization(&self) -> bool {
        (0.0..=1.0).contains(&self.cpu.high_priority)
    }
}

/// Request body of the replica resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaUpdate {
    pub replicas: u32,
}
