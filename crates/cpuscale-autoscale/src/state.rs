//! Scaling state shared by the three loops.

use std::sync::Arc;

use cpuscale_core::AppStatus;
use tokio::sync::{Mutex, MutexGuard};

/// The latest observation and the latest decision.
///
/// Every field starts unknown. `cpu_utilization` and `current_replicas`
/// are only written by the observe loop, always together; `desired_replicas`
/// is only written by the decide loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScalingState {
    pub current_replicas: Option<u32>,
    pub desired_replicas: Option<u32>,
    pub cpu_utilization: Option<f64>,
}

impl ScalingState {
    /// Overwrite the observed fields from one status payload.
    pub fn record_status(&mut self, status: &AppStatus) {
        self.cpu_utilization = Some(status.utilization());
        self.current_replicas = Some(status.replicas);
    }

    /// Replica count to push, if a decision exists and differs from the
    /// last observed count.
    pub fn pending_update(&self) -> Option<u32> {
        match (self.desired_replicas, self.current_replicas) {
            (Some(desired), Some(current)) if desired == current => None,
            (desired, _) => desired,
        }
    }
}

/// Handle to the state; clones share the same lock.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<ScalingState>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ScalingState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Acquire the state lock. Do not hold the guard across network I/O.
    pub async fn lock(&self) -> MutexGuard<'_, ScalingState> {
        self.inner.lock().await
    }

    /// Non-blocking acquire; `None` while another holder has the lock.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ScalingState>> {
        self.inner.try_lock().ok()
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> ScalingState {
        *self.inner.lock().await
    }
}
