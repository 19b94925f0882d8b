//! The AutoScaler wires the transport, the policy and the shared state into
//! the observe, decide and apply loops.

use std::sync::Arc;
use std::time::Duration;

use cpuscale_control::{ControlLoops, ControlResult, LoopHandle};
use cpuscale_core::{AppStatus, CancelSignal, ReplicaUpdate, Settings};
use cpuscale_transport::Transport;
use tracing::{debug, error, info, warn};

use crate::policy::{ScaleDecision, ThresholdPolicy};
use crate::state::SharedState;

/// Loop names as registered with the control engine.
pub const OBSERVE_LOOP: &str = "get_status";
pub const DECIDE_LOOP: &str = "decide_replicas";
pub const APPLY_LOOP: &str = "set_replicas";

/// Endpoints, loop cadences and policy for one scaled application.
#[derive(Debug, Clone)]
pub struct ScalerConfig {
    pub status_url: String,
    pub replica_url: String,
    pub status_check_interval: Duration,
    pub decide_replica_interval: Duration,
    pub scaling_interval: Duration,
    pub policy: ThresholdPolicy,
}

impl ScalerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            status_url: settings.status_url(),
            replica_url: settings.replica_url(),
            status_check_interval: settings.status_check_interval,
            decide_replica_interval: settings.decide_replica_interval,
            scaling_interval: settings.scaling_interval,
            policy: ThresholdPolicy::from_settings(settings),
        }
    }
}

/// Result of one apply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No decision yet, or the decision matches the observed count.
    Skipped,
    /// The endpoint accepted the new count.
    Applied(u32),
    /// The write failed; the next cycle retries from fresh state.
    Failed(u32),
}

/// Closed-loop autoscaler for a single application.
pub struct AutoScaler<T> {
    config: ScalerConfig,
    transport: T,
    state: SharedState,
}

impl<T: Transport + 'static> AutoScaler<T> {
    pub fn new(config: ScalerConfig, transport: T) -> Self {
        Self::with_state(config, transport, SharedState::new())
    }

    pub fn with_state(config: ScalerConfig, transport: T, state: SharedState) -> Self {
        Self {
            config,
            transport,
            state,
        }
    }

    pub fn config(&self) -> &ScalerConfig {
        &self.config
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch the application status and record it.
    ///
    /// A failed fetch, an unexpected payload, or a utilization outside
    /// `[0, 1]` leaves the state untouched and returns `None`.
    pub async fn observe(&self, cancel: &CancelSignal) -> Option<AppStatus> {
        let url = &self.config.status_url;
        let payload = match self.transport.get(url, cancel).await {
            Ok(payload) => payload,
            Err(e) if e.is_cancelled() => {
                debug!(%url, "status fetch cancelled");
                return None;
            }
            Err(e) => {
                warn!(%url, error = %e, "no app status this cycle");
                return None;
            }
        };

        let status: AppStatus = match serde_json::from_value(payload) {
            Ok(status) => status,
            Err(e) => {
                warn!(%url, error = %e, "app status payload malformed, ignoring");
                return None;
            }
        };
        if !status.has_valid_utilization() {
            warn!(
                %url,
                cpu = status.utilization(),
                "app status reports utilization outside [0, 1], ignoring"
            );
            return None;
        }

        self.state.lock().await.record_status(&status);
        info!(
            cpu = status.utilization(),
            replicas = status.replicas,
            "app status updated"
        );
        Some(status)
    }

    /// Evaluate the policy against the last observation and store the
    /// result as the desired count.
    pub async fn decide(&self) -> Option<ScaleDecision> {
        let mut state = self.state.lock().await;
        let (Some(cpu), Some(current)) = (state.cpu_utilization, state.current_replicas) else {
            error!("CPU utilization or current replica count is not available");
            return None;
        };

        let decision = self.config.policy.evaluate(cpu, current);
        state.desired_replicas = Some(decision.replicas());
        drop(state);

        match decision {
            ScaleDecision::ScaleUp(desired) => info!(
                cpu,
                current,
                desired,
                "increasing replicas due to high CPU utilization"
            ),
            ScaleDecision::ScaleDown(desired) => info!(
                cpu,
                current,
                desired,
                "decreasing replicas due to low CPU utilization"
            ),
            ScaleDecision::Hold(desired) => info!(
                cpu,
                current,
                desired,
                "CPU utilization within tolerance, keeping replicas"
            ),
        }
        Some(decision)
    }

    /// Push the desired count if it differs from the observed one.
    pub async fn apply(&self, cancel: &CancelSignal) -> ApplyOutcome {
        let desired = {
            let state = self.state.lock().await;
            match state.pending_update() {
                Some(desired) => desired,
                None => {
                    debug!(
                        current = ?state.current_replicas,
                        desired = ?state.desired_replicas,
                        "replica count up to date, nothing to apply"
                    );
                    return ApplyOutcome::Skipped;
                }
            }
        };

        let body = match serde_json::to_value(ReplicaUpdate { replicas: desired }) {
            Ok(body) => body,
            Err(e) => {
                error!(replicas = desired, error = %e, "failed to encode replica update");
                return ApplyOutcome::Failed(desired);
            }
        };

        let url = &self.config.replica_url;
        match self.transport.put(url, &body, cancel).await {
            Ok(()) => {
                info!(replicas = desired, "replicas set");
                ApplyOutcome::Applied(desired)
            }
            Err(e) if e.is_cancelled() => {
                debug!(%url, replicas = desired, "replica update cancelled");
                ApplyOutcome::Failed(desired)
            }
            Err(e) => {
                error!(%url, replicas = desired, error = %e, "failed to set replicas");
                ApplyOutcome::Failed(desired)
            }
        }
    }

    /// Register the three loops with `loops`, in data-flow order.
    ///
    /// Returns the handles for observe, decide and apply.
    pub fn spawn(self: &Arc<Self>, loops: &mut ControlLoops) -> ControlResult<[LoopHandle; 3]> {
        let scaler = Arc::clone(self);
        let observe = loops.run_periodic(
            OBSERVE_LOOP,
            self.config.status_check_interval,
            move |signal| {
                let scaler = Arc::clone(&scaler);
                async move {
                    scaler.observe(&signal).await;
                    anyhow::Ok(())
                }
            },
        )?;

        let scaler = Arc::clone(self);
        let decide = loops.run_periodic(
            DECIDE_LOOP,
            self.config.decide_replica_interval,
            move |_signal| {
                let scaler = Arc::clone(&scaler);
                async move {
                    scaler.decide().await;
                    anyhow::Ok(())
                }
            },
        )?;

        let scaler = Arc::clone(self);
        let apply = loops.run_periodic(APPLY_LOOP, self.config.scaling_interval, move |signal| {
            let scaler = Arc::clone(&scaler);
            async move {
                scaler.apply(&signal).await;
                anyhow::Ok(())
            }
        })?;

        info!(
            status_url = %self.config.status_url,
            replica_url = %self.config.replica_url,
            target_cpu = self.config.policy.desired_cpu,
            "autoscaler started"
        );
        Ok([observe, decide, apply])
    }
}
