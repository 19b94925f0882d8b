//! cpuscale-autoscale: CPU-driven replica scaling.
//!
//! Three control loops share one [`SharedState`]:
//!
//! ```text
//! observe  (STATUS_CHECK_INTERVAL)   GET status  → cpu_utilization, current_replicas
//! decide   (DECIDE_REPLICA_INTERVAL) policy      → desired_replicas
//! apply    (SCALING_INTERVAL)        desired ≠ current → PUT {"replicas": desired}
//! ```
//!
//! # Scaling Algorithm
//!
//! ```text
//! if cpu > target:
//!     desired = current + 1
//! elif cpu < target * (1 - toleration):
//!     desired = max(min_replicas, current - 1)
//! else:
//!     desired = current
//! ```
//!
//! One replica per decision, no upper bound, no cooldown window. The loops
//! only coordinate through the state lock; the apply loop never holds it
//! across a network call.

pub mod orchestrator;
pub mod policy;
pub mod state;

pub use orchestrator::{
    ApplyOutcome, AutoScaler, ScalerConfig, APPLY_LOOP, DECIDE_LOOP, OBSERVE_LOOP,
};
pub use policy::{decide, ScaleDecision, ThresholdPolicy, MIN_REPLICAS};
pub use state::{ScalingState, SharedState};
