//! Threshold scaling policy.
//!
//! Pure functions only: the policy never touches shared state or the
//! network, so it can be evaluated anywhere.

use cpuscale_core::Settings;

/// Floor for every computed replica count.
pub const MIN_REPLICAS: u32 = 1;

/// A scaling decision for one evaluation.
///
/// The variant names the rule that matched; the payload is the replica
/// count to aim for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Utilization above target.
    ScaleUp(u32),
    /// Utilization below the hysteresis band.
    ScaleDown(u32),
    /// Utilization inside the band.
    Hold(u32),
}

impl ScaleDecision {
    pub fn replicas(&self) -> u32 {
        match *self {
            ScaleDecision::ScaleUp(n) | ScaleDecision::ScaleDown(n) | ScaleDecision::Hold(n) => n,
        }
    }
}

/// Hysteresis threshold policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    /// Target utilization; anything above it scales up.
    pub desired_cpu: f64,
    /// Width of the band below the target in which nothing happens,
    /// as a fraction of the target.
    pub scale_down_toleration: f64,
    pub min_replicas: u32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            desired_cpu: 0.80,
            scale_down_toleration: 0.0,
            min_replicas: MIN_REPLICAS,
        }
    }
}

impl ThresholdPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            desired_cpu: settings.desired_cpu_utilization,
            scale_down_toleration: settings.scale_down_toleration,
            min_replicas: MIN_REPLICAS,
        }
    }

    /// Lower edge of the hysteresis band.
    pub fn scale_down_threshold(&self) -> f64 {
        self.desired_cpu * (1.0 - self.scale_down_toleration)
    }

    /// Evaluate the policy for one observation.
    pub fn evaluate(&self, cpu_utilization: f64, current_replicas: u32) -> ScaleDecision {
        if cpu_utilization > self.desired_cpu {
            ScaleDecision::ScaleUp(current_replicas.saturating_add(1).max(self.min_replicas))
        } else if cpu_utilization < self.scale_down_threshold() {
            ScaleDecision::ScaleDown(current_replicas.saturating_sub(1).max(self.min_replicas))
        } else {
            ScaleDecision::Hold(current_replicas.max(self.min_replicas))
        }
    }
}

/// Desired replica count for `(cpu_utilization, current_replicas)`.
pub fn decide(
    cpu_utilization: f64,
    current_replicas: u32,
    desired_cpu: f64,
    scale_down_toleration: f64,
    min_replicas: u32,
) -> u32 {
    ThresholdPolicy {
        desired_cpu,
        scale_down_toleration,
        min_replicas,
    }
    .evaluate(cpu_utilization, current_replicas)
    .replicas()
}
