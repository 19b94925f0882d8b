//! Control loop engine: named periodic tasks with cancellation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use cpuscale_core::{cancel_pair, CancelSignal, CancelTrigger};

use crate::error::{ControlError, ControlResult};

/// Caller-side view of one registered loop.
///
/// Cloning is cheap; every clone observes the same running flag and
/// controls the same cancellation signal.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    name: Arc<str>,
    interval: Duration,
    running: Arc<AtomicBool>,
    trigger: CancelTrigger,
}

impl LoopHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `true` from registration until the loop task has exited.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the loop to stop after its current iteration.
    pub fn cancel(&self) {
        self.trigger.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.trigger.is_cancelled()
    }
}

/// How a loop ended.
#[derive(Debug)]
pub struct LoopExit {
    pub name: String,
    pub result: ControlResult<()>,
}

struct LoopSlot {
    handle: LoopHandle,
    join: JoinHandle<anyhow::Result<()>>,
}

/// Clears the running flag however the loop task ends, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Registry of control loops.
///
/// Must be used from within a tokio runtime: registering a loop spawns
/// its task immediately.
#[derive(Default)]
pub struct ControlLoops {
    /// Registration order is kept for `join_all`.
    slots: Vec<LoopSlot>,
    /// Set by `cancel_all`; later registrations start cancelled.
    shutting_down: bool,
}

impl ControlLoops {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register and start a loop that calls `body` every `interval`.
    ///
    /// The first call happens right away. Each following call starts
    /// `interval` after the previous one returned. Names are unique for
    /// the lifetime of the registry, stopped loops included.
    pub fn run_periodic<F, Fut>(
        &mut self,
        name: &str,
        interval: Duration,
        body: F,
    ) -> ControlResult<LoopHandle>
    where
        F: FnMut(CancelSignal) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if self.get(name).is_some() {
            return Err(ControlError::DuplicateLoop(name.to_string()));
        }

        let (trigger, signal) = cancel_pair();
        if self.shutting_down {
            trigger.cancel();
        }

        let handle = LoopHandle {
            name: Arc::from(name),
            interval,
            running: Arc::new(AtomicBool::new(true)),
            trigger,
        };

        let guard = RunningGuard(handle.running.clone());
        let loop_name = handle.name.clone();
        let join = tokio::spawn(async move {
            let _guard = guard;
            drive(&loop_name, interval, body, signal).await
        });

        info!(loop_name = %name, ?interval, "control loop registered");
        self.slots.push(LoopSlot {
            handle: handle.clone(),
            join,
        });
        Ok(handle)
    }

    /// Look up a loop by name.
    pub fn get(&self, name: &str) -> Option<&LoopHandle> {
        self.slots
            .iter()
            .map(|slot| &slot.handle)
            .find(|handle| handle.name() == name)
    }

    /// All registered loops, in registration order.
    pub fn handles(&self) -> impl Iterator<Item = &LoopHandle> {
        self.slots.iter().map(|slot| &slot.handle)
    }

    /// Names of loops whose task is still alive.
    pub fn running(&self) -> Vec<String> {
        self.handles()
            .filter(|handle| handle.is_running())
            .map(|handle| handle.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Stop a single loop.
    pub fn cancel(&self, name: &str) -> ControlResult<()> {
        let handle = self
            .get(name)
            .ok_or_else(|| ControlError::UnknownLoop(name.to_string()))?;
        handle.cancel();
        debug!(loop_name = %name, "control loop cancellation requested");
        Ok(())
    }

    /// Broadcast cancellation to every loop.
    pub fn cancel_all(&mut self) {
        self.shutting_down = true;
        for slot in &self.slots {
            slot.handle.cancel();
        }
        info!(loops = self.slots.len(), "all control loops cancelled");
    }

    /// Wait for every loop task to finish and report how each ended.
    ///
    /// Does not cancel anything by itself; see [`ControlLoops::shutdown`].
    pub async fn join_all(self) -> Vec<LoopExit> {
        let mut exits = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            let name = slot.handle.name().to_string();
            let result = match slot.join.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(ControlError::LoopFailed {
                    name: name.clone(),
                    source,
                }),
                Err(join_err) => {
                    let message = panic_message(join_err);
                    error!(loop_name = %name, %message, "control loop panicked");
                    Err(ControlError::LoopPanicked {
                        name: name.clone(),
                        message,
                    })
                }
            };
            exits.push(LoopExit { name, result });
        }
        exits
    }

    /// Cancel every loop and wait for all of them.
    pub async fn shutdown(mut self) -> Vec<LoopExit> {
        self.cancel_all();
        self.join_all().await
    }
}

/// The loop itself: body, wait, repeat.
async fn drive<F, Fut>(
    name: &str,
    interval: Duration,
    mut body: F,
    mut signal: CancelSignal,
) -> anyhow::Result<()>
where
    F: FnMut(CancelSignal) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    debug!(loop_name = %name, "control loop started");

    while !signal.is_cancelled() {
        if let Err(e) = body(signal.clone()).await {
            error!(
                loop_name = %name,
                error = %format!("{e:#}"),
                "control loop body failed; loop stopped"
            );
            return Err(e);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = signal.cancelled() => {}
        }
    }

    info!(loop_name = %name, "control loop stopped");
    Ok(())
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
