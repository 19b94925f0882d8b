//! cpuscale-control: periodic control loops.
//!
//! A control loop is a named task that runs a body, waits a fixed
//! interval, and repeats until its cancellation signal fires.
//!
//! # Architecture
//!
//! ```text
//! ControlLoops
//!   ├── run_periodic(name, interval, body) → LoopHandle
//!   │     └── one tokio task per loop
//!   │           body(signal).await → sleep(interval) | cancelled
//!   ├── cancel(name) / cancel_all()
//!   └── join_all() → Vec<LoopExit>
//! ```
//!
//! A loop never overlaps with itself: the next wait starts only after the
//! body has returned. The body receives the loop's [`CancelSignal`] so it
//! can hand it to long-running calls.
//!
//! A body error or panic ends only that loop. It is logged and reported by
//! [`ControlLoops::join_all`]; sibling loops keep running.
//!
//! [`CancelSignal`]: cpuscale_core::CancelSignal

pub mod engine;
pub mod error;

pub use engine::{ControlLoops, LoopExit, LoopHandle};
pub use error::{ControlError, ControlResult};
