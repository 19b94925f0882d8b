//! cpuscale-transport: the network edge of the autoscaler.
//!
//! Every read and write against the control endpoint goes through the
//! [`Transport`] trait. A call is one *logical* operation: it may make up to
//! `max_retries` attempts, waiting a fixed interval between them, and then
//! either yields a value or a [`TransportError`]. Failures never escape as
//! panics; the calling loop decides what "no data" means for its cycle.
//!
//! # Architecture
//!
//! ```text
//! Transport (trait)
//!   └── RestClient
//!         ├── RetryPolicy::run()  ← attempt / backoff / cancellation
//!         └── send()              ← one HTTP/1.1 exchange over hyper
//! ```

pub mod client;
pub mod error;
pub mod retry;

use async_trait::async_trait;
use cpuscale_core::CancelSignal;

pub use client::RestClient;
pub use error::{AttemptError, TransportError, TransportResult};
pub use retry::RetryPolicy;

/// A JSON resource endpoint the autoscaler reads from and writes to.
///
/// `cancel` is the calling loop's stop signal; implementations abandon a
/// retry sequence as soon as it fires.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch and decode the JSON document at `url`.
    async fn get(&self, url: &str, cancel: &CancelSignal) -> TransportResult<serde_json::Value>;

    /// Replace the resource at `url` with `body`.
    async fn put(
        &self,
        url: &str,
        body: &serde_json::Value,
        cancel: &CancelSignal,
    ) -> TransportResult<()>;
}
