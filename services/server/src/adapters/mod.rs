//! Source Adapter framework (C5): a uniform contract around source-specific
//! fetching, parsing, deduplication, and per-source resumable checkpoints.

pub mod eq_early_warning;
pub mod forest_fire;
pub mod quake_bulletin;
pub mod regional_notice;
pub mod text_alert;
pub mod weather_warning;

mod text;
mod time;

use feed_protocol::{AdapterRunOutcome, Source};
use std::future::Future;
use std::pin::Pin;

pub type AdapterFuture<'a> = Pin<Box<dyn Future<Output = AdapterRunOutcome> + Send + 'a>>;

/// A single pluggable source. `run` never raises: transport failures,
/// timeouts, and parse failures are caught internally and reported as an
/// empty outcome carrying the prior state forward (spec §4.5).
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> Source;
    fn poll_interval_sec(&self) -> u64;
    fn run<'a>(&'a self, prior_state: Option<String>) -> AdapterFuture<'a>;
}

/// Per-call fetch timeout bound, per spec §4.5 ("10-30s").
pub const FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);
