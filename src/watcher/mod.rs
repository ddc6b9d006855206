//! Leader-elected change watcher.
//!
//! ## Key Responsibilities
//! - Holds the cluster-wide watcher lock so exactly one replica consumes the
//!   change feed at a time
//! - Mirrors last-observed values in a process-local shadow cache to classify
//!   raw put/delete mutations into create/update/delete events
//! - Feeds classified events through webhook matching and fire-and-forget
//!   dispatch
//! - Retries leadership acquisition with backoff and re-elects after session
//!   loss, forever, until the embedding process cancels it
//!
//! ## Example Usage
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use tokio_util::sync::CancellationToken;
//! # use keywatch::{MemoryBackend, Settings, WatcherSupervisor};
//! # async fn example() -> keywatch::Result<()> {
//! let settings = Arc::new(Settings::default());
//! let backend = Arc::new(MemoryBackend::new());
//! let supervisor = WatcherSupervisor::new(&settings, backend)?;
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(async move {
//!     supervisor.run(shutdown).await;
//! });
//! # Ok(())
//! # }
//! ```

mod classifier;
mod elector;
mod shadow;
mod supervisor;


pub use classifier::*;
pub use elector::*;
pub use shadow::*;
pub use supervisor::*;
