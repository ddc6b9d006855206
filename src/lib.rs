//! Namespaced key-value façade with a leader-elected change watcher and
//! webhook delivery.
//!
//! Caller data lives behind logical `(namespace, app, key)` triples mapped
//! onto a flat backend keyspace. One elected replica watches the backend
//! change feed, classifies raw mutations into create/update/delete events,
//! and fires registered webhooks for the changes that match.

mod backend;
mod config;
mod errors;
mod keyspace;
mod store;
pub mod utils;
mod watcher;
mod webhook;

pub use backend::*;
pub use config::*;
pub use errors::*;
pub use keyspace::*;
pub use store::*;
pub use utils::*;
pub use watcher::*;
pub use webhook::*;
