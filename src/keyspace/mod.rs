//! Logical key encoding for the namespaced keyspace.
//!
//! Every caller-facing `(namespace, app, key)` triple maps to exactly one
//! backend key string and back. Reserved domains (`webhooks`, `locks`) share
//! the same base prefix so a single prefix subscription covers the whole
//! keyspace; the codec is what lets the watcher filter them back out.

mod codec;


pub use codec::*;
