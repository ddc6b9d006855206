//! Plain CRUD path over the namespaced keyspace.
//!
//! Single-step request/response plumbing: each write is serialized against
//! concurrent writers of the same logical key through a per-key distributed
//! lock, and TTLs are carried by backend leases. The HTTP binding that fronts
//! these operations lives outside this crate.

mod kv_store;

#[cfg(test)]
mod kv_store_test;

pub use kv_store::*;
