//! Webhook registration, matching, and delivery.
//!
//! Registrations are plain CRUD records persisted through the backend under
//! the reserved `webhooks` domain. The watcher consumes them read-only: for
//! each classified change event it scans the `(namespace, app)` registry for
//! matching registrations and fires one independent, best-effort HTTP
//! delivery per match. Delivery is at-most-once; failures are logged and
//! discarded.

mod dispatcher;
mod matcher;
mod registry;


pub use dispatcher::*;
pub use matcher::*;
pub use registry::*;
