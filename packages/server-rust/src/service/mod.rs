//! Operator routing and execution.
//!
//! 1. **Operators** (`operation`, `registry`): request operators keyed by
//!    `(service, version, operation)`, grouped per `(service, version)`
//! 2. **Routing** (`router`): version negotiation and dispatch
//! 3. **Middleware** (`middleware`): tower layers wrapped around the router
//! 4. **Built-in operations** (`domain`): `GetCapabilities`
//! 5. **Background workers** (`worker`): queues drained off the request path

pub mod config;
pub mod domain;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod router;
pub mod worker;

pub use config::{EventDelivery, ServiceConfig};
pub use operation::{RequestOperator, RequestOperatorKey, ServiceOperatorKey};
pub use registry::{OperatorRegistry, ServiceOperator};
pub use router::OperatorRouter;
pub use worker::{BackgroundRunnable, BackgroundWorker};
