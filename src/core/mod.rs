//! Runtime core: orchestration and lifecycle.
//!
//! The public API of this module is [`ConsumerSupervisor`], its
//! [`SupervisorBuilder`], the global [`Config`] and the fatal-error callback
//! types. Everything else is internal:
//! - [`fetch_loop`]: binds a consumer and pulls one message per free slot;
//! - [`dispatcher`]: runs the handler under a fault barrier and settles the message;
//! - [`supervisor`]: starts loops, handles stop/drain and OS signals;
//! - [`shutdown`]: cross-platform termination signal handling.

mod builder;
mod config;
mod dispatcher;
mod fetch_loop;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::Config;
pub use fetch_loop::{FatalCallback, FatalShutdown};
pub use supervisor::ConsumerSupervisor;
