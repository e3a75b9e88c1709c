pub mod access;
pub mod aggregate;
pub mod config;
pub mod error;
pub mod ids;
pub mod model;
pub mod redirect;
pub mod session;
pub mod stack;
pub mod stats;
pub mod store;
pub mod time;

pub use error::{ProfilerError, Result};
pub use session::{Session, Step, scope, start, step, stop};
