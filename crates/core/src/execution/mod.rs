//! Execution units and the executor pool.
//!
//! A unit runs one pipeline call either inline on the caller's runtime or on
//! an isolated worker thread reached only through messages. The pool owns a
//! fixed number of units, queues calls above capacity, and can abort and
//! rebuild everything at once.

mod error;
mod factory;
mod inline;
mod isolated;
mod messages;
mod pool;
mod unit;

pub use error::UnitError;
pub use factory::{PipelineUnitFactory, UnitFactory};
pub use inline::InlineUnit;
pub use isolated::IsolatedUnit;
pub use messages::{WorkerRequest, WorkerResponse};
pub use pool::{infer_default_concurrency, ExecutorPool};
pub use unit::{ExecutionUnit, UnitMode};
