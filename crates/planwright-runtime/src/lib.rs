//! # Planwright Runtime
//!
//! Process-wide execution state: the registry of live execution records,
//! bounded event fan-out with slow-consumer eviction, replay-then-live
//! subscriber streams, the background execution driver, and the grace
//! period sweeper.

mod driver;
mod record;
mod registry;
mod stream;

pub use driver::start_execution;
pub use record::{ExecutionStatus, ExecutionView};
pub use registry::{ExecutionRegistry, RegistryConfig, RegistryObserver};
pub use stream::EventStream;
