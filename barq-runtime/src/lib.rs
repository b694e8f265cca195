//! Invocation engine for containerized functions
//!
//! Wires the container driver, warm pool, runtime adapters, function
//! registry and telemetry sink into the two-tier (warm-then-cold)
//! invocation path, plus the HTTP surface in [`handlers`].

pub mod driver;
pub mod function;
pub mod handlers;
pub mod invocation;
pub mod invoker;
pub mod pool;
pub mod registry;
pub mod runtimes;
pub mod workspace;

pub use driver::ContainerDriver;
pub use function::{FunctionRecord, Runtime};
pub use invoker::Invoker;
pub use pool::WarmPool;
pub use registry::{FanOutTelemetrySink, FunctionRegistry, InMemoryRegistry};
pub use workspace::WorkspaceStore;
