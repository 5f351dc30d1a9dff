//! Instance lifecycle and terminal multiplexing for collaborative sandbox
//! sessions.
//!
//! A [`Sandbox`] creates and deletes container-backed instances inside a
//! [`Session`], keeps exactly one attach channel per instance in the
//! [`ConnectionRegistry`], and relays terminal output to session observers
//! through the [`EventBus`](sandbox_common::EventBus).
//!
//! The container engine, persistence and gauge reporting are collaborators
//! behind the [`ContainerEngine`], [`Storage`] and [`Gauges`] traits.

pub mod engine;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod sanitize;
pub mod storage;
pub mod transfer;
pub mod types;

pub use engine::{BoxedReader, BoxedWriter, ContainerEngine, CreateContainerOpts, TerminalChannel};
pub use lifecycle::Sandbox;
pub use metrics::{GaugeSnapshot, Gauges, NoopGauges};
pub use registry::{Connection, ConnectionRegistry};
pub use relay::{RelayExit, RelayHandle, TerminalRelay};
pub use sanitize::Utf8Sanitizer;
pub use storage::{MemoryStorage, Storage};
pub use types::{Instance, InstanceConfig, Session, TlsMaterial};
