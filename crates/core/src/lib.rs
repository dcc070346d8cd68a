// crates/core/src/lib.rs
//! Session health engine core.
//!
//! Filesystem-coordinated, cross-process health gathering for concurrent
//! Claude Code sessions sharing one machine: freshness accounting, atomic
//! file coordination, transcript scanning, cost estimation, and the
//! statusline formatter that reads it all back out.

pub mod atomic_file;
pub mod broker;
pub mod change_detector;
pub mod cleanup_sweeper;
pub mod cost_calculator;
pub mod error;
pub mod fetchers;
pub mod formatter;
pub mod freshness;
pub mod gather_context;
pub mod git_status;
pub mod global_cache;
pub mod health_record_writer;
pub mod notification_store;
pub mod pid_liveness;
pub mod refresh_intent;
pub mod sanitizer;
pub mod secret_scanner;
pub mod session_lock;
pub mod single_flight;
pub mod source_registry;
pub mod sources;
pub mod state_serializer;
pub mod transcript_scanner;

pub use broker::{GatherOutcome, SourceRunRecord, UnifiedBroker};
pub use error::AtomicWriteError;
pub use formatter::format_all;
pub use gather_context::{BrokerInput, GatherContext};
pub use health_record_writer::HealthRecordWriter;
pub use session_lock::SessionLockError;
pub use single_flight::{AcquireOutcome, SingleFlight};
pub use source_registry::{DataSourceDescriptor, FetchOutcome, SourceRegistry};
