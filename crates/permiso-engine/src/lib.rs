//! permiso-engine - async runtime for the permit intake dialogue.
//!
//! Builds the running engine out of the domain pieces in `permiso-core`:
//! the key-value store adapter with its interchangeable backends, the
//! per-identity distributed lock, the session store, the recovery policy,
//! and the per-message pipeline that ties them together.
//!
//! # Modules
//!
//! - [`store`]: `KvStore` trait, memory and `SQLite` backends, retry wrapper
//! - [`lock`]: per-identity lease lock with owner-checked release
//! - [`session_store`]: session load/save/clear with TTL refresh
//! - [`outbound`]: transport collaborator contract
//! - [`recovery`]: failure tracking, suspension, per-kind recovery scripts
//! - [`pipeline`]: the `Engine` itself
//!
//! # Concurrency
//!
//! One `Engine::handle_message` invocation per inbound message; any number
//! may run concurrently. Session mutation for a single identity serializes
//! around that identity's lock; everything else is either backend-atomic or
//! a bounded concurrent in-process cache.

pub mod error;
pub mod lock;
pub mod outbound;
pub mod pipeline;
pub mod recovery;
pub mod session_store;
pub mod store;

pub use error::EngineError;
pub use lock::{LockGuard, LockManager};
pub use outbound::{MessageSink, OutboundMessage, RecordingSink, SendError};
pub use pipeline::{Engine, EngineStats, InboundMessage, Outcome};
pub use recovery::{RecoveryOutcome, RecoveryPolicy, RecoveryStats};
pub use session_store::SessionStore;
pub use store::{KvStore, MemoryStore, RetryStore, SqliteStore, StoreError};
