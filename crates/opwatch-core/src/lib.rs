//! opwatch core.
//!
//! Normalizes raw change-log records into addressable change events and
//! delivers them over an in-process event bus.
//!
//! # Architecture
//!
//! ```text
//! tailer -> Dispatcher -> EventBuilder -> (re-fetch) -> exclusion -> EventBus -> listeners
//! ```
//!
//! - [`builder`] - Record to event translation and update enrichment
//! - [`dispatcher`] - Tailer channel, exclusion filtering, publishing
//! - [`bus`] - Named-event pub/sub
//! - [`subscription`] - `subscribe_all`, `wait_for_match`, `on_match`
//! - [`registry`] - Database handles used for re-fetches
//! - [`feed`] - Wires it all together

pub mod builder;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod exclusion;
pub mod feed;
pub mod logger;
pub mod naming;
pub mod paths;
pub mod registry;
pub mod subscription;

pub use builder::{update_paths, EventBuilder};
pub use bus::{EventBus, ListenerControl, ListenerId, SharedEventBus};
pub use config::{ExclusionConfig, FeedConfig, DEFAULT_TAILER_CAPACITY};
pub use dispatcher::{start_dispatcher, DispatchReport, Dispatcher, TailerEvent, TailerHandle};
pub use error::{Error, Result};
pub use exclusion::is_excluded;
pub use feed::ChangeFeed;
pub use logger::{DebugGate, EventLogger, LogLevel, MemoryLogger, NullLogger, SharedLogger, TracingLogger};
pub use naming::{delete_event, event_name, insert_event, parse_event_name, update_event};
pub use paths::compute_paths;
pub use registry::{CollectionHandle, Connection, ConnectionRegistry, DatabaseHandle, MemoryDatabase};
pub use subscription::{PendingMatch, Predicate, Subscription};
