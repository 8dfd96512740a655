//! The change feed facade.

use std::sync::Arc;

use tokio::task::JoinHandle;

use opwatch_proto::RawChangeRecord;

use crate::builder::EventBuilder;
use crate::bus::EventBus;
use crate::config::FeedConfig;
use crate::dispatcher::{start_dispatcher, DispatchReport, Dispatcher, TailerHandle};
use crate::logger::{DebugGate, SharedLogger};
use crate::registry::ConnectionRegistry;

/// A configured change feed: one bus, one dispatcher.
///
/// Subscribe through [`ChangeFeed::bus`], then either call
/// [`ChangeFeed::start`] and push tailer signals into the returned handle or
/// feed records directly with [`ChangeFeed::dispatch`].
pub struct ChangeFeed {
    bus: Arc<EventBus>,
    dispatcher: Arc<Dispatcher>,
    config: FeedConfig,
}

impl ChangeFeed {
    /// Create a feed.
    ///
    /// `logger` only receives messages when `config.debug_mode` is set.
    pub fn new(config: FeedConfig, registry: ConnectionRegistry, logger: SharedLogger) -> Self {
        let logger: SharedLogger = Arc::new(DebugGate::new(logger, config.debug_mode));
        let bus = Arc::new(EventBus::new());
        let builder = EventBuilder::new(Arc::new(registry), Arc::clone(&logger));
        let dispatcher = Dispatcher::new(
            builder,
            Arc::clone(&bus),
            Arc::new(config.exclusions.clone()),
            logger,
        );

        Self {
            bus,
            dispatcher: Arc::new(dispatcher),
            config,
        }
    }

    /// The event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The configuration this feed was built with.
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Dispatch one record inline.
    pub async fn dispatch(&self, record: &RawChangeRecord) -> DispatchReport {
        self.dispatcher.dispatch(record).await
    }

    /// Spawn the dispatcher and return a handle for the tailer.
    pub fn start(&self) -> (TailerHandle, JoinHandle<()>) {
        start_dispatcher(Arc::clone(&self.dispatcher), self.config.tailer_capacity)
    }
}
