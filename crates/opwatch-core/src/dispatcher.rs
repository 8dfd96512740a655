//! Record dispatch.
//!
//! The dispatcher sits between the change-log tailer and the event bus. It
//! receives tailer signals over a channel, turns each record into events,
//! drops the excluded ones and publishes the rest.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

use opwatch_proto::{OpCode, RawChangeRecord};

use crate::builder::EventBuilder;
use crate::bus::EventBus;
use crate::config::ExclusionConfig;
use crate::error::Error;
use crate::exclusion::is_excluded;
use crate::logger::SharedLogger;

/// A signal emitted by the change-log tailer.
#[derive(Debug, Clone, PartialEq)]
pub enum TailerEvent {
    /// An insert record.
    Insert(RawChangeRecord),
    /// An update record.
    Update(RawChangeRecord),
    /// A delete record.
    Delete(RawChangeRecord),
    /// The stream ended.
    End,
    /// The stream reported an error.
    Error(String),
}

impl TailerEvent {
    /// Wrap a record in the signal matching its operation code.
    ///
    /// Records of other kinds (no-ops, commands) are not forwarded by a
    /// tailer and return `None`.
    pub fn from_record(record: RawChangeRecord) -> Option<Self> {
        match record.op {
            OpCode::Insert => Some(Self::Insert(record)),
            OpCode::Update => Some(Self::Update(record)),
            OpCode::Delete => Some(Self::Delete(record)),
            OpCode::Other(_) => None,
        }
    }

    /// The carried record, if any.
    pub fn record(&self) -> Option<&RawChangeRecord> {
        match self {
            Self::Insert(record) | Self::Update(record) | Self::Delete(record) => Some(record),
            Self::End | Self::Error(_) => None,
        }
    }
}

/// Outcome of dispatching one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events produced by the builder.
    pub built: usize,
    /// Events dropped by the exclusion filter.
    pub excluded: usize,
    /// Events published on the bus.
    pub published: usize,
    /// Listener invocations across all published events.
    pub delivered: usize,
}

/// Turns raw records into published events.
pub struct Dispatcher {
    builder: EventBuilder,
    bus: Arc<EventBus>,
    exclusions: Arc<ExclusionConfig>,
    logger: SharedLogger,
    /// Keeps the events of one record contiguous on the bus.
    publish: Mutex<()>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(
        builder: EventBuilder,
        bus: Arc<EventBus>,
        exclusions: Arc<ExclusionConfig>,
        logger: SharedLogger,
    ) -> Self {
        Self {
            builder,
            bus,
            exclusions,
            logger,
            publish: Mutex::new(()),
        }
    }

    /// The bus events are published on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Dispatch a single record.
    ///
    /// A build failure is logged and yields an empty report. Unsupported
    /// operations are logged at debug level, other failures as errors.
    ///
    /// Listeners run synchronously while this record's events are published,
    /// and publishing is serialized across records. A slow listener therefore
    /// holds back every other record task that reaches its publish step, and
    /// it blocks the runtime worker it runs on. Listeners that do real work
    /// should hand the event off to their own task or channel.
    pub async fn dispatch(&self, record: &RawChangeRecord) -> DispatchReport {
        let events = match self.builder.build(record).await {
            Ok(events) => events,
            Err(e @ Error::UnsupportedOperation(_)) => {
                self.logger
                    .debug(&format!("ignoring record on {:?}: {e}", record.namespace));
                return DispatchReport::default();
            }
            Err(e) => {
                self.logger.error(&format!(
                    "error building events for {:?} record on {:?}: {e}",
                    record.op.code(),
                    record.namespace
                ));
                return DispatchReport::default();
            }
        };

        let mut report = DispatchReport {
            built: events.len(),
            ..DispatchReport::default()
        };

        let _guard = self.publish.lock();
        for event in events {
            if is_excluded(&event.event_name, self.exclusions.paths_for(event.operation_kind)) {
                report.excluded += 1;
                continue;
            }
            let name = event.event_name.clone();
            report.delivered += self.bus.publish(&name, Arc::new(event));
            report.published += 1;
        }

        debug!(
            op = record.op.code(),
            ns = %record.namespace,
            built = report.built,
            excluded = report.excluded,
            published = report.published,
            delivered = report.delivered,
            "dispatched record"
        );
        report
    }

    /// Handle one tailer signal.
    ///
    /// Returns a report for record signals; stream end and stream errors are
    /// logged and processing continues.
    pub async fn handle(&self, signal: TailerEvent) -> Option<DispatchReport> {
        match signal {
            TailerEvent::Insert(record) | TailerEvent::Update(record) | TailerEvent::Delete(record) => {
                Some(self.dispatch(&record).await)
            }
            TailerEvent::End => {
                self.logger.error("change log stream ended");
                None
            }
            TailerEvent::Error(message) => {
                self.logger.error(&format!("change log stream error: {message}"));
                None
            }
        }
    }

    /// Run as a background task until the channel closes.
    ///
    /// Each record is processed on its own task, so a slow re-fetch does not
    /// hold back later records. Outstanding tasks are drained before return.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<TailerEvent>) {
        info!("dispatcher started");
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                signal = rx.recv() => match signal {
                    Some(signal) if signal.record().is_some() => {
                        let dispatcher = Arc::clone(&self);
                        in_flight.spawn(async move {
                            dispatcher.handle(signal).await;
                        });
                    }
                    Some(signal) => {
                        self.handle(signal).await;
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    self.reap(joined);
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            self.reap(joined);
        }

        info!("dispatcher stopped (channel closed)");
    }

    fn reap(&self, joined: Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            self.logger.error(&format!("record task failed: {e}"));
        }
    }
}

/// Tailer channel sender.
pub type TailerSender = mpsc::Sender<TailerEvent>;

/// Tailer channel receiver.
pub type TailerReceiver = mpsc::Receiver<TailerEvent>;

/// Create a new tailer channel with the given buffer size.
pub fn channel(buffer_size: usize) -> (TailerSender, TailerReceiver) {
    mpsc::channel(buffer_size.max(1))
}

/// Handle for feeding a running dispatcher.
#[derive(Clone)]
pub struct TailerHandle {
    tx: TailerSender,
}

impl TailerHandle {
    /// Create a handle from a sender.
    pub fn new(tx: TailerSender) -> Self {
        Self { tx }
    }

    /// Submit a signal, waiting if the channel is full.
    pub async fn send(&self, signal: TailerEvent) -> Result<(), mpsc::error::SendError<TailerEvent>> {
        self.tx.send(signal).await
    }

    /// Submit a signal without waiting.
    pub fn try_send(&self, signal: TailerEvent) -> Result<(), mpsc::error::TrySendError<TailerEvent>> {
        self.tx.try_send(signal)
    }

    /// Clone the underlying sender.
    pub fn clone_sender(&self) -> TailerSender {
        self.tx.clone()
    }
}

/// Spawn `dispatcher` on a new channel.
///
/// The task ends once every [`TailerHandle`] (and cloned sender) is dropped
/// and in-flight records have been published.
pub fn start_dispatcher(dispatcher: Arc<Dispatcher>, buffer_size: usize) -> (TailerHandle, JoinHandle<()>) {
    let (tx, rx) = channel(buffer_size);
    let task = tokio::spawn(dispatcher.run(rx));
    (TailerHandle::new(tx), task)
}
