//! Printing watched events.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use opwatch_core::{EventBus, Subscription};
use opwatch_proto::ChangeEvent;

/// Shared output sink.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Wrap a writer for use by [`watch`].
pub fn shared_writer<W: Write + Send + 'static>(writer: W) -> SharedWriter {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Render one event as a single JSON line.
pub fn render(name: &str, event: &ChangeEvent) -> String {
    json!({ "event": name, "payload": event.to_document().to_json() }).to_string()
}

/// Print every event published under `names` to `writer`, one JSON line each.
pub fn watch<I, S>(bus: &Arc<EventBus>, names: I, writer: SharedWriter) -> Subscription
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    bus.subscribe_all(names, move |name, event| {
        let line = render(name, event);
        let mut out = writer.lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::error!(error = %e, event = name, "failed to write event");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opwatch_core::{ChangeFeed, ConnectionRegistry, FeedConfig, NullLogger};
    use opwatch_proto::{Document, RawChangeRecord};

    /// Writer that keeps everything written in a shared buffer.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn lines(&self) -> Vec<serde_json::Value> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    #[tokio::test]
    async fn test_watch_prints_only_watched_names() {
        let feed = ChangeFeed::new(FeedConfig::default(), ConnectionRegistry::new(), Arc::new(NullLogger));
        let capture = Capture::default();
        let subscription = watch(feed.bus(), ["insert:shop.orders"], shared_writer(capture.clone()));

        feed.dispatch(&RawChangeRecord::insert(
            "shop.orders",
            Document::from(serde_json::json!({"_id": 1, "total": 9})),
        ))
        .await;
        feed.dispatch(&RawChangeRecord::insert(
            "shop.users",
            Document::from(serde_json::json!({"_id": 2})),
        ))
        .await;

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event"], "insert:shop.orders");
        assert_eq!(lines[0]["payload"]["document_id"], 1);
        assert_eq!(lines[0]["payload"]["document"]["total"], 9);

        assert_eq!(subscription.unsubscribe(), 1);
    }
}
