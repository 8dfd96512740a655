//! Newline-delimited record replay.
//!
//! Plays the role of the change-log tailer: each non-blank input line is one
//! JSON record in the replication-log shape (`{"op", "ns", "o", "o2"}`).
//! Unparseable lines become stream errors and end of input becomes the end
//! signal, so the dispatcher sees the same signals a live tailer would send.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use opwatch_core::{TailerEvent, TailerHandle};
use opwatch_proto::RawChangeRecord;

use crate::error::{Error, Result};

/// Counters for one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Lines read, blank lines excluded.
    pub lines: usize,
    /// Records forwarded to the dispatcher.
    pub forwarded: usize,
    /// Records of other operation kinds (no-ops, commands).
    pub skipped: usize,
    /// Lines that could not be parsed.
    pub errors: usize,
}

/// Read records from `reader` until end of input and forward them.
pub async fn replay<R>(reader: R, handle: &TailerHandle) -> Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let signal = match RawChangeRecord::from_json(line) {
            Ok(record) => match TailerEvent::from_record(record) {
                Some(signal) => {
                    stats.forwarded += 1;
                    signal
                }
                None => {
                    stats.skipped += 1;
                    debug!(line = stats.lines, "skipping record of unhandled kind");
                    continue;
                }
            },
            Err(e) => {
                stats.errors += 1;
                warn!(line = stats.lines, error = %e, "unparseable record");
                TailerEvent::Error(format!("line {}: {e}", stats.lines))
            }
        };

        handle.send(signal).await.map_err(|_| Error::DispatcherClosed)?;
    }

    handle
        .send(TailerEvent::End)
        .await
        .map_err(|_| Error::DispatcherClosed)?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opwatch_core::dispatcher::channel;

    async fn collect(input: &str) -> (ReplayStats, Vec<TailerEvent>) {
        let (tx, mut rx) = channel(64);
        let handle = TailerHandle::new(tx);
        let stats = replay(input.as_bytes(), &handle).await.unwrap();
        drop(handle);

        let mut signals = Vec::new();
        while let Some(signal) = rx.recv().await {
            signals.push(signal);
        }
        (stats, signals)
    }

    #[tokio::test]
    async fn test_replay_forwards_records_in_order() {
        let input = concat!(
            r#"{"op": "i", "ns": "shop.orders", "o": {"_id": 1}}"#,
            "\n\n",
            r#"{"op": "u", "ns": "shop.orders", "o2": {"_id": 1}, "o": {"$set": {"status": "paid"}}}"#,
            "\n",
            r#"{"op": "d", "ns": "shop.orders", "o": {"_id": 1}}"#,
            "\n",
        );

        let (stats, signals) = collect(input).await;
        assert_eq!(stats, ReplayStats { lines: 3, forwarded: 3, skipped: 0, errors: 0 });
        assert!(matches!(signals[0], TailerEvent::Insert(_)));
        assert!(matches!(signals[1], TailerEvent::Update(_)));
        assert!(matches!(signals[2], TailerEvent::Delete(_)));
        assert_eq!(signals[3], TailerEvent::End);
    }

    #[tokio::test]
    async fn test_replay_reports_bad_lines_and_skips_noops() {
        let input = "not json\n{\"op\": \"n\", \"ns\": \"\", \"o\": {}}\n";

        let (stats, signals) = collect(input).await;
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(signals.len(), 2);
        assert!(matches!(&signals[0], TailerEvent::Error(message) if message.starts_with("line 1:")));
        assert_eq!(signals[1], TailerEvent::End);
    }

    #[tokio::test]
    async fn test_replay_fails_when_dispatcher_is_gone() {
        let (tx, rx) = channel(1);
        drop(rx);
        let handle = TailerHandle::new(tx);

        let err = replay("".as_bytes(), &handle).await.unwrap_err();
        assert!(matches!(err, Error::DispatcherClosed));
    }
}
