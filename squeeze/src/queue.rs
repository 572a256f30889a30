//! Bounded multi-producer, single-consumer outbound queue.
//!
//! ```text
//! producer ─┐
//! producer ─┼─► Outbox ─► [capacity] ─► Drain ─► writer task ─► stream
//! producer ─┘
//! ```
//!
//! A full queue blocks producers until the consumer takes an item; nothing
//! is ever dropped. Completion is explicit: once every [`Outbox`] handle
//! was completed (or dropped) the [`Drain`] yields the remaining items and
//! then ends.

use squeeze_proto::Source;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Creates a queue holding at most `capacity` pending items.
pub fn outbox(capacity: usize) -> Result<(Outbox, Drain)> {
    if capacity == 0 {
        return Err(Error::InvalidCapacity);
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((Outbox { tx }, Drain { rx }))
}

/// Producer handle. Cheap to clone; each clone is one producer.
#[derive(Debug, Clone)]
pub struct Outbox {
    /// Channel sender.
    tx: mpsc::Sender<Source>,
}

impl Outbox {
    /// Queues one body, waiting while the queue is full.
    ///
    /// Fails with [`Error::QueueClosed`] once the consumer is gone.
    pub async fn enqueue(&self, body: impl Into<Source>) -> Result<()> {
        self.tx
            .send(body.into())
            .await
            .map_err(|_| Error::QueueClosed)
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    /// Declares that this producer has nothing more to send.
    pub fn complete(self) {
        drop(self);
    }
}

/// Consumer handle.
#[derive(Debug)]
pub struct Drain {
    /// Channel receiver.
    rx: mpsc::Receiver<Source>,
}

impl Drain {
    /// Next body in enqueue order, or `None` once the queue is completed
    /// and empty.
    pub async fn next(&mut self) -> Option<Source> {
        self.rx.recv().await
    }

    /// Stops accepting new items. Items already queued can still be taken.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn bytes(src: Source) -> Vec<u8> {
        match src {
            Source::Bytes(b) => b,
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(outbox(0), Err(Error::InvalidCapacity)));
    }

    #[tokio::test]
    async fn full_queue_blocks_until_drained() {
        let (tx, mut rx) = outbox(1).unwrap();
        tx.enqueue("first").await.unwrap();
        assert_eq!(tx.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.enqueue("second")).await;
        assert!(blocked.is_err(), "enqueue should wait on a full queue");

        let producer = {
            let tx = tx.clone();
            tokio::spawn(async move { tx.enqueue("second").await })
        };
        assert_eq!(bytes(rx.next().await.unwrap()), b"first");
        producer.await.unwrap().unwrap();
        assert_eq!(bytes(rx.next().await.unwrap()), b"second");
    }

    #[tokio::test]
    async fn completion_drains_remaining_items_in_order() {
        let (tx, mut rx) = outbox(8).unwrap();
        for i in 0..5 {
            tx.enqueue(format!("msg {i}")).await.unwrap();
        }
        tx.complete();

        let mut seen = Vec::new();
        while let Some(src) = rx.next().await {
            seen.push(String::from_utf8(bytes(src)).unwrap());
        }
        assert_eq!(seen, ["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    }

    #[tokio::test]
    async fn many_producers_lose_nothing() {
        let (tx, mut rx) = outbox(2).unwrap();
        let mut tasks = Vec::new();
        for p in 0..4u8 {
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..25u8 {
                    tx.enqueue(vec![p, i]).await.unwrap();
                }
            }));
        }
        tx.complete();

        let mut count = 0;
        let mut last = [None; 4];
        while let Some(src) = rx.next().await {
            let b = bytes(src);
            let p = usize::from(b[0]);
            assert!(last[p].is_none_or(|prev| prev < b[1]), "per-producer order");
            last[p] = Some(b[1]);
            count += 1;
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(count, 100);
    }

    #[tokio::test]
    async fn closed_consumer_rejects_producers() {
        let (tx, mut rx) = outbox(4).unwrap();
        tx.enqueue("kept").await.unwrap();
        rx.close();
        assert!(matches!(tx.enqueue("late").await, Err(Error::QueueClosed)));
        assert_eq!(bytes(rx.next().await.unwrap()), b"kept");
        assert!(rx.next().await.is_none());
    }
}
