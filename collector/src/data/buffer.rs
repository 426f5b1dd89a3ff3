//! Bounded in-memory span buffer between ingest handlers and the writer
//!
//! Drop-oldest on overflow: producers never block and never fail. Under
//! sustained overload the buffer keeps the freshest records, and the drop
//! count is visible through `overflow_count` and the health endpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::types::SpanRecord;

pub struct SpanBuffer {
    queue: Mutex<VecDeque<SpanRecord>>,
    capacity: usize,
    overflow: AtomicU64,
    notify: Notify,
}

impl SpanBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
            overflow: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Append records in order, discarding the oldest retained records when
    /// the buffer is full. Returns the number of records dropped.
    pub fn push_batch(&self, records: Vec<SpanRecord>) -> usize {
        if records.is_empty() {
            return 0;
        }

        let mut dropped = 0;
        {
            let mut queue = self.queue.lock();
            for record in records {
                if queue.len() >= self.capacity {
                    queue.pop_front();
                    dropped += 1;
                }
                queue.push_back(record);
            }
        }

        if dropped > 0 {
            self.overflow.fetch_add(dropped as u64, Ordering::Relaxed);
            tracing::warn!(
                dropped,
                capacity = self.capacity,
                "Buffer full, dropped oldest spans"
            );
        }

        self.notify.notify_one();
        dropped
    }

    /// Remove and return up to `max` records from the head, preserving order
    pub fn drain(&self, max: usize) -> Vec<SpanRecord> {
        let mut queue = self.queue.lock();
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Put a failed batch back at the head so it is retried before newer
    /// records. If the buffer refilled past capacity in the meantime, the
    /// oldest of the re-queued records are dropped.
    pub fn requeue_front(&self, records: Vec<SpanRecord>) {
        if records.is_empty() {
            return;
        }

        let dropped;
        {
            let mut queue = self.queue.lock();
            let available = self.capacity.saturating_sub(queue.len());
            // records[..dropped] are the oldest of the batch
            dropped = records.len().saturating_sub(available);
            for record in records.into_iter().skip(dropped).rev() {
                queue.push_front(record);
            }
        }

        if dropped > 0 {
            self.overflow.fetch_add(dropped as u64, Ordering::Relaxed);
            tracing::warn!(dropped, "Buffer full during re-queue, dropped oldest spans");
        }

        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Current depth as a fraction of capacity, in [0.0, 1.0]
    pub fn usage(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Total records discarded due to overflow since startup
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Wait until a producer signals new records
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(span_id: &str) -> SpanRecord {
        SpanRecord {
            time: Utc::now(),
            trace_id: "trace-1".to_string(),
            span_id: span_id.to_string(),
            span_name: "llm.call".to_string(),
            pipeline_id: "pipe-1".to_string(),
            stage: "extract".to_string(),
            model: "gpt-4o".to_string(),
            provider: "openai".to_string(),
            tokens_input: Some(100),
            tokens_output: Some(50),
            cost_input: Some(0.001),
            cost_output: Some(0.002),
            cost_total: Some(0.003),
            duration_ms: 120.0,
        }
    }

    fn records(ids: &[&str]) -> Vec<SpanRecord> {
        ids.iter().map(|id| record(id)).collect()
    }

    fn span_ids(buffer: &SpanBuffer) -> Vec<String> {
        buffer
            .drain(usize::MAX)
            .into_iter()
            .map(|r| r.span_id)
            .collect()
    }

    #[test]
    fn test_fifo_order_preserved() {
        let buffer = SpanBuffer::new(10);
        buffer.push_batch(records(&["a", "b", "c"]));
        assert_eq!(span_ids(&buffer), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_drop_oldest_keeps_freshest() {
        let buffer = SpanBuffer::new(2);
        buffer.push_batch(records(&["s1", "s2", "s3", "s4", "s5"]));
        assert_eq!(buffer.overflow_count(), 3);
        assert_eq!(span_ids(&buffer), vec!["s4", "s5"]);
    }

    #[test]
    fn test_capacity_one_retains_exactly_one() {
        let buffer = SpanBuffer::new(1);
        buffer.push_batch(records(&["a"]));
        buffer.push_batch(records(&["b"]));
        assert_eq!(buffer.overflow_count(), 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(span_ids(&buffer), vec!["b"]);
    }

    #[test]
    fn test_usage_bounds() {
        let buffer = SpanBuffer::new(4);
        assert_eq!(buffer.usage(), 0.0);
        buffer.push_batch(records(&["a", "b"]));
        assert_eq!(buffer.usage(), 0.5);
        buffer.push_batch(records(&["c", "d", "e", "f"]));
        assert!(buffer.usage() <= 1.0);
        assert_eq!(buffer.usage(), 1.0);
    }

    #[test]
    fn test_drain_respects_max() {
        let buffer = SpanBuffer::new(10);
        buffer.push_batch(records(&["a", "b", "c"]));
        let first = buffer.drain(2);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].span_id, "a");
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_requeue_front_preserves_order() {
        let buffer = SpanBuffer::new(10);
        buffer.push_batch(records(&["a", "b", "c", "d"]));
        let batch = buffer.drain(2);
        buffer.requeue_front(batch);
        assert_eq!(span_ids(&buffer), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_requeue_front_over_capacity_drops_oldest_of_batch() {
        let buffer = SpanBuffer::new(3);
        buffer.push_batch(records(&["a", "b", "c"]));
        let batch = buffer.drain(2); // a, b
        buffer.push_batch(records(&["d", "e"])); // queue: c, d, e (full)
        buffer.requeue_front(batch); // no room: a and b dropped
        assert_eq!(buffer.overflow_count(), 2);
        assert_eq!(span_ids(&buffer), vec!["c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        use std::sync::Arc;

        let buffer = Arc::new(SpanBuffer::new(10));
        let waiter = Arc::clone(&buffer);
        let handle = tokio::spawn(async move {
            waiter.notified().await;
        });

        tokio::task::yield_now().await;
        buffer.push_batch(records(&["a"]));

        tokio::time::timeout(std::time::Duration::from_millis(100), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
