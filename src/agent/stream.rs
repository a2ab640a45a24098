//! Throttled accumulation of streamed completion text.

use std::time::Duration;

use futures_util::StreamExt;
use log::trace;
use tokio::time::Instant;

use super::error::ChatError;
use super::providers::FragmentStream;

/// Default spacing between two snapshot deliveries.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Receives cumulative snapshots of one response.
///
/// Implementations must not do interactive work themselves; the dispatcher's
/// sink only posts the text to the interactive inbox.
pub trait SnapshotSink {
    fn deliver(&mut self, snapshot: &str);
}

impl<F: FnMut(&str)> SnapshotSink for F {
    fn deliver(&mut self, snapshot: &str) {
        self(snapshot)
    }
}

/// A stream that ended with an error after possibly producing some text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub partial: String,
    pub error: ChatError,
}

/// Concatenates fragments and hands the running text to a sink at most once
/// per `interval`, plus once more at the end if anything is still unsent.
pub struct StreamAggregator<S> {
    sink: S,
    interval: Duration,
    accumulated: String,
    pending_since_last_flush: bool,
    last_flush: Instant,
    deliveries: usize,
}

impl<S: SnapshotSink> StreamAggregator<S> {
    pub fn new(sink: S) -> Self {
        Self::with_interval(sink, DEFAULT_FLUSH_INTERVAL)
    }

    /// The throttle window starts now, so a burst right after creation is
    /// held until `interval` has passed.
    pub fn with_interval(sink: S, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            accumulated: String::new(),
            pending_since_last_flush: false,
            last_flush: Instant::now(),
            deliveries: 0,
        }
    }

    /// Pulls `fragments` to exhaustion. Returns the full text, or the text
    /// gathered before the stream failed.
    pub async fn run(mut self, mut fragments: FragmentStream) -> Result<String, StreamFailure> {
        while let Some(item) = fragments.next().await {
            match item {
                Ok(Some(fragment)) if !fragment.is_empty() => self.push(&fragment),
                Ok(_) => continue,
                Err(error) => {
                    self.finish();
                    return Err(StreamFailure {
                        partial: self.accumulated,
                        error,
                    });
                }
            }
        }
        self.finish();
        Ok(self.accumulated)
    }

    /// Appends one fragment and flushes if the throttle window has elapsed.
    pub fn push(&mut self, fragment: &str) {
        self.accumulated.push_str(fragment);
        self.pending_since_last_flush = true;
        if self.last_flush.elapsed() >= self.interval {
            self.flush();
        }
    }

    /// Emits the last snapshot if anything arrived since the previous one.
    pub fn finish(&mut self) {
        if self.pending_since_last_flush {
            self.flush();
        }
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    pub fn deliveries(&self) -> usize {
        self.deliveries
    }

    fn flush(&mut self) {
        self.sink.deliver(&self.accumulated);
        self.pending_since_last_flush = false;
        self.last_flush = Instant::now();
        self.deliveries += 1;
        trace!("Delivered snapshot #{} ({} bytes)", self.deliveries, self.accumulated.len());
    }
}
