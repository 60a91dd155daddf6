//! Row streams
//!
//! A [`RowSource`] is the re-creatable description of one batch. Every insert
//! attempt calls [`RowSource::open`] to get a fresh [`RowStream`] that yields
//! the batch's records lazily, in increasing index order. Streams are never
//! rewound; a retry simply opens a new one.

use crate::batch::BatchSpan;
use crate::synth::{RandomSource, Record, RecordSynthesizer};
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Factory for the rows of one batch
#[derive(Debug, Clone)]
pub struct RowSource {
    synth: Arc<RecordSynthesizer>,
    span: BatchSpan,
}

impl RowSource {
    pub fn new(synth: Arc<RecordSynthesizer>, span: BatchSpan) -> Self {
        Self { synth, span }
    }

    pub fn span(&self) -> BatchSpan {
        self.span
    }

    /// A fresh stream positioned at the batch offset
    pub fn open(&self) -> RowStream {
        RowStream {
            rng: self.synth.batch_rng(self.span.offset),
            synth: Arc::clone(&self.synth),
            start: self.span.offset,
            next: self.span.offset,
            end: self.span.end(),
            counter: StreamCounter::default(),
        }
    }
}

/// Shared count of rows pulled from a [`RowStream`].
///
/// Stays readable after the stream was moved into (and dropped by) a sink.
#[derive(Debug, Clone, Default)]
pub struct StreamCounter(Arc<AtomicU64>);

impl StreamCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Single-pass stream of the records of one batch
#[derive(Debug)]
pub struct RowStream {
    synth: Arc<RecordSynthesizer>,
    rng: RandomSource,
    start: u64,
    next: u64,
    end: u64,
    counter: StreamCounter,
}

impl RowStream {
    /// Handle reporting how many rows have been pulled so far
    pub fn streamed(&self) -> StreamCounter {
        self.counter.clone()
    }

    /// Logical index of the first row of the batch
    pub fn offset(&self) -> u64 {
        self.start
    }

    /// Rows not yet pulled
    pub fn remaining(&self) -> u64 {
        self.end - self.next
    }

    fn next_record(&mut self) -> Option<Record> {
        if self.next >= self.end {
            return None;
        }
        let record = self.synth.generate(self.next, &mut self.rng);
        self.next += 1;
        self.counter.incr();
        Some(record)
    }
}

impl Stream for RowStream {
    type Item = Record;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().next_record())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}
