// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Stream storage.
//!
//! Streams are kept per sender, indexed by a sequential [`StreamId`]. Records
//! are never removed; cancelled and completed streams stay as audit records.
//!
//! # Locking
//!
//! ```text
//! DashMap shard lock   ── held only to allocate an id or clone a slot handle
//! slot writer lock     ── reentrant, serializes withdraw/cancel per stream
//! slot record lock     ── held only for the instant of a read or commit
//! ```
//!
//! The shard lock is never held while a slot lock is taken, so operations on
//! different streams never wait on each other.
//!
//! # Example
//!
//! ```
//! use payment_stream_rs::{AccountId, StreamId, StreamStore, StreamTerms, Timestamp};
//! use rust_decimal_macros::dec;
//!
//! let store = StreamStore::new();
//! let terms = StreamTerms {
//!     recipient: AccountId(2),
//!     deposit: dec!(100),
//!     start_time: Timestamp(0),
//!     duration: 100,
//! };
//! let id = store.create(AccountId(1), terms).unwrap();
//! assert_eq!(id, StreamId(0));
//! assert_eq!(store.get(AccountId(1), id).unwrap().rate_per_second, dec!(1));
//! ```

use crate::StreamError;
use crate::base::{AccountId, StreamId};
use crate::stream::{Stream, StreamStatus, StreamTerms};
use dashmap::DashMap;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A single stream record and its writer lock.
#[derive(Debug)]
pub(crate) struct StreamSlot {
    writer: ReentrantMutex<()>,
    record: Mutex<Stream>,
    /// Withdrawal payouts currently handed to the escrow.
    payouts_in_flight: AtomicUsize,
}

/// Marks a withdrawal payout as in flight until dropped.
pub(crate) struct PayoutGuard<'a> {
    slot: &'a StreamSlot,
}

impl Drop for PayoutGuard<'_> {
    fn drop(&mut self) {
        self.slot.payouts_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StreamSlot {
    fn new(stream: Stream) -> Self {
        Self {
            writer: ReentrantMutex::new(()),
            record: Mutex::new(stream),
            payouts_in_flight: AtomicUsize::new(0),
        }
    }

    /// Call with the writer lock held, right before handing a withdrawal to
    /// the escrow.
    pub(crate) fn begin_payout(&self) -> PayoutGuard<'_> {
        self.payouts_in_flight.fetch_add(1, Ordering::SeqCst);
        PayoutGuard { slot: self }
    }

    pub(crate) fn payout_in_flight(&self) -> bool {
        self.payouts_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Takes the per-stream writer lock.
    ///
    /// Reentrant: a transfer that calls back into the ledger on the same
    /// thread gets through and sees the committed record.
    pub(crate) fn lock_writer(&self) -> ReentrantMutexGuard<'_, ()> {
        self.writer.lock()
    }

    fn snapshot(&self) -> Stream {
        self.record.lock().clone()
    }
}

#[derive(Debug, Default)]
struct SenderBook {
    next_id: u64,
    /// Slot for id `n` lives at index `n`.
    streams: Vec<Arc<StreamSlot>>,
}

/// Per-sender stream storage with monotonic ids.
#[derive(Debug, Default)]
pub struct StreamStore {
    books: DashMap<AccountId, SenderBook>,
}

impl StreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new stream for `sender` and returns its id.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidInput`] if the terms are invalid. Nothing is
    /// stored and the sender's next id is unchanged.
    pub fn create(&self, sender: AccountId, terms: StreamTerms) -> Result<StreamId, StreamError> {
        // Validate before touching the counter so a rejected stream burns no id.
        let stream = Stream::open(StreamId(0), sender, terms)?;
        Ok(self.insert(stream))
    }

    /// Stores an already validated stream under its sender's next id.
    ///
    /// The record becomes visible to readers only here.
    pub(crate) fn insert(&self, mut stream: Stream) -> StreamId {
        let mut book = self.books.entry(stream.sender).or_default();
        let id = StreamId(book.next_id);
        stream.id = id;
        book.streams.push(Arc::new(StreamSlot::new(stream)));
        book.next_id += 1;
        debug_assert_eq!(book.next_id as usize, book.streams.len());
        id
    }

    /// Returns a snapshot of the stream.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotFound`] if the sender has no stream with this id.
    pub fn get(&self, sender: AccountId, id: StreamId) -> Result<Stream, StreamError> {
        Ok(self.slot(sender, id)?.snapshot())
    }

    /// Applies `mutator` to the stream under its writer lock.
    ///
    /// The mutator works on a draft; the draft is committed only if the
    /// mutator returns `Ok` and the result is a legal successor, so a failed
    /// mutation leaves the record untouched. Cancelled records are terminal
    /// and never change. The mutator must not call back into the store.
    ///
    /// # Errors
    ///
    /// - [`StreamError::NotFound`] - Unknown stream.
    /// - Whatever the mutator returns.
    /// - [`StreamError::InvalidState`] - The stream is cancelled.
    /// - [`StreamError::InvalidInput`] - The draft changes a field fixed at
    ///   creation or breaks the payout bounds.
    pub fn update<F, R>(&self, sender: AccountId, id: StreamId, mutator: F) -> Result<R, StreamError>
    where
        F: FnOnce(&mut Stream) -> Result<R, StreamError>,
    {
        self.commit(sender, id, |draft| {
            let status = draft.status;
            let output = mutator(draft)?;
            if status == StreamStatus::Cancelled {
                return Err(StreamError::InvalidState { sender, id, status });
            }
            Ok(output)
        })
    }

    /// Like [`update`](Self::update) but may reopen a cancelled record.
    ///
    /// Only used to roll back a cancellation whose transfers failed, with the
    /// writer lock held since the cancellation was committed.
    pub(crate) fn revert<F>(&self, sender: AccountId, id: StreamId, mutator: F) -> Result<(), StreamError>
    where
        F: FnOnce(&mut Stream),
    {
        self.commit(sender, id, |draft| {
            mutator(draft);
            Ok(())
        })
    }

    fn commit<F, R>(&self, sender: AccountId, id: StreamId, mutator: F) -> Result<R, StreamError>
    where
        F: FnOnce(&mut Stream) -> Result<R, StreamError>,
    {
        let slot = self.slot(sender, id)?;
        let _writer = slot.lock_writer();
        let mut record = slot.record.lock();

        let mut draft = record.clone();
        let output = mutator(&mut draft)?;
        record.check_successor(&draft)?;
        draft.assert_invariants();
        *record = draft;
        Ok(output)
    }

    /// Id the sender's next stream will receive (equals their stream count).
    pub fn next_id(&self, sender: AccountId) -> StreamId {
        StreamId(self.books.get(&sender).map(|book| book.next_id).unwrap_or(0))
    }

    /// Snapshots of all of `sender`'s streams in id order.
    pub fn streams_of(&self, sender: AccountId) -> Vec<Stream> {
        let slots: Vec<Arc<StreamSlot>> = match self.books.get(&sender) {
            Some(book) => book.streams.clone(),
            None => return Vec::new(),
        };
        slots.iter().map(|slot| slot.snapshot()).collect()
    }

    /// All senders that own at least one stream, sorted.
    pub fn senders(&self) -> Vec<AccountId> {
        let mut senders: Vec<AccountId> = self
            .books
            .iter()
            .filter(|book| !book.streams.is_empty())
            .map(|book| *book.key())
            .collect();
        senders.sort();
        senders
    }

    /// Total number of streams across all senders.
    pub fn len(&self) -> usize {
        self.books.iter().map(|book| book.streams.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn slot(&self, sender: AccountId, id: StreamId) -> Result<Arc<StreamSlot>, StreamError> {
        let book = self
            .books
            .get(&sender)
            .ok_or(StreamError::NotFound { sender, id })?;
        let index = usize::try_from(id.0).map_err(|_| StreamError::NotFound { sender, id })?;
        book.streams
            .get(index)
            .cloned()
            .ok_or(StreamError::NotFound { sender, id })
    }
}
