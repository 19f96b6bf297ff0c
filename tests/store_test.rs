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

//! Store public API integration tests.

use payment_stream_rs::{
    AccountId, StreamError, StreamId, StreamStatus, StreamStore, StreamTerms, Timestamp,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

// === Helper Functions ===

fn make_terms(recipient: u32, deposit: Decimal, duration: u64) -> StreamTerms {
    StreamTerms {
        recipient: AccountId(recipient),
        deposit,
        start_time: Timestamp(1_000),
        duration,
    }
}

// === Basic Store Tests ===

#[test]
fn new_store_is_empty() {
    let store = StreamStore::new();
    assert!(store.is_empty());
    assert_eq!(store.len(), 0);
    assert_eq!(store.next_id(AccountId(1)), StreamId(0));
    assert!(store.streams_of(AccountId(1)).is_empty());
    assert!(store.senders().is_empty());
}

#[test]
fn create_then_get_returns_record() {
    let store = StreamStore::new();
    let id = store.create(AccountId(1), make_terms(2, dec!(60), 60)).unwrap();

    let stream = store.get(AccountId(1), id).unwrap();
    assert_eq!(stream.id, id);
    assert_eq!(stream.sender, AccountId(1));
    assert_eq!(stream.recipient, AccountId(2));
    assert_eq!(stream.deposit, dec!(60));
    assert_eq!(stream.rate_per_second, dec!(1));
    assert_eq!(stream.end_time, Timestamp(1_060));
    assert_eq!(stream.status, StreamStatus::Active);
}

#[test]
fn ids_are_scoped_per_sender() {
    let store = StreamStore::new();
    store.create(AccountId(1), make_terms(2, dec!(10), 10)).unwrap();
    store.create(AccountId(1), make_terms(3, dec!(10), 10)).unwrap();
    store.create(AccountId(4), make_terms(1, dec!(10), 10)).unwrap();

    assert_eq!(store.next_id(AccountId(1)), StreamId(2));
    assert_eq!(store.next_id(AccountId(4)), StreamId(1));
    assert_eq!(store.senders(), vec![AccountId(1), AccountId(4)]);
    assert_eq!(store.len(), 3);
}

#[test]
fn streams_of_lists_in_id_order() {
    let store = StreamStore::new();
    for recipient in 2..6 {
        store
            .create(AccountId(1), make_terms(recipient, dec!(10), 10))
            .unwrap();
    }

    let streams = store.streams_of(AccountId(1));
    let ids: Vec<StreamId> = streams.iter().map(|s| s.id).collect();
    let recipients: Vec<AccountId> = streams.iter().map(|s| s.recipient).collect();
    assert_eq!(ids, vec![StreamId(0), StreamId(1), StreamId(2), StreamId(3)]);
    assert_eq!(
        recipients,
        vec![AccountId(2), AccountId(3), AccountId(4), AccountId(5)]
    );
}

#[test]
fn invalid_create_does_not_advance_counter() {
    let store = StreamStore::new();
    store.create(AccountId(1), make_terms(2, dec!(10), 10)).unwrap();

    assert!(store.create(AccountId(1), make_terms(2, dec!(0), 10)).is_err());
    assert!(store.create(AccountId(1), make_terms(2, dec!(10), 0)).is_err());
    assert!(store.create(AccountId(1), make_terms(1, dec!(10), 10)).is_err());

    assert_eq!(store.next_id(AccountId(1)), StreamId(1));
    assert_eq!(
        store.create(AccountId(1), make_terms(2, dec!(10), 10)).unwrap(),
        StreamId(1)
    );
}

#[test]
fn update_commits_mutation() {
    let store = StreamStore::new();
    let id = store.create(AccountId(1), make_terms(2, dec!(10), 10)).unwrap();

    let withdrawn = store
        .update(AccountId(1), id, |stream| {
            stream.withdrawn += dec!(4);
            Ok(stream.withdrawn)
        })
        .unwrap();
    assert_eq!(withdrawn, dec!(4));
    assert_eq!(store.get(AccountId(1), id).unwrap().withdrawn, dec!(4));
}

#[test]
fn update_unknown_stream_fails() {
    let store = StreamStore::new();
    let result = store.update(AccountId(1), StreamId(0), |_| Ok(()));
    assert_eq!(
        result,
        Err(StreamError::NotFound {
            sender: AccountId(1),
            id: StreamId(0)
        })
    );
}

#[test]
fn update_error_leaves_record_untouched() {
    let store = StreamStore::new();
    let id = store.create(AccountId(1), make_terms(2, dec!(10), 10)).unwrap();

    let result: Result<(), StreamError> = store.update(AccountId(1), id, |stream| {
        stream.withdrawn = dec!(10);
        stream.status = StreamStatus::Cancelled;
        Err(StreamError::InvalidInput {
            field: "withdrawn",
            reason: "test",
        })
    });
    assert!(result.is_err());

    let stream = store.get(AccountId(1), id).unwrap();
    assert_eq!(stream.withdrawn, Decimal::ZERO);
    assert_eq!(stream.status, StreamStatus::Active);
}

fn cancel(store: &StreamStore, sender: AccountId, id: StreamId, withdrawn: Decimal) {
    store
        .update(sender, id, |stream| {
            stream.withdrawn = withdrawn;
            stream.refunded = stream.deposit - withdrawn;
            stream.status = StreamStatus::Cancelled;
            Ok(())
        })
        .unwrap();
}

#[test]
fn cancelled_record_cannot_be_reopened() {
    let store = StreamStore::new();
    let id = store.create(AccountId(1), make_terms(2, dec!(100), 100)).unwrap();
    cancel(&store, AccountId(1), id, dec!(50));

    let result = store.update(AccountId(1), id, |stream| {
        stream.status = StreamStatus::Active;
        stream.withdrawn = dec!(10);
        Ok(())
    });
    assert_eq!(
        result,
        Err(StreamError::InvalidState {
            sender: AccountId(1),
            id,
            status: StreamStatus::Cancelled,
        })
    );

    let stream = store.get(AccountId(1), id).unwrap();
    assert_eq!(stream.status, StreamStatus::Cancelled);
    assert_eq!(stream.withdrawn, dec!(50));
    assert_eq!(stream.refunded, dec!(50));
}

#[test]
fn cancelled_record_still_reports_mutator_errors() {
    let store = StreamStore::new();
    let id = store.create(AccountId(1), make_terms(2, dec!(100), 100)).unwrap();
    cancel(&store, AccountId(1), id, dec!(0));

    let result: Result<(), StreamError> = store.update(AccountId(1), id, |_| {
        Err(StreamError::Unauthorized {
            caller: AccountId(3),
            sender: AccountId(1),
            id,
        })
    });
    assert!(matches!(result, Err(StreamError::Unauthorized { .. })));
}

#[test]
fn update_cannot_change_fixed_fields() {
    let store = StreamStore::new();
    let id = store.create(AccountId(1), make_terms(2, dec!(100), 100)).unwrap();

    let result = store.update(AccountId(1), id, |stream| {
        stream.deposit = dec!(1000);
        Ok(())
    });
    assert_eq!(
        result,
        Err(StreamError::InvalidInput {
            field: "deposit",
            reason: "fixed at creation",
        })
    );

    let result = store.update(AccountId(1), id, |stream| {
        stream.rate_per_second = dec!(10);
        Ok(())
    });
    assert!(matches!(
        result,
        Err(StreamError::InvalidInput { field: "rate_per_second", .. })
    ));

    let stream = store.get(AccountId(1), id).unwrap();
    assert_eq!(stream.deposit, dec!(100));
    assert_eq!(stream.rate_per_second, dec!(1));
}

#[test]
fn update_rejects_out_of_bounds_amounts() {
    let store = StreamStore::new();
    let id = store.create(AccountId(1), make_terms(2, dec!(100), 100)).unwrap();

    let overdrawn = store.update(AccountId(1), id, |stream| {
        stream.withdrawn = dec!(101);
        Ok(())
    });
    assert!(matches!(
        overdrawn,
        Err(StreamError::InvalidInput { field: "withdrawn", .. })
    ));

    let unsettled = store.update(AccountId(1), id, |stream| {
        stream.status = StreamStatus::Cancelled;
        Ok(())
    });
    assert!(matches!(
        unsettled,
        Err(StreamError::InvalidInput { field: "status", .. })
    ));

    let completed = store.update(AccountId(1), id, |stream| {
        stream.status = StreamStatus::Completed;
        Ok(())
    });
    assert!(matches!(
        completed,
        Err(StreamError::InvalidInput { field: "status", .. })
    ));

    assert_eq!(store.get(AccountId(1), id).unwrap().status, StreamStatus::Active);
}

// === Concurrent Store Tests ===

#[test]
fn concurrent_creates_get_unique_gap_free_ids() {
    let store = Arc::new(StreamStore::new());
    let mut handles = vec![];

    for t in 0..8u32 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            (0..50)
                .map(|_| {
                    store
                        .create(AccountId(1), make_terms(100 + t, dec!(10), 10))
                        .unwrap()
                })
                .collect::<Vec<_>>()
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "duplicate id {id}");
        }
    }

    assert_eq!(ids.len(), 400);
    assert!(ids.iter().all(|id| id.0 < 400));
    assert_eq!(store.next_id(AccountId(1)), StreamId(400));
    for (index, stream) in store.streams_of(AccountId(1)).iter().enumerate() {
        assert_eq!(stream.id, StreamId(index as u64));
    }
}

#[test]
fn concurrent_updates_on_one_stream_are_serialized() {
    let store = Arc::new(StreamStore::new());
    let id = store
        .create(AccountId(1), make_terms(2, dec!(1000), 1000))
        .unwrap();
    let mut handles = vec![];

    for _ in 0..10 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                store
                    .update(AccountId(1), id, |stream| {
                        stream.withdrawn += dec!(1);
                        Ok(())
                    })
                    .unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.get(AccountId(1), id).unwrap().withdrawn, dec!(1000));
}
