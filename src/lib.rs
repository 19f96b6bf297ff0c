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

//! # Payment Streams
//!
//! This library provides a payment streaming engine: a sender escrows a
//! deposit that vests linearly to a recipient over a fixed duration. The
//! recipient may withdraw whatever has vested at any time, and the sender may
//! cancel early to reclaim the unvested remainder.
//!
//! ## Core Components
//!
//! - [`StreamLedger`]: Vesting math, withdrawal and cancellation settlement
//! - [`StreamStore`]: Per-sender stream records with sequential ids
//! - [`Escrow`]: Collaborator that actually moves funds
//! - [`Clock`]: Collaborator that supplies the current time
//! - [`StreamError`]: Error types for stream processing failures
//!
//! ## Example
//!
//! ```
//! use payment_stream_rs::{
//!     AccountId, InMemoryEscrow, ManualClock, StreamLedger, StreamStore, Timestamp,
//! };
//! use rust_decimal_macros::dec;
//!
//! let ledger = StreamLedger::new(
//!     StreamStore::new(),
//!     InMemoryEscrow::new(),
//!     ManualClock::new(Timestamp(1_000)),
//! );
//! let (alice, bob) = (AccountId(1), AccountId(2));
//!
//! // 100 over 100 seconds vests 1 per second
//! let id = ledger.create_stream(alice, bob, dec!(100), 100, dec!(100)).unwrap();
//!
//! ledger.clock().advance(30);
//! assert_eq!(ledger.calculate_balance(alice, id).unwrap(), dec!(30));
//! assert_eq!(ledger.withdraw(bob, alice, id).unwrap(), dec!(30));
//!
//! ledger.clock().advance(20);
//! let settlement = ledger.cancel_stream(alice, alice, id).unwrap();
//! assert_eq!(settlement.recipient_amount, dec!(20));
//! assert_eq!(settlement.sender_amount, dec!(50));
//! ```
//!
//! ## Thread Safety
//!
//! Mutations of a single stream are serialized by a per-stream lock, while
//! streams are otherwise independent and can be processed in parallel.

mod base;
mod clock;
mod escrow;
pub mod error;
mod event;
mod ledger;
mod store;
mod stream;
pub mod vesting;

pub use base::{AccountId, StreamId, Timestamp};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StreamError, TransferError};
pub use escrow::{Escrow, InMemoryEscrow};
pub use event::{EventBus, StreamEvent};
pub use ledger::{Cancellation, StreamLedger};
pub use store::StreamStore;
pub use stream::{Stream, StreamStatus, StreamTerms};
