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

//! Stream records.
//!
//! Streams follow a state machine:
//! - [`Active`] → [`Active`] (via partial or full withdrawal)
//! - [`Active`] → [`Cancelled`] (via cancel, terminal)
//!
//! [`Completed`] is never stored. It is reported by [`Stream::status_at`] once
//! the end time has passed and everything has been withdrawn.
//!
//! [`Active`]: StreamStatus::Active
//! [`Cancelled`]: StreamStatus::Cancelled
//! [`Completed`]: StreamStatus::Completed

use crate::StreamError;
use crate::base::{AccountId, StreamId, Timestamp};
use crate::vesting::{self, from_units, to_units};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Active,
    Cancelled,
    Completed,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Terms a sender opens a stream with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTerms {
    pub recipient: AccountId,
    pub deposit: Decimal,
    pub start_time: Timestamp,
    /// Length of the vesting period in seconds.
    pub duration: u64,
}

/// A linearly vesting escrow from `sender` to `recipient`.
///
/// Everything except `withdrawn`, `refunded` and `status` is fixed at
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: StreamId,
    pub sender: AccountId,
    pub recipient: AccountId,
    pub deposit: Decimal,
    pub rate_per_second: Decimal,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub withdrawn: Decimal,
    /// Unvested remainder returned to the sender on cancellation.
    pub refunded: Decimal,
    pub status: StreamStatus,
}

impl Stream {
    /// Validates `terms` and builds the initial record.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidInput`] if the deposit is zero, negative or has
    /// sub-unit precision, if the duration is zero or overflows the end time,
    /// or if the recipient is the sender.
    pub fn open(id: StreamId, sender: AccountId, terms: StreamTerms) -> Result<Self, StreamError> {
        let deposit_units = to_units(terms.deposit).ok_or(StreamError::InvalidInput {
            field: "deposit",
            reason: "must be a non-negative amount with at most 4 decimal places",
        })?;
        if deposit_units == 0 {
            return Err(StreamError::InvalidInput {
                field: "deposit",
                reason: "must be positive",
            });
        }
        if terms.duration == 0 {
            return Err(StreamError::InvalidInput {
                field: "duration",
                reason: "must be positive",
            });
        }
        if terms.recipient == sender {
            return Err(StreamError::InvalidInput {
                field: "recipient",
                reason: "must differ from sender",
            });
        }
        let end_time = terms
            .start_time
            .checked_add(terms.duration)
            .ok_or(StreamError::InvalidInput {
                field: "duration",
                reason: "end time overflows",
            })?;

        let stream = Self {
            id,
            sender,
            recipient: terms.recipient,
            deposit: from_units(deposit_units),
            rate_per_second: from_units(vesting::rate_per_second(deposit_units, terms.duration)),
            start_time: terms.start_time,
            end_time,
            withdrawn: Decimal::ZERO,
            refunded: Decimal::ZERO,
            status: StreamStatus::Active,
        };
        stream.assert_invariants();
        Ok(stream)
    }

    /// Vesting period in seconds.
    pub fn duration(&self) -> u64 {
        self.end_time.saturating_since(self.start_time)
    }

    /// Status as observed at `now`.
    pub fn status_at(&self, now: Timestamp) -> StreamStatus {
        match self.status {
            StreamStatus::Active if now >= self.end_time && self.withdrawn == self.deposit => {
                StreamStatus::Completed
            }
            status => status,
        }
    }

    /// Everything that has left escrow so far.
    pub fn disbursed(&self) -> Decimal {
        self.withdrawn + self.refunded
    }

    /// Checks that `next` is a legal successor of this record.
    ///
    /// # Errors
    ///
    /// [`StreamError::InvalidInput`] naming the first fixed field that
    /// changed, the payout amount that left `[0, deposit]`, or a status the
    /// record cannot be stored with.
    pub(crate) fn check_successor(&self, next: &Stream) -> Result<(), StreamError> {
        let changed = [
            ("id", self.id != next.id),
            ("sender", self.sender != next.sender),
            ("recipient", self.recipient != next.recipient),
            ("deposit", self.deposit != next.deposit),
            ("rate_per_second", self.rate_per_second != next.rate_per_second),
            ("start_time", self.start_time != next.start_time),
            ("end_time", self.end_time != next.end_time),
        ];
        if let Some((field, _)) = changed.into_iter().find(|(_, changed)| *changed) {
            return Err(StreamError::InvalidInput {
                field,
                reason: "fixed at creation",
            });
        }
        if next.withdrawn < Decimal::ZERO || next.withdrawn > next.deposit {
            return Err(StreamError::InvalidInput {
                field: "withdrawn",
                reason: "must stay within the deposit",
            });
        }
        if next.refunded < Decimal::ZERO || next.disbursed() > next.deposit {
            return Err(StreamError::InvalidInput {
                field: "refunded",
                reason: "must stay within the deposit",
            });
        }
        match next.status {
            StreamStatus::Completed => Err(StreamError::InvalidInput {
                field: "status",
                reason: "completed is derived and never stored",
            }),
            StreamStatus::Cancelled if next.disbursed() != next.deposit => {
                Err(StreamError::InvalidInput {
                    field: "status",
                    reason: "a cancelled stream must be fully settled",
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn assert_invariants(&self) {
        debug_assert!(
            self.deposit > Decimal::ZERO,
            "Invariant violated: deposit must be positive: {}",
            self.deposit
        );
        debug_assert!(
            self.withdrawn >= Decimal::ZERO && self.withdrawn <= self.deposit,
            "Invariant violated: withdrawn {} outside [0, {}]",
            self.withdrawn,
            self.deposit
        );
        debug_assert!(
            self.disbursed() <= self.deposit,
            "Invariant violated: disbursed {} exceeds deposit {}",
            self.disbursed(),
            self.deposit
        );
        debug_assert!(
            self.status != StreamStatus::Cancelled || self.disbursed() == self.deposit,
            "Invariant violated: cancelled stream left {} in escrow",
            self.deposit - self.disbursed()
        );
        debug_assert!(
            self.rate_per_second * Decimal::from(self.duration()) <= self.deposit,
            "Invariant violated: rate {} overstreams deposit {}",
            self.rate_per_second,
            self.deposit
        );
    }
}
