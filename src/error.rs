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

//! Error types for stream processing.

use crate::base::{AccountId, StreamId};
use crate::stream::StreamStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Stream processing errors.
///
/// Every variant carries enough context (stream key, offending field) for the
/// caller to act on it. None of them leave a partially applied mutation behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Zero amount or duration, bad precision, or sender == recipient
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        field: &'static str,
        reason: &'static str,
    },

    /// Escrowed value differs from the declared deposit
    #[error("deposit {declared} does not match transferred value {transferred}")]
    AmountMismatch {
        declared: Decimal,
        transferred: Decimal,
    },

    /// No stream with this id exists for the sender
    #[error("stream {sender}/{id} not found")]
    NotFound { sender: AccountId, id: StreamId },

    /// Caller is not the party allowed to perform the operation
    #[error("account {caller} is not authorized on stream {sender}/{id}")]
    Unauthorized {
        caller: AccountId,
        sender: AccountId,
        id: StreamId,
    },

    /// Operation attempted on a stream in a terminal state
    #[error("stream {sender}/{id} is {status}")]
    InvalidState {
        sender: AccountId,
        id: StreamId,
        status: StreamStatus,
    },

    /// Nothing has vested since the last withdrawal
    #[error("nothing to withdraw from stream {sender}/{id}")]
    NothingToWithdraw { sender: AccountId, id: StreamId },

    /// Cancel attempted from inside a withdrawal payout on the same stream
    #[error("stream {sender}/{id} has a payout in flight")]
    SettlementInProgress { sender: AccountId, id: StreamId },

    /// The escrow could not deliver funds; the accounting change was rolled back
    #[error("transfer of {amount} to {to} failed: {reason}")]
    TransferFailed {
        to: AccountId,
        amount: Decimal,
        reason: TransferError,
    },
}

/// Failures reported by an [`Escrow`](crate::Escrow) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Escrow does not hold enough funds to cover the payout
    #[error("escrow balance too low")]
    InsufficientEscrow,

    /// Destination refused the funds
    #[error("recipient {0} rejected the transfer")]
    Rejected(AccountId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            StreamError::InvalidInput {
                field: "duration",
                reason: "must be positive"
            }
            .to_string(),
            "invalid duration: must be positive"
        );
        assert_eq!(
            StreamError::AmountMismatch {
                declared: dec!(100),
                transferred: dec!(50)
            }
            .to_string(),
            "deposit 100 does not match transferred value 50"
        );
        assert_eq!(
            StreamError::NotFound {
                sender: AccountId(1),
                id: StreamId(4)
            }
            .to_string(),
            "stream 1/4 not found"
        );
        assert_eq!(
            StreamError::Unauthorized {
                caller: AccountId(9),
                sender: AccountId(1),
                id: StreamId(0)
            }
            .to_string(),
            "account 9 is not authorized on stream 1/0"
        );
        assert_eq!(
            StreamError::InvalidState {
                sender: AccountId(1),
                id: StreamId(0),
                status: StreamStatus::Cancelled
            }
            .to_string(),
            "stream 1/0 is cancelled"
        );
        assert_eq!(
            StreamError::NothingToWithdraw {
                sender: AccountId(1),
                id: StreamId(2)
            }
            .to_string(),
            "nothing to withdraw from stream 1/2"
        );
        assert_eq!(
            StreamError::SettlementInProgress {
                sender: AccountId(1),
                id: StreamId(2)
            }
            .to_string(),
            "stream 1/2 has a payout in flight"
        );
        assert_eq!(
            StreamError::TransferFailed {
                to: AccountId(2),
                amount: dec!(30),
                reason: TransferError::Rejected(AccountId(2))
            }
            .to_string(),
            "transfer of 30 to 2 failed: recipient 2 rejected the transfer"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = StreamError::NothingToWithdraw {
            sender: AccountId(1),
            id: StreamId(0),
        };
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
