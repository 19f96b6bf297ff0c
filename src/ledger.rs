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

//! Stream settlement engine.
//!
//! The [`StreamLedger`] is the central component. It opens streams, pays out
//! vested funds to recipients and settles cancellations, on top of a
//! [`StreamStore`], an [`Escrow`] and a [`Clock`] supplied by the caller.
//!
//! # Settlement
//!
//! - **Create**: Checks the escrowed value against the declared deposit and
//!   stores the stream starting now.
//! - **Withdraw**: Pays the recipient everything vested and not yet withdrawn.
//! - **Cancel**: Pays the recipient what has vested, refunds the rest to the
//!   sender, and closes the stream for good.
//!
//! # Ordering
//!
//! Withdraw and cancel hold the stream's writer lock for the whole operation
//! and commit the accounting change before any funds move. A transfer that
//! calls back into the ledger sees the committed record. If the escrow fails,
//! the change is compensated before the writer lock is released, so no other
//! caller ever observes it. A cancel nested inside a withdrawal transfer is
//! refused, since a failed payout could no longer be compensated once the
//! stream is closed.

use crate::base::{AccountId, StreamId};
use crate::clock::Clock;
use crate::escrow::Escrow;
use crate::event::{EventBus, StreamEvent};
use crate::store::StreamStore;
use crate::stream::{Stream, StreamStatus, StreamTerms};
use crate::{StreamError, vesting};
use crossbeam::channel::Receiver;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Amounts paid out when a stream was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancellation {
    /// Vested but unclaimed funds paid to the recipient.
    pub recipient_amount: Decimal,
    /// Unvested remainder refunded to the sender.
    pub sender_amount: Decimal,
}

/// Payment streaming ledger.
///
/// # Invariants
///
/// - `0 <= withdrawn <= deposit` for every stream.
/// - `withdrawn + refunded <= deposit`, with equality once cancelled.
/// - A cancelled stream accepts no further withdrawal or cancellation.
pub struct StreamLedger<E, C> {
    store: StreamStore,
    escrow: E,
    clock: C,
    events: EventBus,
}

impl<E: Escrow, C: Clock> StreamLedger<E, C> {
    pub fn new(store: StreamStore, escrow: E, clock: C) -> Self {
        StreamLedger {
            store,
            escrow,
            clock,
            events: EventBus::new(),
        }
    }

    pub fn store(&self) -> &StreamStore {
        &self.store
    }

    pub fn escrow(&self) -> &E {
        &self.escrow
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Opens a stream from `sender` to `recipient` vesting `amount` over
    /// `duration` seconds, starting now.
    ///
    /// # Errors
    ///
    /// - [`StreamError::AmountMismatch`] - `value_transferred` differs from `amount`.
    /// - [`StreamError::InvalidInput`] - Zero amount or duration, sub-unit precision,
    ///   or `recipient == sender`.
    ///
    /// No record is created and the sender's next id is unchanged on error.
    pub fn create_stream(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
        duration: u64,
        value_transferred: Decimal,
    ) -> Result<StreamId, StreamError> {
        if amount != value_transferred {
            debug!(%sender, %amount, %value_transferred, "rejected stream: escrow mismatch");
            return Err(StreamError::AmountMismatch {
                declared: amount,
                transferred: value_transferred,
            });
        }

        let terms = StreamTerms {
            recipient,
            deposit: amount,
            start_time: self.clock.now(),
            duration,
        };
        let stream = Stream::open(StreamId(0), sender, terms)
            .inspect_err(|error| debug!(%sender, %recipient, %error, "rejected stream"))?;

        let Stream {
            deposit,
            start_time,
            end_time,
            ..
        } = stream;
        // The deposit must be held before the stream can be settled.
        self.escrow.receive(sender, deposit);
        let id = self.store.insert(stream);

        info!(
            %sender,
            %id,
            %recipient,
            %deposit,
            %start_time,
            %end_time,
            "stream created"
        );
        self.events.publish(StreamEvent::Created {
            id,
            sender,
            recipient,
            deposit,
            start_time,
            end_time,
        });
        Ok(id)
    }

    /// Pays the recipient everything vested and not yet withdrawn.
    ///
    /// Returns the amount paid.
    ///
    /// # Errors
    ///
    /// - [`StreamError::NotFound`] - Unknown stream.
    /// - [`StreamError::Unauthorized`] - `caller` is not the stream's recipient.
    /// - [`StreamError::InvalidState`] - Stream is cancelled.
    /// - [`StreamError::NothingToWithdraw`] - Nothing has vested since the last withdrawal.
    /// - [`StreamError::TransferFailed`] - Escrow refused; `withdrawn` is unchanged.
    pub fn withdraw(
        &self,
        caller: AccountId,
        sender: AccountId,
        id: StreamId,
    ) -> Result<Decimal, StreamError> {
        let slot = self.store.slot(sender, id)?;
        let _writer = slot.lock_writer();
        let now = self.clock.now();

        let (recipient, amount) = self
            .store
            .update(sender, id, |stream| {
                if caller != stream.recipient {
                    return Err(StreamError::Unauthorized { caller, sender, id });
                }
                ensure_not_cancelled(stream)?;
                let amount = vesting::withdrawable_amount(stream, now)?;
                if amount.is_zero() {
                    return Err(StreamError::NothingToWithdraw { sender, id });
                }
                stream.withdrawn += amount;
                Ok((stream.recipient, amount))
            })
            .inspect_err(|error| debug!(%caller, %sender, %id, %error, "withdraw rejected"))?;

        let payout = slot.begin_payout();
        let transferred = self.escrow.transfer(recipient, amount);
        drop(payout);

        if let Err(reason) = transferred {
            warn!(%sender, %id, %recipient, %amount, %reason, "withdrawal transfer failed, rolling back");
            self.store.update(sender, id, |stream| {
                stream.withdrawn -= amount;
                Ok(())
            })?;
            return Err(StreamError::TransferFailed {
                to: recipient,
                amount,
                reason,
            });
        }

        info!(%sender, %id, %recipient, %amount, "withdrawn");
        self.events.publish(StreamEvent::Withdrawn {
            id,
            sender,
            recipient,
            amount,
        });
        Ok(amount)
    }

    /// Cancels the stream: the recipient gets what has vested, the sender gets
    /// the rest back.
    ///
    /// # Errors
    ///
    /// - [`StreamError::NotFound`] - Unknown stream.
    /// - [`StreamError::Unauthorized`] - `caller` is not the stream's sender.
    /// - [`StreamError::InvalidState`] - Stream is already cancelled.
    /// - [`StreamError::SettlementInProgress`] - Called back from inside a
    ///   withdrawal transfer on the same stream.
    /// - [`StreamError::TransferFailed`] - Escrow refused a payout. If the
    ///   recipient payout failed nothing changed. If only the refund failed,
    ///   the recipient payout stands as a withdrawal and the stream stays active.
    pub fn cancel_stream(
        &self,
        caller: AccountId,
        sender: AccountId,
        id: StreamId,
    ) -> Result<Cancellation, StreamError> {
        let slot = self.store.slot(sender, id)?;
        let _writer = slot.lock_writer();
        let now = self.clock.now();
        // Only true when called back from a withdrawal transfer on this stream.
        let payout_in_flight = slot.payout_in_flight();

        let (recipient, settlement) = self
            .store
            .update(sender, id, |stream| {
                if caller != stream.sender {
                    return Err(StreamError::Unauthorized { caller, sender, id });
                }
                ensure_not_cancelled(stream)?;
                if payout_in_flight {
                    return Err(StreamError::SettlementInProgress { sender, id });
                }

                let withdrawn_before = stream.withdrawn;
                let recipient_amount = vesting::withdrawable_amount(stream, now)?;
                let sender_amount = stream.deposit - withdrawn_before - recipient_amount;
                debug_assert_eq!(
                    recipient_amount + sender_amount + withdrawn_before,
                    stream.deposit,
                    "Invariant violated: cancellation does not conserve funds"
                );

                stream.withdrawn += recipient_amount;
                stream.refunded = sender_amount;
                stream.status = StreamStatus::Cancelled;
                Ok((
                    stream.recipient,
                    Cancellation {
                        recipient_amount,
                        sender_amount,
                    },
                ))
            })
            .inspect_err(|error| debug!(%caller, %sender, %id, %error, "cancel rejected"))?;

        let Cancellation {
            recipient_amount,
            sender_amount,
        } = settlement;

        if recipient_amount > Decimal::ZERO {
            if let Err(reason) = self.escrow.transfer(recipient, recipient_amount) {
                warn!(%sender, %id, %recipient, amount = %recipient_amount, %reason, "cancel payout failed, rolling back");
                self.store.revert(sender, id, |stream| {
                    stream.withdrawn -= recipient_amount;
                    stream.refunded = Decimal::ZERO;
                    stream.status = StreamStatus::Active;
                })?;
                return Err(StreamError::TransferFailed {
                    to: recipient,
                    amount: recipient_amount,
                    reason,
                });
            }
        }

        if sender_amount > Decimal::ZERO {
            if let Err(reason) = self.escrow.transfer(sender, sender_amount) {
                warn!(%sender, %id, amount = %sender_amount, %reason, "cancel refund failed, keeping recipient payout as withdrawal");
                self.store.revert(sender, id, |stream| {
                    stream.refunded = Decimal::ZERO;
                    stream.status = StreamStatus::Active;
                })?;
                if recipient_amount > Decimal::ZERO {
                    self.events.publish(StreamEvent::Withdrawn {
                        id,
                        sender,
                        recipient,
                        amount: recipient_amount,
                    });
                }
                return Err(StreamError::TransferFailed {
                    to: sender,
                    amount: sender_amount,
                    reason,
                });
            }
        }

        info!(
            %sender,
            %id,
            %recipient,
            recipient_amount = %recipient_amount,
            sender_amount = %sender_amount,
            "stream cancelled"
        );
        self.events.publish(StreamEvent::Cancelled {
            id,
            sender,
            recipient,
            recipient_amount,
            sender_amount,
        });
        Ok(settlement)
    }

    /// Amount the recipient could withdraw right now. Zero once cancelled.
    pub fn calculate_balance(&self, owner: AccountId, id: StreamId) -> Result<Decimal, StreamError> {
        let stream = self.store.get(owner, id)?;
        vesting::withdrawable_amount(&stream, self.clock.now())
    }

    /// Total vested to the recipient so far, withdrawn or not.
    pub fn streamed_amount(&self, owner: AccountId, id: StreamId) -> Result<Decimal, StreamError> {
        let stream = self.store.get(owner, id)?;
        vesting::streamed_amount(&stream, self.clock.now())
    }

    /// What a cancellation right now would refund to the sender.
    pub fn refundable_amount(&self, owner: AccountId, id: StreamId) -> Result<Decimal, StreamError> {
        let stream = self.store.get(owner, id)?;
        vesting::refundable_amount(&stream, self.clock.now())
    }

    pub fn status_of(&self, owner: AccountId, id: StreamId) -> Result<StreamStatus, StreamError> {
        let stream = self.store.get(owner, id)?;
        Ok(stream.status_at(self.clock.now()))
    }

    pub fn get_stream(&self, owner: AccountId, id: StreamId) -> Result<Stream, StreamError> {
        self.store.get(owner, id)
    }

    /// All of `owner`'s streams in id order.
    pub fn streams_of(&self, owner: AccountId) -> Vec<Stream> {
        self.store.streams_of(owner)
    }

    /// Number of streams `owner` has ever opened.
    pub fn stream_count(&self, owner: AccountId) -> u64 {
        self.store.next_id(owner).0
    }
}

impl<E: Escrow + Default, C: Clock + Default> Default for StreamLedger<E, C> {
    fn default() -> Self {
        Self::new(StreamStore::new(), E::default(), C::default())
    }
}

fn ensure_not_cancelled(stream: &Stream) -> Result<(), StreamError> {
    if stream.status == StreamStatus::Cancelled {
        return Err(StreamError::InvalidState {
            sender: stream.sender,
            id: stream.id,
            status: stream.status,
        });
    }
    Ok(())
}
