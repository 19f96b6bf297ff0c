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

//! Escrow collaborators.
//!
//! The ledger never moves value itself. It asks an [`Escrow`] to pay out of
//! the pooled deposits and only keeps its accounting change if the escrow
//! reports success.

use crate::base::AccountId;
use crate::error::TransferError;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Holder of escrowed funds.
///
/// `transfer` may call back into the ledger; the ledger commits its
/// accounting before calling it.
pub trait Escrow: Send + Sync {
    /// Pays `amount` out of escrow to `to`.
    fn transfer(&self, to: AccountId, amount: Decimal) -> Result<(), TransferError>;

    /// Credits a deposit of `amount` from `from`, before the stream it backs
    /// becomes visible.
    fn receive(&self, _from: AccountId, _amount: Decimal) {}
}

impl<T: Escrow + ?Sized> Escrow for Arc<T> {
    fn transfer(&self, to: AccountId, amount: Decimal) -> Result<(), TransferError> {
        (**self).transfer(to, amount)
    }

    fn receive(&self, from: AccountId, amount: Decimal) {
        (**self).receive(from, amount)
    }
}

/// In-process escrow pool with per-account payout totals.
#[derive(Debug, Default)]
pub struct InMemoryEscrow {
    held: Mutex<Decimal>,
    payouts: DashMap<AccountId, Decimal>,
    /// Accounts whose transfers are refused.
    rejected: DashSet<AccountId>,
}

impl InMemoryEscrow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Funds currently held in escrow.
    pub fn held(&self) -> Decimal {
        *self.held.lock()
    }

    /// Total paid out to `account` so far.
    pub fn paid_to(&self, account: AccountId) -> Decimal {
        self.payouts
            .get(&account)
            .map(|paid| *paid)
            .unwrap_or(Decimal::ZERO)
    }

    /// Snapshot of all payouts, sorted by account.
    pub fn payouts(&self) -> Vec<(AccountId, Decimal)> {
        let mut payouts: Vec<_> = self
            .payouts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        payouts.sort_by_key(|(account, _)| *account);
        payouts
    }

    /// Refuses every later transfer to `account`.
    pub fn reject(&self, account: AccountId) {
        self.rejected.insert(account);
    }

    /// Lifts a previous [`reject`](Self::reject).
    pub fn accept(&self, account: AccountId) {
        self.rejected.remove(&account);
    }
}

impl Escrow for InMemoryEscrow {
    fn transfer(&self, to: AccountId, amount: Decimal) -> Result<(), TransferError> {
        if self.rejected.contains(&to) {
            return Err(TransferError::Rejected(to));
        }
        {
            let mut held = self.held.lock();
            if *held < amount {
                return Err(TransferError::InsufficientEscrow);
            }
            *held -= amount;
        }
        *self.payouts.entry(to).or_insert(Decimal::ZERO) += amount;
        Ok(())
    }

    fn receive(&self, _from: AccountId, amount: Decimal) {
        *self.held.lock() += amount;
    }
}
