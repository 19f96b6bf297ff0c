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

//! Stream notifications for external indexers.
//!
//! Subscribers get an unbounded [`crossbeam::channel`] receiver and see every
//! event published after they subscribed. Dropped receivers are pruned on the
//! next publish.

use crate::base::{AccountId, StreamId, Timestamp};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Created {
        id: StreamId,
        sender: AccountId,
        recipient: AccountId,
        deposit: Decimal,
        start_time: Timestamp,
        end_time: Timestamp,
    },
    Withdrawn {
        id: StreamId,
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
    },
    Cancelled {
        id: StreamId,
        sender: AccountId,
        recipient: AccountId,
        recipient_amount: Decimal,
        sender_amount: Decimal,
    },
}

impl StreamEvent {
    /// Sender and id of the stream the event is about.
    pub fn stream(&self) -> (AccountId, StreamId) {
        match self {
            Self::Created { sender, id, .. }
            | Self::Withdrawn { sender, id, .. }
            | Self::Cancelled { sender, id, .. } => (*sender, *id),
        }
    }
}

/// Fan-out of [`StreamEvent`]s to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<StreamEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<StreamEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: StreamEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        let (sender, id) = event.stream();
        trace!(%sender, %id, subscribers = subscribers.len(), "event published");
    }
}
