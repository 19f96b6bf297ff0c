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

//! Core identifier types for accounts, streams and time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a sender or recipient account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AccountId(pub u32);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a stream within its sender's namespace.
///
/// Assigned sequentially from 0 per sender; `(sender, id)` is the stream's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whole seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Returns `self + seconds`, or `None` on overflow.
    pub fn checked_add(self, seconds: u64) -> Option<Timestamp> {
        self.0.checked_add(seconds).map(Timestamp)
    }

    /// Seconds from `earlier` to `self`, saturating at zero.
    pub fn saturating_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_checked_add_overflows_to_none() {
        assert_eq!(Timestamp(10).checked_add(5), Some(Timestamp(15)));
        assert_eq!(Timestamp(u64::MAX).checked_add(1), None);
    }

    #[test]
    fn timestamp_saturating_since() {
        assert_eq!(Timestamp(50).saturating_since(Timestamp(20)), 30);
        assert_eq!(Timestamp(20).saturating_since(Timestamp(50)), 0);
    }

    #[test]
    fn ids_serialize_transparently() {
        assert_eq!(serde_json::to_string(&AccountId(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&StreamId(3)).unwrap(), "3");
        assert_eq!(serde_json::to_string(&Timestamp(1_700_000_000)).unwrap(), "1700000000");
    }
}
