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

//! Linear vesting math.
//!
//! Amounts are [`Decimal`]s with a fixed unit precision of [`AMOUNT_SCALE`]
//! decimal places. All arithmetic here runs on exact integer units so that
//! the rate truncation is the only rounding that ever happens:
//!
//! ```text
//! rate     = floor(deposit / duration)
//! elapsed  = clamp(now, start, end) - start
//! streamed = deposit                 if now >= end
//!          = elapsed * rate          otherwise
//! ```
//!
//! The `now >= end` branch releases the truncation remainder
//! (`deposit - rate * duration`, always `< duration` units) at the end of the
//! stream instead of stranding it.

use crate::StreamError;
use crate::base::Timestamp;
use crate::stream::{Stream, StreamStatus};
use rust_decimal::Decimal;

/// Number of decimal places in one unit of value.
pub const AMOUNT_SCALE: u32 = 4;

/// Converts an amount to integer units.
///
/// Returns `None` for negative amounts, amounts with sub-unit precision, or
/// amounts too large to carry [`AMOUNT_SCALE`] decimal places.
pub fn to_units(amount: Decimal) -> Option<i128> {
    if amount < Decimal::ZERO {
        return None;
    }
    let mut value = amount.normalize();
    if value.scale() > AMOUNT_SCALE {
        return None;
    }
    value.rescale(AMOUNT_SCALE);
    if value.scale() != AMOUNT_SCALE {
        return None;
    }
    Some(value.mantissa())
}

/// Converts integer units back to an amount.
///
/// Callers only pass values bounded by a deposit that already round-tripped
/// through [`to_units`], so the result always fits.
pub fn from_units(units: i128) -> Decimal {
    Decimal::from_i128_with_scale(units, AMOUNT_SCALE)
}

/// Per-second rate for a deposit, truncated toward zero.
pub fn rate_per_second(deposit_units: i128, duration: u64) -> i128 {
    debug_assert!(duration > 0, "duration must be positive");
    deposit_units / i128::from(duration)
}

/// Units vested in total at `now`, ignoring cancellation.
fn vested_units(deposit: i128, rate: i128, start: Timestamp, end: Timestamp, now: Timestamp) -> i128 {
    if now >= end {
        return deposit;
    }
    let elapsed = now.max(start).saturating_since(start);
    // elapsed < duration here, so elapsed * rate < deposit
    i128::from(elapsed) * rate
}

/// Units held by an amount already stored on a record.
///
/// Records only ever carry amounts that passed [`to_units`] at creation, so a
/// failure here means the record itself is corrupt.
fn stored_units(amount: Decimal, field: &'static str) -> Result<i128, StreamError> {
    to_units(amount).ok_or(StreamError::InvalidInput {
        field,
        reason: "stored amount is not a whole number of units",
    })
}

/// Total amount streamed to the recipient at `now`.
///
/// Once a stream is cancelled the streamed amount is frozen at what the
/// recipient was paid.
pub fn streamed_amount(stream: &Stream, now: Timestamp) -> Result<Decimal, StreamError> {
    if stream.status == StreamStatus::Cancelled {
        return Ok(stream.withdrawn);
    }
    Ok(from_units(streamed_units(stream, now)?))
}

fn streamed_units(stream: &Stream, now: Timestamp) -> Result<i128, StreamError> {
    let deposit = stored_units(stream.deposit, "deposit")?;
    let rate = stored_units(stream.rate_per_second, "rate_per_second")?;
    Ok(vested_units(deposit, rate, stream.start_time, stream.end_time, now))
}

/// Vested amount not yet paid to the recipient. Zero for cancelled streams.
pub fn withdrawable_amount(stream: &Stream, now: Timestamp) -> Result<Decimal, StreamError> {
    if stream.status == StreamStatus::Cancelled {
        return Ok(Decimal::ZERO);
    }
    let withdrawn = stored_units(stream.withdrawn, "withdrawn")?;
    // Clamped at zero even though withdrawn <= streamed by construction.
    Ok(from_units((streamed_units(stream, now)? - withdrawn).max(0)))
}

/// Amount that would return to the sender on cancellation at `now`.
pub fn refundable_amount(stream: &Stream, now: Timestamp) -> Result<Decimal, StreamError> {
    if stream.status == StreamStatus::Cancelled {
        return Ok(Decimal::ZERO);
    }
    let deposit = stored_units(stream.deposit, "deposit")?;
    Ok(from_units(deposit - streamed_units(stream, now)?))
}
