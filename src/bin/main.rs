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

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use payment_stream_rs::{
    AccountId, Clock, InMemoryEscrow, ManualClock, Stream, StreamError, StreamId, StreamLedger,
    StreamStore, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

type ReplayLedger = StreamLedger<InMemoryEscrow, ManualClock>;

/// Payment Streams - Replay stream command CSV files
///
/// Replays create/withdraw/cancel commands against a fresh in-memory ledger
/// and outputs the final stream table to stdout. Log verbosity follows
/// RUST_LOG (default: warn) and goes to stderr.
#[derive(Parser, Debug)]
#[command(name = "payment-stream-rs")]
#[command(about = "Replays payment stream commands and prints the resulting streams", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: type,at,caller,sender,id,recipient,amount,value,duration
    /// Example: cargo run -- commands.csv > streams.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Clock reading (Unix seconds) before the first row
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Also print total payouts per account after the stream table
    #[arg(long)]
    payouts: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let ledger = match replay_commands(BufReader::new(file), Timestamp(args.start)) {
        Ok(ledger) => ledger,
        Err(e) => {
            eprintln!("Error processing commands: {}", e);
            process::exit(1);
        }
    };

    let mut stdout = std::io::stdout();
    if let Err(e) = write_streams(&ledger, &mut stdout) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
    if args.payouts {
        // Blank line between the two tables.
        let result = writeln!(stdout)
            .map_err(csv::Error::from)
            .and_then(|()| write_payouts(&ledger, &mut stdout));
        if let Err(e) = result {
            eprintln!("Error writing output: {}", e);
            process::exit(1);
        }
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, at, caller, sender, id, recipient, amount, value, duration`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    command: String,
    #[serde(deserialize_with = "csv::invalid_option")]
    at: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    caller: Option<u32>,
    sender: u32,
    #[serde(deserialize_with = "csv::invalid_option")]
    id: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    recipient: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(deserialize_with = "csv::invalid_option")]
    value: Option<Decimal>,
    #[serde(deserialize_with = "csv::invalid_option")]
    duration: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Create {
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
        value: Decimal,
        duration: u64,
    },
    Withdraw {
        caller: AccountId,
        sender: AccountId,
        id: StreamId,
    },
    Cancel {
        caller: AccountId,
        sender: AccountId,
        id: StreamId,
    },
}

impl CsvRecord {
    /// Converts CSV record to a ledger command.
    ///
    /// Returns `None` for unknown commands or missing required fields. A
    /// missing `value` defaults to `amount`; a missing cancel `caller`
    /// defaults to `sender`.
    fn into_command(self) -> Option<Command> {
        let sender = AccountId(self.sender);

        match self.command.to_lowercase().as_str() {
            "create" => {
                let amount = self.amount?;
                Some(Command::Create {
                    sender,
                    recipient: AccountId(self.recipient?),
                    amount,
                    value: self.value.unwrap_or(amount),
                    duration: self.duration?,
                })
            }
            "withdraw" => Some(Command::Withdraw {
                caller: AccountId(self.caller?),
                sender,
                id: StreamId(self.id?),
            }),
            "cancel" => Some(Command::Cancel {
                caller: AccountId(self.caller.unwrap_or(self.sender)),
                sender,
                id: StreamId(self.id?),
            }),
            _ => None,
        }
    }
}

fn apply(ledger: &ReplayLedger, command: Command) -> Result<(), StreamError> {
    match command {
        Command::Create {
            sender,
            recipient,
            amount,
            value,
            duration,
        } => ledger
            .create_stream(sender, recipient, amount, duration, value)
            .map(|_| ()),
        Command::Withdraw { caller, sender, id } => ledger.withdraw(caller, sender, id).map(|_| ()),
        Command::Cancel { caller, sender, id } => ledger.cancel_stream(caller, sender, id).map(|_| ()),
    }
}

/// Replay commands from a CSV reader.
///
/// Rows are applied in order. A row's `at` column moves the clock forward
/// before the command runs; rows that would move it backwards are skipped.
/// Malformed rows and failed commands are logged and skipped.
///
/// # CSV Format
///
/// ```csv
/// type,at,caller,sender,id,recipient,amount,value,duration
/// create,1000,,1,,2,100.0,100.0,100
/// withdraw,1030,2,1,0,,,,
/// cancel,1050,1,1,0,,,,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn replay_commands<R: Read>(reader: R, start: Timestamp) -> Result<ReplayLedger, csv::Error> {
    let ledger = StreamLedger::new(StreamStore::new(), InMemoryEscrow::new(), ManualClock::new(start));

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(line, error = %e, "skipping malformed row");
                continue;
            }
        };

        if let Some(at) = record.at.map(Timestamp) {
            if at < ledger.clock().now() {
                warn!(line, at = %at, now = %ledger.clock().now(), "skipping row: time moves backwards");
                continue;
            }
            ledger.clock().set(at);
        }

        let Some(command) = record.into_command() else {
            warn!(line, "skipping invalid command record");
            continue;
        };

        if let Err(e) = apply(&ledger, command) {
            debug!(line, ?command, error = %e, "skipping failed command");
        }
    }

    Ok(ledger)
}

/// Output row for one stream.
#[derive(Debug, Serialize)]
struct StreamRow {
    sender: AccountId,
    id: StreamId,
    recipient: AccountId,
    deposit: String,
    rate_per_second: String,
    start_time: Timestamp,
    end_time: Timestamp,
    withdrawn: String,
    refunded: String,
    status: String,
}

impl StreamRow {
    fn new(stream: &Stream, now: Timestamp) -> Self {
        Self {
            sender: stream.sender,
            id: stream.id,
            recipient: stream.recipient,
            deposit: format_amount(stream.deposit),
            rate_per_second: format_amount(stream.rate_per_second),
            start_time: stream.start_time,
            end_time: stream.end_time,
            withdrawn: format_amount(stream.withdrawn),
            refunded: format_amount(stream.refunded),
            status: stream.status_at(now).to_string(),
        }
    }
}

fn format_amount(amount: Decimal) -> String {
    format!("{:.4}", amount)
}

/// Write all streams to a CSV writer, ordered by sender then id.
///
/// # CSV Format
///
/// ```csv
/// sender,id,recipient,deposit,rate_per_second,start_time,end_time,withdrawn,refunded,status
/// 1,0,2,100.0000,1.0000,1000,1100,50.0000,50.0000,cancelled
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_streams<W: Write>(ledger: &ReplayLedger, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    let now = ledger.clock().now();

    for sender in ledger.store().senders() {
        for stream in ledger.streams_of(sender) {
            wtr.serialize(StreamRow::new(&stream, now))?;
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Write per-account payout totals to a CSV writer.
///
/// Columns: `account, paid`
pub fn write_payouts<W: Write>(ledger: &ReplayLedger, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["account", "paid"])?;
    for (account, paid) in ledger.escrow().payouts() {
        wtr.write_record([account.to_string(), format_amount(paid)])?;
    }
    wtr.flush()?;
    Ok(())
}
