//! Card Ledger - Append-Only Continuation Allocator
//!
//! The ledger is a comma-delimited file with the header
//! `Name, Card Number, QR Code URL`. Each run reads it in full, mints the next
//! contiguous block of card numbers and appends one row per card.
//!
//! The file stays open and exclusively locked for the lifetime of a [`Ledger`],
//! so a second run against the same file fails fast instead of racing.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const LEDGER_HEADER: [&str; 3] = ["Name", "Card Number", "QR Code URL"];

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error on {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),

    #[error("Ledger {} is locked by another run", .0.display())]
    Locked(PathBuf),

    #[error("Ledger {} does not start with the expected header", .0.display())]
    MissingHeader(PathBuf),

    #[error("Corrupt ledger {}, line {line}: {reason}", .path.display())]
    Corrupt {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("Card numbers exhausted after {0}")]
    Exhausted(u32),

    #[error("Card count must be positive")]
    InvalidCount,

    #[error("Allocation {0:?} does not continue this ledger")]
    StaleAllocation(RangeInclusive<u32>),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub name: String,
    pub card_number: u32,
    pub tracking_url: String,
}

/// A block of card numbers minted but not yet written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub first: u32,
    pub last: u32,
}

impl Allocation {
    pub fn count(&self) -> usize {
        (self.last - self.first) as usize + 1
    }

    pub fn numbers(&self) -> RangeInclusive<u32> {
        self.first..=self.last
    }
}

pub struct Ledger {
    path: PathBuf,
    file: File,
    records: Vec<LedgerRecord>,
    has_header: bool,
    needs_newline: bool,
}

impl Ledger {
    /// Opens (creating if needed) and locks the ledger, then reads every record.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let io_err = |e| LedgerError::Io(path.to_path_buf(), e);

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(io_err)?;

        file.try_lock_exclusive().map_err(|e| {
            if e.kind() == fs2::lock_contended_error().kind() {
                LedgerError::Locked(path.to_path_buf())
            } else {
                io_err(e)
            }
        })?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw).map_err(io_err)?;

        let (records, has_header) = parse_records(path, &raw)?;
        let needs_newline = raw.last().is_some_and(|b| *b != b'\n');

        info!(
            ledger = %path.display(),
            records = records.len(),
            "Ledger opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            records,
            has_header,
            needs_newline,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[LedgerRecord] {
        &self.records
    }

    /// `max(card_number) + 1`, or 1 for an empty ledger. Gaps are never refilled.
    pub fn next_card_number(&self) -> Result<u32, LedgerError> {
        match self.records.iter().map(|r| r.card_number).max() {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or(LedgerError::Exhausted(max)),
        }
    }

    /// Mints `count` consecutive numbers. Nothing is written until [`Ledger::commit`].
    pub fn allocate(&self, count: u32) -> Result<Allocation, LedgerError> {
        if count == 0 {
            return Err(LedgerError::InvalidCount);
        }
        let first = self.next_card_number()?;
        let last = first
            .checked_add(count - 1)
            .ok_or(LedgerError::Exhausted(u32::MAX))?;
        debug!(first, last, "Allocated card numbers");
        Ok(Allocation { first, last })
    }

    /// Appends one row per allocated card in a single write, preceded by the
    /// header when the ledger was empty.
    pub fn commit<F>(
        &mut self,
        allocation: &Allocation,
        name: &str,
        tracking_url: F,
    ) -> Result<Vec<LedgerRecord>, LedgerError>
    where
        F: Fn(u32) -> String,
    {
        if allocation.first != self.next_card_number()? || allocation.last < allocation.first {
            return Err(LedgerError::StaleAllocation(allocation.numbers()));
        }

        let new_records: Vec<LedgerRecord> = allocation
            .numbers()
            .map(|card_number| LedgerRecord {
                name: name.to_string(),
                card_number,
                tracking_url: tracking_url(card_number),
            })
            .collect();

        let mut buf = Vec::new();
        if self.needs_newline {
            buf.push(b'\n');
        }
        if !self.has_header {
            buf.extend_from_slice(LEDGER_HEADER.join(", ").as_bytes());
            buf.push(b'\n');
        }
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut buf);
            for record in &new_records {
                let number = record.card_number.to_string();
                writer.write_record([
                    record.name.as_str(),
                    number.as_str(),
                    record.tracking_url.as_str(),
                ])?;
            }
            writer
                .flush()
                .map_err(|e| LedgerError::Io(self.path.clone(), e))?;
        }

        self.file
            .write_all(&buf)
            .and_then(|_| self.file.sync_data())
            .map_err(|e| LedgerError::Io(self.path.clone(), e))?;

        self.has_header = true;
        self.needs_newline = false;
        self.records.extend(new_records.iter().cloned());

        info!(
            ledger = %self.path.display(),
            first = allocation.first,
            last = allocation.last,
            "Ledger committed"
        );
        Ok(new_records)
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn parse_records(path: &Path, raw: &[u8]) -> Result<(Vec<LedgerRecord>, bool), LedgerError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(raw);

    let mut records = Vec::new();
    let mut has_header = false;

    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        let line = row.position().map_or(idx as u64 + 1, |p| p.line());

        if !has_header {
            let is_header = row.len() >= 2
                && row.iter().zip(LEDGER_HEADER).all(|(f, h)| f.eq_ignore_ascii_case(h));
            if !is_header {
                return Err(LedgerError::MissingHeader(path.to_path_buf()));
            }
            has_header = true;
            continue;
        }

        let corrupt = |reason: String| LedgerError::Corrupt {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let number_field = row
            .get(1)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| corrupt("missing card number".to_string()))?;
        let card_number: u32 = number_field
            .parse()
            .map_err(|_| corrupt(format!("card number {number_field:?} is not numeric")))?;
        if card_number == 0 {
            return Err(corrupt("card number must be positive".to_string()));
        }

        records.push(LedgerRecord {
            name: row.get(0).unwrap_or_default().to_string(),
            card_number,
            tracking_url: row.get(2).unwrap_or_default().to_string(),
        });
    }

    Ok((records, has_header))
}
