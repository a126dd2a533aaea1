// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local fallback storage for events that could not be shipped.
//!
//! Every spill appends one chunk to the file: a JSON array of events followed
//! by a newline.
//!
//! ```text
//! [{"message":"AAA","timestamp":1656581409000},{"message":"BBB","timestamp":1656581409001}]
//! [{"message":"CCC","timestamp":1656581410000}]
//! ```
//!
//! Every chunk sits on its own line, so a chunk left incomplete by a failed
//! or interrupted write only costs that chunk: decoding skips the
//! unparseable line with a warning and keeps every other chunk.
//!
//! A failed append truncates the file back to its previous length. If the
//! process dies mid-write instead, the next append starts a new line first.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{error, warn};

use crate::error::SpillError;
use crate::event::LogEvent;

/// Encodes `events` as one newline-terminated chunk.
pub fn encode_chunk(events: &[LogEvent]) -> Result<Vec<u8>, SpillError> {
    let mut chunk = serde_json::to_vec(events)?;
    chunk.push(b'\n');
    Ok(chunk)
}

/// Decodes every chunk in `bytes`, in order.
///
/// Blank lines are ignored. A line that is not a complete chunk is skipped
/// and logged; chunks before and after it are still returned.
pub fn decode_chunks(bytes: &[u8]) -> Vec<LogEvent> {
    let mut events = Vec::new();
    for (index, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<Vec<LogEvent>>(line) {
            Ok(chunk) => events.extend(chunk),
            Err(e) => warn!(
                "LOGS | Skipping unreadable spill chunk on line {} ({} bytes): {e}",
                index + 1,
                line.len()
            ),
        }
    }
    events
}

/// Appends one chunk holding `events` to the file at `path`, creating it if needed.
///
/// Nothing is written when `events` is empty. If the write fails the file
/// is truncated back to its previous length, so chunks already in it stay
/// loadable.
pub fn append_to_file(path: &Path, events: &[LogEvent]) -> Result<(), SpillError> {
    if events.is_empty() {
        return Ok(());
    }
    // Encode before opening so a serialization failure leaves the file untouched
    let chunk = encode_chunk(events)?;
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let original_len = file.metadata()?.len();

    let mut bytes = Vec::with_capacity(chunk.len() + 1);
    if original_len > 0 && !ends_with_newline(&mut file)? {
        warn!(
            "LOGS | {} ends with an incomplete chunk, starting a new line",
            path.display()
        );
        bytes.push(b'\n');
    }
    bytes.extend(chunk);

    write_or_rollback(&mut file, &bytes, original_len)
}

/// Reads every event spilled to the file at `path`.
pub fn read_from_file(path: &Path) -> Result<Vec<LogEvent>, SpillError> {
    let bytes = std::fs::read(path)?;
    Ok(decode_chunks(&bytes))
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Spill destination that can be cut back after a partial write.
trait Truncate {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

fn write_or_rollback<W: Write + Truncate>(
    file: &mut W,
    bytes: &[u8],
    original_len: u64,
) -> Result<(), SpillError> {
    if let Err(e) = file.write_all(bytes).and_then(|()| file.flush()) {
        if let Err(truncate_err) = file.truncate_to(original_len) {
            error!("LOGS | Failed to remove partial spill chunk: {truncate_err}");
        }
        return Err(e.into());
    }
    Ok(())
}
