//! Incremental, offset-based reading of append-only transcript files.
//!
//! The writer appends one JSON object per line and may be caught mid-write,
//! so only newline-terminated lines are returned. The unterminated tail stays
//! on disk and is picked up by the next read.

use crate::{Result, WatchError};
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Lines read by one [`read_new_lines`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailRead {
    /// Complete, non-blank lines in file order, without their terminators.
    pub lines: Vec<String>,
    /// Offset to pass to the next call.
    pub offset: u64,
    /// The file was shorter than the requested offset and was re-read from 0.
    pub reset: bool,
}

/// Read the complete lines appended to `path` since `offset`.
///
/// Fails with [`WatchError::FileNotFound`] if the file is gone.
pub async fn read_new_lines(path: &Path, offset: u64) -> Result<TailRead> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| WatchError::from_io(path, e))?;
    let file_len = file
        .metadata()
        .await
        .map_err(|e| WatchError::from_io(path, e))?
        .len();

    let (start, reset) = if file_len < offset {
        debug!(
            target: "sessionwatch::tailer",
            "{} shrank from {} to {} bytes, re-reading from start",
            path.display(),
            offset,
            file_len
        );
        (0, true)
    } else {
        (offset, false)
    };

    if file_len == start {
        return Ok(TailRead {
            lines: Vec::new(),
            offset: start,
            reset,
        });
    }

    file.seek(SeekFrom::Start(start))
        .await
        .map_err(|e| WatchError::from_io(path, e))?;
    let mut buf = Vec::with_capacity((file_len - start) as usize);
    file.read_to_end(&mut buf)
        .await
        .map_err(|e| WatchError::from_io(path, e))?;

    let (lines, consumed) = split_complete_lines(&buf);
    Ok(TailRead {
        lines,
        offset: start + consumed as u64,
        reset,
    })
}

/// Split `buf` into complete lines. Returns the lines and the number of bytes
/// they span, terminators included. Bytes after the last `\n` are left alone.
pub fn split_complete_lines(buf: &[u8]) -> (Vec<String>, usize) {
    let Some(last_newline) = buf.iter().rposition(|b| *b == b'\n') else {
        return (Vec::new(), 0);
    };

    let complete = &buf[..last_newline];
    let lines = complete
        .split(|b| *b == b'\n')
        .map(|raw| raw.strip_suffix(b"\r").unwrap_or(raw))
        .filter(|raw| !raw.iter().all(|b| b.is_ascii_whitespace()))
        .map(|raw| String::from_utf8_lossy(raw).into_owned())
        .collect();

    (lines, last_newline + 1)
}
