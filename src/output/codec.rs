//! Chunk framing for raw process output.
//!
//! Pipes deliver bytes at arbitrary boundaries. Sanitizing each read
//! verbatim would let a multi-byte character, an escape sequence or a
//! `\r\n` pair straddle two chunks and survive (or be mangled by) the
//! sanitizer. [`OutputCodec`] emits everything up to the last safe
//! boundary and keeps the unfinished tail buffered for the next read.
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use aidash_sandbox::output::codec::OutputCodec;
//!
//! let chunks = FramedRead::new(child_stdout, OutputCodec::new());
//! ```

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Maximum number of bytes held back waiting for a sequence to complete.
///
/// A runaway sequence (an OSC that is never terminated, say) is flushed
/// once the buffer reaches this size, so a misbehaving child cannot stall
/// delivery indefinitely.
pub const MAX_PENDING_BYTES: usize = 4096;

/// Longest bracket code without a leading escape: `[`, `?`, ten params.
const MAX_BARE_CODE_LEN: usize = 12;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// UTF-8 encoding of the 8-bit CSI introducer `U+009B`.
const C1_CSI: [u8; 2] = [0xc2, 0x9b];

/// Decoder yielding text chunks that never split a UTF-8 character, an
/// escape sequence, a bare bracket code or a `\r\n` pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutputCodec;

impl OutputCodec {
    /// Create a new codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for OutputCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cut = boundary(src, true);
        if cut == 0 {
            if src.len() < MAX_PENDING_BYTES {
                return Ok(None);
            }
            cut = src.len();
        }

        let chunk = src.split_to(cut);
        Ok(Some(String::from_utf8_lossy(&chunk).into_owned()))
    }

    /// Flush whatever is left when the pipe closes, lossily.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }
        let chunk = src.split();
        Ok(Some(String::from_utf8_lossy(&chunk).into_owned()))
    }
}

/// Release bytes held only because they look like the start of a bare
/// bracket code, after the pipe has gone quiet.
///
/// Text such as a `Pick one [` prompt would otherwise wait for more
/// output that may never come. Unfinished escape sequences, UTF-8
/// characters and a trailing `\r` stay buffered.
pub fn flush_idle(src: &mut BytesMut) -> Option<String> {
    let cut = boundary(src, false);
    if cut == 0 {
        return None;
    }
    let chunk = src.split_to(cut);
    Some(String::from_utf8_lossy(&chunk).into_owned())
}

/// Number of leading bytes of `buf` that can be emitted now.
fn boundary(buf: &[u8], hold_bare_codes: bool) -> usize {
    let mut cut = buf.len() - incomplete_utf8_tail(buf);

    if let Some(start) = pending_escape_start(&buf[..cut]) {
        cut = start;
    }
    if let Some(start) = pending_c1_csi_start(&buf[..cut]) {
        cut = start;
    }
    if hold_bare_codes {
        if let Some(start) = pending_bare_code_start(&buf[..cut]) {
            cut = start;
        }
    }
    // A trailing CR may be the first half of CRLF.
    if cut > 0 && buf[cut - 1] == b'\r' {
        cut -= 1;
    }

    cut
}

/// Length of an unfinished UTF-8 sequence at the end of `buf`.
fn incomplete_utf8_tail(buf: &[u8]) -> usize {
    let len = buf.len();
    for back in 1..=len.min(4) {
        let byte = buf[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

/// Start of an escape sequence at the end of `buf` that has not finished.
fn pending_escape_start(buf: &[u8]) -> Option<usize> {
    let window = buf.len().saturating_sub(MAX_PENDING_BYTES);
    let pos = buf[window..].iter().rposition(|&b| b == ESC)? + window;
    escape_is_incomplete(&buf[pos..]).then_some(pos)
}

/// `seq` starts with the last `ESC` in the buffer, so any string
/// terminator (`ESC \`) that would close it cannot have arrived yet.
fn escape_is_incomplete(seq: &[u8]) -> bool {
    match seq.get(1) {
        None => true,
        // CSI: parameter and intermediate bytes until a final byte.
        Some(b'[') => seq[2..].iter().all(|b| (0x20..=0x3f).contains(b)),
        // OSC may also end with BEL.
        Some(b']') => !seq[2..].contains(&BEL),
        Some(b'P' | b'X' | b'^' | b'_') => true,
        Some(b'(' | b')') => seq.len() < 3,
        Some(_) => false,
    }
}

/// Start of an 8-bit CSI at the end of `buf` still missing its final byte.
fn pending_c1_csi_start(buf: &[u8]) -> Option<usize> {
    let window = buf.len().saturating_sub(MAX_PENDING_BYTES);
    let pos = buf[window..]
        .windows(C1_CSI.len())
        .rposition(|pair| pair == C1_CSI)?
        + window;
    buf[pos + C1_CSI.len()..]
        .iter()
        .all(|b| (0x20..=0x3f).contains(b))
        .then_some(pos)
}

/// Start of a possible escape-less bracket code at the end of `buf`.
fn pending_bare_code_start(buf: &[u8]) -> Option<usize> {
    let window = buf.len().saturating_sub(MAX_BARE_CODE_LEN);
    let pos = buf[window..].iter().rposition(|&b| b == b'[')? + window;
    buf[pos + 1..]
        .iter()
        .all(|b| b.is_ascii_digit() || *b == b';' || *b == b'?')
        .then_some(pos)
}
