// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Blocking frame reader for the serial link.

use crate::hal::SerialLink;
use crate::Error;
use consts::{FRAME_MARKER, MAX_FRAME_PAYLOAD};
use heapless::Vec;

/// Reads one frame into `buf` and returns its payload length.
///
/// Blocks until a marker byte is observed, discarding everything before
/// it. A zero declared length returns immediately with an empty buffer;
/// the caller treats it as end-of-stream. An oversized declared length or
/// a checksum mismatch is fatal to the session.
pub fn read_frame<L: SerialLink>(
    link: &mut L,
    buf: &mut Vec<u8, MAX_FRAME_PAYLOAD>,
) -> Result<usize, Error> {
    while link.read_byte() != FRAME_MARKER {}

    let declared = read_short(link) as usize;
    buf.clear();
    if declared == 0 {
        return Ok(0);
    }
    if declared > MAX_FRAME_PAYLOAD {
        return Err(Error::FrameTooLong);
    }
    for _ in 0..declared {
        buf.push(link.read_byte()).map_err(|_| Error::FrameTooLong)?;
    }
    let received = read_short(link);
    if fwseal::frame::checksum(buf) != received {
        return Err(Error::ChecksumMismatch);
    }
    Ok(declared)
}

/// Reads a little-endian u16 from the link.
pub fn read_short<L: SerialLink>(link: &mut L) -> u16 {
    let lo = link.read_byte();
    let hi = link.read_byte();
    u16::from_le_bytes([lo, hi])
}

/// Fills `out` from the link. Used for the raw trailing signature, which
/// is not frame-wrapped.
pub fn read_exact<L: SerialLink>(link: &mut L, out: &mut [u8]) {
    for b in out.iter_mut() {
        *b = link.read_byte();
    }
}
