// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Serial frame codec.
//!
//! Wire format: `'F' ‖ len:u16 LE ‖ payload ‖ crc16:u16 LE`. A zero-length
//! frame carries no checksum and ends a multi-frame transfer. The blocking
//! reader lives in the device crate; this module holds the pieces shared
//! with the host: the checksum and the encoder.

use crate::Error;
use consts::{FRAME_MARKER, MAX_FRAME_PAYLOAD};
use crc::{Crc, CRC_16_MODBUS};

/// Marker, length and checksum bytes around a non-empty payload.
pub const OVERHEAD: usize = 5;

/// Transport checksum over a frame payload.
pub fn checksum(payload: &[u8]) -> u16 {
    Crc::<u16>::new(&CRC_16_MODBUS).checksum(payload)
}

/// Encodes one frame into `out`, returning the encoded length.
///
/// An empty payload encodes the three-byte end-of-transfer frame.
pub fn encode(payload: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(Error::FrameTooLong);
    }
    let total = if payload.is_empty() {
        3
    } else {
        payload.len() + OVERHEAD
    };
    if out.len() < total {
        return Err(Error::BufferTooSmall);
    }
    out[0] = FRAME_MARKER;
    out[1..3].copy_from_slice(&(payload.len() as u16).to_le_bytes());
    if !payload.is_empty() {
        out[3..3 + payload.len()].copy_from_slice(payload);
        out[3 + payload.len()..total].copy_from_slice(&checksum(payload).to_le_bytes());
    }
    Ok(total)
}
