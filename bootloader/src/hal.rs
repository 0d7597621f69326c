// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hardware seams.
//!
//! Peripheral bring-up itself lives outside this crate; the update and
//! boot logic only see these traits. Tests implement them over in-memory
//! buffers.

use crate::boot::LaunchPlan;
use crate::Error;

/// The point-to-point serial link to the update host.
pub trait SerialLink {
    /// Blocks until one byte arrives. There is no timeout; a silent host
    /// stalls the device, which is accepted behavior.
    fn read_byte(&mut self) -> u8;

    fn write(&mut self, data: &[u8]);
}

/// The raw flash device: page erase, word program, byte read.
pub trait FlashDevice {
    fn erase_page(&mut self, page_addr: u32) -> Result<(), Error>;

    /// Programs consecutive words starting at a word-aligned address
    /// inside an erased page.
    fn program_words(&mut self, addr: u32, words: &[u32]) -> Result<(), Error>;

    fn read(&self, addr: u32, out: &mut [u8]);
}

/// EEPROM-style durable key-value storage for the vault and the secrets.
pub trait KvStore {
    fn read(&self, offset: u32, out: &mut [u8]) -> Result<(), Error>;

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Error>;
}

/// Reset and control transfer. Both operations never return; they are the
/// only divergent points in the crate, so everything before them stays
/// testable.
pub trait SystemControl {
    fn reset(&mut self) -> !;

    /// Sets the stack pointer and jumps into decrypted firmware. All
    /// session state must be considered destroyed past this call.
    fn launch(&mut self, plan: LaunchPlan) -> !;
}
