// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Page writer: erase-then-program with word packing.

use crate::hal::FlashDevice;
use crate::Error;
use consts::{FLASH_PAGE_SIZE, FLASH_WORD_SIZE};

const PAGE_WORDS: usize = FLASH_PAGE_SIZE / FLASH_WORD_SIZE;

/// Erases the page at `page_addr` and programs `data` into it.
///
/// The device programs in full words. A sub-word tail is packed into one
/// final word in its original byte order with the unused high bytes set to
/// the erased-flash value, so filler reads back as erased flash rather
/// than as meaningful zeros.
pub fn program_page<F: FlashDevice>(
    flash: &mut F,
    page_addr: u32,
    data: &[u8],
) -> Result<(), Error> {
    if page_addr as usize % FLASH_PAGE_SIZE != 0 || data.len() > FLASH_PAGE_SIZE {
        return Err(Error::FlashBounds);
    }
    flash.erase_page(page_addr)?;

    let mut words = [0u32; PAGE_WORDS];
    let mut count = 0;
    for chunk in data.chunks_exact(FLASH_WORD_SIZE) {
        words[count] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        count += 1;
    }
    let tail = data.chunks_exact(FLASH_WORD_SIZE).remainder();
    if !tail.is_empty() {
        let mut last = [0xFFu8; FLASH_WORD_SIZE];
        last[..tail.len()].copy_from_slice(tail);
        words[count] = u32::from_le_bytes(last);
        count += 1;
    }
    flash.program_words(page_addr, &words[..count])
}
