// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! A/B partition addressing.
//!
//! Layout inside one partition, in pages:
//! `| metadata blob (tail of page 0) | message page | firmware pages | signature |`

use consts::{FLASH_PAGE_SIZE, METADATA_BLOB_LEN, PART_A_PAGE, PART_B_PAGE, PART_PAGES};
use fwseal::padded_firmware_len;

/// Pages available for firmware ciphertext: everything except the
/// metadata, message and signature pages.
pub const MAX_FIRMWARE_PAGES: u32 = PART_PAGES - 3;

const PAGE: u32 = FLASH_PAGE_SIZE as u32;

/// One of the two fixed flash regions holding a firmware generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    first_page: u32,
}

impl Partition {
    pub const fn a() -> Self {
        Self {
            first_page: PART_A_PAGE,
        }
    }

    pub const fn b() -> Self {
        Self {
            first_page: PART_B_PAGE,
        }
    }

    pub const fn base_addr(&self) -> u32 {
        self.first_page * PAGE
    }

    /// The metadata blob sits at the tail of the partition's first page.
    pub const fn metadata_blob_addr(&self) -> u32 {
        self.base_addr() + PAGE - METADATA_BLOB_LEN as u32
    }

    pub const fn message_addr(&self) -> u32 {
        self.base_addr() + PAGE
    }

    pub const fn firmware_addr(&self) -> u32 {
        self.base_addr() + 2 * PAGE
    }

    /// Pages occupied by the padded firmware ciphertext.
    pub const fn firmware_pages(fw_length: u32) -> u32 {
        padded_firmware_len(fw_length).div_ceil(PAGE)
    }

    /// The signature page immediately follows the firmware region.
    pub const fn signature_addr(&self, fw_length: u32) -> u32 {
        self.firmware_addr() + Self::firmware_pages(fw_length) * PAGE
    }

    pub const fn end_addr(&self) -> u32 {
        self.base_addr() + PART_PAGES * PAGE
    }
}
