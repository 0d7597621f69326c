// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Size in bytes of one flash page, the erase granularity of the device.
pub const FLASH_PAGE_SIZE: usize = 1024;

/// Size in bytes of one flash word, the program granularity of the device.
pub const FLASH_WORD_SIZE: usize = 4;

/// Maximum payload carried by one serial frame.
/// Sized to a full flash page so one full frame fills exactly one page.
pub const MAX_FRAME_PAYLOAD: usize = 1024;

/// Marker byte that starts a serial frame.
pub const FRAME_MARKER: u8 = b'F';

/// Command byte requesting a firmware update session.
pub const CMD_UPDATE: u8 = b'U';

/// Command byte requesting a boot of the installed firmware.
pub const CMD_BOOT: u8 = b'B';

/// Acknowledgment byte sent after a frame has been validated and acted on.
pub const ACK: u8 = b'A';

/// Length in bytes of the AES-128 firmware decryption key.
pub const DECRYPT_KEY_LEN: usize = 16;

/// Length in bytes of the HMAC-SHA256 authentication key.
pub const HMAC_KEY_LEN: usize = 16;

/// Length in bytes of the AES-CTR initialization vector.
pub const IV_LEN: usize = 16;

/// Cipher block length. Non-final firmware chunks must be a multiple of this.
pub const CIPHER_BLOCK_LEN: usize = 16;

/// Length in bytes of an HMAC-SHA256 authentication tag.
pub const TAG_LEN: usize = 32;

/// Length in bytes of the trailing image signature (an HMAC-SHA256 digest
/// over the ciphertext region).
pub const SIGNATURE_LEN: usize = 32;

/// Length in bytes of the serialized firmware metadata record.
pub const METADATA_LEN: usize = 16;

/// Length in bytes of the metadata blob: IV, encrypted metadata and tag.
pub const METADATA_BLOB_LEN: usize = IV_LEN + METADATA_LEN + TAG_LEN;

/// First flash page of partition A.
pub const PART_A_PAGE: u32 = 100;

/// First flash page of partition B.
pub const PART_B_PAGE: u32 = 178;

/// Number of flash pages in one firmware partition.
pub const PART_PAGES: u32 = 78;

/// Flash page holding the one-time secret provisioning block.
pub const SECRETS_PAGE: u32 = 99;

/// Magic tag at the start of the secret provisioning block.
pub const SECRETS_MAGIC: u32 = 0x0000_2137;

/// Magic constant identifying a valid vault record.
pub const VAULT_MAGIC: u32 = 0x05EC_12E7;

/// Byte offset of the vault record in the durable key-value store.
pub const VAULT_OFFSET: u32 = 0x3C0;

/// Byte offset of the secret material in the durable key-value store.
pub const SECRETS_OFFSET: u32 = 0x400;

/// Base address of the RAM region firmware is decrypted into and run from.
pub const EXEC_REGION_BASE: u32 = 0x2000_0000;

/// Size in bytes of the RAM execution region.
pub const EXEC_REGION_SIZE: u32 = 0x8000;
