// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Key material and its one-time migration out of flash.
//!
//! A factory image carries the keys in a dedicated flash page, tagged with
//! a magic word. On first power-up the bootloader moves them into the
//! durable key-value store and erases the flash page, so the keys never
//! survive in a region a later firmware dump would expose.

use crate::hal::{FlashDevice, KvStore};
use crate::Error;
use consts::{
    DECRYPT_KEY_LEN, FLASH_PAGE_SIZE, HMAC_KEY_LEN, SECRETS_MAGIC, SECRETS_OFFSET, SECRETS_PAGE,
};

/// The two device keys, stored back to back in the key-value store.
#[derive(Clone)]
pub struct SecretMaterial {
    pub decrypt_key: [u8; DECRYPT_KEY_LEN],
    pub hmac_key: [u8; HMAC_KEY_LEN],
}

impl SecretMaterial {
    pub const SIZE: usize = DECRYPT_KEY_LEN + HMAC_KEY_LEN;

    pub fn load<K: KvStore>(kv: &K) -> Result<Self, Error> {
        let mut raw = [0u8; Self::SIZE];
        kv.read(SECRETS_OFFSET, &mut raw)?;
        let mut decrypt_key = [0u8; DECRYPT_KEY_LEN];
        decrypt_key.copy_from_slice(&raw[..DECRYPT_KEY_LEN]);
        let mut hmac_key = [0u8; HMAC_KEY_LEN];
        hmac_key.copy_from_slice(&raw[DECRYPT_KEY_LEN..]);
        Ok(Self {
            decrypt_key,
            hmac_key,
        })
    }
}

/// Migrates factory-provisioned keys out of flash, if present.
///
/// Returns `true` when a provisioning block was found and moved; the
/// caller must reset so the next power-up runs without it. The store write
/// is verified by read-back with one retry before the flash page is
/// erased, so a failed migration leaves the block in place for the next
/// attempt.
pub fn provision<F: FlashDevice, K: KvStore>(flash: &mut F, kv: &mut K) -> Result<bool, Error> {
    let page_addr = SECRETS_PAGE * FLASH_PAGE_SIZE as u32;
    let mut magic = [0u8; 4];
    flash.read(page_addr, &mut magic);
    if u32::from_le_bytes(magic) != SECRETS_MAGIC {
        return Ok(false);
    }

    let mut keys = [0u8; SecretMaterial::SIZE];
    flash.read(page_addr + 4, &mut keys);

    let mut stored = false;
    for _ in 0..2 {
        kv.write(SECRETS_OFFSET, &keys)?;
        let mut check = [0u8; SecretMaterial::SIZE];
        kv.read(SECRETS_OFFSET, &mut check)?;
        if check == keys {
            stored = true;
            break;
        }
    }
    if !stored {
        return Err(Error::KvWrite);
    }

    flash.erase_page(page_addr)?;
    Ok(true)
}
