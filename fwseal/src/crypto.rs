// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Cryptographic pipeline for sealed images: AES-128-CTR keystream and
//! HMAC-SHA256 tags/digests.

use aes::Aes128;
use cipher::{KeyIvInit, StreamCipher};
use consts::{DECRYPT_KEY_LEN, HMAC_KEY_LEN, IV_LEN, TAG_LEN};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// One logical keystream over `metadata ‖ message page ‖ firmware`.
///
/// Callers decrypt the regions in separate [`apply`] calls; the counter
/// carries over, so the concatenation of the calls equals one pass over
/// the whole image.
///
/// [`apply`]: ImageCipher::apply
pub struct ImageCipher(Aes128Ctr);

impl ImageCipher {
    pub fn new(key: &[u8; DECRYPT_KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self(Aes128Ctr::new(key.into(), iv.into()))
    }

    /// Encrypts or decrypts `data` in place. CTR mode is its own inverse.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

/// Running HMAC-SHA256 over the ciphertext region of an image.
///
/// Fed with the bytes following the IV (encrypted metadata, tag, message
/// page and firmware ciphertext), in wire order.
pub struct StreamDigest(HmacSha256);

impl StreamDigest {
    pub fn new(key: &[u8; HMAC_KEY_LEN]) -> Self {
        Self(HmacSha256::new_from_slice(key).expect("HMAC accepts any key length"))
    }

    pub fn update(&mut self, data: &[u8]) {
        Mac::update(&mut self.0, data);
    }

    pub fn finalize(self) -> [u8; TAG_LEN] {
        self.0.finalize().into_bytes().into()
    }
}

/// HMAC-SHA256 tag over a plaintext metadata record.
pub fn metadata_tag(key: &[u8; HMAC_KEY_LEN], metadata: &[u8]) -> [u8; TAG_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    Mac::update(&mut mac, metadata);
    mac.finalize().into_bytes().into()
}

/// Equality check that looks at every byte regardless of where the first
/// difference is.
pub fn digests_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
