// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The firmware update session.
//!
//! One session receives a sealed image over the serial link and installs
//! it into the partition opposite the trusted one. The vault is only
//! rewritten after the trailing signature has been verified against the
//! digest accumulated over every stored ciphertext byte, so an
//! interrupted or forged stream leaves the trusted image untouched.

use crate::flash::program_page;
use crate::frame::{read_exact, read_frame};
use crate::hal::{FlashDevice, KvStore, SerialLink};
use crate::partition::{Partition, MAX_FIRMWARE_PAGES};
use crate::secrets::SecretMaterial;
use crate::vault::{ActivePartition, Vault};
use crate::Error;
use consts::{ACK, FLASH_PAGE_SIZE, IV_LEN, MAX_FRAME_PAYLOAD, METADATA_BLOB_LEN, SIGNATURE_LEN};
use fwseal::crypto::{digests_match, ImageCipher, StreamDigest};
use fwseal::MetadataBlob;
use heapless::Vec;

pub struct UpdateSession<'a, L, F, K> {
    link: &'a mut L,
    flash: &'a mut F,
    kv: &'a mut K,
    secrets: &'a SecretMaterial,
}

impl<'a, L, F, K> UpdateSession<'a, L, F, K>
where
    L: SerialLink,
    F: FlashDevice,
    K: KvStore,
{
    pub fn new(
        link: &'a mut L,
        flash: &'a mut F,
        kv: &'a mut K,
        secrets: &'a SecretMaterial,
    ) -> Self {
        Self {
            link,
            flash,
            kv,
            secrets,
        }
    }

    /// Runs the session to completion. On success the vault names the
    /// freshly written partition; on any error the caller resets the
    /// device and the vault still names the previous one.
    pub fn run(self) -> Result<(), Error> {
        let mut buf: Vec<u8, MAX_FRAME_PAYLOAD> = Vec::new();

        // The session opens with exactly one metadata blob frame.
        let n = read_frame(self.link, &mut buf)?;
        if n != METADATA_BLOB_LEN {
            return Err(Error::MetadataFrameLength);
        }
        let blob = MetadataBlob::from_bytes(&buf)?;

        // The digest covers everything after the IV, in store order.
        let mut digest = StreamDigest::new(&self.secrets.hmac_key);
        digest.update(&buf[IV_LEN..]);

        let mut cipher = ImageCipher::new(&self.secrets.decrypt_key, blob.iv());
        let metadata = blob.open(&mut cipher)?;
        blob.verify_tag(&metadata, &self.secrets.hmac_key)?;

        let vault = Vault::read(self.kv)?.unwrap_or_else(Vault::first_boot);
        let target = match vault.active {
            Some(active) => active.other(),
            None => ActivePartition::A,
        };

        // Version 0 is the debug passthrough: it installs but inherits the
        // current floor instead of lowering it.
        let effective_version = if metadata.fw_version == 0 {
            vault.fw_version
        } else {
            metadata.fw_version
        };
        if metadata.fw_version != 0 && metadata.fw_version < vault.fw_version {
            return Err(Error::RollbackRejected {
                incoming: metadata.fw_version,
                floor: vault.fw_version,
            });
        }
        if Partition::firmware_pages(metadata.fw_length) > MAX_FIRMWARE_PAGES {
            return Err(Error::FirmwareTooLarge);
        }
        if metadata.message_length > FLASH_PAGE_SIZE as u32 {
            return Err(Error::MessageTooLong);
        }

        // First partition page: erased filler with the blob at its tail.
        let partition = target.partition();
        let mut page = [0xFFu8; FLASH_PAGE_SIZE];
        page[FLASH_PAGE_SIZE - METADATA_BLOB_LEN..].copy_from_slice(&blob.to_bytes());
        program_page(self.flash, partition.base_addr(), &page)?;
        self.link.write(&[ACK]);

        // Ciphertext stream: message page first, then firmware pages. A
        // short frame marks the final chunk; only the zero-length frame may
        // follow it.
        let signature_addr = partition.signature_addr(metadata.fw_length);
        let mut cursor = partition.message_addr();
        let mut ending = false;
        loop {
            let n = read_frame(self.link, &mut buf)?;
            if n == 0 {
                break;
            }
            if ending {
                return Err(Error::TrailingFrame);
            }
            if n < MAX_FRAME_PAYLOAD {
                ending = true;
            }
            if cursor + n as u32 > signature_addr {
                return Err(Error::PartitionOverflow);
            }
            digest.update(&buf);
            program_page(self.flash, cursor, &buf)?;
            cursor += n as u32;
            self.link.write(&[ACK]);
        }

        // The signature follows the end-of-stream frame raw, unframed.
        let mut signature = [0u8; SIGNATURE_LEN];
        read_exact(self.link, &mut signature);
        if !digests_match(&digest.finalize(), &signature) {
            return Err(Error::SignatureMismatch);
        }
        program_page(self.flash, signature_addr, &signature)?;

        Vault {
            active: Some(target),
            fw_version: effective_version,
            fw_length: metadata.fw_length,
            message_length: metadata.message_length,
        }
        .write(self.kv)?;
        self.link.write(&[ACK]);
        Ok(())
    }
}
