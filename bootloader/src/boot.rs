// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secure boot: verify the trusted partition, decrypt it into RAM and
//! hand back the jump target.

use crate::hal::{FlashDevice, KvStore, SerialLink};
use crate::partition::Partition;
use crate::secrets::SecretMaterial;
use crate::vault::Vault;
use crate::Error;
use consts::{
    EXEC_REGION_BASE, EXEC_REGION_SIZE, FLASH_PAGE_SIZE, IV_LEN, METADATA_BLOB_LEN, SIGNATURE_LEN,
};
use fwseal::crypto::{digests_match, ImageCipher, StreamDigest};
use fwseal::{padded_firmware_len, MetadataBlob};

/// Where control goes after a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Initial stack pointer for the launched firmware.
    pub stack_top: u32,
    /// Entry address. Bit 0 is set for Thumb execution.
    pub entry: u32,
}

pub struct BootContext<'a, L, F, K> {
    link: &'a mut L,
    flash: &'a F,
    kv: &'a K,
    secrets: &'a SecretMaterial,
}

impl<'a, L, F, K> BootContext<'a, L, F, K>
where
    L: SerialLink,
    F: FlashDevice,
    K: KvStore,
{
    pub fn new(link: &'a mut L, flash: &'a F, kv: &'a K, secrets: &'a SecretMaterial) -> Self {
        Self {
            link,
            flash,
            kv,
            secrets,
        }
    }

    /// Verifies and decrypts the trusted image into `fw_ram`.
    ///
    /// Nothing is emitted on the link and no plan is returned until the
    /// tag, version and full-image signature have all checked out. The
    /// release message is written to the link last, just before the caller
    /// jumps.
    pub fn run(self, fw_ram: &mut [u8]) -> Result<LaunchPlan, Error> {
        let vault = Vault::read(self.kv)?.ok_or(Error::NoTrustedImage)?;
        let active = vault.active.ok_or(Error::NoTrustedImage)?;
        let partition = active.partition();

        let mut raw = [0u8; METADATA_BLOB_LEN];
        self.flash.read(partition.metadata_blob_addr(), &mut raw);
        let blob = MetadataBlob::from_bytes(&raw)?;

        let mut digest = StreamDigest::new(&self.secrets.hmac_key);
        digest.update(&raw[IV_LEN..]);

        let mut cipher = ImageCipher::new(&self.secrets.decrypt_key, blob.iv());
        let metadata = blob.open(&mut cipher)?;

        let mut message = [0u8; FLASH_PAGE_SIZE];
        self.flash.read(partition.message_addr(), &mut message);
        digest.update(&message);
        cipher.apply(&mut message);

        let padded = padded_firmware_len(vault.fw_length) as usize;
        if padded > fw_ram.len() {
            return Err(Error::ExecRegionOverflow);
        }
        let fw = &mut fw_ram[..padded];
        self.flash.read(partition.firmware_addr(), fw);
        digest.update(fw);
        cipher.apply(fw);

        // A version-0 image inherited the vault's version at install time
        // and carries no version claim of its own.
        if metadata.fw_version != 0 && metadata.fw_version != vault.fw_version {
            return Err(Error::VersionDisagreement {
                metadata: metadata.fw_version,
                vault: vault.fw_version,
            });
        }
        blob.verify_tag(&metadata, &self.secrets.hmac_key)?;

        let mut stored = [0u8; SIGNATURE_LEN];
        self.flash
            .read(partition.signature_addr(vault.fw_length), &mut stored);
        if !digests_match(&digest.finalize(), &stored) {
            return Err(Error::SignatureMismatch);
        }

        let shown = (vault.message_length as usize).min(FLASH_PAGE_SIZE);
        self.link.write(&message[..shown]);

        Ok(LaunchPlan {
            stack_top: EXEC_REGION_BASE + EXEC_REGION_SIZE,
            entry: EXEC_REGION_BASE | 1,
        })
    }
}
