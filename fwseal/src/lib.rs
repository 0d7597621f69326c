// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sealed firmware image format.
//!
//! A sealed image is what the update host produces and what the device
//! stores in a partition: a metadata blob (IV, encrypted metadata record,
//! authentication tag), one encrypted message page, the encrypted firmware
//! padded to the cipher block size, and a trailing digest over the
//! ciphertext. The same keystream covers metadata, message and firmware,
//! so the device can decrypt them in separate calls while the digest stays
//! reproducible from the bytes on the wire or in flash.

#![no_std]

pub mod crypto;
pub mod frame;


use consts::{
    CIPHER_BLOCK_LEN, DECRYPT_KEY_LEN, FLASH_PAGE_SIZE, FLASH_WORD_SIZE, HMAC_KEY_LEN, IV_LEN,
    METADATA_BLOB_LEN, METADATA_LEN, SIGNATURE_LEN, TAG_LEN,
};
use crypto::{ImageCipher, StreamDigest};

// The blob is programmed to flash in full words.
const _: () = assert!(METADATA_BLOB_LEN % FLASH_WORD_SIZE == 0);

/// Firmware descriptor created by the update host per release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub fw_version: u32,
    pub fw_length: u32,
    pub message_length: u32,
    pub reserved: u32,
}

impl Metadata {
    pub const SIZE: usize = METADATA_LEN;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.fw_version.to_le_bytes());
        out[4..8].copy_from_slice(&self.fw_length.to_le_bytes());
        out[8..12].copy_from_slice(&self.message_length.to_le_bytes());
        out[12..16].copy_from_slice(&self.reserved.to_le_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::MetadataTruncated);
        }
        Ok(Self {
            fw_version: le_u32(&data[0..4]),
            fw_length: le_u32(&data[4..8]),
            message_length: le_u32(&data[8..12]),
            reserved: le_u32(&data[12..16]),
        })
    }
}

/// The wire and flash unit wrapping [`Metadata`].
///
/// Layout: `iv ‖ enc(metadata) ‖ tag`. The tag is HMAC-SHA256 over the
/// plaintext metadata record; the metadata ciphertext is the first cipher
/// block of the image keystream.
#[derive(Debug, Clone)]
pub struct MetadataBlob {
    iv: [u8; IV_LEN],
    enc_metadata: [u8; METADATA_LEN],
    tag: [u8; TAG_LEN],
}

impl MetadataBlob {
    pub const SIZE: usize = METADATA_BLOB_LEN;

    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::BlobTruncated);
        }
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&data[..IV_LEN]);
        let mut enc_metadata = [0u8; METADATA_LEN];
        enc_metadata.copy_from_slice(&data[IV_LEN..IV_LEN + METADATA_LEN]);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&data[IV_LEN + METADATA_LEN..Self::SIZE]);
        Ok(Self {
            iv,
            enc_metadata,
            tag,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..IV_LEN].copy_from_slice(&self.iv);
        out[IV_LEN..IV_LEN + METADATA_LEN].copy_from_slice(&self.enc_metadata);
        out[IV_LEN + METADATA_LEN..].copy_from_slice(&self.tag);
        out
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// Decrypts the metadata record, consuming the first block of the
    /// keystream. The result is untrusted until [`verify_tag`] passes.
    ///
    /// [`verify_tag`]: MetadataBlob::verify_tag
    pub fn open(&self, cipher: &mut ImageCipher) -> Result<Metadata, Error> {
        let mut buf = self.enc_metadata;
        cipher.apply(&mut buf);
        Metadata::from_bytes(&buf)
    }

    /// Checks the blob's tag against the decrypted metadata record.
    pub fn verify_tag(
        &self,
        metadata: &Metadata,
        hmac_key: &[u8; HMAC_KEY_LEN],
    ) -> Result<(), Error> {
        let expected = crypto::metadata_tag(hmac_key, &metadata.to_bytes());
        if !crypto::digests_match(&expected, &self.tag) {
            return Err(Error::TagMismatch);
        }
        Ok(())
    }
}

/// Firmware ciphertext length after padding to the cipher block size.
///
/// Saturates for lengths within one block of `u32::MAX`, so a forged
/// length can only grow under padding and capacity checks against it
/// still reject.
pub const fn padded_firmware_len(fw_length: u32) -> u32 {
    let block = CIPHER_BLOCK_LEN as u32;
    fw_length.div_ceil(block).saturating_mul(block)
}

/// A parsed sealed image file, as produced by [`seal`].
///
/// Layout: `blob ‖ enc(message page) ‖ enc(padded firmware) ‖ signature`.
/// The stream bytes are exactly what goes over the wire after the metadata
/// frame, and exactly what the device stores at increasing page offsets.
#[derive(Debug)]
pub struct SealedImage<'a> {
    pub blob: MetadataBlob,
    pub stream: &'a [u8],
    pub signature: [u8; SIGNATURE_LEN],
}

impl<'a> SealedImage<'a> {
    pub const MIN_SIZE: usize = METADATA_BLOB_LEN + FLASH_PAGE_SIZE + SIGNATURE_LEN;

    pub fn parse(data: &'a [u8]) -> Result<Self, Error> {
        if data.len() < Self::MIN_SIZE {
            return Err(Error::ImageTruncated);
        }
        let blob = MetadataBlob::from_bytes(&data[..METADATA_BLOB_LEN])?;
        let stream = &data[METADATA_BLOB_LEN..data.len() - SIGNATURE_LEN];
        if stream.len() % CIPHER_BLOCK_LEN != 0 {
            return Err(Error::UnalignedStream);
        }
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&data[data.len() - SIGNATURE_LEN..]);
        Ok(Self {
            blob,
            stream,
            signature,
        })
    }
}

/// Inputs for sealing one firmware release.
pub struct SealRequest<'a> {
    pub decrypt_key: &'a [u8; DECRYPT_KEY_LEN],
    pub hmac_key: &'a [u8; HMAC_KEY_LEN],
    pub iv: [u8; IV_LEN],
    pub fw_version: u32,
    pub message: &'a [u8],
    pub firmware: &'a [u8],
}

/// Total size of the sealed image for a firmware of the given length.
pub const fn sealed_len(firmware_len: usize) -> usize {
    METADATA_BLOB_LEN
        + FLASH_PAGE_SIZE
        + padded_firmware_len(firmware_len as u32) as usize
        + SIGNATURE_LEN
}

/// Seals a firmware release into `out`, returning the number of bytes
/// written. Unused message-page and firmware-padding bytes are filled with
/// the erased-flash value before encryption.
pub fn seal(req: &SealRequest, out: &mut [u8]) -> Result<usize, Error> {
    if req.message.len() > FLASH_PAGE_SIZE {
        return Err(Error::MessageTooLong);
    }
    let fw_length = u32::try_from(req.firmware.len()).map_err(|_| Error::FirmwareTooLarge)?;
    let padded = padded_firmware_len(fw_length) as usize;
    let max_fw = (consts::PART_PAGES as usize - 3) * FLASH_PAGE_SIZE;
    if padded > max_fw {
        return Err(Error::FirmwareTooLarge);
    }
    let total = sealed_len(req.firmware.len());
    if out.len() < total {
        return Err(Error::BufferTooSmall);
    }

    let metadata = Metadata {
        fw_version: req.fw_version,
        fw_length,
        message_length: req.message.len() as u32,
        reserved: 0,
    };
    let tag = crypto::metadata_tag(req.hmac_key, &metadata.to_bytes());
    let mut cipher = ImageCipher::new(req.decrypt_key, &req.iv);

    // Metadata blob.
    out[..IV_LEN].copy_from_slice(&req.iv);
    let enc_meta = &mut out[IV_LEN..IV_LEN + METADATA_LEN];
    enc_meta.copy_from_slice(&metadata.to_bytes());
    cipher.apply(enc_meta);
    out[IV_LEN + METADATA_LEN..METADATA_BLOB_LEN].copy_from_slice(&tag);

    // Message page, always one full page.
    let msg_page = &mut out[METADATA_BLOB_LEN..METADATA_BLOB_LEN + FLASH_PAGE_SIZE];
    msg_page.fill(0xFF);
    msg_page[..req.message.len()].copy_from_slice(req.message);
    cipher.apply(msg_page);

    // Firmware, padded to the cipher block size.
    let fw_start = METADATA_BLOB_LEN + FLASH_PAGE_SIZE;
    let fw_region = &mut out[fw_start..fw_start + padded];
    fw_region.fill(0xFF);
    fw_region[..req.firmware.len()].copy_from_slice(req.firmware);
    cipher.apply(fw_region);

    // Trailing digest over everything after the IV.
    let mut digest = StreamDigest::new(req.hmac_key);
    digest.update(&out[IV_LEN..total - SIGNATURE_LEN]);
    let signature = digest.finalize();
    out[total - SIGNATURE_LEN..total].copy_from_slice(&signature);

    Ok(total)
}

fn le_u32(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    BlobTruncated,
    BufferTooSmall,
    FirmwareTooLarge,
    FrameTooLong,
    ImageTruncated,
    MessageTooLong,
    MetadataTruncated,
    TagMismatch,
    UnalignedStream,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BlobTruncated => write!(f, "metadata blob truncated"),
            Self::BufferTooSmall => write!(f, "output buffer too small"),
            Self::FirmwareTooLarge => write!(f, "firmware does not fit a partition"),
            Self::FrameTooLong => write!(f, "frame payload over the maximum"),
            Self::ImageTruncated => write!(f, "sealed image truncated"),
            Self::MessageTooLong => write!(f, "release message over one page"),
            Self::MetadataTruncated => write!(f, "metadata record truncated"),
            Self::TagMismatch => write!(f, "metadata authentication tag mismatch"),
            Self::UnalignedStream => write!(f, "ciphertext stream not block aligned"),
        }
    }
}
