// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device-side secure update and secure boot logic.
//!
//! Everything here is written against the narrow hardware seams in [`hal`],
//! so the update session, boot sequence and vault run unchanged on the
//! device and under test. Fallible operations return [`Error`]; the single
//! place that turns an error into a hardware reset is the command loop in
//! [`device`].

#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod device;
pub mod flash;
pub mod frame;
pub mod hal;
pub mod partition;
pub mod secrets;
pub mod update;
pub mod vault;

pub use boot::{BootContext, LaunchPlan};
pub use device::Device;
pub use secrets::SecretMaterial;
pub use update::UpdateSession;
pub use vault::{ActivePartition, Vault};

/// Everything that can stop an update or boot sequence.
///
/// Any of these reaching the command loop halts the device via reset;
/// there is no recoverable variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Frame declared a payload longer than the receive buffer.
    FrameTooLong,
    /// Transport checksum did not match the payload.
    ChecksumMismatch,
    /// First update frame was not exactly one metadata blob.
    MetadataFrameLength,
    /// Incoming version is below the vault's floor.
    RollbackRejected { incoming: u32, floor: u32 },
    /// Firmware does not fit the partition's firmware pages.
    FirmwareTooLarge,
    /// Release message does not fit the message page.
    MessageTooLong,
    /// A data frame arrived after the short chunk that ends the stream.
    TrailingFrame,
    /// Stream writes would run past the partition's firmware region.
    PartitionOverflow,
    /// Trailing digest did not match the received or stored signature.
    SignatureMismatch,
    /// Vault names no trusted partition; boot is refused.
    NoTrustedImage,
    /// Decrypted metadata version disagrees with the vault.
    VersionDisagreement { metadata: u32, vault: u32 },
    /// Decrypted firmware does not fit the RAM execution region.
    ExecRegionOverflow,
    /// Vault record has a valid magic but undecodable fields.
    VaultCorrupt,
    /// Vault write failed its read-back check after a retry.
    VaultWrite,
    /// Page write with a misaligned address or oversized buffer.
    FlashBounds,
    FlashErase,
    FlashProgram,
    KvRead,
    KvWrite,
    /// Sealed-image format error.
    Seal(fwseal::Error),
}

impl From<fwseal::Error> for Error {
    fn from(err: fwseal::Error) -> Self {
        Self::Seal(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FrameTooLong => write!(f, "frame size too big"),
            Self::ChecksumMismatch => write!(f, "frame checksum mismatch"),
            Self::MetadataFrameLength => write!(f, "expected a metadata blob frame"),
            Self::RollbackRejected { incoming, floor } => {
                write!(f, "version {incoming} below floor {floor}")
            }
            Self::FirmwareTooLarge => write!(f, "firmware too large for partition"),
            Self::MessageTooLong => write!(f, "message too long for message page"),
            Self::TrailingFrame => write!(f, "data after final chunk"),
            Self::PartitionOverflow => write!(f, "write past partition end"),
            Self::SignatureMismatch => write!(f, "image signature mismatch"),
            Self::NoTrustedImage => write!(f, "no trusted firmware installed"),
            Self::VersionDisagreement { metadata, vault } => {
                write!(f, "metadata version {metadata} disagrees with vault {vault}")
            }
            Self::ExecRegionOverflow => write!(f, "firmware too large for exec region"),
            Self::VaultCorrupt => write!(f, "vault record corrupt"),
            Self::VaultWrite => write!(f, "vault write failed"),
            Self::FlashBounds => write!(f, "flash write out of bounds"),
            Self::FlashErase => write!(f, "flash erase failed"),
            Self::FlashProgram => write!(f, "flash program failed"),
            Self::KvRead => write!(f, "persistent store read failed"),
            Self::KvWrite => write!(f, "persistent store write failed"),
            Self::Seal(e) => write!(f, "{e}"),
        }
    }
}
