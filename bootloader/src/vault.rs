// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The trust vault: the durable record naming which partition holds the
//! trusted firmware, the version floor and the installed lengths.
//!
//! The vault is the single source of truth for boot decisions. It is only
//! rewritten after a full image has been stored and its signature checked,
//! so a torn update leaves the previous record pointing at the old
//! partition.

use crate::hal::KvStore;
use crate::partition::Partition;
use crate::Error;
use consts::{VAULT_MAGIC, VAULT_OFFSET};

/// Which partition the vault trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivePartition {
    A,
    B,
}

impl ActivePartition {
    /// The partition the next update writes into.
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    pub fn partition(self) -> Partition {
        match self {
            Self::A => Partition::a(),
            Self::B => Partition::b(),
        }
    }
}

/// The durable trust record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vault {
    /// `None` until the first update completes; boot is refused while unset.
    pub active: Option<ActivePartition>,
    /// Version floor for incoming updates and the version of the installed
    /// firmware.
    pub fw_version: u32,
    pub fw_length: u32,
    pub message_length: u32,
}

const STATUS_NONE: u32 = 0;
const STATUS_A: u32 = 1;
const STATUS_B: u32 = 2;

impl Vault {
    pub const RECORD_LEN: usize = 20;

    /// The record installed on a device that has never taken an update.
    /// The floor of 1 rejects version-0 images until a real release has
    /// established a version to inherit.
    pub fn first_boot() -> Self {
        Self {
            active: None,
            fw_version: 1,
            fw_length: 0,
            message_length: 0,
        }
    }

    /// Loads the record, or `None` if the store holds no valid magic.
    pub fn read<K: KvStore>(kv: &K) -> Result<Option<Self>, Error> {
        let mut raw = [0u8; Self::RECORD_LEN];
        kv.read(VAULT_OFFSET, &mut raw)?;
        if le_u32(&raw[0..4]) != VAULT_MAGIC {
            return Ok(None);
        }
        let active = match le_u32(&raw[4..8]) {
            STATUS_NONE => None,
            STATUS_A => Some(ActivePartition::A),
            STATUS_B => Some(ActivePartition::B),
            _ => return Err(Error::VaultCorrupt),
        };
        Ok(Some(Self {
            active,
            fw_version: le_u32(&raw[8..12]),
            fw_length: le_u32(&raw[12..16]),
            message_length: le_u32(&raw[16..20]),
        }))
    }

    /// Writes the record and verifies it by reading it back, retrying the
    /// write once. A record that still reads back wrong is fatal.
    pub fn write<K: KvStore>(&self, kv: &mut K) -> Result<(), Error> {
        let raw = self.to_bytes();
        for _ in 0..2 {
            kv.write(VAULT_OFFSET, &raw)?;
            let mut check = [0u8; Self::RECORD_LEN];
            kv.read(VAULT_OFFSET, &mut check)?;
            if check == raw {
                return Ok(());
            }
        }
        Err(Error::VaultWrite)
    }

    fn to_bytes(&self) -> [u8; Self::RECORD_LEN] {
        let status = match self.active {
            None => STATUS_NONE,
            Some(ActivePartition::A) => STATUS_A,
            Some(ActivePartition::B) => STATUS_B,
        };
        let mut out = [0u8; Self::RECORD_LEN];
        out[0..4].copy_from_slice(&VAULT_MAGIC.to_le_bytes());
        out[4..8].copy_from_slice(&status.to_le_bytes());
        out[8..12].copy_from_slice(&self.fw_version.to_le_bytes());
        out[12..16].copy_from_slice(&self.fw_length.to_le_bytes());
        out[16..20].copy_from_slice(&self.message_length.to_le_bytes());
        out
    }
}

fn le_u32(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}
