// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The top-level command loop.
//!
//! This is the only module that turns an [`Error`] into a hardware reset.
//! Everything below it reports failures through `Result` and stays
//! testable; the loop prints a diagnostic over the link and resets.

use crate::boot::BootContext;
use crate::hal::{FlashDevice, KvStore, SerialLink, SystemControl};
use crate::secrets::{self, SecretMaterial};
use crate::update::UpdateSession;
use crate::vault::Vault;
use crate::Error;
use consts::{CMD_BOOT, CMD_UPDATE};
use heapless::String;

pub struct Device<L, F, K, S> {
    pub link: L,
    pub flash: F,
    pub kv: K,
    pub sys: S,
}

impl<L, F, K, S> Device<L, F, K, S>
where
    L: SerialLink,
    F: FlashDevice,
    K: KvStore,
    S: SystemControl,
{
    /// Runs the device forever. `fw_ram` is the RAM execution region the
    /// boot path decrypts firmware into before jumping.
    pub fn run(mut self, fw_ram: &mut [u8]) -> ! {
        // One-time migration of factory keys out of flash. A reset after
        // migration makes the erased provisioning page the state every
        // later power-up sees.
        match secrets::provision(&mut self.flash, &mut self.kv) {
            Ok(true) => {
                self.link.write(b"secrets installed\n");
                self.sys.reset()
            }
            Ok(false) => {}
            Err(err) => self.fail(err),
        }

        match Vault::read(&self.kv) {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(err) = Vault::first_boot().write(&mut self.kv) {
                    self.fail(err)
                }
            }
            Err(err) => self.fail(err),
        }

        let secrets = match SecretMaterial::load(&self.kv) {
            Ok(secrets) => secrets,
            Err(err) => self.fail(err),
        };

        self.link.write(b"Vehicle update service ready\n");
        self.link.write(b"Send 'U' to update or 'B' to boot\n");

        loop {
            match self.link.read_byte() {
                CMD_UPDATE => {
                    self.link.write(&[CMD_UPDATE]);
                    let session =
                        UpdateSession::new(&mut self.link, &mut self.flash, &mut self.kv, &secrets);
                    match session.run() {
                        Ok(()) => {
                            self.link.write(b"update installed\n");
                            self.sys.reset()
                        }
                        Err(err) => self.fail(err),
                    }
                }
                CMD_BOOT => {
                    self.link.write(&[CMD_BOOT]);
                    let boot = BootContext::new(&mut self.link, &self.flash, &self.kv, &secrets);
                    match boot.run(fw_ram) {
                        Ok(plan) => self.sys.launch(plan),
                        Err(err) => self.fail(err),
                    }
                }
                _ => {}
            }
        }
    }

    fn fail(&mut self, err: Error) -> ! {
        let mut line: String<128> = String::new();
        // A diagnostic too long for the buffer is dropped, not truncated
        // mid-escape; the reset happens either way.
        if core::fmt::write(&mut line, format_args!("error: {err}\n")).is_ok() {
            self.link.write(line.as_bytes());
        }
        self.sys.reset()
    }
}
