// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host-side companion to the device update service.
//!
//! `gen-secrets` creates the per-device keys, `protect` seals a firmware
//! release into an encrypted and authenticated image, and `update` pushes
//! a sealed image to a device over its serial port, frame by frame,
//! pacing on the device's acknowledgments.

mod args;


use args::{Args, Command};
use clap::Parser;
use consts::{
    ACK, CMD_UPDATE, DECRYPT_KEY_LEN, FLASH_PAGE_SIZE, HMAC_KEY_LEN, IV_LEN, MAX_FRAME_PAYLOAD,
    SECRETS_MAGIC,
};
use fwseal::{sealed_len, SealRequest, SealedImage};
use rand::RngCore;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

fn main() {
    pretty_env_logger::init();
    if let Err(err) = run(Args::parse()) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Error> {
    match args.command {
        Command::GenSecrets {
            out,
            provision_block,
        } => {
            let keys = Keys::generate();
            keys.write(&out)?;
            log::info!("wrote keyfile to {}", out.display());
            if let Some(path) = provision_block {
                fs::write(&path, keys.provision_block())?;
                log::info!("wrote provisioning block to {}", path.display());
            }
            Ok(())
        }
        Command::Protect {
            firmware,
            version,
            message,
            secrets,
            out,
        } => {
            let keys = Keys::read(&secrets)?;
            let firmware = fs::read(&firmware)?;
            let mut iv = [0u8; IV_LEN];
            rand::thread_rng().fill_bytes(&mut iv);
            let image = seal_image(&keys, iv, version, message.as_bytes(), &firmware)?;
            fs::write(&out, &image)?;
            log::info!(
                "sealed {} firmware bytes as version {version} into {}",
                firmware.len(),
                out.display()
            );
            Ok(())
        }
        Command::Update { image, port, baud } => {
            let image = fs::read(&image)?;
            // Generous timeout: the device erases a flash page before
            // acknowledging each chunk.
            let mut port = serialport::new(&port, baud)
                .timeout(Duration::from_secs(5))
                .open()?;
            stream_image(&mut port, &image)?;
            log::info!("device acknowledged the update");
            Ok(())
        }
    }
}

/// The two device keys, kept in a keyfile of two hex lines.
struct Keys {
    decrypt_key: [u8; DECRYPT_KEY_LEN],
    hmac_key: [u8; HMAC_KEY_LEN],
}

impl Keys {
    fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut decrypt_key = [0u8; DECRYPT_KEY_LEN];
        rng.fill_bytes(&mut decrypt_key);
        let mut hmac_key = [0u8; HMAC_KEY_LEN];
        rng.fill_bytes(&mut hmac_key);
        Self {
            decrypt_key,
            hmac_key,
        }
    }

    fn write(&self, path: &Path) -> Result<(), Error> {
        let text = format!(
            "{}\n{}\n",
            hex::encode(self.decrypt_key),
            hex::encode(self.hmac_key)
        );
        fs::write(path, text)?;
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)?;
        let mut lines = text.lines();
        let decrypt_key = decode_key::<DECRYPT_KEY_LEN>(lines.next())?;
        let hmac_key = decode_key::<HMAC_KEY_LEN>(lines.next())?;
        Ok(Self {
            decrypt_key,
            hmac_key,
        })
    }

    /// One flash page for factory provisioning: magic word, both keys,
    /// erased-flash filler.
    fn provision_block(&self) -> [u8; FLASH_PAGE_SIZE] {
        let mut page = [0xFFu8; FLASH_PAGE_SIZE];
        page[..4].copy_from_slice(&SECRETS_MAGIC.to_le_bytes());
        page[4..4 + DECRYPT_KEY_LEN].copy_from_slice(&self.decrypt_key);
        page[4 + DECRYPT_KEY_LEN..4 + DECRYPT_KEY_LEN + HMAC_KEY_LEN]
            .copy_from_slice(&self.hmac_key);
        page
    }
}

fn decode_key<const N: usize>(line: Option<&str>) -> Result<[u8; N], Error> {
    let raw = hex::decode(line.ok_or(Error::KeyfileFormat)?.trim())?;
    raw.try_into().map_err(|_| Error::KeyfileFormat)
}

fn seal_image(
    keys: &Keys,
    iv: [u8; IV_LEN],
    version: u32,
    message: &[u8],
    firmware: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut out = vec![0u8; sealed_len(firmware.len())];
    let n = fwseal::seal(
        &SealRequest {
            decrypt_key: &keys.decrypt_key,
            hmac_key: &keys.hmac_key,
            iv,
            fw_version: version,
            message,
            firmware,
        },
        &mut out,
    )?;
    out.truncate(n);
    Ok(out)
}

/// Drives one update session over any byte-stream port.
///
/// The device echoes the update command, then acknowledges the metadata
/// frame, every stream chunk and the final commit. The signature follows
/// the end-of-stream frame raw.
fn stream_image<P: Read + Write>(port: &mut P, image: &[u8]) -> Result<(), Error> {
    let parsed = SealedImage::parse(image)?;

    port.write_all(&[CMD_UPDATE])?;
    wait_for(port, CMD_UPDATE)?;

    send_frame(port, &parsed.blob.to_bytes())?;
    wait_for(port, ACK)?;

    for (i, chunk) in parsed.stream.chunks(MAX_FRAME_PAYLOAD).enumerate() {
        send_frame(port, chunk)?;
        wait_for(port, ACK)?;
        log::debug!("chunk {i} acknowledged ({} bytes)", chunk.len());
    }

    send_frame(port, &[])?;
    port.write_all(&parsed.signature)?;
    wait_for(port, ACK)
}

fn send_frame<P: Write>(port: &mut P, payload: &[u8]) -> Result<(), Error> {
    let mut frame = vec![0u8; payload.len() + fwseal::frame::OVERHEAD];
    let n = fwseal::frame::encode(payload, &mut frame)?;
    port.write_all(&frame[..n])?;
    Ok(())
}

/// Discards bytes until `expected` arrives. The device interleaves human
/// readable status lines with protocol bytes on the same link.
fn wait_for<P: Read>(port: &mut P, expected: u8) -> Result<(), Error> {
    loop {
        let mut byte = [0u8; 1];
        port.read_exact(&mut byte)?;
        if byte[0] == expected {
            return Ok(());
        }
    }
}

#[derive(Debug)]
enum Error {
    Io(std::io::Error),
    Hex(hex::FromHexError),
    Seal(fwseal::Error),
    Serial(serialport::Error),
    KeyfileFormat,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Self::Hex(err)
    }
}

impl From<fwseal::Error> for Error {
    fn from(err: fwseal::Error) -> Self {
        Self::Seal(err)
    }
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        Self::Serial(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Hex(err) => write!(f, "keyfile is not valid hex: {err}"),
            Self::Seal(err) => write!(f, "{err}"),
            Self::Serial(err) => write!(f, "serial port: {err}"),
            Self::KeyfileFormat => write!(f, "keyfile must hold two hex key lines"),
        }
    }
}

impl std::error::Error for Error {}
