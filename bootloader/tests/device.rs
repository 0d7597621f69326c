// SPDX-FileCopyrightText: 2026 Vehicle Update Service contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end tests over in-memory hardware fakes: full update sessions,
//! boot verification and the command loop.

use bootloader::hal::{FlashDevice, KvStore, SerialLink, SystemControl};
use bootloader::{
    ActivePartition, BootContext, Device, Error, LaunchPlan, SecretMaterial, UpdateSession, Vault,
};
use consts::{
    ACK, CMD_BOOT, CMD_UPDATE, EXEC_REGION_BASE, EXEC_REGION_SIZE, FLASH_PAGE_SIZE,
    MAX_FRAME_PAYLOAD, METADATA_BLOB_LEN, SECRETS_OFFSET, SIGNATURE_LEN,
};
use fwseal::crypto::{metadata_tag, ImageCipher};
use fwseal::{sealed_len, Metadata, SealRequest, SealedImage};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const DECRYPT_KEY: [u8; 16] = [0x42; 16];
const HMAC_KEY: [u8; 16] = [0x17; 16];

struct ScriptLink {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl ScriptLink {
    fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }
}

impl SerialLink for ScriptLink {
    fn read_byte(&mut self) -> u8 {
        self.input.pop_front().expect("script exhausted")
    }

    fn write(&mut self, data: &[u8]) {
        self.output.extend_from_slice(data);
    }
}

struct RamFlash {
    bytes: Vec<u8>,
    erased_pages: Vec<u32>,
}

impl RamFlash {
    fn new() -> Self {
        Self {
            bytes: vec![0xFF; 300 * FLASH_PAGE_SIZE],
            erased_pages: Vec::new(),
        }
    }
}

impl FlashDevice for RamFlash {
    fn erase_page(&mut self, page_addr: u32) -> Result<(), Error> {
        self.erased_pages.push(page_addr);
        let base = page_addr as usize;
        self.bytes[base..base + FLASH_PAGE_SIZE].fill(0xFF);
        Ok(())
    }

    fn program_words(&mut self, addr: u32, words: &[u32]) -> Result<(), Error> {
        let mut addr = addr as usize;
        for word in words {
            self.bytes[addr..addr + 4].copy_from_slice(&word.to_le_bytes());
            addr += 4;
        }
        Ok(())
    }

    fn read(&self, addr: u32, out: &mut [u8]) {
        let addr = addr as usize;
        out.copy_from_slice(&self.bytes[addr..addr + out.len()]);
    }
}

struct RamKv {
    cells: Vec<u8>,
}

impl RamKv {
    fn new() -> Self {
        Self {
            cells: vec![0xFF; 0x800],
        }
    }
}

impl KvStore for RamKv {
    fn read(&self, offset: u32, out: &mut [u8]) -> Result<(), Error> {
        let offset = offset as usize;
        out.copy_from_slice(&self.cells[offset..offset + out.len()]);
        Ok(())
    }

    fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), Error> {
        let offset = offset as usize;
        self.cells[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// Panics instead of diverging so tests can observe which exit was taken.
struct PanicSys;

impl SystemControl for PanicSys {
    fn reset(&mut self) -> ! {
        panic!("reset");
    }

    fn launch(&mut self, plan: LaunchPlan) -> ! {
        panic!("launch {:#x} {:#x}", plan.stack_top, plan.entry);
    }
}

/// Mirrors everything written to the link into a buffer that survives the
/// panic used to exit the command loop.
struct TeeLink {
    inner: ScriptLink,
    captured: Arc<Mutex<Vec<u8>>>,
}

impl SerialLink for TeeLink {
    fn read_byte(&mut self) -> u8 {
        self.inner.read_byte()
    }

    fn write(&mut self, data: &[u8]) {
        self.captured.lock().unwrap().extend_from_slice(data);
    }
}

/// Flash and store with keys already provisioned, as after the one-time
/// migration.
fn provisioned() -> (RamFlash, RamKv, SecretMaterial) {
    let mut kv = RamKv::new();
    let mut raw = [0u8; 32];
    raw[..16].copy_from_slice(&DECRYPT_KEY);
    raw[16..].copy_from_slice(&HMAC_KEY);
    kv.write(SECRETS_OFFSET, &raw).unwrap();
    let secrets = SecretMaterial::load(&kv).unwrap();
    (RamFlash::new(), kv, secrets)
}

fn seal(version: u32, message: &[u8], firmware: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; 16];
    for (i, b) in iv.iter_mut().enumerate() {
        *b = version as u8 ^ i as u8;
    }
    let mut out = vec![0u8; sealed_len(firmware.len())];
    let n = fwseal::seal(
        &SealRequest {
            decrypt_key: &DECRYPT_KEY,
            hmac_key: &HMAC_KEY,
            iv,
            fw_version: version,
            message,
            firmware,
        },
        &mut out,
    )
    .unwrap();
    out.truncate(n);
    out
}

fn framed(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; payload.len() + fwseal::frame::OVERHEAD];
    let n = fwseal::frame::encode(payload, &mut out).unwrap();
    out.truncate(n);
    out
}

/// Serializes a sealed image into the byte sequence an update host sends
/// after the command echo: framed blob, framed stream chunks, end frame,
/// raw signature.
fn wire(image: &[u8]) -> Vec<u8> {
    let parsed = SealedImage::parse(image).unwrap();
    let mut out = framed(&parsed.blob.to_bytes());
    for chunk in parsed.stream.chunks(MAX_FRAME_PAYLOAD) {
        out.extend_from_slice(&framed(chunk));
    }
    out.extend_from_slice(&framed(&[]));
    out.extend_from_slice(&parsed.signature);
    out
}

fn run_update(
    flash: &mut RamFlash,
    kv: &mut RamKv,
    secrets: &SecretMaterial,
    wire_bytes: &[u8],
) -> (Result<(), Error>, Vec<u8>) {
    let mut link = ScriptLink::new(wire_bytes);
    let result = UpdateSession::new(&mut link, flash, kv, secrets).run();
    (result, link.output)
}

/// Encrypts, tags and frames a metadata record directly, for tests that
/// need a well-formed blob whose claims a real sealer would refuse.
fn forged_metadata_frame(metadata: &Metadata) -> Vec<u8> {
    let iv = [9u8; 16];
    let tag = metadata_tag(&HMAC_KEY, &metadata.to_bytes());
    let mut enc = metadata.to_bytes();
    ImageCipher::new(&DECRYPT_KEY, &iv).apply(&mut enc);
    let mut blob = [0u8; METADATA_BLOB_LEN];
    blob[..16].copy_from_slice(&iv);
    blob[16..32].copy_from_slice(&enc);
    blob[32..].copy_from_slice(&tag);
    framed(&blob)
}

#[test]
fn fresh_update_installs_into_partition_a() {
    let (mut flash, mut kv, secrets) = provisioned();
    let firmware = [0xC3u8; 100];
    let image = seal(3, b"hello", &firmware);

    let (result, output) = run_update(&mut flash, &mut kv, &secrets, &wire(&image));
    assert_eq!(result, Ok(()));

    let vault = Vault::read(&kv).unwrap().unwrap();
    assert_eq!(vault.active, Some(ActivePartition::A));
    assert_eq!(vault.fw_version, 3);
    assert_eq!(vault.fw_length, 100);
    assert_eq!(vault.message_length, 5);

    // One ack for the metadata page, one per stream chunk (1024-byte
    // message page plus the 112-byte padded firmware), one for commit.
    assert_eq!(output, vec![ACK; 4]);
}

#[test]
fn boot_recovers_the_installed_release() {
    let (mut flash, mut kv, secrets) = provisioned();
    let firmware: Vec<u8> = (0..2000u32).map(|i| i as u8).collect();
    let image = seal(3, b"release notes", &firmware);
    run_update(&mut flash, &mut kv, &secrets, &wire(&image))
        .0
        .unwrap();

    let mut link = ScriptLink::new(&[]);
    let mut fw_ram = vec![0u8; EXEC_REGION_SIZE as usize];
    let plan = BootContext::new(&mut link, &flash, &kv, &secrets)
        .run(&mut fw_ram)
        .unwrap();

    assert_eq!(plan.stack_top, EXEC_REGION_BASE + EXEC_REGION_SIZE);
    assert_eq!(plan.entry, EXEC_REGION_BASE | 1);
    assert_eq!(link.output, b"release notes");
    assert_eq!(&fw_ram[..firmware.len()], &firmware[..]);
}

#[test]
fn consecutive_updates_alternate_partitions() {
    let (mut flash, mut kv, secrets) = provisioned();
    let first = seal(3, b"v3", &[0xAA; 64]);
    let second = seal(4, b"v4", &[0xBB; 64]);

    run_update(&mut flash, &mut kv, &secrets, &wire(&first))
        .0
        .unwrap();
    run_update(&mut flash, &mut kv, &secrets, &wire(&second))
        .0
        .unwrap();

    let vault = Vault::read(&kv).unwrap().unwrap();
    assert_eq!(vault.active, Some(ActivePartition::B));
    assert_eq!(vault.fw_version, 4);

    // Boot must pick up the second release from partition B.
    let mut link = ScriptLink::new(&[]);
    let mut fw_ram = vec![0u8; EXEC_REGION_SIZE as usize];
    BootContext::new(&mut link, &flash, &kv, &secrets)
        .run(&mut fw_ram)
        .unwrap();
    assert_eq!(link.output, b"v4");
    assert_eq!(&fw_ram[..64], &[0xBB; 64]);
}

#[test]
fn rollback_below_the_floor_is_rejected_before_any_write() {
    let (mut flash, mut kv, secrets) = provisioned();
    run_update(&mut flash, &mut kv, &secrets, &wire(&seal(4, b"v4", &[1; 32])))
        .0
        .unwrap();
    let vault_before = Vault::read(&kv).unwrap();
    let erases_before = flash.erased_pages.len();

    let stale = seal(3, b"v3", &[2; 32]);
    let (result, output) = run_update(&mut flash, &mut kv, &secrets, &wire(&stale));
    assert_eq!(
        result,
        Err(Error::RollbackRejected {
            incoming: 3,
            floor: 4
        })
    );
    assert!(output.is_empty());
    assert_eq!(flash.erased_pages.len(), erases_before);
    assert_eq!(Vault::read(&kv).unwrap(), vault_before);
}

#[test]
fn equal_version_reinstalls() {
    let (mut flash, mut kv, secrets) = provisioned();
    run_update(&mut flash, &mut kv, &secrets, &wire(&seal(4, b"a", &[1; 32])))
        .0
        .unwrap();
    let (result, _) = run_update(&mut flash, &mut kv, &secrets, &wire(&seal(4, b"b", &[2; 32])));
    assert_eq!(result, Ok(()));
    let vault = Vault::read(&kv).unwrap().unwrap();
    assert_eq!(vault.active, Some(ActivePartition::B));
    assert_eq!(vault.fw_version, 4);
}

#[test]
fn version_zero_installs_but_inherits_the_floor() {
    let (mut flash, mut kv, secrets) = provisioned();
    run_update(&mut flash, &mut kv, &secrets, &wire(&seal(4, b"v4", &[1; 32])))
        .0
        .unwrap();

    let debug = seal(0, b"debug build", &[0xD0; 48]);
    let (result, _) = run_update(&mut flash, &mut kv, &secrets, &wire(&debug));
    assert_eq!(result, Ok(()));

    let vault = Vault::read(&kv).unwrap().unwrap();
    assert_eq!(vault.active, Some(ActivePartition::B));
    assert_eq!(vault.fw_version, 4);

    // The installed debug build still boots and verifies.
    let mut link = ScriptLink::new(&[]);
    let mut fw_ram = vec![0u8; EXEC_REGION_SIZE as usize];
    BootContext::new(&mut link, &flash, &kv, &secrets)
        .run(&mut fw_ram)
        .unwrap();
    assert_eq!(link.output, b"debug build");
}

#[test]
fn corrupted_signature_leaves_the_vault_untouched() {
    let (mut flash, mut kv, secrets) = provisioned();
    run_update(&mut flash, &mut kv, &secrets, &wire(&seal(4, b"v4", &[1; 32])))
        .0
        .unwrap();
    let vault_before = Vault::read(&kv).unwrap();

    let mut bytes = wire(&seal(5, b"v5", &[2; 32]));
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    let (result, _) = run_update(&mut flash, &mut kv, &secrets, &bytes);
    assert_eq!(result, Err(Error::SignatureMismatch));
    assert_eq!(Vault::read(&kv).unwrap(), vault_before);

    // The previous release still boots cleanly.
    let mut link = ScriptLink::new(&[]);
    let mut fw_ram = vec![0u8; EXEC_REGION_SIZE as usize];
    BootContext::new(&mut link, &flash, &kv, &secrets)
        .run(&mut fw_ram)
        .unwrap();
    assert_eq!(link.output, b"v4");
}

#[test]
fn tampered_metadata_tag_is_rejected_before_any_flash_write() {
    let (mut flash, mut kv, secrets) = provisioned();
    let image = seal(3, b"x", &[1; 32]);
    let parsed = SealedImage::parse(&image).unwrap();

    let mut blob = parsed.blob.to_bytes();
    blob[METADATA_BLOB_LEN - 1] ^= 0x80;
    let (result, output) = run_update(&mut flash, &mut kv, &secrets, &framed(&blob));

    assert_eq!(result, Err(Error::Seal(fwseal::Error::TagMismatch)));
    assert!(output.is_empty());
    assert!(flash.erased_pages.is_empty());
    assert_eq!(Vault::read(&kv).unwrap(), None);
}

#[test]
fn data_after_a_short_chunk_is_fatal() {
    let (mut flash, mut kv, secrets) = provisioned();
    let image = seal(3, b"m", &[1; 32]);
    let parsed = SealedImage::parse(&image).unwrap();

    // Split the stream so a data frame follows a short one.
    let mut bytes = framed(&parsed.blob.to_bytes());
    bytes.extend_from_slice(&framed(&parsed.stream[..16]));
    bytes.extend_from_slice(&framed(&parsed.stream[16..32]));

    let (result, _) = run_update(&mut flash, &mut kv, &secrets, &bytes);
    assert_eq!(result, Err(Error::TrailingFrame));
}

#[test]
fn first_frame_must_be_exactly_one_metadata_blob() {
    let (mut flash, mut kv, secrets) = provisioned();
    let (result, _) = run_update(&mut flash, &mut kv, &secrets, &framed(&[0u8; 16]));
    assert_eq!(result, Err(Error::MetadataFrameLength));
}

#[test]
fn metadata_claiming_oversized_firmware_is_rejected() {
    let (mut flash, mut kv, secrets) = provisioned();
    let frame = forged_metadata_frame(&Metadata {
        fw_version: 5,
        fw_length: 76 * FLASH_PAGE_SIZE as u32,
        message_length: 0,
        reserved: 0,
    });
    let (result, _) = run_update(&mut flash, &mut kv, &secrets, &frame);
    assert_eq!(result, Err(Error::FirmwareTooLarge));
    assert!(flash.erased_pages.is_empty());
}

#[test]
fn metadata_with_near_maximal_length_cannot_wrap_past_the_size_gate() {
    let (mut flash, mut kv, secrets) = provisioned();
    // Padding a length this close to u32::MAX would overflow a naive
    // round-up; the session must still see it as oversized.
    let frame = forged_metadata_frame(&Metadata {
        fw_version: 5,
        fw_length: u32::MAX - 3,
        message_length: 0,
        reserved: 0,
    });
    let (result, _) = run_update(&mut flash, &mut kv, &secrets, &frame);
    assert_eq!(result, Err(Error::FirmwareTooLarge));
    assert!(flash.erased_pages.is_empty());
}

#[test]
fn metadata_claiming_oversized_message_is_rejected() {
    let (mut flash, mut kv, secrets) = provisioned();
    let frame = forged_metadata_frame(&Metadata {
        fw_version: 5,
        fw_length: 16,
        message_length: FLASH_PAGE_SIZE as u32 + 1,
        reserved: 0,
    });
    let (result, _) = run_update(&mut flash, &mut kv, &secrets, &frame);
    assert_eq!(result, Err(Error::MessageTooLong));
}

#[test]
fn largest_firmware_fills_the_partition() {
    let (mut flash, mut kv, secrets) = provisioned();
    let max = 75 * FLASH_PAGE_SIZE;
    let image = seal(1, b"", &vec![0u8; max]);
    let (result, _) = run_update(&mut flash, &mut kv, &secrets, &wire(&image));
    assert_eq!(result, Ok(()));

    let err = fwseal::seal(
        &SealRequest {
            decrypt_key: &DECRYPT_KEY,
            hmac_key: &HMAC_KEY,
            iv: [0; 16],
            fw_version: 2,
            message: b"",
            firmware: &vec![0u8; max + 1],
        },
        &mut vec![0u8; sealed_len(max + 1)],
    )
    .unwrap_err();
    assert_eq!(err, fwseal::Error::FirmwareTooLarge);
}

#[test]
fn stream_longer_than_the_metadata_claims_is_fatal() {
    let (mut flash, mut kv, secrets) = provisioned();
    // Block-aligned firmware so every legitimate chunk is full-sized and
    // an extra full frame is the first thing past the firmware region.
    let image = seal(2, b"m", &[3u8; FLASH_PAGE_SIZE]);
    let parsed = SealedImage::parse(&image).unwrap();

    let mut bytes = framed(&parsed.blob.to_bytes());
    for chunk in parsed.stream.chunks(MAX_FRAME_PAYLOAD) {
        bytes.extend_from_slice(&framed(chunk));
    }
    bytes.extend_from_slice(&framed(&[0u8; MAX_FRAME_PAYLOAD]));

    let (result, _) = run_update(&mut flash, &mut kv, &secrets, &bytes);
    assert_eq!(result, Err(Error::PartitionOverflow));
}

#[test]
fn boot_is_refused_until_an_update_has_completed() {
    let (flash, mut kv, secrets) = provisioned();
    let mut fw_ram = vec![0u8; EXEC_REGION_SIZE as usize];

    let mut link = ScriptLink::new(&[]);
    let result = BootContext::new(&mut link, &flash, &kv, &secrets).run(&mut fw_ram);
    assert_eq!(result, Err(Error::NoTrustedImage));

    // Same answer once the first-boot record exists but names no partition.
    Vault::first_boot().write(&mut kv).unwrap();
    let mut link = ScriptLink::new(&[]);
    let result = BootContext::new(&mut link, &flash, &kv, &secrets).run(&mut fw_ram);
    assert_eq!(result, Err(Error::NoTrustedImage));
    assert!(link.output.is_empty());
}

#[test]
fn signature_page_is_stored_for_later_boots() {
    let (mut flash, mut kv, secrets) = provisioned();
    let image = seal(3, b"m", &[7; 100]);
    run_update(&mut flash, &mut kv, &secrets, &wire(&image))
        .0
        .unwrap();

    let parsed = SealedImage::parse(&image).unwrap();
    let vault = Vault::read(&kv).unwrap().unwrap();
    let partition = vault.active.unwrap().partition();
    let mut stored = [0u8; SIGNATURE_LEN];
    flash.read(partition.signature_addr(vault.fw_length), &mut stored);
    assert_eq!(stored, parsed.signature);
}

fn run_device(flash: RamFlash, kv: RamKv, input: &[u8]) -> (String, Vec<u8>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let link = TeeLink {
        inner: ScriptLink::new(input),
        captured: captured.clone(),
    };
    let exit = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let device = Device {
            link,
            flash,
            kv,
            sys: PanicSys,
        };
        let mut fw_ram = vec![0u8; EXEC_REGION_SIZE as usize];
        device.run(&mut fw_ram);
    }))
    .unwrap_err();
    let exit = exit
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| exit.downcast_ref::<String>().cloned())
        .unwrap_or_default();
    let output = captured.lock().unwrap().clone();
    (exit, output)
}

#[test]
fn command_loop_runs_an_update_and_resets() {
    let (flash, kv, _) = provisioned();
    let mut input = vec![0x00, CMD_UPDATE];
    input.extend_from_slice(&wire(&seal(2, b"hi", &[9; 16])));

    let (exit, output) = run_device(flash, kv, &input);
    assert_eq!(exit, "reset");
    let text = String::from_utf8_lossy(&output).to_string();
    assert!(text.contains("Vehicle update service ready"));
    assert!(text.contains("update installed"));
}

#[test]
fn command_loop_boots_into_the_installed_firmware() {
    let (mut flash, mut kv, secrets) = provisioned();
    run_update(&mut flash, &mut kv, &secrets, &wire(&seal(2, b"hi", &[9; 16])))
        .0
        .unwrap();

    let (exit, output) = run_device(flash, kv, &[CMD_BOOT]);
    assert!(exit.starts_with("launch"), "unexpected exit: {exit}");
    assert!(String::from_utf8_lossy(&output).contains("hi"));
}

#[test]
fn command_loop_reports_errors_and_resets() {
    let (mut flash, mut kv, secrets) = provisioned();
    run_update(&mut flash, &mut kv, &secrets, &wire(&seal(4, b"v4", &[1; 16])))
        .0
        .unwrap();

    let mut input = vec![CMD_UPDATE];
    input.extend_from_slice(&wire(&seal(3, b"v3", &[2; 16])));
    let (exit, output) = run_device(flash, kv, &input);
    assert_eq!(exit, "reset");
    assert!(String::from_utf8_lossy(&output).contains("error: version 3 below floor 4"));
}

#[test]
fn unknown_command_bytes_are_ignored() {
    let (mut flash, mut kv, secrets) = provisioned();
    run_update(&mut flash, &mut kv, &secrets, &wire(&seal(2, b"m", &[9; 16])))
        .0
        .unwrap();

    // Noise before the boot command must not derail the loop.
    let (exit, _) = run_device(flash, kv, &[b'x', 0xFF, b'?', CMD_BOOT]);
    assert!(exit.starts_with("launch"));
}
