// SPDX-License-Identifier: MIT

//! Command implementations: image streaming and boot-flag control.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use ember_common::checksum::checksum_words;
use ember_common::protocol::{Message, OperationMode};

use crate::transport::Transport;

/// 24-bit wire field bounds the image length.
const MAX_IMAGE_WORDS: usize = 0x00FF_FFFF;

/// Stream an application image: request flash mode, announce metadata, then
/// send one word per frame. The ECU verifies the checksum after the last
/// word and commits the image itself.
pub fn flash(transport: &mut Transport, file: &Path) -> Result<()> {
    let image = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    if image.is_empty() {
        bail!("{} is empty", file.display());
    }

    let words = image_words(&image);
    if words.len() > MAX_IMAGE_WORDS {
        bail!(
            "{} is too large: {} words exceeds the 24-bit length field",
            file.display(),
            words.len()
        );
    }
    let crc = checksum_words(words.iter().copied());

    println!(
        "Image: {} ({} bytes, {} words, CRC32 0x{:08x})",
        file.display(),
        image.len(),
        words.len(),
        crc
    );

    let ecu_id = transport.ecu_id();
    transport.send(&Message::FlagSet {
        ecu_id,
        mode: OperationMode::FlashNewApp,
    })?;
    transport.send(&Message::Metadata {
        ecu_id,
        app_length: words.len() as u32,
        crc,
    })?;

    let pb = ProgressBar::new(words.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} words ({eta})")?
            .progress_chars("#>-"),
    );
    for &word in &words {
        transport.send(&Message::AppData { ecu_id, word })?;
        pb.inc(1);
    }
    pb.finish_with_message("transfer complete");

    println!("Transfer complete; the ECU verifies and launches on a CRC match.");
    Ok(())
}

/// Ask the ECU to validate and launch the committed image.
pub fn boot(transport: &mut Transport) -> Result<()> {
    transport.send(&Message::FlagSet {
        ecu_id: transport.ecu_id(),
        mode: OperationMode::BootToApp,
    })?;
    println!("Boot request sent.");
    Ok(())
}

/// Park the ECU in recovery.
pub fn recover(transport: &mut Transport) -> Result<()> {
    transport.send(&Message::FlagSet {
        ecu_id: transport.ecu_id(),
        mode: OperationMode::IdleInRecovery,
    })?;
    println!("Recovery request sent.");
    Ok(())
}

/// Split an image into little-endian words, padding the tail with erased
/// bytes to a word boundary.
fn image_words(image: &[u8]) -> Vec<u32> {
    image
        .chunks(4)
        .map(|chunk| {
            let mut bytes = [0xFFu8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_words_are_little_endian() {
        let words = image_words(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(words, vec![0x0403_0201, 0x0807_0605]);
    }

    #[test]
    fn tail_is_padded_with_erased_bytes() {
        let words = image_words(&[0xAA]);
        assert_eq!(words, vec![0xFFFF_FFAA]);
    }
}
