//! Frame sealing for the LAN adapters.
//!
//! Frames are authenticated with an HMAC-SHA256 checksum and encrypted with
//! AES-256-ECB and PKCS7 padding: 32 checksum bytes followed by the
//! ciphertext. Discovery frames use a static key derived from the
//! application ID; point-to-point frames are sealed to a key derived from
//! the recipient's announced key material.

use crate::error::TransportError;
use crate::protocol::constants::APPLICATION_ID;
use aes::cipher::{Block, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

const BLOCK_SIZE: usize = 16;
const CHECKSUM_SIZE: usize = 32;

/// The sealing key shared by all discovery frames, the SHA-256 hash of the
/// application ID. Computed once and cached.
static DISCOVERY_KEY: LazyLock<[u8; 32]> =
    LazyLock::new(|| derive_key(&APPLICATION_ID.to_le_bytes()));

pub(crate) fn discovery_key() -> &'static [u8; 32] {
    &DISCOVERY_KEY
}

/// Derives a 32-byte sealing key from arbitrary key material.
///
/// # Examples
///
/// ```ignore
/// let key = derive_key(b"deadbeef");
/// assert_eq!(key.len(), 32);
/// assert_eq!(key, derive_key(b"deadbeef"));
/// ```
pub(crate) fn derive_key(material: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(material);
    let result = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&result);
    key
}

/// Seals a frame: HMAC-SHA256 checksum of the plaintext followed by the
/// AES-256-ECB/PKCS7 ciphertext.
pub(crate) fn seal(data: &[u8], key: &[u8; 32]) -> Result<Vec<u8>, TransportError> {
    let encrypted = encrypt(data, key);
    let checksum = compute_checksum(data, key);

    let mut frame = Vec::with_capacity(CHECKSUM_SIZE + encrypted.len());
    frame.extend_from_slice(&checksum);
    frame.extend_from_slice(&encrypted);
    Ok(frame)
}

/// Opens a sealed frame, returning the plaintext.
///
/// Fails on truncated input, a ciphertext that is not block-aligned, invalid
/// padding, or a checksum mismatch.
pub(crate) fn open(data: &[u8], key: &[u8; 32]) -> Result<Vec<u8>, TransportError> {
    if data.len() < CHECKSUM_SIZE {
        return Err(TransportError::Crypto("frame too short".to_string()));
    }

    let checksum: [u8; 32] = data[..CHECKSUM_SIZE]
        .try_into()
        .expect("slice length checked above");
    let plaintext = decrypt(&data[CHECKSUM_SIZE..], key)?;

    if !verify_checksum(&plaintext, key, &checksum) {
        return Err(TransportError::Crypto("checksum mismatch".to_string()));
    }

    Ok(plaintext)
}

fn encrypt(data: &[u8], key: &[u8; 32]) -> Vec<u8> {
    let cipher = Aes256::new(key.into());

    // PKCS7 padding
    let padding_len = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    let mut padded = data.to_vec();
    padded.extend(vec![padding_len as u8; padding_len]);

    for chunk in padded.chunks_exact_mut(BLOCK_SIZE) {
        let block = Block::<Aes256>::from_mut_slice(chunk);
        cipher.encrypt_block(block);
    }

    padded
}

fn decrypt(data: &[u8], key: &[u8; 32]) -> Result<Vec<u8>, TransportError> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(TransportError::Crypto(
            "invalid encrypted data length".to_string(),
        ));
    }

    let cipher = Aes256::new(key.into());
    let mut decrypted = data.to_vec();
    for chunk in decrypted.chunks_exact_mut(BLOCK_SIZE) {
        let block = Block::<Aes256>::from_mut_slice(chunk);
        cipher.decrypt_block(block);
    }

    // Strip PKCS7 padding, verifying it in constant time
    if let Some(&padding_len) = decrypted.last() {
        if padding_len > 0 && padding_len as usize <= BLOCK_SIZE {
            let data_len = decrypted.len();
            if data_len >= padding_len as usize {
                let padding_start = data_len - padding_len as usize;
                let mut mismatched: u8 = 0;
                for &byte in &decrypted[padding_start..] {
                    mismatched |= byte ^ padding_len;
                }
                if mismatched == 0 {
                    decrypted.truncate(padding_start);
                    return Ok(decrypted);
                }
            }
        }
    }

    Err(TransportError::Crypto("invalid padding".to_string()))
}

fn compute_checksum(data: &[u8], key: &[u8; 32]) -> [u8; 32] {
    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    let result = mac.finalize();
    let mut checksum = [0u8; 32];
    checksum.copy_from_slice(&result.into_bytes());
    checksum
}

fn verify_checksum(data: &[u8], key: &[u8; 32], expected: &[u8; 32]) -> bool {
    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.verify_slice(expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = derive_key(b"some peer material");
        let data = b"{\"pause\":true}";
        let frame = seal(data, &key).unwrap();
        let opened = open(&frame, &key).unwrap();
        assert_eq!(opened.as_slice(), data.as_slice());
    }

    #[test]
    fn wrong_key_fails() {
        let frame = seal(b"secret", &derive_key(b"right")).unwrap();
        assert!(open(&frame, &derive_key(b"wrong")).is_err());
    }

    #[test]
    fn tampered_frame_fails_checksum() {
        let key = derive_key(b"material");
        let mut frame = seal(b"payload payload payload", &key).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        assert!(open(&frame, &key).is_err());
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let key = derive_key(b"material");
        assert!(open(&[0u8; 16], &key).is_err());
    }

    #[test]
    fn discovery_key_is_deterministic() {
        assert_eq!(discovery_key(), discovery_key());
    }
}
