// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! 160-byte block padding (§4.1).
//!
//! Padded length is `160 * ceil((L+2)/160) - 1`: the padded region itself
//! sits one byte short of a clean multiple of 160 because callers prepend
//! a one-byte version header outside the padded region before framing,
//! which is what brings the full frame back to a multiple of 160.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PaddingError {
    #[error("invalid padding")]
    InvalidPadding,
}

const BLOCK: usize = 160;

/// `160 * ceil((plain_len+2)/160) - 1`
pub fn padded_len(plain_len: usize) -> usize {
    let blocks = (plain_len + 2 + BLOCK - 1) / BLOCK;
    BLOCK * blocks - 1
}

/// Appends a `0x80` terminator and zero-fills to `padded_len`.
pub fn pad(plaintext: &[u8]) -> Vec<u8> {
    let total = padded_len(plaintext.len());
    let mut buf = vec![0u8; total];
    buf[..plaintext.len()].copy_from_slice(plaintext);
    buf[plaintext.len()] = 0x80;
    buf
}

/// Scans from the end for the terminator; the last non-zero byte must be
/// `0x80`, everything after it zero.
pub fn unpad(padded: &[u8]) -> Result<Vec<u8>, PaddingError> {
    for i in (0..padded.len()).rev() {
        if padded[i] != 0 {
            if padded[i] != 0x80 {
                return Err(PaddingError::InvalidPadding);
            }
            return Ok(padded[..i].to_vec());
        }
    }
    Err(PaddingError::InvalidPadding)
}
