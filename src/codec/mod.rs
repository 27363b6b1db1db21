// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

#[cfg(feature = "testing")]
pub mod padding;
#[cfg(not(feature = "testing"))]
mod padding;

pub use padding::{pad, unpad, padded_len, PaddingError};
