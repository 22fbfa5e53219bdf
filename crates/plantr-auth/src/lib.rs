// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod keys;
mod token;

pub use keys::{
    DEFAULT_KEY_BITS, KeyError, Keypair, generate_keypair, open_value, seal_value,
};
pub use token::{Claims, TokenError, mint, peek_expiration, verify};
