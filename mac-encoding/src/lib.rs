//! Wire-format codec, MAC-command codec, and cryptographic building blocks
//! for a LoRaWAN 1.0.x/1.1 end-device MAC layer.
//!
//! This crate has no notion of a schedule, a session lifecycle, or a
//! region table — see `mac-device` for those. It only turns bytes into
//! typed frames and back, and drives AES/CMAC through the [`keys`]
//! capability traits.
#![no_std]
#![allow(clippy::upper_case_acronyms)]

pub mod bytestream;
pub mod crypto;
pub mod frame;
pub mod join_accept;
pub mod keys;
pub mod maccommands;
pub mod types;

#[cfg(feature = "default-crypto")]
pub mod default_crypto;
