//! Key material wrappers and the capability traits the codec drives.
//!
//! The codec never touches a key's bytes directly: every encrypt/decrypt/
//! MAC operation goes through [`Encrypter`], [`Decrypter`] or [`Mac`], and a
//! [`CryptoFactory`] is the single point a caller swaps in a hardware
//! security module for the software fallback in [`crate::default_crypto`].

use generic_array::GenericArray;

/// A raw 128-bit AES key. Carries no role information; the field name that
/// holds one (`nwk_key`, `app_s_key`, ...) is what gives it meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AES128(pub [u8; 16]);

impl AsRef<[u8]> for AES128 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 16]> for AES128 {
    fn from(v: [u8; 16]) -> Self {
        AES128(v)
    }
}

/// A four-byte Message Integrity Code, little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct MIC(pub [u8; 4]);

impl MIC {
    pub fn as_u32(&self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

impl From<u32> for MIC {
    fn from(v: u32) -> Self {
        MIC(v.to_le_bytes())
    }
}

/// An 8-byte EUI-64, stored in host (non-reversed) order.
pub type EUI64 = [u8; 8];

/// AES-128 ECB single-block encryption, keyed by construction.
pub trait Encrypter {
    fn encrypt_block(&self, block: &mut GenericArray<u8, generic_array::typenum::U16>);
}

/// AES-128 ECB single-block decryption, keyed by construction.
pub trait Decrypter {
    fn decrypt_block(&self, block: &mut GenericArray<u8, generic_array::typenum::U16>);
}

/// AES-CMAC, keyed by construction, used incrementally (`input`/`result`).
pub trait Mac {
    fn input(&mut self, data: &[u8]);
    fn reset(&mut self);
    fn result(self) -> GenericArray<u8, generic_array::typenum::U16>;
}

/// A factory for the three crypto primitives the codec needs, each keyed
/// independently so a single frame can mix keys (e.g. CMAC under
/// `FNwkSIntKey`, CTR under `AppSKey`).
pub trait CryptoFactory {
    type E: Encrypter;
    type D: Decrypter;
    type M: Mac;

    fn new_enc(&self, key: &AES128) -> Self::E;
    fn new_dec(&self, key: &AES128) -> Self::D;
    fn new_mac(&self, key: &AES128) -> Self::M;
}
