//! Pure-Rust `aes`/`cmac` backed [`CryptoFactory`], used unless a host
//! integrates a hardware security module instead.

use crate::keys::{CryptoFactory, Decrypter, Encrypter, Mac as MacTrait, AES128};
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::Cmac;
use generic_array::GenericArray;

impl Encrypter for Aes128 {
    fn encrypt_block(&self, block: &mut GenericArray<u8, generic_array::typenum::U16>) {
        BlockEncrypt::encrypt_block(self, block);
    }
}

impl Decrypter for Aes128 {
    fn decrypt_block(&self, block: &mut GenericArray<u8, generic_array::typenum::U16>) {
        BlockDecrypt::decrypt_block(self, block);
    }
}

impl MacTrait for Cmac<Aes128> {
    fn input(&mut self, data: &[u8]) {
        cmac::Mac::update(self, data);
    }

    fn reset(&mut self) {
        cmac::Mac::reset(self);
    }

    fn result(self) -> GenericArray<u8, generic_array::typenum::U16> {
        cmac::Mac::finalize(self).into_bytes()
    }
}

/// The crate's default [`CryptoFactory`]: plain software AES-128 and
/// AES-CMAC, no hardware acceleration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFactory;

impl CryptoFactory for DefaultFactory {
    type E = Aes128;
    type D = Aes128;
    type M = Cmac<Aes128>;

    fn new_enc(&self, key: &AES128) -> Self::E {
        Aes128::new(GenericArray::from_slice(&key.0))
    }

    fn new_dec(&self, key: &AES128) -> Self::D {
        Aes128::new(GenericArray::from_slice(&key.0))
    }

    fn new_mac(&self, key: &AES128) -> Self::M {
        use cmac::Mac as _;
        Cmac::new(GenericArray::from_slice(&key.0))
    }
}
