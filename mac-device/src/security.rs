//! The `SecurityModule` capability (spec §6): the vault that owns root and
//! derived keys and performs AES-128 ECB/CTR and AES-CMAC as opaque
//! operations. A host that has a hardware security element implements this
//! directly against it; [`DefaultSecurityModule`] is the weak, keys-in-RAM
//! fallback used when there is none.

use mac_encoding::keys::AES128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum KeyTarget {
    NwkKey,
    AppKey,
    FNwkSIntKey,
    SNwkSIntKey,
    NwkSEncKey,
    AppSKey,
    JSEncKey,
    JSIntKey,
}

/// The join-context material needed to derive a session or join-server key;
/// passed to [`SecurityModule::update_session_key`].
#[derive(Debug, Clone, Copy)]
pub struct DerivationContext {
    pub version: mac_encoding::types::Version,
    pub join_nonce: mac_encoding::types::JoinNonce,
    pub net_id: mac_encoding::types::NetId,
    pub join_eui: [u8; 8],
    pub dev_eui: [u8; 8],
    pub dev_nonce: mac_encoding::types::DevNonce,
}

pub trait SecurityModule {
    /// Opens a batch of key updates (entered once per successful join).
    fn begin_update(&mut self);
    /// Commits a batch opened by `begin_update`.
    fn end_update(&mut self);

    /// Derives `target` from `root` (`NwkKey` or `AppKey`) under `ctx` and
    /// stores it, replacing any prior value. Only valid between
    /// `begin_update`/`end_update`.
    fn update_session_key(&mut self, target: KeyTarget, root: KeyTarget, ctx: &DerivationContext);

    /// AES-CMAC truncated to the low 4 bytes, interpreted little-endian.
    fn mic(&self, key: KeyTarget, hdr: &[u8], data: &[u8]) -> u32;
    /// In-place AES-128 ECB over exactly one 16-byte block.
    fn ecb(&self, key: KeyTarget, block: &mut [u8; 16]);
    /// In-place AES-CTR keystream XOR, `iv` the 16-byte A-block counter
    /// prefix (block index in the low byte is incremented internally).
    fn ctr(&self, key: KeyTarget, iv: &[u8; 16], data: &mut [u8]);
}

/// Plain-memory [`SecurityModule`]: keys live in ordinary RAM and crypto is
/// done with `mac_encoding`'s default software AES/CMAC. Adequate for
/// development and for hosts with no secure element.
#[cfg(feature = "default-crypto")]
pub struct DefaultSecurityModule {
    nwk_key: AES128,
    app_key: AES128,
    f_nwk_s_int_key: AES128,
    s_nwk_s_int_key: AES128,
    nwk_s_enc_key: AES128,
    app_s_key: AES128,
    js_enc_key: AES128,
    js_int_key: AES128,
    factory: mac_encoding::default_crypto::DefaultFactory,
}

#[cfg(feature = "default-crypto")]
impl DefaultSecurityModule {
    pub fn new(nwk_key: AES128, app_key: AES128) -> Self {
        Self {
            nwk_key,
            app_key,
            f_nwk_s_int_key: AES128::default(),
            s_nwk_s_int_key: AES128::default(),
            nwk_s_enc_key: AES128::default(),
            app_s_key: AES128::default(),
            js_enc_key: AES128::default(),
            js_int_key: AES128::default(),
            factory: mac_encoding::default_crypto::DefaultFactory,
        }
    }

    fn key(&self, target: KeyTarget) -> &AES128 {
        match target {
            KeyTarget::NwkKey => &self.nwk_key,
            KeyTarget::AppKey => &self.app_key,
            KeyTarget::FNwkSIntKey => &self.f_nwk_s_int_key,
            KeyTarget::SNwkSIntKey => &self.s_nwk_s_int_key,
            KeyTarget::NwkSEncKey => &self.nwk_s_enc_key,
            KeyTarget::AppSKey => &self.app_s_key,
            KeyTarget::JSEncKey => &self.js_enc_key,
            KeyTarget::JSIntKey => &self.js_int_key,
        }
    }

    fn key_mut(&mut self, target: KeyTarget) -> &mut AES128 {
        match target {
            KeyTarget::NwkKey => &mut self.nwk_key,
            KeyTarget::AppKey => &mut self.app_key,
            KeyTarget::FNwkSIntKey => &mut self.f_nwk_s_int_key,
            KeyTarget::SNwkSIntKey => &mut self.s_nwk_s_int_key,
            KeyTarget::NwkSEncKey => &mut self.nwk_s_enc_key,
            KeyTarget::AppSKey => &mut self.app_s_key,
            KeyTarget::JSEncKey => &mut self.js_enc_key,
            KeyTarget::JSIntKey => &mut self.js_int_key,
        }
    }
}

#[cfg(feature = "default-crypto")]
impl SecurityModule for DefaultSecurityModule {
    fn begin_update(&mut self) {}
    fn end_update(&mut self) {}

    fn update_session_key(&mut self, target: KeyTarget, root: KeyTarget, ctx: &DerivationContext) {
        use mac_encoding::crypto::{self, DerivedKey};
        let root_key = *self.key(root);
        let derived = match target {
            KeyTarget::JSEncKey => {
                crypto::derive_key_1_1_join_server(&self.factory, &root_key, DerivedKey::JSEncKey, ctx.dev_eui)
            }
            KeyTarget::JSIntKey => {
                crypto::derive_key_1_1_join_server(&self.factory, &root_key, DerivedKey::JSIntKey, ctx.dev_eui)
            }
            KeyTarget::FNwkSIntKey => crypto::derive_key_1_1_session(
                &self.factory,
                &root_key,
                DerivedKey::FNwkSIntKey,
                ctx.join_nonce,
                ctx.join_eui,
                ctx.dev_nonce,
            ),
            KeyTarget::SNwkSIntKey => crypto::derive_key_1_1_session(
                &self.factory,
                &root_key,
                DerivedKey::SNwkSIntKey,
                ctx.join_nonce,
                ctx.join_eui,
                ctx.dev_nonce,
            ),
            KeyTarget::NwkSEncKey => crypto::derive_key_1_1_session(
                &self.factory,
                &root_key,
                DerivedKey::NwkSEncKey,
                ctx.join_nonce,
                ctx.join_eui,
                ctx.dev_nonce,
            ),
            KeyTarget::AppSKey => match ctx.version {
                mac_encoding::types::Version::V1_0 => crypto::derive_key_1_0(
                    &self.factory,
                    &root_key,
                    DerivedKey::AppSKey,
                    ctx.join_nonce,
                    ctx.net_id,
                    ctx.dev_nonce,
                ),
                mac_encoding::types::Version::V1_1 => crypto::derive_key_1_1_session(
                    &self.factory,
                    &root_key,
                    DerivedKey::AppSKey,
                    ctx.join_nonce,
                    ctx.join_eui,
                    ctx.dev_nonce,
                ),
            },
            KeyTarget::NwkKey | KeyTarget::AppKey => root_key,
        };
        *self.key_mut(target) = derived;
    }

    fn mic(&self, key: KeyTarget, hdr: &[u8], data: &[u8]) -> u32 {
        mac_encoding::crypto::cmac_mic(&self.factory, self.key(key), &{
            // hdr and data are logically one message; concatenate through
            // a scratch buffer sized for the largest B0/B1 block plus an
            // uplink/downlink payload.
            let mut buf = heapless::Vec::<u8, 256>::new();
            let _ = buf.extend_from_slice(hdr);
            let _ = buf.extend_from_slice(data);
            buf
        })
    }

    fn ecb(&self, key: KeyTarget, block: &mut [u8; 16]) {
        use mac_encoding::keys::Encrypter;
        let enc = self.factory.new_enc(self.key(key));
        let mut ga = generic_array::GenericArray::clone_from_slice(block);
        enc.encrypt_block(&mut ga);
        block.copy_from_slice(&ga);
    }

    fn ctr(&self, key: KeyTarget, iv: &[u8; 16], data: &mut [u8]) {
        let dir = if iv[5] == 0 { mac_encoding::types::Direction::Up } else { mac_encoding::types::Direction::Down };
        let dev_addr = u32::from_le_bytes([iv[6], iv[7], iv[8], iv[9]]);
        let fcnt32 = u32::from_le_bytes([iv[10], iv[11], iv[12], iv[13]]);
        mac_encoding::crypto::ctr_xor(&self.factory, self.key(key), dir, dev_addr, fcnt32, data);
    }
}
