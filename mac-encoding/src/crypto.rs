//! Construction of the LoRaWAN authentication blocks (B0/B1) and the CTR IV
//! family (A), key derivation, and the handful of AES/CMAC drives built on
//! top of the [`crate::keys`] capability traits.
//!
//! None of this module touches key bytes directly outside of
//! [`crate::default_crypto`]; everything here is generic over a
//! [`CryptoFactory`].

use crate::keys::{CryptoFactory, Mac as MacTrait, AES128};
use crate::types::{AppNonce, DevAddr, DevNonce, Direction, JoinNonce, NetId};
use generic_array::GenericArray;

fn ecb_block<F: CryptoFactory>(factory: &F, key: &AES128, block: &mut [u8; 16]) {
    let enc = factory.new_enc(key);
    let mut ga = GenericArray::clone_from_slice(&block[..]);
    enc.encrypt_block(&mut ga);
    block.copy_from_slice(ga.as_slice());
}

/// Builds the B0 (1.0) / B0-like half of a B1 (1.1) authentication block.
fn b0_like(dir: Direction, devaddr: DevAddr, fcnt32: u32, len: u8) -> [u8; 16] {
    let mut b = [0u8; 16];
    b[0] = 0x49;
    b[5] = dir as u8;
    b[6..10].copy_from_slice(&devaddr.value().to_le_bytes());
    b[10..14].copy_from_slice(&fcnt32.to_le_bytes());
    b[14] = 0x00;
    b[15] = len;
    b
}

/// B0-up / B0-down: 1.0 uplink or downlink MIC block.
pub fn b0(dir: Direction, devaddr: DevAddr, fcnt32: u32, len: u8) -> [u8; 16] {
    b0_like(dir, devaddr, fcnt32, len)
}

/// B1-up / B1-down: 1.1 MIC block. `conf_fcnt` carries `ConfFCntDown` on
/// uplink, or the acknowledged uplink's counter on downlink; it is only
/// meaningful when the corresponding ACK bit is set, per spec §4.4.
pub fn b1(
    dir: Direction,
    conf_fcnt: u16,
    tx_dr: u8,
    tx_ch: u8,
    devaddr: DevAddr,
    fcnt32: u32,
    len: u8,
) -> [u8; 16] {
    let mut b = b0_like(dir, devaddr, fcnt32, len);
    b[1..3].copy_from_slice(&conf_fcnt.to_le_bytes());
    b[3] = tx_dr;
    b[4] = tx_ch;
    b
}

/// The A-block family used as the CTR IV prefix for FRMPayload/FOpts
/// encryption. `block_index` is 1-based per 16-byte block of plaintext.
pub fn a_block(dir: Direction, devaddr: DevAddr, fcnt32: u32, block_index: u8) -> [u8; 16] {
    let mut a = [0u8; 16];
    a[0] = 0x01;
    a[5] = dir as u8;
    a[6..10].copy_from_slice(&devaddr.value().to_le_bytes());
    a[10..14].copy_from_slice(&fcnt32.to_le_bytes());
    a[14] = 0x00;
    a[15] = block_index;
    a
}

fn cmac_digest<F: CryptoFactory>(factory: &F, key: &AES128, parts: &[&[u8]]) -> [u8; 16] {
    let mut mac = factory.new_mac(key);
    for part in parts {
        mac.input(part);
    }
    let result = mac.result();
    let mut out = [0u8; 16];
    out.copy_from_slice(result.as_slice());
    out
}

/// MIC for a 1.0 uplink or downlink frame: the low four bytes of
/// `CMAC(key, b0 ‖ msg)`.
pub fn mic_1_0<F: CryptoFactory>(factory: &F, key: &AES128, b0: &[u8; 16], msg: &[u8]) -> u32 {
    let digest = cmac_digest(factory, key, &[b0, msg]);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// MIC for a 1.1 frame: `cmacF` low two bytes in the wire-low half,
/// `cmacS` low two bytes in the wire-high half of the little-endian field
/// (spec §4.4 — `S` in the low bytes, `F` in the high bytes).
pub fn mic_1_1<F: CryptoFactory>(
    factory: &F,
    s_nwk_s_int_key: &AES128,
    f_nwk_s_int_key: &AES128,
    b1: &[u8; 16],
    b0_conf0: &[u8; 16],
    msg: &[u8],
) -> u32 {
    let cmac_s = cmac_digest(factory, s_nwk_s_int_key, &[b1, msg]);
    let cmac_f = cmac_digest(factory, f_nwk_s_int_key, &[b0_conf0, msg]);
    u32::from_le_bytes([cmac_s[0], cmac_s[1], cmac_f[0], cmac_f[1]])
}

/// CMAC over an arbitrary message with no authentication-block prefix,
/// used for the join-accept MIC (both versions) and for key derivation
/// is instead done through [`derive_key`] directly.
pub fn cmac_mic<F: CryptoFactory>(factory: &F, key: &AES128, msg: &[u8]) -> u32 {
    let digest = cmac_digest(factory, key, &[msg]);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// XORs `data` in place with the AES-CTR keystream generated from
/// successive A-blocks, per spec §4.4. Used for both FRMPayload (under
/// `NwkSEncKey` when FPort=0, else `AppSKey`) and, in 1.1, FOpts (always
/// `NwkSEncKey`).
pub fn ctr_xor<F: CryptoFactory>(
    factory: &F,
    key: &AES128,
    dir: Direction,
    devaddr: DevAddr,
    fcnt32: u32,
    data: &mut [u8],
) {
    let mut block_index: u8 = 1;
    for chunk in data.chunks_mut(16) {
        let mut a = a_block(dir, devaddr, fcnt32, block_index);
        ecb_block(factory, key, &mut a);
        for (b, k) in chunk.iter_mut().zip(a.iter()) {
            *b ^= k;
        }
        block_index = block_index.wrapping_add(1);
    }
}

/// Decrypts (or, symmetrically, "encrypts" from the network server's point
/// of view) a JoinAccept payload in place: one AES-ECB block over bytes
/// `1..17`, and — if a CFList is present — a second block over `17..33`.
/// LoRaWAN defines the network side's operation as AES *decrypt*, so the
/// device reverses it with the forward AES *encrypt* operation.
pub fn join_accept_crypt<F: CryptoFactory>(factory: &F, key: &AES128, buf: &mut [u8]) {
    debug_assert!(buf.len() == 17 || buf.len() == 33);
    for chunk_start in (1..buf.len()).step_by(16) {
        let mut block = [0u8; 16];
        block.copy_from_slice(&buf[chunk_start..chunk_start + 16]);
        ecb_block(factory, key, &mut block);
        buf[chunk_start..chunk_start + 16].copy_from_slice(&block);
    }
}

/// Which of the four (1.0) or six (1.1) derived keys is being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedKey {
    /// 1.0: shared by FNwkSIntKey/SNwkSIntKey/NwkSEncKey (all equal
    /// `NwkSKey`). 1.1: FNwkSIntKey specifically.
    FNwkSIntKey,
    AppSKey,
    /// 1.1 only; equals `FNwkSIntKey`'s 1.0 value when version is 1.0.
    SNwkSIntKey,
    /// 1.1 only; equals `FNwkSIntKey`'s 1.0 value when version is 1.0.
    NwkSEncKey,
    JSEncKey,
    JSIntKey,
}

impl DerivedKey {
    fn tag_1_0(self) -> u8 {
        match self {
            DerivedKey::AppSKey => 0x02,
            _ => 0x01,
        }
    }

    fn tag_1_1(self) -> u8 {
        match self {
            DerivedKey::FNwkSIntKey => 0x01,
            DerivedKey::AppSKey => 0x02,
            DerivedKey::SNwkSIntKey => 0x03,
            DerivedKey::NwkSEncKey => 0x04,
            DerivedKey::JSEncKey => 0x05,
            DerivedKey::JSIntKey => 0x06,
        }
    }
}

/// 1.0 session-key derivation: `AES-ECB(NwkKey, tag ‖ JoinNonce(3) ‖
/// NetID(3) ‖ DevNonce(2) ‖ 0·7)`.
pub fn derive_key_1_0<F: CryptoFactory>(
    factory: &F,
    nwk_key: &AES128,
    which: DerivedKey,
    join_nonce: JoinNonce,
    net_id: NetId,
    dev_nonce: DevNonce,
) -> AES128 {
    let mut block = [0u8; 16];
    block[0] = which.tag_1_0();
    block[1..4].copy_from_slice(&join_nonce.value().to_le_bytes()[..3]);
    block[4..7].copy_from_slice(&net_id.value().to_le_bytes()[..3]);
    block[7..9].copy_from_slice(&dev_nonce.value().to_le_bytes());
    ecb_block(factory, nwk_key, &mut block);
    AES128(block)
}

/// 1.1 session-key derivation (tags 1-4): `AES-ECB(root, tag ‖
/// JoinNonce(3) ‖ JoinEUI(8 MSB-first) ‖ DevNonce(2) ‖ 0·2)`. `root` is
/// `NwkKey` for FNwkSIntKey/SNwkSIntKey/NwkSEncKey and `AppKey` for
/// AppSKey.
pub fn derive_key_1_1_session<F: CryptoFactory>(
    factory: &F,
    root: &AES128,
    which: DerivedKey,
    join_nonce: JoinNonce,
    join_eui: [u8; 8],
    dev_nonce: DevNonce,
) -> AES128 {
    let mut block = [0u8; 16];
    block[0] = which.tag_1_1();
    block[1..4].copy_from_slice(&join_nonce.value().to_le_bytes()[..3]);
    for i in 0..8 {
        block[4 + i] = join_eui[7 - i];
    }
    block[12..14].copy_from_slice(&dev_nonce.value().to_le_bytes());
    ecb_block(factory, root, &mut block);
    AES128(block)
}

/// 1.1 join-server key derivation (tags 5-6): `AES-ECB(NwkKey, tag ‖
/// DevEUI(8 MSB-first) ‖ 0·7)`.
pub fn derive_key_1_1_join_server<F: CryptoFactory>(
    factory: &F,
    nwk_key: &AES128,
    which: DerivedKey,
    dev_eui: [u8; 8],
) -> AES128 {
    let mut block = [0u8; 16];
    block[0] = which.tag_1_1();
    for i in 0..8 {
        block[1 + i] = dev_eui[7 - i];
    }
    ecb_block(factory, nwk_key, &mut block);
    AES128(block)
}

/// JoinAccept MIC, 1.0: `CMAC(NwkKey, plaintext minus MIC)`.
pub fn join_accept_mic_1_0<F: CryptoFactory>(factory: &F, nwk_key: &AES128, msg: &[u8]) -> u32 {
    cmac_mic(factory, nwk_key, msg)
}

/// `JoinReqType` byte used in the 1.1 JoinAccept MIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRequestType {
    Otaa,
    Rejoin,
}

impl JoinRequestType {
    fn byte(self) -> u8 {
        match self {
            JoinRequestType::Otaa => 0xFF,
            JoinRequestType::Rejoin => 0x02,
        }
    }
}

/// JoinAccept MIC, 1.1: `CMAC(JSIntKey, JoinReqType(1) ‖ JoinEUI(8
/// MSB-first) ‖ DevNonce(2) ‖ plaintext minus MIC)`.
pub fn join_accept_mic_1_1<F: CryptoFactory>(
    factory: &F,
    js_int_key: &AES128,
    req_type: JoinRequestType,
    join_eui: [u8; 8],
    dev_nonce: DevNonce,
    msg: &[u8],
) -> u32 {
    let mut prefix = [0u8; 11];
    prefix[0] = req_type.byte();
    for i in 0..8 {
        prefix[1 + i] = join_eui[7 - i];
    }
    prefix[9..11].copy_from_slice(&dev_nonce.value().to_le_bytes());
    let digest = cmac_digest(factory, js_int_key, &[&prefix, msg]);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// MIC for the JoinRequest itself: `CMAC(NwkKey, JoinRequest minus MIC)`.
pub fn join_request_mic<F: CryptoFactory>(factory: &F, nwk_key: &AES128, msg: &[u8]) -> u32 {
    cmac_mic(factory, nwk_key, msg)
}

#[cfg(all(test, feature = "default-crypto"))]
mod tests {
    use super::*;
    use crate::default_crypto::DefaultFactory;

    #[test]
    fn cmac_empty_under_zero_key_matches_published_vector() {
        // RFC 4493 test vector #1: K = 2b7e1516 28aed2a6 abf71588 09cf4f3c,
        // M = empty, AES-CMAC = bb1d6929 e9593728 7fa37d12 9b756746.
        let factory = DefaultFactory;
        let key = AES128([
            0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf,
            0x4f, 0x3c,
        ]);
        let digest = cmac_digest(&factory, &key, &[&[]]);
        assert_eq!(
            digest,
            [
                0xbb, 0x1d, 0x69, 0x29, 0xe9, 0x59, 0x37, 0x28, 0x7f, 0xa3, 0x7d, 0x12, 0x9b, 0x75,
                0x67, 0x46
            ]
        );
    }

    #[test]
    fn a_block_layout_matches_spec() {
        let a = a_block(Direction::Up, DevAddr(0x0123_4567), 0x0000_0001, 1);
        assert_eq!(a[0], 0x01);
        assert_eq!(&a[1..5], &[0, 0, 0, 0]);
        assert_eq!(a[5], 0);
        assert_eq!(&a[6..10], &0x0123_4567u32.to_le_bytes());
        assert_eq!(&a[10..14], &0x0000_0001u32.to_le_bytes());
        assert_eq!(a[14], 0);
        assert_eq!(a[15], 1);
    }
}
