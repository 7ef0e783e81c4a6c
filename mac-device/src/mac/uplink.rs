//! Data-frame construction, decryption and MIC validation via the opaque
//! [`SecurityModule`] (spec §4.4). Parallels `mac_encoding::frame`'s
//! `build_data_uplink`, which demonstrates the same wire format against raw
//! `AES128` keys; here the MAC runtime never sees one.

use crate::security::{KeyTarget, SecurityModule};
use crate::session::{Session, Version};
use mac_encoding::crypto::{a_block, b0, b1};
use mac_encoding::types::Direction;

fn mic_1_1<S: SecurityModule>(security: &S, b1_block: &[u8; 16], b0_block: &[u8; 16], msg: &[u8]) -> u32 {
    let s = security.mic(KeyTarget::SNwkSIntKey, b1_block, msg).to_le_bytes();
    let f = security.mic(KeyTarget::FNwkSIntKey, b0_block, msg).to_le_bytes();
    u32::from_le_bytes([s[0], s[1], f[0], f[1]])
}

/// Builds an uplink data frame into `out`: encrypts FRMPayload (and, in
/// 1.1, FOpts) in place and appends the MIC. Returns the written length.
#[allow(clippy::too_many_arguments)]
pub fn build_data_frame<S: SecurityModule>(
    out: &mut [u8],
    security: &S,
    session: &Session,
    confirmed: bool,
    fctrl_byte: u8,
    fcnt32: u32,
    fopts: &[u8],
    fport: Option<u8>,
    payload: &[u8],
    conf_fcnt_down: u16,
    tx_dr: u8,
    tx_ch: u8,
) -> Option<usize> {
    let fopts_len = fopts.len();
    if fopts_len > 15 {
        return None;
    }
    let fport_len = usize::from(fport.is_some());
    let total = 1 + 4 + 1 + 2 + fopts_len + fport_len + payload.len() + 4;
    if out.len() < total {
        return None;
    }
    out[0] = if confirmed { 0x80 } else { 0x40 }; // ConfirmedDataUp / UnconfirmedDataUp MHDR.
    out[1..5].copy_from_slice(&session.dev_addr.0.to_le_bytes());
    out[5] = fctrl_byte;
    out[6..8].copy_from_slice(&(fcnt32 as u16).to_le_bytes());
    let fopts_start = 8;
    out[fopts_start..fopts_start + fopts_len].copy_from_slice(fopts);

    if matches!(session.version, Version::V1_1) && fopts_len > 0 {
        let iv = a_block(Direction::Up, session.dev_addr, fcnt32, 1);
        security.ctr(KeyTarget::NwkSEncKey, &iv, &mut out[fopts_start..fopts_start + fopts_len]);
    }

    let mut pos = fopts_start + fopts_len;
    if let Some(fp) = fport {
        out[pos] = fp;
        pos += 1;
        let start = pos;
        out[pos..pos + payload.len()].copy_from_slice(payload);
        let key = if fp == 0 { KeyTarget::NwkSEncKey } else { KeyTarget::AppSKey };
        let iv = a_block(Direction::Up, session.dev_addr, fcnt32, 1);
        security.ctr(key, &iv, &mut out[start..start + payload.len()]);
        pos += payload.len();
    }

    let msg_len = pos;
    let mic = match session.version {
        Version::V1_0 => {
            let block = b0(Direction::Up, session.dev_addr, fcnt32, msg_len as u8);
            security.mic(KeyTarget::FNwkSIntKey, &block, &out[..msg_len])
        }
        Version::V1_1 => {
            let b1_block = b1(Direction::Up, conf_fcnt_down, tx_dr, tx_ch, session.dev_addr, fcnt32, msg_len as u8);
            let b0_block = b0(Direction::Up, session.dev_addr, fcnt32, msg_len as u8);
            mic_1_1(security, &b1_block, &b0_block, &out[..msg_len])
        }
    };
    out[pos..pos + 4].copy_from_slice(&mic.to_le_bytes());
    Some(pos + 4)
}

/// A downlink data frame, MIC-verified and fully decrypted.
pub struct DecodedDownlink {
    pub confirmed: bool,
    pub ack: bool,
    pub f_pending: bool,
    pub fcnt32: u32,
    pub fopts: heapless::Vec<u8, 15>,
    pub fport: Option<u8>,
    pub frm_payload: heapless::Vec<u8, 242>,
}

/// Decodes, MIC-verifies and decrypts a downlink data frame addressed to
/// `session`. `tx_dr`/`tx_ch` are the device's most recent uplink's
/// parameters (only consulted for the 1.1 MIC); `conf_fcnt_down` is the
/// network's acknowledged confirmed-uplink counter, which this crate does
/// not track separately from the main downlink counter and so always
/// passes as `0` (a documented simplification).
pub fn decrypt_and_validate_downlink<S: SecurityModule>(
    security: &S,
    session: &Session,
    raw: &[u8],
    conf_fcnt_down: u16,
    tx_dr: u8,
    tx_ch: u8,
) -> Option<DecodedDownlink> {
    use mac_encoding::frame::{decode, Frame, MType};

    let data = match decode(raw) {
        Ok(Frame::Data(df)) => df,
        _ => return None,
    };
    if data.dev_addr != session.dev_addr {
        return None;
    }
    let confirmed = data.mtype == MType::ConfirmedDataDown;

    let stored = if data.fport == Some(0) || data.fport.is_none() { session.nwk_down_counter } else { session.app_down_counter };
    let fcnt32 = Session::resolve_fcnt32(stored, data.fcnt16)?;

    let msg = data.mic_message(raw);
    let computed = match session.version {
        Version::V1_0 => {
            let block = b0(Direction::Down, session.dev_addr, fcnt32, msg.len() as u8);
            security.mic(KeyTarget::FNwkSIntKey, &block, msg)
        }
        Version::V1_1 => {
            let b1_block = b1(Direction::Down, conf_fcnt_down, tx_dr, tx_ch, session.dev_addr, fcnt32, msg.len() as u8);
            let b0_block = b0(Direction::Down, session.dev_addr, fcnt32, msg.len() as u8);
            mic_1_1(security, &b1_block, &b0_block, msg)
        }
    };
    if computed != data.mic.as_u32() {
        return None;
    }

    let mut fopts = heapless::Vec::<u8, 15>::new();
    let _ = fopts.extend_from_slice(data.fopts);
    if matches!(session.version, Version::V1_1) && !fopts.is_empty() {
        let iv = a_block(Direction::Down, session.dev_addr, fcnt32, 1);
        security.ctr(KeyTarget::NwkSEncKey, &iv, &mut fopts);
    }

    let mut frm_payload = heapless::Vec::<u8, 242>::new();
    let _ = frm_payload.extend_from_slice(data.frm_payload);
    if !frm_payload.is_empty() {
        let key = if data.fport == Some(0) { KeyTarget::NwkSEncKey } else { KeyTarget::AppSKey };
        let iv = a_block(Direction::Down, session.dev_addr, fcnt32, 1);
        security.ctr(key, &iv, &mut frm_payload);
    }

    Some(DecodedDownlink {
        confirmed,
        ack: data.fctrl.ack(),
        f_pending: data.fctrl.f_pending(),
        fcnt32,
        fopts,
        fport: data.fport,
        frm_payload,
    })
}
