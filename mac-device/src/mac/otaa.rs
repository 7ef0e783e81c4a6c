//! Join-request construction and join-accept validation/application (spec
//! §4.6, "Join path").
//!
//! Unlike `mac_encoding::join_accept`, which demonstrates the codec against
//! a raw `AES128` key, everything here goes through the opaque
//! [`SecurityModule`] capability — the MAC runtime never sees key bytes.

use crate::region::RegionTable;
use crate::security::{DerivationContext, KeyTarget, SecurityModule};
use crate::session::{ChannelSlot, Session, Version};
use mac_encoding::join_accept::CfList;
use mac_encoding::types::{AppNonce, DevAddr, DevNonce, NetId};

/// The fields of a decrypted, MIC-verified JoinAccept, parsed without ever
/// touching a raw key.
pub struct JoinAcceptFields {
    pub app_nonce: AppNonce,
    pub net_id: NetId,
    pub dev_addr: DevAddr,
    pub opt_neg: bool,
    pub rx1_dr_offset: u8,
    pub rx2_data_rate: u8,
    pub rx_delay_raw: u8,
    pub cf_list: Option<CfList>,
}

fn parse_cflist(raw: &[u8; 16]) -> CfList {
    match raw[15] {
        1 => CfList::FixedChannelMask(*raw),
        _ => {
            let mut freqs = [0u32; 5];
            for (i, f) in freqs.iter_mut().enumerate() {
                let base = i * 3;
                *f = (u32::from(raw[base]) | (u32::from(raw[base + 1]) << 8) | (u32::from(raw[base + 2]) << 16)) * 100;
            }
            CfList::DynamicChannel(freqs)
        }
    }
}

/// Decrypts `encrypted` (the JoinAccept bytes after MHDR, 16 or 32 bytes)
/// and validates its MIC via `security`. The decrypt key is always
/// `NwkKey`; which MIC scheme applies is only known once the plaintext's
/// OptNeg bit has been read.
pub fn decrypt_and_validate_join_accept<S: SecurityModule>(
    security: &S,
    encrypted: &[u8],
    join_eui: [u8; 8],
    dev_nonce: DevNonce,
) -> Option<JoinAcceptFields> {
    if encrypted.len() != 16 && encrypted.len() != 32 {
        return None;
    }
    let mut plain = [0u8; 32];
    plain[..encrypted.len()].copy_from_slice(encrypted);
    for chunk in plain[..encrypted.len()].chunks_mut(16) {
        let mut block = [0u8; 16];
        block.copy_from_slice(chunk);
        security.ecb(KeyTarget::NwkKey, &mut block);
        chunk.copy_from_slice(&block);
    }

    let msg = &plain[..encrypted.len() - 4];
    let mic_bytes = &plain[encrypted.len() - 4..encrypted.len()];
    let received = u32::from_le_bytes([mic_bytes[0], mic_bytes[1], mic_bytes[2], mic_bytes[3]]);

    let dl_settings = plain[10];
    let opt_neg = dl_settings & 0x80 != 0;
    let computed = if opt_neg {
        let mut prefix = [0u8; 11];
        prefix[0] = 0xFF; // JoinReqType byte for a plain OTAA join.
        for i in 0..8 {
            prefix[1 + i] = join_eui[7 - i];
        }
        prefix[9..11].copy_from_slice(&dev_nonce.0.to_le_bytes());
        security.mic(KeyTarget::JSIntKey, &prefix, msg)
    } else {
        security.mic(KeyTarget::NwkKey, &[], msg)
    };
    if computed != received {
        return None;
    }

    let app_nonce = AppNonce(u32::from(plain[0]) | (u32::from(plain[1]) << 8) | (u32::from(plain[2]) << 16));
    let net_id = NetId(u32::from(plain[3]) | (u32::from(plain[4]) << 8) | (u32::from(plain[5]) << 16));
    let dev_addr = DevAddr(u32::from_le_bytes([plain[6], plain[7], plain[8], plain[9]]));
    let rx_delay_raw = plain[11] & 0x0f;
    let cf_list = if encrypted.len() > 16 {
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&plain[12..28]);
        Some(parse_cflist(&raw))
    } else {
        None
    };

    Some(JoinAcceptFields {
        app_nonce,
        net_id,
        dev_addr,
        opt_neg,
        rx1_dr_offset: (dl_settings >> 4) & 0x07,
        rx2_data_rate: dl_settings & 0x0f,
        rx_delay_raw,
        cf_list,
    })
}

/// Applies a validated [`JoinAcceptFields`] to `session`: derives and
/// stores session keys in `security`, sets addressing and RX parameters,
/// and folds in any CFList the network offered.
pub fn apply_join_accept<S: SecurityModule>(
    session: &mut Session,
    security: &mut S,
    table: &dyn RegionTable,
    accept: &JoinAcceptFields,
    dev_nonce: DevNonce,
    join_eui: [u8; 8],
    dev_eui: [u8; 8],
) {
    let version = if accept.opt_neg { mac_encoding::types::Version::V1_1 } else { mac_encoding::types::Version::V1_0 };
    let ctx = DerivationContext {
        version,
        join_nonce: mac_encoding::types::JoinNonce(accept.app_nonce.value()),
        net_id: accept.net_id,
        join_eui,
        dev_eui,
        dev_nonce,
    };
    security.begin_update();
    if accept.opt_neg {
        session.version = Version::V1_1;
        security.update_session_key(KeyTarget::FNwkSIntKey, KeyTarget::NwkKey, &ctx);
        security.update_session_key(KeyTarget::SNwkSIntKey, KeyTarget::NwkKey, &ctx);
        security.update_session_key(KeyTarget::NwkSEncKey, KeyTarget::NwkKey, &ctx);
        security.update_session_key(KeyTarget::AppSKey, KeyTarget::AppKey, &ctx);
    } else {
        session.version = Version::V1_0;
        security.update_session_key(KeyTarget::FNwkSIntKey, KeyTarget::NwkKey, &ctx);
        security.update_session_key(KeyTarget::SNwkSIntKey, KeyTarget::NwkKey, &ctx);
        security.update_session_key(KeyTarget::NwkSEncKey, KeyTarget::NwkKey, &ctx);
        security.update_session_key(KeyTarget::AppSKey, KeyTarget::NwkKey, &ctx);
    }
    security.end_update();

    session.dev_addr = accept.dev_addr;
    session.net_id = accept.net_id.value();
    session.rx1_dr_offset = accept.rx1_dr_offset;
    session.rx2_rate = accept.rx2_data_rate;
    // spec design note (iii): an RxDelay of 0 is coerced to one second by
    // the MAC layer (the codec deliberately left this field raw here too).
    session.rx1_delay = if accept.rx_delay_raw == 0 { 1 } else { accept.rx_delay_raw };
    session.up_counter = 0;
    session.nwk_down_counter = 0;
    session.app_down_counter = 0;
    session.joined = true;

    if let Some(cf_list) = &accept.cf_list {
        apply_cflist(session, table, cf_list);
    }
}

fn apply_cflist(session: &mut Session, table: &dyn RegionTable, cf_list: &CfList) {
    match cf_list {
        CfList::DynamicChannel(freqs) => {
            for (i, freq) in freqs.iter().enumerate() {
                if *freq == 0 {
                    continue;
                }
                let slot_index = i + 3; // the first 3 slots are the join channels.
                if slot_index < crate::session::NUM_CHANNEL_SLOTS {
                    session.channels[slot_index] =
                        ChannelSlot { freq_100hz: *freq, min_dr: 0, max_dr: table.num_datarates() - 1, enabled: true };
                }
            }
        }
        CfList::FixedChannelMask(raw) => {
            for (byte_idx, byte) in raw.iter().take(9).enumerate() {
                for bit in 0..8 {
                    let ch = byte_idx * 8 + bit;
                    if ch < crate::session::NUM_MASK_CHANNELS {
                        session.channel_mask[ch] = byte & (1 << bit) != 0;
                    }
                }
            }
        }
    }
}

/// Builds a JoinRequest PHY payload into `out` via the opaque
/// [`SecurityModule`] (MIC under `NwkKey`), returning the 23-byte slice
/// written.
pub fn build_join_request<'a, S: SecurityModule>(
    out: &'a mut [u8],
    security: &S,
    join_eui: [u8; 8],
    dev_eui: [u8; 8],
    dev_nonce: DevNonce,
) -> Option<&'a [u8]> {
    if out.len() < 23 {
        return None;
    }
    out[0] = 0x00; // MHDR: MType=JoinRequest, RFU/Major=0.
    for i in 0..8 {
        out[1 + i] = join_eui[7 - i];
        out[9 + i] = dev_eui[7 - i];
    }
    out[17] = dev_nonce.0 as u8;
    out[18] = (dev_nonce.0 >> 8) as u8;
    let mic = security.mic(KeyTarget::NwkKey, &[], &out[..19]);
    out[19..23].copy_from_slice(&mic.to_le_bytes());
    Some(&out[..23])
}
