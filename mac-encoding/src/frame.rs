//! LoRaWAN PHY payload encode/decode: `MHDR(1) ‖ MACPayload ‖ MIC(4)`.
//!
//! A single tagged [`Frame`] enum stands in for the C original's one
//! struct-with-nullable-fields representation (spec design note:
//! "Polymorphic frames").

use crate::bytestream::Overrun;
use crate::crypto;
use crate::keys::{CryptoFactory, AES128, MIC};
use crate::maccommands::{mac_commands_len, write_mac_commands, SerializableMacCommand};
use crate::types::{DevAddr, DevNonce, Direction, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    Overrun,
    InvalidMessageType,
    InvalidPayload,
    InvalidMic,
    BufferTooShort,
}

impl From<Overrun> for Error {
    fn from(_: Overrun) -> Self {
        Error::Overrun
    }
}

impl From<crate::maccommands::Error> for Error {
    fn from(_: crate::maccommands::Error) -> Self {
        Error::BufferTooShort
    }
}

/// The seven LoRaWAN frame types; the top three bits of MHDR. The low five
/// bits of MHDR are reserved-zero and rejected if nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum MType {
    JoinRequest = 0,
    JoinAccept = 1,
    UnconfirmedDataUp = 2,
    UnconfirmedDataDown = 3,
    ConfirmedDataUp = 4,
    ConfirmedDataDown = 5,
    RejoinRequest = 6,
}

impl MType {
    fn from_bits(b: u8) -> Result<Self, Error> {
        Ok(match b {
            0 => MType::JoinRequest,
            1 => MType::JoinAccept,
            2 => MType::UnconfirmedDataUp,
            3 => MType::UnconfirmedDataDown,
            4 => MType::ConfirmedDataUp,
            5 => MType::ConfirmedDataDown,
            6 => MType::RejoinRequest,
            _ => return Err(Error::InvalidMessageType),
        })
    }

    pub fn is_uplink(self) -> bool {
        matches!(self, MType::JoinRequest | MType::UnconfirmedDataUp | MType::ConfirmedDataUp | MType::RejoinRequest)
    }

    pub fn is_confirmed(self) -> bool {
        matches!(self, MType::ConfirmedDataUp | MType::ConfirmedDataDown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MHDR(pub u8);

impl MHDR {
    pub fn new(mtype: MType) -> Self {
        MHDR((mtype as u8) << 5)
    }

    pub fn mtype(&self) -> Result<MType, Error> {
        if self.0 & 0x1f != 0 {
            return Err(Error::InvalidPayload);
        }
        MType::from_bits(self.0 >> 5)
    }
}

/// `adr(7) | adrAckReq(6) | ack(5) | pending(4) | FOptsLen(3..0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FCtrl(pub u8);

impl FCtrl {
    pub fn new(adr: bool, adr_ack_req: bool, ack: bool, f_pending: bool, f_opts_len: u8) -> Self {
        let mut v = f_opts_len & 0x0f;
        if adr {
            v |= 0x80;
        }
        if adr_ack_req {
            v |= 0x40;
        }
        if ack {
            v |= 0x20;
        }
        if f_pending {
            v |= 0x10;
        }
        FCtrl(v)
    }

    pub fn adr(&self) -> bool {
        self.0 & 0x80 != 0
    }
    pub fn adr_ack_req(&self) -> bool {
        self.0 & 0x40 != 0
    }
    pub fn ack(&self) -> bool {
        self.0 & 0x20 != 0
    }
    pub fn f_pending(&self) -> bool {
        self.0 & 0x10 != 0
    }
    pub fn f_opts_len(&self) -> u8 {
        self.0 & 0x0f
    }
}

pub fn fhdr_length(fctrl_byte: u8) -> usize {
    7 + (fctrl_byte & 0x0f) as usize
}

/// A decoded data up/down frame, borrowing from the input buffer. FOpts and
/// FRMPayload are still in their on-the-wire (possibly encrypted) form;
/// use [`crate::crypto`] to decrypt after MIC validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFrame<'a> {
    pub mtype: MType,
    pub dev_addr: DevAddr,
    pub fctrl: FCtrl,
    pub fcnt16: u16,
    pub fopts: &'a [u8],
    pub fport: Option<u8>,
    pub frm_payload: &'a [u8],
    pub mic: MIC,
}

impl<'a> DataFrame<'a> {
    /// Everything except the trailing MIC: used as the authentication
    /// message for B0/B1-backed MIC computation.
    pub fn mic_message<'b>(&self, full_frame: &'b [u8]) -> &'b [u8] {
        &full_frame[..full_frame.len() - 4]
    }
}

/// Decodes any PHY payload and routes it to the matching variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    JoinRequest { join_eui: [u8; 8], dev_eui: [u8; 8], dev_nonce: DevNonce, mic: MIC },
    /// Still encrypted; caller must decrypt with the right root key before
    /// trusting any field other than presence of a CFList.
    JoinAccept { encrypted: &'a [u8], has_cflist: bool },
    Data(DataFrame<'a>),
}

pub fn decode(buf: &[u8]) -> Result<Frame<'_>, Error> {
    if buf.is_empty() {
        return Err(Error::InvalidPayload);
    }
    let mtype = MHDR(buf[0]).mtype()?;
    match mtype {
        MType::JoinRequest => {
            if buf.len() != 23 {
                return Err(Error::InvalidPayload);
            }
            let join_eui = reversed(&buf[1..9]);
            let dev_eui = reversed(&buf[9..17]);
            let dev_nonce = DevNonce(u16::from(buf[17]) | (u16::from(buf[18]) << 8));
            let mic = MIC([buf[19], buf[20], buf[21], buf[22]]);
            Ok(Frame::JoinRequest { join_eui, dev_eui, dev_nonce, mic })
        }
        MType::JoinAccept => {
            if buf.len() != 17 && buf.len() != 33 {
                return Err(Error::InvalidPayload);
            }
            Ok(Frame::JoinAccept { encrypted: &buf[1..], has_cflist: buf.len() == 33 })
        }
        MType::UnconfirmedDataUp
        | MType::UnconfirmedDataDown
        | MType::ConfirmedDataUp
        | MType::ConfirmedDataDown => decode_data(buf, mtype),
        MType::RejoinRequest => Err(Error::InvalidPayload),
    }
}

fn reversed(b: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    for i in 0..8 {
        out[i] = b[7 - i];
    }
    out
}

fn decode_data(buf: &[u8], mtype: MType) -> Result<Frame<'_>, Error> {
    if buf.len() < 1 + 7 + 4 {
        return Err(Error::InvalidPayload);
    }
    let dev_addr = DevAddr(u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]));
    let fctrl = FCtrl(buf[5]);
    let fcnt16 = u16::from(buf[6]) | (u16::from(buf[7]) << 8);
    let fhdr_len = fhdr_length(fctrl.0);
    if buf.len() < 1 + fhdr_len + 4 {
        return Err(Error::InvalidPayload);
    }
    let fopts = &buf[8..1 + fhdr_len];
    let rest = &buf[1 + fhdr_len..buf.len() - 4];
    let (fport, frm_payload) = if rest.is_empty() {
        (None, rest)
    } else {
        let fport = rest[0];
        if fport == 0 && fctrl.f_opts_len() != 0 {
            return Err(Error::InvalidPayload);
        }
        (Some(fport), &rest[1..])
    };
    let mic_bytes = &buf[buf.len() - 4..];
    let mic = MIC([mic_bytes[0], mic_bytes[1], mic_bytes[2], mic_bytes[3]]);
    Ok(Frame::Data(DataFrame { mtype, dev_addr, fctrl, fcnt16, fopts, fport, frm_payload, mic }))
}

/// Builds a JoinRequest PHY payload into `out`, returning the 23-byte
/// slice written.
pub fn build_join_request<'a, F: CryptoFactory>(
    out: &'a mut [u8],
    factory: &F,
    nwk_key: &AES128,
    join_eui: [u8; 8],
    dev_eui: [u8; 8],
    dev_nonce: DevNonce,
) -> Result<&'a [u8], Error> {
    if out.len() < 23 {
        return Err(Error::BufferTooShort);
    }
    out[0] = MHDR::new(MType::JoinRequest).0;
    for i in 0..8 {
        out[1 + i] = join_eui[7 - i];
        out[9 + i] = dev_eui[7 - i];
    }
    out[17] = dev_nonce.0 as u8;
    out[18] = (dev_nonce.0 >> 8) as u8;
    let mic = crypto::join_request_mic(factory, nwk_key, &out[..19]);
    out[19..23].copy_from_slice(&mic.to_le_bytes());
    Ok(&out[..23])
}

/// Parameters needed to build and authenticate/encrypt a data frame.
/// Mirrors the session fields named in spec §3.
pub struct DataFrameParams<'a> {
    pub confirmed: bool,
    pub dev_addr: DevAddr,
    pub fctrl: FCtrl,
    pub fcnt16: u16,
    pub fcnt32: u32,
    pub mac_commands: &'a [&'a dyn SerializableMacCommand],
    pub fport: Option<u8>,
    pub frm_payload: &'a [u8],
    pub version: Version,
    pub f_nwk_s_int_key: &'a AES128,
    pub s_nwk_s_int_key: &'a AES128,
    pub nwk_s_enc_key: &'a AES128,
    pub app_s_key: &'a AES128,
    pub conf_fcnt_down: u16,
    pub tx_dr: u8,
    pub tx_ch: u8,
}

/// Builds an uplink data frame: encrypts FRMPayload (and, in 1.1, FOpts)
/// in place and computes the MIC per spec §4.4.
pub fn build_data_uplink<'a, F: CryptoFactory>(
    out: &'a mut [u8],
    factory: &F,
    p: &DataFrameParams,
) -> Result<&'a [u8], Error> {
    let fopts_len = mac_commands_len(p.mac_commands);
    if fopts_len > 15 {
        return Err(Error::BufferTooShort);
    }
    let fport_len = if p.fport.is_some() { 1 } else { 0 };
    let total = 1 + 7 + fopts_len + fport_len + p.frm_payload.len() + 4;
    if out.len() < total {
        return Err(Error::BufferTooShort);
    }
    let mtype = if p.confirmed { MType::ConfirmedDataUp } else { MType::UnconfirmedDataUp };
    out[0] = MHDR::new(mtype).0;
    out[1..5].copy_from_slice(&p.dev_addr.0.to_le_bytes());
    let fctrl = FCtrl::new(
        p.fctrl.adr(),
        p.fctrl.adr_ack_req(),
        p.fctrl.ack(),
        p.fctrl.f_pending(),
        fopts_len as u8,
    );
    out[5] = fctrl.0;
    out[6..8].copy_from_slice(&p.fcnt16.to_le_bytes());
    let fopts_start = 8;
    write_mac_commands(p.mac_commands, &mut out[fopts_start..fopts_start + fopts_len])?;

    if matches!(p.version, Version::V1_1) && fopts_len > 0 {
        crypto::ctr_xor(
            factory,
            p.nwk_s_enc_key,
            Direction::Up,
            p.dev_addr,
            p.fcnt32,
            &mut out[fopts_start..fopts_start + fopts_len],
        );
    }

    let mut pos = fopts_start + fopts_len;
    if let Some(fport) = p.fport {
        out[pos] = fport;
        pos += 1;
        let payload_start = pos;
        out[pos..pos + p.frm_payload.len()].copy_from_slice(p.frm_payload);
        let key = if fport == 0 { p.nwk_s_enc_key } else { p.app_s_key };
        crypto::ctr_xor(
            factory,
            key,
            Direction::Up,
            p.dev_addr,
            p.fcnt32,
            &mut out[payload_start..payload_start + p.frm_payload.len()],
        );
        pos += p.frm_payload.len();
    }

    let msg_len = pos;
    let mic = match p.version {
        Version::V1_0 => {
            let b0 = crypto::b0(Direction::Up, p.dev_addr, p.fcnt32, msg_len as u8);
            crypto::mic_1_0(factory, p.f_nwk_s_int_key, &b0, &out[..msg_len])
        }
        Version::V1_1 => {
            let b1 = crypto::b1(
                Direction::Up,
                p.conf_fcnt_down,
                p.tx_dr,
                p.tx_ch,
                p.dev_addr,
                p.fcnt32,
                msg_len as u8,
            );
            let b0 = crypto::b0(Direction::Up, p.dev_addr, p.fcnt32, msg_len as u8);
            crypto::mic_1_1(factory, p.s_nwk_s_int_key, p.f_nwk_s_int_key, &b1, &b0, &out[..msg_len])
        }
    };
    out[pos..pos + 4].copy_from_slice(&mic.to_le_bytes());
    Ok(&out[..pos + 4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mhdr_rejects_nonzero_low_bits() {
        let m = MHDR(0x41); // mtype=2, low bits = 0x01
        assert_eq!(m.mtype(), Err(Error::InvalidPayload));
    }

    #[test]
    fn decode_rejects_fport_zero_with_fopts() {
        // FOptsLen=1 but FPort present as 0: malformed per spec §4.2.
        let mut buf = [0u8; 14];
        buf[0] = MHDR::new(MType::UnconfirmedDataUp).0;
        buf[5] = FCtrl::new(false, false, false, false, 1).0;
        // fopts byte at idx 8, fport at idx 9
        buf[9] = 0x00;
        assert_eq!(decode(&buf), Err(Error::InvalidPayload));
    }

    #[test]
    fn fhdr_length_matches_fopts_len() {
        assert_eq!(fhdr_length(0x00), 7);
        assert_eq!(fhdr_length(0x0f), 22);
    }
}
