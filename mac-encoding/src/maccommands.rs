//! The thirteen LoRaWAN MAC-command CIDs, each carrying a network-to-device
//! request PDU and/or a device-to-network answer PDU. Ping-slot/beacon
//! commands are parsed and built like any other command for interop (a
//! network server may still probe for them), but the MAC scheduler never
//! acts on their contents since class-B scheduling is out of scope.

#![allow(clippy::len_without_is_empty)]

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    BufferTooShort,
    UnknownCid,
}

pub trait SerializableMacCommand {
    fn cid(&self) -> u8;
    /// Payload length, excluding the CID byte.
    fn len(&self) -> usize;
    fn write_payload(&self, out: &mut [u8]) -> Result<(), Error>;
}

pub fn mac_commands_len(cmds: &[&dyn SerializableMacCommand]) -> usize {
    cmds.iter().map(|c| c.len() + 1).sum()
}

/// Serializes a sequence of commands (CID ‖ payload, repeated) into `out`,
/// returning the number of bytes written.
pub fn write_mac_commands(cmds: &[&dyn SerializableMacCommand], out: &mut [u8]) -> Result<usize, Error> {
    let mut pos = 0;
    for cmd in cmds {
        if pos + 1 + cmd.len() > out.len() {
            return Err(Error::BufferTooShort);
        }
        out[pos] = cmd.cid();
        cmd.write_payload(&mut out[pos + 1..pos + 1 + cmd.len()])?;
        pos += 1 + cmd.len();
    }
    Ok(pos)
}

macro_rules! fixed_cmd {
    ($(#[$outer:meta])* struct $name:ident[cid = $cid:expr, size = $size:expr]) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub [u8; $size]);

        impl $name {
            pub const CID: u8 = $cid;
            pub const LEN: usize = $size;

            pub fn new(data: &[u8]) -> Result<Self, Error> {
                if data.len() != $size {
                    return Err(Error::BufferTooShort);
                }
                let mut b = [0u8; $size];
                b.copy_from_slice(data);
                Ok($name(b))
            }

            pub fn bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl SerializableMacCommand for $name {
            fn cid(&self) -> u8 { Self::CID }
            fn len(&self) -> usize { Self::LEN }
            fn write_payload(&self, out: &mut [u8]) -> Result<(), Error> {
                if out.len() != Self::LEN {
                    return Err(Error::BufferTooShort);
                }
                out.copy_from_slice(&self.0);
                Ok(())
            }
        }
    };
}

// --- LinkCheck (CID 2) ---
fixed_cmd!(
    /// Device → network, no payload: "how's my link?"
    struct LinkCheckReq[cid = 2, size = 0]
);
fixed_cmd!(
    /// Network → device: `Margin(1) ‖ GwCnt(1)`.
    struct LinkCheckAns[cid = 2, size = 2]
);

impl LinkCheckAns {
    pub fn margin(&self) -> u8 {
        self.0[0]
    }
    pub fn gateway_count(&self) -> u8 {
        self.0[1]
    }
}

// --- LinkADR (CID 3) ---
fixed_cmd!(
    /// Network → device: `DataRate|TXPower(1) ‖ ChMask(2 LE) ‖
    /// Redundancy(1)`, `Redundancy = ChMaskCntl(bits 6..4) | NbTrans(bits
    /// 3..0)`.
    struct LinkADRReq[cid = 3, size = 4]
);

impl LinkADRReq {
    pub fn data_rate(&self) -> u8 {
        self.0[0] >> 4
    }
    pub fn tx_power(&self) -> u8 {
        self.0[0] & 0x0f
    }
    pub fn channel_mask(&self) -> u16 {
        u16::from(self.0[1]) | (u16::from(self.0[2]) << 8)
    }
    pub fn channel_mask_control(&self) -> u8 {
        (self.0[3] >> 4) & 0x07
    }
    pub fn nb_trans(&self) -> u8 {
        self.0[3] & 0x0f
    }
}

fixed_cmd!(
    /// Device → network: bit 2 PowerAck, bit 1 DataRateAck, bit 0
    /// ChannelMaskAck.
    struct LinkADRAns[cid = 3, size = 1]
);

impl LinkADRAns {
    pub fn new_answer(channel_mask_ack: bool, data_rate_ack: bool, power_ack: bool) -> Self {
        let mut v = 0u8;
        if channel_mask_ack {
            v |= 0b001;
        }
        if data_rate_ack {
            v |= 0b010;
        }
        if power_ack {
            v |= 0b100;
        }
        LinkADRAns([v])
    }
    pub fn channel_mask_ack(&self) -> bool {
        self.0[0] & 0b001 != 0
    }
    pub fn data_rate_ack(&self) -> bool {
        self.0[0] & 0b010 != 0
    }
    pub fn power_ack(&self) -> bool {
        self.0[0] & 0b100 != 0
    }
    pub fn all_ack(&self) -> bool {
        self.0[0] & 0b111 == 0b111
    }
}

// --- DutyCycle (CID 4) ---
fixed_cmd!(
    /// Network → device: `MaxDCycle(4 bits)`.
    struct DutyCycleReq[cid = 4, size = 1]
);

impl DutyCycleReq {
    pub fn max_duty_cycle_exp(&self) -> u8 {
        self.0[0] & 0x0f
    }
}

fixed_cmd!(struct DutyCycleAns[cid = 4, size = 0]);

// --- RXParamSetup (CID 5) ---
fixed_cmd!(
    /// Network → device: `DLSettings(1) ‖ Frequency(3 LE)`.
    struct RXParamSetupReq[cid = 5, size = 4]
);

impl RXParamSetupReq {
    pub fn rx1_dr_offset(&self) -> u8 {
        (self.0[0] >> 4) & 0x07
    }
    pub fn rx2_data_rate(&self) -> u8 {
        self.0[0] & 0x0f
    }
    pub fn frequency(&self) -> u32 {
        (u32::from(self.0[1]) | (u32::from(self.0[2]) << 8) | (u32::from(self.0[3]) << 16)) * 100
    }
}

fixed_cmd!(
    /// Device → network: bit 2 RX1DRoffsetACK, bit 1 RX2DataRateACK, bit 0
    /// ChannelACK.
    struct RXParamSetupAns[cid = 5, size = 1]
);

impl RXParamSetupAns {
    pub fn new_answer(channel_ack: bool, rx2_dr_ack: bool, rx1_offset_ack: bool) -> Self {
        let mut v = 0u8;
        if channel_ack {
            v |= 0b001;
        }
        if rx2_dr_ack {
            v |= 0b010;
        }
        if rx1_offset_ack {
            v |= 0b100;
        }
        RXParamSetupAns([v])
    }
    pub fn all_ack(&self) -> bool {
        self.0[0] & 0b111 == 0b111
    }
}

// --- DevStatus (CID 6) ---
fixed_cmd!(struct DevStatusReq[cid = 6, size = 0]);
fixed_cmd!(
    /// Device → network: `Battery(1) ‖ Margin(1, signed 6-bit, -32..31)`.
    struct DevStatusAns[cid = 6, size = 2]
);

impl DevStatusAns {
    pub fn new_answer(battery: u8, margin: i8) -> Self {
        DevStatusAns([battery, (margin & 0x3f) as u8])
    }
    pub fn battery(&self) -> u8 {
        self.0[0]
    }
    pub fn margin(&self) -> i8 {
        let raw = self.0[1] & 0x3f;
        if raw & 0x20 != 0 {
            (raw as i8) - 64
        } else {
            raw as i8
        }
    }
}

// --- NewChannel (CID 7) ---
fixed_cmd!(
    /// Network → device: `ChIndex(1) ‖ Freq(3 LE) ‖ MaxDR|MinDR(1)`.
    struct NewChannelReq[cid = 7, size = 5]
);

impl NewChannelReq {
    pub fn channel_index(&self) -> u8 {
        self.0[0]
    }
    pub fn frequency(&self) -> u32 {
        (u32::from(self.0[1]) | (u32::from(self.0[2]) << 8) | (u32::from(self.0[3]) << 16)) * 100
    }
    pub fn min_data_rate(&self) -> u8 {
        self.0[4] & 0x0f
    }
    pub fn max_data_rate(&self) -> u8 {
        self.0[4] >> 4
    }
}

fixed_cmd!(
    /// Device → network: bit 1 DataRateRangeOk, bit 0 ChannelFreqOk.
    struct NewChannelAns[cid = 7, size = 1]
);

impl NewChannelAns {
    pub fn new_answer(channel_freq_ok: bool, data_rate_range_ok: bool) -> Self {
        let mut v = 0u8;
        if channel_freq_ok {
            v |= 0b01;
        }
        if data_rate_range_ok {
            v |= 0b10;
        }
        NewChannelAns([v])
    }
    pub fn all_ack(&self) -> bool {
        self.0[0] & 0b11 == 0b11
    }
}

// --- RXTimingSetup (CID 8) ---
fixed_cmd!(
    /// Network → device: `Delay(low 4 bits)`; 0 means 1 second (spec §9
    /// design note iii).
    struct RXTimingSetupReq[cid = 8, size = 1]
);

impl RXTimingSetupReq {
    pub fn delay_seconds(&self) -> u8 {
        let raw = self.0[0] & 0x0f;
        if raw == 0 {
            1
        } else {
            raw
        }
    }
}

fixed_cmd!(struct RXTimingSetupAns[cid = 8, size = 0]);

// --- TXParamSetup (CID 9) ---
fixed_cmd!(
    /// Network → device: bit 5 DownlinkDwellTime, bit 4 UplinkDwellTime,
    /// bits 3..0 MaxEIRP index.
    struct TXParamSetupReq[cid = 9, size = 1]
);

impl TXParamSetupReq {
    pub fn downlink_dwell_time(&self) -> bool {
        self.0[0] & 0x20 != 0
    }
    pub fn uplink_dwell_time(&self) -> bool {
        self.0[0] & 0x10 != 0
    }
    pub fn max_eirp_index(&self) -> u8 {
        self.0[0] & 0x0f
    }
}

fixed_cmd!(struct TXParamSetupAns[cid = 9, size = 0]);

// --- DLChannel (CID 10) ---
fixed_cmd!(
    /// Network → device: `ChIndex(1) ‖ Freq(3 LE)`.
    struct DLChannelReq[cid = 10, size = 4]
);

impl DLChannelReq {
    pub fn channel_index(&self) -> u8 {
        self.0[0]
    }
    pub fn frequency(&self) -> u32 {
        (u32::from(self.0[1]) | (u32::from(self.0[2]) << 8) | (u32::from(self.0[3]) << 16)) * 100
    }
}

fixed_cmd!(
    /// Device → network: bit 1 UplinkFreqExists, bit 0 ChannelFreqOk.
    struct DLChannelAns[cid = 10, size = 1]
);

impl DLChannelAns {
    pub fn new_answer(channel_freq_ok: bool, uplink_freq_exists: bool) -> Self {
        let mut v = 0u8;
        if channel_freq_ok {
            v |= 0b01;
        }
        if uplink_freq_exists {
            v |= 0b10;
        }
        DLChannelAns([v])
    }
    pub fn all_ack(&self) -> bool {
        self.0[0] & 0b11 == 0b11
    }
}

// --- PingSlotInfo (CID 16) --- (class-B, codec only)
fixed_cmd!(struct PingSlotInfoReq[cid = 16, size = 1]);
fixed_cmd!(struct PingSlotInfoAns[cid = 16, size = 0]);

// --- PingSlotChannel (CID 17) --- (class-B, codec only)
fixed_cmd!(struct PingSlotChannelReq[cid = 17, size = 4]);
fixed_cmd!(struct PingSlotChannelAns[cid = 17, size = 1]);

// --- BeaconTiming (CID 18) --- (class-B, codec only)
fixed_cmd!(struct BeaconTimingReq[cid = 18, size = 0]);
fixed_cmd!(struct BeaconTimingAns[cid = 18, size = 3]);

// --- BeaconFreq (CID 19) --- (class-B, codec only)
fixed_cmd!(struct BeaconFreqReq[cid = 19, size = 3]);
fixed_cmd!(struct BeaconFreqAns[cid = 19, size = 0]);

/// Commands the device parses out of a downlink (FOpts or FPort=0
/// FRMPayload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum DownlinkMacCommand {
    LinkCheckAns(LinkCheckAns),
    LinkADRReq(LinkADRReq),
    DutyCycleReq(DutyCycleReq),
    RXParamSetupReq(RXParamSetupReq),
    DevStatusReq(DevStatusReq),
    NewChannelReq(NewChannelReq),
    RXTimingSetupReq(RXTimingSetupReq),
    TXParamSetupReq(TXParamSetupReq),
    DLChannelReq(DLChannelReq),
    PingSlotInfoAns(PingSlotInfoAns),
    PingSlotChannelReq(PingSlotChannelReq),
    BeaconTimingAns(BeaconTimingAns),
    BeaconFreqReq(BeaconFreqReq),
}

/// Commands the device builds to append to an uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum UplinkMacCommand {
    LinkCheckReq(LinkCheckReq),
    LinkADRAns(LinkADRAns),
    DutyCycleAns(DutyCycleAns),
    RXParamSetupAns(RXParamSetupAns),
    DevStatusAns(DevStatusAns),
    NewChannelAns(NewChannelAns),
    RXTimingSetupAns(RXTimingSetupAns),
    TXParamSetupAns(TXParamSetupAns),
    DLChannelAns(DLChannelAns),
    PingSlotInfoReq(PingSlotInfoReq),
    PingSlotChannelAns(PingSlotChannelAns),
    BeaconTimingReq(BeaconTimingReq),
    BeaconFreqAns(BeaconFreqAns),
}

impl SerializableMacCommand for UplinkMacCommand {
    fn cid(&self) -> u8 {
        match self {
            UplinkMacCommand::LinkCheckReq(_) => LinkCheckReq::CID,
            UplinkMacCommand::LinkADRAns(_) => LinkADRAns::CID,
            UplinkMacCommand::DutyCycleAns(_) => DutyCycleAns::CID,
            UplinkMacCommand::RXParamSetupAns(_) => RXParamSetupAns::CID,
            UplinkMacCommand::DevStatusAns(_) => DevStatusAns::CID,
            UplinkMacCommand::NewChannelAns(_) => NewChannelAns::CID,
            UplinkMacCommand::RXTimingSetupAns(_) => RXTimingSetupAns::CID,
            UplinkMacCommand::TXParamSetupAns(_) => TXParamSetupAns::CID,
            UplinkMacCommand::DLChannelAns(_) => DLChannelAns::CID,
            UplinkMacCommand::PingSlotInfoReq(_) => PingSlotInfoReq::CID,
            UplinkMacCommand::PingSlotChannelAns(_) => PingSlotChannelAns::CID,
            UplinkMacCommand::BeaconTimingReq(_) => BeaconTimingReq::CID,
            UplinkMacCommand::BeaconFreqAns(_) => BeaconFreqAns::CID,
        }
    }

    fn len(&self) -> usize {
        match self {
            UplinkMacCommand::LinkCheckReq(c) => c.len(),
            UplinkMacCommand::LinkADRAns(c) => c.len(),
            UplinkMacCommand::DutyCycleAns(c) => c.len(),
            UplinkMacCommand::RXParamSetupAns(c) => c.len(),
            UplinkMacCommand::DevStatusAns(c) => c.len(),
            UplinkMacCommand::NewChannelAns(c) => c.len(),
            UplinkMacCommand::RXTimingSetupAns(c) => c.len(),
            UplinkMacCommand::TXParamSetupAns(c) => c.len(),
            UplinkMacCommand::DLChannelAns(c) => c.len(),
            UplinkMacCommand::PingSlotInfoReq(c) => c.len(),
            UplinkMacCommand::PingSlotChannelAns(c) => c.len(),
            UplinkMacCommand::BeaconTimingReq(c) => c.len(),
            UplinkMacCommand::BeaconFreqAns(c) => c.len(),
        }
    }

    fn write_payload(&self, out: &mut [u8]) -> Result<(), Error> {
        match self {
            UplinkMacCommand::LinkCheckReq(c) => c.write_payload(out),
            UplinkMacCommand::LinkADRAns(c) => c.write_payload(out),
            UplinkMacCommand::DutyCycleAns(c) => c.write_payload(out),
            UplinkMacCommand::RXParamSetupAns(c) => c.write_payload(out),
            UplinkMacCommand::DevStatusAns(c) => c.write_payload(out),
            UplinkMacCommand::NewChannelAns(c) => c.write_payload(out),
            UplinkMacCommand::RXTimingSetupAns(c) => c.write_payload(out),
            UplinkMacCommand::TXParamSetupAns(c) => c.write_payload(out),
            UplinkMacCommand::DLChannelAns(c) => c.write_payload(out),
            UplinkMacCommand::PingSlotInfoReq(c) => c.write_payload(out),
            UplinkMacCommand::PingSlotChannelAns(c) => c.write_payload(out),
            UplinkMacCommand::BeaconTimingReq(c) => c.write_payload(out),
            UplinkMacCommand::BeaconFreqAns(c) => c.write_payload(out),
        }
    }
}

/// Parses a stream of downlink MAC commands (as found in FOpts or an
/// FPort=0 FRMPayload) until the buffer is exhausted or a malformed/
/// unrecognized command is found.
pub struct MacCommandIterator<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> MacCommandIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MacCommandIterator { data, index: 0 }
    }
}

impl<'a> Iterator for MacCommandIterator<'a> {
    type Item = DownlinkMacCommand;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.data.len() {
            return None;
        }
        let data = &self.data[self.index..];
        let cid = data[0];
        let consumed_payload_len = match cid {
            LinkCheckAns::CID => LinkCheckAns::LEN,
            LinkADRReq::CID => LinkADRReq::LEN,
            DutyCycleReq::CID => DutyCycleReq::LEN,
            RXParamSetupReq::CID => RXParamSetupReq::LEN,
            DevStatusReq::CID => DevStatusReq::LEN,
            NewChannelReq::CID => NewChannelReq::LEN,
            RXTimingSetupReq::CID => RXTimingSetupReq::LEN,
            TXParamSetupReq::CID => TXParamSetupReq::LEN,
            DLChannelReq::CID => DLChannelReq::LEN,
            PingSlotInfoAns::CID => PingSlotInfoAns::LEN,
            PingSlotChannelReq::CID => PingSlotChannelReq::LEN,
            BeaconTimingAns::CID => BeaconTimingAns::LEN,
            BeaconFreqReq::CID => BeaconFreqReq::LEN,
            _ => return None,
        };
        if data.len() < 1 + consumed_payload_len {
            return None;
        }
        self.index += 1 + consumed_payload_len;
        let payload = &data[1..1 + consumed_payload_len];
        Some(match cid {
            2 => DownlinkMacCommand::LinkCheckAns(LinkCheckAns::new(payload).ok()?),
            3 => DownlinkMacCommand::LinkADRReq(LinkADRReq::new(payload).ok()?),
            4 => DownlinkMacCommand::DutyCycleReq(DutyCycleReq::new(payload).ok()?),
            5 => DownlinkMacCommand::RXParamSetupReq(RXParamSetupReq::new(payload).ok()?),
            6 => DownlinkMacCommand::DevStatusReq(DevStatusReq::new(payload).ok()?),
            7 => DownlinkMacCommand::NewChannelReq(NewChannelReq::new(payload).ok()?),
            8 => DownlinkMacCommand::RXTimingSetupReq(RXTimingSetupReq::new(payload).ok()?),
            9 => DownlinkMacCommand::TXParamSetupReq(TXParamSetupReq::new(payload).ok()?),
            10 => DownlinkMacCommand::DLChannelReq(DLChannelReq::new(payload).ok()?),
            16 => DownlinkMacCommand::PingSlotInfoAns(PingSlotInfoAns::new(payload).ok()?),
            17 => DownlinkMacCommand::PingSlotChannelReq(PingSlotChannelReq::new(payload).ok()?),
            18 => DownlinkMacCommand::BeaconTimingAns(BeaconTimingAns::new(payload).ok()?),
            19 => DownlinkMacCommand::BeaconFreqReq(BeaconFreqReq::new(payload).ok()?),
            _ => unreachable!(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_adr_req_parses_fields() {
        // DataRate=5, TXPower=3, ChMask=0x00FF, ChMaskCntl=0, NbTrans=4
        let req = LinkADRReq::new(&[0x53, 0xFF, 0x00, 0x04]).unwrap();
        assert_eq!(req.data_rate(), 5);
        assert_eq!(req.tx_power(), 3);
        assert_eq!(req.channel_mask(), 0x00FF);
        assert_eq!(req.channel_mask_control(), 0);
        assert_eq!(req.nb_trans(), 4);
    }

    #[test]
    fn rx_timing_setup_coerces_zero_to_one_second() {
        let req = RXTimingSetupReq::new(&[0x00]).unwrap();
        assert_eq!(req.delay_seconds(), 1);
        let req = RXTimingSetupReq::new(&[0x03]).unwrap();
        assert_eq!(req.delay_seconds(), 3);
    }

    #[test]
    fn iterator_stops_on_unknown_cid() {
        let buf = [LinkCheckAns::CID, 10, 2, 0xFF /* unknown cid */];
        let mut it = MacCommandIterator::new(&buf);
        assert!(matches!(it.next(), Some(DownlinkMacCommand::LinkCheckAns(_))));
        assert!(it.next().is_none());
    }

    #[test]
    fn iterator_parses_three_consecutive_commands() {
        let mut buf = [0u8; 16];
        let mut pos = 0;
        buf[pos] = DutyCycleReq::CID;
        buf[pos + 1] = 0x05;
        pos += 2;
        buf[pos] = RXTimingSetupReq::CID;
        buf[pos + 1] = 0x02;
        pos += 2;
        buf[pos] = DevStatusReq::CID;
        pos += 1;
        let mut it = MacCommandIterator::new(&buf[..pos]);
        assert!(matches!(it.next(), Some(DownlinkMacCommand::DutyCycleReq(_))));
        assert!(matches!(it.next(), Some(DownlinkMacCommand::RXTimingSetupReq(_))));
        assert!(matches!(it.next(), Some(DownlinkMacCommand::DevStatusReq(_))));
        assert!(it.next().is_none());
    }
}
