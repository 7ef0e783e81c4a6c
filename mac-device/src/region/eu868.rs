use super::{ChannelPlanKind, DataRateInfo, RegionId, RegionTable};
use crate::band::Band;
use crate::session::{ChannelSlot, NUM_CHANNEL_SLOTS};
use lora_modulation::{Bandwidth, SpreadingFactor};

const DATARATES: [DataRateInfo; 7] = [
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_12, max_payload_size: 59 },
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_11, max_payload_size: 59 },
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_10, max_payload_size: 59 },
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_9, max_payload_size: 123 },
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_8, max_payload_size: 250 },
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_7, max_payload_size: 250 },
    DataRateInfo { bandwidth: Bandwidth::_250KHz, spreading_factor: SpreadingFactor::_7, max_payload_size: 250 },
];

const JOIN_CHANNELS_100HZ: [u32; 3] = [8_681_000, 8_683_000, 8_685_000];
const RX2_FREQ_100HZ: u32 = 8_695_250;

pub struct Eu868;

impl RegionTable for Eu868 {
    fn id(&self) -> RegionId {
        RegionId::EU868
    }
    fn plan_kind(&self) -> ChannelPlanKind {
        ChannelPlanKind::Dynamic
    }
    fn datarate(&self, dr: u8) -> Option<DataRateInfo> {
        DATARATES.get(dr as usize).copied()
    }
    fn num_datarates(&self) -> u8 {
        DATARATES.len() as u8
    }
    fn tx_power_dbm(&self, index: u8) -> Option<i8> {
        // EU868 TXPower 0..7, 2 dB steps down from 16 dBm (ETSI ERP ceiling).
        if index > 7 {
            None
        } else {
            Some(16 - 2 * index as i8)
        }
    }
    fn rx1_datarate(&self, tx_dr: u8, offset: u8) -> u8 {
        // DR(RX1) = max(DR(TX) - offset, 0), clamped to the table.
        tx_dr.saturating_sub(offset).min(self.num_datarates() - 1)
    }
    fn rx2_default_freq(&self) -> u32 {
        RX2_FREQ_100HZ
    }
    fn rx2_default_dr(&self) -> u8 {
        0
    }
    fn default_channels(&self) -> [ChannelSlot; NUM_CHANNEL_SLOTS] {
        let mut channels = [ChannelSlot::default(); NUM_CHANNEL_SLOTS];
        for (i, freq) in JOIN_CHANNELS_100HZ.iter().enumerate() {
            channels[i] = ChannelSlot { freq_100hz: *freq, min_dr: 0, max_dr: 5, enabled: true };
        }
        channels
    }
    fn band_for_freq(&self, freq_100hz: u32) -> Band {
        // EU868 splits 868.0-868.6 MHz (Band1, 1% duty) from 869.4-869.65
        // MHz (Band3, 10% duty, used for RX2); everything else collapses
        // to Band2 at the stricter 1% default.
        if (8_694_000..=8_696_500).contains(&freq_100hz) {
            Band::Band3
        } else if (8_680_000..=8_686_000).contains(&freq_100hz) {
            Band::Band1
        } else {
            Band::Band2
        }
    }
    fn off_time_factor(&self, band: Band) -> u32 {
        match band {
            Band::Band1 | Band::Band2 => 99, // 1% duty cycle
            Band::Band3 => 9,                // 10% duty cycle
            Band::Retry => 99,
            Band::Band4 | Band::Band5 | Band::Global => 0,
        }
    }
}
