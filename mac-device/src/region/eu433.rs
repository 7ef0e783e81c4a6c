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

const JOIN_CHANNELS_100HZ: [u32; 3] = [4_331_750, 4_333_750, 4_335_750];
const RX2_FREQ_100HZ: u32 = 4_346_650;

pub struct Eu433;

impl RegionTable for Eu433 {
    fn id(&self) -> RegionId {
        RegionId::EU433
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
        if index > 5 {
            None
        } else {
            Some(10 - 2 * index as i8)
        }
    }
    fn rx1_datarate(&self, tx_dr: u8, offset: u8) -> u8 {
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
    fn band_for_freq(&self, _freq_100hz: u32) -> Band {
        // EU433 carries a single 10% duty-cycle band across the whole plan.
        Band::Band1
    }
    fn off_time_factor(&self, band: Band) -> u32 {
        match band {
            Band::Band1 => 9, // 10% duty cycle
            _ => 0,
        }
    }
}
