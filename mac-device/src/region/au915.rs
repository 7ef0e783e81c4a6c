use super::{ChannelPlanKind, DataRateInfo, RegionId, RegionTable};
use crate::band::Band;
use crate::session::{ChannelSlot, NUM_CHANNEL_SLOTS, NUM_MASK_CHANNELS};
use lora_modulation::{Bandwidth, SpreadingFactor};

const DATARATES: [DataRateInfo; 6] = [
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_12, max_payload_size: 59 },
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_11, max_payload_size: 59 },
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_10, max_payload_size: 19 },
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_9, max_payload_size: 61 },
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_8, max_payload_size: 133 },
    DataRateInfo { bandwidth: Bandwidth::_125KHz, spreading_factor: SpreadingFactor::_7, max_payload_size: 250 },
];

const BASE_125KHZ_100HZ: u32 = 9_152_000;
const STEP_125KHZ_100HZ: u32 = 2_000;
const BASE_500KHZ_100HZ: u32 = 9_159_000;
const STEP_500KHZ_100HZ: u32 = 16_000;
const RX2_FREQ_100HZ: u32 = 9_233_000;

pub struct Au915;

impl RegionTable for Au915 {
    fn id(&self) -> RegionId {
        RegionId::AU915
    }
    fn plan_kind(&self) -> ChannelPlanKind {
        ChannelPlanKind::Fixed
    }
    fn datarate(&self, dr: u8) -> Option<DataRateInfo> {
        DATARATES.get(dr as usize).copied()
    }
    fn num_datarates(&self) -> u8 {
        DATARATES.len() as u8
    }
    fn tx_power_dbm(&self, index: u8) -> Option<i8> {
        if index > 14 {
            None
        } else {
            Some(30 - 2 * index as i8)
        }
    }
    fn rx1_datarate(&self, tx_dr: u8, offset: u8) -> u8 {
        tx_dr.saturating_sub(offset).min(self.num_datarates() - 1)
    }
    fn rx2_default_freq(&self) -> u32 {
        RX2_FREQ_100HZ
    }
    fn rx2_default_dr(&self) -> u8 {
        8
    }
    fn default_channels(&self) -> [ChannelSlot; NUM_CHANNEL_SLOTS] {
        [ChannelSlot::default(); NUM_CHANNEL_SLOTS]
    }
    fn default_channel_mask(&self) -> [bool; NUM_MASK_CHANNELS] {
        [true; NUM_MASK_CHANNELS]
    }
    fn fixed_channel_freq(&self, index: usize) -> u32 {
        if index < 64 {
            BASE_125KHZ_100HZ + index as u32 * STEP_125KHZ_100HZ
        } else {
            BASE_500KHZ_100HZ + (index - 64) as u32 * STEP_500KHZ_100HZ
        }
    }
    fn fixed_channel_dr_range(&self, index: usize) -> (u8, u8) {
        if index < 64 {
            (0, 5)
        } else {
            (6, 6)
        }
    }
    fn band_for_freq(&self, _freq_100hz: u32) -> Band {
        Band::Band1
    }
    fn off_time_factor(&self, _band: Band) -> u32 {
        0
    }
    fn apply_mask_control(&self, cntl: u8, mask: &mut [bool; NUM_MASK_CHANNELS]) -> bool {
        match cntl {
            6 => {
                mask[..64].fill(true);
                true
            }
            7 => {
                mask[..64].fill(false);
                true
            }
            _ => false,
        }
    }
    fn rx1_freq(&self, tx_ch_index: usize, _tx_freq_100hz: u32) -> u32 {
        RX2_FREQ_100HZ + (tx_ch_index % 8) as u32 * 6_000
    }
}
