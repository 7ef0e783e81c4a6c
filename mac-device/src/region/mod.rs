//! Per-region constants (spec §4.5 data, component D): channel plan,
//! data-rate table, TX-power table, RX timing defaults, duty-cycle bands
//! and join-retry schedule.

mod au915;
mod eu433;
mod eu868;
mod us915;

use crate::band::Band;
use crate::session::ChannelSlot;
use lora_modulation::{Bandwidth, SpreadingFactor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegionId {
    #[cfg(feature = "region-eu868")]
    EU868,
    #[cfg(feature = "region-eu433")]
    EU433,
    #[cfg(feature = "region-us915")]
    US915,
    #[cfg(feature = "region-au915")]
    AU915,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPlanKind {
    /// EU-style: 16 device-managed channel slots, NewChannel-extensible.
    Dynamic,
    /// US/AU-style: 72 fixed channels selected by a bitmask.
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct DataRateInfo {
    pub bandwidth: Bandwidth,
    pub spreading_factor: SpreadingFactor,
    pub max_payload_size: u8,
}

/// Per-region constant table, selected at runtime via [`Configuration`].
pub trait RegionTable {
    fn id(&self) -> RegionId;
    fn plan_kind(&self) -> ChannelPlanKind;

    fn datarate(&self, dr: u8) -> Option<DataRateInfo>;
    fn num_datarates(&self) -> u8;

    fn tx_power_dbm(&self, index: u8) -> Option<i8>;

    /// `rx1_dr = f(tx_dr, rx1_dr_offset)`.
    fn rx1_datarate(&self, tx_dr: u8, offset: u8) -> u8;
    fn rx1_delay_default_s(&self) -> u8 {
        1
    }
    fn rx2_default_freq(&self) -> u32;
    fn rx2_default_dr(&self) -> u8;

    fn join_accept_delay1_ms(&self) -> u32 {
        5000
    }
    fn join_accept_delay2_ms(&self) -> u32 {
        6000
    }

    /// Default dynamic-plan channel slots (the three join channels); empty
    /// for fixed-plan regions.
    fn default_channels(&self) -> [ChannelSlot; crate::session::NUM_CHANNEL_SLOTS];
    /// Default fixed-plan mask (all 72 on); unused for dynamic-plan regions.
    fn default_channel_mask(&self) -> [bool; crate::session::NUM_MASK_CHANNELS] {
        [true; crate::session::NUM_MASK_CHANNELS]
    }

    /// Frequency (in 100 Hz units) of fixed-plan channel `index`.
    fn fixed_channel_freq(&self, _index: usize) -> u32 {
        0
    }
    /// RX1 frequency given the uplink channel index and its frequency.
    /// Dynamic-plan regions reuse the uplink frequency; fixed-plan regions
    /// map the 64/8 uplink channels down onto 8 RX1 channels.
    fn rx1_freq(&self, _tx_ch_index: usize, tx_freq_100hz: u32) -> u32 {
        tx_freq_100hz
    }
    /// Data-rate bracket of fixed-plan channel `index` (125 kHz vs 500 kHz
    /// sub-band).
    fn fixed_channel_dr_range(&self, _index: usize) -> (u8, u8) {
        (0, 0)
    }

    /// Which duty-cycle band a frequency (100 Hz units) belongs to.
    fn band_for_freq(&self, freq_100hz: u32) -> Band;
    /// Off-time multiplier for a band (e.g. 99 for a 1% band, 0 for bands
    /// with no regulatory duty-cycle limit).
    fn off_time_factor(&self, band: Band) -> u32;
    /// Duty-cycle-off ceiling applied when retrying an unconfirmed frame.
    fn max_dcycle_off_limit(&self) -> u32 {
        0
    }

    /// ChMaskCntl special codes (component C LinkADR/NewChannel): `6` means
    /// "all 125 kHz channels on", `7` means "all off", for fixed-plan
    /// regions. Dynamic-plan regions never receive these codes.
    fn apply_mask_control(&self, _cntl: u8, _mask: &mut [bool; crate::session::NUM_MASK_CHANNELS]) -> bool {
        false
    }
}

/// Dispatches to the region selected at construction time. One instance per
/// device; swapped only by `forget()` + re-provisioning.
pub enum Configuration {
    #[cfg(feature = "region-eu868")]
    EU868(eu868::Eu868),
    #[cfg(feature = "region-eu433")]
    EU433(eu433::Eu433),
    #[cfg(feature = "region-us915")]
    US915(us915::Us915),
    #[cfg(feature = "region-au915")]
    AU915(au915::Au915),
}

impl Configuration {
    pub fn new(region: RegionId) -> Self {
        match region {
            #[cfg(feature = "region-eu868")]
            RegionId::EU868 => Configuration::EU868(eu868::Eu868),
            #[cfg(feature = "region-eu433")]
            RegionId::EU433 => Configuration::EU433(eu433::Eu433),
            #[cfg(feature = "region-us915")]
            RegionId::US915 => Configuration::US915(us915::Us915),
            #[cfg(feature = "region-au915")]
            RegionId::AU915 => Configuration::AU915(au915::Au915),
        }
    }

    pub fn table(&self) -> &dyn RegionTable {
        match self {
            #[cfg(feature = "region-eu868")]
            Configuration::EU868(r) => r,
            #[cfg(feature = "region-eu433")]
            Configuration::EU433(r) => r,
            #[cfg(feature = "region-us915")]
            Configuration::US915(r) => r,
            #[cfg(feature = "region-au915")]
            Configuration::AU915(r) => r,
        }
    }
}
