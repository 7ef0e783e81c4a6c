//! The `Radio` capability (spec §6): the sub-GHz transceiver driver the MAC
//! schedules against. Implemented by the host for whatever chip is on the
//! board (SX1272/SX1276/SX126x/...); the MAC only ever sees this trait.

use lora_modulation::{Bandwidth, SpreadingFactor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct TxSettings {
    pub freq: u32,
    pub bandwidth: Bandwidth,
    pub spreading_factor: SpreadingFactor,
    pub dbm: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RxSettings {
    pub freq: u32,
    pub bandwidth: Bandwidth,
    pub spreading_factor: SpreadingFactor,
    /// Symbol timeout for the preamble detector.
    pub symbol_timeout: u16,
    pub max_len: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RxMeta {
    pub rssi: i16,
    pub snr: i8,
    pub freq: u32,
}

/// Notification delivered from the radio ISR; the MAC's `radio_event` must
/// tolerate being reentered by this while `process()` is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum RadioEvent {
    TxComplete,
    RxReady,
    RxTimeout,
}

pub trait Radio {
    /// Holds the chip in reset (`true`) or releases it (`false`).
    fn reset(&mut self, hold: bool);
    fn sleep(&mut self);
    fn clear_interrupt(&mut self);

    /// Begins wideband RSSI sampling used to seed the entropy pool at startup.
    fn entropy_begin(&mut self);
    fn entropy_end(&mut self) -> u32;

    fn transmit(&mut self, settings: TxSettings, payload: &[u8]);
    fn receive(&mut self, settings: RxSettings);

    /// Copies a received frame into `out`, returning its length, or `0` if
    /// nothing is queued.
    fn collect(&mut self, meta: &mut RxMeta, out: &mut [u8]) -> usize;

    /// Minimum usable SNR at a given spreading factor, for diagnostics.
    fn min_snr(&self, spreading_factor: SpreadingFactor) -> i8;
}
