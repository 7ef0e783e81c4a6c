//! Application-facing event taxonomy (spec §6, component J), emitted
//! synchronously from `process()`. Any variant may be compiled out via the
//! `events-*` feature flags described in `SPEC_FULL.md`.

use crate::error::Errno;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct TxBegin {
    pub freq: u32,
    pub spreading_factor: lora_modulation::SpreadingFactor,
    pub bandwidth: lora_modulation::Bandwidth,
    pub power_dbm: i8,
    pub size: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RxSlot {
    pub freq: u32,
    pub spreading_factor: lora_modulation::SpreadingFactor,
    pub bandwidth: lora_modulation::Bandwidth,
    pub timeout_symbols: u16,
    pub margin_ticks: u32,
    pub error_ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Downstream {
    pub rssi: i16,
    pub snr: i8,
    pub size: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct LinkStatus {
    pub margin: u8,
    pub gateway_count: u8,
    pub in_fopts: bool,
}

/// Borrows the received payload for the duration of the callback; the
/// application must copy out what it needs before returning.
#[derive(Debug, PartialEq, Eq)]
pub struct Rx<'a> {
    pub port: u8,
    pub counter: u32,
    pub data: &'a [u8],
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Event<'a> {
    Startup { entropy: u32 },
    Reset,
    ChipError,
    TxBegin(TxBegin),
    TxComplete,
    Rx1Slot(RxSlot),
    Rx2Slot(RxSlot),
    Downstream(Downstream),
    #[cfg_attr(feature = "defmt-03", defmt(skip))]
    Rx(Rx<'a>),
    LinkStatus(LinkStatus),
    JoinComplete,
    JoinTimeout,
    DataComplete,
    DataTimeout,
    DataNak,
    #[cfg_attr(feature = "defmt-03", defmt(skip))]
    SessionUpdated(Session),
    /// A request-level error reported synchronously to the caller's public
    /// method rather than through `process()`; re-exported here so a host
    /// that logs all MAC activity through one sink can do so uniformly.
    RequestFailed(Errno),
}
