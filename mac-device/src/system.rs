//! The `System` capability (spec §6): the host-platform port for
//! timekeeping, entropy, identity and session persistence.

use mac_encoding::keys::AES128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Identity {
    pub dev_eui: [u8; 8],
    pub join_eui: [u8; 8],
}

/// Root keys the host keeps outside of `Session`; only ever read by
/// [`crate::security::SecurityModule`] implementations.
#[derive(Clone, Copy)]
pub struct RootKeys {
    pub nwk_key: AES128,
    pub app_key: AES128,
}

pub trait System {
    /// Free-running tick counter, rate in `[10 kHz, 1 MHz]` (see `tps()`).
    fn ticks(&self) -> u32;
    /// Tick rate, ticks per second.
    fn tps(&self) -> u32;
    /// Crystal error, in ticks per second.
    fn eps(&self) -> u32;
    fn rand(&mut self) -> u8;
    fn battery_level(&self) -> u8;
    /// Compensation for ISR dispatch latency, in ticks.
    fn advance(&self) -> u32;
    fn identity(&self) -> Identity;

    fn restore_session(&self) -> Option<crate::session::Session>;
    fn save_session(&mut self, session: &crate::session::Session);
}
