//! A Class-A LoRaWAN 1.0.x/1.1 MAC scheduler: join/data state machine,
//! region tables, duty-cycle accounting and ADR, built on top of the
//! `mac-encoding` wire codec.
//!
//! The host provides three capabilities — [`radio::Radio`],
//! [`system::System`] and [`security::SecurityModule`] — and drives
//! [`mac::Mac::process`] from its main loop plus a radio ISR calling
//! [`mac::Mac::radio_event`]. Everything else (channel selection,
//! duty-cycle bookkeeping, retransmission, ADR, MAC-command handling) is
//! internal.
#![no_std]

mod log;

pub mod airtime;
pub mod band;
pub mod channel;
pub mod error;
pub mod event;
pub mod mac;
pub mod radio;
pub mod region;
pub mod security;
pub mod session;
pub mod system;
pub mod timer;

pub use error::{Errno, Result};
pub use event::Event;
pub use mac::Mac;
pub use region::{Configuration, RegionId};
pub use security::SecurityModule;
#[cfg(feature = "default-crypto")]
pub use security::DefaultSecurityModule;
pub use session::Session;
pub use system::{Identity, RootKeys, System};
