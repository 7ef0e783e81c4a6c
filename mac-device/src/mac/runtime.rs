//! Volatile MAC runtime state (spec §3, "MAC runtime state").

use crate::band::Bands;
use crate::error::Errno;
use crate::mac::commands::AnswerQueue;
use crate::timer::{Inputs, Timers};
use mac_encoding::types::DevNonce;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum MacState {
    Init,
    InitReset,
    InitLockout,
    RecoveryReset,
    RecoveryLockout,
    Entropy,
    Idle,
    WaitTx,
    Tx,
    WaitRx1,
    Rx1,
    WaitRx2,
    Rx2,
    Rx2Lockout,
    WaitRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Op {
    None,
    Joining,
    Rejoining,
    DataUnconfirmed,
    DataConfirmed,
    Reset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct TxDescriptor {
    pub ch_index: usize,
    pub freq: u32,
    pub rate: u8,
    pub power: u8,
}

/// Mac commands owed back to the network on the next uplink, set by
/// downlink processing in [`crate::mac::commands`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct PendingAnswers {
    pub link_check_req: bool,
    pub rx_param_setup_ans: bool,
    pub dl_channel_ans: bool,
    pub rx_timing_setup_ans: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct AdrState {
    pub adr_ack_counter: u32,
    pub adr_ack_req: bool,
}

pub struct Runtime {
    pub state: MacState,
    pub op: Op,
    pub errno: Option<Errno>,
    pub tx: TxDescriptor,
    pub pending: PendingAnswers,
    pub adr: AdrState,
    pub bands: Bands,
    pub last_valid_downlink: u32,
    pub service_start_time: u32,
    pub time_s: u32,
    pub timers: Timers,
    pub inputs: Inputs,
    /// Pending application payload for the in-flight request (OTAA carries
    /// none).
    pub app_payload: heapless::Vec<u8, 222>,
    pub app_fport: u8,
    /// Built over-the-air PHY payload, handed to `Radio::transmit`.
    pub phy_buffer: heapless::Vec<u8, 255>,
    /// Scratch buffer `Radio::collect` copies a received frame into.
    pub rx_buffer: heapless::Vec<u8, 255>,
    /// MAC-command answers queued for the next uplink.
    pub answers: AnswerQueue,
    /// Number of transmissions already attempted for the in-flight request.
    pub trials: u8,
    /// Retry-duty ladder anchor: seconds since this began accumulating.
    pub retry_age_s: u32,
    pub dev_nonce: DevNonce,
}

impl Runtime {
    pub fn new(now_ticks: u32) -> Self {
        Self {
            state: MacState::Init,
            op: Op::None,
            errno: None,
            tx: TxDescriptor::default(),
            pending: PendingAnswers::default(),
            adr: AdrState::default(),
            bands: Bands::new(now_ticks),
            last_valid_downlink: 0,
            service_start_time: now_ticks,
            time_s: 0,
            timers: Timers::default(),
            inputs: Inputs::default(),
            app_payload: heapless::Vec::new(),
            app_fport: 0,
            phy_buffer: heapless::Vec::new(),
            rx_buffer: heapless::Vec::new(),
            answers: AnswerQueue::new(),
            trials: 0,
            retry_age_s: 0,
            dev_nonce: DevNonce(0),
        }
    }
}
