//! The MAC scheduler (spec §4-§7): the state machine that drives join and
//! data requests to completion across the radio's TX/RX1/RX2 cycle, and the
//! public surface a host application calls into.

pub mod adr;
pub mod commands;
pub mod otaa;
pub mod runtime;
pub mod uplink;

use crate::band::Band;
use crate::channel::{ms_until_next_channel, select_channel};
use crate::error::{Errno, Result};
use crate::event::{Downstream, Event, Rx};
use crate::log;
use crate::radio::{Radio, RadioEvent, RxMeta, RxSettings, TxSettings};
use crate::region::{Configuration, DataRateInfo, RegionTable};
use crate::security::{DerivationContext, KeyTarget, SecurityModule};
use crate::session::{Session, Version as SessionVersion};
use crate::system::{Identity, System};
use crate::timer::{InputId, TimerId};
use mac_encoding::frame::FCtrl;
use mac_encoding::maccommands::{SerializableMacCommand, UplinkMacCommand};
use mac_encoding::types::{DevAddr, DevNonce, JoinNonce, NetId, Version as WireVersion};
use rand_core::RngCore;

use self::commands::{fit_answers_in_fopts, process_downlink_commands, size_errno_if_overflowed, AnswerQueue};
use self::otaa::{apply_join_accept, build_join_request, decrypt_and_validate_join_accept};
use self::runtime::{MacState, Op, Runtime};
use self::uplink::{build_data_frame, decrypt_and_validate_downlink};

/// One day, in seconds: the retry-duty ladder (spec §4.6 tail) resets once
/// a request has been failing continuously for this long.
const RETRY_LADDER_RESET_S: u32 = 86_400;

/// `DATARATES` tables stop short of the downlink-only DR8 (SF12BW500) that
/// US915/AU915 hand out as an RX2 default; anything the table doesn't know
/// falls back to this, a documented simplification rather than padding
/// every fixed-plan table with an entry no uplink may ever select.
const fn rx2_fallback_datarate() -> DataRateInfo {
    DataRateInfo {
        bandwidth: lora_modulation::Bandwidth::_500KHz,
        spreading_factor: lora_modulation::SpreadingFactor::_12,
        max_payload_size: 250,
    }
}

fn datarate_info(table: &dyn RegionTable, dr: u8) -> DataRateInfo {
    table.datarate(dr).unwrap_or_else(rx2_fallback_datarate)
}

fn retry_delay_s(age_s: u32) -> u32 {
    if age_s <= 3600 {
        100
    } else if age_s <= 11 * 3600 {
        1000
    } else {
        10_000
    }
}

/// Adapts [`System::rand`] to an [`RngCore`] for channel selection; the MAC
/// runtime has no other source of randomness.
struct SystemRng<'a, Y: System + ?Sized> {
    system: &'a mut Y,
}

impl<'a, Y: System + ?Sized> RngCore for SystemRng<'a, Y> {
    fn next_u32(&mut self) -> u32 {
        let mut v = 0u32;
        for _ in 0..4 {
            v = (v << 8) | u32::from(self.system.rand());
        }
        v
    }
    fn next_u64(&mut self) -> u64 {
        (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32())
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for b in dest.iter_mut() {
            *b = self.system.rand();
        }
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> core::result::Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

fn default_session(table: &dyn RegionTable) -> Session {
    Session {
        up_counter: 0,
        nwk_down_counter: 0,
        app_down_counter: 0,
        dev_addr: DevAddr::default(),
        net_id: 0,
        channels: table.default_channels(),
        channel_mask: table.default_channel_mask(),
        rate: 0,
        tx_power: 0,
        max_duty_cycle: 0,
        nb_trans: 1,
        rx1_dr_offset: 0,
        rx1_delay: table.rx1_delay_default_s(),
        rx2_rate: table.rx2_default_dr(),
        rx2_freq: table.rx2_default_freq(),
        joined: false,
        adr: true,
        version: SessionVersion::V1_0,
    }
}

/// Maximum confirmed-uplink retransmissions before giving up and reporting
/// `DataNak` (spec leaves the exact ceiling to the implementation).
const MAX_CONFIRMED_TRIALS: u8 = 8;

/// FHDR (DevAddr 4 + FCtrl 1 + FCnt 2) plus FPort: the fixed per-frame
/// overhead `mtu()` must deduct from the region's raw MACPayload limit.
const FRAME_DATA_OVERHEAD: usize = 4 + 1 + 2 + 1;

/// Drives one LoRaWAN end-device's join/data request lifecycle. `Radio` and
/// `System` are capabilities borrowed per call, never stored, so a host can
/// share them across other duties between calls to [`Mac::process`].
pub struct Mac<SM: SecurityModule> {
    runtime: Runtime,
    session: Session,
    config: Configuration,
    security: SM,
    identity: Identity,
}

impl<SM: SecurityModule> Mac<SM> {
    pub fn new(config: Configuration, identity: Identity, security: SM, now_ticks: u32) -> Self {
        let session = default_session(config.table());
        Self { runtime: Runtime::new(now_ticks), session, config, security, identity }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The payload size budget remaining at the current data rate, net of
    /// FHDR, FPort, and any MAC-command answers already queued for the next
    /// uplink.
    pub fn mtu(&self) -> usize {
        let info = datarate_info(self.config.table(), self.session.rate);
        let fopts_len = self.pending_fopts_len();
        (info.max_payload_size as usize).saturating_sub(FRAME_DATA_OVERHEAD).saturating_sub(fopts_len)
    }

    fn pending_fopts_len(&self) -> usize {
        let mut len: usize = self.runtime.answers.iter().map(|c| 1 + c.len()).sum();
        if self.runtime.pending.link_check_req {
            len += 1;
        }
        len
    }

    /// Starts an OTAA join. Fails with [`Errno::Busy`] unless the MAC is
    /// `Idle` with no request already accepted.
    pub fn otaa(&mut self) -> Result<()> {
        if self.runtime.state != MacState::Idle || self.runtime.op != Op::None {
            return Err(Errno::Busy);
        }
        self.runtime.op = Op::Joining;
        self.runtime.trials = 0;
        self.runtime.retry_age_s = 0;
        log::debug!("otaa requested");
        Ok(())
    }

    pub fn unconfirmed(&mut self, fport: u8, data: &[u8]) -> Result<()> {
        self.start_data(fport, data, false)
    }

    pub fn confirmed(&mut self, fport: u8, data: &[u8]) -> Result<()> {
        self.start_data(fport, data, true)
    }

    fn start_data(&mut self, fport: u8, data: &[u8], confirmed: bool) -> Result<()> {
        if self.runtime.state != MacState::Idle || self.runtime.op != Op::None {
            return Err(Errno::Busy);
        }
        if !self.session.joined {
            return Err(Errno::NotJoined);
        }
        if fport == 0 || fport > 223 {
            return Err(Errno::Port);
        }
        if data.len() > self.mtu() {
            return Err(Errno::Size);
        }
        self.runtime.app_payload.clear();
        let _ = self.runtime.app_payload.extend_from_slice(data);
        self.runtime.app_fport = fport;
        self.runtime.op = if confirmed { Op::DataConfirmed } else { Op::DataUnconfirmed };
        self.runtime.trials = 0;
        self.runtime.retry_age_s = 0;
        log::debug!("data request queued on port {}, {} bytes, confirmed={}", fport, data.len(), confirmed);
        Ok(())
    }

    /// Abandons the in-flight request if it has not yet reached the radio;
    /// a request already transmitting runs to completion.
    pub fn cancel(&mut self) {
        if matches!(self.runtime.state, MacState::Idle | MacState::WaitTx) {
            self.runtime.op = Op::None;
            self.runtime.state = MacState::Idle;
        }
    }

    /// Clears the session back to regional defaults. Keys are untouched —
    /// they live behind `SecurityModule`, not here.
    pub fn forget(&mut self) {
        self.session = default_session(self.config.table());
        self.runtime = Runtime::new(self.runtime.service_start_time);
    }

    /// Delivers a radio-ISR notification. Safe to call while `process()` is
    /// also running elsewhere, per the "armed before fired" contract on
    /// [`crate::timer::Inputs`].
    pub fn radio_event(&mut self, event: RadioEvent, now_ticks: u32) {
        let id = match event {
            RadioEvent::TxComplete => InputId::TxDone,
            RadioEvent::RxReady => InputId::RxReady,
            RadioEvent::RxTimeout => InputId::RxTimeout,
        };
        self.runtime.inputs.signal(id, now_ticks);
    }

    /// Ticks until `process()` next has useful work to do, for a host that
    /// wants to sleep the MCU rather than poll.
    pub fn ticks_until_next_event(&self, now_ticks: u32) -> Option<u32> {
        self.runtime.timers.ticks_until_next(now_ticks)
    }

    /// Advances the state machine by one step. Call after every
    /// `radio_event` and whenever `ticks_until_next_event` has elapsed.
    pub fn process<R: Radio, Y: System>(&mut self, radio: &mut R, system: &mut Y) -> Option<Event<'_>> {
        let now = system.ticks();
        let tps = system.tps();
        self.runtime.bands.process(now, tps);

        match self.runtime.state {
            MacState::Init => {
                radio.reset(false);
                radio.entropy_begin();
                self.runtime.state = MacState::Entropy;
                None
            }
            MacState::InitReset | MacState::RecoveryReset => {
                let from_init = self.runtime.state == MacState::InitReset;
                radio.reset(true);
                self.runtime.timers.arm(TimerId::Band, now, tps);
                self.runtime.state = if from_init { MacState::InitLockout } else { MacState::RecoveryLockout };
                None
            }
            MacState::InitLockout | MacState::RecoveryLockout => {
                let from_init = self.runtime.state == MacState::InitLockout;
                if self.runtime.timers.expired(TimerId::Band, now) {
                    self.runtime.timers.disarm(TimerId::Band);
                    radio.reset(false);
                    self.runtime.state = if from_init { MacState::Init } else { MacState::Idle };
                    if !from_init {
                        log::debug!("recovery reset complete, back to idle");
                        return Some(Event::Reset);
                    }
                }
                None
            }
            MacState::Entropy => self.finish_entropy(radio, system),
            MacState::Idle => self.poll_idle(radio, system, now, tps),
            MacState::WaitTx => self.poll_wait_tx(radio, system, now, tps),
            MacState::Tx => self.poll_tx(now, tps),
            MacState::WaitRx1 => self.poll_wait_rx1(radio, now),
            MacState::Rx1 => self.poll_rx(radio, system, now, true),
            MacState::WaitRx2 => self.poll_wait_rx2(radio, now),
            MacState::Rx2 => self.poll_rx(radio, system, now, false),
            MacState::Rx2Lockout => self.poll_rx2_lockout(now, tps),
            MacState::WaitRetry => self.poll_wait_retry(now),
        }
    }

    fn finish_entropy<R: Radio, Y: System>(&mut self, radio: &mut R, system: &mut Y) -> Option<Event<'_>> {
        let entropy = radio.entropy_end();
        if let Some(restored) = system.restore_session() {
            self.session = restored;
        }
        self.identity = system.identity();
        self.derive_join_server_keys();
        self.runtime.state = MacState::Idle;
        Some(Event::Startup { entropy })
    }

    fn derive_join_server_keys(&mut self) {
        let ctx = DerivationContext {
            version: WireVersion::V1_1,
            join_nonce: JoinNonce(0),
            net_id: NetId(0),
            join_eui: self.identity.join_eui,
            dev_eui: self.identity.dev_eui,
            dev_nonce: DevNonce(0),
        };
        self.security.begin_update();
        self.security.update_session_key(KeyTarget::JSEncKey, KeyTarget::NwkKey, &ctx);
        self.security.update_session_key(KeyTarget::JSIntKey, KeyTarget::NwkKey, &ctx);
        self.security.end_update();
    }

    fn poll_idle<R: Radio, Y: System>(&mut self, radio: &mut R, system: &mut Y, now: u32, tps: u32) -> Option<Event<'_>> {
        match self.runtime.op {
            Op::None => None,
            Op::Reset => {
                self.runtime.op = Op::None;
                self.runtime.state = MacState::RecoveryReset;
                None
            }
            Op::Joining | Op::Rejoining | Op::DataUnconfirmed | Op::DataConfirmed => {
                self.begin_tx_attempt(radio, system, now, tps)
            }
        }
    }

    fn begin_tx_attempt<R: Radio, Y: System>(&mut self, radio: &mut R, system: &mut Y, now: u32, tps: u32) -> Option<Event<'_>> {
        let rate = if matches!(self.runtime.op, Op::Joining | Op::Rejoining) { 0 } else { self.session.rate };
        let prev_ch = if self.runtime.trials > 0 { Some(self.runtime.tx.ch_index) } else { None };
        let limit = if self.runtime.trials > 0 && matches!(self.runtime.op, Op::DataUnconfirmed) {
            self.config.table().max_dcycle_off_limit()
        } else {
            0
        };

        let table = self.config.table();
        let pick = {
            let mut rng = SystemRng { system };
            select_channel(table, &self.session, &self.runtime.bands, rate, prev_ch, limit, &mut rng)
        };

        match pick {
            Some((ch_index, freq)) => {
                self.fire_transmit(radio, system, ch_index, freq, rate, now);
                None
            }
            None => {
                let wait_ms = ms_until_next_channel(table, &self.session, &self.runtime.bands, rate);
                let wait_ticks = ((u64::from(wait_ms.max(1)) * u64::from(tps)) / 1000).max(1) as u32;
                self.runtime.timers.arm(TimerId::WaitA, now, wait_ticks);
                self.runtime.state = MacState::WaitTx;
                None
            }
        }
    }

    fn poll_wait_tx<R: Radio, Y: System>(&mut self, radio: &mut R, system: &mut Y, now: u32, tps: u32) -> Option<Event<'_>> {
        if self.runtime.timers.expired(TimerId::WaitA, now) {
            self.runtime.timers.disarm(TimerId::WaitA);
            self.runtime.state = MacState::Idle;
            return self.poll_idle(radio, system, now, tps);
        }
        None
    }

    fn fire_transmit<R: Radio, Y: System>(&mut self, radio: &mut R, system: &mut Y, ch_index: usize, freq: u32, rate: u8, now: u32) {
        let table = self.config.table();
        let info = datarate_info(table, rate);
        let power = table.tx_power_dbm(self.session.tx_power).unwrap_or(14);
        self.runtime.tx.ch_index = ch_index;
        self.runtime.tx.freq = freq;
        self.runtime.tx.rate = rate;
        self.runtime.tx.power = self.session.tx_power;

        let built_len = match self.runtime.op {
            Op::Joining | Op::Rejoining => self.build_join_frame(system),
            Op::DataUnconfirmed | Op::DataConfirmed => self.build_uplink_frame(),
            Op::None | Op::Reset => 0,
        };

        if built_len == 0 {
            self.runtime.op = Op::None;
            self.runtime.state = MacState::Idle;
            self.runtime.errno = Some(Errno::Internal);
            return;
        }

        let tx_settings =
            TxSettings { freq, bandwidth: info.bandwidth, spreading_factor: info.spreading_factor, dbm: power };
        radio.transmit(tx_settings, &self.runtime.phy_buffer);
        self.runtime.inputs.arm(InputId::TxDone);
        self.runtime.state = MacState::Tx;
        log::trace!("tx: ch {} @ {} Hz, dr {}, {} bytes", ch_index, freq, rate, built_len);
        let _ = now;
    }

    fn build_join_frame<Y: System>(&mut self, system: &mut Y) -> usize {
        let lo = system.rand();
        let hi = system.rand();
        let dev_nonce = DevNonce(u16::from(lo) | (u16::from(hi) << 8));
        self.runtime.dev_nonce = dev_nonce;

        let mut buf = [0u8; 23];
        let built = build_join_request(&mut buf, &self.security, self.identity.join_eui, self.identity.dev_eui, dev_nonce);
        match built {
            Some(slice) => {
                self.runtime.phy_buffer.clear();
                let _ = self.runtime.phy_buffer.extend_from_slice(slice);
                slice.len()
            }
            None => 0,
        }
    }

    /// Serializes whatever MAC commands are owed, preferring to carry them
    /// in FOpts; if the batch overflows 15 bytes it ships instead as an
    /// FPort=0 frame and the pending application payload is dropped for
    /// this uplink (spec §7, `Errno::Size`).
    fn build_uplink_frame(&mut self) -> usize {
        let mut cmds: AnswerQueue = AnswerQueue::new();
        if self.runtime.pending.link_check_req {
            let _ = cmds.push(UplinkMacCommand::LinkCheckReq(mac_encoding::maccommands::LinkCheckReq([])));
        }
        for c in self.runtime.answers.iter() {
            let _ = cmds.push(*c);
        }

        let mut fopts_buf = heapless::Vec::<u8, 15>::new();
        let overflow = fit_answers_in_fopts(&cmds, &mut fopts_buf);
        self.runtime.errno = size_errno_if_overflowed(&overflow);

        let confirmed = matches!(self.runtime.op, Op::DataConfirmed);
        let adr_ack_req = self.runtime.adr.adr_ack_req;
        let fcnt32 = self.session.up_counter;

        let built = if overflow.is_empty() {
            let fctrl = FCtrl::new(self.session.adr, adr_ack_req, false, false, fopts_buf.len() as u8);
            let mut out = [0u8; 255];
            build_data_frame(
                &mut out,
                &self.security,
                &self.session,
                confirmed,
                fctrl.0,
                fcnt32,
                &fopts_buf,
                Some(self.runtime.app_fport),
                &self.runtime.app_payload,
                0,
                self.runtime.tx.rate,
                self.runtime.tx.ch_index as u8,
            )
            .map(|len| (out, len))
        } else {
            let mut raw = heapless::Vec::<u8, 64>::new();
            let mut buf = [0u8; 1];
            for cmd in cmds.iter() {
                buf[0] = cmd.cid();
                let _ = raw.push(buf[0]);
                let mut payload = [0u8; 16];
                let _ = cmd.write_payload(&mut payload[..cmd.len()]);
                let _ = raw.extend_from_slice(&payload[..cmd.len()]);
            }
            let fctrl = FCtrl::new(self.session.adr, adr_ack_req, false, false, 0);
            let mut out = [0u8; 255];
            build_data_frame(&mut out, &self.security, &self.session, confirmed, fctrl.0, fcnt32, &[], Some(0), &raw, 0, self.runtime.tx.rate, self.runtime.tx.ch_index as u8)
                .map(|len| (out, len))
        };

        match built {
            Some((bytes, len)) => {
                self.runtime.phy_buffer.clear();
                let _ = self.runtime.phy_buffer.extend_from_slice(&bytes[..len]);
                len
            }
            None => 0,
        }
    }

    fn poll_tx(&mut self, now: u32, tps: u32) -> Option<Event<'_>> {
        if let Some(fire_tick) = self.runtime.inputs.take_tx_done() {
            self.charge_airtime(tps);
            self.runtime.trials = self.runtime.trials.saturating_add(1);
            crate::mac::adr::on_uplink_sent(&mut self.session, &mut self.runtime.adr, 0);
            self.session.up_counter = self.session.up_counter.wrapping_add(1);

            let delay1_ms = self.config.table().join_accept_delay1_ms();
            let delay2_ms = self.config.table().join_accept_delay2_ms();
            let (delay1_ms, delay2_ms) = if matches!(self.runtime.op, Op::Joining | Op::Rejoining) {
                (delay1_ms, delay2_ms)
            } else {
                (u32::from(self.session.rx1_delay) * 1000, u32::from(self.session.rx1_delay) * 1000 + 1000)
            };
            let ticks1 = ((u64::from(delay1_ms) * u64::from(tps)) / 1000) as u32;
            let ticks2 = ((u64::from(delay2_ms) * u64::from(tps)) / 1000) as u32;
            self.runtime.timers.arm(TimerId::WaitA, fire_tick, ticks1);
            self.runtime.timers.arm(TimerId::WaitB, fire_tick, ticks2);
            self.runtime.state = MacState::WaitRx1;
            return Some(Event::TxComplete);
        }
        let _ = now;
        None
    }

    fn charge_airtime(&mut self, tps: u32) {
        let table = self.config.table();
        let info = datarate_info(table, self.runtime.tx.rate);
        let ticks = crate::airtime::airtime_ticks(info.bandwidth, info.spreading_factor, self.runtime.phy_buffer.len() as u8, true, tps);
        let t_air_ms = ((u64::from(ticks) * 1000) / u64::from(tps.max(1))) as u32;
        let band = table.band_for_freq(self.runtime.tx.freq);
        let off_time_factor = table.off_time_factor(band);
        self.runtime.bands.record_transmission(band, t_air_ms, off_time_factor, self.session.joined, self.session.max_duty_cycle);
        self.runtime.bands.record_transmission(Band::Retry, t_air_ms, 1, false, 0);
    }

    fn poll_wait_rx1<R: Radio>(&mut self, radio: &mut R, now: u32) -> Option<Event<'_>> {
        if self.runtime.timers.expired(TimerId::WaitA, now) {
            self.runtime.timers.disarm(TimerId::WaitA);
            self.open_rx_window(radio, true);
            self.runtime.state = MacState::Rx1;
        }
        None
    }

    fn poll_wait_rx2<R: Radio>(&mut self, radio: &mut R, now: u32) -> Option<Event<'_>> {
        if self.runtime.timers.expired(TimerId::WaitB, now) {
            self.runtime.timers.disarm(TimerId::WaitB);
            self.open_rx_window(radio, false);
            self.runtime.state = MacState::Rx2;
        }
        None
    }

    fn open_rx_window<R: Radio>(&mut self, radio: &mut R, is_rx1: bool) {
        let table = self.config.table();
        let (freq, rate) = if is_rx1 {
            (table.rx1_freq(self.runtime.tx.ch_index, self.runtime.tx.freq), table.rx1_datarate(self.runtime.tx.rate, self.session.rx1_dr_offset))
        } else {
            (self.session.rx2_freq, self.session.rx2_rate)
        };
        let info = datarate_info(table, rate);
        let settings = RxSettings { freq, bandwidth: info.bandwidth, spreading_factor: info.spreading_factor, symbol_timeout: 8, max_len: 255 };
        radio.receive(settings);
        self.runtime.inputs.arm(InputId::RxReady);
        self.runtime.inputs.arm(InputId::RxTimeout);
        log::trace!("rx{} window armed @ {} Hz, dr {}", if is_rx1 { 1 } else { 2 }, freq, rate);
    }

    fn poll_rx<R: Radio, Y: System>(&mut self, radio: &mut R, system: &mut Y, now: u32, is_rx1: bool) -> Option<Event<'_>> {
        let outcome = self.runtime.inputs.take_rx_outcome()?;
        match outcome.0 {
            InputId::RxReady => {
                let mut meta = RxMeta::default();
                let mut buf = [0u8; 255];
                let n = radio.collect(&mut meta, &mut buf);
                radio.sleep();
                if n == 0 {
                    self.advance_after_window(is_rx1, now);
                    return None;
                }
                self.runtime.rx_buffer.clear();
                let _ = self.runtime.rx_buffer.extend_from_slice(&buf[..n]);
                self.handle_received_frame(system, meta, now, is_rx1)
            }
            InputId::RxTimeout => {
                radio.sleep();
                self.advance_after_window(is_rx1, now);
                None
            }
            InputId::TxDone => None,
        }
    }

    fn advance_after_window(&mut self, is_rx1: bool, now: u32) {
        if is_rx1 {
            self.runtime.state = MacState::WaitRx2;
        } else {
            self.runtime.state = MacState::Rx2Lockout;
            self.runtime.timers.arm(TimerId::Band, now, 1);
        }
    }

    fn handle_received_frame<Y: System>(&mut self, system: &mut Y, meta: RxMeta, now: u32, is_rx1: bool) -> Option<Event<'_>> {
        let is_join = matches!(self.runtime.op, Op::Joining | Op::Rejoining);
        let raw = self.runtime.rx_buffer.clone();
        if is_join {
            match mac_encoding::frame::decode(&raw) {
                Ok(mac_encoding::frame::Frame::JoinAccept { encrypted, .. }) => {
                    match decrypt_and_validate_join_accept(&self.security, encrypted, self.identity.join_eui, self.runtime.dev_nonce) {
                        Some(fields) => {
                            let table = self.config.table();
                            apply_join_accept(
                                &mut self.session,
                                &mut self.security,
                                table,
                                &fields,
                                self.runtime.dev_nonce,
                                self.identity.join_eui,
                                self.identity.dev_eui,
                            );
                            system.save_session(&self.session);
                            self.finish_attempt(now, system.tps(), true);
                            log::debug!("join accepted, dev_addr {}", self.session.dev_addr.0);
                            Some(Event::JoinComplete)
                        }
                        None => {
                            log::warn!("join-accept MIC/decrypt failed");
                            self.advance_after_window(is_rx1, now);
                            None
                        }
                    }
                }
                _ => {
                    self.advance_after_window(is_rx1, now);
                    None
                }
            }
        } else {
            let decoded = decrypt_and_validate_downlink(
                &self.security,
                &self.session,
                &raw,
                0,
                self.runtime.tx.rate,
                self.runtime.tx.ch_index as u8,
            );
            match decoded {
                Some(d) => {
                    let tps = system.tps();
                    let ev = self.apply_downlink(system, d, meta);
                    self.finish_attempt(now, tps, true);
                    ev
                }
                None => {
                    self.advance_after_window(is_rx1, now);
                    None
                }
            }
        }
    }

    fn apply_downlink<Y: System>(&mut self, system: &mut Y, decoded: uplink::DecodedDownlink, meta: RxMeta) -> Option<Event<'_>> {
        crate::mac::adr::on_valid_downlink(&mut self.runtime.adr);
        if decoded.fport == Some(0) || decoded.fport.is_none() {
            self.session.nwk_down_counter = decoded.fcnt32;
        } else {
            self.session.app_down_counter = decoded.fcnt32;
        }

        let table = self.config.table();
        let (shadow, answers) = if decoded.fport == Some(0) {
            process_downlink_commands(table, &self.session, &mut self.runtime.pending, &decoded.frm_payload)
        } else {
            process_downlink_commands(table, &self.session, &mut self.runtime.pending, &decoded.fopts)
        };
        log::debug!("applied downlink mac commands, {} answers queued", answers.len());
        self.session = shadow;
        self.runtime.answers = answers;
        system.save_session(&self.session);

        self.runtime.rx_buffer.clear();
        let data_len = if decoded.fport.is_some() && decoded.fport != Some(0) { decoded.frm_payload.len() } else { 0 };
        let _ = self.runtime.rx_buffer.extend_from_slice(&decoded.frm_payload[..data_len]);

        if data_len > 0 {
            let port = decoded.fport.unwrap_or(0);
            let counter = decoded.fcnt32;
            Some(Event::Rx(Rx { port, counter, data: &self.runtime.rx_buffer[..data_len] }))
        } else {
            Some(Event::Downstream(Downstream { rssi: meta.rssi, snr: meta.snr, size: 0 }))
        }
    }

    fn poll_rx2_lockout(&mut self, now: u32, tps: u32) -> Option<Event<'_>> {
        if self.runtime.timers.expired(TimerId::Band, now) {
            self.runtime.timers.disarm(TimerId::Band);
            return self.finish_attempt(now, tps, false);
        }
        None
    }

    /// Settles the outcome of one transmit/RX cycle: either the request is
    /// done (success, or a bounded op has exhausted its retries) or another
    /// attempt is scheduled through [`MacState::WaitRetry`], armed `delay_s`
    /// out along the retry-duty ladder.
    fn finish_attempt(&mut self, now: u32, tps: u32, success: bool) -> Option<Event<'_>> {
        let op = self.runtime.op;
        let done = success
            || match op {
                Op::Joining | Op::Rejoining => false,
                Op::DataUnconfirmed => self.runtime.trials >= self.session.nb_trans.max(1),
                Op::DataConfirmed => self.runtime.trials >= MAX_CONFIRMED_TRIALS,
                Op::None | Op::Reset => true,
            };

        if done {
            let trials = self.runtime.trials;
            self.runtime.op = Op::None;
            self.runtime.trials = 0;
            self.runtime.retry_age_s = 0;
            self.runtime.state = MacState::Idle;
            return if success {
                None
            } else {
                log::warn!("request gave up after {} trials", trials);
                match op {
                    Op::DataUnconfirmed => Some(Event::DataComplete),
                    Op::DataConfirmed => Some(Event::DataNak),
                    _ => None,
                }
            };
        }

        let delay_s = retry_delay_s(self.runtime.retry_age_s);
        self.runtime.retry_age_s = self.runtime.retry_age_s.saturating_add(delay_s);
        if self.runtime.retry_age_s >= RETRY_LADDER_RESET_S {
            self.runtime.retry_age_s = 0;
        }
        let delay_ticks = (u64::from(delay_s) * u64::from(tps)).max(1) as u32;
        self.runtime.timers.arm(TimerId::WaitA, now, delay_ticks);
        self.runtime.state = MacState::WaitRetry;
        log::trace!("retrying in {} s", delay_s);
        None
    }

    fn poll_wait_retry(&mut self, now: u32) -> Option<Event<'_>> {
        if self.runtime.timers.expired(TimerId::WaitA, now) {
            self.runtime.timers.disarm(TimerId::WaitA);
            self.runtime.state = MacState::Idle;
        }
        None
    }
}
