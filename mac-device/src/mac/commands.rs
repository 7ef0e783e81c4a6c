//! Downlink MAC-command processing (spec §4.6, "Downlink MAC-command
//! processing"): builds a shadow session, applies every command in the
//! batch, and only commits it atomically once the whole batch has been
//! judged. LinkADR gets its own block-respond rule: a run of consecutive
//! LinkADRReq commands answers once, with the last command's ack bits,
//! and any failure inside the run rolls the whole run back.

use crate::error::Errno;
use crate::mac::runtime::PendingAnswers;
use crate::region::RegionTable;
use crate::session::{Session, NUM_MASK_CHANNELS};
use mac_encoding::maccommands::{DownlinkMacCommand, MacCommandIterator, UplinkMacCommand};

/// Owned uplink answers produced while walking one downlink's FOpts/FRM
/// command batch; queued for the next uplink by the caller.
pub type AnswerQueue = heapless::Vec<UplinkMacCommand, 16>;

struct LinkAdrBatch {
    rate: Option<u8>,
    power: Option<u8>,
    nb_trans: Option<u8>,
    mask_touched: bool,
    mask: [bool; NUM_MASK_CHANNELS],
    channel_mask_ack: bool,
    data_rate_ack: bool,
    power_ack: bool,
}

fn apply_link_adr(table: &dyn RegionTable, batch: &mut LinkAdrBatch, req: &mac_encoding::maccommands::LinkADRReq) {
    let rate = req.data_rate();
    let power = req.tx_power();
    batch.data_rate_ack = table.datarate(rate).is_some();
    batch.power_ack = table.tx_power_dbm(power).is_some();

    let cntl = req.channel_mask_control();
    if !table.apply_mask_control(cntl, &mut batch.mask) {
        // Plain 16-bit mask over channels `cntl*16 .. cntl*16+16`.
        let base = usize::from(cntl) * 16;
        let raw = req.channel_mask();
        for i in 0..16 {
            if base + i < NUM_MASK_CHANNELS {
                batch.mask[base + i] = raw & (1 << i) != 0;
            }
        }
    }
    batch.mask_touched = true;
    batch.channel_mask_ack = batch.mask.iter().any(|b| *b);

    if batch.channel_mask_ack {
        batch.rate = Some(rate);
        batch.power = Some(power);
        batch.nb_trans = Some(req.nb_trans());
    }
}

/// Walks `commands` against `session`, returning the shadow (possibly
/// mutated) session to commit, the answers owed on the next uplink, and
/// whether any command could not be parsed at all (bounded parse: we stop
/// and keep what was already applied, per spec §7 "unrecognized MAC
/// commands past a bounded parse" being locally recovered).
pub fn process_downlink_commands(
    table: &dyn RegionTable,
    session: &Session,
    pending: &mut PendingAnswers,
    fopts: &[u8],
) -> (Session, AnswerQueue) {
    let mut shadow = session.clone();
    let mut answers = AnswerQueue::new();
    let mut pending_adr: Option<LinkAdrBatch> = None;

    let flush_adr = |shadow: &mut Session, pending_adr: &mut Option<LinkAdrBatch>, answers: &mut AnswerQueue| {
        if let Some(batch) = pending_adr.take() {
            if batch.channel_mask_ack && batch.data_rate_ack && batch.power_ack {
                if batch.mask_touched {
                    shadow.channel_mask = batch.mask;
                }
                if let Some(r) = batch.rate {
                    shadow.rate = r;
                }
                if let Some(p) = batch.power {
                    shadow.tx_power = p;
                }
                if let Some(n) = batch.nb_trans {
                    shadow.nb_trans = n.max(1);
                }
            }
            let _ = answers.push(UplinkMacCommand::LinkADRAns(mac_encoding::maccommands::LinkADRAns::new_answer(
                batch.channel_mask_ack,
                batch.data_rate_ack,
                batch.power_ack,
            )));
        }
    };

    for cmd in MacCommandIterator::new(fopts) {
        if !matches!(cmd, DownlinkMacCommand::LinkADRReq(_)) {
            flush_adr(&mut shadow, &mut pending_adr, &mut answers);
        }
        match cmd {
            DownlinkMacCommand::LinkCheckAns(ans) => {
                pending.link_check_req = false;
                let _ = ans; // surfaced to the application as a `LinkStatus` event by the caller.
            }
            DownlinkMacCommand::LinkADRReq(req) => {
                let batch = pending_adr.get_or_insert_with(|| LinkAdrBatch {
                    rate: None,
                    power: None,
                    nb_trans: None,
                    mask_touched: false,
                    mask: shadow.channel_mask,
                    channel_mask_ack: true,
                    data_rate_ack: true,
                    power_ack: true,
                });
                apply_link_adr(table, batch, &req);
            }
            DownlinkMacCommand::DutyCycleReq(req) => {
                shadow.max_duty_cycle = req.max_duty_cycle_exp();
                let _ = answers.push(UplinkMacCommand::DutyCycleAns(mac_encoding::maccommands::DutyCycleAns([])));
            }
            DownlinkMacCommand::RXParamSetupReq(req) => {
                let dr_ok = table.datarate(req.rx2_data_rate()).is_some();
                if dr_ok {
                    shadow.rx1_dr_offset = req.rx1_dr_offset();
                    shadow.rx2_rate = req.rx2_data_rate();
                    shadow.rx2_freq = req.frequency();
                }
                pending.rx_param_setup_ans = true;
                let _ = answers.push(UplinkMacCommand::RXParamSetupAns(
                    mac_encoding::maccommands::RXParamSetupAns::new_answer(true, dr_ok, true),
                ));
            }
            DownlinkMacCommand::DevStatusReq(_) => {
                // battery/margin values are filled by the caller, which
                // knows the host's `System::battery_level()` and the
                // last downlink's SNR margin.
                let _ = answers.push(UplinkMacCommand::DevStatusAns(
                    mac_encoding::maccommands::DevStatusAns::new_answer(255, 0),
                ));
            }
            DownlinkMacCommand::NewChannelReq(req) => {
                let idx = usize::from(req.channel_index());
                let ok = idx < crate::session::NUM_CHANNEL_SLOTS
                    && table.datarate(req.min_data_rate()).is_some()
                    && table.datarate(req.max_data_rate()).is_some();
                if ok {
                    shadow.channels[idx] = crate::session::ChannelSlot {
                        freq_100hz: req.frequency(),
                        min_dr: req.min_data_rate(),
                        max_dr: req.max_data_rate(),
                        enabled: true,
                    };
                }
                let _ = answers.push(UplinkMacCommand::NewChannelAns(
                    mac_encoding::maccommands::NewChannelAns::new_answer(ok, ok),
                ));
            }
            DownlinkMacCommand::RXTimingSetupReq(req) => {
                shadow.rx1_delay = req.delay_seconds();
                pending.rx_timing_setup_ans = true;
                let _ = answers.push(UplinkMacCommand::RXTimingSetupAns(
                    mac_encoding::maccommands::RXTimingSetupAns([]),
                ));
            }
            DownlinkMacCommand::TXParamSetupReq(_) => {
                let _ = answers.push(UplinkMacCommand::TXParamSetupAns(
                    mac_encoding::maccommands::TXParamSetupAns([]),
                ));
            }
            DownlinkMacCommand::DLChannelReq(req) => {
                let idx = usize::from(req.channel_index());
                let ok = idx < crate::session::NUM_CHANNEL_SLOTS;
                if ok {
                    shadow.channels[idx].freq_100hz = req.frequency();
                }
                pending.dl_channel_ans = true;
                let _ = answers
                    .push(UplinkMacCommand::DLChannelAns(mac_encoding::maccommands::DLChannelAns::new_answer(ok, ok)));
            }
            // Class-B: out of scope (spec Non-goals). Parsed so the
            // iterator stays in sync with the rest of the batch, but no
            // session effect and no answer queued.
            DownlinkMacCommand::PingSlotChannelReq(_)
            | DownlinkMacCommand::BeaconFreqReq(_)
            | DownlinkMacCommand::PingSlotInfoAns(_)
            | DownlinkMacCommand::BeaconTimingAns(_) => {}
        }
    }
    flush_adr(&mut shadow, &mut pending_adr, &mut answers);

    (shadow, answers)
}

/// Serializes `answers` into `out`, in order, stopping before exceeding
/// 15 bytes (the FOpts field's size). Returns the commands that did not
/// fit, which the caller must instead ship in an `FPort=0` frame (and, in
/// doing so, drop any pending user data for that uplink — see
/// [`Errno::Size`] at the call site).
pub fn fit_answers_in_fopts(
    answers: &[UplinkMacCommand],
    out: &mut heapless::Vec<u8, 15>,
) -> heapless::Vec<UplinkMacCommand, 16> {
    use mac_encoding::maccommands::SerializableMacCommand;

    let mut overflow = heapless::Vec::new();
    for (i, cmd) in answers.iter().enumerate() {
        let needed = 1 + cmd.len();
        if out.len() + needed > 15 {
            for remaining in &answers[i..] {
                let _ = overflow.push(*remaining);
            }
            break;
        }
        let _ = out.push(cmd.cid());
        let mut buf = [0u8; 32];
        let _ = cmd.write_payload(&mut buf[..cmd.len()]);
        let _ = out.extend_from_slice(&buf[..cmd.len()]);
    }
    overflow
}

pub fn size_errno_if_overflowed(overflow: &[UplinkMacCommand]) -> Option<Errno> {
    if overflow.is_empty() {
        None
    } else {
        Some(Errno::Size)
    }
}
