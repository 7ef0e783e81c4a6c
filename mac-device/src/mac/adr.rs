//! Adaptive Data Rate bookkeeping (spec §4.6 tail).

use super::runtime::AdrState;
use crate::session::Session;

pub const ADR_ACK_LIMIT: u32 = 64;
pub const ADR_ACK_DELAY: u32 = 32;

/// Called after every uplink is handed to the radio. Advances the
/// ADR-ack counter and, once it has drifted far enough past
/// [`ADR_ACK_LIMIT`] without a valid downlink, runs the fallback ladder:
/// first reset TX power to max, then step the rate down toward the
/// regional floor, finally unmask every channel — each step gated to its
/// own multiple of [`ADR_ACK_DELAY`] uplinks past the limit.
pub fn on_uplink_sent(session: &mut Session, adr: &mut AdrState, rate_floor: u8) {
    if !session.adr {
        return;
    }
    adr.adr_ack_counter = adr.adr_ack_counter.saturating_add(1);
    if adr.adr_ack_counter < ADR_ACK_LIMIT {
        return;
    }
    adr.adr_ack_req = true;

    let overshoot = adr.adr_ack_counter - ADR_ACK_LIMIT;
    if overshoot == 0 || overshoot % ADR_ACK_DELAY != 0 {
        return;
    }
    let step = overshoot / ADR_ACK_DELAY;
    match step {
        1 => session.tx_power = 0,
        2 => session.rate = session.rate.saturating_sub(1).max(rate_floor),
        _ => {
            for enabled in session.channel_mask.iter_mut() {
                *enabled = true;
            }
            for ch in session.channels.iter_mut() {
                ch.enabled = true;
            }
            if step > 3 {
                session.rate = session.rate.saturating_sub(1).max(rate_floor);
            }
        }
    }
}

/// Called on any MIC-valid downlink: resets the ADR-ack escalation.
pub fn on_valid_downlink(adr: &mut AdrState) {
    adr.adr_ack_counter = 0;
    adr.adr_ack_req = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ChannelSlot, Session, Version};

    fn session() -> Session {
        Session {
            up_counter: 0,
            nwk_down_counter: 0,
            app_down_counter: 0,
            dev_addr: Default::default(),
            net_id: 0,
            channels: [ChannelSlot::default(); crate::session::NUM_CHANNEL_SLOTS],
            channel_mask: [true; crate::session::NUM_MASK_CHANNELS],
            rate: 5,
            tx_power: 3,
            max_duty_cycle: 0,
            nb_trans: 1,
            rx1_dr_offset: 0,
            rx1_delay: 1,
            rx2_rate: 0,
            rx2_freq: 0,
            joined: true,
            adr: true,
            version: Version::V1_0,
        }
    }

    #[test]
    fn sets_ack_req_once_limit_reached() {
        let mut s = session();
        let mut adr = AdrState::default();
        for _ in 0..ADR_ACK_LIMIT {
            on_uplink_sent(&mut s, &mut adr, 0);
        }
        assert!(adr.adr_ack_req);
    }

    #[test]
    fn first_escalation_step_resets_power() {
        let mut s = session();
        let mut adr = AdrState::default();
        for _ in 0..(ADR_ACK_LIMIT + ADR_ACK_DELAY) {
            on_uplink_sent(&mut s, &mut adr, 0);
        }
        assert_eq!(s.tx_power, 0);
    }

    #[test]
    fn valid_downlink_clears_escalation() {
        let mut adr = AdrState { adr_ack_counter: 200, adr_ack_req: true };
        on_valid_downlink(&mut adr);
        assert_eq!(adr.adr_ack_counter, 0);
        assert!(!adr.adr_ack_req);
    }
}
