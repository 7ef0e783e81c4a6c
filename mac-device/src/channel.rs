//! Channel selection (spec §4.5 tail, component G): combines the region
//! table, the session's channel configuration, and the live band
//! counters to pick a transmit channel within the duty-cycle budget.

use crate::band::Bands;
use crate::region::RegionTable;
use crate::session::{ChannelSlot, Session, NUM_MASK_CHANNELS};
use rand_core::RngCore;

/// Iterates the channels a given `rate` may use, abstracting over the
/// dynamic (slot-table) and fixed (mask) channel plans.
fn is_available(
    table: &dyn RegionTable,
    session: &Session,
    bands: &Bands,
    index: usize,
    freq_100hz: u32,
    min_dr: u8,
    max_dr: u8,
    rate: u8,
    limit: u32,
) -> bool {
    let _ = index;
    if rate < min_dr || rate > max_dr {
        return false;
    }
    let band = table.band_for_freq(freq_100hz);
    bands.available(band, limit)
}

fn dynamic_candidates<'a>(
    session: &'a Session,
) -> impl Iterator<Item = (usize, ChannelSlot)> + 'a {
    session.channels.iter().copied().enumerate().filter(|(_, c)| c.enabled && c.freq_100hz != 0)
}

/// Selects a transmit channel for `rate`, preferring any channel other
/// than `prev_ch` when more than one qualifies, uniformly sampled via
/// `rng`. `limit` is `0` on the normal path, `region_max_dcycle_off_limit`
/// when retrying an unconfirmed frame.
pub fn select_channel<R: RngCore>(
    table: &dyn RegionTable,
    session: &Session,
    bands: &Bands,
    rate: u8,
    prev_ch: Option<usize>,
    limit: u32,
    rng: &mut R,
) -> Option<(usize, u32)> {
    use crate::region::ChannelPlanKind;

    let mut candidates: heapless::Vec<(usize, u32), 72> = heapless::Vec::new();
    match table.plan_kind() {
        ChannelPlanKind::Dynamic => {
            for (idx, ch) in dynamic_candidates(session) {
                if is_available(table, session, bands, idx, ch.freq_100hz, ch.min_dr, ch.max_dr, rate, limit) {
                    let _ = candidates.push((idx, ch.freq_100hz));
                }
            }
        }
        ChannelPlanKind::Fixed => {
            for idx in 0..NUM_MASK_CHANNELS {
                if !session.channel_mask[idx] {
                    continue;
                }
                let freq = table.fixed_channel_freq(idx);
                let (min_dr, max_dr) = table.fixed_channel_dr_range(idx);
                if is_available(table, session, bands, idx, freq, min_dr, max_dr, rate, limit) {
                    let _ = candidates.push((idx, freq));
                }
            }
        }
    }

    if candidates.is_empty() {
        return None;
    }

    // Prefer any channel other than `prev_ch` when more than one qualifies.
    let filtered: heapless::Vec<(usize, u32), 72> = if candidates.len() > 1 {
        candidates.iter().copied().filter(|(idx, _)| Some(*idx) != prev_ch).collect()
    } else {
        candidates.clone()
    };
    let pool = if filtered.is_empty() { &candidates } else { &filtered };

    let pick = (rng.next_u32() as usize) % pool.len();
    Some(pool[pick])
}

/// Minimum milliseconds until any channel at `rate` clears its band (and
/// the aggregate Global budget), or `u32::MAX` if none qualify at all
/// (ignoring duty-cycle: a channel disabled by mask or rate bracket never
/// qualifies regardless of elapsed time).
pub fn ms_until_next_channel(table: &dyn RegionTable, session: &Session, bands: &Bands, rate: u8) -> u32 {
    use crate::region::ChannelPlanKind;

    let mut best = u32::MAX;
    match table.plan_kind() {
        ChannelPlanKind::Dynamic => {
            for (_, ch) in dynamic_candidates(session) {
                if rate < ch.min_dr || rate > ch.max_dr {
                    continue;
                }
                let band = table.band_for_freq(ch.freq_100hz);
                best = best.min(bands.ms_until_clear(band));
            }
        }
        ChannelPlanKind::Fixed => {
            for idx in 0..NUM_MASK_CHANNELS {
                if !session.channel_mask[idx] {
                    continue;
                }
                let (min_dr, max_dr) = table.fixed_channel_dr_range(idx);
                if rate < min_dr || rate > max_dr {
                    continue;
                }
                let freq = table.fixed_channel_freq(idx);
                let band = table.band_for_freq(freq);
                best = best.min(bands.ms_until_clear(band));
            }
        }
    }
    best
}
