//! LoRa on-air time formula (spec §4.7, tail of component F). Used both to
//! arm the TX-done watchdog and to charge the duty-cycle bands.
//!
//! Everything is done in fixed-point ticks (no floats: this crate has no
//! `libm` dependency) using a `/256` sub-tick for the symbol period so the
//! 12.25-symbol preamble constant stays exact.

use lora_modulation::{Bandwidth, SpreadingFactor};

fn bandwidth_hz(bw: Bandwidth) -> u32 {
    match bw {
        Bandwidth::_125KHz => 125_000,
        Bandwidth::_250KHz => 250_000,
        Bandwidth::_500KHz => 500_000,
        _ => 125_000,
    }
}

fn sf_value(sf: SpreadingFactor) -> u32 {
    match sf {
        SpreadingFactor::_5 => 5,
        SpreadingFactor::_6 => 6,
        SpreadingFactor::_7 => 7,
        SpreadingFactor::_8 => 8,
        SpreadingFactor::_9 => 9,
        SpreadingFactor::_10 => 10,
        SpreadingFactor::_11 => 11,
        SpreadingFactor::_12 => 12,
    }
}

/// Coding rate overhead multiplier for 4/5 (the only rate LoRaWAN uses);
/// already includes the formula's "+4" term.
const CR_PLUS_4: u32 = 5;

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Symbol period in 1/256th ticks: `(2^sf * tps * 256) / bw_hz`.
fn symbol_period_256(sf: SpreadingFactor, bw: Bandwidth, tps: u32) -> u64 {
    let two_pow_sf = 1u64 << sf_value(sf);
    (two_pow_sf * u64::from(tps) * 256) / u64::from(bandwidth_hz(bw))
}

/// Total on-air ticks for a `payload_len`-byte LoRa frame, per spec §4.7.
/// `explicit_header` is always `true` for LoRaWAN (`IH = 0`).
pub fn airtime_ticks(
    bw: Bandwidth,
    sf: SpreadingFactor,
    payload_len: u8,
    crc: bool,
    tps: u32,
) -> u32 {
    let ts_256 = symbol_period_256(sf, bw, tps);
    let preamble_ticks = ceil_div(49 * ts_256, 1024); // 12.25 * Ts

    let sf_val = sf_value(sf) as i64;
    let low_data_rate_optimize = matches!(bw, Bandwidth::_125KHz) && sf_val >= 11;
    let denom = 4 * (sf_val - if low_data_rate_optimize { 2 } else { 0 });

    let numerator = 8 * i64::from(payload_len) - 4 * sf_val + 28 + if crc { 16 } else { 0 } - 20 /* IH=1 */;
    let extra_symbol_groups = if numerator <= 0 { 0 } else { ceil_div(numerator as u64, denom as u64) };
    let payload_symbols = 8 + extra_symbol_groups * u64::from(CR_PLUS_4);

    let ts_ticks = ceil_div(ts_256, 256);
    let total = preamble_ticks + payload_symbols * ts_ticks;
    total.min(u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longer_payload_takes_more_airtime() {
        let short = airtime_ticks(Bandwidth::_125KHz, SpreadingFactor::_7, 10, true, 1_000_000);
        let long = airtime_ticks(Bandwidth::_125KHz, SpreadingFactor::_7, 200, true, 1_000_000);
        assert!(long > short);
    }

    #[test]
    fn higher_spreading_factor_takes_more_airtime() {
        let sf7 = airtime_ticks(Bandwidth::_125KHz, SpreadingFactor::_7, 20, true, 1_000_000);
        let sf12 = airtime_ticks(Bandwidth::_125KHz, SpreadingFactor::_12, 20, true, 1_000_000);
        assert!(sf12 > sf7);
    }

    #[test]
    fn wider_bandwidth_reduces_airtime() {
        let narrow = airtime_ticks(Bandwidth::_125KHz, SpreadingFactor::_9, 20, true, 1_000_000);
        let wide = airtime_ticks(Bandwidth::_500KHz, SpreadingFactor::_9, 20, true, 1_000_000);
        assert!(wide < narrow);
    }
}
