//! Timer/input machinery (spec §5, component H): three logical timers and
//! three radio inputs, bound to a free-running tick counter. Shared
//! between the foreground `process()` loop and the radio ISR; every touch
//! must happen inside the critical section the host's [`crate::System`]
//! port provides.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum TimerId {
    WaitA,
    WaitB,
    Band,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
struct Timer {
    deadline: u32,
    armed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Timers {
    wait_a: Timer,
    wait_b: Timer,
    band: Timer,
}

fn slot(timers: &mut Timers, id: TimerId) -> &mut Timer {
    match id {
        TimerId::WaitA => &mut timers.wait_a,
        TimerId::WaitB => &mut timers.wait_b,
        TimerId::Band => &mut timers.band,
    }
}

impl Timers {
    /// Arms `id` to fire `delay_ticks` from `now`. Must be called from the
    /// foreground before the corresponding input can be armed by the ISR.
    pub fn arm(&mut self, id: TimerId, now: u32, delay_ticks: u32) {
        let t = slot(self, id);
        t.deadline = now.wrapping_add(delay_ticks);
        t.armed = true;
    }

    pub fn disarm(&mut self, id: TimerId) {
        slot(self, id).armed = false;
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        match id {
            TimerId::WaitA => self.wait_a.armed,
            TimerId::WaitB => self.wait_b.armed,
            TimerId::Band => self.band.armed,
        }
    }

    /// Whether `id` has passed its deadline at tick `now`. A timer whose
    /// deadline has passed stays expired until explicitly disarmed.
    pub fn expired(&self, id: TimerId, now: u32) -> bool {
        let t = match id {
            TimerId::WaitA => &self.wait_a,
            TimerId::WaitB => &self.wait_b,
            TimerId::Band => &self.band,
        };
        t.armed && now.wrapping_sub(t.deadline) < (u32::MAX / 2)
    }

    /// Ticks past deadline, for RX-margin bookkeeping; 0 if not expired.
    pub fn overrun(&self, id: TimerId, now: u32) -> u32 {
        if !self.expired(id, now) {
            return 0;
        }
        let t = match id {
            TimerId::WaitA => &self.wait_a,
            TimerId::WaitB => &self.wait_b,
            TimerId::Band => &self.band,
        };
        now.wrapping_sub(t.deadline)
    }

    /// Smallest number of ticks until any armed timer's deadline, for
    /// `ticks_until_next_event`. `None` if nothing is armed.
    pub fn ticks_until_next(&self, now: u32) -> Option<u32> {
        [TimerId::WaitA, TimerId::WaitB, TimerId::Band]
            .into_iter()
            .filter(|id| self.is_armed(*id))
            .map(|id| {
                let t = match id {
                    TimerId::WaitA => &self.wait_a,
                    TimerId::WaitB => &self.wait_b,
                    TimerId::Band => &self.band,
                };
                t.deadline.wrapping_sub(now)
            })
            .min()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum InputId {
    TxDone,
    RxReady,
    RxTimeout,
}

fn bit(id: InputId) -> u8 {
    match id {
        InputId::TxDone => 0b001,
        InputId::RxReady => 0b010,
        InputId::RxTimeout => 0b100,
    }
}

/// The three radio-ISR input signals. `armed` must be set by the
/// foreground before the ISR may set the matching `fired` bit, or the
/// signal is silently dropped — this enforces the spec's "armed before
/// fired" ordering guarantee without a lock on the fast path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inputs {
    armed: u8,
    fired: u8,
    fire_tick: u32,
}

impl Inputs {
    pub fn arm(&mut self, id: InputId) {
        self.armed |= bit(id);
    }

    pub fn disarm_all(&mut self) {
        self.armed = 0;
        self.fired = 0;
    }

    /// Called from ISR context. No-op if `id` was never armed.
    pub fn signal(&mut self, id: InputId, now: u32) {
        let b = bit(id);
        if self.armed & b != 0 {
            self.fired |= b;
            self.fire_tick = now;
        }
    }

    /// Takes whichever of {RxReady, RxTimeout} fired first for the current
    /// window: only the first of the two to set its bit is honored.
    pub fn take_rx_outcome(&mut self) -> Option<(InputId, u32)> {
        let rx_ready = bit(InputId::RxReady);
        let rx_timeout = bit(InputId::RxTimeout);
        let fired = self.fired & (rx_ready | rx_timeout);
        if fired & rx_ready != 0 {
            self.fired &= !(rx_ready | rx_timeout);
            Some((InputId::RxReady, self.fire_tick))
        } else if fired & rx_timeout != 0 {
            self.fired &= !(rx_ready | rx_timeout);
            Some((InputId::RxTimeout, self.fire_tick))
        } else {
            None
        }
    }

    pub fn take_tx_done(&mut self) -> Option<u32> {
        let b = bit(InputId::TxDone);
        if self.fired & b != 0 {
            self.fired &= !b;
            Some(self.fire_tick)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_signal_when_not_armed() {
        let mut inputs = Inputs::default();
        inputs.signal(InputId::RxReady, 100);
        assert!(inputs.take_rx_outcome().is_none());
    }

    #[test]
    fn first_of_rx_ready_or_timeout_wins() {
        let mut inputs = Inputs::default();
        inputs.arm(InputId::RxReady);
        inputs.arm(InputId::RxTimeout);
        inputs.signal(InputId::RxReady, 10);
        inputs.signal(InputId::RxTimeout, 20);
        assert_eq!(inputs.take_rx_outcome(), Some((InputId::RxReady, 10)));
        assert_eq!(inputs.take_rx_outcome(), None);
    }

    #[test]
    fn timer_expired_after_deadline_and_reports_overrun() {
        let mut timers = Timers::default();
        timers.arm(TimerId::WaitA, 0, 100);
        assert!(!timers.expired(TimerId::WaitA, 50));
        assert!(timers.expired(TimerId::WaitA, 105));
        assert_eq!(timers.overrun(TimerId::WaitA, 105), 5);
    }
}
