//! The `errno` taxonomy surfaced by public MAC requests (spec §7).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Errno {
    /// No channel is within duty-cycle budget for the requested rate.
    NoChannel,
    /// Payload exceeds the MTU at the current rate and overhead.
    Size,
    /// Invalid rate for the region or protocol version.
    Rate,
    /// Invalid tx-power index for the region.
    Power,
    /// FPort is reserved (0) or out of range.
    Port,
    /// The MAC is not in `Idle`.
    Busy,
    /// Data was requested before a successful join.
    NotJoined,
    /// An invariant check fired that should never fire in production.
    Internal,
}

pub type Result<T> = core::result::Result<T, Errno>;
