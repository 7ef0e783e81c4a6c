#![allow(unused_macros)]
#![allow(unused)]

#[cfg(feature = "defmt-03")]
macro_rules! llog {
    (trace, $($arg:expr),*) => { defmt::trace!($($arg),*) };
    (debug, $($arg:expr),*) => { defmt::debug!($($arg),*) };
    (warn,  $($arg:expr),*) => { defmt::warn!($($arg),*) };
}

#[cfg(not(feature = "defmt-03"))]
macro_rules! llog {
    ($level:ident, $($arg:expr),*) => {{ $( let _ = $arg; )* }}
}
pub(crate) use llog;

macro_rules! trace {
    ($($arg:expr),*) => (crate::log::llog!(trace, $($arg),*));
}
pub(crate) use trace;

macro_rules! debug {
    ($($arg:expr),*) => (crate::log::llog!(debug, $($arg),*));
}
pub(crate) use debug;

macro_rules! warn {
    ($($arg:expr),*) => (crate::log::llog!(warn, $($arg),*));
}
pub(crate) use warn;
