//! Small value types shared by the frame codec and crypto layers.

use crate::bytestream::{ByteStream, Overrun};

macro_rules! le_newtype {
    ($name:ident, $repr:ty, $bytes:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
        #[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub $repr);

        impl $name {
            pub const WIRE_LEN: usize = $bytes;

            pub fn value(&self) -> $repr {
                self.0
            }
        }

        impl From<$repr> for $name {
            fn from(v: $repr) -> Self {
                $name(v)
            }
        }
    };
}

le_newtype!(DevAddr, u32, 4);
le_newtype!(NetId, u32, 3);
le_newtype!(JoinNonce, u32, 3);
le_newtype!(AppNonce, u32, 3);
le_newtype!(DevNonce, u16, 2);

impl DevAddr {
    pub fn read(s: &mut ByteStream) -> Result<Self, Overrun> {
        Ok(DevAddr(s.read_u32_le()?))
    }
    pub fn write(&self, s: &mut ByteStream) -> Result<(), Overrun> {
        s.write_u32_le(self.0)
    }
}

impl NetId {
    pub fn read(s: &mut ByteStream) -> Result<Self, Overrun> {
        Ok(NetId(s.read_u24_le()?))
    }
    pub fn write(&self, s: &mut ByteStream) -> Result<(), Overrun> {
        s.write_u24_le(self.0)
    }
}

impl JoinNonce {
    pub fn read(s: &mut ByteStream) -> Result<Self, Overrun> {
        Ok(JoinNonce(s.read_u24_le()?))
    }
    pub fn write(&self, s: &mut ByteStream) -> Result<(), Overrun> {
        s.write_u24_le(self.0)
    }
}

impl AppNonce {
    pub fn read(s: &mut ByteStream) -> Result<Self, Overrun> {
        Ok(AppNonce(s.read_u24_le()?))
    }
    pub fn write(&self, s: &mut ByteStream) -> Result<(), Overrun> {
        s.write_u24_le(self.0)
    }
}

impl DevNonce {
    pub fn read(s: &mut ByteStream) -> Result<Self, Overrun> {
        Ok(DevNonce(s.read_u16_le()?))
    }
    pub fn write(&self, s: &mut ByteStream) -> Result<(), Overrun> {
        s.write_u16_le(self.0)
    }
}

/// Protocol version carried in `Session::version`: 0 selects the single-CMAC
/// 1.0.x MIC/derivation scheme, 1 selects the dual-CMAC 1.1 scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Version {
    #[default]
    V1_0,
    V1_1,
}

/// Direction byte used in the B0/B1/A authentication and CTR blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up = 0,
    Down = 1,
}
