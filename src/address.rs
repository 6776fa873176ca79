use crate::AvError;
use core::fmt::Write;

/// A Bluetooth Device Address (`BD_ADDR`) identifying an AV peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BluetoothAddress(pub [u8; 6]);

impl BluetoothAddress {
    /// The all-zero address, used for "no peer"
    pub const NONE: Self = Self([0; 6]);

    /// Create a new Bluetooth address from bytes
    #[must_use]
    pub const fn new(addr: [u8; 6]) -> Self {
        Self(addr)
    }

    /// Get the raw address bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// True for the all-zero placeholder address
    #[must_use]
    pub const fn is_none(&self) -> bool {
        let mut i = 0;
        while i < 6 {
            if self.0[i] != 0 {
                return false;
            }
            i += 1;
        }
        true
    }

    /// Format the address as `AA:BB:CC:DD:EE:FF`
    #[must_use]
    pub fn format_hex(&self) -> heapless::String<17> {
        let mut out = heapless::String::new();
        let _ = write!(out, "{self}");
        out
    }

    /// Parse a colon-separated address.
    ///
    /// # Errors
    /// Returns `AvError::InvalidParameter` when the string is not six colon separated hex octets.
    pub fn from_hex(hex: &str) -> Result<Self, AvError> {
        if hex.len() != 17 {
            return Err(AvError::InvalidParameter);
        }
        let mut bytes = [0u8; 6];
        let mut parts = hex.split(':');
        for slot in &mut bytes {
            let part = parts.next().ok_or(AvError::InvalidParameter)?;
            if part.len() != 2 {
                return Err(AvError::InvalidParameter);
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| AvError::InvalidParameter)?;
        }
        if parts.next().is_some() {
            return Err(AvError::InvalidParameter);
        }
        Ok(Self(bytes))
    }
}

impl core::fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl From<[u8; 6]> for BluetoothAddress {
    fn from(addr: [u8; 6]) -> Self {
        Self(addr)
    }
}

impl From<BluetoothAddress> for bt_hci::param::BdAddr {
    fn from(addr: BluetoothAddress) -> Self {
        bt_hci::param::BdAddr::new(addr.0)
    }
}

impl TryFrom<&[u8]> for BluetoothAddress {
    type Error = AvError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; 6] = bytes.try_into().map_err(|_| AvError::InvalidParameter)?;
        Ok(Self(raw))
    }
}

impl TryFrom<bt_hci::param::BdAddr> for BluetoothAddress {
    type Error = AvError;

    fn try_from(bd_addr: bt_hci::param::BdAddr) -> Result<Self, Self::Error> {
        bd_addr.raw().try_into()
    }
}
