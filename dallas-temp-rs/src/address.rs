use core::{
    fmt::{Display, Formatter},
    ops::Deref,
};
use embedded_onewire::{OneWireCrc, consts::ONEWIRE_ROM_BYTES};

/// DS18S20 and DS1820 family code.
pub const DS18S20: u8 = 0x10;
/// DS1822 family code.
pub const DS1822: u8 = 0x22;
/// DS18B20 family code.
pub const DS18B20: u8 = 0x28;
/// DS1825 and MAX31850 family code.
pub const DS1825: u8 = 0x3b;
/// DS28EA00 family code.
pub const DS28EA00: u8 = 0x42;

/// Families of temperature sensors this driver knows how to talk to.
pub const SUPPORTED_FAMILIES: &[u8] = &[DS18S20, DS1822, DS18B20, DS1825, DS28EA00];

/// 64-bit ROM code of a 1-Wire device.
///
/// | Byte | Description |
/// |------|-------------|
/// | 0 | Family code |
/// | 1-6 | Serial number |
/// | 7 | CRC-8 of bytes 0-6 |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DeviceAddress([u8; ONEWIRE_ROM_BYTES]);

impl DeviceAddress {
    /// The length of a device address in bytes
    pub const BYTES: usize = ONEWIRE_ROM_BYTES;

    /// Wraps raw ROM bytes without checking them.
    pub const fn new(raw: [u8; Self::BYTES]) -> Self {
        Self(raw)
    }

    /// Builds an address from a family code and serial number, appending the CRC.
    pub fn from_serial(family: u8, serial: [u8; 6]) -> Self {
        let mut raw = [family, 0, 0, 0, 0, 0, 0, 0];
        raw[1..7].copy_from_slice(&serial);
        raw[7] = OneWireCrc::compute(&raw[..7]);
        Self(raw)
    }

    /// Family code, byte 0 of the ROM.
    pub fn family(&self) -> u8 {
        self.0[0]
    }

    /// Returns true if the CRC byte matches the first seven bytes.
    pub fn is_valid(&self) -> bool {
        OneWireCrc::compute(&self.0[..7]) == self.0[7]
    }

    /// Raw ROM bytes.
    pub fn as_bytes(&self) -> &[u8; Self::BYTES] {
        &self.0
    }

    /// Lowercase hex rendering of the eight ROM bytes without separators.
    ///
    /// Meant for display and logs; devices are always matched on the raw bytes.
    pub fn to_hex_str(&self) -> HexAddress {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let mut out = [0u8; 2 * Self::BYTES];
        for (pair, byte) in out.chunks_exact_mut(2).zip(self.0.iter()) {
            pair[0] = DIGITS[(byte >> 4) as usize];
            pair[1] = DIGITS[(byte & 0x0f) as usize];
        }
        HexAddress(out)
    }
}

impl From<[u8; DeviceAddress::BYTES]> for DeviceAddress {
    fn from(raw: [u8; DeviceAddress::BYTES]) -> Self {
        Self(raw)
    }
}

impl From<DeviceAddress> for [u8; DeviceAddress::BYTES] {
    fn from(addr: DeviceAddress) -> Self {
        addr.0
    }
}

/// ROM codes as returned by [`OneWireSearch`](embedded_onewire::OneWireSearch), family code in the low byte.
impl From<u64> for DeviceAddress {
    fn from(rom: u64) -> Self {
        Self(rom.to_le_bytes())
    }
}

impl From<DeviceAddress> for u64 {
    fn from(addr: DeviceAddress) -> Self {
        u64::from_le_bytes(addr.0)
    }
}

impl TryFrom<&[u8]> for DeviceAddress {
    type Error = core::array::TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(value.try_into()?))
    }
}

impl AsRef<[u8]> for DeviceAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for DeviceAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_hex_str())
    }
}

/// Hex rendering of a [`DeviceAddress`], see [`DeviceAddress::to_hex_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexAddress([u8; 2 * DeviceAddress::BYTES]);

impl HexAddress {
    /// The rendering as a string slice.
    pub fn as_str(&self) -> &str {
        // only ever filled with ASCII hex digits
        core::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl Deref for HexAddress {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl Display for HexAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
