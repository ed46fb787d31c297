use crate::{DS18S20, DallasTemperature, DeviceAddress};
use bitfield_struct::bitfield;
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWire;
use log::{debug, warn};

/// Conversion resolution of a DS18B20-class sensor.
///
/// The discriminant is the value of the R1:R0 field of the configuration register.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resolution {
    /// 9 bits, 0.5 °C steps.
    #[default]
    Bits9 = 0,
    /// 10 bits, 0.25 °C steps.
    Bits10 = 1,
    /// 11 bits, 0.125 °C steps.
    Bits11 = 2,
    /// 12 bits, 0.0625 °C steps.
    Bits12 = 3,
}

impl Resolution {
    /// Decodes the two-bit R1:R0 field.
    pub const fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Bits9,
            1 => Self::Bits10,
            2 => Self::Bits11,
            _ => Self::Bits12,
        }
    }

    /// Encodes into the two-bit R1:R0 field.
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    /// Maps a bit count of 9 to 12 to a resolution.
    pub const fn from_bit_count(bits: u8) -> Option<Self> {
        match bits {
            9 => Some(Self::Bits9),
            10 => Some(Self::Bits10),
            11 => Some(Self::Bits11),
            12 => Some(Self::Bits12),
            _ => None,
        }
    }

    /// Like [`from_bit_count`](Self::from_bit_count), but any bit count outside 9 to 12
    /// falls back to 9 bits, the fastest conversion.
    pub fn coerce(bits: u8) -> Self {
        Self::from_bit_count(bits).unwrap_or_else(|| {
            warn!("resolution of {bits} bits is out of range, using 9 bits");
            Self::Bits9
        })
    }

    /// Number of bits in a conversion result.
    pub const fn bit_count(self) -> u8 {
        9 + self as u8
    }

    /// Worst case conversion time from the DS18B20 datasheet.
    pub const fn conversion_time_ms(self) -> u16 {
        match self {
            Self::Bits9 => 94,
            Self::Bits10 => 188,
            Self::Bits11 => 375,
            Self::Bits12 => 750,
        }
    }

    /// Mask clearing the fraction bits the sensor leaves undefined at this resolution.
    pub const fn defined_bits_mask(self) -> i16 {
        match self {
            Self::Bits9 => !0b111,
            Self::Bits10 => !0b11,
            Self::Bits11 => !0b1,
            Self::Bits12 => !0,
        }
    }
}

/// Configuration register, byte 4 of the scratchpad.
///
/// Only the resolution field is writable; the reserved bits always read back as ones.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct Configuration {
    /// Reserved, reads as `0b11111`.
    #[bits(5, default = 0x1f)]
    pub reserved: u8,
    /// Conversion resolution (R1:R0).
    #[bits(2, default = Resolution::Bits12)]
    pub resolution: Resolution,
    /// Factory test mode bit, zero in operation.
    #[bits(1)]
    pub test_mode: bool,
}

impl Configuration {
    /// Register value selecting `resolution` with the reserved bits set.
    pub fn for_resolution(resolution: Resolution) -> Self {
        Self::new().with_resolution(resolution)
    }
}

impl<O, D, const N: usize> DallasTemperature<O, D, N>
where
    O: OneWire,
    O::BusError: Debug,
    D: DelayNs,
{
    /// Resolution used to time broadcast conversions.
    pub fn global_resolution(&self) -> Resolution {
        self.global_resolution
    }

    /// Sets the global resolution and writes it to every device in the directory.
    ///
    /// A bit count outside 9 to 12 is coerced to 9 bits. Once every device
    /// accepted the write, [`set_resolution`](Self::set_resolution) calls with
    /// `skip_global_broadcast` set to the same resolution leave the bus alone.
    pub fn set_global_resolution(&mut self, bits: u8) {
        let resolution = Resolution::coerce(bits);
        self.global_resolution = resolution;
        self.broadcast_resolution = None;
        let mut applied = true;
        for i in 0..self.devices {
            let addr = self.roms[i];
            applied &= self.set_resolution(&addr, bits, true);
        }
        if applied {
            self.broadcast_resolution = Some(resolution);
        }
        debug!(
            "global resolution {} bits, applied to all devices: {applied}",
            resolution.bit_count()
        );
    }

    /// Reads the resolution a device is configured for.
    ///
    /// DS18S20 parts have a fixed register extended to 1/16 °C by the decoder,
    /// so they report 12 bits. Returns `None` if the device cannot be read.
    pub fn resolution(&mut self, addr: &DeviceAddress) -> Option<Resolution> {
        let scratchpad = self.read_scratch_pad(addr).ok()?;
        if addr.family() == DS18S20 {
            return Some(Resolution::Bits12);
        }
        Some(scratchpad.configuration().resolution())
    }

    /// Sets the resolution of one device, preserving its alarm thresholds.
    ///
    /// A bit count outside 9 to 12 is coerced to 9 bits. With
    /// `skip_global_broadcast` set the write is skipped when a preceding
    /// [`set_global_resolution`](Self::set_global_resolution) already configured
    /// this resolution on the bus, and the global resolution is left as is.
    /// Without it, the global resolution becomes the highest resolution found
    /// on the bus.
    ///
    /// Returns false if the device could not be read or written.
    pub fn set_resolution(
        &mut self,
        addr: &DeviceAddress,
        bits: u8,
        skip_global_broadcast: bool,
    ) -> bool {
        if !addr.is_valid() {
            warn!("{addr}: invalid address, resolution not set");
            return false;
        }
        let resolution = Resolution::coerce(bits);
        if addr.family() == DS18S20 {
            // fixed register, nothing to write
            return self.is_connected(addr);
        }
        if skip_global_broadcast && self.broadcast_resolution == Some(resolution) {
            debug!("{addr}: resolution already set by global broadcast");
            return true;
        }
        let Some(mut scratchpad) = self.is_connected_with_scratch_pad(addr) else {
            return false;
        };
        if scratchpad.configuration().resolution() != resolution {
            scratchpad.set_configuration(Configuration::for_resolution(resolution));
            if let Err(e) = self.write_scratch_pad(addr, &scratchpad) {
                warn!("{addr}: failed to write resolution: {e}");
                return false;
            }
            if self.broadcast_resolution.is_some_and(|r| r != resolution) {
                self.broadcast_resolution = None;
            }
        }
        if !skip_global_broadcast {
            self.global_resolution = resolution;
            if self.devices > 1 {
                for i in 0..self.devices {
                    if self.global_resolution == Resolution::Bits12 {
                        break;
                    }
                    let other = self.roms[i];
                    if let Some(r) = self.resolution(&other) {
                        self.global_resolution = self.global_resolution.max(r);
                    }
                }
            }
        }
        true
    }
}
