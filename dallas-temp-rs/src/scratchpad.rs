use crate::{
    Configuration, DALLAS_COPY_SCRATCH, DALLAS_READ_POWER_SUPPLY, DALLAS_READ_SCRATCH,
    DALLAS_RECALL_EEPROM, DALLAS_WRITE_SCRATCH, DS18S20, DallasError, DallasResult,
    DallasTemperature, DeviceAddress,
};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireCrc};
use log::{trace, warn};

/// Byte offsets into the scratchpad.
pub mod offset {
    /// Temperature register, low byte.
    pub const TEMP_LSB: usize = 0;
    /// Temperature register, high byte.
    pub const TEMP_MSB: usize = 1;
    /// High alarm threshold (TH), whole degrees.
    pub const HIGH_ALARM_TEMP: usize = 2;
    /// Low alarm threshold (TL), whole degrees.
    pub const LOW_ALARM_TEMP: usize = 3;
    /// Configuration register; reserved on DS18S20.
    pub const CONFIGURATION: usize = 4;
    /// Reserved.
    pub const INTERNAL_BYTE: usize = 5;
    /// DS18S20 COUNT_REMAIN.
    pub const COUNT_REMAIN: usize = 6;
    /// DS18S20 COUNT_PER_C.
    pub const COUNT_PER_C: usize = 7;
    /// CRC-8 of bytes 0 to 7.
    pub const SCRATCHPAD_CRC: usize = 8;
}

use offset::*;

/// Time the EEPROM copy needs before the device answers again.
const COPY_SCRATCH_MS: u32 = 20;
/// Extra strong pull-up time for a parasite-powered EEPROM copy.
const COPY_SCRATCH_PARASITE_MS: u32 = 10;
/// Upper bound on the EEPROM recall.
const RECALL_TIMEOUT_MS: u32 = 20;

/// The nine byte scratchpad of a DS18x20 sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScratchPad([u8; ScratchPad::BYTES]);

impl ScratchPad {
    /// Length of the scratchpad in bytes, CRC included.
    pub const BYTES: usize = 9;

    /// Raw contents.
    pub fn as_bytes(&self) -> &[u8; Self::BYTES] {
        &self.0
    }

    /// Two's complement temperature register.
    pub fn raw_temperature(&self) -> i16 {
        i16::from_le_bytes([self.0[TEMP_LSB], self.0[TEMP_MSB]])
    }

    /// High alarm threshold in whole degrees Celsius.
    pub fn high_alarm(&self) -> i8 {
        self.0[HIGH_ALARM_TEMP] as i8
    }

    /// Sets the high alarm threshold.
    pub fn set_high_alarm(&mut self, celsius: i8) {
        self.0[HIGH_ALARM_TEMP] = celsius as u8;
    }

    /// Low alarm threshold in whole degrees Celsius.
    pub fn low_alarm(&self) -> i8 {
        self.0[LOW_ALARM_TEMP] as i8
    }

    /// Sets the low alarm threshold.
    pub fn set_low_alarm(&mut self, celsius: i8) {
        self.0[LOW_ALARM_TEMP] = celsius as u8;
    }

    /// Configuration register.
    pub fn configuration(&self) -> Configuration {
        Configuration::from_bits(self.0[CONFIGURATION])
    }

    /// Replaces the configuration register.
    pub fn set_configuration(&mut self, config: Configuration) {
        self.0[CONFIGURATION] = config.into_bits();
    }

    /// DS18S20 COUNT_REMAIN byte.
    pub fn count_remain(&self) -> u8 {
        self.0[COUNT_REMAIN]
    }

    /// DS18S20 COUNT_PER_C byte.
    pub fn count_per_c(&self) -> u8 {
        self.0[COUNT_PER_C]
    }

    /// CRC byte as read from the device.
    pub fn crc(&self) -> u8 {
        self.0[SCRATCHPAD_CRC]
    }

    /// Recomputes the CRC byte over bytes 0 to 7.
    pub fn with_crc(mut self) -> Self {
        self.0[SCRATCHPAD_CRC] = OneWireCrc::compute(&self.0[..SCRATCHPAD_CRC]);
        self
    }

    /// True when the CRC matches and the buffer is not all zeros.
    ///
    /// An all-zero buffer carries a valid CRC, but is what a line held low reads as.
    pub fn is_valid(&self) -> bool {
        OneWireCrc::validate(&self.0) && self.0.iter().any(|&b| b != 0)
    }
}

impl From<[u8; ScratchPad::BYTES]> for ScratchPad {
    fn from(raw: [u8; ScratchPad::BYTES]) -> Self {
        Self(raw)
    }
}

impl From<ScratchPad> for [u8; ScratchPad::BYTES] {
    fn from(sp: ScratchPad) -> Self {
        sp.0
    }
}

impl TryFrom<&[u8]> for ScratchPad {
    type Error = core::array::TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(Self(value.try_into()?))
    }
}

impl<O, D, const N: usize> DallasTemperature<O, D, N>
where
    O: OneWire,
    O::BusError: Debug,
    D: DelayNs,
{
    /// Reads and checks the scratchpad of one device.
    ///
    /// # Errors
    /// [`DallasError::NotFound`] for an address with a bad CRC,
    /// [`DallasError::Bus`] when nothing answers the reset, and
    /// [`DallasError::Integrity`] when the nine bytes fail their CRC.
    pub fn read_scratch_pad(
        &mut self,
        addr: &DeviceAddress,
    ) -> DallasResult<ScratchPad, O::BusError> {
        if !addr.is_valid() {
            return Err(DallasError::NotFound);
        }
        self.select(Some(addr))?;
        self.bus.write_byte(DALLAS_READ_SCRATCH)?;
        let mut buf = [0; ScratchPad::BYTES];
        for b in buf.iter_mut() {
            *b = self.bus.read_byte()?;
        }
        self.bus.reset()?; // end the transaction
        let scratchpad = ScratchPad::from(buf);
        if !scratchpad.is_valid() {
            warn!("{addr}: scratchpad failed integrity check: {buf:02x?}");
            return Err(DallasError::Integrity);
        }
        trace!("{addr}: scratchpad {buf:02x?}");
        Ok(scratchpad)
    }

    /// Writes the alarm thresholds and configuration of a device and copies them to its EEPROM.
    ///
    /// Only bytes 2 to 4 of `scratchpad` are sent; DS18S20 parts take only the two
    /// alarm bytes. Nothing is read back, call [`read_scratch_pad`](Self::read_scratch_pad)
    /// to verify.
    pub fn write_scratch_pad(
        &mut self,
        addr: &DeviceAddress,
        scratchpad: &ScratchPad,
    ) -> DallasResult<(), O::BusError> {
        if !addr.is_valid() {
            return Err(DallasError::NotFound);
        }
        let bytes = scratchpad.as_bytes();
        let len = if addr.family() == DS18S20 { 2 } else { 3 };
        self.select(Some(addr))?;
        self.bus.write_byte(DALLAS_WRITE_SCRATCH)?;
        for &b in bytes[HIGH_ALARM_TEMP..HIGH_ALARM_TEMP + len].iter() {
            self.bus.write_byte(b)?;
        }
        trace!("{addr}: wrote {:02x?}", &bytes[HIGH_ALARM_TEMP..HIGH_ALARM_TEMP + len]);
        self.save_scratch_pad(addr)
    }

    /// Copies the alarm thresholds and configuration of a device into its EEPROM.
    pub fn save_scratch_pad(&mut self, addr: &DeviceAddress) -> DallasResult<(), O::BusError> {
        if !addr.is_valid() {
            return Err(DallasError::NotFound);
        }
        self.select(Some(addr))?;
        self.bus.write_byte(DALLAS_COPY_SCRATCH)?;
        if self.parasite {
            self.hold_strong_pullup(COPY_SCRATCH_MS + COPY_SCRATCH_PARASITE_MS);
        } else {
            self.delay.delay_ms(COPY_SCRATCH_MS);
        }
        self.bus.reset()?;
        Ok(())
    }

    /// Restores the alarm thresholds and configuration of a device from its EEPROM.
    ///
    /// Returns false if the address is invalid, the device does not finish
    /// within 20 ms or the bus fails.
    pub fn recall_scratch_pad(&mut self, addr: &DeviceAddress) -> bool {
        if !addr.is_valid() {
            return false;
        }
        let res = (|| -> DallasResult<bool, O::BusError> {
            self.select(Some(addr))?;
            self.bus.write_byte(DALLAS_RECALL_EEPROM)?;
            for _ in 0..RECALL_TIMEOUT_MS {
                // reads 0 while the copy is in progress
                if self.bus.read_bit()? {
                    self.bus.reset()?;
                    return Ok(true);
                }
                self.delay.delay_ms(1);
            }
            Ok(false)
        })();
        res.unwrap_or_else(|e| {
            warn!("{addr}: recall failed: {e}");
            false
        })
    }

    /// Returns true if the device answers with a valid scratchpad.
    pub fn is_connected(&mut self, addr: &DeviceAddress) -> bool {
        self.read_scratch_pad(addr).is_ok()
    }

    /// Checks presence and returns the scratchpad read on the way, in one transaction.
    ///
    /// `None` means the device is not connected.
    pub fn is_connected_with_scratch_pad(&mut self, addr: &DeviceAddress) -> Option<ScratchPad> {
        self.read_scratch_pad(addr).ok()
    }

    /// Asks whether a device, or any device when `addr` is `None`, runs on parasite power.
    ///
    /// Returns true for parasite power. A broadcast query also refreshes the
    /// cached flag behind [`is_parasite_power_mode`](Self::is_parasite_power_mode).
    /// Bus faults read as false.
    pub fn read_power_supply(&mut self, addr: Option<&DeviceAddress>) -> bool {
        let res = (|| -> DallasResult<bool, O::BusError> {
            self.select(addr)?;
            self.bus.write_byte(DALLAS_READ_POWER_SUPPLY)?;
            // parasite-powered devices pull the slot low
            let external = self.bus.read_bit()?;
            self.bus.reset()?;
            Ok(!external)
        })();
        match res {
            Ok(parasite) => {
                if addr.is_none() {
                    self.parasite = parasite;
                }
                parasite
            }
            Err(e) => {
                warn!("power supply query failed: {e}");
                false
            }
        }
    }
}
