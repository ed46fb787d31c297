use crate::{DS18S20, DallasError, DallasResult, DallasTemperature, DeviceAddress, ScratchPad};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWire;
use fixed::types::I12F4;
use log::warn;

/// Temperature in degrees Celsius with 1/16 °C steps, the native register format.
pub type Temperature = I12F4;

/// Raw reading (1/16 °C) of a device that could not be read, -440 °C.
pub const DEVICE_DISCONNECTED_RAW: i16 = -7040;
/// Celsius reading of a device that could not be read.
pub const DEVICE_DISCONNECTED_C: f32 = -127.0;
/// Fahrenheit reading of a device that could not be read.
pub const DEVICE_DISCONNECTED_F: f32 = -196.6;
/// Centidegree Celsius reading of a device that could not be read.
pub const DEVICE_DISCONNECTED_C_CENTI: i32 = -12700;
/// Centidegree Fahrenheit reading of a device that could not be read.
pub const DEVICE_DISCONNECTED_F_CENTI: i32 = -19660;

const SENSOR_MIN: i16 = -55 * 16;
const SENSOR_MAX: i16 = 125 * 16;

/// Scales degrees to hundredths of a degree, rounding half away from zero.
pub fn to_centidegrees(degrees: f32) -> i32 {
    let scaled = degrees * 100.0;
    if scaled < 0.0 {
        (scaled - 0.5) as i32
    } else {
        (scaled + 0.5) as i32
    }
}

/// Scales hundredths of a degree back to degrees.
pub fn from_centidegrees(centi: i32) -> f32 {
    centi as f32 / 100.0
}

/// Integer division rounding half away from zero.
const fn div_round(num: i32, den: i32) -> i32 {
    if num < 0 {
        (num - den / 2) / den
    } else {
        (num + den / 2) / den
    }
}

/// A decoded temperature, in 1/16 °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TemperatureReading(i16);

impl TemperatureReading {
    /// Wraps a raw 1/16 °C value.
    pub const fn from_raw(raw: i16) -> Self {
        Self(raw)
    }

    /// Decodes the temperature register of a scratchpad read from `addr`.
    ///
    /// DS18S20 parts report half degrees; COUNT_REMAIN and COUNT_PER_C extend
    /// them to 1/16 °C. Other families have the fraction bits left undefined
    /// by their configured resolution cleared.
    pub fn decode(addr: &DeviceAddress, scratchpad: &ScratchPad) -> Self {
        let raw = scratchpad.raw_temperature();
        if addr.family() != DS18S20 {
            let resolution = scratchpad.configuration().resolution();
            return Self(raw & resolution.defined_bits_mask());
        }
        let raw = i32::from(raw);
        let count_per_c = i32::from(scratchpad.count_per_c());
        let count_remain = i32::from(scratchpad.count_remain());
        let extended = if count_per_c == 0 {
            raw << 3
        } else {
            // T = TEMP_READ - 0.25 + (COUNT_PER_C - COUNT_REMAIN) / COUNT_PER_C
            ((raw & !1) << 3) - 4 + ((count_per_c - count_remain) << 4) / count_per_c
        };
        // a register far outside the sensor range saturates instead of wrapping
        Self(extended.clamp(i16::MIN.into(), i16::MAX.into()) as i16)
    }

    /// Returns true within the -55 to 125 °C range the sensors measure.
    pub fn in_sensor_range(&self) -> bool {
        (SENSOR_MIN..=SENSOR_MAX).contains(&self.0)
    }

    /// The raw value in 1/16 °C.
    pub const fn raw(&self) -> i16 {
        self.0
    }

    /// The value as a fixed-point number of degrees Celsius.
    pub fn value(&self) -> Temperature {
        Temperature::from_bits(self.0)
    }

    /// Degrees Celsius.
    pub fn celsius(&self) -> f32 {
        f32::from(self.0) / 16.0
    }

    /// Degrees Fahrenheit.
    pub fn fahrenheit(&self) -> f32 {
        self.celsius() * 1.8 + 32.0
    }

    /// Hundredths of a degree Celsius, rounded half away from zero.
    pub fn centi_celsius(&self) -> i32 {
        div_round(i32::from(self.0) * 100, 16)
    }

    /// Hundredths of a degree Fahrenheit, rounded half away from zero.
    pub fn centi_fahrenheit(&self) -> i32 {
        div_round(i32::from(self.0) * 180, 16) + 3200
    }
}

impl From<TemperatureReading> for Temperature {
    fn from(reading: TemperatureReading) -> Self {
        reading.value()
    }
}

impl<O, D, const N: usize> DallasTemperature<O, D, N>
where
    O: OneWire,
    O::BusError: Debug,
    D: DelayNs,
{
    /// Reads and decodes the temperature of one device.
    ///
    /// # Errors
    /// As [`read_scratch_pad`](Self::read_scratch_pad). A value outside the
    /// -55 to 125 °C sensor range is reported as [`DallasError::Integrity`].
    pub fn read_temperature(
        &mut self,
        addr: &DeviceAddress,
    ) -> DallasResult<TemperatureReading, O::BusError> {
        let scratchpad = self.read_scratch_pad(addr)?;
        let reading = TemperatureReading::decode(addr, &scratchpad);
        if !reading.in_sensor_range() {
            warn!("{addr}: {} (1/16 °C) is outside the sensor range", reading.raw());
            return Err(DallasError::Integrity);
        }
        Ok(reading)
    }

    /// Raw temperature in 1/16 °C, or [`DEVICE_DISCONNECTED_RAW`].
    pub fn get_temp(&mut self, addr: &DeviceAddress) -> i16 {
        self.read_temperature(addr)
            .map_or(DEVICE_DISCONNECTED_RAW, |t| t.raw())
    }

    /// Temperature in °C, or [`DEVICE_DISCONNECTED_C`].
    pub fn get_temp_c(&mut self, addr: &DeviceAddress) -> f32 {
        self.read_temperature(addr)
            .map_or(DEVICE_DISCONNECTED_C, |t| t.celsius())
    }

    /// Temperature in °F, or [`DEVICE_DISCONNECTED_F`].
    pub fn get_temp_f(&mut self, addr: &DeviceAddress) -> f32 {
        self.read_temperature(addr)
            .map_or(DEVICE_DISCONNECTED_F, |t| t.fahrenheit())
    }

    /// Temperature in hundredths of a °C, or [`DEVICE_DISCONNECTED_C_CENTI`].
    pub fn get_temp_c_centi(&mut self, addr: &DeviceAddress) -> i32 {
        self.read_temperature(addr)
            .map_or(DEVICE_DISCONNECTED_C_CENTI, |t| t.centi_celsius())
    }

    /// Temperature in hundredths of a °F, or [`DEVICE_DISCONNECTED_F_CENTI`].
    pub fn get_temp_f_centi(&mut self, addr: &DeviceAddress) -> i32 {
        self.read_temperature(addr)
            .map_or(DEVICE_DISCONNECTED_F_CENTI, |t| t.centi_fahrenheit())
    }

    /// Raw temperature of the device at `index` in the directory.
    pub fn get_temp_by_index(&mut self, index: usize) -> i16 {
        match self.get_address(index) {
            Some(addr) => self.get_temp(&addr),
            None => DEVICE_DISCONNECTED_RAW,
        }
    }

    /// Temperature in °C of the device at `index` in the directory.
    pub fn get_temp_c_by_index(&mut self, index: usize) -> f32 {
        match self.get_address(index) {
            Some(addr) => self.get_temp_c(&addr),
            None => DEVICE_DISCONNECTED_C,
        }
    }

    /// Temperature in °F of the device at `index` in the directory.
    pub fn get_temp_f_by_index(&mut self, index: usize) -> f32 {
        match self.get_address(index) {
            Some(addr) => self.get_temp_f(&addr),
            None => DEVICE_DISCONNECTED_F,
        }
    }
}
