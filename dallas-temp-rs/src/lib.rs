#![no_std]
#![deny(missing_docs)]
//! # dallas-temp
//! A no-std driver for the Dallas/Maxim family of 1-Wire temperature sensors
//! (DS18B20, DS18S20, DS1822, DS1825/MAX31850 and DS28EA00).
//!
//! The driver runs on any transport implementing [`OneWire`](embedded_onewire::OneWire)
//! and any [`DelayNs`] provider. A [`DallasTemperature`] session owns both,
//! keeps the directory of discovered sensors, and exposes:
//! - discovery and address checks ([`search`](DallasTemperature::search),
//!   [`get_address`](DallasTemperature::get_address)),
//! - the scratchpad protocol ([`read_scratch_pad`](DallasTemperature::read_scratch_pad),
//!   [`write_scratch_pad`](DallasTemperature::write_scratch_pad)),
//! - resolution and conversion timing
//!   ([`set_resolution`](DallasTemperature::set_resolution),
//!   [`request_temperatures`](DallasTemperature::request_temperatures)),
//! - decoded readings ([`get_temp_c`](DallasTemperature::get_temp_c) and friends).
//!
//! Host-facing getters never fail: a missing or corrupted device reads as
//! [`DEVICE_DISCONNECTED_C`] (or the matching sentinel of the unit asked for),
//! and setters report success as a `bool`.
//!
//! ```ignore
//! let mut sensors: DallasTemperature<_, _> = DallasTemperature::new(bus, delay);
//! sensors.begin();
//! sensors.request_temperatures();
//! if let Some(addr) = sensors.get_address(0) {
//!     let celsius = sensors.get_temp_c(&addr);
//! }
//! ```

#[cfg(test)]
extern crate std;

mod address;
mod alarm;
mod conversion;
mod directory;
mod error;
mod resolution;
mod scratchpad;
mod temperature;

#[cfg(test)]
mod sim;

pub use address::{
    DS1822, DS1825, DS18B20, DS18S20, DS28EA00, DeviceAddress, HexAddress, SUPPORTED_FAMILIES,
};
pub use alarm::ALARM_DISCONNECTED;
pub use conversion::ConversionState;
pub use error::DallasError;
pub use resolution::{Configuration, Resolution};
pub use scratchpad::{ScratchPad, offset};
pub use temperature::{
    DEVICE_DISCONNECTED_C, DEVICE_DISCONNECTED_C_CENTI, DEVICE_DISCONNECTED_F,
    DEVICE_DISCONNECTED_F_CENTI, DEVICE_DISCONNECTED_RAW, Temperature, TemperatureReading,
    from_centidegrees, to_centidegrees,
};

use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireError};
use log::{debug, warn};

/// Result type of the fallible driver operations.
pub type DallasResult<T, E> = Result<T, DallasError<E>>;

pub(crate) const DALLAS_START_CONV: u8 = 0x44;
pub(crate) const DALLAS_READ_SCRATCH: u8 = 0xbe;
pub(crate) const DALLAS_WRITE_SCRATCH: u8 = 0x4e;
pub(crate) const DALLAS_COPY_SCRATCH: u8 = 0x48;
pub(crate) const DALLAS_RECALL_EEPROM: u8 = 0xb8;
pub(crate) const DALLAS_READ_POWER_SUPPLY: u8 = 0xb4;

/// A session with the temperature sensors on one 1-Wire bus.
///
/// `N` bounds the number of devices kept in the directory.
#[derive(Debug)]
pub struct DallasTemperature<O, D, const N: usize = 16> {
    pub(crate) bus: O,
    pub(crate) delay: D,
    pub(crate) families: &'static [u8],
    pub(crate) devices: usize,
    pub(crate) roms: [DeviceAddress; N],
    pub(crate) global_resolution: Resolution,
    // resolution a completed `set_global_resolution` wrote to every device
    pub(crate) broadcast_resolution: Option<Resolution>,
    pub(crate) wait_for_conversion: bool,
    pub(crate) check_for_conversion: bool,
    pub(crate) parasite: bool,
    pub(crate) pullup_active: bool,
}

impl<O, D, const N: usize> DallasTemperature<O, D, N> {
    /// Creates a session on `bus`. Call [`begin`](Self::begin) to discover the sensors.
    ///
    /// Conversions block by default, polling for completion where the bus allows it.
    pub fn new(bus: O, delay: D) -> Self {
        Self {
            bus,
            delay,
            families: SUPPORTED_FAMILIES,
            devices: 0,
            roms: [DeviceAddress::default(); N],
            global_resolution: Resolution::Bits9,
            broadcast_resolution: None,
            wait_for_conversion: true,
            check_for_conversion: true,
            parasite: false,
            pullup_active: false,
        }
    }

    /// Restricts the directory to devices of the given family codes.
    pub fn with_families(mut self, families: &'static [u8]) -> Self {
        self.families = families;
        self
    }

    /// Sets whether conversion requests block until the conversion is done.
    pub fn with_wait_for_conversion(mut self, wait: bool) -> Self {
        self.wait_for_conversion = wait;
        self
    }

    /// Sets whether blocking waits poll the devices instead of sleeping the full budget.
    pub fn with_check_for_conversion(mut self, check: bool) -> Self {
        self.check_for_conversion = check;
        self
    }
}

impl<O, D, const N: usize> DallasTemperature<O, D, N>
where
    O: OneWire,
    O::BusError: Debug,
    D: DelayNs,
{
    /// Discovers the sensors, samples the power mode and derives the global resolution.
    ///
    /// Returns the number of devices in the directory.
    pub fn begin(&mut self) -> usize {
        self.search();
        self.parasite = self.devices > 0 && self.read_power_supply(None);
        let mut global = Resolution::Bits9;
        for i in 0..self.devices {
            let addr = self.roms[i];
            if let Some(r) = self.resolution(&addr) {
                global = global.max(r);
            }
        }
        self.global_resolution = global;
        debug!(
            "{} device(s), parasite power: {}, global resolution {} bits",
            self.devices,
            self.parasite,
            global.bit_count()
        );
        self.devices
    }

    /// Ends the session, handing back the transport and the delay.
    pub fn close(mut self) -> (O, D) {
        self.release_pullup();
        (self.bus, self.delay)
    }

    /// Resets the bus and addresses one device, or all of them for `None`.
    ///
    /// A strong pull-up left on by a non-blocking conversion is released first.
    pub(crate) fn select(&mut self, addr: Option<&DeviceAddress>) -> DallasResult<(), O::BusError> {
        self.release_pullup();
        self.bus.address(addr.map(DeviceAddress::as_bytes))?;
        Ok(())
    }

    /// Powers parasite devices through the strong pull-up for `ms` milliseconds.
    pub(crate) fn hold_strong_pullup(&mut self, ms: u32) {
        self.assert_pullup();
        self.delay.delay_ms(ms);
        self.release_pullup();
    }

    /// Turns the strong pull-up on and leaves it on until the next bus transaction.
    pub(crate) fn assert_pullup(&mut self) {
        match self.bus.set_strong_pullup(true) {
            Ok(()) => self.pullup_active = true,
            Err(OneWireError::Unimplemented) => {
                warn!("transport has no strong pull-up, parasite devices may brown out")
            }
            Err(e) => warn!("failed to enable strong pull-up: {e}"),
        }
    }

    pub(crate) fn release_pullup(&mut self) {
        if !self.pullup_active {
            return;
        }
        self.pullup_active = false;
        if let Err(e) = self.bus.set_strong_pullup(false) {
            warn!("failed to release strong pull-up: {e}");
        }
    }
}
