use crate::{DALLAS_START_CONV, DallasResult, DallasTemperature, DeviceAddress, Resolution};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWire;
use log::{trace, warn};

/// What a read slot after a conversion request says about the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    /// The devices released the line, results are ready.
    Complete,
    /// At least one device still holds the line low.
    InProgress,
    /// The bus cannot tell, as parasite-powered devices have no way to signal completion.
    Unknown,
}

impl<O, D, const N: usize> DallasTemperature<O, D, N>
where
    O: OneWire,
    O::BusError: Debug,
    D: DelayNs,
{
    /// Whether conversion requests block until the results are ready.
    pub fn wait_for_conversion(&self) -> bool {
        self.wait_for_conversion
    }

    /// Sets whether conversion requests block until the results are ready.
    pub fn set_wait_for_conversion(&mut self, wait: bool) {
        self.wait_for_conversion = wait;
    }

    /// Whether blocking waits poll the bus for completion.
    pub fn check_for_conversion(&self) -> bool {
        self.check_for_conversion
    }

    /// Sets whether blocking waits poll the bus for completion.
    ///
    /// On a parasite-powered bus polling is impossible and the full budget is waited.
    pub fn set_check_for_conversion(&mut self, check: bool) {
        self.check_for_conversion = check;
    }

    /// Power mode sampled by [`begin`](Self::begin) or a broadcast
    /// [`read_power_supply`](Self::read_power_supply); false until then.
    pub fn is_parasite_power_mode(&self) -> bool {
        self.parasite
    }

    /// Worst case conversion time for a bit count, 9 bits if out of range.
    pub fn millis_to_wait_for_conversion(&self, bits: u8) -> u16 {
        Resolution::coerce(bits).conversion_time_ms()
    }

    /// Samples one read slot to see whether the last requested conversion finished.
    pub fn conversion_state(&mut self) -> ConversionState {
        if self.parasite {
            return ConversionState::Unknown;
        }
        match self.bus.read_bit() {
            Ok(true) => ConversionState::Complete,
            Ok(false) => ConversionState::InProgress,
            Err(e) => {
                warn!("conversion poll failed: {e}");
                ConversionState::Unknown
            }
        }
    }

    /// Returns true only when the bus positively reports the conversion as finished.
    pub fn is_conversion_complete(&mut self) -> bool {
        self.conversion_state() == ConversionState::Complete
    }

    /// Starts a conversion on every device.
    ///
    /// Blocks according to the wait and check flags, timed for the global resolution.
    /// Returns false if the bus did not respond.
    pub fn request_temperatures(&mut self) -> bool {
        let bits = self.global_resolution.bit_count();
        match self.start_conversion(None) {
            Ok(()) => {
                self.block_till_conversion_complete(bits);
                true
            }
            Err(e) => {
                warn!("conversion request failed: {e}");
                false
            }
        }
    }

    /// Starts a conversion on one device.
    ///
    /// Returns false if the device does not answer, its address is invalid,
    /// or the bus failed.
    pub fn request_temperatures_by_address(&mut self, addr: &DeviceAddress) -> bool {
        // the resolution is read first, as reading it mid-conversion would end polling
        let Some(resolution) = self.resolution(addr) else {
            warn!("{addr}: not connected, no conversion requested");
            return false;
        };
        match self.start_conversion(Some(addr)) {
            Ok(()) => {
                self.block_till_conversion_complete(resolution.bit_count());
                true
            }
            Err(e) => {
                warn!("{addr}: conversion request failed: {e}");
                false
            }
        }
    }

    /// Starts a conversion on the device at `index` in the directory.
    pub fn request_temperatures_by_index(&mut self, index: usize) -> bool {
        match self.get_address(index) {
            Some(addr) => self.request_temperatures_by_address(&addr),
            None => {
                warn!("no device at index {index}");
                false
            }
        }
    }

    /// Waits for a conversion started at `bits` resolution, as the flags ask.
    ///
    /// - neither flag set: returns at once; on a parasite bus the strong pull-up
    ///   stays on until the next transaction.
    /// - check for conversion: polls every millisecond up to the conversion budget.
    /// - otherwise: waits the whole budget, with the strong pull-up held on a parasite bus.
    pub fn block_till_conversion_complete(&mut self, bits: u8) {
        if !self.wait_for_conversion && !self.check_for_conversion {
            if self.parasite {
                self.assert_pullup();
            }
            return;
        }
        let budget = u32::from(self.millis_to_wait_for_conversion(bits));
        let mut elapsed = 0;
        if self.check_for_conversion && !self.parasite {
            while elapsed < budget {
                match self.conversion_state() {
                    ConversionState::Complete => {
                        trace!("conversion done after {elapsed} ms");
                        return;
                    }
                    ConversionState::InProgress => {
                        self.delay.delay_ms(1);
                        elapsed += 1;
                    }
                    ConversionState::Unknown => break,
                }
            }
        }
        let remaining = budget.saturating_sub(elapsed);
        if self.parasite {
            self.hold_strong_pullup(remaining);
        } else {
            self.delay.delay_ms(remaining);
        }
    }

    fn start_conversion(&mut self, addr: Option<&DeviceAddress>) -> DallasResult<(), O::BusError> {
        self.select(addr)?;
        self.bus.write_byte(DALLAS_START_CONV)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ConversionState;
    use crate::{
        DEVICE_DISCONNECTED_C, Resolution,
        sim::{SimDevice, init_logging, session, timed_session},
    };
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use std::vec;

    #[test]
    fn budgets_by_bit_count() {
        let (dt, _bus) = session(NoopDelay::new(), vec![]);
        assert_eq!(dt.millis_to_wait_for_conversion(9), 94);
        assert_eq!(dt.millis_to_wait_for_conversion(10), 188);
        assert_eq!(dt.millis_to_wait_for_conversion(11), 375);
        assert_eq!(dt.millis_to_wait_for_conversion(12), 750);
        assert_eq!(dt.millis_to_wait_for_conversion(42), 94);
    }

    #[test]
    fn polling_returns_early() {
        init_logging();
        let dev = SimDevice::ds18b20(1, 20.0);
        let addr = dev.rom;
        let (mut dt, bus, clock) = timed_session(vec![dev]);
        dt.begin();
        assert_eq!(dt.global_resolution(), Resolution::Bits12);
        bus.state().devices[0].celsius = 31.5;
        let start = clock.now_ms();
        assert!(dt.request_temperatures());
        let took = clock.now_ms() - start;
        assert!((375..750).contains(&took), "took {took} ms");
        assert_eq!(dt.get_temp_c(&addr), 31.5);
    }

    #[test]
    fn polling_gives_up_after_budget() {
        init_logging();
        let dev = SimDevice::ds18b20(1, 20.0).with_stalled_conversion();
        let (mut dt, _bus, clock) = timed_session(vec![dev]);
        dt.begin();
        assert_eq!(dt.global_resolution(), Resolution::Bits12);
        let start = clock.now_ms();
        assert!(dt.request_temperatures());
        assert_eq!(clock.now_ms() - start, 750);
        assert_eq!(dt.conversion_state(), ConversionState::InProgress);
    }

    #[test]
    fn fixed_wait_uses_full_budget() {
        init_logging();
        let dev = SimDevice::ds18b20(1, 20.0).with_resolution(Resolution::Bits10);
        let addr = dev.rom;
        let (dt, bus, clock) = timed_session(vec![dev]);
        let mut dt = dt.with_check_for_conversion(false);
        dt.begin();
        bus.state().devices[0].celsius = -3.25;
        let start = clock.now_ms();
        assert!(dt.request_temperatures_by_address(&addr));
        assert_eq!(clock.now_ms() - start, 188);
        assert_eq!(dt.get_temp_c(&addr), -3.25);
    }

    #[test]
    fn manual_mode_does_not_block() {
        init_logging();
        let dev = SimDevice::ds18b20(1, 20.0);
        let addr = dev.rom;
        let (dt, bus, clock) = timed_session(vec![dev]);
        let mut dt = dt
            .with_wait_for_conversion(false)
            .with_check_for_conversion(false);
        dt.begin();
        bus.state().devices[0].celsius = 40.0;
        let start = clock.now_ms();
        assert!(dt.request_temperatures_by_index(0));
        assert_eq!(clock.now_ms(), start);
        assert_eq!(dt.conversion_state(), ConversionState::InProgress);
        // stale data until the device is done
        assert_eq!(dt.get_temp_c(&addr), 20.0);
        clock.advance_ms(750);
        assert_eq!(dt.get_temp_c(&addr), 40.0);
    }

    #[test]
    fn parasite_bus_waits_with_pullup() {
        init_logging();
        let dev = SimDevice::ds18b20(1, 20.0).with_parasite();
        let (mut dt, bus, clock) = timed_session(vec![dev]);
        dt.begin();
        assert!(dt.is_parasite_power_mode());
        assert_eq!(dt.conversion_state(), ConversionState::Unknown);
        assert!(!dt.is_conversion_complete());
        let activations = bus.state().pullup_activations;
        let start = clock.now_ms();
        assert!(dt.request_temperatures());
        assert_eq!(clock.now_ms() - start, 750);
        let state = bus.state();
        assert_eq!(state.pullup_activations, activations + 1);
        assert!(!state.strong_pullup);
    }

    #[test]
    fn parasite_manual_mode_leaves_pullup_on() {
        init_logging();
        let dev = SimDevice::ds18b20(1, 20.0).with_parasite();
        let addr = dev.rom;
        let (dt, bus, _clock) = timed_session(vec![dev]);
        let mut dt = dt
            .with_wait_for_conversion(false)
            .with_check_for_conversion(false);
        dt.begin();
        assert!(dt.request_temperatures());
        assert!(bus.state().strong_pullup);
        // the next transaction releases it
        dt.get_temp_c(&addr);
        assert!(!bus.state().strong_pullup);
    }

    #[test]
    fn missing_pullup_is_tolerated() {
        init_logging();
        let dev = SimDevice::ds18b20(1, 20.0).with_parasite();
        let (mut dt, bus, clock) = timed_session(vec![dev]);
        bus.state().pullup_supported = false;
        dt.begin();
        let start = clock.now_ms();
        assert!(dt.request_temperatures());
        assert_eq!(clock.now_ms() - start, 750);
        assert_eq!(bus.state().pullup_activations, 0);
    }

    #[test]
    fn request_fails_without_devices() {
        init_logging();
        let dev = SimDevice::ds18b20(1, 20.0);
        let addr = dev.rom;
        let (mut dt, bus) = session(NoopDelay::new(), vec![dev]);
        dt.begin();
        assert!(!dt.request_temperatures_by_index(1));
        bus.state().presence = false;
        assert!(!dt.request_temperatures());
        assert!(!dt.request_temperatures_by_address(&addr));
        assert_eq!(dt.get_temp_c(&addr), DEVICE_DISCONNECTED_C);
    }
}
