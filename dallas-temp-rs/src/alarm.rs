use crate::{DallasTemperature, DeviceAddress, ScratchPad, TemperatureReading, directory::scan};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireSearchKind};
use log::{trace, warn};

/// Alarm threshold reported for a device that could not be read.
pub const ALARM_DISCONNECTED: i8 = -127;

const ALARM_MIN: i8 = -55;
const ALARM_MAX: i8 = 125;

impl<O, D, const N: usize> DallasTemperature<O, D, N>
where
    O: OneWire,
    O::BusError: Debug,
    D: DelayNs,
{
    /// High alarm threshold (TH) of a device, or [`ALARM_DISCONNECTED`].
    pub fn high_alarm_temp(&mut self, addr: &DeviceAddress) -> i8 {
        self.read_scratch_pad(addr)
            .map_or(ALARM_DISCONNECTED, |sp| sp.high_alarm())
    }

    /// Low alarm threshold (TL) of a device, or [`ALARM_DISCONNECTED`].
    pub fn low_alarm_temp(&mut self, addr: &DeviceAddress) -> i8 {
        self.read_scratch_pad(addr)
            .map_or(ALARM_DISCONNECTED, |sp| sp.low_alarm())
    }

    /// Sets the high alarm threshold, clamped to the -55 to 125 °C sensor range.
    pub fn set_high_alarm_temp(&mut self, addr: &DeviceAddress, celsius: i8) -> bool {
        let celsius = celsius.clamp(ALARM_MIN, ALARM_MAX);
        self.update_alarm(addr, |sp| sp.set_high_alarm(celsius))
    }

    /// Sets the low alarm threshold, clamped to the -55 to 125 °C sensor range.
    pub fn set_low_alarm_temp(&mut self, addr: &DeviceAddress, celsius: i8) -> bool {
        let celsius = celsius.clamp(ALARM_MIN, ALARM_MAX);
        self.update_alarm(addr, |sp| sp.set_low_alarm(celsius))
    }

    fn update_alarm(
        &mut self,
        addr: &DeviceAddress,
        update: impl FnOnce(&mut ScratchPad),
    ) -> bool {
        let Some(mut scratchpad) = self.is_connected_with_scratch_pad(addr) else {
            return false;
        };
        update(&mut scratchpad);
        match self.write_scratch_pad(addr, &scratchpad) {
            Ok(()) => true,
            Err(e) => {
                warn!("{addr}: failed to write alarm thresholds: {e}");
                false
            }
        }
    }

    /// Returns true if the last conversion of a device is at or beyond one of its thresholds.
    ///
    /// Compares whole degrees, as the device does. An unreadable device has no alarm.
    pub fn has_alarm(&mut self, addr: &DeviceAddress) -> bool {
        let Ok(scratchpad) = self.read_scratch_pad(addr) else {
            return false;
        };
        let whole = TemperatureReading::decode(addr, &scratchpad).raw() >> 4;
        whole <= i16::from(scratchpad.low_alarm()) || whole >= i16::from(scratchpad.high_alarm())
    }

    /// Collects the devices flagging an alarm into `out` with the conditional search.
    ///
    /// Returns the number of addresses written; a bus fault reads as none.
    pub fn alarm_search(&mut self, out: &mut [DeviceAddress]) -> usize {
        self.release_pullup();
        match scan(&mut self.bus, OneWireSearchKind::Alarmed, self.families, out) {
            Ok(found) => {
                trace!("{found} device(s) in alarm");
                found
            }
            Err(e) => {
                warn!("alarm search failed: {e}");
                0
            }
        }
    }

    /// Returns true if any device on the bus flags an alarm.
    pub fn has_any_alarm(&mut self) -> bool {
        let mut first = [DeviceAddress::default(); 1];
        self.alarm_search(&mut first) > 0
    }
}
