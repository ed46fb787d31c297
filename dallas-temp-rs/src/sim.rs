//! A simulated 1-Wire bus with DS18x20 sensors on it.

use crate::{Configuration, DS18B20, DS18S20, DallasTemperature, DeviceAddress, Resolution, ScratchPad};
use core::cell::{Cell, RefCell, RefMut};
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireCrc, OneWireError, OneWireResult};
use std::{rc::Rc, vec::Vec};

/// Simulated time in nanoseconds, shared between the bus and the delay.
#[derive(Debug, Clone, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn now_ms(&self) -> u64 {
        self.0.get() / 1_000_000
    }

    pub fn advance_ms(&self, ms: u64) {
        self.0.set(self.0.get() + ms * 1_000_000);
    }
}

impl DelayNs for SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.0.set(self.0.get() + u64::from(ns));
    }
}

/// Floor of `celsius` in 1/16 °C.
fn sixteenths(celsius: f32) -> i16 {
    let scaled = celsius * 16.0;
    let t = scaled as i16;
    if f32::from(t) > scaled { t - 1 } else { t }
}

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub rom: DeviceAddress,
    /// Bytes 0 to 7; the CRC is computed when the scratchpad is read.
    pub scratch: [u8; 9],
    pub eeprom: [u8; 3],
    pub parasite: bool,
    /// Temperature the next conversion latches.
    pub celsius: f32,
    pub corrupt_crc: bool,
    /// Holds the conversion slot low forever once a conversion starts.
    pub stalled: bool,
    converting_until: Option<u64>,
}

impl SimDevice {
    pub fn with_rom(rom: DeviceAddress, celsius: f32) -> Self {
        let config = if rom.family() == DS18S20 {
            0xff
        } else {
            Configuration::for_resolution(Resolution::Bits12).into_bits()
        };
        let mut dev = Self {
            rom,
            scratch: [0, 0, 75, 70, config, 0xff, 0x0c, 0x10, 0],
            eeprom: [75, 70, config],
            parasite: false,
            celsius,
            corrupt_crc: false,
            stalled: false,
            converting_until: None,
        };
        dev.latch();
        dev
    }

    pub fn ds18b20(serial: u8, celsius: f32) -> Self {
        Self::with_rom(
            DeviceAddress::from_serial(DS18B20, [serial, 0x0c, 0, 0, 0, 0]),
            celsius,
        )
    }

    pub fn ds18s20(serial: u8, celsius: f32) -> Self {
        Self::with_rom(
            DeviceAddress::from_serial(DS18S20, [serial, 0x08, 0, 0, 0, 0]),
            celsius,
        )
    }

    pub fn with_parasite(mut self) -> Self {
        self.parasite = true;
        self
    }

    pub fn with_stalled_conversion(mut self) -> Self {
        self.stalled = true;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        let config = Configuration::for_resolution(resolution).into_bits();
        self.scratch[4] = config;
        self.eeprom[2] = config;
        self.latch();
        self
    }

    fn is_ds18s20(&self) -> bool {
        self.rom.family() == DS18S20
    }

    fn conversion_ms(&self) -> u64 {
        if self.is_ds18s20() {
            750
        } else {
            let config = Configuration::from_bits(self.scratch[4]);
            u64::from(config.resolution().conversion_time_ms())
        }
    }

    /// Stores `celsius` in the temperature register the way the part encodes it.
    fn latch(&mut self) {
        let t16 = sixteenths(self.celsius);
        if self.is_ds18s20() {
            let mut whole = t16 >> 4;
            let frac = t16 & 0xf;
            let mut raw = whole << 1;
            let count_remain = if frac > 12 {
                whole += 1;
                raw = whole << 1;
                28 - frac
            } else {
                if frac >= 8 {
                    raw |= 1;
                }
                12 - frac
            };
            self.scratch[..2].copy_from_slice(&raw.to_le_bytes());
            self.scratch[6] = count_remain as u8;
            self.scratch[7] = 16;
        } else {
            let mask = Configuration::from_bits(self.scratch[4])
                .resolution()
                .defined_bits_mask();
            // undefined fraction bits read back as ones
            let raw = (t16 & mask) | !mask;
            self.scratch[..2].copy_from_slice(&raw.to_le_bytes());
        }
    }

    fn read_scratch(&self) -> [u8; 9] {
        let mut out = self.scratch;
        out[8] = OneWireCrc::compute(&out[..8]);
        if self.corrupt_crc {
            out[8] ^= 0x5a;
        }
        out
    }

    fn write_scratch(&mut self, pos: usize, byte: u8) {
        match pos {
            0 | 1 => self.scratch[2 + pos] = byte,
            2 if !self.is_ds18s20() => self.scratch[4] = (byte & 0x60) | 0x1f,
            _ => {}
        }
    }

    fn in_alarm(&self) -> bool {
        let raw = ScratchPad::from(self.read_scratch()).raw_temperature();
        let whole = if self.is_ds18s20() { raw >> 1 } else { raw >> 4 };
        whole <= i16::from(self.scratch[3] as i8) || whole >= i16::from(self.scratch[2] as i8)
    }

    fn rom_bit(&self, bit: usize) -> bool {
        self.rom.as_bytes()[bit / 8] & (1 << (bit % 8)) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// After a reset, waiting for a ROM command.
    Rom,
    Search { bit: usize, step: u8 },
    Match { pos: usize },
    Function,
    ReadScratch { pos: usize },
    WriteScratch { pos: usize },
    PowerSupply,
    Converting,
    Recall,
    Done,
}

#[derive(Debug)]
pub struct SimState {
    pub devices: Vec<SimDevice>,
    /// Cleared to simulate a bus nobody answers on.
    pub presence: bool,
    pub resets: usize,
    pub strong_pullup: bool,
    pub pullup_activations: usize,
    pub pullup_supported: bool,
    clock: SimClock,
    phase: Phase,
    selected: Vec<bool>,
    match_rom: [u8; 8],
}

impl SimState {
    fn tick(&mut self) {
        let now = self.clock.0.get();
        for dev in self.devices.iter_mut() {
            if dev.converting_until.is_some_and(|t| t <= now) {
                dev.converting_until = None;
                dev.latch();
            }
        }
    }

    fn active(&self) -> impl Iterator<Item = &SimDevice> {
        self.devices
            .iter()
            .zip(self.selected.iter())
            .filter_map(|(d, &s)| s.then_some(d))
    }

    fn active_mut(&mut self) -> impl Iterator<Item = &mut SimDevice> {
        self.devices
            .iter_mut()
            .zip(self.selected.iter())
            .filter_map(|(d, &s)| s.then_some(d))
    }

    fn select_all(&mut self, filter: impl Fn(&SimDevice) -> bool) {
        self.selected = self.devices.iter().map(filter).collect();
    }

    fn command(&mut self, cmd: u8) {
        let now = self.clock.0.get();
        self.phase = match cmd {
            0xbe => Phase::ReadScratch { pos: 0 },
            0x4e => Phase::WriteScratch { pos: 0 },
            0x48 => {
                for dev in self.active_mut() {
                    dev.eeprom.copy_from_slice(&dev.scratch[2..5]);
                }
                Phase::Done
            }
            0xb8 => {
                for dev in self.active_mut() {
                    let eeprom = dev.eeprom;
                    dev.scratch[2..5].copy_from_slice(&eeprom);
                }
                Phase::Recall
            }
            0xb4 => Phase::PowerSupply,
            0x44 => {
                for dev in self.active_mut() {
                    // real parts usually finish well inside the datasheet budget
                    dev.converting_until = Some(if dev.stalled {
                        u64::MAX
                    } else {
                        now + dev.conversion_ms() * 1_000_000 / 2
                    });
                }
                Phase::Converting
            }
            _ => Phase::Done,
        };
    }
}

/// Handle to the simulated bus; clones share the same state.
#[derive(Debug, Clone)]
pub struct SimBus(Rc<RefCell<SimState>>);

impl SimBus {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        let selected = std::vec![false; devices.len()];
        Self(Rc::new(RefCell::new(SimState {
            devices,
            presence: true,
            resets: 0,
            strong_pullup: false,
            pullup_activations: 0,
            pullup_supported: true,
            clock: SimClock::default(),
            phase: Phase::Done,
            selected,
            match_rom: [0; 8],
        })))
    }

    pub fn state(&self) -> RefMut<'_, SimState> {
        self.0.borrow_mut()
    }

    pub fn clock(&self) -> SimClock {
        self.0.borrow().clock.clone()
    }
}

impl OneWire for SimBus {
    type Status = bool;
    type BusError = ();

    fn reset(&mut self) -> OneWireResult<bool, ()> {
        let mut s = self.state();
        s.tick();
        s.resets += 1;
        let presence = s.presence && !s.devices.is_empty();
        s.phase = if presence { Phase::Rom } else { Phase::Done };
        let n = s.devices.len();
        s.selected = std::vec![false; n];
        Ok(presence)
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), ()> {
        let mut s = self.state();
        s.tick();
        let phase = s.phase;
        match phase {
            Phase::Rom => match byte {
                0x55 => s.phase = Phase::Match { pos: 0 },
                0xcc => {
                    s.select_all(|_| true);
                    s.phase = Phase::Function;
                }
                0xf0 => {
                    s.select_all(|_| true);
                    s.phase = Phase::Search { bit: 0, step: 0 };
                }
                0xec => {
                    s.select_all(SimDevice::in_alarm);
                    s.phase = Phase::Search { bit: 0, step: 0 };
                }
                _ => s.phase = Phase::Done,
            },
            Phase::Match { pos } => {
                s.match_rom[pos] = byte;
                if pos + 1 < 8 {
                    s.phase = Phase::Match { pos: pos + 1 };
                } else {
                    let rom = DeviceAddress::new(s.match_rom);
                    s.select_all(|d| d.rom == rom);
                    s.phase = Phase::Function;
                }
            }
            Phase::Function => s.command(byte),
            Phase::WriteScratch { pos } => {
                for dev in s.active_mut() {
                    dev.write_scratch(pos, byte);
                }
                s.phase = Phase::WriteScratch { pos: pos + 1 };
            }
            _ => {}
        }
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, ()> {
        let mut s = self.state();
        s.tick();
        let Phase::ReadScratch { pos } = s.phase else {
            return Ok(0xff);
        };
        s.phase = Phase::ReadScratch { pos: pos + 1 };
        if pos >= ScratchPad::BYTES {
            return Ok(0xff);
        }
        // wired-AND of everyone addressed
        Ok(s.active().fold(0xff, |acc, d| acc & d.read_scratch()[pos]))
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), ()> {
        let mut s = self.state();
        let phase = s.phase;
        if let Phase::Search { bit: k, step: 2 } = phase {
            let devices = s.devices.iter().map(|d| d.rom_bit(k) == bit).collect::<Vec<_>>();
            for (sel, keep) in s.selected.iter_mut().zip(devices) {
                *sel &= keep;
            }
            s.phase = if k + 1 < 64 {
                Phase::Search { bit: k + 1, step: 0 }
            } else {
                Phase::Function
            };
        }
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, ()> {
        let mut s = self.state();
        s.tick();
        let phase = s.phase;
        let level = match phase {
            Phase::Search { bit, step } if step < 2 => {
                s.phase = Phase::Search { bit, step: step + 1 };
                // each device sends its bit, then its complement
                s.active().all(|d| d.rom_bit(bit) != (step == 1))
            }
            Phase::PowerSupply => !s.active().any(|d| d.parasite),
            Phase::Converting => !s.active().any(|d| d.converting_until.is_some()),
            _ => true,
        };
        Ok(level)
    }

    fn set_strong_pullup(&mut self, enable: bool) -> OneWireResult<(), ()> {
        let mut s = self.state();
        if !s.pullup_supported {
            return Err(OneWireError::Unimplemented);
        }
        if enable && !s.strong_pullup {
            s.pullup_activations += 1;
        }
        s.strong_pullup = enable;
        Ok(())
    }
}

/// A session on a fresh simulated bus, plus a handle to inspect the bus.
pub fn session<D: DelayNs>(delay: D, devices: Vec<SimDevice>) -> (DallasTemperature<SimBus, D>, SimBus) {
    let bus = SimBus::new(devices);
    (DallasTemperature::new(bus.clone(), delay), bus)
}

/// Like [`session`], with the delay driving the bus clock.
pub fn timed_session(devices: Vec<SimDevice>) -> (DallasTemperature<SimBus, SimClock>, SimBus, SimClock) {
    let bus = SimBus::new(devices);
    let clock = bus.clock();
    (DallasTemperature::new(bus.clone(), clock.clone()), bus, clock)
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
