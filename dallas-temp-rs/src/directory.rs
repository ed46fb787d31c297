use crate::{DallasError, DallasResult, DallasTemperature, DeviceAddress};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireError, OneWireSearch, OneWireSearchKind};
use log::{debug, trace, warn};

/// Passes returning a corrupted ROM tolerated in one search before giving up.
const MAX_CORRUPT_PASSES: usize = 8;

/// Walks the ROM tree once, storing devices of `families` in `out`.
///
/// ROM codes failing their CRC are dropped. Returns the number of entries written.
pub(crate) fn scan<O>(
    bus: &mut O,
    kind: OneWireSearchKind,
    families: &[u8],
    out: &mut [DeviceAddress],
) -> DallasResult<usize, O::BusError>
where
    O: OneWire,
    O::BusError: Debug,
{
    let mut search = OneWireSearch::new(bus, kind);
    let mut found = 0;
    let mut corrupt = 0;
    while found < out.len() {
        match search.next() {
            Ok(Some(rom)) => {
                let addr = DeviceAddress::from(rom);
                if families.contains(&addr.family()) {
                    trace!("found {addr}");
                    out[found] = addr;
                    found += 1;
                } else {
                    debug!("ignoring {addr}, family {:#04x}", addr.family());
                }
            }
            Ok(None) => break,
            Err(OneWireError::InvalidRomCrc) => {
                corrupt += 1;
                warn!("discarded a ROM code with a bad CRC");
                if corrupt >= MAX_CORRUPT_PASSES {
                    warn!("too many corrupted ROM codes, search stopped early");
                    break;
                }
            }
            Err(e) => return Err(DallasError::Bus(e)),
        }
    }
    Ok(found)
}

impl<O, D, const N: usize> DallasTemperature<O, D, N>
where
    O: OneWire,
    O::BusError: Debug,
    D: DelayNs,
{
    /// Searches the bus and replaces the directory with the sensors found.
    ///
    /// Only devices of the configured families with a valid ROM CRC are kept,
    /// at most `N` of them. A bus fault leaves the directory empty.
    pub fn search(&mut self) -> &[DeviceAddress] {
        self.release_pullup();
        self.broadcast_resolution = None;
        self.devices = match scan(
            &mut self.bus,
            OneWireSearchKind::Normal,
            self.families,
            &mut self.roms,
        ) {
            Ok(found) => found,
            Err(e) => {
                warn!("search failed: {e}");
                0
            }
        };
        debug!("directory holds {} device(s)", self.devices);
        &self.roms[..self.devices]
    }

    /// Addresses found by the last search.
    pub fn devices(&self) -> &[DeviceAddress] {
        &self.roms[..self.devices]
    }

    /// Number of devices found by the last search, 0 if it failed.
    pub fn device_count(&self) -> usize {
        self.devices
    }

    /// Address of the device at `index` in the directory.
    pub fn get_address(&self, index: usize) -> Option<DeviceAddress> {
        self.devices().get(index).copied()
    }

    /// Returns true if the CRC byte of `addr` matches.
    pub fn valid_address(&self, addr: &DeviceAddress) -> bool {
        addr.is_valid()
    }

    /// Returns true if `addr` belongs to one of the families this session talks to.
    pub fn valid_family(&self, addr: &DeviceAddress) -> bool {
        self.families.contains(&addr.family())
    }
}
