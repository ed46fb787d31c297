use crate::{
    OneWire, OneWireStatus,
    consts::{ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_ROM_BYTES, ONEWIRE_SEARCH_CMD},
    error::OneWireError,
    utils::OneWireCrc,
};

/// A structure for searching devices on a 1-Wire bus.
/// This structure implements the search algorithm for discovering devices on the 1-Wire bus.
/// It maintains the state of the search.
pub struct OneWireSearch<'a, T> {
    onewire: &'a mut T,
    cmd: u8,
    last_device: bool,
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    rom: [u8; ONEWIRE_ROM_BYTES],
}

impl<T> core::fmt::Debug for OneWireSearch<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OneWireSearch")
            .field("cmd", &self.cmd)
            .field("last_device", &self.last_device)
            .field("last_discrepancy", &self.last_discrepancy)
            .field("last_family_discrepancy", &self.last_family_discrepancy)
            .field("rom", &self.rom)
            .finish()
    }
}

/// Type of search performed using [`OneWireSearch`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneWireSearchKind {
    /// Normal search
    Normal = ONEWIRE_SEARCH_CMD,
    /// Search only for devices with alarm
    Alarmed = ONEWIRE_CONDITIONAL_SEARCH_CMD,
}

impl<'a, T> OneWireSearch<'a, T> {
    /// Creates a new [`OneWireSearch`] instance.
    ///
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    /// * `cmd` - The kind of search to perform, normal or alarm-conditional.
    pub fn new(onewire: &'a mut T, cmd: OneWireSearchKind) -> Self {
        Self {
            onewire,
            cmd: cmd as _,
            last_device: false,
            last_discrepancy: 0,
            last_family_discrepancy: 0,
            rom: [0; ONEWIRE_ROM_BYTES],
        }
    }

    /// Returns true once the last device of the tree has been reported.
    pub fn exhausted(&self) -> bool {
        self.last_device
    }

    /// Bit position (1-based) of the last branch in the family code byte, 0 if none.
    pub fn last_family_discrepancy(&self) -> u8 {
        self.last_family_discrepancy
    }
}

impl<T: OneWire> OneWireSearch<'_, T> {
    /// Searches for the next device on the 1-Wire bus.
    /// This method implements the [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html) to discover devices connected to the bus.
    /// The [next](OneWireSearch::next) method can be called repeatedly to find all devices on the bus.
    /// At the end of the search, calling this method will return `None` to indicate that no more devices are present.
    ///
    /// Each call walks exactly 64 bit positions, so a pass is bounded by the address depth.
    ///
    /// # Returns
    /// A result containing the ROM code of the found device as a `u64` value.
    ///
    /// | Bit | Description |
    /// |-----|-------------|
    /// | 0-7 | Family code (e.g., 0x28 for DS18B20) |
    /// | 8-55 | Serial number |
    /// | 56-63 | CRC-8 (`0b1_0001_1001` poly) |
    ///
    /// # Errors
    /// [`OneWireError::NoDevicePresent`] when the reset sees no presence pulse,
    /// [`OneWireError::ShortCircuit`] when the line is held low, and
    /// [`OneWireError::InvalidRomCrc`] when the ROM collected in this pass fails its CRC.
    /// The search state has already advanced past a corrupted ROM, so calling
    /// [next](OneWireSearch::next) again continues with the following branch.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<u64>, OneWireError<T::BusError>> {
        if self.last_device {
            return Ok(None); // If the last device was found, return None
        }
        let status = self.onewire.reset()?;
        if status.shortcircuit() {
            return Err(OneWireError::ShortCircuit);
        }
        if !status.presence() {
            self.last_device = true;
            return Err(OneWireError::NoDevicePresent);
        }
        let mut last_zero: u8 = 0;
        self.onewire.write_byte(self.cmd)?; // Search ROM command
        for id_bit_num in 1..=64u8 {
            let idx = ((id_bit_num - 1) / 8) as usize; // Index in the ROM array
            let rom_mask = 1u8 << ((id_bit_num - 1) % 8); // Mask for the current bit in the ROM byte
            let id_bit = self.onewire.read_bit()?;
            let complement_bit = self.onewire.read_bit()?;
            if id_bit && complement_bit {
                // Nobody is left on this branch, the tree changed under us
                self.last_discrepancy = 0;
                self.last_family_discrepancy = 0;
                self.last_device = true;
                return Ok(None);
            }
            let dir = if id_bit != complement_bit {
                // All remaining devices agree on this bit
                id_bit
            } else {
                // Both bits are 0: a branch. Retrace the previous path before
                // the last discrepancy, take the 1 side at it, and 0 after it.
                let dir = if id_bit_num < self.last_discrepancy {
                    self.rom[idx] & rom_mask > 0
                } else {
                    id_bit_num == self.last_discrepancy
                };
                if !dir {
                    last_zero = id_bit_num;
                    if last_zero < 9 {
                        self.last_family_discrepancy = last_zero;
                    }
                }
                dir
            };
            if dir {
                self.rom[idx] |= rom_mask; // Set the bit in the ROM
            } else {
                self.rom[idx] &= !rom_mask; // Clear the bit in the ROM
            }
            self.onewire.write_bit(dir)?;
        }
        self.last_discrepancy = last_zero;
        self.last_device = self.last_discrepancy == 0;

        if self.rom[0] == 0 {
            // A family code of zero is what an all-low (shorted) line looks like
            return Ok(None);
        }
        if !OneWireCrc::validate(&self.rom) {
            return Err(OneWireError::InvalidRomCrc);
        }
        Ok(Some(u64::from_le_bytes(self.rom)))
    }
}
