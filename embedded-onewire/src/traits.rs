use crate::{
    OneWireError, OneWireResult,
    consts::{ONEWIRE_MATCH_ROM_CMD, ONEWIRE_ROM_BYTES, ONEWIRE_SKIP_ROM_CMD},
};

/// Status of the bus reported by a reset/presence cycle.
pub trait OneWireStatus {
    /// Returns true if at least one device answered the reset with a presence pulse.
    fn presence(&self) -> bool;

    /// Returns true if the line was found held low (short circuit).
    fn shortcircuit(&self) -> bool {
        false
    }
}

/// Transports that only sample the presence pulse report it as a plain `bool`.
impl OneWireStatus for bool {
    fn presence(&self) -> bool {
        *self
    }
}

/// Trait for 1-Wire communication.
/// This trait defines the basic operations required for 1-Wire communication, such as resetting the bus,
/// writing and reading bytes, writing and reading bits, and driving a strong pull-up.
///
/// Implementors own the physical timing of every slot. A transaction started with
/// [`reset`](OneWire::reset) must run to its last slot before the next reset.
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// # Errors
    /// This method returns an error if the reset operation fails.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus, least significant bit first.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus, least significant bit first.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Generates a single write time slot.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Generates a single read time slot and returns the sampled level.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// Enables or disables the strong pull-up on the line.
    ///
    /// Parasite-powered devices draw their conversion and EEPROM write current
    /// from the data line, so the master must hold the line high through a low
    /// impedance path for the duration of those operations.
    ///
    /// Transports without a strong pull-up keep the default, which reports
    /// [`OneWireError::Unimplemented`].
    fn set_strong_pullup(&mut self, _enable: bool) -> OneWireResult<(), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Addresses devices on the 1-Wire bus.
    /// The first [`OneWire::read_byte`], [`OneWire::read_bit`], [`OneWire::write_byte`], [`OneWire::write_bit`] operation should be preceded by this method to address devices on the bus.
    /// Note: A [`OneWire::read_byte`] or [`OneWire::read_bit`] call will return garbage data if this method is called without specifying a ROM address on a bus with multiple devices.
    /// # Arguments
    /// * `rom` - The ROM address of the device to address. Pass [`None`] to skip ROM addressing and address all devices on the bus.
    ///
    /// # Errors
    /// Returns [`OneWireError::NoDevicePresent`] if no presence pulse followed the reset,
    /// and [`OneWireError::ShortCircuit`] if the line is held low.
    fn address(&mut self, rom: Option<&[u8; ONEWIRE_ROM_BYTES]>) -> OneWireResult<(), Self::BusError> {
        let status = self.reset()?; // Reset the bus before addressing
        if status.shortcircuit() {
            return Err(OneWireError::ShortCircuit);
        }
        if !status.presence() {
            return Err(OneWireError::NoDevicePresent);
        }
        match rom {
            Some(rom) => {
                self.write_byte(ONEWIRE_MATCH_ROM_CMD)?; // Send the match ROM command
                for &b in rom.iter() {
                    self.write_byte(b)?; // Write each byte of the ROM address
                }
            }
            None => self.write_byte(ONEWIRE_SKIP_ROM_CMD)?,
        }
        Ok(())
    }
}
