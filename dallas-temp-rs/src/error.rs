use core::fmt::{Debug, Display, Formatter};
use embedded_onewire::OneWireError;

/// Faults of the Dallas temperature driver.
///
/// The sentinel and boolean returning operations of
/// [`DallasTemperature`](crate::DallasTemperature) fold these into their
/// return values; the `Result` returning ones hand them to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DallasError<E> {
    /// The bus misbehaved: no presence pulse, short circuit or a transport error.
    Bus(OneWireError<E>),
    /// A scratchpad failed its CRC check or read back as all zeros.
    Integrity,
    /// The index is outside the directory, or the address is not a valid ROM code.
    NotFound,
}

impl<E> From<OneWireError<E>> for DallasError<E> {
    fn from(value: OneWireError<E>) -> Self {
        Self::Bus(value)
    }
}

impl<E: Debug> Display for DallasError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "bus fault: {e}"),
            Self::Integrity => f.write_str("scratchpad integrity check failed"),
            Self::NotFound => f.write_str("device not found"),
        }
    }
}

impl<E> DallasError<E> {
    /// Returns true if the fault came from the bus rather than from the device data.
    pub fn is_bus_fault(&self) -> bool {
        matches!(self, Self::Bus(_))
    }
}
