/// One wire communication error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying hardware.
    Other(E),
    /// Indicates that no device answered the reset with a presence pulse.
    NoDevicePresent,
    /// Indicates that a short circuit was detected on the bus.
    ShortCircuit,
    /// Indicates that the operation is not implemented by the transport, such as a strong pull-up.
    Unimplemented,
    /// Computed CRC of the ROM is invalid.
    InvalidRomCrc,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for OneWireError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Other(e) => write!(f, "transport error: {e:?}"),
            Self::NoDevicePresent => f.write_str("no presence pulse"),
            Self::ShortCircuit => f.write_str("bus short circuit"),
            Self::Unimplemented => f.write_str("operation not supported by transport"),
            Self::InvalidRomCrc => f.write_str("ROM CRC mismatch"),
        }
    }
}
