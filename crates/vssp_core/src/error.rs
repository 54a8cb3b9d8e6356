use thiserror::Error;

/// Reasons a datagram cannot be read as a VSSP fragment.
///
/// None of these are fatal: the relay drops the datagram, counts it and keeps
/// receiving.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("datagram truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The leading marker is not `VSSP`. The packet belongs to some other
    /// protocol (or an unsupported header version) and should be ignored.
    #[error("foreign packet with marker {0:02x?}")]
    ForeignMagic([u8; 4]),

    #[error("payload overrun: header declares {declared} bytes but only {available} follow")]
    PayloadOverrun { declared: usize, available: usize },
}

impl ProtocolError {
    /// True when the datagram is simply not ours, as opposed to a broken VSSP fragment.
    pub fn is_foreign(&self) -> bool {
        matches!(self, ProtocolError::ForeignMagic(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolicyError {
    #[error("completion threshold must be in (0, 1], got {0}")]
    ThresholdOutOfRange(f64),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FragmentError {
    #[error("fragment payload size must be between 1 and {max}, got {requested}")]
    InvalidPayloadSize { requested: usize, max: usize },

    #[error("frame of {len} bytes needs {needed} fragments, more than a header can address")]
    TooManyFragments { len: usize, needed: usize },
}
