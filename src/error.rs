use {std::io, thiserror::Error};

/// Failures at the raw bus transport layer.
///
/// Transport errors are considered transient: the session layer retries them
/// a bounded number of times before giving up on the exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The bus device could not be opened or addressed.
    #[error("bus unavailable: {0}")]
    BusUnavailable(#[source] io::Error),
    /// No reply arrived within the configured deadline.
    #[error("bus read timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// Fewer bytes than requested arrived.
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead {
        /// Number of bytes requested.
        expected: usize,
        /// Number of bytes actually read.
        got: usize,
    },
    /// Any other I/O failure on the bus device.
    #[error("bus i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Failures decoding or interpreting DDC/CI frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Reply checksum mismatch.
    #[error("reply checksum mismatch: expected {expected:#04x}, found {found:#04x}")]
    Checksum {
        /// Checksum computed over the received frame.
        expected: u8,
        /// Checksum byte carried by the frame.
        found: u8,
    },
    /// The display answered with the null message (or an all-zero read).
    ///
    /// Not a hard error: monitors routinely need several polls after
    /// wake-from-sleep, so the session retries these.
    #[error("display not ready (null response)")]
    NotReady,
    /// The reply is structurally invalid (bad address or length byte).
    #[error("malformed reply frame: {0}")]
    BadFrame(&'static str),
    /// The capabilities string is not a balanced group structure.
    #[error("malformed capabilities string: {0}")]
    MalformedCapabilities(String),
    /// A multi-part reply fragment echoed an unexpected offset.
    #[error("fragment offset mismatch: requested {requested}, display answered {answered}")]
    FragmentOffset {
        /// Offset the request asked for.
        requested: usize,
        /// Offset echoed in the reply.
        answered: usize,
    },
}

/// Caller mistakes and registry mismatches. Never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The feature is not readable/writable, per the registry or the display.
    #[error("feature {0:#04x} is unsupported for this operation")]
    UnsupportedFeature(u8),
    /// The value lies outside the feature's declared range or discrete set.
    #[error("value {value} out of range for feature {feature:#04x}")]
    OutOfRange {
        /// Feature code the write addressed.
        feature: u8,
        /// Rejected value.
        value: u16,
    },
    /// The decoded reply does not match what was asked for.
    #[error("invalid reply: {0}")]
    InvalidReply(&'static str),
    /// A verified write read back a different value.
    #[error("verify failed for feature {feature:#04x}: wrote {expected}, read back {actual}")]
    VerifyFailed {
        /// Feature code the write addressed.
        feature: u8,
        /// Value that was written.
        expected: u16,
        /// Value the follow-up read returned.
        actual: u16,
    },
}

/// Session and display-selection failures. Surfaced immediately.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another live handle exists for the same display in this process.
    #[error("display on bus {0} is already open")]
    AlreadyOpen(u32),
    /// A non-unique identifier matched more than one display.
    #[error("identifier matches {0} displays")]
    AmbiguousMatch(usize),
    /// No display matched the identifier.
    #[error("display not found")]
    NotFound,
    /// The display never produced a usable reply within the retry budget.
    #[error("no response from display after {tries} tries")]
    NoResponse {
        /// Number of attempts made.
        tries: u32,
    },
    /// The handle was closed by an earlier failure or an explicit close.
    #[error("display handle is closed")]
    Closed,
}

/// Any failure this crate can produce.
#[derive(Debug, Error)]
pub enum Error {
    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// See [`ProtocolError`].
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// See [`SessionError`].
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl Error {
    /// Whether the session layer may retry the failed exchange.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(..) => true,
            Error::Protocol(e) => matches!(
                e,
                ProtocolError::Checksum { .. } | ProtocolError::NotReady | ProtocolError::BadFrame(..)
            ),
            Error::Validation(..) | Error::Session(..) => false,
        }
    }

    /// Process exit code for the `ddcctl` binary.
    ///
    /// 1: display not found/ambiguous/busy; 2: transport or no-response
    /// failure; 3: protocol or validation failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Session(SessionError::NoResponse { .. }) => 2,
            Error::Session(..) => 1,
            Error::Transport(..) => 2,
            Error::Protocol(..) | Error::Validation(..) => 3,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
