/// A WebSocket Close code.
///
/// Indicate why an endpoint is closing the WebSocket connection.
#[repr(u16)]
#[non_exhaustive]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// The purpose for which the connection was established has been fulfilled.
    Normal = 1000,
    /// An endpoint is "going away", such as a server going down or a browser
    /// having navigated away from a page.
    Away = 1001,
    /// An endpoint is terminating the connection due to a protocol error.
    Protocol = 1002,
    /// An endpoint received a type of data it cannot accept.
    Unsupported = 1003,
    /// No status code was present in the closing frame.
    ///
    /// Never sent on the wire, only reported to the client.
    NoStatusReceived = 1005,
    /// The connection was closed without a closing frame, or the closing frame
    /// carried a code that must not appear on the wire.
    ///
    /// Never sent on the wire, only reported to the client.
    Abnormal = 1006,
    /// A message contained data inconsistent with its type (e.g., non-UTF-8 text).
    Invalid = 1007,
    /// A message violated the endpoint's policy.
    Policy = 1008,
    /// A message was too big to process.
    Size = 1009,
    /// The client expected the server to negotiate an extension it did not.
    Extension = 1010,
    /// The server hit an unexpected condition.
    Error = 1011,
    /// The server is restarting.
    Restart = 1012,
    /// The server is overloaded.
    Again = 1013,
    /// The TLS handshake failed.
    ///
    /// Never sent on the wire, only reported to the client.
    TlsHandshake = 1015,
    /// Codes below 1000 and the unassigned part of 1000-2999.
    #[doc(hidden)]
    Reserved(u16),
    /// 3000-3999, registered with IANA.
    #[doc(hidden)]
    Registered(u16),
    /// 4000-4999, free for private use.
    #[doc(hidden)]
    Private(u16),
    /// Anything above 4999.
    #[doc(hidden)]
    Other(u16),
}

impl CloseCode {
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::Away,
            1002 => Self::Protocol,
            1003 => Self::Unsupported,
            1005 => Self::NoStatusReceived,
            1006 => Self::Abnormal,
            1007 => Self::Invalid,
            1008 => Self::Policy,
            1009 => Self::Size,
            1010 => Self::Extension,
            1011 => Self::Error,
            1012 => Self::Restart,
            1013 => Self::Again,
            1015 => Self::TlsHandshake,
            0..=2999 => Self::Reserved(code),
            3000..=3999 => Self::Registered(code),
            4000..=4999 => Self::Private(code),
            _ => Self::Other(code),
        }
    }

    pub const fn into_u16(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::Away => 1001,
            Self::Protocol => 1002,
            Self::Unsupported => 1003,
            Self::NoStatusReceived => 1005,
            Self::Abnormal => 1006,
            Self::Invalid => 1007,
            Self::Policy => 1008,
            Self::Size => 1009,
            Self::Extension => 1010,
            Self::Error => 1011,
            Self::Restart => 1012,
            Self::Again => 1013,
            Self::TlsHandshake => 1015,
            Self::Reserved(code)
            | Self::Registered(code)
            | Self::Private(code)
            | Self::Other(code) => code,
        }
    }

    /// The code reported to the client for a status code read from a Close frame.
    ///
    /// The three codes that may never appear on the wire, and anything below 1000,
    /// are reported as [`CloseCode::Abnormal`].
    pub(crate) const fn received(code: u16) -> Self {
        match is_sendable(code) {
            true => Self::from_u16(code),
            false => Self::Abnormal,
        }
    }

    /// Whether this code may be put in a Close frame.
    ///
    /// [`CloseCode::NoStatusReceived`], [`CloseCode::Abnormal`], [`CloseCode::TlsHandshake`]
    /// and anything below 1000 are only ever reported locally.
    pub const fn is_sendable(self) -> bool {
        is_sendable(self.into_u16())
    }
}

const fn is_sendable(code: u16) -> bool {
    !matches!(code, 0..=999 | 1005 | 1006 | 1015)
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.into_u16()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sendable() {
        for code in [0, 999, 1005, 1006, 1015] {
            assert!(!CloseCode::from_u16(code).is_sendable(), "{code}");
        }

        for code in [1000, 1001, 1011, 3000, 4000] {
            assert!(CloseCode::from_u16(code).is_sendable(), "{code}");
        }
    }

    #[test]
    fn wire_forbidden_codes_become_abnormal() {
        assert_eq!(CloseCode::received(1005), CloseCode::Abnormal);
        assert_eq!(CloseCode::received(1006), CloseCode::Abnormal);
        assert_eq!(CloseCode::received(1015), CloseCode::Abnormal);
        assert_eq!(CloseCode::received(999), CloseCode::Abnormal);
        assert_eq!(CloseCode::received(0), CloseCode::Abnormal);
    }

    #[test]
    fn ordinary_codes_pass_through() {
        assert_eq!(CloseCode::received(1000), CloseCode::Normal);
        assert_eq!(CloseCode::received(1004), CloseCode::Reserved(1004));
        assert_eq!(CloseCode::received(3000), CloseCode::Registered(3000));
        assert_eq!(CloseCode::received(4321), CloseCode::Private(4321));
    }

    #[test]
    fn u16_conversions_agree() {
        for code in [1000, 1001, 1004, 1011, 2999, 3001, 4999, 5000, u16::MAX] {
            assert_eq!(u16::from(CloseCode::from(code)), code);
        }
    }
}
