//! Gateway close codes
//!
//! Application-level WebSocket close codes sent when the server ends a connection.

/// WebSocket close codes used by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// Unexpected server-side failure
    UnknownError = 4000,
    /// Client sent an op code it is not allowed to send
    UnknownOpcode = 4001,
    /// Client frame was not a valid gateway message
    DecodeError = 4002,
    /// No credential arrived before the authentication deadline
    NotAuthenticated = 4003,
    /// Credential was rejected by the authentication gate
    AuthenticationFailed = 4004,
    /// Identify sent on an already authenticated connection
    AlreadyAuthenticated = 4005,
    /// Heartbeat timeout elapsed
    SessionTimeout = 4009,
    /// Connection was closed by an operator or by shutdown
    DisconnectedByServer = 4010,
}

impl CloseCode {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4009 => Some(Self::SessionTimeout),
            4010 => Some(Self::DisconnectedByServer),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether a client should retry after receiving this code
    ///
    /// Credential failures will keep failing until the client obtains a new token.
    #[must_use]
    pub const fn should_reconnect(self) -> bool {
        !matches!(self, Self::NotAuthenticated | Self::AuthenticationFailed)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "Unknown error occurred",
            Self::UnknownOpcode => "Invalid opcode sent",
            Self::DecodeError => "Invalid payload encoding",
            Self::NotAuthenticated => "Not authenticated",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::SessionTimeout => "Session timeout",
            Self::DisconnectedByServer => "Disconnected by server",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UnknownError => "UnknownError",
            Self::UnknownOpcode => "UnknownOpcode",
            Self::DecodeError => "DecodeError",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::AlreadyAuthenticated => "AlreadyAuthenticated",
            Self::SessionTimeout => "SessionTimeout",
            Self::DisconnectedByServer => "DisconnectedByServer",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
