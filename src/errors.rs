use std::{error, fmt, io, sync::Arc};

use arcstr::ArcStr;

use crate::parser::ParseError;

/// An enum of all error kinds.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The connection URL did not parse.
    UrlInvalid,
    /// The host component is missing or cannot be resolved.
    HostInvalid,
    /// The port component is not a valid port number.
    PortInvalid,
    /// The database index is not a valid number or was rejected by SELECT.
    DbIndexInvalid,
    /// The resolved address family is not supported.
    AddressTypeInvalid,
    /// A socket read or write failed.
    Network,
    /// The peer closed the connection, or the session was closed locally.
    ConnectionClosed,
    /// A deadline elapsed before the reply arrived.
    Timeout,
    /// The server rejected the credentials.
    AuthenticationFailed,
    /// The reply stream violated RESP framing. Fatal for the connection.
    Parse,
    /// A reply frame exceeded the receive buffer safety cap. Fatal for the
    /// connection.
    BufferOverflow,
    /// The caller submitted an empty or malformed command.
    Command,
    /// An internal invariant was violated.
    Internal,
}

/// Represents a client-side failure.
///
/// Server error replies (`-ERR …` frames) are *not* represented here; they
/// are returned as [`Value::Error`](crate::Value::Error) so that one failed
/// sub-command cannot abort the rest of a pipeline.
#[derive(Clone)]
pub struct RedisError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    General(ErrorKind, &'static str, Option<ArcStr>),
    Io {
        kind: ErrorKind,
        err: Arc<io::Error>,
    },
    Parsing(ParseError),
}

impl PartialEq for RedisError {
    fn eq(&self, other: &RedisError) -> bool {
        self.kind() == other.kind()
    }
}

impl From<io::Error> for RedisError {
    fn from(err: io::Error) -> RedisError {
        let kind = match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected => ErrorKind::ConnectionClosed,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,
            _ => ErrorKind::Network,
        };
        RedisError {
            repr: ErrorRepr::Io {
                kind,
                err: Arc::new(err),
            },
        }
    }
}

impl From<ParseError> for RedisError {
    fn from(err: ParseError) -> RedisError {
        RedisError {
            repr: ErrorRepr::Parsing(err),
        }
    }
}

impl From<tokio::time::error::Elapsed> for RedisError {
    fn from(_: tokio::time::error::Elapsed) -> RedisError {
        RedisError {
            repr: ErrorRepr::General(ErrorKind::Timeout, "Deadline elapsed", None),
        }
    }
}

impl From<(ErrorKind, &'static str)> for RedisError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> RedisError {
        RedisError {
            repr: ErrorRepr::General(kind, desc, None),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for RedisError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> RedisError {
        RedisError {
            repr: ErrorRepr::General(kind, desc, Some(detail.into())),
        }
    }
}

impl error::Error for RedisError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Io { err, .. } => Some(err.as_ref()),
            ErrorRepr::Parsing(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Debug for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::General(kind, desc, detail) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(kind, f)?;
                if let Some(detail) = detail {
                    f.write_str(": ")?;
                    detail.fmt(f)?;
                }
                Ok(())
            }
            ErrorRepr::Io { err, .. } => err.fmt(f),
            ErrorRepr::Parsing(err) => err.fmt(f),
        }
    }
}

impl RedisError {
    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::General(kind, _, _) => *kind,
            ErrorRepr::Io { kind, .. } => *kind,
            ErrorRepr::Parsing(ParseError::BufferOverflow) => ErrorKind::BufferOverflow,
            ErrorRepr::Parsing(_) => ErrorKind::Parse,
        }
    }

    /// Returns the error detail, if one was recorded.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::General(_, _, detail) => detail.as_deref(),
            _ => None,
        }
    }

    /// Returns the name of the error category for display purposes.
    pub fn category(&self) -> &str {
        match self.kind() {
            ErrorKind::UrlInvalid => "invalid URL",
            ErrorKind::HostInvalid => "invalid host",
            ErrorKind::PortInvalid => "invalid port",
            ErrorKind::DbIndexInvalid => "invalid database index",
            ErrorKind::AddressTypeInvalid => "invalid address type",
            ErrorKind::Network => "network error",
            ErrorKind::ConnectionClosed => "connection closed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AuthenticationFailed => "authentication failed",
            ErrorKind::Parse => "parse error",
            ErrorKind::BufferOverflow => "receive buffer overflow",
            ErrorKind::Command => "command error",
            ErrorKind::Internal => "internal error",
        }
    }

    pub(crate) fn as_io_error(&self) -> Option<&io::Error> {
        match &self.repr {
            ErrorRepr::Io { err, .. } => Some(err),
            _ => None,
        }
    }

    /// Indicates that this failure originated in socket I/O.
    pub fn is_io_error(&self) -> bool {
        matches!(self.repr, ErrorRepr::Io { .. })
    }

    /// Returns true if the error was caused by a deadline elapsing.
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Returns true if the error indicates the connection was dropped.
    pub fn is_connection_dropped(&self) -> bool {
        match self.kind() {
            ErrorKind::Network | ErrorKind::ConnectionClosed => true,
            _ => self.as_io_error().is_some_and(|err| {
                matches!(
                    err.kind(),
                    io::ErrorKind::BrokenPipe
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionRefused
                        | io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::UnexpectedEof
                        | io::ErrorKind::NotConnected
                )
            }),
        }
    }

    /// Returns true if the connection cannot be used after this error and
    /// must be replaced. The pool drops entries that report this.
    pub fn is_unrecoverable_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Network
                | ErrorKind::ConnectionClosed
                | ErrorKind::Parse
                | ErrorKind::BufferOverflow
        )
    }

    pub(crate) fn closed() -> Self {
        RedisError {
            repr: ErrorRepr::General(ErrorKind::ConnectionClosed, "Connection closed", None),
        }
    }

    pub(crate) fn make_empty_command() -> Self {
        RedisError {
            repr: ErrorRepr::General(ErrorKind::Command, "Empty command", None),
        }
    }
}
