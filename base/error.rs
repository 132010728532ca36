// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

use std::fmt::{self, Write};

/// Returns a pretty-and-informative version of `e`: its display plus the full source chain.
pub fn prettify_error(e: &Error) -> String {
    let mut msg = e.to_string();
    let mut cause = e.source.as_deref().map(|e| e as &dyn std::error::Error);
    while let Some(c) = cause {
        write!(&mut msg, "\ncaused by: {c}").unwrap();
        cause = c.source();
    }
    msg
}

pub struct Error {
    kind: ErrorKind,
    msg: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            msg: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[doc(hidden)]
    pub fn with_msg(mut self, msg: String) -> Self {
        self.msg = Some(msg);
        self
    }

    #[doc(hidden)]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.msg, &self.source) {
            (Some(m), Some(s)) => write!(f, "{}: {m}: {s}", self.kind),
            (Some(m), None) => write!(f, "{}: {m}", self.kind),
            (None, Some(s)) => write!(f, "{}: {s}", self.kind),
            (None, None) => write!(f, "{}", self.kind),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::AddrInUse | std::io::ErrorKind::AddrNotAvailable => {
                ErrorKind::BindError
            }
            _ => ErrorKind::Internal,
        };
        Error::new(kind).with_source(e)
    }
}

/// Error kind, used by the HTTP layer to pick a status code and by logs to group errors.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Malformed or inconsistent configuration: duplicate device names, missing INI
    /// keys, unparseable values.
    ConfigError,
    /// A capture socket could not be bound, usually because another process already
    /// owns the port.
    BindError,
    /// Unknown tracking protocol identifier.
    ProtocolError,
    /// A packet was the wrong length or failed its checksum. Always recovered locally,
    /// never propagated past the capture thread that decoded it.
    DecodeError,
    /// The catalog reported a constraint violation or I/O failure.
    CatalogError,
    /// A USD stage could not be created, written, or saved.
    ArchiveError,
    /// An operation conflicts with state already in progress.
    Conflict,
    /// A lookup found nothing.
    NotFound,
    /// A caller-supplied argument was invalid on its face.
    InvalidArgument,
    /// Something that can't happen happened.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::ConfigError => "configuration error",
            ErrorKind::BindError => "bind error",
            ErrorKind::ProtocolError => "protocol error",
            ErrorKind::DecodeError => "decode error",
            ErrorKind::CatalogError => "catalog error",
            ErrorKind::ArchiveError => "archive error",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not found",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Internal => "internal error",
        })
    }
}

/// Builds an [`Error`] of the given kind, optionally with `msg(...)` and/or `source(...)`.
///
/// ```ignore
/// err!(NotFound, msg("no such take {slate}/{take_number}"))
/// err!(Internal, source(e))
/// err!(ArchiveError, msg("failed to save stage {path}"), source(e))
/// ```
#[macro_export]
macro_rules! err {
    ($kind:ident, msg($($args:tt)*)) => {
        $crate::Error::new($crate::ErrorKind::$kind).with_msg(format!($($args)*))
    };
    ($kind:ident, source($src:expr)) => {
        $crate::Error::new($crate::ErrorKind::$kind).with_source($src)
    };
    ($kind:ident, msg($($args:tt)*), source($src:expr)) => {
        $crate::Error::new($crate::ErrorKind::$kind)
            .with_msg(format!($($args)*))
            .with_source($src)
    };
    ($kind:ident) => {
        $crate::Error::new($crate::ErrorKind::$kind)
    };
}

/// Like [`err!`], but returns it from the current function.
#[macro_export]
macro_rules! bail {
    ($($args:tt)*) => {
        return Err($crate::err!($($args)*))
    };
}

/// Extension methods for `Result`, for tagging a foreign error with a kind at the call site.
pub trait ResultExt<T, E> {
    fn err_kind(self, k: ErrorKind) -> Result<T, Error>;
}

impl<T, E> ResultExt<T, E> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn err_kind(self, k: ErrorKind) -> Result<T, Error> {
        self.map_err(|e| Error::new(k).with_source(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_msg() {
        let e = err!(NotFound, msg("no such take {}/{}", "SlateA", 1));
        assert_eq!(e.kind(), ErrorKind::NotFound);
        assert_eq!(e.to_string(), "not found: no such take SlateA/1");
    }

    #[test]
    fn prettify_includes_source_chain() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let e = err!(ArchiveError, msg("saving stage"), source(inner));
        assert!(prettify_error(&e).contains("disk full"));
    }

    #[test]
    fn bail_returns_early() {
        fn f() -> Result<(), Error> {
            bail!(InvalidArgument, msg("bad frame rate {}", -1));
        }
        let e = f().unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidArgument);
    }
}
