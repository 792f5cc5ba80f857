//! strongly typed library error.

use std::{convert::Infallible, error, fmt, io, str};

use http::uri;

pub use crate::h1::proto::error::{Parse, ProtoError};

use crate::{body::BodyError, response::Response};

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// transport level open/read/write failure. the connection involved is
    /// always discarded before this error surfaces. retryable by session.
    Connection(io::Error),
    /// malformed response framing. never retried.
    Proto(ProtoError),
    /// lease wait or exchange exceeded its deadline. never retried.
    Timeout(TimeoutError),
    /// redirect chain exceeded the session bound. carries the last response
    /// received so the caller can still observe it.
    TooManyRedirects(Box<Response>),
    InvalidUri(InvalidUri),
    Body(BodyError),
    Resolve(ResolveError),
    Std(Box<dyn error::Error + Send + Sync>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "connection error: {e}"),
            Self::Proto(e) => write!(f, "protocol error: {e:?}"),
            Self::Timeout(e) => fmt::Display::fmt(e, f),
            Self::TooManyRedirects(res) => {
                write!(f, "too many redirects. last response status: {}", res.status())
            }
            Self::InvalidUri(e) => write!(f, "invalid uri: {e:?}"),
            Self::Body(e) => write!(f, "body error: {e}"),
            Self::Resolve(e) => fmt::Display::fmt(e, f),
            Self::Std(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Connection(e)
    }
}

impl From<ProtoError> for Error {
    fn from(e: ProtoError) -> Self {
        Self::Proto(e)
    }
}

impl From<Box<dyn error::Error + Send + Sync>> for Error {
    fn from(e: Box<dyn error::Error + Send + Sync>) -> Self {
        Self::Std(e)
    }
}

impl From<str::Utf8Error> for Error {
    fn from(e: str::Utf8Error) -> Self {
        Self::Std(Box::new(e))
    }
}

impl From<Infallible> for Error {
    fn from(e: Infallible) -> Self {
        match e {}
    }
}

#[derive(Debug)]
pub enum InvalidUri {
    MissingHost,
    MissingScheme,
    MissingPathQuery,
    UnknownScheme,
    Other(uri::InvalidUri),
}

impl From<uri::InvalidUri> for InvalidUri {
    fn from(uri: uri::InvalidUri) -> Self {
        Self::Other(uri)
    }
}

impl From<uri::InvalidUri> for Error {
    fn from(e: uri::InvalidUri) -> Self {
        Self::InvalidUri(e.into())
    }
}

impl From<InvalidUri> for Error {
    fn from(e: InvalidUri) -> Self {
        Self::InvalidUri(e)
    }
}

#[derive(Debug)]
pub enum TimeoutError {
    Resolve,
    Connect,
    Lease,
    Request,
    Response,
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => f.write_str("dns look up timeout"),
            Self::Connect => f.write_str("socket connect timeout"),
            Self::Lease => f.write_str("connection pool lease timeout"),
            Self::Request => f.write_str("request sending timeout"),
            Self::Response => f.write_str("response receiving timeout"),
        }
    }
}

impl error::Error for TimeoutError {}

impl From<TimeoutError> for Error {
    fn from(e: TimeoutError) -> Self {
        Self::Timeout(e)
    }
}

#[derive(Debug)]
pub struct ResolveError {
    domain: String,
}

impl ResolveError {
    pub(crate) fn new(domain: impl Into<String>) -> Self {
        Self { domain: domain.into() }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "domain: {} can't be resolved to socket address", self.domain)
    }
}

impl error::Error for ResolveError {}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        Self::Resolve(e)
    }
}
