use core::{fmt, future::Future};

use std::error;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::{error::Error, service::BoxFuture};

/// type erased io type a tls connector produces.
pub trait Io: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

/// Trait for custom tls connector turning a plain tcp stream into an
/// encrypted one. tls handshake details live entirely behind this seam.
///
/// # Examples
/// ```rust
/// use mooring::{error::Error, Io, SessionBuilder, TlsConnect};
/// use tokio::net::TcpStream;
///
/// struct MyConnector;
///
/// impl TlsConnect for MyConnector {
///     // hostname is for server name indication and certificate validation.
///     async fn connect(&self, _hostname: &str, io: TcpStream) -> Result<Box<dyn Io>, Error> {
///         // tls handshake logic goes here.
///         Ok(Box::new(io))
///     }
/// }
///
/// # fn build() {
/// let session = SessionBuilder::new().tls_connector(MyConnector).finish();
/// # }
/// ```
pub trait TlsConnect: Send + Sync {
    fn connect(&self, hostname: &str, io: TcpStream) -> impl Future<Output = Result<Box<dyn Io>, Error>> + Send;
}

pub(crate) enum Connector {
    Nop,
    Custom(Box<dyn TlsConnectDyn>),
}

impl Default for Connector {
    fn default() -> Self {
        Self::Nop
    }
}

impl Connector {
    pub(crate) fn custom(connector: impl TlsConnect + 'static) -> Self {
        Self::Custom(Box::new(connector))
    }

    pub(crate) async fn connect(&self, hostname: &str, io: TcpStream) -> Result<Box<dyn Io>, Error> {
        match *self {
            Self::Nop => Err(TlsNotConfigured.into()),
            Self::Custom(ref connector) => connector.connect_dyn(hostname, io).await,
        }
    }
}

pub(crate) trait TlsConnectDyn: Send + Sync {
    fn connect_dyn<'s, 'h>(&'s self, hostname: &'h str, io: TcpStream) -> BoxFuture<'h, Box<dyn Io>, Error>
    where
        's: 'h;
}

impl<T> TlsConnectDyn for T
where
    T: TlsConnect,
{
    #[inline]
    fn connect_dyn<'s, 'h>(&'s self, hostname: &'h str, io: TcpStream) -> BoxFuture<'h, Box<dyn Io>, Error>
    where
        's: 'h,
    {
        Box::pin(self.connect(hostname, io))
    }
}

/// error for https request attempted on a session with no tls connector set.
#[derive(Debug)]
pub struct TlsNotConfigured;

impl fmt::Display for TlsNotConfigured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("tls connector is not configured for this session")
    }
}

impl error::Error for TlsNotConfigured {}

impl From<TlsNotConfigured> for Error {
    fn from(e: TlsNotConfigured) -> Self {
        Self::Std(Box::new(e))
    }
}
