use core::future::Future;

use std::net::{SocketAddr, ToSocketAddrs};

use crate::{connect::Connect, error::Error, service::BoxFuture};

pub(crate) enum Resolver {
    Std,
    Custom(Box<dyn ResolveDyn>),
}

impl Default for Resolver {
    fn default() -> Self {
        Self::Std
    }
}

impl Resolver {
    pub(crate) fn custom(resolver: impl Resolve + 'static) -> Self {
        Self::Custom(Box::new(resolver))
    }

    pub(crate) async fn resolve(&self, connect: &mut Connect) -> Result<(), Error> {
        let addrs = match *self {
            Self::Std => {
                let host = connect.hostname().to_string();
                let port = connect.port();
                tokio::task::spawn_blocking(move || (host, port).to_socket_addrs())
                    .await
                    .expect("resolver blocking task must not panic")?
                    .collect::<Vec<_>>()
            }
            Self::Custom(ref resolve) => resolve.resolve_dyn(connect.hostname(), connect.port()).await?,
        };

        connect.set_addrs(addrs);

        Ok(())
    }
}

/// Trait for custom DNS resolver.
///
/// # Examples
/// ```rust
/// use std::net::SocketAddr;
///
/// use mooring::{error::Error, Resolve, SessionBuilder};
///
/// struct MyResolver;
///
/// impl Resolve for MyResolver {
///     // hostname is stripped of port number(if given).
///     async fn resolve(&self, hostname: &str, port: u16) -> Result<Vec<SocketAddr>, Error> {
///         // Your DNS resolve logic goes here.
///         Ok(vec![])
///     }
/// }
///
/// # fn resolve() {
/// let session = SessionBuilder::new().resolver(MyResolver).finish();
/// # }
/// ```
pub trait Resolve: Send + Sync {
    /// *. hostname does not include port number.
    fn resolve(&self, hostname: &str, port: u16) -> impl Future<Output = Result<Vec<SocketAddr>, Error>> + Send;
}

pub(crate) trait ResolveDyn: Send + Sync {
    fn resolve_dyn<'s, 'h>(&'s self, hostname: &'h str, port: u16) -> BoxFuture<'h, Vec<SocketAddr>, Error>
    where
        's: 'h;
}

impl<R> ResolveDyn for R
where
    R: Resolve,
{
    #[inline]
    fn resolve_dyn<'s, 'h>(&'s self, hostname: &'h str, port: u16) -> BoxFuture<'h, Vec<SocketAddr>, Error>
    where
        's: 'h,
    {
        Box::pin(self.resolve(hostname, port))
    }
}
