use std::{
    net::SocketAddr,
    pin::Pin,
    sync::{Arc, Mutex},
};

use http::{Method, uri};
use tokio::{
    net::{TcpSocket, TcpStream},
    time::Sleep,
};

use crate::{
    body::RequestBody,
    builder::SessionBuilder,
    connect::Connect,
    connection::{Connection, ConnectionKey},
    connector::Connector,
    cookies::CookieStore,
    error::{Error, ResolveError, TimeoutError},
    pool::Pool,
    request::RequestBuilder,
    resolver::Resolver,
    service::HttpService,
    timeout::{Timeout, TimeoutConfig},
};

/// user facing aggregate owning a connection pool, a cookie store and the
/// request defaults applied to every request issued through it.
///
/// Concurrent requests through one session operate independently and only
/// contend on pool capacity and the cookie table. Dropping the session closes
/// every pooled connection.
pub struct Session {
    pub(crate) pool: Pool<ConnectionKey, Connection>,
    pub(crate) connector: Connector,
    pub(crate) resolver: Resolver,
    pub(crate) timeout_config: TimeoutConfig,
    pub(crate) local_addr: Option<SocketAddr>,
    pub(crate) cookies: Arc<Mutex<CookieStore>>,
    pub(crate) service: HttpService,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! method {
    ($method: tt, $method2: tt) => {
        #[doc = concat!("Start a new [Method::",stringify!($method2),"] request with empty request body.")]
        pub fn $method<U>(&self, url: U) -> Result<RequestBuilder<'_>, Error>
        where
            uri::Uri: TryFrom<U>,
            Error: From<<uri::Uri as TryFrom<U>>::Error>,
        {
            Ok(self.get(url)?.method(Method::$method2))
        }
    };
}

impl Session {
    /// Construct a new Session with default setting.
    pub fn new() -> Self {
        Self::builder().finish()
    }

    /// Start a new SessionBuilder with customizable configuration.
    ///
    /// See [SessionBuilder] for detail.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Start a new HTTP request with given [http::Request].
    #[inline]
    pub fn request<B>(&self, req: http::Request<B>) -> RequestBuilder<'_>
    where
        B: Into<RequestBody>,
    {
        RequestBuilder::new(req, self)
    }

    /// Start a new [Method::GET] request with empty request body.
    pub fn get<U>(&self, url: U) -> Result<RequestBuilder<'_>, Error>
    where
        uri::Uri: TryFrom<U>,
        Error: From<<uri::Uri as TryFrom<U>>::Error>,
    {
        let uri = uri::Uri::try_from(url)?;

        let mut req = http::Request::new(RequestBody::None);
        *req.uri_mut() = uri;

        Ok(self.request(req))
    }

    method!(post, POST);
    method!(put, PUT);
    method!(patch, PATCH);
    method!(delete, DELETE);
    method!(options, OPTIONS);
    method!(head, HEAD);

    /// Shared handle of the session cookie store, for seeding, inspecting or
    /// exporting cookies. Hold the lock only briefly.
    pub fn cookie_store(&self) -> Arc<Mutex<CookieStore>> {
        self.cookies.clone()
    }
}

impl Session {
    pub(crate) async fn make_connection(
        &self,
        key: &ConnectionKey,
        timer: &mut Pin<Box<Sleep>>,
    ) -> Result<Connection, Error> {
        let mut connect = Connect::new(key);

        self.resolver
            .resolve(&mut connect)
            .timeout(timer.as_mut())
            .await
            .map_err(|_| TimeoutError::Resolve)??;

        let stream = self.make_tcp(&connect, timer).await?;

        if key.tls {
            let io = self
                .connector
                .connect(connect.hostname(), stream)
                .timeout(timer.as_mut())
                .await
                .map_err(|_| TimeoutError::Connect)??;

            Ok(Connection::Tls(io))
        } else {
            Ok(stream.into())
        }
    }

    async fn make_tcp(&self, connect: &Connect, timer: &mut Pin<Box<Sleep>>) -> Result<TcpStream, Error> {
        let stream = self
            .make_tcp_inner(connect)
            .timeout(timer.as_mut())
            .await
            .map_err(|_| TimeoutError::Connect)??;

        let _ = stream.set_nodelay(true);

        Ok(stream)
    }

    async fn make_tcp_inner(&self, connect: &Connect) -> Result<TcpStream, Error> {
        let mut iter = connect.addrs();

        let mut addr = iter
            .next()
            .ok_or_else(|| ResolveError::new(connect.hostname()))?;

        // try to connect with all addresses resolved by dns resolver.
        // return the last error when all fail to be connected.
        loop {
            match self.maybe_connect_with_local_addr(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => match iter.next() {
                    Some(a) => addr = a,
                    None => return Err(e),
                },
            }
        }
    }

    async fn maybe_connect_with_local_addr(&self, addr: SocketAddr) -> Result<TcpStream, Error> {
        match self.local_addr {
            Some(local_addr) => {
                let socket = match local_addr {
                    SocketAddr::V4(_) => {
                        let socket = TcpSocket::new_v4()?;
                        socket.bind(local_addr)?;
                        socket
                    }
                    SocketAddr::V6(_) => {
                        let socket = TcpSocket::new_v6()?;
                        socket.bind(local_addr)?;
                        socket
                    }
                };

                socket.connect(addr).await.map_err(Into::into)
            }
            None => TcpStream::connect(addr).await.map_err(Into::into),
        }
    }
}
