use core::time::Duration;

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use http::{
    HeaderValue,
    header::{HeaderMap, HeaderName, USER_AGENT},
};

use crate::{
    connector::{Connector, TlsConnect},
    cookies::CookieStore,
    error::Error,
    middleware::{Cookies, DefaultHeaders, FollowRedirect, RetryConnection},
    pool::Pool,
    resolver::{Resolve, Resolver},
    response::Response,
    service::{HttpService, Service, ServiceRequest, base_service},
    session::Session,
    timeout::TimeoutConfig,
};

/// Builder type for [Session]. Offer configurations before a session instance is created.
pub struct SessionBuilder {
    connector: Connector,
    resolver: Resolver,
    pool_capacity: usize,
    keep_alive_idle: Duration,
    keep_alive_born: Duration,
    max_requests_per_connection: usize,
    timeout_config: TimeoutConfig,
    local_addr: Option<SocketAddr>,
    max_redirects: usize,
    max_retries: usize,
    default_headers: HeaderMap,
    service: HttpService,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("mooring/", env!("CARGO_PKG_VERSION"))),
        );

        SessionBuilder {
            connector: Connector::default(),
            resolver: Resolver::default(),
            pool_capacity: 128,
            keep_alive_idle: Duration::from_secs(60),
            keep_alive_born: Duration::from_secs(3600),
            max_requests_per_connection: 1024,
            timeout_config: TimeoutConfig::new(),
            local_addr: None,
            max_redirects: 10,
            max_retries: 3,
            default_headers,
            service: base_service(),
        }
    }

    /// add middleware service to session builder.
    /// middleware is a type impl [Service] trait that takes ownership of
    /// [HttpService], pre-processing [ServiceRequest] and post-processing the
    /// output of [HttpService] as `Result<Response, Error>`.
    ///
    /// middlewares added here run inside the session's own retry, cookie and
    /// redirect handling, once per hop.
    ///
    /// # Examples
    /// ```rust
    /// use mooring::{
    ///     error::Error,
    ///     HttpService, Response, Service, ServiceRequest, SessionBuilder,
    /// };
    ///
    /// // a typed middleware that wraps the http service mooring provides.
    /// struct MyMiddleware {
    ///     http_service: HttpService,
    /// }
    ///
    /// impl<'r, 'c> Service<ServiceRequest<'r, 'c>> for MyMiddleware {
    ///     type Response = Response;
    ///     type Error = Error;
    ///
    ///     async fn call(&self, req: ServiceRequest<'r, 'c>) -> Result<Self::Response, Self::Error> {
    ///         // pre-process the request before passing it on.
    ///         println!("request method is: {}", req.req.method());
    ///
    ///         match self.http_service.call(req).await {
    ///             Ok(res) => {
    ///                 // post-process the response received from server.
    ///                 println!("response status is: {}", res.status());
    ///                 Ok(res)
    ///             }
    ///             Err(e) => {
    ///                 println!("observed error: {}", e);
    ///                 Err(e)
    ///             }
    ///         }
    ///     }
    /// }
    ///
    /// // apply the middleware to a session builder:
    /// let builder = SessionBuilder::new()
    ///     .middleware(|http_service| MyMiddleware { http_service });
    /// ```
    pub fn middleware<F, S>(mut self, func: F) -> Self
    where
        F: FnOnce(HttpService) -> S,
        S: for<'r, 'c> Service<ServiceRequest<'r, 'c>, Response = Response, Error = Error> + Send + Sync + 'static,
    {
        self.service = Box::new(func(self.service));
        self
    }

    /// Use custom DNS resolver for domain look up.
    ///
    /// See [Resolve] for detail.
    pub fn resolver<R>(mut self, resolver: R) -> Self
    where
        R: Resolve + 'static,
    {
        self.resolver = Resolver::custom(resolver);
        self
    }

    /// Use custom tls connector for https destinations.
    ///
    /// See [TlsConnect] for detail.
    pub fn tls_connector<T>(mut self, connector: T) -> Self
    where
        T: TlsConnect + 'static,
    {
        self.connector = Connector::custom(connector);
        self
    }

    /// Set default request header applied when the caller did not set the
    /// header itself.
    pub fn default_header<V>(mut self, name: HeaderName, value: V) -> Self
    where
        HeaderValue: TryFrom<V>,
    {
        if let Ok(value) = HeaderValue::try_from(value) {
            self.default_headers.insert(name, value);
        }
        self
    }

    /// Set timeout spanning pool lease wait, connection setup and the head
    /// exchange of a request.
    ///
    /// Default to 15 seconds.
    pub fn set_request_timeout(mut self, dur: Duration) -> Self {
        self.timeout_config.request_timeout = dur;
        self
    }

    /// Set timeout for collecting response body.
    ///
    /// Default to 15 seconds.
    pub fn set_response_timeout(mut self, dur: Duration) -> Self {
        self.timeout_config.response_timeout = dur;
        self
    }

    /// Set [TimeoutConfig] for session.
    pub fn set_timeout(mut self, timeout_config: TimeoutConfig) -> Self {
        self.timeout_config = timeout_config;
        self
    }

    /// Set local Socket address, either IPv4 or IPv6 used for the session.
    ///
    /// By default the session uses any free address the OS returns.
    pub fn set_local_addr(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.local_addr = Some(addr.into());
        self
    }

    /// Set capacity of the connection pool for re-useable connections per
    /// destination. Callers beyond the capacity suspend until a connection is
    /// released or discarded.
    ///
    /// Default to 128.
    ///
    /// # Panics:
    /// When pass 0 as pool capacity.
    pub fn set_pool_capacity(mut self, cap: usize) -> Self {
        assert_ne!(cap, 0);
        self.pool_capacity = cap;
        self
    }

    /// Set the duration an idle pooled connection stays eligible for reuse.
    /// An idle connection past the timeout is discarded on the next lease
    /// rather than handed out.
    ///
    /// Default to 60 seconds.
    pub fn set_keep_alive_idle(mut self, dur: Duration) -> Self {
        self.keep_alive_idle = dur;
        self
    }

    /// Set the total lifetime of a pooled connection counted from creation.
    ///
    /// Default to 1 hour.
    pub fn set_keep_alive_born(mut self, dur: Duration) -> Self {
        self.keep_alive_born = dur;
        self
    }

    /// Set how many exchanges a single connection serves before it is
    /// retired.
    ///
    /// Default to 1024.
    pub fn set_max_requests_per_connection(mut self, max: usize) -> Self {
        self.max_requests_per_connection = max;
        self
    }

    /// Set max depth of redirect following. Exceeding it fails the request
    /// with [Error::TooManyRedirects] carrying the last response.
    ///
    /// Default to 10.
    pub fn set_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set how often a request is retried on transport level failure.
    ///
    /// Default to 3.
    pub fn set_max_retries(mut self, max: usize) -> Self {
        self.max_retries = max;
        self
    }

    /// Finish the builder and construct [Session] instance.
    pub fn finish(self) -> Session {
        let cookies = Arc::new(Mutex::new(CookieStore::new()));

        // session orchestration as a middleware stack around the base
        // exchange service, innermost first: transport retries run per hop,
        // cookies are computed per hop, redirects drive the hops and default
        // headers apply once.
        let service: HttpService = Box::new(RetryConnection::new(self.service).max(self.max_retries));
        let service: HttpService = Box::new(Cookies::new(service, cookies.clone()));
        let service: HttpService = Box::new(FollowRedirect::new(service).max(self.max_redirects));
        let service: HttpService = Box::new(DefaultHeaders::new(service, self.default_headers));

        Session {
            pool: Pool::new(
                self.pool_capacity,
                self.keep_alive_idle,
                self.keep_alive_born,
                self.max_requests_per_connection,
            ),
            connector: self.connector,
            resolver: self.resolver,
            timeout_config: self.timeout_config,
            local_addr: self.local_addr,
            cookies,
            service,
        }
    }
}
