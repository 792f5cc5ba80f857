use core::time::Duration;

use bytes::Bytes;
use futures_core::stream::Stream;
use http::{
    HeaderValue, Method, Version,
    header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName},
};

use crate::{
    body::{BodyError, RequestBody},
    error::Error,
    response::Response,
    service::{Service, ServiceRequest},
    session::Session,
};

/// builder type for [http::Request] with extended functionalities.
pub struct RequestBuilder<'a> {
    req: http::Request<RequestBody>,
    err: Option<Error>,
    session: &'a Session,
    request_timeout: Duration,
    response_timeout: Duration,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new<B>(req: http::Request<B>, session: &'a Session) -> Self
    where
        B: Into<RequestBody>,
    {
        Self {
            req: req.map(Into::into),
            err: None,
            session,
            request_timeout: session.timeout_config.request_timeout,
            response_timeout: session.timeout_config.response_timeout,
        }
    }

    /// Set HTTP method of this request.
    #[inline]
    pub fn method(mut self, method: Method) -> Self {
        *self.req.method_mut() = method;
        self
    }

    /// Set HTTP version of this request.
    ///
    /// By default a request goes out as HTTP/1.1.
    pub fn version(mut self, version: Version) -> Self {
        *self.req.version_mut() = version;
        self
    }

    /// Append a header to this request.
    pub fn header<V>(mut self, name: HeaderName, value: V) -> Self
    where
        HeaderValue: TryFrom<V>,
    {
        match HeaderValue::try_from(value) {
            Ok(value) => {
                self.req.headers_mut().append(name, value);
            }
            Err(_) => self.push_error(Error::Std("invalid header value".into())),
        }
        self
    }

    /// Returns request's headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        self.req.headers()
    }

    /// Returns request's mutable headers.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.req.headers_mut()
    }

    /// Use text(utf-8 encoded) as request body.
    ///
    /// `content-type` header would be set with value: `text/plain; charset=utf-8`.
    pub fn text<B>(mut self, text: B) -> Self
    where
        Bytes: From<B>,
    {
        self.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        self.body(text)
    }

    #[cfg(feature = "json")]
    /// Use json object as request body.
    pub fn json(mut self, body: impl serde::ser::Serialize) -> Self {
        match serde_json::to_vec(&body) {
            Ok(body) => {
                self.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                self.body(body)
            }
            Err(e) => {
                self.push_error(Error::Std(Box::new(e)));
                self
            }
        }
    }

    /// Use pre allocated bytes as request body.
    ///
    /// Input type must implement [From] trait with [Bytes].
    pub fn body<B>(mut self, body: B) -> Self
    where
        Bytes: From<B>,
    {
        let bytes = Bytes::from(body);
        let val = HeaderValue::from(bytes.len());
        self.headers_mut().insert(CONTENT_LENGTH, val);
        *self.req.body_mut() = RequestBody::Bytes(bytes);
        self
    }

    /// Use streaming type as request body. The body is sent with chunked
    /// transfer encoding, is consumed by the first exchange that writes it and
    /// can not be replayed by retries or method preserving redirects.
    pub fn stream<B, E>(mut self, body: B) -> Self
    where
        B: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BodyError>,
    {
        *self.req.body_mut() = RequestBody::stream(body);
        self
    }

    /// Set timeout covering pool lease wait, connection setup and the head
    /// exchange of this request.
    ///
    /// Default to session's [TimeoutConfig::request_timeout].
    ///
    /// [TimeoutConfig::request_timeout]: crate::timeout::TimeoutConfig::request_timeout
    pub fn set_request_timeout(mut self, dur: Duration) -> Self {
        self.request_timeout = dur;
        self
    }

    /// Set timeout for collecting response body.
    ///
    /// Default to session's [TimeoutConfig::response_timeout].
    ///
    /// [TimeoutConfig::response_timeout]: crate::timeout::TimeoutConfig::response_timeout
    pub fn set_response_timeout(mut self, dur: Duration) -> Self {
        self.response_timeout = dur;
        self
    }

    /// Finish request builder and send it to server.
    pub async fn send(self) -> Result<Response, Error> {
        let Self {
            mut req,
            err,
            session,
            request_timeout,
            response_timeout,
        } = self;

        if let Some(e) = err {
            return Err(e);
        }

        session
            .service
            .call(ServiceRequest {
                req: &mut req,
                session,
                request_timeout,
                response_timeout,
            })
            .await
    }

    fn push_error(&mut self, e: Error) {
        // the first construction error wins and surfaces on send.
        if self.err.is_none() {
            self.err = Some(e);
        }
    }
}
