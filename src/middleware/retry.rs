use tracing::debug;

use crate::{
    error::Error,
    response::Response,
    service::{Service, ServiceRequest},
};

/// middleware retrying transport level failures with a fresh pool lease.
///
/// A reused idle connection closed by the remote peer between idle check and
/// write is an expected race, not a hard error. Protocol and timeout failures
/// are never retried. Requests with a consumed streaming body can not be
/// replayed and surface the error instead.
pub struct RetryConnection<S> {
    service: S,
    max: usize,
}

impl<S> RetryConnection<S> {
    /// construct retry middleware for a session.
    ///
    /// # Examples:
    /// ```rust
    /// # use mooring::{SessionBuilder, middleware::RetryConnection};
    /// let builder = SessionBuilder::new()
    ///     .middleware(RetryConnection::new);
    /// ```
    pub const fn new(service: S) -> Self {
        Self { service, max: 3 }
    }

    /// set max retry count for request. when the bound is reached the request
    /// returns the most recent error.
    ///
    /// Default to 3 retries.
    pub fn max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }
}

impl<'r, 'c, S> Service<ServiceRequest<'r, 'c>> for RetryConnection<S>
where
    S: for<'r2, 'c2> Service<ServiceRequest<'r2, 'c2>, Response = Response, Error = Error> + Send + Sync,
{
    type Response = Response;
    type Error = Error;

    async fn call(&self, req: ServiceRequest<'r, 'c>) -> Result<Self::Response, Self::Error> {
        let ServiceRequest {
            req,
            session,
            request_timeout,
            response_timeout,
        } = req;

        let mut count = 0;

        loop {
            let replay = req.body().try_clone();

            let res = self
                .service
                .call(ServiceRequest {
                    req: &mut *req,
                    session,
                    request_timeout,
                    response_timeout,
                })
                .await;

            match res {
                Err(Error::Connection(e)) if count < self.max => match replay {
                    Some(body) => {
                        debug!("retrying request after connection error: {e}");
                        *req.body_mut() = body;
                        count += 1;
                    }
                    None => return Err(Error::Connection(e)),
                },
                res => return res,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use http::{Request, StatusCode};

    use crate::{
        body::{RequestBody, ResponseBody},
        service::{Service, mock_service},
    };

    use super::*;

    fn flaky_handler(
        attempts: Arc<AtomicUsize>,
        failures: usize,
    ) -> impl Fn(Request<RequestBody>) -> Result<http::Response<ResponseBody>, Error> + Send + Sync + 'static {
        move |_| {
            if attempts.fetch_add(1, Ordering::Relaxed) < failures {
                return Err(Error::Connection(io::Error::from(io::ErrorKind::ConnectionReset)));
            }
            Ok(http::Response::builder()
                .status(StatusCode::OK)
                .body(ResponseBody::Eof)
                .unwrap())
        }
    }

    #[tokio::test]
    async fn retries_connection_errors() {
        let (handle, service) = mock_service();
        let retry = RetryConnection::new(service);

        let attempts = Arc::new(AtomicUsize::new(0));

        let mut req = Request::builder()
            .uri("http://foo.bar/")
            .body(RequestBody::from("payload"))
            .unwrap();

        let req = handle.mock(&mut req, flaky_handler(attempts.clone(), 2));
        let res = retry.call(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn budget_exhausted_surfaces_error() {
        let (handle, service) = mock_service();
        let retry = RetryConnection::new(service).max(1);

        let attempts = Arc::new(AtomicUsize::new(0));

        let mut req = Request::builder()
            .uri("http://foo.bar/")
            .body(RequestBody::None)
            .unwrap();

        let req = handle.mock(&mut req, flaky_handler(attempts.clone(), usize::MAX));
        let res = retry.call(req).await;

        assert!(matches!(res, Err(Error::Connection(_))));
        assert_eq!(attempts.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn protocol_errors_not_retried() {
        let (handle, service) = mock_service();
        let retry = RetryConnection::new(service);

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let handler = move |_: Request<RequestBody>| {
            counter.fetch_add(1, Ordering::Relaxed);
            Err(Error::Proto(crate::h1::proto::error::ProtoError::Parse(
                crate::h1::proto::error::Parse::StatusCode,
            )))
        };

        let mut req = Request::builder()
            .uri("http://foo.bar/")
            .body(RequestBody::None)
            .unwrap();

        let req = handle.mock(&mut req, handler);
        assert!(matches!(retry.call(req).await, Err(Error::Proto(_))));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn consumed_stream_body_not_retried() {
        let (handle, service) = mock_service();
        let retry = RetryConnection::new(service);

        let attempts = Arc::new(AtomicUsize::new(0));

        let body = futures::stream::iter([Ok::<_, crate::body::BodyError>(bytes::Bytes::from_static(b"x"))]);

        let mut req = Request::builder()
            .uri("http://foo.bar/")
            .body(RequestBody::stream(body))
            .unwrap();

        let req = handle.mock(&mut req, flaky_handler(attempts.clone(), usize::MAX));
        assert!(matches!(retry.call(req).await, Err(Error::Connection(_))));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }
}
