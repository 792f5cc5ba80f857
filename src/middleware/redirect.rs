use http::{
    Method, StatusCode, Uri,
    header::{
        AUTHORIZATION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION, PROXY_AUTHORIZATION,
        TRANSFER_ENCODING,
    },
};

use crate::{
    body::RequestBody,
    error::{Error, InvalidUri},
    response::Response,
    service::{Service, ServiceRequest},
};

/// middleware for following redirect responses.
pub struct FollowRedirect<S> {
    service: S,
    max: usize,
}

impl<S> FollowRedirect<S> {
    /// construct redirect following middleware for a session.
    ///
    /// # Examples:
    /// ```rust
    /// # use mooring::{SessionBuilder, middleware::FollowRedirect};
    /// let builder = SessionBuilder::new()
    ///     .middleware(FollowRedirect::new);
    /// ```
    pub const fn new(service: S) -> Self {
        Self { service, max: 10 }
    }

    /// set max depth of redirect following for request. when the bound is
    /// exceeded the request fails with [Error::TooManyRedirects] carrying the
    /// last response received.
    ///
    /// Default to 10 hops.
    pub fn max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }
}

// what a redirect status asks of the next hop.
enum Action {
    // not a followable redirect. hand the response to the caller.
    Stop,
    // follow, switching to GET and dropping the body when downgrade is set.
    Follow { downgrade: bool },
}

fn resolve(method: &Method, status: StatusCode) -> Action {
    match status {
        // 303 always turns the follow-up into a bodiless GET.
        StatusCode::SEE_OTHER => Action::Follow { downgrade: true },
        // 301/302 preserve GET and HEAD and downgrade everything else.
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => Action::Follow {
            downgrade: !matches!(*method, Method::GET | Method::HEAD),
        },
        // 307/308 preserve method and body verbatim.
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => Action::Follow { downgrade: false },
        _ => Action::Stop,
    }
}

impl<'r, 'c, S> Service<ServiceRequest<'r, 'c>> for FollowRedirect<S>
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
            // keep a replay copy before the exchange consumes the body.
            let replay = req.body().try_clone();

            let mut res = self
                .service
                .call(ServiceRequest {
                    req: &mut *req,
                    session,
                    request_timeout,
                    response_timeout,
                })
                .await?;

            let downgrade = match resolve(req.method(), res.status()) {
                Action::Stop => return Ok(res),
                Action::Follow { downgrade } => downgrade,
            };

            let Some(location) = res.headers_mut().remove(LOCATION) else {
                return Ok(res);
            };

            // a hop preserving the request verbatim needs a replayable body.
            // a consumed streaming body can not be sent again, so the redirect
            // response goes to the caller instead.
            let next_body = if downgrade {
                RequestBody::None
            } else {
                match replay {
                    Some(body) => body,
                    None => return Ok(res),
                }
            };

            if count == self.max {
                return Err(Error::TooManyRedirects(Box::new(res)));
            }
            count += 1;

            let parts = core::mem::take(req.uri_mut()).into_parts();

            let parts_location = location
                .to_str()
                .map_err(|_| InvalidUri::MissingPathQuery)?
                .parse::<Uri>()?
                .into_parts();

            // a hop changing scheme or authority leaves the origin trust
            // boundary. authenticated headers must not travel along.
            let cross_origin = (parts_location.scheme.is_some() && parts_location.scheme != parts.scheme)
                || (parts_location.authority.is_some() && parts_location.authority != parts.authority);

            if cross_origin {
                for header in &[AUTHORIZATION, PROXY_AUTHORIZATION, COOKIE] {
                    req.headers_mut().remove(header);
                }
            }

            // the host header of the previous hop must not leak onto the next
            // target. the exchange re-derives it from the new uri.
            req.headers_mut().remove(HOST);

            if downgrade {
                if *req.method() != Method::GET {
                    *req.method_mut() = Method::GET;
                }

                for header in &[TRANSFER_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, CONTENT_LENGTH] {
                    req.headers_mut().remove(header);
                }
            }

            *req.body_mut() = next_body;

            let mut uri_builder = Uri::builder();

            if let Some(a) = parts_location.authority.or(parts.authority) {
                uri_builder = uri_builder.authority(a);
            }

            if let Some(s) = parts_location.scheme.or(parts.scheme) {
                uri_builder = uri_builder.scheme(s);
            }

            let path = parts_location.path_and_query.ok_or(InvalidUri::MissingPathQuery)?;
            *req.uri_mut() = uri_builder
                .path_and_query(path)
                .build()
                .map_err(|e| Error::Std(Box::new(e)))?;
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use http::Request;

    use crate::{
        body::ResponseBody,
        service::{Service, mock_service},
    };

    use super::*;

    fn redirect_response(status: StatusCode, location: &str) -> Result<http::Response<ResponseBody>, Error> {
        Ok(http::Response::builder()
            .status(status)
            .header("location", location)
            .body(ResponseBody::Eof)
            .unwrap())
    }

    fn ok_response() -> Result<http::Response<ResponseBody>, Error> {
        Ok(http::Response::builder()
            .status(StatusCode::IM_A_TEAPOT)
            .body(ResponseBody::Eof)
            .unwrap())
    }

    #[tokio::test]
    async fn follow_relative_location() {
        let (handle, service) = mock_service();

        let redirect = FollowRedirect::new(service);

        let handler = |req: Request<RequestBody>| match req.uri().path() {
            "/foo" => redirect_response(StatusCode::SEE_OTHER, "/bar"),
            "/bar" => {
                assert_eq!(req.uri().host(), Some("foo.bar"));
                ok_response()
            }
            p => panic!("unexpected uri path: {p}"),
        };

        let mut req = Request::builder()
            .uri("http://foo.bar/foo")
            .body(RequestBody::None)
            .unwrap();

        let req = handle.mock(&mut req, handler);
        let res = redirect.call(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn see_other_downgrades_to_bodiless_get() {
        let (handle, service) = mock_service();

        let redirect = FollowRedirect::new(service);

        let handler = |req: Request<RequestBody>| match req.uri().path() {
            "/submit" => {
                assert_eq!(*req.method(), Method::POST);
                redirect_response(StatusCode::SEE_OTHER, "/done")
            }
            "/done" => {
                assert_eq!(*req.method(), Method::GET);
                assert!(matches!(req.body(), RequestBody::None));
                assert!(!req.headers().contains_key(CONTENT_LENGTH));
                assert!(!req.headers().contains_key(CONTENT_TYPE));
                ok_response()
            }
            p => panic!("unexpected uri path: {p}"),
        };

        let mut req = Request::builder()
            .method(Method::POST)
            .uri("http://foo.bar/submit")
            .header(CONTENT_TYPE, "text/plain")
            .header(CONTENT_LENGTH, "4")
            .body(RequestBody::from("data"))
            .unwrap();

        let req = handle.mock(&mut req, handler);
        let res = redirect.call(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn found_preserves_get_and_head() {
        let (handle, service) = mock_service();

        let redirect = FollowRedirect::new(service);

        let handler = |req: Request<RequestBody>| match req.uri().path() {
            "/a" => redirect_response(StatusCode::FOUND, "/b"),
            "/b" => {
                assert_eq!(*req.method(), Method::HEAD);
                ok_response()
            }
            p => panic!("unexpected uri path: {p}"),
        };

        let mut req = Request::builder()
            .method(Method::HEAD)
            .uri("http://foo.bar/a")
            .body(RequestBody::None)
            .unwrap();

        let req = handle.mock(&mut req, handler);
        redirect.call(req).await.unwrap();
    }

    #[tokio::test]
    async fn temporary_redirect_preserves_method_and_body() {
        let (handle, service) = mock_service();

        let redirect = FollowRedirect::new(service);

        let handler = |req: Request<RequestBody>| match req.uri().path() {
            "/a" => redirect_response(StatusCode::TEMPORARY_REDIRECT, "/b"),
            "/b" => {
                assert_eq!(*req.method(), Method::PUT);
                match req.body() {
                    RequestBody::Bytes(bytes) => assert_eq!(bytes.as_ref(), b"payload"),
                    body => panic!("unexpected body: {body:?}"),
                }
                ok_response()
            }
            p => panic!("unexpected uri path: {p}"),
        };

        let mut req = Request::builder()
            .method(Method::PUT)
            .uri("http://foo.bar/a")
            .body(RequestBody::from("payload"))
            .unwrap();

        let req = handle.mock(&mut req, handler);
        redirect.call(req).await.unwrap();
    }

    #[tokio::test]
    async fn bound_exceeded_carries_last_response() {
        let (handle, service) = mock_service();

        let redirect = FollowRedirect::new(service).max(3);

        let hops = Arc::new(AtomicUsize::new(0));
        let counter = hops.clone();

        let handler = move |_: Request<RequestBody>| {
            counter.fetch_add(1, Ordering::Relaxed);
            redirect_response(StatusCode::FOUND, "/loop")
        };

        let mut req = Request::builder()
            .uri("http://foo.bar/loop")
            .body(RequestBody::None)
            .unwrap();

        let req = handle.mock(&mut req, handler);
        match redirect.call(req).await {
            Err(Error::TooManyRedirects(res)) => assert_eq!(res.status(), StatusCode::FOUND),
            res => panic!("expected TooManyRedirects, got: {res:?}"),
        }

        // exactly max hops were followed. the bounced response is hop max + 1.
        assert_eq!(hops.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn cross_origin_drops_authenticated_headers() {
        let (handle, service) = mock_service();

        let redirect = FollowRedirect::new(service);

        let handler = |req: Request<RequestBody>| match req.uri().host().unwrap() {
            "foo.bar" => {
                assert!(req.headers().contains_key(AUTHORIZATION));
                redirect_response(StatusCode::FOUND, "http://else.where/in")
            }
            "else.where" => {
                assert!(!req.headers().contains_key(AUTHORIZATION));
                assert!(!req.headers().contains_key(COOKIE));
                ok_response()
            }
            h => panic!("unexpected host: {h}"),
        };

        let mut req = Request::builder()
            .uri("http://foo.bar/out")
            .header(AUTHORIZATION, "Basic OTk2OjI1MQ==")
            .header(COOKIE, "id=1")
            .body(RequestBody::None)
            .unwrap();

        let req = handle.mock(&mut req, handler);
        redirect.call(req).await.unwrap();
    }
}
