use std::sync::{Arc, Mutex};

use http::header::{COOKIE, SET_COOKIE};

use crate::{
    cookies::CookieStore,
    error::Error,
    response::Response,
    service::{Service, ServiceRequest},
};

/// middleware carrying the session cookie store around every exchange.
///
/// Sits inside the redirect loop so every hop gets a cookie lookup against
/// its own target and every hop's `Set-Cookie` headers are recorded.
pub struct Cookies<S> {
    service: S,
    store: Arc<Mutex<CookieStore>>,
}

impl<S> Cookies<S> {
    pub fn new(service: S, store: Arc<Mutex<CookieStore>>) -> Self {
        Self { service, store }
    }
}

impl<'r, 'c, S> Service<ServiceRequest<'r, 'c>> for Cookies<S>
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

        let host = req.uri().host().map(str::to_string);
        let path = req.uri().path().to_string();
        let secure = matches!(req.uri().scheme_str(), Some("https" | "wss"));

        // a caller supplied cookie header wins over the store.
        let inserted = match host {
            Some(ref host) if !req.headers().contains_key(COOKIE) => {
                match self.store.lock().unwrap().cookie_header(host, &path, secure) {
                    Some(value) => {
                        req.headers_mut().insert(COOKIE, value);
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        };

        let res = self
            .service
            .call(ServiceRequest {
                req: &mut *req,
                session,
                request_timeout,
                response_timeout,
            })
            .await;

        // drop the header again so the next redirect hop computes its own
        // cookies against the new target.
        if inserted {
            req.headers_mut().remove(COOKIE);
        }

        let res = res?;

        if let Some(host) = host {
            self.store
                .lock()
                .unwrap()
                .update(res.headers().get_all(SET_COOKIE).iter(), &host, &path);
        }

        Ok(res)
    }
}

#[cfg(test)]
mod test {
    use http::{Request, StatusCode};

    use crate::{
        body::{RequestBody, ResponseBody},
        service::{Service, mock_service},
    };

    use super::*;

    #[tokio::test]
    async fn records_and_replays_cookies() {
        let (handle, service) = mock_service();

        let store = Arc::new(Mutex::new(CookieStore::new()));
        let cookies = Cookies::new(service, store.clone());

        let handler = |req: Request<RequestBody>| match req.uri().path() {
            "/login" => {
                assert!(!req.headers().contains_key(COOKIE));
                Ok(http::Response::builder()
                    .status(StatusCode::OK)
                    .header(SET_COOKIE, "id=996; Path=/")
                    .body(ResponseBody::Eof)
                    .unwrap())
            }
            "/account" => {
                assert_eq!(req.headers().get(COOKIE).unwrap(), "id=996");
                Ok(http::Response::builder()
                    .status(StatusCode::OK)
                    .body(ResponseBody::Eof)
                    .unwrap())
            }
            p => panic!("unexpected uri path: {p}"),
        };

        let mut req = Request::builder()
            .uri("http://foo.bar/login")
            .body(RequestBody::None)
            .unwrap();
        cookies.call(handle.mock(&mut req, handler)).await.unwrap();

        assert_eq!(store.lock().unwrap().len(), 1);

        let mut req = Request::builder()
            .uri("http://foo.bar/account")
            .body(RequestBody::None)
            .unwrap();
        cookies.call(handle.mock(&mut req, handler)).await.unwrap();

        // the injected header is removed after the exchange.
        assert!(!req.headers().contains_key(COOKIE));
    }

    #[tokio::test]
    async fn caller_cookie_header_wins() {
        let (handle, service) = mock_service();

        let store = Arc::new(Mutex::new(CookieStore::new()));
        store
            .lock()
            .unwrap()
            .add(cookie::Cookie::parse("id=stored").unwrap(), "foo.bar", "/");

        let cookies = Cookies::new(service, store);

        let handler = |req: Request<RequestBody>| {
            assert_eq!(req.headers().get(COOKIE).unwrap(), "id=mine");
            Ok(http::Response::builder()
                .status(StatusCode::OK)
                .body(ResponseBody::Eof)
                .unwrap())
        };

        let mut req = Request::builder()
            .uri("http://foo.bar/")
            .header(COOKIE, "id=mine")
            .body(RequestBody::None)
            .unwrap();
        cookies.call(handle.mock(&mut req, handler)).await.unwrap();
    }
}
