use core::{future::Future, pin::Pin, time::Duration};

use http::Request;

use crate::{
    body::RequestBody,
    connection::ConnectionKey,
    error::{Error, TimeoutError},
    pool::AcquireOutput,
    response::Response,
    session::Session,
    timeout::Timeout,
    uri::Uri,
};

pub(crate) type BoxFuture<'f, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'f>>;

/// trait for composable http services. Used for middleware and the base
/// exchange service.
pub trait Service<Req> {
    type Response;
    type Error;

    fn call(&self, req: Req) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send;
}

mod _seal {
    #[doc(hidden)]
    /// dynamic compatible counterpart for [`Service`](crate::service::Service) trait.
    pub trait ServiceDyn<Req> {
        type Response;
        type Error;

        fn call<'s>(&'s self, req: Req) -> super::BoxFuture<'s, Self::Response, Self::Error>
        where
            Req: 's;
    }
}

pub(crate) use _seal::ServiceDyn;

impl<S, Req> ServiceDyn<Req> for S
where
    S: Service<Req>,
{
    type Response = S::Response;
    type Error = S::Error;

    #[inline]
    fn call<'s>(&'s self, req: Req) -> BoxFuture<'s, Self::Response, Self::Error>
    where
        Req: 's,
    {
        Box::pin(Service::call(self, req))
    }
}

impl<I, Req> Service<Req> for Box<I>
where
    Req: Send,
    I: ServiceDyn<Req> + ?Sized + Send + Sync,
{
    type Response = I::Response;
    type Error = I::Error;

    #[inline]
    async fn call(&self, req: Req) -> Result<Self::Response, Self::Error> {
        ServiceDyn::call(&**self, req).await
    }
}

/// type alias for object safe wrapper of type implement [Service] trait.
pub type HttpService =
    Box<dyn for<'r, 'c> ServiceDyn<ServiceRequest<'r, 'c>, Response = Response, Error = Error> + Send + Sync>;

/// request type for middlewares.
/// It's similar to [RequestBuilder] type but with additional side effect enabled.
///
/// [RequestBuilder]: crate::request::RequestBuilder
pub struct ServiceRequest<'r, 'c> {
    pub req: &'r mut Request<RequestBody>,
    pub session: &'c Session,
    pub request_timeout: Duration,
    pub response_timeout: Duration,
}

pub(crate) fn base_service() -> HttpService {
    struct HttpService;

    impl<'r, 'c> Service<ServiceRequest<'r, 'c>> for HttpService {
        type Response = Response;
        type Error = Error;

        async fn call(&self, req: ServiceRequest<'r, 'c>) -> Result<Self::Response, Self::Error> {
            let ServiceRequest {
                req,
                session,
                request_timeout,
                response_timeout,
            } = req;

            let key = {
                let uri = Uri::try_parse(req.uri())?;
                ConnectionKey::from(&uri)
            };

            // one deadline spans pool lease wait, connection setup and the
            // head exchange.
            let mut timer = Box::pin(tokio::time::sleep(request_timeout));

            let mut conn = match session
                .pool
                .acquire(key.clone())
                .timeout(timer.as_mut())
                .await
                .map_err(|_| TimeoutError::Lease)?
            {
                AcquireOutput::Conn(conn) => conn,
                AcquireOutput::Spawner(spawner) => {
                    // a failed connect drops the spawner and with it the
                    // reserved pool slot.
                    let conn = session.make_connection(&key, &mut timer).await?;
                    spawner.into_conn(conn)
                }
            };

            match crate::h1::proto::send(&mut *conn, req).timeout(timer.as_mut()).await {
                Ok(Ok((res, buf, decoder, is_close))) => {
                    // a bodyless exchange is immediately clean for reuse. a
                    // response with a body re-pools through the body stream
                    // once fully drained.
                    if decoder.is_eof() && !is_close {
                        conn.set_reuse_on_drop();
                    }

                    let body = crate::h1::body::ResponseBody::new(conn, buf, decoder, !is_close);
                    let res = res.map(|_| crate::body::ResponseBody::H1(body));

                    Ok(Response::new(res, timer, response_timeout))
                }
                // the lease guard drops on both error paths and discards the
                // connection, its read/write state being indeterminate.
                Ok(Err(e)) => Err(e),
                Err(_) => Err(TimeoutError::Request.into()),
            }
        }
    }

    Box::new(HttpService)
}

#[cfg(test)]
pub(crate) use test::mock_service;
