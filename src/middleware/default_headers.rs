use http::HeaderMap;

use crate::service::{Service, ServiceRequest};

/// middleware applying session default headers to outgoing requests.
/// a default only lands when the caller did not set the header itself.
pub struct DefaultHeaders<S> {
    service: S,
    headers: HeaderMap,
}

impl<S> DefaultHeaders<S> {
    pub fn new(service: S, headers: HeaderMap) -> Self {
        Self { service, headers }
    }
}

impl<'r, 'c, S, Res, Err> Service<ServiceRequest<'r, 'c>> for DefaultHeaders<S>
where
    S: for<'r2, 'c2> Service<ServiceRequest<'r2, 'c2>, Response = Res, Error = Err> + Send + Sync,
{
    type Response = Res;
    type Error = Err;

    async fn call(&self, req: ServiceRequest<'r, 'c>) -> Result<Self::Response, Self::Error> {
        for (name, value) in &self.headers {
            req.req.headers_mut().entry(name).or_insert_with(|| value.clone());
        }

        self.service.call(req).await
    }
}
