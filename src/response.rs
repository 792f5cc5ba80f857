use std::{
    fmt,
    ops::{Deref, DerefMut},
    pin::Pin,
    time::Duration,
};

use bytes::BytesMut;
use futures_core::stream::Stream;
use tokio::time::{Instant, Sleep};
use tracing::debug;

use crate::{
    body::ResponseBody,
    error::{Error, TimeoutError},
    timeout::Timeout,
};

const DEFAULT_PAYLOAD_LIMIT: usize = 1024 * 1024 * 8;

/// response received from a [Session] request.
///
/// [Session]: crate::session::Session
pub struct Response<const PAYLOAD_LIMIT: usize = DEFAULT_PAYLOAD_LIMIT> {
    res: http::Response<ResponseBody>,
    timer: Pin<Box<Sleep>>,
    timeout: Duration,
}

impl<const PAYLOAD_LIMIT: usize> Deref for Response<PAYLOAD_LIMIT> {
    type Target = http::Response<ResponseBody>;

    fn deref(&self) -> &Self::Target {
        &self.res
    }
}

impl<const PAYLOAD_LIMIT: usize> DerefMut for Response<PAYLOAD_LIMIT> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.res
    }
}

impl<const PAYLOAD_LIMIT: usize> fmt::Debug for Response<PAYLOAD_LIMIT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.res)
    }
}

impl<const PAYLOAD_LIMIT: usize> Response<PAYLOAD_LIMIT> {
    pub(crate) fn new(res: http::Response<ResponseBody>, timer: Pin<Box<Sleep>>, timeout: Duration) -> Self {
        Self { res, timer, timeout }
    }

    /// Get a reference of the inner response type.
    pub fn inner(&self) -> &http::Response<ResponseBody> {
        &self.res
    }

    /// Get a mutable reference of the inner response type.
    pub fn inner_mut(&mut self) -> &mut http::Response<ResponseBody> {
        &mut self.res
    }

    /// Set payload size limit in bytes. Payload size beyond limit would be discarded.
    ///
    /// Default to 8 Mb.
    #[inline]
    pub fn limit<const PAYLOAD_LIMIT_2: usize>(self) -> Response<PAYLOAD_LIMIT_2> {
        Response {
            res: self.res,
            timer: self.timer,
            timeout: self.timeout,
        }
    }

    /// Set response body collecting timeout duration. A response body failed to be collect
    /// in time would be canceled.
    ///
    /// Default to 15 seconds.
    #[inline]
    pub fn timeout(self, dur: Duration) -> Response<PAYLOAD_LIMIT> {
        Response {
            res: self.res,
            timer: self.timer,
            timeout: dur,
        }
    }

    /// Collect response body as String. Response is consumed.
    #[inline]
    pub async fn string(self) -> Result<String, Error> {
        self.collect().await
    }

    /// Collect response body as Vec<u8>. Response is consumed.
    #[inline]
    pub async fn body(self) -> Result<Vec<u8>, Error> {
        self.collect().await
    }

    #[cfg(feature = "json")]
    /// Collect response body as json object. Response is consumed.
    ///
    /// The output type must impl [serde::de::DeserializeOwned] trait.
    pub async fn json<T>(self) -> Result<T, Error>
    where
        T: serde::de::DeserializeOwned,
    {
        let bytes = self.collect::<BytesMut>().await?;
        serde_json::from_slice(bytes.as_ref()).map_err(|e| Error::Std(Box::new(e)))
    }

    async fn collect<B>(self) -> Result<B, Error>
    where
        B: Collectable,
    {
        let (res, body) = self.res.into_parts();
        let mut timer = self.timer;

        tokio::pin!(body);

        let limit = res
            .headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok().and_then(|str| str.parse::<usize>().ok()))
            .unwrap_or(PAYLOAD_LIMIT);

        let limit = std::cmp::min(limit, PAYLOAD_LIMIT);

        let mut b = B::with_capacity(1024);

        timer.as_mut().reset(Instant::now() + self.timeout);

        loop {
            let next = core::future::poll_fn(|cx| body.as_mut().poll_next(cx));
            match next.timeout(timer.as_mut()).await {
                Ok(Some(res)) => {
                    // error and truncation paths leave the body undrained. the
                    // dropped lease closes the connection.
                    let buf = match res {
                        Ok(buf) => buf,
                        // a transport failure mid body is a connection error,
                        // same as one during the head exchange.
                        Err(e) => {
                            return Err(match e.downcast::<std::io::Error>() {
                                Ok(e) => Error::Connection(*e),
                                Err(e) => Error::Body(e),
                            });
                        }
                    };

                    b.try_extend_from_slice(&buf)?;

                    if b.len() > limit {
                        debug!("PAYLOAD_LIMIT reached and only part of the response body is collected.");
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => return Err(TimeoutError::Response.into()),
            }
        }

        Ok(b)
    }
}

trait Collectable {
    fn with_capacity(cap: usize) -> Self;

    fn try_extend_from_slice(&mut self, slice: &[u8]) -> Result<(), Error>;

    fn len(&self) -> usize;
}

impl Collectable for BytesMut {
    #[inline]
    fn with_capacity(cap: usize) -> Self {
        Self::with_capacity(cap)
    }

    #[inline]
    fn try_extend_from_slice(&mut self, slice: &[u8]) -> Result<(), Error> {
        self.extend_from_slice(slice);
        Ok(())
    }

    #[inline]
    fn len(&self) -> usize {
        Self::len(self)
    }
}

impl Collectable for Vec<u8> {
    #[inline]
    fn with_capacity(cap: usize) -> Self {
        Self::with_capacity(cap)
    }

    #[inline]
    fn try_extend_from_slice(&mut self, slice: &[u8]) -> Result<(), Error> {
        self.extend_from_slice(slice);
        Ok(())
    }

    #[inline]
    fn len(&self) -> usize {
        Self::len(self)
    }
}

impl Collectable for String {
    #[inline]
    fn with_capacity(cap: usize) -> Self {
        Self::with_capacity(cap)
    }

    fn try_extend_from_slice(&mut self, slice: &[u8]) -> Result<(), Error> {
        let str = std::str::from_utf8(slice)?;
        self.push_str(str);
        Ok(())
    }

    #[inline]
    fn len(&self) -> usize {
        Self::len(self)
    }
}
