use core::{
    fmt, mem,
    pin::Pin,
    task::{Context, Poll},
};

use std::error;

use bytes::Bytes;
use futures_core::stream::Stream;
use pin_project_lite::pin_project;

/// Default request/response body error.
pub type BodyError = Box<dyn error::Error + Send + Sync>;

/// type erased streaming body. single pass and non restartable.
pub type BoxBody = Pin<Box<dyn Stream<Item = Result<Bytes, BodyError>> + Send>>;

/// Request body branched by how its size is known up front.
///
/// `None` and `Bytes` bodies can be replayed across retries and redirect hops.
/// A `Stream` body is consumed by the first exchange that sends it.
#[derive(Default)]
pub enum RequestBody {
    #[default]
    None,
    Bytes(Bytes),
    Stream(BoxBody),
}

impl RequestBody {
    /// Construct a streaming body from any byte chunk stream.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BodyError>,
    {
        Self::Stream(Box::pin(MapErr { stream }))
    }

    /// A copy of this body for replay. `Stream` bodies can not be replayed.
    pub(crate) fn try_clone(&self) -> Option<Self> {
        match self {
            Self::None => Some(Self::None),
            Self::Bytes(bytes) => Some(Self::Bytes(bytes.clone())),
            Self::Stream(_) => None,
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("RequestBody::None"),
            Self::Bytes(bytes) => write!(f, "RequestBody::Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("RequestBody::Stream(..)"),
        }
    }
}

impl Stream for RequestBody {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this {
            Self::None => Poll::Ready(None),
            Self::Bytes(bytes) => {
                let bytes = mem::take(bytes);
                *this = Self::None;
                Poll::Ready(Some(Ok(bytes)))
            }
            Self::Stream(stream) => stream.as_mut().poll_next(cx),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static str> for RequestBody {
    fn from(str: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(str.as_bytes()))
    }
}

impl From<String> for RequestBody {
    fn from(str: String) -> Self {
        Self::Bytes(Bytes::from(str))
    }
}

impl From<()> for RequestBody {
    fn from(_: ()) -> Self {
        Self::None
    }
}

pin_project! {
    struct MapErr<S> {
        #[pin]
        stream: S,
    }
}

impl<S, E> Stream for MapErr<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BodyError>,
{
    type Item = Result<Bytes, BodyError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project()
            .stream
            .poll_next(cx)
            .map(|next| next.map(|res| res.map_err(Into::into)))
    }

    // a stream's own size hint counts items, not bytes. report unknown size
    // so streamed bodies are always framed chunked.
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, None)
    }
}

/// Body size classification driving `Content-Length`/`Transfer-Encoding`
/// decisions of the request encoder.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum BodySize {
    /// Absence of body can be assumed. Will skip writing framing header.
    None,
    /// Known size body. Will write `Content-Length: N` header.
    Sized(usize),
    /// Unknown size body. Will write `Transfer-Encoding: chunked` header.
    Stream,
}

impl From<&RequestBody> for BodySize {
    fn from(body: &RequestBody) -> Self {
        match body {
            RequestBody::None => Self::None,
            RequestBody::Bytes(bytes) => Self::Sized(bytes.len()),
            RequestBody::Stream(stream) => match stream.size_hint() {
                (_, Some(size)) => Self::Sized(size),
                (_, None) => Self::Stream,
            },
        }
    }
}

/// Response body branched by how the exchange produced it.
pub enum ResponseBody {
    H1(crate::h1::body::ResponseBody),
    Eof,
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::H1(_) => f.write_str("ResponseBody::H1(..)"),
            Self::Eof => f.write_str("ResponseBody::Eof"),
        }
    }
}

impl Stream for ResponseBody {
    type Item = Result<Bytes, BodyError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut() {
            Self::H1(body) => Pin::new(body).poll_next(_cx),
            Self::Eof => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod test {
    use futures_core::stream::Stream;

    use super::*;

    #[test]
    fn body_size_classify() {
        assert_eq!(BodySize::from(&RequestBody::None), BodySize::None);
        assert_eq!(BodySize::from(&RequestBody::from("996")), BodySize::Sized(3));

        struct Unsized;

        impl Stream for Unsized {
            type Item = Result<Bytes, BodyError>;

            fn poll_next(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Option<Self::Item>> {
                Poll::Ready(None)
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                (0, None)
            }
        }

        assert_eq!(BodySize::from(&RequestBody::stream(Unsized)), BodySize::Stream);
    }

    #[test]
    fn replay() {
        assert!(RequestBody::None.try_clone().is_some());
        assert!(RequestBody::from("251").try_clone().is_some());

        let stream = futures::stream::iter([Ok::<_, BodyError>(Bytes::new())]);
        assert!(RequestBody::stream(stream).try_clone().is_none());
    }
}
