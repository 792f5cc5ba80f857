use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use pin_project_lite::pin_project;
use tokio::time::Sleep;

/// Collection of timeouts a session applies to every request going through it.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutConfig {
    /// deadline spanning pool lease wait, connection setup and the full
    /// request/response-head exchange.
    pub request_timeout: Duration,
    /// deadline for collecting a response body.
    pub response_timeout: Duration,
}

impl TimeoutConfig {
    pub const fn new() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            response_timeout: Duration::from_secs(15),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::new()
    }
}

pin_project! {
    /// future racing an inner future against a caller owned [Sleep] timer.
    /// the timer is borrowed so one deadline can span multiple await points.
    pub(crate) struct TimeoutFuture<'a, F> {
        #[pin]
        fut: F,
        timer: Pin<&'a mut Sleep>,
    }
}

impl<F: Future> Future for TimeoutFuture<'_, F> {
    type Output = Result<F::Output, Elapsed>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if let Poll::Ready(output) = this.fut.poll(cx) {
            return Poll::Ready(Ok(output));
        }

        this.timer.as_mut().poll(cx).map(|_| Err(Elapsed))
    }
}

pub(crate) struct Elapsed;

pub(crate) trait Timeout: Sized {
    fn timeout(self, timer: Pin<&mut Sleep>) -> TimeoutFuture<'_, Self>;
}

impl<F: Future> Timeout for F {
    fn timeout(self, timer: Pin<&mut Sleep>) -> TimeoutFuture<'_, Self> {
        TimeoutFuture { fut: self, timer }
    }
}
