//! Middleware which bounds the time until a service produces its response.
//!
//! Supports a custom error type, and no limit at all.

use std::time::Duration;

/// Layer to apply an optional timeout to requests, with a custom error type.
pub struct TimeoutLayer<E> {
    error: fn() -> E,
    timeout: Option<Duration>,
}

impl<E> TimeoutLayer<E> {
    /// Create a new `TimeoutLayer` with the provided error function and timeout.
    ///
    /// A `None` timeout passes requests through untouched.
    pub fn new(error: fn() -> E, timeout: Option<Duration>) -> Self {
        Self { error, timeout }
    }
}

impl<E> Clone for TimeoutLayer<E> {
    fn clone(&self) -> Self {
        Self {
            error: self.error,
            timeout: self.timeout,
        }
    }
}

impl<E> std::fmt::Debug for TimeoutLayer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutLayer")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<S, E> tower::layer::Layer<S> for TimeoutLayer<E> {
    type Service = Timeout<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        Timeout::new(inner, self.timeout, self.error)
    }
}

/// Applies an optional timeout to requests, with a custom error type.
pub struct Timeout<S, E> {
    inner: S,
    timeout: Option<Duration>,
    error: fn() -> E,
}

impl<S, E> Timeout<S, E> {
    /// Create a new `Timeout` with the provided inner service, timeout, and error function.
    pub fn new(inner: S, timeout: Option<Duration>, error: fn() -> E) -> Self {
        Self {
            inner,
            timeout,
            error,
        }
    }
}

impl<S, E> Clone for Timeout<S, E>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            timeout: self.timeout,
            error: self.error,
        }
    }
}

impl<S, E> std::fmt::Debug for Timeout<S, E>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeout")
            .field("inner", &self.inner)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<S, E, Req> tower::Service<Req> for Timeout<S, E>
where
    S: tower::Service<Req, Error = E>,
{
    type Response = S::Response;
    type Error = E;
    type Future = self::future::TimeoutFuture<S::Future, S::Response, E>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        self::future::TimeoutFuture::new(self.inner.call(req), self.error, self.timeout)
    }
}

mod future {

    use std::{future::Future, marker::PhantomData, pin::Pin, task::Poll};

    use pin_project::pin_project;

    #[derive(Debug)]
    #[pin_project]
    pub struct TimeoutFuture<F, R, E> {
        #[pin]
        inner: F,
        error: fn() -> E,
        response: PhantomData<fn() -> R>,
        timeout: Option<Pin<Box<tokio::time::Sleep>>>,
    }

    impl<F, R, E> TimeoutFuture<F, R, E> {
        pub fn new(inner: F, error: fn() -> E, timeout: Option<std::time::Duration>) -> Self {
            Self {
                inner,
                error,
                response: PhantomData,
                timeout: timeout.map(|timeout| Box::pin(tokio::time::sleep(timeout))),
            }
        }
    }

    impl<F, R, E> Future for TimeoutFuture<F, R, E>
    where
        F: Future<Output = Result<R, E>>,
    {
        type Output = Result<R, E>;

        fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
            let this = self.project();

            if let Poll::Ready(response) = this.inner.poll(cx) {
                return Poll::Ready(response);
            }

            match this.timeout.as_mut().map(|sleep| sleep.as_mut().poll(cx)) {
                Some(Poll::Ready(())) => {
                    tracing::trace!("service call timed out");
                    Poll::Ready(Err((this.error)()))
                }
                _ => Poll::Pending,
            }
        }
    }
}
