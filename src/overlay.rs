use std::{
    convert::Infallible,
    future::Future,
    sync::Arc,
    task::{ready, Context, Poll},
};

use bytes::Buf;
use http::{request::Parts, Request, Response};
use http_body::{Body, Frame};
use tower::Service;

/// Routes requests accepted by `matches` to `alternative`, everything else to
/// the wrapped service.
pub struct OverlayService<A, S> {
    matches: Arc<dyn Fn(&Parts) -> bool + Send + Sync>,
    alternative: A,
    service: S,
}

impl<A, S> OverlayService<A, S> {
    pub fn new(
        service: S,
        alternative: A,
        matches: impl Fn(&Parts) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            matches: Arc::new(matches),
            alternative,
            service,
        }
    }
}

impl<A: Clone, S: Clone> Clone for OverlayService<A, S> {
    fn clone(&self) -> Self {
        OverlayService {
            matches: self.matches.clone(),
            alternative: self.alternative.clone(),
            service: self.service.clone(),
        }
    }
}

impl<A: std::fmt::Debug, S: std::fmt::Debug> std::fmt::Debug for OverlayService<A, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayService")
            .field("matches", &"...")
            .field("alternative", &self.alternative)
            .field("service", &self.service)
            .finish()
    }
}

impl<A, S, ReqBody, AltBody, ResBody> Service<Request<ReqBody>> for OverlayService<A, S>
where
    A: Service<Request<ReqBody>, Response = Response<AltBody>>,
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = Response<OverlayBody<AltBody, ResBody>>;
    type Error = OverlayError<A::Error, S::Error>;
    type Future = OverlayFuture<A::Future, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if let Err(error) = ready!(self.alternative.poll_ready(cx)) {
            return Poll::Ready(Err(OverlayError::Left(error)));
        }
        self.service.poll_ready(cx).map_err(OverlayError::Right)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let (parts, body) = req.into_parts();
        let use_alternative = (self.matches)(&parts);
        let req = Request::from_parts(parts, body);
        if use_alternative {
            OverlayFuture::Alternative {
                alternative: self.alternative.call(req),
            }
        } else {
            OverlayFuture::Inner {
                inner: self.service.call(req),
            }
        }
    }
}

pin_project_lite::pin_project! {
    #[project = OverlayFutureProj]
    pub enum OverlayFuture<AF, F> {
        Inner {
            #[pin]
            inner: F
        },
        Alternative {
            #[pin]
            alternative: AF
        },
    }
}

impl<AF, F, AB, AE, B, E> Future for OverlayFuture<AF, F>
where
    AF: Future<Output = Result<Response<AB>, AE>>,
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<OverlayBody<AB, B>>, OverlayError<AE, E>>;

    fn poll(self: std::pin::Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            OverlayFutureProj::Inner { inner } => inner
                .poll(cx)
                .map_ok(|resp| resp.map(|right| OverlayBody::Right { right }))
                .map_err(OverlayError::Right),
            OverlayFutureProj::Alternative { alternative } => alternative
                .poll(cx)
                .map_ok(|resp| resp.map(|left| OverlayBody::Left { left }))
                .map_err(OverlayError::Left),
        }
    }
}

pin_project_lite::pin_project! {
    #[project = OverlayBodyProj]
    pub enum OverlayBody<L, R> {
        Left {
            #[pin]
            left: L
        },
        Right{
            #[pin]
            right: R
        },
    }
}

impl<Data: Buf, A: Body<Data = Data>, B: Body<Data = Data>> Body for OverlayBody<A, B> {
    type Data = Data;
    type Error = OverlayError<A::Error, B::Error>;

    fn poll_frame(
        self: std::pin::Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            OverlayBodyProj::Left { left } => left.poll_frame(cx).map_err(OverlayError::Left),
            OverlayBodyProj::Right { right } => right.poll_frame(cx).map_err(OverlayError::Right),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            OverlayBody::Left { left } => left.is_end_stream(),
            OverlayBody::Right { right } => right.is_end_stream(),
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            OverlayBody::Left { left } => left.size_hint(),
            OverlayBody::Right { right } => right.size_hint(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum OverlayError<L, R> {
    Left(L),
    Right(R),
}

impl<L: std::error::Error, R: std::error::Error> std::error::Error for OverlayError<L, R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OverlayError::Left(left) => left.source(),
            OverlayError::Right(right) => right.source(),
        }
    }
}

impl<L: std::fmt::Display, R: std::fmt::Display> std::fmt::Display for OverlayError<L, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlayError::Left(left) => left.fmt(f),
            OverlayError::Right(right) => right.fmt(f),
        }
    }
}

impl<L, R> From<OverlayError<L, R>> for Infallible
where
    L: Into<Infallible>,
    R: Into<Infallible>,
{
    fn from(value: OverlayError<L, R>) -> Self {
        match value {
            OverlayError::Left(left) => left.into(),
            OverlayError::Right(right) => right.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body as AxumBody};
    use tower::{service_fn, ServiceExt};

    use super::*;

    fn text(body: &'static str) -> Result<Response<AxumBody>, Infallible> {
        Ok(Response::new(AxumBody::from(body)))
    }

    async fn call(path: &str) -> String {
        let service = OverlayService::new(
            service_fn(|_: Request<()>| async { text("inner") }),
            service_fn(|_: Request<()>| async { text("alternative") }),
            |parts: &Parts| parts.uri.path() == "/special",
        );

        let response = service
            .oneshot(Request::get(path).body(()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(AxumBody::new(response.into_body()), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn matching_requests_go_to_the_alternative() {
        assert_eq!(call("/special").await, "alternative");
    }

    #[tokio::test]
    async fn other_requests_go_to_the_inner_service() {
        assert_eq!(call("/").await, "inner");
        assert_eq!(call("/special/nested").await, "inner");
    }
}
