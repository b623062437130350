use std::{
    future::Future,
    pin::Pin,
    task::{ready, Context, Poll},
};

use bytes::{Buf, Bytes};
use http::{header, Method, Request, Response, StatusCode};
use http_body::{Body, Frame, SizeHint};
use tower::Service;

use crate::predicate::Predicate;

/// Appends `data` to the body of every response matching both predicates.
///
/// Only complete `200 OK` bodies are touched. Responses to `HEAD` get the
/// adjusted `Content-Length` without a body.
#[derive(Clone, Debug)]
pub struct InjectService<S, ReqPred, ResPred> {
    service: S,
    data: Bytes,
    req_predicate: ReqPred,
    res_predicate: ResPred,
}

impl<S, ReqPred, ResPred> InjectService<S, ReqPred, ResPred> {
    pub fn new(
        service: S,
        data: Bytes,
        request_predicate: ReqPred,
        response_predicate: ResPred,
    ) -> Self {
        Self {
            service,
            data,
            req_predicate: request_predicate,
            res_predicate: response_predicate,
        }
    }
}

impl<S, ReqPred, ResPred, ReqBody, ResBody> Service<Request<ReqBody>>
    for InjectService<S, ReqPred, ResPred>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ReqPred: Predicate<Request<ReqBody>>,
    ResPred: Predicate<Response<ResBody>>,
    ResBody: Body,
{
    type Response = Response<InjectBody<ResBody>>;
    type Error = S::Error;
    type Future = InjectResponseFuture<S::Future, ResPred>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let should_inject = self.req_predicate.check(&request);
        let header_only = request.method() == Method::HEAD;
        InjectResponseFuture {
            inner: self.service.call(request),
            data: should_inject.then(|| self.data.clone()),
            header_only,
            predicate: self.res_predicate.clone(),
        }
    }
}

pin_project_lite::pin_project! {
    pub struct InjectResponseFuture<F, Pred> {
        #[pin]
        inner: F,
        data: Option<Bytes>,
        header_only: bool,
        predicate: Pred,
    }
}

impl<F, Pred, B, E> Future for InjectResponseFuture<F, Pred>
where
    F: Future<Output = Result<Response<B>, E>>,
    Pred: Predicate<Response<B>>,
    B: Body,
{
    type Output = Result<Response<InjectBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let response = ready!(this.inner.poll(cx)?);

        let data = match this.data {
            Some(data) => data,
            None => return Poll::Ready(Ok(response.map(InjectBody::passthrough))),
        };

        let content_length: Option<usize> = (response.status() == StatusCode::OK
            && this.predicate.check(&response))
            .then(|| {
                response
                    .headers()
                    .get(header::CONTENT_ENCODING)
                    .map_or_else(|| Some(()), |_| None)
            })
            .flatten()
            .and_then(|_| {
                response
                    .headers()
                    .get(header::CONTENT_LENGTH)
                    .and_then(|value| value.to_str().ok().and_then(|s| s.parse().ok()))
            });

        let (mut parts, body) = response.into_parts();
        let inject = if let Some(length) = content_length {
            parts
                .headers
                .insert(header::CONTENT_LENGTH, (length + data.remaining()).into());
            this.data.take().filter(|_| !*this.header_only)
        } else {
            None
        };

        Poll::Ready(Ok(Response::from_parts(
            parts,
            InjectBody {
                body,
                inject,
                trailers: None,
            },
        )))
    }
}

pin_project_lite::pin_project! {
    /// Response body followed by the injected data, if any.
    pub struct InjectBody<B> {
        #[pin]
        body: B,
        inject: Option<Bytes>,
        trailers: Option<http::HeaderMap>,
    }
}

impl<B> InjectBody<B> {
    fn passthrough(body: B) -> Self {
        Self {
            body,
            inject: None,
            trailers: None,
        }
    }
}

impl<B: Body> Body for InjectBody<B> {
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        if let Some(trailers) = this.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }

        let frame = ready!(this.body.poll_frame(cx)?)
            .map(|frame| frame.map_data(|mut chunk| chunk.copy_to_bytes(chunk.remaining())));
        match frame {
            Some(frame) if frame.is_data() || this.inject.is_none() => {
                Poll::Ready(Some(Ok(frame)))
            }
            Some(frame) => {
                // Trailers end the body, so the injected data has to go first.
                *this.trailers = frame.into_trailers().ok();
                Poll::Ready(this.inject.take().map(|data| Ok(Frame::data(data))))
            }
            None => Poll::Ready(this.inject.take().map(|data| Ok(Frame::data(data)))),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inject.is_none() && self.trailers.is_none() && self.body.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        let inner = self.body.size_hint();
        let Some(data) = &self.inject else {
            return inner;
        };

        let extra = data.len() as u64;
        let mut hint = SizeHint::new();
        hint.set_lower(inner.lower() + extra);
        if let Some(upper) = inner.upper() {
            hint.set_upper(upper + extra);
        }
        hint
    }
}
