//! Suspendable stage execution.
//!
//! Every stage entered during a dispatch runs as its own boxed future. When a
//! stage awaits [`Next::handle`](crate::Next::handle) the future parks after
//! depositing the forwarded request in a shared [`Exchange`] slot. The
//! dispatcher picks the request up, runs the rest of the chain, and later
//! resumes the parked stage by writing the outcome back into the slot.

use crate::middleware::{BoxFuture, Next};
use crate::stage::Stage;
use harvest_core::{HarvestError, HarvestResult, Request, Response};
use parking_lot::Mutex;
use std::future::{poll_fn, Future};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Hand-off slot shared between a stage's [`Next`] handle and its task.
pub(crate) enum Exchange {
    /// Nothing in flight.
    Idle,
    /// The stage delegated this request and is parked.
    Forwarded(Request),
    /// The dispatcher took the request and owes the stage an outcome.
    Waiting,
    /// The downstream outcome, ready for the parked stage.
    Resumed(HarvestResult<Response>),
}

/// What a stage did the last time it was driven.
pub(crate) enum Step {
    /// The stage suspended and forwarded a request downstream.
    Delegated(Request),
    /// The stage finished with a response or an error.
    Completed(HarvestResult<Response>),
}

/// A started stage that can be suspended and resumed.
pub(crate) struct StageTask {
    stage: Arc<Stage>,
    future: BoxFuture<'static, HarvestResult<Response>>,
    exchange: Arc<Mutex<Exchange>>,
    finished: bool,
}

impl StageTask {
    /// Starts `stage` with `request`. Nothing runs until [`advance`](Self::advance).
    pub(crate) fn start(stage: Arc<Stage>, request: Request) -> Self {
        let exchange = Arc::new(Mutex::new(Exchange::Idle));
        let next = Next::new(Arc::clone(&exchange));
        let future = Arc::clone(&stage).run(request, next);

        Self {
            stage,
            future,
            exchange,
            finished: false,
        }
    }

    pub(crate) fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Drives the stage until it delegates or completes.
    pub(crate) async fn advance(&mut self) -> Step {
        if self.finished {
            return Step::Completed(Err(HarvestError::stack_corrupted(format!(
                "stage {} was driven after it completed",
                self.stage.name()
            ))));
        }

        poll_fn(|cx| self.poll_step(cx)).await
    }

    /// Hands the downstream `outcome` to the parked stage and drives it.
    pub(crate) async fn resume(&mut self, outcome: HarvestResult<Response>) -> Step {
        {
            let mut slot = self.exchange.lock();
            if self.finished || !matches!(*slot, Exchange::Waiting) {
                return Step::Completed(Err(HarvestError::stack_corrupted(format!(
                    "stage {} was resumed without a pending delegation",
                    self.stage.name()
                ))));
            }
            *slot = Exchange::Resumed(outcome);
        }

        self.advance().await
    }

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Step> {
        match self.future.as_mut().poll(cx) {
            Poll::Ready(outcome) => {
                self.finished = true;
                *self.exchange.lock() = Exchange::Idle;
                Poll::Ready(Step::Completed(outcome))
            }
            Poll::Pending => {
                let mut slot = self.exchange.lock();
                match std::mem::replace(&mut *slot, Exchange::Waiting) {
                    Exchange::Forwarded(request) => Poll::Ready(Step::Delegated(request)),
                    other => {
                        *slot = other;
                        Poll::Pending
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use harvest_core::ResponseExt;
    use http::StatusCode;
    use http_body_util::Full;

    fn request(path: &str) -> Request {
        http::Request::builder()
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_short_circuit_completes_immediately() {
        let stage = Arc::new(Stage::closure(|_request, _next| async {
            Ok(Response::text(StatusCode::OK, "done"))
        }));
        let mut task = StageTask::start(stage, request("/"));

        match task.advance().await {
            Step::Completed(Ok(response)) => assert_eq!(response.status(), StatusCode::OK),
            _ => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn test_delegate_then_resume() {
        let stage = Arc::new(Stage::closure(|request, next: Next| async move {
            let mut response = next.handle(request).await?;
            response
                .headers_mut()
                .insert("x-seen", http::HeaderValue::from_static("yes"));
            Ok(response)
        }));
        let mut task = StageTask::start(stage, request("/forward"));

        let forwarded = match task.advance().await {
            Step::Delegated(request) => request,
            Step::Completed(_) => panic!("expected delegation"),
        };
        assert_eq!(forwarded.uri().path(), "/forward");

        match task.resume(Ok(Response::empty(StatusCode::ACCEPTED))).await {
            Step::Completed(Ok(response)) => {
                assert_eq!(response.status(), StatusCode::ACCEPTED);
                assert_eq!(response.headers().get("x-seen").unwrap(), "yes");
            }
            _ => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn test_resume_delivers_errors() {
        let stage = Arc::new(Stage::closure(|request, next: Next| async move {
            match next.handle(request).await {
                Ok(response) => Ok(response),
                Err(error) => Ok(Response::text(StatusCode::OK, error.to_string())),
            }
        }));
        let mut task = StageTask::start(stage, request("/"));
        assert!(matches!(task.advance().await, Step::Delegated(_)));

        match task.resume(Err(HarvestError::internal("boom"))).await {
            Step::Completed(Ok(response)) => assert_eq!(response.status(), StatusCode::OK),
            _ => panic!("expected recovery"),
        }
    }

    #[tokio::test]
    async fn test_resume_without_delegation_is_corruption() {
        let stage = Arc::new(Stage::closure(|_request, _next| async {
            Ok(Response::empty(StatusCode::OK))
        }));
        let mut task = StageTask::start(stage, request("/"));
        assert!(matches!(task.advance().await, Step::Completed(Ok(_))));

        match task.resume(Ok(Response::empty(StatusCode::OK))).await {
            Step::Completed(Err(error)) => assert!(error.is_stack_corrupted()),
            _ => panic!("expected stack corruption"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_delegation_is_corruption() {
        let stage = Arc::new(Stage::closure(|request: Request, next: Next| async move {
            let copy = harvest_core::RequestExt::duplicate(&request);
            let first = next.handle(request);
            let second = next.handle(copy);
            match tokio::join!(first, second) {
                (Err(error), _) | (_, Err(error)) => Err(error),
                (Ok(response), Ok(_)) => Ok(response),
            }
        }));
        let mut task = StageTask::start(stage, request("/"));

        assert!(matches!(task.advance().await, Step::Delegated(_)));
        match task.resume(Ok(Response::empty(StatusCode::OK))).await {
            Step::Completed(Err(error)) => assert!(error.is_stack_corrupted()),
            _ => panic!("expected stack corruption"),
        }
    }
}
