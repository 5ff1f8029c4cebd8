//! The dispatcher: runs a profile's stages as a single logical call stack.
//!
//! A run enters stages in sorted order. Each entered stage runs until it
//! either completes or delegates through [`Next`](crate::Next). A delegating
//! stage is parked on the frame stack and the forwarded request enters the
//! following stage. A completing stage turns the run around: its outcome is
//! handed to the innermost parked frame, which resumes from its `handle`
//! call and may post-process, recover from an error, or delegate again.
//!
//! Errors travel the same way as responses. Every parked frame is offered
//! the error, innermost first, until one recovers or the stack is empty.
//! Protocol violations end the run immediately with
//! [`HarvestError::StackCorrupted`].

use crate::profile::Profile;
use crate::stage::Stage;
use crate::task::{StageTask, Step};
use harvest_core::{HarvestError, HarvestResult, Request, Response};
use std::sync::Arc;
use tracing::{debug, trace};

/// Executes requests against a [`Profile`].
///
/// # Example
///
/// ```
/// use harvest_middleware::{Dispatcher, Next, Profile};
/// use harvest_core::{Response, ResponseExt};
/// use http::StatusCode;
///
/// # tokio_test::block_on(async {
/// let mut profile = Profile::new();
/// profile.add_fn(|request, next: Next| async move {
///     let mut response = next.handle(request).await?;
///     response.headers_mut().insert("x-wrapped", "1".parse().unwrap());
///     Ok(response)
/// });
/// profile.add_fn(|_request, _next| async { Ok(Response::text(StatusCode::OK, "hello")) });
///
/// let dispatcher = Dispatcher::new(profile);
/// let request = http::Request::new(http_body_util::Full::new(bytes::Bytes::new()));
/// let response = dispatcher.handle(request).await.unwrap();
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.headers()["x-wrapped"], "1");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Dispatcher {
    profile: Profile,
    terminal: Arc<Stage>,
}

impl Dispatcher {
    /// Creates a dispatcher over `profile`.
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            terminal: Arc::new(Stage::terminal()),
        }
    }

    /// The profile requests are dispatched against.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The profile, for adding or removing stages between runs.
    pub fn profile_mut(&mut self) -> &mut Profile {
        &mut self.profile
    }

    /// Consumes the dispatcher, returning its profile.
    pub fn into_profile(self) -> Profile {
        self.profile
    }

    /// Runs `request` through every stage and returns the final outcome.
    ///
    /// # Errors
    ///
    /// - [`HarvestError::Setup`] if the profile is empty.
    /// - [`HarvestError::NotFound`] if every stage delegated and no stage
    ///   recovered.
    /// - [`HarvestError::StackCorrupted`] on a suspend/resume protocol
    ///   violation.
    /// - Any other error a stage raised and no outer stage recovered from.
    pub async fn handle(&self, request: Request) -> HarvestResult<Response> {
        if self.profile.is_empty() {
            return Err(HarvestError::setup("no middleware has been configured"));
        }

        let ordered = self.profile.to_ordered_list();
        let mut stages = Vec::with_capacity(ordered.len() + 1);
        stages.extend(ordered.iter().cloned());
        stages.push(Arc::clone(&self.terminal));

        debug!(
            method = %request.method(),
            path = request.uri().path(),
            stages = ordered.len(),
            "dispatching request"
        );

        let outcome = Run::new(stages).execute(request).await;
        match &outcome {
            Ok(response) => debug!(status = %response.status(), "dispatch completed"),
            Err(error) => debug!(error = %error, category = ?error.category(), "dispatch failed"),
        }
        outcome
    }
}

impl From<Profile> for Dispatcher {
    fn from(profile: Profile) -> Self {
        Self::new(profile)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

struct Frame {
    index: usize,
    task: StageTask,
}

enum Signal {
    /// Enter the stage after the innermost frame with this request.
    Enter(Request),
    /// Hand this outcome to the innermost frame.
    Return(HarvestResult<Response>),
    /// Stop with this outcome.
    Finish(HarvestResult<Response>),
}

/// State of one dispatch.
struct Run {
    stages: Vec<Arc<Stage>>,
    stack: Vec<Frame>,
    position: Option<usize>,
    direction: Direction,
}

impl Run {
    fn new(stages: Vec<Arc<Stage>>) -> Self {
        Self {
            stages,
            stack: Vec::new(),
            position: None,
            direction: Direction::Forward,
        }
    }

    async fn execute(mut self, request: Request) -> HarvestResult<Response> {
        let mut signal = Signal::Enter(request);
        loop {
            signal = match signal {
                Signal::Enter(request) => self.enter(request).await,
                Signal::Return(outcome) => self.leave(outcome).await,
                Signal::Finish(outcome) => {
                    trace!(
                        position = ?self.position,
                        direction = ?self.direction,
                        depth = self.stack.len(),
                        "run finished"
                    );
                    return outcome;
                }
            };
        }
    }

    async fn enter(&mut self, request: Request) -> Signal {
        let index = self.stack.last().map_or(0, |frame| frame.index + 1);
        let Some(stage) = self.stages.get(index).map(Arc::clone) else {
            return Signal::Finish(Err(HarvestError::stack_corrupted(
                "dispatch stepped past the terminal stage",
            )));
        };

        self.position = Some(index);
        self.direction = Direction::Forward;
        trace!(stage = stage.name(), index, "entering stage");

        let mut task = StageTask::start(stage, request);
        let step = task.advance().await;
        self.settle(index, task, step)
    }

    async fn leave(&mut self, outcome: HarvestResult<Response>) -> Signal {
        self.direction = Direction::Backward;
        let Some(Frame { index, mut task }) = self.stack.pop() else {
            return Signal::Finish(outcome);
        };

        self.position = Some(index);
        match &outcome {
            Ok(response) => trace!(
                stage = task.stage().name(),
                index,
                status = %response.status(),
                "resuming stage"
            ),
            Err(error) => debug!(
                stage = task.stage().name(),
                index,
                error = %error,
                "offering error to stage"
            ),
        }

        let step = task.resume(outcome).await;
        self.settle(index, task, step)
    }

    fn settle(&mut self, index: usize, task: StageTask, step: Step) -> Signal {
        match step {
            Step::Delegated(request) => {
                trace!(stage = task.stage().name(), index, "stage delegated");
                self.stack.push(Frame { index, task });
                Signal::Enter(request)
            }
            Step::Completed(Err(error)) if error.is_stack_corrupted() => {
                debug!(stage = task.stage().name(), index, error = %error, "stack corrupted");
                Signal::Finish(Err(error))
            }
            Step::Completed(outcome) => {
                trace!(
                    stage = task.stage().name(),
                    index,
                    ok = outcome.is_ok(),
                    "stage completed"
                );
                Signal::Return(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Next;
    use bytes::Bytes;
    use harvest_core::{ErrorCategory, ResponseExt};
    use http::StatusCode;
    use http_body_util::Full;

    fn request(method: &str, path: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_profile_is_setup_error() {
        let dispatcher = Dispatcher::new(Profile::new());
        let error = dispatcher.handle(request("GET", "/")).await.unwrap_err();
        assert_eq!(error.category(), ErrorCategory::Setup);
    }

    #[tokio::test]
    async fn test_exhaustion_is_not_found() {
        let mut profile = Profile::new();
        profile.add_fn(|request, next: Next| async move { next.handle(request).await });

        let dispatcher = Dispatcher::new(profile);
        let error = dispatcher
            .handle(request("DELETE", "/nowhere"))
            .await
            .unwrap_err();
        assert!(error.is_not_found());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        match error {
            HarvestError::NotFound { method, path, .. } => {
                assert_eq!(method, "DELETE");
                assert_eq!(path, "/nowhere");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_single_stage_response() {
        let mut profile = Profile::new();
        profile.add_fn(|_request, _next| async { Ok(Response::text(StatusCode::OK, "hi")) });

        let response = Dispatcher::new(profile)
            .handle(request("GET", "/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_concurrent_delegation_is_fatal() {
        let mut profile = Profile::new();
        profile.add_with(
            Stage::closure(|_request, _next| async {
                Ok(Response::text(StatusCode::OK, "recovered"))
            }),
            None,
            Some(0),
        );
        profile.add_with(
            Stage::closure(|request: Request, next: Next| async move {
                let copy = harvest_core::RequestExt::duplicate(&request);
                match tokio::join!(next.handle(request), next.handle(copy)) {
                    (Err(error), _) | (_, Err(error)) => Err(error),
                    (Ok(response), Ok(_)) => Ok(response),
                }
            }),
            None,
            Some(-1),
        );

        let error = Dispatcher::new(profile)
            .handle(request("GET", "/"))
            .await
            .unwrap_err();
        assert!(error.is_stack_corrupted());
    }

    #[tokio::test]
    async fn test_dispatcher_is_reusable() {
        let mut profile = Profile::new();
        profile.add_fn(|_request, _next| async { Ok(Response::empty(StatusCode::NO_CONTENT)) });
        let dispatcher = Dispatcher::from(profile);

        for _ in 0..3 {
            let response = dispatcher.handle(request("GET", "/")).await.unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }
    }

    #[tokio::test]
    async fn test_runs_can_be_spawned() {
        let mut profile = Profile::new();
        profile.add_fn(|request, next: Next| async move { next.handle(request).await });
        profile.add_fn(|_request, _next| async { Ok(Response::empty(StatusCode::OK)) });
        let dispatcher = Arc::new(Dispatcher::new(profile));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move { dispatcher.handle(request("GET", "/")).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().status(), StatusCode::OK);
        }
    }
}
