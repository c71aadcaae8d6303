use std::sync::Arc;

use async_trait::async_trait;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::auth::{
    validate, AuthMechanism, ChainFailure, CompletionSignal, Error, Failure, Outcome,
};
use crate::metrics_provider::AUTH_ATTEMPTS;
use crate::pipeline::{json_response, Flow, Pipeline, RequestContext, Stage};

/// What a chain does when a mechanism cannot run at all
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MechanismErrorPolicy {
    /// Count the stage as failed and move on; fail closed if it was the last one
    TryNext,
    /// Terminate the request immediately
    FailClosed,
}

struct Chain {
    mechanisms: Vec<Arc<dyn AuthMechanism>>,
    policy: MechanismErrorPolicy,
    completion: Option<CompletionSignal>,
}

struct MechanismStage {
    chain: Arc<Chain>,
    index: usize,
}

/// Registers one pipeline stage per mechanism, in order.
///
/// The list must be non-empty and every mechanism must be named; anything else is reported
/// before a single request is processed.
pub fn exec_chain(
    pipeline: &mut Pipeline,
    mechanisms: Vec<Arc<dyn AuthMechanism>>,
    policy: MechanismErrorPolicy,
    completion: Option<CompletionSignal>,
) -> Result<(), Error> {
    if mechanisms.is_empty() {
        let msg = "at least one authentication mechanism is required".to_string();
        return Err(Error::Configuration(msg));
    }

    if let Some(position) = mechanisms.iter().position(|m| m.name().is_empty()) {
        let msg = format!("authentication mechanism at position {position} has no name");
        return Err(Error::Configuration(msg));
    }

    let names = mechanisms
        .iter()
        .map(|mechanism| mechanism.name().to_string())
        .collect::<Vec<_>>();

    let chain = Arc::new(Chain {
        mechanisms,
        policy,
        completion,
    });

    for index in 0..chain.mechanisms.len() {
        let stage = MechanismStage {
            chain: Arc::clone(&chain),
            index,
        };
        pipeline.register_stage(Arc::new(stage));
    }

    info!(
        "Registered authentication chain: {} (on mechanism error: {policy:?})",
        names.join(" -> ")
    );
    Ok(())
}

impl MechanismStage {
    fn mechanism(&self) -> &dyn AuthMechanism {
        self.chain.mechanisms[self.index].as_ref()
    }

    fn remaining(&self) -> usize {
        self.chain.mechanisms.len() - self.index - 1
    }

    fn is_last(&self) -> bool {
        self.remaining() == 0
    }

    fn accept(&self, request: &mut RequestContext, outcome: Outcome) -> Flow {
        let name = self.mechanism().name();

        let identity = match outcome {
            Outcome::Candidate(mut identity) => {
                identity.mechanism = Some(name.to_string());
                debug!("{name}: accepted identity {identity:?}");
                request.authorized = Some(identity.clone());
                Some(identity)
            }
            Outcome::Skip | Outcome::Absent => None,
        };

        if let Some(completion) = &self.chain.completion {
            completion.resolve(identity.clone());
        }

        // a skipping mechanism lets the remaining ones have their turn
        if identity.is_none() {
            debug!("{name}: skipped");
            return Flow::Continue;
        }

        Flow::Jump(self.remaining())
    }

    fn terminate(&self, failure: ChainFailure) -> Flow {
        let response = match &failure {
            ChainFailure::Terminal(failure) => failure.to_response(),
            ChainFailure::Mechanism { .. } | ChainFailure::Abandoned => json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &json!({ "message": "Authentication backend unavailable" }),
            ),
        };

        if let Some(completion) = &self.chain.completion {
            completion.reject(failure);
        }

        Flow::Respond(response)
    }

    fn on_mechanism_error(&self, error: &Error) -> Flow {
        let name = self.mechanism().name();
        warn!("While running authentication mechanism {name}: {error}");
        AUTH_ATTEMPTS.with_label_values(&[name, "error"]).inc();

        if self.chain.policy == MechanismErrorPolicy::TryNext && !self.is_last() {
            debug!("{name}: trying the next mechanism");
            return Flow::Continue;
        }

        self.terminate(ChainFailure::Mechanism {
            mechanism: name.to_string(),
            message: error.to_string(),
        })
    }
}

#[async_trait]
impl Stage for MechanismStage {
    #[instrument(skip(self, request), fields(mechanism = self.mechanism().name(), index = self.index))]
    async fn handle(&self, request: &mut RequestContext) -> Flow {
        let mechanism = self.mechanism();
        let name = mechanism.name();

        if request.authorized.is_some() {
            debug!("Request already authorized, leaving the chain");
            return Flow::Jump(self.remaining());
        }

        debug!("Trying {name}");
        let outcome = match mechanism.try_auth(request).await {
            Ok(outcome) => outcome,
            Err(error) => return self.on_mechanism_error(&error),
        };

        if validate(&outcome) {
            let result = if outcome == Outcome::Skip {
                "skipped"
            } else {
                "accepted"
            };
            AUTH_ATTEMPTS.with_label_values(&[name, result]).inc();
            return self.accept(request, outcome);
        }

        debug!("{name}: failed");
        AUTH_ATTEMPTS.with_label_values(&[name, "rejected"]).inc();

        if !self.is_last() {
            return Flow::Continue;
        }

        let failure = Failure::classify(&outcome);
        debug!("{name} was the last mechanism, giving up with {failure}");
        self.terminate(ChainFailure::Terminal(failure))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use hyper::Request;

    use super::*;
    use crate::auth::{completion_signal, Identity};
    use crate::cache;
    use crate::pipeline::tests::{body_string, build_request_context};

    type Script = Box<dyn Fn() -> Result<Outcome, Error> + Send + Sync>;

    struct ScriptedMechanism {
        name: String,
        script: Script,
        calls: AtomicUsize,
        journal: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedMechanism {
        fn new(
            name: &str,
            journal: &Arc<Mutex<Vec<String>>>,
            script: impl Fn() -> Result<Outcome, Error> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                script: Box::new(script),
                calls: AtomicUsize::new(0),
                journal: Arc::clone(journal),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthMechanism for ScriptedMechanism {
        fn name(&self) -> &str {
            &self.name
        }

        async fn try_auth(&self, _request: &RequestContext) -> Result<Outcome, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.journal.lock().unwrap().push(self.name.clone());
            (self.script)()
        }
    }

    struct Downstream {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Stage for Downstream {
        async fn handle(&self, _request: &mut RequestContext) -> Flow {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Flow::Continue
        }
    }

    fn candidate(is_active: bool, account_number: Option<&str>) -> Outcome {
        Outcome::Candidate(Identity {
            is_active,
            account_number: account_number.map(ToString::to_string),
            ..Identity::default()
        })
    }

    fn valid() -> Result<Outcome, Error> {
        Ok(candidate(true, Some("12345")))
    }

    fn journal() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn build_pipeline(
        mechanisms: Vec<Arc<ScriptedMechanism>>,
        policy: MechanismErrorPolicy,
        completion: Option<CompletionSignal>,
    ) -> (Pipeline, Arc<Downstream>) {
        let mut pipeline = Pipeline::new();
        let mechanisms = mechanisms
            .into_iter()
            .map(|m| m as Arc<dyn AuthMechanism>)
            .collect();
        exec_chain(&mut pipeline, mechanisms, policy, completion).unwrap();

        let downstream = Arc::new(Downstream {
            calls: AtomicUsize::new(0),
        });
        pipeline.register_stage(downstream.clone());

        (pipeline, downstream)
    }

    fn request() -> RequestContext {
        build_request_context(Request::builder().uri("/").body(()).unwrap())
    }

    #[test]
    fn test_policy_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: MechanismErrorPolicy,
        }

        let wrapper: Wrapper = toml::from_str(r#"policy = "try_next""#).unwrap();
        assert_eq!(wrapper.policy, MechanismErrorPolicy::TryNext);

        let wrapper: Wrapper = toml::from_str(r#"policy = "fail_closed""#).unwrap();
        assert_eq!(wrapper.policy, MechanismErrorPolicy::FailClosed);

        assert!(toml::from_str::<Wrapper>(r#"policy = "ignore""#).is_err());
    }

    #[test]
    fn test_exec_chain_rejects_empty_list() {
        let mut pipeline = Pipeline::new();

        let result = exec_chain(&mut pipeline, Vec::new(), MechanismErrorPolicy::TryNext, None);

        assert!(matches!(result, Err(Error::Configuration(_))));
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_exec_chain_rejects_unnamed_mechanism() {
        let journal = journal();
        let mut pipeline = Pipeline::new();
        let mechanisms: Vec<Arc<dyn AuthMechanism>> = vec![
            ScriptedMechanism::new("A", &journal, valid),
            ScriptedMechanism::new("", &journal, valid),
        ];

        let result = exec_chain(&mut pipeline, mechanisms, MechanismErrorPolicy::TryNext, None);

        assert_eq!(
            result,
            Err(Error::Configuration(
                "authentication mechanism at position 1 has no name".to_string()
            ))
        );
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_exec_chain_registers_one_stage_per_mechanism() {
        let journal = journal();
        let mut pipeline = Pipeline::new();
        let mechanisms: Vec<Arc<dyn AuthMechanism>> = vec![
            ScriptedMechanism::new("A", &journal, valid),
            ScriptedMechanism::new("B", &journal, valid),
            ScriptedMechanism::new("C", &journal, valid),
        ];

        exec_chain(&mut pipeline, mechanisms, MechanismErrorPolicy::TryNext, None).unwrap();

        assert_eq!(pipeline.len(), 3);
    }

    #[tokio::test]
    async fn test_skip_then_valid_identity() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Skip));
        let b = ScriptedMechanism::new("B", &journal, valid);
        let (pipeline, downstream) =
            build_pipeline(vec![a.clone(), b.clone()], MechanismErrorPolicy::TryNext, None);

        let mut request = request();
        let response = pipeline.run(&mut request).await;

        assert!(response.is_none());
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(
            request.authorized,
            Some(Identity {
                is_active: true,
                account_number: Some("12345".to_string()),
                mechanism: Some("B".to_string()),
                ..Identity::default()
            })
        );
        assert_eq!(downstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_on_last_mechanism_continues_anonymously() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Absent));
        let b = ScriptedMechanism::new("B", &journal, || Ok(Outcome::Skip));
        let (pipeline, downstream) =
            build_pipeline(vec![a, b], MechanismErrorPolicy::TryNext, None);

        let mut request = request();
        assert!(pipeline.run(&mut request).await.is_none());
        assert!(request.authorized.is_none());
        assert_eq!(downstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_settles_completion_before_later_failure() {
        let journal = journal();
        let (signal, completion) = completion_signal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Skip));
        let b = ScriptedMechanism::new("B", &journal, || Ok(Outcome::Absent));
        let (pipeline, _) =
            build_pipeline(vec![a, b], MechanismErrorPolicy::TryNext, Some(signal));

        let response = pipeline.run(&mut request()).await.unwrap();

        // the request still fails on the last mechanism, but the first settlement stands
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(completion.wait().await, Ok(None));
    }

    #[tokio::test]
    async fn test_absent_then_valid_identity() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Absent));
        let b = ScriptedMechanism::new("B", &journal, valid);
        let (pipeline, downstream) =
            build_pipeline(vec![a, b], MechanismErrorPolicy::TryNext, None);

        let mut request = request();
        let response = pipeline.run(&mut request).await;

        assert!(response.is_none());
        assert_eq!(
            request.authorized,
            Some(Identity {
                is_active: true,
                account_number: Some("12345".to_string()),
                mechanism: Some("B".to_string()),
                ..Identity::default()
            })
        );
        assert_eq!(downstream.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*journal.lock().unwrap(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_first_valid_mechanism_wins() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, valid);
        let b = ScriptedMechanism::new("B", &journal, valid);
        let c = ScriptedMechanism::new("C", &journal, || Ok(Outcome::Absent));
        let (pipeline, downstream) = build_pipeline(
            vec![a.clone(), b.clone(), c.clone()],
            MechanismErrorPolicy::TryNext,
            None,
        );

        let mut request = request();
        let response = pipeline.run(&mut request).await;

        assert!(response.is_none());
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
        assert_eq!(c.calls(), 0);
        assert_eq!(
            request.authorized.unwrap().mechanism,
            Some("A".to_string())
        );
        assert_eq!(downstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mechanisms_run_in_configured_order() {
        let journal = journal();
        let mechanisms = ["first", "second", "third", "fourth"]
            .into_iter()
            .map(|name| ScriptedMechanism::new(name, &journal, || Ok(Outcome::Absent)))
            .collect();
        let (pipeline, downstream) =
            build_pipeline(mechanisms, MechanismErrorPolicy::TryNext, None);

        let response = pipeline.run(&mut request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            *journal.lock().unwrap(),
            vec!["first", "second", "third", "fourth"]
        );
        assert_eq!(downstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_terminal_status_comes_from_last_mechanism() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(candidate(false, Some("1"))));
        let b = ScriptedMechanism::new("B", &journal, || Ok(Outcome::Absent));
        let (pipeline, _) = build_pipeline(vec![a, b], MechanismErrorPolicy::TryNext, None);

        let response = pipeline.run(&mut request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(response).await, "");

        let journal = self::journal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Absent));
        let b = ScriptedMechanism::new("B", &journal, || Ok(candidate(false, Some("1"))));
        let (pipeline, _) = build_pipeline(vec![a, b], MechanismErrorPolicy::TryNext, None);

        let response = pipeline.run(&mut request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_single_inactive_identity() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(candidate(false, None)));
        let (pipeline, _) = build_pipeline(vec![a], MechanismErrorPolicy::TryNext, None);

        let mut request = request();
        let response = pipeline.run(&mut request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_string(response).await,
            r#"{"message":"Forbidden: user is not active"}"#
        );
        assert!(request.authorized.is_none());
    }

    #[tokio::test]
    async fn test_single_empty_account_number() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(candidate(true, Some(""))));
        let (pipeline, _) = build_pipeline(vec![a], MechanismErrorPolicy::TryNext, None);

        let response = pipeline.run(&mut request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            body_string(response).await,
            r#"{"message":"No Red Hat account found"}"#
        );
    }

    #[tokio::test]
    async fn test_single_absent_identity() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Absent));
        let (pipeline, _) = build_pipeline(vec![a], MechanismErrorPolicy::TryNext, None);

        let response = pipeline.run(&mut request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn test_completion_resolved_with_identity() {
        let journal = journal();
        let (signal, completion) = completion_signal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Absent));
        let b = ScriptedMechanism::new("B", &journal, valid);
        let (pipeline, _) =
            build_pipeline(vec![a, b], MechanismErrorPolicy::TryNext, Some(signal.clone()));

        assert!(pipeline.run(&mut request()).await.is_none());

        let identity = completion.wait().await.unwrap().unwrap();
        assert_eq!(identity.mechanism, Some("B".to_string()));
        assert!(signal.is_settled());
    }

    #[tokio::test]
    async fn test_completion_resolved_on_skip() {
        let journal = journal();
        let (signal, completion) = completion_signal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Skip));
        let (pipeline, _) = build_pipeline(vec![a], MechanismErrorPolicy::TryNext, Some(signal));

        assert!(pipeline.run(&mut request()).await.is_none());
        assert_eq!(completion.wait().await, Ok(None));
    }

    #[tokio::test]
    async fn test_completion_rejected_with_terminal_failure() {
        let journal = journal();
        let (signal, completion) = completion_signal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Absent));
        let b = ScriptedMechanism::new("B", &journal, || Ok(candidate(true, Some("x"))));
        let (pipeline, _) =
            build_pipeline(vec![a, b], MechanismErrorPolicy::TryNext, Some(signal));

        let response = pipeline.run(&mut request()).await.unwrap();

        let failure = completion.wait().await.unwrap_err();
        assert_eq!(failure, ChainFailure::Terminal(Failure::NoAccount));
        assert_eq!(failure.status_code(), response.status());
    }

    #[tokio::test]
    async fn test_completion_settled_once_across_requests() {
        let journal = journal();
        let (signal, completion) = completion_signal();
        let a = ScriptedMechanism::new("A", &journal, valid);
        let (pipeline, _) = build_pipeline(vec![a], MechanismErrorPolicy::TryNext, Some(signal));

        assert!(pipeline.run(&mut request()).await.is_none());
        assert!(pipeline.run(&mut request()).await.is_none());

        assert_eq!(
            completion.wait().await.unwrap().unwrap().mechanism,
            Some("A".to_string())
        );
    }

    #[tokio::test]
    async fn test_already_authorized_request_is_not_overridden() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Absent));
        let (pipeline, downstream) =
            build_pipeline(vec![a.clone()], MechanismErrorPolicy::TryNext, None);

        let existing = Identity {
            username: Some("existing".to_string()),
            is_active: true,
            account_number: Some("1".to_string()),
            mechanism: Some("upstream".to_string()),
            ..Identity::default()
        };
        let mut request = request();
        request.authorized = Some(existing.clone());

        assert!(pipeline.run(&mut request).await.is_none());
        assert_eq!(a.calls(), 0);
        assert_eq!(request.authorized, Some(existing));
        assert_eq!(downstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mechanism_error_try_next() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, || {
            Err(Error::Cache(cache::Error::Backend("Backend error".to_string())))
        });
        let b = ScriptedMechanism::new("B", &journal, valid);
        let (pipeline, _) = build_pipeline(vec![a, b], MechanismErrorPolicy::TryNext, None);

        let mut request = request();
        assert!(pipeline.run(&mut request).await.is_none());
        assert_eq!(
            request.authorized.unwrap().mechanism,
            Some("B".to_string())
        );
    }

    #[tokio::test]
    async fn test_mechanism_error_try_next_on_last_fails_closed() {
        let journal = journal();
        let (signal, completion) = completion_signal();
        let a = ScriptedMechanism::new("A", &journal, || Ok(Outcome::Absent));
        let b = ScriptedMechanism::new("B", &journal, || {
            Err(Error::Backend("unreachable".to_string()))
        });
        let (pipeline, _) =
            build_pipeline(vec![a, b], MechanismErrorPolicy::TryNext, Some(signal));

        let response = pipeline.run(&mut request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            completion.wait().await,
            Err(ChainFailure::Mechanism {
                mechanism: "B".to_string(),
                message: "Authentication backend error: unreachable".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_mechanism_error_fail_closed() {
        let journal = journal();
        let (signal, completion) = completion_signal();
        let a = ScriptedMechanism::new("A", &journal, || {
            Err(Error::Backend("unreachable".to_string()))
        });
        let b = ScriptedMechanism::new("B", &journal, valid);
        let (pipeline, downstream) = build_pipeline(
            vec![a, b.clone()],
            MechanismErrorPolicy::FailClosed,
            Some(signal),
        );

        let response = pipeline.run(&mut request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body_string(response).await,
            r#"{"message":"Authentication backend unavailable"}"#
        );
        assert_eq!(b.calls(), 0);
        assert_eq!(downstream.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            completion.wait().await,
            Err(ChainFailure::Mechanism { .. })
        ));
    }

    #[tokio::test]
    async fn test_chain_followed_by_more_stages() {
        let journal = journal();
        let a = ScriptedMechanism::new("A", &journal, valid);
        let b = ScriptedMechanism::new("B", &journal, valid);

        let mut pipeline = Pipeline::new();
        exec_chain(
            &mut pipeline,
            vec![
                a.clone() as Arc<dyn AuthMechanism>,
                b.clone() as Arc<dyn AuthMechanism>,
            ],
            MechanismErrorPolicy::TryNext,
            None,
        )
        .unwrap();

        let second_chain = ScriptedMechanism::new("C", &journal, valid);
        exec_chain(
            &mut pipeline,
            vec![second_chain.clone() as Arc<dyn AuthMechanism>],
            MechanismErrorPolicy::TryNext,
            None,
        )
        .unwrap();

        let mut request = request();
        assert!(pipeline.run(&mut request).await.is_none());

        // the second chain sees the identity accepted by the first one and leaves it alone
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
        assert_eq!(second_chain.calls(), 0);
        assert_eq!(
            request.authorized.unwrap().mechanism,
            Some("A".to_string())
        );
    }
}
