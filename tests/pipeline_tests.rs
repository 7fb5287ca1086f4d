// Integration tests for the request pipeline
//
// The model is scripted; timeouts and backoff are shrunk so retries run
// in milliseconds.

mod common;

use common::{fast_pipeline_config, pipeline, ScriptedModel, Step};
use loqa_coach::coaching::CoachingCatalog;
use loqa_coach::conversation::{Message, Role};
use loqa_coach::llm::{ModelError, ModelSettings};
use loqa_coach::pipeline::{
    fallback, Clock, PipelineConfig, ReplyOutcome, RequestPipeline, TurnRequest, CLARIFICATION,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn lecture() -> loqa_coach::coaching::CoachingOption {
    CoachingCatalog::builtin()
        .option("Lecture on Topic")
        .cloned()
        .unwrap()
}

fn turn(conversation: Vec<Message>, timestamp: i64) -> TurnRequest {
    TurnRequest::turn("recursion", lecture(), conversation, timestamp)
}

#[tokio::test]
async fn test_timeout_on_every_attempt_yields_fallback() {
    let model = ScriptedModel::new(vec![Step::Hang, Step::Hang]);
    let config = PipelineConfig {
        timeout_ms: 30,
        max_attempts: 2,
        ..fast_pipeline_config()
    };
    let pipeline = RequestPipeline::new(model.clone(), ModelSettings::default(), config);

    let reply = pipeline
        .respond(&turn(vec![Message::user("explain recursion")], 1))
        .await;

    assert_eq!(reply.message.role, Role::Assistant);
    assert_eq!(reply.outcome, ReplyOutcome::Fallback);
    assert_eq!(reply.attempts, 2);
    assert_eq!(model.calls(), 2);
    assert!(reply.message.content.contains("Error: AI request timeout"));
    assert!(reply.message.content.contains("try speaking again"));
    assert!(matches!(reply.error, Some(ModelError::Timeout(30))));
}

#[tokio::test]
async fn test_malformed_completion_is_not_retried() {
    let model = ScriptedModel::new(vec![Step::Fail(ModelError::Malformed(
        "no choices".to_string(),
    ))]);
    let pipeline = pipeline(model.clone());

    let reply = pipeline.respond(&turn(vec![Message::user("hello")], 1)).await;

    assert_eq!(model.calls(), 1);
    assert_eq!(reply.message.content, fallback::MALFORMED);
    assert!(reply.is_fallback());
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let model = ScriptedModel::new(vec![Step::Fail(ModelError::Auth(401))]);
    let pipeline = pipeline(model.clone());

    let reply = pipeline.respond(&turn(vec![Message::user("hello")], 1)).await;

    assert_eq!(model.calls(), 1);
    assert_eq!(
        reply.message.content,
        fallback::for_error(&ModelError::Auth(401))
    );
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let model = ScriptedModel::new(vec![
        Step::Fail(ModelError::Server(503)),
        Step::Empty,
        Step::Reply("A function that calls itself.".to_string()),
    ]);
    let pipeline = pipeline(model.clone());

    let reply = pipeline
        .respond(&turn(vec![Message::user("what is recursion")], 1))
        .await;

    assert_eq!(reply.outcome, ReplyOutcome::Generated);
    assert_eq!(reply.attempts, 3);
    assert_eq!(reply.message.content, "A function that calls itself.");
}

#[tokio::test]
async fn test_request_carries_prompt_window_and_settings() {
    let model = ScriptedModel::replying(&["ok"]);
    let pipeline = pipeline(model.clone());
    let conversation: Vec<Message> = (0..8)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("u{i}"))
            } else {
                Message::assistant(format!("a{i}"))
            }
        })
        .collect();

    pipeline.respond(&turn(conversation, 1)).await;

    let request = &model.requests()[0];
    assert!(request.system_prompt.contains("recursion"));
    assert!(request.system_prompt.contains("Additional instructions:"));
    assert_eq!(request.messages.len(), 5);
    assert_eq!(request.messages[0].content, "a3");
    assert_eq!(request.temperature, 0.5);
    assert_eq!(request.max_tokens, 400);
}

#[tokio::test]
async fn test_cache_hit_skips_model() {
    let model = ScriptedModel::replying(&["first", "second"]);
    let pipeline = pipeline(model.clone());
    let request = turn(vec![Message::user("same question")], 42);

    let first = pipeline.respond(&request).await;
    let second = pipeline.respond(&request).await;

    assert_eq!(model.calls(), 1);
    assert_eq!(first.outcome, ReplyOutcome::Generated);
    assert_eq!(second.outcome, ReplyOutcome::Cached);
    assert_eq!(second.message.content, "first");
}

#[derive(Clone)]
struct ManualClock(Arc<Mutex<Instant>>);

impl ManualClock {
    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock().unwrap()
    }
}

#[tokio::test]
async fn test_expired_cache_entry_is_recomputed() {
    let model = ScriptedModel::replying(&["first", "second"]);
    let clock = ManualClock(Arc::new(Mutex::new(Instant::now())));
    let pipeline = RequestPipeline::with_clock(
        model.clone(),
        ModelSettings::default(),
        fast_pipeline_config(),
        Box::new(clock.clone()),
    );
    let request = turn(vec![Message::user("same question")], 42);

    pipeline.respond(&request).await;
    clock.advance(Duration::from_secs(31));
    let reply = pipeline.respond(&request).await;

    assert_eq!(model.calls(), 2);
    assert_eq!(reply.message.content, "second");
}

#[tokio::test]
async fn test_near_repeat_gets_clarification() {
    let model = ScriptedModel::replying(&[
        "Recursion is when a function calls itself to solve smaller problems",
    ]);
    let pipeline = pipeline(model);
    let conversation = vec![
        Message::user("what is recursion"),
        Message::assistant("Recursion is when a function calls itself to solve a smaller problem"),
        Message::user("say it again"),
    ];

    let reply = pipeline.respond(&turn(conversation, 1)).await;

    assert!(reply.message.content.ends_with(CLARIFICATION));
    assert!(reply.message.unique_id.is_none());
}

#[tokio::test]
async fn test_exact_repeat_is_tagged_not_rewritten() {
    let model = ScriptedModel::replying(&["Think of a stack of plates."]);
    let pipeline = pipeline(model);
    let conversation = vec![
        Message::user("give me an analogy"),
        Message::assistant("Think of a stack of plates."),
        Message::user("another one"),
    ];

    let reply = pipeline.respond(&turn(conversation, 1)).await;

    assert_eq!(reply.message.content, "Think of a stack of plates.");
    assert_eq!(reply.message.unique_id.as_ref().map(String::len), Some(8));
}

#[tokio::test]
async fn test_feedback_request_shape() {
    let model = ScriptedModel::replying(&["You did well."]);
    let pipeline = pipeline(model.clone());
    let conversation = vec![
        Message::user("q"),
        Message::assistant("a"),
        Message::feedback("old notes"),
    ];

    let request = TurnRequest::feedback("recursion", lecture(), conversation, 7);
    let reply = pipeline.respond(&request).await;

    assert!(reply.message.is_feedback_summary);
    let sent = &model.requests()[0];
    assert_eq!(sent.messages.len(), 3);
    assert!(sent.messages.iter().all(|m| !m.is_feedback_summary));
    assert_eq!(sent.messages[2].role, Role::User);
    assert!(sent.messages[2].content.contains("recursion"));
}
