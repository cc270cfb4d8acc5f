//! End-to-end engine scenarios against a scripted mock provider.

use metis_core::{
    Engine, EngineConfig, EngineEvent, Error, MemorySessionStore, RoleBindings, RunOutcome,
};
use metis_llm::{MockProvider, ToolCall, ToolCompletionResponse};
use metis_skills::builtins::weather::WeatherHandler;
use metis_skills::{ExecutionMode, Skill};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn test_engine(provider: Arc<MockProvider>, skills: Vec<Arc<Skill>>) -> Engine {
    let bindings = RoleBindings::bind(&skills);
    let config = EngineConfig {
        retry_delay: Duration::from_millis(1),
        ..EngineConfig::default()
    };
    Engine::new(provider, bindings, Arc::new(MemorySessionStore::new()), config)
}

fn plan_json(tasks: &[&str]) -> String {
    let plans: Vec<serde_json::Value> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            serde_json::json!({
                "step": (i + 1).to_string(),
                "task": task,
                "task_result": "",
                "is_complete": false,
                "error_message": ""
            })
        })
        .collect();
    serde_json::json!({ "task_plans": plans }).to_string()
}

fn step_record(step: &str, task: &str, result: &str, complete: bool, error: &str) -> String {
    serde_json::json!({
        "step": step,
        "task": task,
        "task_result": result,
        "is_complete": complete,
        "error_message": error
    })
    .to_string()
}

fn tool_call_response(name: &str, arguments: &str) -> ToolCompletionResponse {
    ToolCompletionResponse {
        content: None,
        tool_calls: vec![ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }],
        usage: None,
        finish_reason: Some("tool_calls".to_string()),
        model: "mock-model".to_string(),
    }
}

fn weather_skill() -> Arc<Skill> {
    Arc::new(Skill::new(
        "get_weather",
        "Look up the current weather",
        "The user asks about the weather",
        ExecutionMode::Scripted,
        SystemTime::now(),
        Some(Arc::new(WeatherHandler)),
    ))
}

fn direct_skill(name: &str) -> Arc<Skill> {
    Arc::new(Skill::new(
        name,
        format!("{name} description"),
        "",
        ExecutionMode::DirectRun,
        SystemTime::now(),
        None,
    ))
}

#[tokio::test]
async fn empty_task_plans_falls_back_to_chat() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([r#"{"task_plans": []}"#]);
    provider.add_stream(["Happy to help."]);

    let engine = test_engine(Arc::clone(&provider), vec![]);
    let outcome = engine.handle_input("s", "hello").await.unwrap();

    match outcome {
        RunOutcome::Chat { reply } => assert_eq!(reply, "Happy to help."),
        RunOutcome::Plan { .. } => panic!("should not have entered the execution loop"),
    }
}

#[tokio::test]
async fn invalid_plan_json_falls_back_to_chat() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream(["Sure, here's my take on that."]);
    provider.add_stream(["chat reply"]);

    let engine = test_engine(Arc::clone(&provider), vec![]);
    let outcome = engine.handle_input("s", "what do you think?").await.unwrap();

    assert!(matches!(outcome, RunOutcome::Chat { .. }));
}

#[tokio::test]
async fn empty_planner_stream_falls_back_to_chat() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream(Vec::<String>::new());
    provider.add_stream(["fallback reply"]);

    let engine = test_engine(Arc::clone(&provider), vec![]);
    let outcome = engine.handle_input("s", "hi").await.unwrap();

    match outcome {
        RunOutcome::Chat { reply } => assert_eq!(reply, "fallback reply"),
        RunOutcome::Plan { .. } => panic!("should have been chat"),
    }
}

#[tokio::test]
async fn two_step_plan_completes_with_late_second_step() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([plan_json(&["first task", "second task"])]);

    // Step 1: executor succeeds, evaluator approves on attempt 1
    provider.add_tool_text(step_record("1", "first task", "result one", false, ""));
    provider.add_completion(step_record("1", "first task", "result one", true, ""));

    // Step 2: two rejected attempts, approved on attempt 3
    for _ in 0..2 {
        provider.add_tool_text(step_record("2", "second task", "thin result", false, ""));
        provider.add_completion(step_record(
            "2",
            "second task",
            "thin result",
            false,
            "result does not cover the request",
        ));
    }
    provider.add_tool_text(step_record("2", "second task", "full result", false, ""));
    provider.add_completion(step_record("2", "second task", "full result", true, ""));

    let engine = test_engine(Arc::clone(&provider), vec![]);
    let mut events = engine.events().subscribe();

    let outcome = engine.handle_input("s", "do both things").await.unwrap();

    let RunOutcome::Plan { summary } = outcome else {
        panic!("expected a plan outcome");
    };
    assert!(summary.all_complete);
    assert_eq!(summary.steps.len(), 2);
    assert!(summary.steps[0].completed);
    assert!(summary.steps[1].completed);

    // Step 2 took all three attempts; step 1 took one
    let mut attempts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::AttemptStarted { index, attempt, .. } = event {
            attempts.push((index, attempt));
        }
    }
    assert_eq!(attempts, vec![(0, 1), (1, 1), (1, 2), (1, 3)]);
}

#[tokio::test]
async fn executor_silence_exhausts_retries() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([plan_json(&["the only task"])]);
    for _ in 0..3 {
        provider.add_tool_text("");
    }

    let engine = test_engine(Arc::clone(&provider), vec![]);
    let mut events = engine.events().subscribe();

    let outcome = engine.handle_input("s", "please do it").await.unwrap();

    let RunOutcome::Plan { summary } = outcome else {
        panic!("expected a plan outcome");
    };
    assert!(!summary.all_complete);
    assert_eq!(summary.steps.len(), 1);
    assert!(!summary.steps[0].completed);
    assert!(summary.steps[0].error_message.contains("returned no output"));
    assert_eq!(summary.failures().len(), 1);

    let mut attempt_count = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::AttemptStarted { .. }) {
            attempt_count += 1;
        }
    }
    assert_eq!(attempt_count, 3);
}

#[tokio::test]
async fn completed_step_takes_no_further_attempts() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([plan_json(&["one task"])]);

    // Attempt 1 rejected, attempt 2 approved
    provider.add_tool_text(step_record("1", "one task", "draft", false, ""));
    provider.add_completion(step_record("1", "one task", "draft", false, "too thin"));
    provider.add_tool_text(step_record("1", "one task", "final", false, ""));
    provider.add_completion(step_record("1", "one task", "final", true, ""));

    // Poison pills: consuming these would flip the step back to failed
    provider.add_tool_text(step_record("1", "one task", "", false, "poison"));
    provider.add_completion(step_record("1", "one task", "", false, "poison"));

    let engine = test_engine(Arc::clone(&provider), vec![]);
    let outcome = engine.handle_input("s", "go").await.unwrap();

    let RunOutcome::Plan { summary } = outcome else {
        panic!("expected a plan outcome");
    };
    assert!(summary.all_complete);
    assert_eq!(summary.steps[0].error_message, "");
}

#[tokio::test]
async fn evaluator_rejections_carry_reason_into_terminal_state() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([plan_json(&["stubborn task"])]);
    for _ in 0..3 {
        provider.add_tool_text(step_record("1", "stubborn task", "attempted", false, ""));
        provider.add_completion(step_record(
            "1",
            "stubborn task",
            "attempted",
            false,
            "the result is wrong",
        ));
    }

    let engine = test_engine(Arc::clone(&provider), vec![]);
    let outcome = engine.handle_input("s", "try it").await.unwrap();

    let RunOutcome::Plan { summary } = outcome else {
        panic!("expected a plan outcome");
    };
    assert!(!summary.all_complete);
    assert_eq!(summary.steps[0].error_message, "the result is wrong");
}

#[tokio::test]
async fn malformed_plan_element_aborts_without_partial_execution() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([r#"{"task_plans": [{"task": "fine"}, 42]}"#]);

    let engine = test_engine(Arc::clone(&provider), vec![]);
    let err = engine.handle_input("s", "go").await.unwrap_err();

    assert!(matches!(err, Error::Format(_)));
    assert!(err.to_string().contains("task 2"));
}

#[tokio::test]
async fn scripted_skill_runs_through_its_handler() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([plan_json(&["check the weather in Paris"])]);

    // Executor calls the tool, then replies with the step record
    provider.add_tool_response(tool_call_response(
        "get_weather",
        r#"{"location": "Paris"}"#,
    ));
    provider.add_tool_text(step_record(
        "1",
        "check the weather in Paris",
        "sunny, 20 degrees",
        false,
        "",
    ));
    provider.add_completion(step_record(
        "1",
        "check the weather in Paris",
        "sunny, 20 degrees",
        true,
        "",
    ));

    let engine = test_engine(Arc::clone(&provider), vec![weather_skill()]);
    let mut events = engine.events().subscribe();

    let outcome = engine.handle_input("s", "weather in Paris?").await.unwrap();

    let RunOutcome::Plan { summary } = outcome else {
        panic!("expected a plan outcome");
    };
    assert!(summary.all_complete);

    let mut invoked = Vec::new();
    let mut completed_result = None;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::ToolInvoked { tool } => invoked.push(tool),
            EngineEvent::StepCompleted { result, .. } => completed_result = Some(result),
            _ => {}
        }
    }
    assert_eq!(invoked, vec!["get_weather".to_string()]);
    assert_eq!(completed_result.as_deref(), Some("sunny, 20 degrees"));
}

#[tokio::test]
async fn handler_failure_becomes_the_step_error() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([plan_json(&["check the weather"])]);

    // The handler rejects these arguments on every attempt
    for _ in 0..3 {
        provider.add_tool_response(tool_call_response("get_weather", r#"{"city": "Paris"}"#));
    }

    let engine = test_engine(Arc::clone(&provider), vec![weather_skill()]);
    let outcome = engine.handle_input("s", "weather?").await.unwrap();

    let RunOutcome::Plan { summary } = outcome else {
        panic!("expected a plan outcome");
    };
    assert!(!summary.all_complete);
    assert!(summary.steps[0].error_message.contains("invalid arguments"));
}

#[tokio::test]
async fn direct_run_skill_delegates_to_sub_context() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([plan_json(&["suggest a trip"])]);

    provider.add_tool_response(tool_call_response(
        "travel_ideas",
        r#"{"input": "three day trip"}"#,
    ));
    // First plain completion feeds the sub-context, second the evaluator
    provider.add_completion("Kyoto, Lisbon, or Reykjavik.");
    provider.add_tool_text(step_record(
        "1",
        "suggest a trip",
        "Kyoto, Lisbon, or Reykjavik.",
        false,
        "",
    ));
    provider.add_completion(step_record(
        "1",
        "suggest a trip",
        "Kyoto, Lisbon, or Reykjavik.",
        true,
        "",
    ));

    let engine = test_engine(Arc::clone(&provider), vec![direct_skill("travel_ideas")]);
    let mut events = engine.events().subscribe();

    let outcome = engine.handle_input("s", "trip ideas").await.unwrap();

    let RunOutcome::Plan { summary } = outcome else {
        panic!("expected a plan outcome");
    };
    assert!(summary.all_complete);

    let mut invoked = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::ToolInvoked { tool } = event {
            invoked.push(tool);
        }
    }
    assert_eq!(invoked, vec!["travel_ideas".to_string()]);
}

#[tokio::test]
async fn unknown_tool_call_recovers_within_the_attempt() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([plan_json(&["a task"])]);

    provider.add_tool_response(tool_call_response("no_such_tool", "{}"));
    provider.add_tool_text(step_record("1", "a task", "done without the tool", false, ""));
    provider.add_completion(step_record("1", "a task", "done without the tool", true, ""));

    let engine = test_engine(Arc::clone(&provider), vec![]);
    let outcome = engine.handle_input("s", "go").await.unwrap();

    let RunOutcome::Plan { summary } = outcome else {
        panic!("expected a plan outcome");
    };
    assert!(summary.all_complete);
}

#[tokio::test]
async fn progress_events_arrive_in_order_and_end_with_summary() {
    let provider = Arc::new(MockProvider::new());
    provider.add_stream([plan_json(&["only task"])]);
    provider.add_tool_text(step_record("1", "only task", "done", false, ""));
    provider.add_completion(step_record("1", "only task", "done", true, ""));

    let engine = test_engine(Arc::clone(&provider), vec![]);
    let mut events = engine.events().subscribe();

    engine.handle_input("s", "go").await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event {
            EngineEvent::PlanToken { .. } => "plan_token",
            EngineEvent::ChatToken { .. } => "chat_token",
            EngineEvent::PlanAnnounced { .. } => "plan_announced",
            EngineEvent::StepStarted { .. } => "step_started",
            EngineEvent::AttemptStarted { .. } => "attempt_started",
            EngineEvent::ToolInvoked { .. } => "tool_invoked",
            EngineEvent::StepCompleted { .. } => "step_completed",
            EngineEvent::StepFailed { .. } => "step_failed",
            EngineEvent::Summary { .. } => "summary",
        });
    }

    assert_eq!(
        kinds,
        vec![
            "plan_token",
            "plan_announced",
            "step_started",
            "attempt_started",
            "step_completed",
            "summary"
        ]
    );
}
