//! Plan → execute → evaluate orchestration engine
//!
//! Per user request: the planner classifies the input as chat or a task
//! plan (streamed). A plan is normalized into task steps and each step
//! runs through a bounded executor/evaluator retry loop, strictly in
//! order. Step N+1 runs regardless of step N's outcome; the final
//! summary lists every unresolved step with its last known reason.
//!
//! Steps execute sequentially on purpose: each executor/evaluator call
//! appends to the shared session, and a later step may depend on that
//! context.

use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventBus};
use crate::roles::{direct_run_instructions, RoleBindings, ToolBinding};
use crate::session::SessionStore;
use crate::task::{
    normalize_plan, parse_step_record, parse_task_plans, PlanSummary, TaskStep,
};
use futures::StreamExt;
use metis_llm::{
    CompletionRequest, LlmProvider, Message, ToolCall, ToolCompletionRequest,
};
use metis_skills::HandlerContext;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Retry budget per step
pub const MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts of the same step
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bound on executor tool-call rounds within one attempt
const MAX_TOOL_ROUNDS: u32 = 8;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model passed to the completion service (empty = provider default)
    pub model: String,
    /// Retry budget per step
    pub max_attempts: u32,
    /// Delay between attempts (not applied after the last)
    pub retry_delay: Duration,
    /// Bound on executor tool-call rounds within one attempt
    pub max_tool_rounds: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
            max_tool_rounds: MAX_TOOL_ROUNDS,
        }
    }
}

/// How a user request resolved
#[derive(Debug)]
pub enum RunOutcome {
    /// The request was a chat; reply already streamed as events
    Chat {
        /// Accumulated reply text
        reply: String,
    },
    /// The request was a task plan, now fully resolved
    Plan {
        /// Final per-step summary
        summary: PlanSummary,
    },
}

enum Classification {
    Plan(Vec<Value>),
    Chat,
}

enum AttemptOutcome {
    Complete(TaskStep),
    Retry(TaskStep),
}

/// The orchestration engine
pub struct Engine {
    provider: Arc<dyn LlmProvider>,
    bindings: RoleBindings,
    store: Arc<dyn SessionStore>,
    bus: EventBus,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        bindings: RoleBindings,
        store: Arc<dyn SessionStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            bindings,
            store,
            bus: EventBus::default(),
            config,
        }
    }

    /// The engine's event bus
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Replace the role bindings, e.g. after a forced registry reload
    pub fn rebind(&mut self, bindings: RoleBindings) {
        self.bindings = bindings;
    }

    fn emit(&self, event: EngineEvent) {
        self.bus.publish(event);
    }

    /// Handle one user request end to end.
    ///
    /// # Errors
    /// Returns [`Error::Format`] when the planner produced a plan whose
    /// element is not a structured record (the plan is aborted with no
    /// partial execution). Infrastructure failures (session store,
    /// completion service during chat) also surface here; per-step
    /// failures never do.
    pub async fn handle_input(&self, session_id: &str, input: &str) -> Result<RunOutcome> {
        match self.classify(session_id, input).await? {
            Classification::Plan(raw) => {
                let steps = normalize_plan(&raw)?;
                let summary = self.execute_plan(session_id, steps).await?;
                Ok(RunOutcome::Plan { summary })
            }
            Classification::Chat => {
                let reply = self.chat(session_id, input).await?;
                Ok(RunOutcome::Chat { reply })
            }
        }
    }

    /// Stream the planner over the raw input and decide chat vs plan.
    async fn classify(&self, session_id: &str, input: &str) -> Result<Classification> {
        let request = self
            .role_request(&self.bindings.planner.instructions, session_id, input)
            .await?;

        let mut plan_text = String::new();
        match self.provider.complete_stream(request).await {
            Ok(mut stream) => {
                while let Some(token) = stream.next().await {
                    match token {
                        Ok(token) => {
                            self.emit(EngineEvent::PlanToken {
                                token: token.clone(),
                            });
                            plan_text.push_str(&token);
                        }
                        Err(e) => {
                            warn!(error = %e, "planner stream error");
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "planner invocation failed, falling back to chat");
                return Ok(Classification::Chat);
            }
        }

        if plan_text.trim().is_empty() {
            debug!("planner returned no tokens, treating as chat");
            return Ok(Classification::Chat);
        }

        self.store
            .append(
                session_id,
                &[Message::user(input), Message::assistant(&plan_text)],
            )
            .await?;

        match parse_task_plans(&plan_text) {
            Some(plans) => {
                info!(tasks = plans.len(), "input classified as task plan");
                Ok(Classification::Plan(plans))
            }
            None => {
                debug!("planner output is not a task plan, treating as chat");
                Ok(Classification::Chat)
            }
        }
    }

    /// Stream a plain chat reply for the same input.
    async fn chat(&self, session_id: &str, input: &str) -> Result<String> {
        let request = self
            .role_request(&self.bindings.planner.instructions, session_id, input)
            .await?;

        let mut reply = String::new();
        let mut stream = self.provider.complete_stream(request).await?;
        while let Some(token) = stream.next().await {
            match token {
                Ok(token) => {
                    self.emit(EngineEvent::ChatToken {
                        token: token.clone(),
                    });
                    reply.push_str(&token);
                }
                Err(e) => {
                    warn!(error = %e, "chat stream error");
                }
            }
        }

        self.store
            .append(
                session_id,
                &[Message::user(input), Message::assistant(&reply)],
            )
            .await?;

        Ok(reply)
    }

    /// Run every step of the plan, in order, no fail-fast.
    async fn execute_plan(
        &self,
        session_id: &str,
        steps: Vec<TaskStep>,
    ) -> Result<PlanSummary> {
        self.emit(EngineEvent::PlanAnnounced {
            tasks: steps.iter().map(|s| s.task.clone()).collect(),
        });

        let total = steps.len();
        let mut resolved = Vec::with_capacity(total);

        for (index, step) in steps.into_iter().enumerate() {
            self.emit(EngineEvent::StepStarted {
                index,
                total,
                task: step.task.clone(),
            });

            let outcome = self.run_step(session_id, index, step).await;

            if outcome.is_complete {
                self.emit(EngineEvent::StepCompleted {
                    index,
                    result: outcome.task_result.clone(),
                });
            } else {
                self.emit(EngineEvent::StepFailed {
                    index,
                    error: outcome.error_message.clone(),
                });
            }

            resolved.push(outcome);
        }

        let summary = PlanSummary::from_steps(&resolved);
        info!(
            all_complete = summary.all_complete,
            failed = summary.failures().len(),
            "plan resolved"
        );
        self.emit(EngineEvent::Summary {
            summary: summary.clone(),
        });

        Ok(summary)
    }

    /// Drive one step through the bounded retry loop.
    ///
    /// Failures are captured in the returned step's `error_message`;
    /// this never aborts the remaining plan.
    async fn run_step(&self, session_id: &str, index: usize, step: TaskStep) -> TaskStep {
        // Reset before the first attempt; later attempts carry the
        // evaluator's last result and reason forward.
        let mut current = TaskStep {
            step: step.step,
            task: step.task,
            task_result: step.task_result,
            is_complete: false,
            error_message: String::new(),
        };

        for attempt in 0..self.config.max_attempts {
            self.emit(EngineEvent::AttemptStarted {
                index,
                attempt: attempt + 1,
                max_attempts: self.config.max_attempts,
            });

            match self.attempt_step(session_id, &current).await {
                Ok(AttemptOutcome::Complete(final_step)) => return final_step,
                Ok(AttemptOutcome::Retry(updated)) => {
                    debug!(step = %updated.step, reason = %updated.error_message, "attempt failed");
                    current = updated;
                }
                Err(e) => {
                    warn!(step = %current.step, error = %e, "attempt errored");
                    current.error_message = e.to_string();
                }
            }

            // Backpressure between attempts, not after the last
            if attempt + 1 < self.config.max_attempts {
                sleep(self.config.retry_delay).await;
            }
        }

        current.is_complete = false;
        if current.error_message.is_empty() {
            current.error_message = "unknown error".to_string();
        }
        current
    }

    /// One executor → evaluator round for the current step state.
    async fn attempt_step(
        &self,
        session_id: &str,
        current: &TaskStep,
    ) -> Result<AttemptOutcome> {
        let executor_output = self.invoke_executor(session_id, &current.to_json()).await?;
        if executor_output.trim().is_empty() {
            return Ok(AttemptOutcome::Retry(
                current.with_error("executor returned no output"),
            ));
        }

        let updated = match parse_step_record("executor", &executor_output) {
            Ok(value) => current.absorb_executor(&value),
            Err(reason) => return Ok(AttemptOutcome::Retry(current.with_error(reason))),
        };

        let evaluator_output = self
            .invoke_plain(
                &self.bindings.evaluator.instructions,
                session_id,
                &updated.to_json(),
            )
            .await?;
        if evaluator_output.trim().is_empty() {
            return Ok(AttemptOutcome::Retry(
                updated.with_error("evaluator returned no output"),
            ));
        }

        match parse_step_record("evaluator", &evaluator_output) {
            Ok(value) => {
                if value
                    .get("is_complete")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
                {
                    // The evaluator's record is the step's final state
                    Ok(AttemptOutcome::Complete(TaskStep::from_value(
                        &value, &updated,
                    )))
                } else {
                    Ok(AttemptOutcome::Retry(
                        updated.absorb_evaluator_failure(&value),
                    ))
                }
            }
            Err(reason) => Ok(AttemptOutcome::Retry(updated.with_error(reason))),
        }
    }

    /// Invoke the executor with its tool set, resolving tool calls
    /// until it produces text or the round bound is hit.
    async fn invoke_executor(&self, session_id: &str, input: &str) -> Result<String> {
        let mut messages = self
            .assemble_messages(&self.bindings.executor.instructions, session_id, input)
            .await?;
        let tools = self.bindings.tool_definitions();

        let mut final_text = String::new();
        for round in 0..self.config.max_tool_rounds {
            let request = ToolCompletionRequest::new(
                CompletionRequest::new(self.config.model.clone())
                    .with_messages(messages.clone()),
                tools.clone(),
            );

            let response = self.provider.complete_with_tools(request).await?;

            if !response.has_tool_calls() {
                final_text = response.content.unwrap_or_default();
                break;
            }

            messages.push(Message::assistant_with_tool_calls(
                response.content.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                self.emit(EngineEvent::ToolInvoked {
                    tool: call.name.clone(),
                });
                let output = self.execute_tool_call(session_id, call).await?;
                messages.push(Message::tool_response_named(&call.id, &call.name, output));
            }

            if round + 1 == self.config.max_tool_rounds {
                warn!("executor hit the tool-round bound without a final reply");
            }
        }

        // Only the boundary exchange is persisted; tool rounds stay
        // local to this attempt.
        self.store
            .append(
                session_id,
                &[Message::user(input), Message::assistant(&final_text)],
            )
            .await?;

        Ok(final_text)
    }

    /// Invoke a tool-less role (evaluator) through the shared session.
    async fn invoke_plain(
        &self,
        instructions: &str,
        session_id: &str,
        input: &str,
    ) -> Result<String> {
        let messages = self.assemble_messages(instructions, session_id, input).await?;

        let request =
            CompletionRequest::new(self.config.model.clone()).with_messages(messages);
        let response = self.provider.complete(request).await?;

        self.store
            .append(
                session_id,
                &[Message::user(input), Message::assistant(&response.content)],
            )
            .await?;

        Ok(response.content)
    }

    async fn role_request(
        &self,
        instructions: &str,
        session_id: &str,
        input: &str,
    ) -> Result<CompletionRequest> {
        let messages = self.assemble_messages(instructions, session_id, input).await?;
        Ok(CompletionRequest::new(self.config.model.clone()).with_messages(messages))
    }

    async fn assemble_messages(
        &self,
        instructions: &str,
        session_id: &str,
        input: &str,
    ) -> Result<Vec<Message>> {
        let history = self.store.history(session_id).await?;
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(instructions));
        messages.extend(history);
        messages.push(Message::user(input));
        Ok(messages)
    }

    /// Dispatch one tool call to its bound skill.
    async fn execute_tool_call(&self, session_id: &str, call: &ToolCall) -> Result<String> {
        let Some(tool) = self.bindings.find_tool(&call.name) else {
            warn!(tool = %call.name, "executor requested unknown tool");
            return Ok(
                serde_json::json!({"error": format!("unknown tool '{}'", call.name)})
                    .to_string(),
            );
        };

        match &tool.binding {
            ToolBinding::Scripted(skill) => {
                let handler = skill.handler().ok_or_else(|| {
                    Error::Internal(format!("scripted skill '{}' has no handler", skill.name))
                })?;
                let ctx = HandlerContext::new(skill.name.as_str()).with_session(session_id);

                debug!(skill = %skill.name, "invoking scripted skill");
                handler.invoke(&call.arguments, &ctx).await.map_err(|e| match e {
                    metis_skills::Error::Execution(reason) => Error::Execution(reason),
                    other => Error::Skills(other),
                })
            }
            ToolBinding::Direct(skill) => {
                // Unwrap the opaque {"input": ...} payload; fall back to
                // the raw arguments for models that skip the wrapper.
                let input = serde_json::from_str::<Value>(&call.arguments)
                    .ok()
                    .and_then(|v| {
                        v.get("input").and_then(Value::as_str).map(String::from)
                    })
                    .unwrap_or_else(|| call.arguments.clone());

                debug!(skill = %skill.name, "delegating to direct-run sub-context");
                let request = CompletionRequest::new(self.config.model.clone())
                    .with_message(Message::system(direct_run_instructions(skill)))
                    .with_message(Message::user(input));
                let response = self.provider.complete(request).await?;
                Ok(response.content)
            }
        }
    }
}
