//! Agent loop driver: repeatedly calls the provider, dispatches any tool
//! calls it requests, and feeds the results back until it produces a
//! final answer, the iteration cap is hit, or the run is cancelled.

use crate::cancellation::CancellationToken;
use crate::engine::{execute_function_call, ExecutionRecord};
use crate::providers::{ContentBlock, LlmProvider, Message, MessageContent, StopReason};
use crate::rate_limiter::{call_with_retry, RateLimiter};
use crate::registry::ToolRegistry;
use crate::resolver::Blackboard;
use crate::{AgentEvent, AgentOutcome, CoreError};
use report_agent_jira::IssueTracker;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Default cap on loop iterations before giving up.
pub const MAX_ITERATIONS: u32 = 10;

/// Canned artifact returned when the loop hits its iteration cap without
/// reaching a final answer. Per the spec this is a successful, terminal
/// outcome, not an error.
const ITERATION_CAP_ARTIFACT: &str =
    "<p>Report generation stopped after reaching the maximum number of steps.</p>";

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(120);
const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(120);
const MAX_RETRIES: u32 = 5;

/// Runs the agent loop for a single user `question`.
///
/// On each iteration the provider is called (under the rate limiter, with
/// retry-with-backoff on rate-limit-shaped errors); if it requests tool
/// calls, each is resolved and dispatched through the execution engine and
/// the summarized result fed back as a `tool` message. Every call's
/// [`ExecutionRecord`] is appended to the returned outcome's history. The
/// loop ends when the provider stops requesting tools, `max_iterations` is
/// reached (a successful, canned-artifact outcome), or `cancellation` is
/// tripped before the next suspension point (an unsuccessful outcome).
///
/// # Errors
///
/// Returns whatever error the provider produced after the rate limiter
/// exhausted its retries. Per-tool failures never surface here — they are
/// recorded on the matching history entry instead.
#[allow(clippy::too_many_arguments)]
pub async fn run_agent(
    provider: &dyn LlmProvider,
    registry: &ToolRegistry,
    tracker: &dyn IssueTracker,
    rate_limiter: &RateLimiter,
    system_prompt: &str,
    question: &str,
    max_iterations: u32,
    cancellation: &CancellationToken,
    tx: &mpsc::Sender<AgentEvent>,
) -> Result<AgentOutcome, CoreError> {
    let started = Instant::now();
    let mut blackboard = Blackboard::new();
    let tools = registry.schemas();
    let mut history: Vec<ExecutionRecord> = Vec::new();

    let mut messages = vec![Message {
        role: "user".to_string(),
        content: MessageContent::Text(question.to_string()),
    }];

    for iteration in 1..=max_iterations {
        if cancellation.is_cancelled() {
            return Ok(cancelled_outcome(messages, history, iteration, started, tx).await);
        }

        let _ = tx.send(AgentEvent::IterationStarted { iteration }).await;

        let response = match call_with_retry(
            rate_limiter,
            ACQUIRE_TIMEOUT,
            MAX_RETRIES,
            INITIAL_BACKOFF,
            MAX_BACKOFF,
            || provider.chat(system_prompt, &messages, &tools),
        )
        .await
        {
            Ok(response) => response,
            Err(err) => {
                let _ = tx
                    .send(AgentEvent::Failed {
                        message: err.to_string(),
                    })
                    .await;
                return Err(err);
            }
        };

        messages.push(Message {
            role: "assistant".to_string(),
            content: MessageContent::Blocks(response.content.clone()),
        });

        if response.stop_reason != StopReason::ToolUse {
            let result = extract_text(&response.content);
            let _ = tx
                .send(AgentEvent::Finished {
                    result: result.clone(),
                })
                .await;
            return Ok(AgentOutcome {
                messages,
                result: Some(result),
                metadata: serde_json::json!({
                    "iterations": iteration,
                    "terminal": "end_turn",
                }),
                history,
                elapsed: started.elapsed(),
                success: true,
                error: None,
            });
        }

        let tool_calls: Vec<(String, String, serde_json::Value)> = response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect();

        let mut tool_result_blocks = Vec::new();

        for (call_id, name, arguments) in tool_calls {
            if cancellation.is_cancelled() {
                return Ok(cancelled_outcome(messages, history, iteration, started, tx).await);
            }

            let _ = tx
                .send(AgentEvent::ToolCallStarted {
                    name: name.clone(),
                    arguments: arguments.clone(),
                })
                .await;

            let store_as = format!("result_{iteration}_{name}");

            let record = execute_function_call(
                registry,
                tracker,
                &mut blackboard,
                &call_id,
                &name,
                &arguments,
                &store_as,
            )
            .await;

            let _ = tx
                .send(AgentEvent::ToolCallFinished {
                    name: name.clone(),
                    succeeded: record.success,
                })
                .await;

            tool_result_blocks.push(ContentBlock::ToolResult {
                tool_use_id: call_id,
                content: record.tool_result_content(),
            });
            history.push(record);
        }

        messages.push(Message {
            role: "user".to_string(),
            content: MessageContent::Blocks(tool_result_blocks),
        });
    }

    let _ = tx
        .send(AgentEvent::Finished {
            result: ITERATION_CAP_ARTIFACT.to_string(),
        })
        .await;

    Ok(AgentOutcome {
        messages,
        result: Some(ITERATION_CAP_ARTIFACT.to_string()),
        metadata: serde_json::json!({
            "iterations": max_iterations,
            "terminal": "iteration_cap",
        }),
        history,
        elapsed: started.elapsed(),
        success: true,
        error: None,
    })
}

/// Builds the outcome for a run tripped by cancellation: unsuccessful,
/// carrying whatever history and messages accumulated so far.
async fn cancelled_outcome(
    messages: Vec<Message>,
    history: Vec<ExecutionRecord>,
    iteration: u32,
    started: Instant,
    tx: &mpsc::Sender<AgentEvent>,
) -> AgentOutcome {
    let _ = tx
        .send(AgentEvent::Failed {
            message: CoreError::Cancelled.to_string(),
        })
        .await;

    AgentOutcome {
        messages,
        result: None,
        metadata: serde_json::json!({
            "iterations": iteration,
            "terminal": "cancelled",
        }),
        history,
        elapsed: started.elapsed(),
        success: false,
        error: Some(CoreError::Cancelled.to_string()),
    }
}

fn extract_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use report_agent_jira::InMemoryIssueTracker;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct ScriptedProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _tools: &[serde_json::Value],
        ) -> Result<crate::providers::LlmResponse, CoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok(crate::providers::LlmResponse {
                    content: vec![ContentBlock::ToolUse {
                        id: "call_1".to_string(),
                        name: "echo".to_string(),
                        input: serde_json::json!({ "value": "hi" }),
                    }],
                    stop_reason: StopReason::ToolUse,
                })
            } else {
                Ok(crate::providers::LlmResponse {
                    content: vec![ContentBlock::Text {
                        text: "done".to_string(),
                    }],
                    stop_reason: StopReason::EndTurn,
                })
            }
        }
    }

    struct AlwaysToolUseProvider;

    #[async_trait]
    impl LlmProvider for AlwaysToolUseProvider {
        async fn chat(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _tools: &[serde_json::Value],
        ) -> Result<crate::providers::LlmResponse, CoreError> {
            Ok(crate::providers::LlmResponse {
                content: vec![ContentBlock::ToolUse {
                    id: "call_1".to_string(),
                    name: "missing_tool".to_string(),
                    input: serde_json::json!({}),
                }],
                stop_reason: StopReason::ToolUse,
            })
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(
            "echo",
            serde_json::json!({ "name": "echo" }),
            |_ctx, args| Box::pin(async move { Ok(args) }),
        );
        registry
    }

    #[tokio::test]
    async fn run_agent_finishes_after_tool_call_then_end_turn() {
        let provider = ScriptedProvider {
            calls: AtomicU32::new(0),
        };
        let registry = echo_registry();
        let tracker = InMemoryIssueTracker::new(vec![]);
        let limiter = RateLimiter::new(1000);
        let cancellation = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);

        let outcome = run_agent(
            &provider,
            &registry,
            &tracker,
            &limiter,
            "system",
            "question",
            MAX_ITERATIONS,
            &cancellation,
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(outcome.result, Some("done".to_string()));
        assert!(outcome.success);
        assert_eq!(outcome.history.len(), 1);
        assert!(outcome.history[0].success);

        let mut saw_tool_call = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AgentEvent::ToolCallFinished { succeeded: true, .. }) {
                saw_tool_call = true;
            }
        }
        assert!(saw_tool_call);
    }

    #[tokio::test]
    async fn run_agent_reaching_the_iteration_cap_still_succeeds() {
        let provider = AlwaysToolUseProvider;
        let registry = ToolRegistry::new();
        let tracker = InMemoryIssueTracker::new(vec![]);
        let limiter = RateLimiter::new(1000);
        let cancellation = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(16);

        let outcome = run_agent(
            &provider,
            &registry,
            &tracker,
            &limiter,
            "system",
            "question",
            2,
            &cancellation,
            &tx,
        )
        .await
        .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.result, Some(ITERATION_CAP_ARTIFACT.to_string()));
        assert_eq!(outcome.history.len(), 2);
        assert!(outcome.history.iter().all(|record| !record.success));
    }

    struct TwoToolCallsProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for TwoToolCallsProvider {
        async fn chat(
            &self,
            _system_prompt: &str,
            _messages: &[Message],
            _tools: &[serde_json::Value],
        ) -> Result<crate::providers::LlmResponse, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(crate::providers::LlmResponse {
                content: vec![ContentBlock::ToolUse {
                    id: "call".to_string(),
                    name: "cancel_trigger".to_string(),
                    input: serde_json::json!({}),
                }],
                stop_reason: StopReason::ToolUse,
            })
        }
    }

    #[tokio::test]
    async fn run_agent_honors_cancellation_before_the_second_llm_call() {
        let provider = TwoToolCallsProvider {
            calls: AtomicU32::new(0),
        };
        let tracker = InMemoryIssueTracker::new(vec![]);
        let limiter = RateLimiter::new(1000);
        let cancellation = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(16);

        let mut registry = ToolRegistry::new();
        let trigger = cancellation.clone();
        registry.register(
            "cancel_trigger",
            serde_json::json!({ "name": "cancel_trigger" }),
            move |_ctx, args| {
                trigger.cancel();
                Box::pin(async move { Ok(args) })
            },
        );

        let outcome = run_agent(
            &provider,
            &registry,
            &tracker,
            &limiter,
            "system",
            "question",
            MAX_ITERATIONS,
            &cancellation,
            &tx,
        )
        .await
        .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(CoreError::Cancelled.to_string()));
        assert_eq!(outcome.history.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limiter_is_shared_across_iterations() {
        let provider = ScriptedProvider {
            calls: AtomicU32::new(0),
        };
        let registry = echo_registry();
        let tracker = InMemoryIssueTracker::new(vec![]);
        let limiter = Arc::new(RateLimiter::new(1000));
        let cancellation = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(16);

        run_agent(
            &provider,
            &registry,
            &tracker,
            &limiter,
            "system",
            "question",
            MAX_ITERATIONS,
            &cancellation,
            &tx,
        )
        .await
        .unwrap();

        assert!(limiter.current_usage().await >= 1);
    }
}
