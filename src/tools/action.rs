//! 把工具调用包装成 Action，供 ReAct 的 think 直接提出

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{Action, ActionContext, ActionResult, AgentError};
use crate::tools::{ToolCall, ToolExecutor};

/// 单个工具调用
pub struct ToolCallAction {
    executor: Arc<ToolExecutor>,
    call: ToolCall,
    /// true 时工具错误变成失败的 ActionResult（作为观察反馈给推理），而不是交给 fallback
    tolerate_failure: bool,
}

impl ToolCallAction {
    pub fn new(executor: Arc<ToolExecutor>, call: ToolCall) -> Self {
        Self {
            executor,
            call,
            tolerate_failure: false,
        }
    }

    pub fn tolerate_failure(mut self, tolerate: bool) -> Self {
        self.tolerate_failure = tolerate;
        self
    }

    pub fn call(&self) -> &ToolCall {
        &self.call
    }
}

#[async_trait]
impl Action for ToolCallAction {
    fn name(&self) -> &str {
        &self.call.name
    }

    async fn execute(&self, ctx: &ActionContext) -> Result<ActionResult, AgentError> {
        ctx.signal.check()?;
        let tool = self
            .executor
            .get_tool(&self.call.name)
            .ok_or_else(|| AgentError::ToolNotFound(self.call.name.clone()))?;
        match self.executor.execute_named(ctx, &self.call).await {
            Ok(value) => {
                let content = tool
                    .converter()
                    .format_output(&value)
                    .map_err(|message| AgentError::ToolArgument {
                        tool: self.call.name.clone(),
                        message,
                    })?;
                Ok(ActionResult::ok(content))
            }
            // 取消不当作可反馈的观察
            Err(e @ AgentError::Aborted(_)) => Err(e),
            Err(e) if self.tolerate_failure => {
                tracing::debug!(tool = %self.call.name, error = %e, "tool failed, reporting as observation");
                Ok(ActionResult::failed(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

/// 一批工具调用：名称先全部解析，随后按并发安全性并行或串行执行。
/// 任一调用失败时整个动作失败（容错模式下汇总为失败结果）。
pub struct ToolBatchAction {
    executor: Arc<ToolExecutor>,
    calls: Vec<ToolCall>,
    tolerate_failure: bool,
}

impl ToolBatchAction {
    pub fn new(executor: Arc<ToolExecutor>, calls: Vec<ToolCall>) -> Self {
        Self {
            executor,
            calls,
            tolerate_failure: false,
        }
    }

    pub fn tolerate_failure(mut self, tolerate: bool) -> Self {
        self.tolerate_failure = tolerate;
        self
    }
}

#[async_trait]
impl Action for ToolBatchAction {
    fn name(&self) -> &str {
        "tool_batch"
    }

    async fn execute(&self, ctx: &ActionContext) -> Result<ActionResult, AgentError> {
        ctx.signal.check()?;
        let outcomes = self.executor.execute_batch(ctx, &self.calls).await?;

        let mut lines = Vec::with_capacity(outcomes.len());
        let mut first_error = None;
        for outcome in outcomes {
            match outcome.result {
                Ok(value) => lines.push(serde_json::json!({
                    "call_id": outcome.call_id,
                    "tool": outcome.tool,
                    "output": value,
                })),
                Err(e) => {
                    lines.push(serde_json::json!({
                        "call_id": outcome.call_id,
                        "tool": outcome.tool,
                        "error": e.to_string(),
                    }));
                    first_error.get_or_insert(e);
                }
            }
        }

        let content = serde_json::Value::Array(lines).to_string();
        match first_error {
            None => Ok(ActionResult::ok(content)),
            Some(e @ AgentError::Aborted(_)) => Err(e),
            Some(e) if self.tolerate_failure => Ok(ActionResult {
                success: false,
                content,
                error: Some(e.to_string()),
            }),
            Some(e) => Err(e),
        }
    }
}
