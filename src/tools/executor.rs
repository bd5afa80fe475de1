//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，每次调用：
//! - 非并发安全的工具按工具名加互斥锁，同名调用串行
//! - 触发 on_input / on_output / on_exception 监听（失败只记日志）
//! - 超时转 ToolTimeout，工具错误转 ToolExecution / ToolArgument
//! - 写入 ToolCallTracker，并输出结构化审计日志（JSON）
//!
//! 批量执行先解析全部工具名，有任何一个找不到则一个都不执行。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::ToolsSection;
use crate::core::{ActionContext, AgentError, ListenerId, ListenerSet, ToolCallEntry};
use crate::tools::{Tool, ToolError, ToolRegistry};

/// 默认批量并行上限
const DEFAULT_MAX_CONCURRENT: usize = 3;
/// 审计日志与过程事件中预览的最大字符数
pub(crate) const PREVIEW_CHARS: usize = 200;

/// 一次工具调用请求
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            args,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// 批量执行中单个调用的结果
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub call_id: String,
    pub tool: String,
    pub result: Result<Value, AgentError>,
}

/// 工具调用监听
pub trait ToolExecuteListener: Send + Sync {
    fn on_input(&self, _call: &ToolCall) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_output(&self, _call: &ToolCall, _output: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_exception(&self, _call: &ToolCall, _error: &AgentError) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 工具执行器
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Option<Duration>,
    listeners: ListenerSet<dyn ToolExecuteListener>,
    /// 非并发安全工具的按名互斥锁
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// 批量并行许可
    permits: Semaphore,
}

impl ToolExecutor {
    /// timeout_secs 为 0 表示不限时
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::from_shared(Arc::new(registry), timeout_secs)
    }

    pub fn from_shared(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            listeners: ListenerSet::new(),
            locks: Mutex::new(HashMap::new()),
            permits: Semaphore::new(DEFAULT_MAX_CONCURRENT),
        }
    }

    /// 按 [tools] 配置段构建
    pub fn from_config(registry: Arc<ToolRegistry>, section: &ToolsSection) -> Self {
        Self::from_shared(registry, section.timeout_secs).with_max_concurrent(section.max_concurrent)
    }

    /// 批量并行执行时的最大并发数
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.permits = Semaphore::new(max_concurrent.max(1));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn add_listener(&self, listener: Arc<dyn ToolExecuteListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// 执行工具（JSON 输入输出）
    pub async fn execute(
        &self,
        ctx: &ActionContext,
        tool: &Arc<dyn Tool>,
        input: Value,
    ) -> Result<Value, AgentError> {
        let call = ToolCall::new(tool.name(), input);
        self.execute_call(ctx, tool, &call).await
    }

    /// 执行工具（字符串输入输出），经工具自带的转换器；转换失败为 ToolArgument
    pub async fn execute_str(
        &self,
        ctx: &ActionContext,
        tool: &Arc<dyn Tool>,
        input: &str,
    ) -> Result<String, AgentError> {
        let converter = tool.converter();
        let value = converter
            .parse_input(input)
            .map_err(|message| AgentError::ToolArgument {
                tool: tool.name().to_string(),
                message,
            })?;
        let output = self.execute(ctx, tool, value).await?;
        converter
            .format_output(&output)
            .map_err(|message| AgentError::ToolArgument {
                tool: tool.name().to_string(),
                message,
            })
    }

    /// 按名执行已构造好的 ToolCall
    pub async fn execute_named(
        &self,
        ctx: &ActionContext,
        call: &ToolCall,
    ) -> Result<Value, AgentError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        self.execute_call(ctx, &tool, call).await
    }

    /// 批量执行：先全部解析，任何工具不存在则直接失败、零调用；
    /// 全部并发安全时并行（受 permits 限制），否则串行。结果按请求顺序返回。
    pub async fn execute_batch(
        &self,
        ctx: &ActionContext,
        calls: &[ToolCall],
    ) -> Result<Vec<ToolCallOutcome>, AgentError> {
        let mut resolved = Vec::with_capacity(calls.len());
        for call in calls {
            let tool = self
                .registry
                .get(&call.name)
                .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
            resolved.push((tool, call));
        }

        let parallel = resolved.iter().all(|(tool, _)| tool.is_concurrency_safe());
        tracing::debug!(calls = resolved.len(), parallel, "executing tool batch");

        if parallel {
            let futures = resolved.into_iter().map(|(tool, call)| async move {
                let _permit = self.permits.acquire().await.ok();
                ToolCallOutcome {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    result: self.execute_call(ctx, &tool, call).await,
                }
            });
            Ok(join_all(futures).await)
        } else {
            let mut outcomes = Vec::with_capacity(resolved.len());
            for (tool, call) in resolved {
                outcomes.push(ToolCallOutcome {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    result: self.execute_call(ctx, &tool, call).await,
                });
            }
            Ok(outcomes)
        }
    }

    fn tool_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    async fn execute_call(
        &self,
        ctx: &ActionContext,
        tool: &Arc<dyn Tool>,
        call: &ToolCall,
    ) -> Result<Value, AgentError> {
        let _guard = if tool.is_concurrency_safe() {
            None
        } else {
            Some(self.tool_lock(tool.name()).lock_owned().await)
        };

        self.listeners.notify("on_input", |l| l.on_input(call));

        let started_at = Utc::now();
        let start = Instant::now();
        let run = tool.run(ctx, call.args.clone());
        let raw = match self.timeout {
            Some(limit) => timeout(limit, run).await.ok(),
            None => Some(run.await),
        };
        let result = match raw {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(map_tool_error(tool.name(), e)),
            None => Err(AgentError::ToolTimeout(tool.name().to_string())),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AgentError::ToolTimeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "call_id": call.id,
            "tool": tool.name(),
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview(&call.args),
        });
        tracing::info!(audit = %audit, "tool");

        ctx.tracker.record(ToolCallEntry {
            call_id: call.id.clone(),
            tool_name: tool.name().to_string(),
            input: call.args.clone(),
            outcome: result
                .as_ref()
                .cloned()
                .map_err(|e| e.to_string()),
            started_at,
            ended_at: Utc::now(),
        });

        match &result {
            Ok(output) => self.listeners.notify("on_output", |l| l.on_output(call, output)),
            Err(e) => self.listeners.notify("on_exception", |l| l.on_exception(call, e)),
        }
        result
    }
}

fn map_tool_error(tool: &str, err: ToolError) -> AgentError {
    match err {
        ToolError::Conversion(message) => AgentError::ToolArgument {
            tool: tool.to_string(),
            message,
        },
        ToolError::Execution(message) => AgentError::ToolExecution {
            tool: tool.to_string(),
            message,
        },
        ToolError::Aborted(reason) => AgentError::Aborted(reason),
    }
}

/// 截断到 PREVIEW_CHARS 个字符，字符串值不带引号
pub(crate) fn preview(value: &Value) -> String {
    let s = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if s.chars().count() > PREVIEW_CHARS {
        format!("{}...", s.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}
