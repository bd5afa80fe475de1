//! Action：推理阶段提出的一次有副作用的工作单元

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::{AbortSignal, AgentError, ToolCallTracker};

/// 动作执行结果
#[derive(Clone, Debug, Serialize)]
pub struct ActionResult {
    pub success: bool,
    /// 供 observe 使用的输出文本
    pub content: String,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error.into()),
        }
    }
}

/// 执行上下文：运行中的 Agent 名、取消信号、工具追踪器、附加元数据。
/// 会被发送到工作池，因此只含可廉价克隆的句柄。
#[derive(Clone, Debug)]
pub struct ActionContext {
    pub agent: String,
    pub signal: AbortSignal,
    pub tracker: Arc<ToolCallTracker>,
    pub metadata: HashMap<String, Value>,
}

impl ActionContext {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            signal: AbortSignal::never(),
            tracker: Arc::new(ToolCallTracker::new()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<ToolCallTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// 对执行器不透明的动作
#[async_trait]
pub trait Action: Send + Sync {
    /// 动作名称（写入 ActionHistory）
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &ActionContext) -> Result<ActionResult, AgentError>;
}

/// think 提出的下一步：结束，或调用某个动作
#[derive(Clone)]
pub enum ProposedAction {
    Finish,
    Invoke(Arc<dyn Action>),
}

impl ProposedAction {
    pub fn invoke(action: impl Action + 'static) -> Self {
        ProposedAction::Invoke(Arc::new(action))
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, ProposedAction::Finish)
    }

    pub fn name(&self) -> &str {
        match self {
            ProposedAction::Finish => "finish",
            ProposedAction::Invoke(a) => a.name(),
        }
    }
}

impl std::fmt::Debug for ProposedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProposedAction::Finish => f.write_str("Finish"),
            ProposedAction::Invoke(a) => f.debug_tuple("Invoke").field(&a.name()).finish(),
        }
    }
}
