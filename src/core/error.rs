//! 引擎错误类型
//!
//! 与 FallbackStrategy 配合：按 ErrorKind 把错误归类为 FAILED / TIMEOUT / INTERRUPTED。
//! 所有错误都可 Clone，终态 run 的结果需要缓存并在重复调用时原样返回。

use thiserror::Error;

/// 错误大类，决定 fail-fast 时写入 AgentState 的终态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// 超时类（工具超时、动作超时）
    Timeout,
    /// 中断类（取消、abort、工作线程丢失）
    Interrupted,
    /// 其它失败
    Failure,
}

/// 单个 Action 执行失败：中断、队列拒绝或底层错误
#[derive(Error, Debug, Clone)]
pub enum ActionExecutionError {
    /// 工作池队列已满；属于瞬时错误，可由 Retry 重试
    #[error("Action rejected: worker queue is full (depth {queue_depth})")]
    Rejected { queue_depth: usize },

    #[error("Action interrupted: {0}")]
    Interrupted(String),

    #[error("Action '{action}' failed: {source}")]
    Failed {
        action: String,
        #[source]
        source: Box<AgentError>,
    },
}

impl ActionExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionExecutionError::Rejected { .. } => ErrorKind::Failure,
            ActionExecutionError::Interrupted(_) => ErrorKind::Interrupted,
            ActionExecutionError::Failed { source, .. } => source.kind(),
        }
    }

    /// 队列拒绝是瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(self, ActionExecutionError::Rejected { .. })
    }
}

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error(transparent)]
    ActionExecution(#[from] ActionExecutionError),

    /// 工具已执行但失败
    #[error("Tool '{tool}' execution failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// 输入/输出转换失败，工具未被真正调用
    #[error("Tool '{tool}' argument error: {message}")]
    ToolArgument { tool: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Aborted: {0}")]
    Aborted(String),

    /// think / observe / generate_output 等扩展点返回的错误
    #[error("Step failed: {0}")]
    StepFailed(String),

    /// fallback 用尽后交给调用方的错误
    #[error("Agent '{agent}' execution failed: {source}")]
    AgentExecution {
        agent: String,
        #[source]
        source: Box<AgentError>,
    },

    #[error("Agent '{0}' produced no output")]
    NoOutput(String),
}

impl AgentError {
    pub fn step(message: impl Into<String>) -> Self {
        AgentError::StepFailed(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::ActionExecution(e) => e.kind(),
            AgentError::ToolTimeout(_) => ErrorKind::Timeout,
            AgentError::Aborted(_) => ErrorKind::Interrupted,
            AgentError::AgentExecution { source, .. } => source.kind(),
            _ => ErrorKind::Failure,
        }
    }

    /// 已经是 AgentExecution 时原样返回，否则包装一层
    pub fn into_execution(self, agent: &str) -> Self {
        match self {
            e @ AgentError::AgentExecution { .. } => e,
            other => AgentError::AgentExecution {
                agent: agent.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// 剥掉 AgentExecution 与 Action 失败包装后的根因
    pub fn root_cause(&self) -> &AgentError {
        match self {
            AgentError::AgentExecution { source, .. } => source.root_cause(),
            AgentError::ActionExecution(ActionExecutionError::Failed { source, .. }) => {
                source.root_cause()
            }
            other => other,
        }
    }
}
