//! Agent 运行状态：状态机 + 循环/重试计数 + 最近错误 + 历史句柄
//!
//! NOT_STARTED -> RUNNING -> {FINISHED, FAILED, TIMEOUT, INTERRUPTED}；
//! 只由驱动该 Agent 循环的任务修改（包括 Retry 的递归路径）。

use std::sync::Arc;

use serde::Serialize;

use crate::core::{ActionHistory, AgentError, ErrorKind, ToolCallTracker};

/// Agent 运行阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    NotStarted,
    Running,
    Finished,
    Failed,
    Timeout,
    Interrupted,
}

impl AgentStatus {
    /// 是否已进入终态
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            AgentStatus::Finished
                | AgentStatus::Failed
                | AgentStatus::Timeout
                | AgentStatus::Interrupted
        )
    }

    /// fail-fast 时按错误大类映射终态
    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Timeout => AgentStatus::Timeout,
            ErrorKind::Interrupted => AgentStatus::Interrupted,
            ErrorKind::Failure => AgentStatus::Failed,
        }
    }
}

/// 运行期状态
#[derive(Debug)]
pub struct AgentState {
    pub status: AgentStatus,
    /// 单次 run 内单调不减
    pub loop_count: usize,
    pub retry_count: usize,
    pub last_error: Option<AgentError>,
    pub history: ActionHistory,
    /// 与 ToolExecutor 共享，批量工具调用会并发写入
    pub tracker: Arc<ToolCallTracker>,
}

impl AgentState {
    pub fn new() -> Self {
        Self {
            status: AgentStatus::NotStarted,
            loop_count: 0,
            retry_count: 0,
            last_error: None,
            history: ActionHistory::new(),
            tracker: Arc::new(ToolCallTracker::new()),
        }
    }

    /// 记录错误并按 ErrorKind 写入终态
    pub fn fail_with(&mut self, err: &AgentError) {
        self.status = AgentStatus::from_error_kind(err.kind());
        self.last_error = Some(err.clone());
    }

    /// 回到 NOT_STARTED，清空计数、错误与历史
    pub fn reset(&mut self) {
        self.status = AgentStatus::NotStarted;
        self.loop_count = 0;
        self.retry_count = 0;
        self.last_error = None;
        self.history.clear();
        self.tracker.clear();
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            status: self.status,
            loop_count: self.loop_count,
            retry_count: self.retry_count,
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
            actions: self.history.len(),
            tool_calls: self.tracker.len(),
        }
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

/// 轻量快照（供事件推送与日志）
#[derive(Clone, Debug, Serialize)]
pub struct StateSnapshot {
    pub status: AgentStatus,
    pub loop_count: usize,
    pub retry_count: usize,
    pub last_error: Option<String>,
    pub actions: usize,
    pub tool_calls: usize,
}
