//! 运行日志：ActionHistory（动作历史）与 ToolCallTracker（工具调用追踪）
//!
//! 两者都是 append-only，按完成顺序记录；reset 时清空。

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::core::ActionResult;

/// 单条动作记录
#[derive(Clone, Debug, Serialize)]
pub struct ActionRecord {
    pub action: String,
    pub result: ActionResult,
    pub timestamp: DateTime<Utc>,
}

/// 动作历史，仅由驱动 Agent 循环的任务写入
#[derive(Clone, Debug, Default, Serialize)]
pub struct ActionHistory {
    records: Vec<ActionRecord>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action: impl Into<String>, result: ActionResult) {
        self.records.push(ActionRecord {
            action: action.into(),
            result,
            timestamp: Utc::now(),
        });
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&ActionRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// 单次工具调用的追踪条目
#[derive(Clone, Debug, Serialize)]
pub struct ToolCallEntry {
    pub call_id: String,
    pub tool_name: String,
    pub input: Value,
    /// Ok(输出) 或 Err(错误描述)
    pub outcome: Result<Value, String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl ToolCallEntry {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// 工具调用追踪：call_id -> 条目，按完成顺序追加。
/// 批量并行执行时会被多个任务同时写入，因此内部加锁。
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    entries: Mutex<Vec<ToolCallEntry>>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: ToolCallEntry) {
        tracing::debug!(
            call_id = %entry.call_id,
            tool = %entry.tool_name,
            ok = entry.is_success(),
            "tool call tracked"
        );
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    pub fn get(&self, call_id: &str) -> Option<ToolCallEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|e| e.call_id == call_id)
            .cloned()
    }

    /// 按完成顺序的快照
    pub fn entries(&self) -> Vec<ToolCallEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
