//! 运行过程事件：用于向前端（SSE / WebSocket / TUI）推送运行、步骤与工具调用

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::{AgentError, AgentStatus, ExecutionListener, RunListener, StateSnapshot};
use crate::tools::executor::preview;
use crate::tools::{ToolCall, ToolExecuteListener};

/// 过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// run 开始
    RunStarted { agent: String },
    /// 第几步开始
    StepStarted { agent: String, step: usize },
    StepFinished { agent: String, step: usize },
    /// 调用工具
    ToolCall {
        call_id: String,
        tool: String,
        args: Value,
    },
    /// 工具返回（预览，避免过长）
    ToolOutput {
        call_id: String,
        tool: String,
        preview: String,
    },
    ToolFailure {
        call_id: String,
        tool: String,
        reason: String,
    },
    /// run 结束（含失败）
    RunFinished {
        agent: String,
        status: AgentStatus,
        steps: usize,
        retries: usize,
        error: Option<String>,
    },
}

/// 把监听回调转成事件写入 channel；接收端关闭后发送失败只记日志
#[derive(Clone)]
pub struct EventForwarder {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventForwarder {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    /// 新建 channel，返回转发器与接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: EngineEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }
}

impl RunListener for EventForwarder {
    fn before_run(&self, agent: &str) -> anyhow::Result<()> {
        self.send(EngineEvent::RunStarted {
            agent: agent.to_string(),
        })
    }

    fn after_run(
        &self,
        agent: &str,
        state: &StateSnapshot,
        error: Option<&AgentError>,
    ) -> anyhow::Result<()> {
        self.send(EngineEvent::RunFinished {
            agent: agent.to_string(),
            status: state.status,
            steps: state.loop_count,
            retries: state.retry_count,
            error: error.map(|e| e.to_string()),
        })
    }
}

impl ExecutionListener for EventForwarder {
    fn before_step(&self, agent: &str, loop_count: usize) -> anyhow::Result<()> {
        self.send(EngineEvent::StepStarted {
            agent: agent.to_string(),
            step: loop_count,
        })
    }

    fn after_step(&self, agent: &str, loop_count: usize) -> anyhow::Result<()> {
        self.send(EngineEvent::StepFinished {
            agent: agent.to_string(),
            step: loop_count,
        })
    }
}

impl ToolExecuteListener for EventForwarder {
    fn on_input(&self, call: &ToolCall) -> anyhow::Result<()> {
        self.send(EngineEvent::ToolCall {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            args: call.args.clone(),
        })
    }

    fn on_output(&self, call: &ToolCall, output: &Value) -> anyhow::Result<()> {
        self.send(EngineEvent::ToolOutput {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            preview: preview(output),
        })
    }

    fn on_exception(&self, call: &ToolCall, error: &AgentError) -> anyhow::Result<()> {
        self.send(EngineEvent::ToolFailure {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            reason: error.to_string(),
        })
    }
}
