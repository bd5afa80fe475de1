//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / run），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时加超时、追踪与监听，并统一转 AgentError。
//! 注册表显式构造、显式注入，不存在进程级全局实例。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::ActionContext;
use crate::tools::converter::{JsonConverter, ToolConverter};

/// 工具自身返回的错误：转换失败（工具实际没被执行）与执行失败分开
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("conversion failed: {0}")]
    Conversion(String),
    #[error("{0}")]
    Execution(String),
    /// 工具观察到取消信号后主动退出
    #[error("aborted: {0}")]
    Aborted(String),
}

/// 工具定义（供 LLM 与调度使用）
#[derive(Clone, Debug, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    /// false 表示同名工具的调用必须串行
    pub concurrency_safe: bool,
}

/// 工具 trait：名称、描述、参数 schema、并发安全标记、字符串转换器、异步执行（JSON 输入输出）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认空对象
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    fn is_concurrency_safe(&self) -> bool {
        true
    }

    fn converter(&self) -> &dyn ToolConverter {
        &JsonConverter
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            concurrency_safe: self.is_concurrency_safe(),
        }
    }

    /// 执行工具；取消信号在 ctx.signal 中，是否响应由工具自己决定
    async fn run(&self, ctx: &ActionContext, input: Value) -> Result<Value, ToolError>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool re-registered, previous definition replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// 排序后的工具名
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// 全部工具定义的 JSON，可拼入 system prompt
    pub fn to_schema_json(&self) -> String {
        serde_json::to_string_pretty(&self.definitions()).unwrap_or_else(|_| "[]".to_string())
    }
}
