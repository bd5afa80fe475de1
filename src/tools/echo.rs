//! Echo 工具（测试用）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::core::ActionContext;
use crate::tools::{ToolError, TypedTool, TypedToolAdapter};

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct EchoArgs {
    /// 要回显的文本
    #[serde(default)]
    pub text: Option<String>,
}

/// Echo 工具：回显文本
pub struct EchoTool;

impl EchoTool {
    /// 可直接注册到 ToolRegistry 的形式
    pub fn tool() -> TypedToolAdapter<EchoTool> {
        TypedToolAdapter::new(EchoTool)
    }
}

#[async_trait]
impl TypedTool for EchoTool {
    type Input = EchoArgs;
    type Output = String;

    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text (for testing). Args: {\"text\": \"message\"}"
    }

    async fn call(&self, ctx: &ActionContext, input: EchoArgs) -> Result<String, ToolError> {
        if ctx.signal.is_aborted() {
            return Err(ToolError::Aborted(ctx.signal.reason().unwrap_or_default()));
        }
        Ok(input.text.unwrap_or_else(|| "(empty)".to_string()))
    }
}
