//! 字符串 ⇄ JSON 转换与类型化工具绑定
//!
//! TypedTool 通过 serde 把 JSON 参数绑定到具体结构体，schemars 生成参数 Schema，
//! 不需要任何运行时反射；绑定失败归为 ToolError::Conversion。

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::ActionContext;
use crate::tools::{Tool, ToolError};

/// 工具的字符串转换器
pub trait ToolConverter: Send + Sync {
    fn parse_input(&self, raw: &str) -> Result<Value, String>;

    fn format_output(&self, output: &Value) -> Result<String, String>;
}

/// 默认转换器：输入按 JSON 解析（空串视为 {}），字符串输出原样返回，其它输出序列化为 JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonConverter;

impl ToolConverter for JsonConverter {
    fn parse_input(&self, raw: &str) -> Result<Value, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(raw).map_err(|e| format!("invalid JSON input: {e}"))
    }

    fn format_output(&self, output: &Value) -> Result<String, String> {
        match output {
            Value::String(s) => Ok(s.clone()),
            other => serde_json::to_string(other).map_err(|e| e.to_string()),
        }
    }
}

/// 类型化工具：输入输出都是具体类型
#[async_trait]
pub trait TypedTool: Send + Sync {
    type Input: DeserializeOwned + JsonSchema + Send;
    type Output: Serialize + Send;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn is_concurrency_safe(&self) -> bool {
        true
    }

    async fn call(&self, ctx: &ActionContext, input: Self::Input) -> Result<Self::Output, ToolError>;
}

/// 把 TypedTool 适配成 Tool
pub struct TypedToolAdapter<T> {
    inner: T,
}

impl<T: TypedTool> TypedToolAdapter<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

/// 把 JSON 参数绑定到 T
pub fn bind_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::Conversion(e.to_string()))
}

#[async_trait]
impl<T: TypedTool> Tool for TypedToolAdapter<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(T::Input))
            .unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
    }

    fn is_concurrency_safe(&self) -> bool {
        self.inner.is_concurrency_safe()
    }

    async fn run(&self, ctx: &ActionContext, input: Value) -> Result<Value, ToolError> {
        let typed: T::Input = bind_input(input)?;
        let output = self.inner.call(ctx, typed).await?;
        serde_json::to_value(output).map_err(|e| ToolError::Conversion(format!("output: {e}")))
    }
}
