//! 工具层：注册表、类型化绑定、执行器（超时 / 追踪 / 监听 / 批量）与工具动作

pub mod action;
pub mod converter;
pub mod echo;
pub mod executor;
pub mod registry;

pub use action::{ToolBatchAction, ToolCallAction};
pub use converter::{bind_input, JsonConverter, ToolConverter, TypedTool, TypedToolAdapter};
pub use echo::{EchoArgs, EchoTool};
pub use executor::{ToolCall, ToolCallOutcome, ToolExecuteListener, ToolExecutor};
pub use registry::{Tool, ToolDefinition, ToolError, ToolRegistry};
