//! Bee Engine - Agent 执行引擎
//!
//! 模块划分：
//! - **config**: 引擎配置加载（TOML + 环境变量）
//! - **core**: 错误分类、取消信号、运行状态与日志、监听器、Action 执行器、回退与循环控制
//! - **observability**: tracing 初始化
//! - **react**: ReAct 单步引擎、运行循环、构建器、流式聚合、协作 Agent、过程事件
//! - **tools**: 工具注册表、类型化绑定、执行器与工具动作

pub mod config;
pub mod core;
pub mod observability;
pub mod react;
pub mod tools;

pub use config::{load_config, EngineConfig};
pub use core::{AbortController, AbortSignal, AgentError, AgentState, AgentStatus};
pub use react::{AgentBuilder, AgentRunner, CoordinateAgent, ReActAgent, RunnableAgent};
pub use tools::{Tool, ToolExecutor, ToolRegistry};
