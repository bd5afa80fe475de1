//! 引擎配置：从 config/engine.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__AGENT__MAX_LOOP_COUNT=5`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 配置根（对应 config/engine.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub agent: AgentSection,
    pub executor: ExecutorSection,
    pub tools: ToolsSection,
}

/// 单步失败时的回退方式
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    FailFast,
    #[default]
    Retry,
}

/// [agent] 段：循环上限与回退
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_loop_count")]
    pub max_loop_count: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default)]
    pub fallback: FallbackMode,
    /// 每次重试前等待（毫秒），0 表示立即重试
    #[serde(default)]
    pub retry_backoff_ms: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_loop_count: default_max_loop_count(),
            max_retries: default_max_retries(),
            fallback: FallbackMode::default(),
            retry_backoff_ms: 0,
        }
    }
}

fn default_max_loop_count() -> usize {
    20
}

fn default_max_retries() -> usize {
    2
}

/// Action 执行方式
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorMode {
    Sync,
    #[default]
    Pooled,
}

/// [executor] 段：工作池大小与队列深度
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    #[serde(default)]
    pub mode: ExecutorMode,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            mode: ExecutorMode::default(),
            threads: default_threads(),
            queue_depth: default_queue_depth(),
        }
    }
}

fn default_threads() -> usize {
    4
}

fn default_queue_depth() -> usize {
    16
}

/// [tools] 段：工具超时与批量并发
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒），0 表示不限时
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    3
}

/// 加载配置，环境变量 BEE__* 可覆盖
///
/// 1. 按顺序查找 config/engine.toml、../config/engine.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<EngineConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/engine", "../config/engine"] {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
