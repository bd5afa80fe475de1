//! Agent 构建器：按 EngineConfig 组装循环控制、回退策略、Action 执行器与监听器
//!
//! 工作池可以在多个 Agent 之间共享：先用 [`build_action_executor`] 建一次，再通过
//! `with_action_executor` 注入到每个构建器。

use std::sync::Arc;
use std::time::Duration;

use crate::config::{EngineConfig, ExecutorMode, ExecutorSection, FallbackMode};
use crate::core::{
    AbortSignal, ActionExecutor, ExecutionListener, FailFast, FallbackStrategy, LoopControlStrategy,
    MaxLoopControl, PooledActionExecutor, Retry, RunListener, SyncActionExecutor,
};
use crate::react::{AgentRunner, ReActAgent};

/// 按 [executor] 段创建 Action 执行器；pooled 模式会立即启动 worker，须在 tokio 运行时内调用
pub fn build_action_executor(section: &ExecutorSection) -> Arc<dyn ActionExecutor> {
    match section.mode {
        ExecutorMode::Sync => Arc::new(SyncActionExecutor),
        ExecutorMode::Pooled => {
            Arc::new(PooledActionExecutor::new(section.threads, section.queue_depth))
        }
    }
}

/// Agent 构建器
pub struct AgentBuilder {
    config: EngineConfig,
    loop_control: Option<Arc<dyn LoopControlStrategy>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    signal: AbortSignal,
    run_listeners: Vec<Arc<dyn RunListener>>,
    execution_listeners: Vec<Arc<dyn ExecutionListener>>,
}

impl AgentBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loop_control: None,
            executor: None,
            signal: AbortSignal::never(),
            run_listeners: Vec::new(),
            execution_listeners: Vec::new(),
        }
    }

    /// 覆盖 [agent].max_loop_count
    pub fn with_max_loop_count(mut self, max_loop_count: usize) -> Self {
        self.config.agent.max_loop_count = max_loop_count;
        self
    }

    pub fn with_fallback_mode(mut self, mode: FallbackMode) -> Self {
        self.config.agent.fallback = mode;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.config.agent.max_retries = max_retries;
        self
    }

    /// 自定义循环控制（优先于 max_loop_count）
    pub fn with_loop_control(mut self, loop_control: Arc<dyn LoopControlStrategy>) -> Self {
        self.loop_control = Some(loop_control);
        self
    }

    /// 注入共享的 Action 执行器（优先于 [executor] 段）
    pub fn with_action_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn with_run_listener(mut self, listener: Arc<dyn RunListener>) -> Self {
        self.run_listeners.push(listener);
        self
    }

    pub fn with_execution_listener(mut self, listener: Arc<dyn ExecutionListener>) -> Self {
        self.execution_listeners.push(listener);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn fallback<A: ReActAgent>(&self) -> Arc<dyn FallbackStrategy<A::Input, A::Output>> {
        let agent = &self.config.agent;
        match agent.fallback {
            FallbackMode::FailFast => Arc::new(FailFast),
            FallbackMode::Retry => Arc::new(
                Retry::new(agent.max_retries)
                    .with_backoff(Duration::from_millis(agent.retry_backoff_ms)),
            ),
        }
    }

    /// 组装 AgentRunner；未注入执行器且为 pooled 模式时在此启动工作池
    pub fn build<A: ReActAgent>(self, agent: A) -> AgentRunner<A> {
        let fallback = self.fallback::<A>();
        let loop_control = self
            .loop_control
            .unwrap_or_else(|| Arc::new(MaxLoopControl::new(self.config.agent.max_loop_count)));
        let executor = self
            .executor
            .unwrap_or_else(|| build_action_executor(&self.config.executor));

        tracing::debug!(
            agent = %agent.name(),
            max_loop_count = self.config.agent.max_loop_count,
            fallback = ?self.config.agent.fallback,
            executor = ?self.config.executor.mode,
            "building agent"
        );

        let runner = AgentRunner::new(agent)
            .with_loop_control(loop_control)
            .with_fallback(fallback)
            .with_executor(executor)
            .with_signal(self.signal);
        for listener in self.run_listeners {
            runner.add_run_listener(listener);
        }
        for listener in self.execution_listeners {
            runner.add_execution_listener(listener);
        }
        runner
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
