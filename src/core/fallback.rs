//! 失败回退策略：单步出错时决定重试还是终止
//!
//! - FailFast：按 ErrorKind 写入终态，记录 last_error，包装为 AgentExecution 后返回
//! - Retry：retry_count（AgentState 上的共享计数）未达上限时 +1 并用同一输入重跑这一步，
//!   否则交给 FailFast

use std::time::Duration;

use async_trait::async_trait;

use crate::core::{AgentError, AgentState};

/// 单步产出：输出值，以及这一步是否给出了 Finish
#[derive(Clone, Debug)]
pub struct StepOutput<O> {
    pub output: O,
    pub finished: bool,
}

impl<O> StepOutput<O> {
    pub fn new(output: O, finished: bool) -> Self {
        Self { output, finished }
    }
}

/// fallback 可以驱动的「一步」：由运行循环实现
#[async_trait]
pub trait StepRunner<I, O>: Send {
    fn agent_name(&self) -> &str;

    fn state_mut(&mut self) -> &mut AgentState;

    async fn run_step(&mut self, input: &I) -> Result<StepOutput<O>, AgentError>;
}

/// 单步失败时的回退策略
#[async_trait]
pub trait FallbackStrategy<I: Sync, O: Send>: Send + Sync {
    async fn fallback(
        &self,
        agent: &mut (dyn StepRunner<I, O> + '_),
        input: &I,
        cause: AgentError,
    ) -> Result<StepOutput<O>, AgentError>;
}

/// 直接失败
#[derive(Debug, Default, Clone, Copy)]
pub struct FailFast;

#[async_trait]
impl<I: Sync, O: Send> FallbackStrategy<I, O> for FailFast {
    async fn fallback(
        &self,
        agent: &mut (dyn StepRunner<I, O> + '_),
        _input: &I,
        cause: AgentError,
    ) -> Result<StepOutput<O>, AgentError> {
        let name = agent.agent_name().to_string();
        let err = cause.into_execution(&name);
        let state = agent.state_mut();
        state.fail_with(&err);
        tracing::error!(agent = %name, status = ?state.status, error = %err, "step failed, giving up");
        Err(err)
    }
}

/// 有上限的重试
#[derive(Debug, Clone)]
pub struct Retry {
    max_retries: usize,
    backoff: Duration,
}

impl Retry {
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            backoff: Duration::ZERO,
        }
    }

    /// 每次重试前等待固定时长（如工作池拒绝后给队列腾出空间）
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }
}

#[async_trait]
impl<I: Sync, O: Send> FallbackStrategy<I, O> for Retry {
    async fn fallback(
        &self,
        agent: &mut (dyn StepRunner<I, O> + '_),
        input: &I,
        cause: AgentError,
    ) -> Result<StepOutput<O>, AgentError> {
        let state = agent.state_mut();
        if state.retry_count >= self.max_retries {
            return FallbackStrategy::<I, O>::fallback(&FailFast, agent, input, cause).await;
        }
        state.retry_count += 1;
        let attempt = state.retry_count;
        tracing::warn!(
            agent = %agent.agent_name(),
            attempt,
            max_retries = self.max_retries,
            error = %cause,
            "step failed, retrying"
        );
        if !self.backoff.is_zero() {
            tokio::time::sleep(self.backoff).await;
        }
        match agent.run_step(input).await {
            Ok(output) => Ok(output),
            Err(e) => FallbackStrategy::<I, O>::fallback(self, agent, input, e).await,
        }
    }
}
