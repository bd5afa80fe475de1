//! ReAct 单步引擎
//!
//! think -> (Finish 则直接 generate_output) -> act -> observe -> generate_output。
//! 四个方法是唯一的扩展点，顺序与控制流由 [`react_step`] 固定。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{
    Action, ActionContext, ActionExecutor, ActionHistory, ActionResult, AgentError,
    ProposedAction, StepOutput,
};

/// 推理产出：思考文本 + 下一步动作
#[derive(Debug, Clone)]
pub struct Thought {
    pub text: String,
    pub action: ProposedAction,
}

impl Thought {
    pub fn finish(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            action: ProposedAction::Finish,
        }
    }

    pub fn invoke(text: impl Into<String>, action: impl Action + 'static) -> Self {
        Self {
            text: text.into(),
            action: ProposedAction::invoke(action),
        }
    }
}

/// 动作结果的 Agent 视角摘要
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub text: String,
    pub metadata: HashMap<String, Value>,
}

impl Observation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// 单步上下文：动作上下文（信号、追踪器）、Action 执行器、当前步数
#[derive(Clone)]
pub struct StepContext {
    pub action: ActionContext,
    pub executor: Arc<dyn ActionExecutor>,
    pub loop_count: usize,
}

/// ReAct 风格的 Agent
#[async_trait]
pub trait ReActAgent: Send + Sync {
    type Input: Send + Sync;
    type Output: Clone + Send + Sync;

    fn name(&self) -> &str;

    async fn think(&self, ctx: &StepContext, input: &Self::Input) -> Result<Thought, AgentError>;

    /// 默认经 ActionExecutor 执行；执行器错误统一转 AgentError::ActionExecution
    async fn act(
        &self,
        ctx: &StepContext,
        _input: &Self::Input,
        action: Arc<dyn Action>,
    ) -> Result<ActionResult, AgentError> {
        Ok(ctx.executor.execute(&ctx.action, action).await?)
    }

    /// 默认把 content（失败时为 error）原样作为观察
    async fn observe(
        &self,
        _input: &Self::Input,
        _thought: &Thought,
        result: &ActionResult,
    ) -> Result<Observation, AgentError> {
        let text = if result.success {
            result.content.clone()
        } else {
            result.error.clone().unwrap_or_default()
        };
        Ok(Observation::new(text).with_metadata("success", Value::Bool(result.success)))
    }

    async fn generate_output(
        &self,
        input: &Self::Input,
        thought: &Thought,
        observation: Option<&Observation>,
    ) -> Result<Self::Output, AgentError>;
}

/// 跑一步；成功执行的动作写入 history
pub async fn react_step<A>(
    agent: &A,
    ctx: &StepContext,
    input: &A::Input,
    history: &mut ActionHistory,
) -> Result<StepOutput<A::Output>, AgentError>
where
    A: ReActAgent + ?Sized,
{
    let thought = agent.think(ctx, input).await?;
    tracing::debug!(
        agent = %agent.name(),
        step = ctx.loop_count,
        action = %thought.action.name(),
        "thought"
    );

    let action = match &thought.action {
        ProposedAction::Finish => {
            let output = agent.generate_output(input, &thought, None).await?;
            return Ok(StepOutput::new(output, true));
        }
        ProposedAction::Invoke(action) => Arc::clone(action),
    };

    let result = agent.act(ctx, input, Arc::clone(&action)).await?;
    history.record(action.name(), result.clone());

    let observation = agent.observe(input, &thought, &result).await?;
    let output = agent
        .generate_output(input, &thought, Some(&observation))
        .await?;
    Ok(StepOutput::new(output, false))
}
