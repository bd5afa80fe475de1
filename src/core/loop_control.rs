//! 循环控制：决定运行循环是否继续下一步
//!
//! 必须是 AgentState 的纯函数，便于替换为按时长、按预算等其它策略。

use crate::core::AgentState;

pub trait LoopControlStrategy: Send + Sync {
    fn should_continue(&self, state: &AgentState) -> bool;
}

/// 默认策略：未进入终态且 loop_count < max_loop_count
#[derive(Debug, Clone, Copy)]
pub struct MaxLoopControl {
    max_loop_count: usize,
}

impl MaxLoopControl {
    pub fn new(max_loop_count: usize) -> Self {
        Self { max_loop_count }
    }

    pub fn max_loop_count(&self) -> usize {
        self.max_loop_count
    }
}

impl Default for MaxLoopControl {
    fn default() -> Self {
        Self::new(20)
    }
}

impl LoopControlStrategy for MaxLoopControl {
    fn should_continue(&self, state: &AgentState) -> bool {
        !state.status.is_finished() && state.loop_count < self.max_loop_count
    }
}
