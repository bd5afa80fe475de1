//! 核心层：错误分类、取消信号、运行状态与日志、监听器、Action 执行器、回退与循环控制

pub mod abort;
pub mod action;
pub mod action_executor;
pub mod error;
pub mod fallback;
pub mod history;
pub mod listener;
pub mod loop_control;
pub mod state;

pub use abort::{AbortController, AbortListenerId, AbortSignal};
pub use action::{Action, ActionContext, ActionResult, ProposedAction};
pub use action_executor::{ActionExecutor, PendingAction, PooledActionExecutor, SyncActionExecutor};
pub use error::{ActionExecutionError, AgentError, ErrorKind};
pub use fallback::{FailFast, FallbackStrategy, Retry, StepOutput, StepRunner};
pub use history::{ActionHistory, ActionRecord, ToolCallEntry, ToolCallTracker};
pub use listener::{ExecutionListener, ListenerId, ListenerSet, RunListener};
pub use loop_control::{LoopControlStrategy, MaxLoopControl};
pub use state::{AgentState, AgentStatus, StateSnapshot};
