//! 运行层：ReAct 单步引擎、Agent 运行循环、构建器、流式聚合、协作 Agent 与过程事件

pub mod agent;
pub mod builder;
pub mod coordinate;
pub mod engine;
pub mod events;
pub mod stream;

pub use agent::{AgentRunner, RunnableAgent};
pub use builder::{build_action_executor, AgentBuilder};
pub use coordinate::{CoordinateAgent, MergeFn};
pub use engine::{react_step, Observation, ReActAgent, StepContext, Thought};
pub use events::{EngineEvent, EventForwarder};
pub use stream::{
    merge_message_chunk, message_aggregator, MessageAggregator, MessageSegment, Role, StreamChunk,
    StreamOutputAggregator,
};
