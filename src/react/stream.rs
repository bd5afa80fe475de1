//! 流式输出聚合
//!
//! 一个流式步骤产生的片段按发出顺序折叠成唯一的最终输出。
//! 聚合器按值消费（`aggregate(self, ..)`），因此每步必须新建一个，不可重启。

use futures_util::{pin_mut, Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// 片段折叠器：初始值 + reducer
pub struct StreamOutputAggregator<T, F> {
    seed: T,
    reducer: F,
}

impl<T, F> StreamOutputAggregator<T, F> {
    pub fn new(seed: T, reducer: F) -> Self {
        Self { seed, reducer }
    }

    /// 消费整个（有限）流，返回折叠结果
    pub async fn aggregate<S, P>(self, stream: S) -> T
    where
        S: Stream<Item = P>,
        F: FnMut(T, P) -> T,
    {
        let Self { mut seed, mut reducer } = self;
        pin_mut!(stream);
        while let Some(part) = stream.next().await {
            seed = reducer(seed, part);
        }
        seed
    }

    /// 片段可能失败的流：遇到第一个错误即停止，已折叠的部分丢弃
    pub async fn try_aggregate<S, P, E>(self, stream: S) -> Result<T, E>
    where
        S: Stream<Item = Result<P, E>>,
        F: FnMut(T, P) -> T,
    {
        let Self { mut seed, mut reducer } = self;
        pin_mut!(stream);
        while let Some(part) = stream.next().await {
            seed = reducer(seed, part?);
        }
        Ok(seed)
    }

    /// 同步版本
    pub fn aggregate_iter<I, P>(self, parts: I) -> T
    where
        I: IntoIterator<Item = P>,
        F: FnMut(T, P) -> T,
    {
        parts.into_iter().fold(self.seed, self.reducer)
    }
}

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 一个流式消息片段
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub role: Role,
    /// 消息标识（如 tool call id），同角色不同 id 也会分段
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    /// true 表示从本片段开始新的一段
    #[serde(default)]
    pub boundary: bool,
}

impl StreamChunk {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            id: None,
            text: text.into(),
            boundary: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn boundary(mut self) -> Self {
        self.boundary = true;
        self
    }
}

/// 聚合后的一段完整消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageSegment {
    pub role: Role,
    pub id: Option<String>,
    pub text: String,
}

/// 消息 reducer：相邻且角色与 id 相同的片段拼接；角色/id 变化或显式边界开始新段
pub fn merge_message_chunk(
    mut segments: Vec<MessageSegment>,
    chunk: StreamChunk,
) -> Vec<MessageSegment> {
    match segments.last_mut() {
        Some(last) if !chunk.boundary && last.role == chunk.role && last.id == chunk.id => {
            last.text.push_str(&chunk.text);
        }
        _ => segments.push(MessageSegment {
            role: chunk.role,
            id: chunk.id,
            text: chunk.text,
        }),
    }
    segments
}

/// 消息流聚合器
pub type MessageAggregator =
    StreamOutputAggregator<Vec<MessageSegment>, fn(Vec<MessageSegment>, StreamChunk) -> Vec<MessageSegment>>;

pub fn message_aggregator() -> MessageAggregator {
    StreamOutputAggregator::new(Vec::new(), merge_message_chunk as fn(_, _) -> _)
}
