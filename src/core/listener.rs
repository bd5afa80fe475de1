//! 运行监听器：RunListener（run 前后）、ExecutionListener（每一步前后）
//!
//! 监听器可在运行中动态注册/注销；通知时先取快照再逐个调用，
//! 监听器返回错误或 panic 都只记日志，永远不影响控制流。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::{AgentError, StateSnapshot};

/// run 生命周期监听
pub trait RunListener: Send + Sync {
    fn before_run(&self, _agent: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// error 为 None 表示正常结束
    fn after_run(&self, _agent: &str, _state: &StateSnapshot, _error: Option<&AgentError>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 单步执行监听
pub trait ExecutionListener: Send + Sync {
    fn before_step(&self, _agent: &str, _loop_count: usize) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_step(&self, _agent: &str, _loop_count: usize) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 监听器句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// 监听器集合，按注册顺序通知
pub struct ListenerSet<L: ?Sized> {
    listeners: Mutex<Vec<(ListenerId, Arc<L>)>>,
    next_id: AtomicU64,
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut guard = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = guard.len();
        guard.retain(|(lid, _)| *lid != id);
        guard.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 通知时的快照；回调期间注册/注销不影响本轮
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }

    /// 逐个调用，失败或 panic 记 warn 后继续
    pub fn notify<F>(&self, hook: &str, mut f: F)
    where
        F: FnMut(&L) -> anyhow::Result<()>,
    {
        for listener in self.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(hook, error = %e, "listener failed, ignoring"),
                Err(_) => tracing::warn!(hook, "listener panicked, ignoring"),
            }
        }
    }
}
