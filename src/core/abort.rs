//! 协作式取消：AbortController / AbortSignal
//!
//! 一个 AbortController 独占一个 AbortSignal；signal 可被任意多的 Action / Tool 克隆共享（只读）。
//! abort 只有第一次生效：记录原因、按注册顺序触发监听器各一次，然后清空监听器列表。
//! 运行循环与执行器不会主动轮询，是否响应取消由各 Action / Tool 自己负责。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;

type AbortListener = Box<dyn FnOnce(&str) + Send>;

/// 监听器句柄，用于 remove_listener
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AbortListenerId(u64);

struct SignalInner {
    aborted: AtomicBool,
    reason: OnceLock<String>,
    /// None 表示已触发，不再接受新的监听器
    listeners: Mutex<Option<Vec<(AbortListenerId, AbortListener)>>>,
    next_id: AtomicU64,
    token: CancellationToken,
}

/// 取消信号（只读视图），Clone 开销为一次 Arc 计数
#[derive(Clone)]
pub struct AbortSignal {
    inner: Arc<SignalInner>,
}

impl std::fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .field("reason", &self.reason())
            .finish()
    }
}

impl AbortSignal {
    fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                aborted: AtomicBool::new(false),
                reason: OnceLock::new(),
                listeners: Mutex::new(Some(Vec::new())),
                next_id: AtomicU64::new(0),
                token: CancellationToken::new(),
            }),
        }
    }

    /// 永远不会被取消的信号（无 controller）
    pub fn never() -> Self {
        Self::new()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::Acquire)
    }

    /// 第一次 abort 的原因
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.get().cloned()
    }

    /// 已取消时返回 AgentError::Aborted，供长任务在安全点调用
    pub fn check(&self) -> Result<(), AgentError> {
        if self.is_aborted() {
            Err(AgentError::Aborted(
                self.reason().unwrap_or_else(|| "aborted".to_string()),
            ))
        } else {
            Ok(())
        }
    }

    /// 注册监听器；若信号已触发则不会注册也不会回调，返回 None。
    /// 调用方应在注册前先同步检查 is_aborted()。
    pub fn add_listener<F>(&self, listener: F) -> Option<AbortListenerId>
    where
        F: FnOnce(&str) + Send + 'static,
    {
        let mut guard = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let list = guard.as_mut()?;
        let id = AbortListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        list.push((id, Box::new(listener)));
        Some(id)
    }

    pub fn remove_listener(&self, id: AbortListenerId) -> bool {
        let mut guard = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(list) => {
                let before = list.len();
                list.retain(|(lid, _)| *lid != id);
                list.len() != before
            }
            None => false,
        }
    }

    /// 等待取消；已取消时立即返回
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// 派生的 CancellationToken，便于与 tokio::select! 组合
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    fn fire(&self, reason: String) -> bool {
        // OnceLock::set 即 compare-and-set：只有第一次调用能写入原因
        if self.inner.reason.set(reason.clone()).is_err() {
            return false;
        }
        self.inner.aborted.store(true, Ordering::Release);

        let listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_default();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&reason))).is_err() {
                tracing::warn!(listener = id.0, "Abort listener panicked, continuing");
            }
        }
        self.inner.token.cancel();
        true
    }
}

/// 取消控制器：唯一有权触发 abort 的一方
#[derive(Debug)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: AbortSignal::new(),
        }
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// 触发取消；返回 true 表示本次调用是第一次（真正生效）
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let fired = self.signal.fire(reason.clone());
        if fired {
            tracing::info!(reason = %reason, "Abort signal fired");
        }
        fired
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}
