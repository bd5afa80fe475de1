//! Action 执行器：同步执行 / 有界工作池执行
//!
//! 工作池固定 N 个 worker，队列深度 Q（tokio 有界 mpsc）。提交时队列已满直接拒绝，
//! 返回 ActionExecutionError::Rejected，由 FallbackStrategy 决定是否重试；队列绝不会超过 Q。
//! 调用方 await 到动作完成为止，动作本身在 worker 上执行。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::core::{Action, ActionContext, ActionExecutionError, ActionResult, AgentError};

/// 执行单个 Action；任何底层错误都包装为 ActionExecutionError
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        ctx: &ActionContext,
        action: Arc<dyn Action>,
    ) -> Result<ActionResult, ActionExecutionError>;
}

fn wrap_failure(action: &str, err: AgentError) -> ActionExecutionError {
    match err {
        AgentError::ActionExecution(inner) => inner,
        other => ActionExecutionError::Failed {
            action: action.to_string(),
            source: Box::new(other),
        },
    }
}

/// 在调用方任务上直接执行
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncActionExecutor;

#[async_trait]
impl ActionExecutor for SyncActionExecutor {
    async fn execute(
        &self,
        ctx: &ActionContext,
        action: Arc<dyn Action>,
    ) -> Result<ActionResult, ActionExecutionError> {
        action
            .execute(ctx)
            .await
            .map_err(|e| wrap_failure(action.name(), e))
    }
}

struct Job {
    action: Arc<dyn Action>,
    ctx: ActionContext,
    reply: oneshot::Sender<Result<ActionResult, AgentError>>,
}

/// 已入队、尚未完成的动作
pub struct PendingAction {
    action: String,
    rx: oneshot::Receiver<Result<ActionResult, AgentError>>,
}

impl std::fmt::Debug for PendingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAction")
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

impl PendingAction {
    /// 等待 worker 完成；worker 丢失或工作池关闭视为中断
    pub async fn wait(self) -> Result<ActionResult, ActionExecutionError> {
        match self.rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(wrap_failure(&self.action, e)),
            Err(_) => Err(ActionExecutionError::Interrupted(format!(
                "worker dropped action '{}' before completion",
                self.action
            ))),
        }
    }
}

/// 有界工作池执行器
pub struct PooledActionExecutor {
    tx: mpsc::Sender<Job>,
    threads: usize,
    queue_depth: usize,
    shutdown: CancellationToken,
}

impl PooledActionExecutor {
    /// 启动 threads 个 worker；需在 tokio runtime 内调用
    pub fn new(threads: usize, queue_depth: usize) -> Self {
        let threads = threads.max(1);
        let queue_depth = queue_depth.max(1);
        let (tx, rx) = mpsc::channel::<Job>(queue_depth);
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = CancellationToken::new();

        for worker_id in 0..threads {
            tokio::spawn(worker_loop(worker_id, Arc::clone(&rx), shutdown.clone()));
        }
        tracing::debug!(threads, queue_depth, "action worker pool started");

        Self {
            tx,
            threads,
            queue_depth,
            shutdown,
        }
    }

    /// 入队但不等待；队列满时立即拒绝
    pub fn submit(
        &self,
        ctx: &ActionContext,
        action: Arc<dyn Action>,
    ) -> Result<PendingAction, ActionExecutionError> {
        if self.shutdown.is_cancelled() {
            return Err(ActionExecutionError::Interrupted(
                "worker pool is shut down".to_string(),
            ));
        }
        let name = action.name().to_string();
        let (reply, rx) = oneshot::channel();
        let job = Job {
            action,
            ctx: ctx.clone(),
            reply,
        };
        match self.tx.try_send(job) {
            Ok(()) => Ok(PendingAction { action: name, rx }),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(action = %name, queue_depth = self.queue_depth, "action rejected, queue full");
                Err(ActionExecutionError::Rejected {
                    queue_depth: self.queue_depth,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ActionExecutionError::Interrupted(
                "worker pool is shut down".to_string(),
            )),
        }
    }

    /// 当前排队（未被 worker 取走）的动作数，不超过 queue_depth
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// 停止所有 worker；排队中的动作以 Interrupted 结束
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for PooledActionExecutor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl ActionExecutor for PooledActionExecutor {
    async fn execute(
        &self,
        ctx: &ActionContext,
        action: Arc<dyn Action>,
    ) -> Result<ActionResult, ActionExecutionError> {
        self.submit(ctx, action)?.wait().await
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = async { rx.lock().await.recv().await } => job,
        };
        let Some(Job { action, ctx, reply }) = job else {
            break;
        };
        if reply.is_closed() {
            // 调用方已放弃等待
            continue;
        }
        let name = action.name().to_string();
        let outcome = AssertUnwindSafe(action.execute(&ctx)).catch_unwind().await;
        let result = match outcome {
            Ok(r) => r,
            Err(_) => {
                tracing::warn!(worker_id, action = %name, "action panicked on worker");
                Err(AgentError::StepFailed(format!("action '{name}' panicked")))
            }
        };
        let _ = reply.send(result);
    }
    tracing::debug!(worker_id, "action worker stopped");
}
