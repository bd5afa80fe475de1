//! Agent 运行循环
//!
//! 状态机 NOT_STARTED -> RUNNING -> {FINISHED, FAILED, TIMEOUT, INTERRUPTED}：
//! - 已处于终态时 run 直接返回缓存结果，不重新执行；需要 reset 才能再跑
//! - 每轮：before_step -> 单步（出错交给 FallbackStrategy）-> loop_count += 1 -> after_step
//! - LoopControlStrategy 返回 false 或某步给出 Finish 时结束
//!
//! 循环本身不轮询取消信号，是否响应取消由各 Action / Tool 自己决定。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::core::{
    AbortSignal, ActionContext, ActionExecutor, AgentError, AgentState, AgentStatus,
    ExecutionListener, FailFast, FallbackStrategy, ListenerId, ListenerSet, LoopControlStrategy,
    MaxLoopControl, Retry, RunListener, StepOutput, StepRunner, SyncActionExecutor,
};
use crate::react::engine::{react_step, ReActAgent, StepContext};

/// 可被外部驱动的 Agent（AgentRunner 与 CoordinateAgent 都实现）
#[async_trait]
pub trait RunnableAgent<I: Sync, O: Send>: Send {
    fn name(&self) -> &str;

    fn status(&self) -> AgentStatus;

    async fn run(&mut self, input: &I) -> Result<O, AgentError>;

    /// 回到 NOT_STARTED，清空状态与缓存结果
    fn reset(&mut self);
}

/// 驱动一个 ReActAgent 的循环
pub struct AgentRunner<A: ReActAgent> {
    agent: A,
    state: AgentState,
    loop_control: Arc<dyn LoopControlStrategy>,
    fallback: Arc<dyn FallbackStrategy<A::Input, A::Output>>,
    executor: Arc<dyn ActionExecutor>,
    run_listeners: ListenerSet<dyn RunListener>,
    execution_listeners: ListenerSet<dyn ExecutionListener>,
    signal: AbortSignal,
    /// 终态时的结果，重复 run 直接返回
    cached: Option<Result<A::Output, AgentError>>,
}

enum StreamPhase<O> {
    Start,
    Looping(Option<O>),
    Done,
}

impl<A: ReActAgent> AgentRunner<A> {
    /// 默认：最多 20 步、重试 2 次、同步执行动作
    pub fn new(agent: A) -> Self {
        Self {
            agent,
            state: AgentState::new(),
            loop_control: Arc::new(MaxLoopControl::default()),
            fallback: Arc::new(Retry::new(2)),
            executor: Arc::new(SyncActionExecutor),
            run_listeners: ListenerSet::new(),
            execution_listeners: ListenerSet::new(),
            signal: AbortSignal::never(),
            cached: None,
        }
    }

    pub fn with_loop_control(mut self, loop_control: Arc<dyn LoopControlStrategy>) -> Self {
        self.loop_control = loop_control;
        self
    }

    pub fn with_fallback(
        mut self,
        fallback: Arc<dyn FallbackStrategy<A::Input, A::Output>>,
    ) -> Self {
        self.fallback = fallback;
        self
    }

    /// 失败即终止
    pub fn fail_fast(self) -> Self {
        self.with_fallback(Arc::new(FailFast))
    }

    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = signal;
        self
    }

    pub fn agent(&self) -> &A {
        &self.agent
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    pub fn add_run_listener(&self, listener: Arc<dyn RunListener>) -> ListenerId {
        self.run_listeners.add(listener)
    }

    pub fn remove_run_listener(&self, id: ListenerId) -> bool {
        self.run_listeners.remove(id)
    }

    pub fn add_execution_listener(&self, listener: Arc<dyn ExecutionListener>) -> ListenerId {
        self.execution_listeners.add(listener)
    }

    pub fn remove_execution_listener(&self, id: ListenerId) -> bool {
        self.execution_listeners.remove(id)
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.cached = None;
    }

    /// 跑到结束，返回最后一步的输出
    pub async fn run(&mut self, input: &A::Input) -> Result<A::Output, AgentError> {
        if let Some(cached) = self.terminal_result() {
            return cached;
        }
        self.begin();

        let mut last = None;
        let result = loop {
            if !self.loop_control.should_continue(&self.state) {
                break self.exhausted(last);
            }
            match self.step_once(input).await {
                Ok(step) if step.finished => {
                    self.state.status = AgentStatus::Finished;
                    break Ok(step.output);
                }
                Ok(step) => last = Some(step.output),
                Err(e) => break Err(e),
            }
        };
        self.complete(result)
    }

    /// 惰性流：每次拉取驱动一步并产出该步输出；终态、监听与缓存与 run 一致。
    /// 已处于终态时只产出一次缓存结果。
    pub fn run_stream<'a>(
        &'a mut self,
        input: &'a A::Input,
    ) -> BoxStream<'a, Result<A::Output, AgentError>> {
        stream::unfold(
            (self, StreamPhase::Start),
            move |(runner, phase)| async move {
                let mut last = match phase {
                    StreamPhase::Done => return None,
                    StreamPhase::Start => {
                        if let Some(cached) = runner.terminal_result() {
                            return Some((cached, (runner, StreamPhase::Done)));
                        }
                        runner.begin();
                        None
                    }
                    StreamPhase::Looping(last) => last,
                };

                if !runner.loop_control.should_continue(&runner.state) {
                    return match runner.exhausted(last.take()) {
                        // 最后一步的输出已经产出过，这里只收尾
                        Ok(output) => {
                            let _ = runner.complete(Ok(output));
                            None
                        }
                        Err(e) => {
                            let result = runner.complete(Err(e));
                            Some((result, (runner, StreamPhase::Done)))
                        }
                    };
                }

                match runner.step_once(input).await {
                    Ok(step) if step.finished => {
                        runner.state.status = AgentStatus::Finished;
                        let result = runner.complete(Ok(step.output));
                        Some((result, (runner, StreamPhase::Done)))
                    }
                    Ok(step) => {
                        let output = step.output.clone();
                        Some((Ok(output), (runner, StreamPhase::Looping(Some(step.output)))))
                    }
                    Err(e) => {
                        let result = runner.complete(Err(e));
                        Some((result, (runner, StreamPhase::Done)))
                    }
                }
            },
        )
        .boxed()
    }

    fn terminal_result(&self) -> Option<Result<A::Output, AgentError>> {
        if !self.state.status.is_finished() {
            return None;
        }
        let cached = match &self.cached {
            Some(result) => result.clone(),
            None => Err(self
                .state
                .last_error
                .clone()
                .unwrap_or_else(|| AgentError::NoOutput(self.agent.name().to_string()))),
        };
        tracing::debug!(agent = %self.agent.name(), status = ?self.state.status, "already finished, returning cached result");
        Some(cached)
    }

    fn begin(&mut self) {
        let name = self.agent.name().to_string();
        self.state.status = AgentStatus::Running;
        tracing::info!(agent = %name, "run started");
        self.run_listeners
            .notify("before_run", |l| l.before_run(&name));
    }

    /// 循环控制结束了循环：有输出则 FINISHED，一步都没跑则 NoOutput
    fn exhausted(&mut self, last: Option<A::Output>) -> Result<A::Output, AgentError> {
        match last {
            Some(output) => {
                if !self.state.status.is_finished() {
                    self.state.status = AgentStatus::Finished;
                }
                Ok(output)
            }
            None => Err(AgentError::NoOutput(self.agent.name().to_string())),
        }
    }

    async fn step_once(
        &mut self,
        input: &A::Input,
    ) -> Result<StepOutput<A::Output>, AgentError> {
        let name = self.agent.name().to_string();
        let step = self.state.loop_count;
        self.execution_listeners
            .notify("before_step", |l| l.before_step(&name, step));

        let result = match self.run_step(input).await {
            Ok(output) => Ok(output),
            Err(cause) => {
                let fallback = Arc::clone(&self.fallback);
                fallback.fallback(self, input, cause).await
            }
        };

        self.state.loop_count += 1;
        let step = self.state.loop_count;
        self.execution_listeners
            .notify("after_step", |l| l.after_step(&name, step));
        result
    }

    /// 写入终态、通知 after_run、缓存结果
    fn complete(&mut self, result: Result<A::Output, AgentError>) -> Result<A::Output, AgentError> {
        let name = self.agent.name().to_string();
        if let Err(e) = &result {
            if !matches!(
                self.state.status,
                AgentStatus::Failed | AgentStatus::Timeout | AgentStatus::Interrupted
            ) {
                self.state.fail_with(e);
            }
        }

        let snapshot = self.state.snapshot();
        match &result {
            Ok(_) => tracing::info!(
                agent = %name,
                status = ?snapshot.status,
                steps = snapshot.loop_count,
                retries = snapshot.retry_count,
                "run finished"
            ),
            Err(e) => tracing::warn!(
                agent = %name,
                status = ?snapshot.status,
                steps = snapshot.loop_count,
                error = %e,
                "run failed"
            ),
        }
        self.run_listeners.notify("after_run", |l| {
            l.after_run(&name, &snapshot, result.as_ref().err())
        });

        self.cached = Some(result.clone());
        result
    }
}

#[async_trait]
impl<A: ReActAgent> StepRunner<A::Input, A::Output> for AgentRunner<A> {
    fn agent_name(&self) -> &str {
        self.agent.name()
    }

    fn state_mut(&mut self) -> &mut AgentState {
        &mut self.state
    }

    async fn run_step(&mut self, input: &A::Input) -> Result<StepOutput<A::Output>, AgentError> {
        let ctx = StepContext {
            action: ActionContext::new(self.agent.name())
                .with_signal(self.signal.clone())
                .with_tracker(Arc::clone(&self.state.tracker)),
            executor: Arc::clone(&self.executor),
            loop_count: self.state.loop_count,
        };
        react_step(&self.agent, &ctx, input, &mut self.state.history).await
    }
}

#[async_trait]
impl<A: ReActAgent> RunnableAgent<A::Input, A::Output> for AgentRunner<A> {
    fn name(&self) -> &str {
        self.agent.name()
    }

    fn status(&self) -> AgentStatus {
        self.state.status
    }

    async fn run(&mut self, input: &A::Input) -> Result<A::Output, AgentError> {
        AgentRunner::run(self, input).await
    }

    fn reset(&mut self) {
        AgentRunner::reset(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Action, ActionResult};
    use crate::react::{Observation, Thought};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Noop;

    #[async_trait]
    impl Action for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        async fn execute(&self, _ctx: &ActionContext) -> Result<ActionResult, AgentError> {
            Ok(ActionResult::ok("ok"))
        }
    }

    /// finish_after 步后给出 Finish；fail_first 次 think 直接报错
    struct Scripted {
        thinks: AtomicUsize,
        finish_after: Option<usize>,
        fail_first: usize,
    }

    impl Scripted {
        fn new(finish_after: Option<usize>) -> Self {
            Self {
                thinks: AtomicUsize::new(0),
                finish_after,
                fail_first: 0,
            }
        }
    }

    #[async_trait]
    impl ReActAgent for Scripted {
        type Input = String;
        type Output = String;

        fn name(&self) -> &str {
            "scripted"
        }

        async fn think(&self, ctx: &StepContext, _input: &String) -> Result<Thought, AgentError> {
            let n = self.thinks.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(AgentError::step(format!("think #{n} failed")));
            }
            match self.finish_after {
                Some(limit) if ctx.loop_count >= limit => Ok(Thought::finish("done")),
                _ => Ok(Thought::invoke("again", Noop)),
            }
        }

        async fn generate_output(
            &self,
            _input: &String,
            thought: &Thought,
            _observation: Option<&Observation>,
        ) -> Result<String, AgentError> {
            Ok(format!("{}#{}", thought.text, self.thinks.load(Ordering::SeqCst)))
        }
    }

    #[derive(Default)]
    struct Trace(Mutex<Vec<String>>);

    impl RunListener for Trace {
        fn before_run(&self, agent: &str) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(format!("before_run:{agent}"));
            Ok(())
        }

        fn after_run(
            &self,
            _agent: &str,
            state: &crate::core::StateSnapshot,
            _error: Option<&AgentError>,
        ) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(format!("after_run:{:?}", state.status));
            anyhow::bail!("after_run listener failure is swallowed")
        }
    }

    impl ExecutionListener for Trace {
        fn before_step(&self, _agent: &str, loop_count: usize) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(format!("before_step:{loop_count}"));
            Ok(())
        }

        fn after_step(&self, _agent: &str, loop_count: usize) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(format!("after_step:{loop_count}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_finish_sentinel_stops_loop() {
        let mut runner = AgentRunner::new(Scripted::new(Some(2)));
        let out = runner.run(&"go".to_string()).await.unwrap();
        assert_eq!(out, "done#3");
        assert_eq!(runner.state().status, AgentStatus::Finished);
        assert_eq!(runner.state().loop_count, 3);
        assert_eq!(runner.state().history.len(), 2);
    }

    struct PanicOnStep;

    impl ExecutionListener for PanicOnStep {
        fn after_step(&self, _agent: &str, _loop_count: usize) -> anyhow::Result<()> {
            panic!("after_step listener bug")
        }
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_alter_run() {
        let mut runner = AgentRunner::new(Scripted::new(Some(0)));
        runner.add_execution_listener(Arc::new(PanicOnStep));

        let out = runner.run(&"go".to_string()).await.unwrap();
        assert_eq!(out, "done#1");
        assert_eq!(runner.state().status, AgentStatus::Finished);
        assert_eq!(runner.state().loop_count, 1);

        // 结果已缓存，再次 run 不会重新执行
        let again = runner.run(&"go".to_string()).await.unwrap();
        assert_eq!(again, out);
        assert_eq!(runner.agent().thinks.load(Ordering::SeqCst), 1);
        assert_eq!(runner.state().loop_count, 1);
    }

    #[tokio::test]
    async fn test_listeners_fire_in_order() {
        let trace = Arc::new(Trace::default());
        let mut runner = AgentRunner::new(Scripted::new(Some(1)));
        runner.add_run_listener(trace.clone());
        runner.add_execution_listener(trace.clone());

        runner.run(&"go".to_string()).await.unwrap();
        let events = trace.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "before_run:scripted",
                "before_step:0",
                "after_step:1",
                "before_step:1",
                "after_step:2",
                "after_run:Finished",
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_recovers_within_one_step() {
        let mut agent = Scripted::new(Some(0));
        agent.fail_first = 1;
        let mut runner = AgentRunner::new(agent);
        let out = runner.run(&"go".to_string()).await.unwrap();
        assert_eq!(out, "done#2");
        assert_eq!(runner.state().retry_count, 1);
        assert_eq!(runner.state().loop_count, 1);
    }

    #[tokio::test]
    async fn test_fail_fast_records_error_and_caches() {
        let mut agent = Scripted::new(None);
        agent.fail_first = usize::MAX;
        let mut runner = AgentRunner::new(agent).fail_fast();

        let err = runner.run(&"go".to_string()).await.unwrap_err();
        assert!(matches!(err, AgentError::AgentExecution { .. }));
        assert_eq!(runner.state().status, AgentStatus::Failed);
        assert!(runner.state().last_error.is_some());

        let thinks = runner.agent().thinks.load(Ordering::SeqCst);
        let again = runner.run(&"go".to_string()).await.unwrap_err();
        assert_eq!(again.to_string(), err.to_string());
        assert_eq!(runner.agent().thinks.load(Ordering::SeqCst), thinks);
    }

    #[tokio::test]
    async fn test_zero_loop_bound_yields_no_output() {
        let mut runner = AgentRunner::new(Scripted::new(None))
            .with_loop_control(Arc::new(MaxLoopControl::new(0)));
        let err = runner.run(&"go".to_string()).await.unwrap_err();
        assert!(matches!(err, AgentError::NoOutput(_)));
        assert_eq!(runner.state().status, AgentStatus::Failed);
    }

    #[tokio::test]
    async fn test_reset_allows_fresh_run() {
        let mut runner = AgentRunner::new(Scripted::new(Some(0)));
        runner.run(&"go".to_string()).await.unwrap();
        runner.reset();
        assert_eq!(runner.state().status, AgentStatus::NotStarted);
        assert_eq!(runner.state().loop_count, 0);
        let out = runner.run(&"go".to_string()).await.unwrap();
        assert_eq!(out, "done#2");
    }

    #[tokio::test]
    async fn test_run_stream_yields_each_step() {
        let mut runner = AgentRunner::new(Scripted::new(Some(2)));
        let input = "go".to_string();
        let outputs: Vec<_> = runner
            .run_stream(&input)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(outputs, vec!["again#1", "again#2", "done#3"]);
        assert_eq!(runner.state().status, AgentStatus::Finished);

        // 终态后只产出缓存结果
        let cached: Vec<_> = runner.run_stream(&input).collect().await;
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].as_ref().unwrap(), "done#3");
    }

    #[tokio::test]
    async fn test_run_stream_loop_bound() {
        let mut runner = AgentRunner::new(Scripted::new(None))
            .with_loop_control(Arc::new(MaxLoopControl::new(2)));
        let input = "go".to_string();
        let outputs: Vec<_> = runner.run_stream(&input).collect().await;
        assert_eq!(outputs.len(), 2);
        assert_eq!(runner.state().status, AgentStatus::Finished);
        assert_eq!(runner.run(&input).await.unwrap(), "again#2");
    }
}
