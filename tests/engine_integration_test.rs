//! 引擎集成测试：运行循环、回退、取消、流式聚合、批量工具与工作池

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bee_engine::core::{
        AbortController, Action, ActionContext, ActionExecutionError, ActionResult,
        AgentError, AgentStatus, MaxLoopControl, PooledActionExecutor,
    };
    use bee_engine::react::{
        message_aggregator, AgentBuilder, AgentRunner, CoordinateAgent, EngineEvent,
        EventForwarder, Observation, ReActAgent, Role, RunnableAgent, StepContext, StreamChunk,
        Thought,
    };
    use bee_engine::tools::{
        EchoTool, Tool, ToolCall, ToolCallAction, ToolError, ToolExecutor, ToolRegistry,
    };
    use bee_engine::EngineConfig;
    use futures_util::stream;
    use serde_json::{json, Value};
    use tokio::sync::{mpsc, Semaphore};

    /// 永不结束，每步调用一次 echo
    struct Looper {
        tools: Arc<ToolExecutor>,
        thinks: AtomicUsize,
    }

    #[async_trait]
    impl ReActAgent for Looper {
        type Input = String;
        type Output = String;

        fn name(&self) -> &str {
            "looper"
        }

        async fn think(&self, ctx: &StepContext, input: &String) -> Result<Thought, AgentError> {
            self.thinks.fetch_add(1, Ordering::SeqCst);
            let call = ToolCall::new("echo", json!({ "text": format!("{input}-{}", ctx.loop_count) }));
            Ok(Thought::invoke(
                "keep going",
                ToolCallAction::new(Arc::clone(&self.tools), call),
            ))
        }

        async fn generate_output(
            &self,
            _input: &String,
            _thought: &Thought,
            observation: Option<&Observation>,
        ) -> Result<String, AgentError> {
            Ok(observation.map(|o| o.text.clone()).unwrap_or_default())
        }
    }

    /// 每次 think 都失败
    struct Broken {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ReActAgent for Broken {
        type Input = String;
        type Output = String;

        fn name(&self) -> &str {
            "broken"
        }

        async fn think(&self, _ctx: &StepContext, _input: &String) -> Result<Thought, AgentError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AgentError::step(format!("attempt {n} failed")))
        }

        async fn generate_output(
            &self,
            _input: &String,
            _thought: &Thought,
            _observation: Option<&Observation>,
        ) -> Result<String, AgentError> {
            unreachable!("think never succeeds")
        }
    }

    /// 先调用一次给定工具，再 Finish；输出由消息片段聚合而成
    struct OneShot {
        tools: Arc<ToolExecutor>,
        tool: &'static str,
    }

    #[async_trait]
    impl ReActAgent for OneShot {
        type Input = String;
        type Output = String;

        fn name(&self) -> &str {
            "one-shot"
        }

        async fn think(&self, ctx: &StepContext, input: &String) -> Result<Thought, AgentError> {
            if ctx.loop_count > 0 {
                return Ok(Thought::finish("answer"));
            }
            let call = ToolCall::new(self.tool, json!({ "text": input }));
            Ok(Thought::invoke(
                "use the tool",
                ToolCallAction::new(Arc::clone(&self.tools), call),
            ))
        }

        async fn generate_output(
            &self,
            input: &String,
            thought: &Thought,
            observation: Option<&Observation>,
        ) -> Result<String, AgentError> {
            let mut chunks = vec![
                StreamChunk::new(Role::Assistant, thought.text.clone()),
                StreamChunk::new(Role::Assistant, ":"),
                StreamChunk::new(Role::Assistant, input.clone()),
            ];
            if let Some(obs) = observation {
                chunks.push(StreamChunk::new(Role::Tool, obs.text.clone()));
            }
            let segments = message_aggregator().aggregate(stream::iter(chunks)).await;
            Ok(segments
                .into_iter()
                .map(|s| s.text)
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }

    /// 等到被取消或超时
    struct Waiting;

    #[async_trait]
    impl Tool for Waiting {
        fn name(&self) -> &str {
            "wait"
        }

        fn description(&self) -> &str {
            "Waits until cancelled"
        }

        async fn run(&self, ctx: &ActionContext, _input: Value) -> Result<Value, ToolError> {
            tokio::select! {
                _ = ctx.signal.cancelled() => {
                    Err(ToolError::Aborted(ctx.signal.reason().unwrap_or_default()))
                }
                _ = tokio::time::sleep(Duration::from_secs(5)) => Ok(Value::Null),
            }
        }
    }

    fn tools(timeout: Option<Duration>) -> Arc<ToolExecutor> {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool::tool());
        registry.register(Waiting);
        Arc::new(ToolExecutor::new(registry, 0).with_timeout(timeout))
    }

    #[tokio::test]
    async fn test_rerun_of_finished_agent_is_idempotent() {
        let mut runner = AgentRunner::new(OneShot {
            tools: tools(None),
            tool: "echo",
        });
        let input = "hi".to_string();
        let first = runner.run(&input).await.unwrap();
        let loops = runner.state().loop_count;

        let second = runner.run(&input).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(runner.state().loop_count, loops);
        assert_eq!(runner.state().status, AgentStatus::Finished);
        assert_eq!(first, "answer:hi");
    }

    #[tokio::test]
    async fn test_loop_bound_runs_exactly_n_steps() {
        let executor = tools(None);
        let mut runner = AgentRunner::new(Looper {
            tools: Arc::clone(&executor),
            thinks: AtomicUsize::new(0),
        })
        .with_loop_control(Arc::new(MaxLoopControl::new(4)));

        let out = runner.run(&"x".to_string()).await.unwrap();
        assert_eq!(out, "x-3");
        assert_eq!(runner.state().loop_count, 4);
        assert_eq!(runner.agent().thinks.load(Ordering::SeqCst), 4);
        assert_eq!(runner.state().status, AgentStatus::Finished);
        assert_eq!(runner.state().history.len(), 4);
        assert_eq!(runner.state().tracker.len(), 4);
    }

    #[tokio::test]
    async fn test_retry_bound_attempts_step_max_plus_one_times() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let mut runner = AgentBuilder::default()
            .with_max_retries(2)
            .build(Broken {
                attempts: Arc::clone(&attempts),
            });

        let err = runner.run(&"x".to_string()).await.unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(runner.state().retry_count, 2);
        assert_eq!(runner.state().status, AgentStatus::Failed);
        assert!(matches!(err, AgentError::AgentExecution { .. }));

        // 终态后返回记录的错误，不再执行
        let again = runner.run(&"x".to_string()).await.unwrap_err();
        assert_eq!(again.to_string(), err.to_string());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_abort_is_idempotent() {
        let controller = AbortController::new();
        let signal = controller.signal();
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let fired = Arc::clone(&fired);
            signal.add_listener(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(controller.abort("first"));
        assert!(!controller.abort("second"));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert!(signal.is_aborted());
        assert_eq!(signal.reason().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_stream_aggregation_keeps_emission_order() {
        let segments = message_aggregator()
            .aggregate(stream::iter(vec![
                StreamChunk::new(Role::Assistant, "A1"),
                StreamChunk::new(Role::Assistant, "A2"),
                StreamChunk::new(Role::User, "B1"),
            ]))
            .await;
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "A1A2");
        assert_eq!(segments[1].text, "B1");
    }

    #[tokio::test]
    async fn test_batch_with_unknown_tool_runs_nothing() {
        let executor = tools(None);
        let ctx = ActionContext::new("batch");
        let err = executor
            .execute_batch(
                &ctx,
                &[
                    ToolCall::new("echo", json!({ "text": "X" })),
                    ToolCall::new("missing", json!({})),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(_)));
        assert!(err.to_string().contains("Tool not found"));
        assert!(ctx.tracker.is_empty());
    }

    /// 通知已开始，然后等待放行
    struct Blocking {
        started: mpsc::UnboundedSender<()>,
        release: Arc<Semaphore>,
    }

    #[async_trait]
    impl Action for Blocking {
        fn name(&self) -> &str {
            "blocking"
        }

        async fn execute(&self, _ctx: &ActionContext) -> Result<ActionResult, AgentError> {
            let _ = self.started.send(());
            let _permit = self
                .release
                .acquire()
                .await
                .map_err(|e| AgentError::step(e.to_string()))?;
            Ok(ActionResult::ok("released"))
        }
    }

    #[tokio::test]
    async fn test_bounded_pool_queues_one_and_rejects_the_next() {
        let pool = PooledActionExecutor::new(1, 1);
        let ctx = ActionContext::new("pool");
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let release = Arc::new(Semaphore::new(0));
        let action = || -> Arc<dyn Action> {
            Arc::new(Blocking {
                started: started_tx.clone(),
                release: Arc::clone(&release),
            })
        };

        let running = pool.submit(&ctx, action()).unwrap();
        started_rx.recv().await.unwrap();
        assert_eq!(pool.queued(), 0);

        let queued = pool.submit(&ctx, action()).unwrap();
        assert_eq!(pool.queued(), 1);

        let rejected = pool.submit(&ctx, action()).unwrap_err();
        assert!(matches!(rejected, ActionExecutionError::Rejected { queue_depth: 1 }));
        assert!(rejected.is_transient());
        assert!(pool.queued() <= pool.queue_depth());

        release.add_permits(2);
        assert!(running.wait().await.unwrap().success);
        assert!(queued.wait().await.unwrap().success);
    }

    #[tokio::test]
    async fn test_tool_timeout_marks_agent_timeout() {
        let mut runner = AgentRunner::new(OneShot {
            tools: tools(Some(Duration::from_millis(20))),
            tool: "wait",
        })
        .fail_fast();
        let err = runner.run(&"x".to_string()).await.unwrap_err();
        assert!(matches!(err.root_cause(), AgentError::ToolTimeout(_)));
        assert_eq!(runner.state().status, AgentStatus::Timeout);
    }

    #[tokio::test]
    async fn test_abort_during_tool_marks_agent_interrupted() {
        let controller = AbortController::new();
        let mut runner = AgentRunner::new(OneShot {
            tools: tools(None),
            tool: "wait",
        })
        .with_signal(controller.signal())
        .fail_fast();

        let abort = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            controller.abort("user cancelled");
        };
        let input = "x".to_string();
        let (result, _) = tokio::join!(runner.run(&input), abort);

        let err = result.unwrap_err();
        assert!(matches!(err.root_cause(), AgentError::Aborted(reason) if reason == "user cancelled"));
        assert_eq!(runner.state().status, AgentStatus::Interrupted);
    }

    #[tokio::test]
    async fn test_pooled_agent_forwards_events() {
        let mut config = EngineConfig::default();
        config.executor.threads = 2;
        config.executor.queue_depth = 4;

        let executor = tools(None);
        let (forwarder, mut events) = EventForwarder::channel();
        executor.add_listener(Arc::new(forwarder.clone()));
        let forwarder = Arc::new(forwarder);

        let mut runner = AgentBuilder::new(config)
            .with_run_listener(forwarder.clone())
            .with_execution_listener(forwarder)
            .build(OneShot {
                tools: executor,
                tool: "echo",
            });
        let out = runner.run(&"ping".to_string()).await.unwrap();
        assert_eq!(out, "answer:ping");
        drop(runner);

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(match event {
                EngineEvent::RunStarted { .. } => "run_started",
                EngineEvent::StepStarted { .. } => "step_started",
                EngineEvent::StepFinished { .. } => "step_finished",
                EngineEvent::ToolCall { .. } => "tool_call",
                EngineEvent::ToolOutput { .. } => "tool_output",
                EngineEvent::ToolFailure { .. } => "tool_failure",
                EngineEvent::RunFinished { status, .. } => {
                    assert_eq!(status, AgentStatus::Finished);
                    "run_finished"
                }
            });
        }
        assert_eq!(
            kinds,
            vec![
                "run_started",
                "step_started",
                "tool_call",
                "tool_output",
                "step_finished",
                "step_started",
                "step_finished",
                "run_finished",
            ]
        );
    }

    #[tokio::test]
    async fn test_coordinate_agent_over_runners() {
        let executor = tools(None);
        let member = |tool: &'static str| {
            AgentRunner::new(OneShot {
                tools: Arc::clone(&executor),
                tool,
            })
        };
        let mut team = CoordinateAgent::new("team", String::new(), |acc: String, out: String| {
            if acc.is_empty() {
                out
            } else {
                format!("{acc}+{out}")
            }
        })
        .with_member(member("echo"))
        .with_member(member("echo"));

        let out = team.run(&"go".to_string()).await.unwrap();
        assert_eq!(out, "answer:go+answer:go");
        assert_eq!(team.status(), AgentStatus::Finished);
    }
}
