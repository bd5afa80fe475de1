//! 协作 Agent：同一输入并发分发给组内每个成员（fan-out），
//! 按成员顺序用 merge 函数折叠各自输出（fan-in）。
//!
//! 自身也是 RunnableAgent，带同样的终态缓存：成功或失败后重复 run 直接返回缓存结果。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::core::{AgentError, AgentStatus};
use crate::react::{RunnableAgent, StreamOutputAggregator};

/// fan-in 合并函数
pub type MergeFn<O> = Arc<dyn Fn(O, O) -> O + Send + Sync>;

pub struct CoordinateAgent<I, O> {
    name: String,
    members: Vec<Box<dyn RunnableAgent<I, O>>>,
    seed: O,
    merge: MergeFn<O>,
    status: AgentStatus,
    cached: Option<Result<O, AgentError>>,
}

impl<I, O> CoordinateAgent<I, O>
where
    I: Send + Sync,
    O: Clone + Send + Sync,
{
    /// seed 为折叠初值，merge 按成员注册顺序依次合入每个输出
    pub fn new(
        name: impl Into<String>,
        seed: O,
        merge: impl Fn(O, O) -> O + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            seed,
            merge: Arc::new(merge),
            status: AgentStatus::NotStarted,
            cached: None,
        }
    }

    pub fn with_member(mut self, member: impl RunnableAgent<I, O> + 'static) -> Self {
        self.add_member(Box::new(member));
        self
    }

    pub fn add_member(&mut self, member: Box<dyn RunnableAgent<I, O>>) {
        self.members.push(member);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// (成员名, 状态)，按注册顺序
    pub fn member_statuses(&self) -> Vec<(String, AgentStatus)> {
        self.members
            .iter()
            .map(|m| (m.name().to_string(), m.status()))
            .collect()
    }

    async fn fan_out(&mut self, input: &I) -> Result<O, AgentError> {
        if self.members.is_empty() {
            return Err(AgentError::NoOutput(self.name.clone()));
        }
        tracing::debug!(agent = %self.name, members = self.members.len(), "fan-out");

        let results = join_all(self.members.iter_mut().map(|m| m.run(input))).await;

        let mut outputs = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(output) => outputs.push(output),
                // 任一成员失败则整体失败，取注册顺序上的第一个错误
                Err(e) => return Err(e.into_execution(&self.name)),
            }
        }

        let merge = Arc::clone(&self.merge);
        Ok(
            StreamOutputAggregator::new(self.seed.clone(), move |acc: O, output: O| merge(acc, output))
                .aggregate_iter(outputs),
        )
    }
}

#[async_trait]
impl<I, O> RunnableAgent<I, O> for CoordinateAgent<I, O>
where
    I: Send + Sync,
    O: Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> AgentStatus {
        self.status
    }

    async fn run(&mut self, input: &I) -> Result<O, AgentError> {
        if self.status.is_finished() {
            if let Some(cached) = &self.cached {
                return cached.clone();
            }
        }
        self.status = AgentStatus::Running;
        tracing::info!(agent = %self.name, "coordinated run started");

        let result = self.fan_out(input).await;
        self.status = match &result {
            Ok(_) => AgentStatus::Finished,
            Err(e) => AgentStatus::from_error_kind(e.kind()),
        };
        match &result {
            Ok(_) => tracing::info!(agent = %self.name, "coordinated run finished"),
            Err(e) => tracing::warn!(agent = %self.name, status = ?self.status, error = %e, "coordinated run failed"),
        }
        self.cached = Some(result.clone());
        result
    }

    fn reset(&mut self) {
        for member in &mut self.members {
            member.reset();
        }
        self.status = AgentStatus::NotStarted;
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// 睡眠 delay 后返回固定值；记录并发峰值
    struct Fixed {
        name: &'static str,
        reply: Result<String, AgentError>,
        delay: Duration,
        status: AgentStatus,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RunnableAgent<String, String> for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn status(&self) -> AgentStatus {
            self.status
        }

        async fn run(&mut self, input: &String) -> Result<String, AgentError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            let reply = self.reply.clone().map(|r| format!("{r}({input})"));
            self.status = match &reply {
                Ok(_) => AgentStatus::Finished,
                Err(e) => AgentStatus::from_error_kind(e.kind()),
            };
            reply
        }

        fn reset(&mut self) {
            self.status = AgentStatus::NotStarted;
        }
    }

    type Reply = (&'static str, Result<String, AgentError>, u64);

    fn group(replies: Vec<Reply>) -> (CoordinateAgent<String, String>, Arc<AtomicUsize>) {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut coordinator = CoordinateAgent::new("team", String::new(), |acc: String, out: String| {
            if acc.is_empty() {
                out
            } else {
                format!("{acc}|{out}")
            }
        });
        for (name, reply, delay) in replies {
            coordinator.add_member(Box::new(Fixed {
                name,
                reply,
                delay: Duration::from_millis(delay),
                status: AgentStatus::NotStarted,
                active: active.clone(),
                peak: peak.clone(),
            }));
        }
        (coordinator, peak)
    }

    #[tokio::test]
    async fn test_fan_out_runs_concurrently_and_merges_in_member_order() {
        let (mut team, peak) = group(vec![
            ("slow", Ok("a".into()), 40),
            ("fast", Ok("b".into()), 5),
        ]);
        let out = team.run(&"q".to_string()).await.unwrap();
        assert_eq!(out, "a(q)|b(q)");
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(team.status(), AgentStatus::Finished);
        assert!(team
            .member_statuses()
            .iter()
            .all(|(_, s)| *s == AgentStatus::Finished));
    }

    #[tokio::test]
    async fn test_member_failure_fails_group_and_is_cached() {
        let (mut team, _) = group(vec![
            ("ok", Ok("a".into()), 1),
            ("late", Err(AgentError::ToolTimeout("search".into())), 1),
        ]);
        let err = team.run(&"q".to_string()).await.unwrap_err();
        assert!(matches!(err, AgentError::AgentExecution { .. }));
        assert_eq!(team.status(), AgentStatus::Timeout);

        let again = team.run(&"other".to_string()).await.unwrap_err();
        assert_eq!(again.to_string(), err.to_string());

        team.reset();
        assert_eq!(team.status(), AgentStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_empty_group_has_no_output() {
        let (mut team, _) = group(vec![]);
        assert!(team.is_empty());
        let err = team.run(&"q".to_string()).await.unwrap_err();
        assert!(matches!(err, AgentError::NoOutput(_)));
        assert_eq!(team.status(), AgentStatus::Failed);
    }
}
