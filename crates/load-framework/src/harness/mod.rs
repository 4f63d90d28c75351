/*
Copyright 2024-2025 The Spice.ai OSS Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use anyhow::Result;
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::{AbortHandle, JoinHandle};

use crate::{
    message::random_recipient,
    metrics::{AggregateReport, RunExport},
    outcome::{OutcomeRecord, TaskDescriptor},
    transport::Transport,
};

mod dispatcher;
mod progress;

use dispatcher::Dispatcher;
use progress::ProgressPrinter;

pub struct NotStarted {
    tasks: Vec<TaskDescriptor>,
}

pub struct Running {
    start_time: Instant,
    dispatcher: JoinHandle<Vec<OutcomeRecord>>,
    progress_bar: Option<ProgressBar>,
}

pub struct Completed {
    records: Vec<OutcomeRecord>,
    test_duration: Duration,
    end_time: SystemTime,
}

pub trait TestState {}

impl TestState for NotStarted {}
impl TestState for Running {}
impl TestState for Completed {}

/// A load test sends a fixed number of messages through a [`Transport`], at most
/// `concurrency` at a time, and records exactly one [`OutcomeRecord`] per message.
pub struct LoadTest<S: TestState> {
    name: String,
    transport: Arc<dyn Transport>,
    concurrency: usize,
    start_time: SystemTime,
    use_progress_bars: bool,

    state: S,
}

impl LoadTest<NotStarted> {
    /// Prepare `total` tasks, numbered `1..=total`, each addressed to a fresh random recipient.
    #[must_use]
    pub fn new(name: String, transport: Arc<dyn Transport>, total: usize) -> Self {
        let tasks = (1..=total)
            .map(|sequence_number| TaskDescriptor::new(sequence_number, random_recipient()))
            .collect();

        Self {
            name,
            transport,
            concurrency: 1,
            start_time: SystemTime::now(),
            use_progress_bars: true,
            state: NotStarted { tasks },
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_progress_bars(mut self, use_progress_bars: bool) -> Self {
        self.use_progress_bars = use_progress_bars;
        self
    }

    /// The number of workers actually used: never more than there are tasks.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.min(self.state.tasks.len())
    }

    fn get_new_progress_bar(&self) -> ProgressBar {
        let pb = ProgressBar::new(self.state.tasks.len() as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(250));
        pb
    }

    pub fn start(self) -> Result<LoadTest<Running>> {
        if self.state.tasks.is_empty() {
            return Err(anyhow::anyhow!("Message count must be greater than 0"));
        }

        if self.concurrency == 0 {
            return Err(anyhow::anyhow!("Concurrency must be greater than 0"));
        }

        let progress_bar = self.use_progress_bars.then(|| self.get_new_progress_bar());
        let workers = self.effective_concurrency();
        tracing::debug!(
            name = %self.name,
            tasks = self.state.tasks.len(),
            workers,
            "starting load test"
        );

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.transport),
            self.state.tasks,
            workers,
            ProgressPrinter::new(progress_bar.clone()),
        )
        .start();

        Ok(LoadTest {
            name: self.name,
            transport: self.transport,
            concurrency: self.concurrency,
            start_time: self.start_time,
            use_progress_bars: self.use_progress_bars,
            state: Running {
                start_time: Instant::now(),
                dispatcher,
                progress_bar,
            },
        })
    }
}

/// Stops a running test from outside, e.g. on an interrupt.
#[derive(Clone)]
pub struct AbandonHandle {
    dispatcher: AbortHandle,
    progress_bar: Option<ProgressBar>,
}

impl AbandonHandle {
    /// Stop dispatching and printing. Sends already in flight are left to finish unobserved.
    pub fn abandon(&self) {
        self.dispatcher.abort();
        if let Some(pb) = &self.progress_bar {
            pb.finish_and_clear();
        }
    }
}

impl LoadTest<Running> {
    #[must_use]
    pub fn abandon_handle(&self) -> AbandonHandle {
        AbandonHandle {
            dispatcher: self.state.dispatcher.abort_handle(),
            progress_bar: self.state.progress_bar.clone(),
        }
    }

    /// Block until every task has produced its record.
    pub async fn wait(self) -> Result<LoadTest<Completed>> {
        let records = self.state.dispatcher.await?;

        if let Some(pb) = self.state.progress_bar {
            pb.finish_and_clear();
        }

        Ok(LoadTest {
            name: self.name,
            transport: self.transport,
            concurrency: self.concurrency,
            start_time: self.start_time,
            use_progress_bars: self.use_progress_bars,
            state: Completed {
                records,
                test_duration: self.state.start_time.elapsed(),
                end_time: SystemTime::now(),
            },
        })
    }
}

impl LoadTest<Completed> {
    /// Records in completion order.
    #[must_use]
    pub fn records(&self) -> &[OutcomeRecord] {
        &self.state.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<OutcomeRecord> {
        self.state.records
    }

    #[must_use]
    pub fn report(&self) -> AggregateReport {
        AggregateReport::from_records(&self.state.records)
    }

    #[must_use]
    pub fn get_test_duration(&self) -> Duration {
        self.state.test_duration
    }

    #[must_use]
    pub fn end_time(&self) -> SystemTime {
        self.state.end_time
    }

    #[must_use]
    pub fn export<'a>(&'a self, report: &'a AggregateReport) -> RunExport<'a> {
        RunExport {
            transport: self.transport.kind().to_string(),
            started_at: DateTime::<Local>::from(self.start_time).to_rfc3339(),
            duration_ms: self.state.test_duration.as_secs_f64() * 1000.0,
            concurrency: self.concurrency.min(self.state.records.len()),
            report,
            records: &self.state.records,
        }
    }
}

impl std::fmt::Display for LoadTest<Completed> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LoadTest: {} - {} messages over {} {} workers in {:.2} seconds",
            self.name,
            self.state.records.len(),
            self.concurrency.min(self.state.records.len()),
            self.transport.kind(),
            self.get_test_duration().as_secs_f32()
        )
    }
}

/// Send `total` messages through `transport` with at most `concurrency` in flight, returning
/// one record per message once all of them have completed.
pub async fn run(
    total: usize,
    concurrency: usize,
    transport: Arc<dyn Transport>,
) -> Result<Vec<OutcomeRecord>> {
    let test = LoadTest::new("load".to_string(), transport, total)
        .with_concurrency(concurrency)
        .with_progress_bars(false)
        .start()?
        .wait()
        .await?;
    Ok(test.into_records())
}

#[cfg(test)]
mod test {
    use std::{
        collections::BTreeSet,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{outcome::OutcomeStatus, TransportKind};

    /// Tracks how many sends overlap and fails or panics on chosen sequence numbers.
    #[derive(Default)]
    struct ScriptedTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
        fail_every: Option<usize>,
        panic_on: Option<usize>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Http
        }

        async fn send(&self, task: &TaskDescriptor) -> OutcomeRecord {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panic_on == Some(task.sequence_number) {
                panic!("injected worker fault");
            }

            match self.fail_every {
                Some(n) if task.sequence_number % n == 0 => {
                    OutcomeRecord::failure(task, 1.0, "HTTP 503: unavailable")
                }
                _ => OutcomeRecord::success(task, 1.0),
            }
        }

        async fn probe(&self) -> Result<()> {
            Ok(())
        }
    }

    fn sequence_numbers(records: &[OutcomeRecord]) -> BTreeSet<usize> {
        records.iter().map(|r| r.sequence_number).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_task_yields_exactly_one_record() {
        for (total, concurrency) in [(1, 1), (1, 8), (7, 3), (25, 5), (40, 40), (12, 100)] {
            let transport = Arc::new(ScriptedTransport {
                fail_every: Some(4),
                ..Default::default()
            });
            let records = run(total, concurrency, transport)
                .await
                .expect("run should complete");

            assert_eq!(records.len(), total);
            assert_eq!(
                sequence_numbers(&records),
                (1..=total).collect::<BTreeSet<_>>()
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        for (total, concurrency) in [(20, 3), (4, 10), (9, 1)] {
            let transport = Arc::new(ScriptedTransport {
                delay: Duration::from_millis(20),
                ..Default::default()
            });
            let records = run(total, concurrency, Arc::clone(&transport) as Arc<dyn Transport>)
                .await
                .expect("run should complete");

            assert_eq!(records.len(), total);
            let peak = transport.peak.load(Ordering::SeqCst);
            assert!(peak >= 1);
            assert!(
                peak <= concurrency.min(total),
                "peak {peak} exceeded min({concurrency}, {total})"
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_fault_becomes_fail_record() {
        let transport = Arc::new(ScriptedTransport {
            panic_on: Some(3),
            ..Default::default()
        });
        let records = run(6, 2, transport).await.expect("run should complete");

        assert_eq!(records.len(), 6);
        assert_eq!(sequence_numbers(&records), (1..=6).collect::<BTreeSet<_>>());

        let faulted = records
            .iter()
            .find(|r| r.sequence_number == 3)
            .expect("faulted task should still be recorded");
        assert_eq!(faulted.status, OutcomeStatus::Fail);
        assert!((faulted.elapsed_ms - 0.0).abs() < f64::EPSILON);
        assert!(faulted.error_detail.is_some());
        assert!(faulted.recipient_address.contains('@'));

        let report = AggregateReport::from_records(&records);
        assert_eq!(report.success_count, 5);
        assert_eq!(report.fail_count, 1);
        assert_ne!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_all_successes_exit_zero() {
        let transport = Arc::new(ScriptedTransport::default());
        let test = LoadTest::new("all-ok".to_string(), transport, 10)
            .with_concurrency(3)
            .with_progress_bars(false)
            .start()
            .expect("test should start")
            .wait()
            .await
            .expect("test should complete");

        let report = test.report();
        assert_eq!(report.success_count, 10);
        assert_eq!(report.fail_count, 0);
        assert_eq!(report.exit_code(), 0);
        assert!(test.to_string().starts_with("LoadTest: all-ok - 10 messages over 3 HTTP workers"));

        let export = serde_json::to_value(test.export(&report)).expect("export should serialize");
        assert_eq!(export["transport"], "HTTP");
        assert_eq!(export["records"].as_array().map(Vec::len), Some(10));
        assert_eq!(export["report"]["fail_count"], 0);
    }

    #[tokio::test]
    async fn test_abandoned_test_stops_dispatching() {
        let transport = Arc::new(ScriptedTransport {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let test = LoadTest::new(
            "abandoned".to_string(),
            Arc::clone(&transport) as Arc<dyn Transport>,
            50,
        )
        .with_concurrency(2)
        .with_progress_bars(false)
        .start()
        .expect("test should start");

        let handle = test.abandon_handle();
        handle.abandon();
        handle.abandon();

        assert!(test.wait().await.is_err());
        assert!(transport.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_recipients_are_assigned_per_task() {
        let test = LoadTest::new("ids".to_string(), Arc::new(ScriptedTransport::default()), 5)
            .with_concurrency(8);
        assert_eq!(test.effective_concurrency(), 5);
        assert_eq!(
            test.state
                .tasks
                .iter()
                .map(|t| t.sequence_number)
                .collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert!(test.state.tasks.iter().all(|t| t.recipient_address.contains('@')));
    }

    #[tokio::test]
    async fn test_invalid_parameters_are_rejected() {
        let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::default());
        assert!(run(0, 5, Arc::clone(&transport)).await.is_err());
        assert!(run(5, 0, transport).await.is_err());
    }
}
