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

use std::sync::Arc;

use futures::{stream, StreamExt};
use tokio::task::JoinHandle;

use super::progress::ProgressPrinter;
use crate::{
    outcome::{OutcomeRecord, TaskDescriptor},
    transport::Transport,
};

/// Fans tasks out over a bounded set of concurrently running sends.
///
/// Each send runs in its own spawned task and hands its record back by value; the dispatcher is
/// the only owner of the result list. A send that dies before returning (a panic, or the task being
/// cancelled) is recorded as a failure for its sequence number so no task goes unaccounted for.
pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    tasks: Vec<TaskDescriptor>,
    workers: usize,
    progress: ProgressPrinter,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        tasks: Vec<TaskDescriptor>,
        workers: usize,
        progress: ProgressPrinter,
    ) -> Self {
        Self {
            transport,
            tasks,
            workers,
            progress,
        }
    }

    pub fn start(self) -> JoinHandle<Vec<OutcomeRecord>> {
        tokio::spawn(async move {
            let mut records = Vec::with_capacity(self.tasks.len());
            let transport = self.transport;

            let mut completions = stream::iter(self.tasks)
                .map(|task| {
                    let transport = Arc::clone(&transport);
                    async move {
                        let handle = {
                            let task = task.clone();
                            tokio::spawn(async move { transport.send(&task).await })
                        };
                        match handle.await {
                            Ok(record) => record,
                            Err(e) => {
                                tracing::warn!(
                                    sequence = task.sequence_number,
                                    error = %e,
                                    "send task died before recording an outcome"
                                );
                                OutcomeRecord::worker_fault(&task, format!("Worker fault: {e}"))
                            }
                        }
                    }
                })
                .buffer_unordered(self.workers.max(1));

            while let Some(record) = completions.next().await {
                self.progress.record(&record);
                records.push(record);
            }

            records
        })
    }
}
