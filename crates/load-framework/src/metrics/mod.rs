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

use std::fmt::Display;

use serde::Serialize;

use crate::outcome::OutcomeRecord;

/// Order statistics over a set of latency samples.
///
/// Every statistic is independent of the order the samples were collected in; those that
/// need ordering sort a copy of the samples first.
pub trait StatisticsCollector {
    /// The sample at index `floor(percentile / 100 * len)` of the ascending samples, clamped to the
    /// last index. `None` for an empty set.
    fn percentile(&self, percentile: f64) -> Option<f64>;
    fn median(&self) -> Option<f64>;
    fn mean(&self) -> Option<f64>;
    fn min(&self) -> Option<f64>;
    fn max(&self) -> Option<f64>;
}

fn sorted(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

impl StatisticsCollector for [f64] {
    fn percentile(&self, percentile: f64) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let sorted = sorted(self);

        // safety: the rank is non-negative and bounded by len, which comfortably fits in f64
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let index = ((percentile / 100.0) * sorted.len() as f64).floor() as usize;
        Some(sorted[index.min(sorted.len() - 1)])
    }

    fn median(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let sorted = sorted(self);
        let half = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[half - 1] + sorted[half]) / 2.0)
        } else {
            Some(sorted[half])
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        // Ascending summation order makes the result permutation independent.
        #[allow(clippy::cast_precision_loss)]
        Some(sorted(self).iter().sum::<f64>() / self.len() as f64)
    }

    fn min(&self) -> Option<f64> {
        self.iter().copied().reduce(f64::min)
    }

    fn max(&self) -> Option<f64> {
        self.iter().copied().reduce(f64::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub percentile_95_ms: f64,
    pub percentile_99_ms: f64,
}

impl LatencySummary {
    #[must_use]
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        Some(Self {
            min_ms: samples.min()?,
            max_ms: samples.max()?,
            mean_ms: samples.mean()?,
            median_ms: samples.median()?,
            percentile_95_ms: samples.percentile(95.0)?,
            percentile_99_ms: samples.percentile(99.0)?,
        })
    }
}

/// Summary of a completed run, derived from its outcome records.
///
/// Latency covers every record, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub latency: Option<LatencySummary>,
}

impl AggregateReport {
    #[must_use]
    pub fn from_records(records: &[OutcomeRecord]) -> Self {
        let success_count = records.iter().filter(|r| r.is_success()).count();
        let samples: Vec<f64> = records.iter().map(|r| r.elapsed_ms).collect();

        Self {
            total: records.len(),
            success_count,
            fail_count: records.len() - success_count,
            latency: LatencySummary::from_samples(&samples),
        }
    }

    /// Percentage of records that succeeded, 0 for an empty run.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            (self.success_count as f64 * 100.0) / self.total as f64
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.fail_count == 0
    }

    /// 0 when nothing failed, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(!self.passed())
    }
}

impl Display for AggregateReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total messages:         {}", self.total)?;
        writeln!(f, "Success:                {}", self.success_count)?;
        writeln!(f, "Fail:                   {}", self.fail_count)?;
        if let Some(latency) = &self.latency {
            writeln!(f)?;
            writeln!(f, "Response time:")?;
            writeln!(f, "  Min:                  {:.2} ms", latency.min_ms)?;
            writeln!(f, "  Max:                  {:.2} ms", latency.max_ms)?;
            writeln!(f, "  Mean:                 {:.2} ms", latency.mean_ms)?;
            writeln!(f, "  Median:               {:.2} ms", latency.median_ms)?;
            writeln!(f, "  P95:                  {:.2} ms", latency.percentile_95_ms)?;
            writeln!(f, "  P99:                  {:.2} ms", latency.percentile_99_ms)?;
        }
        writeln!(f)?;
        write!(f, "Success rate:           {:.1}%", self.success_rate())
    }
}

/// The JSON document written by `--json-output`.
#[derive(Debug, Serialize)]
pub struct RunExport<'a> {
    pub transport: String,
    pub started_at: String,
    pub duration_ms: f64,
    pub concurrency: usize,
    pub report: &'a AggregateReport,
    pub records: &'a [OutcomeRecord],
}
