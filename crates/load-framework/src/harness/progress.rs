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

use indicatif::ProgressBar;

use crate::{
    outcome::{OutcomeRecord, OutcomeStatus},
    utils::truncate_chars,
};

/// Failure details are echoed for sequence numbers up to this one.
const DETAILED_FAILURES: usize = 5;
const DETAIL_CHARS: usize = 150;

/// Prints one line per completed send, above the progress bar when there is one.
pub(crate) struct ProgressPrinter {
    bar: Option<ProgressBar>,
}

impl ProgressPrinter {
    pub fn new(bar: Option<ProgressBar>) -> Self {
        Self { bar }
    }

    pub fn record(&self, record: &OutcomeRecord) {
        for line in lines_for(record) {
            match &self.bar {
                Some(bar) => bar.println(line),
                None => println!("{line}"),
            }
        }
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }
}

fn lines_for(record: &OutcomeRecord) -> Vec<String> {
    let mark = match record.status {
        OutcomeStatus::Success => "✓",
        OutcomeStatus::Fail => "✗",
    };
    let mut lines = vec![format!(
        "{mark} Message #{}: {} ({:.2}ms) -> {}",
        record.sequence_number, record.status, record.elapsed_ms, record.recipient_address
    )];

    if record.status == OutcomeStatus::Fail && record.sequence_number <= DETAILED_FAILURES {
        if let Some(detail) = &record.error_detail {
            lines.push(format!("   Error: {}", truncate_chars(detail, DETAIL_CHARS)));
        }
    }
    lines
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::outcome::TaskDescriptor;

    #[test]
    fn test_success_line() {
        let record = OutcomeRecord::success(&TaskDescriptor::new(2, "x@gmail.com"), 12.345);
        assert_eq!(
            lines_for(&record),
            vec!["✓ Message #2: SUCCESS (12.35ms) -> x@gmail.com".to_string()]
        );
    }

    #[test]
    fn test_early_failures_show_detail() {
        let record = OutcomeRecord::failure(
            &TaskDescriptor::new(5, "y@yahoo.com"),
            3.0,
            format!("HTTP 503: {}", "z".repeat(300)),
        );
        let lines = lines_for(&record);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "✗ Message #5: FAIL (3.00ms) -> y@yahoo.com");
        assert_eq!(lines[1].chars().count(), "   Error: ".len() + DETAIL_CHARS);
    }

    #[test]
    fn test_later_failures_are_terse() {
        let record = OutcomeRecord::failure(&TaskDescriptor::new(6, "y@yahoo.com"), 3.0, "boom");
        assert_eq!(lines_for(&record).len(), 1);
    }
}
