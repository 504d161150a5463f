//! Partial-credit scoring from line-delimited JSON test events.

use std::ops::AddAssign;

use serde::Deserialize;

use super::report::TestResult;

#[derive(Debug, Deserialize)]
struct TestEvent {
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Test", default)]
    test: String,
}

/// Passing and total test events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub passed: usize,
    pub total: usize,
}

impl EventCounts {
    /// Counts `pass`/`fail` events that name a test. Lines that are not JSON
    /// events are ordinary log output and are skipped.
    pub fn from_output(output: &str) -> Self {
        let mut counts = Self::default();
        for line in output.lines() {
            let Ok(event) = serde_json::from_str::<TestEvent>(line) else {
                continue;
            };
            if event.test.is_empty() {
                continue;
            }
            match event.action.as_str() {
                "pass" => {
                    counts.passed += 1;
                    counts.total += 1;
                }
                "fail" => counts.total += 1,
                _ => {}
            }
        }
        counts
    }

    /// `passed / total`, or 0 when no events were seen.
    pub fn score(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

impl AddAssign for EventCounts {
    fn add_assign(&mut self, other: Self) {
        self.passed += other.passed;
        self.total += other.total;
    }
}

/// All required tests passed and the partial score, if any, is perfect.
pub fn overall_success(required: &[TestResult], partial_score: Option<f64>) -> bool {
    required.iter().all(|t| t.passed) && partial_score.is_none_or(|score| score >= 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: &str, test: &str) -> String {
        format!(r#"{{"Action":"{action}","Package":"example/pkg","Test":"{test}"}}"#)
    }

    #[test]
    fn test_counts_named_pass_and_fail_events() {
        let output = [
            event("run", "TestA"),
            event("pass", "TestA"),
            event("fail", "TestB"),
            event("skip", "TestC"),
            r#"{"Action":"fail","Package":"example/pkg"}"#.to_string(),
            "FAIL example/pkg 0.01s".to_string(),
            "{broken".to_string(),
        ]
        .join("\n");

        let counts = EventCounts::from_output(&output);
        assert_eq!(counts, EventCounts { passed: 1, total: 2 });
        assert_eq!(counts.score(), 0.5);
    }

    #[test]
    fn test_score_is_zero_without_events() {
        let counts = EventCounts::from_output("ok example/pkg\n");
        assert_eq!(counts.total, 0);
        assert_eq!(counts.score(), 0.0);
    }

    #[test]
    fn test_counts_accumulate_across_targets() {
        let mut total = EventCounts::default();
        total += EventCounts { passed: 2, total: 5 };
        total += EventCounts { passed: 1, total: 5 };
        assert_eq!(total.score(), 0.3);
    }

    #[test]
    fn test_overall_success() {
        let pass = TestResult::passed("a", "");
        let fail = TestResult::failed("b", "", "exit status 1");
        assert!(overall_success(&[pass.clone()], None));
        assert!(overall_success(&[pass.clone()], Some(1.0)));
        assert!(!overall_success(&[pass], Some(0.3)));
        assert!(!overall_success(&[fail], None));
        assert!(overall_success(&[], None));
    }
}
