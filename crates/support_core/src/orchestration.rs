use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheReport;
use crate::eval::EvalSummary;

pub const DEFAULT_REQUIRED_PASS_RATE: f32 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    WaitingCache,
    Evaluating,
    Completed,
    Failed,
}

/// Lifecycle of one evaluation run: wait for the embedding cache, evaluate,
/// then compare the pass rate against the required rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRun {
    pub run_id: String,
    pub dataset: String,
    pub required_pass_rate: f32,
    pub status: OrchestrationStatus,
    pub requested_at: DateTime<Utc>,
    pub cache_ready_at: Option<DateTime<Utc>>,
    pub started_eval_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub embedding_failures: Option<usize>,
    pub total_cases: Option<usize>,
    pub passed_cases: Option<usize>,
    pub failed_cases: Option<usize>,
    pub pass_rate: Option<f32>,
    pub error: Option<String>,
}

impl EvaluationRun {
    pub fn start(run_id: String, dataset: String, required_pass_rate: Option<f32>) -> Self {
        Self {
            run_id,
            dataset,
            required_pass_rate: required_pass_rate.unwrap_or(DEFAULT_REQUIRED_PASS_RATE),
            status: OrchestrationStatus::WaitingCache,
            requested_at: Utc::now(),
            cache_ready_at: None,
            started_eval_at: None,
            completed_at: None,
            embedding_failures: None,
            total_cases: None,
            passed_cases: None,
            failed_cases: None,
            pass_rate: None,
            error: None,
        }
    }

    pub fn on_cache_ready(&mut self, report: &CacheReport) {
        if self.status != OrchestrationStatus::WaitingCache {
            return;
        }
        let now = Utc::now();
        self.status = OrchestrationStatus::Evaluating;
        self.embedding_failures = Some(report.failed);
        self.cache_ready_at = Some(now);
        self.started_eval_at = Some(now);
    }

    pub fn on_cache_failed(&mut self, reason: impl Into<String>) {
        if self.status != OrchestrationStatus::WaitingCache {
            return;
        }
        self.status = OrchestrationStatus::Failed;
        self.error = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn on_eval_completed(&mut self, summary: &EvalSummary) {
        if self.status != OrchestrationStatus::Evaluating {
            return;
        }
        self.total_cases = Some(summary.total);
        self.passed_cases = Some(summary.passed);
        self.failed_cases = Some(summary.failed);
        self.pass_rate = Some(summary.pass_rate);
        self.completed_at = Some(Utc::now());

        if summary.pass_rate >= self.required_pass_rate {
            self.status = OrchestrationStatus::Completed;
            self.error = None;
        } else {
            self.status = OrchestrationStatus::Failed;
            self.error = Some("pass_rate_below_required".to_string());
        }
    }

    pub fn meets_threshold(&self) -> bool {
        self.pass_rate.unwrap_or(0.0) >= self.required_pass_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(failed: usize) -> CacheReport {
        CacheReport {
            faq_embedded: 10,
            policy_embedded: 5,
            failed,
            dimension: Some(768),
            built_at: Utc::now(),
        }
    }

    fn summary(total: usize, passed: usize) -> EvalSummary {
        EvalSummary {
            total,
            passed,
            failed: total - passed,
            pass_rate: passed as f32 / total as f32,
            outcomes: Vec::new(),
        }
    }

    #[test]
    fn run_completes_when_pass_rate_is_met() {
        let mut run = EvaluationRun::start("r1".into(), "cases.json".into(), None);
        assert_eq!(run.status, OrchestrationStatus::WaitingCache);

        run.on_cache_ready(&report(1));
        assert_eq!(run.status, OrchestrationStatus::Evaluating);
        assert_eq!(run.embedding_failures, Some(1));

        run.on_eval_completed(&summary(20, 18));
        assert_eq!(run.status, OrchestrationStatus::Completed);
        assert!(run.meets_threshold());
        assert!(run.error.is_none());
    }

    #[test]
    fn run_fails_below_required_rate() {
        let mut run = EvaluationRun::start("r2".into(), "cases.json".into(), Some(0.9));
        run.on_cache_ready(&report(0));
        run.on_eval_completed(&summary(10, 8));

        assert_eq!(run.status, OrchestrationStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("pass_rate_below_required"));
        assert!(!run.meets_threshold());
    }

    #[test]
    fn cache_failure_ends_the_run() {
        let mut run = EvaluationRun::start("r3".into(), "cases.json".into(), None);
        run.on_cache_failed("cache_unavailable");
        // Later transitions are ignored once the run has failed.
        run.on_cache_ready(&report(0));
        run.on_eval_completed(&summary(1, 1));

        assert_eq!(run.status, OrchestrationStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("cache_unavailable"));
        assert!(run.total_cases.is_none());
    }
}
