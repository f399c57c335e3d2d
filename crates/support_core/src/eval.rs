use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::answer::SupportPipeline;
use crate::model::{Decision, OverrideMethod};
use crate::policy::PolicyId;

/// One labelled question. A case without `expected_policy` expects no
/// override; `expected_questions` lists the FAQ questions that must be
/// matched, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub case_id: String,
    pub question: String,
    #[serde(default)]
    pub expected_policy: Option<PolicyId>,
    #[serde(default)]
    pub expected_method: Option<OverrideMethod>,
    #[serde(default)]
    pub expected_questions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOutcome {
    pub case_id: String,
    pub passed: bool,
    pub actual_decision: Decision,
    pub actual_policy: Option<PolicyId>,
    pub actual_method: Option<OverrideMethod>,
    pub actual_questions: Vec<String>,
    pub score: Option<f32>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f32,
    pub outcomes: Vec<EvalOutcome>,
}

pub struct CaseExpectation;

impl CaseExpectation {
    pub fn matches(
        case: &EvalCase,
        policy: Option<PolicyId>,
        method: Option<OverrideMethod>,
        questions: &[String],
    ) -> bool {
        if case.expected_policy != policy {
            return false;
        }

        if let Some(expected) = case.expected_method {
            if method != Some(expected) {
                return false;
            }
        }

        // FAQ expectations only apply when no override answered the question.
        policy.is_some() || case.expected_questions == questions
    }
}

/// Runs the override check and FAQ matching for every case. Text generation
/// is never called.
pub async fn evaluate_cases(pipeline: &SupportPipeline, cases: &[EvalCase]) -> EvalSummary {
    let mut outcomes = Vec::with_capacity(cases.len());

    for case in cases {
        let start = Instant::now();
        let policy = pipeline.check_policy(&case.question).await;
        let actual_questions: Vec<String> = if policy.is_hit() {
            Vec::new()
        } else {
            pipeline
                .match_faqs(&case.question)
                .await
                .matches
                .into_iter()
                .map(|e| e.question)
                .collect()
        };
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let passed =
            CaseExpectation::matches(case, policy.policy_id, policy.method, &actual_questions);

        outcomes.push(EvalOutcome {
            case_id: case.case_id.clone(),
            passed,
            actual_decision: policy.decision,
            actual_policy: policy.policy_id,
            actual_method: policy.method,
            actual_questions,
            score: policy.score,
            latency_ms,
        });
    }

    let total = outcomes.len();
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let failed = total.saturating_sub(passed);
    let pass_rate = if total == 0 {
        0.0
    } else {
        passed as f32 / total as f32
    };

    EvalSummary {
        total,
        passed,
        failed,
        pass_rate,
        outcomes,
    }
}
