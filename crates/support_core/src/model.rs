use serde::{Deserialize, Serialize};

use crate::policy::{PolicyId, PolicyRule};

/// A corpus record as loaded, before any embedding has been computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqRecord {
    pub category: String,
    pub question: String,
    pub answer: String,
}

/// A corpus record together with the embedding of its question.
///
/// Identity is the question text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub category: String,
    pub question: String,
    pub answer: String,
    pub embedding: Vec<f32>,
}

impl FaqEntry {
    pub fn from_record(record: FaqRecord, embedding: Vec<f32>) -> Self {
        Self {
            category: record.category,
            question: record.question,
            answer: record.answer,
            embedding,
        }
    }

    pub fn source(&self) -> MatchedSource {
        MatchedSource {
            question: self.question.clone(),
            category: self.category.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Hit,
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverrideMethod {
    Regex,
    RegexFallback,
    Embedding,
}

impl OverrideMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::RegexFallback => "regex-fallback",
            Self::Embedding => "embedding",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverrideResult {
    pub decision: Decision,
    pub policy_id: Option<PolicyId>,
    pub answer: Option<String>,
    pub method: Option<OverrideMethod>,
    pub score: Option<f32>,
}

impl PolicyOverrideResult {
    pub fn hit(rule: &PolicyRule, method: OverrideMethod, score: Option<f32>) -> Self {
        Self {
            decision: Decision::Hit,
            policy_id: Some(rule.id),
            answer: Some(rule.strict_answer.clone()),
            method: Some(method),
            score,
        }
    }

    pub fn miss(score: Option<f32>) -> Self {
        Self {
            decision: Decision::Miss,
            policy_id: None,
            answer: None,
            method: None,
            score,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.decision == Decision::Hit
    }
}

/// FAQ entries grounding one request, unique by question, in encounter order.
pub type MatchResult = Vec<FaqEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedSource {
    pub question: String,
    pub category: String,
}

/// Final outcome of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub answer: String,
    pub matched_sources: Vec<MatchedSource>,
    pub policy: PolicyOverrideResult,
}
