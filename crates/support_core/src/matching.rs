use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures_util::future::join_all;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheHandle, EmbeddingCache};
use crate::config::PipelineConfig;
use crate::embed::{embed_with_timeout, EmbeddingProvider};
use crate::error::Result;
use crate::lexical::best_match;
use crate::model::{FaqEntry, MatchResult};
use crate::retrieval::top_match;

static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i) and | or | also |,").unwrap());

/// Splits a possibly multi-intent query into trimmed, non-empty parts.
pub fn split_sub_questions(query: &str) -> Vec<String> {
    SEPARATOR_RE
        .split(query)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn lexical_accepts(rating: f32, threshold: f32) -> bool {
    rating > threshold
}

pub fn semantic_accepts(score: f32, threshold: f32) -> bool {
    score > threshold
}

/// Keeps the first entry for every question text, preserving order.
pub fn dedup_by_question(entries: impl IntoIterator<Item = FaqEntry>) -> MatchResult {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.question.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    Lexical,
    Semantic,
    Unmatched,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubQuestionTrace {
    pub text: String,
    pub stage: MatchStage,
    pub question: Option<String>,
    /// Best score seen by the last stage that ran.
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub matches: MatchResult,
    pub trace: Vec<SubQuestionTrace>,
}

#[derive(Clone)]
pub struct FaqMatcher {
    cache: CacheHandle,
    embedder: Arc<dyn EmbeddingProvider>,
    call_timeout: Duration,
    lexical_threshold: f32,
    semantic_threshold: f32,
}

impl FaqMatcher {
    pub fn new(
        cache: CacheHandle,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            cache,
            embedder,
            call_timeout: config.call_timeout,
            lexical_threshold: config.lexical_threshold,
            semantic_threshold: config.semantic_threshold,
        }
    }

    /// Resolves every sub-question to at most one FAQ entry and merges the
    /// results in sub-question order without duplicates.
    pub async fn resolve(&self, query: &str) -> MatchOutcome {
        let parts = split_sub_questions(query);
        if parts.is_empty() {
            return MatchOutcome::default();
        }

        let cache = match self.cache.ensure_ready().await {
            Ok(cache) => cache,
            Err(err) => {
                warn!(error = %err, "FAQ matching skipped");
                return MatchOutcome {
                    matches: Vec::new(),
                    trace: parts.into_iter().map(unmatched).collect(),
                };
            }
        };

        let questions: Vec<&str> = cache
            .faq_entries()
            .iter()
            .map(|e| e.question.as_str())
            .collect();

        let resolved = join_all(
            parts
                .iter()
                .map(|part| self.resolve_part(&cache, &questions, part)),
        )
        .await;

        let (entries, trace): (Vec<Option<FaqEntry>>, Vec<SubQuestionTrace>) =
            resolved.into_iter().unzip();

        MatchOutcome {
            matches: dedup_by_question(entries.into_iter().flatten()),
            trace,
        }
    }

    async fn resolve_part(
        &self,
        cache: &EmbeddingCache,
        questions: &[&str],
        part: &str,
    ) -> (Option<FaqEntry>, SubQuestionTrace) {
        let entries = cache.faq_entries();
        let Some(lexical) = best_match(part, questions) else {
            return (None, unmatched(part.to_string()));
        };

        if lexical_accepts(lexical.rating, self.lexical_threshold) {
            debug!(part, question = lexical.target, rating = lexical.rating, "lexical FAQ match");
            let entry = entries[lexical.index].clone();
            return (
                Some(entry),
                SubQuestionTrace {
                    text: part.to_string(),
                    stage: MatchStage::Lexical,
                    question: Some(lexical.target.to_string()),
                    score: Some(lexical.rating),
                },
            );
        }

        let semantic = match self.semantic_match(cache, part).await {
            Ok(found) => found,
            Err(err) => {
                warn!(part, error = %err, "FAQ embedding failed; sub-question left unmatched");
                return (None, unmatched(part.to_string()));
            }
        };

        match semantic {
            Some((entry, score)) if semantic_accepts(score, self.semantic_threshold) => {
                debug!(part, question = %entry.question, score, "semantic FAQ match");
                let trace = SubQuestionTrace {
                    text: part.to_string(),
                    stage: MatchStage::Semantic,
                    question: Some(entry.question.clone()),
                    score: Some(score),
                };
                (Some(entry.clone()), trace)
            }
            Some((_, score)) => (
                None,
                SubQuestionTrace {
                    score: Some(score),
                    ..unmatched(part.to_string())
                },
            ),
            None => (None, unmatched(part.to_string())),
        }
    }

    async fn semantic_match<'a>(
        &self,
        cache: &'a EmbeddingCache,
        part: &str,
    ) -> Result<Option<(&'a FaqEntry, f32)>> {
        let query = embed_with_timeout(self.embedder.as_ref(), part, self.call_timeout).await?;
        cache.check_query(&query)?;
        Ok(top_match(&query, cache.faq_entries()))
    }
}

fn unmatched(text: String) -> SubQuestionTrace {
    SubQuestionTrace {
        text,
        stage: MatchStage::Unmatched,
        question: None,
        score: None,
    }
}
