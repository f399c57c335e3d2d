use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::cache::{CacheHandle, PolicyEmbedding};
use crate::embed::{embed_with_timeout, EmbeddingProvider};
use crate::error::Result;
use crate::model::{OverrideMethod, PolicyOverrideResult};
use crate::policy::PolicySet;
use crate::retrieval::cosine_similarity;

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(cancel|terminate|end|stop|withdraw|close|refund|change|modify)\w*").unwrap()
});

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(member|membership|luxe|credit|voucher|refund|note)\w*").unwrap()
});

/// Lowercases `text` and turns every character that is neither a word
/// character nor whitespace into a space.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Both an action word and a target word must be present.
pub fn gate_opens(normalized: &str) -> bool {
    ACTION_RE.is_match(normalized) && TARGET_RE.is_match(normalized)
}

/// Stages 1 to 3. `None` means the embedding stage has to decide.
pub fn lexical_override(text: &str, policies: &PolicySet) -> Option<PolicyOverrideResult> {
    let normalized = normalize(text);
    if !gate_opens(&normalized) {
        return None;
    }

    for rule in policies.rules() {
        if let Some(keyword) = rule
            .keywords
            .iter()
            .find(|k| !k.is_empty() && normalized.contains(k.as_str()))
        {
            debug!(policy = %rule.id, keyword = %keyword, "policy keyword matched");
            return Some(PolicyOverrideResult::hit(rule, OverrideMethod::Regex, None));
        }
    }

    let fallback = policies.fallback();
    debug!(policy = %fallback.id, "regex gate opened without a keyword; using fallback policy");
    Some(PolicyOverrideResult::hit(
        fallback,
        OverrideMethod::RegexFallback,
        None,
    ))
}

/// Picks the strictly highest scoring policy (first listed wins ties) and
/// reports a hit when the score reaches that policy's own threshold.
pub fn best_policy(query: &[f32], embeddings: &[PolicyEmbedding]) -> PolicyOverrideResult {
    let mut best: Option<(&PolicyEmbedding, f32)> = None;
    for candidate in embeddings {
        let score = cosine_similarity(query, &candidate.embedding);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }

    match best {
        Some((policy, score)) if score >= policy.rule.threshold => {
            PolicyOverrideResult::hit(&policy.rule, OverrideMethod::Embedding, Some(score))
        }
        Some((_, score)) => PolicyOverrideResult::miss(Some(score)),
        None => PolicyOverrideResult::miss(None),
    }
}

#[derive(Clone)]
pub struct PolicyResolver {
    policies: Arc<PolicySet>,
    cache: CacheHandle,
    embedder: Arc<dyn EmbeddingProvider>,
    call_timeout: Duration,
}

impl PolicyResolver {
    pub fn new(
        policies: Arc<PolicySet>,
        cache: CacheHandle,
        embedder: Arc<dyn EmbeddingProvider>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            policies,
            cache,
            embedder,
            call_timeout,
        }
    }

    /// Runs regex gate, exact keyword, membership fallback and embedding
    /// similarity in order; the first hit wins. The embedding stage also runs
    /// when the gate never opened.
    ///
    /// Never fails: embedding problems degrade to a miss.
    pub async fn resolve(&self, text: &str) -> PolicyOverrideResult {
        if let Some(result) = lexical_override(text, &self.policies) {
            return result;
        }

        match self.embedding_stage(text).await {
            Ok(result) => {
                debug!(decision = ?result.decision, score = ?result.score, "policy embedding stage");
                result
            }
            Err(err) => {
                warn!(error = %err, "policy embedding check failed; treating as no override");
                PolicyOverrideResult::miss(None)
            }
        }
    }

    async fn embedding_stage(&self, text: &str) -> Result<PolicyOverrideResult> {
        let cache = self.cache.ensure_ready().await?;
        let query = embed_with_timeout(self.embedder.as_ref(), text, self.call_timeout).await?;
        cache.check_query(&query)?;
        Ok(best_policy(&query, cache.policy_embeddings()))
    }
}
