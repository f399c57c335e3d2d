use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::embed::{embed_with_timeout, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::model::{FaqEntry, FaqRecord};
use crate::policy::{PolicyId, PolicyRule, PolicySet};

#[derive(Debug, Clone)]
pub struct PolicyEmbedding {
    pub id: PolicyId,
    pub embedding: Vec<f32>,
    pub rule: PolicyRule,
}

#[derive(Debug, Clone)]
pub enum FailureSubject {
    Faq(FaqRecord),
    Policy(PolicyRule),
}

impl FailureSubject {
    fn text(&self) -> String {
        match self {
            Self::Faq(record) => record.question.clone(),
            Self::Policy(rule) => rule.embedding_text(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Faq(record) => format!("faq '{}'", record.question),
            Self::Policy(rule) => format!("policy '{}'", rule.id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingFailure {
    pub subject: FailureSubject,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub faq_embedded: usize,
    pub policy_embedded: usize,
    pub failed: usize,
    pub dimension: Option<usize>,
    pub built_at: DateTime<Utc>,
}

/// Precomputed embeddings for the FAQ corpus and the policy set.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    faqs: Vec<FaqEntry>,
    policies: Vec<PolicyEmbedding>,
    failures: Vec<EmbeddingFailure>,
    dimension: Option<usize>,
    built_at: DateTime<Utc>,
}

impl EmbeddingCache {
    /// Embeds every FAQ question and every policy's joined keywords.
    ///
    /// A failing item is recorded and skipped; the batch never aborts.
    pub async fn build(
        embedder: &dyn EmbeddingProvider,
        records: &[FaqRecord],
        policies: &PolicySet,
        call_timeout: Duration,
    ) -> Self {
        let mut cache = Self {
            faqs: Vec::with_capacity(records.len()),
            policies: Vec::with_capacity(policies.len()),
            failures: Vec::new(),
            dimension: None,
            built_at: Utc::now(),
        };

        let subjects = records
            .iter()
            .cloned()
            .map(FailureSubject::Faq)
            .chain(policies.rules().iter().cloned().map(FailureSubject::Policy));
        for subject in subjects {
            cache.embed_subject(embedder, subject, call_timeout).await;
        }

        cache
    }

    /// Re-embeds the failed items only. Recovered items are appended to a copy
    /// of this cache; items that fail again stay in the failure list.
    pub async fn retry_failed(
        &self,
        embedder: &dyn EmbeddingProvider,
        call_timeout: Duration,
    ) -> Self {
        let mut next = Self {
            faqs: self.faqs.clone(),
            policies: self.policies.clone(),
            failures: Vec::new(),
            dimension: self.dimension,
            built_at: Utc::now(),
        };

        for failure in &self.failures {
            next.embed_subject(embedder, failure.subject.clone(), call_timeout)
                .await;
        }

        next
    }

    async fn embed_subject(
        &mut self,
        embedder: &dyn EmbeddingProvider,
        subject: FailureSubject,
        call_timeout: Duration,
    ) {
        let outcome = match embed_with_timeout(embedder, &subject.text(), call_timeout).await {
            Ok(vector) => self.check_dimension(vector),
            Err(err) => Err(err),
        };

        match (outcome, subject) {
            (Ok(embedding), FailureSubject::Faq(record)) => {
                self.faqs.push(FaqEntry::from_record(record, embedding));
            }
            (Ok(embedding), FailureSubject::Policy(rule)) => {
                self.policies.push(PolicyEmbedding {
                    id: rule.id,
                    embedding,
                    rule,
                });
            }
            (Err(err), subject) => {
                warn!(item = %subject.label(), error = %err, "failed to embed item; skipping");
                self.failures.push(EmbeddingFailure {
                    subject,
                    error: err.to_string(),
                });
            }
        }
    }

    fn check_dimension(&mut self, vector: Vec<f32>) -> Result<Vec<f32>> {
        if vector.is_empty() {
            return Err(Error::Embedding("backend returned an empty vector".to_string()));
        }
        match self.dimension {
            Some(expected) if expected != vector.len() => Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            Some(_) => Ok(vector),
            None => {
                self.dimension = Some(vector.len());
                Ok(vector)
            }
        }
    }

    pub fn faq_entries(&self) -> &[FaqEntry] {
        &self.faqs
    }

    pub fn policy_embeddings(&self) -> &[PolicyEmbedding] {
        &self.policies
    }

    pub fn failures(&self) -> &[EmbeddingFailure] {
        &self.failures
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Fails when `vector` cannot be compared against the cached vectors.
    pub fn check_query(&self, vector: &[f32]) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != vector.len() => Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    pub fn report(&self) -> CacheReport {
        CacheReport {
            faq_embedded: self.faqs.len(),
            policy_embedded: self.policies.len(),
            failed: self.failures.len(),
            dimension: self.dimension,
            built_at: self.built_at,
        }
    }
}

/// Builds the cache on a background task and publishes each snapshot
/// through a `watch` channel.
#[derive(Clone)]
pub struct CacheBuilder {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub call_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl CacheBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            call_timeout: Duration::from_secs(20),
            retry_attempts: 0,
            retry_delay: Duration::from_secs(5),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    async fn run(
        self,
        records: Vec<FaqRecord>,
        policies: Arc<PolicySet>,
        tx: watch::Sender<Option<Arc<EmbeddingCache>>>,
    ) {
        let mut cache = Arc::new(
            EmbeddingCache::build(
                self.embedder.as_ref(),
                &records,
                &policies,
                self.call_timeout,
            )
            .await,
        );
        log_report(&cache, "embedding cache ready");
        tx.send_replace(Some(cache.clone()));

        for attempt in 1..=self.retry_attempts {
            if cache.failures().is_empty() {
                break;
            }
            tokio::time::sleep(self.retry_delay).await;
            debug!(attempt, pending = cache.failures().len(), "retrying failed embeddings");

            let retried = cache
                .retry_failed(self.embedder.as_ref(), self.call_timeout)
                .await;
            if retried.failures().len() < cache.failures().len() {
                cache = Arc::new(retried);
                log_report(&cache, "embedding cache updated after retry");
                tx.send_replace(Some(cache.clone()));
            }
        }
    }
}

fn log_report(cache: &EmbeddingCache, message: &str) {
    let report = cache.report();
    info!(
        faqs = report.faq_embedded,
        policies = report.policy_embedded,
        failed = report.failed,
        dimension = ?report.dimension,
        "{message}"
    );
}

/// Readiness barrier over the embedding cache. Every request-time
/// comparison goes through [`CacheHandle::ensure_ready`].
///
/// Cloning is cheap; every clone observes the same published cache.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    rx: watch::Receiver<Option<Arc<EmbeddingCache>>>,
}

impl CacheHandle {
    /// Starts building the cache on the current tokio runtime.
    pub fn spawn(builder: CacheBuilder, records: Vec<FaqRecord>, policies: Arc<PolicySet>) -> Self {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(builder.run(records, policies, tx));
        Self { rx }
    }

    pub fn ready(cache: EmbeddingCache) -> Self {
        let (_tx, rx) = watch::channel(Some(Arc::new(cache)));
        Self { rx }
    }

    /// Waits until a cache has been published and returns a snapshot of it.
    pub async fn ensure_ready(&self) -> Result<Arc<EmbeddingCache>> {
        let mut rx = self.rx.clone();
        let cache = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::CacheUnavailable)?
            .clone();
        cache.ok_or(Error::CacheUnavailable)
    }

    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }
}
