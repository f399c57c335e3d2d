use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{CacheBuilder, CacheHandle};
use crate::config::PipelineConfig;
use crate::embed::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::generate::{generate_with_timeout, TextGenerator};
use crate::guard::PolicyResolver;
use crate::matching::{FaqMatcher, MatchOutcome};
use crate::model::{FaqEntry, FaqRecord, PolicyOverrideResult, Resolution};
use crate::policy::PolicySet;

/// Grounding prompt handed to the text generator.
pub fn build_prompt(config: &PipelineConfig, question: &str, matches: &[FaqEntry]) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a customer support assistant.\n");
    let _ = writeln!(prompt, "Tone: {}", config.tone);
    let _ = writeln!(prompt, "Clarity: {}", config.clarity);
    let _ = writeln!(prompt, "Focus: {}", config.focus);
    prompt.push('\n');

    if matches.is_empty() {
        prompt.push_str(
            "No FAQ entry matched this question. If you are not sure of the answer, say so \
             and suggest contacting customer support. Never invent store policies.\n",
        );
    } else {
        prompt.push_str(
            "Use the FAQ entries below as the source of truth. Do not contradict them and do \
             not add policies that are not listed.\n",
        );
        for entry in matches {
            let _ = write!(prompt, "\nQ: {}\nA: {}\n", entry.question, entry.answer);
        }
    }

    let _ = write!(prompt, "\nCustomer question: {question}\nAnswer:");
    prompt
}

/// Matched answers joined by a blank line, in match order.
pub fn verbatim_answer(matches: &[FaqEntry]) -> String {
    matches
        .iter()
        .map(|e| e.answer.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Clone)]
pub struct SupportPipeline {
    cache: CacheHandle,
    resolver: PolicyResolver,
    matcher: FaqMatcher,
    generator: Option<Arc<dyn TextGenerator>>,
    config: PipelineConfig,
}

impl SupportPipeline {
    pub fn new(
        policies: Arc<PolicySet>,
        cache: CacheHandle,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Option<Arc<dyn TextGenerator>>,
        config: PipelineConfig,
    ) -> Self {
        let resolver = PolicyResolver::new(
            policies,
            cache.clone(),
            embedder.clone(),
            config.call_timeout,
        );
        let matcher = FaqMatcher::new(cache.clone(), embedder, &config);
        Self {
            cache,
            resolver,
            matcher,
            generator,
            config,
        }
    }

    /// Starts the background cache build and returns a pipeline that waits on
    /// it before any embedding comparison.
    pub fn spawn(
        records: Vec<FaqRecord>,
        policies: Arc<PolicySet>,
        builder: CacheBuilder,
        generator: Option<Arc<dyn TextGenerator>>,
        config: PipelineConfig,
    ) -> Self {
        let embedder = builder.embedder.clone();
        let cache = CacheHandle::spawn(builder, records, policies.clone());
        Self::new(policies, cache, embedder, generator, config)
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn check_policy(&self, question: &str) -> PolicyOverrideResult {
        self.resolver.resolve(question).await
    }

    pub async fn match_faqs(&self, question: &str) -> MatchOutcome {
        self.matcher.resolve(question).await
    }

    /// Produces the final answer for one question.
    ///
    /// Only a failing (or missing) text generator makes this return an error;
    /// every other problem degrades to "no override" or "no match".
    pub async fn resolve(&self, question: &str) -> Result<Resolution> {
        let policy = self.check_policy(question).await;
        if let (true, Some(answer)) = (policy.is_hit(), policy.answer.clone()) {
            info!(policy = ?policy.policy_id, method = ?policy.method, "answered from policy override");
            return Ok(Resolution {
                answer,
                matched_sources: Vec::new(),
                policy,
            });
        }

        let matches = self.match_faqs(question).await.matches;
        let matched_sources = matches.iter().map(FaqEntry::source).collect();

        if self.config.verbatim && !matches.is_empty() {
            debug!(matches = matches.len(), "answering verbatim from FAQ entries");
            return Ok(Resolution {
                answer: verbatim_answer(&matches),
                matched_sources,
                policy,
            });
        }

        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| Error::Generation("no text generator is configured".to_string()))?;
        let prompt = build_prompt(&self.config, question, &matches);
        debug!(matches = matches.len(), prompt_len = prompt.len(), "generating grounded answer");
        let answer =
            generate_with_timeout(generator.as_ref(), &prompt, self.config.call_timeout).await?;

        Ok(Resolution {
            answer,
            matched_sources,
            policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddingCache;
    use crate::embed::MapEmbeddingProvider;
    use crate::model::{Decision, MatchedSource, OverrideMethod};
    use crate::policy::{default_policies, PolicyId};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const HOURS: &str = "What are your store hours?";

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("generated".to_string())
        }
    }

    struct DownGenerator;

    #[async_trait]
    impl TextGenerator for DownGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(Error::Generation("connection refused".to_string()))
        }
    }

    async fn pipeline(
        generator: Option<Arc<dyn TextGenerator>>,
        config: PipelineConfig,
    ) -> SupportPipeline {
        let embedder = MapEmbeddingProvider::new().with(HOURS, vec![1.0, 0.0]);
        let policies = default_policies();
        let records = vec![FaqRecord {
            category: "Stores".to_string(),
            question: HOURS.to_string(),
            answer: "9am-5pm daily".to_string(),
        }];
        let cache = EmbeddingCache::build(&embedder, &records, &policies, config.call_timeout).await;
        SupportPipeline::new(
            Arc::new(policies),
            CacheHandle::ready(cache),
            Arc::new(embedder),
            generator,
            config,
        )
    }

    #[tokio::test]
    async fn policy_hit_short_circuits_generation() {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = pipeline(Some(generator.clone()), PipelineConfig::default()).await;

        let resolution = pipeline.resolve("How can I cancel my membership?").await.unwrap();
        let strict = default_policies()
            .get(PolicyId::Membership)
            .unwrap()
            .strict_answer
            .clone();

        assert_eq!(resolution.answer, strict);
        assert!(resolution.matched_sources.is_empty());
        assert_eq!(resolution.policy.method, Some(OverrideMethod::Regex));
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn matched_faqs_ground_the_prompt() {
        let generator = Arc::new(RecordingGenerator::default());
        let pipeline = pipeline(Some(generator.clone()), PipelineConfig::default()).await;

        let resolution = pipeline.resolve("what are your store hours").await.unwrap();

        assert_eq!(resolution.answer, "generated");
        assert_eq!(resolution.policy.decision, Decision::Miss);
        assert_eq!(
            resolution.matched_sources,
            [MatchedSource {
                question: HOURS.to_string(),
                category: "Stores".to_string(),
            }]
        );
        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("source of truth"));
        assert!(prompts[0].contains("Q: What are your store hours?\nA: 9am-5pm daily"));
        assert!(prompts[0].ends_with("Customer question: what are your store hours\nAnswer:"));
    }

    #[tokio::test]
    async fn verbatim_mode_skips_generation() {
        let config = PipelineConfig {
            verbatim: true,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(None, config).await;

        let resolution = pipeline.resolve("what are your store hours").await.unwrap();
        assert_eq!(resolution.answer, "9am-5pm daily");
    }

    #[tokio::test]
    async fn verbatim_mode_without_matches_still_generates() {
        let generator = Arc::new(RecordingGenerator::default());
        let config = PipelineConfig {
            verbatim: true,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline(Some(generator.clone()), config).await;

        let resolution = pipeline.resolve("parking").await.unwrap();
        assert_eq!(resolution.answer, "generated");
        assert!(resolution.matched_sources.is_empty());
        assert!(generator.prompts.lock().unwrap()[0].contains("No FAQ entry matched"));
    }

    #[tokio::test]
    async fn generator_failure_is_surfaced() {
        let pipeline = pipeline(Some(Arc::new(DownGenerator)), PipelineConfig::default()).await;
        let err = pipeline.resolve("what are your store hours").await.unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[tokio::test]
    async fn missing_generator_is_a_generation_error() {
        let pipeline = pipeline(None, PipelineConfig::default()).await;
        let err = pipeline.resolve("parking").await.unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[test]
    fn prompt_carries_style_settings() {
        let config = PipelineConfig {
            tone: "warm".to_string(),
            clarity: "bullet points".to_string(),
            focus: "refunds only".to_string(),
            ..PipelineConfig::default()
        };
        let prompt = build_prompt(&config, "q", &[]);
        assert!(prompt.contains("Tone: warm\n"));
        assert!(prompt.contains("Clarity: bullet points\n"));
        assert!(prompt.contains("Focus: refunds only\n"));
    }
}
