pub mod answer;
pub mod cache;
pub mod config;
pub mod corpus;
pub mod embed;
pub mod error;
pub mod eval;
pub mod generate;
pub mod guard;
pub mod lexical;
pub mod matching;
pub mod model;
pub mod openai;
pub mod orchestration;
pub mod policy;
pub mod retrieval;
pub mod storage;

pub use answer::{build_prompt, verbatim_answer, SupportPipeline};
pub use cache::{CacheBuilder, CacheHandle, CacheReport, EmbeddingCache, EmbeddingFailure, PolicyEmbedding};
pub use config::{PipelineConfig, DEFAULT_LEXICAL_THRESHOLD, DEFAULT_SEMANTIC_THRESHOLD};
pub use corpus::{load_corpus, CorpusLoad, SkippedItem};
pub use embed::{EmbeddingProvider, HashEmbeddingProvider, MapEmbeddingProvider};
pub use error::{Error, Result};
pub use eval::{evaluate_cases, CaseExpectation, EvalCase, EvalOutcome, EvalSummary};
pub use generate::TextGenerator;
pub use guard::PolicyResolver;
pub use lexical::{best_match, compare_two_strings, LexicalMatch};
pub use matching::{split_sub_questions, FaqMatcher, MatchOutcome, MatchStage, SubQuestionTrace};
pub use model::{
    Decision, FaqEntry, FaqRecord, MatchResult, MatchedSource, OverrideMethod,
    PolicyOverrideResult, Resolution,
};
pub use openai::{ApiConfig, OpenAiEmbeddingProvider, OpenAiTextGenerator};
pub use orchestration::{EvaluationRun, OrchestrationStatus, DEFAULT_REQUIRED_PASS_RATE};
pub use policy::{default_policies, PolicyId, PolicyRule, PolicySet, DEFAULT_POLICY_THRESHOLD};
pub use retrieval::{cosine_similarity, top_k, top_match};
pub use storage::{load_corpus_file, load_eval_cases};
