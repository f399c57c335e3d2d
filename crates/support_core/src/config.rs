use std::time::Duration;

pub const DEFAULT_LEXICAL_THRESHOLD: f32 = 0.55;
pub const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.75;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_TONE: &str = "friendly and professional";
pub const DEFAULT_CLARITY: &str = "short, plain sentences";
pub const DEFAULT_FOCUS: &str = "answer only what the customer asked";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Return matched FAQ answers as they are instead of generating text.
    pub verbatim: bool,
    pub tone: String,
    pub clarity: String,
    pub focus: String,
    /// Upper bound on every embedding and generation call.
    pub call_timeout: Duration,
    /// A lexical rating must be strictly above this to match.
    pub lexical_threshold: f32,
    /// A cosine score must be strictly above this to match.
    pub semantic_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verbatim: false,
            tone: DEFAULT_TONE.to_string(),
            clarity: DEFAULT_CLARITY.to_string(),
            focus: DEFAULT_FOCUS.to_string(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            lexical_threshold: DEFAULT_LEXICAL_THRESHOLD,
            semantic_threshold: DEFAULT_SEMANTIC_THRESHOLD,
        }
    }
}
