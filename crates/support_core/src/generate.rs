use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl TextGenerator for Box<dyn TextGenerator> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }
}

#[async_trait]
impl<G: TextGenerator + ?Sized> TextGenerator for Arc<G> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }
}

/// Runs one generation call bounded by `limit`. Every failure, including the
/// timeout, is reported as [`Error::Generation`] because it is the one error
/// a caller of the pipeline is expected to surface.
pub async fn generate_with_timeout(
    generator: &dyn TextGenerator,
    prompt: &str,
    limit: Duration,
) -> Result<String> {
    match tokio::time::timeout(limit, generator.generate(prompt)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(Error::Generation(msg))) => Err(Error::Generation(msg)),
        Ok(Err(other)) => Err(Error::Generation(other.to_string())),
        Err(_) => Err(Error::Generation(
            Error::Timeout {
                operation: "generation",
                elapsed: limit,
            }
            .to_string(),
        )),
    }
}
