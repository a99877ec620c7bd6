//! Commentary generation: prompt building, the timed API call, and the
//! templated fallback used when that call fails.

pub mod fallback;
pub mod prompt;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::circuit_breaker::CircuitBreaker;
use crate::clients::{CompletionRequest, TextGenerator};
use crate::error::{CommentaryError, Result};
use crate::models::{CommentaryLine, CommentaryStyle, GameSnapshot};

pub use fallback::FallbackComposer;
pub use prompt::{PromptBuilder, SYSTEM_PROMPT};

/// First `max` chars of `text`, cut on a char boundary
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub timeout: Duration,
    pub max_line_chars: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_line_chars: 400,
            max_tokens: 150,
            temperature: 0.7,
        }
    }
}

pub struct CommentaryGenerator {
    client: Arc<dyn TextGenerator>,
    prompts: PromptBuilder,
    settings: GeneratorSettings,
    breaker: CircuitBreaker,
}

impl CommentaryGenerator {
    pub fn new(client: Arc<dyn TextGenerator>, settings: GeneratorSettings) -> Self {
        Self {
            client,
            prompts: PromptBuilder::default(),
            settings,
            breaker: CircuitBreaker::with_defaults("generation"),
        }
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn request_for(&self, snapshot: &GameSnapshot, style: CommentaryStyle) -> CompletionRequest {
        CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: self.prompts.build(snapshot, style),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }

    /// Generate one line for `snapshot` in `style`, bounded by the configured timeout.
    #[tracing::instrument(skip_all, fields(game_id = %snapshot.game_id, tick = snapshot.tick, style = %style))]
    pub async fn generate(
        &self,
        snapshot: Arc<GameSnapshot>,
        style: CommentaryStyle,
    ) -> Result<CommentaryLine> {
        let request = self.request_for(&snapshot, style);
        let timeout = self.settings.timeout;

        let text = self
            .breaker
            .call(async {
                match tokio::time::timeout(timeout, self.client.complete(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(CommentaryError::GenerationTimeout(timeout)),
                }
            })
            .await?;

        let text = truncate_chars(text.trim(), self.settings.max_line_chars).trim_end();
        if text.is_empty() {
            return Err(CommentaryError::rejected("empty completion"));
        }

        debug!(model = self.client.model_name(), chars = text.len(), "generated");
        Ok(CommentaryLine::new(snapshot, style, text.to_string()))
    }
}
