use crate::config::{AppConfig, HARD_TOKEN_CAP};

/// Load-state of the process-wide model singleton. Transitions are owned by
/// the lifecycle controller; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

/// Outcome of one generation call. Derived per request, never persisted.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_new_tokens: usize,
}

impl SamplingParams {
    /// Derives effective sampling parameters from client-supplied values.
    /// Temperature passes through unclamped, falling back to the configured
    /// default when absent or non-positive. The token budget is clamped to
    /// `HARD_TOKEN_CAP` no matter what the client asked for.
    pub fn resolve(
        temperature: Option<f64>,
        max_tokens: Option<usize>,
        config: &AppConfig,
    ) -> Self {
        let temperature = temperature
            .filter(|t| *t > 0.0)
            .unwrap_or(config.default_temperature);
        let requested = max_tokens.unwrap_or(config.default_max_tokens);

        SamplingParams {
            temperature,
            max_new_tokens: requested.min(HARD_TOKEN_CAP),
        }
    }
}
