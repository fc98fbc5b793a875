use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::{ChatCompletionRequest, ChatCompletionResponse, HealthResponse, ModelList},
    config::AppConfig,
    error::ServiceError,
    model::{GenerationResult, ModelStore, SamplingParams},
    prompt,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<ModelStore>,
}

pub fn build_router(config: Arc<AppConfig>, store: Arc<ModelStore>) -> Router {
    let state = AppState { config, store };

    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model_loaded: state.store.is_ready(),
    })
}

async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    Json(ModelList::single(&state.config.model_name))
}

async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>, ServiceError> {
    // Readiness gate: no queuing, no waiting, and no tokenization work
    // before the model is loaded.
    if !state.store.is_ready() {
        return Err(ServiceError::ModelNotReady);
    }

    info!(
        model = %request.model,
        messages = request.messages.len(),
        max_tokens = request.max_tokens,
        "chat completion request"
    );

    let prompt = prompt::format_conversation(&request.messages);
    let params = SamplingParams::resolve(request.temperature, request.max_tokens, &state.config);

    let result = run_generation(state.store.clone(), prompt, params).await?;

    Ok(Json(ChatCompletionResponse::assemble(
        &state.config.model_name,
        &result,
    )))
}

/// Runs the blocking encode/generate/decode pipeline off the async runtime.
/// Concurrent requests queue on the model's internal lock in arrival order.
async fn run_generation(
    store: Arc<ModelStore>,
    prompt: String,
    params: SamplingParams,
) -> Result<GenerationResult, ServiceError> {
    tokio::task::spawn_blocking(move || {
        let input_ids = store.encode(&prompt)?;
        let prompt_tokens = input_ids.len();

        let output = store.generate(&input_ids, params.temperature, params.max_new_tokens)?;
        let completion_tokens = output.len() - prompt_tokens;

        let text = store.decode(&output[prompt_tokens..])?;
        Ok(GenerationResult {
            text,
            prompt_tokens,
            completion_tokens,
        })
    })
    .await
    .map_err(|err| ServiceError::Inference(format!("generation task failed: {err}")))?
}
