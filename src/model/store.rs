use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tch::{Device, IValue, Kind, Tensor, no_grad};
use tokenizers::{PaddingParams, Tokenizer};

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{Readiness, adapter},
};

/// End-of-sequence candidates, checked in order. Llama 3.x instruct models
/// terminate turns with `<|eot_id|>`.
const EOS_CANDIDATES: [&str; 3] = ["<|eot_id|>", "<|end_of_text|>", "</s>"];

/// Process-wide holder for the adapter-merged model and its tokenizer.
///
/// Created unloaded; the lifecycle controller drives the single
/// `Unloaded -> Loading -> Ready | Failed` transition. Request handlers only
/// query readiness and invoke generation.
pub struct ModelStore {
    state: RwLock<StoreState>,
}

struct StoreState {
    readiness: Readiness,
    model: Option<Arc<LoadedModel>>,
}

struct LoadedModel {
    tokenizer: Tokenizer,
    // Generation serializes here: the traced module reuses internal buffers
    // and is not reentrant.
    module: Mutex<tch::CModule>,
    eos_token_id: i64,
}

impl ModelStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                readiness: Readiness::Unloaded,
                model: None,
            }),
        }
    }

    pub fn readiness(&self) -> Readiness {
        self.state.read().readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    pub(crate) fn mark_failed(&self) {
        let mut state = self.state.write();
        state.readiness = Readiness::Failed;
        state.model = None;
    }

    /// One-shot load of tokenizer, base module, and adapter. Only the
    /// lifecycle controller calls this; a failed load is terminal.
    pub fn load(&self, config: &AppConfig) -> Result<(), ServiceError> {
        self.state.write().readiness = Readiness::Loading;
        match LoadedModel::load(config) {
            Ok(model) => {
                let mut state = self.state.write();
                state.model = Some(Arc::new(model));
                state.readiness = Readiness::Ready;
                Ok(())
            }
            Err(err) => {
                self.mark_failed();
                Err(err)
            }
        }
    }

    fn loaded(&self) -> Result<Arc<LoadedModel>, ServiceError> {
        self.state
            .read()
            .model
            .clone()
            .ok_or(ServiceError::ModelNotReady)
    }

    pub fn encode(&self, text: &str) -> Result<Vec<i64>, ServiceError> {
        let model = self.loaded()?;
        let encoding = model
            .tokenizer
            .encode(text, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().iter().map(|&id| i64::from(id)).collect())
    }

    pub fn decode(&self, ids: &[i64]) -> Result<String, ServiceError> {
        let model = self.loaded()?;
        let ids: Vec<u32> = ids.iter().map(|&id| id as u32).collect();
        model
            .tokenizer
            .decode(&ids, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))
    }

    /// Samples up to `max_new_tokens` continuation tokens and returns the full
    /// sequence (prompt included). Stops early on the end-of-sequence token.
    /// Never partially returns: any runtime fault surfaces as an error.
    pub fn generate(
        &self,
        input_ids: &[i64],
        temperature: f64,
        max_new_tokens: usize,
    ) -> Result<Vec<i64>, ServiceError> {
        let model = self.loaded()?;
        model.generate(input_ids, temperature, max_new_tokens)
    }
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadedModel {
    fn load(config: &AppConfig) -> Result<Self, ServiceError> {
        let tokenizer_path = config.base_model_path.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ServiceError::Load(format!("tokenizer: {e}")))?;

        let (eos_token, eos_id) = EOS_CANDIDATES
            .iter()
            .find_map(|token| tokenizer.token_to_id(token).map(|id| (*token, id)))
            .ok_or_else(|| {
                ServiceError::Load("tokenizer defines no end-of-sequence token".into())
            })?;
        // A missing pad token never fails the load; eos stands in for it.
        if tokenizer.get_padding().is_none() {
            tokenizer.with_padding(Some(PaddingParams {
                pad_id: eos_id,
                pad_token: eos_token.to_string(),
                ..PaddingParams::default()
            }));
        }
        tracing::info!(eos_token, eos_id, "tokenizer ready");

        let module_path = config.base_model_path.join("model.pt");
        if !module_path.exists() {
            return Err(ServiceError::Load(format!(
                "model artifact missing: {}",
                module_path.display()
            )));
        }
        tracing::info!(path = %module_path.display(), "loading base model");
        let mut module = tch::CModule::load_on_device(&module_path, Device::Cpu)
            .map_err(|e| ServiceError::Load(e.to_string()))?;
        // Half-width weights roughly halve resident memory versus float32.
        // The module stays whole on one device so the adapter deltas land on
        // real parameters rather than partitioned shards.
        module.to(Device::Cpu, Kind::BFloat16, false);

        let merged = adapter::merge_adapter(&module, &config.adapter_path)?;
        tracing::info!(tensors = merged, "adapter merged into base weights");

        module.set_eval();

        Ok(Self {
            tokenizer,
            module: Mutex::new(module),
            eos_token_id: i64::from(eos_id),
        })
    }

    fn generate(
        &self,
        input_ids: &[i64],
        temperature: f64,
        max_new_tokens: usize,
    ) -> Result<Vec<i64>, ServiceError> {
        let mut sequence: Vec<i64> = input_ids.to_vec();
        if sequence.is_empty() {
            // Empty prompts are tolerated; anchor on the sequence boundary.
            sequence.push(self.eos_token_id);
        }

        no_grad(|| {
            let module = self.module.lock();

            for _ in 0..max_new_tokens {
                let input_tensor =
                    Tensor::from_slice(&sequence).reshape([1, sequence.len() as i64]);

                let output = module
                    .forward_is(&[IValue::Tensor(input_tensor)])
                    .map_err(|e| ServiceError::Inference(e.to_string()))?;

                // Traced causal LMs return either logits or (logits, past).
                let logits = match output {
                    IValue::Tensor(t) => t,
                    IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                        IValue::Tensor(t) => t.shallow_clone(),
                        _ => {
                            return Err(ServiceError::Inference(
                                "expected tensor as first tuple element".into(),
                            ));
                        }
                    },
                    _ => {
                        return Err(ServiceError::Inference(
                            "unexpected model output format".into(),
                        ));
                    }
                };

                // [1, seq, vocab] -> [vocab] logits for the final position.
                let last_logits = logits.select(1, -1).squeeze().to_kind(Kind::Float);

                let probs = (last_logits / temperature).softmax(0, Kind::Float);
                let next_token_id = probs.multinomial(1, true).int64_value(&[0]);

                sequence.push(next_token_id);

                if next_token_id == self.eos_token_id {
                    break;
                }
            }

            Ok::<(), ServiceError>(())
        })?;

        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_store_is_not_ready() {
        let store = ModelStore::new();
        assert_eq!(store.readiness(), Readiness::Unloaded);
        assert!(!store.is_ready());
    }

    #[test]
    fn tokenizer_access_before_load_reports_not_ready() {
        let store = ModelStore::new();
        assert!(matches!(
            store.encode("hello"),
            Err(ServiceError::ModelNotReady)
        ));
        assert!(matches!(
            store.generate(&[1, 2, 3], 0.7, 8),
            Err(ServiceError::ModelNotReady)
        ));
    }

    #[test]
    fn marking_failed_is_terminal() {
        let store = ModelStore::new();
        store.mark_failed();
        assert_eq!(store.readiness(), Readiness::Failed);
        assert!(!store.is_ready());
    }
}
