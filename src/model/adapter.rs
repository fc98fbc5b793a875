//! Merges a PEFT-style LoRA adapter into the base module's weights.
//!
//! An adapter ships pairs of low-rank matrices per target module. Merging
//! computes `(alpha / r) * B.A` for each pair and adds it in place to the
//! matching base parameter, after which the module behaves as the fine-tuned
//! model with no per-call overhead.

use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;
use tch::{Kind, Tensor, no_grad};

use crate::error::ServiceError;

#[derive(Debug, Deserialize)]
struct AdapterConfig {
    r: f64,
    lora_alpha: f64,
}

enum LoraHalf {
    A,
    B,
}

/// Maps a PEFT tensor name onto the base parameter it targets.
/// `base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight` becomes
/// `model.layers.0.self_attn.q_proj.weight`.
fn classify(name: &str) -> Option<(String, LoraHalf)> {
    let stripped = name.strip_prefix("base_model.model.").unwrap_or(name);
    if let Some(prefix) = stripped.strip_suffix(".lora_A.weight") {
        Some((format!("{prefix}.weight"), LoraHalf::A))
    } else if let Some(prefix) = stripped.strip_suffix(".lora_B.weight") {
        Some((format!("{prefix}.weight"), LoraHalf::B))
    } else {
        None
    }
}

/// Folds the adapter at `adapter_dir` into `module`'s parameters. Returns the
/// number of parameters updated.
pub fn merge_adapter(module: &tch::CModule, adapter_dir: &Path) -> Result<usize, ServiceError> {
    let config_path = adapter_dir.join("adapter_config.json");
    let raw = fs::read_to_string(&config_path).map_err(|e| {
        ServiceError::Load(format!("adapter config {}: {e}", config_path.display()))
    })?;
    let config: AdapterConfig = serde_json::from_str(&raw)
        .map_err(|e| ServiceError::Load(format!("adapter config: {e}")))?;
    if config.r <= 0.0 {
        return Err(ServiceError::Load("adapter rank must be positive".into()));
    }
    let scale = config.lora_alpha / config.r;

    let weights_path = adapter_dir.join("adapter_model.safetensors");
    let tensors = Tensor::read_safetensors(&weights_path)
        .map_err(|e| ServiceError::Load(format!("adapter weights: {e}")))?;

    let mut pairs: HashMap<String, (Option<Tensor>, Option<Tensor>)> = HashMap::new();
    for (name, tensor) in tensors {
        let Some((target, half)) = classify(&name) else {
            continue;
        };
        let entry = pairs.entry(target).or_insert((None, None));
        match half {
            LoraHalf::A => entry.0 = Some(tensor),
            LoraHalf::B => entry.1 = Some(tensor),
        }
    }
    if pairs.is_empty() {
        return Err(ServiceError::Load(
            "adapter contains no low-rank weight pairs".into(),
        ));
    }

    let mut params: HashMap<String, Tensor> = module
        .named_parameters()
        .map_err(|e| ServiceError::Load(e.to_string()))?
        .into_iter()
        .collect();

    let mut merged = 0usize;
    for (target, (a, b)) in pairs {
        let (Some(a), Some(b)) = (a, b) else {
            return Err(ServiceError::Load(format!(
                "unpaired low-rank tensors for {target}"
            )));
        };
        let param = params.get_mut(&target).ok_or_else(|| {
            ServiceError::Load(format!("adapter targets unknown parameter {target}"))
        })?;

        // Accumulate in float, then narrow back to the parameter's dtype.
        let delta =
            (b.to_kind(Kind::Float).matmul(&a.to_kind(Kind::Float)) * scale).to_kind(param.kind());
        no_grad(|| {
            param
                .f_add_(&delta)
                .map(|_| ())
                .map_err(|e| ServiceError::Load(e.to_string()))
        })?;
        merged += 1;
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peft_names_map_to_base_parameters() {
        let (target, half) =
            classify("base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight").unwrap();
        assert_eq!(target, "model.layers.0.self_attn.q_proj.weight");
        assert!(matches!(half, LoraHalf::A));

        let (target, half) =
            classify("base_model.model.model.layers.31.mlp.down_proj.lora_B.weight").unwrap();
        assert_eq!(target, "model.layers.31.mlp.down_proj.weight");
        assert!(matches!(half, LoraHalf::B));
    }

    #[test]
    fn names_without_the_peft_prefix_still_classify() {
        let (target, _) = classify("model.layers.2.self_attn.v_proj.lora_A.weight").unwrap();
        assert_eq!(target, "model.layers.2.self_attn.v_proj.weight");
    }

    #[test]
    fn non_lora_tensors_are_ignored() {
        assert!(classify("model.embed_tokens.weight").is_none());
        assert!(classify("base_model.model.lm_head.weight").is_none());
    }
}
