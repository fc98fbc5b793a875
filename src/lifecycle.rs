//! One-shot startup sequencing: verify the model artifacts exist, prepare the
//! offload working directory, then perform the load. Any failure here is
//! terminal for the process; there is no degraded-serve mode.

use std::fs;

use tracing::info;

use crate::{config::AppConfig, error::ServiceError, model::ModelStore};

pub fn initialize(config: &AppConfig, store: &ModelStore) -> Result<(), ServiceError> {
    let result = check_paths_and_load(config, store);
    if result.is_err() {
        store.mark_failed();
    }
    result
}

fn check_paths_and_load(config: &AppConfig, store: &ModelStore) -> Result<(), ServiceError> {
    for path in [&config.base_model_path, &config.adapter_path] {
        if !path.exists() {
            return Err(ServiceError::PathMissing(path.clone()));
        }
    }
    fs::create_dir_all(&config.offload_path)?;

    info!(
        base = %config.base_model_path.display(),
        adapter = %config.adapter_path.display(),
        "loading model artifacts"
    );
    store.load(config)
}
