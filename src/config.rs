use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

/// Operational ceiling on new tokens per request. Bounds worst-case CPU time
/// for a single generation; not client-negotiable.
pub const HARD_TOKEN_CAP: usize = 200;

/// Creation timestamp advertised for the published model on `/v1/models`.
pub const MODEL_CREATED: u64 = 1_769_270_732;

pub const MODEL_OWNER: &str = "owner";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub base_model_path: PathBuf,
    pub adapter_path: PathBuf,
    pub offload_path: PathBuf,
    pub model_name: String,
    pub default_max_tokens: usize,
    pub default_temperature: f64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = env::var("SERVER_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".into())
            .parse()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000));

        let base_model_path = PathBuf::from(
            env::var("BASE_MODEL_PATH")
                .unwrap_or_else(|_| "models/llama-3.1-8b-instruct".to_string()),
        );
        let adapter_path = PathBuf::from(
            env::var("ADAPTER_PATH").unwrap_or_else(|_| "models/chatmod_lora".to_string()),
        );
        let offload_path = PathBuf::from(
            env::var("OFFLOAD_PATH").unwrap_or_else(|_| "models/offload".to_string()),
        );

        let model_name = env::var("MODEL_NAME").unwrap_or_else(|_| "chatmod-lora".to_string());

        let default_max_tokens = env::var("MAX_NEW_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(512);
        let default_temperature = env::var("TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.7);

        Ok(Self {
            listen_addr,
            base_model_path,
            adapter_path,
            offload_path,
            model_name,
            default_max_tokens,
            default_temperature,
        })
    }
}
