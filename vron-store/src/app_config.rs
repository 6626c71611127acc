use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub ron: RonSettings,
    pub api: ApiSettings,
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub audit: AuditSettings,
    #[serde(default)]
    pub keys: Vec<KeySeed>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RonSettings {
    pub username: String,
    pub password: String,
    pub test_url: String,
    pub live_url: String,
    /// "train" or "live"; anything else falls back to train.
    pub mode: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    /// Issued keys are `base_key + host_id`.
    pub base_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Payment options the operator accepts, in preference order.
    pub allowed_payment_options: Vec<String>,
    pub default_payment_option: String,
    pub payment_rotation_days: i64,
    /// Substrings (case-insensitive) of backend fault text that mean a
    /// pickup is mandatory. Kept in configuration because the backend's
    /// fault vocabulary is not documented.
    #[serde(default = "default_pickup_fault_markers")]
    pub pickup_fault_markers: Vec<String>,
}

fn default_pickup_fault_markers() -> Vec<String> {
    vec!["pickup".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditSettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

/// One issued partner key, seeded from configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct KeySeed {
    pub host_id: String,
    pub name: String,
}

impl Settings {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Environment-specific overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `VRON_SERVER__PORT=9000`
            .add_source(config::Environment::with_prefix("VRON").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
