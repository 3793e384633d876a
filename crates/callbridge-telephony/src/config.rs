use serde::{Deserialize, Serialize};

fn default_api_base() -> String {
    "https://api.nexmo.com".to_string()
}

fn default_jwt_ttl_secs() -> u64 {
    900
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Voice API account settings.
///
/// `answer_url` and `event_url` are the webhooks the provider calls for
/// outbound calls; left empty, the server derives them from its public URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub application_id: String,
    /// PEM file holding the application's RSA private key.
    #[serde(default)]
    pub private_key_path: String,
    /// Caller id used for outbound calls.
    #[serde(default)]
    pub from_number: String,
    #[serde(default)]
    pub answer_url: String,
    #[serde(default)]
    pub event_url: String,
    #[serde(default = "default_jwt_ttl_secs")]
    pub jwt_ttl_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            application_id: String::new(),
            private_key_path: String::new(),
            from_number: String::new(),
            answer_url: String::new(),
            event_url: String::new(),
            jwt_ttl_secs: default_jwt_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl TelephonyConfig {
    /// Returns `true` when enough is set to place calls.
    pub fn is_configured(&self) -> bool {
        !self.application_id.is_empty() && !self.private_key_path.is_empty()
    }
}
