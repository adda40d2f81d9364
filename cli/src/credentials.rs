use replay_protocol_client::CredentialsProvider;

/// Environment variable holding the API key used to authenticate with the
/// recording server.
pub const API_KEY_ENV_VAR: &str = "REPLAY_API_KEY";

/// Reads the access token from `REPLAY_API_KEY` on every connect, so a key
/// exported after startup is still picked up by a reconnect.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialsProvider for EnvCredentials {
    fn access_token(&self) -> Option<String> {
        std::env::var(API_KEY_ENV_VAR)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}
