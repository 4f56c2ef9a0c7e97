//! Command-line and environment configuration.

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

use drivegate_storage::{AuthSettings, OAuthClientConfig};

/// drivegate server settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "drivegate-server")]
#[command(about = "drivegate - session-authenticated proxy for a Google Drive folder")]
#[command(version)]
pub struct Config {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, env = "BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// OAuth 2.0 client id for interactive login.
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth 2.0 client secret.
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Redirect URI registered for the OAuth client.
    #[arg(long, env = "GOOGLE_REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// Id of the folder served as the root.
    #[arg(long, env = "GOOGLE_DRIVE_FOLDER_ID")]
    pub root_folder_id: Option<String>,

    /// Account a service account acts on behalf of.
    #[arg(long, env = "GOOGLE_USER_EMAIL")]
    pub delegated_user: Option<String>,

    /// Service-account key file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub service_account_key: Option<PathBuf>,

    /// Comma-separated emails allowed to sign in; empty admits everyone.
    #[arg(long, env = "ALLOWED_USERS", default_value = "")]
    pub allowed_users: String,

    /// Where the interactive credential is stored.
    #[arg(long, env = "TOKEN_PATH", default_value = "token.json")]
    pub token_path: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Redirect URI, defaulting to the local callback.
    pub fn redirect_url(&self) -> String {
        self.redirect_uri
            .clone()
            .filter(|uri| !uri.trim().is_empty())
            .unwrap_or_else(|| format!("http://localhost:{}/oauth2callback", self.port))
    }

    /// OAuth client, when both id and secret are set.
    pub fn oauth(&self) -> Option<OAuthClientConfig> {
        match (non_empty(&self.client_id), non_empty(&self.client_secret)) {
            (Some(client_id), Some(client_secret)) => Some(OAuthClientConfig {
                client_id,
                client_secret,
                redirect_url: self.redirect_url(),
            }),
            _ => None,
        }
    }

    /// Credential sources for the storage account.
    pub fn auth_settings(&self) -> AuthSettings {
        let mut settings = AuthSettings::new(self.token_path.clone());
        settings.oauth = self.oauth();
        settings.delegated_user = non_empty(&self.delegated_user);
        settings.service_account_key = self.service_account_key.clone();
        settings
    }

    /// Root folder id, if configured.
    pub fn root_folder(&self) -> Option<String> {
        non_empty(&self.root_folder_id)
    }

    /// Log what is missing. The server still starts.
    pub fn warn_missing(&self) {
        if self.oauth().is_none() {
            tracing::warn!("GOOGLE_CLIENT_ID or GOOGLE_CLIENT_SECRET not set, interactive login disabled");
        }
        if self.root_folder().is_none() {
            tracing::warn!("GOOGLE_DRIVE_FOLDER_ID not set, requests without a folder id will fail");
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Emails allowed to sign in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    emails: Vec<String>,
}

impl AllowList {
    /// Parse a comma-separated list. Blank entries are ignored.
    pub fn parse(raw: &str) -> Self {
        let emails = raw
            .split(',')
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty())
            .collect();
        Self { emails }
    }

    /// Whether `email` may sign in. An empty list admits everyone.
    pub fn permits(&self, email: &str) -> bool {
        self.emails.is_empty() || self.emails.contains(&email.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["drivegate-server"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--port", "4000"]);
        assert_eq!(config.redirect_url(), "http://localhost:4000/oauth2callback");
        assert_eq!(config.token_path, PathBuf::from("token.json"));
    }

    #[test]
    fn test_oauth_requires_id_and_secret() {
        let config = parse(&["--client-id", "id", "--client-secret", " "]);
        assert!(config.oauth().is_none());

        let config = parse(&["--client-id", "id", "--client-secret", "secret"]);
        let oauth = config.oauth().unwrap();
        assert_eq!(oauth.client_id, "id");
    }

    #[test]
    fn test_auth_settings() {
        let config = parse(&[
            "--delegated-user",
            "ana@example.com",
            "--service-account-key",
            "/keys/sa.json",
            "--token-path",
            "/data/token.json",
        ]);

        let settings = config.auth_settings();
        assert!(settings.oauth.is_none());
        assert_eq!(settings.delegated_user.as_deref(), Some("ana@example.com"));
        assert_eq!(settings.credential_path, PathBuf::from("/data/token.json"));
    }

    #[test]
    fn test_allow_list() {
        let list = AllowList::parse(" Ana@Example.com , ,bo@example.com");
        assert!(list.permits("ana@example.com"));
        assert!(list.permits("BO@example.com"));
        assert!(!list.permits("eve@example.com"));

        let open = AllowList::parse("");
        assert!(open.is_empty());
        assert!(open.permits("anyone@example.com"));
    }
}
