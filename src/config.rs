use serde::Deserialize;

/// Knobs for the account/verification workflow.
///
/// Defaults: verification codes live 60 minutes, tokens are 32 random bytes
/// (64 hex chars on the wire), sessions live 7 days, Argon2id runs with a
/// time cost of 2 (memory and parallelism stay at the crate defaults).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub code_ttl_minutes: i64,
    pub token_bytes: usize,
    pub session_ttl_minutes: i64,
    pub hash_time_cost: u32,
}

/// SMTP relay settings; only present when SMTP_HOST is set.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub public_base_url: String,
    pub auth: AuthConfig,
    pub smtp: Option<SmtpConfig>,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let public_base_url =
            std::env::var("PUBLIC_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into());

        let auth = AuthConfig {
            code_ttl_minutes: env_parse("VERIFICATION_CODE_TTL_MINUTES", 60),
            token_bytes: env_parse("VERIFICATION_TOKEN_BYTES", 32),
            session_ttl_minutes: env_parse("SESSION_TTL_MINUTES", 60 * 24 * 7),
            hash_time_cost: env_parse("PASSWORD_HASH_TIME_COST", 2),
        };

        // Without an SMTP host the app falls back to logging outbound mail.
        let smtp = match std::env::var("SMTP_HOST") {
            Ok(host) => {
                let username = std::env::var("SMTP_USERNAME")?;
                Some(SmtpConfig {
                    from: std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone()),
                    host,
                    port: env_parse("SMTP_PORT", 587),
                    username,
                    password: std::env::var("SMTP_PASSWORD")?,
                })
            }
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            public_base_url,
            auth,
            smtp,
        })
    }
}
