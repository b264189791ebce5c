use std::env;
use tracing::warn;

/// Ceiling applied to recurrence expansion when a rule has no end condition.
/// One year of weekly visits; override with RECURRENCE_OCCURRENCE_CAP.
pub const DEFAULT_RECURRENCE_OCCURRENCE_CAP: usize = 52;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub recurrence_occurrence_cap: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            recurrence_occurrence_cap: env::var("RECURRENCE_OCCURRENCE_CAP")
                .ok()
                .and_then(|raw| match raw.parse::<usize>() {
                    Ok(cap) if cap > 0 => Some(cap),
                    _ => {
                        warn!("RECURRENCE_OCCURRENCE_CAP invalid ({}), using default", raw);
                        None
                    }
                })
                .unwrap_or(DEFAULT_RECURRENCE_OCCURRENCE_CAP),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}
