pub mod billing;
pub mod dashboard;
pub mod domain;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub supabase_url: Option<String>,
        pub supabase_anon_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub github_token: Option<String>,
        pub github_api_url: Option<String>,
        /// Offset used to decide which calendar day "today" is.
        pub utc_offset_minutes: i32,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let utc_offset_minutes = match non_empty_var("SUBTRACKER_UTC_OFFSET_MINUTES") {
                Some(s) => s
                    .trim()
                    .parse::<i32>()
                    .with_context(|| format!("SUBTRACKER_UTC_OFFSET_MINUTES is not an integer: {s}"))?,
                None => 0,
            };

            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                supabase_url: non_empty_var("SUPABASE_URL"),
                supabase_anon_key: non_empty_var("SUPABASE_ANON_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                github_token: non_empty_var("GITHUB_TOKEN"),
                github_api_url: non_empty_var("GITHUB_API_URL"),
                utc_offset_minutes,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_supabase_url(&self) -> anyhow::Result<&str> {
            self.supabase_url
                .as_deref()
                .context("SUPABASE_URL is required")
        }

        pub fn require_supabase_anon_key(&self) -> anyhow::Result<&str> {
            self.supabase_anon_key
                .as_deref()
                .context("SUPABASE_ANON_KEY is required")
        }

        pub fn require_github_token(&self) -> anyhow::Result<&str> {
            self.github_token
                .as_deref()
                .context("GITHUB_TOKEN is required (set it in .env)")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}
