use std::env;
use std::path::PathBuf;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Process-level settings read once at startup. Scheduling policy lives in
/// the workspace database instead (see `setup.schedule`).
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub academic_year: Option<i32>,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            workspace: env_opt("TIMETABLED_WORKSPACE").map(PathBuf::from),
            log_filter: env_opt("TIMETABLED_LOG")
                .or_else(|| env_opt("RUST_LOG"))
                .unwrap_or_else(|| "info".to_string()),
            academic_year: env_opt("TIMETABLED_ACADEMIC_YEAR").and_then(|v| v.trim().parse().ok()),
        }
    }
}
