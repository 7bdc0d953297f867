// Defaults for the advisor, overridable from the environment or a .env file.
// The API key is deliberately absent: it only comes from the secret store or
// from the user (see config.rs).

use std::env;

lazy_static::lazy_static! {
    pub static ref API_BASE: String = env::var("ADVISOR_API_BASE").unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
    pub static ref ADVISOR_MODEL: String = env::var("ADVISOR_MODEL").unwrap_or_else(|_| "gemini-3-flash-preview".to_string());
    pub static ref SECRETS_PATH: String = env::var("ADVISOR_SECRETS").unwrap_or_else(|_| "secrets.env".to_string());
    pub static ref REVEAL_DELAY_MS: u64 = env::var("ADVISOR_REVEAL_DELAY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);
}

/// Key looked up in the secret store.
pub const SECRET_KEY_NAME: &str = "GEMINI_API_KEY";

pub const MISSING_KEY_WARNING: &str = "⚠️ Please enter your API Key in the sidebar to start.";
pub const ERROR_MARKER: &str = "❌ Gemini API Error:";

/// Caret appended to a reply while it is still being revealed.
pub const TYPING_CARET: char = '▌';

/// Characters revealed per frame.
pub const REVEAL_STEP: usize = 1;

pub const DEFAULT_PORT: u16 = 8501;

pub const CHART_PALETTE: [&str; 5] = ["#00C9A7", "#845EC2", "#FF6F91", "#FFC75F", "#4B7BEC"];

pub const TREND_LABELS: [&str; 4] = ["Q1", "Q2", "Q3", "Q4"];

pub const HEADLINE_LABEL: &str = "LTV:CAC";

pub const PLACEHOLDER_RATIO: &str = "N/A";
