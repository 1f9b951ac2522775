// Process-wide configuration, loaded from the environment on first access.

use std::env;

/// Fixed prompt prefix; the raw user text is appended verbatim.
pub const PROMPT_PREFIX: &str =
    "You are a friendly, expert personal finance coach. Provide clear, actionable advice on: ";

pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_PORT: u16 = 8501;

pub const PAGE_TITLE: &str = "Personal Finance Coach";

/// Sidebar quick topics, in display order. The first entry is the default selection.
pub const TOPICS: [&str; 8] = [
    "Budget Planning",
    "Savings Strategy",
    "Investment Options",
    "Debt Repayment",
    "Emergency Fund",
    "Retirement Planning",
    "Expense Tracking",
    "Credit Score",
];

lazy_static::lazy_static! {
    // A missing key is reported by the completion client on first use, not at startup.
    pub static ref API_KEY: Option<String> = env::var("API_KEY").ok().filter(|k| !k.trim().is_empty());
    pub static ref COACH_MODEL: String = env::var("COACH_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    pub static ref COACH_API_BASE: String = env::var("COACH_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
    pub static ref TEMPLATES_DIR: String = env::var("COACH_TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_string());
    pub static ref STATIC_DIR: String = env::var("COACH_STATIC_DIR").unwrap_or_else(|_| "static".to_string());
}

pub fn default_topic() -> &'static str {
    TOPICS[0]
}
