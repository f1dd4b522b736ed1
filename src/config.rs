use clap::Parser;
use std::time::Duration;

use crate::rate_limit::{Limit, RateLimits};

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "knowledge-gateway")]
#[command(about = "Identity-aware, rate-limited API for the knowledge notebook")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // AI categorization budget
    #[arg(long, env = "CATEGORIZE_MAX_REQUESTS", default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    pub categorize_max_requests: u32,

    #[arg(long, env = "CATEGORIZE_WINDOW_MS", default_value_t = 60_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub categorize_window_ms: u64,

    // AI search budget
    #[arg(long, env = "SEARCH_MAX_REQUESTS", default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub search_max_requests: u32,

    #[arg(long, env = "SEARCH_WINDOW_MS", default_value_t = 60_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub search_window_ms: u64,

    // Fallback budget for any other operation class
    #[arg(long, env = "DEFAULT_MAX_REQUESTS", default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    pub default_max_requests: u32,

    #[arg(long, env = "DEFAULT_WINDOW_MS", default_value_t = 60_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub default_window_ms: u64,

    // How often expired rate limit windows are swept
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval_secs: u64,

    #[arg(long, env = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_BASE_URL", default_value = "https://generativelanguage.googleapis.com")]
    pub gemini_base_url: String,

    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.0-flash")]
    pub gemini_model: String,
}

impl Args {
    pub fn rate_limits(&self) -> RateLimits {
        RateLimits {
            categorize: Limit::new(self.categorize_max_requests, self.categorize_window_ms),
            search: Limit::new(self.search_max_requests, self.search_window_ms),
            default: Limit::new(self.default_max_requests, self.default_window_ms),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_budgets() {
        let args = Args::try_parse_from(["knowledge-gateway"]).unwrap();
        let limits = args.rate_limits();

        assert_eq!(limits.categorize.max_requests, 20);
        assert_eq!(limits.search.max_requests, 10);
        assert_eq!(limits.default.max_requests, 100);
        assert_eq!(limits.search.window, Duration::from_millis(60_000));
        assert_eq!(args.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn overrides_are_applied() {
        let args = Args::try_parse_from([
            "knowledge-gateway",
            "--search-max-requests",
            "2",
            "--search-window-ms",
            "1000",
        ])
        .unwrap();

        let limits = args.rate_limits();
        assert_eq!(limits.search.max_requests, 2);
        assert_eq!(limits.search.window, Duration::from_millis(1000));
    }

    #[test]
    fn zero_budget_is_rejected() {
        assert!(Args::try_parse_from(["knowledge-gateway", "--categorize-max-requests", "0"]).is_err());
        assert!(Args::try_parse_from(["knowledge-gateway", "--default-window-ms", "0"]).is_err());
    }
}
