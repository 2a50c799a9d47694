//! Venue and upstream endpoint constants shared across the crate

pub const VENUE_NAME: &str = "Roxie Theater";
pub const CALENDAR_URL: &str = "https://roxie.com/calendar/";
pub const THEATER_TIMEZONE: &str = "America/Los_Angeles";

pub const TMDB_BASE_URL: &str = "https://api.themoviedb.org/";
pub const TMDB_SEARCH_ENDPOINT: &str = "3/search/movie";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/";
pub const OPENAI_CHAT_ENDPOINT: &str = "v1/chat/completions";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";

// Environment variables holding bearer credentials
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const TMDB_TOKEN_ENV: &str = "TMDB_TOKEN";

/// HTTP status used by upstreams to signal throttling
pub const RATE_LIMITED_STATUS: u16 = 429;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_SECS: u64 = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// Inter-lookup pacing windows (milliseconds)
pub const DETAIL_JITTER_MS: (u64, u64) = (250, 1000);
pub const LLM_JITTER_MS: (u64, u64) = (50, 100);
pub const TMDB_JITTER_MS: (u64, u64) = (50, 200);

/// Default output directory for scrape runs
pub const OUTPUT_DIR: &str = "output";

// Subcommand file suffixes, substituted for ".json"
pub const LLM_SUFFIX: &str = ".llm.json";
pub const TMDB_SUFFIX: &str = ".tmdb.json";
pub const EXPORT_SUFFIX: &str = ".boxd.csv";
