//! Runtime configuration, read from `MARKCHECK_*` environment variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::environment::{
    get_env_var_as_bool, get_env_var_as_millis, get_env_var_as_secs, get_env_var_as_vec,
    get_env_var_or, parse_interval_pairs,
};
use crate::validator::{NamePolicy, NameValidator, DEFAULT_MAX_NAME_LEN};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 20;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: usize = 1;
pub const DEFAULT_SOURCE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(300);
pub const DEFAULT_LOCAL_DB: &str = "checked_names.csv";

#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub name_policy: NamePolicy,
    pub max_name_len: usize,
    pub max_batch_size: usize,
    /// Fixed delay between a failed source call and its retry.
    pub retry_delay: Duration,
    /// Retries after the first failed attempt.
    pub max_retries: usize,
    pub source_intervals: HashMap<String, Duration>,
    pub default_source_interval: Duration,
    /// Minimum spacing between the starts of two candidate checks.
    pub check_interval: Duration,
    /// Ceiling on a single rate limiter wait.
    pub acquire_timeout: Duration,
    pub stale_lock_after: Duration,
    pub stop_on_similar: bool,
    pub local_match_respects_region: bool,
    /// Registry ids in query order.
    pub source_order: Vec<String>,
    pub local_db_path: Option<PathBuf>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            name_policy: NamePolicy::LettersOnly,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            source_intervals: HashMap::new(),
            default_source_interval: DEFAULT_SOURCE_INTERVAL,
            check_interval: DEFAULT_CHECK_INTERVAL,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            stale_lock_after: DEFAULT_STALE_LOCK_AFTER,
            stop_on_similar: false,
            local_match_respects_region: false,
            source_order: vec!["tmdn".to_string(), "uspto".to_string()],
            local_db_path: Some(PathBuf::from(DEFAULT_LOCAL_DB)),
        }
    }
}

impl CheckerConfig {
    /// Builds the configuration from the environment, using defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let name_policy = if get_env_var_as_bool("MARKCHECK_ALLOW_DIGITS", false) {
            NamePolicy::LettersAndDigits
        } else {
            NamePolicy::LettersOnly
        };

        let source_intervals = std::env::var("MARKCHECK_SOURCE_INTERVALS")
            .map(|raw| parse_interval_pairs(&raw).into_iter().collect())
            .unwrap_or_default();

        let mut source_order = get_env_var_as_vec("MARKCHECK_SOURCES", ';');
        if source_order.is_empty() {
            source_order = defaults.source_order.clone();
        }

        let local_db_path = match std::env::var("MARKCHECK_LOCAL_DB") {
            Ok(path) if path.trim().is_empty() => None,
            Ok(path) => Some(PathBuf::from(path.trim())),
            Err(_) => defaults.local_db_path.clone(),
        };

        Self {
            name_policy,
            max_name_len: get_env_var_or("MARKCHECK_MAX_NAME_LEN", defaults.max_name_len),
            max_batch_size: get_env_var_or("MARKCHECK_MAX_BATCH", defaults.max_batch_size),
            retry_delay: get_env_var_as_secs("MARKCHECK_RETRY_DELAY_SECS", defaults.retry_delay),
            max_retries: get_env_var_or("MARKCHECK_MAX_RETRIES", defaults.max_retries),
            source_intervals,
            default_source_interval: get_env_var_as_millis(
                "MARKCHECK_DEFAULT_INTERVAL_MS",
                defaults.default_source_interval,
            ),
            check_interval: get_env_var_as_millis(
                "MARKCHECK_CHECK_INTERVAL_MS",
                defaults.check_interval,
            ),
            acquire_timeout: get_env_var_as_secs(
                "MARKCHECK_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout,
            ),
            stale_lock_after: get_env_var_as_secs(
                "MARKCHECK_STALE_LOCK_SECS",
                defaults.stale_lock_after,
            ),
            stop_on_similar: get_env_var_as_bool("MARKCHECK_STOP_ON_SIMILAR", false),
            local_match_respects_region: get_env_var_as_bool("MARKCHECK_LOCAL_REGION", false),
            source_order,
            local_db_path,
        }
    }

    pub fn validator(&self) -> NameValidator {
        NameValidator::new(self.name_policy, self.max_name_len)
    }
}
