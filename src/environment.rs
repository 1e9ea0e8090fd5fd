use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Retrieves an environment variable and splits it into a vector of strings based on a delimiter.
///
/// Empty segments are dropped, so an unset variable yields an empty vector.
///
/// # Arguments
/// - `var`: The name of the environment variable.
/// - `delimiter`: The character to split the environment variable's value by.
///
/// # Returns
/// - `Vec<String>`
pub fn get_env_var_as_vec(var: &str, delimiter: char) -> Vec<String> {
    env::var(var)
        .unwrap_or_default()
        .split(delimiter)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses an environment variable, falling back to `default` when unset or malformed.
pub fn get_env_var_or<T: FromStr>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(value) => match value.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Ignoring malformed value for {}: {:?}", var, value);
                default
            }
        },
        Err(_) => default,
    }
}

/// Reads a boolean flag; accepts `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn get_env_var_as_bool(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(value) => parse_bool(&value).unwrap_or_else(|| {
            warn!("Ignoring malformed boolean for {}: {:?}", var, value);
            default
        }),
        Err(_) => default,
    }
}

pub fn get_env_var_as_secs(var: &str, default: Duration) -> Duration {
    Duration::from_secs(get_env_var_or(var, default.as_secs()))
}

pub fn get_env_var_as_millis(var: &str, default: Duration) -> Duration {
    Duration::from_millis(get_env_var_or(var, default.as_millis() as u64))
}

/// Parses `key=millis` pairs separated by `;`, e.g. `tmdn=1000;uspto=2500`.
///
/// Malformed pairs are skipped with a warning.
pub fn parse_interval_pairs(raw: &str) -> Vec<(String, Duration)> {
    raw.split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = match pair.split_once('=') {
                Some(kv) => kv,
                None => {
                    warn!("Skipping interval entry without '=': {:?}", pair);
                    return None;
                }
            };
            match value.trim().parse::<u64>() {
                Ok(ms) => Some((key.trim().to_string(), Duration::from_millis(ms))),
                Err(_) => {
                    warn!("Skipping interval entry with bad millis: {:?}", pair);
                    None
                }
            }
        })
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval_pairs() {
        let pairs = parse_interval_pairs("tmdn=1000; uspto = 2500;;bogus;wipo=x");
        assert_eq!(
            pairs,
            vec![
                ("tmdn".to_string(), Duration::from_millis(1000)),
                ("uspto".to_string(), Duration::from_millis(2500)),
            ]
        );
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
