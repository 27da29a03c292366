use std::{env, fmt::Display, str::FromStr};

use log::{info, warn};

use crate::error::{AppError, AppResult};

/// 2 MiB per uploaded file.
pub const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

/// Room for the non-file form fields of a multipart body.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Process configuration, built once at start-up and handed to the router.
#[derive(Debug, Clone)]
pub struct Config {
    pub address: String,
    pub public_url: String,
    pub database_url: String,
    pub max_upload_bytes: usize,
    pub page_size: i64,
    pub static_dir: String,
    pub secure_cookies: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
            public_url: "http://127.0.0.1:3000".to_string(),
            database_url: "sqlite://jinet.db".to_string(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            page_size: 10,
            static_dir: "static".to_string(),
            secure_cookies: false,
        }
    }
}

impl Config {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from any key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let defaults = Self::default();

        let config = Self {
            address: try_load(&lookup, "JINET_ADDRESS", defaults.address)?,
            public_url: try_load(&lookup, "JINET_PUBLIC_URL", defaults.public_url)?,
            database_url: try_load(&lookup, "JINET_DATABASE_URL", defaults.database_url)?,
            max_upload_bytes: try_load(
                &lookup,
                "JINET_MAX_UPLOAD_BYTES",
                defaults.max_upload_bytes,
            )?,
            page_size: try_load(&lookup, "JINET_PAGE_SIZE", defaults.page_size)?,
            static_dir: try_load(&lookup, "JINET_STATIC_DIR", defaults.static_dir)?,
            secure_cookies: try_load(&lookup, "JINET_SECURE_COOKIES", defaults.secure_cookies)?,
        };

        if config.page_size <= 0 {
            return Err(AppError::Config("JINET_PAGE_SIZE must be positive".to_string()));
        }
        if config.max_upload_bytes == 0 {
            return Err(AppError::Config(
                "JINET_MAX_UPLOAD_BYTES must be positive".to_string(),
            ));
        }

        Ok(config)
    }

    /// Largest request body accepted: a package file, its logo and the form fields.
    pub fn max_request_bytes(&self) -> usize {
        self.max_upload_bytes * 2 + FORM_OVERHEAD_BYTES
    }
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> AppResult<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            warn!("Invalid {key} value: {e}");
            AppError::Config(format!("{key}: {e}"))
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.address, "127.0.0.1:3000");
        assert_eq!(config.max_upload_bytes, MAX_UPLOAD_BYTES);
        assert_eq!(config.page_size, 10);
        assert!(!config.secure_cookies);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("JINET_PAGE_SIZE", "12"),
            ("JINET_MAX_UPLOAD_BYTES", "1024"),
            ("JINET_SECURE_COOKIES", "true"),
        ]))
        .unwrap();
        assert_eq!(config.page_size, 12);
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.max_request_bytes(), 2048 + 64 * 1024);
        assert!(config.secure_cookies);
    }

    #[test]
    fn garbage_is_rejected() {
        let result = Config::from_lookup(lookup_from(&[("JINET_PAGE_SIZE", "ten")]));
        assert!(matches!(result, Err(AppError::Config(_))));

        let result = Config::from_lookup(lookup_from(&[("JINET_PAGE_SIZE", "0")]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
