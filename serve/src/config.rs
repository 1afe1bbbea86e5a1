//! Server configuration.

/// Everything the HTTP surface needs beyond the pipeline itself.
#[derive(Clone, Debug)]
pub struct ServeConfig {
    /// Port for [`crate::run_serve`].
    pub port: u16,
    /// Global cap on simultaneous origin downloads.
    pub max_fetches: usize,
    /// Per-origin-host cap on simultaneous downloads.
    pub max_fetches_per_origin: usize,
    /// `Cache-Control: public, max-age=<ttl>` on image responses, seconds.
    pub cdn_ttl: u64,
    /// When set, requests whose Host header differs get a 404.
    pub domain: Option<String>,
    /// Referer hosts (suffix match) allowed to request images. Empty list
    /// allows everyone; an empty referer header is always allowed.
    pub allowed_referers: Vec<String>,
    /// Public domain used to build upload URLs in API responses.
    pub public_domain: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        ServeConfig {
            port: 3002,
            max_fetches: 100,
            max_fetches_per_origin: 10,
            cdn_ttl: 604_800, // one week
            domain: None,
            allowed_referers: Vec::new(),
            public_domain: "localhost".to_string(),
        }
    }
}

impl ServeConfig {
    /// Builds the config from `REFRACT_*` environment variables, falling
    /// back to [`Default`] for unset or invalid values.
    ///
    /// - `REFRACT_PORT` (default 3002)
    /// - `REFRACT_MAX_FETCHES` (default 100)
    /// - `REFRACT_MAX_FETCHES_PER_ORIGIN` (default 10)
    /// - `REFRACT_CDN_TTL` (default 604800)
    /// - `REFRACT_DOMAIN` (default unset)
    /// - `REFRACT_ALLOW_HOSTS` (comma separated, default empty)
    /// - `REFRACT_PUBLIC_DOMAIN` (default "localhost")
    pub fn from_env() -> Self {
        let default = ServeConfig::default();
        ServeConfig {
            port: env_parsed("REFRACT_PORT").unwrap_or(default.port),
            max_fetches: env_parsed("REFRACT_MAX_FETCHES").unwrap_or(default.max_fetches),
            max_fetches_per_origin: env_parsed("REFRACT_MAX_FETCHES_PER_ORIGIN")
                .unwrap_or(default.max_fetches_per_origin),
            cdn_ttl: env_parsed("REFRACT_CDN_TTL").unwrap_or(default.cdn_ttl),
            domain: std::env::var("REFRACT_DOMAIN").ok().filter(|d| !d.is_empty()),
            allowed_referers: std::env::var("REFRACT_ALLOW_HOSTS")
                .map(|hosts| split_hosts(&hosts))
                .unwrap_or_default(),
            public_domain: std::env::var("REFRACT_PUBLIC_DOMAIN")
                .unwrap_or(default.public_domain),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

/// Splits a comma-separated host list, dropping empty entries.
pub(crate) fn split_hosts(hosts: &str) -> Vec<String> {
    hosts
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_conventions() {
        let config = ServeConfig::default();
        assert_eq!(config.port, 3002);
        assert_eq!(config.cdn_ttl, 604_800);
        assert!(config.allowed_referers.is_empty());
    }

    #[test]
    fn split_hosts_drops_empties() {
        assert_eq!(
            split_hosts("a.com, b.org,,"),
            vec!["a.com".to_string(), "b.org".to_string()]
        );
        assert!(split_hosts("").is_empty());
    }
}
