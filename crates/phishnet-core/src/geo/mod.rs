//! IP geolocation
//!
//! Best-effort collaborator: lookups that fail for any reason resolve to
//! Unknown fields, never to an error for the caller.

use async_trait::async_trait;
use phishnet_common::config::GeoConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolved location for a source IP
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl GeoInfo {
    /// The value used whenever nothing could be resolved
    pub fn unknown() -> Self {
        Self {
            country: "Unknown".to_string(),
            region: "Unknown".to_string(),
            city: "Unknown".to_string(),
            latitude: None,
            longitude: None,
        }
    }
}

/// Boundary to the geolocation collaborator
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Resolve a source IP; returns Unknown fields on any failure
    async fn locate(&self, ip: &str) -> GeoInfo;
}

/// Resolver that never looks anything up. Used when no lookup token is
/// configured.
pub struct NullGeoResolver;

#[async_trait]
impl GeoResolver for NullGeoResolver {
    async fn locate(&self, _ip: &str) -> GeoInfo {
        GeoInfo::unknown()
    }
}

#[derive(Debug, Deserialize)]
struct IpinfoResponse {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    city: Option<String>,
    /// "lat,lon"
    #[serde(default)]
    loc: Option<String>,
}

/// ipinfo.io-backed resolver
pub struct IpinfoResolver {
    config: GeoConfig,
    client: Client,
}

impl IpinfoResolver {
    /// Create a new resolver
    pub fn new(config: GeoConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Strip an IPv4-mapped IPv6 prefix
    fn clean_ip(ip: &str) -> &str {
        ip.strip_prefix("::ffff:").unwrap_or(ip)
    }

    fn parse_loc(loc: &str) -> (Option<f64>, Option<f64>) {
        match loc.split_once(',') {
            Some((lat, lon)) => (lat.trim().parse().ok(), lon.trim().parse().ok()),
            None => (None, None),
        }
    }

    async fn lookup(&self, ip: &str) -> Result<GeoInfo, reqwest::Error> {
        let url = format!("{}/{}/json", self.config.endpoint, Self::clean_ip(ip));

        let mut request = self.client.get(&url);
        if let Some(ref token) = self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        let body: IpinfoResponse = response.json().await?;

        let (latitude, longitude) = body
            .loc
            .as_deref()
            .map(Self::parse_loc)
            .unwrap_or((None, None));

        Ok(GeoInfo {
            country: body.country.unwrap_or_else(|| "Unknown".to_string()),
            region: body.region.unwrap_or_else(|| "Unknown".to_string()),
            city: body.city.unwrap_or_else(|| "Unknown".to_string()),
            latitude,
            longitude,
        })
    }
}

#[async_trait]
impl GeoResolver for IpinfoResolver {
    async fn locate(&self, ip: &str) -> GeoInfo {
        match self.lookup(ip).await {
            Ok(info) => {
                debug!(ip = %ip, country = %info.country, "Resolved source location");
                info
            }
            Err(e) => {
                warn!(ip = %ip, "Geolocation lookup failed: {}", e);
                GeoInfo::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_null_resolver_returns_unknown() {
        let info = NullGeoResolver.locate("203.0.113.7").await;
        assert_eq!(info, GeoInfo::unknown());
    }

    #[test]
    fn test_clean_ip_strips_mapped_prefix() {
        assert_eq!(IpinfoResolver::clean_ip("::ffff:203.0.113.7"), "203.0.113.7");
        assert_eq!(IpinfoResolver::clean_ip("203.0.113.7"), "203.0.113.7");
    }

    #[test]
    fn test_parse_loc() {
        assert_eq!(
            IpinfoResolver::parse_loc("37.3860,-122.0838"),
            (Some(37.3860), Some(-122.0838))
        );
        assert_eq!(IpinfoResolver::parse_loc("garbage"), (None, None));
    }

    #[tokio::test]
    async fn test_lookup_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/203.0.113.7/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ip": "203.0.113.7",
                "city": "Helsinki",
                "region": "Uusimaa",
                "country": "FI",
                "loc": "60.1695,24.9354"
            })))
            .mount(&server)
            .await;

        let resolver = IpinfoResolver::new(GeoConfig {
            enabled: true,
            endpoint: server.uri(),
            token: None,
            timeout_secs: 2,
        });

        let info = resolver.locate("203.0.113.7").await;
        assert_eq!(info.country, "FI");
        assert_eq!(info.city, "Helsinki");
        assert_eq!(info.latitude, Some(60.1695));
    }

    #[tokio::test]
    async fn test_lookup_failure_degrades_to_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let resolver = IpinfoResolver::new(GeoConfig {
            enabled: true,
            endpoint: server.uri(),
            token: None,
            timeout_secs: 2,
        });

        let info = resolver.locate("203.0.113.7").await;
        assert_eq!(info, GeoInfo::unknown());
    }
}
