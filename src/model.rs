use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use http::uri::{self, Uri};

use crate::exposition::SampleError;

/// The gateway whose own metrics are scanned, and whose delete API is relative
/// to the same url.
#[derive(Debug, Clone)]
pub struct GatewayEndpoint {
    pub scrape_uri: Uri,
}

impl GatewayEndpoint {
    pub fn new(
        listen_address: &str,
        route_prefix: &str,
        metrics_path: &str,
    ) -> Result<Self, http::Error> {
        let mut path = normalize_route_prefix(route_prefix);
        if !metrics_path.starts_with('/') {
            path.push('/');
        }
        path.push_str(metrics_path);

        let scrape_uri = uri::Builder::new()
            .scheme("http")
            .authority(local_authority(listen_address).as_str())
            .path_and_query(path.as_str())
            .build()?;

        Ok(Self { scrape_uri })
    }

    /// Scrape url without a trailing slash; deletion paths are appended to it.
    pub fn scrape_url(&self) -> String {
        self.scrape_uri.to_string().trim_end_matches('/').to_string()
    }
}

// the gateway listens on a wildcard address, we always talk to it over loopback
fn local_authority(listen_address: &str) -> String {
    match listen_address.rsplit_once(':') {
        Some((host, port)) if host.is_empty() || host == "0.0.0.0" || host == "[::]" => {
            format!("localhost:{}", port)
        }
        _ => listen_address.to_string(),
    }
}

fn normalize_route_prefix(route_prefix: &str) -> String {
    let trimmed = route_prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// One `push_time_seconds` occurrence from a gateway scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// The matched line, kept for logging.
    pub line: String,
    /// Metric name plus label block, e.g. `push_time_seconds{job="a"}`.
    pub identity: String,
    /// Last push time, seconds since the epoch.
    pub timestamp: f64,
}

/// Labels of a sample in the order they were encountered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSet(pub Vec<(String, String)>);

impl LabelSet {
    pub fn job(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == "job")
            .map(|(_, value)| value.as_str())
    }

    /// Builds the grouping key path understood by the gateway's delete api:
    /// `/job/<job>` followed by `/<label>/<value>` for every other label.
    pub fn grouping_path(&self) -> Result<String, SampleError> {
        let job = self.job().ok_or(SampleError::MissingJob)?;

        let mut path = String::new();
        push_segment(&mut path, "job", job);
        for (key, value) in self.0.iter().filter(|(key, _)| key != "job") {
            push_segment(&mut path, key, value);
        }

        Ok(path)
    }
}

fn push_segment(path: &mut String, key: &str, value: &str) {
    path.push('/');
    path.push_str(key);
    if value.is_empty() {
        // an empty value has no plain path representation
        path.push_str("@base64/=");
    } else if !value.chars().all(is_plain_path_char) {
        path.push_str("@base64/");
        path.push_str(&URL_SAFE.encode(value));
    } else {
        path.push('/');
        path.push_str(value);
    }
}

// rfc 3986 unreserved characters plus `:` and `@`, which survive a path
// segment unchanged
fn is_plain_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | ':' | '@')
}
