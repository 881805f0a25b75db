use std::collections::HashSet;
use std::sync::Arc;

use crate::dispatch::{ApiResponse, Dispatcher, RequestSpec};
use crate::error::LookupError;
use crate::types::FetchAttempt;

/// Path shapes the provider has used for a location's custom values, in the
/// order they are tried. `id` must already be percent-encoded.
pub fn custom_value_paths(id: &str) -> [String; 5] {
    [
        format!("/locations/{id}/customValues"),
        format!("/locations/{id}/custom-values"),
        format!("/locations/{id}/customValue"),
        format!("/custom-values?locationId={id}"),
        format!("/customValues?locationId={id}"),
    ]
}

/// Result of a probe that did not fail outright.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// The first 2xx response, or `None` when every candidate returned 404.
    pub response: Option<ApiResponse>,
    pub attempts: Vec<FetchAttempt>,
}

/// Walks candidate path patterns across the primary host and, if that host
/// is one of the two canonical ones, the other canonical host.
#[derive(Debug)]
pub struct EndpointProber {
    dispatcher: Arc<Dispatcher>,
    canonical_hosts: [String; 2],
}

impl EndpointProber {
    pub fn new(dispatcher: Arc<Dispatcher>, canonical_hosts: [String; 2]) -> Self {
        Self {
            dispatcher,
            canonical_hosts,
        }
    }

    /// The canonical host to fall back to from `base_url`, if any.
    pub fn alternate_host(&self, base_url: &str) -> Option<&str> {
        let base = normalize_host(base_url);
        let [a, b] = &self.canonical_hosts;
        if base == normalize_host(a) {
            Some(b.as_str())
        } else if base == normalize_host(b) {
            Some(a.as_str())
        } else {
            None
        }
    }

    /// Probe for `resource_id` starting at `base_url`.
    ///
    /// Stops at the first 2xx. A 404 moves on to the next candidate; any
    /// other failure ends the probe and is returned with the trail so far.
    pub async fn probe(&self, base_url: &str, resource_id: &str) -> Result<ProbeOutcome, LookupError> {
        let paths = custom_value_paths(&encode_segment(resource_id));
        let mut hosts = vec![base_url.to_string()];
        if let Some(alt) = self.alternate_host(base_url) {
            hosts.push(alt.to_string());
        }

        let mut attempts = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for host in &hosts {
            for path in &paths {
                let spec = RequestSpec::get(host, path);
                match spec.url() {
                    Ok(url) if !seen.insert(url.to_string()) => continue,
                    Ok(_) => {}
                    Err(e) => return Err(LookupError::new(e, attempts)),
                }

                let resp = match self.dispatcher.fetch(&spec, &mut attempts).await {
                    Ok(resp) => resp,
                    Err(e) => return Err(LookupError::new(e, attempts)),
                };

                if resp.is_success() {
                    tracing::debug!(url = %resp.url, "probe matched");
                    return Ok(ProbeOutcome {
                        response: Some(resp),
                        attempts,
                    });
                }
                if !resp.is_not_found() {
                    tracing::warn!(status = resp.status, url = %resp.url, "probe stopped on non-404 failure");
                    let err = resp.to_error();
                    return Err(LookupError::new(err, attempts));
                }
                tracing::debug!(url = %resp.url, "probe candidate not found");
            }
            tracing::debug!(host = %host, "every path pattern returned 404");
        }

        Ok(ProbeOutcome {
            response: None,
            attempts,
        })
    }
}

fn normalize_host(url: &str) -> String {
    url.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Percent-encode an identifier for use as a single path segment or query
/// value.
pub fn encode_segment(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(b as char);
            }
            _ => result.push_str(&format!("%{b:02X}")),
        }
    }
    result
}
