use reqwest::blocking::Client;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

use super::config::ValidatorConfig;
use super::errors::PoolError;
use crate::core::retry::{retry, RetryPolicy};

const PROBE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.81 Safari/537.36";

/// Header carrying the expected egress identity to the probe target.
const REQUEST_IP_HEADER: &str = "Request-IP";

/// Seam for the load phase: lets tests observe and stub the live check.
pub(crate) trait EndpointProbe {
    fn probe(&self, endpoint: &Url, expected: IpAddr) -> Result<(), PoolError>;
}

/// Live "what is my egress IP" check routed through a candidate endpoint.
#[derive(Debug, Clone)]
pub struct ProxyValidator {
    config: ValidatorConfig,
}

impl ProxyValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    fn attempt(&self, endpoint: &Url, expected: IpAddr) -> Result<(), PoolError> {
        let proxy = reqwest::Proxy::all(endpoint.as_str())
            .map_err(|e| PoolError::validation(format!("bad proxy endpoint {endpoint}: {e}")))?;
        let client = Client::builder()
            .proxy(proxy)
            .timeout(Duration::from_secs(self.config.probe_timeout_secs))
            .user_agent(PROBE_USER_AGENT)
            .build()
            .map_err(|e| PoolError::validation(format!("probe client build failed: {e}")))?;

        let response = client
            .get(&self.config.probe_url)
            .header(REQUEST_IP_HEADER, expected.to_string())
            .send()
            .map_err(|e| {
                PoolError::validation(format!("probe request via {endpoint} failed: {e}"))
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| PoolError::validation(format!("probe response read failed: {e}")))?;

        check_response(status, &body, expected)?;
        tracing::info!(target = "pool", %endpoint, "proxy egress check passed");
        Ok(())
    }
}

/// Success requires a 200 and the expected address echoed in the body.
fn check_response(status: u16, body: &str, expected: IpAddr) -> Result<(), PoolError> {
    if status != 200 {
        return Err(PoolError::validation(format!("invalid status code: {status}")));
    }
    let expected = expected.to_string();
    if !body.contains(&expected) {
        return Err(PoolError::validation(format!(
            "wrong egress address reported, expected {expected}"
        )));
    }
    Ok(())
}

impl EndpointProbe for ProxyValidator {
    fn probe(&self, endpoint: &Url, expected: IpAddr) -> Result<(), PoolError> {
        let policy = RetryPolicy::new(
            self.config.probe_attempts,
            Duration::from_millis(self.config.probe_retry_delay_ms),
        );
        retry(
            &policy,
            || self.attempt(endpoint, expected),
            |err| {
                tracing::error!(
                    target = "pool",
                    %endpoint,
                    category = err.category(),
                    "proxy misbehaving: {err}"
                );
                true
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> IpAddr {
        text.parse().unwrap()
    }

    #[test]
    fn test_check_response_accepts_echoed_address() {
        let body = "<html>Your IPv6 is 2001:db8::42, hello</html>";
        assert!(check_response(200, body, addr("2001:db8::42")).is_ok());
    }

    #[test]
    fn test_check_response_rejects_non_200() {
        assert!(check_response(502, "1.2.3.4", addr("1.2.3.4")).is_err());
    }

    #[test]
    fn test_check_response_rejects_wrong_address() {
        let err = check_response(200, "you are 9.9.9.9", addr("1.2.3.4")).unwrap_err();
        assert_eq!(err.category(), "validation");
    }

    #[test]
    fn test_probe_exhausts_retries_against_dead_endpoint() {
        // Reserved TEST-NET address, nothing listens there; keep it snappy.
        let validator = ProxyValidator::new(ValidatorConfig {
            probe_url: "http://192.0.2.1/".to_string(),
            probe_timeout_secs: 1,
            probe_attempts: 2,
            probe_retry_delay_ms: 0,
        });
        let endpoint = Url::parse("http://192.0.2.1:3128").unwrap();
        let err = validator.probe(&endpoint, addr("1.2.3.4")).unwrap_err();
        assert_eq!(err.category(), "validation");
    }
}
