//! RouterOS REST API transport.

use std::net::Ipv6Addr;
use std::time::Duration;

use reqwest::{Client, Response};
use url::Url;

use super::transport::{Params, Transport, TransportError, Verb};
use crate::config::DeviceConfig;
use crate::store::RawRecord;

/// Path requested by the handshake.
const IDENTITY_PATH: &str = "system/identity";

/// Transport speaking the RouterOS REST API (`/rest/...`).
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: Client,
    base: Url,
    username: String,
    password: String,
}

impl RestTransport {
    /// Build a transport for one device.
    ///
    /// `socket_timeout` applies when the device does not set its own.
    ///
    /// # Errors
    /// Returns `TransportError::Request` if the client cannot be built or the
    /// base URL is invalid.
    pub fn new(config: &DeviceConfig, socket_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.socket_timeout.unwrap_or(socket_timeout))
            .danger_accept_invalid_certs(config.use_ssl && !config.ssl_certificate_verify)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base: base_url(config)?,
            username: config.username.clone(),
            password: config.resolved_password(),
        })
    }

    /// Base URL every request path is joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::Request(format!("invalid path '{path}': {e}")))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, TransportError> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Transport for RestTransport {
    async fn handshake(&self) -> Result<(), TransportError> {
        self.call(IDENTITY_PATH, &Verb::Print, &Params::new())
            .await
            .map(|_| ())
    }

    async fn call(
        &self,
        path: &str,
        verb: &Verb,
        params: &Params,
    ) -> Result<Vec<RawRecord>, TransportError> {
        let request = match verb {
            Verb::Print => {
                let query: Vec<(&str, String)> = params
                    .iter()
                    .map(|(k, v)| (k.as_str(), query_value(v)))
                    .collect();
                self.client.get(self.endpoint(path)?).query(&query)
            }
            Verb::Command(cmd) => self
                .client
                .post(self.endpoint(&format!("{path}/{cmd}"))?)
                .json(params),
        };

        let start = std::time::Instant::now();
        let response = self.send(request).await?;
        let body = response.bytes().await.map_err(classify)?;
        tracing::debug!(
            path = %path,
            verb = %verb,
            duration_ms = start.elapsed().as_millis() as u64,
            "REST call completed"
        );

        decode_records(&body)
    }
}

fn base_url(config: &DeviceConfig) -> Result<Url, TransportError> {
    let scheme = if config.use_ssl { "https" } else { "http" };
    let host = if config.hostname.parse::<Ipv6Addr>().is_ok() {
        format!("[{}]", config.hostname)
    } else {
        config.hostname.clone()
    };

    let mut url = Url::parse(&format!("{scheme}://{host}/rest/"))
        .map_err(|e| TransportError::Request(format!("invalid host '{}': {e}", config.hostname)))?;
    if let Some(port) = config.port {
        url.set_port(Some(port))
            .map_err(|_| TransportError::Request(format!("cannot set port {port}")))?;
    }
    Ok(url)
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if let Some(status) = err.status() {
        TransportError::Status(status.as_u16())
    } else {
        TransportError::Request(err.to_string())
    }
}

fn query_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode a response body into records.
///
/// RouterOS emits Latin-1 text; every byte maps to the code point of the same value.
pub(crate) fn decode_records(body: &[u8]) -> Result<Vec<RawRecord>, TransportError> {
    let text: String = body.iter().map(|&b| char::from(b)).collect();
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))?;

    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::Object(map) => Ok(map),
                other => Err(TransportError::Decode(format!(
                    "expected object in array, got {other}"
                ))),
            })
            .collect(),
        serde_json::Value::Object(map) => Ok(vec![map]),
        other => Err(TransportError::Decode(format!(
            "expected object or array, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_plain() {
        let config = DeviceConfig::new("192.168.88.1", "prometheus");
        let transport = RestTransport::new(&config, Duration::from_secs(2)).unwrap();
        assert_eq!(transport.base_url().as_str(), "http://192.168.88.1/rest/");
    }

    #[test]
    fn test_base_url_ssl_port_ipv6() {
        let mut config = DeviceConfig::new("fd00::1", "prometheus").with_port(8443);
        config.use_ssl = true;
        let transport = RestTransport::new(&config, Duration::from_secs(2)).unwrap();
        assert_eq!(transport.base_url().as_str(), "https://[fd00::1]:8443/rest/");
    }

    #[test]
    fn test_endpoint_join() {
        let config = DeviceConfig::new("router.lan", "prometheus");
        let transport = RestTransport::new(&config, Duration::from_secs(2)).unwrap();
        let url = transport.endpoint("/ip/dhcp-server/lease").unwrap();
        assert_eq!(url.as_str(), "http://router.lan/rest/ip/dhcp-server/lease");
    }

    #[test]
    fn test_decode_array() {
        let body = br#"[{".id":"*1","name":"ether1"},{".id":"*2","name":"ether2"}]"#;
        let records = decode_records(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["name"], "ether2");
    }

    #[test]
    fn test_decode_single_object() {
        let records = decode_records(br#"{"name":"core"}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "core");
    }

    #[test]
    fn test_decode_latin1() {
        // 0xE9 is 'é' in Latin-1 and invalid as a lone UTF-8 byte
        let body = b"[{\"comment\":\"caf\xe9\"}]";
        let records = decode_records(body).unwrap();
        assert_eq!(records[0]["comment"], "café");
    }

    #[test]
    fn test_decode_rejects_scalars() {
        assert!(matches!(
            decode_records(b"42"),
            Err(TransportError::Decode(_))
        ));
        assert!(matches!(
            decode_records(b"[1,2]"),
            Err(TransportError::Decode(_))
        ));
        assert!(matches!(
            decode_records(b"not json"),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_empty_body() {
        assert!(decode_records(b"").unwrap().is_empty());
    }

    #[test]
    fn test_query_value() {
        assert_eq!(query_value(&serde_json::json!("yes")), "yes");
        assert_eq!(query_value(&serde_json::json!(true)), "true");
    }
}
