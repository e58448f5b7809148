//! HTTP client for the Hubitat Maker API.
//!
//! [`HubClient`] wraps `reqwest::Client` and exposes the three hub operations
//! the tools need. Every request carries the access token as the
//! `access_token` query parameter; there is no other authentication.
//!
//! ## Error handling
//!
//! Failures are split three ways so callers can tell them apart:
//!
//! - transport failures (DNS, refused connection, timeout) → [`ClientError::Network`]
//! - non-2xx responses → [`ClientError::Hub`] with the status and raw body
//! - 2xx responses that don't parse → [`ClientError::Decode`]
//!
//! Network error text is built from `reqwest::Error::without_url`, so the
//! token-bearing request URL never ends up in a message shown to the caller.
//!
//! There are no retries: each call is a single attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::HubConfig;
use crate::device::Device;

/// The hub operations tool handlers depend on.
///
/// [`HubClient`] is the real implementation; tests drive the dispatcher with
/// stubs.
#[async_trait]
pub trait HubApi: Send + Sync {
    /// `GET {base}/all` — every device with its current state.
    async fn list_devices(&self) -> Result<Vec<Device>, ClientError>;

    /// `POST {base}/{device_id}/{command}` — a command without arguments.
    async fn send_command(&self, device_id: &str, command: &str) -> Result<(), ClientError>;

    /// `POST {base}/{device_id}/{command}/{value}` — a command with one
    /// pre-formatted argument.
    async fn send_command_with_value(
        &self,
        device_id: &str,
        command: &str,
        value: &str,
    ) -> Result<(), ClientError>;
}

/// HTTP client for a single hub.
pub struct HubClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl HubClient {
    /// Create a client for the configured hub.
    pub fn new(hub: HubConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hubitat-mcp/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(network_error)?;
        Ok(Self {
            http,
            base_url: hub.base_url,
            token: hub.token,
        })
    }

    /// The Maker API base URL (no token).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base}/{segments..}?access_token={token}`, percent-encoding
    /// each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::BaseUrl)?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("access_token", self.token.expose_secret());
        Ok(url)
    }

    async fn post(&self, segments: &[&str]) -> Result<(), ClientError> {
        let url = self.endpoint(segments)?;
        let request = self.http.post(url).body(String::new());
        Self::execute(request).await.map(|_| ())
    }

    /// Send a request and return the body of a 2xx response.
    async fn execute(request: reqwest::RequestBuilder) -> Result<String, ClientError> {
        let resp = request.send().await.map_err(network_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(network_error)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(ClientError::Hub {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl HubApi for HubClient {
    async fn list_devices(&self) -> Result<Vec<Device>, ClientError> {
        debug!("hub: GET /all");
        let url = self.endpoint(&["all"])?;
        let body = Self::execute(self.http.get(url)).await?;
        serde_json::from_str(&body).map_err(ClientError::Decode)
    }

    async fn send_command(&self, device_id: &str, command: &str) -> Result<(), ClientError> {
        debug!(device_id, command, "hub: POST command");
        self.post(&[device_id, command]).await
    }

    async fn send_command_with_value(
        &self,
        device_id: &str,
        command: &str,
        value: &str,
    ) -> Result<(), ClientError> {
        debug!(device_id, command, value, "hub: POST command with value");
        self.post(&[device_id, command, value]).await
    }
}

fn network_error(e: reqwest::Error) -> ClientError {
    ClientError::Network(e.without_url().to_string())
}

/// Errors returned by [`HubApi`] methods.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The hub could not be reached (connection refused, timeout, DNS failure, etc.).
    #[error("failed to reach hub: {0}")]
    Network(String),
    /// The hub answered with a non-2xx status.
    #[error("hubitat API returned status {status}: {body}")]
    Hub { status: u16, body: String },
    /// A 2xx response body didn't match the expected device array.
    #[error("failed to decode devices: {0}")]
    Decode(#[source] serde_json::Error),
    /// The configured base URL can't take path segments.
    #[error("hub base URL cannot be used for API paths")]
    BaseUrl,
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    const TOKEN: &str = "s3cret-token";

    type Seen = Arc<Mutex<Vec<String>>>;

    fn client_for(base: &str) -> HubClient {
        HubClient::new(HubConfig {
            base_url: Url::parse(base).unwrap(),
            token: SecretString::from(TOKEN),
        })
        .unwrap()
    }

    /// Serve `router` on an ephemeral port, returning the Maker API base URL.
    async fn spawn_hub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/apps/api/4/devices")
    }

    fn recording_hub(seen: Seen) -> Router {
        async fn all(
            State(seen): State<Seen>,
            Query(q): Query<HashMap<String, String>>,
        ) -> Json<serde_json::Value> {
            seen.lock()
                .unwrap()
                .push(format!("GET all token={}", q["access_token"]));
            Json(json!([
                { "id": "1", "label": "Lamp", "type": "Dimmer", "capabilities": ["Switch"] }
            ]))
        }
        async fn command(
            State(seen): State<Seen>,
            Path((id, cmd)): Path<(String, String)>,
        ) -> &'static str {
            seen.lock().unwrap().push(format!("POST {id}/{cmd}"));
            "ok"
        }
        async fn command_value(
            State(seen): State<Seen>,
            Path((id, cmd, value)): Path<(String, String, String)>,
        ) -> &'static str {
            seen.lock().unwrap().push(format!("POST {id}/{cmd}/{value}"));
            "ok"
        }

        Router::new()
            .route("/apps/api/4/devices/all", get(all))
            .route("/apps/api/4/devices/{id}/{cmd}", post(command))
            .route("/apps/api/4/devices/{id}/{cmd}/{value}", post(command_value))
            .with_state(seen)
    }

    #[test]
    fn endpoint_appends_segments_and_token() {
        let client = client_for("http://hub.local/apps/api/4/devices/");
        let url = client.endpoint(&["12", "setLevel", "57"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://hub.local/apps/api/4/devices/12/setLevel/57?access_token=s3cret-token"
        );
    }

    #[test]
    fn endpoint_percent_encodes_segments() {
        let client = client_for("http://hub.local/apps/api/4/devices");
        let url = client.endpoint(&["a b", "x/y"]).unwrap();
        assert_eq!(url.path(), "/apps/api/4/devices/a%20b/x%2Fy");
    }

    #[test]
    fn client_debug_does_not_leak_token() {
        let hub = HubConfig {
            base_url: Url::parse("http://hub.local/apps/api/4/devices").unwrap(),
            token: SecretString::from(TOKEN),
        };
        assert!(!format!("{hub:?}").contains(TOKEN));
    }

    #[tokio::test]
    async fn list_devices_sends_token_and_decodes() {
        let seen = Seen::default();
        let base = spawn_hub(recording_hub(seen.clone())).await;
        let devices = client_for(&base).list_devices().await.unwrap();

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].label, "Lamp");
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [format!("GET all token={TOKEN}")]
        );
    }

    #[tokio::test]
    async fn commands_hit_expected_paths() {
        let seen = Seen::default();
        let base = spawn_hub(recording_hub(seen.clone())).await;
        let client = client_for(&base);

        client.send_command("5", "on").await.unwrap();
        client
            .send_command_with_value("5", "setLevel", "57")
            .await
            .unwrap();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["POST 5/on", "POST 5/setLevel/57"]
        );
    }

    #[tokio::test]
    async fn non_success_status_carries_status_and_body() {
        let router =
            Router::new().fallback(|| async { (StatusCode::SERVICE_UNAVAILABLE, "offline") });
        let base = spawn_hub(router).await;
        let client = client_for(&base);

        let err = client.list_devices().await.unwrap_err();
        assert!(matches!(err, ClientError::Hub { status: 503, ref body } if body == "offline"));

        let err = client.send_command("1", "on").await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("503"), "{text}");
        assert!(text.contains("offline"), "{text}");
    }

    #[tokio::test]
    async fn non_array_body_is_a_decode_error() {
        let router = Router::new().fallback(|| async { Json(json!({ "error": "nope" })) });
        let base = spawn_hub(router).await;

        let err = client_for(&base).list_devices().await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)), "{err}");
    }

    #[tokio::test]
    async fn unreachable_hub_is_a_network_error_without_token() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{addr}/apps/api/4/devices"));
        let err = client.send_command("1", "on").await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)), "{err}");
        assert!(!err.to_string().contains(TOKEN));
    }
}
