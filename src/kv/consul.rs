//! Consul HTTP API backend
//!
//! Implements `KvClient` over Consul's `/v1/kv` and `/v1/session` endpoints.
//! Requests run on the blocking pool so the async store never stalls its
//! caller's executor thread. HTTP 404 maps to `Ok(None)`; every other
//! non-success status is a transport error carrying the response body.

use crate::config::{Consistency, Endpoint, StoreConfig};
use crate::error::{ContextError, ContextResult};
use crate::kv::client::{KvClient, KvEntry, LockMode, SessionEntry, SessionRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};
use ureq::tls::{Certificate, RootCerts, TlsConfig};
use ureq::Agent;

const TOKEN_HEADER: &str = "X-Consul-Token";

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Put,
    Delete,
}

/// Session body accepted by `PUT /v1/session/create`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateSession<'a> {
    name: &'a str,
    node: &'a str,
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lock_delay: Option<String>,
    behavior: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreatedSession {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionInfo {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Node", default)]
    node: String,
    #[serde(rename = "Name", default)]
    name: String,
}

/// Consul agent client
pub struct ConsulClient {
    agent: Agent,
    base_url: String,
    token: Option<String>,
    datacenter: Option<String>,
    consistency: Consistency,
}

impl ConsulClient {
    /// Build a client for `endpoint` using the store's call options
    pub fn new(endpoint: &Endpoint, store: &StoreConfig) -> ContextResult<Self> {
        let mut builder = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(store.timeout);

        if !endpoint.ca.is_empty() {
            let mut certs = Vec::with_capacity(endpoint.ca.len());
            for path in &endpoint.ca {
                let pem = std::fs::read(path).map_err(|e| {
                    ContextError::io(format!("reading CA certificate {}", path.display()), e)
                })?;
                let cert = Certificate::from_pem(&pem).map_err(|e| {
                    ContextError::config(format!("CA certificate {}: {}", path.display(), e))
                })?;
                certs.push(cert);
            }
            builder = builder.tls_config(
                TlsConfig::builder()
                    .root_certs(RootCerts::new_with_certs(&certs))
                    .build(),
            );
        }

        let agent: Agent = builder.build().into();
        debug!("Consul client for {}", endpoint.base_url());

        Ok(Self {
            agent,
            base_url: endpoint.base_url(),
            token: store.token.clone(),
            datacenter: store.datacenter.clone(),
            consistency: store.consistency,
        })
    }

    /// Build the URL for `api` (e.g. `kv/<key>`) with flag and value parameters
    fn url(&self, api: &str, key: &str, params: &[(&str, Option<&str>)]) -> String {
        let mut url = format!("{}/v1/{}{}", self.base_url, api, encode_path(key));
        let mut query: Vec<String> = params
            .iter()
            .map(|(name, value)| match value {
                Some(v) => format!("{}={}", name, encode_component(v)),
                None => name.to_string(),
            })
            .collect();
        if let Some(dc) = &self.datacenter {
            query.push(format!("dc={}", encode_component(dc)));
        }
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    fn read_params(&self) -> Vec<(&'static str, Option<&'static str>)> {
        match self.consistency {
            Consistency::Strong => vec![("consistent", None)],
            Consistency::Eventual => vec![],
        }
    }

    /// Run one HTTP call on the blocking pool, returning status and body
    async fn execute(
        &self,
        op: &'static str,
        path: &str,
        method: Method,
        url: String,
        body: Option<Vec<u8>>,
    ) -> ContextResult<(u16, Vec<u8>)> {
        trace!("{:?} {}", method, url);
        let agent = self.agent.clone();
        let token = self.token.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<(u16, Vec<u8>), ureq::Error> {
            let mut response = match method {
                Method::Get => {
                    let mut req = agent.get(&url);
                    if let Some(t) = &token {
                        req = req.header(TOKEN_HEADER, t.as_str());
                    }
                    req.call()?
                }
                Method::Delete => {
                    let mut req = agent.delete(&url);
                    if let Some(t) = &token {
                        req = req.header(TOKEN_HEADER, t.as_str());
                    }
                    req.call()?
                }
                Method::Put => {
                    let mut req = agent.put(&url);
                    if let Some(t) = &token {
                        req = req.header(TOKEN_HEADER, t.as_str());
                    }
                    match body {
                        Some(bytes) => req.send(&bytes[..])?,
                        None => req.send_empty()?,
                    }
                }
            };
            let status = response.status().as_u16();
            let bytes = response.body_mut().read_to_vec()?;
            Ok((status, bytes))
        })
        .await
        .map_err(|e| ContextError::Internal(format!("{} task failed: {}", op, e)))?;

        result.map_err(|e| ContextError::transport(op, path, e))
    }
}

#[async_trait]
impl KvClient for ConsulClient {
    async fn get(&self, key: &str) -> ContextResult<Option<KvEntry>> {
        let mut params = self.read_params();
        params.push(("raw", None));
        let url = self.url("kv/", key, &params);

        let (status, body) = self.execute("get", key, Method::Get, url, None).await?;
        decode_get(key, status, body)
    }

    async fn set(&self, key: &str, value: Vec<u8>, mode: &LockMode) -> ContextResult<Value> {
        let params: Vec<(&str, Option<&str>)> = match mode {
            LockMode::None => vec![],
            LockMode::Acquire(id) => vec![("acquire", Some(id.as_str()))],
            LockMode::Release(id) => vec![("release", Some(id.as_str()))],
        };
        let url = self.url("kv/", key, &params);

        let (status, body) = self.execute("set", key, Method::Put, url, Some(value)).await?;
        decode_ack("set", key, status, &body)
    }

    async fn list_keys(&self, prefix: &str) -> ContextResult<Option<Value>> {
        let mut params = self.read_params();
        params.push(("keys", None));
        let url = self.url("kv/", prefix, &params);

        let (status, body) = self.execute("list_keys", prefix, Method::Get, url, None).await?;
        decode_listing(prefix, status, &body)
    }

    async fn delete(&self, key: &str, recursive: bool) -> ContextResult<()> {
        let params: Vec<(&str, Option<&str>)> = if recursive {
            vec![("recurse", None)]
        } else {
            vec![]
        };
        let url = self.url("kv/", key, &params);

        let (status, body) = self.execute("delete", key, Method::Delete, url, None).await?;
        // Deleting something already gone is not a failure
        expect_ok("delete", key, status, &body)?;
        Ok(())
    }

    async fn session_create(&self, request: &SessionRequest) -> ContextResult<String> {
        let payload = CreateSession {
            name: &request.name,
            node: &request.node,
            ttl: request.ttl.map(go_duration),
            lock_delay: request.lock_delay.map(go_duration),
            behavior: "release",
        };
        let body = serde_json::to_vec(&payload)?;
        let url = self.url("session/create", "", &[]);

        let (status, response) = self
            .execute("session_create", &request.node, Method::Put, url, Some(body))
            .await?;
        decode_created(&request.node, status, &response)
    }

    async fn session_info(&self, id: &str) -> ContextResult<Option<SessionEntry>> {
        let url = self.url("session/info/", id, &self.read_params());

        let (status, body) = self.execute("session_info", id, Method::Get, url, None).await?;
        decode_session_info(id, status, &body)
    }

    async fn session_destroy(&self, id: &str) -> ContextResult<bool> {
        let url = self.url("session/destroy/", id, &[]);

        let (status, body) = self.execute("session_destroy", id, Method::Put, url, None).await?;
        decode_destroy(id, status, &body)
    }

    fn backend_name(&self) -> &'static str {
        "consul"
    }
}

/// Map a status to found / not found / failure
fn expect_ok(op: &'static str, path: &str, status: u16, body: &[u8]) -> ContextResult<bool> {
    match status {
        200..=299 => Ok(true),
        404 => Ok(false),
        _ => Err(ContextError::transport(
            op,
            path,
            format!("HTTP {}: {}", status, String::from_utf8_lossy(body).trim()),
        )),
    }
}

fn parse_json(op: &'static str, path: &str, body: &[u8]) -> ContextResult<Value> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| ContextError::protocol(op, path, format!("invalid JSON body: {}", e)))
}

/// `?raw` read: 404 is absent, an empty body is a key that exists without a value
fn decode_get(key: &str, status: u16, body: Vec<u8>) -> ContextResult<Option<KvEntry>> {
    if !expect_ok("get", key, status, &body)? {
        return Ok(None);
    }
    Ok(Some(KvEntry {
        key: key.to_string(),
        value: (!body.is_empty()).then_some(body),
        session: None,
    }))
}

/// Write acknowledgement, passed through for `RemoteKv` to judge
fn decode_ack(op: &'static str, key: &str, status: u16, body: &[u8]) -> ContextResult<Value> {
    if !expect_ok(op, key, status, body)? {
        return Err(ContextError::transport(op, key, "HTTP 404"));
    }
    parse_json(op, key, body)
}

fn decode_listing(prefix: &str, status: u16, body: &[u8]) -> ContextResult<Option<Value>> {
    if !expect_ok("list_keys", prefix, status, body)? {
        return Ok(None);
    }
    parse_json("list_keys", prefix, body).map(Some)
}

fn decode_created(node: &str, status: u16, body: &[u8]) -> ContextResult<String> {
    if !expect_ok("session_create", node, status, body)? {
        return Err(ContextError::transport("session_create", node, "HTTP 404"));
    }
    let created: CreatedSession = serde_json::from_slice(body).map_err(|e| {
        ContextError::protocol("session_create", node, format!("invalid response: {}", e))
    })?;
    Ok(created.id)
}

/// Consul answers an unknown session with `200 null` or an empty array
fn decode_session_info(id: &str, status: u16, body: &[u8]) -> ContextResult<Option<SessionEntry>> {
    if !expect_ok("session_info", id, status, body)? {
        return Ok(None);
    }
    let sessions: Option<Vec<SessionInfo>> = serde_json::from_slice(body).map_err(|e| {
        ContextError::protocol("session_info", id, format!("invalid response: {}", e))
    })?;
    Ok(sessions.and_then(|s| s.into_iter().next()).map(|s| SessionEntry {
        id: s.id,
        node: s.node,
        name: s.name,
    }))
}

fn decode_destroy(id: &str, status: u16, body: &[u8]) -> ContextResult<bool> {
    if !expect_ok("session_destroy", id, status, body)? {
        return Ok(false);
    }
    Ok(matches!(parse_json("session_destroy", id, body)?, Value::Bool(true)))
}

/// Format a duration the way Consul's Go parser expects
fn go_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

/// Percent-encode a key path, keeping `/` separators
fn encode_path(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for &b in key.as_bytes() {
        if is_unreserved(b) || b == b'/' || b == b':' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Percent-encode a query value
fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}
