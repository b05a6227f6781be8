use super::task::DeferredTask;
use crate::config::PrivetSettings;
use crate::device::HostPort;
use crate::error::{FailureReason, ProtocolFailure};
use crate::message::{RegisterDelegate, Responder};
use crate::ports::{
    DeviceHttpClient, HttpClientFactory, InfoOperation, InfoResponse, RegisterOperation,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::sync::oneshot;

const PRIVET_TOKEN_HEADER: &str = "X-Privet-Token";
/// Token sent before the device has issued one
const EMPTY_PRIVET_TOKEN: &str = "\"\"";

const ACTION_INFO: &str = "info";
const ACTION_START: &str = "start";
const ACTION_GET_CLAIM_TOKEN: &str = "getClaimToken";
const ACTION_COMPLETE: &str = "complete";

const ERROR_PENDING_USER_ACTION: &str = "pending_user_action";

/// Resolves advertised host:port pairs into [`PrivetHttpClient`]s
#[derive(Debug, Clone)]
pub struct PrivetClientFactory {
    http: reqwest::Client,
    settings: PrivetSettings,
}

impl PrivetClientFactory {
    pub fn new(http: reqwest::Client, settings: PrivetSettings) -> Self {
        Self { http, settings }
    }
}

async fn resolve_address(address: &HostPort) -> Option<SocketAddr> {
    if address.is_unset() {
        return None;
    }
    match tokio::net::lookup_host((address.host.as_str(), address.port)).await {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            tracing::warn!("Failed to resolve {}: {}", address, e);
            None
        }
    }
}

impl HttpClientFactory for PrivetClientFactory {
    fn create_client(
        &self,
        name: &str,
        address: &HostPort,
        responder: Responder<Option<Box<dyn DeviceHttpClient>>>,
    ) {
        let http = self.http.clone();
        let settings = self.settings.clone();
        let name = name.to_string();
        let address = address.clone();

        tokio::spawn(async move {
            let client = resolve_address(&address).await.map(|addr| {
                tracing::debug!("Resolved '{}' ({}) to {}", name, address, addr);
                Box::new(PrivetHttpClient::new(name, addr, http, settings)) as Box<dyn DeviceHttpClient>
            });
            responder.respond(client);
        });
    }
}

/// HTTP client for one device's `/privet` endpoints
#[derive(Debug, Clone)]
pub struct PrivetHttpClient {
    name: String,
    base_url: String,
    http: reqwest::Client,
    settings: PrivetSettings,
}

impl PrivetHttpClient {
    pub fn new(
        name: impl Into<String>,
        addr: SocketAddr,
        http: reqwest::Client,
        settings: PrivetSettings,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: format!("http://{}", addr),
            http,
            settings,
        }
    }
}

impl DeviceHttpClient for PrivetHttpClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_register_operation(
        &self,
        user: &str,
        delegate: RegisterDelegate,
    ) -> Box<dyn RegisterOperation> {
        let (complete_tx, complete_rx) = oneshot::channel();
        let session = Registration {
            client: self.clone(),
            user: user.to_string(),
        };
        let task = DeferredTask::new(async move {
            if let Err(failure) = session.run(&delegate, complete_rx).await {
                delegate.on_protocol_error(failure);
            }
        });
        Box::new(PrivetRegisterOperation {
            task,
            complete_tx: Some(complete_tx),
        })
    }

    fn create_info_operation(&self, responder: Responder<InfoResponse>) -> Box<dyn InfoOperation> {
        let client = self.clone();
        let task = DeferredTask::new(async move {
            responder.respond(client.fetch_info().await);
        });
        Box::new(PrivetInfoOperation { task })
    }
}

impl PrivetHttpClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch_info(&self) -> InfoResponse {
        let resp = match self
            .http
            .get(self.url("/privet/info"))
            .header(PRIVET_TOKEN_HEADER, EMPTY_PRIVET_TOKEN)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Info request to '{}' failed: {}", self.name, e);
                return InfoResponse {
                    http_code: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    payload: None,
                };
            }
        };

        let http_code = resp.status().as_u16();
        let payload = if resp.status().is_success() {
            resp.json::<Value>().await.ok().filter(Value::is_object)
        } else {
            None
        };
        InfoResponse { http_code, payload }
    }
}

struct PrivetInfoOperation {
    task: DeferredTask,
}

impl InfoOperation for PrivetInfoOperation {
    fn start(&mut self) {
        self.task.start();
    }
}

struct PrivetRegisterOperation {
    task: DeferredTask,
    complete_tx: Option<oneshot::Sender<()>>,
}

impl RegisterOperation for PrivetRegisterOperation {
    fn start(&mut self) {
        self.task.start();
    }

    fn complete_registration(&mut self) {
        if let Some(tx) = self.complete_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Answer of a `/privet/register` action
#[derive(Debug, Clone, PartialEq)]
enum RegisterReply {
    Body(Value),
    /// The device is still waiting for the user to confirm on the device
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ClaimToken {
    token: String,
    claim_url: Option<String>,
}

fn parse_privet_token(body: &Value) -> Result<String, ProtocolFailure> {
    body.get("x-privet-token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProtocolFailure::new(ACTION_INFO, FailureReason::Token))
}

fn parse_register_reply(action: &str, body: Value) -> Result<RegisterReply, ProtocolFailure> {
    match body.get("error").and_then(Value::as_str) {
        Some(ERROR_PENDING_USER_ACTION) if action == ACTION_GET_CLAIM_TOKEN => {
            Ok(RegisterReply::Pending)
        }
        Some(_) => Err(ProtocolFailure::new(action, FailureReason::Device).with_detail(body)),
        None => Ok(RegisterReply::Body(body)),
    }
}

fn parse_claim_token(body: &Value) -> Result<ClaimToken, ProtocolFailure> {
    let token = body
        .get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ProtocolFailure::new(ACTION_GET_CLAIM_TOKEN, FailureReason::MalformedResponse)
                .with_detail(body.clone())
        })?;
    let claim_url = body
        .get("claim_url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .map(str::to_string);
    Ok(ClaimToken {
        token: token.to_string(),
        claim_url,
    })
}

fn parse_device_id(body: &Value) -> Result<String, ProtocolFailure> {
    body.get("device_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ProtocolFailure::new(ACTION_COMPLETE, FailureReason::MalformedResponse)
                .with_detail(body.clone())
        })
}

/// One run of the device-local register protocol
struct Registration {
    client: PrivetHttpClient,
    user: String,
}

impl Registration {
    async fn run(
        &self,
        delegate: &RegisterDelegate,
        complete: oneshot::Receiver<()>,
    ) -> Result<(), ProtocolFailure> {
        let token = self.privet_token().await?;
        self.call(&token, ACTION_START).await?;

        let claim = self.poll_claim_token(&token).await?;
        tracing::info!("Device '{}' issued a claim token", self.client.name);
        delegate.on_claim_token(claim.token, claim.claim_url);

        complete.await.map_err(|_| {
            ProtocolFailure::new(ACTION_COMPLETE, FailureReason::Device)
                .with_detail(json!({ "error": "registration abandoned" }))
        })?;

        let body = match self.call(&token, ACTION_COMPLETE).await? {
            RegisterReply::Body(body) => body,
            RegisterReply::Pending => {
                return Err(ProtocolFailure::new(ACTION_COMPLETE, FailureReason::MalformedResponse))
            }
        };
        let device_id = parse_device_id(&body)?;
        tracing::info!("Device '{}' registered as {}", self.client.name, device_id);
        delegate.on_done(device_id);
        Ok(())
    }

    async fn privet_token(&self) -> Result<String, ProtocolFailure> {
        let info = self.client.fetch_info().await;
        if info.http_code != 200 {
            return Err(
                ProtocolFailure::new(ACTION_INFO, FailureReason::HttpError).with_http_code(info.http_code)
            );
        }
        let payload = info
            .payload
            .ok_or_else(|| ProtocolFailure::new(ACTION_INFO, FailureReason::JsonError))?;
        parse_privet_token(&payload)
    }

    async fn call(&self, token: &str, action: &str) -> Result<RegisterReply, ProtocolFailure> {
        let resp = self
            .client
            .http
            .post(self.client.url("/privet/register"))
            .query(&[("action", action), ("user", self.user.as_str())])
            .header(PRIVET_TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| {
                ProtocolFailure::new(action, FailureReason::Network).with_detail(json!(e.to_string()))
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProtocolFailure::new(action, FailureReason::HttpError).with_http_code(status.as_u16()));
        }
        let body: Value = resp.json().await.map_err(|_| {
            ProtocolFailure::new(action, FailureReason::JsonError).with_http_code(status.as_u16())
        })?;
        parse_register_reply(action, body).map_err(|f| f.with_http_code(status.as_u16()))
    }

    async fn poll_claim_token(&self, token: &str) -> Result<ClaimToken, ProtocolFailure> {
        let settings = &self.client.settings;
        for attempt in 1..=settings.claim_poll_attempts {
            match self.call(token, ACTION_GET_CLAIM_TOKEN).await? {
                RegisterReply::Body(body) => return parse_claim_token(&body),
                RegisterReply::Pending => {
                    tracing::debug!(
                        "Waiting for user action on '{}' (attempt {}/{})",
                        self.client.name,
                        attempt,
                        settings.claim_poll_attempts
                    );
                    tokio::time::sleep(settings.claim_poll_interval).await;
                }
            }
        }
        Err(ProtocolFailure::new(ACTION_GET_CLAIM_TOKEN, FailureReason::Device)
            .with_detail(json!({ "error": ERROR_PENDING_USER_ACTION })))
    }
}
