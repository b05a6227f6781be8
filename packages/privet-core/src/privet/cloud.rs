use super::task::DeferredTask;
use crate::message::Responder;
use crate::ports::{
    AccountResolver, ConfirmFlow, ConfirmFlowFactory, ConfirmStatus, ResolvedAccounts,
    TokenProvider,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;

const PROXY_HEADER: &str = "X-CloudPrint-Proxy";
const PROXY_HEADER_VALUE: &str = "Chrome";

#[derive(Debug, Deserialize)]
struct ListResponse {
    request: Option<ListRequest>,
}

#[derive(Debug, Deserialize)]
struct ListRequest {
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    xsrf_token: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmResponse {
    #[serde(default)]
    success: bool,
}

fn parse_list_response(body: &str) -> Result<ResolvedAccounts> {
    let parsed: ListResponse = serde_json::from_str(body).context("Failed to parse account list")?;
    let request = parsed
        .request
        .ok_or_else(|| anyhow::anyhow!("Account list response has no request section"))?;
    Ok(ResolvedAccounts {
        accounts: request.users,
        xsrf_token: request.xsrf_token,
    })
}

fn parse_confirm_response(body: &str) -> ConfirmStatus {
    match serde_json::from_str::<ConfirmResponse>(body) {
        Ok(ConfirmResponse { success: true }) => ConfirmStatus::Success,
        _ => ConfirmStatus::Failure,
    }
}

/// Lists the cookie-session accounts of the cloud service
#[derive(Debug, Clone)]
pub struct CloudAccountResolver {
    http: reqwest::Client,
}

impl CloudAccountResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn list(&self, base_url: &str, user_index: u32) -> Result<ResolvedAccounts> {
        let url = format!("{}/list", base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .query(&[("proxy", "none".to_string()), ("user", user_index.to_string())])
            .header(PROXY_HEADER, PROXY_HEADER_VALUE)
            .send()
            .await
            .context("Failed to list cloud accounts")?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!("Server returned error: {}", resp.status()));
        }
        let body = resp.text().await.context("Failed to read account list")?;
        parse_list_response(&body)
    }
}

impl AccountResolver for CloudAccountResolver {
    fn resolve(&self, base_url: &str, user_index: u32, responder: Responder<ResolvedAccounts>) {
        let resolver = self.clone();
        let base_url = base_url.to_string();
        tokio::spawn(async move {
            let accounts = match resolver.list(&base_url, user_index).await {
                Ok(accounts) => {
                    tracing::debug!(
                        "Cloud lists {} accounts (user index {})",
                        accounts.accounts.len(),
                        user_index
                    );
                    accounts
                }
                Err(e) => {
                    tracing::warn!("Account resolution failed: {:#}", e);
                    ResolvedAccounts::default()
                }
            };
            responder.respond(accounts);
        });
    }
}

/// How a confirm request authenticates
enum ConfirmAuth {
    Bearer(Arc<dyn TokenProvider>),
    Cookie { user_index: u32, xsrf_token: String },
}

/// Issues cloud-side claim confirmations
#[derive(Debug, Clone)]
pub struct CloudConfirmFlows {
    http: reqwest::Client,
}

impl CloudConfirmFlows {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn flow(
        &self,
        auth: ConfirmAuth,
        claim_url: &str,
        responder: Responder<ConfirmStatus>,
    ) -> Box<dyn ConfirmFlow> {
        let http = self.http.clone();
        let claim_url = claim_url.to_string();
        let task = DeferredTask::new(async move {
            let status = match confirm(&http, auth, &claim_url).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!("Confirm request failed: {:#}", e);
                    ConfirmStatus::Failure
                }
            };
            responder.respond(status);
        });
        Box::new(CloudConfirmFlow { task })
    }
}

async fn confirm(http: &reqwest::Client, auth: ConfirmAuth, claim_url: &str) -> Result<ConfirmStatus> {
    let request = http.get(claim_url).header(PROXY_HEADER, PROXY_HEADER_VALUE);
    let request = match auth {
        ConfirmAuth::Bearer(provider) => {
            let token = provider
                .access_token()
                .await
                .context("Failed to get access token")?;
            request.bearer_auth(token)
        }
        ConfirmAuth::Cookie {
            user_index,
            xsrf_token,
        } => request.query(&[("user", user_index.to_string()), ("xsrf", xsrf_token)]),
    };

    let resp = request.send().await.context("Failed to send confirm request")?;
    if !resp.status().is_success() {
        tracing::warn!("Confirm returned {}", resp.status());
        return Ok(ConfirmStatus::Failure);
    }
    let body = resp.text().await.context("Failed to read confirm response")?;
    Ok(parse_confirm_response(&body))
}

impl ConfirmFlowFactory for CloudConfirmFlows {
    fn bearer(
        &self,
        provider: Arc<dyn TokenProvider>,
        claim_url: &str,
        responder: Responder<ConfirmStatus>,
    ) -> Box<dyn ConfirmFlow> {
        self.flow(ConfirmAuth::Bearer(provider), claim_url, responder)
    }

    fn cookie(
        &self,
        user_index: u32,
        xsrf_token: &str,
        claim_url: &str,
        responder: Responder<ConfirmStatus>,
    ) -> Box<dyn ConfirmFlow> {
        let auth = ConfirmAuth::Cookie {
            user_index,
            xsrf_token: xsrf_token.to_string(),
        };
        self.flow(auth, claim_url, responder)
    }
}

struct CloudConfirmFlow {
    task: DeferredTask,
}

impl ConfirmFlow for CloudConfirmFlow {
    fn start(&mut self) {
        self.task.start();
    }
}
