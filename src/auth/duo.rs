//! Duo Push provider.
//!
//! Talks to the Duo Auth API v2 over `reqwest`. Every request is signed
//! with HMAC-SHA512 over a canonical form of the call. `preauth` decides
//! whether a user has a push-capable device, an asynchronous `auth`
//! sends the push, and `auth_status` is polled with the returned
//! transaction id.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha512;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::DuoConfig;
use crate::models::user::ChatUser;
use crate::{AppError, BoxFuture, Result};

use super::{AuthState, MfaProvider};

type HmacSha512 = Hmac<Sha512>;

const PREAUTH_PATH: &str = "/auth/v2/preauth";
const AUTH_PATH: &str = "/auth/v2/auth";
const AUTH_STATUS_PATH: &str = "/auth/v2/auth_status";
const PUSH_TYPE: &str = "Securitybot";

/// Envelope wrapping every Duo API response.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct DuoEnvelope<T> {
    stat: String,
    #[serde(default)]
    response: Option<T>,
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DuoDevice {
    device: String,
    #[serde(default)]
    capabilities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PreauthResponse {
    result: String,
    #[serde(default)]
    devices: Vec<DuoDevice>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    txid: String,
}

#[derive(Debug, Deserialize)]
struct AuthStatusResponse {
    result: String,
}

/// Duo-backed [`MfaProvider`].
pub struct DuoAuth {
    http: reqwest::Client,
    host: String,
    integration_key: String,
    secret_key: String,
    /// Outstanding transaction id per chat user id.
    transactions: Mutex<HashMap<String, String>>,
}

impl DuoAuth {
    /// Build a client for the Auth API application in `[auth.duo]`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if the HTTP client cannot be constructed.
    pub fn new(config: &DuoConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()
            .map_err(|err| AppError::Auth(format!("failed to create duo client: {err}")))?;

        let host = config
            .api_host
            .trim()
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .to_ascii_lowercase();

        Ok(Self {
            http,
            host,
            integration_key: config.integration_key.trim().to_owned(),
            secret_key: config.secret_key.trim().to_owned(),
            transactions: Mutex::new(HashMap::new()),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let date = Utc::now().to_rfc2822();
        let body = canonical_params(params);
        let signature = sign(
            &self.secret_key,
            &canonical_request(&date, method.as_str(), &self.host, path, &body),
        )?;

        let mut url = format!("https://{}{path}", self.host);
        let request = if method == reqwest::Method::GET {
            if !body.is_empty() {
                url.push('?');
                url.push_str(&body);
            }
            self.http.get(url)
        } else {
            self.http
                .request(method, url)
                .header(
                    reqwest::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(body)
        };

        let envelope: DuoEnvelope<T> = request
            .basic_auth(&self.integration_key, Some(signature))
            .header(reqwest::header::DATE, date)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .json()
            .await?;
        envelope.into_result(path)
    }

    /// Device id of the user's first push-capable device.
    async fn preauth(&self, user: &ChatUser) -> Result<Option<String>> {
        let response: PreauthResponse = self
            .call(
                reqwest::Method::POST,
                PREAUTH_PATH,
                &[("username", user.name.as_str())],
            )
            .await?;
        let device = push_device(response);
        if device.is_none() {
            debug!(user = %user.name, "no duo push device for user");
        }
        Ok(device)
    }
}

impl<T> DuoEnvelope<T> {
    fn into_result(self, path: &str) -> Result<T> {
        if self.stat != "OK" {
            return Err(AppError::Auth(format!(
                "duo {path} failed ({}): {}",
                self.code.map_or_else(|| "no code".to_owned(), |code| code.to_string()),
                self.message.as_deref().unwrap_or("no message")
            )));
        }
        self.response
            .ok_or_else(|| AppError::Auth(format!("duo {path} returned no response")))
    }
}

/// Only users enrolled for `auth` may be pushed; `allow` (bypass) users
/// and unenrolled users cannot be challenged.
fn push_device(response: PreauthResponse) -> Option<String> {
    if response.result != "auth" {
        return None;
    }
    response
        .devices
        .into_iter()
        .find(|device| device.capabilities.iter().any(|cap| cap == "push"))
        .map(|device| device.device)
}

fn parse_auth_result(result: &str) -> AuthState {
    match result {
        "waiting" => AuthState::Pending,
        "allow" => AuthState::Authorized,
        _ => AuthState::Denied,
    }
}

fn push_info(reason: &str) -> String {
    if reason.is_empty() {
        format!("from={PUSH_TYPE}")
    } else {
        format!("from={PUSH_TYPE}&reason={}", urlencoding::encode(reason))
    }
}

/// Parameters sorted by key and percent-encoded per RFC 3986.
fn canonical_params(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| {
            (
                urlencoding::encode(key).into_owned(),
                urlencoding::encode(value).into_owned(),
            )
        })
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_request(date: &str, method: &str, host: &str, path: &str, params: &str) -> String {
    format!(
        "{date}\n{}\n{}\n{path}\n{params}",
        method.to_ascii_uppercase(),
        host.to_ascii_lowercase()
    )
}

fn sign(secret_key: &str, canonical: &str) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret_key.as_bytes())
        .map_err(|err| AppError::Auth(format!("invalid duo secret key: {err}")))?;
    mac.update(canonical.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

impl MfaProvider for DuoAuth {
    fn can_challenge<'a>(&'a self, user: &'a ChatUser) -> BoxFuture<'a, Option<String>> {
        Box::pin(self.preauth(user))
    }

    fn begin_challenge<'a>(&'a self, user: &'a ChatUser, reason: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            info!(user = %user.name, reason, "sending duo push");
            let pushinfo = push_info(reason);
            let response: AuthResponse = self
                .call(
                    reqwest::Method::POST,
                    AUTH_PATH,
                    &[
                        ("username", user.name.as_str()),
                        ("async", "1"),
                        ("factor", "push"),
                        ("device", "auto"),
                        ("type", PUSH_TYPE),
                        ("pushinfo", pushinfo.as_str()),
                    ],
                )
                .await?;
            debug!(user = %user.name, txid = %response.txid, "duo push sent");
            self.transactions
                .lock()
                .await
                .insert(user.id.clone(), response.txid);
            Ok(())
        })
    }

    fn poll_status<'a>(&'a self, user: &'a ChatUser) -> BoxFuture<'a, AuthState> {
        Box::pin(async move {
            let txid = self.transactions.lock().await.get(&user.id).cloned();
            let Some(txid) = txid else {
                return Ok(AuthState::None);
            };

            let response: AuthStatusResponse = self
                .call(
                    reqwest::Method::GET,
                    AUTH_STATUS_PATH,
                    &[("txid", txid.as_str())],
                )
                .await?;
            let state = parse_auth_result(&response.result);
            if state.is_settled() {
                self.transactions.lock().await.remove(&user.id);
            }
            Ok(state)
        })
    }

    fn reset<'a>(&'a self, user: &'a ChatUser) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.transactions.lock().await.remove(&user.id);
            Ok(())
        })
    }
}
