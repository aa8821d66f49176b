//! Okta Verify push provider.
//!
//! Talks to the Okta factors API directly over `reqwest`:
//! users are located by login, the first active `push` factor is used,
//! and the poll link returned by `verify` is followed until the factor
//! result settles.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::OktaConfig;
use crate::models::user::ChatUser;
use crate::{AppError, BoxFuture, Result};

use super::{AuthState, MfaProvider};

#[derive(Debug, Deserialize)]
struct OktaUser {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OktaFactor {
    id: String,
    factor_type: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OktaLink {
    href: String,
}

#[derive(Debug, Default, Deserialize)]
struct OktaLinks {
    #[serde(default)]
    poll: Option<OktaLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OktaVerifyResponse {
    factor_result: String,
    #[serde(default, rename = "_links")]
    links: OktaLinks,
}

/// Identifiers needed to push to and poll one user.
#[derive(Debug, Clone, Default)]
struct Challenge {
    okta_user_id: String,
    factor_id: String,
    poll_url: Option<String>,
}

/// Okta-backed [`MfaProvider`].
pub struct OktaAuth {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    challenges: Mutex<HashMap<String, Challenge>>,
}

impl OktaAuth {
    /// Build a client for the org configured in `[auth.okta]`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if the HTTP client cannot be constructed.
    pub fn new(config: &OktaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()
            .map_err(|err| AppError::Auth(format!("failed to create okta client: {err}")))?;

        let host = config.endpoint.trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_owned()
        } else {
            format!("https://{host}")
        };

        Ok(Self {
            http,
            base_url,
            api_token: config.api_token.trim().to_owned(),
            challenges: Mutex::new(HashMap::new()),
        })
    }

    fn authorization(&self) -> String {
        format!("SSWS {}", self.api_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn find_user(&self, login: &str) -> Result<Option<String>> {
        let url = format!("{}/api/v1/users", self.base_url);
        let users: Vec<OktaUser> = self
            .http
            .get(url)
            .query(&[("q", login), ("limit", "1")])
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(users.into_iter().next().map(|user| user.id))
    }

    async fn find_push_factor(&self, okta_user_id: &str) -> Result<Option<String>> {
        let url = format!("{}/api/v1/users/{okta_user_id}/factors", self.base_url);
        let factors: Vec<OktaFactor> = self.get_json(&url).await?;
        Ok(factors
            .into_iter()
            .find(|factor| {
                factor.factor_type == "push"
                    && factor.status.as_deref().is_none_or(|status| status == "ACTIVE")
            })
            .map(|factor| factor.id))
    }

    async fn discover(&self, user: &ChatUser) -> Result<Option<Challenge>> {
        let Some(okta_user_id) = self.find_user(user.mfa_login()).await? else {
            debug!(user = %user.name, "no okta account for user");
            return Ok(None);
        };
        let Some(factor_id) = self.find_push_factor(&okta_user_id).await? else {
            debug!(user = %user.name, "okta account has no push factor");
            return Ok(None);
        };
        Ok(Some(Challenge {
            okta_user_id,
            factor_id,
            poll_url: None,
        }))
    }
}

fn parse_factor_result(result: &str) -> AuthState {
    match result {
        "WAITING" => AuthState::Pending,
        "SUCCESS" => AuthState::Authorized,
        _ => AuthState::Denied,
    }
}

impl MfaProvider for OktaAuth {
    fn can_challenge<'a>(&'a self, user: &'a ChatUser) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            let Some(challenge) = self.discover(user).await? else {
                self.challenges.lock().await.remove(&user.id);
                return Ok(None);
            };
            let factor_id = challenge.factor_id.clone();
            self.challenges.lock().await.insert(user.id.clone(), challenge);
            Ok(Some(factor_id))
        })
    }

    fn begin_challenge<'a>(&'a self, user: &'a ChatUser, reason: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let cached = self.challenges.lock().await.get(&user.id).cloned();
            let mut challenge = match cached {
                Some(challenge) => challenge,
                None => self.discover(user).await?.ok_or_else(|| {
                    AppError::Auth(format!("{} has no okta push factor", user.name))
                })?,
            };

            info!(user = %user.name, reason, "sending okta push");
            let url = format!(
                "{}/api/v1/users/{}/factors/{}/verify",
                self.base_url, challenge.okta_user_id, challenge.factor_id
            );
            let response: OktaVerifyResponse = self
                .http
                .post(url)
                .header(reqwest::header::AUTHORIZATION, self.authorization())
                .header(reqwest::header::ACCEPT, "application/json")
                .json(&serde_json::json!({}))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let poll = response
                .links
                .poll
                .ok_or_else(|| AppError::Auth("okta verify response has no poll link".into()))?;
            debug!(user = %user.name, result = %response.factor_result, "okta push sent");
            challenge.poll_url = Some(poll.href);
            self.challenges.lock().await.insert(user.id.clone(), challenge);
            Ok(())
        })
    }

    fn poll_status<'a>(&'a self, user: &'a ChatUser) -> BoxFuture<'a, AuthState> {
        Box::pin(async move {
            let poll_url = self
                .challenges
                .lock()
                .await
                .get(&user.id)
                .and_then(|challenge| challenge.poll_url.clone());
            let Some(poll_url) = poll_url else {
                return Ok(AuthState::None);
            };

            let response: OktaVerifyResponse = self.get_json(&poll_url).await?;
            let state = parse_factor_result(&response.factor_result);
            if state.is_settled() {
                if let Some(challenge) = self.challenges.lock().await.get_mut(&user.id) {
                    challenge.poll_url = None;
                }
            }
            Ok(state)
        })
    }

    fn reset<'a>(&'a self, user: &'a ChatUser) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Some(challenge) = self.challenges.lock().await.get_mut(&user.id) {
                challenge.poll_url = None;
            }
            Ok(())
        })
    }
}
