//! # Rust client for the amoCRM REST API
//!
//! The client uses `reqwest` with `rustls` to perform HTTP requests to the
//! amoCRM v4 API. Every request is authenticated with an OAuth2 bearer token;
//! the token is refreshed on demand right before it would expire.
use anyhow::Context;
use log::debug;
use reqwest::{Method, Url};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use oauth::{AccessTokenResponse, RefreshTokenRequest};

mod error;
mod oauth;
pub mod requests;
pub mod session;

pub use error::Error;
pub use requests::*;
pub use session::{HttpSession, Response, Session};

/// Seconds before the nominal expiry at which a token already counts as
/// expired, so a request never leaves with a token about to die mid-flight.
const EXPIRY_MARGIN_SECS: u64 = 30;

/// Lifetime assumed for a refreshed token when the token endpoint does not
/// send `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 900;

/// Timeout applied to every call to amoCRM.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// amoCRM API endpoints.
///
/// Use `for_domain` to target an account subdomain, or `custom` to target an
/// arbitrary base URL.
#[derive(Clone, Debug)]
pub struct AmoCrmAPI {
    endpoint: Url,
    access_token_endpoint: Url,
}

impl AmoCrmAPI {
    /// Endpoints of the account hosted at `https://{domain}.amocrm.ru`.
    pub fn for_domain(domain: &str) -> anyhow::Result<Self> {
        Self::custom(Url::parse(&format!("https://{}.amocrm.ru", domain))?)
    }

    pub fn custom(base_url: Url) -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: base_url.join("/api/v4")?,
            access_token_endpoint: base_url.join("/oauth2/access_token")?,
        })
    }
}

/// An OAuth2 token triple as handed out by amoCRM.
///
/// The client mutates its held token in place on refresh; persisting tokens
/// across runs is the embedding application's responsibility.
#[derive(Clone, Debug)]
pub struct AccessToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp, in seconds, at which the access token stops working.
    pub expires_at: u64,
}

impl AccessToken {
    /// True once the token is within [`EXPIRY_MARGIN_SECS`] of its expiry.
    pub fn is_expired(&self) -> bool {
        self.expired_at(unix_now())
    }

    fn expired_at(&self, now: u64) -> bool {
        now >= self.expires_at.saturating_sub(EXPIRY_MARGIN_SECS)
    }
}

/// Optional parts of an authenticated request.
#[derive(Default)]
pub(crate) struct RequestOptions {
    pub headers: Option<HashMap<String, String>>,
    pub params: Option<Vec<(String, String)>>,
    pub json: Option<Value>,
}

/// The client for the amoCRM API.
///
/// All requests done by the client are authenticated using an access token.
/// The token is automatically refreshed when needed; the check-then-refresh
/// sequence runs under a lock so concurrent callers cannot double-refresh.
pub struct AmoCrmAPIClient {
    api: AmoCrmAPI,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    session: Box<dyn Session>,
    token: Mutex<AccessToken>,
}

impl AmoCrmAPIClient {
    /// Create a client talking to the real API through [`HttpSession`].
    ///
    /// `token` is the initial token triple obtained by the embedding
    /// application through the authorization-code flow.
    pub fn new(
        api: AmoCrmAPI,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        token: AccessToken,
    ) -> anyhow::Result<Self> {
        Ok(Self::with_session(
            api,
            client_id,
            client_secret,
            redirect_uri,
            token,
            Box::new(HttpSession::new()?),
        ))
    }

    /// Create a client on top of an arbitrary [`Session`] implementation.
    pub fn with_session(
        api: AmoCrmAPI,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        token: AccessToken,
        session: Box<dyn Session>,
    ) -> Self {
        Self {
            api,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            session,
            token: Mutex::new(token),
        }
    }

    /// Exchange the held refresh token for a fresh token pair.
    ///
    /// Called automatically before any request once the current token is
    /// about to expire; calling it explicitly only forces a rotation.
    pub async fn refresh_access_token(&self) -> Result<(), Error> {
        let mut token = self.token.lock().await;
        self.refresh_token_locked(&mut token).await
    }

    async fn refresh_token_locked(&self, token: &mut AccessToken) -> Result<(), Error> {
        let grant = serde_json::to_value(RefreshTokenRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            grant_type: "refresh_token",
            refresh_token: &token.refresh_token,
            redirect_uri: &self.redirect_uri,
        })
        .context("cannot serialize the refresh grant")?;

        let response = self
            .session
            .post(
                self.api.access_token_endpoint.as_str(),
                &grant,
                REQUEST_TIMEOUT,
            )
            .await?;

        if response.status != 200 {
            return Err(Error::TokenRefresh {
                status: response.status,
                body: response.text,
            });
        }

        let payload: AccessTokenResponse = serde_json::from_value(response.json())
            .context("token endpoint returned an unusable payload")?;

        let expires_at = unix_now() + payload.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        debug!("Got new token, expires at {}", expires_at);

        *token = AccessToken {
            access_token: payload.access_token,
            // amoCRM usually rotates the refresh token; keep the old one if not.
            refresh_token: payload
                .refresh_token
                .unwrap_or_else(|| token.refresh_token.clone()),
            expires_at,
        };
        Ok(())
    }

    /// Perform a request to the API, refreshing the access token beforehand
    /// if needed.
    pub(crate) async fn authenticated_request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Value, Error> {
        let access_token = {
            let mut token = self.token.lock().await;
            if token.is_expired() {
                debug!("Access token expired, refreshing before {} {}", method, path);
                self.refresh_token_locked(&mut token).await?;
            }
            token.access_token.clone()
        };

        let mut headers = options.headers.unwrap_or_default();
        // Set last: the auth headers win over caller-supplied ones.
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", access_token),
        );
        headers.insert(
            "Content-Type".to_string(),
            "application/json".to_string(),
        );

        let url = format!("{}{}", self.api.endpoint, path);
        let response = self
            .session
            .request(
                method,
                &url,
                Some(headers),
                options.json.as_ref(),
                options.params.as_deref(),
                REQUEST_TIMEOUT,
            )
            .await?;

        if response.status >= 400 {
            return Err(Error::Api {
                status: response.status,
                body: response.text,
            });
        }
        if response.status == 204 {
            return Ok(Value::Object(Default::default()));
        }
        Ok(response.json())
    }

    /// List leads.
    ///
    /// A response without an embedded leads collection yields an empty
    /// vector rather than an error.
    pub async fn get_leads(&self, request: GetLeadsRequest) -> Result<Vec<Value>, Error> {
        let payload = self
            .authenticated_request(
                Method::GET,
                "/leads",
                RequestOptions {
                    params: Some(request.params()),
                    ..Default::default()
                },
            )
            .await?;
        let response: LeadsResponse =
            serde_json::from_value(payload).context("cannot decode the leads response")?;
        Ok(response.into_leads())
    }

    /// Create a single contact and return it as amoCRM echoes it back.
    pub async fn create_contact(&self, request: CreateContactRequest) -> Result<Value, Error> {
        let payload = self
            .authenticated_request(
                Method::POST,
                "/contacts",
                RequestOptions {
                    json: Some(request.body()),
                    ..Default::default()
                },
            )
            .await?;
        let response: ContactsResponse =
            serde_json::from_value(payload).context("cannot decode the contacts response")?;
        response.into_first_contact()
    }

    /// A copy of the token currently held by the client.
    ///
    /// Callers persisting tokens across runs should read this back after any
    /// sequence of API calls, since a refresh may have rotated the pair.
    pub async fn current_token(&self) -> AccessToken {
        self.token.lock().await.clone()
    }
}
