//! HTTP client for the hosted backend
//!
//! Talks to the three services the backend exposes below one base URL:
//! - `/auth/v1` for password sign-in, user lookup and sign-out
//! - `/rest/v1/{table}` for table CRUD (filter syntax `column=eq.value`)
//! - `/storage/v1/object` for the image bucket

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{header, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{OrderBy, RemoteStore, StoreError};
use crate::config::RemoteConfig;
use crate::models::{AdminUser, RecordId, Session};

/// Client for the hosted backend
#[derive(Clone)]
pub struct HostedStore {
    client: reqwest::Client,
    base_url: Url,
    anon_key: String,
    /// Token of the signed-in admin; the anon key is used when absent
    access_token: Option<String>,
}

impl std::fmt::Debug for HostedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedStore")
            .field("base_url", &self.base_url.as_str())
            .field("authorized", &self.access_token.is_some())
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AdminUser,
}

impl HostedStore {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the base URL does not parse or the HTTP client fails to build.
    pub fn new(config: &RemoteConfig) -> Result<Self, StoreError> {
        let base_url = Url::parse(config.url.trim_end_matches('/'))
            .map_err(|e| StoreError::InvalidConfig(format!("remote.url: {}", e)))?;
        if config.anon_key.is_empty() {
            tracing::warn!("remote.anon_key is empty; the hosted backend will reject requests");
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("keystone/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            anon_key: config.anon_key.clone(),
            access_token: None,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_as(method, path, self.access_token.as_deref().unwrap_or(&self.anon_key))
    }

    fn request_as(&self, method: Method, path: &str, bearer: &str) -> RequestBuilder {
        self.client
            .request(method, self.endpoint(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    fn object_path(bucket: &str, key: &str) -> String {
        format!(
            "/storage/v1/object/{}/{}",
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        )
    }

    /// Turn non-success statuses into errors, keeping the body as the message
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(StoreError::Unauthorized);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// First row of a `return=representation` response
    async fn single_row(
        response: Response,
        table: &str,
        id: Option<&RecordId>,
    ) -> Result<Value, StoreError> {
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::UnexpectedResponse(e.to_string()))?;
        rows.into_iter().next().ok_or_else(|| match id {
            Some(id) => StoreError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            },
            None => {
                StoreError::UnexpectedResponse(format!("insert into {} returned no row", table))
            }
        })
    }
}

#[async_trait]
impl RemoteStore for HostedStore {
    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, StoreError> {
        Ok(Session::from_access_token(access_token).filter(|s| !s.is_expired()))
    }

    async fn get_user(&self, access_token: &str) -> Result<AdminUser, StoreError> {
        let response = self
            .request_as(Method::GET, "/auth/v1/user", access_token)
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::UnexpectedResponse(e.to_string()))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, StoreError> {
        let response = self
            .request_as(Method::POST, "/auth/v1/token", &self.anon_key)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if matches!(response.status(), StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            return Err(StoreError::InvalidCredentials);
        }
        let response = Self::check(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::UnexpectedResponse(e.to_string()))?;

        Ok(Session::from_access_token(&token.access_token).unwrap_or_else(|| Session {
            expires_at: Utc::now() + Duration::seconds(token.expires_in.unwrap_or(3600)),
            user_id: token.user.id,
            access_token: token.access_token,
        }))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), StoreError> {
        let response = self
            .request_as(Method::POST, "/auth/v1/logout", access_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn select_all(&self, table: &str, order: OrderBy) -> Result<Vec<Value>, StoreError> {
        let direction = if order.descending { "desc" } else { "asc" };
        let response = self
            .request(Method::GET, &format!("/rest/v1/{}", table))
            .query(&[
                ("select", "*".to_string()),
                ("order", format!("{}.{}", order.column, direction)),
            ])
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::UnexpectedResponse(e.to_string()))
    }

    async fn select_eq(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError> {
        let response = self
            .request(Method::GET, &format!("/rest/v1/{}", table))
            .query(&[("select", "*".to_string()), (column, format!("eq.{}", value))])
            .send()
            .await?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::UnexpectedResponse(e.to_string()))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let response = self
            .request(Method::POST, &format!("/rest/v1/{}", table))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Self::single_row(response, table, None).await
    }

    async fn update(&self, table: &str, id: &RecordId, patch: Value) -> Result<Value, StoreError> {
        let response = self
            .request(Method::PATCH, &format!("/rest/v1/{}", table))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Self::single_row(response, table, Some(id)).await
    }

    async fn delete(&self, table: &str, id: &RecordId) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, &format!("/rest/v1/{}", table))
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let response = self
            .request(Method::POST, &Self::object_path(bucket, key))
            .header(header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        self.endpoint(&format!(
            "/storage/v1/object/public/{}/{}",
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        ))
    }

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, &Self::object_path(bucket, key))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    fn storage_host(&self) -> Option<String> {
        self.base_url.host_str().map(str::to_string)
    }

    fn authorized(&self, access_token: &str) -> Arc<dyn RemoteStore> {
        Arc::new(Self {
            access_token: Some(access_token.to_string()),
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::encode_test_token;

    fn store() -> HostedStore {
        HostedStore::new(&RemoteConfig {
            url: "https://abc.example.co/".to_string(),
            anon_key: "anon".to_string(),
            storage_bucket: "images".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = RemoteConfig {
            url: "not a url".to_string(),
            ..RemoteConfig::default()
        };
        assert!(matches!(HostedStore::new(&config), Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_public_url_layout() {
        let url = store().public_url("images", "1700000000000.png");
        assert_eq!(
            url,
            "https://abc.example.co/storage/v1/object/public/images/1700000000000.png"
        );
    }

    #[test]
    fn test_storage_host_matches_base_url() {
        assert_eq!(store().storage_host().as_deref(), Some("abc.example.co"));
    }

    #[tokio::test]
    async fn test_get_session_is_local_and_rejects_expired() {
        let store = store();
        let live = encode_test_token("u1", (Utc::now() + Duration::hours(1)).timestamp());
        let dead = encode_test_token("u1", (Utc::now() - Duration::hours(1)).timestamp());

        assert_eq!(store.get_session(&live).await.unwrap().unwrap().user_id, "u1");
        assert!(store.get_session(&dead).await.unwrap().is_none());
        assert!(store.get_session("garbage").await.unwrap().is_none());
    }
}
