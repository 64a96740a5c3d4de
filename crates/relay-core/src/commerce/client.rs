use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::commerce::types::{
    ApprovalFlow, BusinessUnit, Customer, Order, PagedQueryResponse, State, Subscription,
    SubscriptionDraft,
};
use crate::config::CommerceConfig;

/// Refresh the access token this long before it actually expires.
const TOKEN_REFRESH_BUFFER_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unauthorized after token refresh")]
    Unauthorized,
}

impl CommerceError {
    /// Remote HTTP status when the failure carries one. Handlers use this to
    /// tell an optimistic-concurrency conflict (409) apart from other faults.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(err) => err.status(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn expired() -> Self {
        Self {
            token: String::new(),
            expires_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(TOKEN_REFRESH_BUFFER_SECS) <= now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Client for the commerce platform's HTTP API.
///
/// Authenticates with the client-credentials flow and keeps the current
/// access token behind an RwLock; a separate mutex serializes refreshes so
/// concurrent requests trigger at most one token fetch.
pub struct CommerceClient {
    http: Client,
    api_base: String,
    auth_base: String,
    project_key: String,
    client_id: String,
    client_secret: String,
    scope: String,
    token: RwLock<AccessToken>,
    refresh_lock: Mutex<()>,
}

impl CommerceClient {
    pub fn new(http: Client, config: &CommerceConfig) -> Self {
        Self {
            http,
            api_base: config.api_url.clone(),
            auth_base: config.auth_url.clone(),
            project_key: config.project_key.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
            token: RwLock::new(AccessToken::expired()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_auth_base(mut self, auth_base: impl Into<String>) -> Self {
        self.auth_base = auth_base.into();
        self
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order, CommerceError> {
        let url = self.url(&format!("orders/{order_id}"));
        self.send_json(|| self.http.get(&url)).await
    }

    /// Update an order with a single `transitionState` action. `version` must
    /// be the most recently observed one or the platform rejects the update.
    pub async fn transition_order_state(
        &self,
        order_id: &str,
        version: u64,
        state_id: &str,
    ) -> Result<Order, CommerceError> {
        let url = self.url(&format!("orders/{order_id}"));
        let body = json!({
            "version": version,
            "actions": [{
                "action": "transitionState",
                "state": { "typeId": "state", "id": state_id },
            }],
        });
        self.send_json(|| self.http.post(&url).json(&body)).await
    }

    /// Fetch an approval flow scoped to the acting associate and their
    /// business unit, the only way the platform exposes flow reads.
    pub async fn get_approval_flow_in_business_unit(
        &self,
        flow_id: &str,
        associate_id: &str,
        business_unit_key: &str,
    ) -> Result<ApprovalFlow, CommerceError> {
        let url = self.url(&format!(
            "as-associate/{associate_id}/in-business-unit/key={business_unit_key}/approval-flows/{flow_id}"
        ));
        self.send_json(|| self.http.get(&url)).await
    }

    pub async fn get_business_unit(&self, key: &str) -> Result<BusinessUnit, CommerceError> {
        let url = self.url(&format!("business-units/key={key}"));
        self.send_json(|| self.http.get(&url)).await
    }

    /// Batch-fetch customers with a single `id in (…)` query.
    pub async fn query_customers_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<Customer>, CommerceError> {
        let quoted = ids
            .iter()
            .map(|id| format!("\"{id}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let predicate = format!("id in ({quoted})");
        let url = self.url("customers");
        let response: PagedQueryResponse<Customer> = self
            .send_json(|| self.http.get(&url).query(&[("where", predicate.as_str())]))
            .await?;
        Ok(response.results)
    }

    /// Resolve a workflow state by exact key. Returns the first match; `None`
    /// when the key resolves to nothing.
    pub async fn get_state_by_key(&self, key: &str) -> Result<Option<State>, CommerceError> {
        let predicate = format!("key=\"{key}\"");
        let url = self.url("states");
        let response: PagedQueryResponse<State> = self
            .send_json(|| self.http.get(&url).query(&[("where", predicate.as_str())]))
            .await?;
        Ok(response.results.into_iter().next())
    }

    pub async fn get_subscription(
        &self,
        key: &str,
    ) -> Result<Option<Subscription>, CommerceError> {
        let predicate = format!("key=\"{key}\"");
        let url = self.url("subscriptions");
        let response: PagedQueryResponse<Subscription> = self
            .send_json(|| self.http.get(&url).query(&[("where", predicate.as_str())]))
            .await?;
        Ok(response.results.into_iter().next())
    }

    pub async fn create_subscription(
        &self,
        draft: &SubscriptionDraft,
    ) -> Result<Subscription, CommerceError> {
        let url = self.url("subscriptions");
        self.send_json(|| self.http.post(&url).json(draft)).await
    }

    pub async fn delete_subscription(
        &self,
        key: &str,
        version: u64,
    ) -> Result<Subscription, CommerceError> {
        let url = self.url(&format!("subscriptions/key={key}"));
        let version = version.to_string();
        self.send_json(|| self.http.delete(&url).query(&[("version", version.as_str())]))
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.project_key, path)
    }

    async fn send_json<T, B>(&self, build: B) -> Result<T, CommerceError>
    where
        T: DeserializeOwned,
        B: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let response = self.perform_authenticated(build).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(CommerceError::Decode)
    }

    async fn perform_authenticated<B>(&self, build: B) -> Result<reqwest::Response, CommerceError>
    where
        B: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let token = self.ensure_fresh_token(false).await?;
        let mut response = build().bearer_auth(&token.token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let token = self.ensure_fresh_token(true).await?;
            response = build().bearer_auth(&token.token).send().await?;
        }

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(CommerceError::Unauthorized);
        }

        Ok(response.error_for_status()?)
    }

    async fn ensure_fresh_token(&self, force_refresh: bool) -> Result<AccessToken, CommerceError> {
        {
            let token = self.token.read().await;
            if !force_refresh && !token.needs_refresh(Utc::now()) {
                return Ok(token.clone());
            }
        }

        let _guard = self.refresh_lock.lock().await;

        {
            let token = self.token.read().await;
            if !force_refresh && !token.needs_refresh(Utc::now()) {
                return Ok(token.clone());
            }
        }

        let fresh = self.fetch_token().await?;

        {
            let mut token = self.token.write().await;
            *token = fresh.clone();
        }

        Ok(fresh)
    }

    async fn fetch_token(&self) -> Result<AccessToken, CommerceError> {
        let url = format!("{}/oauth/token", self.auth_base);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body: TokenResponse = response.json().await?;
        Ok(AccessToken {
            token: body.access_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{
        body_partial_json, header, method, path, query_param, query_param_contains,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> CommerceConfig {
        CommerceConfig {
            api_url: "http://unused".into(),
            auth_url: "http://unused".into(),
            project_key: "test-proj".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            scope: "manage_project:test-proj".into(),
        }
    }

    fn make_client(server: &MockServer) -> CommerceClient {
        CommerceClient::new(Client::new(), &test_config())
            .with_api_base(server.uri())
            .with_auth_base(server.uri())
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": 3600,
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetches_token_once_and_reuses_it() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/test-proj/orders/ord1"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "ord1",
                "version": 3,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let first = client.get_order("ord1").await.expect("order loads");
        let second = client.get_order("ord1").await.expect("order loads again");
        assert_eq!(first.version, 3);
        assert_eq!(second.id, "ord1");
    }

    #[tokio::test]
    async fn retries_once_after_unauthorized_then_gives_up() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/test-proj/orders/ord1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let err = client
            .get_order("ord1")
            .await
            .expect_err("should surface unauthorized");
        assert!(matches!(err, CommerceError::Unauthorized));
    }

    #[tokio::test]
    async fn transition_sends_version_and_action() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("POST"))
            .and(path("/test-proj/orders/ord1"))
            .and(body_partial_json(serde_json::json!({
                "version": 7,
                "actions": [{
                    "action": "transitionState",
                    "state": { "typeId": "state", "id": "state-1" },
                }],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "ord1",
                "version": 8,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let order = client
            .transition_order_state("ord1", 7, "state-1")
            .await
            .expect("transition succeeds");
        assert_eq!(order.version, 8);
    }

    #[tokio::test]
    async fn version_conflict_surfaces_409_status() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("POST"))
            .and(path("/test-proj/orders/ord1"))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let err = client
            .transition_order_state("ord1", 7, "state-1")
            .await
            .expect_err("conflict should fail");
        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    }

    #[tokio::test]
    async fn queries_customers_with_id_in_predicate() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/test-proj/customers"))
            .and(query_param(
                "where",
                "id in (\"c1\", \"c2\")",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    { "id": "c1", "email": "one@example.com", "firstName": "One" },
                    { "id": "c2", "email": "", "lastName": "Two" },
                ],
                "total": 2,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let customers = client
            .query_customers_by_ids(&["c1".into(), "c2".into()])
            .await
            .expect("customers load");
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].email.as_deref(), Some("one@example.com"));
        assert_eq!(customers[1].email.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn state_lookup_returns_first_match_or_none() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/test-proj/states"))
            .and(query_param("where", "key=\"order-approved\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    { "id": "state-1", "key": "order-approved" },
                    { "id": "state-2", "key": "order-approved" },
                ],
                "total": 2,
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/test-proj/states"))
            .and(query_param("where", "key=\"missing\""))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "results": [], "total": 0 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let found = client
            .get_state_by_key("order-approved")
            .await
            .expect("query succeeds");
        assert_eq!(found.map(|s| s.id).as_deref(), Some("state-1"));

        let missing = client
            .get_state_by_key("missing")
            .await
            .expect("query succeeds");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn scoped_approval_flow_fetch_builds_associate_path() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path(
                "/test-proj/as-associate/cust1/in-business-unit/key=bu1/approval-flows/af1",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "af1",
                "status": "Pending",
                "businessUnit": { "key": "bu1" },
                "order": { "id": "ord1" },
                "currentTierPendingApprovers": [],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let flow = client
            .get_approval_flow_in_business_unit("af1", "cust1", "bu1")
            .await
            .expect("flow loads");
        assert_eq!(flow.id, "af1");
        assert!(flow.current_tier_pending_approvers.is_empty());
    }

    #[tokio::test]
    async fn delete_subscription_sends_observed_version() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("DELETE"))
            .and(path("/test-proj/subscriptions/key=approval-flow-notifications"))
            .and(query_param("version", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "sub-1",
                "version": 4,
                "key": "approval-flow-notifications",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let deleted = client
            .delete_subscription("approval-flow-notifications", 4)
            .await
            .expect("delete succeeds");
        assert_eq!(deleted.id, "sub-1");
    }

    #[tokio::test]
    async fn subscription_lookup_uses_key_predicate() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/test-proj/subscriptions"))
            .and(query_param_contains("where", "key="))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "results": [], "total": 0 })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let found = client
            .get_subscription("approval-flow-notifications")
            .await
            .expect("query succeeds");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn returns_decode_error_on_invalid_json() {
        let server = MockServer::start().await;
        mount_token(&server).await;

        Mock::given(method("GET"))
            .and(path("/test-proj/orders/ord1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let err = client
            .get_order("ord1")
            .await
            .expect_err("should surface decode error");
        assert!(matches!(err, CommerceError::Decode(_)));
    }
}
