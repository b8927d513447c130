//! HTTP surface of the `/users` API, one `#[transaction]` per call.
use reqwest::{header::CONTENT_TYPE, Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use stampede::transaction;
use std::sync::OnceLock;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

static API: OnceLock<Api> = OnceLock::new();

/// Base URL plus a shared connection pool.
#[derive(Clone, Debug)]
pub struct Api {
    client: Client,
    base_url: String,
}

impl Api {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Set the process-wide API used by the `user_crud` scenario. Only the first call wins.
    pub fn install(base_url: &str) -> &'static Api {
        let api = API.get_or_init(|| Api::new(base_url));
        if api.base_url != base_url.trim_end_matches('/') {
            warn!(
                "API already installed for {}, ignoring {base_url}",
                api.base_url
            );
        }
        api
    }

    pub fn global() -> &'static Api {
        API.get_or_init(|| Api::new(DEFAULT_BASE_URL))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn users_url(&self) -> String {
        format!("{}/users", self.base_url)
    }

    pub fn user_url(&self, id: &str) -> String {
        format!("{}/users/{id}", self.base_url)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
    }
}

/// A fully read response: status plus raw body.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

impl Reply {
    async fn read(res: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = res.status();
        let body = res.text().await?;
        Ok(Self { status, body })
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Body parsed as JSON, or `None` if it does not parse as `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Local view of a remote user. The id is opaque.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl Default for CreateUserRequest {
    fn default() -> Self {
        Self {
            username: "username".to_string(),
            password: "password".to_string(),
            email: "email".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct UpdateUserRequest {
    pub username: String,
}

#[transaction]
pub async fn create_user(api: &Api, payload: &CreateUserRequest) -> Result<Reply, reqwest::Error> {
    let res = api
        .request(Method::POST, api.users_url())
        .json(payload)
        .send()
        .await?;
    Reply::read(res).await
}

#[transaction]
pub async fn get_all_users(api: &Api) -> Result<Reply, reqwest::Error> {
    let res = api.request(Method::GET, api.users_url()).send().await?;
    Reply::read(res).await
}

#[transaction]
pub async fn get_user(api: &Api, id: &str) -> Result<Reply, reqwest::Error> {
    let res = api.request(Method::GET, api.user_url(id)).send().await?;
    Reply::read(res).await
}

#[transaction]
pub async fn update_user(
    api: &Api,
    id: &str,
    payload: &UpdateUserRequest,
) -> Result<Reply, reqwest::Error> {
    let res = api
        .request(Method::PUT, api.user_url(id))
        .json(payload)
        .send()
        .await?;
    Reply::read(res).await
}

#[transaction]
pub async fn delete_user(api: &Api, id: &str) -> Result<Reply, reqwest::Error> {
    let res = api.request(Method::DELETE, api.user_url(id)).send().await?;
    Reply::read(res).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls() {
        let api = Api::new("http://localhost:8080/");
        assert_eq!(api.base_url(), "http://localhost:8080");
        assert_eq!(api.users_url(), "http://localhost:8080/users");
        assert_eq!(api.user_url("abc"), "http://localhost:8080/users/abc");
    }

    #[test]
    fn reply_json() {
        let reply = Reply {
            status: StatusCode::OK,
            body: r#"[{"id":"1","username":"username","email":"email"},{"id":"2"}]"#.to_string(),
        };

        let users: Vec<User> = reply.json().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].id, "2");
        assert!(reply.is_ok());
        assert!(reply.json::<User>().is_none());
    }

    #[test]
    fn default_payload() {
        let body = serde_json::to_value(CreateUserRequest::default()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"username": "username", "password": "password", "email": "email"})
        );
    }
}
