use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::FeedResult;

/// A repository the backend is watching for security alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySubscription {
    pub username: String,
    pub repository: String,
    pub full_name: String,
}

/// A public GitHub repository as returned by the backend's lookup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
    pub html_url: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: i64,
    #[serde(default)]
    pub forks_count: i64,
}

#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    username: &'a str,
    repositories: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SubscriptionList {
    repositories: Vec<RepositorySubscription>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeResponse {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub repositories: Vec<RepositorySubscription>,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryList {
    pub repositories: Vec<Repository>,
    pub total_count: usize,
}

/// Client for the backend's subscription management endpoints.
///
/// These are interactive one-shot calls, unlike the live feed: failures
/// surface immediately as errors and nothing is retried.
pub struct SubscriptionClient {
    http: reqwest::Client,
    base_url: String,
}

impl SubscriptionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// All repositories currently subscribed for alerts.
    pub async fn subscribed(&self) -> FeedResult<Vec<RepositorySubscription>> {
        let url = format!("{}/repositories", self.base_url);
        let list: SubscriptionList = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.repositories)
    }

    /// Subscribe a user's repositories for security alerts. Repositories
    /// already subscribed are skipped by the backend.
    pub async fn subscribe(
        &self,
        username: &str,
        repositories: &[String],
    ) -> FeedResult<SubscribeResponse> {
        let url = format!("{}/repositories/subscribe", self.base_url);
        let response: SubscribeResponse = self
            .http
            .post(&url)
            .json(&SubscribeRequest {
                username,
                repositories,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(
            "subscribed {} repositories for {}",
            response.repositories.len(),
            username
        );
        Ok(response)
    }

    /// Remove a single repository subscription.
    pub async fn unsubscribe(
        &self,
        username: &str,
        repository: &str,
    ) -> FeedResult<UnsubscribeResponse> {
        let url = format!("{}/repositories/{}/{}", self.base_url, username, repository);
        let response: UnsubscribeResponse = self
            .http
            .delete(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }

    /// A user's public GitHub repositories, proxied through the backend.
    pub async fn github_repositories(&self, username: &str) -> FeedResult<RepositoryList> {
        let url = format!("{}/github/repositories/{}", self.base_url, username);
        let list: RepositoryList = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list)
    }
}
