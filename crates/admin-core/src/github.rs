//! Hosting API client.
//!
//! One [`GitHubClient`] is built per process and handed to every component
//! that talks to the hosting provider: the archived-repo oracle, the fleet
//! source and API-calling migrators.

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::{AdminError, Result};

const PAGE_SIZE: usize = 100;

/// Repository fields the driver reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// Authenticated REST client for the hosting provider.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    pub const DEFAULT_API: &'static str = "https://api.github.com";

    pub fn new(token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("admin-migrations/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: Self::DEFAULT_API.to_string(),
            token,
        })
    }

    /// Point the client at another API root (enterprise hosts, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));
        let req = self
            .http
            .request(method, url)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path = %path, "GET");
        let resp = self
            .request(Method::GET, path)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Send `body` as JSON and ignore the response body.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<()> {
        debug!(path = %path, method = %method, "send");
        self.request(method, path)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn get_repo(&self, owner: &str, repo: &str) -> Result<RepoInfo> {
        self.get_json(&format!("repos/{owner}/{repo}")).await
    }

    /// Every public repository of `org`, following pagination.
    pub async fn list_org_repos(&self, org: &str) -> Result<Vec<RepoInfo>> {
        let mut repos = Vec::new();
        for page in 1.. {
            let batch: Vec<RepoInfo> = self
                .get_json(&format!(
                    "orgs/{org}/repos?type=public&per_page={PAGE_SIZE}&page={page}"
                ))
                .await?;
            let last = batch.len() < PAGE_SIZE;
            repos.extend(batch);
            if last {
                break;
            }
        }
        if repos.is_empty() {
            return Err(AdminError::Http(format!("no repositories listed for {org}")));
        }
        Ok(repos)
    }
}
