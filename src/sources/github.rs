use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::config::SourcesConfig;
use crate::sandbox::{ReferenceFile, ReferenceTestSet};

use super::{ExerciseMeta, Result, SourceError, format_title, sort_by_title};

const TESTDATA_DIR: &str = "testdata";

/// An entry returned by the GitHub contents API
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl ContentItem {
    pub fn is_dir(&self) -> bool {
        self.kind == "dir"
    }

    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }

    pub fn is_go(&self) -> bool {
        self.name.ends_with(".go")
    }

    pub fn is_go_test(&self) -> bool {
        self.name.ends_with("_test.go")
    }

    fn is_markdown(&self) -> bool {
        self.name.to_lowercase().ends_with(".md")
    }
}

/// Thin client over the GitHub contents API
#[derive(Clone)]
pub struct GithubClient {
    inner: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(config: &SourcesConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            inner,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config
                .github_token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        })
    }

    /// Contents API URL of `path` inside `repo` (`owner/name`)
    pub fn contents_url(&self, repo: &str, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            format!("{}/repos/{repo}/contents", self.api_base)
        } else {
            format!("{}/repos/{repo}/contents/{path}", self.api_base)
        }
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.inner.get(url);
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    /// Lists a directory, failing on any non-success response
    pub async fn list_dir(&self, url: &str) -> Result<Vec<ContentItem>> {
        let response = self
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        let response = ensure_success(response, url).await?;
        Ok(response.json().await?)
    }

    /// Downloads a raw file, failing on any non-success response
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).send().await?;
        let response = ensure_success(response, url).await?;
        Ok(response.text().await?)
    }

    /// Downloads a raw file, substituting `fallback` when that is not possible
    pub async fn fetch_text_or(&self, url: Option<&str>, fallback: &str) -> String {
        let Some(url) = url else {
            return fallback.to_string();
        };
        match self.fetch_text(url).await {
            Ok(text) => text,
            Err(e) => {
                log::debug!("Using fallback for {url}: {e}");
                fallback.to_string()
            }
        }
    }

    /// Lists the exercise directories under `path` as a sorted listing
    pub async fn list_exercises(
        &self,
        repo: &str,
        path: &str,
        source: &str,
        source_label: &str,
    ) -> Result<Vec<ExerciseMeta>> {
        let items = self.list_dir(&self.contents_url(repo, path)).await?;
        let mut list: Vec<_> = exercise_dirs(&items)
            .map(|item| ExerciseMeta {
                slug: item.name.clone(),
                title: format_title(&item.name),
                path: item.path.clone(),
                source: source.to_string(),
                source_label: source_label.to_string(),
            })
            .collect();
        sort_by_title(&mut list);
        Ok(list)
    }

    /// Downloads the tests and fixtures found in an exercise directory listing
    pub async fn reference_tests(
        &self,
        repo: &str,
        items: &[ContentItem],
    ) -> Result<ReferenceTestSet> {
        let (tests, assets, testdata) = classify_reference_files(items);

        let mut set = ReferenceTestSet::default();
        for item in tests {
            set.tests.push(self.download(item, &item.name).await?);
        }
        for item in assets {
            set.assets.push(self.download(item, &item.name).await?);
        }
        if let Some(dir) = testdata {
            let nested = self.list_dir(&self.contents_url(repo, &dir.path)).await?;
            for item in nested.iter().filter(|i| i.is_file()) {
                let name = format!("{TESTDATA_DIR}/{}", item.name);
                set.assets.push(self.download(item, &name).await?);
            }
        }

        log::debug!(
            "Fetched {} test files and {} assets from {repo}",
            set.tests.len(),
            set.assets.len()
        );
        Ok(set)
    }

    async fn download(&self, item: &ContentItem, name: &str) -> Result<ReferenceFile> {
        let url = item
            .download_url
            .as_deref()
            .ok_or_else(|| SourceError::MissingDownloadUrl(item.path.clone()))?;
        Ok(ReferenceFile::new(name, self.fetch_text(url).await?))
    }
}

async fn ensure_success(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SourceError::UnexpectedStatus {
        status,
        requested_url: url.to_string(),
        body: if body.trim().is_empty() {
            "unknown error".to_string()
        } else {
            body
        },
    })
}

/// Directories that hold exercises; hidden directories never do
pub fn exercise_dirs(items: &[ContentItem]) -> impl Iterator<Item = &ContentItem> {
    items
        .iter()
        .filter(|item| item.is_dir() && !item.name.starts_with('.'))
}

/// Splits a listing into test files, fixture files and an optional `testdata` dir
pub fn classify_reference_files(
    items: &[ContentItem],
) -> (Vec<&ContentItem>, Vec<&ContentItem>, Option<&ContentItem>) {
    let tests = items
        .iter()
        .filter(|i| i.is_file() && i.is_go_test())
        .collect();
    let assets = items
        .iter()
        .filter(|i| i.is_file() && !i.is_go() && !i.is_markdown())
        .collect();
    let testdata = items.iter().find(|i| i.is_dir() && i.name == TESTDATA_DIR);
    (tests, assets, testdata)
}
