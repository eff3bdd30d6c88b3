mod bregman;
mod github;
mod plutov;

pub use bregman::BregmanSource;
pub use github::{ContentItem, GithubClient};
pub use plutov::PlutovSource;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::sandbox::ReferenceTestSet;

/// Source used when a listing request names none
pub const DEFAULT_SOURCE: &str = "bregman";

pub type Result<T> = ::std::result::Result<T, SourceError>;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("GitHub request failed ({status}): {body}")]
    UnexpectedStatus {
        status: StatusCode,
        requested_url: String,
        body: String,
    },

    #[error("Exercise file '{0}' has no download URL")]
    MissingDownloadUrl(String),

    #[error("Http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// An entry of an exercise listing
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseMeta {
    pub slug: String,
    pub title: String,
    pub path: String,
    pub source: String,
    pub source_label: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDetail {
    pub slug: String,
    pub title: String,
    pub path: String,
    pub description: String,
    pub solution_code: String,
    pub starter_code: String,
    /// Human readable attribution of the upstream repository
    pub source: String,
    pub source_key: String,
    pub source_label: String,
    pub has_solution: bool,
    pub has_tests: bool,
}

/// An upstream tree of Go exercises
#[async_trait]
pub trait ExerciseSource: Send + Sync {
    /// Key clients use to select this source
    fn key(&self) -> &'static str;

    fn label(&self) -> &'static str;

    async fn list_exercises(&self) -> Result<Vec<ExerciseMeta>>;

    async fn exercise_detail(&self, slug: &str) -> Result<ExerciseDetail>;

    /// Test files and fixtures of one exercise; an empty test list is valid
    async fn reference_tests(&self, slug: &str) -> Result<ReferenceTestSet>;
}

/// Lookup of exercise sources by key
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn ExerciseSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every GitHub-backed source
    pub fn github(client: GithubClient) -> Self {
        Self::new()
            .register(Arc::new(BregmanSource::new(client.clone())))
            .register(Arc::new(PlutovSource::new(client)))
    }

    pub fn register(mut self, source: Arc<dyn ExerciseSource>) -> Self {
        self.sources.retain(|s| s.key() != source.key());
        self.sources.push(source);
        self
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ExerciseSource>> {
        self.sources.iter().find(|s| s.key() == key).cloned()
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.key()).collect()
    }
}

/// Whether `slug` names a single directory of an exercise tree
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug != "."
        && slug != ".."
        && !slug.contains(['/', '\\', '?', '#'])
}

/// `two-sum_fast` -> `Two Sum Fast`
pub fn format_title(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Code a user starts from before writing anything, with `hint` as the only comment
pub fn starter_code(hint: &str) -> String {
    format!("package main\n\nfunc main() {{\n\t// {hint}\n}}\n")
}

/// Sorts a listing by title, ignoring case
pub fn sort_by_title(list: &mut [ExerciseMeta]) {
    list.sort_by(|a, b| {
        a.title
            .to_lowercase()
            .cmp(&b.title.to_lowercase())
            .then_with(|| a.title.cmp(&b.title))
    });
}
