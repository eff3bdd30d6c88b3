use async_trait::async_trait;

use crate::sandbox::ReferenceTestSet;

use super::{
    ExerciseDetail, ExerciseMeta, ExerciseSource, GithubClient, Result, format_title, starter_code,
};

const ATTRIBUTION: &str = "github.com/plutov/practice-go";
const REPO: &str = "plutov/practice-go";
const NO_README: &str = "No README found for this exercise.";
const NO_SOLUTION: &str = "// No solution provided.";

/// Exercises from `plutov/practice-go`, one directory per exercise at the repository root
pub struct PlutovSource {
    client: GithubClient,
}

impl PlutovSource {
    pub fn new(client: GithubClient) -> Self {
        Self { client }
    }
}

fn starter(title: &str) -> String {
    starter_code(&format!("Solve \"{title}\""))
}

#[async_trait]
impl ExerciseSource for PlutovSource {
    fn key(&self) -> &'static str {
        "plutov"
    }

    fn label(&self) -> &'static str {
        "practice-go"
    }

    async fn list_exercises(&self) -> Result<Vec<ExerciseMeta>> {
        self.client
            .list_exercises(REPO, "", self.key(), self.label())
            .await
    }

    async fn exercise_detail(&self, slug: &str) -> Result<ExerciseDetail> {
        let path = self.client.contents_url(REPO, slug);
        let files = self.client.list_dir(&path).await?;

        let readme = files
            .iter()
            .find(|f| f.is_file() && f.name.eq_ignore_ascii_case("readme.md"));
        let solution_file = files
            .iter()
            .find(|f| f.is_file() && f.is_go() && !f.is_go_test());
        let has_tests = files.iter().any(|f| f.is_go_test());

        let (description, solution_code) = tokio::join!(
            self.client
                .fetch_text_or(readme.and_then(|f| f.download_url.as_deref()), NO_README),
            self.client.fetch_text_or(
                solution_file.and_then(|f| f.download_url.as_deref()),
                NO_SOLUTION
            ),
        );

        let title = format_title(slug);
        Ok(ExerciseDetail {
            slug: slug.to_string(),
            starter_code: starter(&title),
            title,
            path,
            description,
            solution_code,
            source: ATTRIBUTION.to_string(),
            source_key: self.key().to_string(),
            source_label: self.label().to_string(),
            has_solution: solution_file.is_some(),
            has_tests,
        })
    }

    async fn reference_tests(&self, slug: &str) -> Result<ReferenceTestSet> {
        let files = self
            .client
            .list_dir(&self.client.contents_url(REPO, slug))
            .await?;
        self.client.reference_tests(REPO, &files).await
    }
}
