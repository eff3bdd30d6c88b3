use async_trait::async_trait;

use crate::sandbox::ReferenceTestSet;

use super::{
    ExerciseDetail, ExerciseMeta, ExerciseSource, GithubClient, Result, format_title, starter_code,
};

const ATTRIBUTION: &str = "github.com/bregman-arie/go-exercises (MIT)";
const REPO: &str = "bregman-arie/go-exercises";
const ROOT: &str = "exercises";
const DESCRIPTION_FILE: &str = "exercise.md";
const NO_DESCRIPTION: &str = "No description found for this exercise.";
const NO_SOLUTION: &str = "// Solution not available in the source repository yet.";

/// Exercises from `bregman-arie/go-exercises`, one directory per exercise under `exercises/`
pub struct BregmanSource {
    client: GithubClient,
}

impl BregmanSource {
    pub fn new(client: GithubClient) -> Self {
        Self { client }
    }

    fn exercise_url(&self, slug: &str) -> String {
        self.client.contents_url(REPO, &format!("{ROOT}/{slug}"))
    }
}

fn starter(title: &str) -> String {
    starter_code(&format!("TODO: Solve \"{title}\""))
}

#[async_trait]
impl ExerciseSource for BregmanSource {
    fn key(&self) -> &'static str {
        "bregman"
    }

    fn label(&self) -> &'static str {
        "go-exercises"
    }

    async fn list_exercises(&self) -> Result<Vec<ExerciseMeta>> {
        self.client
            .list_exercises(REPO, ROOT, self.key(), self.label())
            .await
    }

    async fn exercise_detail(&self, slug: &str) -> Result<ExerciseDetail> {
        let path = self.exercise_url(slug);
        let files = self.client.list_dir(&path).await?;

        let exercise_file = files.iter().find(|f| f.name == DESCRIPTION_FILE);
        let solution_file = files.iter().find(|f| f.is_file() && f.is_go());
        let has_tests = files.iter().any(|f| f.is_go_test());

        let (description, solution_code) = tokio::join!(
            self.client.fetch_text_or(
                exercise_file.and_then(|f| f.download_url.as_deref()),
                NO_DESCRIPTION
            ),
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
        let files = self.client.list_dir(&self.exercise_url(slug)).await?;
        self.client.reference_tests(REPO, &files).await
    }
}
