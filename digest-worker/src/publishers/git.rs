//! Git sink (hard): publishes the rendered digest as a Jekyll post under
//! `_posts/` in a configured GitHub repository.
//!
//! Grounded on `ThirdKeyAI-Symbiont/runtime/src/bin/github.rs`'s
//! `GitHubClient` (`octocrab` + `base64` content encoding, owner/repo
//! parsing). Here the "parse a URL" step is replaced by parsing the
//! `owner/repo` shorthand accepted for `TARGET_REPO`.

use async_trait::async_trait;
use octocrab::Octocrab;

use super::{PublishRequest, Publisher};
use crate::error::PublishError;

/// Number of `-vN` suffixes attempted before giving up on a filename
/// collision.
const MAX_VERSION_ATTEMPTS: u32 = 10;

pub struct GitPublisher {
    client: Octocrab,
    owner: String,
    repo: String,
    branch: String,
}

impl GitPublisher {
    pub fn new(token: &str, target_repo: &str, branch: &str) -> Result<Self, PublishError> {
        let (owner, repo) = target_repo
            .split_once('/')
            .ok_or_else(|| PublishError::Git(format!("TARGET_REPO {target_repo:?} is not owner/repo")))?;

        let client = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .map_err(|e| PublishError::Git(format!("failed to build GitHub client: {e}")))?;

        Ok(Self {
            client,
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
        })
    }

    /// Returns `true` if a file exists at `path` on the configured branch.
    async fn file_exists(&self, path: &str) -> Result<bool, PublishError> {
        match self
            .client
            .repos(&self.owner, &self.repo)
            .get_content()
            .path(path)
            .r#ref(&self.branch)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(octocrab::Error::GitHub { source, .. }) if source.status_code == 404 => Ok(false),
            Err(err) => Err(PublishError::Git(format!("checking {path} failed: {err}"))),
        }
    }

    async fn create_file(&self, path: &str, message: &str, content: &str) -> Result<(), PublishError> {
        self.client
            .repos(&self.owner, &self.repo)
            .create_file(path, message, content)
            .branch(&self.branch)
            .send()
            .await
            .map_err(|e| PublishError::Git(format!("creating {path} failed: {e}")))?;
        Ok(())
    }

    /// Resolves the final path to write to: the original `_posts/{fileName}`
    /// if free, else the smallest `-vN` (N >= 2) suffix not already taken.
    async fn resolve_target_path(&self, file_name: &str) -> Result<String, PublishError> {
        let original_path = format!("_posts/{file_name}");
        if !self.file_exists(&original_path).await? {
            return Ok(original_path);
        }

        let stem = file_name.strip_suffix(".md").unwrap_or(file_name);
        for n in 2..(2 + MAX_VERSION_ATTEMPTS) {
            let candidate = format!("_posts/{stem}-v{n}.md");
            if !self.file_exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        Err(PublishError::Git(format!(
            "exhausted {MAX_VERSION_ATTEMPTS} versioned-name attempts for {file_name}"
        )))
    }
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, request: &PublishRequest<'_>) -> Result<(), PublishError> {
        let path = self.resolve_target_path(request.file_name).await?;
        let message = format!("HackerNews daily digest: {}", request.date_str);
        self.create_file(&path, &message, request.markdown).await
    }

    fn is_hard(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "git"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versioned_stem_strips_md_suffix() {
        let stem = "2025-01-15-daily.md".strip_suffix(".md").unwrap();
        assert_eq!(stem, "2025-01-15-daily");
        assert_eq!(format!("_posts/{stem}-v2.md"), "_posts/2025-01-15-daily-v2.md");
    }
}
