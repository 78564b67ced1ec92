// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Pull request creation on the code hosting API.
///
/// Provides the monthly draft and an octocrab backed opener.
use async_trait::async_trait;
use chrono::Month;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{error::Error, tls::install_crypto_provider};

/// Pull request about to be opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct PullRequestDraft
{
    /// Repository owner.
    pub owner:                 String,
    /// Repository name.
    pub repo:                  String,
    /// Title shown in the pull request list.
    pub title:                 String,
    /// Pull request description.
    pub body:                  String,
    /// Branch holding the change.
    pub head:                  String,
    /// Branch the change targets.
    pub base:                  String,
    /// Whether maintainers of the base repository may push to the head
    /// branch.
    pub maintainer_can_modify: bool,
}

/// Builds the monthly badge pull request.
///
/// ```
/// use badge_rotator::monthly_pull_request;
/// use chrono::Month;
///
/// let draft = monthly_pull_request("octocat", "site", "update-badge-May", "master", Month::May,);
/// assert_eq!(draft.title, "Update badge for May");
/// assert_eq!(draft.body, "Swap in the latest badge with the stats for May");
/// ```
pub fn monthly_pull_request(owner: &str, repo: &str, head: &str, base: &str, month: Month,) -> PullRequestDraft
{
    PullRequestDraft {
        owner:                 owner.to_owned(),
        repo:                  repo.to_owned(),
        title:                 format!("Update badge for {}", month.name()),
        body:                  format!("Swap in the latest badge with the stats for {}", month.name()),
        head:                  head.to_owned(),
        base:                  base.to_owned(),
        maintainer_can_modify: true,
    }
}

/// Pull request created by an opener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct OpenedPullRequest
{
    /// Pull request number.
    pub number: u64,
    /// Browser URL of the pull request.
    pub url:    String,
}

/// Capability opening pull requests.
#[async_trait]
pub trait PullRequestOpener: Send + Sync
{
    /// Opens `draft`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PullRequest`](Error::PullRequest) when the API
    /// rejects the request, for instance because the head branch is missing
    /// or a pull request for it already exists.
    async fn open(&self, draft: &PullRequestDraft,) -> Result<OpenedPullRequest, Error,>;
}

/// [`PullRequestOpener`] backed by the GitHub REST API.
#[derive(Debug, Clone,)]
pub struct GithubPullRequests
{
    client: Octocrab,
}

impl GithubPullRequests
{
    /// Creates an authenticated client.
    ///
    /// `base_url` overrides the API root, e.g. for GitHub Enterprise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](Error::Configuration) when the token
    /// is blank or the base URL is invalid.
    pub fn new(token: &str, base_url: Option<&str,>,) -> Result<Self, Error,>
    {
        if token.trim().is_empty() {
            return Err(Error::configuration("a GitHub token is required to open pull requests",),);
        }

        install_crypto_provider();

        let mut builder = Octocrab::builder().personal_token(token.to_owned(),);
        if let Some(base_url,) = base_url {
            builder = builder
                .base_uri(base_url,)
                .map_err(|e| Error::configuration(format!("invalid GitHub API base URL {base_url}: {e}"),),)?;
        }

        let client = builder
            .build()
            .map_err(|e| Error::configuration(format!("failed to initialize GitHub client: {e}"),),)?;

        Ok(Self {
            client,
        },)
    }
}

#[async_trait]
impl PullRequestOpener for GithubPullRequests
{
    async fn open(&self, draft: &PullRequestDraft,) -> Result<OpenedPullRequest, Error,>
    {
        debug!("Opening pull request {}/{} {} -> {}", draft.owner, draft.repo, draft.head, draft.base);

        let created = self
            .client
            .pulls(&draft.owner, &draft.repo,)
            .create(&draft.title, &draft.head, &draft.base,)
            .body(&draft.body,)
            .maintainer_can_modify(draft.maintainer_can_modify,)
            .send()
            .await
            .map_err(|e| Error::pull_request(format!("{}/{}: {e}", draft.owner, draft.repo),),)?;

        let url = created.html_url.map(|url| url.to_string(),).unwrap_or_else(|| {
            format!("https://github.com/{}/{}/pull/{}", draft.owner, draft.repo, created.number)
        },);
        info!("Opened pull request #{}: {}", created.number, url);

        Ok(OpenedPullRequest {
            number: created.number,
            url,
        },)
    }
}

#[cfg(test)]
mod tests
{
    use chrono::Month;

    use super::{GithubPullRequests, monthly_pull_request};

    #[test]
    fn draft_names_month_in_title_and_body()
    {
        let draft = monthly_pull_request("octocat", "site", "update-badge-October", "master", Month::October,);

        assert_eq!(draft.title, "Update badge for October");
        assert_eq!(draft.body, "Swap in the latest badge with the stats for October");
        assert_eq!(draft.head, "update-badge-October");
        assert_eq!(draft.base, "master");
        assert_eq!(draft.owner, "octocat");
        assert_eq!(draft.repo, "site");
        assert!(draft.maintainer_can_modify);
    }

    #[test]
    fn draft_is_pure()
    {
        let first = monthly_pull_request("o", "r", "h", "main", Month::February,);
        let second = monthly_pull_request("o", "r", "h", "main", Month::February,);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn client_requires_token()
    {
        let error = GithubPullRequests::new("  ", None,).unwrap_err();
        assert!(error.is_configuration());
    }

    #[tokio::test]
    async fn client_accepts_custom_base_url()
    {
        assert!(GithubPullRequests::new("ghp_token", Some("https://github.example.com/api/v3/",),).is_ok());
    }
}
