// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! End-to-end badge rotation.
//!
//! One run fetches the badge page, extracts and re-styles the badge, has it
//! rendered to an image, archives both artifacts, commits the image to the
//! target repository on a monthly branch and opens a pull request. Stages
//! run strictly in sequence and the first failure ends the run.

use std::{
    fmt, fs,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use chrono::{Datelike, Month};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, error, info};

use crate::{
    config::{Config, Credentials, Secrets, preflight},
    error::{Error, io_error},
    extract::extract_fragment,
    git::{GitCredentials, GitPublisher, PublishedBranch, RepositoryPublisher},
    pulls::{GithubPullRequests, OpenedPullRequest, PullRequestOpener, monthly_pull_request},
    render::{HttpImageRenderer, ImageRenderer, RenderRequest},
    source::{BadgeSource, HttpBadgeSource},
    store::{ArtifactStore, StoredArtifact, connect_store},
    template::wrap,
    tls::install_crypto_provider,
};

/// Message reported by a run that completed every stage.
pub const SUCCESS_MESSAGE: &str = "Finished processing without error";

const PAGE_FILE: &str = "badge.html";
const IMAGE_FILE: &str = "badge.png";

/// Steps of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,)]
#[serde(rename_all = "snake_case")]
pub enum Stage
{
    /// Secrets and required identifiers are checked.
    Preflight,
    /// Production collaborators are constructed.
    Connect,
    /// The badge page is downloaded.
    Fetch,
    /// The first anchor is extracted.
    Extract,
    /// The fragment is embedded in the page template and written locally.
    Wrap,
    /// The page is uploaded to the artifact store.
    UploadPage,
    /// The render service converts the page into an image.
    Render,
    /// The rendered image is downloaded and written locally.
    DownloadImage,
    /// The image is archived in the artifact store.
    ArchiveImage,
    /// The image is committed and pushed to the target repository.
    Publish,
    /// The pull request is opened.
    PullRequest,
}

impl fmt::Display for Stage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        let label = match self {
            Self::Preflight => "preflight",
            Self::Connect => "connect",
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Wrap => "wrap",
            Self::UploadPage => "upload page",
            Self::Render => "render",
            Self::DownloadImage => "download image",
            Self::ArchiveImage => "archive image",
            Self::Publish => "publish",
            Self::PullRequest => "pull request",
        };
        f.write_str(label,)
    }
}

/// An error tagged with the stage that raised it.
#[derive(Debug,)]
pub struct StageFailure
{
    /// Failing stage.
    pub stage: Stage,
    /// Underlying error.
    pub error: Error,
}

impl StageFailure
{
    /// Trigger status code of the failure.
    pub fn status_code(&self,) -> u16
    {
        self.error.status_code()
    }
}

impl fmt::Display for StageFailure
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        write!(f, "{} stage failed: {}", self.stage, self.error)
    }
}

impl std::error::Error for StageFailure
{
    fn source(&self,) -> Option<&(dyn std::error::Error + 'static),>
    {
        Some(&self.error,)
    }
}

/// External services used by a run.
pub struct Collaborators
{
    /// Badge page source.
    pub source:     Box<dyn BadgeSource,>,
    /// Artifact store for the page and the image.
    pub store:      Box<dyn ArtifactStore,>,
    /// HTML to image renderer.
    pub renderer:   Box<dyn ImageRenderer,>,
    /// Target repository.
    pub repository: Arc<dyn RepositoryPublisher,>,
    /// Pull request API.
    pub pulls:      Box<dyn PullRequestOpener,>,
}

impl Collaborators
{
    /// Builds the production collaborators from validated credentials.
    ///
    /// # Errors
    ///
    /// Propagates store session and client construction failures.
    pub async fn connect(config: &Config, credentials: &Credentials,) -> Result<Self, Error,>
    {
        install_crypto_provider();

        let http = Client::new();
        let store = connect_store(&config.store, http.clone(),).await?;
        let renderer =
            HttpImageRenderer::new(&config.render, &credentials.render_user_id, &credentials.render_api_key,)?;
        let git_credentials = GitCredentials::new(&config.repository.owner, &credentials.github_token,);
        let pulls = GithubPullRequests::new(&credentials.github_token, config.github.api_base_url.as_deref(),)?;

        Ok(Self {
            source: Box::new(HttpBadgeSource::new(http,),),
            store,
            renderer: Box::new(renderer,),
            repository: Arc::new(GitPublisher::new(&config.repository, Some(git_credentials,),),),
            pulls: Box::new(pulls,),
        },)
    }
}

impl fmt::Debug for Collaborators
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        f.debug_struct("Collaborators",).finish_non_exhaustive()
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct RunReport
{
    /// Uploaded page.
    pub page:         StoredArtifact,
    /// Image URL returned by the render service.
    pub image_url:    String,
    /// Archived image.
    pub archive:      StoredArtifact,
    /// Branch and commit pushed to the target repository.
    pub published:    PublishedBranch,
    /// Opened pull request.
    pub pull_request: OpenedPullRequest,
}

/// Result of one invocation, as reported to the trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct RunOutcome
{
    /// 200 on success, 400 for configuration problems, 500 otherwise.
    pub status:           u16,
    /// Failing stage, absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage:            Option<Stage,>,
    /// Human readable summary.
    pub message:          String,
    /// URL of the opened pull request on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request_url: Option<String,>,
}

impl RunOutcome
{
    /// Maps a run result onto the trigger response.
    pub fn from_result(result: &Result<RunReport, StageFailure,>,) -> Self
    {
        match result {
            Ok(report,) => Self {
                status:           200,
                stage:            None,
                message:          SUCCESS_MESSAGE.to_owned(),
                pull_request_url: Some(report.pull_request.url.clone(),),
            },
            Err(failure,) => Self {
                status:           failure.status_code(),
                stage:            Some(failure.stage,),
                message:          failure.error.to_display_string(),
                pull_request_url: None,
            },
        }
    }

    /// Process exit code for the outcome: 0, 2 for caller errors, 1 otherwise.
    pub fn exit_code(&self,) -> i32
    {
        match self.status {
            200 => 0,
            400 => 2,
            _ => 1,
        }
    }
}

/// Month a date falls in.
///
/// ```
/// use badge_rotator::month_of;
/// use chrono::{Month, NaiveDate};
///
/// let date = NaiveDate::from_ymd_opt(2024, 10, 3,).expect("valid date",);
/// assert_eq!(month_of(&date,), Month::October);
/// ```
pub fn month_of<D: Datelike,>(date: &D,) -> Month
{
    // `Datelike::month` is always within 1..=12.
    Month::try_from(date.month() as u8,).unwrap_or(Month::January,)
}

/// Runs the pipeline with production collaborators.
///
/// Collaborators are only constructed once preflight has passed.
///
/// # Errors
///
/// Returns the first failing stage.
pub async fn run(config: &Config, secrets: &Secrets, month: Month,) -> Result<RunReport, StageFailure,>
{
    let credentials = stage(Stage::Preflight, async { preflight(config, secrets,) },).await?;
    let collaborators = stage(Stage::Connect, Collaborators::connect(config, &credentials,),).await?;
    execute(config, &collaborators, month,).await
}

/// Runs the pipeline with caller supplied collaborators.
///
/// Preflight still runs first; on failure no collaborator is called.
///
/// # Errors
///
/// Returns the first failing stage.
pub async fn run_with(
    config: &Config,
    secrets: &Secrets,
    collaborators: &Collaborators,
    month: Month,
) -> Result<RunReport, StageFailure,>
{
    stage(Stage::Preflight, async { preflight(config, secrets,) },).await?;
    execute(config, collaborators, month,).await
}

async fn execute(config: &Config, collaborators: &Collaborators, month: Month,) -> Result<RunReport, StageFailure,>
{
    let started = Instant::now();
    info!("Rotating badge from {} for {}", config.source_url, month.name());

    let document = stage(Stage::Fetch, collaborators.source.fetch(&config.source_url,),).await?;
    let fragment = stage(Stage::Extract, async { extract_fragment(&document,) },).await?;

    let scratch = stage(Stage::Wrap, async { scratch_dir() },).await?;
    let page_path = stage(Stage::Wrap, async {
        let page = wrap(&fragment,);
        write_scratch(scratch.path(), PAGE_FILE, page.as_bytes(),)
    },)
    .await?;

    let page = stage(Stage::UploadPage, collaborators.store.put(&page_path, &config.store.page_key,),).await?;

    let request = RenderRequest::for_page(&page.url, &config.render,);
    let image_url = stage(Stage::Render, collaborators.renderer.render(&request,),).await?;

    let image_path = stage(Stage::DownloadImage, async {
        let bytes = collaborators.store.get(&image_url,).await?;
        write_scratch(scratch.path(), IMAGE_FILE, &bytes,)
    },)
    .await?;

    let archive = stage(Stage::ArchiveImage, collaborators.store.put(&image_path, &config.store.image_key,),).await?;

    let repository = Arc::clone(&collaborators.repository,);
    let published = stage(Stage::Publish, publish(repository, image_path.clone(), month,),).await?;

    let draft = monthly_pull_request(
        &config.repository.owner,
        &config.repository.name,
        &published.branch,
        &config.repository.base_branch,
        month,
    );
    let pull_request = stage(Stage::PullRequest, collaborators.pulls.open(&draft,),).await?;

    info!("{} in {:?}: {}", SUCCESS_MESSAGE, started.elapsed(), pull_request.url);

    Ok(RunReport {
        page,
        image_url,
        archive,
        published,
        pull_request,
    },)
}

/// Awaits one stage, logging its duration or its failure.
async fn stage<T, F,>(stage: Stage, work: F,) -> Result<T, StageFailure,>
where
    F: Future<Output = Result<T, Error,>,>,
{
    let started = Instant::now();
    debug!("Starting {} stage", stage);

    match work.await {
        Ok(value,) => {
            debug!("Finished {} stage in {:?}", stage, started.elapsed());
            Ok(value,)
        }
        Err(error,) => {
            error!("Stage {} failed after {:?}: {}", stage, started.elapsed(), error);
            Err(StageFailure {
                stage,
                error,
            },)
        }
    }
}

/// Runs the git subprocesses of the publish step off the async workers.
async fn publish(
    repository: Arc<dyn RepositoryPublisher,>,
    image_path: PathBuf,
    month: Month,
) -> Result<PublishedBranch, Error,>
{
    tokio::task::spawn_blocking(move || repository.publish(&image_path, month,),)
        .await
        .map_err(|e| Error::task(format!("publish: {e}"),),)?
}

fn scratch_dir() -> Result<TempDir, Error,>
{
    tempfile::Builder::new()
        .prefix("badge-rotator-run-",)
        .tempdir()
        .map_err(|e| io_error(&std::env::temp_dir(), e,),)
}

fn write_scratch(dir: &Path, name: &str, bytes: &[u8],) -> Result<PathBuf, Error,>
{
    let path = dir.join(name,);
    fs::write(&path, bytes,).map_err(|e| io_error(&path, e,),)?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(path,)
}
