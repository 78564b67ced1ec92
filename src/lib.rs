// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Monthly rotation of an externally hosted impact badge.
//!
//! The library fetches a third-party badge page, extracts the badge markup,
//! re-styles it into a fixed-size page, has the page rendered to an image,
//! archives the artifacts in an object store and proposes the new image to a
//! target repository through a pull request on a monthly branch.
//!
//! Every external service sits behind a trait ([`BadgeSource`],
//! [`ArtifactStore`], [`ImageRenderer`], [`RepositoryPublisher`],
//! [`PullRequestOpener`]) so [`run_with`] can drive the pipeline against
//! in-memory doubles. Components never read the environment: configuration
//! arrives as a [`Config`] and secrets as [`Secrets`].

mod config;
mod error;
mod extract;
mod git;
mod pipeline;
mod pulls;
mod render;
mod source;
mod store;
mod template;
mod tls;

pub use config::{
    Author, Config, Credentials, DEFAULT_RENDER_ENDPOINT, GithubConfig, RenderConfig, RepositoryConfig, Secrets,
    StoreBackend, StoreConfig, load_config, parse_config, preflight,
};
pub use error::{Error, RenderFailure, RepositoryStage, io_error};
pub use extract::{BadgeFragment, extract_fragment, find_first_anchor, normalize_subscripts};
pub use git::{
    ChangeSet, GitCredentials, GitPublisher, PublishedBranch, RepositoryPublisher, Workspace, WorkspaceState,
    branch_name, commit_message,
};
pub use pipeline::{
    Collaborators, RunOutcome, RunReport, SUCCESS_MESSAGE, Stage, StageFailure, month_of, run, run_with,
};
pub use pulls::{GithubPullRequests, OpenedPullRequest, PullRequestDraft, PullRequestOpener, monthly_pull_request};
pub use render::{HttpImageRenderer, ImageRenderer, RenderRequest, parse_render_response};
pub use source::{BadgeSource, HttpBadgeSource};
pub use store::{
    ArtifactStore, FilesystemArtifactStore, S3ArtifactStore, StoredArtifact, connect_store, sniff_content_type,
};
pub use template::{RenderedPage, VIEWPORT_CSS, wrap};
pub use tls::install_crypto_provider;
