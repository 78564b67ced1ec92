// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Configuration document describing a badge rotation run.
//!
//! The configuration is built once at startup and handed to every component by
//! reference. Identifiers and tunables come from a YAML document, secrets are
//! kept apart in [`Secrets`] so that the document can be committed safely.
//! [`preflight`] validates both before any network call is made.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{self, Error};

/// Render API endpoint used when the configuration does not override it.
pub const DEFAULT_RENDER_ENDPOINT: &str = "https://hcti.io/v1/image";
/// Object key of the published HTML page.
const DEFAULT_PAGE_KEY: &str = "badge.html";
/// Object key of the archived badge image.
const DEFAULT_IMAGE_KEY: &str = "extracted/badge.png";
const DEFAULT_SELECTOR: &str = ".container";
const DEFAULT_VIEWPORT_WIDTH: u32 = 300;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 117;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 15;
const DEFAULT_BASE_BRANCH: &str = "master";
const DEFAULT_IMAGE_PATH: &str = "img/badge.png";
const DEFAULT_BRANCH_PREFIX: &str = "update-badge";
const DEFAULT_AUTHOR_NAME: &str = "badge-rotator";
const DEFAULT_AUTHOR_EMAIL: &str = "badge-rotator@users.noreply.github.com";

/// Root configuration document.
///
/// # Examples
///
/// ```
/// use badge_rotator::parse_config;
///
/// let yaml = r#"
/// source_url: https://www.wren.co/badge/logo/octocat
/// store:
///   bucket: badges
///   region: us-east-1
/// repository:
///   owner: octocat
///   name: octocat
/// "#;
/// let config = parse_config(yaml,).expect("valid configuration",);
/// assert_eq!(config.repository.base_branch, "master");
/// assert_eq!(config.render.viewport_width, 300);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize,)]
pub struct Config
{
    /// Address of the third-party badge page.
    #[serde(alias = "badge_url")]
    pub source_url: String,

    /// Artifact store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Render API settings.
    #[serde(default)]
    pub render: RenderConfig,

    /// Target repository settings.
    pub repository: RepositoryConfig,

    /// Code hosting API settings.
    #[serde(default)]
    pub github: GithubConfig,
}

/// Backend used to hold published artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize,)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend
{
    /// Amazon S3 (or a compatible service).
    #[default]
    S3,
    /// A local directory, served through `file://` URLs.
    Filesystem,
}

/// Artifact store settings.
#[derive(Debug, Clone, Deserialize, Serialize,)]
pub struct StoreConfig
{
    /// Store implementation to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Bucket name, required by the S3 backend.
    #[serde(default)]
    pub bucket: Option<String,>,

    /// Bucket region, required by the S3 backend.
    #[serde(default)]
    pub region: Option<String,>,

    /// Root directory, required by the filesystem backend.
    #[serde(default)]
    pub root: Option<PathBuf,>,

    /// Public URL prefix under which stored keys are served.
    ///
    /// Defaults to the virtual-hosted S3 address of the bucket.
    #[serde(default)]
    pub public_base_url: Option<String,>,

    /// Key of the published HTML page.
    #[serde(default = "default_page_key")]
    pub page_key: String,

    /// Key of the archived badge image.
    #[serde(default = "default_image_key")]
    pub image_key: String,
}

impl Default for StoreConfig
{
    fn default() -> Self
    {
        Self {
            backend:         StoreBackend::default(),
            bucket:          None,
            region:          None,
            root:            None,
            public_base_url: None,
            page_key:        default_page_key(),
            image_key:       default_image_key(),
        }
    }
}

/// Render API settings.
#[derive(Debug, Clone, Deserialize, Serialize,)]
pub struct RenderConfig
{
    /// Endpoint receiving render requests.
    #[serde(default = "default_render_endpoint")]
    pub endpoint: String,

    /// CSS selector of the element to crop.
    #[serde(default = "default_selector")]
    pub selector: String,

    /// Viewport width in pixels.
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    /// Viewport height in pixels.
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_render_timeout_secs")]
    pub timeout_secs: u64,
}

impl RenderConfig
{
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self,) -> Duration
    {
        Duration::from_secs(self.timeout_secs,)
    }
}

impl Default for RenderConfig
{
    fn default() -> Self
    {
        Self {
            endpoint:        default_render_endpoint(),
            selector:        default_selector(),
            viewport_width:  default_viewport_width(),
            viewport_height: default_viewport_height(),
            timeout_secs:    default_render_timeout_secs(),
        }
    }
}

/// Target repository settings.
#[derive(Debug, Clone, Deserialize, Serialize,)]
pub struct RepositoryConfig
{
    /// Account owning the repository; also the push username.
    #[serde(alias = "user")]
    pub owner: String,

    /// Repository name.
    #[serde(alias = "repo")]
    pub name: String,

    /// Clone URL override, e.g. for mirrors or local remotes.
    #[serde(default)]
    pub remote_url: Option<String,>,

    /// Branch the pull request targets.
    #[serde(default = "default_base_branch", alias = "base")]
    pub base_branch: String,

    /// Tracked image path, relative to the repository root.
    #[serde(default = "default_image_path")]
    pub image_path: String,

    /// Prefix of the monthly work branch.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// Commit author identity.
    #[serde(default)]
    pub author: Author,

    /// Directory in which the ephemeral workspace is created.
    ///
    /// Defaults to the system temporary directory.
    #[serde(default)]
    pub workspace_root: Option<PathBuf,>,
}

impl RepositoryConfig
{
    /// Returns the URL the workspace is cloned from.
    ///
    /// # Examples
    ///
    /// ```
    /// use badge_rotator::parse_config;
    ///
    /// let config = parse_config(
    ///     "source_url: https://example.com\nrepository: {owner: octocat, name: profile}",
    /// )
    /// .expect("valid configuration",);
    /// assert_eq!(config.repository.clone_url(), "https://github.com/octocat/profile.git");
    /// ```
    pub fn clone_url(&self,) -> String
    {
        match self.remote_url.as_deref().map(str::trim,).filter(|url| !url.is_empty(),) {
            Some(url,) => url.to_owned(),
            None => format!("https://github.com/{}/{}.git", self.owner, self.name),
        }
    }
}

/// Commit author identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize,)]
pub struct Author
{
    /// Display name.
    pub name:  String,
    /// Email address.
    pub email: String,
}

impl Default for Author
{
    fn default() -> Self
    {
        Self {
            name: DEFAULT_AUTHOR_NAME.to_owned(), email: DEFAULT_AUTHOR_EMAIL.to_owned(),
        }
    }
}

impl fmt::Display for Author
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Code hosting API settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize,)]
pub struct GithubConfig
{
    /// API base URI override, e.g. for GitHub Enterprise.
    #[serde(default)]
    pub api_base_url: Option<String,>,
}

/// Secret values supplied out of band.
///
/// The library never reads them from the environment; the binary does and
/// passes the result in.
#[derive(Clone, Default,)]
pub struct Secrets
{
    /// Render API user identifier.
    pub render_user_id: Option<String,>,
    /// Render API key.
    pub render_api_key: Option<String,>,
    /// Code hosting personal access token.
    pub github_token:   Option<String,>,
}

impl fmt::Debug for Secrets
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        f.debug_struct("Secrets",)
            .field("render_user_id", &self.render_user_id.as_ref().map(|_| "<redacted>",),)
            .field("render_api_key", &self.render_api_key.as_ref().map(|_| "<redacted>",),)
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>",),)
            .finish()
    }
}

/// Secrets that passed [`preflight`].
#[derive(Clone,)]
pub struct Credentials
{
    /// Render API user identifier.
    pub render_user_id: String,
    /// Render API key.
    pub render_api_key: String,
    /// Code hosting personal access token.
    pub github_token:   String,
}

impl fmt::Debug for Credentials
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        f.debug_struct("Credentials",)
            .field("render_user_id", &"<redacted>",)
            .field("render_api_key", &"<redacted>",)
            .field("github_token", &"<redacted>",)
            .finish()
    }
}

/// Loads the configuration from the provided YAML file path.
///
/// # Errors
///
/// Returns [`Error::Io`](Error::Io) when the file cannot be read and
/// [`Error::Parse`](Error::Parse) when the YAML cannot be decoded.
pub fn load_config(path: &Path,) -> Result<Config, Error,>
{
    let contents = fs::read_to_string(path,).map_err(|source| error::io_error(path, source,),)?;
    parse_config(&contents,)
}

/// Parses the configuration from a YAML document string.
///
/// # Errors
///
/// Propagates [`Error::Parse`](Error::Parse) when the YAML cannot be decoded.
pub fn parse_config(contents: &str,) -> Result<Config, Error,>
{
    Ok(serde_yaml::from_str(contents,)?,)
}

/// Checks that every required identifier and secret is present.
///
/// All problems are reported at once so a misconfigured deployment can be
/// fixed in one pass.
///
/// # Errors
///
/// Returns [`Error::Configuration`](Error::Configuration) listing every
/// missing value.
pub fn preflight(config: &Config, secrets: &Secrets,) -> Result<Credentials, Error,>
{
    let mut missing = Vec::new();

    let render_user_id = required(secrets.render_user_id.as_deref(), "render user id", &mut missing,);
    let render_api_key = required(secrets.render_api_key.as_deref(), "render API key", &mut missing,);
    let github_token = required(secrets.github_token.as_deref(), "GitHub token", &mut missing,);

    required(Some(config.source_url.as_str(),), "source_url", &mut missing,);
    required(Some(config.repository.owner.as_str(),), "repository.owner", &mut missing,);
    required(Some(config.repository.name.as_str(),), "repository.name", &mut missing,);
    required(Some(config.repository.image_path.as_str(),), "repository.image_path", &mut missing,);

    match config.store.backend {
        StoreBackend::S3 => {
            required(config.store.bucket.as_deref(), "store.bucket", &mut missing,);
            required(config.store.region.as_deref(), "store.region", &mut missing,);
        }
        StoreBackend::Filesystem => {
            let root = config.store.root.as_ref().and_then(|root| root.to_str(),);
            required(root, "store.root", &mut missing,);
        }
    }

    match (render_user_id, render_api_key, github_token,) {
        (Some(render_user_id,), Some(render_api_key,), Some(github_token,),)
            if missing.is_empty() =>
        {
            Ok(Credentials {
                render_user_id,
                render_api_key,
                github_token,
            },)
        }
        _ => Err(Error::configuration(format!("missing required values: {}", missing.join(", ")),),),
    }
}

fn required(value: Option<&str,>, name: &'static str, missing: &mut Vec<&'static str,>,) -> Option<String,>
{
    match value.map(str::trim,).filter(|value| !value.is_empty(),) {
        Some(value,) => Some(value.to_owned(),),
        None => {
            missing.push(name,);
            None
        }
    }
}

fn default_page_key() -> String
{
    DEFAULT_PAGE_KEY.to_owned()
}

fn default_image_key() -> String
{
    DEFAULT_IMAGE_KEY.to_owned()
}

fn default_render_endpoint() -> String
{
    DEFAULT_RENDER_ENDPOINT.to_owned()
}

fn default_selector() -> String
{
    DEFAULT_SELECTOR.to_owned()
}

fn default_viewport_width() -> u32
{
    DEFAULT_VIEWPORT_WIDTH
}

fn default_viewport_height() -> u32
{
    DEFAULT_VIEWPORT_HEIGHT
}

fn default_render_timeout_secs() -> u64
{
    DEFAULT_RENDER_TIMEOUT_SECS
}

fn default_base_branch() -> String
{
    DEFAULT_BASE_BRANCH.to_owned()
}

fn default_image_path() -> String
{
    DEFAULT_IMAGE_PATH.to_owned()
}

fn default_branch_prefix() -> String
{
    DEFAULT_BRANCH_PREFIX.to_owned()
}
