// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Git operations on the ephemeral workspace holding the target repository.
///
/// A [`Workspace`] walks through `Uncloned → Cloned → BranchCreated →
/// FileUpdated → Committed → Pushed`. Every operation checks the state it
/// starts from, so out-of-order calls fail instead of touching the clone.
/// Nothing is rolled back: the remote only changes on a successful push.
use std::{
    fmt, fs,
    path::{Component, Path, PathBuf},
    process::Command,
};

use chrono::Month;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::{
    config::{Author, RepositoryConfig},
    error::{Error, RepositoryStage},
};

/// Remote every workspace pushes to.
const REMOTE: &str = "origin";
const USERNAME_ENV: &str = "BADGE_ROTATOR_GIT_USERNAME";
const TOKEN_ENV: &str = "BADGE_ROTATOR_GIT_TOKEN";
/// Credential helper answering `get` requests from the variables above, so
/// the token never lands in argv or in the clone's configuration.
const CREDENTIAL_HELPER: &str = "credential.helper=!f() { test \"$1\" = get && echo \"username=${BADGE_ROTATOR_GIT_USERNAME}\" && echo \"password=${BADGE_ROTATOR_GIT_TOKEN}\"; }; f";

/// Lifecycle of a [`Workspace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceState
{
    /// No clone exists yet.
    Uncloned,
    /// The remote has been cloned.
    Cloned,
    /// The work branch is checked out.
    BranchCreated,
    /// The tracked file has been replaced.
    FileUpdated,
    /// The change is committed locally.
    Committed,
    /// The work branch exists on the remote.
    Pushed,
}

impl fmt::Display for WorkspaceState
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        let label = match self {
            Self::Uncloned => "uncloned",
            Self::Cloned => "cloned",
            Self::BranchCreated => "on its work branch",
            Self::FileUpdated => "holding an updated file",
            Self::Committed => "committed",
            Self::Pushed => "pushed",
        };
        f.write_str(label,)
    }
}

/// Username and token used for HTTPS basic authentication against the remote.
#[derive(Clone,)]
pub struct GitCredentials
{
    username: String,
    token:    String,
}

impl GitCredentials
{
    /// Creates credentials from a username and a personal access token.
    pub fn new(username: impl Into<String,>, token: impl Into<String,>,) -> Self
    {
        Self {
            username: username.into(), token: token.into(),
        }
    }
}

impl fmt::Debug for GitCredentials
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        f.debug_struct("GitCredentials",).field("username", &self.username,).field("token", &"<redacted>",).finish()
    }
}

/// The commit created in a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct ChangeSet
{
    /// Commit id.
    pub commit:  String,
    /// Branch holding the commit.
    pub branch:  String,
    /// Commit author.
    pub author:  Author,
    /// Commit message.
    pub message: String,
    /// Paths touched by the commit, relative to the repository root.
    pub files:   Vec<String,>,
}

/// Ephemeral clone of the target repository owned by one run.
#[derive(Debug,)]
pub struct Workspace
{
    remote_url:  String,
    credentials: Option<GitCredentials,>,
    parent:      Option<PathBuf,>,
    dir:         Option<TempDir,>,
    branch:      Option<String,>,
    state:       WorkspaceState,
}

impl Workspace
{
    /// Creates an uncloned workspace for `remote_url`.
    pub fn new(remote_url: impl Into<String,>, credentials: Option<GitCredentials,>,) -> Self
    {
        Self {
            remote_url: remote_url.into(),
            credentials,
            parent: None,
            dir: None,
            branch: None,
            state: WorkspaceState::Uncloned,
        }
    }

    /// Creates the clone directory below `parent` instead of the system
    /// temporary directory.
    pub fn within(mut self, parent: impl Into<PathBuf,>,) -> Self
    {
        self.parent = Some(parent.into(),);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self,) -> WorkspaceState
    {
        self.state
    }

    /// Root of the clone, once it exists.
    pub fn path(&self,) -> Option<&Path,>
    {
        self.dir.as_ref().map(TempDir::path,)
    }

    /// Work branch name, once created.
    pub fn branch_name(&self,) -> Option<&str,>
    {
        self.branch.as_deref()
    }

    /// Clones the remote into a freshly created, uniquely named directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Repository`](Error::Repository) tagged
    /// [`RepositoryStage::Clone`] on network, authentication or disk failures.
    pub fn clone_remote(&mut self,) -> Result<&Path, Error,>
    {
        self.expect_state(WorkspaceState::Uncloned, RepositoryStage::Clone,)?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("badge-rotator-",);
        let created = match self.parent.as_deref() {
            Some(parent,) => {
                fs::create_dir_all(parent,).and_then(|()| builder.tempdir_in(parent,),)
            }
            None => builder.tempdir(),
        };
        let dir = created.map_err(|e| {
            Error::repository(RepositoryStage::Clone, format!("failed to create workspace directory: {e}"),)
        },)?;

        let target = dir.path().to_string_lossy().into_owned();
        self.run(None, &["clone", "--quiet", self.remote_url.as_str(), target.as_str()], RepositoryStage::Clone,)?;
        info!("Cloned {} into {}", self.remote_url, target);

        self.dir = Some(dir,);
        self.state = WorkspaceState::Cloned;
        Ok(self.workdir(RepositoryStage::Clone,)?,)
    }

    /// Creates and checks out the monthly work branch from `HEAD`.
    ///
    /// The name is `<prefix>-<Month>`, so a second run in the same month
    /// targets the same branch. That collision is reported rather than
    /// resolved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfOrder`](Error::OutOfOrder) before a clone and
    /// [`Error::Repository`](Error::Repository) tagged
    /// [`RepositoryStage::Branch`] when the branch already exists on the
    /// remote or cannot be created.
    pub fn branch(&mut self, prefix: &str, month: Month,) -> Result<&str, Error,>
    {
        self.expect_state(WorkspaceState::Cloned, RepositoryStage::Branch,)?;
        let dir = self.workdir(RepositoryStage::Branch,)?.to_path_buf();

        let head = self.run(Some(&dir,), &["rev-parse", "HEAD"], RepositoryStage::Branch,)?;
        let name = branch_name(prefix, month,);
        debug!("Branching {} from HEAD {}", name, head);

        if self.remote_has_branch(&dir, &name,)? {
            return Err(Error::repository(
                RepositoryStage::Branch,
                format!("branch '{name}' already exists on {REMOTE}"),
            ),);
        }

        self.run(Some(&dir,), &["checkout", "--quiet", "-b", name.as_str(), head.as_str()], RepositoryStage::Branch,)?;
        info!("Checked out branch {}", name);

        self.state = WorkspaceState::BranchCreated;
        Ok(self.branch.insert(name,).as_str(),)
    }

    /// Replaces the contents of `target` with the bytes of `source`.
    ///
    /// `target` is relative to the repository root and may not leave it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Repository`](Error::Repository) tagged
    /// [`RepositoryStage::Overwrite`] when the path is invalid or the copy
    /// fails.
    pub fn overwrite_file(&mut self, target: &str, source: &Path,) -> Result<PathBuf, Error,>
    {
        self.expect_state(WorkspaceState::BranchCreated, RepositoryStage::Overwrite,)?;

        let relative = Path::new(target,);
        if target.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_)),) {
            return Err(Error::repository(
                RepositoryStage::Overwrite,
                format!("'{target}' is not a path inside the repository"),
            ),);
        }

        let destination = self.workdir(RepositoryStage::Overwrite,)?.join(relative,);
        let bytes = fs::read(source,).map_err(|e| {
            Error::repository(RepositoryStage::Overwrite, format!("failed to read {}: {e}", source.display()),)
        },)?;

        if let Some(parent,) = destination.parent() {
            fs::create_dir_all(parent,).map_err(|e| {
                Error::repository(RepositoryStage::Overwrite, format!("failed to create {}: {e}", parent.display()),)
            },)?;
        }
        fs::write(&destination, &bytes,).map_err(|e| {
            Error::repository(RepositoryStage::Overwrite, format!("failed to write {}: {e}", destination.display()),)
        },)?;
        debug!("Wrote {} bytes to {}", bytes.len(), destination.display());

        self.state = WorkspaceState::FileUpdated;
        Ok(destination,)
    }

    /// Stages every change in the workspace and commits it as `author`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Repository`](Error::Repository) tagged
    /// [`RepositoryStage::Commit`] when staging or committing fails, including
    /// when there is nothing to commit.
    pub fn commit(&mut self, message: &str, author: &Author,) -> Result<ChangeSet, Error,>
    {
        self.expect_state(WorkspaceState::FileUpdated, RepositoryStage::Commit,)?;
        let dir = self.workdir(RepositoryStage::Commit,)?.to_path_buf();

        self.run(Some(&dir,), &["add", "--all"], RepositoryStage::Commit,)?;

        let user_name = format!("user.name={}", author.name);
        let user_email = format!("user.email={}", author.email);
        let author_arg = format!("--author={author}");
        self.run(
            Some(&dir,),
            &[
                "-c",
                user_name.as_str(),
                "-c",
                user_email.as_str(),
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                author_arg.as_str(),
                "-m",
                message,
            ],
            RepositoryStage::Commit,
        )?;

        let commit = self.run(Some(&dir,), &["rev-parse", "HEAD"], RepositoryStage::Commit,)?;
        let touched =
            self.run(Some(&dir,), &["diff-tree", "--no-commit-id", "--name-only", "-r", "HEAD"], RepositoryStage::Commit,)?;
        let files = touched.lines().map(str::to_owned,).collect::<Vec<_,>>();
        info!("Committed {} touching {} file(s)", commit, files.len());

        self.state = WorkspaceState::Committed;
        Ok(ChangeSet {
            commit,
            branch: self.branch.clone().unwrap_or_default(),
            author: author.clone(),
            message: message.to_owned(),
            files,
        },)
    }

    /// Pushes the work branch to `origin`.
    ///
    /// The push is never forced and never retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Repository`](Error::Repository) tagged
    /// [`RepositoryStage::Push`] on authentication, network or rejection
    /// failures.
    pub fn push(&mut self,) -> Result<(), Error,>
    {
        self.expect_state(WorkspaceState::Committed, RepositoryStage::Push,)?;
        let dir = self.workdir(RepositoryStage::Push,)?.to_path_buf();
        let branch = self
            .branch
            .clone()
            .ok_or_else(|| Error::repository(RepositoryStage::Push, "no work branch recorded",),)?;

        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.run(Some(&dir,), &["push", "--quiet", REMOTE, refspec.as_str()], RepositoryStage::Push,)?;
        info!("Pushed {} to {}", branch, REMOTE);

        self.state = WorkspaceState::Pushed;
        Ok((),)
    }

    fn remote_has_branch(&self, dir: &Path, name: &str,) -> Result<bool, Error,>
    {
        let mut command = self.command(Some(dir,),);
        command.args(["ls-remote", "--exit-code", "--heads", REMOTE, name],);
        let output = command
            .output()
            .map_err(|e| Error::repository(RepositoryStage::Branch, format!("git ls-remote failed: {e}"),),)?;

        // `--exit-code` reports "no matching refs" with status 2.
        match output.status.code() {
            Some(0,) => Ok(true,),
            Some(2,) => Ok(false,),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr,);
                Err(Error::repository(RepositoryStage::Branch, format!("git ls-remote failed: {}", stderr.trim()),),)
            }
        }
    }

    fn expect_state(&self, expected: WorkspaceState, operation: RepositoryStage,) -> Result<(), Error,>
    {
        if self.state == expected {
            return Ok((),);
        }

        warn!("Refusing {} while workspace is {}", operation, self.state);
        Err(Error::OutOfOrder {
            operation,
            state: self.state,
        },)
    }

    fn workdir(&self, stage: RepositoryStage,) -> Result<&Path, Error,>
    {
        self.path().ok_or_else(|| Error::repository(stage, "workspace directory is missing",),)
    }

    fn command(&self, dir: Option<&Path,>,) -> Command
    {
        let mut command = Command::new("git",);
        command.env("GIT_TERMINAL_PROMPT", "0",);
        if let Some(dir,) = dir {
            command.current_dir(dir,);
        }
        if let Some(credentials,) = &self.credentials {
            command
                .env(USERNAME_ENV, &credentials.username,)
                .env(TOKEN_ENV, &credentials.token,)
                .args(["-c", "credential.helper=", "-c", CREDENTIAL_HELPER],);
        }
        command
    }

    fn run(&self, dir: Option<&Path,>, args: &[&str], stage: RepositoryStage,) -> Result<String, Error,>
    {
        // Subcommand for messages, skipping `-c key=value` prefixes.
        let verb = args.iter().copied().find(|arg| !arg.starts_with('-',) && !arg.contains('=',),).unwrap_or("git",);
        let output = self
            .command(dir,)
            .args(args,)
            .output()
            .map_err(|e| Error::repository(stage, format!("git {verb} failed to start: {e}"),),)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr,);
            let stdout = String::from_utf8_lossy(&output.stdout,);
            let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            return Err(Error::repository(stage, format!("git {verb} failed: {detail}"),),);
        }

        Ok(String::from_utf8_lossy(&output.stdout,).trim().to_owned(),)
    }
}

/// Name of the work branch for `month`.
///
/// ```
/// use badge_rotator::branch_name;
/// use chrono::Month;
///
/// assert_eq!(branch_name("update-badge", Month::October,), "update-badge-October");
/// ```
pub fn branch_name(prefix: &str, month: Month,) -> String
{
    format!("{}-{}", prefix.trim_end_matches('-',), month.name())
}

/// Commit message for the monthly badge update.
pub fn commit_message(month: Month,) -> String
{
    format!("Update badge with monthly stats for {}", month.name())
}

/// Result of publishing the badge image to the target repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct PublishedBranch
{
    /// Pushed branch name.
    pub branch: String,
    /// Commit pushed on the branch.
    pub change: ChangeSet,
}

/// Capability committing a new badge image to the target repository.
pub trait RepositoryPublisher: Send + Sync
{
    /// Clones the repository, replaces the tracked image with `image`, commits
    /// and pushes on the work branch for `month`.
    ///
    /// # Errors
    ///
    /// Returns the first failing step as [`Error::Repository`](Error::Repository)
    /// or [`Error::OutOfOrder`](Error::OutOfOrder).
    fn publish(&self, image: &Path, month: Month,) -> Result<PublishedBranch, Error,>;
}

/// [`RepositoryPublisher`] driving a [`Workspace`] with the git executable.
#[derive(Debug, Clone,)]
pub struct GitPublisher
{
    config:      RepositoryConfig,
    credentials: Option<GitCredentials,>,
}

impl GitPublisher
{
    /// Creates a publisher for the configured repository.
    pub fn new(config: &RepositoryConfig, credentials: Option<GitCredentials,>,) -> Self
    {
        Self {
            config: config.clone(),
            credentials,
        }
    }
}

impl RepositoryPublisher for GitPublisher
{
    fn publish(&self, image: &Path, month: Month,) -> Result<PublishedBranch, Error,>
    {
        let mut workspace = Workspace::new(self.config.clone_url(), self.credentials.clone(),);
        if let Some(parent,) = &self.config.workspace_root {
            workspace = workspace.within(parent,);
        }

        workspace.clone_remote()?;
        let branch = workspace.branch(&self.config.branch_prefix, month,)?.to_owned();
        workspace.overwrite_file(&self.config.image_path, image,)?;
        let change = workspace.commit(&commit_message(month,), &self.config.author,)?;
        workspace.push()?;

        Ok(PublishedBranch {
            branch,
            change,
        },)
    }
}
