#![allow(non_shorthand_field_patterns)]
#![doc = "Error handling primitives shared across the badge rotation pipeline."]
// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
//
// SPDX-License-Identifier: MIT

//! The derive emitted by [`masterror::Error`] expands pattern matches that
//! trigger the `non_shorthand_field_patterns` lint. The lint is disabled for
//! the module to keep the generated implementations warning-free.
//!
//! Every failure of a run is funnelled into [`Error`]. The variant identifies
//! the failing collaborator, while [`Error::status_code`] maps it onto the
//! trigger response contract (400 for configuration problems, 500 for
//! everything else).

use std::{
    fmt,
    path::{Path, PathBuf}
};

use crate::git::WorkspaceState;

/// Unified error type returned by every stage of the pipeline.
#[derive(Debug, masterror::Error)]
pub enum Error {
    /// A required secret or identifier is missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// Human readable description of the missing or invalid value.
        message: String
    },
    /// Wraps YAML decoding errors raised while loading configuration.
    #[error("failed to parse configuration: {source}")]
    Parse {
        /// Source decoding error from serde_yaml.
        source: serde_yaml::Error
    },
    /// The badge source page could not be fetched.
    #[error("failed to fetch badge page {url}: {message}")]
    Fetch {
        /// Address of the badge page.
        url:     String,
        /// Transport failure or unexpected status description.
        message: String
    },
    /// The fetched document does not contain a badge anchor.
    #[error("failed to extract badge: {message}")]
    Extraction {
        /// Description of the extraction failure.
        message: String
    },
    /// Object store session, upload or download failure.
    #[error("artifact store error for {target}: {message}")]
    Store {
        /// Object key or URL involved in the failing call.
        target:  String,
        /// Underlying failure description.
        message: String
    },
    /// The image render service failed or answered with an unusable body.
    #[error("render service error ({kind}): {message}")]
    Render {
        /// Failure subtype used for diagnostics.
        kind:    RenderFailure,
        /// Underlying failure description.
        message: String
    },
    /// A repository operation failed.
    #[error("repository {stage} failed: {message}")]
    Repository {
        /// Repository operation that failed.
        stage:   RepositoryStage,
        /// Underlying failure description, usually git's stderr.
        message: String
    },
    /// A repository operation was invoked from the wrong workspace state.
    #[error("repository {operation} cannot run while the workspace is {state}")]
    OutOfOrder {
        /// Operation that was attempted.
        operation: RepositoryStage,
        /// State the workspace was in at the time.
        state:     WorkspaceState
    },
    /// The code hosting API rejected the pull request.
    #[error("failed to open pull request: {message}")]
    PullRequest {
        /// Underlying API failure description.
        message: String
    },
    /// A blocking task was cancelled or panicked before reporting back.
    #[error("background task failed: {message}")]
    Task {
        /// Join failure description.
        message: String
    },
    /// Wraps I/O errors on local scratch files.
    #[error("failed to access {path:?}: {source}")]
    Io {
        /// Location of the file being read or written.
        path:   PathBuf,
        /// Underlying I/O error.
        source: std::io::Error
    },
    /// Wraps serialization errors when writing the run outcome.
    #[error("failed to serialize output: {source}")]
    Serialize {
        /// Underlying serialization error.
        source: serde_json::Error
    }
}

/// Subtypes of [`Error::Render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFailure {
    /// Connection, TLS or request construction failure.
    Transport,
    /// The request exceeded the configured timeout.
    Timeout,
    /// The service answered with a non-success status.
    Status,
    /// The service answered with an empty body.
    EmptyBody,
    /// The body was not valid JSON of the expected shape.
    MalformedBody,
    /// The body parsed but carried no usable `url` field.
    MissingUrl
}

impl fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Status => "status",
            Self::EmptyBody => "empty body",
            Self::MalformedBody => "malformed body",
            Self::MissingUrl => "missing url"
        };
        f.write_str(label)
    }
}

/// Repository operations, used to tag [`Error::Repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryStage {
    /// Cloning the remote into the workspace.
    Clone,
    /// Creating and checking out the work branch.
    Branch,
    /// Replacing the tracked file.
    Overwrite,
    /// Staging and committing.
    Commit,
    /// Pushing the work branch to `origin`.
    Push
}

impl fmt::Display for RepositoryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Clone => "clone",
            Self::Branch => "branch",
            Self::Overwrite => "overwrite",
            Self::Commit => "commit",
            Self::Push => "push"
        };
        f.write_str(label)
    }
}

impl Error {
    /// Constructs a configuration error.
    ///
    /// # Parameters
    ///
    /// * `message` - Human-readable description of the problem.
    pub fn configuration<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Configuration {
            message: message.into()
        }
    }

    /// Constructs a fetch error for the badge page at `url`.
    pub fn fetch<U, M>(url: U, message: M) -> Self
    where
        U: Into<String>,
        M: Into<String>
    {
        Self::Fetch {
            url:     url.into(),
            message: message.into()
        }
    }

    /// Constructs an extraction error.
    pub fn extraction<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Extraction {
            message: message.into()
        }
    }

    /// Constructs a store error for the given key or URL.
    pub fn store<T, M>(target: T, message: M) -> Self
    where
        T: Into<String>,
        M: Into<String>
    {
        Self::Store {
            target:  target.into(),
            message: message.into()
        }
    }

    /// Constructs a render error of the given subtype.
    pub fn render<M>(kind: RenderFailure, message: M) -> Self
    where
        M: Into<String>
    {
        Self::Render {
            kind,
            message: message.into()
        }
    }

    /// Constructs a repository error for the given operation.
    pub fn repository<M>(stage: RepositoryStage, message: M) -> Self
    where
        M: Into<String>
    {
        Self::Repository {
            stage,
            message: message.into()
        }
    }

    /// Constructs a pull request error.
    pub fn pull_request<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::PullRequest {
            message: message.into()
        }
    }

    /// Constructs a background task error.
    pub fn task<M>(message: M) -> Self
    where
        M: Into<String>
    {
        Self::Task {
            message: message.into()
        }
    }

    /// Returns the trigger status code associated with the error.
    ///
    /// Configuration problems are the caller's fault and map to 400; every
    /// other failure maps to 500.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration { .. } | Self::Parse { .. } => 400,
            _ => 500
        }
    }

    /// Returns `true` when the error was raised before any network call.
    pub fn is_configuration(&self) -> bool {
        self.status_code() == 400
    }

    /// Formats the error for diagnostics without the variant name.
    ///
    /// The returned string matches the [`std::fmt::Display`] implementation.
    pub fn to_display_string(&self) -> String {
        format!("{self}")
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(source: serde_yaml::Error) -> Self {
        Self::Parse {
            source
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialize {
            source
        }
    }
}

/// Creates an [`Error::Io`] variant capturing the failing path and source.
///
/// # Parameters
///
/// * `path` - Location of the file that triggered the error.
/// * `source` - I/O error reported by the operating system.
pub fn io_error(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source
    }
}
