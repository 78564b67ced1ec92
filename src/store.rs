// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Artifact store clients.
//!
//! The published badge page and the archived badge image live in an object
//! store under well-known keys that every run overwrites. Two backends share
//! the [`ArtifactStore`] contract: S3 for deployments and a local directory
//! for dry runs and tests.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{error::DisplayErrorContext, primitives::ByteStream};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::{StoreBackend, StoreConfig},
    error::Error,
};

/// Number of leading bytes inspected when sniffing a content type.
const SNIFF_LEN: usize = 512;
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

/// Markup prefixes identifying an HTML document, compared case-insensitively.
const HTML_SIGNATURES: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
];

/// Byte prefixes of binary formats and the content type they imply.
const MAGIC_NUMBERS: &[(&[u8], &str,)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png",),
    (b"\xFF\xD8\xFF", "image/jpeg",),
    (b"GIF87a", "image/gif",),
    (b"GIF89a", "image/gif",),
    (b"%PDF-", "application/pdf",),
    (b"\xEF\xBB\xBF", TEXT_CONTENT_TYPE,),
    (b"\xFE\xFF", "text/plain; charset=utf-16be",),
    (b"\xFF\xFE", "text/plain; charset=utf-16le",),
];

/// Metadata describing an uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize,)]
pub struct StoredArtifact
{
    /// Object key the artifact was written under.
    pub key:          String,
    /// Public URL serving the artifact.
    pub url:          String,
    /// Content type sniffed from the payload.
    pub content_type: String,
    /// Payload length in bytes.
    pub size:         u64,
}

/// Object storage used to publish the badge page and archive the image.
#[async_trait]
pub trait ArtifactStore: Send + Sync
{
    /// Uploads the file at `local_path` under `key`, replacing any previous
    /// object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`](Error::Store) when the file cannot be read or
    /// the upload fails.
    async fn put(&self, local_path: &Path, key: &str,) -> Result<StoredArtifact, Error,>;

    /// Downloads the object served at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`](Error::Store) on transport failures and
    /// non-success responses.
    async fn get(&self, url: &str,) -> Result<Vec<u8,>, Error,>;

    /// Returns the public URL at which `key` is served.
    fn public_url(&self, key: &str,) -> String;
}

/// Builds the store selected by `config`.
///
/// # Errors
///
/// Returns [`Error::Configuration`](Error::Configuration) when the backend's
/// required settings are missing and [`Error::Store`](Error::Store) when the
/// local root cannot be prepared.
pub async fn connect_store(config: &StoreConfig, http: Client,) -> Result<Box<dyn ArtifactStore,>, Error,>
{
    match config.backend {
        StoreBackend::S3 => Ok(Box::new(S3ArtifactStore::connect(config, http,).await?,),),
        StoreBackend::Filesystem => {
            let root = config
                .root
                .as_deref()
                .ok_or_else(|| Error::configuration("store.root is required by the filesystem backend",),)?;
            Ok(Box::new(FilesystemArtifactStore::open(root, http,)?,),)
        }
    }
}

/// [`ArtifactStore`] writing to an S3 bucket.
#[derive(Debug, Clone,)]
pub struct S3ArtifactStore
{
    client:   aws_sdk_s3::Client,
    http:     Client,
    bucket:   String,
    base_url: String,
}

impl S3ArtifactStore
{
    /// Creates an S3 session for the configured bucket and region.
    ///
    /// Credentials are resolved through the default AWS provider chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](Error::Configuration) when the bucket
    /// or region is missing.
    pub async fn connect(config: &StoreConfig, http: Client,) -> Result<Self, Error,>
    {
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| Error::configuration("store.bucket is required by the s3 backend",),)?;
        let region = config
            .region
            .clone()
            .ok_or_else(|| Error::configuration("store.region is required by the s3 backend",),)?;

        let base_url = config
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("https://{bucket}.s3.{region}.amazonaws.com"),);

        let shared = aws_config::defaults(BehaviorVersion::latest(),).region(Region::new(region,),).load().await;

        Ok(Self {
            client: aws_sdk_s3::Client::new(&shared,),
            http,
            bucket,
            base_url,
        },)
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore
{
    async fn put(&self, local_path: &Path, key: &str,) -> Result<StoredArtifact, Error,>
    {
        let bytes = read_payload(local_path, key,)?;
        let content_type = sniff_content_type(&bytes,);
        let size = bytes.len() as u64;

        debug!("Uploading {} ({} bytes, {}) to s3://{}/{}", local_path.display(), size, content_type, self.bucket, key);
        self.client
            .put_object()
            .bucket(&self.bucket,)
            .key(key,)
            .content_type(content_type,)
            .content_length(size as i64,)
            .body(ByteStream::from(bytes,),)
            .send()
            .await
            .map_err(|e| Error::store(key, format!("upload failed: {}", DisplayErrorContext(&e)),),)?;

        let url = self.public_url(key,);
        info!("Uploaded {} to {}", key, url);

        Ok(StoredArtifact {
            key: key.to_owned(),
            url,
            content_type: content_type.to_owned(),
            size,
        },)
    }

    async fn get(&self, url: &str,) -> Result<Vec<u8,>, Error,>
    {
        download(&self.http, url,).await
    }

    fn public_url(&self, key: &str,) -> String
    {
        join_url(&self.base_url, key,)
    }
}

/// [`ArtifactStore`] writing below a local directory.
///
/// Stored keys are served through `file://` URLs; [`ArtifactStore::get`]
/// reads those directly and downloads anything else over HTTP.
#[derive(Debug, Clone,)]
pub struct FilesystemArtifactStore
{
    root: PathBuf,
    http: Client,
}

impl FilesystemArtifactStore
{
    /// Opens the store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`](Error::Store) when the directory cannot be
    /// created or resolved.
    pub fn open(root: &Path, http: Client,) -> Result<Self, Error,>
    {
        let label = root.display().to_string();
        fs::create_dir_all(root,).map_err(|e| Error::store(&label, format!("failed to create store root: {e}"),),)?;
        let root = root
            .canonicalize()
            .map_err(|e| Error::store(&label, format!("failed to resolve store root: {e}"),),)?;

        Ok(Self {
            root,
            http,
        },)
    }

    fn object_path(&self, key: &str,) -> Result<PathBuf, Error,>
    {
        let relative = Path::new(key,);
        let is_contained = relative.components().all(|component| matches!(component, Component::Normal(_)),);
        if key.is_empty() || !is_contained {
            return Err(Error::store(key, "object keys must be relative paths without parent segments",),);
        }

        Ok(self.root.join(relative,),)
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore
{
    async fn put(&self, local_path: &Path, key: &str,) -> Result<StoredArtifact, Error,>
    {
        let destination = self.object_path(key,)?;
        let bytes = read_payload(local_path, key,)?;
        let content_type = sniff_content_type(&bytes,);

        if let Some(parent,) = destination.parent() {
            fs::create_dir_all(parent,)
                .map_err(|e| Error::store(key, format!("failed to create {}: {e}", parent.display()),),)?;
        }
        fs::write(&destination, &bytes,)
            .map_err(|e| Error::store(key, format!("failed to write {}: {e}", destination.display()),),)?;

        let url = self.public_url(key,);
        debug!("Stored {} bytes under {}", bytes.len(), url);

        Ok(StoredArtifact {
            key: key.to_owned(),
            url,
            content_type: content_type.to_owned(),
            size: bytes.len() as u64,
        },)
    }

    async fn get(&self, url: &str,) -> Result<Vec<u8,>, Error,>
    {
        let parsed = Url::parse(url,).map_err(|e| Error::store(url, format!("invalid URL: {e}"),),)?;
        if parsed.scheme() != "file" {
            return download(&self.http, url,).await;
        }

        let path = parsed.to_file_path().map_err(|()| Error::store(url, "URL does not name a local file",),)?;
        fs::read(&path,).map_err(|e| Error::store(url, format!("failed to read {}: {e}", path.display()),),)
    }

    fn public_url(&self, key: &str,) -> String
    {
        let path = self.root.join(key,);
        Url::from_file_path(&path,).map(String::from,).unwrap_or_else(|()| format!("file://{}", path.display()),)
    }
}

/// Guesses the content type of `payload` from its leading bytes.
///
/// Only the content is considered, never a file name. Unknown text falls back
/// to `text/plain`, unknown binary data to `application/octet-stream`.
///
/// ```
/// use badge_rotator::sniff_content_type;
///
/// assert_eq!(sniff_content_type(b"\x89PNG\r\n\x1a\n...."), "image/png");
/// assert_eq!(sniff_content_type(b"  <!doctype html><html></html>"), "text/html; charset=utf-8");
/// assert_eq!(sniff_content_type(b"plain words"), "text/plain; charset=utf-8");
/// ```
pub fn sniff_content_type(payload: &[u8],) -> &'static str
{
    let head = &payload[..payload.len().min(SNIFF_LEN,)];

    if let Some((_, content_type,),) = MAGIC_NUMBERS.iter().find(|(magic, _,)| head.starts_with(magic,),) {
        return *content_type;
    }

    if head.len() >= 14 && head.starts_with(b"RIFF",) && &head[8..14] == b"WEBPVP" {
        return "image/webp";
    }

    let markup = trim_leading_whitespace(head,);
    if is_html(markup,) {
        return HTML_CONTENT_TYPE;
    }
    if markup.starts_with(b"<?xml",) {
        return "text/xml; charset=utf-8";
    }

    if head.iter().any(|byte| is_binary_byte(*byte,),) { BINARY_CONTENT_TYPE } else { TEXT_CONTENT_TYPE }
}

fn is_html(markup: &[u8],) -> bool
{
    if markup.starts_with(b"<!--",) {
        return true;
    }

    HTML_SIGNATURES.iter().any(|signature| {
        markup.len() > signature.len()
            && markup[..signature.len()].eq_ignore_ascii_case(signature,)
            && matches!(markup[signature.len()], b' ' | b'>')
    },)
}

fn trim_leading_whitespace(bytes: &[u8],) -> &[u8]
{
    let start = bytes.iter().position(|byte| !matches!(byte, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '),);
    start.map_or(&[][..], |start| &bytes[start..],)
}

fn is_binary_byte(byte: u8,) -> bool
{
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

fn read_payload(local_path: &Path, key: &str,) -> Result<Vec<u8,>, Error,>
{
    fs::read(local_path,).map_err(|e| Error::store(key, format!("failed to read {}: {e}", local_path.display()),),)
}

async fn download(http: &Client, url: &str,) -> Result<Vec<u8,>, Error,>
{
    let response = http.get(url,).send().await.map_err(|e| Error::store(url, format!("download failed: {e}"),),)?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::store(url, format!("download answered with {status}"),),);
    }

    let bytes = response.bytes().await.map_err(|e| Error::store(url, format!("failed to read body: {e}"),),)?;
    debug!("Downloaded {} bytes from {}", bytes.len(), url);

    Ok(bytes.to_vec(),)
}

fn join_url(base: &str, key: &str,) -> String
{
    format!("{}/{}", base.trim_end_matches('/',), key.trim_start_matches('/',))
}

#[cfg(test)]
mod tests
{
    use reqwest::Client;
    use tempfile::tempdir;

    use super::{ArtifactStore, FilesystemArtifactStore, join_url, sniff_content_type};
    use crate::Error;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    #[test]
    fn sniffs_images_by_magic_number()
    {
        assert_eq!(sniff_content_type(PNG_HEADER), "image/png");
        assert_eq!(sniff_content_type(b"\xFF\xD8\xFF\xE0\x00\x10JFIF"), "image/jpeg");
        assert_eq!(sniff_content_type(b"GIF89a\x01\x00"), "image/gif");
        assert_eq!(sniff_content_type(b"RIFF\x24\x00\x00\x00WEBPVP8 "), "image/webp");
    }

    #[test]
    fn sniffs_html_regardless_of_case_and_leading_whitespace()
    {
        assert_eq!(sniff_content_type(b"\n   <!doctype html>\n<html>"), "text/html; charset=utf-8");
        assert_eq!(sniff_content_type(b"<HTML><body></body></HTML>"), "text/html; charset=utf-8");
        assert_eq!(sniff_content_type(b"<a href=\"/\">x</a>"), "text/html; charset=utf-8");
        assert_eq!(sniff_content_type(b"<!-- comment -->"), "text/html; charset=utf-8");
    }

    #[test]
    fn tag_prefixes_need_a_terminator()
    {
        assert_eq!(sniff_content_type(b"<article>"), "text/plain; charset=utf-8");
    }

    #[test]
    fn falls_back_by_byte_class()
    {
        assert_eq!(sniff_content_type(b"just some words"), "text/plain; charset=utf-8");
        assert_eq!(sniff_content_type(b"\x00\x01\x02binary"), "application/octet-stream");
        assert_eq!(sniff_content_type(b""), "text/plain; charset=utf-8");
    }

    #[test]
    fn join_url_normalizes_slashes()
    {
        assert_eq!(join_url("https://b.s3.amazonaws.com/", "/badge.html"), "https://b.s3.amazonaws.com/badge.html");
        assert_eq!(join_url("https://cdn.example", "extracted/badge.png"), "https://cdn.example/extracted/badge.png");
    }

    #[tokio::test]
    async fn filesystem_store_round_trips_exact_bytes()
    {
        let dir = tempdir().expect("failed to create tempdir",);
        let store = FilesystemArtifactStore::open(&dir.path().join("store",), Client::new(),)
            .expect("failed to open store",);

        let mut payload = PNG_HEADER.to_vec();
        payload.extend((0..=255u8).cycle().take(4096,),);
        let source = dir.path().join("badge.png",);
        std::fs::write(&source, &payload,).expect("failed to write source",);

        let stored = store.put(&source, "extracted/badge.png",).await.expect("put failed",);
        assert_eq!(stored.content_type, "image/png");
        assert_eq!(stored.size, payload.len() as u64);
        assert_eq!(stored.url, store.public_url("extracted/badge.png"));

        let fetched = store.get(&stored.url,).await.expect("get failed",);
        assert_eq!(fetched, payload);
    }

    #[tokio::test]
    async fn filesystem_store_overwrites_existing_key()
    {
        let dir = tempdir().expect("failed to create tempdir",);
        let store = FilesystemArtifactStore::open(dir.path(), Client::new(),).expect("failed to open store",);
        let source = dir.path().join("page.html",);

        std::fs::write(&source, "<html>first</html>",).expect("failed to write source",);
        store.put(&source, "badge.html",).await.expect("first put failed",);
        std::fs::write(&source, "<html>second</html>",).expect("failed to write source",);
        let stored = store.put(&source, "badge.html",).await.expect("second put failed",);

        assert_eq!(stored.content_type, "text/html; charset=utf-8");
        let fetched = store.get(&stored.url,).await.expect("get failed",);
        assert_eq!(fetched, b"<html>second</html>");
    }

    #[tokio::test]
    async fn filesystem_store_rejects_escaping_keys()
    {
        let dir = tempdir().expect("failed to create tempdir",);
        let store = FilesystemArtifactStore::open(dir.path(), Client::new(),).expect("failed to open store",);
        let source = dir.path().join("page.html",);
        std::fs::write(&source, "x",).expect("failed to write source",);

        let error = store.put(&source, "../outside.html",).await.unwrap_err();
        assert!(matches!(error, Error::Store { .. }));
    }

    #[tokio::test]
    async fn put_reports_missing_source_as_store_error()
    {
        let dir = tempdir().expect("failed to create tempdir",);
        let store = FilesystemArtifactStore::open(dir.path(), Client::new(),).expect("failed to open store",);

        let error = store.put(&dir.path().join("missing.png",), "badge.png",).await.unwrap_err();
        assert!(matches!(error, Error::Store { .. }));
        assert_eq!(error.status_code(), 500);
    }
}
