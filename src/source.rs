// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Retrieval of the third-party badge page.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::Error;

/// Capability that retrieves the badge page markup.
#[async_trait]
pub trait BadgeSource: Send + Sync
{
    /// Fetches the document at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`](Error::Fetch) on transport failures and on any
    /// status other than `200 OK`.
    async fn fetch(&self, url: &str,) -> Result<String, Error,>;
}

/// [`BadgeSource`] backed by a plain HTTP GET.
#[derive(Debug, Clone, Default,)]
pub struct HttpBadgeSource
{
    client: Client,
}

impl HttpBadgeSource
{
    /// Creates a source using the provided HTTP client.
    pub fn new(client: Client,) -> Self
    {
        Self {
            client,
        }
    }
}

#[async_trait]
impl BadgeSource for HttpBadgeSource
{
    async fn fetch(&self, url: &str,) -> Result<String, Error,>
    {
        let response = self
            .client
            .get(url,)
            .send()
            .await
            .map_err(|e| Error::fetch(url, format!("request failed: {e}"),),)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::fetch(url, format!("non 200 response: {status}"),),);
        }

        let body =
            response.text().await.map_err(|e| Error::fetch(url, format!("failed to read body: {e}"),),)?;
        debug!("Fetched {} bytes from {}", body.len(), url);

        Ok(body,)
    }
}
