// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Client for the HTML-to-image render service.
///
/// The service loads a public page, crops the element matched by a CSS
/// selector inside a fixed viewport, and answers with the URL of the
/// resulting image.
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::RenderConfig,
    error::{Error, RenderFailure},
};

/// Longest response excerpt quoted in error messages.
const BODY_EXCERPT_LEN: usize = 200;

/// Parameters of a render call, serialized as the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize,)]
pub struct RenderRequest
{
    /// Public URL of the page to render.
    pub url:             String,
    /// Viewport width in pixels.
    pub viewport_width:  u32,
    /// Viewport height in pixels.
    pub viewport_height: u32,
    /// CSS selector of the element to crop.
    pub selector:        String,
}

impl RenderRequest
{
    /// Builds a request for `page_url` using the configured selector and
    /// viewport.
    pub fn for_page(page_url: &str, config: &RenderConfig,) -> Self
    {
        Self {
            url:             page_url.to_owned(),
            viewport_width:  config.viewport_width,
            viewport_height: config.viewport_height,
            selector:        config.selector.clone(),
        }
    }
}

/// Body returned by the render service.
#[derive(Debug, Clone, Deserialize,)]
struct RenderResponse
{
    #[serde(default)]
    url: Option<String,>,
}

/// Capability converting a public HTML page into a hosted image.
#[async_trait]
pub trait ImageRenderer: Send + Sync
{
    /// Renders the page described by `request` and returns the image URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`](Error::Render) tagged with the matching
    /// [`RenderFailure`].
    async fn render(&self, request: &RenderRequest,) -> Result<String, Error,>;
}

/// [`ImageRenderer`] calling the hcti.io compatible HTTP API.
#[derive(Debug, Clone,)]
pub struct HttpImageRenderer
{
    client:   Client,
    endpoint: String,
    user_id:  String,
    api_key:  String,
}

impl HttpImageRenderer
{
    /// Creates a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](Error::Configuration) when either
    /// credential is blank. No request is made in that case.
    pub fn new(config: &RenderConfig, user_id: &str, api_key: &str,) -> Result<Self, Error,>
    {
        if user_id.trim().is_empty() || api_key.trim().is_empty() {
            return Err(Error::configuration("render user id and render API key are required",),);
        }

        let client = Client::builder()
            .timeout(config.timeout(),)
            .build()
            .map_err(|e| Error::render(RenderFailure::Transport, format!("failed to build HTTP client: {e}"),),)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            user_id: user_id.to_owned(),
            api_key: api_key.to_owned(),
        },)
    }
}

#[async_trait]
impl ImageRenderer for HttpImageRenderer
{
    async fn render(&self, request: &RenderRequest,) -> Result<String, Error,>
    {
        debug!("Requesting render of {} ({}x{}, selector {})", request.url, request.viewport_width, request.viewport_height, request.selector);

        let response = self
            .client
            .post(&self.endpoint,)
            .basic_auth(&self.user_id, Some(&self.api_key,),)
            .json(request,)
            .send()
            .await
            .map_err(transport_error,)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error,)?;

        if !status.is_success() {
            return Err(Error::render(
                RenderFailure::Status,
                format!("render service answered {status}: {}", excerpt(&body)),
            ),);
        }

        let image_url = parse_render_response(&body,)?;
        info!("Render service produced {}", image_url);

        Ok(image_url,)
    }
}

/// Extracts the image URL from a successful render response body.
///
/// # Errors
///
/// Returns [`Error::Render`](Error::Render) with
/// [`RenderFailure::EmptyBody`], [`RenderFailure::MalformedBody`] or
/// [`RenderFailure::MissingUrl`] depending on what is wrong with the body.
///
/// ```
/// use badge_rotator::parse_render_response;
///
/// let url = parse_render_response(r#"{"url":"https://example/img.png"}"#,).expect("valid body",);
/// assert_eq!(url, "https://example/img.png");
/// ```
pub fn parse_render_response(body: &str,) -> Result<String, Error,>
{
    if body.trim().is_empty() {
        return Err(Error::render(RenderFailure::EmptyBody, "render service answered with an empty body",),);
    }

    let parsed: RenderResponse = serde_json::from_str(body,).map_err(|e| {
        Error::render(RenderFailure::MalformedBody, format!("{e}; body was: {}", excerpt(body)),)
    },)?;

    let url = parsed
        .url
        .map(|url| url.trim().to_owned(),)
        .filter(|url| !url.is_empty(),)
        .ok_or_else(|| Error::render(RenderFailure::MissingUrl, "response carries no url field",),)?;

    Url::parse(&url,)
        .map_err(|e| Error::render(RenderFailure::MissingUrl, format!("url field {url:?} is not a URL: {e}"),),)?;

    Ok(url,)
}

fn transport_error(error: reqwest::Error,) -> Error
{
    let kind = if error.is_timeout() { RenderFailure::Timeout } else { RenderFailure::Transport };
    Error::render(kind, error.to_string(),)
}

fn excerpt(body: &str,) -> &str
{
    match body.char_indices().nth(BODY_EXCERPT_LEN,) {
        Some((index, _,),) => &body[..index],
        None => body,
    }
}

#[cfg(test)]
mod tests
{
    use super::{HttpImageRenderer, RenderRequest, excerpt, parse_render_response};
    use crate::{
        Error,
        config::RenderConfig,
        error::RenderFailure,
    };

    fn failure(result: Result<String, Error,>,) -> RenderFailure
    {
        match result {
            Err(Error::Render {
                kind, ..
            },) => kind,
            other => panic!("expected render error, got {other:?}"),
        }
    }

    #[test]
    fn request_serializes_expected_fields()
    {
        let request = RenderRequest::for_page("https://bucket.example/badge.html", &RenderConfig::default(),);
        let json = serde_json::to_value(&request,).expect("serialization failed",);

        assert_eq!(json["url"], "https://bucket.example/badge.html");
        assert_eq!(json["viewport_width"], 300);
        assert_eq!(json["viewport_height"], 117);
        assert_eq!(json["selector"], ".container");
        assert_eq!(json.as_object().map(|object| object.len()), Some(4));
    }

    #[test]
    fn parses_url_from_response()
    {
        let url = parse_render_response(r#"{"url":"https://example/img.png"}"#,).expect("valid body",);
        assert_eq!(url, "https://example/img.png");
    }

    #[test]
    fn ignores_unknown_response_fields()
    {
        let url = parse_render_response(r#"{"url":"https://example/img.png","id":"abc"}"#,).expect("valid body",);
        assert_eq!(url, "https://example/img.png");
    }

    #[test]
    fn distinguishes_empty_body()
    {
        assert_eq!(failure(parse_render_response("",)), RenderFailure::EmptyBody);
        assert_eq!(failure(parse_render_response("  \n",)), RenderFailure::EmptyBody);
    }

    #[test]
    fn distinguishes_malformed_body()
    {
        assert_eq!(failure(parse_render_response("<html>502</html>",)), RenderFailure::MalformedBody);
        assert_eq!(failure(parse_render_response("[1,2]",)), RenderFailure::MalformedBody);
    }

    #[test]
    fn distinguishes_missing_url()
    {
        assert_eq!(failure(parse_render_response("{}",)), RenderFailure::MissingUrl);
        assert_eq!(failure(parse_render_response(r#"{"url":""}"#,)), RenderFailure::MissingUrl);
        assert_eq!(failure(parse_render_response(r#"{"url":"not a url"}"#,)), RenderFailure::MissingUrl);
    }

    #[test]
    fn constructor_requires_both_credentials()
    {
        let config = RenderConfig::default();

        let error = HttpImageRenderer::new(&config, "", "key",).unwrap_err();
        assert!(error.is_configuration());
        let error = HttpImageRenderer::new(&config, "user", " ",).unwrap_err();
        assert!(error.is_configuration());
        assert!(HttpImageRenderer::new(&config, "user", "key",).is_ok());
    }

    #[test]
    fn excerpt_truncates_on_char_boundary()
    {
        let body = "₂".repeat(300,);
        assert_eq!(excerpt(&body,).chars().count(), 200);
        assert_eq!(excerpt("short",), "short");
    }
}
