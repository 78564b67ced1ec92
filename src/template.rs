// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Page template that re-styles an extracted badge.
//!
//! The template pins the page to the 300×117 viewport the render service
//! crops from and restyles the classes used by the badge markup.

use crate::extract::BadgeFragment;

/// Placeholder replaced by the badge markup.
const CONTENTS_PLACEHOLDER: &str = "{{ contents }}";

/// Viewport rule that fixes the page size expected by the render service.
pub const VIEWPORT_CSS: &str = "html {
        width: 300px;
        height: 117px;
      }";

const PAGE_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <link href="https://fonts.googleapis.com/css2?family=Roboto&display=swap" rel="stylesheet">
    <style>
      html {
        width: 300px;
        height: 117px;
      }

      .wrapper-link {
        text-decoration: none;
      }

      .container {
        height: 100%;
        padding: 12px 16px;
        background-color: #27AE60;
        display: flex;
        justify-content: space-between;
        align-items: center;
        color: #ffffff;
        font-family: 'Roboto';
      }

      .tons {
        display: flex;
        align-items: center;
        justify-content: center;
        background-color: #ffffff;
        color: #27AE60;
        padding: 2px 4px;
        border-radius: 2px;
        width: fit-content;
      }

      p {
        font-size: 12px;
      }

      .subject {
        width: fit-content;
      }

      .header {
        margin: 0;
        font-size: 21px;
        font-weight: 700;
        max-width: 160px;
        margin-bottom: 6px;
      }

      .divider {
        min-height: 70px;
        height: 100%;
        border-radius: 3px;
        width: 2px;
        background-color: #ffffff;
        opacity: 0.4;
      }
    </style>
  </head>
  <body>
    {{ contents }}
  </body>
</html>
"#;

/// A badge fragment embedded in the styled page template.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct RenderedPage
{
    html: String,
}

impl RenderedPage
{
    /// Returns the full page markup.
    pub fn as_str(&self,) -> &str
    {
        &self.html
    }

    /// Returns the page markup as bytes, ready to be written to disk.
    pub fn as_bytes(&self,) -> &[u8]
    {
        self.html.as_bytes()
    }
}

/// Embeds `fragment` into the page template.
///
/// The fragment is inserted verbatim. It is trusted because it is the
/// extractor's own serialization of the source page.
///
/// ```
/// use badge_rotator::{VIEWPORT_CSS, extract_fragment, wrap};
///
/// let fragment = extract_fragment(r#"<a href="/b">badge</a>"#,).expect("anchor",);
/// let page = wrap(&fragment,);
/// assert!(page.as_str().contains(r#"<a href="/b">badge</a>"#));
/// assert!(page.as_str().contains(VIEWPORT_CSS));
/// ```
pub fn wrap(fragment: &BadgeFragment,) -> RenderedPage
{
    RenderedPage {
        html: PAGE_TEMPLATE.replacen(CONTENTS_PLACEHOLDER, fragment.as_str(), 1,),
    }
}
