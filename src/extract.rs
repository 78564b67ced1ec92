// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Badge extraction from the third-party badge page.
//!
//! The badge is the first hyperlink anchor of the document in depth-first
//! pre-order. It is serialized together with its whole subtree so that the
//! markup, attributes and nested elements survive untouched.

use std::fmt;

use scraper::{ElementRef, Html};
use tracing::debug;

use crate::error::Error;

/// Tag name of the element wrapping the badge.
const BADGE_TAG: &str = "a";
/// Subscript two, as used in "CO₂". The render service cannot draw it with
/// the badge font, so it is flattened to an ASCII digit.
const SUBSCRIPT_TWO: char = '\u{2082}';

/// Serialized badge subtree extracted from a badge page.
#[derive(Debug, Clone, PartialEq, Eq,)]
pub struct BadgeFragment
{
    html: String,
}

impl BadgeFragment
{
    /// Returns the serialized markup.
    pub fn as_str(&self,) -> &str
    {
        &self.html
    }

    /// Consumes the fragment and returns the serialized markup.
    pub fn into_string(self,) -> String
    {
        self.html
    }
}

impl fmt::Display for BadgeFragment
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        f.write_str(&self.html,)
    }
}

/// Parses `document` and extracts the first anchor element.
///
/// # Errors
///
/// Returns [`Error::Extraction`](Error::Extraction) when the document holds no
/// anchor element.
///
/// # Example
///
/// ```
/// use badge_rotator::extract_fragment;
///
/// let page = r#"<div><p>intro</p><a href="/badge"><span>CO₂ offset</span></a></div>"#;
/// let fragment = extract_fragment(page,).expect("badge should be found",);
/// assert_eq!(fragment.as_str(), r#"<a href="/badge"><span>CO2 offset</span></a>"#);
/// ```
pub fn extract_fragment(document: &str,) -> Result<BadgeFragment, Error,>
{
    let parsed = Html::parse_document(document,);
    let badge = find_first_anchor(parsed.root_element(),)
        .ok_or_else(|| Error::extraction("missing <a> in the node tree",),)?;

    let rendered = badge.html();
    debug!("Extracted badge fragment of {} bytes", rendered.len());

    Ok(BadgeFragment {
        html: normalize_subscripts(&rendered,),
    },)
}

/// Walks the tree below `root` depth-first, pre-order, and returns the first
/// anchor element.
///
/// Subtrees below and after the match are never visited.
pub fn find_first_anchor(root: ElementRef<'_,>,) -> Option<ElementRef<'_,>,>
{
    let mut pending = vec![root];

    while let Some(element,) = pending.pop() {
        if element.value().name() == BADGE_TAG {
            return Some(element,);
        }

        let children: Vec<ElementRef<'_,>,> = element.children().filter_map(ElementRef::wrap,).collect();
        pending.extend(children.into_iter().rev(),);
    }

    None
}

/// Replaces every subscript two with an ASCII `2`.
///
/// No other character is altered.
///
/// ```
/// use badge_rotator::normalize_subscripts;
///
/// assert_eq!(normalize_subscripts("CO₂ offset"), "CO2 offset");
/// ```
pub fn normalize_subscripts(markup: &str,) -> String
{
    markup.replace(SUBSCRIPT_TWO, "2",)
}
