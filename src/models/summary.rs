use serde::{Deserialize, Serialize};

/// One image discovered in a page head: an icon from `<link>` or a preview
/// image from `og:image`.
///
/// `url` is always absolute. Relative references are resolved against the
/// page URL before an image is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewImage {
    pub url: String,
    #[serde(rename = "secureURL", skip_serializing_if = "Option::is_none")]
    pub secure_url: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "is_unset")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "is_unset")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl PreviewImage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// A zero dimension carries no information and is left out like a missing one.
fn is_unset(dimension: &Option<u32>) -> bool {
    dimension.map_or(true, |value| value == 0)
}

/// Summary returned by `GET /v1/summary`.
///
/// Every field is optional and omitted from the JSON when unset. `images` is
/// `None` rather than an empty list when the page declared no `og:image`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<PreviewImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<PreviewImage>>,
}
