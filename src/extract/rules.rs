use html5ever::Attribute;
use url::Url;

use super::ParseAnomaly;
use crate::models::{PageSummary, PreviewImage};

/// `<meta>` properties that contribute to a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MetaProperty {
    Keywords,
    OgTitle,
    OgType,
    OgUrl,
    OgSiteName,
    OgDescription,
    Description,
    Author,
    OgImage,
    OgImageSecureUrl,
    OgImageType,
    OgImageWidth,
    OgImageHeight,
    OgImageAlt,
}

impl MetaProperty {
    pub(crate) fn parse(key: &str) -> Option<Self> {
        let property = match key.trim().to_ascii_lowercase().as_str() {
            "keywords" => Self::Keywords,
            "og:title" => Self::OgTitle,
            "og:type" => Self::OgType,
            "og:url" => Self::OgUrl,
            "og:site_name" => Self::OgSiteName,
            "og:description" => Self::OgDescription,
            "description" => Self::Description,
            "author" => Self::Author,
            "og:image" => Self::OgImage,
            "og:image:secure_url" => Self::OgImageSecureUrl,
            "og:image:type" => Self::OgImageType,
            "og:image:width" => Self::OgImageWidth,
            "og:image:height" => Self::OgImageHeight,
            "og:image:alt" => Self::OgImageAlt,
            _ => return None,
        };
        Some(property)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Keywords => "keywords",
            Self::OgTitle => "og:title",
            Self::OgType => "og:type",
            Self::OgUrl => "og:url",
            Self::OgSiteName => "og:site_name",
            Self::OgDescription => "og:description",
            Self::Description => "description",
            Self::Author => "author",
            Self::OgImage => "og:image",
            Self::OgImageSecureUrl => "og:image:secure_url",
            Self::OgImageType => "og:image:type",
            Self::OgImageWidth => "og:image:width",
            Self::OgImageHeight => "og:image:height",
            Self::OgImageAlt => "og:image:alt",
        }
    }
}

/// Accumulates a [`PageSummary`] from head tags, one tag at a time.
///
/// Images live in their own list until [`SummaryBuilder::finish`]; `og:image:*`
/// properties target the image at `current_image`, which only an accepted
/// `og:image` sets.
pub(crate) struct SummaryBuilder {
    base: Url,
    summary: PageSummary,
    images: Vec<PreviewImage>,
    current_image: Option<usize>,
    anomalies: Vec<ParseAnomaly>,
}

impl SummaryBuilder {
    pub(crate) fn new(base: Url) -> Self {
        Self {
            base,
            summary: PageSummary::default(),
            images: Vec::new(),
            current_image: None,
            anomalies: Vec::new(),
        }
    }

    /// `<link href type sizes>`: the last link in the head becomes the icon.
    pub(crate) fn link(&mut self, attrs: &[Attribute]) {
        let Some(href) = attr(attrs, "href") else {
            self.record(ParseAnomaly::MissingAttribute {
                property: "link",
                attribute: "href",
            });
            return;
        };
        let url = match self.resolve("link", href) {
            Ok(url) => url,
            Err(anomaly) => return self.record(anomaly),
        };

        let mut icon = PreviewImage::new(url);
        icon.mime_type = attr(attrs, "type").and_then(non_empty);
        if let Some((width, height)) = attr(attrs, "sizes").and_then(parse_sizes) {
            icon.width = width;
            icon.height = height;
        }
        self.summary.icon = Some(icon);
    }

    /// `<meta>`: the key comes from `property` or `name`, the value from
    /// `content`, wherever they sit in the tag.
    pub(crate) fn meta(&mut self, attrs: &[Attribute]) {
        let content = attr(attrs, "content");
        let properties = attrs
            .iter()
            .filter(|a| matches!(&*a.name.local, "property" | "name"))
            .filter_map(|a| MetaProperty::parse(&a.value));

        for property in properties {
            let Some(content) = content else {
                self.record(ParseAnomaly::MissingAttribute {
                    property: property.as_str(),
                    attribute: "content",
                });
                continue;
            };
            if let Err(anomaly) = self.apply_meta(property, content) {
                self.record(anomaly);
            }
        }
    }

    /// Text of a `<title>` element. Never replaces a title that is already set.
    pub(crate) fn document_title(&mut self, text: &str) {
        if self.summary.title.is_none() {
            self.summary.title = non_empty(text);
        }
    }

    pub(crate) fn apply_meta(
        &mut self,
        property: MetaProperty,
        content: &str,
    ) -> Result<(), ParseAnomaly> {
        use MetaProperty::*;

        match property {
            Keywords => {
                let keywords = split_keywords(content);
                self.summary.keywords = (!keywords.is_empty()).then_some(keywords);
            }
            OgTitle => set(&mut self.summary.title, content),
            OgType => set(&mut self.summary.kind, content),
            OgUrl => set(&mut self.summary.url, content),
            OgSiteName => set(&mut self.summary.site_name, content),
            OgDescription => set(&mut self.summary.description, content),
            Description => {
                if self.summary.description.is_none() {
                    set(&mut self.summary.description, content);
                }
            }
            Author => set(&mut self.summary.author, content),
            OgImage => {
                let url = self.resolve(property.as_str(), content)?;
                self.images.push(PreviewImage::new(url));
                self.current_image = Some(self.images.len() - 1);
            }
            OgImageSecureUrl => {
                let index = self.cursor(property)?;
                let url = self.resolve(property.as_str(), content)?;
                self.images[index].secure_url = Some(url);
            }
            OgImageType => {
                let index = self.cursor(property)?;
                set(&mut self.images[index].mime_type, content);
            }
            OgImageWidth => {
                let index = self.cursor(property)?;
                if let Some(width) = parse_dimension(property, content)? {
                    self.images[index].width = Some(width);
                }
            }
            OgImageHeight => {
                let index = self.cursor(property)?;
                if let Some(height) = parse_dimension(property, content)? {
                    self.images[index].height = Some(height);
                }
            }
            OgImageAlt => {
                let index = self.cursor(property)?;
                set(&mut self.images[index].alt, content);
            }
        }
        Ok(())
    }

    /// Hands over the summary and anomalies, leaving the builder empty.
    pub(crate) fn finish(&mut self) -> (PageSummary, Vec<ParseAnomaly>) {
        let mut summary = std::mem::take(&mut self.summary);
        let images = std::mem::take(&mut self.images);
        self.current_image = None;
        // Stray og:image:* data never surfaces without an og:image.
        summary.images = (!images.is_empty()).then_some(images);
        (summary, std::mem::take(&mut self.anomalies))
    }

    fn cursor(&self, property: MetaProperty) -> Result<usize, ParseAnomaly> {
        self.current_image
            .ok_or(ParseAnomaly::MalformedMetadata {
                property: property.as_str(),
            })
    }

    fn resolve(&self, property: &'static str, value: &str) -> Result<String, ParseAnomaly> {
        self.base
            .join(value.trim())
            .map(String::from)
            .map_err(|source| ParseAnomaly::InvalidUrl {
                property,
                value: value.to_string(),
                source,
            })
    }

    fn record(&mut self, anomaly: ParseAnomaly) {
        tracing::debug!(%anomaly, "Skipping malformed head metadata");
        self.anomalies.push(anomaly);
    }
}

fn attr<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|a| &*a.name.local == name)
        .map(|a| &*a.value)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Blank values leave the field as it was.
fn set(field: &mut Option<String>, value: &str) {
    if let Some(value) = non_empty(value) {
        *field = Some(value);
    }
}

/// Zero parses but counts as no dimension.
fn parse_dimension(property: MetaProperty, value: &str) -> Result<Option<u32>, ParseAnomaly> {
    value
        .trim()
        .parse()
        .map(|n: u32| (n > 0).then_some(n))
        .map_err(|_| ParseAnomaly::InvalidDimension {
            property: property.as_str(),
            value: value.to_string(),
        })
}

/// Splits a comma-separated keyword list, trimming entries and dropping empty ones.
pub fn split_keywords(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(String::from)
        .collect()
}

/// Parses a `<link sizes>` value into `(width, height)`.
///
/// Only the first `WIDTHxHEIGHT` entry is read. Zero counts as unset. Returns
/// `None` for `any` and for values with no usable dimension.
pub fn parse_sizes(value: &str) -> Option<(Option<u32>, Option<u32>)> {
    let first = value.split_ascii_whitespace().next()?.to_ascii_lowercase();
    if first == "any" {
        return None;
    }
    let (width, height) = first.split_once('x')?;
    let dimension = |part: &str| part.parse::<u32>().ok().filter(|&n| n > 0);
    match (dimension(width), dimension(height)) {
        (None, None) => None,
        dimensions => Some(dimensions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> SummaryBuilder {
        SummaryBuilder::new(Url::parse("https://a.com/p/page.html").unwrap())
    }

    #[test]
    fn sizes_are_width_then_height() {
        assert_eq!(parse_sizes("32x16"), Some((Some(32), Some(16))));
    }

    #[test]
    fn sizes_accept_uppercase_separator_and_lists() {
        assert_eq!(parse_sizes("48X48 96x96"), Some((Some(48), Some(48))));
    }

    #[test]
    fn sizes_any_is_ignored() {
        assert_eq!(parse_sizes("any"), None);
        assert_eq!(parse_sizes("ANY"), None);
    }

    #[test]
    fn sizes_keep_the_numeric_half() {
        assert_eq!(parse_sizes("32xabc"), Some((Some(32), None)));
        assert_eq!(parse_sizes("axb"), None);
        assert_eq!(parse_sizes("32"), None);
        assert_eq!(parse_sizes(""), None);
    }

    #[test]
    fn sizes_treat_zero_as_unset() {
        assert_eq!(parse_sizes("0x0"), None);
        assert_eq!(parse_sizes("0x16"), Some((None, Some(16))));
    }

    #[test]
    fn zero_dimension_keeps_previous_value() {
        let mut b = builder();
        b.apply_meta(MetaProperty::OgImage, "/a.png").unwrap();
        b.apply_meta(MetaProperty::OgImageWidth, "640").unwrap();
        b.apply_meta(MetaProperty::OgImageWidth, "0").unwrap();
        b.apply_meta(MetaProperty::OgImageHeight, "0").unwrap();
        let (summary, anomalies) = b.finish();
        let image = &summary.images.unwrap()[0];
        assert!(anomalies.is_empty());
        assert_eq!(image.width, Some(640));
        assert_eq!(image.height, None);
    }

    #[test]
    fn keywords_are_trimmed_and_blank_entries_dropped() {
        assert_eq!(split_keywords("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(split_keywords(" , ,"), Vec::<String>::new());
    }

    #[test]
    fn meta_property_keys_are_case_insensitive() {
        assert_eq!(MetaProperty::parse(" OG:Title "), Some(MetaProperty::OgTitle));
        assert_eq!(MetaProperty::parse("twitter:title"), None);
    }

    #[test]
    fn image_property_without_image_is_malformed() {
        let mut b = builder();
        let err = b
            .apply_meta(MetaProperty::OgImageWidth, "100")
            .unwrap_err();
        assert_eq!(
            err,
            ParseAnomaly::MalformedMetadata {
                property: "og:image:width"
            }
        );
        let (summary, _) = b.finish();
        assert!(summary.images.is_none());
    }

    #[test]
    fn image_properties_follow_the_cursor() {
        let mut b = builder();
        b.apply_meta(MetaProperty::OgImage, "/a.png").unwrap();
        b.apply_meta(MetaProperty::OgImageWidth, "100").unwrap();
        b.apply_meta(MetaProperty::OgImage, "b.png").unwrap();
        b.apply_meta(MetaProperty::OgImageAlt, "second").unwrap();
        let (summary, anomalies) = b.finish();
        let images = summary.images.unwrap();

        assert!(anomalies.is_empty());
        assert_eq!(images[0].url, "https://a.com/a.png");
        assert_eq!(images[0].width, Some(100));
        assert_eq!(images[0].alt, None);
        assert_eq!(images[1].url, "https://a.com/p/b.png");
        assert_eq!(images[1].width, None);
        assert_eq!(images[1].alt.as_deref(), Some("second"));
    }

    #[test]
    fn non_numeric_dimension_keeps_previous_value() {
        let mut b = builder();
        b.apply_meta(MetaProperty::OgImage, "/a.png").unwrap();
        b.apply_meta(MetaProperty::OgImageHeight, "200").unwrap();
        let err = b
            .apply_meta(MetaProperty::OgImageHeight, "tall")
            .unwrap_err();
        assert!(matches!(err, ParseAnomaly::InvalidDimension { .. }));
        let (summary, _) = b.finish();
        assert_eq!(summary.images.unwrap()[0].height, Some(200));
    }

    #[test]
    fn plain_description_never_replaces_og_description() {
        let mut b = builder();
        b.apply_meta(MetaProperty::OgDescription, "og").unwrap();
        b.apply_meta(MetaProperty::Description, "plain").unwrap();
        let (summary, _) = b.finish();
        assert_eq!(summary.description.as_deref(), Some("og"));
    }

    #[test]
    fn document_title_only_fills_an_empty_title() {
        let mut b = builder();
        b.document_title("  First  ");
        b.document_title("Second");
        let (summary, _) = b.finish();
        assert_eq!(summary.title.as_deref(), Some("First"));
    }
}
