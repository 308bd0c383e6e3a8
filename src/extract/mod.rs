//! Single-pass page summary extraction.
//!
//! The body is decoded and tokenized incrementally. Tags are interpreted in
//! document order and the pass stops for good at the end of `<head>`, so the
//! rest of a large document is never read.

mod rules;
mod sink;

use std::io::{self, Read};

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::{BufferQueue, Tokenizer, TokenizerOpts, TokenizerResult};
use thiserror::Error;
use url::Url;

use crate::models::PageSummary;

pub use rules::{parse_sizes, split_keywords};

use rules::SummaryBuilder;
use sink::HeadSink;

const CHUNK_SIZE: usize = 8 * 1024;

/// Failures that end an extraction.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("invalid page URL {url:?}: {source}")]
    InvalidPageUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to read page body: {0}")]
    Read(#[from] io::Error),
}

/// Malformed head metadata. The offending tag or attribute is skipped and the
/// pass carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseAnomaly {
    #[error("{property} appeared before any og:image")]
    MalformedMetadata { property: &'static str },

    #[error("{property} has an unresolvable URL {value:?}: {source}")]
    InvalidUrl {
        property: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{property} is missing its {attribute} attribute")]
    MissingAttribute {
        property: &'static str,
        attribute: &'static str,
    },

    #[error("{property} has a non-numeric value {value:?}")]
    InvalidDimension {
        property: &'static str,
        value: String,
    },
}

/// Result of one pass: the summary plus every anomaly that was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub summary: PageSummary,
    pub anomalies: Vec<ParseAnomaly>,
}

/// Extracts a summary from `stream`, resolving references against `page_url`.
///
/// Returns `Ok(None)` when there is no stream. The stream is consumed and
/// dropped before this returns, whatever the outcome.
pub fn extract_summary<R: Read>(
    page_url: &str,
    stream: Option<R>,
) -> Result<Option<PageSummary>, ExtractError> {
    let Some(stream) = stream else {
        return Ok(None);
    };
    let extraction = SummaryExtractor::new(page_url)?.extract(stream)?;
    Ok(Some(extraction.summary))
}

/// Configured extractor for one page URL.
#[derive(Debug, Clone)]
pub struct SummaryExtractor {
    base: Url,
    encoding: &'static Encoding,
}

impl SummaryExtractor {
    pub fn new(page_url: &str) -> Result<Self, ExtractError> {
        let base = Url::parse(page_url).map_err(|source| ExtractError::InvalidPageUrl {
            url: page_url.to_string(),
            source,
        })?;
        Ok(Self {
            base,
            encoding: UTF_8,
        })
    }

    /// Decodes the body with `encoding` instead of UTF-8. A byte order mark
    /// still takes precedence.
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn extract<R: Read>(&self, mut stream: R) -> Result<Extraction, ExtractError> {
        let sink = HeadSink::new(SummaryBuilder::new(self.base.clone()));
        let mut tokenizer = Tokenizer::new(sink, TokenizerOpts::default());
        let mut decoder = self.encoding.new_decoder();
        let mut queue = BufferQueue::new();
        let mut chunk = vec![0u8; CHUNK_SIZE];

        while !tokenizer.sink.finished() {
            let read = match stream.read(&mut chunk) {
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ExtractError::Read(e)),
            };
            let last = read == 0;

            let text = decode_chunk(&mut decoder, &chunk[..read], last);
            if !text.is_empty() {
                queue.push_back(StrTendril::from(text));
                // The sink never hands back a script to run.
                let result = tokenizer.feed(&mut queue);
                debug_assert!(matches!(result, TokenizerResult::Done));
            }
            if last {
                tokenizer.end();
                break;
            }
        }
        drop(stream);

        let (summary, anomalies) = tokenizer.sink.finish();
        Ok(Extraction { summary, anomalies })
    }
}

fn decode_chunk(decoder: &mut Decoder, bytes: &[u8], last: bool) -> String {
    let capacity = decoder
        .max_utf8_buffer_length(bytes.len())
        .unwrap_or(bytes.len() * 3 + 16);
    let mut text = String::with_capacity(capacity);
    let (result, _, _) = decoder.decode_to_string(bytes, &mut text, last);
    debug_assert_eq!(result, CoderResult::InputEmpty);
    text
}
