use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{Tag, TagKind, Token, TokenSink, TokenSinkResult};

use super::rules::SummaryBuilder;
use super::ParseAnomaly;
use crate::models::PageSummary;

/// Token sink that feeds head tags to a [`SummaryBuilder`] and goes quiet once
/// the head is over.
pub(crate) struct HeadSink {
    builder: SummaryBuilder,
    /// Text collected since the last `<title>` start tag.
    title: Option<String>,
    finished: bool,
}

impl HeadSink {
    pub(crate) fn new(builder: SummaryBuilder) -> Self {
        Self {
            builder,
            title: None,
            finished: false,
        }
    }

    /// True once `</head>` (or an implied end of head) has been seen.
    pub(crate) fn finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn finish(&mut self) -> (PageSummary, Vec<ParseAnomaly>) {
        self.close_title();
        self.builder.finish()
    }

    fn process_tag(&mut self, tag: Tag) -> TokenSinkResult<()> {
        match (tag.kind, &*tag.name) {
            (TagKind::EndTag, "head") | (TagKind::StartTag, "body") => {
                self.close_title();
                self.finished = true;
            }
            (TagKind::StartTag, "link") => self.builder.link(&tag.attrs),
            (TagKind::StartTag, "meta") => self.builder.meta(&tag.attrs),
            (TagKind::StartTag, "title") if !tag.self_closing => {
                self.title = Some(String::new());
                return TokenSinkResult::RawData(RawKind::Rcdata);
            }
            (TagKind::EndTag, "title") => self.close_title(),
            (TagKind::StartTag, "script") if !tag.self_closing => {
                return TokenSinkResult::RawData(RawKind::ScriptData);
            }
            (TagKind::StartTag, "style") if !tag.self_closing => {
                return TokenSinkResult::RawData(RawKind::Rawtext);
            }
            _ => {}
        }
        TokenSinkResult::Continue
    }

    fn close_title(&mut self) {
        if let Some(text) = self.title.take() {
            self.builder.document_title(&text);
        }
    }
}

impl TokenSink for HeadSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        if self.finished {
            return TokenSinkResult::Continue;
        }
        match token {
            Token::TagToken(tag) => return self.process_tag(tag),
            Token::CharacterTokens(text) => {
                if let Some(title) = self.title.as_mut() {
                    title.push_str(&text);
                }
            }
            Token::EOFToken => self.close_title(),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}
