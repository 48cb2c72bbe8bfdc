//! Plain-text extraction for fetched sources.
//!
//! - HTML pages: boilerplate elements (`script`, `style`, `nav`, `footer`,
//!   `header`, `aside`) are dropped with `lol_html`, the remaining text
//!   nodes are concatenated and whitespace is collapsed.
//! - Video transcripts: YouTube `timedtext` XML, one `<text>` element per
//!   caption line, parsed with `quick_xml`.
//!
//! Extraction never panics; malformed input is an [`ExtractError`] and the
//! ingestion pipeline skips that source.

use html_escape::decode_html_entities;
use lol_html::html_content::ContentType;
use lol_html::{doc_text, element, rewrite_str, RewriteStrSettings};
use quick_xml::events::Event;
use thiserror::Error;

/// Elements whose content never counts as readable text.
const BOILERPLATE: &str = "script, style, nav, footer, header, aside, noscript, template";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("HTML extraction failed: {0}")]
    Html(String),
    #[error("transcript extraction failed: {0}")]
    Transcript(String),
}

/// Collapse runs of whitespace to a single space and trim.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Readable text of an HTML document.
pub fn html_to_text(html: &str) -> Result<String, ExtractError> {
    let stripped = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(BOILERPLATE, |el| {
                    el.remove();
                    Ok(())
                }),
                // Keep adjacent block text from running together.
                element!("*", |el| {
                    el.after(" ", ContentType::Text);
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| ExtractError::Html(e.to_string()))?;

    let mut raw = String::with_capacity(stripped.len());
    rewrite_str(
        &stripped,
        RewriteStrSettings {
            document_content_handlers: vec![doc_text!(|t| {
                raw.push_str(t.as_str());
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| ExtractError::Html(e.to_string()))?;

    Ok(clean_text(&decode_entities(&raw)))
}

/// Caption text of a YouTube `timedtext` transcript.
pub fn transcript_to_text(xml: &str) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut lines: Vec<String> = Vec::new();
    let mut in_caption = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"text" => in_caption = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"text" => in_caption = false,
            Ok(Event::Text(t)) if in_caption => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractError::Transcript(e.to_string()))?;
                // Captions are commonly double-escaped (`&amp;#39;`).
                lines.push(decode_entities(&text));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::Transcript(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }
    Ok(clean_text(&lines.join(" ")))
}

/// Decode named and numeric HTML entities; unknown ones are left as-is.
pub fn decode_entities(s: &str) -> String {
    decode_html_entities(s).into_owned()
}
