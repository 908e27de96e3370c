//! Sitemap XML documents.
//!
//! Output is compact (no indentation) with a UTF-8 declaration:
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?><urlset xmlns="..."><url><loc>..</loc><lastmod>..</lastmod></url></urlset>
//! ```
//!
//! Child order inside `<url>` is fixed: `loc`, `lastmod`, then `changefreq`
//! and `priority` only when present. Locations arrive HTML-escaped from the
//! canonicalizer and are written as-is.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use thiserror::Error;

use crate::feed::assembler::{ChangeFrequency, FeedEntry, Priority};
use crate::util::html_escape;

/// Largest document the sitemap protocol accepts (50 MiB).
pub const MAX_DOCUMENT_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("XML error: {0}")]
    Xml(String),

    #[error("Document is {size} bytes (max {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("Malformed sitemap document: {0}")]
    Malformed(String),

    #[error("Document is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Reference to one site's document in a sitemap index.
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapRef {
    /// Unescaped absolute URL of the site's document.
    pub location: String,
    pub last_modified: Option<String>,
}

/// Thin wrapper mapping writer failures into [`SerializeError`].
struct DocumentWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl DocumentWriter {
    fn new() -> Self {
        Self {
            writer: Writer::new(Cursor::new(Vec::new())),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), SerializeError> {
        self.writer
            .write_event(event)
            .map_err(|e| SerializeError::Xml(e.to_string()))
    }

    fn open_document(&mut self, root: &str, xmlns: &str) -> Result<(), SerializeError> {
        self.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut start = BytesStart::new(root);
        start.push_attribute(("xmlns", xmlns));
        self.event(Event::Start(start))
    }

    fn start(&mut self, name: &str) -> Result<(), SerializeError> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), SerializeError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), SerializeError> {
        self.start(name)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// Writes `escaped` verbatim; it must already be valid XML text.
    fn escaped_element(&mut self, name: &str, escaped: &str) -> Result<(), SerializeError> {
        self.start(name)?;
        self.event(Event::Text(BytesText::from_escaped(escaped)))?;
        self.end(name)
    }

    fn finish(self) -> Result<String, SerializeError> {
        let bytes = self.writer.into_inner().into_inner();
        if bytes.len() > MAX_DOCUMENT_BYTES {
            return Err(SerializeError::TooLarge {
                size: bytes.len(),
                max: MAX_DOCUMENT_BYTES,
            });
        }
        Ok(String::from_utf8(bytes)?)
    }
}

/// Renders a `<urlset>` document.
pub fn render_urlset(xmlns: &str, entries: &[FeedEntry]) -> Result<String, SerializeError> {
    let mut doc = DocumentWriter::new();
    doc.open_document("urlset", xmlns)?;

    for entry in entries {
        doc.start("url")?;
        doc.escaped_element("loc", &entry.location)?;
        doc.text_element("lastmod", &entry.last_modified)?;
        if let Some(freq) = entry.change_frequency {
            doc.text_element("changefreq", freq.as_str())?;
        }
        if let Some(priority) = &entry.priority {
            doc.text_element("priority", priority.as_str())?;
        }
        doc.end("url")?;
    }

    doc.end("urlset")?;
    doc.finish()
}

/// Renders a `<sitemapindex>` document referencing per-site documents.
pub fn render_index(xmlns: &str, sitemaps: &[SitemapRef]) -> Result<String, SerializeError> {
    let mut doc = DocumentWriter::new();
    doc.open_document("sitemapindex", xmlns)?;

    for sitemap in sitemaps {
        doc.start("sitemap")?;
        doc.escaped_element("loc", &html_escape(&sitemap.location))?;
        if let Some(last_modified) = &sitemap.last_modified {
            doc.text_element("lastmod", last_modified)?;
        }
        doc.end("sitemap")?;
    }

    doc.end("sitemapindex")?;
    doc.finish()
}

/// The well-formed document served when nothing better is available.
pub fn empty_document(xmlns: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="{}"></urlset>"#,
        html_escape(xmlns)
    )
}

/// A `<urlset>` document read back into entries.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub xmlns: String,
    pub entries: Vec<FeedEntry>,
}

#[derive(Default)]
struct EntryBuilder {
    location: Option<String>,
    last_modified: Option<String>,
    change_frequency: Option<ChangeFrequency>,
    priority: Option<Priority>,
}

impl EntryBuilder {
    fn set(&mut self, element: &[u8], text: &str) -> Result<(), SerializeError> {
        match element {
            // Stored escaped, as the canonicalizer produces it
            b"loc" => self.location = Some(html_escape(text).into_owned()),
            b"lastmod" => self.last_modified = Some(text.to_string()),
            b"changefreq" => {
                self.change_frequency = Some(text.parse().map_err(SerializeError::Malformed)?)
            }
            b"priority" => self.priority = Some(text.parse().map_err(SerializeError::Malformed)?),
            _ => {}
        }
        Ok(())
    }

    fn build(self) -> Result<FeedEntry, SerializeError> {
        Ok(FeedEntry {
            location: self
                .location
                .ok_or_else(|| SerializeError::Malformed("<url> without <loc>".to_string()))?,
            last_modified: self
                .last_modified
                .ok_or_else(|| SerializeError::Malformed("<url> without <lastmod>".to_string()))?,
            change_frequency: self.change_frequency,
            priority: self.priority,
        })
    }
}

/// Parses a `<urlset>` document produced by [`render_urlset`].
///
/// Re-rendering the result yields the original bytes.
pub fn parse_urlset(document: &str) -> Result<ParsedFeed, SerializeError> {
    // Element text is taken verbatim; the writer emits no whitespace between
    // elements, and whitespace inside `<loc>` belongs to the URL.
    let mut reader = Reader::from_str(document);

    let mut xmlns = None;
    let mut entries = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    let mut element: Vec<u8> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"urlset" => {
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| SerializeError::Xml(e.to_string()))?;
                        if attr.key.as_ref() == b"xmlns" {
                            let value = attr
                                .unescape_value()
                                .map_err(|e| SerializeError::Xml(e.to_string()))?;
                            xmlns = Some(value.into_owned());
                        }
                    }
                }
                b"url" => current = Some(EntryBuilder::default()),
                name => element = name.to_vec(),
            },
            Ok(Event::Text(t)) => {
                if let Some(builder) = current.as_mut() {
                    let text = t.unescape().map_err(|e| SerializeError::Xml(e.to_string()))?;
                    builder.set(&element, &text)?;
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"url" {
                    if let Some(builder) = current.take() {
                        entries.push(builder.build()?);
                    }
                }
                element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SerializeError::Xml(e.to_string())),
            _ => {}
        }
    }

    let xmlns = xmlns.ok_or_else(|| SerializeError::Malformed("missing <urlset>".to_string()))?;
    Ok(ParsedFeed { xmlns, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_XMLNS;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    fn entry(loc: &str) -> FeedEntry {
        FeedEntry::new(
            loc,
            DateTime::parse_from_rfc3339("2024-05-01T12:30:00+02:00").unwrap(),
        )
    }

    #[test]
    fn test_render_urlset_field_order_and_omission() {
        let entries = vec![
            entry("http://x/a?b=1&amp;c=2")
                .with_change_frequency(ChangeFrequency::Weekly)
                .with_priority("0.8".parse().unwrap()),
            entry("http://x/b"),
        ];
        let doc = render_urlset(DEFAULT_XMLNS, &entries).unwrap();
        assert_eq!(
            doc,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
                "<url><loc>http://x/a?b=1&amp;c=2</loc><lastmod>2024-05-01T12:30:00+02:00</lastmod>",
                "<changefreq>weekly</changefreq><priority>0.8</priority></url>",
                "<url><loc>http://x/b</loc><lastmod>2024-05-01T12:30:00+02:00</lastmod></url>",
                "</urlset>"
            )
        );
    }

    #[test]
    fn test_empty_urlset_matches_fallback_document() {
        assert_eq!(
            render_urlset(DEFAULT_XMLNS, &[]).unwrap(),
            empty_document(DEFAULT_XMLNS)
        );
    }

    #[test]
    fn test_render_index() {
        let doc = render_index(
            DEFAULT_XMLNS,
            &[
                SitemapRef {
                    location: "http://x/sitemap.xml".to_string(),
                    last_modified: Some("2024-05-01T12:30:00+00:00".to_string()),
                },
                SitemapRef {
                    location: "http://y/map.xml?a=1&b=2".to_string(),
                    last_modified: None,
                },
            ],
        )
        .unwrap();
        assert_eq!(
            doc,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
                "<sitemap><loc>http://x/sitemap.xml</loc><lastmod>2024-05-01T12:30:00+00:00</lastmod></sitemap>",
                "<sitemap><loc>http://y/map.xml?a=1&amp;b=2</loc></sitemap>",
                "</sitemapindex>"
            )
        );
    }

    #[test]
    fn test_parse_then_render_is_byte_identical() {
        let entries = vec![
            entry("http://x/a&amp;b &lt;c&gt; &quot;d&quot;").with_priority("1.0".parse().unwrap()),
            entry("http://x/e").with_change_frequency(ChangeFrequency::Never),
        ];
        let doc = render_urlset("urn:custom", &entries).unwrap();
        let parsed = parse_urlset(&doc).unwrap();
        assert_eq!(parsed.xmlns, "urn:custom");
        assert_eq!(parsed.entries, entries);
        assert_eq!(render_urlset(&parsed.xmlns, &parsed.entries).unwrap(), doc);
    }

    #[test]
    fn test_round_trip_keeps_whitespace_in_location() {
        let entries = vec![entry("http://x/a "), entry(" http://x/b")];
        let doc = render_urlset(DEFAULT_XMLNS, &entries).unwrap();
        assert!(doc.contains("<loc>http://x/a </loc>"));

        let parsed = parse_urlset(&doc).unwrap();
        assert_eq!(parsed.entries, entries);
        assert_eq!(render_urlset(&parsed.xmlns, &parsed.entries).unwrap(), doc);
    }

    #[test]
    fn test_parse_ignores_whitespace_between_elements() {
        let doc = concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "\n<urlset xmlns=\"u\">\n  <url>\n    <loc>http://x/a</loc>\n",
            "    <lastmod>2024-05-01T12:30:00+02:00</lastmod>\n  </url>\n</urlset>\n"
        );
        let parsed = parse_urlset(doc).unwrap();
        assert_eq!(parsed.entries, vec![entry("http://x/a")]);
    }

    #[test]
    fn test_parse_rejects_entry_without_loc() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="u"><url><lastmod>x</lastmod></url></urlset>"#;
        assert!(matches!(
            parse_urlset(doc),
            Err(SerializeError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_entities() {
        let doc = r#"<urlset xmlns="u"><url><loc>&xxe;</loc><lastmod>x</lastmod></url></urlset>"#;
        assert!(matches!(parse_urlset(doc), Err(SerializeError::Xml(_))));
    }
}
