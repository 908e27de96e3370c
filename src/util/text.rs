//! String helpers shared by the URL canonicalizer and the XML layer.

use std::borrow::Cow;

/// HTML-escapes the four characters that are significant in markup.
///
/// `&` → `&amp;`, `<` → `&lt;`, `>` → `&gt;`, `"` → `&quot;`. Apostrophes are
/// left as-is. Returns the input unchanged (borrowed) when nothing needs
/// escaping.
///
/// # Examples
///
/// ```
/// use sitefeed::util::html_escape;
///
/// assert_eq!(html_escape("/a?b=1&c=2"), "/a?b=1&amp;c=2");
/// assert_eq!(html_escape("plain"), "plain");
/// ```
pub fn html_escape(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"']) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Joins a base URL and a path remainder with exactly one `/` between them.
///
/// ```
/// use sitefeed::util::join_url;
///
/// assert_eq!(join_url("http://x/site/news/", "/a/b"), "http://x/site/news/a/b");
/// assert_eq!(join_url("http://x/site/news", "b"), "http://x/site/news/b");
/// ```
pub fn join_url(base: &str, remainder: &str) -> String {
    let base = base.trim_end_matches('/');
    let remainder = remainder.trim_start_matches('/');
    format!("{base}/{remainder}")
}

/// Parses a boolean setting written the way content editors and config
/// files spell it: `1` or `true` (any case) are set, everything else is not.
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_all_entities() {
        assert_eq!(
            html_escape(r#"<a href="x">&</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_escape_leaves_apostrophe() {
        assert_eq!(html_escape("o'brien"), "o'brien");
    }

    #[test]
    fn test_escape_borrows_when_clean() {
        assert!(matches!(html_escape("http://x/a"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_escape_non_ascii() {
        assert_eq!(html_escape("/caf\u{e9}&m"), "/caf\u{e9}&amp;m");
    }

    #[test]
    fn test_join_url_single_slash() {
        assert_eq!(join_url("http://x/", "/a"), "http://x/a");
        assert_eq!(join_url("http://x", "a"), "http://x/a");
        assert_eq!(join_url("http://x//", "//a"), "http://x/a");
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy(" true "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("yes"));
    }
}
