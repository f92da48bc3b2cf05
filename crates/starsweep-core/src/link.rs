//! `Link` header parsing (RFC 8288).
//!
//! GitHub paginates search results with headers like:
//!
//! ```text
//! <https://api.github.com/search/repositories?q=stars%3A10..20&page=2>; rel="next",
//! <https://api.github.com/search/repositories?q=stars%3A10..20&page=10>; rel="last"
//! ```

/// One `<url>; rel="..."` entry of a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRelation {
    pub relation: String,
    pub url: String,
}

/// Parses a `Link` header value into its relations.
///
/// Entries are separated by commas outside angle brackets and quoted values, so
/// URLs and titles containing commas survive. A `rel` holding several
/// space-separated types yields one relation per type. Entries without a URL
/// or `rel` are skipped.
///
/// # Examples
///
/// ```
/// use starsweep_core::link::{next_link, parse_link_header};
///
/// let links = parse_link_header(
///     r#"<https://api.github.com/x?page=2>; rel="next", <https://api.github.com/x?page=5>; rel="last""#,
/// );
/// assert_eq!(links.len(), 2);
/// assert_eq!(next_link(&links), Some("https://api.github.com/x?page=2"));
/// ```
pub fn parse_link_header(header: &str) -> Vec<LinkRelation> {
    let mut relations = Vec::new();
    let mut rest = header;

    while let Some(open) = rest.find('<') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('>') else {
            break;
        };
        let url = after_open[..close].trim();
        let after_url = &after_open[close + 1..];

        // Parameters run until the next comma outside a quoted value.
        let params_end = find_unquoted(after_url, ',').unwrap_or(after_url.len());
        let params = &after_url[..params_end];
        rest = &after_url[params_end..];

        if url.is_empty() {
            continue;
        }

        if let Some(rel) = rel_param(params) {
            for relation in rel.split_whitespace() {
                relations.push(LinkRelation {
                    relation: relation.to_ascii_lowercase(),
                    url: url.to_string(),
                });
            }
        }
    }

    relations
}

/// Extracts the value of the `rel` parameter from `; rel="next"; title="x"`.
fn rel_param(params: &str) -> Option<&str> {
    split_unquoted(params, ';')
        .into_iter()
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("rel"))
        .map(|(_, value)| value.trim().trim_matches('"').trim())
        .filter(|value| !value.is_empty())
}

/// Byte offset of the first `target` outside a quoted string.
fn find_unquoted(s: &str, target: char) -> Option<usize> {
    let mut quoted = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            c if c == target && !quoted => return Some(i),
            _ => {}
        }
    }

    None
}

fn split_unquoted(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(at) = find_unquoted(rest, separator) {
        parts.push(&rest[..at]);
        rest = &rest[at + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}

/// Returns the URL of the `next` relation, if any.
pub fn next_link(relations: &[LinkRelation]) -> Option<&str> {
    relations
        .iter()
        .find(|link| link.relation == "next")
        .map(|link| link.url.as_str())
}
