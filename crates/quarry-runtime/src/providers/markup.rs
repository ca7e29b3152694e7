//! Just enough HTML/XML handling to pull text out of pages and feeds.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TITLE: Regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap();
    static ref CDATA: Regex = Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap();
    static ref SCRIPT_OR_STYLE: Regex =
        Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<!--.*?-->").unwrap();
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]+>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref NUMERIC_ENTITY: Regex = Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").unwrap();
}

/// Decode the handful of entities feeds actually use.
pub fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    numeric
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn clean(fragment: &str) -> String {
    let unwrapped = CDATA.replace_all(fragment, "$1");
    let untagged = TAG.replace_all(&unwrapped, " ");
    let decoded = decode_entities(&untagged);
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Every `<title>` in document order, cleaned. Empty titles are dropped.
pub fn titles(document: &str) -> Vec<String> {
    TITLE
        .captures_iter(document)
        .map(|c| clean(&c[1]))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Visible text of an HTML page, whitespace collapsed.
pub fn visible_text(html: &str) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(html, " ");
    let body = match without_code.find("</head>") {
        Some(end) => &without_code[end..],
        None => &without_code[..],
    };
    clean(body)
}
