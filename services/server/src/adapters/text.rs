//! Text normalization helpers shared across adapters (spec §4.5).

/// Collapses runs of whitespace to a single space and trims the ends.
pub fn normalize_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Decodes a handful of named/numeric HTML entities. Adapters that scrape
/// markup only need this small, known set — not a general-purpose decoder.
pub fn decode_html_entities(input: &str) -> String {
    input
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Trims a stray trailing `=` cell artifact seen in some CSV exports
/// (spec §9 open question).
pub fn trim_trailing_equals(cell: &str) -> &str {
    cell.trim().trim_end_matches('=').trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_whitespace_collapses_and_trims() {
        assert_eq!(normalize_whitespace("  a   b\n\tc  "), "a b c");
    }

    #[test]
    fn decode_html_entities_handles_known_set() {
        assert_eq!(decode_html_entities("a&nbsp;&amp;&lt;b&gt;"), "a &<b>");
    }

    #[test]
    fn trim_trailing_equals_removes_artifact() {
        assert_eq!(trim_trailing_equals("12.3="), "12.3");
        assert_eq!(trim_trailing_equals("12.3"), "12.3");
    }
}
