//! Line-level parsing of blocklist sources: hosts-file form and AdBlock Plus
//! form, per SPEC_FULL.md §4.1's parsing rule.

use crate::dns::normalize;

/// Parse one line of a blocklist source into a normalized FQDN, or `None` if
/// the line is blank, a comment, or otherwise doesn't yield a domain.
pub fn parse_line(raw: &str) -> Option<String> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
        return None;
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    let candidate = if tokens.len() >= 2 && !tokens[1].starts_with('!') && !tokens[1].starts_with('#') {
        tokens[1]
    } else {
        tokens[0]
    };

    let stripped = candidate.strip_prefix("||").unwrap_or(candidate);
    let stripped = stripped.strip_suffix('^').unwrap_or(stripped);

    if stripped.is_empty() {
        return None;
    }

    Some(normalize(stripped))
}

/// Parse a whole source's contents into the set of domains it contributes.
pub fn parse_contents(contents: &str) -> Vec<String> {
    contents.lines().filter_map(parse_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_blank_and_comment_lines() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("# a comment"), None);
        assert_eq!(parse_line("! also a comment"), None);
    }

    #[test]
    fn parses_hosts_file_form() {
        assert_eq!(parse_line("0.0.0.0 ads.example.com"), Some("ads.example.com.".to_string()));
        assert_eq!(parse_line("127.0.0.1 ads.example.com"), Some("ads.example.com.".to_string()));
    }

    #[test]
    fn parses_bare_domain_form() {
        assert_eq!(parse_line("ads.example.com"), Some("ads.example.com.".to_string()));
    }

    #[test]
    fn strips_adblock_plus_syntax() {
        assert_eq!(parse_line("||ads.example.com^"), Some("ads.example.com.".to_string()));
    }

    #[test]
    fn normalizes_case_and_trailing_dot() {
        assert_eq!(parse_line("ADS.Example.COM"), Some("ads.example.com.".to_string()));
    }

    #[test]
    fn parse_contents_skips_unparseable_lines() {
        let contents = "# header\n\n0.0.0.0 a.test\nads.b.test\n! comment\n";
        assert_eq!(parse_contents(contents), vec!["a.test.".to_string(), "ads.b.test.".to_string()]);
    }
}
