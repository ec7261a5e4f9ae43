//! Syntactic IRI validation
//!
//! The engine validates IRIs syntactically only: a valid absolute IRI has a
//! scheme and contains no characters that are illegal in any RFC 3987
//! production. Semantic checks (resolvability, registered schemes) are out
//! of scope.

/// Check whether a string is a syntactically valid absolute IRI.
///
/// Requirements:
/// - a scheme: one ASCII letter followed by letters/digits/`+`/`-`/`.`,
///   terminated by `:`
/// - a non-empty remainder
/// - no whitespace, control characters, or `<>"{}|^` `` ` `` anywhere
pub fn is_valid_iri(s: &str) -> bool {
    let Some(colon) = s.find(':') else {
        return false;
    };

    let scheme = &s[..colon];
    let rest = &s[colon + 1..];

    if scheme.is_empty() || rest.is_empty() {
        return false;
    }

    let mut chars = scheme.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    if !scheme[1..]
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    {
        return false;
    }

    s.chars().all(is_iri_char)
}

fn is_iri_char(c: char) -> bool {
    !c.is_whitespace()
        && !c.is_control()
        && !matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_iris() {
        assert!(is_valid_iri("http://example.org/foo"));
        assert!(is_valid_iri("https://example.org/a?b=c#d"));
        assert!(is_valid_iri("urn:uuid:6ba7b810-9dad-11d1-80b4-00c04fd430c8"));
        assert!(is_valid_iri("did:key:z6Mk"));
        assert!(is_valid_iri("http://example.org/caf%C3%A9"));
        // Unicode is fine in IRIs
        assert!(is_valid_iri("http://example.org/café"));
    }

    #[test]
    fn test_invalid_iris() {
        assert!(!is_valid_iri(""));
        assert!(!is_valid_iri("no-scheme"));
        assert!(!is_valid_iri(":empty-scheme"));
        assert!(!is_valid_iri("http:"));
        assert!(!is_valid_iri("http://example.org/with space"));
        assert!(!is_valid_iri("http://example.org/<angle>"));
        assert!(!is_valid_iri("1http://starts-with-digit"));
        assert!(!is_valid_iri("http://example.org/line\nbreak"));
    }
}
