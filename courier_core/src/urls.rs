/// `scheme://...` where scheme is `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`.
pub fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Method URL joined onto the base URL. An absolute method URL replaces
/// the base entirely; exactly one `/` separates the two parts.
pub fn join_url(base: &str, url: &str) -> String {
    let base = base.trim();
    let url = url.trim();
    if base.is_empty() || has_scheme(url) {
        return url.to_string();
    }
    if url.is_empty() {
        return base.to_string();
    }
    if url.starts_with('?') {
        return format!("{base}{url}");
    }
    match (base.ends_with('/'), url.starts_with('/')) {
        (true, true) => format!("{base}{}", &url[1..]),
        (false, false) => format!("{base}/{url}"),
        _ => format!("{base}{url}"),
    }
}

/// Scheme-less URLs are taken as plain http.
pub fn with_default_scheme(url: String) -> String {
    if url.is_empty() || has_scheme(&url) {
        url
    } else {
        format!("http://{url}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn joins_with_single_slash() {
        assert_eq!(join_url("http://h:8080", "/a"), "http://h:8080/a");
        assert_eq!(join_url("http://h:8080/", "/a"), "http://h:8080/a");
        assert_eq!(join_url("http://h:8080/api", "a/b"), "http://h:8080/api/a/b");
        assert_eq!(join_url("http://h/api/", "a"), "http://h/api/a");
        assert_eq!(join_url("http://h/x", "?q=1"), "http://h/x?q=1");
    }

    #[test]
    fn absolute_method_url_replaces_base() {
        assert_eq!(join_url("http://base", "https://other/x"), "https://other/x");
        assert_eq!(join_url("", "/only"), "/only");
        assert_eq!(join_url("http://base", "  "), "http://base");
    }

    #[test]
    fn scheme_detection() {
        assert!(has_scheme("https://a"));
        assert!(has_scheme("svn+ssh://a"));
        assert!(!has_scheme("/a?next=http://b"));
        assert!(!has_scheme("localhost:8080/a"));
        assert_eq!(with_default_scheme("localhost/a".into()), "http://localhost/a");
        assert_eq!(with_default_scheme("https://a".into()), "https://a");
    }
}
