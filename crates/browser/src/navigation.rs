//! Link resolution
//!
//! Resolves an `href` against the current page address.
//!
//! - empty or `#fragment`-only target: the current address
//! - any trailing `#fragment` is dropped
//! - `scheme:...` is used verbatim
//! - `//host/...` is scheme-relative and gets `https:`
//! - anything else is joined onto the current address by `url`, which
//!   handles host-absolute paths, queries and dot segments

use url::Url;

/// Resolve `target` relative to the page at `current`
///
/// A `current` that is not an absolute URL cannot anchor a relative link;
/// the target is then returned as written.
pub fn make_path(current: &str, target: &str) -> String {
    if target.is_empty() || target.starts_with('#') {
        return current.to_string();
    }

    let target = strip_fragment(target);
    if has_scheme(target) {
        return target.to_string();
    }
    if target.starts_with("//") {
        return format!("https:{}", target);
    }

    match Url::parse(current).and_then(|base| base.join(target)) {
        Ok(mut resolved) => {
            resolved.set_fragment(None);
            resolved.into()
        }
        Err(e) => {
            tracing::debug!("cannot resolve '{}' against '{}': {}", target, current, e);
            target.to_string()
        }
    }
}

fn strip_fragment(target: &str) -> &str {
    target.split_once('#').map_or(target, |(before, _)| before)
}

/// `scheme:` where scheme is a letter followed by letters, digits, `+`, `-` or `.`
fn has_scheme(target: &str) -> bool {
    let Some((scheme, _)) = target.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
