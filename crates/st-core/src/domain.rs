//! Domain extraction from navigable URLs.

use url::Url;

use crate::types::Domain;

/// Schemes that identify ordinary web pages. Everything else (browser UI,
/// extension pages, local files, `about:` pages) is never attributed.
const WEB_SCHEMES: &[&str] = &["http", "https"];

/// Maps a URL to the domain that should receive its time.
///
/// Returns `None` for malformed URLs, URLs without a host, and non-web schemes
/// such as `chrome://`, `chrome-extension://` or `about:`.
pub fn extract(url: &str) -> Option<Domain> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::trace!(url, error = %e, "unparseable url");
            return None;
        }
    };

    if !WEB_SCHEMES.contains(&parsed.scheme()) {
        return None;
    }

    parsed.host_str().and_then(|host| Domain::new(host).ok())
}
