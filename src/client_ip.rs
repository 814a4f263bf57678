//! Client address resolution from proxy headers.

use http::HeaderMap;

/// Bucket shared by every request whose address could not be resolved
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Returns the client address from the first header in `header_names` that carries one.
///
/// List-valued headers (`x-forwarded-for`) contribute their first hop. The value is used
/// verbatim as a key component and is not parsed as an IP. These headers are
/// client-controlled unless a trusted proxy overwrites them, so only list headers your edge
/// actually sets.
pub fn extract_client_ip<S: AsRef<str>>(headers: &HeaderMap, header_names: &[S]) -> String {
    for name in header_names {
        let Some(value) = headers.get(name.as_ref()) else {
            continue;
        };
        let Ok(raw) = value.to_str() else {
            continue;
        };

        let first_hop = raw.split(',').next().unwrap_or(raw).trim();
        if !first_hop.is_empty() {
            return first_hop.to_string();
        }
    }

    UNKNOWN_CLIENT.to_string()
}
