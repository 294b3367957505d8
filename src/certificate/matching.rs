//! Reference identity matching for DNS-ID, CN-ID and SRV-ID names.

/// Lowercase and drop a single trailing dot. Empty names never match.
fn normalize(name: &str) -> Option<String> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.ends_with('.') {
        return None;
    }
    Some(name.to_ascii_lowercase())
}

/// Match a presented DNS name (possibly `*.` wildcarded) against a host name.
///
/// The wildcard must be the entire leftmost label and stands for exactly one
/// non-empty label. The remaining pattern needs at least two labels, so
/// `*.com` matches nothing.
pub(crate) fn dns_name_matches(presented: &str, host: &str) -> bool {
    let (Some(pattern), Some(host)) = (normalize(presented), normalize(host)) else {
        return false;
    };

    match pattern.strip_prefix("*.") {
        Some(suffix) => {
            if suffix.contains('*') || !suffix.contains('.') {
                return false;
            }
            let Some((first, rest)) = host.split_once('.') else {
                return false;
            };
            !first.is_empty() && rest == suffix
        }
        None => !pattern.contains('*') && pattern == host,
    }
}

/// Match a presented SRV-ID (`_service.domain`) exactly. No wildcards.
pub(crate) fn srv_name_matches(presented: &str, domain: &str, service: &str) -> bool {
    let service = service.strip_prefix('_').unwrap_or(service);
    if service.is_empty() {
        return false;
    }
    let (Some(presented), Some(domain)) = (normalize(presented), normalize(domain)) else {
        return false;
    };
    let Some(rest) = presented.strip_prefix('_') else {
        return false;
    };
    let Some((svc, dom)) = rest.split_once('.') else {
        return false;
    };
    svc.eq_ignore_ascii_case(service) && dom == domain
}
