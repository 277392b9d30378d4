//! Replay priority derived from the request path

use fieldlink_domain::Priority;

/// Path fragments and the priority they imply, highest first
const PATH_RULES: [(&str, Priority); 6] = [
    ("/orders", Priority::Critical),
    ("/payments", Priority::Critical),
    ("/location", Priority::High),
    ("/status", Priority::High),
    ("/analytics", Priority::Low),
    ("/logs", Priority::Low),
];

/// Priority for a request whose caller did not pick one
///
/// Matching ignores case and the query string. When a path matches several
/// rules the highest priority wins.
pub fn derive_priority(path: &str) -> Priority {
    let path = path.split('?').next().unwrap_or_default().to_ascii_lowercase();
    PATH_RULES
        .iter()
        .find(|(fragment, _)| path.contains(fragment))
        .map_or(Priority::Normal, |(_, priority)| *priority)
}
