use tally_state::{KeyKind, StateKey};

/// Render a [`StateKey`] into a Redis key string with the given prefix.
///
/// The format is `prefix:namespace:tenant:kind:id`.
pub fn render_key(prefix: &str, key: &StateKey) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        prefix, key.namespace, key.tenant, key.kind, key.id
    )
}

/// Escape the glob metacharacters `SCAN MATCH` would otherwise interpret.
fn escape_glob(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `SCAN MATCH` pattern selecting every key under one namespace, tenant and kind.
///
/// Every caller-supplied segment is matched literally.
pub fn scan_pattern(
    prefix: &str,
    namespace: &str,
    tenant: &str,
    kind: &KeyKind,
    id_prefix: Option<&str>,
) -> String {
    format!(
        "{}:{}:{}:{}:{}*",
        escape_glob(prefix),
        escape_glob(namespace),
        escape_glob(tenant),
        escape_glob(kind.as_str()),
        escape_glob(id_prefix.unwrap_or(""))
    )
}

/// Strip the store prefix so callers see canonical `namespace:tenant:kind:id` keys.
pub fn strip_prefix<'a>(prefix: &str, redis_key: &'a str) -> &'a str {
    redis_key
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(redis_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_standard_key() {
        let key = StateKey::new("media", "alice", KeyKind::DailyUsage, "2024-03-01");
        assert_eq!(
            render_key("tally", &key),
            "tally:media:alice:daily_usage:2024-03-01"
        );
    }

    #[test]
    fn renders_custom_kind() {
        let key = StateKey::new("ns", "t", KeyKind::Custom("my_kind".into()), "id-1");
        assert_eq!(render_key("pfx", &key), "pfx:ns:t:my_kind:id-1");
    }

    #[test]
    fn scan_pattern_does_not_bleed_into_longer_kinds() {
        let pattern = scan_pattern("p", "ns", "t", &KeyKind::Alert, None);
        assert_eq!(pattern, "p:ns:t:alert:*");
        let pattern = scan_pattern("p", "ns", "t", &KeyKind::Alert, Some("2024-03-01"));
        assert_eq!(pattern, "p:ns:t:alert:2024-03-01*");
    }

    #[test]
    fn scan_pattern_matches_segments_literally() {
        let pattern = scan_pattern("p", "ns", "a*", &KeyKind::Alert, Some("[2024]?"));
        assert_eq!(pattern, "p:ns:a\\*:alert:\\[2024\\]\\?*");
        let pattern = scan_pattern("p", "ns", "back\\slash", &KeyKind::Alert, None);
        assert_eq!(pattern, "p:ns:back\\\\slash:alert:*");
    }

    #[test]
    fn strips_only_the_store_prefix() {
        assert_eq!(strip_prefix("tally", "tally:ns:t:alert:x"), "ns:t:alert:x");
        assert_eq!(strip_prefix("tally", "other:ns"), "other:ns");
    }
}
