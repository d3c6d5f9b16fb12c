//! Origin allow-list matching for the relay.

/// Allow-list of browser origins.
///
/// Entries are exact origins, `*` (any origin), or `https://*.domain`, which
/// matches `https://domain` and any `https://` subdomain of it.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .map(|entry| entry.as_ref().trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect();
        Self { allowed }
    }

    /// A request without an `Origin` header is never allowed.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin.map(str::trim).filter(|o| !o.is_empty()) else {
            return false;
        };

        self.allowed.iter().any(|pattern| {
            if pattern == "*" || pattern == origin {
                return true;
            }
            match pattern.strip_prefix("https://*.") {
                Some(domain) => match origin.strip_prefix("https://") {
                    Some(host) => host == domain || host.ends_with(&format!(".{domain}")),
                    None => false,
                },
                None => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_allows_any_present_origin() {
        let policy = OriginPolicy::new(["*"]);
        assert!(policy.allows(Some("https://anything.test")));
        assert!(!policy.allows(None));
        assert!(!policy.allows(Some("  ")));
    }

    #[test]
    fn test_exact_match() {
        let policy = OriginPolicy::new(["https://agency.test", " http://localhost:5173 "]);
        assert!(policy.allows(Some("https://agency.test")));
        assert!(policy.allows(Some("http://localhost:5173")));
        assert!(!policy.allows(Some("https://agency.test:8443")));
    }

    #[test]
    fn test_wildcard_subdomains() {
        let policy = OriginPolicy::new(["https://*.agency.test"]);
        assert!(policy.allows(Some("https://www.agency.test")));
        assert!(policy.allows(Some("https://a.b.agency.test")));
        assert!(policy.allows(Some("https://agency.test")));
        assert!(!policy.allows(Some("http://www.agency.test")));
        assert!(!policy.allows(Some("https://evilagency.test")));
    }

    #[test]
    fn test_empty_list_allows_nothing() {
        let policy = OriginPolicy::new(Vec::<String>::new());
        assert!(!policy.allows(Some("https://agency.test")));
    }
}
