//! Operator traffic exclusion.

use serde::Serialize;

/// Addresses used by the shop's own staff; their visits would skew every report.
const DEFAULT_EXACT: &[&str] = &[];
const DEFAULT_PREFIXES: &[&str] = &["223.38."];
const DEFAULT_SUBSTRINGS: &[&str] = &[];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IpExclusion {
    pub exact: Vec<String>,
    pub prefixes: Vec<String>,
    pub substrings: Vec<String>,
}

impl Default for IpExclusion {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self { exact: owned(DEFAULT_EXACT), prefixes: owned(DEFAULT_PREFIXES), substrings: owned(DEFAULT_SUBSTRINGS) }
    }
}

impl IpExclusion {
    /// Lists that are `None` keep their defaults; `Some(vec![])` clears them.
    pub fn from_lists(exact: Option<Vec<String>>, prefixes: Option<Vec<String>>, substrings: Option<Vec<String>>) -> Self {
        let defaults = Self::default();
        Self {
            exact: exact.unwrap_or(defaults.exact),
            prefixes: prefixes.unwrap_or(defaults.prefixes),
            substrings: substrings.unwrap_or(defaults.substrings),
        }
    }

    pub fn is_excluded(&self, ip: &str) -> bool {
        let ip = ip.trim();
        self.exact.iter().any(|e| e == ip)
            || self.prefixes.iter().any(|p| ip.starts_with(p.as_str()))
            || self.substrings.iter().any(|s| ip.contains(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prefix_excludes_operator_range() {
        let rules = IpExclusion::default();
        assert!(rules.is_excluded("223.38.99.1"));
        assert!(!rules.is_excluded("1.2.3.4"));
        assert!(!rules.is_excluded("10.223.38.1"));
    }

    #[test]
    fn all_three_rule_kinds_apply() {
        let rules = IpExclusion::from_lists(
            Some(vec!["5.6.7.8".into()]),
            Some(vec![]),
            Some(vec!["192.168".into()]),
        );
        assert!(rules.is_excluded("5.6.7.8"));
        assert!(!rules.is_excluded("5.6.7.80"));
        assert!(rules.is_excluded("::ffff:192.168.0.3"));
        assert!(!rules.is_excluded("223.38.99.1"));
    }
}
