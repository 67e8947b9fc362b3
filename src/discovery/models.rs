use serde::Serialize;
use std::collections::BTreeSet;

/// Page identifier for the 1-based page number `n`, e.g. `ms0007`.
pub fn page_id(n: u32) -> String {
    format!("ms{:04}", n)
}

/// What to assume when neither metadata nor probing finds any page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FallbackPolicy {
    /// Assume the record has exactly one page, `ms0001`.
    SinglePage,
    /// Queue no images for the record.
    None,
}

impl FallbackPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackPolicy::SinglePage => "single_page",
            FallbackPolicy::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single_page" => Some(FallbackPolicy::SinglePage),
            "none" => Some(FallbackPolicy::None),
            _ => None,
        }
    }

    pub fn pages(&self) -> BTreeSet<String> {
        match self {
            FallbackPolicy::SinglePage => BTreeSet::from([page_id(1)]),
            FallbackPolicy::None => BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Metadata,
    Probe,
    Fallback,
}

impl DiscoveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::Metadata => "metadata",
            DiscoveryMethod::Probe => "probe",
            DiscoveryMethod::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredPages {
    /// Ordered page ids.
    pub pages: BTreeSet<String>,
    pub method: DiscoveryMethod,
}

impl DiscoveredPages {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_format() {
        assert_eq!(page_id(1), "ms0001");
        assert_eq!(page_id(56), "ms0056");
        assert_eq!(page_id(12345), "ms12345");
    }

    #[test]
    fn test_fallback_policy() {
        assert_eq!(FallbackPolicy::parse("single_page"), Some(FallbackPolicy::SinglePage));
        assert_eq!(FallbackPolicy::parse("none"), Some(FallbackPolicy::None));
        assert_eq!(FallbackPolicy::parse("SinglePage"), None);
        assert_eq!(FallbackPolicy::SinglePage.pages().len(), 1);
        assert!(FallbackPolicy::None.pages().is_empty());
        assert_eq!(
            FallbackPolicy::parse(FallbackPolicy::SinglePage.as_str()),
            Some(FallbackPolicy::SinglePage)
        );
    }
}
