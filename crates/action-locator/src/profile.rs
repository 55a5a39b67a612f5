//! Runtime profile classification

use healkit_core_types::RuntimeProfile;
use page_port::PageSignals;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::LocatorError;

/// What decided a classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ClassificationReason {
    Override,
    UrlPattern(String),
    FrameworkMarker(String),
    NoSignals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub profile: RuntimeProfile,
    pub reason: ClassificationReason,
}

/// Labels a page `static` or `dynamic`. Evaluated once per navigation.
#[derive(Debug, Clone)]
pub struct ProfileClassifier {
    url_patterns: Vec<Regex>,
    markers: Vec<String>,
    forced: Option<RuntimeProfile>,
}

impl ProfileClassifier {
    pub fn new<P, M>(
        url_patterns: P,
        framework_markers: M,
        forced: Option<RuntimeProfile>,
    ) -> Result<Self, LocatorError>
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        let url_patterns = url_patterns
            .into_iter()
            .map(|p| {
                let pattern = p.as_ref();
                Regex::new(pattern).map_err(|err| LocatorError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let markers = framework_markers
            .into_iter()
            .map(|m| m.as_ref().trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        Ok(Self {
            url_patterns,
            markers,
            forced,
        })
    }

    pub fn classify(&self, url: &str, signals: &PageSignals) -> Classification {
        let classification = self.decide(url, signals);
        debug!(
            target: "profile",
            url,
            profile = classification.profile.name(),
            reason = ?classification.reason,
            "classified"
        );
        classification
    }

    fn decide(&self, url: &str, signals: &PageSignals) -> Classification {
        if let Some(profile) = self.forced {
            return Classification {
                profile,
                reason: ClassificationReason::Override,
            };
        }
        if let Some(pattern) = self.url_patterns.iter().find(|p| p.is_match(url)) {
            return Classification {
                profile: RuntimeProfile::Dynamic,
                reason: ClassificationReason::UrlPattern(pattern.as_str().to_string()),
            };
        }
        let seen = signals
            .framework_markers
            .iter()
            .map(|m| m.trim().to_ascii_lowercase())
            .find(|m| self.markers.iter().any(|known| m.contains(known.as_str())));
        if let Some(marker) = seen {
            return Classification {
                profile: RuntimeProfile::Dynamic,
                reason: ClassificationReason::FrameworkMarker(marker),
            };
        }
        Classification {
            profile: RuntimeProfile::Static,
            reason: ClassificationReason::NoSignals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ProfileClassifier {
        ProfileClassifier::new([r"/app/", r"#/"], ["react", "__next", "ng-version"], None).unwrap()
    }

    fn signals(markers: &[&str]) -> PageSignals {
        PageSignals {
            url: String::new(),
            framework_markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn url_pattern_selects_dynamic() {
        let c = classifier().classify("https://example.com/app/dashboard", &signals(&[]));
        assert_eq!(c.profile, RuntimeProfile::Dynamic);
        assert_eq!(c.reason, ClassificationReason::UrlPattern("/app/".into()));
    }

    #[test]
    fn framework_marker_selects_dynamic() {
        let c = classifier().classify("https://example.com/login", &signals(&["data-reactroot"]));
        assert_eq!(c.profile, RuntimeProfile::Dynamic);
        assert_eq!(
            c.reason,
            ClassificationReason::FrameworkMarker("data-reactroot".into())
        );
    }

    #[test]
    fn no_signals_is_static() {
        let c = classifier().classify("https://example.com/about", &signals(&["jquery"]));
        assert_eq!(c.profile, RuntimeProfile::Static);
        assert_eq!(c.reason, ClassificationReason::NoSignals);
    }

    #[test]
    fn override_wins() {
        let c = ProfileClassifier::new([r"/app/"], ["react"], Some(RuntimeProfile::Static))
            .unwrap()
            .classify("https://example.com/app/", &signals(&["react"]));
        assert_eq!(c.profile, RuntimeProfile::Static);
        assert_eq!(c.reason, ClassificationReason::Override);
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let err = ProfileClassifier::new(["("], Vec::<String>::new(), None).unwrap_err();
        assert!(matches!(err, LocatorError::InvalidPattern { .. }));
    }
}
