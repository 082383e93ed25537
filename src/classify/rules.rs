//! Keyword rules that sit around the model call.
//!
//! Two ordered rule sets, both pure functions over `(text, verdict)`:
//! - **Overrides** run on every ready verdict. The first rule whose keywords
//!   appear in the text forces its category at confidence 1.0. Confidence is
//!   only ever raised.
//! - **Rescue** runs only on an `Other` verdict below [`RESCUE_BELOW`]. A
//!   keyword hit that is not part of a person's name reclassifies at
//!   [`RESCUE_CONFIDENCE`].
//!
//! Keywords match whole words, case-insensitively.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::names::is_part_of_name;
use super::{Category, Verdict};

pub const RESCUE_BELOW: f32 = 0.9;
pub const RESCUE_CONFIDENCE: f32 = 0.85;

/// One override: if any keyword appears, force `category` at `confidence`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRule {
    pub name: String,
    pub keywords: Vec<String>,
    pub category: Category,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl OverrideRule {
    pub fn new(name: &str, keywords: &[&str], category: Category) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            category,
            confidence: 1.0,
        }
    }
}

/// A compiled keyword rule.
#[derive(Debug, Clone)]
struct Compiled {
    name: String,
    re: Regex,
    category: Category,
    confidence: f32,
}

fn compile_keywords(keywords: &[String]) -> Option<Regex> {
    let alts: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if alts.is_empty() {
        return None;
    }
    Regex::new(&format!(r"(?i)\b(?:{})\b", alts.join("|"))).ok()
}

/// Ordered override rules; first match wins.
#[derive(Debug, Clone)]
pub struct OverrideRules {
    rules: Vec<Compiled>,
}

impl Default for OverrideRules {
    fn default() -> Self {
        Self::from_rules(&default_overrides())
    }
}

impl OverrideRules {
    /// Compile rules in priority order. Rules with no usable keywords are dropped.
    pub fn from_rules(rules: &[OverrideRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|r| {
                let re = compile_keywords(&r.keywords)?;
                Some(Compiled {
                    name: r.name.clone(),
                    re,
                    category: r.category,
                    confidence: r.confidence.clamp(0.0, 1.0),
                })
            })
            .collect();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the overridden verdict, or `None` if no rule fired.
    pub fn apply(&self, text: &str, verdict: &Verdict) -> Option<Verdict> {
        let rule = self.rules.iter().find(|r| r.re.is_match(text))?;
        tracing::debug!(rule = %rule.name, category = %rule.category, "override rule fired");
        Some(Verdict {
            category: rule.category,
            confidence: rule.confidence.max(verdict.confidence),
        })
    }
}

/// Built-in override set, highest priority first.
pub fn default_overrides() -> Vec<OverrideRule> {
    vec![
        OverrideRule::new("fire", &["fire", "fires", "wildfire", "wildfires"], Category::Fire),
        OverrideRule::new(
            "flood",
            &["flood", "floods", "flooding", "flooded"],
            Category::Flood,
        ),
        OverrideRule::new(
            "earthquake",
            &["earthquake", "earthquakes", "magnitude"],
            Category::Earthquake,
        ),
        OverrideRule::new(
            "medical",
            &["hospital", "hospitalized", "injured", "injuries"],
            Category::MedicalEmergency,
        ),
    ]
}

static RESCUE_RULES: Lazy<Vec<Compiled>> = Lazy::new(|| {
    let table: &[(&str, &[&str], Category)] = &[
        ("quake", &["quake", "quakes", "tremor", "tremors", "aftershock"], Category::Earthquake),
        ("blaze", &["blaze", "inferno", "burning"], Category::Fire),
        ("deluge", &["deluge", "inundated", "inundation", "submerged"], Category::Flood),
        (
            "storm",
            &["storm", "storms", "hurricane", "cyclone", "typhoon", "tornado"],
            Category::Storm,
        ),
        ("violence", &["shooting", "gunman", "stabbing", "gunfire"], Category::Violence),
        ("casualties", &["casualties", "wounded", "injury"], Category::MedicalEmergency),
    ];
    table
        .iter()
        .filter_map(|(name, kws, cat)| {
            let kws: Vec<String> = kws.iter().map(|k| k.to_string()).collect();
            Some(Compiled {
                name: name.to_string(),
                re: compile_keywords(&kws)?,
                category: *cat,
                confidence: RESCUE_CONFIDENCE,
            })
        })
        .collect()
});

/// Low-confidence rescue of an `Other` verdict. Returns `None` when the pass
/// does not apply or finds nothing.
pub fn rescue(text: &str, verdict: &Verdict) -> Option<Verdict> {
    if verdict.category != Category::Other || verdict.confidence >= RESCUE_BELOW {
        return None;
    }
    for rule in RESCUE_RULES.iter() {
        let real_hit = rule
            .re
            .find_iter(text)
            .any(|m| !is_part_of_name(text, m.start(), m.end()));
        if real_hit {
            tracing::debug!(rule = %rule.name, category = %rule.category, "rescue rule fired");
            return Some(Verdict {
                category: rule.category,
                confidence: rule.confidence,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn other(conf: f32) -> Verdict {
        Verdict {
            category: Category::Other,
            confidence: conf,
        }
    }

    #[test]
    fn override_forces_full_confidence() {
        let rules = OverrideRules::default();
        let v = rules
            .apply("Magnitude 6.1 earthquake strikes region", &other(0.3))
            .unwrap();
        assert_eq!(v.category, Category::Earthquake);
        assert_eq!(v.confidence, 1.0);
    }

    #[test]
    fn override_priority_is_ordered() {
        let rules = OverrideRules::default();
        // Both fire and flood words present: fire is first in the list.
        let v = rules.apply("Fire crews help as flooding spreads", &other(0.5)).unwrap();
        assert_eq!(v.category, Category::Fire);
    }

    #[test]
    fn override_is_word_bounded() {
        let rules = OverrideRules::default();
        assert!(rules.apply("Ceasefire talks resume", &other(0.5)).is_none());
        assert!(rules.apply("Wildfire spreads near town", &other(0.5)).is_some());
    }

    #[test]
    fn custom_rules_replace_defaults() {
        let rules = OverrideRules::from_rules(&[OverrideRule::new(
            "tsunami",
            &["tsunami"],
            Category::Flood,
        )]);
        assert_eq!(rules.len(), 1);
        let v = rules.apply("Tsunami warning lifted", &other(0.1)).unwrap();
        assert_eq!(v.category, Category::Flood);
        assert!(rules.apply("fire", &other(0.1)).is_none());
    }

    #[test]
    fn override_never_lowers_confidence() {
        let rules = OverrideRules::from_rules(&[OverrideRule {
            name: "soft".into(),
            keywords: vec!["storm".into()],
            category: Category::Storm,
            confidence: 0.5,
        }]);
        let v = rules
            .apply("storm", &Verdict { category: Category::Other, confidence: 0.8 })
            .unwrap();
        assert!((v.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn rescue_only_for_uncertain_other() {
        let t = "a tornado touched down near the highway";
        assert_eq!(rescue(t, &other(0.4)).unwrap().category, Category::Storm);
        assert!(rescue(t, &other(0.95)).is_none());
        let confident = Verdict {
            category: Category::Violence,
            confidence: 0.4,
        };
        assert!(rescue(t, &confident).is_none());
    }

    #[test]
    fn rescue_skips_person_names() {
        let t = "actress Storm Reid attends a premiere in london";
        assert!(rescue(t, &other(0.4)).is_none());
    }

    #[test]
    fn rescue_uses_fixed_moderate_confidence() {
        let v = rescue("shooting reported downtown", &other(0.2)).unwrap();
        assert_eq!(v.category, Category::Violence);
        assert!((v.confidence - RESCUE_CONFIDENCE).abs() < 1e-6);

        // Close to the cutoff the model's own score is not carried over.
        let v = rescue("shooting reported downtown", &other(0.88)).unwrap();
        assert!((v.confidence - RESCUE_CONFIDENCE).abs() < 1e-6);
    }
}
