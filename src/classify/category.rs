// src/classify/category.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed label set produced by the classifier gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Fire,
    Flood,
    Earthquake,
    #[serde(rename = "Medical Emergency")]
    MedicalEmergency,
    Violence,
    Storm,
    Other,
    /// Model not ready; never stored.
    Loading,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fire => "Fire",
            Category::Flood => "Flood",
            Category::Earthquake => "Earthquake",
            Category::MedicalEmergency => "Medical Emergency",
            Category::Violence => "Violence",
            Category::Storm => "Storm",
            Category::Other => "Other",
            Category::Loading => "Loading",
        }
    }

    /// Map a free-form model label onto the closed set. Unknown labels are `Other`.
    pub fn from_label(label: &str) -> Self {
        let l = label
            .trim()
            .trim_end_matches('.')
            .to_ascii_lowercase()
            .replace(['_', '-'], " ");
        match l.as_str() {
            "fire" | "wildfire" => Category::Fire,
            "flood" | "flooding" => Category::Flood,
            "earthquake" | "quake" => Category::Earthquake,
            "medical emergency" | "medical" | "injury" => Category::MedicalEmergency,
            "violence" | "attack" => Category::Violence,
            "storm" | "hurricane" | "cyclone" | "typhoon" => Category::Storm,
            "loading" => Category::Loading,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_map_case_insensitively() {
        assert_eq!(Category::from_label("FIRE"), Category::Fire);
        assert_eq!(Category::from_label("medical_emergency"), Category::MedicalEmergency);
        assert_eq!(Category::from_label("Loading..."), Category::Loading);
        assert_eq!(Category::from_label("LABEL_7"), Category::Other);
    }

    #[test]
    fn serde_uses_display_names() {
        let json = serde_json::to_string(&Category::MedicalEmergency).unwrap();
        assert_eq!(json, "\"Medical Emergency\"");
        let back: Category = serde_json::from_str("\"Storm\"").unwrap();
        assert_eq!(back, Category::Storm);
    }
}
