// src/category.rs
// Category normalization: free-form feed metadata labels are folded onto a
// small canonical set. Unknown labels pass through title-cased instead of
// being rejected, so unexpected feed metadata never blocks ingestion.

use serde::{Deserialize, Serialize};

/// Canonical category set plus an open overflow bucket for labels the
/// synonym table does not know. Serialized as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    World,
    Tech,
    Business,
    Sports,
    Science,
    Health,
    Entertainment,
    Politics,
    General,
    Other(String),
}

impl Category {
    /// Normalize a raw label to its canonical category. Pure, total; empty
    /// input maps to the generic default.
    pub fn normalize(raw: &str) -> Category {
        let folded = raw.trim().to_lowercase();
        match folded.as_str() {
            "" => Category::General,
            "world" | "international" | "global" | "world news" => Category::World,
            "tech" | "technology" | "gadgets" | "gadget" | "it" => Category::Tech,
            "business" | "economy" | "finance" | "markets" | "money" => Category::Business,
            "sport" | "sports" => Category::Sports,
            "science" | "sci" => Category::Science,
            "health" | "medicine" | "wellness" => Category::Health,
            "entertainment" | "culture" | "arts" | "showbiz" => Category::Entertainment,
            "politics" | "election" | "government" => Category::Politics,
            "general" | "news" | "top stories" => Category::General,
            _ => Category::Other(title_case(&folded)),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Category::World => "World",
            Category::Tech => "Tech",
            Category::Business => "Business",
            Category::Sports => "Sports",
            Category::Science => "Science",
            Category::Health => "Health",
            Category::Entertainment => "Entertainment",
            Category::Politics => "Politics",
            Category::General => "General",
            Category::Other(s) => s,
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::normalize(&s)
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.label().to_string()
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonyms_fold_regardless_of_casing() {
        for raw in ["TECHNOLOGY", "Gadgets", "tech", "gadget"] {
            assert_eq!(Category::normalize(raw), Category::Tech, "raw={raw}");
        }
        for raw in ["economy", "Finance", "MARKETS"] {
            assert_eq!(Category::normalize(raw), Category::Business, "raw={raw}");
        }
        assert_eq!(Category::normalize("International"), Category::World);
    }

    #[test]
    fn empty_input_maps_to_general() {
        assert_eq!(Category::normalize(""), Category::General);
        assert_eq!(Category::normalize("   "), Category::General);
    }

    #[test]
    fn unknown_labels_pass_through_title_cased() {
        assert_eq!(
            Category::normalize("local weather"),
            Category::Other("Local Weather".into())
        );
        assert_eq!(Category::normalize("local weather").label(), "Local Weather");
    }

    #[test]
    fn serde_round_trips_through_labels() {
        let json = serde_json::to_string(&Category::Tech).unwrap();
        assert_eq!(json, "\"Tech\"");
        let back: Category = serde_json::from_str("\"technology\"").unwrap();
        assert_eq!(back, Category::Tech);
    }
}
