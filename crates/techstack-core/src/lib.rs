//! Core domain model, filter vocabulary and result deduplication for TechStack.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "techstack-core";

/// Sentinel domain value that must never reach the search API unscoped.
pub const ALL_SENTINEL: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct UnknownFilterValue {
    pub kind: &'static str,
    pub value: String,
}

/// Shared behavior of the fixed filter enumerations.
pub trait FilterValue: Copy + Sized + 'static {
    const KIND: &'static str;

    fn variants() -> &'static [Self];

    /// Exact string the backend expects.
    fn label(&self) -> &'static str;

    fn parse_label(input: &str) -> Result<Self, UnknownFilterValue> {
        let trimmed = input.trim();
        Self::variants()
            .iter()
            .copied()
            .find(|v| v.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownFilterValue {
                kind: Self::KIND,
                value: input.to_string(),
            })
    }
}

/// Top-level technology category. Exactly one is selected at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Domain {
    #[default]
    Cloud,
    #[serde(rename = "AI")]
    Ai,
    Developer,
    Cybersecurity,
    Data,
    Networking,
}

impl Domain {
    pub fn icon(&self) -> &'static str {
        match self {
            Domain::Cloud => "\u{2601}\u{fe0f}",     // ☁️
            Domain::Ai => "\u{1F916}",               // 🤖
            Domain::Developer => "\u{1F4BB}",        // 💻
            Domain::Cybersecurity => "\u{1F512}",    // 🔒
            Domain::Data => "\u{1F4CA}",             // 📊
            Domain::Networking => "\u{1F310}",       // 🌐
        }
    }

    /// The backend matches domains case-insensitively but expects lower case.
    pub fn query_value(&self) -> String {
        self.label().to_ascii_lowercase()
    }
}

impl FilterValue for Domain {
    const KIND: &'static str = "domain";

    fn variants() -> &'static [Self] {
        &[
            Domain::Cloud,
            Domain::Ai,
            Domain::Developer,
            Domain::Cybersecurity,
            Domain::Data,
            Domain::Networking,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            Domain::Cloud => "Cloud",
            Domain::Ai => "AI",
            Domain::Developer => "Developer",
            Domain::Cybersecurity => "Cybersecurity",
            Domain::Data => "Data",
            Domain::Networking => "Networking",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Level {
    #[default]
    All,
    #[serde(rename = "Entry Level")]
    EntryLevel,
    Associate,
    Professional,
    Expert,
}

impl FilterValue for Level {
    const KIND: &'static str = "level";

    fn variants() -> &'static [Self] {
        &[
            Level::All,
            Level::EntryLevel,
            Level::Associate,
            Level::Professional,
            Level::Expert,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            Level::All => "All",
            Level::EntryLevel => "Entry Level",
            Level::Associate => "Associate",
            Level::Professional => "Professional",
            Level::Expert => "Expert",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CertType {
    Certifications,
    Vouchers,
    Courses,
    Events,
    Internships,
    Fellowships,
    Others,
}

impl FilterValue for CertType {
    const KIND: &'static str = "type";

    fn variants() -> &'static [Self] {
        &[
            CertType::Certifications,
            CertType::Vouchers,
            CertType::Courses,
            CertType::Events,
            CertType::Internships,
            CertType::Fellowships,
            CertType::Others,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            CertType::Certifications => "Certifications",
            CertType::Vouchers => "Vouchers",
            CertType::Courses => "Courses",
            CertType::Events => "Events",
            CertType::Internships => "Internships",
            CertType::Fellowships => "Fellowships",
            CertType::Others => "Others",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    LinkedIn,
    Facebook,
    Reddit,
    Medium,
    #[serde(rename = "Dev.to")]
    DevTo,
    Devpost,
}

impl FilterValue for Platform {
    const KIND: &'static str = "platform";

    fn variants() -> &'static [Self] {
        &[
            Platform::LinkedIn,
            Platform::Facebook,
            Platform::Reddit,
            Platform::Medium,
            Platform::DevTo,
            Platform::Devpost,
        ]
    }

    fn label(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "LinkedIn",
            Platform::Facebook => "Facebook",
            Platform::Reddit => "Reddit",
            Platform::Medium => "Medium",
            Platform::DevTo => "Dev.to",
            Platform::Devpost => "Devpost",
        }
    }
}

macro_rules! filter_value_string_forms {
    ($($ty:ty),+) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.label())
                }
            }

            impl FromStr for $ty {
                type Err = UnknownFilterValue;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    <$ty as FilterValue>::parse_label(s)
                }
            }
        )+
    };
}

filter_value_string_forms!(Domain, Level, CertType, Platform);

/// One filter selection. The controller keeps two of these: the draft the
/// user is editing and the applied snapshot that defines the active query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub domain: Domain,
    pub level: Level,
    pub cert_types: BTreeSet<CertType>,
    pub platforms: BTreeSet<Platform>,
}

impl Default for FilterSelection {
    fn default() -> Self {
        Self {
            domain: Domain::Cloud,
            level: Level::All,
            cert_types: BTreeSet::from([CertType::Certifications]),
            platforms: BTreeSet::from([Platform::LinkedIn, Platform::Facebook]),
        }
    }
}

impl FilterSelection {
    pub fn set_cert_type(&mut self, cert_type: CertType, included: bool) {
        if included {
            self.cert_types.insert(cert_type);
        } else {
            self.cert_types.remove(&cert_type);
        }
    }

    pub fn set_platform(&mut self, platform: Platform, included: bool) {
        if included {
            self.platforms.insert(platform);
        } else {
            self.platforms.remove(&platform);
        }
    }

    pub fn cert_type_labels(&self) -> Vec<String> {
        self.cert_types.iter().map(|t| t.label().to_string()).collect()
    }

    pub fn platform_labels(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.label().to_string()).collect()
    }
}

/// One opportunity record as returned by the search API.
///
/// Unknown payload fields are ignored; a missing or null title becomes an
/// empty string so a single sloppy record never poisons the whole list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Opportunity {
    #[serde(default, deserialize_with = "string_or_default")]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expectations: Option<String>,
    #[serde(default)]
    pub category_label: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub search_query: Option<String>,
}

fn string_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Opportunity {
    /// URL used both as dedup key and as identifier, if usable.
    pub fn dedup_key(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// Stable per-item identifier; `ordinal` is the item's position in the
    /// rendered list and only matters for items without a URL.
    pub fn identifier(&self, ordinal: usize) -> String {
        match self.dedup_key() {
            Some(key) => key.to_string(),
            None => format!("{}-{}", self.title, ordinal),
        }
    }

    /// Domain label resolved against the known vocabulary, if recognizable.
    pub fn known_domain(&self) -> Option<Domain> {
        self.category_label
            .as_deref()
            .or(self.domain.as_deref())
            .and_then(|value| value.parse().ok())
    }
}

/// Pair every item with its identifier, in list order. A synthesized key can
/// spell the same string as a real URL; any identifier already handed out gets
/// `#{ordinal}` appended until it is unique within the list.
pub fn with_identifiers(items: &[Opportunity]) -> Vec<(String, &Opportunity)> {
    let mut used: HashSet<String> = HashSet::with_capacity(items.len());
    items
        .iter()
        .enumerate()
        .map(|(ordinal, item)| {
            let mut id = item.identifier(ordinal);
            while used.contains(&id) {
                id = format!("{id}#{ordinal}");
            }
            used.insert(id.clone());
            (id, item)
        })
        .collect()
}

/// Drop repeated URLs keeping the first occurrence. Items without a URL are
/// never treated as duplicates of each other.
pub fn dedupe(items: Vec<Opportunity>) -> Vec<Opportunity> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| match item.dedup_key() {
            Some(key) => seen.insert(key.to_string()),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opp(url: Option<&str>, title: &str) -> Opportunity {
        Opportunity {
            title: title.to_string(),
            url: url.map(ToString::to_string),
            ..Default::default()
        }
    }

    fn titles(items: &[Opportunity]) -> Vec<&str> {
        items.iter().map(|o| o.title.as_str()).collect()
    }

    #[test]
    fn dedupe_keeps_first_occurrence_in_order() {
        let items = vec![
            opp(Some("a"), "X"),
            opp(Some("b"), "Y"),
            opp(Some("a"), "X-dup"),
            opp(Some("c"), "Z"),
            opp(Some("b"), "Y-dup"),
        ];
        assert_eq!(titles(&dedupe(items)), vec!["X", "Y", "Z"]);
    }

    #[test]
    fn dedupe_never_merges_keyless_items() {
        let items = vec![
            opp(None, "same"),
            opp(None, "same"),
            opp(Some(""), "blank"),
            opp(Some("   "), "blank"),
        ];
        assert_eq!(dedupe(items).len(), 4);
    }

    #[test]
    fn dedupe_is_idempotent_and_handles_empty() {
        assert!(dedupe(Vec::new()).is_empty());
        let items = vec![
            opp(Some("a"), "X"),
            opp(None, "loose"),
            opp(Some("a"), "X-dup"),
            opp(Some("b"), "Y"),
        ];
        let once = dedupe(items);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn identifier_falls_back_to_title_and_ordinal() {
        let items = vec![opp(Some("https://a"), "X"), opp(None, "Loose"), opp(None, "Loose")];
        let ids = with_identifiers(&items)
            .into_iter()
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["https://a", "Loose-1", "Loose-2"]);
    }

    #[test]
    fn synthesized_identifier_never_shadows_a_real_url() {
        let items = dedupe(vec![
            opp(Some("Loose-1"), "Real"),
            opp(None, "Loose"),
            opp(Some("Loose-1#1"), "Also real"),
        ]);
        let ids = with_identifiers(&items)
            .into_iter()
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["Loose-1", "Loose-1#1", "Loose-1#1#2"]);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    #[test]
    fn default_selection_matches_initial_ui_state() {
        let selection = FilterSelection::default();
        assert_eq!(selection.domain, Domain::Cloud);
        assert_eq!(selection.level, Level::All);
        assert_eq!(selection.cert_type_labels(), vec!["Certifications"]);
        assert_eq!(selection.platform_labels(), vec!["LinkedIn", "Facebook"]);
    }

    #[test]
    fn set_membership_toggles_are_idempotent() {
        let mut selection = FilterSelection::default();
        selection.set_cert_type(CertType::Events, true);
        selection.set_cert_type(CertType::Events, true);
        selection.set_cert_type(CertType::Certifications, false);
        selection.set_platform(Platform::DevTo, true);
        selection.set_platform(Platform::Facebook, false);
        assert_eq!(selection.cert_type_labels(), vec!["Events"]);
        assert_eq!(selection.platform_labels(), vec!["LinkedIn", "Dev.to"]);
    }

    #[test]
    fn labels_parse_case_insensitively_and_reject_unknowns() {
        assert_eq!("ai".parse::<Domain>().unwrap(), Domain::Ai);
        assert_eq!("entry level".parse::<Level>().unwrap(), Level::EntryLevel);
        assert_eq!("Dev.to".parse::<Platform>().unwrap(), Platform::DevTo);
        let err = "All".parse::<Domain>().unwrap_err();
        assert_eq!(err.kind, "domain");
        assert!("Webinars".parse::<CertType>().is_err());
    }

    #[test]
    fn domain_query_value_is_lowercase() {
        assert_eq!(Domain::Cybersecurity.query_value(), "cybersecurity");
        assert_eq!(Domain::Ai.query_value(), "ai");
    }

    #[test]
    fn serde_uses_backend_labels() {
        let json = serde_json::to_string(&FilterSelection {
            domain: Domain::Ai,
            level: Level::EntryLevel,
            cert_types: BTreeSet::from([CertType::Courses]),
            platforms: BTreeSet::from([Platform::DevTo]),
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"domain":"AI","level":"Entry Level","cert_types":["Courses"],"platforms":["Dev.to"]}"#
        );
    }

    #[test]
    fn opportunity_tolerates_sparse_payloads() {
        let parsed: Opportunity = serde_json::from_str(
            r#"{"id": 7, "label": "Cloud", "title": null, "url": "https://x", "category_label": "Cloud"}"#,
        )
        .unwrap();
        assert_eq!(parsed.title, "");
        assert_eq!(parsed.dedup_key(), Some("https://x"));
        assert_eq!(parsed.known_domain(), Some(Domain::Cloud));
    }
}
