//! Static country/year political-events table and the context-score formula.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intensity {
    Low,
    Moderate,
    High,
}

impl Intensity {
    pub fn base_score(self) -> f64 {
        match self {
            Intensity::Low => 1.0,
            Intensity::Moderate => 2.0,
            Intensity::High => 3.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Intensity::Low => "Low",
            Intensity::Moderate => "Moderate",
            Intensity::High => "High",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEntry {
    pub events: Vec<String>,
    pub intensity: Intensity,
    pub keywords: String,
}

impl EventEntry {
    fn new(events: &[&str], intensity: Intensity, keywords: &str) -> Self {
        Self {
            events: events.iter().map(|e| e.to_string()).collect(),
            intensity,
            keywords: keywords.to_string(),
        }
    }
}

/// Major-events lookup keyed by country then year.
#[derive(Debug, Clone, Default)]
pub struct PoliticalEventsTable {
    entries: BTreeMap<String, BTreeMap<i64, EventEntry>>,
}

impl PoliticalEventsTable {
    /// The built-in event set.
    pub fn builtin() -> Self {
        let mut entries: BTreeMap<String, BTreeMap<i64, EventEntry>> = BTreeMap::new();

        let usa = entries.entry("USA".to_string()).or_default();
        usa.insert(
            2016,
            EventEntry::new(
                &["Presidential Election", "Political Polarization"],
                Intensity::High,
                "election,polarization",
            ),
        );
        usa.insert(
            2020,
            EventEntry::new(
                &["COVID-19 Pandemic", "BLM Protests", "Presidential Election"],
                Intensity::High,
                "pandemic,protests,election",
            ),
        );
        usa.insert(
            2021,
            EventEntry::new(
                &["Capitol Insurrection", "COVID-19 Continued"],
                Intensity::High,
                "insurrection,pandemic",
            ),
        );

        let india = entries.entry("India".to_string()).or_default();
        india.insert(
            2016,
            EventEntry::new(&["Demonetization"], Intensity::High, "economic,reform"),
        );
        india.insert(
            2019,
            EventEntry::new(&["Article 370 Revocation"], Intensity::High, "kashmir,politics"),
        );
        india.insert(
            2020,
            EventEntry::new(
                &["COVID-19 Pandemic", "Farmer Protests"],
                Intensity::High,
                "pandemic,protests",
            ),
        );

        Self { entries }
    }

    pub fn entry(&self, country: &str, year: i64) -> Option<&EventEntry> {
        self.entries.get(country).and_then(|years| years.get(&year))
    }

    /// Context score for a country/year pair.
    ///
    /// Missing country or year scores 0; a pair absent from the table scores
    /// a flat baseline of 1; a present entry scores
    /// `intensity_base * (1 + 0.5 * event_count)`.
    pub fn score(&self, country: Option<&str>, year: Option<i64>) -> f64 {
        let country = match country.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => c,
            None => return 0.0,
        };
        let year = match year {
            Some(y) => y,
            None => return 0.0,
        };
        match self.entry(country, year) {
            Some(entry) => {
                entry.intensity.base_score() * (1.0 + entry.events.len() as f64 * 0.5)
            }
            None => 1.0,
        }
    }
}
