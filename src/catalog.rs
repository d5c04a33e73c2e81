//! Static music-history catalog used to seed prompts and synthesize fallback questions.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Musical period a question (or a whole battle) is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Roughly 500–1400.
    Medieval,
    /// Roughly 1400–1600.
    Renaissance,
    /// Roughly 1600–1750.
    Baroque,
    /// Roughly 1750–1820.
    Classical,
    /// Roughly 1820–1910.
    Romantic,
    /// 1900 onwards.
    Modern,
}

impl Topic {
    /// Every topic, in chronological order.
    pub const ALL: [Topic; 6] = [
        Topic::Medieval,
        Topic::Renaissance,
        Topic::Baroque,
        Topic::Classical,
        Topic::Romantic,
        Topic::Modern,
    ];

    /// Human readable label used in prompts and logs.
    pub fn label(self) -> &'static str {
        match self {
            Topic::Medieval => "Medieval",
            Topic::Renaissance => "Renaissance",
            Topic::Baroque => "Baroque",
            Topic::Classical => "Classical",
            Topic::Romantic => "Romantic",
            Topic::Modern => "Modern",
        }
    }

    /// Approximate date range of the period.
    pub fn years(self) -> &'static str {
        match self {
            Topic::Medieval => "c. 500-1400",
            Topic::Renaissance => "c. 1400-1600",
            Topic::Baroque => "c. 1600-1750",
            Topic::Classical => "c. 1750-1820",
            Topic::Romantic => "c. 1820-1910",
            Topic::Modern => "1900-present",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A composer entry with a handful of notable works.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composer {
    pub name: String,
    pub period: Topic,
    pub works: Vec<String>,
}

impl Composer {
    /// Build an entry from borrowed data.
    pub fn new(name: &str, period: Topic, works: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            period,
            works: works.iter().map(|work| work.to_string()).collect(),
        }
    }
}

/// Immutable collection of composers, grouped by period on lookup.
#[derive(Debug, Clone)]
pub struct Catalog {
    composers: Vec<Composer>,
}

impl Catalog {
    /// Build a catalog from explicit entries.
    pub fn new(composers: Vec<Composer>) -> Self {
        Self { composers }
    }

    /// Catalog shipped with the binary.
    pub fn builtin() -> Self {
        Self::new(builtin_composers())
    }

    /// Composers belonging to `topic`, in catalog order.
    pub fn composers(&self, topic: Topic) -> Vec<&Composer> {
        self.composers
            .iter()
            .filter(|composer| composer.period == topic)
            .collect()
    }

    /// Whether `name` is a composer of `topic` (case-insensitive).
    pub fn is_composer_in(&self, topic: Topic, name: &str) -> bool {
        self.composers(topic)
            .iter()
            .any(|composer| composer.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_composers() -> Vec<Composer> {
    use Topic::*;

    vec![
        Composer::new(
            "Hildegard von Bingen",
            Medieval,
            &["Ordo Virtutum", "Symphonia armonie celestium revelationum"],
        ),
        Composer::new(
            "Guillaume de Machaut",
            Medieval,
            &["Messe de Nostre Dame", "Le Remede de Fortune"],
        ),
        Composer::new("Pérotin", Medieval, &["Viderunt omnes", "Sederunt principes"]),
        Composer::new("Léonin", Medieval, &["Magnus Liber Organi"]),
        Composer::new(
            "Francesco Landini",
            Medieval,
            &["Ecco la primavera", "Non avrà ma' pietà"],
        ),
        Composer::new(
            "Josquin des Prez",
            Renaissance,
            &["Missa Pange lingua", "Ave Maria... virgo serena"],
        ),
        Composer::new(
            "Giovanni Pierluigi da Palestrina",
            Renaissance,
            &["Missa Papae Marcelli", "Sicut cervus"],
        ),
        Composer::new("Thomas Tallis", Renaissance, &["Spem in alium", "If ye love me"]),
        Composer::new(
            "William Byrd",
            Renaissance,
            &["Mass for Four Voices", "Ave verum corpus"],
        ),
        Composer::new(
            "Orlande de Lassus",
            Renaissance,
            &["Lagrime di San Pietro", "Prophetiae Sibyllarum"],
        ),
        Composer::new(
            "Johann Sebastian Bach",
            Baroque,
            &[
                "Brandenburg Concertos",
                "Mass in B minor",
                "St Matthew Passion",
                "The Well-Tempered Clavier",
            ],
        ),
        Composer::new(
            "George Frideric Handel",
            Baroque,
            &["Messiah", "Water Music", "Music for the Royal Fireworks"],
        ),
        Composer::new(
            "Antonio Vivaldi",
            Baroque,
            &["The Four Seasons", "Gloria in D major"],
        ),
        Composer::new(
            "Claudio Monteverdi",
            Baroque,
            &["L'Orfeo", "Vespro della Beata Vergine"],
        ),
        Composer::new("Henry Purcell", Baroque, &["Dido and Aeneas", "The Fairy-Queen"]),
        Composer::new(
            "Wolfgang Amadeus Mozart",
            Classical,
            &["The Magic Flute", "Requiem in D minor", "Eine kleine Nachtmusik"],
        ),
        Composer::new(
            "Joseph Haydn",
            Classical,
            &["The Creation", "Surprise Symphony", "Emperor Quartet"],
        ),
        Composer::new(
            "Christoph Willibald Gluck",
            Classical,
            &["Orfeo ed Euridice", "Iphigénie en Tauride"],
        ),
        Composer::new(
            "Carl Philipp Emanuel Bach",
            Classical,
            &["Magnificat in D major", "Prussian Sonatas"],
        ),
        Composer::new(
            "Luigi Boccherini",
            Classical,
            &["String Quintet in E major", "Cello Concerto in B-flat major"],
        ),
        Composer::new(
            "Frédéric Chopin",
            Romantic,
            &["Revolutionary Étude", "Minute Waltz", "Ballade No. 1"],
        ),
        Composer::new(
            "Richard Wagner",
            Romantic,
            &["Der Ring des Nibelungen", "Tristan und Isolde"],
        ),
        Composer::new(
            "Pyotr Ilyich Tchaikovsky",
            Romantic,
            &["Swan Lake", "The Nutcracker", "1812 Overture"],
        ),
        Composer::new(
            "Johannes Brahms",
            Romantic,
            &["A German Requiem", "Hungarian Dances"],
        ),
        Composer::new("Franz Liszt", Romantic, &["Hungarian Rhapsodies", "Liebestraum No. 3"]),
        Composer::new(
            "Igor Stravinsky",
            Modern,
            &["The Rite of Spring", "The Firebird", "Petrushka"],
        ),
        Composer::new(
            "Arnold Schoenberg",
            Modern,
            &["Pierrot lunaire", "Verklärte Nacht"],
        ),
        Composer::new("Béla Bartók", Modern, &["Concerto for Orchestra", "Mikrokosmos"]),
        Composer::new(
            "Dmitri Shostakovich",
            Modern,
            &["Leningrad Symphony", "Festive Overture"],
        ),
        Composer::new("Philip Glass", Modern, &["Einstein on the Beach", "Glassworks"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_topic_supports_four_options() {
        let catalog = Catalog::builtin();
        for topic in Topic::ALL {
            assert!(
                catalog.composers(topic).len() >= 4,
                "topic {topic} needs at least four composers"
            );
        }
    }

    #[test]
    fn composer_lookup_is_case_insensitive() {
        let catalog = Catalog::builtin();
        assert!(catalog.is_composer_in(Topic::Baroque, "antonio vivaldi"));
        assert!(!catalog.is_composer_in(Topic::Romantic, "Antonio Vivaldi"));
    }

    #[test]
    fn topic_serializes_lowercase() {
        let json = serde_json::to_string(&Topic::Renaissance).unwrap();
        assert_eq!(json, "\"renaissance\"");
    }
}
