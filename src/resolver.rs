//! Maps free-text names from spreadsheets onto canonical entities.
//!
//! Resolution is an ordered chain of tiers; the first tier that produces a match wins:
//!
//! 1. [`Tier::Exact`]: the normalized input is a key of the lookup table.
//! 2. [`Tier::RomanTier`] (classes only): the leading grade numeral (`X`, `XI`, `XII`) of the
//!    input matches the numeral a class name starts with.
//! 3. [`Tier::Substring`]: the input contains a key or a key contains the input.
//! 4. [`Tier::TitleStripped`]: input and key are equal once trailing academic titles are
//!    removed from both.
//!
//! Keys are scanned in catalog order, so "first plausible match" is deterministic.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{CanonicalEntity, EntityCatalog};
use crate::normalize::{normalize, strip_titles};

static GRADE_NUMERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(XII|XI|X)\b").expect("numeral pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Exact,
    RomanTier,
    Substring,
    TitleStripped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Teacher,
    Student,
    ClassGroup,
    Subject,
}

impl EntityKind {
    pub fn tiers(self) -> &'static [Tier] {
        match self {
            EntityKind::ClassGroup => &[
                Tier::Exact,
                Tier::RomanTier,
                Tier::Substring,
                Tier::TitleStripped,
            ],
            _ => &[Tier::Exact, Tier::Substring, Tier::TitleStripped],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution<'a> {
    pub entity: &'a CanonicalEntity,
    pub tier: Tier,
}

/// Grade numeral a class label starts with, lower-cased ("XI-A" gives "xi").
pub fn grade_numeral(raw: &str) -> Option<String> {
    GRADE_NUMERAL
        .captures(raw)
        .map(|caps| caps[1].to_lowercase())
}

/// In-memory index over one entity kind, built once per run.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entities: Vec<CanonicalEntity>,
    keys: Vec<(String, usize)>,
    by_key: HashMap<String, usize>,
    by_numeral: HashMap<String, usize>,
}

impl LookupTable {
    pub fn build(entities: &[CanonicalEntity]) -> Self {
        let mut table = LookupTable {
            entities: entities.to_vec(),
            ..Default::default()
        };
        for (idx, entity) in entities.iter().enumerate() {
            let key = normalize(&entity.name);
            if key.is_empty() {
                continue;
            }
            if !table.by_key.contains_key(&key) {
                table.by_key.insert(key.clone(), idx);
                table.keys.push((key, idx));
            }
            if let Some(numeral) = grade_numeral(&entity.name) {
                table.by_numeral.entry(numeral).or_insert(idx);
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn exact(&self, key: &str) -> Option<&CanonicalEntity> {
        self.by_key.get(key).map(|idx| &self.entities[*idx])
    }

    pub fn roman_tier(&self, raw: &str) -> Option<&CanonicalEntity> {
        let numeral = grade_numeral(raw)?;
        self.by_numeral.get(&numeral).map(|idx| &self.entities[*idx])
    }

    /// Bidirectional containment. The contained side must be at least `min_len` characters.
    pub fn substring(&self, key: &str, min_len: usize) -> Option<&CanonicalEntity> {
        let key_len = key.chars().count();
        self.keys
            .iter()
            .find(|(candidate, _)| {
                (candidate.chars().count() >= min_len && key.contains(candidate.as_str()))
                    || (key_len >= min_len && candidate.contains(key))
            })
            .map(|(_, idx)| &self.entities[*idx])
    }

    pub fn title_stripped(&self, key: &str) -> Option<&CanonicalEntity> {
        let stripped = strip_titles(key);
        self.keys
            .iter()
            .find(|(candidate, _)| strip_titles(candidate) == stripped)
            .map(|(_, idx)| &self.entities[*idx])
    }
}

#[derive(Debug, Clone)]
pub struct Resolver {
    table: LookupTable,
    tiers: &'static [Tier],
    min_substring_len: usize,
}

impl Resolver {
    pub fn new(kind: EntityKind, entities: &[CanonicalEntity], min_substring_len: usize) -> Self {
        Resolver {
            table: LookupTable::build(entities),
            tiers: kind.tiers(),
            min_substring_len,
        }
    }

    pub fn table(&self) -> &LookupTable {
        &self.table
    }

    pub fn resolve(&self, raw: &str) -> Option<Resolution<'_>> {
        let key = normalize(raw);
        if key.is_empty() {
            return None;
        }
        self.tiers.iter().find_map(|tier| {
            let entity = match tier {
                Tier::Exact => self.table.exact(&key),
                Tier::RomanTier => self.table.roman_tier(raw),
                Tier::Substring => self.table.substring(&key, self.min_substring_len),
                Tier::TitleStripped => self.table.title_stripped(&key),
            }?;
            Some(Resolution { entity, tier: *tier })
        })
    }
}

/// One resolver per entity kind, built from a catalog snapshot.
#[derive(Debug, Clone)]
pub struct Resolvers {
    pub teachers: Resolver,
    pub students: Resolver,
    pub classes: Resolver,
    pub subjects: Resolver,
}

impl Resolvers {
    pub fn build(catalog: &EntityCatalog, min_substring_len: usize) -> Self {
        Resolvers {
            teachers: Resolver::new(EntityKind::Teacher, &catalog.teachers, min_substring_len),
            students: Resolver::new(EntityKind::Student, &catalog.students, min_substring_len),
            classes: Resolver::new(EntityKind::ClassGroup, &catalog.classes, min_substring_len),
            subjects: Resolver::new(EntityKind::Subject, &catalog.subjects, min_substring_len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: i64, name: &str) -> CanonicalEntity {
        CanonicalEntity {
            id,
            name: name.to_string(),
            class_id: None,
        }
    }

    #[test]
    fn exact_match_wins_first() {
        let resolver = Resolver::new(
            EntityKind::Teacher,
            &[entity(1, "Budi"), entity(2, "Budi Santoso")],
            0,
        );
        let hit = resolver.resolve("  budi   SANTOSO ").unwrap();
        assert_eq!(hit.entity.id, 2);
        assert_eq!(hit.tier, Tier::Exact);
    }

    #[test]
    fn titled_name_resolves_to_the_plain_entry() {
        let resolver = Resolver::new(EntityKind::Teacher, &[entity(1, "Budi Santoso")], 0);
        let hit = resolver.resolve("Budi Santoso, S.Pd").unwrap();
        assert_eq!(hit.entity.id, 1);
        // Substring runs before title stripping and already contains the plain name.
        assert_eq!(hit.tier, Tier::Substring);
        assert_eq!(
            resolver.table().title_stripped("budi santoso, s.pd").unwrap().id,
            1
        );
    }

    #[test]
    fn title_tier_is_reached_when_substring_is_guarded_out() {
        let resolver = Resolver::new(EntityKind::Teacher, &[entity(1, "Budi Santoso, M.Pd")], 64);
        let hit = resolver.resolve("Budi Santoso, S.Pd").unwrap();
        assert_eq!(hit.entity.id, 1);
        assert_eq!(hit.tier, Tier::TitleStripped);
    }

    #[test]
    fn substring_matches_in_both_directions() {
        let resolver = Resolver::new(
            EntityKind::Student,
            &[entity(1, "Ahmad Fauzi Ramadhan"), entity(2, "Nur")],
            0,
        );
        let hit = resolver.resolve("Ahmad Fauzi").unwrap();
        assert_eq!((hit.entity.id, hit.tier), (1, Tier::Substring));
        assert_eq!(resolver.resolve("Siti Nurhaliza").unwrap().entity.id, 2);
    }

    #[test]
    fn short_names_can_be_guarded_against() {
        let resolver = Resolver::new(EntityKind::Student, &[entity(2, "Nur")], 4);
        assert!(resolver.resolve("Siti Nurhaliza").is_none());
        assert_eq!(resolver.resolve("nur").unwrap().entity.id, 2);
    }

    #[test]
    fn unknown_and_blank_names_are_not_found() {
        let resolver = Resolver::new(EntityKind::Teacher, &[entity(1, "Budi Santoso")], 0);
        assert!(resolver.resolve("Rina Wulandari").is_none());
        assert!(resolver.resolve("   ").is_none());
    }

    #[test]
    fn class_labels_resolve_by_grade_numeral() {
        let classes = [
            entity(43, "X ( Sepuluh )"),
            entity(44, "XI ( Sebelas )"),
            entity(45, "XII ( Duabelas )"),
        ];
        let resolver = Resolver::new(EntityKind::ClassGroup, &classes, 0);

        let hit = resolver.resolve("X (Sepuluh)").unwrap();
        assert_eq!((hit.entity.id, hit.tier), (43, Tier::RomanTier));
        assert_eq!(resolver.resolve("XI").unwrap().entity.id, 44);
        assert_eq!(resolver.resolve("xii").unwrap().entity.id, 45);
        assert_eq!(resolver.resolve("XII ( Duabelas )").unwrap().tier, Tier::Exact);
    }

    #[test]
    fn numeral_extraction_requires_a_word_boundary() {
        assert_eq!(grade_numeral("XI-A").as_deref(), Some("xi"));
        assert_eq!(grade_numeral(" x (sepuluh)").as_deref(), Some("x"));
        assert_eq!(grade_numeral("Xavier"), None);
        assert_eq!(grade_numeral("IX"), None);
    }
}
