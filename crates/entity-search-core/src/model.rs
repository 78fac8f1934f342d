//! The external graph data model, consumed per spec §6: a schema hierarchy
//! with abstract/concrete nodes, typed properties, and property-value groups.
//!
//! This crate treats the schema registry and entity object model as an
//! external collaborator (spec §1 Non-goals) but still has to define the
//! *shape* it is consumed through, and — since nothing else in this workspace
//! provides one — a concrete in-memory registry good enough to build and test
//! the rest of the subsystem against. Grounded on
//! `mcp-agent-mail-search-core/src/document.rs` (plain value types, no
//! framework magic) and `original_source/openaleph_search/model.py` /
//! `mapping.py` (the closed property-type registry and its groups).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// The closed registry of FollowTheMoney-style property types (spec §3).
///
/// A subset are "group types": every property of that type additionally
/// contributes its values to a shared field named by [`PropertyType::group_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Text,
    Html,
    Json,
    Date,
    Number,
    Name,
    Country,
    Email,
    Phone,
    Url,
    Ip,
    Identifier,
    Checksum,
    Address,
    Mimetype,
    Language,
    Entity,
}

impl PropertyType {
    /// The group field this type's values additionally fan out into via
    /// `copy_to`, or `None` for non-group types (`string`, `text`, `html`,
    /// `json`, `number`).
    #[must_use]
    pub const fn group_field(self) -> Option<&'static str> {
        match self {
            Self::Entity => Some("entities"),
            Self::Language => Some("languages"),
            Self::Country => Some("countries"),
            Self::Checksum => Some("checksums"),
            Self::Ip => Some("ips"),
            Self::Url => Some("urls"),
            Self::Email => Some("emails"),
            Self::Phone => Some("phones"),
            Self::Mimetype => Some("mimetypes"),
            Self::Identifier => Some("identifiers"),
            Self::Date => Some("dates"),
            Self::Address => Some("addresses"),
            Self::Name => Some("names"),
            Self::String | Self::Text | Self::Html | Self::Json | Self::Number => None,
        }
    }

    /// Whether this type is numeric for the purposes of `numeric.<name>`
    /// casting (spec §3 invariants): `number` and `date`.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Date)
    }

    /// "Strong identifier" groups used as Matcher blocking signals (spec
    /// §4.8): `identifier`, `email`, `phone`, `checksum`.
    #[must_use]
    pub const fn is_strong_identifier(self) -> bool {
        matches!(
            self,
            Self::Identifier | Self::Email | Self::Phone | Self::Checksum
        )
    }
}

/// A single property declared by a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: PropertyType,
}

/// A node in the schema hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub abstract_: bool,
    /// Direct parent schema names (usually one; FtM schemata are mostly
    /// single-inheritance with occasional mixins).
    pub extends: Vec<String>,
    /// Whether this schema is ever a valid Matcher candidate. `Document`,
    /// `Pages`, and `Page` are not (spec §8 scenario 5: "NOT the Page
    /// (non-matchable schema)").
    pub matchable: bool,
    /// Property names, in priority order, whose values stand in as the
    /// entity's display name (spec glossary: "Caption property").
    pub caption: Vec<String>,
    pub properties: BTreeMap<String, Property>,
}

impl Schema {
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }
}

/// The schema registry, consumed as `schemata[name] -> Schema` per spec §6.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemata: BTreeMap<String, Schema>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            schemata: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, schema: Schema) {
        self.schemata.insert(schema.name.clone(), schema);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemata.get(name)
    }

    /// Every schema name currently registered, in registry order.
    #[must_use]
    pub fn names_all(&self) -> Vec<String> {
        self.schemata.keys().cloned().collect()
    }

    pub fn require(&self, name: &str) -> CoreResult<&Schema> {
        self.get(name)
            .ok_or_else(|| CoreError::UnknownSchema(name.to_string()))
    }

    /// `Schema.names` — the full ancestor chain including `schema` itself,
    /// deduplicated, in breadth-first order from most specific to least.
    #[must_use]
    pub fn names(&self, schema: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        let mut frontier = vec![schema.to_string()];
        while let Some(name) = frontier.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            ordered.push(name.clone());
            if let Some(s) = self.get(&name) {
                frontier.extend(s.extends.iter().cloned());
            }
        }
        ordered
    }

    /// `Schema.is_a(ancestor)`.
    #[must_use]
    pub fn is_a(&self, schema: &str, ancestor: &str) -> bool {
        self.names(schema).iter().any(|n| n == ancestor)
    }

    /// The full, inheritance-flattened property set for `schema`: every
    /// property declared anywhere in its ancestor chain, keyed by name
    /// (FollowTheMoney-style schemata accumulate properties through
    /// inheritance rather than redeclaring them).
    #[must_use]
    pub fn effective_properties(&self, schema: &str) -> BTreeMap<String, Property> {
        let mut props = BTreeMap::new();
        for ancestor in self.names(schema) {
            if let Some(s) = self.get(&ancestor) {
                for (name, prop) in &s.properties {
                    props.entry(name.clone()).or_insert_with(|| prop.clone());
                }
            }
        }
        props
    }

    /// `Schema.descendants` — every schema in the registry whose ancestor
    /// chain includes `schema`, excluding `schema` itself.
    #[must_use]
    pub fn descendants(&self, schema: &str) -> Vec<String> {
        self.schemata
            .keys()
            .filter(|name| name.as_str() != schema && self.is_a(name, schema))
            .cloned()
            .collect()
    }

    /// `Schema.matchable_schemata` (spec §4.8 blocking filter, §1 Matcher).
    ///
    /// A matchable schema only matches within its own "family": `Person`
    /// never matches `Organization`/`Company`, but all matchable
    /// non-`Person` `LegalEntity` descendants match each other. See
    /// DESIGN.md for why this mirrors the upstream FollowTheMoney behavior.
    #[must_use]
    pub fn matchable_schemata(&self, schema: &str) -> Vec<String> {
        let Some(s) = self.get(schema) else {
            return Vec::new();
        };
        if !s.matchable {
            return Vec::new();
        }
        let is_person = self.is_a(schema, "Person");
        self.schemata
            .values()
            .filter(|other| {
                other.matchable
                    && (self.is_a(&other.name, "Person") == is_person)
                    && (is_person || self.is_a(&other.name, "LegalEntity") == self.is_a(schema, "LegalEntity"))
            })
            .map(|s| s.name.clone())
            .collect()
    }

    /// Builds the bundled starter hierarchy named throughout spec.md:
    /// `Thing`, `Document`, `Pages`, `Page`, `Interval`, `Address`,
    /// `LegalEntity`, `Person`, `Organization`, `Company`, `Event`.
    #[must_use]
    pub fn bundled() -> Self {
        let mut reg = Self::new();
        let p = |name: &str, ty: PropertyType| Property {
            name: name.to_string(),
            type_: ty,
        };

        reg.insert(Schema {
            name: "Thing".into(),
            abstract_: true,
            extends: vec![],
            matchable: false,
            caption: vec!["name".into()],
            properties: BTreeMap::from([
                ("name".into(), p("name", PropertyType::Name)),
                ("alias".into(), p("alias", PropertyType::Name)),
                ("country".into(), p("country", PropertyType::Country)),
                ("indexText".into(), p("indexText", PropertyType::Text)),
                ("createdAt".into(), p("createdAt", PropertyType::Date)),
                ("modifiedAt".into(), p("modifiedAt", PropertyType::Date)),
            ]),
        });

        reg.insert(Schema {
            name: "Interval".into(),
            abstract_: true,
            extends: vec!["Thing".into()],
            matchable: false,
            caption: vec!["name".into()],
            properties: BTreeMap::from([
                ("startDate".into(), p("startDate", PropertyType::Date)),
                ("endDate".into(), p("endDate", PropertyType::Date)),
            ]),
        });

        reg.insert(Schema {
            name: "Event".into(),
            abstract_: false,
            extends: vec!["Interval".into()],
            matchable: false,
            caption: vec!["name".into()],
            properties: BTreeMap::new(),
        });

        reg.insert(Schema {
            name: "Address".into(),
            abstract_: false,
            extends: vec!["Thing".into()],
            matchable: false,
            caption: vec!["full".into()],
            properties: BTreeMap::from([
                ("full".into(), p("full", PropertyType::String)),
                ("latitude".into(), p("latitude", PropertyType::Number)),
                ("longitude".into(), p("longitude", PropertyType::Number)),
            ]),
        });

        reg.insert(Schema {
            name: "Document".into(),
            abstract_: false,
            extends: vec!["Thing".into()],
            matchable: false,
            caption: vec!["fileName".into(), "title".into()],
            properties: BTreeMap::from([
                ("fileName".into(), p("fileName", PropertyType::String)),
                ("title".into(), p("title", PropertyType::String)),
                (
                    "peopleMentioned".into(),
                    p("peopleMentioned", PropertyType::Name),
                ),
                ("bodyText".into(), p("bodyText", PropertyType::Html)),
            ]),
        });

        reg.insert(Schema {
            name: "Pages".into(),
            abstract_: false,
            extends: vec!["Document".into()],
            matchable: false,
            caption: vec!["fileName".into(), "title".into()],
            properties: BTreeMap::new(),
        });

        reg.insert(Schema {
            name: "Page".into(),
            abstract_: false,
            extends: vec!["Document".into()],
            matchable: false,
            caption: vec!["title".into()],
            properties: BTreeMap::new(),
        });

        reg.insert(Schema {
            name: "LegalEntity".into(),
            abstract_: true,
            extends: vec!["Thing".into()],
            matchable: true,
            caption: vec!["name".into()],
            properties: BTreeMap::from([
                ("email".into(), p("email", PropertyType::Email)),
                ("phone".into(), p("phone", PropertyType::Phone)),
                (
                    "idNumber".into(),
                    p("idNumber", PropertyType::Identifier),
                ),
            ]),
        });

        reg.insert(Schema {
            name: "Person".into(),
            abstract_: false,
            extends: vec!["LegalEntity".into()],
            matchable: true,
            caption: vec!["name".into()],
            properties: BTreeMap::from([(
                "citizenship".into(),
                p("citizenship", PropertyType::Country),
            ), (
                "topics".into(),
                p("topics", PropertyType::String),
            )]),
        });

        reg.insert(Schema {
            name: "Organization".into(),
            abstract_: false,
            extends: vec!["LegalEntity".into()],
            matchable: true,
            caption: vec!["name".into()],
            properties: BTreeMap::new(),
        });

        reg.insert(Schema {
            name: "Company".into(),
            abstract_: false,
            extends: vec!["Organization".into()],
            matchable: true,
            caption: vec!["name".into()],
            properties: BTreeMap::new(),
        });

        reg
    }
}

/// Context carried alongside an entity's schema/properties (spec §3):
/// role/profile attribution, mutability, provenance, and the observed
/// creation/update timestamps the Transformer reduces to `min`/`max`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityContext {
    #[serde(default)]
    pub role_id: Vec<String>,
    #[serde(default)]
    pub profile_id: Vec<String>,
    #[serde(default)]
    pub mutable: bool,
    #[serde(default)]
    pub created_at: Vec<String>,
    #[serde(default)]
    pub updated_at: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub origin: Vec<String>,
}

/// An immutable entity value (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub schema: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub context: EntityContext,
}

impl Entity {
    #[must_use]
    pub fn get(&self, property: &str) -> &[String] {
        self.properties
            .get(property)
            .map_or(&[], |v| v.as_slice())
    }

    #[must_use]
    pub fn first(&self, property: &str) -> Option<&str> {
        self.get(property).first().map(String::as_str)
    }

    /// The union of values for every property of type `name` declared
    /// anywhere in the entity's schema ancestry (the entity's "names
    /// iterator", spec §6).
    #[must_use]
    pub fn names(&self, registry: &SchemaRegistry) -> Vec<String> {
        let mut out = Vec::new();
        for prop in registry.effective_properties(&self.schema).values() {
            if prop.type_ == PropertyType::Name {
                out.extend(self.get(&prop.name).iter().cloned());
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// `entity.caption` — first non-empty value among `schema.caption`
    /// properties, in priority order.
    #[must_use]
    pub fn caption(&self, schema: &Schema) -> Option<String> {
        for prop in &schema.caption {
            if let Some(v) = self.first(prop) {
                return Some(v.to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_chain_includes_self_and_root() {
        let reg = SchemaRegistry::bundled();
        let names = reg.names("Person");
        assert!(names.contains(&"Person".to_string()));
        assert!(names.contains(&"LegalEntity".to_string()));
        assert!(names.contains(&"Thing".to_string()));
    }

    #[test]
    fn is_a_reflexive_and_transitive() {
        let reg = SchemaRegistry::bundled();
        assert!(reg.is_a("Company", "Thing"));
        assert!(reg.is_a("Company", "Organization"));
        assert!(reg.is_a("Company", "Company"));
        assert!(!reg.is_a("Person", "Organization"));
    }

    #[test]
    fn descendants_excludes_self() {
        let reg = SchemaRegistry::bundled();
        let desc = reg.descendants("LegalEntity");
        assert!(desc.contains(&"Person".to_string()));
        assert!(desc.contains(&"Company".to_string()));
        assert!(!desc.contains(&"LegalEntity".to_string()));
    }

    #[test]
    fn matchable_schemata_excludes_person_from_legal_entity_family() {
        let reg = SchemaRegistry::bundled();
        let m = reg.matchable_schemata("Person");
        assert!(m.contains(&"Person".to_string()));
        assert!(!m.contains(&"Organization".to_string()));
        assert!(!m.contains(&"Company".to_string()));

        let m2 = reg.matchable_schemata("Company");
        assert!(m2.contains(&"Organization".to_string()));
        assert!(m2.contains(&"Company".to_string()));
        assert!(!m2.contains(&"Person".to_string()));
    }

    #[test]
    fn non_matchable_schema_has_empty_matchable_schemata() {
        let reg = SchemaRegistry::bundled();
        assert!(reg.matchable_schemata("Page").is_empty());
    }

    #[test]
    fn group_field_mapping_matches_spec_groups() {
        assert_eq!(PropertyType::Country.group_field(), Some("countries"));
        assert_eq!(PropertyType::Date.group_field(), Some("dates"));
        assert_eq!(PropertyType::Name.group_field(), Some("names"));
        assert_eq!(PropertyType::Number.group_field(), None);
        assert_eq!(PropertyType::Text.group_field(), None);
    }

    #[test]
    fn effective_properties_includes_inherited_fields() {
        let reg = SchemaRegistry::bundled();
        let props = reg.effective_properties("Person");
        assert!(props.contains_key("name"));
        assert!(props.contains_key("country"));
        assert!(props.contains_key("email"));
        assert!(props.contains_key("citizenship"));
    }

    #[test]
    fn entity_names_collects_inherited_name_properties() {
        let reg = SchemaRegistry::bundled();
        let entity = Entity {
            id: "e1".into(),
            schema: "Person".into(),
            properties: BTreeMap::from([
                ("name".into(), vec!["Jane Doe".into()]),
                ("alias".into(), vec!["J. Doe".into()]),
            ]),
            context: EntityContext::default(),
        };
        let names = entity.names(&reg);
        assert!(names.contains(&"Jane Doe".to_string()));
        assert!(names.contains(&"J. Doe".to_string()));
    }
}
