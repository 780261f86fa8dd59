//! Relation macros and their static capabilities.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, RelationError, RelationErrorKind};

/// The tag identifying a relation's family, cardinality and key location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationMacro {
    EmbedsOne,
    EmbedsMany,
    EmbeddedIn,
    ReferencesOne,
    ReferencesMany,
    /// `references_many` whose ids are stored as an array on the owner
    ReferencesManyAsArray,
    ReferencedIn,
    ReferencedInFromArray,
    ReferencesAndReferencedInMany,
}

/// What a relation macro can do, known without any relation instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Reflection name, e.g. `references_many`
    pub name: &'static str,
    /// Stored inside the owner's record
    pub embedded: bool,
    /// Target is a sequence
    pub many: bool,
    /// `_id` or `_ids`; embedded relations have no foreign key
    pub foreign_key_suffix: Option<&'static str>,
    /// The declaring class stores the foreign key on its own documents
    pub stores_foreign_key: bool,
    /// A proxy and builder exist for the macro
    pub supported: bool,
}

const fn caps(
    name: &'static str,
    embedded: bool,
    many: bool,
    foreign_key_suffix: Option<&'static str>,
    stores_foreign_key: bool,
    supported: bool,
) -> Capabilities {
    Capabilities {
        name,
        embedded,
        many,
        foreign_key_suffix,
        stores_foreign_key,
        supported,
    }
}

// Indexed by `RelationMacro as usize`.
static CAPABILITIES: [Capabilities; 9] = [
    caps("embeds_one", true, false, None, false, true),
    caps("embeds_many", true, true, None, false, true),
    caps("embedded_in", true, false, None, false, true),
    caps("references_one", false, false, Some("_id"), false, true),
    caps("references_many", false, true, Some("_id"), false, true),
    caps("references_many_as_array", false, true, Some("_ids"), true, true),
    caps("referenced_in", false, false, Some("_id"), true, true),
    caps("referenced_in_from_array", false, false, Some("_ids"), false, false),
    caps(
        "references_and_referenced_in_many",
        false,
        true,
        Some("_ids"),
        true,
        false,
    ),
];

impl RelationMacro {
    pub const ALL: [RelationMacro; 9] = [
        RelationMacro::EmbedsOne,
        RelationMacro::EmbedsMany,
        RelationMacro::EmbeddedIn,
        RelationMacro::ReferencesOne,
        RelationMacro::ReferencesMany,
        RelationMacro::ReferencesManyAsArray,
        RelationMacro::ReferencedIn,
        RelationMacro::ReferencedInFromArray,
        RelationMacro::ReferencesAndReferencedInMany,
    ];

    pub fn capabilities(self) -> &'static Capabilities {
        &CAPABILITIES[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.capabilities().name
    }

    pub fn is_embedded(self) -> bool {
        self.capabilities().embedded
    }

    pub fn is_many(self) -> bool {
        self.capabilities().many
    }

    pub fn foreign_key_suffix(self) -> Option<&'static str> {
        self.capabilities().foreign_key_suffix
    }

    pub fn stores_foreign_key(self) -> bool {
        self.capabilities().stores_foreign_key
    }

    pub fn is_supported(self) -> bool {
        self.capabilities().supported
    }

    /// The declaring side owns the target: disowning a target of a persisted
    /// owner deletes it.
    pub const fn is_owning(self) -> bool {
        matches!(
            self,
            RelationMacro::EmbedsOne
                | RelationMacro::EmbedsMany
                | RelationMacro::ReferencesOne
                | RelationMacro::ReferencesMany
                | RelationMacro::ReferencesManyAsArray
        )
    }

    /// Macros that can declare the other side of this relation.
    pub const fn inverse_macros(self) -> &'static [RelationMacro] {
        match self {
            RelationMacro::EmbedsOne | RelationMacro::EmbedsMany => &[RelationMacro::EmbeddedIn],
            RelationMacro::EmbeddedIn => &[RelationMacro::EmbedsOne, RelationMacro::EmbedsMany],
            RelationMacro::ReferencesOne | RelationMacro::ReferencesMany => {
                &[RelationMacro::ReferencedIn]
            }
            RelationMacro::ReferencedIn => {
                &[RelationMacro::ReferencesOne, RelationMacro::ReferencesMany]
            }
            RelationMacro::ReferencesManyAsArray => &[RelationMacro::ReferencedInFromArray],
            RelationMacro::ReferencedInFromArray => &[RelationMacro::ReferencesManyAsArray],
            RelationMacro::ReferencesAndReferencedInMany => {
                &[RelationMacro::ReferencesAndReferencedInMany]
            }
        }
    }
}

impl fmt::Display for RelationMacro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationMacro {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationMacro::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                Error::Relation(RelationError::new(
                    RelationErrorKind::Unsupported,
                    format!("unknown relation macro '{s}'"),
                ))
            })
    }
}
