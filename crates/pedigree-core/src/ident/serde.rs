//! Canonical (de)serialisation for identity DAGs.
//!
//! The wire form is the *sorted expansion*: a sequence of lineages, each a
//! sequence of groups, each a sequence of identifiers. Sharing is a
//! storage concern, not a semantic one, so it is not serialised;
//! deserialisation rebuilds it by contraction. Equal values therefore
//! always serialise identically.
//!
//! Groups and lineages are non-empty by the data model, and the wire form
//! enforces that: input containing an empty group or an empty lineage is
//! rejected with a deserialisation error rather than silently dropped.

use std::hash::Hash;

use serde::de::{Deserialize, Deserializer, Error};
use serde::ser::{Serialize, Serializer};

use super::{Identities, Lineage};

impl<V> Serialize for Identities<V>
where
    V: Clone + Ord + Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let lineages: Vec<Lineage<V>> = self.expanded_set().into_iter().collect();
        lineages.serialize(serializer)
    }
}

impl<'de, V> Deserialize<'de> for Identities<V>
where
    V: Clone + Ord + Hash + Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let lineages = Vec::<Lineage<V>>::deserialize(deserializer)?;
        for lineage in &lineages {
            if lineage.is_empty() {
                return Err(D::Error::custom("identity lineage must not be empty"));
            }
            if lineage.iter().any(Vec::is_empty) {
                return Err(D::Error::custom("identity group must not be empty"));
            }
        }
        Ok(Self::contracted(lineages))
    }
}
