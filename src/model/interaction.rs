//! Interactions: reflections, diffractions, penetrations along a ray.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use super::{PathId, Point3};

/// Interaction type code (`interaction.interaction_type_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionKind(pub i64);

impl InteractionKind {
    /// Human description from the `interaction_type` table, if known.
    pub fn describe<'a>(&self, types: &'a InteractionTypes) -> Option<&'a str> {
        types.get(*self)
    }
}

/// Code → description dictionary loaded from `interaction_type`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionTypes {
    names: HashMap<i64, String>,
}

impl InteractionTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: InteractionKind, description: impl Into<String>) {
        self.names.insert(kind.0, description.into());
    }

    pub fn get(&self, kind: InteractionKind) -> Option<&str> {
        self.names.get(&kind.0).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(i64, String)> for InteractionTypes {
    fn from_iter<I: IntoIterator<Item = (i64, String)>>(iter: I) -> Self {
        Self { names: iter.into_iter().collect() }
    }
}

/// One physical event along a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub coords: Point3,
    pub kind: InteractionKind,
    /// Owning path.
    pub path: PathId,
}

/// An entry in a path's interaction list.
///
/// With storage disabled the loader still counts interactions (so LOS/NLOS
/// classification keeps working) but drops their coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InteractionSlot {
    Recorded(Interaction),
    CountedOnly,
}

impl InteractionSlot {
    pub fn recorded(&self) -> Option<&Interaction> {
        match self {
            InteractionSlot::Recorded(i) => Some(i),
            InteractionSlot::CountedOnly => None,
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, InteractionSlot::Recorded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let types: InteractionTypes = vec![
            (1, "reflection".to_string()),
            (2, "diffraction".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(InteractionKind(1).describe(&types), Some("reflection"));
        assert_eq!(InteractionKind(9).describe(&types), None);
        assert_eq!(types.len(), 2);
    }

    #[test]
    fn test_slot_accessors() {
        let rec = InteractionSlot::Recorded(Interaction {
            coords: Point3::new(1.0, 2.0, 3.0),
            kind: InteractionKind(1),
            path: PathId(4),
        });
        assert!(rec.is_recorded());
        assert_eq!(rec.recorded().map(|i| i.path), Some(PathId(4)));
        assert!(InteractionSlot::CountedOnly.recorded().is_none());
    }
}
