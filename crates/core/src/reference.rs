//! Pointer-by-identity to another persisted entity.

use serde::{Deserialize, Serialize};

use crate::id::{ClassName, RecordId};

/// `(class, id)` pair stored in place of a referenced entity.
///
/// Equal iff class and id match. A reference never owns the entity it points
/// to; resolving it is a lookup through the mapper registered for `class`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    class: ClassName,
    id: RecordId,
}

impl Reference {
    pub fn new(class: impl Into<ClassName>, id: impl Into<RecordId>) -> Self {
        Self {
            class: class.into(),
            id: id.into(),
        }
    }

    pub fn class(&self) -> &ClassName {
        &self.class
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn into_parts(self) -> (ClassName, RecordId) {
        (self.class, self.id)
    }
}

impl core::fmt::Display for Reference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.class, self.id)
    }
}
