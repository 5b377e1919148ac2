//! Variable name resolution for an interval.
//!
//! Names are resolved once, when the interval is assembled, into a
//! [`VariableRef`]: the Epoch column, a raw table column (with its unit
//! correction already matched against the cadence) or a derived quantity.

use std::collections::BTreeMap;

use crate::cadence::Cadence;
use crate::derived::DerivedKind;
use crate::table::TableSource;

pub const EPOCH: &str = "Epoch";

/// Multiplicative unit correction applied to a raw column on read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitTransform {
    pub variable: &'static str,
    pub cadences: &'static [Cadence],
    pub factor: f64,
    pub description: &'static str,
}

impl UnitTransform {
    pub fn applies_to(&self, cadence: Cadence) -> bool {
        self.cadences.contains(&cadence)
    }

    pub fn apply(&self, values: &mut [f64]) {
        for value in values.iter_mut() {
            *value *= self.factor;
        }
    }
}

/// Hourly OMNI2 stores Kp multiplied by ten.
pub const KP_HOURLY_SCALE: UnitTransform = UnitTransform {
    variable: "KP",
    cadences: &[Cadence::Hourly],
    factor: 0.1,
    description: "Hourly Kp*10 -> Kp",
};

pub const STANDARD_TRANSFORMS: &[UnitTransform] = &[KP_HOURLY_SCALE];

#[derive(Debug, Clone, PartialEq)]
pub enum VariableRef {
    Epoch,
    Raw {
        column: String,
        transform: Option<UnitTransform>,
    },
    Derived(DerivedKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableCatalog {
    cadence: Cadence,
    entries: BTreeMap<String, VariableRef>,
}

impl VariableCatalog {
    /// Registers every column found in any source, the standard unit
    /// transforms, and the derived quantities.
    pub fn build(cadence: Cadence, sources: &[Box<dyn TableSource>]) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(EPOCH.to_string(), VariableRef::Epoch);

        for source in sources {
            for column in source.column_names() {
                entries.entry(column.clone()).or_insert(VariableRef::Raw {
                    column,
                    transform: None,
                });
            }
        }

        for kind in DerivedKind::ALL {
            entries.insert(kind.name().to_string(), VariableRef::Derived(kind));
        }

        let mut catalog = Self { cadence, entries };
        for transform in STANDARD_TRANSFORMS {
            catalog.add_transform(*transform);
        }
        catalog
    }

    /// Attaches `transform` to its raw column when it applies to this
    /// catalog's cadence. Returns whether it was attached.
    pub fn add_transform(&mut self, transform: UnitTransform) -> bool {
        if !transform.applies_to(self.cadence) {
            return false;
        }
        match self.entries.get_mut(transform.variable) {
            Some(VariableRef::Raw { transform: slot, .. }) => {
                *slot = Some(transform);
                true
            }
            _ => false,
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&VariableRef> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }
}
