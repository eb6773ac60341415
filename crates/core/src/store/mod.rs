//! Persistence seam.
//!
//! Services never touch storage directly. They borrow [`Records`] through an [`EmrStore`]:
//! `read` for queries, `transaction` for writes. A transaction runs against a working copy and is
//! committed only when the closure returns `Ok`, so a failed operation leaves no partial writes.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::{EmrError, EmrResult};
use crate::model::{
    Bed, BedAssignment, Concept, Condition, Diagnosis, Drug, Encounter, EncounterType, Entity,
    Location, Obs, Order, OrderFrequency, OrderGroup, OrderSet, Patient, Provider, Visit,
    VisitType,
};
use emr_uuid::EmrUuid;
use std::collections::{BTreeMap, BTreeSet};

/// One entity collection, keyed by uuid.
///
/// Tracks which rows were inserted or borrowed mutably so the file store can write only those.
#[derive(Clone, Debug)]
pub struct Table<T> {
    rows: BTreeMap<EmrUuid, T>,
    dirty: BTreeSet<EmrUuid>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }
}

impl<T: Entity> Table<T> {
    pub fn get(&self, uuid: &EmrUuid) -> Option<&T> {
        self.rows.get(uuid)
    }

    /// # Errors
    ///
    /// Returns [`EmrError::NotFound`] naming the entity kind.
    pub fn require(&self, uuid: &EmrUuid) -> EmrResult<&T> {
        self.rows
            .get(uuid)
            .ok_or_else(|| EmrError::not_found(T::LABEL, uuid))
    }

    pub fn require_mut(&mut self, uuid: &EmrUuid) -> EmrResult<&mut T> {
        let row = self
            .rows
            .get_mut(uuid)
            .ok_or_else(|| EmrError::not_found(T::LABEL, uuid))?;
        self.dirty.insert(*uuid);
        Ok(row)
    }

    /// Inserts or replaces a row.
    pub fn insert(&mut self, row: T) {
        let uuid = row.uuid();
        self.dirty.insert(uuid);
        self.rows.insert(uuid, row);
    }

    pub fn contains(&self, uuid: &EmrUuid) -> bool {
        self.rows.contains_key(uuid)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows touched since the last commit.
    pub fn dirty(&self) -> impl Iterator<Item = &T> {
        self.dirty.iter().filter_map(|uuid| self.rows.get(uuid))
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Loads a row without marking it dirty.
    pub(crate) fn load(&mut self, row: T) {
        self.rows.insert(row.uuid(), row);
    }
}

/// Callback over every table of [`Records`].
pub(crate) trait TableVisitor {
    fn visit<T: Entity>(&mut self, table: &mut Table<T>) -> EmrResult<()>;
}

/// Everything the EMR knows: reference data and clinical records.
#[derive(Clone, Debug, Default)]
pub struct Records {
    pub concepts: Table<Concept>,
    pub drugs: Table<Drug>,
    pub order_frequencies: Table<OrderFrequency>,
    pub order_sets: Table<OrderSet>,
    pub providers: Table<Provider>,
    pub locations: Table<Location>,
    pub encounter_types: Table<EncounterType>,
    pub visit_types: Table<VisitType>,
    pub patients: Table<Patient>,
    pub visits: Table<Visit>,
    pub encounters: Table<Encounter>,
    pub obs: Table<Obs>,
    pub orders: Table<Order>,
    pub order_groups: Table<OrderGroup>,
    pub conditions: Table<Condition>,
    pub diagnoses: Table<Diagnosis>,
    pub beds: Table<Bed>,
    pub bed_assignments: Table<BedAssignment>,
}

impl Records {
    pub(crate) fn visit_tables<V: TableVisitor>(&mut self, visitor: &mut V) -> EmrResult<()> {
        visitor.visit(&mut self.concepts)?;
        visitor.visit(&mut self.drugs)?;
        visitor.visit(&mut self.order_frequencies)?;
        visitor.visit(&mut self.order_sets)?;
        visitor.visit(&mut self.providers)?;
        visitor.visit(&mut self.locations)?;
        visitor.visit(&mut self.encounter_types)?;
        visitor.visit(&mut self.visit_types)?;
        visitor.visit(&mut self.patients)?;
        visitor.visit(&mut self.visits)?;
        visitor.visit(&mut self.encounters)?;
        visitor.visit(&mut self.obs)?;
        visitor.visit(&mut self.orders)?;
        visitor.visit(&mut self.order_groups)?;
        visitor.visit(&mut self.conditions)?;
        visitor.visit(&mut self.diagnoses)?;
        visitor.visit(&mut self.beds)?;
        visitor.visit(&mut self.bed_assignments)
    }

    pub(crate) fn clear_dirty(&mut self) {
        struct Clear;
        impl TableVisitor for Clear {
            fn visit<T: Entity>(&mut self, table: &mut Table<T>) -> EmrResult<()> {
                table.clear_dirty();
                Ok(())
            }
        }
        // Clear never fails.
        let _ = self.visit_tables(&mut Clear);
    }

    /// Finds a non-retired concept by case-insensitive name.
    pub fn concept_by_name(&self, name: &str) -> Option<&Concept> {
        self.concepts
            .values()
            .find(|c| !c.retired && c.is_named(name))
    }

    /// Resolves a concept given either its uuid or its name.
    pub fn resolve_concept(&self, reference: &str) -> Option<&Concept> {
        match EmrUuid::parse(reference) {
            Ok(uuid) => self.concepts.get(&uuid),
            Err(_) => self.concept_by_name(reference),
        }
    }
}

/// Storage backend for [`Records`].
pub trait EmrStore: Send + Sync {
    /// Runs a query against committed state.
    fn read<T, F>(&self, f: F) -> EmrResult<T>
    where
        F: FnOnce(&Records) -> EmrResult<T>;

    /// Runs `f` against a working copy and commits it when `f` returns `Ok`.
    fn transaction<T, F>(&self, f: F) -> EmrResult<T>
    where
        F: FnOnce(&mut Records) -> EmrResult<T>;
}

/// The store selected at startup.
#[derive(Debug)]
pub enum AnyStore {
    Memory(MemoryStore),
    File(FileStore),
}

impl EmrStore for AnyStore {
    fn read<T, F>(&self, f: F) -> EmrResult<T>
    where
        F: FnOnce(&Records) -> EmrResult<T>,
    {
        match self {
            AnyStore::Memory(store) => store.read(f),
            AnyStore::File(store) => store.read(f),
        }
    }

    fn transaction<T, F>(&self, f: F) -> EmrResult<T>
    where
        F: FnOnce(&mut Records) -> EmrResult<T>,
    {
        match self {
            AnyStore::Memory(store) => store.transaction(f),
            AnyStore::File(store) => store.transaction(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BedStatus, ConceptDatatype};
    use crate::NonEmptyText;

    fn concept(name: &str) -> Concept {
        Concept {
            uuid: EmrUuid::new(),
            name: NonEmptyText::new(name).unwrap(),
            datatype: ConceptDatatype::NotApplicable,
            concept_class: "Misc".into(),
            is_set: false,
            set_members: vec![],
            answers: vec![],
            units: None,
            retired: false,
        }
    }

    #[test]
    fn require_reports_entity_label() {
        let table: Table<Bed> = Table::default();
        let uuid = EmrUuid::new();
        let err = table.require(&uuid).unwrap_err();
        assert!(matches!(err, EmrError::NotFound { kind: "bed", .. }));
    }

    #[test]
    fn mutable_access_marks_rows_dirty() {
        let mut table: Table<Bed> = Table::default();
        let bed = Bed {
            uuid: EmrUuid::new(),
            bed_number: "A1".into(),
            ward: EmrUuid::new(),
            status: BedStatus::Available,
        };
        table.load(bed.clone());
        assert_eq!(table.dirty().count(), 0);

        table.require_mut(&bed.uuid).unwrap().status = BedStatus::Occupied;
        assert_eq!(table.dirty().count(), 1);
        table.clear_dirty();
        assert_eq!(table.dirty().count(), 0);
    }

    #[test]
    fn resolve_concept_accepts_uuid_or_name() {
        let mut records = Records::default();
        let mg = concept("mg");
        records.concepts.insert(mg.clone());
        assert_eq!(
            records.resolve_concept(&mg.uuid.to_string()).map(|c| c.uuid),
            Some(mg.uuid)
        );
        assert_eq!(records.resolve_concept("MG").map(|c| c.uuid), Some(mg.uuid));
        assert!(records.resolve_concept("tablet").is_none());
    }
}
