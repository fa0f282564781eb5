use std::collections::HashMap;

use billbook_core::{Entity, ExpectedVersion};

use super::{StoreError, Versioned};

/// Versioned key/value table for one entity kind.
#[derive(Debug)]
pub(super) struct Table<T: Entity> {
    rows: HashMap<T::Id, Versioned<T>>,
}

impl<T: Entity> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }
}

impl<T> Table<T>
where
    T: Entity + Clone,
{
    pub(super) fn get(&self, id: &T::Id) -> Option<Versioned<T>> {
        self.rows.get(id).cloned()
    }

    pub(super) fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.values().map(|row| &row.value)
    }

    pub(super) fn list(&self) -> Vec<Versioned<T>> {
        self.rows.values().cloned().collect()
    }

    pub(super) fn contains(&self, id: &T::Id) -> bool {
        self.rows.contains_key(id)
    }

    fn version_of(&self, id: &T::Id) -> u64 {
        self.rows.get(id).map(|row| row.version).unwrap_or(0)
    }

    fn check(&self, id: &T::Id, expected: ExpectedVersion) -> Result<u64, StoreError> {
        let actual = self.version_of(id);
        if !expected.matches(actual) {
            return Err(StoreError::Conflict {
                entity: T::kind(),
                id: id.to_string(),
                expected,
                actual,
            });
        }
        Ok(actual)
    }

    /// Insert or replace; the stored version becomes `current + 1`.
    pub(super) fn put(&mut self, value: T, expected: ExpectedVersion) -> Result<(), StoreError> {
        let id = value.id();
        let current = self.check(&id, expected)?;
        self.rows.insert(
            id,
            Versioned {
                value,
                version: current + 1,
            },
        );
        Ok(())
    }

    pub(super) fn remove(&mut self, id: &T::Id, expected: ExpectedVersion) -> Result<T, StoreError> {
        self.check(id, expected)?;
        self.rows
            .remove(id)
            .map(|row| row.value)
            .ok_or_else(|| missing::<T>(id))
    }

    /// Mutate a row in place regardless of its version, bumping it.
    pub(super) fn update<F>(&mut self, id: &T::Id, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut T) -> Result<(), StoreError>,
    {
        let row = self.rows.get_mut(id).ok_or_else(|| missing::<T>(id))?;
        f(&mut row.value)?;
        row.version += 1;
        Ok(())
    }

    /// Put a row back exactly as an earlier [`Table::get`] saw it.
    pub(super) fn restore(&mut self, id: T::Id, row: Option<Versioned<T>>) {
        match row {
            Some(row) => {
                self.rows.insert(id, row);
            }
            None => {
                self.rows.remove(&id);
            }
        }
    }

    pub(super) fn require(&self, id: &T::Id) -> Result<(), StoreError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(missing::<T>(id))
        }
    }
}

fn missing<T: Entity>(id: &T::Id) -> StoreError {
    StoreError::Missing {
        entity: T::kind(),
        id: id.to_string(),
    }
}
