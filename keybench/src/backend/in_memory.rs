//! In-process backend.
//!
//! Records are stored JSON-encoded in a `BTreeMap`, so every operation pays for encoding or
//! decoding the document like a database driver would. This removes the need for a running
//! database when trying out workloads, and serves as the backend for tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use keybench_core::{Generator, IdGenerator};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::Backend;
use crate::record::Person;

type Store = BTreeMap<u64, Vec<u8>>;

/// A [`Backend`] keeping all records in memory.
///
/// The backend is [`Clone`], all clones share the same records.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    store: Arc<Mutex<Store>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `count` random records after the current highest ID.
    pub fn preload(&self, count: u64, padding: usize) {
        let mut rng = SmallRng::seed_from_u64(rand::random());
        let mut person = Person::with_padding(padding);

        let mut store = self.lock();
        let first = store.last_key_value().map_or(1, |(&id, _)| id + 1);
        for id in first..first + count {
            person.randomise(&mut rng);
            person.id = id;
            match serde_json::to_vec(&person) {
                Ok(encoded) => {
                    store.insert(id, encoded);
                }
                Err(error) => {
                    tracing::warn!(error = &error as &dyn std::error::Error, "failed to encode record");
                }
            }
        }
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the backend holds no records.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns a decoded copy of the record with the given ID.
    pub fn get(&self, id: u64) -> Option<Person> {
        let encoded = self.lock().get(&id).cloned()?;
        serde_json::from_slice(&encoded).ok()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode(id: u64, encoded: &[u8]) -> Option<Person> {
    match serde_json::from_slice(encoded) {
        Ok(person) => Some(person),
        Err(error) => {
            tracing::debug!(id, error = &error as &dyn std::error::Error, "failed to decode record");
            None
        }
    }
}

impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn insert_record(&self, record: &mut Person, ids: &mut IdGenerator, rng: &mut SmallRng) -> bool {
        record.randomise(rng);
        record.id = ids.get_new();

        let encoded = match serde_json::to_vec(record) {
            Ok(encoded) => encoded,
            Err(error) => {
                tracing::debug!(error = &error as &dyn std::error::Error, "failed to encode record");
                return false;
            }
        };

        self.lock().insert(record.id, encoded);
        true
    }

    fn update_record(&self, _record: &mut Person, ids: &mut IdGenerator, rng: &mut SmallRng) -> bool {
        let id = ids.get_existing();
        let balance: f32 = rng.random();

        let mut store = self.lock();
        let Some(encoded) = store.get_mut(&id) else {
            tracing::debug!(id, "update of missing record");
            return false;
        };
        let Some(mut person) = decode(id, encoded) else {
            return false;
        };

        person.balance = f64::from(balance);
        match serde_json::to_vec(&person) {
            Ok(updated) => {
                *encoded = updated;
                true
            }
            Err(error) => {
                tracing::debug!(id, error = &error as &dyn std::error::Error, "failed to encode record");
                false
            }
        }
    }

    fn read_record(&self, _record: &mut Person, ids: &mut IdGenerator, _rng: &mut SmallRng) -> bool {
        let id = ids.get_existing();

        let Some(encoded) = self.lock().get(&id).cloned() else {
            tracing::debug!(id, "read of missing record");
            return false;
        };

        decode(id, &encoded).is_some()
    }

    fn read_range(&self, _record: &mut Person, _ids: &mut IdGenerator, _rng: &mut SmallRng) -> bool {
        let store = self.lock();

        // Decode everything, like a driver draining a cursor, and keep the matches.
        let mut matches = 0usize;
        for (&id, encoded) in store.iter() {
            let Some(person) = decode(id, encoded) else {
                return false;
            };
            if person.age > 45 && person.age < 75 {
                matches += 1;
            }
        }

        tracing::trace!(matches, "range read");
        true
    }

    fn read_most_recent(
        &self,
        _record: &mut Person,
        _ids: &mut IdGenerator,
        _rng: &mut SmallRng,
    ) -> bool {
        let Some((id, encoded)) = self
            .lock()
            .last_key_value()
            .map(|(&id, encoded)| (id, encoded.clone()))
        else {
            tracing::debug!("read of most recent record in empty backend");
            return false;
        };

        decode(id, &encoded).is_some()
    }

    fn max_id(&self) -> anyhow::Result<u64> {
        self.lock()
            .last_key_value()
            .map(|(&id, _)| id)
            .context("no existing records")
    }
}
