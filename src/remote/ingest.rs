// SPDX-License-Identifier: MIT OR Apache-2.0

//! At-most-once ingestion into the remote collection.
//!
//! The collection is always observed, never remembered: every decision starts
//! from a fresh probe, and the state reported after an import is whatever the
//! store says once the writes are done. A failed import is discarded by
//! recreating the collection, so no run ever sees a half-imported corpus as
//! populated.

use anyhow::{Error, Result};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use super::client::{CollectionSchema, VectorStore};
use crate::corpus::Corpus;
use crate::errors::ModsimError;

/// Objects per import request.
pub const DEFAULT_INGEST_BATCH_SIZE: usize = 100;

/// Observed state of the target collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionState {
    Absent,
    EmptyExists,
    Populated,
}

impl fmt::Display for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CollectionState::Absent => "absent",
            CollectionState::EmptyExists => "empty",
            CollectionState::Populated => "populated",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The collection already held data; nothing was written.
    Skipped,
    /// `count` modules were written.
    Imported { count: usize },
}

pub struct IngestionController<'a, S: VectorStore + ?Sized> {
    store: &'a S,
    schema: CollectionSchema,
    batch_size: usize,
}

impl<'a, S: VectorStore + ?Sized> IngestionController<'a, S> {
    pub fn new(store: &'a S, schema: CollectionSchema) -> Self {
        Self {
            store,
            schema,
            batch_size: DEFAULT_INGEST_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Asks the store which state the collection is in.
    pub fn probe(&self) -> Result<CollectionState> {
        let exists = self
            .store
            .collection_exists()
            .map_err(|err| setup_error("existence probe", err))?;
        if !exists {
            return Ok(CollectionState::Absent);
        }

        let sample = self
            .store
            .fetch_objects(1)
            .map_err(|err| setup_error("object probe", err))?;
        Ok(if sample.is_empty() {
            CollectionState::EmptyExists
        } else {
            CollectionState::Populated
        })
    }

    /// Makes sure the collection exists with the module schema.
    ///
    /// A populated collection is left alone unless `reset` is set, in which
    /// case any existing collection is dropped and recreated empty.
    pub fn ensure_schema(&self, reset: bool) -> Result<CollectionState> {
        let state = self.probe()?;
        debug!(
            "Collection {} is {} before setup",
            self.store.collection(),
            state
        );

        let result = match (state, reset) {
            (CollectionState::Absent, _) => self.create(),
            (_, true) => {
                info!("Resetting collection {}", self.store.collection());
                self.store
                    .delete_collection()
                    .map_err(|err| setup_error("delete", err))
                    .and_then(|()| self.create())
            }
            (CollectionState::EmptyExists, false) => Ok(CollectionState::EmptyExists),
            (CollectionState::Populated, false) => {
                info!(
                    "Collection {} already populated; leaving it unchanged",
                    self.store.collection()
                );
                Ok(CollectionState::Populated)
            }
        };

        result.map_err(|err| self.after_failure(err))
    }

    /// Imports the corpus when, and only when, the collection is empty.
    pub fn ingest(&self, corpus: &Corpus) -> Result<IngestOutcome> {
        match self.probe()? {
            CollectionState::Populated => {
                info!(
                    "Collection {} already holds data; skipping import",
                    self.store.collection()
                );
                Ok(IngestOutcome::Skipped)
            }
            CollectionState::Absent => Err(ModsimError::SchemaSetup(format!(
                "collection {} does not exist",
                self.store.collection()
            ))
            .into()),
            CollectionState::EmptyExists => {
                let count = self
                    .import(corpus)
                    .map_err(|err| self.after_failure(self.discard_partial(err)))?;
                let state = self.probe()?;
                info!(
                    "Imported {} modules; collection {} is {}",
                    count,
                    self.store.collection(),
                    state
                );
                Ok(IngestOutcome::Imported { count })
            }
        }
    }

    fn create(&self) -> Result<CollectionState> {
        self.store
            .create_collection(&self.schema)
            .map_err(|err| setup_error("create", err))?;
        Ok(CollectionState::EmptyExists)
    }

    fn import(&self, corpus: &Corpus) -> Result<usize> {
        let mut written = 0;
        for (batch_idx, batch) in corpus.modules().chunks(self.batch_size).enumerate() {
            let report = self
                .store
                .insert_objects(batch)
                .map_err(|err| ModsimError::Ingestion(format!("batch {batch_idx}: {err:#}")))?;
            if !report.errors.is_empty() {
                return Err(ModsimError::Ingestion(format!(
                    "batch {batch_idx}: {} objects rejected, first error: {}",
                    report.errors.len(),
                    report.errors[0]
                ))
                .into());
            }
            written += report.inserted;
            debug!("Batch {} imported {} objects", batch_idx, report.inserted);
        }
        Ok(written)
    }

    /// Drops whatever a failed import wrote and recreates the empty collection.
    fn discard_partial(&self, err: Error) -> Error {
        let rollback = self
            .store
            .delete_collection()
            .map_err(|e| setup_error("delete", e))
            .and_then(|()| self.create());
        match rollback {
            Ok(_) => {
                info!(
                    "Discarded partial import into collection {}",
                    self.store.collection()
                );
                err.context("Import failed; partial import discarded and collection emptied")
            }
            Err(rollback_err) => err.context(format!(
                "Import failed and discarding the partial import failed ({rollback_err:#}); rerun with --reset"
            )),
        }
    }

    /// Logs the state the store is actually in after a failed operation.
    fn after_failure(&self, err: Error) -> Error {
        match self.probe() {
            Ok(state) => warn!(
                "Collection {} is {} after failure: {:#}",
                self.store.collection(),
                state,
                err
            ),
            Err(probe_err) => warn!(
                "Collection {} state unknown after failure: {:#} (probe: {:#})",
                self.store.collection(),
                err,
                probe_err
            ),
        }
        err
    }
}

fn setup_error(step: &str, err: Error) -> Error {
    ModsimError::SchemaSetup(format!("{step} failed: {err:#}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Module;
    use crate::remote::fake::FakeStore;

    fn corpus(n: usize) -> Corpus {
        Corpus::new(
            (0..n)
                .map(|i| Module::new(format!("m{i}"), format!("Title {i}"), "c", "o"))
                .collect(),
        )
    }

    fn controller(store: &FakeStore) -> IngestionController<'_, FakeStore> {
        IngestionController::new(store, CollectionSchema::modules("text2vec-transformers"))
            .with_batch_size(2)
    }

    #[test]
    fn test_probe_states() {
        let store = FakeStore::default();
        assert_eq!(controller(&store).probe().unwrap(), CollectionState::Absent);

        store.exists.set(true);
        assert_eq!(
            controller(&store).probe().unwrap(),
            CollectionState::EmptyExists
        );

        let store = FakeStore::populated(corpus(1).modules().to_vec());
        assert_eq!(
            controller(&store).probe().unwrap(),
            CollectionState::Populated
        );
    }

    #[test]
    fn test_repeated_runs_import_once() {
        let store = FakeStore::default();
        let corpus = corpus(5);

        for _ in 0..2 {
            let controller = controller(&store);
            controller.ensure_schema(false).unwrap();
            controller.ingest(&corpus).unwrap();
        }

        assert_eq!(store.objects.borrow().len(), 5);
        assert_eq!(store.create_calls.get(), 1);
        // 5 modules in batches of 2 on the first run only.
        assert_eq!(store.insert_calls.get(), 3);
    }

    #[test]
    fn test_populated_collection_is_untouched() {
        let store = FakeStore::populated(corpus(3).modules().to_vec());
        let controller = controller(&store);

        assert_eq!(
            controller.ensure_schema(false).unwrap(),
            CollectionState::Populated
        );
        assert_eq!(controller.ingest(&corpus(3)).unwrap(), IngestOutcome::Skipped);
        assert_eq!(store.insert_calls.get(), 0);
        assert_eq!(store.create_calls.get(), 0);
        assert_eq!(store.delete_calls.get(), 0);
    }

    #[test]
    fn test_reset_recreates_and_reimports() {
        let store = FakeStore::populated(corpus(3).modules().to_vec());
        let controller = controller(&store);

        assert_eq!(
            controller.ensure_schema(true).unwrap(),
            CollectionState::EmptyExists
        );
        assert_eq!(store.delete_calls.get(), 1);
        assert_eq!(
            controller.ingest(&corpus(4)).unwrap(),
            IngestOutcome::Imported { count: 4 }
        );
        assert_eq!(store.objects.borrow().len(), 4);
    }

    #[test]
    fn test_ingest_without_collection_fails() {
        let store = FakeStore::default();
        let err = controller(&store).ingest(&corpus(2)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModsimError>(),
            Some(ModsimError::SchemaSetup(_))
        ));
        assert_eq!(store.insert_calls.get(), 0);
    }

    #[test]
    fn test_rejected_first_batch_leaves_collection_empty() {
        let store = FakeStore::default();
        store.reject_batch.set(Some(0));
        let controller = controller(&store);
        controller.ensure_schema(false).unwrap();

        let err = controller.ingest(&corpus(5)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModsimError>(),
            Some(ModsimError::Ingestion(_))
        ));
        assert_eq!(controller.probe().unwrap(), CollectionState::EmptyExists);

        // A later run retries because nothing was confirmed.
        store.reject_batch.set(None);
        assert_eq!(
            controller.ingest(&corpus(5)).unwrap(),
            IngestOutcome::Imported { count: 5 }
        );
    }

    #[test]
    fn test_rejected_later_batch_is_rolled_back() {
        let store = FakeStore::default();
        store.reject_batch.set(Some(1));
        let controller = controller(&store);
        controller.ensure_schema(false).unwrap();

        // The first batch of two lands, the second is rejected.
        let err = controller.ingest(&corpus(5)).unwrap_err();
        assert!(format!("{err:#}").contains("partial import discarded"));
        assert!(matches!(
            err.downcast_ref::<ModsimError>(),
            Some(ModsimError::Ingestion(_))
        ));
        assert_eq!(controller.probe().unwrap(), CollectionState::EmptyExists);
        assert!(store.objects.borrow().is_empty());
        assert_eq!(store.delete_calls.get(), 1);
        assert_eq!(store.create_calls.get(), 2);

        store.reject_batch.set(None);
        let rerun = self::controller(&store);
        assert_eq!(
            rerun.ensure_schema(false).unwrap(),
            CollectionState::EmptyExists
        );
        assert_eq!(
            rerun.ingest(&corpus(5)).unwrap(),
            IngestOutcome::Imported { count: 5 }
        );
        assert_eq!(store.objects.borrow().len(), 5);
    }

    #[test]
    fn test_failed_rollback_points_at_reset() {
        let store = FakeStore::default();
        store.reject_batch.set(Some(1));
        let controller = controller(&store);
        controller.ensure_schema(false).unwrap();
        store.fail_delete.set(true);

        let err = controller.ingest(&corpus(5)).unwrap_err();
        assert!(format!("{err:#}").contains("rerun with --reset"));
        assert_eq!(controller.probe().unwrap(), CollectionState::Populated);
    }

    #[test]
    fn test_unreachable_store_is_setup_error() {
        let store = FakeStore::default();
        store.unreachable.set(true);
        let err = controller(&store).ensure_schema(false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModsimError>(),
            Some(ModsimError::SchemaSetup(_))
        ));
    }

    #[test]
    fn test_empty_corpus_imports_nothing() {
        let store = FakeStore::default();
        let controller = controller(&store);
        controller.ensure_schema(false).unwrap();
        assert_eq!(
            controller.ingest(&Corpus::default()).unwrap(),
            IngestOutcome::Imported { count: 0 }
        );
        assert_eq!(controller.probe().unwrap(), CollectionState::EmptyExists);
    }
}
