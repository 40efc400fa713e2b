//! Registry of shared transactions, keyed by identifier

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use txdb_core::{ConnectionConfig, Database, DatabaseDriver, Result, TxdbError};

use crate::TxdbConfig;
use crate::shared::SharedTransaction;

struct Entry {
    shared: Arc<SharedTransaction>,
    opened: usize,
}

#[derive(Default)]
struct RegistryState {
    /// The real database, connected on first open
    database: Option<Arc<dyn Database>>,
    records: HashMap<Arc<str>, Entry>,
}

/// Maps identifiers to the shared transaction every connection under that
/// identifier runs on.
///
/// The registry lock covers connecting to the real database, creating and
/// removing records and their open counts. It is always taken before a
/// record's statement lock, never while holding one.
pub struct SharedTransactionRegistry {
    driver: Arc<dyn DatabaseDriver>,
    connection: ConnectionConfig,
    config: TxdbConfig,
    state: Mutex<RegistryState>,
}

impl SharedTransactionRegistry {
    /// Create a registry that connects through `driver` on first use
    pub fn new(
        driver: Arc<dyn DatabaseDriver>,
        connection: ConnectionConfig,
        config: TxdbConfig,
    ) -> Self {
        Self {
            driver,
            connection,
            config,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Get the driver name
    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    pub fn config(&self) -> &TxdbConfig {
        &self.config
    }

    /// Take one more reference on the shared transaction for `identifier`,
    /// starting it if there is none yet.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub(crate) async fn open(&self, identifier: &str) -> Result<Arc<SharedTransaction>> {
        let mut state = self.state.lock().await;

        if let Some(entry) = state.records.get_mut(identifier) {
            entry.opened += 1;
            tracing::debug!(opened = entry.opened, "joined shared transaction");
            return Ok(entry.shared.clone());
        }

        let database = match &state.database {
            Some(database) if !database.is_closed() => database.clone(),
            _ => {
                let database = self.connect().await?;
                state.database = Some(database.clone());
                database
            }
        };

        let shared = Arc::new(
            SharedTransaction::begin(
                Arc::from(identifier),
                database,
                &self.config,
                self.driver.capabilities().supports_savepoints,
            )
            .await?,
        );
        state.records.insert(
            shared.identifier().clone(),
            Entry {
                shared: shared.clone(),
                opened: 1,
            },
        );
        tracing::debug!(live = state.records.len(), "shared transaction registered");
        Ok(shared)
    }

    /// Drop one reference on the shared transaction for `identifier`.
    ///
    /// Dropping the last reference rolls the transaction back and removes the
    /// record. The record is removed even if the rollback fails. Once no
    /// record is left the real database is closed; the next open reconnects.
    #[tracing::instrument(skip(self), fields(driver = self.driver.name()))]
    pub(crate) async fn close(&self, identifier: &str) -> Result<()> {
        let mut state = self.state.lock().await;

        let remaining = match state.records.get_mut(identifier) {
            Some(entry) => {
                entry.opened -= 1;
                entry.opened
            }
            None => {
                return Err(TxdbError::NotFound(format!(
                    "no shared transaction for identifier '{}'",
                    identifier
                )));
            }
        };

        if remaining > 0 {
            tracing::debug!(opened = remaining, "left shared transaction");
            return Ok(());
        }

        let Some(entry) = state.records.remove(identifier) else {
            return Ok(());
        };
        tracing::debug!(live = state.records.len(), "shared transaction removed");
        let finished = entry.shared.finish().await;

        if state.records.is_empty()
            && let Some(database) = state.database.take()
        {
            tracing::info!(driver = self.driver.name(), "closing the real database");
            database.close().await?;
        }
        finished
    }

    async fn connect(&self) -> Result<Arc<dyn Database>> {
        tracing::info!(driver = self.driver.name(), "connecting to the real database");
        let database = self.driver.connect(&self.connection).await.map_err(|e| {
            tracing::error!(error = %e, "failed to connect");
            if e.is_connection() {
                e
            } else {
                TxdbError::Connection(e.to_string())
            }
        })?;

        if self.config.ping_on_connect() {
            database.ping().await.map_err(|e| {
                TxdbError::Connection(format!("Ping after connect failed: {}", e))
            })?;
        }
        Ok(database)
    }

    /// Number of logical connections open under `identifier`
    pub async fn open_count(&self, identifier: &str) -> usize {
        self.state
            .lock()
            .await
            .records
            .get(identifier)
            .map_or(0, |entry| entry.opened)
    }

    /// Number of nested transactions open under `identifier`, if it is live
    pub async fn savepoint_depth(&self, identifier: &str) -> Option<usize> {
        let shared = self
            .state
            .lock()
            .await
            .records
            .get(identifier)
            .map(|entry| entry.shared.clone())?;
        Some(shared.savepoint_depth().await)
    }

    /// Number of live shared transactions
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Identifiers with a live shared transaction, sorted
    pub async fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self
            .state
            .lock()
            .await
            .records
            .keys()
            .map(|k| k.to_string())
            .collect();
        identifiers.sort();
        identifiers
    }
}
