use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::commands::{DbCommand, DbResult};
use crate::db_types::{TableDefinition, TableId};
use crate::error::DbError;
use crate::snapshot::Snapshot;

/// Name given to the table created when no snapshot could be restored.
pub const DEFAULT_TABLE_NAME: &str = "default";

pub struct Command {
    pub cmd: DbCommand,
    pub respond_to: oneshot::Sender<Result<DbResult, DbError>>,
}

/// The whole store: every table with its schema.
///
/// A `Database` has a single owner. Request handlers never touch it directly;
/// they go through a [`DbHandle`], and the task spawned by [`Database::spawn`]
/// applies commands one at a time, so reads never observe a half-applied
/// mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Database {
    pub(crate) tables: Vec<TableDefinition>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_table() -> Self {
        Self {
            tables: vec![TableDefinition::named(DEFAULT_TABLE_NAME)],
        }
    }

    pub fn from_tables(tables: Vec<TableDefinition>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn table(&self, id: TableId) -> Result<&TableDefinition, DbError> {
        self.tables
            .get(id as usize)
            .ok_or(DbError::TableNotFound(id))
    }

    pub(crate) fn table_mut(&mut self, id: TableId) -> Result<&mut TableDefinition, DbError> {
        self.tables
            .get_mut(id as usize)
            .ok_or(DbError::TableNotFound(id))
    }

    /// Restores the store from `snapshot`, falling back to a single empty
    /// table when nothing usable is on disk.
    pub fn init(snapshot: &Snapshot) -> Self {
        match snapshot.load() {
            Ok(db) => {
                tracing::info!(
                    tables = db.tables.len(),
                    dir = %snapshot.dir().display(),
                    "data was successfully loaded"
                );
                db
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "load data failed, starting empty");
                Self::with_default_table()
            }
        }
    }

    /// Best-effort dump; failures are logged and swallowed.
    pub fn teardown(&self, snapshot: &Snapshot) {
        match snapshot.dump(self) {
            Ok(()) => tracing::info!(dir = %snapshot.dir().display(), "data was dumped"),
            Err(err) => tracing::error!(error = %format!("{err:#}"), "dump data failed"),
        }
    }

    /// Moves the store onto its own task and returns the handle used to reach it.
    pub fn spawn(self, queue_depth: usize) -> (DbHandle, DbWorker) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(self.run(rx, stop_rx));
        (
            DbHandle { tx },
            DbWorker {
                stop: stop_tx,
                join,
            },
        )
    }

    /// Applies commands until every sender is gone or `stop` fires, then hands
    /// the store back so it can be dumped.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Command>,
        mut stop: oneshot::Receiver<()>,
    ) -> Self {
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => return self,
                },
                _ = &mut stop => break,
            }
        }

        // Answer whatever was already queued, refuse the rest.
        rx.close();
        while let Some(cmd) = rx.recv().await {
            self.apply(cmd);
        }
        self
    }

    fn apply(&mut self, cmd: Command) {
        let Command { cmd, respond_to } = cmd;
        let result = self.execute(cmd);
        if let Err(err) = &result {
            tracing::debug!(error = %err, "command failed");
        }
        // The requester may have gone away; nothing to do then.
        let _ = respond_to.send(result);
    }
}

#[derive(Debug, Clone)]
pub struct DbHandle {
    tx: mpsc::Sender<Command>,
}

impl DbHandle {
    pub async fn call(&self, cmd: DbCommand) -> Result<DbResult, DbError> {
        let (respond_to, response) = oneshot::channel();
        self.tx
            .send(Command { cmd, respond_to })
            .await
            .map_err(|_| DbError::Unavailable)?;
        response.await.map_err(|_| DbError::Unavailable)?
    }
}

pub struct DbWorker {
    stop: oneshot::Sender<()>,
    join: JoinHandle<Database>,
}

impl DbWorker {
    /// Stops accepting commands and returns the store once the queue is drained.
    pub async fn shutdown(self) -> anyhow::Result<Database> {
        let _ = self.stop.send(());
        Ok(self.join.await?)
    }
}
