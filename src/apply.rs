use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::repo::{Database, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Commit,
    /// Run every step, then roll back.
    DryRun,
}

impl ApplyMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            ApplyMode::DryRun
        } else {
            ApplyMode::Commit
        }
    }
}

/// Result of one pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<S> {
    pub run_id: Uuid,
    pub committed: bool,
    pub counts: S,
}

/// One all-or-nothing transaction around a pipeline run.
pub struct Scope<T: Transaction> {
    tx: T,
    mode: ApplyMode,
    run_id: Uuid,
}

impl<T: Transaction> Scope<T> {
    pub async fn begin<D>(db: &D, mode: ApplyMode) -> Result<Self>
    where
        D: Database<Tx = T>,
    {
        let tx = db.begin().await?;
        let run_id = Uuid::new_v4();
        info!(%run_id, ?mode, "transaction opened");
        Ok(Scope { tx, mode, run_id })
    }

    pub fn repo(&mut self) -> &mut T {
        &mut self.tx
    }

    /// Commits in `Commit` mode and always rolls back in `DryRun` mode.
    pub async fn finish<S>(self, counts: S) -> Result<Outcome<S>> {
        let committed = match self.mode {
            ApplyMode::Commit => {
                self.tx.commit().await?;
                info!(run_id = %self.run_id, "transaction committed");
                true
            }
            ApplyMode::DryRun => {
                self.tx.rollback().await?;
                info!(run_id = %self.run_id, "dry run: transaction rolled back");
                false
            }
        };
        Ok(Outcome {
            run_id: self.run_id,
            committed,
            counts,
        })
    }

    /// Discards every write of the run after an unrecoverable error.
    pub async fn abort(self) -> Result<()> {
        warn!(run_id = %self.run_id, "run aborted, rolling back");
        self.tx.rollback().await
    }
}
