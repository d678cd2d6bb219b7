// crates/mesaplane-store-sqlite/src/gateway.rs
// ============================================================================
// Module: SQLite Write Gateway
// Description: Single-writer serialization for mutating SQLite operations.
// Purpose: Give every writer a consistent, contention-free path to the database
//          file while readers use their own pooled connections.
// Dependencies: rusqlite, tokio::sync::oneshot
// ============================================================================

//! ## Overview
//! SQLite allows only one writer at a time; rather than retry on
//! `SQLITE_BUSY`, every mutation is funneled through one dedicated OS thread
//! holding the sole writer [`rusqlite::Connection`]. Callers submit a
//! boxed closure and await a oneshot reply, so the async call sites never
//! block the Tokio runtime on file I/O.

use std::sync::mpsc;

use mesaplane_core::StoreError;
use rusqlite::Connection;
use tokio::sync::oneshot;

type Job = Box<dyn FnOnce(&Connection) + Send>;

/// Handle to the background writer thread.
pub struct WriteGateway {
    sender: mpsc::Sender<Job>,
}

impl WriteGateway {
    /// Spawns the writer thread owning `conn`. The thread exits when every
    /// [`WriteGateway`] handle (and its clones) has been dropped.
    #[must_use]
    pub fn spawn(conn: Connection) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        #[allow(
            clippy::expect_used,
            reason = "OS thread spawn failure here means the process cannot serve writes at all; \
                      there is no caller to hand a Result to at construction time"
        )]
        std::thread::Builder::new()
            .name("mesaplane-sqlite-writer".to_string())
            .spawn(move || {
                for job in receiver {
                    job(&conn);
                }
            })
            .expect("spawning the sqlite writer thread must not fail under ordinary operation");
        Self { sender }
    }

    /// Runs `f` against the writer connection and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] when the writer thread has exited,
    /// or propagates whatever `f` itself returns.
    pub async fn submit<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            let result = f(conn);
            let _ = reply_tx.send(result);
        });
        self.sender
            .send(job)
            .map_err(|_err| StoreError::Internal("sqlite writer thread is not running".to_string()))?;
        reply_rx
            .await
            .map_err(|_err| StoreError::Internal("sqlite writer thread dropped the reply".to_string()))?
    }
}
