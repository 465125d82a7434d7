use crate::db;
use crate::events::{FailureEmitter, WriteFailure};
use crate::model::Document;
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

/// Upper bound on writes committed together.
pub const MAX_BATCH_OPS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Merge into the stored document, creating it when absent.
    Upsert { rm: String, patch: Document },
    Delete { rm: String },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Upsert { rm, .. } | WriteOp::Delete { rm } => rm,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub batches: usize,
    pub committed_batches: usize,
    pub failed_batches: usize,
    pub committed_ops: usize,
    pub failed_ops: usize,
    /// Delete ops whose key did not exist.
    pub missing: usize,
}

pub fn clamp_batch_size(requested: usize) -> usize {
    requested.clamp(1, MAX_BATCH_OPS)
}

/// Number of batches `op_count` writes split into.
pub fn batch_count(op_count: usize, batch_size: usize) -> usize {
    op_count.div_ceil(clamp_batch_size(batch_size))
}

/// Commit `ops` in chunks of at most `batch_size`, one transaction per
/// chunk. A failing chunk is rolled back, reported through `emitter`, and
/// the remaining chunks still run; chunks already committed stay committed.
pub fn commit_batches(
    conn: &Connection,
    ops: &[WriteOp],
    batch_size: usize,
    operation: &str,
    emitter: &FailureEmitter,
) -> BatchOutcome {
    let size = clamp_batch_size(batch_size);
    log::debug!(
        "{}: {} ops planned in {} batches of <= {}",
        operation,
        ops.len(),
        batch_count(ops.len(), size),
        size
    );
    let mut outcome = BatchOutcome::default();

    for (index, chunk) in ops.chunks(size).enumerate() {
        outcome.batches += 1;
        match commit_one(conn, chunk) {
            Ok(missing) => {
                outcome.committed_batches += 1;
                outcome.committed_ops += chunk.len();
                outcome.missing += missing;
            }
            Err(e) => {
                outcome.failed_batches += 1;
                outcome.failed_ops += chunk.len();
                emitter.emit(WriteFailure {
                    id: Uuid::new_v4().to_string(),
                    at: crate::dates::now_rfc3339(),
                    operation: operation.to_string(),
                    batch_index: index,
                    op_count: chunk.len(),
                    first_key: chunk.first().map(|op| op.key().to_string()),
                    message: format!("{e:#}"),
                });
            }
        }
    }

    log::info!(
        "{}: {} ops in {} batches ({} failed)",
        operation,
        ops.len(),
        outcome.batches,
        outcome.failed_batches
    );
    outcome
}

fn commit_one(conn: &Connection, chunk: &[WriteOp]) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut missing = 0usize;
    for op in chunk {
        match op {
            WriteOp::Upsert { rm, patch } => db::student_upsert_merge(&tx, rm, patch)?,
            WriteOp::Delete { rm } => {
                if !db::student_delete(&tx, rm)? {
                    missing += 1;
                }
            }
        }
    }
    tx.commit()?;
    Ok(missing)
}
