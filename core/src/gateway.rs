//! Transaction scoping, per-operation deadlines and translation of storage
//! failures into [`StoreError`] variants.

use std::time::{Duration, Instant};

use chrono::Local;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::{Result, StoreError};

/// How often (in SQLite VM instructions) the deadline is polled.
const DEADLINE_POLL_OPS: i32 = 1000;

pub(crate) fn now() -> String {
    Local::now().to_rfc3339()
}

/// Translate a SQLite error into the domain taxonomy.
///
/// Triggers in the schema raise `"<verb> on <table> violates <constraint>"`;
/// the verb matters because `recipes_parent_recipe_id_fkey` means a missing
/// parent on insert and an existing child on delete.
pub fn map_constraint(err: rusqlite::Error) -> StoreError {
    let mapped = match &err {
        rusqlite::Error::QueryReturnedNoRows => Some(StoreError::RecordNotFound),
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted => {
            Some(StoreError::DeadlineExceeded)
        }
        rusqlite::Error::SqliteFailure(e, Some(message))
            if e.code == ErrorCode::ConstraintViolation =>
        {
            let named = named_violation(message);
            if named.is_none() {
                warn!(%message, "unrecognised constraint violation");
            }
            named
        }
        _ => None,
    };
    mapped.unwrap_or_else(|| StoreError::Internal(err))
}

fn named_violation(message: &str) -> Option<StoreError> {
    if message.starts_with("UNIQUE constraint failed: users.email") {
        return Some(StoreError::DuplicateEmail);
    }
    if message.starts_with("UNIQUE constraint failed: recipes.parent_recipe_id") {
        // A second child for the same parent means two forks raced.
        return Some(StoreError::EditConflict);
    }

    let (head, constraint) = message.split_once(" violates ")?;
    let verb = head.split_whitespace().next()?;
    let mapped = match (verb, constraint.trim()) {
        ("insert", "recipes_parent_recipe_id_fkey") => StoreError::ParentRecipeDoesNotExist,
        ("delete", "recipes_parent_recipe_id_fkey") => StoreError::ChildRecipeExists,
        ("delete", "consumed_recipe_id_fkey") => StoreError::RecordInUse,
        (_, "consumed_recipe_id_fkey") => StoreError::RecipeDoesNotExist,
        (_, "recipes_parent_recipe_id_immutable" | "recipe_components_history_immutable") => {
            StoreError::EditConflict
        }
        (
            _,
            "recipes_creator_id_fkey"
            | "pantry_items_user_id_fkey"
            | "consumables_creator_id_fkey"
            | "consumed_user_id_fkey",
        ) => StoreError::ReferencedUserDoesNotExist,
        (_, "recipe_components_recipe_id_fkey") => StoreError::RecipeDoesNotExist,
        (_, "recipe_components_pantry_item_id_fkey") => StoreError::PantryItemDoesNotExist,
        (_, "pantry_items_consumable_id_fkey") => StoreError::ConsumableDoesNotExist,
        (_, "consumables_referenced" | "pantry_items_referenced") => StoreError::RecordInUse,
        _ => return None,
    };
    Some(mapped)
}

/// Interrupts SQLite once `at` has passed. Dropping it removes the handler.
/// A timeout too large to add to the clock leaves the operation unbounded.
struct Deadline<'c> {
    conn: &'c Connection,
    at: Option<Instant>,
}

impl<'c> Deadline<'c> {
    fn arm(conn: &'c Connection, timeout: Duration) -> Self {
        let at = Instant::now().checked_add(timeout);
        match at {
            Some(at) => {
                conn.progress_handler(DEADLINE_POLL_OPS, Some(move || Instant::now() >= at));
                debug!(?timeout, "deadline armed");
            }
            None => warn!(?timeout, "timeout overflows the clock, running without a deadline"),
        }
        Deadline { conn, at }
    }

    /// Disarm and report whether the deadline had already passed.
    fn finish(self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }
}

impl Drop for Deadline<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

impl Database {
    /// Run `f` inside an IMMEDIATE transaction that commits only if `f`
    /// succeeds within the configured deadline. Every other path rolls back.
    pub(crate) fn write<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        self.scoped(op, TransactionBehavior::Immediate, f)
    }

    /// Run `f` inside a deferred transaction so multi-statement reads see one
    /// snapshot.
    pub(crate) fn read<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        self.scoped(op, TransactionBehavior::Deferred, f)
    }

    fn scoped<T>(
        &self,
        op: &'static str,
        behavior: TransactionBehavior,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let deadline = Deadline::arm(&self.conn, self.options.timeout);
        let tx = Transaction::new_unchecked(&self.conn, behavior)?;
        debug!(op, "transaction begun");

        let outcome = f(&tx);
        // The handler must be gone before the rollback on drop runs.
        let expired = deadline.finish();

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                if matches!(err, StoreError::DeadlineExceeded) {
                    warn!(op, "deadline exceeded, rolling back");
                } else {
                    debug!(op, error = %err, "rolling back");
                }
                return Err(err);
            }
        };
        if expired {
            warn!(op, "deadline exceeded before commit, rolling back");
            return Err(StoreError::DeadlineExceeded);
        }

        tx.commit()?;
        debug!(op, "transaction committed");
        Ok(value)
    }
}
