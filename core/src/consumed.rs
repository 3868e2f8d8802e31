//! The consumed log: which recipe a user ate, how much, and when.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use tracing::info;

use crate::db::Database;
use crate::error::{Result, StoreError};
use crate::gateway::now;
use crate::models::{Consumed, Macronutrients, NewConsumed, validate_consumed};
use crate::validator::Validator;

const CONSUMED_COLUMNS: &str = "id, user_id, recipe_id, quantity, carbs, fats, proteins, alcohol,
     consumed_at, created_at, last_edited_at, notes";

/// Fixed-width UTC form, so text order is time order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Database {
    fn consumed_from_row(row: &rusqlite::Row) -> rusqlite::Result<Consumed> {
        Ok(Consumed {
            id: row.get(0)?,
            user_id: row.get(1)?,
            recipe_id: row.get(2)?,
            quantity: row.get(3)?,
            macros: Macronutrients {
                carbs: row.get(4)?,
                fats: row.get(5)?,
                proteins: row.get(6)?,
                alcohol: row.get(7)?,
            },
            consumed_at: row.get(8)?,
            created_at: row.get(9)?,
            last_edited_at: row.get(10)?,
            notes: row.get(11)?,
        })
    }

    pub fn insert_consumed(&self, entry: &NewConsumed) -> Result<Consumed> {
        let mut v = Validator::new();
        validate_consumed(&mut v, entry);
        v.into_result()?;

        let consumed = self.write("insert_consumed", |tx| {
            let now = now();
            tx.execute(
                "INSERT INTO consumed
                    (user_id, recipe_id, quantity, carbs, fats, proteins, alcohol,
                     consumed_at, created_at, last_edited_at, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10)",
                params![
                    entry.user_id,
                    entry.recipe_id,
                    entry.quantity,
                    entry.macros.carbs,
                    entry.macros.fats,
                    entry.macros.proteins,
                    entry.macros.alcohol,
                    timestamp(&entry.consumed_at),
                    now,
                    entry.notes,
                ],
            )?;
            let id = tx.last_insert_rowid();
            Ok(tx.query_row(
                &format!("SELECT {CONSUMED_COLUMNS} FROM consumed WHERE id = ?1"),
                params![id],
                Self::consumed_from_row,
            )?)
        })?;
        info!(consumed_id = consumed.id, recipe_id = consumed.recipe_id, "consumption logged");
        Ok(consumed)
    }

    pub fn get_consumed(&self, id: i64) -> Result<Consumed> {
        Ok(self.conn.query_row(
            &format!("SELECT {CONSUMED_COLUMNS} FROM consumed WHERE id = ?1"),
            params![id],
            Self::consumed_from_row,
        )?)
    }

    /// `user_id`'s log in time order, optionally bounded (inclusive) on
    /// either side.
    pub fn list_consumed(
        &self,
        user_id: i64,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Consumed>> {
        let mut v = Validator::new();
        if let (Some(from), Some(to)) = (from, to) {
            v.check(from <= to, "end", "must not be before start");
        }
        v.into_result()?;

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONSUMED_COLUMNS} FROM consumed
             WHERE user_id = ?1
               AND (?2 IS NULL OR consumed_at >= ?2)
               AND (?3 IS NULL OR consumed_at <= ?3)
             ORDER BY consumed_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    user_id,
                    from.as_ref().map(timestamp),
                    to.as_ref().map(timestamp)
                ],
                Self::consumed_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Replace every field of entry `id`. Scoped to `entry.user_id`.
    pub fn update_consumed(&self, id: i64, entry: &NewConsumed) -> Result<Consumed> {
        let mut v = Validator::new();
        validate_consumed(&mut v, entry);
        v.into_result()?;

        self.write("update_consumed", |tx| {
            let changed = tx.execute(
                "UPDATE consumed
                 SET recipe_id = ?1, quantity = ?2, carbs = ?3, fats = ?4, proteins = ?5,
                     alcohol = ?6, consumed_at = ?7, notes = ?8, last_edited_at = ?9
                 WHERE id = ?10 AND user_id = ?11",
                params![
                    entry.recipe_id,
                    entry.quantity,
                    entry.macros.carbs,
                    entry.macros.fats,
                    entry.macros.proteins,
                    entry.macros.alcohol,
                    timestamp(&entry.consumed_at),
                    entry.notes,
                    now(),
                    id,
                    entry.user_id,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::RecordNotFound);
            }
            Ok(tx.query_row(
                &format!("SELECT {CONSUMED_COLUMNS} FROM consumed WHERE id = ?1"),
                params![id],
                Self::consumed_from_row,
            )?)
        })
    }

    pub fn delete_consumed(&self, id: i64, user_id: i64) -> Result<()> {
        let changed = self.write("delete_consumed", |tx| {
            Ok(tx.execute(
                "DELETE FROM consumed WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::RecordNotFound);
        }
        info!(consumed_id = id, "consumption deleted");
        Ok(())
    }
}
