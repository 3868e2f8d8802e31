//! Walking a version's lineage back to its root.

use rusqlite::{Connection, params};

use crate::db::{Database, RECIPE_COLUMNS};
use crate::error::{Result, StoreError};
use crate::models::{Filters, PageMetadata, Recipe, validate_filters};
use crate::validator::Validator;

/// Every recipe reachable from `?1` by following `parent_recipe_id`,
/// including `?1` itself. UNION drops repeats, so the walk reaches a fixed
/// point even on malformed data.
const LINEAGE_CTE: &str = "WITH RECURSIVE lineage AS (
        SELECT id, name, creator_id, created_at, last_edited_at, notes, parent_recipe_id, is_latest
        FROM recipes
        WHERE id = ?1
        UNION
        SELECT r.id, r.name, r.creator_id, r.created_at, r.last_edited_at, r.notes,
               r.parent_recipe_id, r.is_latest
        FROM recipes r
        JOIN lineage l ON r.id = l.parent_recipe_id
    )";

pub(crate) fn lineage_root(conn: &Connection, recipe_id: i64) -> Result<Recipe> {
    Ok(conn.query_row(
        &format!(
            "{LINEAGE_CTE}
             SELECT {RECIPE_COLUMNS} FROM lineage WHERE parent_recipe_id IS NULL"
        ),
        params![recipe_id],
        Database::recipe_from_row,
    )?)
}

impl Database {
    /// The chain from the lineage root down to `recipe_id`, ascending by id,
    /// one page at a time.
    pub fn get_all_ancestors(
        &self,
        recipe_id: i64,
        filters: Filters,
    ) -> Result<(Vec<Recipe>, PageMetadata)> {
        let mut v = Validator::new();
        validate_filters(&mut v, &filters);
        v.into_result()?;

        self.read("get_all_ancestors", |tx| {
            let total: i64 = tx.query_row(
                &format!("{LINEAGE_CTE} SELECT COUNT(*) FROM lineage"),
                params![recipe_id],
                |row| row.get(0),
            )?;
            if total == 0 {
                return Err(StoreError::RecordNotFound);
            }

            let mut stmt = tx.prepare(&format!(
                "{LINEAGE_CTE}
                 SELECT {RECIPE_COLUMNS} FROM lineage
                 ORDER BY id ASC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let recipes = stmt
                .query_map(
                    params![recipe_id, filters.limit(), filters.offset()],
                    Self::recipe_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((recipes, PageMetadata::calculate(total, filters)))
        })
    }

    /// The root of `recipe_id`'s lineage, which may be the recipe itself.
    pub fn get_lineage_root(&self, recipe_id: i64) -> Result<Recipe> {
        self.read("get_lineage_root", |tx| lineage_root(tx, recipe_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::now;
    use crate::models::NewUser;

    /// Insert a root plus `depth` successive versions; returns their ids.
    fn chain(db: &Database, creator_id: i64, depth: usize) -> Vec<i64> {
        let mut ids = Vec::new();
        let mut parent: Option<i64> = None;
        for i in 0..=depth {
            db.conn
                .execute(
                    "INSERT INTO recipes (name, creator_id, created_at, last_edited_at, parent_recipe_id, is_latest)
                     VALUES (?1, ?2, ?3, ?3, ?4, ?5)",
                    params![format!("v{i}"), creator_id, now(), parent, i == depth],
                )
                .unwrap();
            let id = db.conn.last_insert_rowid();
            ids.push(id);
            parent = Some(id);
        }
        ids
    }

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .insert_user(&NewUser {
                username: "test1".to_string(),
                email: "test1@gmail.com".to_string(),
            })
            .unwrap();
        (db, user.id)
    }

    #[test]
    fn test_chain_property_by_depth() {
        let (db, user_id) = setup();
        for depth in 0..6 {
            let ids = chain(&db, user_id, depth);
            let leaf = *ids.last().unwrap();
            let (rows, meta) = db.get_all_ancestors(leaf, Filters::default()).unwrap();

            assert_eq!(rows.len(), depth + 1);
            assert_eq!(meta.total_records, i64::try_from(depth + 1).unwrap());
            assert!(rows[0].parent_recipe_id.is_none());
            for pair in rows.windows(2) {
                assert_eq!(pair[1].parent_recipe_id, Some(pair[0].id));
            }
            assert_eq!(rows.last().unwrap().id, leaf);
        }
    }

    #[test]
    fn test_ancestors_stop_at_requested_version() {
        let (db, user_id) = setup();
        let ids = chain(&db, user_id, 4);
        let (rows, _) = db.get_all_ancestors(ids[2], Filters::default()).unwrap();
        let got: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(got, ids[..=2].to_vec());
    }

    #[test]
    fn test_ancestors_paginate() {
        let (db, user_id) = setup();
        let ids = chain(&db, user_id, 4);
        let leaf = ids[4];

        let (rows, meta) = db.get_all_ancestors(leaf, Filters::new(2, 2)).unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), ids[2..4].to_vec());
        assert_eq!(meta.current_page, 2);
        assert_eq!(meta.last_page, 3);
        assert_eq!(meta.total_records, 5);

        // Past the end still reports the lineage size.
        let (rows, meta) = db.get_all_ancestors(leaf, Filters::new(9, 2)).unwrap();
        assert!(rows.is_empty());
        assert_eq!(meta.total_records, 5);
    }

    #[test]
    fn test_ancestors_not_found() {
        let (db, _) = setup();
        assert!(matches!(
            db.get_all_ancestors(404, Filters::default()),
            Err(StoreError::RecordNotFound)
        ));
    }

    #[test]
    fn test_ancestors_validate_filters() {
        let (db, user_id) = setup();
        let ids = chain(&db, user_id, 1);
        let err = db
            .get_all_ancestors(ids[1], Filters::new(10_000_001, 1001))
            .unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert!(errors.contains("page", "at most"));
        assert!(errors.contains("page_size", "at most"));
    }

    #[test]
    fn test_lineage_root() {
        let (db, user_id) = setup();
        let ids = chain(&db, user_id, 3);
        assert_eq!(db.get_lineage_root(ids[3]).unwrap().id, ids[0]);
        assert_eq!(db.get_lineage_root(ids[0]).unwrap().id, ids[0]);
        assert!(matches!(
            db.get_lineage_root(404),
            Err(StoreError::RecordNotFound)
        ));
    }
}
