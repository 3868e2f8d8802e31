use rusqlite::{Connection, params};
use serde_json::json;
use tracing::info;

use crate::ancestry::lineage_root;
use crate::db::{Database, RECIPE_COLUMNS};
use crate::error::{Result, StoreError};
use crate::gateway::now;
use crate::models::{
    Consumable, FullRecipe, Macronutrients, PantryItem, RecipeComponent, validate_recipe_component,
};
use crate::steps::normalize_full_recipe;
use crate::validator::Validator;

fn step_from_row(
    row: &rusqlite::Row,
) -> rusqlite::Result<(RecipeComponent, PantryItem, Consumable)> {
    let component = RecipeComponent {
        id: row.get(0)?,
        recipe_id: row.get(1)?,
        pantry_item_id: row.get(2)?,
        created_at: row.get(3)?,
        quantity: row.get(4)?,
        step_no: row.get(5)?,
        step_description: row.get(6)?,
    };
    let pantry_item = PantryItem {
        id: row.get(7)?,
        user_id: row.get(8)?,
        consumable_id: row.get(9)?,
        name: row.get(10)?,
        created_at: row.get(11)?,
        last_edited_at: row.get(12)?,
    };
    let consumable = Consumable {
        id: row.get(13)?,
        creator_id: row.get(14)?,
        created_at: row.get(15)?,
        name: row.get(16)?,
        brand_name: row.get(17)?,
        size: row.get(18)?,
        units: row.get(19)?,
        macros: Macronutrients {
            carbs: row.get(20)?,
            fats: row.get(21)?,
            proteins: row.get(22)?,
            alcohol: row.get(23)?,
        },
    };
    Ok((component, pantry_item, consumable))
}

/// Read a recipe and its steps, ordered by step number.
pub(crate) fn load_full_recipe(conn: &Connection, id: i64) -> Result<FullRecipe> {
    let recipe = conn.query_row(
        &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
        params![id],
        Database::recipe_from_row,
    )?;

    let mut stmt = conn.prepare(
        "SELECT rc.id, rc.recipe_id, rc.pantry_item_id, rc.created_at, rc.quantity,
                rc.step_no, rc.step_description,
                p.id, p.user_id, p.consumable_id, p.name, p.created_at, p.last_edited_at,
                c.id, c.creator_id, c.created_at, c.name, c.brand_name, c.size, c.units,
                c.carbs, c.fats, c.proteins, c.alcohol
         FROM recipe_components rc
         JOIN pantry_items p ON p.id = rc.pantry_item_id
         JOIN consumables c ON c.id = p.consumable_id
         WHERE rc.recipe_id = ?1
         ORDER BY rc.step_no",
    )?;
    let steps = stmt
        .query_map(params![id], step_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut full = FullRecipe {
        recipe,
        recipe_components: Vec::with_capacity(steps.len()),
        pantry_items: Vec::with_capacity(steps.len()),
        consumables: Vec::with_capacity(steps.len()),
    };
    for (component, pantry_item, consumable) in steps {
        full.recipe_components.push(component);
        full.pantry_items.push(pantry_item);
        full.consumables.push(consumable);
    }
    Ok(full)
}

/// Insert every component in one statement. The rows travel as a JSON array
/// unpacked by `json_each`, so a bad pantry item aborts the whole batch.
fn insert_components(
    conn: &Connection,
    recipe_id: i64,
    created_at: &str,
    components: &[RecipeComponent],
) -> Result<usize> {
    let rows: Vec<serde_json::Value> = components
        .iter()
        .map(|c| {
            json!({
                "pantry_item_id": c.pantry_item_id,
                "quantity": c.quantity,
                "step_no": c.step_no,
                "step_description": c.step_description,
            })
        })
        .collect();

    Ok(conn.execute(
        "INSERT INTO recipe_components
            (recipe_id, pantry_item_id, created_at, quantity, step_no, step_description)
         SELECT ?1,
                json_extract(value, '$.pantry_item_id'),
                ?2,
                json_extract(value, '$.quantity'),
                json_extract(value, '$.step_no'),
                json_extract(value, '$.step_description')
         FROM json_each(?3)",
        params![
            recipe_id,
            created_at,
            serde_json::Value::Array(rows).to_string()
        ],
    )?)
}

impl Database {
    /// Fetch a recipe with its steps. Visible to the recipe's creator and to
    /// the creator of its lineage root; anyone else gets `RecordNotFound`.
    pub fn get_full_recipe(&self, id: i64, requesting_user_id: i64) -> Result<FullRecipe> {
        self.read("get_full_recipe", |tx| {
            let full = load_full_recipe(tx, id)?;
            if full.recipe.creator_id != requesting_user_id
                && lineage_root(tx, id)?.creator_id != requesting_user_id
            {
                return Err(StoreError::RecordNotFound);
            }
            Ok(full)
        })
    }

    /// Persist `full` as the root of a new lineage and replace it with the
    /// stored copy (generated ids, timestamps, canonical step order).
    pub fn insert_full_recipe(&self, full: &mut FullRecipe) -> Result<()> {
        full.recipe.parent_recipe_id = None;
        full.recipe.is_latest = true;
        normalize_full_recipe(full)?;

        let id = self.write("insert_full_recipe", |tx| {
            let now = now();
            tx.execute(
                "INSERT INTO recipes
                    (name, creator_id, created_at, last_edited_at, notes, parent_recipe_id, is_latest)
                 VALUES (?1, ?2, ?3, ?3, ?4, NULL, 1)",
                params![full.recipe.name, full.recipe.creator_id, now, full.recipe.notes],
            )?;
            let id = tx.last_insert_rowid();
            insert_components(tx, id, &now, &full.recipe_components)?;
            Ok(id)
        })?;
        info!(recipe_id = id, steps = full.step_count(), "recipe inserted");

        *full = self.read("load_full_recipe", |tx| load_full_recipe(tx, id))?;
        Ok(())
    }

    /// Fork a new version from `full.recipe.id`.
    ///
    /// The predecessor must be the latest version of its lineage; it is
    /// flipped to history and the new leaf inserted in one transaction. On
    /// success `full` describes the new leaf.
    pub fn update_full_recipe(&self, full: &mut FullRecipe) -> Result<()> {
        normalize_full_recipe(full)?;
        let predecessor_id = full.recipe.id;

        let id = self.write("update_full_recipe", |tx| {
            let predecessor = tx.query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![predecessor_id],
                Self::recipe_from_row,
            )?;
            if !predecessor.is_latest {
                return Err(StoreError::EditConflict);
            }

            let now = now();
            let flipped = tx.execute(
                "UPDATE recipes SET is_latest = 0, last_edited_at = ?1
                 WHERE id = ?2 AND is_latest = 1",
                params![now, predecessor_id],
            )?;
            if flipped == 0 {
                return Err(StoreError::EditConflict);
            }

            tx.execute(
                "INSERT INTO recipes
                    (name, creator_id, created_at, last_edited_at, notes, parent_recipe_id, is_latest)
                 VALUES (?1, ?2, ?3, ?3, ?4, ?5, 1)",
                params![
                    full.recipe.name,
                    full.recipe.creator_id,
                    now,
                    full.recipe.notes,
                    predecessor_id
                ],
            )?;
            let id = tx.last_insert_rowid();
            insert_components(tx, id, &now, &full.recipe_components)?;
            Ok(id)
        })?;
        info!(
            recipe_id = id,
            parent_recipe_id = predecessor_id,
            steps = full.step_count(),
            "recipe forked"
        );

        *full = self.read("load_full_recipe", |tx| load_full_recipe(tx, id))?;
        Ok(())
    }

    /// Change the quantity and description of one step of a latest version,
    /// addressed by `step.recipe_id` and `step.step_no`. Steps of history
    /// versions are immutable.
    pub fn update_recipe_step(&self, step: &RecipeComponent) -> Result<RecipeComponent> {
        let mut v = Validator::new();
        validate_recipe_component(&mut v, "", step);
        v.into_result()?;

        let updated = self.write("update_recipe_step", |tx| {
            let now = now();
            let changed = tx.execute(
                "UPDATE recipe_components SET quantity = ?1, step_description = ?2
                 WHERE recipe_id = ?3 AND step_no = ?4",
                params![step.quantity, step.step_description, step.recipe_id, step.step_no],
            )?;
            if changed == 0 {
                return Err(StoreError::RecordNotFound);
            }
            tx.execute(
                "UPDATE recipes SET last_edited_at = ?1 WHERE id = ?2",
                params![now, step.recipe_id],
            )?;
            Ok(tx.query_row(
                "SELECT id, recipe_id, pantry_item_id, created_at, quantity, step_no, step_description
                 FROM recipe_components WHERE recipe_id = ?1 AND step_no = ?2",
                params![step.recipe_id, step.step_no],
                |row| {
                    Ok(RecipeComponent {
                        id: row.get(0)?,
                        recipe_id: row.get(1)?,
                        pantry_item_id: row.get(2)?,
                        created_at: row.get(3)?,
                        quantity: row.get(4)?,
                        step_no: row.get(5)?,
                        step_description: row.get(6)?,
                    })
                },
            )?)
        })?;
        info!(recipe_id = step.recipe_id, step_no = step.step_no, "recipe step updated");
        Ok(updated)
    }

    /// Delete a recipe and its steps. A recipe that has been forked cannot be
    /// deleted. Removing the latest version hands that role back to its
    /// parent.
    pub fn delete_recipe(&self, id: i64) -> Result<()> {
        let promoted = self.write("delete_recipe", |tx| {
            let recipe = tx.query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )?;

            tx.execute(
                "DELETE FROM recipe_components WHERE recipe_id = ?1",
                params![id],
            )?;
            let deleted = tx.execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(StoreError::RecordNotFound);
            }

            match recipe.parent_recipe_id {
                Some(parent_id) if recipe.is_latest => {
                    tx.execute(
                        "UPDATE recipes SET is_latest = 1 WHERE id = ?1",
                        params![parent_id],
                    )?;
                    Ok(Some(parent_id))
                }
                _ => Ok(None),
            }
        })?;
        info!(recipe_id = id, promoted = ?promoted, "recipe deleted");
        Ok(())
    }
}
