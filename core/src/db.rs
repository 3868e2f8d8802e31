use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::gateway::now;
use crate::models::{
    Consumable, ConsumableSearch, Filters, Macronutrients, NewConsumable, NewPantryItem, NewUser,
    PageMetadata, PantryItem, Recipe, RecipeFilters, User, validate_consumable, validate_filters,
    validate_new_consumable, validate_pantry_item, validate_user,
};
use crate::validator::Validator;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on [`StoreOptions::timeout`]. SQLite's busy timeout is an
/// `int` of milliseconds, so anything near `i32::MAX` ms is refused.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Deadline for one store operation; also used as SQLite's busy timeout.
    pub timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl StoreOptions {
    pub fn validate(&self) -> Result<()> {
        let mut v = Validator::new();
        v.check(
            self.timeout <= MAX_TIMEOUT,
            "timeout",
            format!("must be at most {} seconds", MAX_TIMEOUT.as_secs()),
        );
        v.into_result()
    }
}

pub(crate) const RECIPE_COLUMNS: &str =
    "id, name, creator_id, created_at, last_edited_at, notes, parent_recipe_id, is_latest";

const CONSUMABLE_COLUMNS: &str =
    "id, creator_id, created_at, name, brand_name, size, units, carbs, fats, proteins, alcohol";

const PANTRY_ITEM_COLUMNS: &str = "id, user_id, consumable_id, name, created_at, last_edited_at";

/// Substring pattern for `LIKE ... ESCAPE '\'` with the user's own `%`, `_`
/// and `\` matched literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Trimmed search term, or `None` when there is nothing to match on.
fn search_term(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(like_pattern)
}

const CONSUMABLE_MATCH_ALL: &str = "(?1 IS NULL OR name LIKE ?1 ESCAPE '\\')
     AND (?2 IS NULL OR brand_name LIKE ?2 ESCAPE '\\')";

const CONSUMABLE_MATCH_ANY: &str = "((?1 IS NULL AND ?2 IS NULL)
     OR (?1 IS NOT NULL AND name LIKE ?1 ESCAPE '\\')
     OR (?2 IS NOT NULL AND brand_name LIKE ?2 ESCAPE '\\'))";

pub struct Database {
    pub(crate) conn: Connection,
    pub(crate) options: StoreOptions,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: &Path, options: StoreOptions) -> Result<Self> {
        options.validate()?;
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened database");
        Self::init(conn, options)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(StoreOptions::default())
    }

    pub fn open_in_memory_with(options: StoreOptions) -> Result<Self> {
        options.validate()?;
        Self::init(Connection::open_in_memory()?, options)
    }

    fn init(conn: Connection, options: StoreOptions) -> Result<Self> {
        conn.busy_timeout(options.timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let db = Database { conn, options };
        db.migrate()?;
        Ok(db)
    }

    #[must_use]
    pub fn options(&self) -> StoreOptions {
        self.options
    }

    #[allow(clippy::too_many_lines)]
    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TEXT NOT NULL,
                    username TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    version INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS consumables (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    creator_id INTEGER NOT NULL REFERENCES users(id),
                    created_at TEXT NOT NULL,
                    name TEXT NOT NULL,
                    brand_name TEXT NOT NULL,
                    size REAL NOT NULL CHECK (size > 0),
                    units TEXT NOT NULL CHECK (units IN ('g', 'ml')),
                    carbs REAL NOT NULL CHECK (carbs >= 0),
                    fats REAL NOT NULL CHECK (fats >= 0),
                    proteins REAL NOT NULL CHECK (proteins >= 0),
                    alcohol REAL NOT NULL CHECK (alcohol >= 0)
                );

                CREATE TABLE IF NOT EXISTS pantry_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    consumable_id INTEGER NOT NULL REFERENCES consumables(id),
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    last_edited_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    creator_id INTEGER NOT NULL REFERENCES users(id),
                    created_at TEXT NOT NULL,
                    last_edited_at TEXT NOT NULL,
                    notes TEXT NOT NULL DEFAULT '',
                    parent_recipe_id INTEGER REFERENCES recipes(id),
                    is_latest INTEGER NOT NULL DEFAULT 1 CHECK (is_latest IN (0, 1))
                );

                CREATE TABLE IF NOT EXISTS recipe_components (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id),
                    pantry_item_id INTEGER NOT NULL REFERENCES pantry_items(id),
                    created_at TEXT NOT NULL,
                    quantity REAL NOT NULL CHECK (quantity > 0),
                    step_no INTEGER NOT NULL CHECK (step_no > 0),
                    step_description TEXT NOT NULL DEFAULT '',
                    UNIQUE (recipe_id, step_no)
                );

                CREATE INDEX IF NOT EXISTS idx_consumables_creator ON consumables(creator_id);
                CREATE INDEX IF NOT EXISTS idx_pantry_items_user ON pantry_items(user_id);
                CREATE INDEX IF NOT EXISTS idx_recipes_creator ON recipes(creator_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_components_recipe ON recipe_components(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_components_pantry_item ON recipe_components(pantry_item_id);

                -- A version has at most one successor.
                CREATE UNIQUE INDEX IF NOT EXISTS idx_recipes_parent
                    ON recipes(parent_recipe_id) WHERE parent_recipe_id IS NOT NULL;

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            // Named violations. Each trigger raises
            // '<verb> on <table> violates <constraint>' for gateway::map_constraint.
            self.conn.execute_batch(
                "CREATE TRIGGER IF NOT EXISTS consumables_creator_id_fkey
                 BEFORE INSERT ON consumables
                 WHEN NOT EXISTS (SELECT 1 FROM users WHERE id = NEW.creator_id)
                 BEGIN
                     SELECT RAISE(ABORT, 'insert on consumables violates consumables_creator_id_fkey');
                 END;

                 CREATE TRIGGER IF NOT EXISTS consumables_referenced_update
                 BEFORE UPDATE ON consumables
                 WHEN EXISTS (SELECT 1 FROM pantry_items WHERE consumable_id = OLD.id)
                 BEGIN
                     SELECT RAISE(ABORT, 'update on consumables violates consumables_referenced');
                 END;

                 CREATE TRIGGER IF NOT EXISTS consumables_referenced_delete
                 BEFORE DELETE ON consumables
                 WHEN EXISTS (SELECT 1 FROM pantry_items WHERE consumable_id = OLD.id)
                 BEGIN
                     SELECT RAISE(ABORT, 'delete on consumables violates consumables_referenced');
                 END;

                 CREATE TRIGGER IF NOT EXISTS pantry_items_user_id_fkey
                 BEFORE INSERT ON pantry_items
                 WHEN NOT EXISTS (SELECT 1 FROM users WHERE id = NEW.user_id)
                 BEGIN
                     SELECT RAISE(ABORT, 'insert on pantry_items violates pantry_items_user_id_fkey');
                 END;

                 CREATE TRIGGER IF NOT EXISTS pantry_items_consumable_id_fkey
                 BEFORE INSERT ON pantry_items
                 WHEN NOT EXISTS (SELECT 1 FROM consumables WHERE id = NEW.consumable_id)
                 BEGIN
                     SELECT RAISE(ABORT, 'insert on pantry_items violates pantry_items_consumable_id_fkey');
                 END;

                 CREATE TRIGGER IF NOT EXISTS pantry_items_referenced
                 BEFORE DELETE ON pantry_items
                 WHEN EXISTS (SELECT 1 FROM recipe_components WHERE pantry_item_id = OLD.id)
                 BEGIN
                     SELECT RAISE(ABORT, 'delete on pantry_items violates pantry_items_referenced');
                 END;

                 CREATE TRIGGER IF NOT EXISTS recipes_creator_id_fkey
                 BEFORE INSERT ON recipes
                 WHEN NOT EXISTS (SELECT 1 FROM users WHERE id = NEW.creator_id)
                 BEGIN
                     SELECT RAISE(ABORT, 'insert on recipes violates recipes_creator_id_fkey');
                 END;

                 CREATE TRIGGER IF NOT EXISTS recipes_parent_recipe_id_fkey_insert
                 BEFORE INSERT ON recipes
                 WHEN NEW.parent_recipe_id IS NOT NULL
                  AND NOT EXISTS (SELECT 1 FROM recipes WHERE id = NEW.parent_recipe_id)
                 BEGIN
                     SELECT RAISE(ABORT, 'insert on recipes violates recipes_parent_recipe_id_fkey');
                 END;

                 CREATE TRIGGER IF NOT EXISTS recipes_parent_recipe_id_fkey_delete
                 BEFORE DELETE ON recipes
                 WHEN EXISTS (SELECT 1 FROM recipes WHERE parent_recipe_id = OLD.id)
                 BEGIN
                     SELECT RAISE(ABORT, 'delete on recipes violates recipes_parent_recipe_id_fkey');
                 END;

                 CREATE TRIGGER IF NOT EXISTS recipes_parent_recipe_id_immutable
                 BEFORE UPDATE OF parent_recipe_id ON recipes
                 WHEN NEW.parent_recipe_id IS NOT OLD.parent_recipe_id
                 BEGIN
                     SELECT RAISE(ABORT, 'update on recipes violates recipes_parent_recipe_id_immutable');
                 END;

                 CREATE TRIGGER IF NOT EXISTS recipe_components_recipe_id_fkey
                 BEFORE INSERT ON recipe_components
                 WHEN NOT EXISTS (SELECT 1 FROM recipes WHERE id = NEW.recipe_id)
                 BEGIN
                     SELECT RAISE(ABORT, 'insert on recipe_components violates recipe_components_recipe_id_fkey');
                 END;

                 CREATE TRIGGER IF NOT EXISTS recipe_components_pantry_item_id_fkey
                 BEFORE INSERT ON recipe_components
                 WHEN NOT EXISTS (SELECT 1 FROM pantry_items WHERE id = NEW.pantry_item_id)
                 BEGIN
                     SELECT RAISE(ABORT, 'insert on recipe_components violates recipe_components_pantry_item_id_fkey');
                 END;

                 PRAGMA user_version = 2;",
            )?;
        }

        if version < 3 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS consumed (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id),
                    quantity REAL NOT NULL CHECK (quantity > 0),
                    carbs REAL NOT NULL CHECK (carbs >= 0),
                    fats REAL NOT NULL CHECK (fats >= 0),
                    proteins REAL NOT NULL CHECK (proteins >= 0),
                    alcohol REAL NOT NULL CHECK (alcohol >= 0),
                    consumed_at TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    last_edited_at TEXT NOT NULL,
                    notes TEXT NOT NULL DEFAULT ''
                );

                CREATE INDEX IF NOT EXISTS idx_consumed_user_at ON consumed(user_id, consumed_at);

                CREATE TRIGGER IF NOT EXISTS consumed_user_id_fkey
                BEFORE INSERT ON consumed
                WHEN NOT EXISTS (SELECT 1 FROM users WHERE id = NEW.user_id)
                BEGIN
                    SELECT RAISE(ABORT, 'insert on consumed violates consumed_user_id_fkey');
                END;

                CREATE TRIGGER IF NOT EXISTS consumed_recipe_id_fkey_insert
                BEFORE INSERT ON consumed
                WHEN NOT EXISTS (SELECT 1 FROM recipes WHERE id = NEW.recipe_id)
                BEGIN
                    SELECT RAISE(ABORT, 'insert on consumed violates consumed_recipe_id_fkey');
                END;

                CREATE TRIGGER IF NOT EXISTS consumed_recipe_id_fkey_update
                BEFORE UPDATE OF recipe_id ON consumed
                WHEN NOT EXISTS (SELECT 1 FROM recipes WHERE id = NEW.recipe_id)
                BEGIN
                    SELECT RAISE(ABORT, 'update on consumed violates consumed_recipe_id_fkey');
                END;

                CREATE TRIGGER IF NOT EXISTS consumed_recipe_id_fkey_delete
                BEFORE DELETE ON recipes
                WHEN EXISTS (SELECT 1 FROM consumed WHERE recipe_id = OLD.id)
                BEGIN
                    SELECT RAISE(ABORT, 'delete on recipes violates consumed_recipe_id_fkey');
                END;

                CREATE TRIGGER IF NOT EXISTS pantry_items_consumable_id_fkey_update
                BEFORE UPDATE OF consumable_id ON pantry_items
                WHEN NOT EXISTS (SELECT 1 FROM consumables WHERE id = NEW.consumable_id)
                BEGIN
                    SELECT RAISE(ABORT, 'update on pantry_items violates pantry_items_consumable_id_fkey');
                END;

                -- Steps already written keep the nutrition they were written with.
                CREATE TRIGGER IF NOT EXISTS pantry_items_referenced_update
                BEFORE UPDATE OF consumable_id ON pantry_items
                WHEN NEW.consumable_id IS NOT OLD.consumable_id
                 AND EXISTS (SELECT 1 FROM recipe_components WHERE pantry_item_id = OLD.id)
                BEGIN
                    SELECT RAISE(ABORT, 'update on pantry_items violates pantry_items_referenced');
                END;

                CREATE TRIGGER IF NOT EXISTS recipe_components_history_immutable
                BEFORE UPDATE ON recipe_components
                WHEN (SELECT is_latest FROM recipes WHERE id = OLD.recipe_id) = 0
                BEGIN
                    SELECT RAISE(ABORT, 'update on recipe_components violates recipe_components_history_immutable');
                END;

                PRAGMA user_version = 3;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            created_at: row.get(1)?,
            username: row.get(2)?,
            email: row.get(3)?,
            version: row.get(4)?,
        })
    }

    pub(crate) fn consumable_from_row(row: &rusqlite::Row) -> rusqlite::Result<Consumable> {
        Ok(Consumable {
            id: row.get(0)?,
            creator_id: row.get(1)?,
            created_at: row.get(2)?,
            name: row.get(3)?,
            brand_name: row.get(4)?,
            size: row.get(5)?,
            units: row.get(6)?,
            macros: Macronutrients {
                carbs: row.get(7)?,
                fats: row.get(8)?,
                proteins: row.get(9)?,
                alcohol: row.get(10)?,
            },
        })
    }

    pub(crate) fn pantry_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<PantryItem> {
        Ok(PantryItem {
            id: row.get(0)?,
            user_id: row.get(1)?,
            consumable_id: row.get(2)?,
            name: row.get(3)?,
            created_at: row.get(4)?,
            last_edited_at: row.get(5)?,
        })
    }

    pub(crate) fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            name: row.get(1)?,
            creator_id: row.get(2)?,
            created_at: row.get(3)?,
            last_edited_at: row.get(4)?,
            notes: row.get(5)?,
            parent_recipe_id: row.get(6)?,
            is_latest: row.get(7)?,
        })
    }

    // --- Users ---

    pub fn insert_user(&self, user: &NewUser) -> Result<User> {
        let mut v = Validator::new();
        validate_user(&mut v, user);
        v.into_result()?;

        let user = self.write("insert_user", |tx| {
            tx.execute(
                "INSERT INTO users (created_at, username, email) VALUES (?1, ?2, ?3)",
                params![now(), user.username, user.email],
            )?;
            let id = tx.last_insert_rowid();
            Ok(tx.query_row(
                "SELECT id, created_at, username, email, version FROM users WHERE id = ?1",
                params![id],
                Self::user_from_row,
            )?)
        })?;
        info!(user_id = user.id, "user created");
        Ok(user)
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        Ok(self.conn.query_row(
            "SELECT id, created_at, username, email, version FROM users WHERE id = ?1",
            params![id],
            Self::user_from_row,
        )?)
    }

    // --- Consumables ---

    pub fn insert_consumable(&self, consumable: &NewConsumable) -> Result<Consumable> {
        let mut v = Validator::new();
        validate_new_consumable(&mut v, consumable);
        v.into_result()?;

        self.write("insert_consumable", |tx| {
            tx.execute(
                "INSERT INTO consumables
                    (creator_id, created_at, name, brand_name, size, units, carbs, fats, proteins, alcohol)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    consumable.creator_id,
                    now(),
                    consumable.name,
                    consumable.brand_name,
                    consumable.size,
                    consumable.units,
                    consumable.macros.carbs,
                    consumable.macros.fats,
                    consumable.macros.proteins,
                    consumable.macros.alcohol,
                ],
            )?;
            let id = tx.last_insert_rowid();
            Ok(tx.query_row(
                &format!("SELECT {CONSUMABLE_COLUMNS} FROM consumables WHERE id = ?1"),
                params![id],
                Self::consumable_from_row,
            )?)
        })
    }

    pub fn get_consumable(&self, id: i64) -> Result<Consumable> {
        Ok(self.conn.query_row(
            &format!("SELECT {CONSUMABLE_COLUMNS} FROM consumables WHERE id = ?1"),
            params![id],
            Self::consumable_from_row,
        )?)
    }

    /// A page of `creator_id`'s consumables, oldest first.
    pub fn list_consumables(
        &self,
        creator_id: i64,
        filters: Filters,
    ) -> Result<(Vec<Consumable>, PageMetadata)> {
        let mut v = Validator::new();
        validate_filters(&mut v, &filters);
        v.into_result()?;

        self.read("list_consumables", |tx| {
            let total: i64 = tx.query_row(
                "SELECT COUNT(*) FROM consumables WHERE creator_id = ?1",
                params![creator_id],
                |row| row.get(0),
            )?;
            let mut stmt = tx.prepare(&format!(
                "SELECT {CONSUMABLE_COLUMNS} FROM consumables
                 WHERE creator_id = ?1
                 ORDER BY id ASC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(
                    params![creator_id, filters.limit(), filters.offset()],
                    Self::consumable_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((rows, PageMetadata::calculate(total, filters)))
        })
    }

    /// Consumables from every creator whose name and/or brand contain the
    /// search terms.
    pub fn search_consumables(
        &self,
        search: &ConsumableSearch,
        filters: Filters,
    ) -> Result<(Vec<Consumable>, PageMetadata)> {
        let mut v = Validator::new();
        validate_filters(&mut v, &filters);
        v.into_result()?;

        let name = search_term(search.name.as_deref());
        let brand = search_term(search.brand_name.as_deref());
        let matcher = if search.require_both {
            CONSUMABLE_MATCH_ALL
        } else {
            CONSUMABLE_MATCH_ANY
        };

        self.read("search_consumables", |tx| {
            let total: i64 = tx.query_row(
                &format!("SELECT COUNT(*) FROM consumables WHERE {matcher}"),
                params![name, brand],
                |row| row.get(0),
            )?;
            let mut stmt = tx.prepare(&format!(
                "SELECT {CONSUMABLE_COLUMNS} FROM consumables
                 WHERE {matcher}
                 ORDER BY id ASC
                 LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt
                .query_map(
                    params![name, brand, filters.limit(), filters.offset()],
                    Self::consumable_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((rows, PageMetadata::calculate(total, filters)))
        })
    }

    /// Rewrite a consumable's nutritional fields. Fails with `RecordInUse`
    /// once any pantry item points at it.
    pub fn update_consumable(&self, consumable: &Consumable) -> Result<()> {
        let mut v = Validator::new();
        validate_consumable(&mut v, "", consumable);
        v.into_result()?;

        let changed = self.write("update_consumable", |tx| {
            Ok(tx.execute(
                "UPDATE consumables
                 SET name = ?1, brand_name = ?2, size = ?3, units = ?4,
                     carbs = ?5, fats = ?6, proteins = ?7, alcohol = ?8
                 WHERE id = ?9",
                params![
                    consumable.name,
                    consumable.brand_name,
                    consumable.size,
                    consumable.units,
                    consumable.macros.carbs,
                    consumable.macros.fats,
                    consumable.macros.proteins,
                    consumable.macros.alcohol,
                    consumable.id,
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::RecordNotFound);
        }
        Ok(())
    }

    pub fn delete_consumable(&self, id: i64) -> Result<()> {
        let changed = self.write("delete_consumable", |tx| {
            Ok(tx.execute("DELETE FROM consumables WHERE id = ?1", params![id])?)
        })?;
        if changed == 0 {
            return Err(StoreError::RecordNotFound);
        }
        Ok(())
    }

    // --- Pantry ---

    pub fn insert_pantry_item(&self, item: &NewPantryItem) -> Result<PantryItem> {
        let mut v = Validator::new();
        validate_pantry_item(&mut v, "", &item.name);
        v.into_result()?;

        self.write("insert_pantry_item", |tx| {
            let now = now();
            tx.execute(
                "INSERT INTO pantry_items (user_id, consumable_id, name, created_at, last_edited_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![item.user_id, item.consumable_id, item.name, now],
            )?;
            let id = tx.last_insert_rowid();
            Ok(tx.query_row(
                &format!("SELECT {PANTRY_ITEM_COLUMNS} FROM pantry_items WHERE id = ?1"),
                params![id],
                Self::pantry_item_from_row,
            )?)
        })
    }

    pub fn get_pantry_item(&self, id: i64) -> Result<PantryItem> {
        Ok(self.conn.query_row(
            &format!("SELECT {PANTRY_ITEM_COLUMNS} FROM pantry_items WHERE id = ?1"),
            params![id],
            Self::pantry_item_from_row,
        )?)
    }

    pub fn list_pantry_items(&self, user_id: i64) -> Result<Vec<PantryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PANTRY_ITEM_COLUMNS} FROM pantry_items WHERE user_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![user_id], Self::pantry_item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Rename `item` or point it at another consumable. Scoped to
    /// `item.user_id`; the consumable of an item already used by a recipe
    /// step cannot change (`RecordInUse`).
    pub fn update_pantry_item(&self, item: &PantryItem) -> Result<PantryItem> {
        let mut v = Validator::new();
        validate_pantry_item(&mut v, "", &item.name);
        v.into_result()?;

        self.write("update_pantry_item", |tx| {
            let changed = tx.execute(
                "UPDATE pantry_items
                 SET name = ?1, consumable_id = ?2, last_edited_at = ?3
                 WHERE id = ?4 AND user_id = ?5",
                params![item.name, item.consumable_id, now(), item.id, item.user_id],
            )?;
            if changed == 0 {
                return Err(StoreError::RecordNotFound);
            }
            Ok(tx.query_row(
                &format!("SELECT {PANTRY_ITEM_COLUMNS} FROM pantry_items WHERE id = ?1"),
                params![item.id],
                Self::pantry_item_from_row,
            )?)
        })
    }

    /// Delete one of `user_id`'s pantry items. Items used by a recipe step
    /// stay put (`RecordInUse`).
    pub fn delete_pantry_item(&self, id: i64, user_id: i64) -> Result<()> {
        let changed = self.write("delete_pantry_item", |tx| {
            Ok(tx.execute(
                "DELETE FROM pantry_items WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::RecordNotFound);
        }
        Ok(())
    }

    // --- Recipes ---

    pub fn get_recipe(&self, id: i64) -> Result<Recipe> {
        Ok(self.conn.query_row(
            &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
            params![id],
            Self::recipe_from_row,
        )?)
    }

    /// The version `recipe` was forked from, or `None` for a lineage root.
    pub fn get_parent_recipe(&self, recipe: &Recipe) -> Result<Option<Recipe>> {
        let Some(parent_id) = recipe.parent_recipe_id else {
            return Ok(None);
        };
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![parent_id],
                Self::recipe_from_row,
            )
            .optional()?)
    }

    /// Recipes created by `creator_id`, newest first.
    pub fn list_recipes(
        &self,
        creator_id: i64,
        filters: &RecipeFilters,
    ) -> Result<(Vec<Recipe>, PageMetadata)> {
        let mut v = Validator::new();
        validate_filters(&mut v, &filters.filters);
        v.into_result()?;

        let search = search_term(filters.name_search.as_deref());

        self.read("list_recipes", |tx| {
            let total: i64 = tx.query_row(
                "SELECT COUNT(*) FROM recipes
                 WHERE creator_id = ?1
                   AND (?2 = 0 OR is_latest = 1)
                   AND (?3 IS NULL OR name LIKE ?3 ESCAPE '\\')",
                params![creator_id, filters.latest_only, search],
                |row| row.get(0),
            )?;
            let mut stmt = tx.prepare(&format!(
                "SELECT {RECIPE_COLUMNS} FROM recipes
                 WHERE creator_id = ?1
                   AND (?2 = 0 OR is_latest = 1)
                   AND (?3 IS NULL OR name LIKE ?3 ESCAPE '\\')
                 ORDER BY id DESC
                 LIMIT ?4 OFFSET ?5"
            ))?;
            let recipes = stmt
                .query_map(
                    params![
                        creator_id,
                        filters.latest_only,
                        search,
                        filters.filters.limit(),
                        filters.filters.offset(),
                    ],
                    Self::recipe_from_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((recipes, PageMetadata::calculate(total, filters.filters)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeasurementUnit;

    fn sample_user(db: &Database) -> User {
        db.insert_user(&NewUser {
            username: "test1".to_string(),
            email: "test1@gmail.com".to_string(),
        })
        .unwrap()
    }

    fn sample_consumable(creator_id: i64) -> NewConsumable {
        NewConsumable {
            creator_id,
            name: "Lasagne Pasta Large".to_string(),
            brand_name: "San Remo".to_string(),
            size: 62.5,
            units: MeasurementUnit::Grams,
            macros: Macronutrients {
                carbs: 46.6,
                fats: 0.9,
                proteins: 7.9,
                alcohol: 0.0,
            },
        }
    }

    fn insert_recipe_row(db: &Database, creator_id: i64, name: &str, parent: Option<i64>) -> i64 {
        db.conn
            .execute(
                "INSERT INTO recipes (name, creator_id, created_at, last_edited_at, parent_recipe_id, is_latest)
                 VALUES (?1, ?2, ?3, ?3, ?4, 1)",
                params![name, creator_id, now(), parent],
            )
            .unwrap();
        db.conn.last_insert_rowid()
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ladle.db");
        {
            let db = Database::open(&path).unwrap();
            sample_user(&db);
        }
        let db = Database::open(&path).unwrap();
        let version: i64 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 3);
        assert_eq!(db.get_user(1).unwrap().username, "test1");
    }

    #[test]
    fn test_oversized_timeout_rejected() {
        let options = StoreOptions {
            timeout: Duration::from_millis(3_000_000_000),
        };
        let err = Database::open_in_memory_with(options).err().unwrap();
        assert!(err.validation_errors().unwrap().contains("timeout", "at most"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ladle.db");
        assert!(Database::open_with(&path, options).is_err());
        assert!(!path.exists());

        assert!(Database::open_in_memory_with(StoreOptions { timeout: MAX_TIMEOUT }).is_ok());
    }

    #[test]
    fn test_open_applies_options() {
        let db = Database::open_in_memory_with(StoreOptions {
            timeout: Duration::from_millis(250),
        })
        .unwrap();
        assert_eq!(db.options().timeout, Duration::from_millis(250));
        let fk: bool = db
            .conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert!(fk);
    }

    #[test]
    fn test_insert_and_get_user() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        assert_eq!(user.email, "test1@gmail.com");
        assert_eq!(user.version, 1);
        assert!(!user.created_at.is_empty());

        let fetched = db.get_user(user.id).unwrap();
        assert_eq!(fetched.username, "test1");
    }

    #[test]
    fn test_duplicate_email_ignores_case() {
        let db = Database::open_in_memory().unwrap();
        sample_user(&db);
        let err = db
            .insert_user(&NewUser {
                username: "other".to_string(),
                email: "TEST1@gmail.com".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[test]
    fn test_invalid_user_never_written() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .insert_user(&NewUser {
                username: String::new(),
                email: "nope".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.validation_errors().unwrap().len(), 2);
        assert!(matches!(db.get_user(1), Err(StoreError::RecordNotFound)));
    }

    #[test]
    fn test_insert_and_list_consumables() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let c = db.insert_consumable(&sample_consumable(user.id)).unwrap();
        assert_eq!(c.units, MeasurementUnit::Grams);
        assert_eq!(c.macros.proteins, 7.9);

        let fetched = db.get_consumable(c.id).unwrap();
        assert_eq!(fetched, c);
        let (rows, meta) = db.list_consumables(user.id, Filters::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(meta.total_records, 1);
        let (rows, _) = db.list_consumables(user.id + 1, Filters::default()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_list_consumables_paginates() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let ids: Vec<i64> = (0..5)
            .map(|_| db.insert_consumable(&sample_consumable(user.id)).unwrap().id)
            .collect();

        let (rows, meta) = db.list_consumables(user.id, Filters::new(2, 2)).unwrap();
        assert_eq!(rows.iter().map(|c| c.id).collect::<Vec<_>>(), ids[2..4].to_vec());
        assert_eq!(meta.last_page, 3);
        assert_eq!(meta.total_records, 5);

        let err = db.list_consumables(user.id, Filters::new(0, 1)).unwrap_err();
        assert!(err.validation_errors().unwrap().contains("page", "greater than zero"));
    }

    #[test]
    fn test_search_consumables() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let pasta = db.insert_consumable(&sample_consumable(user.id)).unwrap();
        let milk = db
            .insert_consumable(&NewConsumable {
                name: "Full Cream Milk".to_string(),
                brand_name: "Dairy Farmers".to_string(),
                units: MeasurementUnit::Millilitres,
                ..sample_consumable(user.id)
            })
            .unwrap();
        let san_remo_milk = db
            .insert_consumable(&NewConsumable {
                name: "Oat Milk".to_string(),
                ..sample_consumable(user.id)
            })
            .unwrap();

        let ids = |search: ConsumableSearch| -> Vec<i64> {
            let (rows, _) = db.search_consumables(&search, Filters::default()).unwrap();
            rows.iter().map(|c| c.id).collect()
        };

        assert_eq!(
            ids(ConsumableSearch {
                name: Some("milk".to_string()),
                ..ConsumableSearch::default()
            }),
            vec![milk.id, san_remo_milk.id]
        );
        // Either term matches by default.
        assert_eq!(
            ids(ConsumableSearch {
                name: Some("milk".to_string()),
                brand_name: Some("san remo".to_string()),
                require_both: false,
            }),
            vec![pasta.id, milk.id, san_remo_milk.id]
        );
        assert_eq!(
            ids(ConsumableSearch {
                name: Some("milk".to_string()),
                brand_name: Some("san remo".to_string()),
                require_both: true,
            }),
            vec![san_remo_milk.id]
        );
        assert_eq!(ids(ConsumableSearch::default()).len(), 3);
        assert!(
            ids(ConsumableSearch {
                name: Some("%".to_string()),
                ..ConsumableSearch::default()
            })
            .is_empty()
        );
    }

    #[test]
    fn test_consumable_missing_creator() {
        let db = Database::open_in_memory().unwrap();
        let err = db.insert_consumable(&sample_consumable(42)).unwrap_err();
        assert!(matches!(err, StoreError::ReferencedUserDoesNotExist));
    }

    #[test]
    fn test_consumable_immutable_once_referenced() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let mut c = db.insert_consumable(&sample_consumable(user.id)).unwrap();

        c.size = 100.0;
        db.update_consumable(&c).unwrap();
        assert_eq!(db.get_consumable(c.id).unwrap().size, 100.0);

        db.insert_pantry_item(&NewPantryItem {
            user_id: user.id,
            consumable_id: c.id,
            name: "Pasta sheets".to_string(),
        })
        .unwrap();

        c.size = 200.0;
        assert!(matches!(
            db.update_consumable(&c),
            Err(StoreError::RecordInUse)
        ));
        assert!(matches!(
            db.delete_consumable(c.id),
            Err(StoreError::RecordInUse)
        ));
        assert_eq!(db.get_consumable(c.id).unwrap().size, 100.0);
    }

    #[test]
    fn test_delete_consumable() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let c = db.insert_consumable(&sample_consumable(user.id)).unwrap();
        db.delete_consumable(c.id).unwrap();
        assert!(matches!(
            db.get_consumable(c.id),
            Err(StoreError::RecordNotFound)
        ));
        assert!(matches!(
            db.delete_consumable(c.id),
            Err(StoreError::RecordNotFound)
        ));
    }

    #[test]
    fn test_pantry_item_references() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let c = db.insert_consumable(&sample_consumable(user.id)).unwrap();

        let err = db
            .insert_pantry_item(&NewPantryItem {
                user_id: user.id,
                consumable_id: c.id + 10,
                name: "Pasta".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ConsumableDoesNotExist));

        let err = db
            .insert_pantry_item(&NewPantryItem {
                user_id: user.id + 10,
                consumable_id: c.id,
                name: "Pasta".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ReferencedUserDoesNotExist));
        assert!(db.list_pantry_items(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_pantry_item_scoped_to_user() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let c = db.insert_consumable(&sample_consumable(user.id)).unwrap();
        let item = db
            .insert_pantry_item(&NewPantryItem {
                user_id: user.id,
                consumable_id: c.id,
                name: "Pasta".to_string(),
            })
            .unwrap();
        assert_eq!(item.created_at, item.last_edited_at);

        assert!(matches!(
            db.delete_pantry_item(item.id, user.id + 1),
            Err(StoreError::RecordNotFound)
        ));
        db.delete_pantry_item(item.id, user.id).unwrap();
        assert!(db.list_pantry_items(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_pantry_item_in_use() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let c = db.insert_consumable(&sample_consumable(user.id)).unwrap();
        let item = db
            .insert_pantry_item(&NewPantryItem {
                user_id: user.id,
                consumable_id: c.id,
                name: "Pasta".to_string(),
            })
            .unwrap();
        let recipe_id = insert_recipe_row(&db, user.id, "Lasagne", None);
        db.conn
            .execute(
                "INSERT INTO recipe_components (recipe_id, pantry_item_id, created_at, quantity, step_no)
                 VALUES (?1, ?2, ?3, 4, 1)",
                params![recipe_id, item.id, now()],
            )
            .unwrap();

        assert!(matches!(
            db.delete_pantry_item(item.id, user.id),
            Err(StoreError::RecordInUse)
        ));

        // Renaming is fine; swapping the consumable under a step is not.
        let other = db.insert_consumable(&sample_consumable(user.id)).unwrap();
        let renamed = db
            .update_pantry_item(&PantryItem {
                name: "Lasagne sheets".to_string(),
                ..item.clone()
            })
            .unwrap();
        assert_eq!(renamed.name, "Lasagne sheets");
        assert!(matches!(
            db.update_pantry_item(&PantryItem {
                consumable_id: other.id,
                ..renamed.clone()
            }),
            Err(StoreError::RecordInUse)
        ));
        assert_eq!(db.get_pantry_item(item.id).unwrap().consumable_id, c.id);
    }

    #[test]
    fn test_update_pantry_item() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let c = db.insert_consumable(&sample_consumable(user.id)).unwrap();
        let other = db.insert_consumable(&sample_consumable(user.id)).unwrap();
        let item = db
            .insert_pantry_item(&NewPantryItem {
                user_id: user.id,
                consumable_id: c.id,
                name: "Pasta".to_string(),
            })
            .unwrap();

        let updated = db
            .update_pantry_item(&PantryItem {
                consumable_id: other.id,
                name: "Pasta (bulk)".to_string(),
                ..item.clone()
            })
            .unwrap();
        assert_eq!(updated.consumable_id, other.id);
        assert_eq!(updated.created_at, item.created_at);

        assert!(matches!(
            db.update_pantry_item(&PantryItem {
                consumable_id: other.id + 10,
                ..updated.clone()
            }),
            Err(StoreError::ConsumableDoesNotExist)
        ));
        assert!(matches!(
            db.update_pantry_item(&PantryItem {
                user_id: user.id + 1,
                ..updated.clone()
            }),
            Err(StoreError::RecordNotFound)
        ));
        let err = db
            .update_pantry_item(&PantryItem {
                name: String::new(),
                ..updated
            })
            .unwrap_err();
        assert!(err.validation_errors().unwrap().contains("pantry_item_name", "must be provided"));
    }

    #[test]
    fn test_parent_recipe_id_is_immutable() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let a = insert_recipe_row(&db, user.id, "A", None);
        let b = insert_recipe_row(&db, user.id, "B", None);

        let err: StoreError = db
            .conn
            .execute(
                "UPDATE recipes SET parent_recipe_id = ?1 WHERE id = ?2",
                params![a, b],
            )
            .unwrap_err()
            .into();
        assert!(matches!(err, StoreError::EditConflict));

        // Touching other columns is fine.
        db.conn
            .execute("UPDATE recipes SET is_latest = 0 WHERE id = ?1", params![a])
            .unwrap();
    }

    #[test]
    fn test_get_parent_recipe() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let a = insert_recipe_row(&db, user.id, "A", None);
        let b = insert_recipe_row(&db, user.id, "B", Some(a));

        let root = db.get_recipe(a).unwrap();
        assert!(root.is_root());
        assert!(db.get_parent_recipe(&root).unwrap().is_none());

        let child = db.get_recipe(b).unwrap();
        let parent = db.get_parent_recipe(&child).unwrap().unwrap();
        assert_eq!(parent.id, a);
        assert!(matches!(db.get_recipe(99), Err(StoreError::RecordNotFound)));
    }

    #[test]
    fn test_list_recipes_filters() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let a = insert_recipe_row(&db, user.id, "Lasagne", None);
        insert_recipe_row(&db, user.id, "Lasagne v2", Some(a));
        insert_recipe_row(&db, user.id, "Pancakes", None);
        db.conn
            .execute("UPDATE recipes SET is_latest = 0 WHERE id = ?1", params![a])
            .unwrap();

        let (all, meta) = db.list_recipes(user.id, &RecipeFilters::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(meta.total_records, 3);
        assert_eq!(all[0].name, "Pancakes");

        let latest = RecipeFilters {
            latest_only: true,
            ..RecipeFilters::default()
        };
        let (rows, meta) = db.list_recipes(user.id, &latest).unwrap();
        assert_eq!(meta.total_records, 2);
        assert!(rows.iter().all(|r| r.is_latest));

        let search = RecipeFilters {
            name_search: Some("lasagne".to_string()),
            ..RecipeFilters::default()
        };
        let (rows, _) = db.list_recipes(user.id, &search).unwrap();
        assert_eq!(rows.len(), 2);

        let paged = RecipeFilters {
            filters: Filters::new(2, 2),
            ..RecipeFilters::default()
        };
        let (rows, meta) = db.list_recipes(user.id, &paged).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(meta.last_page, 2);
        assert_eq!(rows[0].name, "Lasagne");
    }

    #[test]
    fn test_list_recipes_search_is_literal() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user(&db);
        let rye = insert_recipe_row(&db, user.id, "100% rye", None);
        insert_recipe_row(&db, user.id, "Pancakes", None);
        insert_recipe_row(&db, user.id, "Rye_bread", None);

        let search = |term: &str| -> Vec<String> {
            let filters = RecipeFilters {
                name_search: Some(term.to_string()),
                ..RecipeFilters::default()
            };
            let (rows, _) = db.list_recipes(user.id, &filters).unwrap();
            rows.into_iter().map(|r| r.name).collect()
        };

        assert_eq!(search("%"), vec!["100% rye".to_string()]);
        assert_eq!(search("_"), vec!["Rye_bread".to_string()]);
        assert_eq!(search("y_b"), vec!["Rye_bread".to_string()]);
        assert!(search("\\").is_empty());
        assert_eq!(search("RYE").len(), 2);
        assert_eq!(db.get_recipe(rye).unwrap().name, "100% rye");
    }

    #[test]
    fn test_list_recipes_rejects_bad_filters() {
        let db = Database::open_in_memory().unwrap();
        let filters = RecipeFilters {
            filters: Filters::new(0, 0),
            ..RecipeFilters::default()
        };
        let err = db.list_recipes(1, &filters).unwrap_err();
        assert_eq!(err.validation_errors().unwrap().len(), 2);
    }
}
