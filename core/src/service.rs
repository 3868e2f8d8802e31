use std::path::Path;

use chrono::{DateTime, Utc};

use crate::db::{Database, StoreOptions};
use crate::error::{Result, StoreError};
use crate::models::{
    Consumable, ConsumableSearch, Consumed, Filters, FullRecipe, NewConsumable, NewConsumed,
    NewPantryItem, NewUser, PageMetadata, PantryItem, Recipe, RecipeComponent, RecipeDraft,
    RecipeFilters, User,
};

/// Entry point for front ends. Every call names the acting user and only
/// sees what that user may see; the store beneath stays user-agnostic.
pub struct LadleService {
    db: Database,
}

impl LadleService {
    pub fn new(db_path: &Path, options: StoreOptions) -> Result<Self> {
        let db = Database::open_with(db_path, options)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    // --- Users ---

    pub fn register_user(&self, username: &str, email: &str) -> Result<User> {
        self.db.insert_user(&NewUser {
            username: username.to_string(),
            email: email.to_string(),
        })
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.db.get_user(id)
    }

    // --- Consumables & pantry ---

    pub fn add_consumable(&self, consumable: &NewConsumable) -> Result<Consumable> {
        self.db.insert_consumable(consumable)
    }

    pub fn list_consumables(
        &self,
        user_id: i64,
        filters: Filters,
    ) -> Result<(Vec<Consumable>, PageMetadata)> {
        self.db.list_consumables(user_id, filters)
    }

    /// Consumables are shared, so search covers every creator.
    pub fn search_consumables(
        &self,
        search: &ConsumableSearch,
        filters: Filters,
    ) -> Result<(Vec<Consumable>, PageMetadata)> {
        self.db.search_consumables(search, filters)
    }

    pub fn add_pantry_item(
        &self,
        user_id: i64,
        consumable_id: i64,
        name: &str,
    ) -> Result<PantryItem> {
        self.db.insert_pantry_item(&NewPantryItem {
            user_id,
            consumable_id,
            name: name.to_string(),
        })
    }

    pub fn list_pantry_items(&self, user_id: i64) -> Result<Vec<PantryItem>> {
        self.db.list_pantry_items(user_id)
    }

    /// Rename a pantry item or point it at another consumable. Items of other
    /// users are reported as missing.
    pub fn update_pantry_item(
        &self,
        user_id: i64,
        id: i64,
        name: Option<&str>,
        consumable_id: Option<i64>,
    ) -> Result<PantryItem> {
        let mut item = self.db.get_pantry_item(id)?;
        if item.user_id != user_id {
            return Err(StoreError::RecordNotFound);
        }
        if let Some(name) = name {
            item.name = name.to_string();
        }
        if let Some(consumable_id) = consumable_id {
            item.consumable_id = consumable_id;
        }
        self.db.update_pantry_item(&item)
    }

    pub fn remove_pantry_item(&self, user_id: i64, id: i64) -> Result<()> {
        self.db.delete_pantry_item(id, user_id)
    }

    // --- Recipes ---

    pub fn create_recipe(&self, user_id: i64, draft: &RecipeDraft) -> Result<FullRecipe> {
        let mut full = self.resolve_draft(user_id, 0, draft)?;
        self.db.insert_full_recipe(&mut full)?;
        Ok(full)
    }

    /// Fork `recipe_id` into a new version built from `draft`, credited to
    /// `user_id`. Any user may fork any latest version; the root's owner keeps
    /// sight of the whole lineage.
    pub fn fork_recipe(
        &self,
        user_id: i64,
        recipe_id: i64,
        draft: &RecipeDraft,
    ) -> Result<FullRecipe> {
        let mut full = self.resolve_draft(user_id, recipe_id, draft)?;
        self.db.update_full_recipe(&mut full)?;
        Ok(full)
    }

    pub fn get_recipe(&self, user_id: i64, recipe_id: i64) -> Result<FullRecipe> {
        self.db.get_full_recipe(recipe_id, user_id)
    }

    pub fn list_recipes(
        &self,
        user_id: i64,
        filters: &RecipeFilters,
    ) -> Result<(Vec<Recipe>, PageMetadata)> {
        self.db.list_recipes(user_id, filters)
    }

    /// The lineage of `recipe_id`, visible only to the owner of its root.
    pub fn recipe_history(
        &self,
        user_id: i64,
        recipe_id: i64,
        filters: Filters,
    ) -> Result<(Vec<Recipe>, PageMetadata)> {
        let root = self.db.get_lineage_root(recipe_id)?;
        if root.creator_id != user_id {
            return Err(StoreError::RecordNotFound);
        }
        self.db.get_all_ancestors(recipe_id, filters)
    }

    /// Edit one step of the acting user's own recipe in place.
    pub fn update_recipe_step(
        &self,
        user_id: i64,
        recipe_id: i64,
        step_no: i64,
        quantity: Option<f64>,
        step_description: Option<String>,
    ) -> Result<RecipeComponent> {
        let full = self.db.get_full_recipe(recipe_id, user_id)?;
        if full.recipe.creator_id != user_id {
            return Err(StoreError::RecordNotFound);
        }
        let mut step = full
            .recipe_components
            .into_iter()
            .find(|c| c.step_no == step_no)
            .ok_or(StoreError::RecordNotFound)?;
        if let Some(quantity) = quantity {
            step.quantity = quantity;
        }
        if let Some(description) = step_description {
            step.step_description = description;
        }
        self.db.update_recipe_step(&step)
    }

    pub fn delete_recipe(&self, user_id: i64, recipe_id: i64) -> Result<()> {
        let recipe = self.db.get_recipe(recipe_id)?;
        if recipe.creator_id != user_id {
            return Err(StoreError::RecordNotFound);
        }
        self.db.delete_recipe(recipe_id)
    }

    // --- Consumed log ---

    pub fn log_consumed(&self, user_id: i64, mut entry: NewConsumed) -> Result<Consumed> {
        entry.user_id = user_id;
        self.db.insert_consumed(&entry)
    }

    pub fn get_consumed(&self, user_id: i64, id: i64) -> Result<Consumed> {
        let consumed = self.db.get_consumed(id)?;
        if consumed.user_id != user_id {
            return Err(StoreError::RecordNotFound);
        }
        Ok(consumed)
    }

    pub fn list_consumed(
        &self,
        user_id: i64,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Consumed>> {
        self.db.list_consumed(user_id, from, to)
    }

    pub fn update_consumed(
        &self,
        user_id: i64,
        id: i64,
        mut entry: NewConsumed,
    ) -> Result<Consumed> {
        entry.user_id = user_id;
        self.db.update_consumed(id, &entry)
    }

    pub fn delete_consumed(&self, user_id: i64, id: i64) -> Result<()> {
        self.db.delete_consumed(id, user_id)
    }

    /// Look up every pantry item a draft names and assemble the aggregate.
    /// Only the acting user's own pantry is eligible.
    fn resolve_draft(
        &self,
        user_id: i64,
        recipe_id: i64,
        draft: &RecipeDraft,
    ) -> Result<FullRecipe> {
        let mut full = FullRecipe {
            recipe: Recipe {
                id: recipe_id,
                name: draft.name.clone(),
                creator_id: user_id,
                created_at: String::new(),
                last_edited_at: String::new(),
                notes: draft.notes.clone(),
                parent_recipe_id: None,
                is_latest: true,
            },
            recipe_components: Vec::with_capacity(draft.steps.len()),
            pantry_items: Vec::with_capacity(draft.steps.len()),
            consumables: Vec::with_capacity(draft.steps.len()),
        };

        for step in &draft.steps {
            let pantry_item = match self.db.get_pantry_item(step.pantry_item_id) {
                Ok(item) if item.user_id == user_id => item,
                Ok(_) | Err(StoreError::RecordNotFound) => {
                    return Err(StoreError::PantryItemDoesNotExist);
                }
                Err(e) => return Err(e),
            };
            let consumable = self.db.get_consumable(pantry_item.consumable_id)?;

            full.recipe_components.push(RecipeComponent {
                id: 0,
                recipe_id,
                pantry_item_id: pantry_item.id,
                created_at: String::new(),
                quantity: step.quantity,
                step_no: step.step_no,
                step_description: step.step_description.clone(),
            });
            full.pantry_items.push(pantry_item);
            full.consumables.push(consumable);
        }
        Ok(full)
    }
}
