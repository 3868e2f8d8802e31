use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::validator::Validator;

pub const MAX_NAME_CHARS: usize = 50;
pub const MAX_STEP_DESCRIPTION_CHARS: usize = 1000;
pub const MAX_USERNAME_CHARS: usize = 500;

// --- Users ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub created_at: String,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub version: i64,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

// --- Consumables ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementUnit {
    #[serde(rename = "g")]
    Grams,
    #[serde(rename = "ml")]
    Millilitres,
}

impl MeasurementUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grams => "g",
            Self::Millilitres => "ml",
        }
    }
}

impl fmt::Display for MeasurementUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown measurement unit '{0}', must be one of: g, ml")]
pub struct UnknownUnit(String);

impl FromStr for MeasurementUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "g" => Ok(Self::Grams),
            "ml" => Ok(Self::Millilitres),
            other => Err(UnknownUnit(other.to_string())),
        }
    }
}

impl ToSql for MeasurementUnit {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MeasurementUnit {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macronutrients {
    pub carbs: f64,
    pub fats: f64,
    pub proteins: f64,
    pub alcohol: f64,
}

impl Macronutrients {
    #[must_use]
    pub fn total(&self) -> f64 {
        self.carbs + self.fats + self.proteins + self.alcohol
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumable {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub creator_id: i64,
    #[serde(default)]
    pub created_at: String,
    pub name: String,
    pub brand_name: String,
    pub size: f64,
    pub units: MeasurementUnit,
    pub macros: Macronutrients,
}

#[derive(Debug, Clone)]
pub struct NewConsumable {
    pub creator_id: i64,
    pub name: String,
    pub brand_name: String,
    pub size: f64,
    pub units: MeasurementUnit,
    pub macros: Macronutrients,
}

// --- Pantry ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantryItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    pub consumable_id: i64,
    pub name: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_edited_at: String,
}

#[derive(Debug, Clone)]
pub struct NewPantryItem {
    pub user_id: i64,
    pub consumable_id: i64,
    pub name: String,
}

// --- Recipes ---

/// One ordered instruction of a recipe, bound to a pantry item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeComponent {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub recipe_id: i64,
    pub pantry_item_id: i64,
    #[serde(default)]
    pub created_at: String,
    pub quantity: f64,
    pub step_no: i64,
    #[serde(default)]
    pub step_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub id: i64,
    #[serde(rename = "recipe_name")]
    pub name: String,
    #[serde(default)]
    pub creator_id: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub last_edited_at: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub parent_recipe_id: Option<i64>,
    #[serde(default)]
    pub is_latest: bool,
}

impl Recipe {
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_recipe_id.is_none()
    }
}

/// A recipe with its steps fully resolved. Entry `i` of each of the three
/// sequences describes the same step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullRecipe {
    pub recipe: Recipe,
    pub recipe_components: Vec<RecipeComponent>,
    pub pantry_items: Vec<PantryItem>,
    pub consumables: Vec<Consumable>,
}

impl FullRecipe {
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.recipe_components.len()
    }

    pub fn steps(&self) -> impl Iterator<Item = (&RecipeComponent, &PantryItem, &Consumable)> {
        self.recipe_components
            .iter()
            .zip(&self.pantry_items)
            .zip(&self.consumables)
            .map(|((c, p), s)| (c, p, s))
    }
}

/// What a caller supplies to build a [`FullRecipe`] from pantry item ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDraft {
    #[serde(rename = "recipe_name")]
    pub name: String,
    #[serde(default)]
    pub notes: String,
    pub steps: Vec<DraftStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftStep {
    pub pantry_item_id: i64,
    pub quantity: f64,
    pub step_no: i64,
    #[serde(default)]
    pub step_description: String,
}

// --- Consumed log ---

/// One serving of a recipe eaten by a user, with the macros recorded at the
/// time. `consumed_at` is stored as UTC RFC 3339 so it sorts as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumed {
    pub id: i64,
    pub user_id: i64,
    pub recipe_id: i64,
    pub quantity: f64,
    pub macros: Macronutrients,
    pub consumed_at: String,
    pub created_at: String,
    pub last_edited_at: String,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct NewConsumed {
    pub user_id: i64,
    pub recipe_id: i64,
    pub quantity: f64,
    pub macros: Macronutrients,
    pub consumed_at: DateTime<Utc>,
    pub notes: String,
}

// --- Pagination ---

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl Filters {
    #[must_use]
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    #[must_use]
    pub fn limit(&self) -> i64 {
        self.page_size
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecipeFilters {
    pub filters: Filters,
    pub latest_only: bool,
    pub name_search: Option<String>,
}

/// Consumable lookup by name and brand. Absent terms are ignored; with both
/// present, `require_both` picks AND over OR.
#[derive(Debug, Clone, Default)]
pub struct ConsumableSearch {
    pub name: Option<String>,
    pub brand_name: Option<String>,
    pub require_both: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl PageMetadata {
    #[must_use]
    pub fn calculate(total_records: i64, filters: Filters) -> Self {
        let last_page = if total_records == 0 {
            1
        } else {
            (total_records + filters.page_size - 1) / filters.page_size
        };
        Self {
            current_page: filters.page,
            page_size: filters.page_size,
            first_page: 1,
            last_page,
            total_records,
        }
    }
}

// --- Validation ---

fn field(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn check_name(v: &mut Validator, value: &str, field_name: String) {
    v.check(!value.trim().is_empty(), field_name.clone(), "must be provided");
    v.check(
        value.chars().count() <= MAX_NAME_CHARS,
        field_name,
        format!("must be at most {MAX_NAME_CHARS} characters"),
    );
}

pub fn validate_filters(v: &mut Validator, filters: &Filters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(
        filters.page <= MAX_PAGE,
        "page",
        format!("must be at most {MAX_PAGE}"),
    );
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(
        filters.page_size <= MAX_PAGE_SIZE,
        "page_size",
        format!("must be at most {MAX_PAGE_SIZE}"),
    );
}

pub fn validate_user(v: &mut Validator, user: &NewUser) {
    v.check(!user.username.trim().is_empty(), "username", "must be provided");
    v.check(
        user.username.chars().count() <= MAX_USERNAME_CHARS,
        "username",
        format!("must be at most {MAX_USERNAME_CHARS} characters"),
    );
    v.check(!user.email.is_empty(), "email", "must be provided");
    v.check(
        user.email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !user.email.contains(char::is_whitespace)
        }),
        "email",
        "must be a valid email address",
    );
}

pub fn validate_macronutrients(v: &mut Validator, prefix: &str, macros: &Macronutrients) {
    v.check(macros.carbs >= 0.0, field(prefix, "carbs"), "must be non-negative");
    v.check(macros.fats >= 0.0, field(prefix, "fats"), "must be non-negative");
    v.check(macros.proteins >= 0.0, field(prefix, "proteins"), "must be non-negative");
    v.check(macros.alcohol >= 0.0, field(prefix, "alcohol"), "must be non-negative");
    v.check(
        macros.total() > 0.0,
        field(prefix, "macronutrients"),
        "at least one macronutrient must be positive",
    );
}

/// Units are constrained by [`MeasurementUnit`], so only the remaining fields
/// need checking here.
pub fn validate_consumable(v: &mut Validator, prefix: &str, consumable: &Consumable) {
    validate_consumable_fields(
        v,
        prefix,
        &consumable.name,
        &consumable.brand_name,
        consumable.size,
        &consumable.macros,
    );
}

pub fn validate_new_consumable(v: &mut Validator, consumable: &NewConsumable) {
    validate_consumable_fields(
        v,
        "",
        &consumable.name,
        &consumable.brand_name,
        consumable.size,
        &consumable.macros,
    );
}

fn validate_consumable_fields(
    v: &mut Validator,
    prefix: &str,
    name: &str,
    brand_name: &str,
    size: f64,
    macros: &Macronutrients,
) {
    check_name(v, name, field(prefix, "name"));
    check_name(v, brand_name, field(prefix, "brand_name"));
    v.check(size > 0.0, field(prefix, "size"), "must be positive");
    validate_macronutrients(v, &field(prefix, "macros"), macros);
}

pub fn validate_pantry_item(v: &mut Validator, prefix: &str, name: &str) {
    check_name(v, name, field(prefix, "pantry_item_name"));
}

pub fn validate_recipe(v: &mut Validator, recipe: &Recipe) {
    check_name(v, &recipe.name, "recipe_name".to_string());
}

pub fn validate_recipe_component(v: &mut Validator, prefix: &str, component: &RecipeComponent) {
    v.check(component.quantity > 0.0, field(prefix, "quantity"), "must be positive");
    v.check(component.step_no > 0, field(prefix, "step_no"), "must be positive");
    v.check(
        component.step_description.chars().count() <= MAX_STEP_DESCRIPTION_CHARS,
        field(prefix, "step_description"),
        format!("must be at most {MAX_STEP_DESCRIPTION_CHARS} characters"),
    );
}

pub fn validate_consumed(v: &mut Validator, consumed: &NewConsumed) {
    v.check(consumed.quantity > 0.0, "quantity", "must be positive");
    validate_macronutrients(v, "macros", &consumed.macros);
    v.check(
        consumed.notes.chars().count() <= MAX_STEP_DESCRIPTION_CHARS,
        "notes",
        format!("must be at most {MAX_STEP_DESCRIPTION_CHARS} characters"),
    );
}
