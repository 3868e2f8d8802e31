use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ladle_core::models::{Consumable, Consumed, PageMetadata, PantryItem, Recipe, RecipeDraft};

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Paged `--json` listings print `{"<key>": [...], "metadata": {...}}`.
pub(crate) fn print_json_page<T: Serialize>(
    key: &str,
    rows: &[T],
    metadata: &PageMetadata,
) -> Result<()> {
    let mut page = serde_json::Map::new();
    page.insert(key.to_string(), serde_json::to_value(rows)?);
    page.insert("metadata".to_string(), serde_json::to_value(metadata)?);
    print_json(&page)
}

/// Deletions print a small acknowledgement in JSON mode.
#[derive(Serialize)]
pub(crate) struct Deleted {
    pub deleted: i64,
}

/// Read a recipe draft from a JSON file.
pub(crate) fn read_draft(path: &Path) -> Result<RecipeDraft> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid recipe draft in {}", path.display()))
}

pub(crate) fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Parent")]
        parent: String,
        #[tabled(rename = "Latest")]
        latest: String,
        #[tabled(rename = "Edited")]
        edited: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            name: truncate(&r.name, 35),
            parent: r.parent_recipe_id.map_or("-".into(), |p| p.to_string()),
            latest: if r.is_latest { "yes" } else { "" }.to_string(),
            edited: r.last_edited_at.chars().take(16).collect(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(0..1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_consumable_table(consumables: &[Consumable]) {
    #[derive(Tabled)]
    struct ConsumableRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Brand")]
        brand: String,
        #[tabled(rename = "Serving")]
        serving: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fats: String,
        #[tabled(rename = "P")]
        proteins: String,
        #[tabled(rename = "Alc")]
        alcohol: String,
    }

    let rows: Vec<ConsumableRow> = consumables
        .iter()
        .map(|c| ConsumableRow {
            id: c.id,
            name: truncate(&c.name, 35),
            brand: truncate(&c.brand_name, 20),
            serving: format!("{}{}", c.size, c.units.as_str()),
            carbs: format!("{:.1}", c.macros.carbs),
            fats: format!("{:.1}", c.macros.fats),
            proteins: format!("{:.1}", c.macros.proteins),
            alcohol: format!("{:.1}", c.macros.alcohol),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_pantry_table(items: &[PantryItem]) {
    #[derive(Tabled)]
    struct PantryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Consumable")]
        consumable_id: i64,
    }

    let rows: Vec<PantryRow> = items
        .iter()
        .map(|p| PantryRow {
            id: p.id,
            name: truncate(&p.name, 40),
            consumable_id: p.consumable_id,
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_consumed_table(entries: &[Consumed]) {
    #[derive(Tabled)]
    struct ConsumedRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "When")]
        when: String,
        #[tabled(rename = "Recipe")]
        recipe_id: i64,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fats: String,
        #[tabled(rename = "P")]
        proteins: String,
        #[tabled(rename = "Alc")]
        alcohol: String,
        #[tabled(rename = "Notes")]
        notes: String,
    }

    let rows: Vec<ConsumedRow> = entries
        .iter()
        .map(|c| ConsumedRow {
            id: c.id,
            when: c.consumed_at.chars().take(16).collect::<String>().replace('T', " "),
            recipe_id: c.recipe_id,
            quantity: format!("{:.2}", c.quantity),
            carbs: format!("{:.1}", c.macros.carbs),
            fats: format!("{:.1}", c.macros.fats),
            proteins: format!("{:.1}", c.macros.proteins),
            alcohol: format!("{:.1}", c.macros.alcohol),
            notes: truncate(&c.notes, 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn page_footer(meta: &PageMetadata) -> String {
    format!(
        "Page {} of {} ({} total)",
        meta.current_page, meta.last_page, meta.total_records
    )
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladle_core::models::Filters;
    use std::io::Write;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Lasagne", 10), "Lasagne");
        assert_eq!(truncate("Lasagne with extra bechamel", 10), "Lasagne...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Crème brûlée maison", 10), "Crème b...");
        assert_eq!(truncate("日清カップヌードル", 8), "日清カップ...");
    }

    #[test]
    fn test_page_footer() {
        let meta = PageMetadata::calculate(45, Filters::new(2, 20));
        assert_eq!(page_footer(&meta), "Page 2 of 3 (45 total)");
    }

    #[test]
    fn test_read_draft() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "recipe_name": "Lasagne",
                "notes": "Layer carefully",
                "steps": [
                    {{"pantry_item_id": 4, "quantity": 2.5, "step_no": 1, "step_description": "Boil sheets"}}
                ]
            }}"#
        )
        .unwrap();

        let draft = read_draft(file.path()).unwrap();
        assert_eq!(draft.name, "Lasagne");
        assert_eq!(draft.steps.len(), 1);
        assert_eq!(draft.steps[0].pantry_item_id, 4);
    }

    #[test]
    fn test_read_draft_errors_name_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = read_draft(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid recipe draft"));

        let missing = Path::new("/nonexistent/draft.json");
        assert!(format!("{:#}", read_draft(missing).unwrap_err()).contains("Failed to read"));
    }
}
