use anyhow::Result;
use std::path::Path;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ladle_core::LadleService;
use ladle_core::models::{Filters, FullRecipe, RecipeFilters};

use super::helpers::{
    Deleted, page_footer, print_json, print_json_page, print_recipe_table, read_draft, truncate,
};

pub(crate) fn cmd_recipe_create(
    service: &LadleService,
    user_id: i64,
    file: &Path,
    json: bool,
) -> Result<()> {
    let draft = read_draft(file)?;
    let full = service.create_recipe(user_id, &draft)?;
    if json {
        print_json(&full)?;
    } else {
        let id = full.recipe.id;
        println!(
            "Created recipe: {} (id: {id}, {} steps)",
            full.recipe.name,
            full.step_count()
        );
        println!("Fork a new version with: ladle recipe fork {id} --file <draft.json>");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_fork(
    service: &LadleService,
    user_id: i64,
    id: i64,
    file: &Path,
    json: bool,
) -> Result<()> {
    let draft = read_draft(file)?;
    let full = service.fork_recipe(user_id, id, &draft)?;
    if json {
        print_json(&full)?;
    } else {
        println!(
            "Forked recipe {id} into {} (id: {}, {} steps)",
            full.recipe.name,
            full.recipe.id,
            full.step_count()
        );
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(
    service: &LadleService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    let full = service.get_recipe(user_id, id)?;
    if json {
        print_json(&full)?;
        return Ok(());
    }

    let recipe = &full.recipe;
    println!("=== {} (id: {}) ===", recipe.name, recipe.id);
    match recipe.parent_recipe_id {
        Some(parent) => println!("Forked from: {parent}"),
        None => println!("Original version"),
    }
    if !recipe.is_latest {
        println!("A newer version exists. See: ladle recipe history {}", recipe.id);
    }
    if !recipe.notes.is_empty() {
        println!("\n{}", recipe.notes);
    }
    println!();
    print_step_table(&full);
    Ok(())
}

pub(crate) fn cmd_recipe_list(
    service: &LadleService,
    user_id: i64,
    latest: bool,
    search: Option<String>,
    page: i64,
    page_size: i64,
    json: bool,
) -> Result<()> {
    let filters = RecipeFilters {
        filters: Filters::new(page, page_size),
        latest_only: latest,
        name_search: search,
    };
    let (recipes, metadata) = service.list_recipes(user_id, &filters)?;

    if json {
        print_json_page("recipes", &recipes, &metadata)?;
    } else if recipes.is_empty() {
        println!("No recipes found.");
    } else {
        print_recipe_table(&recipes);
        println!("{}", page_footer(&metadata));
    }
    Ok(())
}

pub(crate) fn cmd_recipe_history(
    service: &LadleService,
    user_id: i64,
    id: i64,
    page: i64,
    page_size: i64,
    json: bool,
) -> Result<()> {
    let (recipes, metadata) =
        service.recipe_history(user_id, id, Filters::new(page, page_size))?;

    if json {
        print_json_page("recipes", &recipes, &metadata)?;
    } else {
        println!("History of recipe {id}, oldest first:");
        print_recipe_table(&recipes);
        println!("{}", page_footer(&metadata));
    }
    Ok(())
}

pub(crate) fn cmd_recipe_step(
    service: &LadleService,
    user_id: i64,
    id: i64,
    step_no: i64,
    quantity: Option<f64>,
    description: Option<String>,
    json: bool,
) -> Result<()> {
    let step = service.update_recipe_step(user_id, id, step_no, quantity, description)?;
    if json {
        print_json(&step)?;
    } else {
        println!(
            "Updated step {} of recipe {id} (quantity {})",
            step.step_no, step.quantity
        );
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(
    service: &LadleService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    service.delete_recipe(user_id, id)?;
    if json {
        print_json(&Deleted { deleted: id })?;
    } else {
        println!("Deleted recipe {id}");
    }
    Ok(())
}

fn print_step_table(full: &FullRecipe) {
    #[derive(Tabled)]
    struct StepRow {
        #[tabled(rename = "Step")]
        step_no: i64,
        #[tabled(rename = "Ingredient")]
        ingredient: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Instructions")]
        description: String,
    }

    let rows: Vec<StepRow> = full
        .steps()
        .map(|(component, item, consumable)| StepRow {
            step_no: component.step_no,
            ingredient: truncate(&item.name, 30),
            quantity: format!(
                "{} x {}{}",
                component.quantity,
                consumable.size,
                consumable.units.as_str()
            ),
            description: truncate(&component.step_description, 50),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(0..1)).with(Alignment::right()))
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladle_core::StoreError;
    use ladle_core::models::{Macronutrients, MeasurementUnit, NewConsumable};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn setup() -> (LadleService, i64, i64) {
        let service = LadleService::new_in_memory().unwrap();
        let user = service.register_user("cook", "cook@example.com").unwrap();
        let pasta = service
            .add_consumable(&NewConsumable {
                creator_id: user.id,
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
            })
            .unwrap();
        let item = service
            .add_pantry_item(user.id, pasta.id, "Pasta sheets")
            .unwrap();
        (service, user.id, item.id)
    }

    fn draft_file(name: &str, pantry_item_id: i64) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"recipe_name": "{name}", "steps": [
                {{"pantry_item_id": {pantry_item_id}, "quantity": 4, "step_no": 1, "step_description": "Layer"}}
            ]}}"#
        )
        .unwrap();
        file
    }

    #[test]
    fn test_recipe_lifecycle() {
        let (service, user_id, item_id) = setup();
        let v1 = draft_file("Lasagne", item_id);
        let v2 = draft_file("Lasagne v2", item_id);

        cmd_recipe_create(&service, user_id, v1.path(), false).unwrap();
        cmd_recipe_fork(&service, user_id, 1, v2.path(), true).unwrap();
        cmd_recipe_show(&service, user_id, 1, false).unwrap();
        cmd_recipe_show(&service, user_id, 2, true).unwrap();
        cmd_recipe_list(&service, user_id, true, None, 1, 20, false).unwrap();
        cmd_recipe_history(&service, user_id, 2, 1, 20, true).unwrap();
        cmd_recipe_step(&service, user_id, 2, 1, Some(5.0), None, false).unwrap();
        assert_eq!(
            service.get_recipe(user_id, 2).unwrap().recipe_components[0].quantity,
            5.0
        );

        // History steps stay as they were written.
        let err = cmd_recipe_step(&service, user_id, 1, 1, Some(5.0), None, true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::EditConflict)
        ));

        // Forking history again is a conflict; the original is no longer latest.
        let err = cmd_recipe_fork(&service, user_id, 1, v2.path(), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::EditConflict)
        ));

        let err = cmd_recipe_delete(&service, user_id, 1, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::ChildRecipeExists)
        ));
        cmd_recipe_delete(&service, user_id, 2, true).unwrap();
        cmd_recipe_delete(&service, user_id, 1, false).unwrap();
    }

    #[test]
    fn test_recipe_list_rejects_bad_page() {
        let (service, user_id, _) = setup();
        let err = cmd_recipe_list(&service, user_id, false, None, 0, 20, true).unwrap_err();
        let errors = err
            .downcast_ref::<StoreError>()
            .and_then(StoreError::validation_errors)
            .unwrap();
        assert!(errors.contains("page", "greater than zero"));
    }
}
