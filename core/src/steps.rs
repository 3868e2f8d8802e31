//! Validation and canonical ordering of a recipe's steps.
//!
//! A [`FullRecipe`] carries its steps as three index-aligned sequences
//! (components, pantry items, consumables). Callers may submit the steps in
//! any order; after a successful pass the sequences are sorted by `step_no`
//! and every triple still describes the same step.

use crate::error::Result;
use crate::models::{
    Consumable, FullRecipe, PantryItem, RecipeComponent, validate_consumable, validate_pantry_item,
    validate_recipe, validate_recipe_component,
};
use crate::validator::Validator;

/// Validate every part of the aggregate and sort its steps, recording all
/// failures in `v`.
pub fn validate_full_recipe(v: &mut Validator, full: &mut FullRecipe) {
    validate_recipe(v, &full.recipe);
    normalize_steps(
        v,
        full.recipe.id,
        &mut full.recipe_components,
        &mut full.pantry_items,
        &mut full.consumables,
    );
    for (i, (component, pantry_item, consumable)) in full.steps().enumerate() {
        let prefix = format!("steps[{i}]");
        validate_recipe_component(v, &prefix, component);
        validate_pantry_item(v, &prefix, &pantry_item.name);
        validate_consumable(v, &format!("{prefix}.consumable"), consumable);
    }
}

/// Convenience wrapper returning `ValidationFailed` with everything found.
pub fn normalize_full_recipe(full: &mut FullRecipe) -> Result<()> {
    let mut v = Validator::new();
    validate_full_recipe(&mut v, full);
    v.into_result()
}

/// Check the length and linkage of the step sequences and reorder them in
/// place so that `components[i].step_no == i + 1`.
///
/// Reordering swaps whole triples, so entry `i` of each sequence keeps
/// describing the same step. Out-of-range and duplicated step numbers are
/// reported against `step_numbers`; the sequences are left partially sorted
/// in that case.
pub fn normalize_steps(
    v: &mut Validator,
    recipe_id: i64,
    components: &mut [RecipeComponent],
    pantry_items: &mut [PantryItem],
    consumables: &mut [Consumable],
) {
    let n = components.len();
    let same_len = n == pantry_items.len() && n == consumables.len();
    v.check(
        same_len,
        "recipe_steps",
        "must have the same number of components, pantry items and consumables",
    );
    v.check(
        n > 0 && !pantry_items.is_empty() && !consumables.is_empty(),
        "recipe_steps",
        "must have at least one step",
    );
    if n == 0 || !same_len {
        return;
    }

    for (i, ((component, pantry_item), consumable)) in components
        .iter()
        .zip(pantry_items.iter())
        .zip(consumables.iter())
        .enumerate()
    {
        v.check(
            component.pantry_item_id == pantry_item.id,
            format!("steps[{i}].pantry_item_id"),
            "must match the pantry item of the same step",
        );
        v.check(
            pantry_item.consumable_id == consumable.id,
            format!("steps[{i}].consumable_id"),
            "must match the consumable of the same step",
        );
        v.check(
            component.recipe_id == recipe_id,
            format!("steps[{i}].recipe_id"),
            "must be the same as the recipe for all steps",
        );
    }

    for i in 0..n {
        // A swap always settles slot `j` for good, so index `i` sees at most
        // n - 1 swaps before it is either in place or rejected.
        for _ in 0..n {
            let step_no = components[i].step_no;
            let Some(j) = slot_for(step_no, n) else {
                v.add_error(
                    "step_numbers",
                    format!("step number {step_no} out of range, must be within 1..={n}"),
                );
                break;
            };
            if j == i {
                break;
            }
            if components[j].step_no == step_no {
                v.add_error("step_numbers", format!("duplicate step number {step_no}"));
                break;
            }
            components.swap(i, j);
            pantry_items.swap(i, j);
            consumables.swap(i, j);
        }
    }
}

fn slot_for(step_no: i64, n: usize) -> Option<usize> {
    usize::try_from(step_no)
        .ok()
        .filter(|s| (1..=n).contains(s))
        .map(|s| s - 1)
}
