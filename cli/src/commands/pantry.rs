use anyhow::Result;

use ladle_core::LadleService;

use super::helpers::{Deleted, print_json, print_pantry_table};

pub(crate) fn cmd_pantry_add(
    service: &LadleService,
    user_id: i64,
    consumable_id: i64,
    name: &str,
    json: bool,
) -> Result<()> {
    let item = service.add_pantry_item(user_id, consumable_id, name)?;
    if json {
        print_json(&item)?;
    } else {
        println!("Added {} to your pantry (id: {})", item.name, item.id);
    }
    Ok(())
}

pub(crate) fn cmd_pantry_list(service: &LadleService, user_id: i64, json: bool) -> Result<()> {
    let items = service.list_pantry_items(user_id)?;
    if json {
        print_json(&items)?;
    } else if items.is_empty() {
        println!("Your pantry is empty.");
    } else {
        print_pantry_table(&items);
    }
    Ok(())
}

pub(crate) fn cmd_pantry_update(
    service: &LadleService,
    user_id: i64,
    id: i64,
    name: Option<&str>,
    consumable_id: Option<i64>,
    json: bool,
) -> Result<()> {
    let item = service.update_pantry_item(user_id, id, name, consumable_id)?;
    if json {
        print_json(&item)?;
    } else {
        println!(
            "Updated pantry item {} (consumable: {})",
            item.name, item.consumable_id
        );
    }
    Ok(())
}

pub(crate) fn cmd_pantry_delete(
    service: &LadleService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    service.remove_pantry_item(user_id, id)?;
    if json {
        print_json(&Deleted { deleted: id })?;
    } else {
        println!("Removed pantry item {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladle_core::StoreError;
    use ladle_core::models::{Macronutrients, MeasurementUnit, NewConsumable};

    #[test]
    fn test_pantry_add_list_delete() {
        let service = LadleService::new_in_memory().unwrap();
        let user = service.register_user("cook", "cook@example.com").unwrap();
        let flour = service
            .add_consumable(&NewConsumable {
                creator_id: user.id,
                name: "Plain Flour".to_string(),
                brand_name: "White Wings".to_string(),
                size: 100.0,
                units: MeasurementUnit::Grams,
                macros: Macronutrients {
                    carbs: 72.0,
                    fats: 1.2,
                    proteins: 10.3,
                    alcohol: 0.0,
                },
            })
            .unwrap();

        cmd_pantry_add(&service, user.id, flour.id, "Flour", false).unwrap();
        cmd_pantry_list(&service, user.id, true).unwrap();
        let item_id = service.list_pantry_items(user.id).unwrap()[0].id;

        cmd_pantry_update(&service, user.id, item_id, Some("Plain flour"), None, true).unwrap();
        assert_eq!(service.list_pantry_items(user.id).unwrap()[0].name, "Plain flour");
        let err = cmd_pantry_update(&service, user.id, item_id, None, Some(404), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::ConsumableDoesNotExist)
        ));

        cmd_pantry_delete(&service, user.id, item_id, true).unwrap();
        let err = cmd_pantry_delete(&service, user.id, item_id, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::RecordNotFound)
        ));
    }
}
