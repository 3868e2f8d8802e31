use anyhow::Result;

use ladle_core::LadleService;
use ladle_core::models::{ConsumableSearch, Filters, NewConsumable};

use super::helpers::{page_footer, print_consumable_table, print_json, print_json_page};

pub(crate) fn cmd_consumable_add(
    service: &LadleService,
    consumable: &NewConsumable,
    json: bool,
) -> Result<()> {
    let consumable = service.add_consumable(consumable)?;

    if json {
        print_json(&consumable)?;
    } else {
        println!(
            "Added {} ({}), {}{} per serving (id: {})",
            consumable.name,
            consumable.brand_name,
            consumable.size,
            consumable.units.as_str(),
            consumable.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_consumable_list(
    service: &LadleService,
    user_id: i64,
    page: i64,
    page_size: i64,
    json: bool,
) -> Result<()> {
    let (consumables, metadata) =
        service.list_consumables(user_id, Filters::new(page, page_size))?;
    if json {
        print_json_page("consumables", &consumables, &metadata)?;
    } else if consumables.is_empty() {
        println!("No consumables yet. Add one with: ladle consumable add <name> --brand <brand> --size <n>");
    } else {
        print_consumable_table(&consumables);
        println!("{}", page_footer(&metadata));
    }
    Ok(())
}

pub(crate) fn cmd_consumable_search(
    service: &LadleService,
    search: &ConsumableSearch,
    filters: Filters,
    json: bool,
) -> Result<()> {
    let (consumables, metadata) = service.search_consumables(search, filters)?;
    if json {
        print_json_page("consumables", &consumables, &metadata)?;
    } else if consumables.is_empty() {
        println!("No consumables match.");
    } else {
        print_consumable_table(&consumables);
        println!("{}", page_footer(&metadata));
    }
    Ok(())
}
