mod consumable;
mod consumed;
mod helpers;
mod pantry;
mod recipe;
mod user;

pub(crate) use consumable::{cmd_consumable_add, cmd_consumable_list, cmd_consumable_search};
pub(crate) use consumed::{
    ConsumedChanges, cmd_consumed_add, cmd_consumed_delete, cmd_consumed_list, cmd_consumed_show,
    cmd_consumed_update,
};
pub(crate) use pantry::{cmd_pantry_add, cmd_pantry_delete, cmd_pantry_list, cmd_pantry_update};
pub(crate) use recipe::{
    cmd_recipe_create, cmd_recipe_delete, cmd_recipe_fork, cmd_recipe_history, cmd_recipe_list,
    cmd_recipe_show, cmd_recipe_step,
};
pub(crate) use user::{cmd_user_add, cmd_user_show};
