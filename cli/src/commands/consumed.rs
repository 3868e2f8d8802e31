use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;

use ladle_core::LadleService;
use ladle_core::models::{Consumed, Macronutrients, NewConsumed};

use super::helpers::{Deleted, print_consumed_table, print_json};

/// Fields to change on a logged entry. Anything left out keeps its value.
#[derive(Args, Debug, Default)]
pub(crate) struct ConsumedChanges {
    /// Recipe ID
    #[arg(long = "recipe")]
    pub recipe_id: Option<i64>,
    /// Portions eaten
    #[arg(long)]
    pub quantity: Option<f64>,
    #[arg(long)]
    pub carbs: Option<f64>,
    #[arg(long)]
    pub fats: Option<f64>,
    #[arg(long)]
    pub proteins: Option<f64>,
    #[arg(long)]
    pub alcohol: Option<f64>,
    /// When it was eaten (RFC 3339)
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
    #[arg(long)]
    pub notes: Option<String>,
}

impl ConsumedChanges {
    fn apply(self, current: Consumed) -> Result<NewConsumed> {
        let consumed_at = match self.at {
            Some(at) => at,
            None => DateTime::parse_from_rfc3339(&current.consumed_at)
                .with_context(|| format!("Stored time '{}' is unreadable", current.consumed_at))?
                .with_timezone(&Utc),
        };
        Ok(NewConsumed {
            user_id: current.user_id,
            recipe_id: self.recipe_id.unwrap_or(current.recipe_id),
            quantity: self.quantity.unwrap_or(current.quantity),
            macros: Macronutrients {
                carbs: self.carbs.unwrap_or(current.macros.carbs),
                fats: self.fats.unwrap_or(current.macros.fats),
                proteins: self.proteins.unwrap_or(current.macros.proteins),
                alcohol: self.alcohol.unwrap_or(current.macros.alcohol),
            },
            consumed_at,
            notes: self.notes.unwrap_or(current.notes),
        })
    }
}

pub(crate) fn cmd_consumed_add(
    service: &LadleService,
    user_id: i64,
    entry: NewConsumed,
    json: bool,
) -> Result<()> {
    let consumed = service.log_consumed(user_id, entry)?;
    if json {
        print_json(&consumed)?;
    } else {
        println!(
            "Logged {} of recipe {} at {} (id: {})",
            consumed.quantity, consumed.recipe_id, consumed.consumed_at, consumed.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_consumed_list(
    service: &LadleService,
    user_id: i64,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    json: bool,
) -> Result<()> {
    let entries = service.list_consumed(user_id, from, to)?;
    if json {
        print_json(&entries)?;
    } else if entries.is_empty() {
        println!("Nothing logged.");
    } else {
        print_consumed_table(&entries);
        let total: Macronutrients = entries.iter().fold(Macronutrients::default(), |acc, c| {
            Macronutrients {
                carbs: acc.carbs + c.macros.carbs,
                fats: acc.fats + c.macros.fats,
                proteins: acc.proteins + c.macros.proteins,
                alcohol: acc.alcohol + c.macros.alcohol,
            }
        });
        println!(
            "Total: {:.1}g carbs, {:.1}g fats, {:.1}g proteins, {:.1}g alcohol",
            total.carbs, total.fats, total.proteins, total.alcohol
        );
    }
    Ok(())
}

pub(crate) fn cmd_consumed_show(
    service: &LadleService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    let consumed = service.get_consumed(user_id, id)?;
    if json {
        print_json(&consumed)?;
    } else {
        print_consumed_table(std::slice::from_ref(&consumed));
    }
    Ok(())
}

pub(crate) fn cmd_consumed_update(
    service: &LadleService,
    user_id: i64,
    id: i64,
    changes: ConsumedChanges,
    json: bool,
) -> Result<()> {
    let current = service.get_consumed(user_id, id)?;
    let entry = changes.apply(current)?;
    let consumed = service.update_consumed(user_id, id, entry)?;
    if json {
        print_json(&consumed)?;
    } else {
        println!("Updated consumed entry {id}");
    }
    Ok(())
}

pub(crate) fn cmd_consumed_delete(
    service: &LadleService,
    user_id: i64,
    id: i64,
    json: bool,
) -> Result<()> {
    service.delete_consumed(user_id, id)?;
    if json {
        print_json(&Deleted { deleted: id })?;
    } else {
        println!("Deleted consumed entry {id}");
    }
    Ok(())
}
