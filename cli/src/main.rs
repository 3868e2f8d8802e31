mod commands;
mod config;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    ConsumedChanges, cmd_consumable_add, cmd_consumable_list, cmd_consumable_search,
    cmd_consumed_add, cmd_consumed_delete, cmd_consumed_list, cmd_consumed_show,
    cmd_consumed_update, cmd_pantry_add, cmd_pantry_delete, cmd_pantry_list, cmd_pantry_update,
    cmd_recipe_create, cmd_recipe_delete, cmd_recipe_fork, cmd_recipe_history, cmd_recipe_list,
    cmd_recipe_show, cmd_recipe_step, cmd_user_add, cmd_user_show,
};
use crate::config::Config;
use ladle_core::models::{
    ConsumableSearch, Filters, Macronutrients, MeasurementUnit, NewConsumable, NewConsumed,
};
use ladle_core::{LadleService, StoreError};

#[derive(Parser)]
#[command(
    name = "ladle",
    version,
    about = "Compose recipes from your pantry and keep every version of them"
)]
struct Cli {
    /// Acting user ID
    #[arg(short, long, global = true, env = "LADLE_USER")]
    user: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and inspect users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage nutritional consumables
    Consumable {
        #[command(subcommand)]
        command: ConsumableCommands,
    },
    /// Manage your pantry
    Pantry {
        #[command(subcommand)]
        command: PantryCommands,
    },
    /// Create, fork and browse recipe versions
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Log what you ate
    Consumed {
        #[command(subcommand)]
        command: ConsumedCommands,
    },
}

/// Macronutrients in grams.
#[derive(Args, Debug)]
struct MacroArgs {
    #[arg(long, default_value = "0")]
    carbs: f64,
    #[arg(long, default_value = "0")]
    fats: f64,
    #[arg(long, default_value = "0")]
    proteins: f64,
    #[arg(long, default_value = "0")]
    alcohol: f64,
}

impl From<MacroArgs> for Macronutrients {
    fn from(args: MacroArgs) -> Self {
        Macronutrients {
            carbs: args.carbs,
            fats: args.fats,
            proteins: args.proteins,
            alcohol: args.alcohol,
        }
    }
}

#[derive(Args, Debug)]
struct PageArgs {
    #[arg(long, default_value = "1")]
    page: i64,
    #[arg(long, default_value = "20")]
    page_size: i64,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a new user
    Add {
        username: String,
        email: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the acting user
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConsumableCommands {
    /// Add a consumable with its macronutrients per serving
    Add {
        /// Consumable name
        name: String,
        /// Brand name
        #[arg(long)]
        brand: String,
        /// Serving size
        #[arg(long)]
        size: f64,
        /// Unit of the serving size: g or ml
        #[arg(long, default_value = "g")]
        units: MeasurementUnit,
        #[command(flatten)]
        macros: MacroArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the consumables you created
    List {
        #[command(flatten)]
        paging: PageArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search every user's consumables by name and brand
    Search {
        /// Name contains
        #[arg(long)]
        name: Option<String>,
        /// Brand contains
        #[arg(long)]
        brand: Option<String>,
        /// Require both terms to match instead of either
        #[arg(long)]
        match_both: bool,
        #[command(flatten)]
        paging: PageArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PantryCommands {
    /// Put a consumable in your pantry
    Add {
        /// Consumable ID
        consumable_id: i64,
        /// Pantry item name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your pantry
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a pantry item or point it at another consumable
    Update {
        /// Pantry item ID
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New consumable ID (only while no recipe uses the item)
        #[arg(long)]
        consumable: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a pantry item that no recipe uses
    Delete {
        /// Pantry item ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a new recipe from a JSON draft
    Create {
        /// Path to the draft (`recipe_name`, `notes`, `steps`)
        #[arg(short, long)]
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fork a new version of a recipe from a JSON draft
    Fork {
        /// ID of the version to fork (must be the latest)
        id: i64,
        /// Path to the draft
        #[arg(short, long)]
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe version with its steps
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your recipes, newest first
    List {
        /// Only the latest version of each lineage
        #[arg(long)]
        latest: bool,
        /// Filter by name
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value = "20")]
        page_size: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show every version from the original down to this one
    History {
        /// Recipe ID
        id: i64,
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value = "20")]
        page_size: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit one step of the latest version in place
    Step {
        /// Recipe ID
        id: i64,
        /// Step number
        step_no: i64,
        #[arg(long)]
        quantity: Option<f64>,
        #[arg(long)]
        description: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe version that has not been forked
    Delete {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConsumedCommands {
    /// Log a portion of a recipe
    Add {
        /// Recipe ID
        recipe_id: i64,
        /// Portions eaten
        #[arg(long)]
        quantity: f64,
        #[command(flatten)]
        macros: MacroArgs,
        /// When it was eaten (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        #[arg(long, default_value = "")]
        notes: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your log, optionally between two times (RFC 3339)
    List {
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one logged entry
    Show {
        /// Entry ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a logged entry
    Update {
        /// Entry ID
        id: i64,
        #[command(flatten)]
        changes: ConsumedChanges,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a logged entry
    Delete {
        /// Entry ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<StoreError>().and_then(StoreError::validation_errors) {
            Some(errors) => {
                eprintln!("Error: validation failed");
                for err in errors.iter() {
                    eprintln!("  {}: {}", err.field, err.message);
                }
            }
            None => eprintln!("Error: {e:#}"),
        }
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LADLE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn acting_user(user: Option<i64>) -> Result<i64> {
    match user {
        Some(id) => Ok(id),
        None => bail!("No acting user. Pass --user <id> or set LADLE_USER"),
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    tracing::debug!(db = %config.db_path.display(), "using database");
    let service = LadleService::new(&config.db_path, config.store_options())?;

    match cli.command {
        Commands::User { command } => match command {
            UserCommands::Add {
                username,
                email,
                json,
            } => cmd_user_add(&service, &username, &email, json),
            UserCommands::Show { json } => cmd_user_show(&service, acting_user(cli.user)?, json),
        },
        Commands::Consumable { command } => {
            let user_id = acting_user(cli.user)?;
            match command {
                ConsumableCommands::Add {
                    name,
                    brand,
                    size,
                    units,
                    macros,
                    json,
                } => {
                    let consumable = NewConsumable {
                        creator_id: user_id,
                        name,
                        brand_name: brand,
                        size,
                        units,
                        macros: macros.into(),
                    };
                    cmd_consumable_add(&service, &consumable, json)
                }
                ConsumableCommands::List { paging, json } => {
                    cmd_consumable_list(&service, user_id, paging.page, paging.page_size, json)
                }
                ConsumableCommands::Search {
                    name,
                    brand,
                    match_both,
                    paging,
                    json,
                } => {
                    let search = ConsumableSearch {
                        name,
                        brand_name: brand,
                        require_both: match_both,
                    };
                    let filters = Filters::new(paging.page, paging.page_size);
                    cmd_consumable_search(&service, &search, filters, json)
                }
            }
        }
        Commands::Pantry { command } => {
            let user_id = acting_user(cli.user)?;
            match command {
                PantryCommands::Add {
                    consumable_id,
                    name,
                    json,
                } => cmd_pantry_add(&service, user_id, consumable_id, &name, json),
                PantryCommands::List { json } => cmd_pantry_list(&service, user_id, json),
                PantryCommands::Update {
                    id,
                    name,
                    consumable,
                    json,
                } => cmd_pantry_update(&service, user_id, id, name.as_deref(), consumable, json),
                PantryCommands::Delete { id, json } => {
                    cmd_pantry_delete(&service, user_id, id, json)
                }
            }
        }
        Commands::Recipe { command } => {
            let user_id = acting_user(cli.user)?;
            match command {
                RecipeCommands::Create { file, json } => {
                    cmd_recipe_create(&service, user_id, &file, json)
                }
                RecipeCommands::Fork { id, file, json } => {
                    cmd_recipe_fork(&service, user_id, id, &file, json)
                }
                RecipeCommands::Show { id, json } => cmd_recipe_show(&service, user_id, id, json),
                RecipeCommands::List {
                    latest,
                    search,
                    page,
                    page_size,
                    json,
                } => cmd_recipe_list(&service, user_id, latest, search, page, page_size, json),
                RecipeCommands::History {
                    id,
                    page,
                    page_size,
                    json,
                } => cmd_recipe_history(&service, user_id, id, page, page_size, json),
                RecipeCommands::Step {
                    id,
                    step_no,
                    quantity,
                    description,
                    json,
                } => cmd_recipe_step(&service, user_id, id, step_no, quantity, description, json),
                RecipeCommands::Delete { id, json } => {
                    cmd_recipe_delete(&service, user_id, id, json)
                }
            }
        }
        Commands::Consumed { command } => {
            let user_id = acting_user(cli.user)?;
            match command {
                ConsumedCommands::Add {
                    recipe_id,
                    quantity,
                    macros,
                    at,
                    notes,
                    json,
                } => {
                    let entry = NewConsumed {
                        user_id,
                        recipe_id,
                        quantity,
                        macros: macros.into(),
                        consumed_at: at.unwrap_or_else(Utc::now),
                        notes,
                    };
                    cmd_consumed_add(&service, user_id, entry, json)
                }
                ConsumedCommands::List { from, to, json } => {
                    cmd_consumed_list(&service, user_id, from, to, json)
                }
                ConsumedCommands::Show { id, json } => {
                    cmd_consumed_show(&service, user_id, id, json)
                }
                ConsumedCommands::Update { id, changes, json } => {
                    cmd_consumed_update(&service, user_id, id, changes, json)
                }
                ConsumedCommands::Delete { id, json } => {
                    cmd_consumed_delete(&service, user_id, id, json)
                }
            }
        }
    }
}
