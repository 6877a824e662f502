use garde_manger_rs::ai_assistant::{AiConfig, AiError, AiFeature};
use garde_manger_rs::constants::DEFAULT_DB;
use garde_manger_rs::data_backend::ShoppingListStore;
use garde_manger_rs::data_types::{BudgetSummary, ShoppingList, UserContext};
use garde_manger_rs::db_operations::Database;
use garde_manger_rs::document::date_key;
use garde_manger_rs::errors::PlannerError;
use garde_manger_rs::shared_main::{logger_init, Config};
use garde_manger_rs::shopping_list_generator::generate_for_date;

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Parser, Subcommand};
use log::log_enabled;
use std::{path::PathBuf, process, time::Instant};

/// Pantry, meal plans and shared shopping lists for one household.
/// {n}Builds the shopping list of a day from its planned dishes minus what is in stock.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// SQLite file holding every collection
    #[arg(long, env = "GARDE_MANGER_DB", default_value = DEFAULT_DB)]
    db: PathBuf,
    /// Id of the signed-in user
    #[arg(short, long, env = "GARDE_MANGER_USER")]
    user: Option<String>,
    /// Enable verbose logging (mostly performance metrics){n}[SETS env: RUST_LOG=debug]
    #[arg(short, long)]
    verbose: bool,
    /// Ollama API host for the cooking assistant{n}Example: <http://127.0.0.1:11434/api>
    #[arg(long, env = "OLLAMA_HOST")]
    ollama_host: Option<String>,
    /// Ollama model for inference{n}Example: 'llama3:latest'
    #[arg(long, env = "OLLAMA_MODEL")]
    ollama_model: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a shopping list from the dishes planned on a day
    Generate {
        /// YYYY-MM-DD, today if omitted
        #[arg(short, long)]
        date: Option<NaiveDate>,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Lists you own or that were shared with you
    Lists,
    /// Print one list
    Show { list_id: String },
    /// Check or uncheck an item
    Check { list_id: String, token: String },
    /// Join a list shared with you
    Join { list_id: String },
    /// Print the invitation text of a list
    Share { list_id: String },
    /// Delete a list you own
    DeleteList { list_id: String },
    #[command(subcommand)]
    Stock(StockCommand),
    #[command(subcommand)]
    Dish(DishCommand),
    #[command(subcommand)]
    Plan(PlanCommand),
    #[command(subcommand)]
    Budget(BudgetCommand),
    /// Ask the cooking assistant{n}Features: smart-recipe, meal-planning, cooking-guide, chat
    Ask {
        feature: AiFeature,
        input: Option<String>,
        /// Keep the answer under this title
        #[arg(long)]
        save: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum StockCommand {
    Add {
        name: String,
        quantity: String,
        unit: String,
        /// YYYY-MM-DD
        #[arg(long)]
        expiry: Option<NaiveDate>,
    },
    List,
    /// Items expiring within the next days
    Expiring {
        #[arg(long, default_value_t = 3)]
        days: i64,
    },
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum DishCommand {
    /// Import a dish document from a JSON file
    Import { file: PathBuf },
    List,
}

#[derive(Subcommand, Debug)]
enum PlanCommand {
    Assign {
        #[arg(short, long)]
        date: NaiveDate,
        dish_id: String,
    },
    Remove {
        #[arg(short, long)]
        date: NaiveDate,
        dish_id: String,
    },
    /// The week containing the date
    Show {
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand, Debug)]
enum BudgetCommand {
    Add {
        amount: String,
        category: String,
        description: String,
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Totals of a month
    Summary {
        /// YYYY-MM, current month if omitted
        #[arg(short, long)]
        month: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }

    logger_init("garde_manger_rs");

    if !(log_enabled!(log::Level::Debug) || log_enabled!(log::Level::Trace)) {
        log::info!("Enable verbose logging for performance metrics");
    }

    let config = Config {
        db_path: args.db,
        user: args.user,
        ai: AiConfig {
            host: args.ollama_host,
            model: args.ollama_model,
        },
    };

    if let Err(e) = run(&config, args.command).await {
        log::error!("{:#}", e);
        eprintln!("{}", user_message(&e));
        process::exit(1);
    }
}

fn user_message(e: &anyhow::Error) -> String {
    if let Some(e) = e.downcast_ref::<PlannerError>() {
        e.user_message().to_string()
    } else if let Some(e) = e.downcast_ref::<AiError>() {
        e.user_message().to_string()
    } else {
        format!("{:#}", e)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn print_list(list: &ShoppingList) {
    println!(
        "{} ({} / {} restants) [{}]",
        list.name,
        list.remaining(),
        list.items.len(),
        list.id
    );
    for item in &list.items {
        println!(
            "  [{}] {} {} {}  #{}",
            if item.checked { "x" } else { " " },
            item.name,
            item.quantity,
            item.unit,
            item.token.as_deref().unwrap_or("-")
        );
    }
}

async fn run(config: &Config, command: Command) -> Result<()> {
    let user = config.user_context()?;
    let db = config.open_database()?;
    let now = Instant::now();

    match command {
        Command::Generate { date, name } => {
            let date = date.unwrap_or_else(today);
            let generated = generate_for_date(&db, Some(&user), date, name.as_deref())?;
            println!("{} -> {}", generated.name, generated.list_id);
            for item in &generated.items {
                println!("  {} {} {}", item.name, item.quantity, item.unit);
            }
        }
        Command::Lists => {
            for list in db.lists_for_user(&user)? {
                let role = if list.is_owner(user.user_id()) {
                    "propriétaire"
                } else {
                    "partagée"
                };
                println!(
                    "{}  {} ({} restants, {})",
                    list.id,
                    list.name,
                    list.remaining(),
                    role
                );
            }
        }
        Command::Show { list_id } => print_list(&get_list(&db, &user, &list_id)?),
        Command::Check { list_id, token } => {
            let checked = db.toggle_item(&user, &list_id, &token)?;
            println!("{}", if checked { "coché" } else { "décoché" });
        }
        Command::Join { list_id } => {
            if db.join_list(&user, &list_id)? {
                println!("Vous avez rejoint la liste {}", list_id);
            } else {
                println!("Vous faites déjà partie de cette liste");
            }
        }
        Command::Share { list_id } => print!("{}", get_list(&db, &user, &list_id)?.share_message()),
        Command::DeleteList { list_id } => db.delete_list(&user, &list_id)?,
        Command::Stock(cmd) => stock_command(&db, &user, cmd)?,
        Command::Dish(cmd) => dish_command(&db, &user, cmd).await?,
        Command::Plan(cmd) => plan_command(&db, &user, cmd)?,
        Command::Budget(cmd) => budget_command(&db, &user, cmd)?,
        Command::Ask {
            feature,
            input,
            save,
        } => {
            let stock_names: Vec<String> = match feature {
                AiFeature::SmartRecipe => db.list_stock(&user)?.into_iter().map(|i| i.name).collect(),
                _ => Vec::new(),
            };
            let answer = config
                .ai_client()
                .ask(feature, input.as_deref(), &stock_names)
                .await?;
            println!("{}", answer);

            if let Some(title) = save {
                let id = db.save_ai_content(&user, feature.id(), &title, &answer)?;
                log::info!("saved {} answer as {}", feature.title(), id);
            }
        }
    }

    log::debug!("command done in {:.2?}", now.elapsed());
    Ok(())
}

fn get_list(db: &Database, user: &UserContext, list_id: &str) -> Result<ShoppingList> {
    Ok(db
        .get_list(user, list_id)?
        .ok_or_else(|| PlannerError::not_found("shopping list", list_id))?)
}

fn stock_command(db: &Database, user: &UserContext, cmd: StockCommand) -> Result<()> {
    match cmd {
        StockCommand::Add {
            name,
            quantity,
            unit,
            expiry,
        } => {
            let item = db.add_stock_item(user, &name, &quantity, &unit, expiry)?;
            println!("{} {} {} [{}]", item.name, item.quantity, item.unit, item.id);
        }
        StockCommand::List => {
            for item in db.list_stock(user)? {
                let expiry = item.expiry.map(date_key).unwrap_or_default();
                println!("{}  {} {} {} {}", item.id, item.name, item.quantity, item.unit, expiry);
            }
        }
        StockCommand::Expiring { days } => {
            for item in db.expiring_stock(user, today(), days)? {
                let expiry = item.expiry.map(date_key).unwrap_or_default();
                println!("{}  {} {} ({})", expiry, item.name, item.quantity, item.unit);
            }
        }
        StockCommand::Remove { id } => db.delete_stock_item(user, &id)?,
    }
    Ok(())
}

async fn dish_command(db: &Database, user: &UserContext, cmd: DishCommand) -> Result<()> {
    match cmd {
        DishCommand::Import { file } => {
            let txt = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let raw: serde_json::Value = serde_json::from_str(&txt)
                .map_err(|e| PlannerError::MalformedInput(e.to_string()))?;
            let id = db.import_dish(user, &raw)?;
            println!("{}", id);
        }
        DishCommand::List => {
            for dish in db.list_dishes(user)? {
                println!("{}  {} ({} ingrédients)", dish.id, dish.name, dish.ingredients.len());
            }
        }
    }
    Ok(())
}

fn plan_command(db: &Database, user: &UserContext, cmd: PlanCommand) -> Result<()> {
    match cmd {
        PlanCommand::Assign { date, dish_id } => {
            let day = db.assign_dish(user, date, &dish_id)?;
            println!("{}: {} plat(s)", date_key(day.date), day.dish_ids.len());
        }
        PlanCommand::Remove { date, dish_id } => {
            let day = db.remove_dish(user, date, &dish_id)?;
            println!("{}: {} plat(s)", date_key(day.date), day.dish_ids.len());
        }
        PlanCommand::Show { date } => {
            let week = db.week_plan(user, date.unwrap_or_else(today))?;
            let dishes = db.list_dishes(user)?;
            let name_of = |id: &str| {
                dishes
                    .iter()
                    .find(|d| d.id == id)
                    .map(|d| d.name.clone())
                    .unwrap_or_else(|| format!("? ({})", id))
            };
            for day in week {
                let names: Vec<String> = day.dish_ids.iter().map(|id| name_of(id)).collect();
                println!("{}  {}", date_key(day.date), names.join(", "));
            }
        }
    }
    Ok(())
}

fn budget_command(db: &Database, user: &UserContext, cmd: BudgetCommand) -> Result<()> {
    match cmd {
        BudgetCommand::Add {
            amount,
            category,
            description,
            date,
        } => {
            let entry = db.add_expense(
                user,
                &amount,
                &category,
                &description,
                date.unwrap_or_else(today),
            )?;
            println!("{} {:.2} € [{}]", entry.category, entry.amount, entry.id);
        }
        BudgetCommand::Summary { month } => {
            let first = match month {
                Some(m) => NaiveDate::parse_from_str(&format!("{}-01", m.trim()), "%Y-%m-%d")
                    .map_err(|e| PlannerError::MalformedInput(format!("month '{}': {}", m, e)))?,
                None => today().with_day(1).unwrap_or_else(today),
            };
            let entries = db.list_budget_entries(user)?;
            let summary = BudgetSummary::for_month(&entries, first.year(), first.month());

            println!("{}", first.format("%m/%Y"));
            for (category, amount) in &summary.expenses_by_category {
                println!("  {:<12} {:>9.2} €", category, amount);
            }
            println!("  Dépenses     {:>9.2} €", summary.total_expenses);
            println!("  Revenus      {:>9.2} €", summary.total_income);
            println!("  Solde        {:>9.2} €", summary.balance());
        }
    }
    Ok(())
}
