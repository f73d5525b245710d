//! Command-line surface. Every subcommand parses its arguments, calls one
//! operation and prints the result.

use crate::config::Config;
use crate::db::{repository, scenario_repository};
use crate::error::{AppError, AppResult};
use crate::models::recurrence::{Cadence, Recurrence, parse_weekday};
use crate::models::scenario::Scenario;
use crate::models::transaction::Transaction;
use crate::money::{format_money, parse_cents};
use crate::operations::add::{
    TransactionForm, add_transaction_to_db, parse_date, parse_transaction_line, resolve_goal, update_transaction_in_db,
};
use crate::operations::balance::{self, balance_on};
use crate::operations::budget::{self, BudgetHealth};
use crate::operations::dashboard::{DashboardPanels, run_dashboard};
use crate::operations::forecast::{self, ForecastEventForm, ForecastRuleForm};
use crate::operations::import::{self, ImportFormat};
use crate::operations::remove::remove_transaction_from_db;
use crate::operations::report::{self, category_label, category_names};
use crate::operations::savings::{self, GoalInput};
use crate::operations::scenarios::{self, resolve_scenario};
use crate::operations::search_by_category::search_transactions_by_category_db;
use crate::operations::whatif::{self, WhatIf};
use crate::operations::{backup, categories};
use chrono::{Datelike, Months, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "moneyplan", version, about = "Personal finance planner: budgets, forecasts and savings goals")]
pub struct Cli {
    /// Config file (defaults to ./moneyplan.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, env = "MONEYPLAN_DB")]
    pub db: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record, edit and list transactions
    #[command(subcommand)]
    Tx(TxCommand),
    /// Manage spending categories
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Declared account balances and reconciliation
    #[command(subcommand)]
    Anchor(AnchorCommand),
    /// Savings goals
    #[command(subcommand)]
    Goal(GoalCommand),
    /// Planning scenarios
    #[command(subcommand)]
    Scenario(ScenarioCommand),
    /// Per-category spending limits
    #[command(subcommand)]
    Budget(BudgetCommand),
    /// Recurring and one-off projected transactions
    #[command(subcommand)]
    Forecast(ForecastCommand),
    /// Try different amounts without touching the stored scenario
    #[command(subcommand)]
    Whatif(WhatIfCommand),
    /// Import transactions from a bank export
    Import(ImportArgs),
    /// Description patterns that pick a category on import
    #[command(subcommand)]
    Rule(RuleCommand),
    /// Export or restore the whole store as JSON
    #[command(subcommand)]
    Backup(BackupCommand),
    /// Text reports
    #[command(subcommand)]
    Report(ReportCommand),
    /// Interactive terminal dashboard
    Dashboard(DashboardArgs),
}

#[derive(Debug, Args)]
pub struct TransactionArgs {
    #[arg(long)]
    pub date: String,
    #[arg(long)]
    pub description: String,
    #[arg(long, allow_hyphen_values = true)]
    pub amount: String,
    /// income, expense, savings or adjustment
    #[arg(long = "type")]
    pub transaction_type: String,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub goal: Option<String>,
    #[arg(long)]
    pub payment_method: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

impl TransactionArgs {
    fn to_form(&self) -> TransactionForm {
        TransactionForm {
            date: self.date.clone(),
            description: self.description.clone(),
            amount: self.amount.clone(),
            transaction_type: self.transaction_type.clone(),
            category: self.category.clone(),
            savings_goal: self.goal.clone(),
            payment_method: self.payment_method.clone(),
            notes: self.notes.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum TxCommand {
    Add(TransactionArgs),
    /// Add from one line: `date, description, amount, type, category`
    Quick {
        line: String,
    },
    /// Replace every field of a transaction
    Edit {
        id: String,
        #[command(flatten)]
        fields: TransactionArgs,
    },
    Remove {
        id: String,
    },
    Show {
        id: String,
    },
    List {
        #[arg(long = "type")]
        transaction_type: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    /// Transactions filed under a category
    Search {
        category: String,
    },
    /// Transactions with the running balance after each one
    Ledger(WindowArgs),
}

#[derive(Debug, Subcommand)]
pub enum CategoryCommand {
    Add {
        name: String,
    },
    List {
        /// Include archived categories
        #[arg(long)]
        all: bool,
    },
    Rename {
        category: String,
        new_name: String,
    },
    Archive {
        category: String,
    },
    Unarchive {
        category: String,
    },
    Delete {
        category: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum AnchorCommand {
    /// Declare the balance at the end of a day
    Set {
        date: String,
        #[arg(allow_hyphen_values = true)]
        balance: String,
        #[arg(long)]
        note: Option<String>,
    },
    List,
    Delete {
        id: String,
    },
    /// Balance at the end of a day (today by default)
    Balance {
        date: Option<String>,
    },
    /// Compare a balance from a statement with the computed one
    Reconcile {
        date: String,
        #[arg(allow_hyphen_values = true)]
        declared: String,
        /// Book the difference as an adjustment
        #[arg(long)]
        record: bool,
    },
}

#[derive(Debug, Args)]
pub struct GoalArgs {
    #[arg(long)]
    pub target: Option<String>,
    #[arg(long)]
    pub deadline: Option<String>,
    /// Annual interest in percent
    #[arg(long)]
    pub rate: Option<String>,
    /// Rate changes as `YYYY-MM-DD=rate,...`
    #[arg(long)]
    pub schedule: Option<String>,
    #[arg(long)]
    pub emergency: bool,
}

#[derive(Debug, Subcommand)]
pub enum GoalCommand {
    Add {
        name: String,
        #[command(flatten)]
        fields: GoalArgs,
    },
    /// Change the given fields of a goal
    Edit {
        goal: String,
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        fields: GoalArgs,
        #[arg(long, conflicts_with = "emergency")]
        not_emergency: bool,
    },
    List,
    Show {
        goal: String,
        /// Monthly contribution to project with
        #[arg(long)]
        monthly: Option<String>,
        #[arg(long, default_value_t = 12)]
        months: u32,
    },
    Delete {
        goal: String,
    },
    /// Declare the goal's balance at the end of a day
    Anchor {
        goal: String,
        date: String,
        balance: String,
    },
    /// Declared balances of a goal
    Anchors {
        goal: String,
    },
    RemoveAnchor {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ScenarioCommand {
    Create { name: String },
    List,
    Rename { scenario: String, new_name: String },
    Default { scenario: String },
    Duplicate { scenario: String, new_name: String },
    Delete { scenario: String },
}

#[derive(Debug, Args)]
pub struct RecurrenceArgs {
    #[arg(long, default_value = "monthly")]
    pub cadence: String,
    #[arg(long)]
    pub weekday: Option<String>,
    #[arg(long)]
    pub day: Option<u32>,
    /// Month of the year (yearly) or of the quarter (quarterly)
    #[arg(long)]
    pub month: Option<u32>,
}

impl RecurrenceArgs {
    fn to_recurrence(&self, reference: NaiveDate) -> AppResult<Recurrence> {
        let cadence: Cadence = self.cadence.parse()?;
        let weekday = self.weekday.as_deref().map(parse_weekday).transpose()?;
        Recurrence::from_parts(cadence, weekday, self.day, self.month, reference)
    }
}

#[derive(Debug, Subcommand)]
pub enum BudgetCommand {
    Set {
        category: String,
        amount: String,
        #[command(flatten)]
        recurrence: RecurrenceArgs,
        #[arg(long)]
        scenario: Option<String>,
    },
    Increase {
        category: String,
        amount: String,
        #[arg(long)]
        scenario: Option<String>,
    },
    Decrease {
        category: String,
        amount: String,
        #[arg(long)]
        scenario: Option<String>,
    },
    List {
        #[arg(long)]
        scenario: Option<String>,
    },
    Remove {
        category: String,
        #[arg(long)]
        scenario: Option<String>,
    },
    /// Spending against each limit for the current period
    Health {
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        scenario: Option<String>,
    },
    /// Every limit converted to a monthly figure
    Plan {
        #[arg(long)]
        scenario: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct ForecastItemArgs {
    #[arg(long)]
    pub description: String,
    #[arg(long)]
    pub amount: String,
    #[arg(long = "type")]
    pub transaction_type: String,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub goal: Option<String>,
    #[arg(long)]
    pub scenario: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ForecastCommand {
    AddRule {
        #[command(flatten)]
        item: ForecastItemArgs,
        #[command(flatten)]
        recurrence: RecurrenceArgs,
        /// First day the rule applies (today by default)
        #[arg(long)]
        starts_on: Option<String>,
        #[arg(long)]
        ends_on: Option<String>,
    },
    AddEvent {
        #[command(flatten)]
        item: ForecastItemArgs,
        #[arg(long)]
        date: String,
    },
    List {
        #[arg(long)]
        scenario: Option<String>,
    },
    RemoveRule {
        id: String,
    },
    RemoveEvent {
        id: String,
    },
    /// Every projected entry in a window
    Project {
        #[command(flatten)]
        window: HorizonArgs,
        #[arg(long)]
        scenario: Option<String>,
    },
    /// Projected totals per month
    Cashflow {
        #[command(flatten)]
        window: HorizonArgs,
        #[arg(long)]
        scenario: Option<String>,
        /// Opening balance (balance on the day before the window by default)
        #[arg(long, allow_hyphen_values = true)]
        opening: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum WhatIfCommand {
    /// Apply amount overrides and show their effect
    Run {
        #[arg(long)]
        scenario: Option<String>,
        /// Budget rule override as `RULE_ID=AMOUNT`
        #[arg(long = "budget")]
        budgets: Vec<String>,
        /// Forecast rule override as `RULE_ID=AMOUNT`
        #[arg(long = "forecast")]
        forecasts: Vec<String>,
        #[command(flatten)]
        window: HorizonArgs,
        /// Save the result as a new scenario
        #[arg(long, conflicts_with = "save")]
        save_as: Option<String>,
        /// Write the overrides into the scenario itself
        #[arg(long)]
        save: bool,
    },
    /// Monthly net of two scenarios side by side
    Compare {
        first: String,
        second: String,
        #[command(flatten)]
        window: HorizonArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Csv,
    Camt053,
}

impl From<FormatArg> for ImportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ImportFormat::Csv,
            FormatArg::Camt053 => ImportFormat::Camt053,
        }
    }
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    pub path: PathBuf,
    #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
    pub format: FormatArg,
}

#[derive(Debug, Subcommand)]
pub enum RuleCommand {
    Add { pattern: String, category: String },
    List,
    Remove { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    Export { path: PathBuf },
    /// Replace everything in the store with a backup
    Restore { path: PathBuf },
}

/// A window over past dates: `from` defaults to the first of the current
/// month, `to` to today.
#[derive(Debug, Args)]
pub struct WindowArgs {
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long)]
    pub to: Option<String>,
}

impl WindowArgs {
    fn resolve(&self, today: NaiveDate) -> AppResult<(NaiveDate, NaiveDate)> {
        let from = match self.from.as_deref() {
            Some(raw) => parse_date(raw)?,
            None => today.with_day(1).unwrap_or(today),
        };
        let to = match self.to.as_deref() {
            Some(raw) => parse_date(raw)?,
            None => today,
        };
        Ok((from, to))
    }
}

/// A window looking forward: `from` defaults to today and `to` to `months`
/// months later.
#[derive(Debug, Args)]
pub struct HorizonArgs {
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long, default_value_t = 12)]
    pub months: u32,
}

impl HorizonArgs {
    fn resolve(&self, today: NaiveDate) -> AppResult<(NaiveDate, NaiveDate)> {
        let from = match self.from.as_deref() {
            Some(raw) => parse_date(raw)?,
            None => today,
        };
        let to = match self.to.as_deref() {
            Some(raw) => parse_date(raw)?,
            None => from
                .checked_add_months(Months::new(self.months))
                .and_then(|d| d.pred_opt())
                .ok_or_else(|| AppError::validation("Forecast horizon is out of range"))?,
        };
        if from > to {
            return Err(AppError::validation("Start date must be before end date."));
        }
        Ok((from, to))
    }
}

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// Actual income, expenses and savings per month
    Cashflow(WindowArgs),
    /// Expenses per category
    Spending(WindowArgs),
    Budgets {
        #[arg(long)]
        scenario: Option<String>,
    },
    Savings,
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub window: WindowArgs,
    #[arg(long)]
    pub scenario: Option<String>,
}

fn parse_optional_date(raw: Option<&str>) -> AppResult<Option<NaiveDate>> {
    raw.map(parse_date).transpose()
}

fn parse_override(raw: &str) -> AppResult<(String, i64)> {
    let (id, amount) = raw
        .split_once('=')
        .ok_or_else(|| AppError::validation(format!("Invalid override '{}'. Use RULE_ID=AMOUNT", raw)))?;
    Ok((id.trim().to_string(), parse_cents(amount)?))
}

fn print_transaction(tx: &Transaction, names: &HashMap<String, String>, symbol: &str) {
    println!(
        "{}  {}  {:<10} {:>14}  {:<20} {}",
        tx.id,
        tx.date,
        tx.transaction_type,
        format_money(tx.amount_cents, symbol),
        category_label(names, tx),
        tx.description
    );
}

fn print_scenario(scenario: &Scenario) {
    let marker = if scenario.is_default { " (default)" } else { "" };
    println!("{}  {}{}", scenario.id, scenario.name, marker);
}

/// Runs one parsed command against the store.
pub fn execute(command: Commands, conn: &Connection, config: &Config, today: NaiveDate) -> AppResult<()> {
    let symbol = config.currency_symbol.as_str();
    match command {
        Commands::Tx(cmd) => run_tx(cmd, conn, symbol, today),
        Commands::Category(cmd) => run_category(cmd, conn),
        Commands::Anchor(cmd) => run_anchor(cmd, conn, symbol, today),
        Commands::Goal(cmd) => run_goal(cmd, conn, symbol, today),
        Commands::Scenario(cmd) => run_scenario(cmd, conn),
        Commands::Budget(cmd) => run_budget(cmd, conn, config, today),
        Commands::Forecast(cmd) => run_forecast(cmd, conn, symbol, today),
        Commands::Whatif(cmd) => run_whatif(cmd, conn, symbol, today),
        Commands::Import(args) => {
            let summary = import::import_transactions_to_db(conn, args.format.into(), &args.path, today)?;
            println!(
                "Successfully imported {} transactions ({} duplicates skipped).",
                summary.imported, summary.skipped
            );
            Ok(())
        }
        Commands::Rule(cmd) => run_rule(cmd, conn),
        Commands::Backup(cmd) => run_backup(cmd, conn),
        Commands::Report(cmd) => run_report(cmd, conn, config, today),
        Commands::Dashboard(args) => {
            let (from, to) = args.window.resolve(today)?;
            let scenario = match args.scenario.as_deref() {
                Some(key) => Some(resolve_scenario(conn, Some(key))?),
                None => scenario_repository::get_default(conn)?,
            };
            let budget_health = match scenario {
                Some(ref s) => budget::budget_health(conn, &s.id, today, config.near_limit_percent)?,
                None => Vec::new(),
            };
            let panels = DashboardPanels {
                budget_health,
                savings: savings::all_goal_progress(conn, today)?,
                currency_symbol: config.currency_symbol.clone(),
            };
            run_dashboard(conn, from, to, &panels)
        }
    }
}

fn run_tx(cmd: TxCommand, conn: &Connection, symbol: &str, today: NaiveDate) -> AppResult<()> {
    match cmd {
        TxCommand::Add(args) => {
            let tx = add_transaction_to_db(conn, &args.to_form(), today)?;
            println!("Transaction added successfully! ID: {}", tx.id);
        }
        TxCommand::Quick { line } => {
            let tx = add_transaction_to_db(conn, &parse_transaction_line(&line)?, today)?;
            println!("Transaction added successfully! ID: {}", tx.id);
        }
        TxCommand::Edit { id, fields } => {
            let tx = update_transaction_in_db(conn, id.trim(), &fields.to_form(), today)?;
            println!("Transaction {} updated.", tx.id);
        }
        TxCommand::Remove { id } => {
            remove_transaction_from_db(conn, &id)?;
            println!("Transaction removed successfully.");
        }
        TxCommand::Show { id } => {
            let tx = repository::get_transaction(conn, id.trim())?
                .ok_or_else(|| AppError::not_found("Transaction", id.trim()))?;
            print_transaction(&tx, &category_names(conn)?, symbol);
            if let Some(method) = &tx.payment_method {
                println!("Payment method: {}", method);
            }
            if let Some(notes) = &tx.notes {
                println!("Notes: {}", notes);
            }
        }
        TxCommand::List {
            transaction_type,
            category,
            goal,
            from,
            to,
        } => {
            let filter = repository::TransactionFilter {
                transaction_type: transaction_type.as_deref().map(str::parse).transpose()?,
                category_id: match category.as_deref() {
                    Some(c) => Some(categories::find_category(conn, c)?.id),
                    None => None,
                },
                savings_goal_id: goal.as_deref().map(|g| resolve_goal(conn, g)).transpose()?,
                from: parse_optional_date(from.as_deref())?,
                to: parse_optional_date(to.as_deref())?,
            };
            let names = category_names(conn)?;
            let list = repository::list_transactions(conn, &filter)?;
            if list.is_empty() {
                println!("No transactions found.");
            }
            for tx in &list {
                print_transaction(tx, &names, symbol);
            }
        }
        TxCommand::Search { category } => {
            let transactions = search_transactions_by_category_db(conn, &category)?;
            if transactions.is_empty() {
                println!("No transactions found for category: {}", category);
            } else {
                println!("Transactions found for category '{}':", category);
                let names = category_names(conn)?;
                for tx in &transactions {
                    print_transaction(tx, &names, symbol);
                }
            }
        }
        TxCommand::Ledger(window) => {
            let (from, to) = window.resolve(today)?;
            for row in balance::running_balance(conn, from, to)? {
                println!(
                    "{}  {:<10} {:>14} {:>14}  {}",
                    row.transaction.date,
                    row.transaction.transaction_type,
                    format_money(row.transaction.signed_amount(), symbol),
                    format_money(row.balance_cents, symbol),
                    row.transaction.description
                );
            }
        }
    }
    Ok(())
}

fn run_category(cmd: CategoryCommand, conn: &Connection) -> AppResult<()> {
    match cmd {
        CategoryCommand::Add { name } => {
            let category = categories::create_category(conn, &name)?;
            println!("Category '{}' created.", category.name);
        }
        CategoryCommand::List { all } => {
            for category in categories::list_categories(conn, all)? {
                let marker = if category.is_archived { " (archived)" } else { "" };
                println!("{}{}", category.name, marker);
            }
        }
        CategoryCommand::Rename { category, new_name } => {
            let category = categories::rename_category(conn, &category, &new_name)?;
            println!("Category renamed to '{}'.", category.name);
        }
        CategoryCommand::Archive { category } => {
            let category = categories::archive_category(conn, &category)?;
            println!("Category '{}' archived.", category.name);
        }
        CategoryCommand::Unarchive { category } => {
            let category = categories::unarchive_category(conn, &category)?;
            println!("Category '{}' restored.", category.name);
        }
        CategoryCommand::Delete { category } => {
            categories::delete_category(conn, &category)?;
            println!("Category '{}' deleted.", category.trim());
        }
    }
    Ok(())
}

fn run_anchor(cmd: AnchorCommand, conn: &Connection, symbol: &str, today: NaiveDate) -> AppResult<()> {
    match cmd {
        AnchorCommand::Set { date, balance, note } => {
            let anchor = balance::set_balance_anchor(conn, parse_date(&date)?, parse_cents(&balance)?, note)?;
            println!("Balance on {} set to {}.", anchor.date, format_money(anchor.balance_cents, symbol));
        }
        AnchorCommand::List => {
            for anchor in balance::list_anchors(conn)? {
                println!(
                    "{}  {}  {:>14}  {}",
                    anchor.id,
                    anchor.date,
                    format_money(anchor.balance_cents, symbol),
                    anchor.note.as_deref().unwrap_or("")
                );
            }
        }
        AnchorCommand::Delete { id } => {
            balance::delete_anchor(conn, id.trim())?;
            println!("Anchor removed.");
        }
        AnchorCommand::Balance { date } => {
            let date = parse_optional_date(date.as_deref())?.unwrap_or(today);
            println!("Balance at end of {}: {}", date, format_money(balance_on(conn, date)?, symbol));
        }
        AnchorCommand::Reconcile { date, declared, record } => {
            let reconciliation = balance::reconcile(conn, parse_date(&date)?, parse_cents(&declared)?)?;
            println!(
                "Computed {}, declared {}, difference {}",
                format_money(reconciliation.computed_cents, symbol),
                format_money(reconciliation.declared_cents, symbol),
                format_money(reconciliation.difference_cents, symbol)
            );
            if record {
                match balance::record_adjustment(conn, &reconciliation)? {
                    Some(tx) => println!("Adjustment {} recorded.", tx.id),
                    None => println!("Books already balance."),
                }
            }
        }
    }
    Ok(())
}

fn goal_input(name: String, fields: &GoalArgs, base: GoalInput) -> AppResult<GoalInput> {
    Ok(GoalInput {
        name,
        target_amount_cents: match fields.target.as_deref() {
            Some(raw) => parse_cents(raw)?,
            None => base.target_amount_cents,
        },
        deadline: match fields.deadline.as_deref() {
            Some(raw) => Some(parse_date(raw)?),
            None => base.deadline,
        },
        annual_interest_rate: match fields.rate.as_deref() {
            Some(raw) => Some(savings::parse_rate(raw)?),
            None => base.annual_interest_rate,
        },
        interest_rate_schedule: match fields.schedule.as_deref() {
            Some(raw) => savings::parse_schedule(raw)?,
            None => base.interest_rate_schedule,
        },
        is_emergency_fund: fields.emergency || base.is_emergency_fund,
    })
}

fn run_goal(cmd: GoalCommand, conn: &Connection, symbol: &str, today: NaiveDate) -> AppResult<()> {
    match cmd {
        GoalCommand::Add { name, fields } => {
            if fields.target.is_none() {
                return Err(AppError::validation("A target amount is required (--target)"));
            }
            let goal = savings::create_goal(conn, &goal_input(name, &fields, GoalInput::default())?)?;
            println!("Savings goal '{}' created. ID: {}", goal.name, goal.id);
        }
        GoalCommand::Edit {
            goal,
            name,
            fields,
            not_emergency,
        } => {
            let existing = savings::get_goal(conn, &goal)?;
            let base = GoalInput {
                name: existing.name.clone(),
                target_amount_cents: existing.target_amount_cents,
                deadline: existing.deadline,
                annual_interest_rate: existing.annual_interest_rate,
                interest_rate_schedule: existing.interest_rate_schedule.clone(),
                is_emergency_fund: existing.is_emergency_fund && !not_emergency,
            };
            let input = goal_input(name.unwrap_or(existing.name), &fields, base)?;
            let updated = savings::update_goal(conn, &existing.id, &input)?;
            println!("Savings goal '{}' updated.", updated.name);
        }
        GoalCommand::List => {
            print!("{}", report::format_savings_progress(&savings::all_goal_progress(conn, today)?, symbol));
        }
        GoalCommand::Show { goal, monthly, months } => {
            let goal = savings::get_goal(conn, &goal)?;
            let progress = savings::goal_progress(conn, &goal, today)?;
            print!("{}", report::format_savings_progress(std::slice::from_ref(&progress), symbol));
            let monthly_cents = match monthly.as_deref() {
                Some(raw) => parse_cents(raw)?,
                None => progress.required_monthly_cents.unwrap_or(0),
            };
            println!("Projection with {} a month:", format_money(monthly_cents, symbol));
            for point in savings::project_goal(&goal, progress.balance.balance_cents, today, monthly_cents, months) {
                println!(
                    "{}  {:>14}  interest {:>12}",
                    point.month_end,
                    format_money(point.balance_cents, symbol),
                    format_money(point.interest_cents, symbol)
                );
            }
        }
        GoalCommand::Delete { goal } => {
            savings::delete_goal(conn, &goal)?;
            println!("Savings goal deleted.");
        }
        GoalCommand::Anchor { goal, date, balance } => {
            let anchor = savings::set_savings_anchor(conn, &goal, parse_date(&date)?, parse_cents(&balance)?)?;
            println!("Goal balance on {} set to {}.", anchor.date, format_money(anchor.balance_cents, symbol));
        }
        GoalCommand::Anchors { goal } => {
            let goal = savings::get_goal(conn, &goal)?;
            for anchor in savings::list_savings_anchors(conn, &goal.id)? {
                println!("{}  {}  {:>14}", anchor.id, anchor.date, format_money(anchor.balance_cents, symbol));
            }
        }
        GoalCommand::RemoveAnchor { id } => {
            savings::delete_savings_anchor(conn, id.trim())?;
            println!("Goal anchor removed.");
        }
    }
    Ok(())
}

fn run_scenario(cmd: ScenarioCommand, conn: &Connection) -> AppResult<()> {
    match cmd {
        ScenarioCommand::Create { name } => {
            let scenario = scenarios::create_scenario(conn, &name)?;
            print_scenario(&scenario);
        }
        ScenarioCommand::List => {
            for scenario in scenarios::list_scenarios(conn)? {
                print_scenario(&scenario);
            }
        }
        ScenarioCommand::Rename { scenario, new_name } => {
            print_scenario(&scenarios::rename_scenario(conn, &scenario, &new_name)?);
        }
        ScenarioCommand::Default { scenario } => {
            print_scenario(&scenarios::set_default_scenario(conn, &scenario)?);
        }
        ScenarioCommand::Duplicate { scenario, new_name } => {
            print_scenario(&scenarios::duplicate_scenario(conn, &scenario, &new_name)?);
        }
        ScenarioCommand::Delete { scenario } => {
            scenarios::delete_scenario(conn, &scenario)?;
            println!("Scenario deleted.");
        }
    }
    Ok(())
}

fn print_health(health: &[BudgetHealth], symbol: &str) {
    print!("{}", report::format_budget_health(health, symbol));
}

fn run_budget(cmd: BudgetCommand, conn: &Connection, config: &Config, today: NaiveDate) -> AppResult<()> {
    let symbol = config.currency_symbol.as_str();
    match cmd {
        BudgetCommand::Set {
            category,
            amount,
            recurrence,
            scenario,
        } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            let recurrence = recurrence.to_recurrence(today)?;
            let rule = budget::set_budget(conn, &scenario.id, &category, &amount, recurrence)?;
            println!(
                "Budget for '{}' set to {} ({}).",
                category.trim(),
                format_money(rule.amount_cents, symbol),
                rule.recurrence
            );
        }
        BudgetCommand::Increase {
            category,
            amount,
            scenario,
        } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            let rule = budget::increase_budget(conn, &scenario.id, &category, &amount)?;
            println!("Budget for '{}' is now {}.", category.trim(), format_money(rule.amount_cents, symbol));
        }
        BudgetCommand::Decrease {
            category,
            amount,
            scenario,
        } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            let rule = budget::decrease_budget(conn, &scenario.id, &category, &amount)?;
            println!("Budget for '{}' is now {}.", category.trim(), format_money(rule.amount_cents, symbol));
        }
        BudgetCommand::List { scenario } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            let names = category_names(conn)?;
            for rule in budget::list_budgets(conn, &scenario.id)? {
                println!(
                    "{}  {:<20} {:>14}  {}",
                    rule.id,
                    names.get(&rule.category_id).map(String::as_str).unwrap_or("?"),
                    format_money(rule.amount_cents, symbol),
                    rule.recurrence
                );
            }
        }
        BudgetCommand::Remove { category, scenario } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            budget::remove_budget(conn, &scenario.id, &category)?;
            println!("Budget for '{}' removed.", category.trim());
        }
        BudgetCommand::Health { date, scenario } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            let date = parse_optional_date(date.as_deref())?.unwrap_or(today);
            print_health(&budget::budget_health(conn, &scenario.id, date, config.near_limit_percent)?, symbol);
        }
        BudgetCommand::Plan { scenario } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            let plan = budget::monthly_plan(conn, &scenario.id)?;
            for line in &plan.lines {
                println!(
                    "{:<20} {:>14} {:<12} {:>14}/month",
                    line.category_name,
                    format_money(line.amount_cents, symbol),
                    line.cadence,
                    format_money(line.monthly_cents, symbol)
                );
            }
            println!("Total per month: {}", format_money(plan.total_monthly_cents, symbol));
        }
    }
    Ok(())
}

fn run_forecast(cmd: ForecastCommand, conn: &Connection, symbol: &str, today: NaiveDate) -> AppResult<()> {
    match cmd {
        ForecastCommand::AddRule {
            item,
            recurrence,
            starts_on,
            ends_on,
        } => {
            let scenario = resolve_scenario(conn, item.scenario.as_deref())?;
            let starts_on = parse_optional_date(starts_on.as_deref())?.unwrap_or(today);
            let form = ForecastRuleForm {
                description: item.description,
                amount: item.amount,
                transaction_type: item.transaction_type,
                recurrence: recurrence.to_recurrence(starts_on)?,
                starts_on,
                ends_on: parse_optional_date(ends_on.as_deref())?,
                category: item.category,
                savings_goal: item.goal,
            };
            let rule = forecast::add_rule(conn, &scenario.id, &form)?;
            println!("Forecast rule added. ID: {}", rule.id);
        }
        ForecastCommand::AddEvent { item, date } => {
            let scenario = resolve_scenario(conn, item.scenario.as_deref())?;
            let form = ForecastEventForm {
                description: item.description,
                amount: item.amount,
                transaction_type: item.transaction_type,
                date: parse_date(&date)?,
                category: item.category,
                savings_goal: item.goal,
            };
            let event = forecast::add_event(conn, &scenario.id, &form)?;
            println!("Forecast event added. ID: {}", event.id);
        }
        ForecastCommand::List { scenario } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            println!("Rules:");
            for rule in forecast::list_rules(conn, &scenario.id)? {
                let until = rule.ends_on.map(|d| format!(" until {}", d)).unwrap_or_default();
                println!(
                    "{}  {:<10} {:>14}  {}  {} from {}{}",
                    rule.id,
                    rule.transaction_type,
                    format_money(rule.amount_cents, symbol),
                    rule.description,
                    rule.recurrence,
                    rule.starts_on,
                    until
                );
            }
            println!("Events:");
            for event in forecast::list_events(conn, &scenario.id)? {
                println!(
                    "{}  {}  {:<10} {:>14}  {}",
                    event.id,
                    event.date,
                    event.transaction_type,
                    format_money(event.amount_cents, symbol),
                    event.description
                );
            }
        }
        ForecastCommand::RemoveRule { id } => {
            forecast::remove_rule(conn, &id)?;
            println!("Forecast rule removed.");
        }
        ForecastCommand::RemoveEvent { id } => {
            forecast::remove_event(conn, &id)?;
            println!("Forecast event removed.");
        }
        ForecastCommand::Project { window, scenario } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            let (from, to) = window.resolve(today)?;
            for item in forecast::project(conn, &scenario.id, from, to)? {
                println!(
                    "{}  {:<10} {:>14}  {}",
                    item.date,
                    item.transaction_type,
                    format_money(item.signed_amount(), symbol),
                    item.description
                );
            }
        }
        ForecastCommand::Cashflow {
            window,
            scenario,
            opening,
        } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            let (from, to) = window.resolve(today)?;
            let opening_cents = opening_balance(conn, opening.as_deref(), from)?;
            let flows = forecast::cash_flow_forecast(conn, &scenario.id, from, to, opening_cents)?;
            print!("{}", report::format_cash_flow(&flows, symbol));
        }
    }
    Ok(())
}

fn opening_balance(conn: &Connection, raw: Option<&str>, from: NaiveDate) -> AppResult<i64> {
    match (raw, from.pred_opt()) {
        (Some(raw), _) => parse_cents(raw),
        (None, Some(day_before)) => balance_on(conn, day_before),
        (None, None) => Ok(0),
    }
}

fn run_whatif(cmd: WhatIfCommand, conn: &Connection, symbol: &str, today: NaiveDate) -> AppResult<()> {
    match cmd {
        WhatIfCommand::Run {
            scenario,
            budgets,
            forecasts,
            window,
            save_as,
            save,
        } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            let mut session = WhatIf::load(conn, scenario)?;
            for raw in &budgets {
                let (id, cents) = parse_override(raw)?;
                session.override_budget(&id, cents)?;
            }
            for raw in &forecasts {
                let (id, cents) = parse_override(raw)?;
                session.override_forecast(&id, cents)?;
            }
            if !session.has_overrides() {
                if save_as.is_some() || save {
                    return Err(AppError::validation(
                        "Nothing to save. Give at least one --budget or --forecast override.",
                    ));
                }
                print_overridable_rules(conn, &session, symbol)?;
                return Ok(());
            }

            for delta in session.deltas(conn)? {
                println!(
                    "{:<20} {} -> {} ({}), {}/month",
                    delta.label,
                    format_money(delta.baseline_cents, symbol),
                    format_money(delta.override_cents, symbol),
                    delta.cadence,
                    format_money(delta.monthly_cash_effect_cents, symbol)
                );
            }
            println!("Net monthly effect: {}", format_money(session.monthly_delta_cents(conn)?, symbol));

            let (from, to) = window.resolve(today)?;
            let opening_cents = opening_balance(conn, None, from)?;
            print!("{}", report::format_cash_flow(&session.cash_flow(conn, from, to, opening_cents)?, symbol));

            if let Some(name) = save_as {
                let created = session.save_as_new_scenario(conn, &name)?;
                println!("Saved as new scenario '{}'.", created.name);
            } else if save {
                let changed = session.save_over_current(conn)?;
                println!("Updated {} rule(s) in '{}'.", changed, session.scenario().name);
            }
        }
        WhatIfCommand::Compare { first, second, window } => {
            let first = resolve_scenario(conn, Some(&first))?;
            let second = resolve_scenario(conn, Some(&second))?;
            let (from, to) = window.resolve(today)?;
            println!("{:<8} {:>14} {:>14} {:>14}", "Month", first.name, second.name, "Difference");
            for row in whatif::compare_scenarios(conn, &first, &second, from, to)? {
                println!(
                    "{:<8} {:>14} {:>14} {:>14}",
                    row.month.format("%Y-%m"),
                    format_money(row.first_net_cents, symbol),
                    format_money(row.second_net_cents, symbol),
                    format_money(row.difference_cents, symbol)
                );
            }
        }
    }
    Ok(())
}

/// Rule ids of the scenario with their amounts, for building overrides.
fn print_overridable_rules(conn: &Connection, session: &WhatIf, symbol: &str) -> AppResult<()> {
    let names = category_names(conn)?;
    println!("Rules in '{}':", session.scenario().name);
    for rule in session.budget_rules() {
        println!(
            "  --budget {}  {:<20} {} {}",
            rule.id,
            names.get(&rule.category_id).map(String::as_str).unwrap_or("?"),
            format_money(rule.amount_cents, symbol),
            rule.recurrence.cadence()
        );
    }
    for rule in session.forecast_rules() {
        println!(
            "  --forecast {}  {:<20} {} {}",
            rule.id,
            rule.description,
            format_money(rule.amount_cents, symbol),
            rule.recurrence.cadence()
        );
    }
    Ok(())
}

fn run_rule(cmd: RuleCommand, conn: &Connection) -> AppResult<()> {
    match cmd {
        RuleCommand::Add { pattern, category } => {
            let rule = import::add_category_rule(conn, &pattern, &category)?;
            println!("Rule {} added.", rule.id);
        }
        RuleCommand::List => {
            let names = category_names(conn)?;
            for rule in import::list_category_rules(conn)? {
                println!(
                    "{:>4}  {:<30} -> {}",
                    rule.id,
                    rule.pattern,
                    names.get(&rule.category_id).map(String::as_str).unwrap_or("?")
                );
            }
        }
        RuleCommand::Remove { id } => {
            import::remove_category_rule(conn, id)?;
            println!("Rule {} removed.", id);
        }
    }
    Ok(())
}

fn run_backup(cmd: BackupCommand, conn: &Connection) -> AppResult<()> {
    match cmd {
        BackupCommand::Export { path } => {
            let exported = backup::export_json(conn, &path)?;
            println!("Exported {} transactions to {}.", exported.transactions.len(), path.display());
        }
        BackupCommand::Restore { path } => {
            let summary = backup::import_json(conn, &path)?;
            println!(
                "Restored {} categories, {} transactions, {} scenarios and {} savings goals.",
                summary.categories, summary.transactions, summary.scenarios, summary.goals
            );
        }
    }
    Ok(())
}

fn run_report(cmd: ReportCommand, conn: &Connection, config: &Config, today: NaiveDate) -> AppResult<()> {
    let symbol = config.currency_symbol.as_str();
    match cmd {
        ReportCommand::Cashflow(window) => {
            let (from, to) = window.resolve(today)?;
            print!("{}", report::format_cash_flow(&report::cash_flow(conn, from, to)?, symbol));
        }
        ReportCommand::Spending(window) => {
            let (from, to) = window.resolve(today)?;
            print!("{}", report::format_breakdown(&report::spending_breakdown(conn, from, to)?, symbol));
        }
        ReportCommand::Budgets { scenario } => {
            let scenario = resolve_scenario(conn, scenario.as_deref())?;
            print_health(&budget::budget_health(conn, &scenario.id, today, config.near_limit_percent)?, symbol);
        }
        ReportCommand::Savings => {
            print!("{}", report::format_savings_progress(&savings::all_goal_progress(conn, today)?, symbol));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::establish_test_connection;
    use crate::db::{budget_repository, category_repository};
    use clap::CommandFactory;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn run(conn: &Connection, args: &[&str]) -> AppResult<()> {
        let mut argv = vec!["moneyplan"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        execute(cli.command, conn, &Config::default(), today())
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["moneyplan", "report", "savings", "--db", "x.db", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_add_and_remove_transaction() {
        let conn = establish_test_connection().unwrap();
        run(&conn, &["category", "add", "Food"]).unwrap();
        run(
            &conn,
            &[
                "tx", "add", "--date", "2025-06-01", "--description", "Groceries", "--amount", "42.50", "--type",
                "expense", "--category", "Food",
            ],
        )
        .unwrap();

        let all = repository::get_all_transactions(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].amount_cents, 4250);

        run(&conn, &["tx", "remove", &all[0].id]).unwrap();
        assert!(repository::get_all_transactions(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_negative_adjustment_amount_is_accepted() {
        let conn = establish_test_connection().unwrap();
        run(
            &conn,
            &[
                "tx", "add", "--date", "2025-06-01", "--description", "Fix", "--amount", "-5", "--type", "adjustment",
            ],
        )
        .unwrap();
        assert_eq!(repository::get_all_transactions(&conn).unwrap()[0].amount_cents, -500);
    }

    #[test]
    fn test_budget_commands_need_a_scenario() {
        let conn = establish_test_connection().unwrap();
        run(&conn, &["category", "add", "Food"]).unwrap();
        let err = run(&conn, &["budget", "set", "Food", "300"]).unwrap_err();
        assert!(err.to_string().contains("scenario create"));

        run(&conn, &["scenario", "create", "Base"]).unwrap();
        run(&conn, &["budget", "set", "Food", "300", "--cadence", "weekly", "--weekday", "mon"]).unwrap();
        let food = category_repository::find_by_name(&conn, "Food").unwrap().unwrap();
        let base = scenario_repository::get_default(&conn).unwrap().unwrap();
        let rule = budget_repository::get_budget(&conn, &base.id, &food.id).unwrap().unwrap();
        assert_eq!(rule.amount_cents, 30_000);
        assert_eq!(rule.recurrence.cadence(), Cadence::Weekly);
    }

    #[test]
    fn test_whatif_save_as_keeps_base() {
        let conn = establish_test_connection().unwrap();
        run(&conn, &["category", "add", "Food"]).unwrap();
        run(&conn, &["scenario", "create", "Base"]).unwrap();
        run(&conn, &["budget", "set", "Food", "300"]).unwrap();
        let base = scenario_repository::get_default(&conn).unwrap().unwrap();
        let rule = &budget::list_budgets(&conn, &base.id).unwrap()[0];

        let override_arg = format!("{}=250", rule.id);
        run(&conn, &["whatif", "run", "--budget", &override_arg, "--save-as", "Lean"]).unwrap();

        assert_eq!(budget::list_budgets(&conn, &base.id).unwrap()[0].amount_cents, 30_000);
        let lean = resolve_scenario(&conn, Some("Lean")).unwrap();
        assert_eq!(budget::list_budgets(&conn, &lean.id).unwrap()[0].amount_cents, 25_000);
    }

    #[test]
    fn test_whatif_without_overrides_lists_rules_and_refuses_to_save() {
        let conn = establish_test_connection().unwrap();
        run(&conn, &["category", "add", "Food"]).unwrap();
        run(&conn, &["scenario", "create", "Base"]).unwrap();
        run(&conn, &["budget", "set", "Food", "300"]).unwrap();

        run(&conn, &["whatif", "run"]).unwrap();
        let err = run(&conn, &["whatif", "run", "--save-as", "Copy"]).unwrap_err();
        assert!(err.is_validation());
        assert!(resolve_scenario(&conn, Some("Copy")).is_err());
    }

    #[test]
    fn test_parse_override() {
        assert_eq!(parse_override("abc=12.5").unwrap(), ("abc".to_string(), 1250));
        assert!(parse_override("abc").unwrap_err().is_validation());
    }

    #[test]
    fn test_horizon_defaults_to_twelve_months() {
        let horizon = HorizonArgs {
            from: None,
            to: None,
            months: 12,
        };
        let (from, to) = horizon.resolve(today()).unwrap();
        assert_eq!(from, today());
        assert_eq!(to, NaiveDate::from_ymd_opt(2026, 6, 14).unwrap());
    }
}
