//! `tokencap budget get/set/reset/delete` — direct ledger access, for
//! operators without a running gateway in front of them.

use crate::cli::{BudgetProjectArgs, BudgetSetArgs};
use crate::ledger::{Budget, LedgerStore};
use colored::Colorize;
use chrono::Utc;

fn print_budget(project_id: &str, budget: &Budget) {
    let remaining = budget.limit_usd - budget.spent_usd;
    let utilization = if budget.limit_usd > 0.0 {
        (budget.spent_usd / budget.limit_usd) * 100.0
    } else {
        0.0
    };
    println!("project       {}", project_id.bold());
    println!("limit_usd     ${:.2}", budget.limit_usd);
    println!("spent_usd     ${:.2}", budget.spent_usd);
    let remaining_line = format!("remaining_usd ${:.2}", remaining);
    if remaining < 0.0 {
        println!("{}", remaining_line.red());
    } else if utilization >= 90.0 {
        println!("{}", remaining_line.yellow());
    } else {
        println!("{}", remaining_line.green());
    }
    println!("period_start  {}", budget.period_start.to_rfc3339());
    match budget.period_end {
        Some(end) => println!("period_end    {}", end.to_rfc3339()),
        None => println!("period_end    (none)"),
    }
}

pub fn handle_get(args: &BudgetProjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = LedgerStore::open(&args.database)?;
    match ledger.get_budget(&args.project_id)? {
        Some(budget) => print_budget(&args.project_id, &budget),
        None => println!("no budget configured for project {}", args.project_id),
    }
    Ok(())
}

pub fn handle_set(args: &BudgetSetArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.limit_usd <= 0.0 {
        return Err("limit-usd must be positive".into());
    }
    let ledger = LedgerStore::open(&args.database)?;
    let budget = ledger.set_budget(&args.project_id, args.limit_usd, args.period_days, Utc::now())?;
    print_budget(&args.project_id, &budget);
    Ok(())
}

pub fn handle_reset(args: &BudgetProjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = LedgerStore::open(&args.database)?;
    ledger.reset_budget_spent(&args.project_id, Utc::now())?;
    match ledger.get_budget(&args.project_id)? {
        Some(budget) => print_budget(&args.project_id, &budget),
        None => println!("no budget configured for project {}", args.project_id),
    }
    Ok(())
}

pub fn handle_delete(args: &BudgetProjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = LedgerStore::open(&args.database)?;
    if ledger.delete_budget(&args.project_id)? {
        println!("deleted budget for project {}", args.project_id);
    } else {
        println!("no budget configured for project {}", args.project_id);
    }
    Ok(())
}
