//! Order command handlers: `podesk order create|approve|reject|delete|pay|show`.
//!
//! Input is validated before connecting to the database, so a bad draft,
//! id or amount fails fast without PODESK_DATABASE_URL.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use podesk_lifecycle::{describe, validate_draft, LineDraftParser};
use podesk_runtime::{Calendar, Outcome};
use podesk_schemas::{Order, OrderDraft};

use super::{connect, load_config, parse_order_id, print_order};

// ---------------------------------------------------------------------------
// order create
// ---------------------------------------------------------------------------

pub async fn create(config_paths: &[String], file: &str) -> Result<()> {
    let (_, cfg) = load_config(config_paths)?;
    let draft = read_draft(file)?;

    let today = Calendar::new(cfg.timezone).today(Utc::now());
    let valid = match validate_draft(draft, today) {
        Ok(v) => v,
        Err(errors) => bail!("INVALID_DRAFT: {}", describe(&errors)),
    };

    let wiring = connect(&cfg).await?;
    let order = wiring.desk.create_order(valid).await?;
    println!("created=true");
    print_order(&order);
    Ok(())
}

fn read_draft(file: &str) -> Result<OrderDraft> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read draft file failed: {file}"))?;

    if file.ends_with(".json") {
        return serde_json::from_str(&raw).context("draft file must contain a valid JSON draft");
    }

    let parsed = LineDraftParser.parse(&raw);
    match parsed.draft {
        Some(draft) if parsed.valid => Ok(draft),
        _ => bail!("INVALID_DRAFT: {}", parsed.errors.join("; ")),
    }
}

// ---------------------------------------------------------------------------
// transitions
// ---------------------------------------------------------------------------

/// Print the applied order, or fail with the conflict code on a no-op.
fn report(outcome: Outcome<Order>) -> Result<()> {
    match outcome {
        Outcome::Applied(order) => {
            println!("applied=true");
            print_order(&order);
            Ok(())
        }
        Outcome::NoOp(e) => bail!("{}: {}", e.code(), e),
    }
}

pub async fn approve(config_paths: &[String], id: &str, by: &str) -> Result<()> {
    let order_id = parse_order_id(id)?;
    let (_, cfg) = load_config(config_paths)?;
    let wiring = connect(&cfg).await?;
    report(wiring.desk.approve(&order_id, by).await?)
}

pub async fn reject(config_paths: &[String], id: &str, by: &str, reason: &str) -> Result<()> {
    let order_id = parse_order_id(id)?;
    let (_, cfg) = load_config(config_paths)?;
    let wiring = connect(&cfg).await?;
    report(wiring.desk.reject(&order_id, by, reason).await?)
}

pub async fn delete(config_paths: &[String], id: &str, by: &str, reason: &str) -> Result<()> {
    let order_id = parse_order_id(id)?;
    let (_, cfg) = load_config(config_paths)?;
    let wiring = connect(&cfg).await?;
    report(wiring.desk.soft_delete(&order_id, by, reason).await?)
}

pub async fn pay(
    config_paths: &[String],
    id: &str,
    amount: &str,
    by: &str,
    reference: Option<String>,
    note: Option<String>,
) -> Result<()> {
    let order_id = parse_order_id(id)?;
    let amount = podesk_ledger::parse_amount(amount).context("invalid --amount")?;
    let (_, cfg) = load_config(config_paths)?;
    let wiring = connect(&cfg).await?;

    let order = wiring
        .desk
        .record_payment(&order_id, amount, by, reference, note)
        .await?;
    println!("payment_recorded=true");
    print_order(&order);
    Ok(())
}

// ---------------------------------------------------------------------------
// order show
// ---------------------------------------------------------------------------

pub async fn show(config_paths: &[String], id: &str) -> Result<()> {
    let order_id = parse_order_id(id)?;
    let (_, cfg) = load_config(config_paths)?;
    let wiring = connect(&cfg).await?;

    let Some(order) = wiring.desk.get_order(&order_id).await? else {
        bail!("NOT_FOUND: order {order_id} does not exist");
    };
    print_order(&order);
    Ok(())
}
