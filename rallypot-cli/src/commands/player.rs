use super::AppContext;
use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Table};
use rallypot_core::{Amount, Ledger};

pub async fn create_player(ctx: &AppContext, name: &str) -> Result<()> {
    let identity = ctx.identities.create_identity(name).await?;

    println!("Created player '{}'", identity.name());
    println!("Address: {}", identity.address());
    println!();
    println!("Opponents verify your signatures against this address.");
    Ok(())
}

pub async fn list_players(ctx: &AppContext) -> Result<()> {
    let players = ctx.identities.list_identities().await?;

    if players.is_empty() {
        println!("No players yet. Create one with: rallypot player create <name>");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Name", "Address", "Created"]);

    for record in &players {
        table.add_row(vec![
            record.name.clone(),
            record.address.short(),
            record.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }

    println!("{}", table);
    Ok(())
}

pub async fn fund_player(ctx: &AppContext, player: &str, amount: u64) -> Result<()> {
    let identity = ctx.identities.load_identity(player).await?;
    let balance = ctx
        .ledger
        .credit(&identity.address(), Amount::from_raw(amount))
        .await?;

    println!("Credited {} to '{}'", Amount::from_raw(amount), player);
    println!("New balance: {}", balance);
    Ok(())
}

pub async fn show_balance(ctx: &AppContext, player: &str) -> Result<()> {
    let identity = ctx.identities.load_identity(player).await?;
    let balance = ctx.ledger.balance(&identity.address()).await?;

    println!("{}: {}", player, balance);
    Ok(())
}
