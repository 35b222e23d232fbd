use super::AppContext;
use anyhow::{anyhow, Result};
use comfy_table::{presets::UTF8_FULL, Table};
use dialoguer::Confirm;
use rallypot_core::{build_transfer, Amount, Ledger};
use rallypot_settle::{JoinOutcome, MatchId, SignOutcome, Slot};

pub async fn create_match(ctx: &AppContext, player: &str, slot: &str) -> Result<()> {
    let identity = ctx.identities.load_identity(player).await?;
    let slot: Slot = slot.parse()?;

    let record = ctx
        .matches
        .create_match(slot, identity.address(), identity.name())
        .await?;

    println!("Created match {}", record.id);
    println!("You are seated at {}", slot);
    println!("Escrow address: {}", record.escrow_public_key);
    println!();
    println!("Share this code with the other players:");
    println!("  rallypot join <their-player> {} <seat>", record.id);
    Ok(())
}

pub async fn join_match(ctx: &AppContext, player: &str, code: &str, slot: &str) -> Result<()> {
    let identity = ctx.identities.load_identity(player).await?;
    let id: MatchId = code.parse()?;
    let slot: Slot = slot.parse()?;

    let (record, outcome) = ctx
        .matches
        .join_match(&id, slot, identity.address(), identity.name())
        .await?;

    match outcome {
        JoinOutcome::Joined => println!("Joined match {} at {}", id, slot),
        JoinOutcome::AlreadyJoined => println!("You already hold {} in match {}", slot, id),
    }
    println!("Players seated: {}", record.participants.len());
    println!();
    println!("Stake into escrow with:");
    println!("  rallypot deposit {} {} <amount>", player, id);
    Ok(())
}

pub async fn deposit(ctx: &AppContext, player: &str, code: &str, amount: u64) -> Result<()> {
    let identity = ctx.identities.load_identity(player).await?;
    let id: MatchId = code.parse()?;
    let record = ctx.matches.get_match(&id).await?;

    let stake = build_transfer(
        identity.keys(),
        record.escrow_public_key,
        Amount::from_raw(amount),
    );
    let receipt = ctx.ledger.submit_transfer(&stake).await?;
    let escrowed = ctx.ledger.balance(&record.escrow_public_key).await?;

    println!("Deposited {} into escrow for match {}", receipt.amount, id);
    println!("Escrow now holds {}", escrowed);
    Ok(())
}

pub async fn propose_result(ctx: &AppContext, code: &str, winner: &str, score: &str) -> Result<()> {
    let id: MatchId = code.parse()?;
    let winner: Slot = winner.parse()?;

    let record = ctx.matches.propose_result(&id, winner, score).await?;

    println!("Proposed result for match {}:", id);
    println!("  {}", record.result_message.as_deref().unwrap_or_default());
    println!();
    println!("Every player must now sign it:");
    println!("  rallypot sign <player> {}", id);
    Ok(())
}

pub async fn sign_result(ctx: &AppContext, player: &str, code: &str, yes: bool) -> Result<()> {
    let identity = ctx.identities.load_identity(player).await?;
    let id: MatchId = code.parse()?;
    let record = ctx.matches.get_match(&id).await?;

    let message = record
        .result_message
        .clone()
        .ok_or_else(|| anyhow!("No result has been proposed for match {}", id))?;
    let slot = record
        .participants
        .iter()
        .find(|(_, p)| p.address == identity.address())
        .map(|(slot, _)| *slot)
        .ok_or_else(|| anyhow!("'{}' is not seated in match {}", player, id))?;

    println!("About to sign as {}:", slot);
    println!("  {}", message);
    if !yes {
        let confirmed = Confirm::new()
            .with_prompt("Sign this result?")
            .default(true)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let signature = identity.keys().sign(message.as_bytes());
    let (record, outcome) = ctx.matches.record_signature(&id, slot, &signature).await?;

    match outcome {
        SignOutcome::Recorded { valid: true } => println!(
            "Signature recorded ({}/{} collected).",
            record.signatures.len(),
            record.participants.len()
        ),
        SignOutcome::Recorded { valid: false } => {
            println!("Signature recorded, but it does not verify against the proposed result.")
        }
        SignOutcome::AlreadySigned => println!("You already signed this proposal."),
    }

    if record.all_signed() {
        println!();
        println!("All participants have signed. Settle with:");
        println!("  rallypot watch {}", id);
    }
    Ok(())
}

pub async fn show_status(ctx: &AppContext, code: &str) -> Result<()> {
    let id: MatchId = code.parse()?;
    let record = ctx.matches.get_match(&id).await?;
    let escrowed = ctx.ledger.balance(&record.escrow_public_key).await?;

    println!("Match {}", record.id);
    println!("═══════════════════════════════════");
    println!("Phase: {}", record.phase());
    println!("Escrow address: {}", record.escrow_public_key);
    println!("Escrow balance: {}", escrowed);
    if let Some(message) = &record.result_message {
        println!("Proposed result: {}", message);
    }
    if let Some(settlement) = &record.settlement {
        println!(
            "Settled at: {}",
            settlement.settled_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!(
            "Paid: {} to {}",
            settlement.receipt.amount,
            settlement.receipt.to.short()
        );
    }
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Seat", "Player", "Address", "Signed", "Valid"]);

    for (slot, participant) in &record.participants {
        let (signed, valid) = match record.signatures.get(slot) {
            Some(entry) => ("yes".to_string(), entry.is_valid.to_string()),
            None => ("no".to_string(), "-".to_string()),
        };
        table.add_row(vec![
            slot.to_string(),
            participant.display_name.clone(),
            participant.address.short(),
            signed,
            valid,
        ]);
    }

    println!("{}", table);
    Ok(())
}

pub async fn list_matches(ctx: &AppContext) -> Result<()> {
    let matches = ctx.store.list().await?;

    if matches.is_empty() {
        println!("No matches yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Code", "Phase", "Players", "Result"]);

    for record in &matches {
        table.add_row(vec![
            record.id.to_string(),
            record.phase().to_string(),
            record.participants.len().to_string(),
            record
                .result_message
                .clone()
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    println!("{}", table);
    Ok(())
}
