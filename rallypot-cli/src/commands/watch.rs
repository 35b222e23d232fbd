use super::AppContext;
use anyhow::Result;
use rallypot_settle::{MatchId, MatchWatcher, SettlementCoordinator};
use std::sync::Arc;
use std::time::Duration;

pub async fn watch_match(ctx: &AppContext, code: &str, poll_secs: u64) -> Result<()> {
    let id: MatchId = code.parse()?;
    // Resolve the code before parking on it.
    let record = ctx.matches.get_match(&id).await?;

    let coordinator = Arc::new(SettlementCoordinator::new(
        ctx.store.clone(),
        ctx.ledger.clone(),
    ));
    let watcher = MatchWatcher::new(coordinator, ctx.store.clone())
        .with_poll_interval(Duration::from_secs(poll_secs.max(1)));

    println!("Watching match {} ({})...", id, record.phase());
    println!("Press Ctrl-C to stop; the match can be settled by a later watch.");

    let receipt = watcher.watch(&id).await?;

    println!();
    println!("Match {} settled!", id);
    println!("  {} paid to {}", receipt.amount, receipt.to);
    println!("  Transfer ID: {}", receipt.transfer_id);
    Ok(())
}
