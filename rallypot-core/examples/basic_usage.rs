use rallypot_core::{build_transfer, Amount, IdentityManager, Ledger, SqliteLedger, Storage};
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Create temp dir
    let temp_dir = tempdir()?;
    println!("Using temporary directory: {:?}", temp_dir.path());

    // One database file backs identities and the development ledger
    let storage = Arc::new(Storage::new(&temp_dir.path().join("rallypot.db")).await?);
    let identities = IdentityManager::new(storage.clone());
    let ledger = SqliteLedger::new(storage);

    println!("Creating players...");
    let alice = identities.create_identity("alice").await?;
    let bob = identities.create_identity("bob").await?;

    println!("Players created!");
    println!("Alice: {}", alice.address());
    println!("Bob: {}", bob.address());

    // Fund alice from the local faucet
    let funded = ledger
        .credit(&alice.address(), Amount::from_raw(1_000_000))
        .await?;
    println!("\nAlice funded, balance: {}", funded);

    // Move half to bob with a signed transfer authorization
    let transfer = build_transfer(alice.keys(), bob.address(), Amount::from_raw(500_000));
    let receipt = ledger.submit_transfer(&transfer).await?;
    println!("\nTransfer submitted: {}", receipt.transfer_id);

    // Check balances
    println!("\nBalances:");
    println!("Alice: {}", ledger.balance(&alice.address()).await?);
    println!("Bob: {}", ledger.balance(&bob.address()).await?);

    // List identities
    let players = identities.list_identities().await?;
    println!("\nKnown players: {}", players.len());

    println!("\nExample completed successfully!");

    Ok(())
}
