//! Walk-through of the account lifecycle against an in-process ledger.
//!
//! Creates two accounts, activates them, funds one from the test faucet,
//! sends a payment, exports a key and finally deletes an account, printing
//! each step. Uses the blocking API, so no async runtime is needed here.
//!
//! Run with:
//!   cargo run -p kin-sdk --example demo

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;

use kin_sdk::config::KeyStoreConfig;
use kin_sdk::{KinClient, KinError, LocalLedger, MemoryKeyStore, NetworkId};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

fn step(n: usize, title: &str) {
    println!();
    println!("{BOLD}{CYAN}[{n}] {title}{RESET}");
}

fn detail(label: &str, value: impl std::fmt::Display) {
    println!("    {DIM}{label:<12}{RESET} {value}");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(LocalLedger::new(NetworkId::TestNet));
    let client = KinClient::builder("http://127.0.0.1:8000", NetworkId::TestNet)
        .keystore(Arc::new(MemoryKeyStore::with_config(
            KeyStoreConfig::insecure_fast(),
        )))
        .gateway(ledger.clone())
        .build()?;

    println!("{BOLD}Kin SDK demo{RESET} {DIM}(network: {}){RESET}", client.network_id());

    step(1, "Create accounts");
    let alice = client.add_account("alice's passphrase")?;
    let bob = client.add_account("bob's passphrase")?;
    detail("alice", alice.public_address());
    detail("bob", bob.public_address());

    step(2, "Activate");
    detail("alice tx", alice.activate_blocking("alice's passphrase")?);
    detail("bob tx", bob.activate_blocking("bob's passphrase")?);

    step(3, "Fund alice from the test faucet");
    ledger.request_test_kin(alice.public_address(), 100)?;
    detail("alice", format!("{} KIN", alice.balance_blocking()?));

    step(4, "Pay bob 12.5 KIN");
    let id = alice.send_transaction_blocking(
        bob.public_address(),
        Decimal::from_str("12.5")?,
        Some("lunch"),
        "alice's passphrase",
    )?;
    detail("tx", id);
    detail("alice", format!("{} KIN", alice.balance_blocking()?));
    detail("bob", format!("{} KIN", bob.balance_blocking()?));

    step(5, "Try to overspend");
    match alice.send_transaction_blocking(
        bob.public_address(),
        Decimal::from(1_000),
        None,
        "alice's passphrase",
    ) {
        Err(e @ KinError::PaymentFailed(_)) => {
            detail("rejected", format!("{YELLOW}{e}{RESET}"));
            detail("reason", format!("{:?}", e.payment_error()));
        }
        other => detail("unexpected", format!("{other:?}")),
    }

    step(6, "Export bob's key");
    let exported = bob.export_key_store("bob's passphrase", "export secret")?;
    println!("{DIM}{}{RESET}", exported.to_json()?);

    step(7, "Delete bob");
    client.delete_account(bob.index(), "bob's passphrase")?;
    detail("accounts", client.accounts().count());
    detail("bob balance", format!("{:?}", bob.balance_blocking()));

    println!();
    println!("{GREEN}{BOLD}done{RESET}");
    Ok(())
}
