// Copyright (c) 2026 Kin SDK Contributors. MIT License.
// See LICENSE for details.

//! # Kin Sample Wallet
//!
//! Entry point for the `kin-sample` binary. Parses CLI arguments,
//! initializes logging, then either serves an in-process ledger over
//! JSON-RPC or runs one wallet command against a ledger endpoint:
//!
//! - `serve`    — local ledger on `--port`
//! - `create`, `list`, `delete`, `wipe` — keystore management
//! - `activate`, `balance`, `send`, `get-kin` — ledger operations
//! - `export`   — print a portable key blob

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::signal;

use kin_sdk::gateway::rpc_router;
use kin_sdk::{KinAccount, KinClient, LocalLedger, NetworkId, RpcGateway};

use cli::{Commands, GlobalArgs, KinSampleCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = KinSampleCli::parse();
    logging::init_logging(
        "kin_sample=info,kin_sdk=info,tower_http=info",
        cli.global.log_format,
    );
    let network = cli.global.network_id()?;

    match cli.command {
        Commands::Serve(args) => serve(network, args).await,
        command => run_wallet(&cli.global, network, command).await,
    }
}

/// Serves an in-process ledger until Ctrl+C or SIGTERM.
async fn serve(network: NetworkId, args: cli::ServeArgs) -> Result<()> {
    let ledger = Arc::new(LocalLedger::new(network));
    let addr = format!("{}:{}", args.bind, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {addr}"))?;

    tracing::info!(
        %addr,
        network = %ledger.network_id(),
        asset = %ledger.asset(),
        "ledger listening"
    );

    axum::serve(listener, rpc_router(Arc::clone(&ledger)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("RPC server failed")?;

    tracing::info!(transactions = ledger.transaction_count(), "ledger stopped");
    Ok(())
}

async fn run_wallet(global: &GlobalArgs, network: NetworkId, command: Commands) -> Result<()> {
    let client = KinClient::builder(&global.rpc_url, network)
        .keystore_dir(&global.keystore_dir)
        .runtime_handle(Handle::current())
        .build()
        .with_context(|| format!("failed to open keystore at {}", global.keystore_dir.display()))?;

    match command {
        Commands::Serve(_) => anyhow::bail!("serve does not open a wallet"),
        Commands::Create(args) => {
            let account = client.add_account(&args.passphrase)?;
            println!("{}\t{}", account.index(), account.public_address());
        }
        Commands::List => {
            for account in client.accounts().iter() {
                println!("{}\t{}", account.index(), account.public_address());
            }
        }
        Commands::Balance(args) => {
            let account = account(&client, args.index)?;
            println!("{} KIN", account.balance().await?);
        }
        Commands::Activate(args) => {
            let account = account(&client, args.index)?;
            let id = account.activate(&args.passphrase.passphrase).await?;
            println!("{id}");
        }
        Commands::Send(args) => {
            let account = account(&client, args.index)?;
            let result = account
                .send_transaction(
                    &args.to,
                    args.amount,
                    args.memo.as_deref(),
                    &args.passphrase.passphrase,
                )
                .await;
            match result {
                Ok(id) => println!("{id}"),
                Err(e) => {
                    if let Some(reason) = e.payment_error() {
                        tracing::warn!(?reason, "payment rejected by the ledger");
                    }
                    return Err(e.into());
                }
            }
        }
        Commands::Export(args) => {
            let account = account(&client, args.index)?;
            let exported =
                account.export_key_store(&args.passphrase.passphrase, &args.export_passphrase)?;
            println!("{}", exported.to_json()?);
        }
        Commands::Delete(args) => {
            account(&client, args.index)?;
            client.delete_account(args.index, &args.passphrase.passphrase)?;
            println!("deleted account {}", args.index);
        }
        Commands::GetKin(args) => {
            if client.network_id() == &NetworkId::MainNet {
                anyhow::bail!("the main network has no faucet");
            }
            let account = account(&client, args.index)?;
            let gateway = RpcGateway::new(client.url(), client.network_id().clone());
            let id = gateway
                .request_test_kin(account.public_address(), args.amount)
                .await?;
            println!("{id}");
        }
        Commands::Wipe(args) => {
            if !args.yes {
                anyhow::bail!(
                    "refusing to delete {} account(s) without --yes",
                    client.accounts().count()
                );
            }
            client.delete_keystore()?;
            println!("keystore wiped");
        }
    }
    Ok(())
}

fn account(client: &KinClient, index: usize) -> Result<Arc<KinAccount>> {
    client
        .accounts()
        .get(index)
        .with_context(|| format!("no account at index {index}"))
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
