//! # CLI Interface
//!
//! Command-line structure of `kin-sample`, built with `clap` derive. One
//! subcommand serves a local ledger over JSON-RPC; the rest drive a wallet
//! (a persistent keystore plus a client) against any ledger endpoint.

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use kin_sdk::config::{DEFAULT_KEYSTORE_DIR, DEFAULT_RPC_PORT, DEFAULT_RPC_URL};
use kin_sdk::{LedgerAddress, NetworkId};

use crate::logging::LogFormat;

/// Sample wallet for the Kin SDK.
///
/// Keeps encrypted keys in a local keystore and talks to a ledger over
/// JSON-RPC. `serve` starts an in-process ledger to talk to.
#[derive(Parser, Debug)]
#[command(
    name = "kin-sample",
    about = "Kin SDK sample wallet and local ledger",
    version,
    propagate_version = true
)]
pub struct KinSampleCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Ledger endpoint.
    #[arg(long, global = true, env = "KIN_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Network: main, test, or custom (with --issuer and --network-passphrase).
    #[arg(long, global = true, env = "KIN_NETWORK", default_value = "test")]
    pub network: String,

    /// Kin issuer of a custom network.
    #[arg(long, global = true, env = "KIN_ISSUER")]
    pub issuer: Option<LedgerAddress>,

    /// Passphrase of a custom network.
    #[arg(long, global = true, env = "KIN_NETWORK_PASSPHRASE")]
    pub network_passphrase: Option<String>,

    /// Directory of the persistent keystore.
    #[arg(long, global = true, env = "KIN_KEYSTORE_DIR", default_value = DEFAULT_KEYSTORE_DIR)]
    pub keystore_dir: PathBuf,

    /// Log output format: pretty or json.
    #[arg(long, global = true, env = "KIN_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

impl GlobalArgs {
    /// Resolves `--network` (and the custom network flags) to a [`NetworkId`].
    pub fn network_id(&self) -> anyhow::Result<NetworkId> {
        if let Some(network) = NetworkId::from_name(&self.network) {
            return Ok(network);
        }
        if self.network.eq_ignore_ascii_case("custom") {
            let issuer = self
                .issuer
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--issuer is required for a custom network"))?;
            let passphrase = self.network_passphrase.clone().ok_or_else(|| {
                anyhow::anyhow!("--network-passphrase is required for a custom network")
            })?;
            return Ok(NetworkId::custom(issuer, passphrase));
        }
        anyhow::bail!("unknown network {:?} (expected main, test or custom)", self.network)
    }
}

/// Subcommands of the sample binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve an in-process ledger over JSON-RPC.
    Serve(ServeArgs),
    /// Create a new account in the keystore.
    Create(PassphraseArgs),
    /// List the accounts in the keystore.
    List,
    /// Print the Kin balance of an account.
    Balance(IndexArgs),
    /// Fund an account and open its Kin trustline.
    Activate(AccountArgs),
    /// Send Kin to another address.
    Send(SendArgs),
    /// Print an account's key as portable JSON.
    Export(ExportArgs),
    /// Delete an account's key from the keystore.
    Delete(AccountArgs),
    /// Ask the test faucet for Kin. Refused on the main network.
    GetKin(GetKinArgs),
    /// Delete every key in the keystore.
    Wipe(WipeArgs),
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on.
    #[arg(long, env = "KIN_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,
}

#[derive(Args, Debug)]
pub struct PassphraseArgs {
    /// Passphrase protecting the key.
    #[arg(long, short = 'p', env = "KIN_PASSPHRASE")]
    pub passphrase: String,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Account index, as printed by `list`.
    pub index: usize,
}

#[derive(Args, Debug)]
pub struct AccountArgs {
    /// Account index, as printed by `list`.
    pub index: usize,

    #[command(flatten)]
    pub passphrase: PassphraseArgs,
}

/// Arguments for `send`.
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Sending account index.
    pub index: usize,

    /// Destination address.
    #[arg(long)]
    pub to: LedgerAddress,

    /// Amount in Kin, e.g. `12.5`.
    #[arg(long)]
    pub amount: Decimal,

    /// Optional text memo (at most 28 bytes).
    #[arg(long)]
    pub memo: Option<String>,

    #[command(flatten)]
    pub passphrase: PassphraseArgs,
}

/// Arguments for `export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    pub index: usize,

    #[command(flatten)]
    pub passphrase: PassphraseArgs,

    /// Passphrase the exported blob is sealed with.
    #[arg(long, env = "KIN_EXPORT_PASSPHRASE")]
    pub export_passphrase: String,
}

/// Arguments for `get-kin`.
#[derive(Args, Debug)]
pub struct GetKinArgs {
    pub index: usize,

    /// Whole Kin to request.
    #[arg(long, default_value_t = 100)]
    pub amount: u64,
}

/// Arguments for `wipe`.
#[derive(Args, Debug)]
pub struct WipeArgs {
    /// Confirm the deletion. Nothing happens without it.
    #[arg(long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        KinSampleCli::command().debug_assert();
    }

    #[test]
    fn parses_send() {
        let to = kin_sdk::crypto::KinKeypair::generate().address();
        let cli = KinSampleCli::try_parse_from([
            "kin-sample",
            "send",
            "0",
            "--to",
            to.as_str(),
            "--amount",
            "12.5",
            "-p",
            "secret",
        ])
        .unwrap();
        match cli.command {
            Commands::Send(args) => {
                assert_eq!(args.index, 0);
                assert_eq!(args.to, to);
                assert_eq!(args.amount.to_string(), "12.5");
                assert_eq!(args.passphrase.passphrase, "secret");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn resolves_networks() {
        let cli = KinSampleCli::try_parse_from(["kin-sample", "--network", "main", "list"]).unwrap();
        assert_eq!(cli.global.network_id().unwrap(), NetworkId::MainNet);

        let cli = KinSampleCli::try_parse_from(["kin-sample", "--network", "custom", "list"]).unwrap();
        assert!(cli.global.network_id().is_err());

        let issuer = kin_sdk::crypto::KinKeypair::generate().address();
        let cli = KinSampleCli::try_parse_from([
            "kin-sample",
            "--network",
            "custom",
            "--issuer",
            issuer.as_str(),
            "--network-passphrase",
            "private net",
            "list",
        ])
        .unwrap();
        let network = cli.global.network_id().unwrap();
        assert_eq!(network.network_passphrase(), "private net");
        assert_eq!(network.issuer(), issuer);
    }
}
