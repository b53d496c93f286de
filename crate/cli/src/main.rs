//! Copyright 2024 Cosmian Tech SAS
//!
//! Thin front-end over the signing workflow: load the module named on
//! the command line, run the workflow once, print a status line. All
//! the actual behavior lives in `tokensign_token`.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use tokensign_token::{ModuleInfo, Outcome, Pkcs11Module, SIGNATURE_CAPACITY, SigningWorkflow};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Sign a demo payload with a PKCS#11 hardware token", long_about = None)]
struct Cli {
    /// Path to the vendor PKCS#11 module
    ///
    /// This is an alternative to the env variable `TOKENSIGN_MODULE`.
    #[arg(env = "TOKENSIGN_MODULE")]
    module: PathBuf,

    /// Capacity in bytes reserved for the signature output buffer
    #[arg(long, default_value_t = SIGNATURE_CAPACITY)]
    signature_capacity: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let module = match Pkcs11Module::open(&cli.module) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("failed to load {}: {e}", cli.module.display());
            return ExitCode::FAILURE;
        }
    };
    if let Ok(module_info) = ModuleInfo::query(&module) {
        info!("loaded {module_info}");
    }

    let workflow =
        SigningWorkflow::with_signature_capacity(Arc::new(module), cli.signature_capacity);
    match workflow.run() {
        Outcome::Success => {
            println!("signature produced");
            ExitCode::SUCCESS
        }
        Outcome::NoDevice => {
            println!("no token present, plug or start the device");
            ExitCode::FAILURE
        }
        Outcome::NoKey => {
            println!("no RSA private key found on the token");
            ExitCode::FAILURE
        }
        Outcome::Failed(e) => {
            eprintln!("signing failed: {e}");
            ExitCode::FAILURE
        }
    }
}
