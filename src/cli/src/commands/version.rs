//! `a3s-sign version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("a3s-sign version {}", a3s_sign_core::VERSION);
    Ok(())
}
