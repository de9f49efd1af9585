//! `a3s-sign logout` command: remove stored registry credentials.

use a3s_sign_core::config::config_dir;
use a3s_sign_runtime::CredentialStore;
use clap::Args;

#[derive(Args)]
pub struct LogoutArgs {
    /// Registry server
    pub server: String,
}

pub async fn execute(args: LogoutArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = CredentialStore::in_dir(&config_dir());
    let removed = store.remove(&args.server)?;

    if removed {
        println!("Removing login credentials for {}", args.server);
    } else {
        println!("Not logged in to {}", args.server);
    }

    Ok(())
}
