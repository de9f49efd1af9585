//! `a3s-sign login` command: store registry credentials.

use a3s_sign_core::config::config_dir;
use a3s_sign_runtime::CredentialStore;
use clap::Args;

#[derive(Args)]
pub struct LoginArgs {
    /// Registry server (e.g. ghcr.io, localhost:5000)
    pub server: String,

    /// Username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Read password from stdin
    #[arg(long)]
    pub password_stdin: bool,
}

fn prompt(label: &str) -> std::io::Result<String> {
    if !label.is_empty() {
        eprint!("{}: ", label);
    }
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

pub async fn execute(args: LoginArgs) -> Result<(), Box<dyn std::error::Error>> {
    let username = match args.username {
        Some(u) => u,
        None => prompt("Username")?,
    };

    let password = if args.password_stdin {
        prompt("")?
    } else {
        match args.password {
            Some(p) => p,
            None => prompt("Password")?,
        }
    };

    if username.is_empty() || password.is_empty() {
        return Err("Username and password are required".into());
    }

    let store = CredentialStore::in_dir(&config_dir());
    store.store(&args.server, &username, &password)?;

    tracing::debug!(registry = %args.server, "Credentials stored");
    println!("Login Succeeded");
    Ok(())
}
