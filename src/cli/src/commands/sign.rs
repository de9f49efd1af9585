//! `a3s-sign sign` command: sign an artifact and store the signature.

use std::time::Duration;

use a3s_sign_core::config::{config_dir, LogLevel, SignConfig};
use a3s_sign_runtime::sign::SigningParams;
use a3s_sign_runtime::{
    open_repository, resolve_signer, sign_artifact, ArtifactReference, PreparedSign,
    ReferenceMode, RegistryAuth, RegistryOptions, SignatureManifestKind, SignerSelection,
};
use clap::Args;
use tokio_util::sync::CancellationToken;

use crate::output::{parse_duration, ConsoleNotifier};

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Artifact to sign: `<registry>/<repository>(:<tag>|@<digest>)`, or
    /// `<layout-path>(:<tag>|@<digest>)` with --local-content
    pub reference: String,

    /// Signature validity, e.g. 24h, 30m, 7d (default: no expiry)
    #[arg(short = 'e', long, value_parser = parse_duration)]
    pub expiry: Option<Duration>,

    /// Plugin configuration as key=value (repeatable)
    #[arg(long = "plugin-config", value_name = "KEY=VALUE")]
    pub plugin_config: Vec<String>,

    /// Metadata added to the signed payload as key=value (repeatable)
    #[arg(short = 'm', long = "user-metadata", value_name = "KEY=VALUE")]
    pub user_metadata: Vec<String>,

    /// Manifest type used to store the signature: image or artifact
    #[arg(long, default_value = "image")]
    pub signature_manifest: String,

    /// Treat the reference as a local OCI image layout
    #[arg(long)]
    pub local_content: bool,

    /// Signing key name from signingkeys.json
    #[arg(short, long)]
    pub key: Option<String>,

    /// Signing plugin name (requires --id)
    #[arg(long)]
    pub plugin: Option<String>,

    /// Key identifier passed to the plugin
    #[arg(long)]
    pub id: Option<String>,

    /// Envelope format: jws or cose (default: config.json, else jws)
    #[arg(long)]
    pub signature_format: Option<String>,

    /// Registry username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Registry password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Reach the registry over plain HTTP
    #[arg(long)]
    pub insecure_registry: bool,

    /// Debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl SignArgs {
    pub fn log_level(&self) -> LogLevel {
        if self.debug {
            LogLevel::Debug
        } else if self.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        }
    }

    fn registry_auth(&self) -> Result<Option<RegistryAuth>, Box<dyn std::error::Error>> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Ok(Some(RegistryAuth::basic(u.clone(), p.clone()))),
            (None, None) => Ok(None),
            _ => Err("--username and --password must be given together".into()),
        }
    }
}

pub async fn execute(args: SignArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mode = if args.local_content {
        ReferenceMode::Local
    } else {
        ReferenceMode::Remote
    };
    // Manifest kind and reference are checked before any file is read.
    let kind: SignatureManifestKind = args.signature_manifest.parse()?;
    let reference = ArtifactReference::parse(&args.reference, mode)?;

    let dir = config_dir();
    let config = SignConfig::load(&dir)?;
    let signature_format = args
        .signature_format
        .clone()
        .or_else(|| config.signature_format.clone())
        .unwrap_or_else(|| "jws".to_string());
    let prepared = PreparedSign {
        reference,
        kind,
        params: SigningParams::new(
            &signature_format,
            args.expiry,
            &args.plugin_config,
            &args.user_metadata,
        )?,
    };

    let insecure = match &prepared.reference {
        ArtifactReference::Remote { registry, .. } => {
            args.insecure_registry || config.is_insecure(registry)
        }
        ArtifactReference::Local { .. } => false,
    };
    let repository = open_repository(
        &prepared.reference,
        &RegistryOptions {
            auth: args.registry_auth()?,
            insecure,
        },
    )?;
    let signer = resolve_signer(
        &SignerSelection {
            key: args.key.clone(),
            plugin: args.plugin.clone(),
            id: args.id.clone(),
        },
        &dir,
    )?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    tracing::info!(
        reference = %prepared.reference,
        kind = %prepared.kind,
        format = %signature_format,
        "Signing artifact"
    );
    let notifier = ConsoleNotifier;
    let outcome = sign_artifact(
        &prepared,
        repository.as_ref(),
        signer.as_ref(),
        &notifier,
        &cancel,
    )
    .await;
    cancel.cancel();

    outcome.report(&notifier)?;
    Ok(())
}
