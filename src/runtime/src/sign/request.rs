//! Signing request construction.
//!
//! Everything here is pure. [`SigningParams`] validates operator input before
//! any repository is touched; [`SigningParams::bind`] attaches the resolved
//! target afterwards.

use std::collections::BTreeMap;
use std::time::Duration;

use a3s_sign_core::error::{Result, SignError};

use super::resolve::ResolvedTarget;
use crate::signer::envelope_media_type;

/// Flag name used in `--plugin-config` errors.
pub const PLUGIN_CONFIG_FLAG: &str = "plugin-config";
/// Flag name used in `--user-metadata` errors.
pub const USER_METADATA_FLAG: &str = "user-metadata";

/// Annotation namespace owned by the signature format.
const RESERVED_METADATA_PREFIX: &str = "io.cncf.notary";

/// Longest accepted signature validity (100 years).
pub const MAX_EXPIRY: Duration = Duration::from_secs(100 * 365 * 86_400);

/// Parse `key=value` entries into a map.
///
/// Split on the first `=`. Values may be empty or contain `=`; keys may not
/// be empty or repeat.
pub fn parse_flag_map(entries: &[String], flag_name: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for entry in entries {
        let (key, value) = match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => (key, value),
            _ => {
                return Err(SignError::InvalidArgument(format!(
                    "could not parse flag {}: key-value pair requires \"=\" as separator",
                    flag_name
                )))
            }
        };
        if map.insert(key.to_string(), value.to_string()).is_some() {
            return Err(SignError::InvalidArgument(format!(
                "could not parse flag {}: key:{} is specified more than once",
                flag_name, key
            )));
        }
    }
    Ok(map)
}

/// Everything the signer needs to produce one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    /// Digest-pinned reference of the target
    pub artifact_reference: String,
    /// Envelope media type
    pub signature_media_type: String,
    /// `None` means the signature does not expire
    pub expiry: Option<Duration>,
    pub plugin_config: BTreeMap<String, String>,
    pub user_metadata: BTreeMap<String, String>,
}

/// Validated signing input not yet bound to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningParams {
    pub signature_media_type: String,
    pub expiry: Option<Duration>,
    pub plugin_config: BTreeMap<String, String>,
    pub user_metadata: BTreeMap<String, String>,
}

impl SigningParams {
    pub fn new(
        signature_format: &str,
        expiry: Option<Duration>,
        plugin_config: &[String],
        user_metadata: &[String],
    ) -> Result<Self> {
        let signature_media_type = envelope_media_type(signature_format)?.to_string();

        if let Some(expiry) = expiry {
            if expiry.subsec_nanos() != 0 {
                return Err(SignError::InvalidArgument(format!(
                    "expiry must be a whole number of seconds, got {:?}",
                    expiry
                )));
            }
            if expiry > MAX_EXPIRY {
                return Err(SignError::InvalidArgument(format!(
                    "expiry must not exceed {} days, got {}s",
                    MAX_EXPIRY.as_secs() / 86_400,
                    expiry.as_secs()
                )));
            }
        }
        let expiry = expiry.filter(|d| !d.is_zero());

        let plugin_config = parse_flag_map(plugin_config, PLUGIN_CONFIG_FLAG)?;
        let user_metadata = parse_flag_map(user_metadata, USER_METADATA_FLAG)?;
        if let Some(key) = user_metadata
            .keys()
            .find(|k| k.starts_with(RESERVED_METADATA_PREFIX))
        {
            return Err(SignError::InvalidArgument(format!(
                "could not parse flag {}: key:{} uses the reserved prefix {}",
                USER_METADATA_FLAG, key, RESERVED_METADATA_PREFIX
            )));
        }

        Ok(Self {
            signature_media_type,
            expiry,
            plugin_config,
            user_metadata,
        })
    }

    /// Attach the resolved target.
    pub fn bind(&self, target: &ResolvedTarget) -> SigningRequest {
        SigningRequest {
            artifact_reference: target.reference.to_string(),
            signature_media_type: self.signature_media_type.clone(),
            expiry: self.expiry,
            plugin_config: self.plugin_config.clone(),
            user_metadata: self.user_metadata.clone(),
        }
    }
}

/// Build a request for `target` in one step.
pub fn build_signing_request(
    target: &ResolvedTarget,
    signature_format: &str,
    expiry: Option<Duration>,
    plugin_config: &[String],
    user_metadata: &[String],
) -> Result<SigningRequest> {
    Ok(SigningParams::new(signature_format, expiry, plugin_config, user_metadata)?.bind(target))
}
