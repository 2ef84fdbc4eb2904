use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{NetworkDescriptor, NetworkInput};
use crate::error::SdkError;

pub const SUPPORTED_SCOPES: &[&str] = &["email", "reputation"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Email,
    Reputation,
}

impl std::str::FromStr for Scope {
    type Err = SdkError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "email" => Ok(Self::Email),
            "reputation" => Ok(Self::Reputation),
            other => Err(SdkError::Configuration(format!(
                "invalid 'scope' parameter: unsupported value {other:?} (supported: {})",
                SUPPORTED_SCOPES.join(", ")
            ))),
        }
    }
}

/// Configuration shared with the widget on every remote call.
///
/// Only `network` (through a network switch) and `default_email` change
/// after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkConfig {
    pub dapp_id: String,
    pub network: NetworkDescriptor,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_page_by_default: Option<bool>,
    #[serde(default)]
    pub staging: bool,
}

/// Parameters of the multi-node consensus relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecentralizedParams {
    pub dev_id: String,
    #[serde(default)]
    pub dispatchers: Vec<String>,
    /// How many relay nodes must be asked; above 1 their answers must agree.
    #[serde(default = "default_consensus_nodes")]
    pub consensus_nodes: usize,
}

fn default_consensus_nodes() -> usize {
    1
}

/// Parameters of the merkle-proof-verifying relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedParams {
    /// Registry alias of the chain; its node URL is used for proofs.
    pub chain: String,
    pub request_count: u32,
    pub min_deposit: u128,
}

/// Which relay backend an instance uses. Chosen once, at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RelayChoice {
    #[default]
    Direct,
    Decentralized(DecentralizedParams),
    Verified(VerifiedParams),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdkOptions {
    pub scope: Vec<Scope>,
    pub gas_relay: bool,
    pub register_page_by_default: Option<bool>,
    pub staging: bool,
    pub relay: RelayChoice,
}

impl SdkOptions {
    /// Parses loosely typed options (for callers handing over a JSON
    /// object), applying the same type checks construction would.
    pub fn from_json(raw: &Value) -> Result<Self, SdkError> {
        let obj = match raw {
            Value::Null => return Ok(Self::default()),
            Value::Object(obj) => obj,
            _ => {
                return Err(SdkError::Configuration(
                    "options must be an object".to_owned(),
                ))
            }
        };

        let scope = match obj.get("scope") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .ok_or_else(|| {
                            SdkError::Configuration(format!(
                                "invalid 'scope' parameter: {item} is not a string"
                            ))
                        })?
                        .parse::<Scope>()
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(SdkError::Configuration(
                    "'scope' must be an array".to_owned(),
                ))
            }
        };

        let register_page_by_default = match obj.get("registerPageByDefault") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                return Err(SdkError::Configuration(
                    "invalid 'registerPageByDefault' parameter, must be a boolean".to_owned(),
                ))
            }
        };

        let gas_relay = optional_bool(obj.get("gasRelay"), "gasRelay")?;
        let staging = optional_bool(obj.get("staging"), "staging")?;

        let relay = match (obj.get("pocket"), obj.get("verified")) {
            (Some(_), Some(_)) => {
                return Err(SdkError::Configuration(
                    "only one relay backend may be configured".to_owned(),
                ))
            }
            (Some(raw), None) => RelayChoice::Decentralized(
                serde_json::from_value(raw.clone()).map_err(|e| {
                    SdkError::Configuration(format!("invalid 'pocket' parameter: {e}"))
                })?,
            ),
            (None, Some(raw)) => RelayChoice::Verified(
                serde_json::from_value(raw.clone()).map_err(|e| {
                    SdkError::Configuration(format!("invalid 'verified' parameter: {e}"))
                })?,
            ),
            (None, None) => RelayChoice::Direct,
        };

        Ok(Self {
            scope,
            gas_relay,
            register_page_by_default,
            staging,
            relay,
        })
    }
}

fn optional_bool(raw: Option<&Value>, name: &str) -> Result<bool, SdkError> {
    match raw {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(SdkError::Configuration(format!(
            "invalid '{name}' parameter, must be a boolean"
        ))),
    }
}

/// Checks run before anything network- or widget-related is touched.
pub fn validate_params(dapp_id: &str, network: &NetworkInput) -> Result<(), SdkError> {
    if dapp_id.trim().is_empty() {
        return Err(SdkError::Configuration("'dappId' is required".to_owned()));
    }
    let missing_network = match network {
        NetworkInput::Alias(alias) => alias.trim().is_empty(),
        NetworkInput::Descriptor(_) => false,
    };
    if missing_network {
        return Err(SdkError::Configuration("'network' is required".to_owned()));
    }
    Ok(())
}

/// The page hosting the widget must be a secure context.
pub fn validate_secure_origin(origin: &str) -> Result<(), SdkError> {
    let (scheme, rest) = origin
        .split_once("://")
        .ok_or_else(|| SdkError::Configuration(format!("unparseable page origin {origin:?}")))?;
    let authority = rest.split('/').next().unwrap_or_default();
    let host = match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    };
    let is_localhost = host == "localhost" || host == "127.0.0.1";
    if is_localhost || scheme.eq_ignore_ascii_case("https") {
        return Ok(());
    }
    Err(SdkError::Configuration(format!(
        "access to the wallet is restricted to secure origins; {origin} is neither https nor localhost"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bogus_scope_is_rejected() {
        let err = SdkOptions::from_json(&serde_json::json!({"scope": ["bogus"]}))
            .expect_err("bogus scope must fail");
        assert!(matches!(err, SdkError::Configuration(ref m) if m.contains("scope")));
    }

    #[test]
    fn non_array_scope_is_rejected() {
        let err = SdkOptions::from_json(&serde_json::json!({"scope": "email"}))
            .expect_err("string scope must fail");
        assert_eq!(
            err,
            SdkError::Configuration("'scope' must be an array".to_owned())
        );
    }

    #[test]
    fn non_boolean_register_page_is_rejected() {
        let err = SdkOptions::from_json(&serde_json::json!({"registerPageByDefault": "yes"}))
            .expect_err("string flag must fail");
        assert!(err.to_string().contains("registerPageByDefault"));
    }

    #[test]
    fn full_options_parse() {
        let opts = SdkOptions::from_json(&serde_json::json!({
            "scope": ["email", "reputation"],
            "gasRelay": true,
            "registerPageByDefault": false,
            "verified": {"chain": "kovan", "requestCount": 2, "minDeposit": 10}
        }))
        .expect("valid options");
        assert_eq!(opts.scope, vec![Scope::Email, Scope::Reputation]);
        assert!(opts.gas_relay);
        assert_eq!(opts.register_page_by_default, Some(false));
        assert!(matches!(opts.relay, RelayChoice::Verified(ref p) if p.request_count == 2));
    }

    #[test]
    fn missing_dapp_id_and_network() {
        assert!(validate_params("", &NetworkInput::from("mainnet")).is_err());
        assert!(validate_params("x", &NetworkInput::from("")).is_err());
        assert!(validate_params("x", &NetworkInput::from("mainnet")).is_ok());
    }

    #[test]
    fn secure_origins() {
        assert!(validate_secure_origin("https://dapp.example").is_ok());
        assert!(validate_secure_origin("http://localhost:3000").is_ok());
        assert!(validate_secure_origin("http://127.0.0.1").is_ok());
        assert!(validate_secure_origin("http://dapp.example").is_err());
    }
}
