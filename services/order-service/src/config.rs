//! Runtime configuration from environment variables

use alloy_primitives::{Address, B256};
use alloy_signer_local::PrivateKeySigner;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {variable}: {value}")]
    InvalidValue {
        variable: &'static str,
        value: String,
    },
}

/// Core service configuration
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Chain id baked into the EIP-712 domain
    pub chain_id: u64,
    /// Settlement contract address (EIP-712 verifying contract)
    pub verifying_contract: Address,
    /// Market-buy price impact, quote units per base unit filled
    pub impact_rate: f64,
    /// Settlement dispatch signer; settlement fails SignerMissing without it
    pub signer: Option<PrivateKeySigner>,
}

impl CoreConfig {
    /// Load from `CHAIN_ID`, `VERIFYING_CONTRACT`, and optionally
    /// `IMPACT_RATE` / `SIGNER_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let chain_id = env::var("CHAIN_ID")
            .map_err(|_| ConfigError::MissingEnvVar("CHAIN_ID"))?
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue {
                variable: "CHAIN_ID",
                value: env::var("CHAIN_ID").unwrap_or_default(),
            })?;

        let contract_raw =
            env::var("VERIFYING_CONTRACT").map_err(|_| ConfigError::MissingEnvVar("VERIFYING_CONTRACT"))?;
        let verifying_contract =
            Address::from_str(&contract_raw).map_err(|_| ConfigError::InvalidValue {
                variable: "VERIFYING_CONTRACT",
                value: contract_raw,
            })?;

        let impact_rate = match env::var("IMPACT_RATE") {
            Ok(raw) => raw.parse::<f64>().map_err(|_| ConfigError::InvalidValue {
                variable: "IMPACT_RATE",
                value: raw.clone(),
            })?,
            Err(_) => 1.0,
        };

        let signer = match env::var("SIGNER_KEY") {
            Ok(raw) => {
                let key = B256::from_str(raw.trim_start_matches("0x")).map_err(|_| {
                    ConfigError::InvalidValue {
                        variable: "SIGNER_KEY",
                        value: "<redacted>".into(),
                    }
                })?;
                Some(
                    PrivateKeySigner::from_bytes(&key).map_err(|_| ConfigError::InvalidValue {
                        variable: "SIGNER_KEY",
                        value: "<redacted>".into(),
                    })?,
                )
            }
            Err(_) => None,
        };

        Ok(Self {
            chain_id,
            verifying_contract,
            impact_rate,
            signer,
        })
    }

    /// Fixed configuration for tests and local runs
    pub fn for_tests(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            chain_id,
            verifying_contract,
            impact_rate: 1.0,
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: PrivateKeySigner) -> Self {
        self.signer = Some(signer);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_for_tests_defaults() {
        let config = CoreConfig::for_tests(
            31337,
            address!("5fbdb2315678afecb367f032d93f642f64180aa3"),
        );
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.impact_rate, 1.0);
        assert!(config.signer.is_none());
    }
}
