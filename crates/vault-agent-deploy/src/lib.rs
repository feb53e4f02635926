//! # vault-agent-deploy
//!
//! Fetch → format/split → write → reload → health-check → rollback
//! orchestration for certificate and secret targets (component C4).

mod deployer;
mod pem;
mod reload;
mod source;

pub use deployer::{sha256_hex, DeployResult, Deployer};
pub use pem::{parse_certificate_info, split_pem_bundle, CertificateInfo, PemComponents};
pub use reload::{run_health_check, run_reload_command, CommandOutput, COMMAND_TIMEOUT};
pub use source::{CertificateSource, SecretSource};
