//! Child-process supervisor for exec mode (component C9).

mod env_builder;
mod mapping;
mod restart;
mod secrets_dir;
mod supervisor;

pub use env_builder::{CredentialSource, EnvBuilder, ResolvedVar};
pub use mapping::{is_sensitive_name, parse_mapping, project_secret_value, EnvMapping};
pub use restart::RestartPolicy;
pub use secrets_dir::{ensure_secrets_dir, materialize, zero_and_unlink, DEFAULT_SECRETS_DIR};
pub use supervisor::{ExecConfig, RestartReason, Supervisor};
