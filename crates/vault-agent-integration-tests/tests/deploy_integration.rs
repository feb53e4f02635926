//! End-to-end scenarios 1 and 2: secret rendering through to disk, and the
//! unchanged-fingerprint short-circuit for certificate deploys.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use vault_agent_common::{
    CertOutputPaths, CertificateTarget, NullSink, SecretFormat, SecretFormatOptions, SecretTarget,
    TargetName,
};
use vault_agent_deploy::Deployer;
use vault_agent_integration_tests::common::{random_cert_id, FixedCertSource, FixedSecretSource};

const LEAF: &str = "-----BEGIN CERTIFICATE-----\nleaf\n-----END CERTIFICATE-----\n";

fn deployer(cert_source: FixedCertSource, secret_source: FixedSecretSource) -> Deployer {
    Deployer::new(
        Arc::new(cert_source),
        Arc::new(secret_source),
        "host-1",
        Arc::new(NullSink),
    )
}

#[tokio::test]
async fn env_format_deploy_matches_the_documented_literal_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = BTreeMap::new();
    data.insert("DB_HOST".to_string(), serde_json::json!("db.local"));
    data.insert("DB_PASS".to_string(), serde_json::json!("p\"w\nd"));

    let deployer = deployer(
        FixedCertSource::new(LEAF, 1),
        FixedSecretSource { data, version: 1 },
    );

    let path = dir.path().join("app.env");
    let mut target = SecretTarget::new(
        TargetName::new("app"),
        vault_agent_common::RemoteSecretId::parse("prod:app/creds"),
        SecretFormat::Env,
        Some(path.display().to_string()),
    )
    .unwrap();
    target.options = SecretFormatOptions {
        env_prefix: Some("APP".to_string()),
        ..Default::default()
    };

    let result = deployer.deploy_secret(&mut target, false).await.unwrap();
    assert!(result.success);

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, "APP_DB_HOST=\"db.local\"\nAPP_DB_PASS=\"p\\\"w\\nd\"\n");

    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

#[tokio::test]
async fn second_unchanged_deploy_short_circuits_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let deployer = deployer(
        FixedCertSource::new(LEAF, 1),
        FixedSecretSource {
            data: BTreeMap::new(),
            version: 1,
        },
    );

    let path = dir.path().join("web.pem");
    let mut target = CertificateTarget::new(
        TargetName::new("web"),
        random_cert_id(),
        CertOutputPaths {
            combined: Some(path.display().to_string()),
            ..Default::default()
        },
    )
    .unwrap();

    let first = deployer.deploy_certificate(&mut target, false).await.unwrap();
    assert!(first.success);
    assert_eq!(first.files_written.len(), 1);

    let written_at = std::fs::metadata(&path).unwrap().modified().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));

    let second = deployer.deploy_certificate(&mut target, false).await.unwrap();
    assert!(second.success);
    assert_eq!(second.message, "unchanged");
    assert!(second.files_written.is_empty());

    let unchanged_at = std::fs::metadata(&path).unwrap().modified().unwrap();
    assert_eq!(written_at, unchanged_at);
}
