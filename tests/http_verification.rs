//! End-to-end verification runs over HTTP against the stub server.

use std::time::Duration;

use rstest::rstest;
use sonar::{
    api::{ClientSettings, HttpConnector},
    profile::ServerProfile,
    protocol::{DEFAULT_CLIENT_VERSION, ProtocolVersion},
    verifier::{ConnectivityVerifier, VerificationError, VerificationOutcome},
};
use test_util::{Fault, LicenseReply, StubConfig, StubServer, server::unused_local_url};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn verifier(timeout: Duration) -> ConnectivityVerifier {
    ConnectivityVerifier::new(
        HttpConnector::new(ClientSettings {
            client_id: "sonar-tests".to_owned(),
            timeout,
        }),
        DEFAULT_CLIENT_VERSION,
    )
}

fn profile(url: &str, password: &str) -> Result<ServerProfile, Box<dyn std::error::Error>> {
    Ok(ServerProfile::new(url, "alice", password)?)
}

#[rstest]
#[tokio::test]
async fn current_server_verifies_with_tokens() -> TestResult {
    let server = StubServer::start(StubConfig::default().with_version("1.16.0")?).await?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&server.base_url(), "sesame")?)
        .await;

    assert_eq!(report.outcome, VerificationOutcome::Success { licensed: true });
    assert_eq!(report.outcome.message(), "Connection OK");
    assert_eq!(report.discovered_version, Some(ProtocolVersion::new(1, 16, 0)));
    let requests = server.requests();
    let endpoints: Vec<_> = requests.iter().map(|r| r.endpoint().to_owned()).collect();
    assert_eq!(endpoints, ["ping.view", "ping.view", "getLicense.view"]);
    let versions: Vec<_> = requests.iter().map(|r| r.param("v")).collect();
    assert_eq!(versions, [Some("1.16.1"), Some("1.16.0"), Some("1.16.0")]);
    for request in &requests {
        assert_eq!(request.param("c"), Some("sonar-tests"));
        assert_eq!(request.param("f"), Some("json"));
        assert!(request.param("t").is_some() && request.param("s").is_some());
        assert_eq!(request.param("p"), None);
    }
    Ok(())
}

#[rstest]
#[tokio::test]
async fn old_server_negotiates_down_to_hex_password() -> TestResult {
    let server = StubServer::start(StubConfig::default().with_version("1.12.0")?).await?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&server.base_url(), "sesame")?)
        .await;

    assert_eq!(report.outcome, VerificationOutcome::Success { licensed: true });
    assert_eq!(report.discovered_version, Some(ProtocolVersion::new(1, 12, 0)));
    let requests = server.requests();
    let authenticated = requests.get(1).ok_or("missing authenticated ping")?;
    assert_eq!(authenticated.param("v"), Some("1.12.0"));
    assert_eq!(authenticated.param("p"), Some("enc:736573616d65"));
    assert_eq!(authenticated.param("t"), None);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn wrong_password_fails_authentication_without_license_check() -> TestResult {
    let server = StubServer::start(StubConfig::default()).await?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&server.base_url(), "not-sesame")?)
        .await;

    assert!(
        matches!(report.outcome, VerificationOutcome::AuthenticationFailed { .. }),
        "{report:?}"
    );
    assert!(
        report
            .outcome
            .message()
            .starts_with("Connection failure. Wrong username or password"),
        "{}",
        report.outcome
    );
    assert_eq!(server.requests().len(), 2);
    Ok(())
}

#[rstest]
#[case(LicenseReply::Invalid, VerificationOutcome::Success { licensed: false })]
#[tokio::test]
async fn invalid_license_is_reported_as_unlicensed(
    #[case] license: LicenseReply,
    #[case] expected: VerificationOutcome,
) -> TestResult {
    let server = StubServer::start(StubConfig::default().with_license(license)).await?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&server.base_url(), "sesame")?)
        .await;

    assert_eq!(report.outcome, expected);
    assert_eq!(
        report.outcome.message(),
        "Connection OK, but the server is not licensed"
    );
    Ok(())
}

#[rstest]
#[case(LicenseReply::Missing)]
#[case(LicenseReply::Error(50))]
#[tokio::test]
async fn license_failures_are_server_errors(#[case] license: LicenseReply) -> TestResult {
    let server = StubServer::start(StubConfig::default().with_license(license)).await?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&server.base_url(), "sesame")?)
        .await;

    assert!(
        matches!(report.outcome, VerificationOutcome::ServerError { .. }),
        "{report:?}"
    );
    assert_eq!(report.discovered_version, Some(ProtocolVersion::new(1, 16, 1)));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn unreachable_server_is_network_error() -> TestResult {
    let url = unused_local_url()?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&url, "sesame")?)
        .await;

    let VerificationOutcome::NetworkError { detail } = &report.outcome else {
        panic!("expected network error, got {report:?}");
    };
    assert!(!detail.contains("sesame"), "{detail}");
    assert!(!detail.contains("736573616d65"), "{detail}");
    assert_eq!(report.discovered_version, None);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn garbage_version_reply_stops_the_run() -> TestResult {
    let server = StubServer::start(StubConfig::default().fail_request(0, Fault::Garbage)).await?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&server.base_url(), "sesame")?)
        .await;

    assert!(
        matches!(report.outcome, VerificationOutcome::NetworkError { .. }),
        "{report:?}"
    );
    assert_eq!(server.requests().len(), 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn http_error_on_version_check_is_tolerated() -> TestResult {
    let server =
        StubServer::start(StubConfig::default().fail_request(0, Fault::Status(503))).await?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&server.base_url(), "sesame")?)
        .await;

    assert_eq!(report.outcome, VerificationOutcome::Success { licensed: true });
    assert_eq!(report.discovered_version, None);
    let requests = server.requests();
    let authenticated = requests.get(1).ok_or("missing authenticated ping")?;
    assert_eq!(authenticated.param("v"), Some("1.16.1"));
    Ok(())
}

#[rstest]
#[case(Fault::Status(401), "AuthenticationFailed")]
#[case(Fault::Garbage, "ServerError")]
#[tokio::test]
async fn authenticated_ping_faults(#[case] fault: Fault, #[case] expected: &str) -> TestResult {
    let server = StubServer::start(StubConfig::default().fail_request(1, fault)).await?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&server.base_url(), "sesame")?)
        .await;

    assert!(
        format!("{:?}", report.outcome).starts_with(expected),
        "{report:?}"
    );
    assert_eq!(server.requests().len(), 2);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn stalled_server_times_out() -> TestResult {
    let server = StubServer::start(StubConfig::default().fail_request(0, Fault::Stall)).await?;

    let report = verifier(Duration::from_millis(300))
        .verify(&profile(&server.base_url(), "sesame")?)
        .await;

    assert!(
        matches!(report.outcome, VerificationOutcome::NetworkError { .. }),
        "{report:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn ldap_account_uses_hex_password() -> TestResult {
    let server = StubServer::start(StubConfig::default().ldap_only()).await?;
    let ldap_profile = profile(&server.base_url(), "sesame")?.with_ldap_support(true);

    let report = verifier(Duration::from_secs(5)).verify(&ldap_profile).await;

    assert_eq!(report.outcome, VerificationOutcome::Success { licensed: true });
    assert!(server.requests().iter().all(|r| r.param("t").is_none()));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn ldap_account_without_flag_is_refused() -> TestResult {
    let server = StubServer::start(StubConfig::default().ldap_only()).await?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&server.base_url(), "sesame")?)
        .await;

    assert_eq!(
        report.outcome.detail(),
        Some("Token authentication not supported for LDAP users. (error 41)")
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn base_path_is_preserved() -> TestResult {
    let server = StubServer::start(StubConfig::default()).await?;
    let url = format!("{}/music/", server.base_url());

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&url, "sesame")?)
        .await;

    assert!(report.outcome.is_success(), "{report:?}");
    assert!(
        server
            .requests()
            .iter()
            .all(|r| r.path().starts_with("/music/rest/"))
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn unversioned_server_falls_back_to_client_max() -> TestResult {
    let server = StubServer::start(StubConfig::default().without_version()).await?;

    let report = verifier(Duration::from_secs(5))
        .verify(&profile(&server.base_url(), "sesame")?)
        .await;

    assert!(report.outcome.is_success(), "{report:?}");
    assert_eq!(report.discovered_version, None);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn cancelled_background_run_reports_nothing() -> TestResult {
    let server = StubServer::start(StubConfig::default().fail_request(0, Fault::Stall)).await?;

    let handle = verifier(Duration::from_millis(300)).spawn(profile(&server.base_url(), "sesame")?);
    handle.cancel();

    assert_eq!(handle.outcome().await, Err(VerificationError::Abandoned));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn discovered_version_can_be_persisted() -> TestResult {
    let server = StubServer::start(StubConfig::default().with_version("1.15.0")?).await?;
    let mut stored = profile(&server.base_url(), "sesame")?;

    let report = verifier(Duration::from_secs(5)).verify(&stored).await;

    assert!(stored.record_discovered_version(&report));
    assert_eq!(stored.minimum_api_version(), Some(ProtocolVersion::new(1, 15, 0)));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn self_signed_certificate_is_refused_by_default() -> TestResult {
    let server = StubServer::start_tls(StubConfig::default()).await?;
    let strict = profile(&server.base_url(), "sesame")?.with_self_signed_certificate(false);

    let report = verifier(Duration::from_secs(5)).verify(&strict).await;

    assert!(
        matches!(report.outcome, VerificationOutcome::NetworkError { .. }),
        "{report:?}"
    );
    assert_eq!(report.discovered_version, None);
    assert!(server.requests().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn self_signed_certificate_is_accepted_when_allowed() -> TestResult {
    let server = StubServer::start_tls(StubConfig::default().with_version("1.15.0")?).await?;
    let trusting = profile(&server.base_url(), "sesame")?.with_self_signed_certificate(true);

    let report = verifier(Duration::from_secs(5)).verify(&trusting).await;

    assert_eq!(report.outcome, VerificationOutcome::Success { licensed: true });
    assert_eq!(report.discovered_version, Some(ProtocolVersion::new(1, 15, 0)));
    assert_eq!(server.requests().len(), 3);
    Ok(())
}
