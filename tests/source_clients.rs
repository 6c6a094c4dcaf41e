use depscan::cache::RunContext;
use depscan::checker::{NpmRegistryClient, OsvClient, PypiClient, QueryOutcome, SourceClient};
use depscan::{AdvisorySource, Dependency, Ecosystem, Severity};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn findings(outcome: QueryOutcome) -> Vec<depscan::VulnerabilityReport> {
    match outcome {
        QueryOutcome::Findings(reports) => reports,
        QueryOutcome::Failed(reason) => panic!("query failed: {}", reason),
    }
}

#[tokio::test]
async fn test_osv_query_wire_format() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .and(body_partial_json(json!({
            "package": { "name": "lodash", "ecosystem": "npm" },
            "version": "4.17.15"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vulns": [{
                "id": "GHSA-jf85-cpcp-j695",
                "summary": "Prototype Pollution in lodash",
                "aliases": ["CVE-2019-10744"],
                "severity": [{ "type": "CVSS_V3", "score": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H" }],
                "affected": [{
                    "ranges": [{ "type": "SEMVER", "events": [{ "introduced": "0" }, { "fixed": "4.17.12" }] }]
                }],
                "references": [
                    { "type": "WEB", "url": "https://snyk.io/vuln/SNYK-JS-LODASH-450202" },
                    { "type": "ADVISORY", "url": "https://github.com/advisories/GHSA-jf85-cpcp-j695" }
                ]
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = OsvClient::with_base_url(mock_server.uri());
    let ctx = RunContext::new();
    let dep = Dependency::new("lodash", "^4.17.15");

    let reports = findings(client.query(&dep, Ecosystem::Npm, &ctx).await);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, Severity::Critical);
    assert_eq!(reports[0].version, "^4.17.15");
    assert_eq!(
        reports[0].advisory_links,
        vec!["https://github.com/advisories/GHSA-jf85-cpcp-j695"]
    );
    assert_eq!(reports[0].suggested_upgrade.as_deref(), Some("4.17.12"));

    // Served from the run cache; the mock expects exactly one request.
    let again = findings(client.query(&dep, Ecosystem::Npm, &ctx).await);
    assert_eq!(again, reports);
}

#[tokio::test]
async fn test_osv_empty_body_is_no_findings() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mock_server)
        .await;

    let client = OsvClient::with_base_url(mock_server.uri());
    let outcome = client
        .query(&Dependency::new("requests", "2.31.0"), Ecosystem::PyPI, &RunContext::new())
        .await;
    assert_eq!(outcome, QueryOutcome::Findings(Vec::new()));
}

#[tokio::test]
async fn test_osv_server_error_is_failed_and_not_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = OsvClient::with_base_url(mock_server.uri());
    let ctx = RunContext::new();
    let dep = Dependency::new("lodash", "4.17.15");

    assert!(client.query(&dep, Ecosystem::Npm, &ctx).await.is_failed());
    assert!(client.query(&dep, Ecosystem::Npm, &ctx).await.is_failed());
    assert!(ctx.cache().is_empty());
}

#[tokio::test]
async fn test_osv_malformed_payload_is_failed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let client = OsvClient::with_base_url(mock_server.uri());
    let outcome = client
        .query(&Dependency::new("lodash", "4.17.15"), Ecosystem::Npm, &RunContext::new())
        .await;
    assert!(outcome.is_failed());
}

#[tokio::test]
async fn test_npm_audit_wire_format() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/-/npm/v1/security/audits"))
        .and(body_partial_json(json!({
            "requires": { "minimist": "1.2.0" },
            "dependencies": { "minimist": { "version": "1.2.0" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "actions": [],
            "advisories": {
                "1179": {
                    "id": 1179,
                    "title": "Prototype Pollution",
                    "module_name": "minimist",
                    "severity": "low",
                    "url": "https://npmjs.com/advisories/1179",
                    "vulnerable_versions": "<0.2.1 || >=1.0.0 <1.2.3",
                    "patched_versions": ">=0.2.1 <1.0.0 || >=1.2.3",
                    "cves": ["CVE-2020-7598"]
                }
            },
            "muted": [],
            "metadata": {}
        })))
        .mount(&mock_server)
        .await;

    let client = NpmRegistryClient::with_base_url(mock_server.uri());
    let reports = findings(
        client
            .query(&Dependency::new("minimist", "~1.2.0"), Ecosystem::Npm, &RunContext::new())
            .await,
    );

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, Severity::Low);
    assert_eq!(reports[0].source, AdvisorySource::NpmRegistry);
    assert_eq!(reports[0].suggested_upgrade.as_deref(), Some("0.2.1"));
    assert!(reports[0].cve_ids.contains("CVE-2020-7598"));
}

#[tokio::test]
async fn test_npm_audit_rejection_is_failed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/-/npm/v1/security/audits"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    let client = NpmRegistryClient::with_base_url(mock_server.uri());
    let outcome = client
        .query(&Dependency::new("lodash", "4.17.15"), Ecosystem::Npm, &RunContext::new())
        .await;
    assert!(outcome.is_failed());
}

const REQUESTS_ADVISORY: &str = r#"id: PYSEC-2018-28
details: Requests before 2.20.0 sends an HTTP Authorization header to an http URI upon redirect.
aliases:
- CVE-2018-18074
affected:
- package:
    name: requests
    ecosystem: PyPI
  ranges:
  - type: ECOSYSTEM
    events:
    - introduced: "0"
    - fixed: 2.20.0
  versions:
  - 2.19.0
  - 2.19.1
references:
- type: ADVISORY
  url: https://github.com/advisories/GHSA-x84v-xcm2-53pg
database_specific:
  severity: HIGH
"#;

async fn mount_pypa(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/advisories/requests"))
        .and(header("Accept", "application/vnd.github.v3+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "name": "PYSEC-2018-28.yaml",
                "type": "file",
                "download_url": format!("{}/raw/requests/PYSEC-2018-28.yaml", mock_server.uri())
            },
            {
                "name": "README.md",
                "type": "file",
                "download_url": format!("{}/raw/requests/README.md", mock_server.uri())
            }
        ])))
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/raw/requests/PYSEC-2018-28.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REQUESTS_ADVISORY))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_pypi_combines_release_and_database() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pypi/requests/2.19.0/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "info": { "name": "requests", "version": "2.19.0" },
            "vulnerabilities": [
                {
                    "id": "PYSEC-2018-28",
                    "summary": null,
                    "details": "Authorization header leak on redirect",
                    "aliases": ["CVE-2018-18074"],
                    "fixed_in": ["2.20.0"],
                    "link": "https://osv.dev/vulnerability/PYSEC-2018-28",
                    "source": "osv",
                    "withdrawn": null
                },
                {
                    "id": "PYSEC-0000-1",
                    "details": "Withdrawn entry",
                    "aliases": [],
                    "fixed_in": [],
                    "link": "https://osv.dev/vulnerability/PYSEC-0000-1",
                    "withdrawn": "2023-01-01T00:00:00Z"
                }
            ]
        })))
        .mount(&mock_server)
        .await;
    mount_pypa(&mock_server).await;

    let client = PypiClient::with_base_urls(
        format!("{}/pypi", mock_server.uri()),
        format!("{}/advisories", mock_server.uri()),
    );
    let reports = findings(
        client
            .query(&Dependency::new("requests", "2.19.0"), Ecosystem::PyPI, &RunContext::new())
            .await,
    );

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.source == AdvisorySource::Pypi));
    assert!(reports.iter().all(|r| r.cve_ids.contains("CVE-2018-18074")));
    assert!(reports.iter().any(|r| r.severity == Severity::Unknown));

    let database = reports
        .iter()
        .find(|r| r.severity == Severity::High)
        .expect("database advisory");
    assert!(database.advisory_links.contains(
        &"https://github.com/pypa/advisory-database/tree/main/vulns/requests/PYSEC-2018-28.json"
            .to_string()
    ));
}

#[tokio::test]
async fn test_pypi_unaffected_version_has_no_database_findings() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pypi/requests/2.31.0/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "vulnerabilities": [] })))
        .mount(&mock_server)
        .await;
    mount_pypa(&mock_server).await;

    let client = PypiClient::with_base_urls(
        format!("{}/pypi", mock_server.uri()),
        format!("{}/advisories", mock_server.uri()),
    );
    let outcome = client
        .query(&Dependency::new("requests", "2.31.0"), Ecosystem::PyPI, &RunContext::new())
        .await;
    assert_eq!(outcome, QueryOutcome::Findings(Vec::new()));
}

#[tokio::test]
async fn test_pypi_missing_advisory_directory_is_clean() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pypi/tinylib/1.0.0/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "vulnerabilities": [] })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/advisories/tinylib"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = PypiClient::with_base_urls(
        format!("{}/pypi", mock_server.uri()),
        format!("{}/advisories", mock_server.uri()),
    );
    let outcome = client
        .query(&Dependency::new("tinylib", "1.0.0"), Ecosystem::PyPI, &RunContext::new())
        .await;
    assert_eq!(outcome, QueryOutcome::Findings(Vec::new()));
}

#[tokio::test]
async fn test_pypi_fails_only_when_both_lookups_fail() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let client = PypiClient::with_base_urls(
        format!("{}/pypi", mock_server.uri()),
        format!("{}/advisories", mock_server.uri()),
    );
    let outcome = client
        .query(&Dependency::new("requests", "2.19.0"), Ecosystem::PyPI, &RunContext::new())
        .await;
    assert!(outcome.is_failed());
}

#[tokio::test]
async fn test_pypi_partial_failure_keeps_other_findings() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pypi/requests/2.19.0/json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    mount_pypa(&mock_server).await;

    let client = PypiClient::with_base_urls(
        format!("{}/pypi", mock_server.uri()),
        format!("{}/advisories", mock_server.uri()),
    );
    let reports = findings(
        client
            .query(&Dependency::new("requests", "2.19.0"), Ecosystem::PyPI, &RunContext::new())
            .await,
    );
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, Severity::High);
}

#[tokio::test]
async fn test_pypi_unreadable_advisory_file_is_skipped() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pypi/requests/2.19.0/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "vulnerabilities": [] })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/advisories/requests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "name": "PYSEC-2099-1.yaml",
                "type": "file",
                "download_url": format!("{}/raw/requests/PYSEC-2099-1.yaml", mock_server.uri())
            },
            {
                "name": "PYSEC-2099-2.json",
                "type": "file",
                "download_url": format!("{}/raw/requests/PYSEC-2099-2.json", mock_server.uri())
            },
            {
                "name": "PYSEC-2018-28.yaml",
                "type": "file",
                "download_url": format!("{}/raw/requests/PYSEC-2018-28.yaml", mock_server.uri())
            }
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw/requests/PYSEC-2099-1.yaml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw/requests/PYSEC-2099-2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{ truncated"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw/requests/PYSEC-2018-28.yaml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(REQUESTS_ADVISORY))
        .mount(&mock_server)
        .await;

    let client = PypiClient::with_base_urls(
        format!("{}/pypi", mock_server.uri()),
        format!("{}/advisories", mock_server.uri()),
    );
    let reports = findings(
        client
            .query(&Dependency::new("requests", "2.19.0"), Ecosystem::PyPI, &RunContext::new())
            .await,
    );

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].severity, Severity::High);
    assert!(reports[0].cve_ids.contains("CVE-2018-18074"));
}
