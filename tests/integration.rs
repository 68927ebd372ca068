use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn synapse_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("synapse");
    path
}

const DATASET: &str = r#"{
  "companies": [
    { "id": "acme", "name": "Acme" },
    { "id": "globex", "name": "Globex" }
  ],
  "users": [
    { "id": "u-acme", "company_id": "acme", "name": "Ana", "email": "ana@acme.com" },
    { "id": "u-globex", "company_id": "globex", "name": "Gil", "email": "gil@globex.com" }
  ],
  "documents": [
    { "id": "fin-1", "company_id": "acme", "title": "Q3 revenue report", "content": "Q3 revenue was $1.2M." },
    { "id": "fin-2", "company_id": "acme", "title": "Board revenue summary", "content": "Quarterly revenue came in at $1.25M." },
    { "id": "g-1", "company_id": "globex", "title": "Globex revenue", "content": "Globex revenue was $9M." }
  ],
  "emails": [
    { "id": "e-1", "user_id": "u-acme", "from_address": "lee@customer.com",
      "subject": "URGENT: renewal contract", "received_at": 1717236000 }
  ],
  "contacts": [
    { "id": "c-1", "user_id": "u-acme", "name": "Lee", "email": "lee@customer.com",
      "company": "customer", "title": null, "tier": "inner",
      "last_contacted_at": 1714000000, "created_at": 1710000000 }
  ]
}"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("dataset.json"), DATASET).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/synapse.sqlite"

[embedding]
provider = "hashing"
dims = 128

[server]
bind = "127.0.0.1:7331"
"#,
        root.display()
    );

    let config_path = config_dir.join("synapse.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_synapse(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = synapse_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run synapse binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Init, import with ingestion, and return the environment.
fn imported_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_synapse(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);

    let dataset = tmp.path().join("dataset.json");
    let (stdout, stderr, success) = run_synapse(
        &config_path,
        &["import", dataset.to_str().unwrap(), "--ingest"],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Imported 2 companies, 2 users, 3 documents"));
    assert!(stdout.contains("Indexed 3 document(s), skipped 0."));
    (tmp, config_path)
}

fn json(stdout: &str) -> Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("not JSON ({}): {}", e, stdout))
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_synapse(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_synapse(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_synapse(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_search_is_tenant_scoped() {
    let (_tmp, config_path) = imported_env();

    let (stdout, stderr, success) =
        run_synapse(&config_path, &["search", "revenue", "--user", "u-globex"]);
    assert!(success, "search failed: {}", stderr);
    let body = json(&stdout);
    assert_eq!(body["total_results"], 1);
    assert_eq!(body["results"][0]["document_id"], "g-1");
    assert_eq!(body["results"][0]["authority_weight"], 1.5);
}

#[test]
fn test_close_figures_do_not_conflict() {
    let (_tmp, config_path) = imported_env();

    let (stdout, stderr, success) = run_synapse(
        &config_path,
        &["conflicts", "What was Q3 revenue?", "--user", "u-acme"],
    );
    assert!(success, "conflicts failed: {}", stderr);
    let body = json(&stdout);
    assert_eq!(body["has_conflict"], false);
}

#[test]
fn test_exclude_removes_document_from_search() {
    let (_tmp, config_path) = imported_env();

    let (stdout, stderr, success) = run_synapse(&config_path, &["exclude", "--document", "g-1"]);
    assert!(success, "exclude failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(json(&stdout)["status"], "skipped");

    let (stdout, _, success) =
        run_synapse(&config_path, &["search", "revenue", "--user", "u-globex"]);
    assert!(success);
    assert_eq!(json(&stdout)["total_results"], 0);
}

#[test]
fn test_digest_for_explicit_date() {
    let (_tmp, config_path) = imported_env();

    let (stdout, stderr, success) = run_synapse(
        &config_path,
        &["digest", "--user", "u-acme", "--date", "2024-06-01"],
    );
    assert!(success, "digest failed: {}", stderr);
    let body = json(&stdout);
    assert_eq!(body["date"], "2024-06-01");
    assert_eq!(body["status"], "generated");

    // A second run for the same day returns the stored digest
    let (stdout, _, success) = run_synapse(
        &config_path,
        &["digest", "--user", "u-acme", "--date", "2024-06-01"],
    );
    assert!(success);
    assert_eq!(json(&stdout)["id"], body["id"]);
}

#[test]
fn test_unknown_user_fails() {
    let (_tmp, config_path) = imported_env();

    let (_, stderr, success) =
        run_synapse(&config_path, &["search", "revenue", "--user", "nobody"]);
    assert!(!success);
    assert!(stderr.contains("nobody"));
}

#[test]
fn test_log_interaction_requires_known_contact() {
    let (_tmp, config_path) = imported_env();

    let (stdout, stderr, success) = run_synapse(
        &config_path,
        &[
            "log-interaction",
            "--user",
            "u-acme",
            "--contact",
            "lee@customer.com",
            "--kind",
            "call",
            "--summary",
            "renewal call",
            "--at",
            "1717240000",
        ],
    );
    assert!(success, "log-interaction failed: {}", stderr);
    assert_eq!(json(&stdout)["contact_id"], "c-1");

    let (_, _, success) = run_synapse(
        &config_path,
        &["log-interaction", "--user", "u-acme", "--contact", "ghost@x.io", "--summary", "?"],
    );
    assert!(!success);
}
