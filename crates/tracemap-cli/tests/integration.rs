#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const INVOICE_TEMPLATE: &str = r#"
id: invoice_paid
name: Invoice paid
trigger_key: invoice_paid
root:
  type: step
  id: webhook
  display_name: Webhook received
  layer: trigger
  match_key: hooks:invoice_paid
  children:
    - type: decision
      id: customer_known
      display_name: Customer known?
      activation: { kind: step_output, step: crm:find_customer, field: found }
      branches:
        - label: "yes"
          match_value: true
          node:
            type: step
            id: record_payment
            display_name: Record payment
            match_key: billing:record_payment
            children:
              - { type: outcome, id: recorded, display_name: Payment recorded, status: success, match_action: payment_recorded }
        - label: "no"
          match_value: false
          node: { type: outcome, id: unknown_customer, display_name: Unknown customer, status: skipped, match_action: customer_missing }
"#;

const OBJECT_TEMPLATE: &str = r#"
id: object_updated
name: Object updated
trigger_key: object_updated
root: { type: outcome, id: ignored, display_name: Ignored, status: skipped, match_action: ignored }
"#;

const APPOINTMENT_TEMPLATE: &str = r#"
id: appointment_updated
name: Appointment updated
trigger_key: appointment_updated
root: { type: outcome, id: synced, display_name: Synced, status: success, match_action: appointment_synced }
"#;

const BUNDLE: &str = r#"{
  "trace": {
    "status": "completed",
    "endpoint": "/webhooks/invoice-paid",
    "response_body": { "success": true, "action": "payment_recorded" }
  },
  "steps": [
    { "qualified_name": "hooks:invoice_paid", "output": {} },
    { "qualified_name": "crm:find_customer", "output": { "found": true } },
    { "qualified_name": "billing:record_payment", "output": { "amount": 40 } }
  ]
}"#;

fn tracemap(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tracemap").unwrap();
    cmd.current_dir(dir.path())
        .env("TRACEMAP_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    tracemap(dir).arg("init").assert().success();
}

fn write_template(dir: &TempDir, file: &str, body: &str) {
    std::fs::write(dir.path().join(".tracemap/templates").join(file), body).unwrap();
}

fn project_with_invoice() -> TempDir {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_template(&dir, "invoice_paid.yaml", INVOICE_TEMPLATE);
    std::fs::write(dir.path().join("bundle.json"), BUNDLE).unwrap();
    dir
}

// ---------------------------------------------------------------------------
// tracemap init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_directory_tree() {
    let dir = TempDir::new().unwrap();
    tracemap(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .tracemap/config.yaml"));

    assert!(dir.path().join(".tracemap").is_dir());
    assert!(dir.path().join(".tracemap/templates").is_dir());
    assert!(dir.path().join(".tracemap/config.yaml").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    tracemap(&dir).arg("init").assert().success();
    tracemap(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .tracemap/config.yaml"));
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    tracemap(&dir)
        .args(["template", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// tracemap template
// ---------------------------------------------------------------------------

#[test]
fn template_list_shows_triggers() {
    let dir = project_with_invoice();
    write_template(&dir, "object_updated.yml", OBJECT_TEMPLATE);

    tracemap(&dir)
        .args(["template", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("invoice_paid"))
        .stdout(predicate::str::contains("object_updated"));
}

#[test]
fn template_list_json() {
    let dir = project_with_invoice();
    let output = tracemap(&dir)
        .args(["template", "list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value[0]["trigger_key"], "invoice_paid");
    assert_eq!(value[0]["nodes"], 5);
}

#[test]
fn template_show_prints_tree() {
    let dir = project_with_invoice();
    tracemap(&dir)
        .args(["template", "show", "invoice_paid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("decision Customer known? (customer_known)"))
        .stdout(predicate::str::contains("outcome Payment recorded (recorded)"));
}

#[test]
fn template_show_unknown_fails() {
    let dir = project_with_invoice();
    tracemap(&dir)
        .args(["template", "show", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no template registered for trigger 'nope'"));
}

#[test]
fn template_validate_ok() {
    let dir = project_with_invoice();
    tracemap(&dir)
        .args(["template", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn template_validate_reports_broken_file() {
    let dir = project_with_invoice();
    write_template(&dir, "broken.yaml", "id: broken\nname: Broken\n");

    tracemap(&dir)
        .args(["template", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("broken.yaml"))
        .stderr(predicate::str::contains("1 template problem(s) found"));
}

#[test]
fn template_validate_reports_duplicate_trigger() {
    let dir = project_with_invoice();
    write_template(&dir, "copy.yaml", INVOICE_TEMPLATE);

    tracemap(&dir)
        .args(["template", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("duplicate template for trigger 'invoice_paid'"));
}

// ---------------------------------------------------------------------------
// tracemap resolve
// ---------------------------------------------------------------------------

#[test]
fn resolve_endpoint_path() {
    let dir = project_with_invoice();
    tracemap(&dir)
        .args(["resolve", "/webhooks/invoice-paid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-> invoice_paid (invoice_paid)"));
}

#[test]
fn resolve_unknown_endpoint_fails() {
    let dir = project_with_invoice();
    tracemap(&dir)
        .args(["resolve", "/webhooks/sms-received"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/webhooks/sms-received"));
}

#[test]
fn resolve_applies_alias_from_payload() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    write_template(&dir, "object.yaml", OBJECT_TEMPLATE);
    write_template(&dir, "appointment.yaml", APPOINTMENT_TEMPLATE);
    std::fs::write(
        dir.path().join(".tracemap/config.yaml"),
        r#"
version: 1
project:
  name: clinic
aliases:
  - endpoint: "^/webhooks/object-updated$"
    discriminator: objectType
    equals: appointment
    trigger: appointment_updated
"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("payload.json"), r#"{"objectType": "Appointment"}"#).unwrap();

    tracemap(&dir)
        .args(["resolve", "/webhooks/object-updated", "--payload", "payload.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-> appointment_updated"));

    tracemap(&dir)
        .args(["resolve", "/webhooks/object-updated"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-> object_updated"));
}

// ---------------------------------------------------------------------------
// tracemap reconcile
// ---------------------------------------------------------------------------

#[test]
fn reconcile_prints_marked_tree() {
    let dir = project_with_invoice();
    tracemap(&dir)
        .args(["reconcile", "bundle.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("current:  recorded"))
        .stdout(predicate::str::contains("✓ Webhook received (webhook)"))
        .stdout(predicate::str::contains("● Payment recorded (recorded)"))
        .stdout(predicate::str::contains("· Unknown customer (unknown_customer)"));
}

#[test]
fn reconcile_json() {
    let dir = project_with_invoice();
    let output = tracemap(&dir)
        .args(["reconcile", "bundle.json", "-j"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["template_id"], "invoice_paid");
    assert_eq!(value["result_action"], "payment_recorded");
    assert_eq!(value["current"], "recorded");
    assert_eq!(value["root"]["type"], "step");
    assert_eq!(value["root"]["match_status"], "taken");
    // webhook, customer_known, record_payment, recorded
    assert_eq!(value["taken_count"], 4);
}

#[test]
fn reconcile_with_explicit_trigger() {
    let dir = project_with_invoice();
    std::fs::write(
        dir.path().join("bare.json"),
        r#"{"trace": {"status": "failed"}, "steps": [{"qualified_name": "hooks:invoice_paid"}]}"#,
    )
    .unwrap();

    tracemap(&dir)
        .args(["reconcile", "bare.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pass --trigger"));

    tracemap(&dir)
        .args(["reconcile", "bare.json", "--trigger", "invoice_paid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("result:   error"))
        .stdout(predicate::str::contains("● Webhook received (webhook)"));
}

#[test]
fn reconcile_uses_configured_classifier() {
    let dir = project_with_invoice();
    std::fs::write(
        dir.path().join(".tracemap/config.yaml"),
        r#"
version: 1
project:
  name: billing
classifiers:
  stripe:
    rules:
      - { field: payment_id, when: present, action: payment_recorded }
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("shaped.json"),
        r#"{
  "trace": {
    "status": "completed",
    "trigger_key": "invoice_paid",
    "response_body": { "success": true, "payment_id": "pi_1" }
  },
  "steps": [
    { "qualified_name": "hooks:invoice_paid" },
    { "qualified_name": "crm:find_customer", "output": { "found": true } },
    { "qualified_name": "billing:record_payment" }
  ]
}"#,
    )
    .unwrap();

    tracemap(&dir)
        .args(["reconcile", "shaped.json", "--provider", "stripe"])
        .assert()
        .success()
        .stdout(predicate::str::contains("result:   payment_recorded"))
        .stdout(predicate::str::contains("● Payment recorded (recorded)"));

    tracemap(&dir)
        .args(["reconcile", "shaped.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("result:   -"))
        .stdout(predicate::str::contains("● Record payment (record_payment)"));
}

// ---------------------------------------------------------------------------
// tracemap config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_clean() {
    let dir = project_with_invoice();
    tracemap(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_flags_errors_and_warnings() {
    let dir = project_with_invoice();
    std::fs::write(
        dir.path().join(".tracemap/config.yaml"),
        r#"
version: 1
project:
  name: billing
aliases:
  - { endpoint: "^/hooks/generic$", discriminator: kind, equals: x, trigger: not_a_template }
classifiers:
  stripe:
    rules:
      - { field: "", when: present, action: paid }
"#,
    )
    .unwrap();

    tracemap(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[warning] aliases[0]: trigger 'not_a_template' has no template"))
        .stdout(predicate::str::contains("[error] classifiers.stripe.rules[0]: empty field"));
}
