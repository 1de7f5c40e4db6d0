//! CLI subprocess integration tests.
//!
//! These tests invoke the `cogs` binary as a subprocess and verify exit
//! codes, stdout content and rendered output.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn cogs_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cogs"));
    cmd.env_remove("COGS_LOG");
    cmd
}

const MANIFEST: &str = r#"
name = "cliTest"

[local.vars]
var = "var_value"
otherVar = "other var $value"
port = 8080

[other.vars]
other_var = "from other"

[qa]
path = "./data.yaml"
[qa.vars]
host.path = [[], ".db"]
port.path = [[], ".db"]
missing_one.path = [[], ".db"]
missing_two.path = [[], ".db"]

[app.qa.vars]
region = "eu-west-1"

[secret.vars]
plain = "visible"
[secret.enc.vars]
token.path = "./secret.enc.yaml"

[broken.vars]
var = "a"
[broken.enc.vars]
var = "b"

[subst.vars]
region = "${COGS_CLI_TEST_REGION}"
"#;

fn fixture() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("test.cog.toml");
    std::fs::write(&manifest, MANIFEST).unwrap();
    std::fs::write(dir.path().join("data.yaml"), "db:\n  host: db.qa\n  port: 5432\n").unwrap();
    (dir, manifest)
}

fn gen(manifest: &Path, args: &[&str]) -> Output {
    cogs_bin()
        .arg("gen")
        .arg(manifest)
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn cli_version_exits_zero() {
    let output = cogs_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "cogs --version must exit 0");
    assert!(stdout(&output).contains("cogs"));
}

#[test]
fn cli_help_lists_gen() {
    let output = cogs_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("gen"));
}

#[test]
fn gen_json_literals() {
    let (_dir, manifest) = fixture();
    let output = gen(&manifest, &["local"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["var"], "var_value");
    assert_eq!(json["otherVar"], "other var $value");
    assert_eq!(json["port"], 8080);
    assert!(stdout(&output).ends_with("}\n"));
}

#[test]
fn gen_dotenv_renames_and_joins_contexts() {
    let (_dir, manifest) = fixture();
    let output = gen(&manifest, &["local", "app.qa", "--out", "dotenv", "--export"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "export OTHER_VAR=\"other var \\$value\"\n\
         export PORT=8080\n\
         export REGION=\"eu-west-1\"\n\
         export VAR=\"var_value\"\n"
    );
}

#[test]
fn gen_dotenv_key_collision_is_an_error() {
    let (_dir, manifest) = fixture();
    // otherVar and other_var both become OTHER_VAR
    let output = gen(&manifest, &["local", "other", "--out", "dotenv"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("duplicate key 'OTHER_VAR'"));

    // without renaming the keys are distinct
    let output = gen(&manifest, &["local", "other", "--out", "dotenv", "-p"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "otherVar=\"other var \\$value\"\nother_var=\"from other\"\nport=8080\nvar=\"var_value\"\n"
    );
}

#[test]
fn gen_sub_path_from_local_file() {
    let (_dir, manifest) = fixture();
    let output = gen(&manifest, &["qa", "--keys", "host,port", "--out", "yaml"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "host: db.qa\nport: 5432\n");
}

#[test]
fn gen_reports_all_missing_keys() {
    let (_dir, manifest) = fixture();
    let output = gen(&manifest, &["qa"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.starts_with("error: "));
    assert!(err.contains("unable to find key \"missing_one\""));
    assert!(err.contains("unable to find key \"missing_two\""));
}

#[test]
fn gen_raw_with_separator() {
    let (_dir, manifest) = fixture();
    let output = gen(
        &manifest,
        &["qa", "--keys", "port,host", "--out", "raw", "--sep", ","],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "5432,db.qa");
}

#[test]
fn gen_toml_output() {
    let (_dir, manifest) = fixture();
    let output = gen(&manifest, &["app.qa", "--out", "toml"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "region = \"eu-west-1\"");
}

#[test]
fn gen_manifest_error_exits_two() {
    let (_dir, manifest) = fixture();
    let output = gen(&manifest, &["broken"]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(
        stderr(&output).trim(),
        "error: manifest error: broken: var: duplicate key present in ctx and ctx.enc"
    );
}

#[test]
fn gen_no_enc_skips_encrypted_sources() {
    let (_dir, manifest) = fixture();
    let output = gen(&manifest, &["secret", "--no-enc"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["plain"], "visible");
    assert!(json.get("token").is_none());
}

#[test]
fn gen_keys_hint_for_encrypted_value() {
    let (_dir, manifest) = fixture();
    let output = gen(&manifest, &["secret", "--no-enc", "--keys", "token"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("--keys: [token] missing from generated config"));
    assert!(err.contains("--no-enc was given"));
}

#[test]
fn gen_keys_hint_for_excluded_value() {
    let (_dir, manifest) = fixture();
    let output = gen(&manifest, &["local", "--not", "var", "--keys", "var"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("--not=var and --keys=var"));
}

#[test]
fn gen_rejects_invalid_flag_combinations() {
    let (_dir, manifest) = fixture();
    let output = gen(&manifest, &["local", "--sep", ","]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("--sep"));

    let output = gen(&manifest, &["local", "--export"]);
    assert_eq!(output.status.code(), Some(1));

    let output = gen(&manifest, &["local", "--no-enc", "--no-decrypt"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("cannot both be set"));
}

#[test]
fn gen_envsubst_reads_process_environment() {
    let (_dir, manifest) = fixture();
    let output = cogs_bin()
        .env("COGS_CLI_TEST_REGION", "ap-south-1")
        .args(["gen", &manifest.to_string_lossy(), "subst", "-e", "--out", "dotenv"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "REGION=\"ap-south-1\"\n");

    // without the flag the reference is left untouched
    let output = cogs_bin()
        .env("COGS_CLI_TEST_REGION", "ap-south-1")
        .args(["gen", &manifest.to_string_lossy(), "subst"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("${COGS_CLI_TEST_REGION}"));
}

#[test]
fn gen_missing_manifest_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = gen(&dir.path().join("absent.cog.toml"), &["local"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("no such file"));
}
