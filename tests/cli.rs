// tests/cli.rs

//! Tests for the formulary binary.

mod common;

use common::{TestEnv, formula_toml};
use std::path::Path;
use std::process::{Command, Output};

fn formulary(env: &TestEnv, args: &[&str]) -> Output {
    let config = env.temp.path().join("config.toml");
    let content = format!(
        "prefix_root = {:?}\nstate_dir = {:?}\nwork_root = {:?}\nformula_dirs = [{:?}]\n",
        env.prefix_root().display().to_string(),
        env.state_dir().display().to_string(),
        env.work_root().display().to_string(),
        env.repo.display().to_string(),
    );
    std::fs::write(&config, content).unwrap();

    Command::new(env!("CARGO_BIN_EXE_formulary"))
        .arg("-c")
        .arg(&config)
        .args(args)
        .env_remove("FORMULARY_PREFIX")
        .env_remove("FORMULARY_STATE_DIR")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run formulary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_check_accepts_valid_formula() {
    let env = TestEnv::new();
    let path = env.write_formula(
        "hello",
        &formula_toml("hello", &[("zlib", "build")], &["make install"], &[]),
    );

    let output = formulary(&env, &["check", path.to_str().unwrap()]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Formula: hello (core)"));
    assert!(text.contains("Depends: zlib (build)"));
    assert!(text.contains("[OK]"));
}

#[test]
fn test_check_rejects_malformed_formula() {
    let env = TestEnv::new();
    let path = env.write_formula("bad", "[formula]\nname = \"bad\"\n[steps]\ninstall = [\"true\"]\n");

    let output = formulary(&env, &["check", path.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_install_then_status() {
    let env = TestEnv::new();
    env.write_formula(
        "app",
        &formula_toml("app", &[("lib", "build")], &["touch {prefix}/app"], &["test -f {prefix}/app"]),
    );
    env.write_formula("lib", &formula_toml("lib", &[], &["touch {prefix}/lib"], &[]));

    let output = formulary(&env, &["install", "app", "--test", "--no-progress"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains("Installed: lib, app"));
    assert!(text.contains("[COMPLETE] app ->"));
    assert!(Path::new(&env.prefix_root().join("app/app")).exists());

    let output = formulary(&env, &["status", "--json"]);
    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["status"] == "installed"));

    let output = formulary(&env, &["install", "app", "--no-progress"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Already installed: lib, app"));
}

#[test]
fn test_install_failure_exits_nonzero() {
    let env = TestEnv::new();
    env.write_formula("broken", &formula_toml("broken", &[], &["exit 3"], &[]));

    let output = formulary(&env, &["install", "broken", "--no-progress"]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("[FAILED] broken install stage: `exit 3` exited with code 3"));
}

#[test]
fn test_plan_json_lists_order() {
    let env = TestEnv::new();
    env.write_formula(
        "app",
        &formula_toml("app", &[("b", "build"), ("a", "build")], &["true"], &[]),
    );
    env.write_formula("a", &formula_toml("a", &[], &["true"], &[]));
    env.write_formula("b", &formula_toml("b", &[("a", "build")], &["true"], &[]));

    let output = formulary(&env, &["plan", "app", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let plan: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let names: Vec<&str> = plan["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b", "app"]);
}
