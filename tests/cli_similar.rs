// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use assert_cmd::cargo::cargo_bin_cmd;
use modsim::embedding::ArchiveCacheStore;
use predicates::prelude::*;
use serde_json::Value;

const MODULES_A: &str = r#"[
  {"module_id": "m1", "title": "Intro to Programming", "content": "variables and loops", "learning_outcomes": "write programs"},
  {"module_id": "m2", "title": "Parallel Programming", "content": "threads and locks", "learning_outcomes": "reason about races"}
]"#;

const MODULES_B: &str = r#"[
  {"module_id": "m3", "title": "GPU Computing", "content": "kernels", "learning_outcomes": "offload work", "level": "advanced"}
]"#;

fn write_dummy_config(root: &Path) {
    fs::write(
        root.join(".modsimrc.toml"),
        r#"
[embeddings]
provider = "dummy"
dimension = 4

[cache]
progress = false
"#,
    )
    .unwrap();
}

fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_dummy_config(dir.path());
    let input = dir.path().join("input");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("a.json"), MODULES_A).unwrap();
    fs::write(input.join("b.json"), MODULES_B).unwrap();
    dir
}

fn similar(root: &Path, extra_args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = cargo_bin_cmd!("modsim");
    cmd.current_dir(root)
        .env("NO_COLOR", "1")
        .arg("similar")
        .arg("--threshold=-1")
        .args(extra_args);
    cmd.assert()
}

#[test]
fn similar_writes_cache_artifacts() {
    let dir = setup();

    similar(dir.path(), &[])
        .success()
        .stdout(predicate::str::contains(
            "Top 2 modules similar to: Parallel Programming",
        ))
        .stdout(predicate::str::contains("Module: (m1) Intro to Programming, Similarity: 0.00"))
        .stderr(predicate::str::contains("Loaded 3 modules"))
        .stderr(predicate::str::contains("Computed new embeddings for 3 modules"));

    let cache_dir = dir.path().join("cache");
    assert!(cache_dir.join("embeddings.zip").exists());
    assert!(cache_dir.join("embeddings.meta.json").exists());

    let meta = ArchiveCacheStore::new(&cache_dir)
        .read_metadata("embeddings")
        .unwrap()
        .unwrap();
    assert_eq!(meta.model_name, "dummy");
    assert_eq!(meta.num_modules, 3);
}

#[test]
fn second_run_uses_cache() {
    let dir = setup();

    similar(dir.path(), &[]).success();
    similar(dir.path(), &[])
        .success()
        .stderr(predicate::str::contains("Using cached embeddings"));
}

#[test]
fn force_recompute_ignores_valid_cache() {
    let dir = setup();

    similar(dir.path(), &[]).success();
    similar(dir.path(), &["--force-recompute"])
        .success()
        .stderr(predicate::str::contains("Computed new embeddings"));
}

#[test]
fn changed_corpus_recomputes() {
    let dir = setup();

    similar(dir.path(), &[]).success();
    fs::write(
        dir.path().join("input").join("b.json"),
        MODULES_B.replace("kernels", "kernels and warps"),
    )
    .unwrap();
    similar(dir.path(), &[])
        .success()
        .stderr(predicate::str::contains("Computed new embeddings"));
}

#[test]
fn missing_target_fails_without_fallback() {
    let dir = setup();

    similar(dir.path(), &["--target", "Quantum"])
        .failure()
        .stderr(predicate::str::contains("no module found"));
    assert!(!dir.path().join("cache").join("embeddings.zip").exists());
}

#[test]
fn module_id_selects_target() {
    let dir = setup();

    similar(dir.path(), &["--module-id", "m3", "--limit", "1"])
        .success()
        .stdout(predicate::str::contains("Top 1 modules similar to: GPU Computing"))
        .stdout(predicate::str::contains("(m3)").not());
}

#[test]
fn missing_input_dir_fails() {
    let dir = TempDir::new().unwrap();
    write_dummy_config(dir.path());

    similar(dir.path(), &[])
        .failure()
        .stderr(predicate::str::contains("failed to load corpus"));
}

#[test]
fn malformed_record_fails() {
    let dir = setup();
    fs::write(
        dir.path().join("input").join("c.json"),
        r#"[{"module_id": "m4", "title": "No content"}]"#,
    )
    .unwrap();

    similar(dir.path(), &[])
        .failure()
        .stderr(predicate::str::contains("malformed module record"));
}

#[test]
fn json_output_labels_score_kind() {
    let dir = setup();

    let output = similar(dir.path(), &["--format", "json"])
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).unwrap_or_else(|_| {
        panic!("stdout is not JSON: {}", String::from_utf8_lossy(&output))
    });
    assert_eq!(json["target"]["module_id"], "m2");
    assert_eq!(json["results"].as_array().unwrap().len(), 2);
    assert_eq!(json["results"][0]["score"]["kind"], "cosine");
}

#[test]
fn threshold_outside_cosine_range_fails() {
    let dir = setup();

    for threshold in ["--threshold=NaN", "--threshold=1.5"] {
        let mut cmd = cargo_bin_cmd!("modsim");
        cmd.current_dir(dir.path())
            .args(["similar", threshold])
            .assert()
            .failure()
            .stderr(predicate::str::contains("must be a number between -1 and 1"));
    }
    assert!(!dir.path().join("cache").join("embeddings.zip").exists());
}

#[test]
fn completions_are_generated() {
    let mut cmd = cargo_bin_cmd!("modsim");
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("modsim"));
}
