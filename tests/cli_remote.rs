// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODULES: &str = r#"[
  {"module_id": "m1", "title": "Intro to Programming", "content": "variables", "learning_outcomes": "write programs"},
  {"module_id": "m2", "title": "Parallel Programming", "content": "threads", "learning_outcomes": "reason about races"},
  {"module_id": "m3", "title": "GPU Computing", "content": "kernels", "learning_outcomes": "offload work"}
]"#;

fn setup(url: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".modsimrc.toml"),
        format!("[remote]\nurl = \"{url}\"\ntimeout_secs = 5\n"),
    )
    .unwrap();
    let input = dir.path().join("input");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("modules.json"), MODULES).unwrap();
    dir
}

async fn run_modsim(root: &Path, args: &'static [&'static str]) -> assert_cmd::assert::Assert {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut cmd = cargo_bin_cmd!("modsim");
        cmd.current_dir(root)
            .env("NO_COLOR", "1")
            .env_remove("WEAVIATE_API_KEY")
            .args(args);
        cmd.assert()
    })
    .await
    .unwrap()
}

async fn mount_ready(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/.well-known/ready"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

fn stored_object() -> serde_json::Value {
    json!({ "objects": [{ "id": "uuid-1", "properties": { "module_id": "m1" } }] })
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_imports_into_fresh_collection() {
    let server = MockServer::start().await;
    mount_ready(&server).await;

    // Absent on the first probe, present afterwards.
    Mock::given(method("GET"))
        .and(path("/v1/schema/Module"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/schema/Module"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/schema"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    // Empty until the import lands.
    Mock::given(method("GET"))
        .and(path("/v1/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "objects": [] })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_object()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/batch/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "a", "result": {} },
            { "id": "b", "result": {} },
            { "id": "c", "result": {} }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = setup(&server.uri());
    run_modsim(dir.path(), &["ingest"])
        .await
        .success()
        .stderr(predicate::str::contains("Imported 3 modules"))
        .stdout(predicate::str::contains("Collection Module is populated"));
}

#[tokio::test(flavor = "multi_thread")]
async fn ingest_skips_populated_collection() {
    let server = MockServer::start().await;
    mount_ready(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/schema/Module"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_object()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/batch/objects"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/schema"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = setup(&server.uri());
    run_modsim(dir.path(), &["ingest"])
        .await
        .success()
        .stderr(predicate::str::contains("skipped import"));
}

#[tokio::test(flavor = "multi_thread")]
async fn query_prints_distances_without_target() {
    let server = MockServer::start().await;
    mount_ready(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "Get": { "Module": [
                { "module_id": "m2", "title": "Parallel Programming", "_additional": { "distance": 0.0 } },
                { "module_id": "m3", "title": "GPU Computing", "_additional": { "distance": 0.1 } },
                { "module_id": "m1", "title": "Intro to Programming", "_additional": { "distance": 0.35 } }
            ] } }
        })))
        .mount(&server)
        .await;

    let dir = setup(&server.uri());
    run_modsim(dir.path(), &["query", "--limit", "2"])
        .await
        .success()
        .stdout(predicate::str::contains(
            "Top 2 modules similar to: Parallel Programming",
        ))
        .stdout(predicate::str::contains("Module: (m3) GPU Computing, Distance: 0.10"))
        .stdout(predicate::str::contains("(m2)").not());
}

#[test]
fn query_fails_when_store_unreachable() {
    let dir = setup("http://127.0.0.1:9");
    let mut cmd = cargo_bin_cmd!("modsim");
    cmd.current_dir(dir.path())
        .args(["query", "--module-id", "m1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("vector store setup failed"));
}
