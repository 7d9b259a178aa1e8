use reftrace::rpc;
use serde_json::{Value, json};
use std::path::PathBuf;
use tempfile::TempDir;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

struct TempWorkspace {
    dir: TempDir,
    db_path: PathBuf,
}

impl TempWorkspace {
    fn imported(fixture: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join(".reftrace").join("reftrace.sqlite");
        let workspace = Self { dir, db_path };
        let response = workspace.call(
            "import",
            json!({ "path": fixture_path(fixture).to_string_lossy() }),
        );
        assert!(response.get("error").is_none(), "import failed: {response}");
        workspace
    }

    fn call(&self, method: &str, params: Value) -> Value {
        let response = rpc::call(
            self.dir.path().to_path_buf(),
            self.db_path.clone(),
            method.to_string(),
            &params.to_string(),
            "1",
        )
        .unwrap();
        serde_json::from_str(&response).unwrap()
    }

    fn result(&self, method: &str, params: Value) -> Value {
        let response = self.call(method, params);
        assert!(response.get("error").is_none(), "{method} failed: {response}");
        response["result"].clone()
    }
}

fn reference_ids(result: &Value) -> Vec<i64> {
    result["references"]
        .as_array()
        .unwrap()
        .iter()
        .map(|reference| reference["identifier"]["id"].as_i64().unwrap())
        .collect()
}

#[test]
fn stats_after_import() {
    let workspace = TempWorkspace::imported("service.json");
    let stats = workspace.result("stats", json!({}));
    assert_eq!(stats["symbols"], json!(10));
    assert_eq!(stats["identifiers"], json!(9));
    assert_eq!(stats["call_identifiers"], json!(8));
    assert_eq!(stats["resolved_identifiers"], json!(1));
}

#[test]
fn references_pair_container_and_target() {
    let workspace = TempWorkspace::imported("service.json");
    let result = workspace.result("find_references", json!({ "name": "validate" }));
    assert_eq!(reference_ids(&result), vec![103]);
    let reference = &result["references"][0];
    assert_eq!(reference["containing_symbol"]["name"], json!("handle_request"));
    assert_eq!(reference["target_symbol"]["id"], json!(6));
    assert_eq!(reference["is_resolved"], json!(true));
}

#[test]
fn lookup_ignores_case_unless_asked() {
    let workspace = TempWorkspace::imported("service.json");
    let loose = workspace.result("find_references", json!({ "name": "save" }));
    assert_eq!(reference_ids(&loose), vec![102]);

    let strict = workspace.result(
        "find_references",
        json!({ "name": "save", "case_sensitive": true }),
    );
    assert!(reference_ids(&strict).is_empty());

    let exact = workspace.result(
        "find_references",
        json!({ "name": "Save", "case_sensitive": true }),
    );
    assert_eq!(reference_ids(&exact), vec![102]);
}

#[test]
fn member_access_prefers_storage_and_call_prefers_function() {
    let workspace = TempWorkspace::imported("service.json");
    let result = workspace.result("find_references", json!({ "name": "config" }));
    assert_eq!(reference_ids(&result), vec![105, 108]);
    assert_eq!(result["references"][0]["target_symbol"]["id"], json!(9));
    assert_eq!(result["references"][1]["target_symbol"]["id"], json!(10));
}

#[test]
fn unknown_target_is_reported_unresolved() {
    let workspace = TempWorkspace::imported("service.json");
    let result = workspace.result("references", json!({ "name": "retry" }));
    assert_eq!(result["total"], json!(1));
    assert_eq!(result["resolved"], json!(0));
    assert!(result["references"][0]["target_symbol"].is_null());

    let resolved_only = workspace.result(
        "find_references",
        json!({ "name": "retry", "resolved_only": true }),
    );
    assert!(reference_ids(&resolved_only).is_empty());
}

#[test]
fn references_by_id_match_symbol_name() {
    let workspace = TempWorkspace::imported("service.json");
    let result = workspace.result("find_references_by_id", json!({ "id": 5 }));
    assert_eq!(reference_ids(&result), vec![104]);
    assert_eq!(result["references"][0]["target_symbol"]["id"], json!(5));

    let missing = workspace.result("find_references_by_id", json!({ "id": 9999 }));
    assert!(reference_ids(&missing).is_empty());
}

#[test]
fn name_without_usages_is_empty() {
    let workspace = TempWorkspace::imported("service.json");
    let result = workspace.result("find_references", json!({ "name": "nothing_here" }));
    assert_eq!(result["total"], json!(0));
}

#[test]
fn append_import_upserts_existing_rows() {
    let workspace = TempWorkspace::imported("service.json");
    let response = workspace.call(
        "import",
        json!({ "path": fixture_path("service.json").to_string_lossy(), "append": true }),
    );
    assert!(response.get("error").is_none());
    let stats = workspace.result("stats", json!({}));
    assert_eq!(stats["symbols"], json!(10));
}

#[test]
fn unknown_method_is_an_error() {
    let workspace = TempWorkspace::imported("service.json");
    let response = workspace.call("frobnicate", json!({}));
    assert!(
        response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("unknown method")
    );
}

#[test]
fn symbol_lookup_and_clear() {
    let workspace = TempWorkspace::imported("service.json");
    let symbol = workspace.result("get_symbol", json!({ "id": 4 }));
    assert_eq!(symbol["file_path"], json!("src/SqlRepository.cs"));
    assert!(workspace.result("get_symbol", json!({ "id": 404 })).is_null());

    let listed = workspace.result("list_workspaces", json!({}));
    assert_eq!(listed["workspaces"].as_array().unwrap().len(), 1);

    workspace.result("clear", json!({}));
    let stats = workspace.result("stats", json!({}));
    assert_eq!(stats["symbols"], json!(0));
    assert_eq!(stats["identifiers"], json!(0));
}
