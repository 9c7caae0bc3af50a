mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn setup_get_update_roundtrip_and_validation() {
    let workspace = temp_dir("acadtrack-setup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let before = request(&mut stdin, &mut reader, "0", "setup.get", json!({}));
    assert_eq!(error_code(&before), Some("no_workspace"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let initial = request_ok(&mut stdin, &mut reader, "2", "setup.get", json!({}));
    assert!(initial.pointer("/import/delimiter").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(
        initial.pointer("/import/progressEvery").and_then(|v| v.as_i64()),
        Some(50)
    );
    assert_eq!(
        initial.pointer("/import/maxErrorSamples").and_then(|v| v.as_i64()),
        Some(20)
    );
    assert_eq!(
        initial
            .pointer("/import/emptySubjectUnits")
            .and_then(|v| v.as_str()),
        Some("skip")
    );
    assert_eq!(
        initial.pointer("/import/subjectSuffixes"),
        Some(&json!(["AM1", "AM2"]))
    );
    assert_eq!(
        initial
            .pointer("/identity/placeholderDomain")
            .and_then(|v| v.as_str()),
        Some("import.local")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({
            "section": "import",
            "patch": {
                "delimiter": "semicolon",
                "progressEvery": 5,
                "emptySubjectUnits": "PERSIST",
                "subjectSuffixes": ["C1", "C2", "C3"]
            }
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({
            "section": "identity",
            "patch": { "institutionalDomain": "@Uni.Edu.Ar" }
        }),
    );

    let updated = request_ok(&mut stdin, &mut reader, "5", "setup.get", json!({}));
    assert_eq!(
        updated.pointer("/import/delimiter").and_then(|v| v.as_str()),
        Some(";")
    );
    assert_eq!(
        updated.pointer("/import/progressEvery").and_then(|v| v.as_i64()),
        Some(5)
    );
    assert_eq!(
        updated
            .pointer("/import/emptySubjectUnits")
            .and_then(|v| v.as_str()),
        Some("persist")
    );
    assert_eq!(
        updated.pointer("/import/subjectSuffixes"),
        Some(&json!(["C1", "C2", "C3"]))
    );
    assert_eq!(
        updated
            .pointer("/identity/institutionalDomain")
            .and_then(|v| v.as_str()),
        Some("uni.edu.ar")
    );
    // Untouched fields keep their defaults.
    assert_eq!(
        updated.pointer("/import/maxWarnings").and_then(|v| v.as_i64()),
        Some(200)
    );

    let bad_range = request(
        &mut stdin,
        &mut reader,
        "6",
        "setup.update",
        json!({ "section": "import", "patch": { "maxErrorSamples": 0 } }),
    );
    assert_eq!(error_code(&bad_range), Some("bad_params"));

    let bad_field = request(
        &mut stdin,
        &mut reader,
        "7",
        "setup.update",
        json!({ "section": "identity", "patch": { "favouriteColour": "blue" } }),
    );
    assert_eq!(error_code(&bad_field), Some("bad_params"));

    let bad_section = request(
        &mut stdin,
        &mut reader,
        "8",
        "setup.update",
        json!({ "section": "printer", "patch": {} }),
    );
    assert_eq!(error_code(&bad_section), Some("bad_params"));

    // A rejected patch leaves the stored section unchanged.
    let after = request_ok(&mut stdin, &mut reader, "9", "setup.get", json!({}));
    assert_eq!(
        after.pointer("/import/maxErrorSamples").and_then(|v| v.as_i64()),
        Some(20)
    );
}
