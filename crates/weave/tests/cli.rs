use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

fn weave_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_weave"))
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(weave_binary())
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn render_uses_model_data() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("app.html"),
        "<Body:>\n<ul>{{each _page.items as #item}}<li>{{#item}}</li>{{/each}}</ul>\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("data.json"),
        r#"{"_page": {"items": ["a", "<b>"]}}"#,
    )
    .unwrap();

    let output = run(dir.path(), &["render", "app.html", "--data", "data.json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("<li>a</li>"), "unexpected html: {stdout}");
    assert!(stdout.contains("<li>&lt;b&gt;</li>"), "unexpected html: {stdout}");
}

#[test]
fn render_named_view() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("app.html"),
        "<Body:>\nbody\n\n<Title:>\nHello {{_page.name}}\n",
    )
    .unwrap();

    let output = run(dir.path(), &["render", "app.html", "--view", "Title"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert_eq!(stdout.trim(), "Hello");
}

#[test]
fn render_unknown_view_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.html"), "<Body:>\nbody\n").unwrap();

    let output = run(dir.path(), &["render", "app.html", "--view", "Missing"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Missing"), "stderr: {stderr}");
}

#[test]
fn serialize_prints_compiled_view() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.html"), "<Body:>\n<p>{{_page.a}}</p>\n").unwrap();

    let output = run(dir.path(), &["serialize", "app.html"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(!stdout.trim().is_empty());
}

#[test]
fn check_clean_files_exit_zero() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.html"), "<Body:>\n{{if _page.x}}yes{{/if}}\n").unwrap();
    std::fs::write(dir.path().join("b.html"), "<Title:>\nTitle\n").unwrap();

    let output = run(dir.path(), &["check", "a.html", "b.html"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("All checks passed!"));
}

#[test]
fn check_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("good.html"), "<Body:>\nok\n").unwrap();
    std::fs::write(dir.path().join("bad.html"), "<Body:>\n{{if _page.x}}open\n").unwrap();

    let output = run(dir.path(), &["check", "good.html", "bad.html"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("bad.html"), "stderr: {stderr}");
    assert!(stderr.contains("1 of 2 files failed to parse"));
}

#[test]
fn check_quiet_prints_nothing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.html"), "<Body:>\n{{if _page.x}}open\n").unwrap();

    let output = run(dir.path(), &["--quiet", "check", "bad.html"]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty());
}

#[test]
fn settings_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("weave.toml"), "debug = true\nid_namespace = \"x\"\n").unwrap();
    std::fs::write(dir.path().join("app.html"), "<Body:>\nok\n").unwrap();

    let output = run(dir.path(), &["render", "app.html"]);
    assert!(output.status.success());

    std::fs::write(dir.path().join("weave.toml"), "debug = \"not a bool\"\n").unwrap();
    let output = run(dir.path(), &["render", "app.html"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("Failed to load settings"), "stderr: {stderr}");
}
