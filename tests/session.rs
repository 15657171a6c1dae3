//! Session commands driven the way the REPL drives them.

use std::io::Write;
use std::process::Command;

use insta::assert_snapshot;
use magnifier::{Outcome, Session};
use tempfile::NamedTempFile;

const ADD_CALL: &str = "\
define i32 @add(i32 %a, i32 %b) {
entry:
  %s = add i32 %a, %b
  ret i32 %s
}

define i32 @call() {
entry:
  %r = call i32 @add(i32 1, i32 2)
  ret i32 %r
}
";

fn module_file(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

fn output(session: &mut Session, line: &str) -> String {
    match session.execute(line) {
        Outcome::Output(text) => text,
        Outcome::Exit => panic!("`{line}` ended the session"),
    }
}

fn loaded_session() -> (Session, NamedTempFile) {
    let file = module_file(ADD_CALL);
    let mut session = Session::default();
    let loaded = output(&mut session, &format!("lm {}", file.path().display()));
    assert!(loaded.starts_with("Successfully loaded: "), "{loaded}");
    (session, file)
}

#[test]
fn listing_and_printing() {
    let (mut session, _file) = loaded_session();
    assert_eq!(output(&mut session, "lf"), "1 add\n7 call\n");
    assert_snapshot!(output(&mut session, "pf 7"), @r"
    ; 7|7
    define i32 @call() {
    entry:
    ; --- start block: 10 ---
      %r = call i32 @add(i32 1, i32 2) ; 8|8
      ret i32 %r ; 9|9
    ; --- end block: 10 ---
    }
    ");
    assert_eq!(output(&mut session, "pf 99"), "Function not found: 99\n");
    assert_eq!(output(&mut session, "pf x"), "Invalid args\n");
}

#[test]
fn inlining_reports_substitutions_then_prints() {
    let (mut session, _file) = loaded_session();
    let text = output(&mut session, "ic 8");
    let (events, function): (Vec<&str>, Vec<&str>) = text
        .lines()
        .partition(|line| line.starts_with("perform substitution: "));
    let kinds: Vec<&str> = events
        .iter()
        .filter_map(|line| line.rsplit(" : ").next())
        .collect();
    assert_eq!(
        kinds,
        ["Return value", "Argument", "Argument", "Constant folding"]
    );
    assert_snapshot!(function.join("\n"), @r"
    ; 11|7
    define i32 @call.1() {
    entry:
    ; --- start block: 13 ---
      ret i32 3 ; 12|9
    ; --- end block: 13 ---
    }
    ");

    assert_eq!(output(&mut session, "lf"), "1 add\n7 call\n");
    assert_eq!(
        output(&mut session, "lfa"),
        "1 add\n7 call\n11 call.1 (generated)\n"
    );
}

#[test]
fn failures_use_the_command_tables() {
    let (mut session, _file) = loaded_session();
    assert_eq!(
        output(&mut session, "ic 4"),
        "Inline function call failed for id: 4 (error: Not a CallBase instruction)\n"
    );
    assert_eq!(
        output(&mut session, "dc 8 1"),
        "Devirtualize function call failed for id: 8 (error: Not an indirect call)\n"
    );
    assert_eq!(
        output(&mut session, "sv 7 5"),
        "Substitute value failed for id: 7 (error: Cannot use function id)\n"
    );
    assert_eq!(
        output(&mut session, "df! 1"),
        "Delete function failed for id: 1 (error: Function is still in use)\n"
    );
    assert_eq!(
        output(&mut session, "o1 42"),
        "Optimize function failed for id: 42 (error: Id not found)\n"
    );
    assert_eq!(output(&mut session, "frobnicate 1"), "Invalid Command: frobnicate\n");
    assert_eq!(
        output(&mut session, "ic"),
        "Usage: ic <instruction_id> - Inline function call\n"
    );
    assert_eq!(
        output(&mut session, "o2"),
        "Usage: o2 <id> - Optimize function using optimization level -O2\n"
    );
    assert_eq!(output(&mut session, "   "), "");
}

#[test]
fn substitution_falls_back_to_arguments() {
    let (mut session, _file) = loaded_session();
    let text = output(&mut session, "sv 2 5");
    assert!(text.contains(" : Value substitution\n"), "{text}");
    assert!(text.contains("define i32 @add.1(i32 %a, i32 %b)"), "{text}");
    assert!(text.contains("add i32 5, %b"), "{text}");
}

#[test]
fn optimizing_deleting_and_exiting() {
    let (mut session, _file) = loaded_session();
    let optimized = output(&mut session, "o3 7");
    assert!(optimized.contains("ret i32 3"), "{optimized}");

    assert_eq!(output(&mut session, "df! 11"), "Deleted function with id: 11\n");
    assert_eq!(output(&mut session, "df! 7"), "Deleted function with id: 7\n");
    assert_eq!(output(&mut session, "lf"), "1 add\n");
    assert_eq!(session.execute("exit"), Outcome::Exit);
}

#[test]
fn decompiling_emits_json_with_provenance() {
    let (mut session, _file) = loaded_session();
    let text = output(&mut session, "dec 1");
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["function_id"], 1);
    assert_snapshot!(json["code"].as_str().unwrap(), @r"
    int32_t add(int32_t a, int32_t b) {
    entry:
      int32_t s = a + b;
      return s;
    }
    ");

    let code = json["code"].as_str().unwrap();
    let statements: Vec<(u64, &str)> = json["entries"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["kind"] == "statement")
        .map(|e| {
            let (start, end) = (e["start"].as_u64().unwrap(), e["end"].as_u64().unwrap());
            (e["id"].as_u64().unwrap(), &code[start as usize..end as usize])
        })
        .collect();
    assert_eq!(statements, [(4, "int32_t s = a + b;"), (5, "return s;")]);
}

#[test]
fn unreadable_modules_are_reported() {
    let mut session = Session::default();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.ir");
    assert_eq!(
        output(&mut session, &format!("lm {}", missing.display())),
        format!("Unable to open file: {}\n", missing.display())
    );

    let broken = module_file("define i32 @f( {\n");
    let text = output(&mut session, &format!("lm {}", broken.path().display()));
    assert!(text.starts_with("Unable to parse file: "), "{text}");
    assert!(session.explorer().modules().is_empty());
}

#[test]
fn batch_mode_prints_each_command() {
    let file = module_file(ADD_CALL);
    let out = Command::new(env!("CARGO_BIN_EXE_magnifier"))
        .arg("run")
        .arg(file.path())
        .args(["-c", "lf", "-c", "pf 99"])
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8(out.stdout).unwrap(),
        "1 add\n7 call\nFunction not found: 99\n"
    );
}
