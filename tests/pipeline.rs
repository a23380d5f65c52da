//! End-to-end pipeline tests: PB source → generated C → (when a C
//! compiler is available) compiled binary → stdout.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use indoc::indoc;

use pbc::codegen;

/// Compile-and-run assertions need a system C compiler; skip them
/// gracefully when none is installed.
fn detect_cc() -> bool {
    let available = Command::new("cc")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false);
    if !available {
        eprintln!("Skipping compile-and-run test: no 'cc' on PATH.");
    }
    available
}

fn case_dir(name: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir()
        .join("pbc-pipeline-tests")
        .join(format!("{name}-{}", std::process::id()));
    fs::create_dir_all(&dir).with_context(|| format!("Creating {}", dir.display()))?;
    Ok(dir)
}

/// Build a PB program with the embedded runtime and return its binary
/// path.
fn build_pb(name: &str, source: &str) -> Result<PathBuf> {
    let c_source = pbc::compile(source).context("Compiling PB source")?;
    let dir = case_dir(name)?;
    let c_path = dir.join("out.c");
    fs::write(&c_path, &c_source).context("Writing generated C")?;
    let binary_path = dir.join("out");
    codegen::compile_c(&c_path, &binary_path)?;
    Ok(binary_path)
}

fn run_pb(name: &str, source: &str) -> Result<String> {
    let binary_path = build_pb(name, source)?;
    codegen::run_compiled_binary(&binary_path)
}

// ───────────────────────── end-to-end scenarios ─────────────────────────

#[test]
fn scenario_arithmetic_print() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "arithmetic",
        "def main():\n    print(1 + 2)\n",
    )?;
    assert_eq!(output, "3\n");
    Ok(())
}

#[test]
fn scenario_top_level_list_assignment() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "top-level-list",
        "arr: list[int] = [10]\narr[0] = 20\nprint(arr[0])\n",
    )?;
    assert_eq!(output, "20\n");
    Ok(())
}

#[test]
fn scenario_index_error_is_catchable() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "index-error",
        indoc! {"
            def main():
                try:
                    arr: list[int] = []
                    arr[5] = 1
                except IndexError as e:
                    print(e)
        "},
    )?;
    assert!(
        output.starts_with("cannot assign to index 5 in list[int] of length 0"),
        "unexpected output: {output:?}"
    );
    Ok(())
}

#[test]
fn scenario_single_inheritance() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "inheritance",
        "class P:\n    def __init__(self): self.hp = 10\nclass M(P):\n    def __init__(self): P.__init__(self); self.mp = 5\ndef main():\n    m: M = M(); print(m.hp); print(m.mp)\n",
    )?;
    assert_eq!(output, "10\n5\n");
    Ok(())
}

#[test]
fn scenario_global_counter() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "global-counter",
        "counter: int = 100\ndef bump():\n    global counter\n    counter += 1\ndef main(): bump(); print(counter)\n",
    )?;
    assert_eq!(output, "101\n");
    Ok(())
}

#[test]
fn scenario_caught_runtime_error() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "caught-raise",
        "def div(a: int, b: int) -> int:\n    if b == 0: raise RuntimeError(\"zero\")\n    return a // b\ndef main():\n    try: print(div(10, 0))\n    except RuntimeError as e: print(e)\n",
    )?;
    assert_eq!(output, "zero\n");
    Ok(())
}

// ───────────────────────── runtime contract ─────────────────────────

#[test]
fn uncaught_raise_exits_nonzero() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let binary_path = build_pb(
        "uncaught-raise",
        indoc! {"
            def main():
                raise RuntimeError(\"boom\")
        "},
    )?;
    let output = Command::new(&binary_path)
        .output()
        .context("Running compiled program")?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Uncaught RuntimeError"),
        "unexpected stderr: {stderr:?}"
    );
    Ok(())
}

#[test]
fn print_formats_follow_the_contract() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "print-contract",
        indoc! {"
            def main():
                print(42)
                print(50.0)
                print(3.5)
                print(True)
                print([1, 2, 3])
                print([\"a\", \"b\"])
                print({\"k\": 1})
        "},
    )?;
    assert_eq!(
        output,
        "42\n50.0\n3.5\nTrue\n[1, 2, 3]\n['a', 'b']\n{'k': 1}\n"
    );
    Ok(())
}

#[test]
fn division_by_zero_is_catchable() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "zero-division",
        indoc! {"
            def main():
                try:
                    x: int = 10 // 0
                    print(x)
                except ZeroDivisionError as e:
                    print(e)
        "},
    )?;
    assert_eq!(output, "integer division or modulo by zero\n");
    Ok(())
}

#[test]
fn fstrings_interpolate_typed_values() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "fstring",
        indoc! {"
            def main():
                name: str = \"rogue\"
                hp: int = 7
                alive: bool = True
                print(f\"{name} has {hp} hp ({alive})\")
        "},
    )?;
    assert_eq!(output, "rogue has 7 hp (True)\n");
    Ok(())
}

#[test]
fn fstring_results_are_independent() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "fstring-independent",
        indoc! {"
            def main():
                a: str = f\"{1}\"
                b: str = f\"{2}\"
                print(a)
                print(b)
        "},
    )?;
    assert_eq!(output, "1\n2\n");
    Ok(())
}

#[test]
fn derived_exception_prints_its_message() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "derived-exception",
        indoc! {"
            class Base:
                def __init__(self):
                    self.code = 1
            class Boom(Base):
                def __init__(self):
                    Base.__init__(self)
                    self.msg = \"bad\"
            def main():
                try:
                    raise Boom()
                except Boom as e:
                    print(e)
        "},
    )?;
    assert_eq!(output, "bad\n");
    Ok(())
}

#[test]
fn methods_and_wrappers_dispatch_statically() -> Result<()> {
    if !detect_cc() {
        return Ok(());
    }
    let output = run_pb(
        "wrappers",
        indoc! {"
            class P:
                def __init__(self):
                    self.hp = 10
                def heal(self, amount: int):
                    self.hp += amount
            class M(P):
                def __init__(self):
                    P.__init__(self)
                    self.mp = 5
            def main():
                m: M = M()
                m.heal(3)
                print(m.hp)
        "},
    )?;
    assert_eq!(output, "13\n");
    Ok(())
}

// ───────────────────────── phase errors ─────────────────────────

#[test]
fn lexer_errors_identify_their_phase() {
    for source in ["\tx: int = 1\n", "x: float = 5.\n", "x: float = .5\n", "x: int = 1__2\n"] {
        let err = pbc::compile(source).expect_err("expected lexer failure");
        assert!(
            err.to_string().starts_with("LexerError"),
            "unexpected error for {source:?}: {err}"
        );
    }
}

#[test]
fn parser_errors_identify_their_phase() {
    for source in [
        "True = 1\n",
        "break\n",
        "def f(a: int, a: int):\n    pass\n",
        "x: bool = 1 < 2 < 3\n",
    ] {
        let err = pbc::compile(source).expect_err("expected parser failure");
        assert!(
            err.to_string().starts_with("ParserError"),
            "unexpected error for {source:?}: {err}"
        );
    }
}

#[test]
fn type_errors_identify_their_phase() {
    for source in [
        "xs: list[int] = [1, \"a\"]\n",
        "class A(B):\n    pass\n",
        "def main():\n    x: int = True + 1\n",
        "def main():\n    print(y)\n",
    ] {
        let err = pbc::compile(source).expect_err("expected type failure");
        assert!(
            err.to_string().starts_with("TypeError"),
            "unexpected error for {source:?}: {err}"
        );
    }
}

#[test]
fn while_true_break_is_accepted() {
    pbc::compile("def main():\n    while True:\n        break\n")
        .expect("break inside a loop should compile");
}

#[test]
fn generated_c_always_includes_the_runtime_boundary() {
    let c_source = pbc::compile(indoc! {"
        def main():
            print(1)
    "})
    .expect("compile should succeed");
    assert!(c_source.starts_with("#include \"pb_runtime.h\""));
    assert!(c_source.contains("int main(void)"));
}
