use std::fs;
use std::io;
use std::path::{Component, Path};

use lazy_regex::{Lazy, Regex, lazy_regex};

use crate::config::RunnerConfig;

use super::{ReferenceFile, ReferenceTestSet};

/// Package the toolchain requires for an executable program
pub const ENTRY_PACKAGE: &str = "main";

const RUN_FILE_NAME: &str = "main.go";
const TEST_FILE_NAME: &str = "solution.go";
const MODULE_FILE_NAME: &str = "go.mod";
const NOOP_ENTRY_POINT: &str = "\nfunc main() {}\n";

static RE_PACKAGE: Lazy<Regex> =
    lazy_regex!(r"(?m)^[ \t]*package[ \t]+([A-Za-z_][A-Za-z0-9_]*)");
static RE_ENTRY_POINT: Lazy<Regex> = lazy_regex!(r"(?m)^[ \t]*func[ \t]+main[ \t]*\([ \t]*\)");

/// What the assembled module is going to be used for
#[derive(Debug, Clone, Copy)]
pub enum AssembleMode<'a> {
    /// A standalone program, run with `go run`
    Run,
    /// User code compiled together with reference tests, run with `go test`
    Test(&'a ReferenceTestSet),
}

/// The user's code as it was written into the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub package: String,
    pub file_name: &'static str,
    pub source: String,
    pub entry_point_injected: bool,
}

/// Materializes a self-contained Go module inside `workspace_dir`
///
/// Only the package clause of the user's code is ever rewritten. Reference
/// files are written after the user's code, so a reference file sharing its
/// name replaces it.
pub fn assemble(
    workspace_dir: &Path,
    source_code: &str,
    mode: AssembleMode<'_>,
    runner: &RunnerConfig,
) -> io::Result<SourceUnit> {
    let unit = match mode {
        AssembleMode::Run => {
            let mut source = with_package(source_code, ENTRY_PACKAGE);
            let entry_point_injected = !has_entry_point(&source);
            if entry_point_injected {
                if !source.ends_with('\n') {
                    source.push('\n');
                }
                source.push_str(NOOP_ENTRY_POINT);
            }
            SourceUnit {
                package: ENTRY_PACKAGE.to_string(),
                file_name: RUN_FILE_NAME,
                source,
                entry_point_injected,
            }
        }
        AssembleMode::Test(reference) => {
            let package = test_package(&reference.tests);
            SourceUnit {
                source: with_package(source_code, &package),
                package,
                file_name: TEST_FILE_NAME,
                entry_point_injected: false,
            }
        }
    };

    fs::write(
        workspace_dir.join(MODULE_FILE_NAME),
        module_descriptor(&runner.module_name, &runner.go_version),
    )?;

    let mut contents = unit.source.clone();
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    fs::write(workspace_dir.join(unit.file_name), contents)?;

    if let AssembleMode::Test(reference) = mode {
        for file in reference.tests.iter().chain(reference.assets.iter()) {
            write_reference_file(workspace_dir, file)?;
        }
    }

    log::debug!(
        "Assembled package {} into {} (entry point injected: {})",
        unit.package,
        workspace_dir.display(),
        unit.entry_point_injected
    );

    Ok(unit)
}

/// Returns the first package clause declared in `source`
pub fn declared_package(source: &str) -> Option<&str> {
    package_name_span(source).map(|(start, end)| &source[start..end])
}

/// Whether `source` declares `func main()` outside comments and literals
pub fn has_entry_point(source: &str) -> bool {
    RE_ENTRY_POINT.is_match(&mask_non_code(source))
}

/// Rewrites the package clause to `package`, prepending one if absent
pub fn with_package(source: &str, package: &str) -> String {
    match package_name_span(source) {
        Some((start, end)) => {
            let mut rewritten = String::with_capacity(source.len() + package.len());
            rewritten.push_str(&source[..start]);
            rewritten.push_str(package);
            rewritten.push_str(&source[end..]);
            rewritten
        }
        None => format!("package {package}\n\n{source}"),
    }
}

/// Byte range of the package name in the first real package clause
fn package_name_span(source: &str) -> Option<(usize, usize)> {
    RE_PACKAGE
        .captures(&mask_non_code(source))
        .and_then(|caps| caps.get(1))
        .map(|m| (m.start(), m.end()))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Code,
    LineComment,
    BlockComment,
    RawString,
    String,
    Rune,
}

/// Blanks out comments and literals, keeping byte offsets and line breaks
///
/// State only changes on ASCII bytes, so multi-byte characters are either
/// copied whole or blanked whole and the result stays valid UTF-8.
fn mask_non_code(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut masked = Vec::with_capacity(bytes.len());
    let mut state = Lexeme::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        let blank = |b: u8| if b == b'\n' { b'\n' } else { b' ' };

        match state {
            Lexeme::Code => match (b, next) {
                (b'/', Some(b'/')) => {
                    state = Lexeme::LineComment;
                    masked.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'/', Some(b'*')) => {
                    state = Lexeme::BlockComment;
                    masked.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'`', _) => {
                    state = Lexeme::RawString;
                    masked.push(b' ');
                }
                (b'"', _) => {
                    state = Lexeme::String;
                    masked.push(b' ');
                }
                (b'\'', _) => {
                    state = Lexeme::Rune;
                    masked.push(b' ');
                }
                _ => masked.push(b),
            },
            Lexeme::LineComment => {
                if b == b'\n' {
                    state = Lexeme::Code;
                }
                masked.push(blank(b));
            }
            Lexeme::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    state = Lexeme::Code;
                    masked.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                masked.push(blank(b));
            }
            Lexeme::RawString => {
                if b == b'`' {
                    state = Lexeme::Code;
                }
                masked.push(blank(b));
            }
            Lexeme::String | Lexeme::Rune => {
                let quote = if state == Lexeme::String { b'"' } else { b'\'' };
                if b == b'\\' && next.is_some_and(|n| n != b'\n') {
                    masked.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                // an unterminated literal ends at the line break
                if b == quote || b == b'\n' {
                    state = Lexeme::Code;
                }
                masked.push(blank(b));
            }
        }
        i += 1;
    }

    String::from_utf8_lossy(&masked).into_owned()
}

/// The package the reference tests live in, the first declaration wins
fn test_package(tests: &[ReferenceFile]) -> String {
    tests
        .iter()
        .find_map(|file| declared_package(&file.content))
        .unwrap_or(ENTRY_PACKAGE)
        .to_string()
}

fn module_descriptor(module_name: &str, go_version: &str) -> String {
    format!("module {module_name}\n\ngo {go_version}\n")
}

fn write_reference_file(workspace_dir: &Path, file: &ReferenceFile) -> io::Result<()> {
    let relative = Path::new(&file.name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if file.name.is_empty() || escapes {
        log::warn!("Skipping reference file with unsafe name {:?}", file.name);
        return Ok(());
    }

    let target = workspace_dir.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, &file.content)
}
