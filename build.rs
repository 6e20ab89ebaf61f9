use std::fs;
use std::io;
use std::path::Path;

/// Macros that write straight to the console. Library code reports through `log`.
const CONSOLE_MACROS: &[&str] = &["print", "println", "eprint", "eprintln", "dbg"];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");

    let mut hits = Vec::new();
    if let Err(err) = scan(Path::new("src"), &mut hits) {
        panic!("cannot scan library sources: {err}");
    }
    if !hits.is_empty() {
        panic!(
            "console output in library sources, use the log macros instead:\n{}",
            hits.join("\n")
        );
    }
}

fn scan(dir: &Path, hits: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            scan(&path, hits)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            let text = fs::read_to_string(&path)?;
            for (idx, line) in text.lines().enumerate() {
                let code = line.trim_start();
                if code.starts_with("//") {
                    continue;
                }
                if let Some(name) = console_macro(code) {
                    hits.push(format!("  {}:{}: {name}!", path.display(), idx + 1));
                }
            }
        }
    }
    Ok(())
}

/// First console macro invoked on `code`, matched on whole identifiers.
fn console_macro(code: &str) -> Option<&'static str> {
    let bytes = code.as_bytes();
    let mut start = None;
    for (pos, &b) in bytes.iter().enumerate() {
        let ident = b == b'_' || b.is_ascii_alphanumeric();
        match (start, ident) {
            (None, true) => start = Some(pos),
            (Some(from), false) => {
                start = None;
                if b == b'!' {
                    let word = &code[from..pos];
                    if let Some(name) = CONSOLE_MACROS.iter().find(|m| **m == word) {
                        return Some(name);
                    }
                }
            }
            _ => {}
        }
    }
    None
}
