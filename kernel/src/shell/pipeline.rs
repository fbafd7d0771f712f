//! Shell pipeline engine: operator parsing, output capture, redirection,
//! and command chaining.
//!
//! The line is scanned left-to-right for the leftmost operator outside
//! single or double quotes; two-character operators win over their
//! one-character prefixes. Capture-based operators swap the console sink
//! to a scratch buffer around the left-hand command.

use alloc::string::String;
use alloc::vec::Vec;

use crate::drivers::console;
use crate::fs::ramfs;

/// Shell operators recognized by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    /// `|` — feed captured output to the right-hand command.
    Pipe,
    /// `>` — write captured output to a file.
    RedirOut,
    /// `>>` — append captured output to a file.
    RedirAppend,
    /// `<` — feed file content to the left-hand command.
    RedirIn,
    /// `&&` — chain; both sides run unconditionally.
    And,
    /// `||` — chain; only the left side runs.
    Or,
    /// `;` — sequential chain.
    Seq,
}

/// Find the leftmost operator outside quoted strings.
/// Returns the operator, its byte position, and its length.
pub fn find_operator(line: &str) -> Option<(Op, usize, usize)> {
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
                i += 1;
            }
            b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'\'' {
                    i += 1;
                }
                i += 1;
            }
            _ => {
                let two = bytes.get(i + 1).copied();
                match (bytes[i], two) {
                    (b'|', Some(b'|')) => return Some((Op::Or, i, 2)),
                    (b'&', Some(b'&')) => return Some((Op::And, i, 2)),
                    (b'>', Some(b'>')) => return Some((Op::RedirAppend, i, 2)),
                    (b'|', _) => return Some((Op::Pipe, i, 1)),
                    (b'>', _) => return Some((Op::RedirOut, i, 1)),
                    (b'<', _) => return Some((Op::RedirIn, i, 1)),
                    (b';', _) => return Some((Op::Seq, i, 1)),
                    _ => i += 1,
                }
            }
        }
    }
    None
}

/// Run `left` with the console sink swapped to the capture buffer and
/// return what it printed.
fn capture_output(left: &str) -> String {
    console::capture_start();
    super::execute_simple(left);
    console::capture_end()
}

/// The pipe feed drops the single trailing newline the left command
/// printed; redirection keeps the raw bytes.
fn pipe_feed(captured: &str) -> &str {
    captured.strip_suffix('\n').unwrap_or(captured)
}

/// Execute a full command line with operator support.
pub fn execute_advanced(line: &str) {
    let (op, pos, len) = match find_operator(line) {
        Some(found) => found,
        None => {
            super::execute_simple(line);
            return;
        }
    };

    let left = line[..pos].trim();
    let right = line[pos + len..].trim();

    match op {
        Op::Pipe => {
            let captured = capture_output(left);
            execute_with_pipe_input(right, pipe_feed(&captured));
        }
        Op::RedirOut => {
            let captured = capture_output(left);
            if ramfs::write(right, captured.as_bytes()).is_err() {
                crate::kprintln!("Cannot write: {}", right);
            }
        }
        Op::RedirAppend => {
            let mut content = ramfs::read(right).unwrap_or_default();
            let captured = capture_output(left);
            let room = ramfs::MAX_DATA.saturating_sub(content.len());
            let take = captured.len().min(room);
            content.extend_from_slice(&captured.as_bytes()[..take]);
            if ramfs::write(right, &content).is_err() {
                crate::kprintln!("Cannot write: {}", right);
            }
        }
        Op::RedirIn => match ramfs::read(right) {
            Ok(content) => {
                let text = String::from_utf8_lossy(&content).into_owned();
                execute_with_pipe_input(left, &text);
            }
            Err(_) => crate::kprintln!("Cannot read: {}", right),
        },
        Op::And => {
            // Exit codes do not reach the shell layer; both sides run.
            super::execute_simple(left);
            execute_advanced(right);
        }
        Op::Or => {
            // Same gap, opposite effect: the right side never runs.
            super::execute_simple(left);
        }
        Op::Seq => {
            super::execute_simple(left);
            execute_advanced(right);
        }
    }
}

/// Run a command with piped input. Commands with stdin behavior consume
/// the buffer directly; everything else ignores it.
pub fn execute_with_pipe_input(cmd: &str, input: &str) {
    let cmd = cmd.trim();
    let (word, args) = match cmd.split_once(' ') {
        Some((w, a)) => (w, a.trim()),
        None => (cmd, ""),
    };

    match word {
        "wc" => {
            let lines = input.matches('\n').count();
            let words = input.split_whitespace().count();
            crate::kprintln!("{} {} {}", lines, words, input.len());
        }
        "cat" if args.is_empty() => {
            crate::kprint!("{}", input);
        }
        "grep" => {
            if args.is_empty() {
                crate::kprintln!("Usage: grep <pattern>");
                return;
            }
            for line in input.lines() {
                if line.contains(args) {
                    crate::kprintln!("{}", line);
                }
            }
        }
        "head" => {
            let n = parse_count(args).unwrap_or(10);
            for line in input.lines().take(n) {
                crate::kprintln!("{}", line);
            }
        }
        "tail" => {
            let n = parse_count(args).unwrap_or(10);
            let total = input.lines().count();
            for line in input.lines().skip(total.saturating_sub(n)) {
                crate::kprintln!("{}", line);
            }
        }
        "sort" => {
            let mut lines: Vec<&str> = input.lines().collect();
            lines.sort_unstable();
            for line in lines {
                crate::kprintln!("{}", line);
            }
        }
        "uniq" => {
            let mut prev: Option<&str> = None;
            for line in input.lines() {
                if prev != Some(line) {
                    crate::kprintln!("{}", line);
                    prev = Some(line);
                }
            }
        }
        _ => super::execute_simple(cmd),
    }
}

fn parse_count(args: &str) -> Option<usize> {
    let arg = args.split_whitespace().next()?;
    let arg = arg.strip_prefix('-').unwrap_or(arg);
    arg.parse().ok().filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(line: &str) -> String {
        crate::shell::execute(line);
        crate::drivers::console::take_screen()
    }

    fn setup() {
        crate::fs::ramfs::init();
        crate::shell::history::clear();
        let _ = crate::drivers::console::take_screen();
    }

    #[test]
    fn operator_scanner_precedence_and_quotes() {
        assert_eq!(find_operator("a | b"), Some((Op::Pipe, 2, 1)));
        assert_eq!(find_operator("a || b"), Some((Op::Or, 2, 2)));
        assert_eq!(find_operator("a && b"), Some((Op::And, 2, 2)));
        assert_eq!(find_operator("a > f"), Some((Op::RedirOut, 2, 1)));
        assert_eq!(find_operator("a >> f"), Some((Op::RedirAppend, 2, 2)));
        assert_eq!(find_operator("a < f"), Some((Op::RedirIn, 2, 1)));
        assert_eq!(find_operator("a ; b"), Some((Op::Seq, 2, 1)));
        assert_eq!(find_operator("plain command"), None);

        // Leftmost operator wins.
        assert_eq!(find_operator("a > b | c"), Some((Op::RedirOut, 2, 1)));

        // Quoted operators are literal text.
        assert_eq!(find_operator("echo \"a|b\""), None);
        assert_eq!(find_operator("echo 'x > y'"), None);
        assert_eq!(find_operator("echo \"a|b\" | wc"), Some((Op::Pipe, 11, 1)));
    }

    #[test]
    fn pipe_echo_to_wc() {
        let _guard = crate::test_sync::lock();
        setup();
        assert_eq!(run("echo hello world | wc"), "0 2 11\n");
    }

    #[test]
    fn redirect_then_cat_roundtrip() {
        let _guard = crate::test_sync::lock();
        setup();

        run("echo testdata > file.txt");
        assert_eq!(crate::fs::ramfs::read("file.txt").unwrap().len(), 9);
        assert_eq!(run("cat file.txt"), "testdata\n");
    }

    #[test]
    fn append_accumulates() {
        let _guard = crate::test_sync::lock();
        setup();

        run("echo one > both.txt");
        run("echo two >> both.txt");
        assert_eq!(run("cat both.txt"), "one\ntwo\n");
    }

    #[test]
    fn input_redirect_feeds_file() {
        let _guard = crate::test_sync::lock();
        setup();

        run("echo testdata > in.txt");
        // Raw file content: "testdata\n" -> 1 line, 1 word, 9 chars.
        assert_eq!(run("wc < in.txt"), "1 1 9\n");
    }

    #[test]
    fn chains_run_in_order() {
        let _guard = crate::test_sync::lock();
        setup();

        assert_eq!(run("echo a ; echo b"), "a\nb\n");
        // Observed behavior: && does not gate on success, both sides run.
        assert_eq!(run("echo a && echo b"), "a\nb\n");
        // Observed behavior: || never runs the right side.
        assert_eq!(run("echo a || echo b"), "a\n");
    }

    #[test]
    fn pipe_builtins_process_lines() {
        let _guard = crate::test_sync::lock();
        setup();

        crate::fs::ramfs::write("data.txt", b"pear\napple\npear\nbanana\n").unwrap();
        assert_eq!(run("cat data.txt | grep pear"), "pear\npear\n");
        assert_eq!(run("cat data.txt | sort"), "apple\nbanana\npear\npear\n");
        assert_eq!(run("cat data.txt | head 2"), "pear\napple\n");
        assert_eq!(run("cat data.txt | tail 1"), "banana\n");

        crate::fs::ramfs::write("sorted.txt", b"apple\napple\nbanana\n").unwrap();
        assert_eq!(run("uniq < sorted.txt"), "apple\nbanana\n");
    }

    #[test]
    fn quoted_operators_stay_literal_end_to_end() {
        let _guard = crate::test_sync::lock();
        setup();
        let out = run("echo \"a|b\"");
        assert!(out.contains("a|b"));
        assert!(!out.contains("Unknown"));
    }
}
