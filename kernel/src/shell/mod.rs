//! Interactive shell: command table, line dispatch, and the console loop.
//!
//! `execute` is the full entry point (history + audit + operator engine);
//! `execute_simple` dispatches a single operator-free command against the
//! table.

pub mod commands;
pub mod history;
pub mod pipeline;

use crate::drivers::console::Color;
use crate::kprintln_color;

type CommandFn = fn(&str);

/// `(name, description, handler)` — the dispatch table.
static COMMANDS: &[(&str, &str, CommandFn)] = &[
    ("help", "Show commands", commands::cmd_help),
    ("echo", "Echo text", commands::cmd_echo),
    ("clear", "Clear screen", commands::cmd_clear),
    ("version", "OS version", commands::cmd_version),
    ("uname", "System name", commands::cmd_uname),
    ("uptime", "Show uptime", commands::cmd_uptime),
    ("free", "Memory usage", commands::cmd_free),
    ("halt", "Shutdown", commands::cmd_halt),
    ("reboot", "Restart", commands::cmd_reboot),
    ("ls", "List files", commands::cmd_ls),
    ("cat", "Show file", commands::cmd_cat),
    ("cd", "Change directory", commands::cmd_cd),
    ("pwd", "Current directory", commands::cmd_pwd),
    ("mkdir", "Create directory", commands::cmd_mkdir),
    ("touch", "Create file", commands::cmd_touch),
    ("rm", "Remove file", commands::cmd_rm),
    ("head", "First lines", commands::cmd_head),
    ("tail", "Last lines", commands::cmd_tail),
    ("wc", "Word count", commands::cmd_wc),
    ("grep", "Search file", commands::cmd_grep),
    ("stat", "File info", commands::cmd_stat),
    ("find", "Find files", commands::cmd_find),
    ("df", "Filesystem usage", commands::cmd_df),
    ("hexdump", "Hex dump", commands::cmd_hexdump),
    ("ps", "Process list", commands::cmd_ps),
    ("kill", "Send signal", commands::cmd_kill),
    ("whoami", "Current user", commands::cmd_whoami),
    ("su", "Switch user", commands::cmd_su),
    ("history", "Command history", commands::cmd_history),
    ("audit", "Audit log", commands::cmd_audit),
    ("nifconfig", "Network config", commands::cmd_nifconfig),
    ("narp", "ARP cache", commands::cmd_narp),
    ("nping", "Ping host", commands::cmd_nping),
    ("ndns", "DNS lookup", commands::cmd_ndns),
    ("nnetstat", "TCP connections", commands::cmd_nnetstat),
];

/// Dispatch one operator-free command line.
pub fn execute_simple(input: &str) {
    let input = input.trim();
    if input.is_empty() {
        return;
    }

    let (cmd, args) = match input.split_once(' ') {
        Some((c, a)) => (c, a.trim_start()),
        None => (input, ""),
    };

    for (name, _desc, handler) in COMMANDS {
        if *name == cmd {
            handler(args);
            return;
        }
    }

    kprintln_color!(Color::LightRed, "Unknown: {}", cmd);
}

/// Full shell entry point: record the line, then run the operator engine.
pub fn execute(input: &str) {
    let input = input.trim();
    if input.is_empty() {
        return;
    }
    history::audit(input);
    history::add(input);
    pipeline::execute_advanced(input);
}

/// Interactive console loop. Runs in the idle/kernel task and never
/// returns; spawned tasks preempt it via the timer.
#[cfg(target_os = "none")]
pub fn run() -> ! {
    use crate::drivers::{console, keyboard};

    crate::kprintln!("Type 'help' for commands.");
    crate::kprintln!();

    let mut line = [0u8; 256];

    loop {
        crate::kprint!("bastion# ");
        let mut len = 0usize;

        loop {
            let c = keyboard::getchar();
            match c {
                b'\n' => {
                    console::write_byte(b'\n');
                    break;
                }
                0x08 => {
                    if len > 0 {
                        len -= 1;
                        console::write_byte(0x08);
                    }
                }
                0x20..=0x7E => {
                    if len < line.len() {
                        line[len] = c;
                        len += 1;
                        console::write_byte(c);
                    }
                }
                _ => {}
            }
        }

        if let Ok(text) = core::str::from_utf8(&line[..len]) {
            execute(text);
        }
    }
}
