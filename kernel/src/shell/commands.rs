//! Built-in shell commands.
//!
//! Each handler takes the raw argument string. Malformed arguments print
//! a `Usage:` line and change nothing; privileged actions check for root
//! before any side effect.

use alloc::string::String;

use crate::drivers::console::Color;
use crate::fs::ramfs::{self, FsError};
use crate::net;
use crate::net::types::Ipv4Addr;
use crate::{kprint, kprintln, kprintln_color};

fn fs_error_text(err: FsError) -> &'static str {
    match err {
        FsError::NotFound => "No such file or directory",
        FsError::NotADirectory => "Not a directory",
        FsError::IsADirectory => "Is a directory",
        FsError::Exists => "File exists",
        FsError::Full => "Filesystem full",
        FsError::Root => "Cannot remove root",
        FsError::BadName => "Invalid name",
    }
}

fn require_root() -> bool {
    if crate::auth::is_root() {
        true
    } else {
        kprintln_color!(Color::LightRed, "Permission denied");
        false
    }
}

// ── General ─────────────────────────────────────────────────────────

pub fn cmd_help(_args: &str) {
    kprintln_color!(Color::Cyan, "Bastion OS commands");
    kprintln!();
    kprintln_color!(Color::Yellow, "General:");
    kprintln!("  help echo clear version uname uptime free halt reboot");
    kprintln_color!(Color::Yellow, "Files:");
    kprintln!("  ls cat cd pwd mkdir touch rm head tail wc grep");
    kprintln!("  stat find df hexdump");
    kprintln_color!(Color::Yellow, "Processes:");
    kprintln!("  ps kill");
    kprintln_color!(Color::Yellow, "Users:");
    kprintln!("  whoami su history audit");
    kprintln_color!(Color::Yellow, "Network:");
    kprintln!("  nifconfig narp nping ndns nnetstat");
    kprintln!();
    kprintln!("Operators: | > >> < && || ;");
}

pub fn cmd_echo(args: &str) {
    kprintln!("{}", args);
}

pub fn cmd_clear(_args: &str) {
    crate::drivers::console::clear();
}

pub fn cmd_version(_args: &str) {
    kprintln!("Bastion OS v0.1");
}

pub fn cmd_uname(_args: &str) {
    kprintln!("BastionOS bastion 0.1 i686");
}

pub fn cmd_uptime(_args: &str) {
    let ticks = crate::arch::hal::get_ticks();
    let secs = ticks / 100;
    kprintln!("up {}:{:02}:{:02} ({} ticks)", secs / 3600, (secs / 60) % 60, secs % 60, ticks);
}

pub fn cmd_free(_args: &str) {
    let (allocated, free) = crate::memory::heap::stats();
    kprintln!("heap:  {} bytes used, {} bytes free", allocated, free);
    kprintln!("pages: {} free ({} KiB)",
        crate::memory::physical::free_page_count(),
        crate::memory::physical::free_bytes() / 1024);
}

pub fn cmd_halt(_args: &str) {
    if !require_root() {
        return;
    }
    kprintln_color!(Color::Yellow, "System halted.");
    #[cfg(target_os = "none")]
    loop {
        unsafe { core::arch::asm!("cli; hlt") }
    }
}

pub fn cmd_reboot(_args: &str) {
    if !require_root() {
        return;
    }
    kprintln!("Rebooting...");
    #[cfg(target_os = "none")]
    unsafe {
        // Pulse the keyboard controller reset line.
        while crate::arch::x86::port::inb(0x64) & 0x02 != 0 {}
        crate::arch::x86::port::outb(0x64, 0xFE);
        core::arch::asm!("cli; hlt");
    }
}

// ── Filesystem ──────────────────────────────────────────────────────

pub fn cmd_ls(args: &str) {
    match ramfs::list(args.trim()) {
        Ok(entries) => {
            if entries.is_empty() {
                kprintln!("(empty)");
                return;
            }
            for e in entries {
                if e.is_dir {
                    kprintln_color!(Color::Cyan, "{}/", e.name);
                } else {
                    kprintln!("{:<20} {} bytes", e.name, e.size);
                }
            }
        }
        Err(err) => kprintln!("ls: {}: {}", args.trim(), fs_error_text(err)),
    }
}

pub fn cmd_cat(args: &str) {
    let path = args.trim();
    if path.is_empty() {
        kprintln!("Usage: cat <file>");
        return;
    }
    match ramfs::read(path) {
        Ok(data) => {
            let text = String::from_utf8_lossy(&data);
            kprint!("{}", text);
            if !text.ends_with('\n') && !text.is_empty() {
                kprintln!();
            }
        }
        Err(err) => kprintln!("cat: {}: {}", path, fs_error_text(err)),
    }
}

pub fn cmd_cd(args: &str) {
    let path = if args.trim().is_empty() { "/" } else { args.trim() };
    if let Err(err) = ramfs::chdir(path) {
        kprintln!("cd: {}: {}", path, fs_error_text(err));
    }
}

pub fn cmd_pwd(_args: &str) {
    kprintln!("{}", ramfs::getcwd());
}

pub fn cmd_mkdir(args: &str) {
    let name = args.trim();
    if name.is_empty() {
        kprintln!("Usage: mkdir <name>");
        return;
    }
    if let Err(err) = ramfs::mkdir(name) {
        kprintln!("mkdir: {}: {}", name, fs_error_text(err));
    }
}

pub fn cmd_touch(args: &str) {
    let name = args.trim();
    if name.is_empty() {
        kprintln!("Usage: touch <name>");
        return;
    }
    match ramfs::touch(name) {
        Ok(()) | Err(FsError::Exists) => {}
        Err(err) => kprintln!("touch: {}: {}", name, fs_error_text(err)),
    }
}

pub fn cmd_rm(args: &str) {
    let mut recursive = false;
    let mut target = args.trim();
    if let Some(rest) = target.strip_prefix("-rf") {
        recursive = true;
        target = rest.trim();
    } else if let Some(rest) = target.strip_prefix("-r") {
        recursive = true;
        target = rest.trim();
    }
    if target.is_empty() {
        kprintln!("Usage: rm [-rf] <file>");
        return;
    }
    match ramfs::remove(target, recursive) {
        Ok(()) => {}
        Err(FsError::IsADirectory) => {
            kprintln!("rm: {}: Is a directory (use -rf)", target)
        }
        Err(err) => kprintln!("rm: {}: {}", target, fs_error_text(err)),
    }
}

fn read_text_file(cmd: &str, path: &str) -> Option<String> {
    match ramfs::read(path) {
        Ok(data) => Some(String::from_utf8_lossy(&data).into_owned()),
        Err(err) => {
            kprintln!("{}: {}: {}", cmd, path, fs_error_text(err));
            None
        }
    }
}

pub fn cmd_head(args: &str) {
    let mut parts = args.split_whitespace();
    let path = match parts.next() {
        Some(p) => p,
        None => {
            kprintln!("Usage: head <file> [lines]");
            return;
        }
    };
    let n: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(10);
    if let Some(text) = read_text_file("head", path) {
        for line in text.lines().take(n) {
            kprintln!("{}", line);
        }
    }
}

pub fn cmd_tail(args: &str) {
    let mut parts = args.split_whitespace();
    let path = match parts.next() {
        Some(p) => p,
        None => {
            kprintln!("Usage: tail <file> [lines]");
            return;
        }
    };
    let n: usize = parts.next().and_then(|s| s.parse().ok()).unwrap_or(10);
    if let Some(text) = read_text_file("tail", path) {
        let total = text.lines().count();
        for line in text.lines().skip(total.saturating_sub(n)) {
            kprintln!("{}", line);
        }
    }
}

pub fn cmd_wc(args: &str) {
    let path = args.trim();
    if path.is_empty() {
        kprintln!("Usage: wc <file>");
        return;
    }
    if let Some(text) = read_text_file("wc", path) {
        let lines = text.matches('\n').count();
        let words = text.split_whitespace().count();
        kprintln!("{} {} {} {}", lines, words, text.len(), path);
    }
}

pub fn cmd_grep(args: &str) {
    let (pattern, path) = match args.trim().split_once(' ') {
        Some((p, f)) => (p, f.trim()),
        None => {
            kprintln!("Usage: grep <pattern> <file>");
            return;
        }
    };
    if let Some(text) = read_text_file("grep", path) {
        for line in text.lines() {
            if line.contains(pattern) {
                kprintln!("{}", line);
            }
        }
    }
}

pub fn cmd_stat(args: &str) {
    let path = args.trim();
    if path.is_empty() {
        kprintln!("Usage: stat <file>");
        return;
    }
    match ramfs::stat(path) {
        Ok(info) => {
            kprintln!("  File: {}", info.name);
            kprintln!("  Size: {} bytes", info.size);
            kprintln!("  Type: {}", if info.is_dir { "directory" } else { "regular file" });
            kprintln!("  Inode: {}  Parent: {}", info.index, info.parent);
            kprintln!("  Created: tick {}  Modified: tick {}", info.created, info.modified);
        }
        Err(err) => kprintln!("stat: {}: {}", path, fs_error_text(err)),
    }
}

fn find_walk(dir_path: &str, pattern: &str) {
    let entries = match ramfs::list(dir_path) {
        Ok(e) => e,
        Err(_) => return,
    };
    for e in entries {
        let full = if dir_path == "/" {
            alloc::format!("/{}", e.name)
        } else {
            alloc::format!("{}/{}", dir_path, e.name)
        };
        if pattern.is_empty() || e.name.contains(pattern) {
            if e.is_dir {
                kprintln!("{}/", full);
            } else {
                kprintln!("{}", full);
            }
        }
        if e.is_dir {
            find_walk(&full, pattern);
        }
    }
}

pub fn cmd_find(args: &str) {
    // find [path] [-name <pattern>]
    let mut path = "/";
    let mut pattern = "";
    let mut parts = args.split_whitespace().peekable();
    if let Some(&first) = parts.peek() {
        if !first.starts_with('-') {
            path = first;
            parts.next();
        }
    }
    while let Some(tok) = parts.next() {
        if tok == "-name" {
            pattern = parts.next().unwrap_or("");
        }
    }
    find_walk(path, pattern);
}

pub fn cmd_df(_args: &str) {
    let (used, dirs, files, bytes) = ramfs::usage();
    kprintln!("Filesystem      Size    Used   Mounted on");
    kprintln!(
        "ramfs           {}K    {}K     /",
        ramfs::MAX_NODES * ramfs::MAX_DATA / 1024,
        bytes / 1024
    );
    kprintln!(
        "Inodes: {}/{} used ({} dirs, {} files)",
        used,
        ramfs::MAX_NODES,
        dirs,
        files
    );
}

pub fn cmd_hexdump(args: &str) {
    let path = args.trim();
    if path.is_empty() {
        kprintln!("Usage: hexdump <file>");
        return;
    }
    let data = match ramfs::read(path) {
        Ok(d) => d,
        Err(err) => {
            kprintln!("hexdump: {}: {}", path, fs_error_text(err));
            return;
        }
    };
    for (i, chunk) in data.chunks(16).enumerate() {
        kprint!("{:08x}  ", i * 16);
        for j in 0..16 {
            match chunk.get(j) {
                Some(b) => kprint!("{:02x} ", b),
                None => kprint!("   "),
            }
            if j == 7 {
                kprint!(" ");
            }
        }
        kprint!(" |");
        for b in chunk {
            let c = if b.is_ascii_graphic() || *b == b' ' { *b as char } else { '.' };
            kprint!("{}", c);
        }
        kprintln!("|");
    }
}

// ── Processes ───────────────────────────────────────────────────────

pub fn cmd_ps(_args: &str) {
    kprintln!("  PID  PPID  STATE     TIME  NAME");
    for p in crate::task::scheduler::process_list() {
        kprintln!(
            "{:5} {:5}  {:<8} {:5}  {}",
            p.pid,
            p.ppid,
            p.state_str(),
            p.total_time,
            p.name_str()
        );
    }
}

pub fn cmd_kill(args: &str) {
    // kill [-signal] <pid>
    let mut sig = crate::ipc::signal::SIGTERM;
    let mut parts = args.split_whitespace().peekable();
    if let Some(&first) = parts.peek() {
        if let Some(num) = first.strip_prefix('-') {
            match num.parse::<u32>() {
                Ok(n) => {
                    sig = n;
                    parts.next();
                }
                Err(_) => {
                    kprintln!("Usage: kill [-signal] <pid>");
                    return;
                }
            }
        }
    }
    let pid: u32 = match parts.next().and_then(|s| s.parse().ok()) {
        Some(p) if p != 0 => p,
        _ => {
            kprintln!("Usage: kill [-signal] <pid>");
            return;
        }
    };

    if crate::ipc::signal::send(pid, sig) == 0 {
        kprintln!("Sent signal {} to PID {}", sig, pid);
    } else {
        kprintln!("kill: failed to signal PID {}", pid);
    }
}

// ── Users, history, audit ───────────────────────────────────────────

pub fn cmd_whoami(_args: &str) {
    kprintln!("{}", crate::auth::current_user());
}

pub fn cmd_su(args: &str) {
    let mut parts = args.split_whitespace();
    let (user, pass) = match (parts.next(), parts.next()) {
        (Some(u), Some(p)) => (u, p),
        _ => {
            kprintln!("Usage: su <user> <password>");
            return;
        }
    };
    if crate::auth::su(user, pass) {
        kprintln!("Switched to {}", user);
    } else {
        kprintln_color!(Color::LightRed, "su: Authentication failure");
    }
}

pub fn cmd_history(_args: &str) {
    for (i, cmd) in super::history::entries().iter().enumerate() {
        kprintln!("{:4}  {}", i + 1, cmd);
    }
}

pub fn cmd_audit(args: &str) {
    if !require_root() {
        return;
    }
    let count: usize = args.trim().parse().unwrap_or(20);
    kprintln!("Tick       UID  Command");
    for (tick, uid, cmd) in super::history::audit_tail(count) {
        kprintln!("{:10} {:4} {}", tick, uid, cmd);
    }
}

// ── Network ─────────────────────────────────────────────────────────

pub fn cmd_nifconfig(args: &str) {
    let args = args.trim();
    if args.is_empty() {
        let cfg = net::config();
        kprintln!("eth0:");
        kprintln!("  MAC:     {}", cfg.mac);
        kprintln!("  IPv4:    {}", cfg.ip);
        kprintln!("  Netmask: {}", cfg.mask);
        kprintln!("  Gateway: {}", cfg.gateway);
        kprintln!("  DNS:     {}", cfg.dns);
        return;
    }

    if !require_root() {
        return;
    }
    let (what, value) = match args.split_once(' ') {
        Some((w, v)) => (w, v.trim()),
        None => {
            kprintln!("Usage: nifconfig [ip|mask|gateway|dns <addr>]");
            return;
        }
    };
    let addr = match Ipv4Addr::parse(value) {
        Some(a) => a,
        None => {
            kprintln!("nifconfig: invalid address: {}", value);
            return;
        }
    };
    match what {
        "ip" => net::set_ip(addr),
        "mask" => net::set_netmask(addr),
        "gateway" => net::set_gateway(addr),
        "dns" => net::set_dns(addr),
        _ => {
            kprintln!("Usage: nifconfig [ip|mask|gateway|dns <addr>]");
            return;
        }
    }
    kprintln!("{} set to {}", what, addr);
}

pub fn cmd_narp(_args: &str) {
    let entries = net::arp::entries();
    kprintln!("IP Address       MAC Address");
    if entries.is_empty() {
        kprintln!("(empty)");
        return;
    }
    for (ip, mac) in entries {
        kprintln!("{:<16} {}", alloc::format!("{}", ip), mac);
    }
}

pub fn cmd_nping(args: &str) {
    let target = args.trim();
    if target.is_empty() {
        kprintln!("Usage: nping <ip>");
        kprintln!("Example: nping 127.0.0.1 (loopback)");
        return;
    }
    let ip = match Ipv4Addr::parse(target) {
        Some(a) => a,
        None => {
            kprintln!("nping: invalid address: {}", target);
            return;
        }
    };

    kprintln!("PING {}", ip);

    let cfg = net::config();
    let local = ip.is_loopback() || ip == cfg.ip;

    let mut sent = 0u32;
    let mut received = 0u32;
    for seq in 1..=4u16 {
        sent += 1;
        if local {
            // Loopback: answered in place, no frames on the wire.
            kprintln!("Reply: seq={} loopback", seq);
            received += 1;
            continue;
        }
        match net::icmp::ping(ip, seq) {
            Ok(rtt) => {
                kprintln!("Reply: seq={} time={}ms", seq, rtt);
                received += 1;
            }
            Err(net::icmp::PingError::ArpFailed) => {
                kprintln!("ARP failed");
                break;
            }
            Err(net::icmp::PingError::Timeout) => kprintln!("Timeout"),
        }
    }

    kprintln!();
    kprintln!("--- statistics ---");
    kprintln!("sent={} recv={}", sent, received);
}

pub fn cmd_ndns(args: &str) {
    let host = args.trim();
    if host.is_empty() {
        kprintln!("Usage: ndns <hostname>");
        return;
    }
    match net::dns::lookup(host) {
        Ok(ip) => kprintln!("{} has address {}", host, ip),
        Err(net::dns::DnsError::NoSocket) => kprintln!("ndns: no socket available"),
        Err(net::dns::DnsError::SendFailed) => kprintln!("ndns: query send failed"),
        Err(net::dns::DnsError::Timeout) => kprintln!("ndns: query timed out"),
        Err(net::dns::DnsError::BadResponse) => kprintln!("ndns: malformed response"),
        Err(net::dns::DnsError::NoRecord) => kprintln!("ndns: no A record for {}", host),
    }
}

pub fn cmd_nnetstat(_args: &str) {
    let conns = net::tcp::connections();
    kprintln!("Proto  Local      Remote                State");
    if conns.is_empty() {
        kprintln!("(no connections)");
        return;
    }
    for c in conns {
        kprintln!(
            "tcp    :{:<9} {:<21} {}",
            c.local_port,
            alloc::format!("{}:{}", c.remote_ip, c.remote_port),
            net::tcp::state_name(c.state)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(line: &str) -> String {
        crate::shell::execute(line);
        crate::drivers::console::take_screen()
    }

    fn setup() {
        crate::drivers::netdev::register_test_nic();
        crate::net::init();
        crate::fs::ramfs::init();
        crate::auth::init();
        crate::task::init();
        crate::shell::history::clear();
        let _ = crate::drivers::console::take_screen();
    }

    #[test]
    fn nping_loopback_answers_without_frames() {
        let _guard = crate::test_sync::lock();
        setup();
        crate::drivers::netdev::take_tx_frames();

        let out = run("nping 127.0.0.1");
        assert_eq!(out.matches("Reply:").count(), 4);
        assert!(out.contains("sent=4 recv=4"));
        assert!(crate::drivers::netdev::take_tx_frames().is_empty());

        // Our own address short-circuits the same way.
        let out = run("nping 10.0.0.2");
        assert!(out.contains("sent=4 recv=4"));
        assert!(crate::drivers::netdev::take_tx_frames().is_empty());
    }

    #[test]
    fn permission_gate_blocks_non_root() {
        let _guard = crate::test_sync::lock();
        setup();

        run("su guest guest");
        let out = run("nifconfig ip 10.0.0.50");
        assert!(out.contains("Permission denied"));
        // Address unchanged: rejection happened before side effects.
        assert_eq!(crate::net::config().ip, Ipv4Addr::new(10, 0, 0, 2));

        let out = run("audit");
        assert!(out.contains("Permission denied"));

        run("su root root");
        run("nifconfig ip 10.0.0.50");
        assert_eq!(crate::net::config().ip, Ipv4Addr::new(10, 0, 0, 50));
        crate::net::set_ip(Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn usage_lines_on_malformed_arguments() {
        let _guard = crate::test_sync::lock();
        setup();

        assert!(run("cat").contains("Usage: cat"));
        assert!(run("mkdir").contains("Usage: mkdir"));
        assert!(run("kill").contains("Usage: kill"));
        assert!(run("kill -x 5").contains("Usage: kill"));
        assert!(run("nping").contains("Usage: nping"));
        assert!(run("grep onlypattern").contains("Usage: grep"));
    }

    #[test]
    fn file_commands_roundtrip() {
        let _guard = crate::test_sync::lock();
        setup();

        run("cd /tmp");
        run("mkdir box");
        run("cd box");
        crate::fs::ramfs::write("lines.txt", b"alpha\nbeta\ngamma\n").unwrap();

        assert_eq!(run("pwd"), "/tmp/box\n");
        assert_eq!(run("grep beta lines.txt"), "beta\n");
        assert_eq!(run("head lines.txt 1"), "alpha\n");
        assert_eq!(run("tail lines.txt 1"), "gamma\n");
        assert_eq!(run("wc lines.txt"), "3 3 17 lines.txt\n");
        assert!(run("ls").contains("lines.txt"));

        run("cd /tmp");
        run("rm -rf box");
        assert!(crate::fs::ramfs::resolve("/tmp/box").is_none());
        run("cd /");
    }

    #[test]
    fn unknown_command_reported() {
        let _guard = crate::test_sync::lock();
        setup();
        assert!(run("frobnicate").contains("Unknown"));
    }

    #[test]
    fn history_and_audit_record_commands() {
        let _guard = crate::test_sync::lock();
        setup();

        run("echo one");
        run("echo two");
        let out = run("history");
        assert!(out.contains("echo one"));
        assert!(out.contains("echo two"));

        let out = run("audit 50");
        assert!(out.contains("echo one"));
    }
}
