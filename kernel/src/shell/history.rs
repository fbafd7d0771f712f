//! Command history and the audit trail.
//!
//! History keeps the last 64 distinct-from-previous commands; the audit
//! log keeps the last 128 commands with tick timestamps and the issuing
//! UID. Both are fed by `shell::execute`.

use alloc::collections::VecDeque;
use alloc::string::String;

use crate::arch::hal;
use crate::sync::spinlock::Spinlock;

const HISTORY_SIZE: usize = 64;
const AUDIT_SIZE: usize = 128;

pub struct AuditEntry {
    pub timestamp: u32,
    pub uid: u16,
    pub command: String,
}

static HISTORY: Spinlock<VecDeque<String>> = Spinlock::new(VecDeque::new());
static AUDIT: Spinlock<VecDeque<AuditEntry>> = Spinlock::new(VecDeque::new());

/// Record a command in the history ring. Immediate duplicates collapse.
pub fn add(command: &str) {
    if command.is_empty() {
        return;
    }
    let mut history = HISTORY.lock();
    if history.back().map(|last| last == command).unwrap_or(false) {
        return;
    }
    if history.len() >= HISTORY_SIZE {
        history.pop_front();
    }
    history.push_back(String::from(command));
}

/// Record a command in the audit trail.
pub fn audit(command: &str) {
    let mut audit = AUDIT.lock();
    if audit.len() >= AUDIT_SIZE {
        audit.pop_front();
    }
    audit.push_back(AuditEntry {
        timestamp: hal::get_ticks(),
        uid: crate::auth::current_uid(),
        command: String::from(command),
    });
}

/// Snapshot of the history, oldest first.
pub fn entries() -> alloc::vec::Vec<String> {
    HISTORY.lock().iter().cloned().collect()
}

/// The most recent `count` audit entries, oldest first.
pub fn audit_tail(count: usize) -> alloc::vec::Vec<(u32, u16, String)> {
    let audit = AUDIT.lock();
    let skip = audit.len().saturating_sub(count);
    audit
        .iter()
        .skip(skip)
        .map(|e| (e.timestamp, e.uid, e.command.clone()))
        .collect()
}

/// Reset both rings.
pub fn clear() {
    HISTORY.lock().clear();
    AUDIT.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn history_skips_immediate_duplicates_and_caps() {
        let _guard = crate::test_sync::lock();
        clear();

        add("ls");
        add("ls");
        add("pwd");
        assert_eq!(entries(), alloc::vec!["ls".to_string(), "pwd".to_string()]);

        for i in 0..2 * HISTORY_SIZE {
            add(&alloc::format!("cmd{}", i));
        }
        let all = entries();
        assert_eq!(all.len(), HISTORY_SIZE);
        assert_eq!(all.last().unwrap(), &alloc::format!("cmd{}", 2 * HISTORY_SIZE - 1));
    }

    #[test]
    fn audit_keeps_tail() {
        let _guard = crate::test_sync::lock();
        clear();
        for i in 0..AUDIT_SIZE + 10 {
            audit(&alloc::format!("a{}", i));
        }
        let tail = audit_tail(5);
        assert_eq!(tail.len(), 5);
        assert_eq!(tail.last().unwrap().2, alloc::format!("a{}", AUDIT_SIZE + 9));
    }
}
