//! User identity: a small fixed account table and the current-user state.
//!
//! Exists so privileged commands (halt, reboot, interface configuration,
//! audit access) have a real gate. The password hash is a mixing hash,
//! not a cryptographic one.

use crate::sync::spinlock::Spinlock;

const MIX_K: [u32; 16] = [
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5, 0x3956c25b, 0x59f111f1,
    0x923f82a4, 0xab1c5ed5, 0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3,
    0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
];

/// Mixing hash over a password. Not cryptographically secure.
pub fn password_hash(password: &str) -> u32 {
    let mut hash: u32 = 0x12345678;
    for (i, byte) in password.bytes().enumerate() {
        hash ^= (byte as u32) << ((i % 4) * 8);
        hash = hash.rotate_left(5);
        hash ^= MIX_K[i % 16];
    }
    hash ^= hash >> 16;
    hash = hash.wrapping_mul(0x85eb_ca6b);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(0xc2b2_ae35);
    hash ^= hash >> 16;
    hash
}

#[derive(Clone, Copy)]
struct User {
    name: &'static str,
    uid: u16,
    pass_hash: u32,
}

struct AuthState {
    users: [User; 2],
    current: usize,
}

static AUTH: Spinlock<AuthState> = Spinlock::new(AuthState {
    users: [
        User { name: "root", uid: 0, pass_hash: 0 },
        User { name: "guest", uid: 1000, pass_hash: 0 },
    ],
    current: 0,
});

/// Seed default credentials and start as root (single-console system).
pub fn init() {
    let mut auth = AUTH.lock();
    auth.users[0].pass_hash = password_hash("root");
    auth.users[1].pass_hash = password_hash("guest");
    auth.current = 0;
}

/// Name of the active user.
pub fn current_user() -> &'static str {
    let auth = AUTH.lock();
    auth.users[auth.current].name
}

pub fn current_uid() -> u16 {
    let auth = AUTH.lock();
    auth.users[auth.current].uid
}

/// True when the active user is root.
pub fn is_root() -> bool {
    current_uid() == 0
}

/// Switch users with a password check. Returns false on bad credentials.
pub fn su(name: &str, password: &str) -> bool {
    let mut auth = AUTH.lock();
    let idx = match auth.users.iter().position(|u| u.name == name) {
        Some(i) => i,
        None => return false,
    };
    if auth.users[idx].pass_hash != password_hash(password) {
        return false;
    }
    auth.current = idx;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_differs_per_input() {
        assert_ne!(password_hash("root"), password_hash("toor"));
        assert_ne!(password_hash("a"), password_hash("b"));
        assert_eq!(password_hash("same"), password_hash("same"));
    }

    #[test]
    fn su_checks_credentials() {
        let _guard = crate::test_sync::lock();
        init();
        assert!(is_root());

        assert!(!su("guest", "wrong"));
        assert!(is_root());

        assert!(su("guest", "guest"));
        assert!(!is_root());
        assert_eq!(current_user(), "guest");
        assert_eq!(current_uid(), 1000);

        assert!(!su("nobody", "x"));
        assert!(su("root", "root"));
        assert!(is_root());
    }
}
