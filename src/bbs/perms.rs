//! Permission bits used across the conferencing engine.
//!
//! Every conference carries a default mask; each membership may grant extra
//! bits or deny bits on top of it. The effective mask for a user is
//! `(default | grant) & !deny`. Use [permission_name] for display.

/// Permission bit constants
pub type PermissionMask = u8;

pub const READ: PermissionMask = 0b0001;
pub const WRITE: PermissionMask = 0b0010;
pub const REPLY: PermissionMask = 0b0100;
pub const ADMIN: PermissionMask = 0b1000;
pub const ALL: PermissionMask = READ | WRITE | REPLY | ADMIN;

/// Layer a membership's grant/deny pair over a conference default mask.
pub fn effective(default: PermissionMask, grant: PermissionMask, deny: PermissionMask) -> PermissionMask {
    (default | grant) & !deny
}

pub fn can_write(mask: PermissionMask) -> bool {
    mask & WRITE != 0
}

/// WRITE implies REPLY: a conference that accepts full posts from a user also
/// accepts their comments. REPLY alone covers the "only moderators post,
/// anyone may comment" setup.
pub fn can_reply(mask: PermissionMask) -> bool {
    mask & (REPLY | WRITE) != 0
}

pub fn can_admin(mask: PermissionMask) -> bool {
    mask & ADMIN != 0
}

/// Return the human-readable name for a single permission bit.
pub fn permission_name(bit: PermissionMask) -> &'static str {
    match bit {
        READ => "READ",
        WRITE => "WRITE",
        REPLY => "REPLY",
        ADMIN => "ADMIN",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_wins_over_grant() {
        let mask = effective(READ | WRITE, REPLY, WRITE);
        assert!(!can_write(mask));
        assert!(can_reply(mask)); // via the REPLY grant
        assert!(mask & READ != 0);
    }

    #[test]
    fn write_implies_reply() {
        assert!(can_reply(WRITE));
        assert!(can_reply(REPLY));
        assert!(!can_reply(READ));
    }
}
