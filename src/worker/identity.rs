use std::ffi::CString;

use nix::unistd::{self, Gid, Uid};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ClusterError, Result};

/// An OS account the worker acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    pub fn new(name: impl Into<String>, uid: u32, gid: u32) -> Self {
        Self {
            name: name.into(),
            uid,
            gid,
        }
    }
}

/// Resolves caller names to OS accounts.
///
/// Implementations must not cache: every invocation sees the current
/// account table.
pub trait UserDatabase: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Identity>;
}

/// The system account database (`getpwnam`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUsers;

impl UserDatabase for SystemUsers {
    fn lookup(&self, name: &str) -> Result<Identity> {
        match unistd::User::from_name(name) {
            Ok(Some(user)) => Ok(Identity::new(user.name, user.uid.as_raw(), user.gid.as_raw())),
            Ok(None) => Err(ClusterError::permission_denied(format!(
                "No local account for user {name}"
            ))
            .with_extra("user", name)),
            Err(e) => Err(ClusterError::permission_denied(format!(
                "Unable to look up user {name}: {e}"
            ))
            .with_extra("user", name)),
        }
    }
}

/// Changes the identity of the current process.
pub trait PrivilegeDrop: Send + Sync {
    /// Become `identity` for the rest of the process lifetime.
    fn drop_to(&self, identity: &Identity) -> Result<()>;
}

/// Irrevocable `setgid`/`setuid` drop.
///
/// Supplementary groups are replaced first, while the process can still do
/// so, then the group and user ids. The drop is verified by trying to regain
/// root.
#[derive(Debug, Clone, Copy, Default)]
pub struct Setuid;

impl PrivilegeDrop for Setuid {
    fn drop_to(&self, identity: &Identity) -> Result<()> {
        let denied = |what: &str, e: nix::Error| {
            ClusterError::permission_denied(format!(
                "Unable to change identity to {}: {what}: {e}",
                identity.name
            ))
            .with_extra("user", identity.name.as_str())
        };

        if identity.uid == 0 {
            return Err(ClusterError::permission_denied(format!(
                "Refusing to act as privileged account {}",
                identity.name
            ))
            .with_extra("user", identity.name.as_str()));
        }

        let uid = Uid::from_raw(identity.uid);
        let gid = Gid::from_raw(identity.gid);

        if unistd::geteuid().is_root() {
            let name = CString::new(identity.name.as_str()).map_err(|e| {
                ClusterError::permission_denied(format!("Invalid user name: {e}"))
                    .with_extra("user", identity.name.as_str())
            })?;
            unistd::initgroups(&name, gid).map_err(|e| denied("initgroups", e))?;
        }
        unistd::setgid(gid).map_err(|e| denied("setgid", e))?;
        unistd::setuid(uid).map_err(|e| denied("setuid", e))?;

        if unistd::setuid(Uid::from_raw(0)).is_ok() {
            return Err(ClusterError::permission_denied(format!(
                "Identity change to {} could be reverted",
                identity.name
            ))
            .with_extra("user", identity.name.as_str()));
        }

        info!(user = %identity.name, uid = identity.uid, "Dropped privileges");
        Ok(())
    }
}

/// Keeps the current identity. For single-user development setups only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDrop;

impl PrivilegeDrop for NoDrop {
    fn drop_to(&self, identity: &Identity) -> Result<()> {
        warn!(
            user = %identity.name,
            uid = identity.uid,
            "Privilege drop disabled; acting with the server's identity"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_account_resolves() {
        let identity = SystemUsers.lookup("root").unwrap();
        assert_eq!(identity.uid, 0);
        assert_eq!(identity.name, "root");
    }

    #[test]
    fn missing_account_is_permission_denied() {
        let err = SystemUsers.lookup("no-such-account-batchgate").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PermissionDenied);
        assert_eq!(
            err.extra("user").and_then(|v| v.as_str()),
            Some("no-such-account-batchgate")
        );
    }

    #[test]
    fn setuid_refuses_root_target() {
        let err = Setuid.drop_to(&Identity::new("root", 0, 0)).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PermissionDenied);
    }
}
