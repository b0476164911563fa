//! Routing table from mount points to the sessions that own them.

use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

use thiserror::Error;

use crate::{message::MountPoint, session::SessionId};

/// Failure to change mount ownership.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MountError {
    /// Another session already owns the mount.
    #[error("{mount} is already owned by session {owner}")]
    AlreadyOwned {
        /// Contested mount.
        mount: MountPoint,
        /// Session currently holding it.
        owner: SessionId,
    },
    /// The caller does not own the mount it tried to release.
    #[error("{mount} is not owned by this session")]
    NotOwned {
        /// Mount named in the release.
        mount: MountPoint,
    },
}

/// Shared `mount → session` table.
///
/// Writers take the lock briefly; [`MountTable::resolve`] sees a consistent
/// snapshot under the read lock.
///
/// # Examples
///
/// ```
/// use hivewire::{message::MountPoint, registry::MountTable, session::SessionId};
///
/// let table = MountTable::new();
/// let owner = SessionId::generate();
/// table
///     .register(MountPoint::new("example.com", "/api"), owner)
///     .expect("free mount");
/// assert_eq!(table.resolve("example.com", "/api/users"), Some(owner));
/// assert_eq!(table.resolve("example.com", "/apix"), None);
/// ```
#[derive(Debug, Default)]
pub struct MountTable {
    inner: RwLock<BTreeMap<MountPoint, SessionId>>,
}

impl MountTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Claim `mount` for `session`.
    ///
    /// Registering a mount the session already owns succeeds without change.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::AlreadyOwned`] if a different session owns it.
    pub fn register(&self, mount: MountPoint, session: SessionId) -> Result<(), MountError> {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match table.get(&mount) {
            Some(owner) if *owner == session => Ok(()),
            Some(owner) => Err(MountError::AlreadyOwned {
                owner: *owner,
                mount,
            }),
            None => {
                table.insert(mount, session);
                Ok(())
            }
        }
    }

    /// Give up `mount` on behalf of `session`.
    ///
    /// # Errors
    ///
    /// Returns [`MountError::NotOwned`] unless `session` owns the mount.
    pub fn release(&self, mount: &MountPoint, session: SessionId) -> Result<(), MountError> {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if table.get(mount) == Some(&session) {
            table.remove(mount);
            Ok(())
        } else {
            Err(MountError::NotOwned {
                mount: mount.clone(),
            })
        }
    }

    /// Remove every mount owned by `session`, returning how many were held.
    pub fn release_all(&self, session: SessionId) -> usize {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = table.len();
        table.retain(|_, owner| *owner != session);
        before - table.len()
    }

    /// Owner of `mount`, if any.
    #[must_use]
    pub fn owner(&self, mount: &MountPoint) -> Option<SessionId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mount)
            .copied()
    }

    /// Mounts currently owned by `session`.
    #[must_use]
    pub fn mounts_of(&self, session: SessionId) -> Vec<MountPoint> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, owner)| **owner == session)
            .map(|(mount, _)| mount.clone())
            .collect()
    }

    /// Number of registered mounts.
    #[must_use]
    pub fn len(&self) -> usize { self.inner.read().unwrap_or_else(PoisonError::into_inner).len() }

    /// Whether no mounts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Route a request for `host` and `path` to the owning session.
    ///
    /// Mounts for exactly `host` are tried first; mounts registered with an
    /// empty host apply only when none of those match. Within a host, the
    /// longest matching path prefix wins.
    #[must_use]
    pub fn resolve(&self, host: &str, path: &str) -> Option<SessionId> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        longest_match(&table, host, path).or_else(|| longest_match(&table, "", path))
    }
}

fn longest_match(
    table: &BTreeMap<MountPoint, SessionId>,
    host: &str,
    path: &str,
) -> Option<SessionId> {
    table
        .iter()
        .filter(|(mount, _)| mount.host == host && prefix_matches(&mount.path, path))
        .max_by_key(|(mount, _)| mount.path.len())
        .map(|(_, owner)| *owner)
}

/// Whether `prefix` covers `path` on a segment boundary.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn owner() -> SessionId { SessionId::generate() }

    #[rstest]
    #[case("/api", "/api", true)]
    #[case("/api", "/api/users", true)]
    #[case("/api/", "/api/users", true)]
    #[case("/api", "/apix", false)]
    #[case("/api", "/", false)]
    #[case("/", "/anything", true)]
    #[case("", "/anything", true)]
    fn prefixes_match_on_segment_boundaries(
        #[case] prefix: &str,
        #[case] path: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(prefix_matches(prefix, path), expected);
    }

    #[rstest]
    fn conflicting_mount_is_rejected(owner: SessionId) {
        let table = MountTable::new();
        let mount = MountPoint::new("example.com", "/");
        table.register(mount.clone(), owner).expect("free mount");
        let rival = SessionId::generate();
        assert_eq!(
            table.register(mount.clone(), rival),
            Err(MountError::AlreadyOwned {
                mount: mount.clone(),
                owner,
            })
        );
        assert_eq!(table.owner(&mount), Some(owner));
    }

    #[rstest]
    fn repeated_registration_is_idempotent(owner: SessionId) {
        let table = MountTable::new();
        let mount = MountPoint::new("example.com", "/");
        table.register(mount.clone(), owner).expect("free mount");
        table.register(mount, owner).expect("same owner");
        assert_eq!(table.len(), 1);
    }

    #[rstest]
    fn only_the_owner_may_release(owner: SessionId) {
        let table = MountTable::new();
        let mount = MountPoint::new("example.com", "/");
        table.register(mount.clone(), owner).expect("free mount");
        assert_eq!(
            table.release(&mount, SessionId::generate()),
            Err(MountError::NotOwned {
                mount: mount.clone()
            })
        );
        table.release(&mount, owner).expect("owner releases");
        assert!(table.is_empty());
    }

    #[rstest]
    fn release_all_leaves_other_sessions(owner: SessionId) {
        let table = MountTable::new();
        let other = SessionId::generate();
        table
            .register(MountPoint::new("a", "/"), owner)
            .expect("mount a");
        table
            .register(MountPoint::new("b", "/"), owner)
            .expect("mount b");
        table
            .register(MountPoint::new("c", "/"), other)
            .expect("mount c");
        assert_eq!(table.release_all(owner), 2);
        assert!(table.mounts_of(owner).is_empty());
        assert_eq!(table.mounts_of(other), vec![MountPoint::new("c", "/")]);
    }

    #[test]
    fn longest_prefix_wins() {
        let table = MountTable::new();
        let root = SessionId::generate();
        let api = SessionId::generate();
        table
            .register(MountPoint::new("h", "/"), root)
            .expect("root");
        table
            .register(MountPoint::new("h", "/api"), api)
            .expect("api");
        assert_eq!(table.resolve("h", "/api/v1"), Some(api));
        assert_eq!(table.resolve("h", "/static"), Some(root));
    }

    #[test]
    fn exact_host_beats_wildcard() {
        let table = MountTable::new();
        let exact = SessionId::generate();
        let any = SessionId::generate();
        table
            .register(MountPoint::new("", "/api/v1"), any)
            .expect("wildcard");
        table
            .register(MountPoint::new("h", "/"), exact)
            .expect("exact");
        assert_eq!(table.resolve("h", "/api/v1"), Some(exact));
        assert_eq!(table.resolve("other", "/api/v1/x"), Some(any));
        assert_eq!(table.resolve("other", "/"), None);
    }
}
