//! Session persistence
//!
//! Sessions are opaque blobs produced by the transport backend. They are
//! stored one file per phone identity so repeated runs skip the login flow.

use crate::error::{Error, Result};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Opaque serialized session
#[derive(Clone, PartialEq, Eq)]
pub struct Session(Vec<u8>);

impl Session {
    pub fn new(data: Vec<u8>) -> Self {
        Session(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Session bytes hold an auth key; never print them.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({} bytes)", self.0.len())
    }
}

/// Phone number reduced to its digits, used as the store key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneIdentity(String);

impl PhoneIdentity {
    /// Strip every non-digit character. Fails if nothing is left.
    pub fn from_phone(phone: &str) -> Result<Self> {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(Error::Config(format!(
                "phone number '{}' contains no digits",
                phone
            )));
        }
        Ok(PhoneIdentity(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for sessions keyed by phone identity
pub trait SessionStore: Send + Sync {
    /// Load the stored session, `None` if there is none yet
    fn load(&self, identity: &PhoneIdentity) -> Result<Option<Session>>;

    /// Persist a session, replacing any previous one
    fn save(&self, identity: &PhoneIdentity, session: &Session) -> Result<()>;
}

/// File-backed store: `<dir>/<digits>.session`
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        FileSessionStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the session file for an identity
    pub fn path_for(&self, identity: &PhoneIdentity) -> PathBuf {
        self.dir.join(format!("{}.session", identity.as_str()))
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Session(format!("failed to create {:?}: {}", self.dir, e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| Error::Session(format!("failed to restrict {:?}: {}", self.dir, e)))?;
        }

        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, identity: &PhoneIdentity) -> Result<Option<Session>> {
        let path = self.path_for(identity);
        match std::fs::read(&path) {
            Ok(data) => {
                debug!("Loaded session from {:?} ({} bytes)", path, data.len());
                Ok(Some(Session::new(data)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Session(format!("failed to read {:?}: {}", path, e))),
        }
    }

    fn save(&self, identity: &PhoneIdentity, session: &Session) -> Result<()> {
        self.ensure_dir()?;
        let path = self.path_for(identity);

        // Write to a sibling temp file and rename so a crash never leaves half a session
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| Error::Session(format!("failed to create temp file: {}", e)))?;
        tmp.write_all(session.as_bytes())
            .map_err(|e| Error::Session(format!("failed to write session: {}", e)))?;
        tmp.persist(&path)
            .map_err(|e| Error::Session(format!("failed to store {:?}: {}", path, e.error)))?;

        debug!("Saved session to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_strips_non_digits() {
        let id = PhoneIdentity::from_phone("+1 (555) 010-2030").unwrap();
        assert_eq!(id.as_str(), "15550102030");
    }

    #[test]
    fn test_identity_rejects_empty() {
        assert!(PhoneIdentity::from_phone("+--").is_err());
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let id = PhoneIdentity::from_phone("+15550102030").unwrap();

        assert!(store.load(&id).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"));
        let id = PhoneIdentity::from_phone("+15550102030").unwrap();

        store.save(&id, &Session::new(vec![1, 2, 3])).unwrap();
        let loaded = store.load(&id).unwrap().unwrap();

        assert_eq!(loaded.as_bytes(), &[1, 2, 3]);
        assert!(store.path_for(&id).ends_with("15550102030.session"));
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let id = PhoneIdentity::from_phone("15550102030").unwrap();

        store.save(&id, &Session::new(vec![1])).unwrap();
        store.save(&id, &Session::new(vec![2, 2])).unwrap();

        assert_eq!(store.load(&id).unwrap().unwrap().into_bytes(), vec![2, 2]);
    }

    #[test]
    fn test_debug_hides_bytes() {
        let session = Session::new(vec![0xAA; 16]);
        assert_eq!(format!("{:?}", session), "Session(16 bytes)");
    }
}
