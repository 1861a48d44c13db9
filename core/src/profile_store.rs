/// Local persisted state — identity token and current-user record (sled)
use crate::error::{AmoraError, Result};
use crate::geo::Coordinate;
use serde::{Deserialize, Serialize};
use std::path::Path;

const IDENTITY_KEY: &[u8] = b"identity";

/// Minimal current-user record the session needs before connecting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentUser {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
}

/// What the login flow leaves behind for the session to pick up
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredIdentity {
    pub token: String,
    pub user: CurrentUser,
}

pub struct ProfileStore {
    db: sled::Db,
}

impl ProfileStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("profile.db"))
            .map_err(|e| AmoraError::Storage(format!("profile DB: {}", e)))?;
        Ok(Self { db })
    }

    pub fn save_identity(&self, identity: &StoredIdentity) -> Result<()> {
        let val = serde_json::to_vec(identity).map_err(AmoraError::Serialization)?;
        self.db
            .insert(IDENTITY_KEY, val)
            .map_err(|e| AmoraError::Storage(format!("save_identity: {}", e)))?;
        Ok(())
    }

    pub fn load_identity(&self) -> Result<Option<StoredIdentity>> {
        match self
            .db
            .get(IDENTITY_KEY)
            .map_err(|e| AmoraError::Storage(format!("load_identity: {}", e)))?
        {
            Some(val) => {
                let identity =
                    serde_json::from_slice::<StoredIdentity>(&val).map_err(AmoraError::Serialization)?;
                Ok(Some(identity))
            }
            None => Ok(None),
        }
    }

    /// Logout: drop the token and user record. Returns whether one existed.
    pub fn clear_identity(&self) -> Result<bool> {
        let removed = self
            .db
            .remove(IDENTITY_KEY)
            .map_err(|e| AmoraError::Storage(format!("clear_identity: {}", e)))?;
        Ok(removed.is_some())
    }
}

impl Clone for ProfileStore {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> StoredIdentity {
        StoredIdentity {
            token: "token-123".to_string(),
            user: CurrentUser {
                user_id: "u1".to_string(),
                display_name: "Sam".to_string(),
                coordinate: Some(Coordinate::new(40.7, -74.0)),
            },
        }
    }

    #[test]
    fn test_save_and_load_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path()).unwrap();

        assert!(store.load_identity().unwrap().is_none());
        store.save_identity(&identity()).unwrap();
        assert_eq!(store.load_identity().unwrap(), Some(identity()));
    }

    #[test]
    fn test_clear_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path()).unwrap();

        store.save_identity(&identity()).unwrap();
        assert!(store.clear_identity().unwrap());
        assert!(!store.clear_identity().unwrap());
        assert!(store.load_identity().unwrap().is_none());
    }
}
