//! This module defines the `ConnectionStoreOps` trait and the `NetData` struct
//! which provides the durable repository of known Wi-Fi and Ethernet profiles.
//!
//! Every mutating operation is a read-modify-write of the whole document. The
//! store has no transaction isolation: callers serialize access (see
//! `setup_queue`).

mod json_db;
mod schemas;

pub use json_db::{JsonDbOps, JsonFileDb};
use log::{info, warn};
pub use schemas::{
    ConnectionId, ConnectionKind, ConnectionStore, Encryption,
    EncryptionOptions, EthProfile, NetworkSetupId, Profile, StaticIp,
    WifiProfile, PREFERRED_PRIORITY,
};

#[cfg(test)]
pub use schemas::DEFAULT_PRIORITY;

use crate::error::{NetError, Result};

#[cfg(test)]
use mockall::automock;

/// Operations on the connection store.
#[cfg_attr(test, automock)]
pub trait ConnectionStoreOps: Send + Sync + 'static {
    /// Reads the whole store.
    ///
    /// # Errors
    ///
    /// Returns `NetError::Persistence` if the file is missing, unreadable or
    /// corrupt. Nothing is written in that case.
    fn load(&self) -> Result<ConnectionStore>;

    /// Atomically overwrites the whole store.
    fn save(&self, store: &ConnectionStore) -> Result<()>;

    /// Creates an empty store if none exists yet.
    fn ensure_exists(&self) -> Result<()>;

    fn find_by_id(&self, kind: ConnectionKind, id: &str)
        -> Result<Option<Profile>>;

    fn find_by_setup_id(
        &self, kind: ConnectionKind, setup_id: NetworkSetupId,
    ) -> Result<Option<Profile>>;

    /// Appends a Wi-Fi profile.
    fn add_wifi(&self, profile: WifiProfile) -> Result<()>;

    /// Appends an Ethernet profile, it becomes the only used one when its
    /// `is_used` flag is set.
    fn add_eth(&self, profile: EthProfile) -> Result<()>;

    /// Removes a profile, returning it if it was stored.
    fn remove(&self, kind: ConnectionKind, id: &str) -> Result<Option<Profile>>;

    fn set_priority(&self, id: &str, priority: u32) -> Result<bool>;

    /// Sets the priority of every Wi-Fi profile back to the default.
    fn reset_all_priorities(&self) -> Result<()>;

    /// Sets the used flag of an Ethernet profile, at most one stays used.
    fn set_used(&self, id: &str, is_used: bool) -> Result<bool>;

    fn set_network_setup_id(
        &self, kind: ConnectionKind, id: &str,
        setup_id: Option<NetworkSetupId>,
    ) -> Result<bool>;
}

/// The connection store backed by a JSON document.
pub struct NetData<Db> {
    data_db: Db,
}

impl<Db: JsonDbOps> NetData<Db> {
    pub fn new(data_db: Db) -> Self {
        Self { data_db }
    }

    fn modify<R>(&self, f: impl FnOnce(&mut ConnectionStore) -> R) -> Result<R> {
        let mut store = self.load()?;
        let ret = f(&mut store);
        self.save(&store)?;
        Ok(ret)
    }
}

impl<Db: JsonDbOps> ConnectionStoreOps for NetData<Db> {
    fn load(&self) -> Result<ConnectionStore> {
        match self.data_db.read::<ConnectionStore>()? {
            Some(store) => Ok(store),
            None => Err(NetError::Persistence(
                "connections file not found".to_string(),
            )
            .into()),
        }
    }

    fn save(&self, store: &ConnectionStore) -> Result<()> {
        self.data_db.write(store)
    }

    fn ensure_exists(&self) -> Result<()> {
        if self.data_db.read::<ConnectionStore>()?.is_none() {
            info!("Connections file not found, creating an empty one");
            self.data_db.write(&ConnectionStore::default())?;
        }
        Ok(())
    }

    fn find_by_id(
        &self, kind: ConnectionKind, id: &str,
    ) -> Result<Option<Profile>> {
        Ok(self.load()?.find_by_id(kind, id))
    }

    fn find_by_setup_id(
        &self, kind: ConnectionKind, setup_id: NetworkSetupId,
    ) -> Result<Option<Profile>> {
        Ok(self.load()?.find_by_setup_id(kind, setup_id))
    }

    fn add_wifi(&self, profile: WifiProfile) -> Result<()> {
        info!("Storing wifi connection {} ({})", profile.ssid, profile.id);
        self.modify(|store| store.wifi.push(profile))
    }

    fn add_eth(&self, profile: EthProfile) -> Result<()> {
        info!("Storing ethernet connection {}", profile.id);
        self.modify(|store| {
            if profile.is_used {
                store.reset_all_used();
            }
            store.eth.push(profile);
        })
    }

    fn remove(&self, kind: ConnectionKind, id: &str) -> Result<Option<Profile>> {
        let removed = self.modify(|store| store.remove(kind, id))?;
        if removed.is_none() {
            warn!("Connection {} of kind {:?} not found", id, kind);
        }
        Ok(removed)
    }

    fn set_priority(&self, id: &str, priority: u32) -> Result<bool> {
        self.modify(|store| store.set_priority(id, priority))
    }

    fn reset_all_priorities(&self) -> Result<()> {
        self.modify(|store| store.reset_all_priorities())
    }

    fn set_used(&self, id: &str, is_used: bool) -> Result<bool> {
        self.modify(|store| store.set_used(id, is_used))
    }

    fn set_network_setup_id(
        &self, kind: ConnectionKind, id: &str,
        setup_id: Option<NetworkSetupId>,
    ) -> Result<bool> {
        self.modify(|store| store.set_network_setup_id(kind, id, setup_id))
    }
}
