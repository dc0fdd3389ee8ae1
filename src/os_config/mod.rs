//! This module owns the OS level network configuration files: the
//! wpa_supplicant file, the dhcpcd file, and the backups of both plus the
//! connection store that are taken before a risky change.

mod conf_file;
pub mod dhcpcd;
pub mod supplicant;

use log::{info, warn};

pub use conf_file::ConfFile;
use conf_file::{copy_if_exists, remove_if_exists, rename_if_exists};
pub use dhcpcd::{DhcpcdConf, StanzaMarker};

use crate::{
    config::{PathConfig, SupplicantConfig},
    error::Result,
    net_data::{StaticIp, WifiProfile},
};

#[cfg(test)]
use mockall::automock;

/// Operations on the OS network configuration files.
#[cfg_attr(test, automock)]
pub trait OsConfigOps: Send + Sync + 'static {
    /// Blanks and regenerates the supplicant file from `profiles`.
    ///
    /// The country line of the current file is kept unless `country` is
    /// given, the configured default is used when neither exists.
    fn render_supplicant(
        &self, profiles: &[WifiProfile], country: Option<String>,
    ) -> Result<()>;

    /// The country code of the current supplicant file.
    fn read_country(&self) -> Result<Option<String>>;

    /// Rewrites the country line of the supplicant file.
    fn set_country(&self, code: &str) -> Result<()>;

    /// Appends a static stanza to the dhcpcd file.
    fn append_dhcp_stanza(
        &self, marker: &StanzaMarker, static_ip: &StaticIp,
    ) -> Result<()>;

    /// Removes the stanzas matching `marker`, returns how many were removed.
    fn remove_dhcp_stanza(&self, marker: &StanzaMarker) -> Result<usize>;

    /// Copies the connection store, supplicant and dhcpcd files to their
    /// backup paths.
    fn backup(&self) -> Result<()>;

    /// Deletes the live files and moves the backups back into place.
    fn restore(&self) -> Result<()>;
}

/// The config files at the paths of the application configuration.
pub struct OsConfig {
    paths: PathConfig,
    supplicant: SupplicantConfig,
    supplicant_file: ConfFile,
    dhcpcd_file: ConfFile,
}

impl OsConfig {
    pub fn new(paths: PathConfig, supplicant: SupplicantConfig) -> Self {
        let supplicant_file = ConfFile::from_path(&paths.supplicant_file);
        let dhcpcd_file = ConfFile::from_path(&paths.dhcpcd_file);
        Self { paths, supplicant, supplicant_file, dhcpcd_file }
    }

    fn backup_pairs(&self) -> [(&std::path::Path, &std::path::Path); 3] {
        [
            (
                self.paths.connections_file.as_path(),
                self.paths.connections_backup.as_path(),
            ),
            (
                self.paths.supplicant_file.as_path(),
                self.paths.supplicant_backup.as_path(),
            ),
            (
                self.paths.dhcpcd_file.as_path(),
                self.paths.dhcpcd_backup.as_path(),
            ),
        ]
    }

    fn edit_dhcpcd<R>(
        &self, f: impl FnOnce(&mut DhcpcdConf) -> Result<R>,
    ) -> Result<R> {
        let mut conf = DhcpcdConf::parse(&self.dhcpcd_file.read()?);
        let ret = f(&mut conf)?;
        self.dhcpcd_file.write(&conf.serialize())?;
        Ok(ret)
    }
}

impl OsConfigOps for OsConfig {
    fn render_supplicant(
        &self, profiles: &[WifiProfile], country: Option<String>,
    ) -> Result<()> {
        let country = match country {
            Some(country) => country,
            None => self
                .read_country()?
                .unwrap_or_else(|| self.supplicant.default_country.clone()),
        };

        info!(
            "Rendering supplicant file with {} network(s), country {}",
            profiles.len(),
            country
        );
        let content =
            supplicant::render(&self.supplicant.ctrl_interface, &country, profiles);
        self.supplicant_file.write(&content)
    }

    fn read_country(&self) -> Result<Option<String>> {
        Ok(supplicant::country_from(&self.supplicant_file.read()?))
    }

    fn set_country(&self, code: &str) -> Result<()> {
        info!("Setting supplicant country to {}", code);
        let content = self.supplicant_file.read()?;
        self.supplicant_file.write(&supplicant::with_country(&content, code))
    }

    fn append_dhcp_stanza(
        &self, marker: &StanzaMarker, static_ip: &StaticIp,
    ) -> Result<()> {
        info!("Appending dhcpcd stanza {:?}", marker);
        self.edit_dhcpcd(|conf| conf.append(marker, static_ip))
    }

    fn remove_dhcp_stanza(&self, marker: &StanzaMarker) -> Result<usize> {
        let removed = self.edit_dhcpcd(|conf| Ok(conf.remove(marker)))?;
        if removed == 0 {
            warn!("No dhcpcd stanza {:?} to remove", marker);
        } else {
            info!("Removed dhcpcd stanza {:?}", marker);
        }
        Ok(removed)
    }

    fn backup(&self) -> Result<()> {
        info!("Backing up network configuration files");
        for (live, backup) in self.backup_pairs() {
            if !copy_if_exists(live, backup)? {
                // no live file, so no backup either
                remove_if_exists(backup)?;
            }
        }
        Ok(())
    }

    fn restore(&self) -> Result<()> {
        warn!("Restoring network configuration files from backup");
        for (live, backup) in self.backup_pairs() {
            remove_if_exists(live)?;
            if !rename_if_exists(backup, live)? {
                warn!("No backup {:?} to restore", backup);
            }
        }
        Ok(())
    }
}
