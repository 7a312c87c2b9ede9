//! # Shop Records on Disk
//!
//! One TOML file per shop under the data directory, named by shop id:
//!
//! ```text
//! data/shops/
//!   shop_00000001.toml
//!   shop_00000002.toml
//! ```
//!
//! Each file carries a format version, the shop body as the exact TOML
//! text the writer produced, and a crc32 over those body bytes, so a torn
//! or bit-rotted file is detected on load instead of silently producing a
//! broken shop. Writes go through a temp file in the same directory,
//! fsync, then atomic rename, so a crash mid-write leaves the previous
//! version intact.
//!
//! `load_all` is deliberately forgiving: a record that fails checksum or
//! structural validation is skipped and reported, never deleted, and
//! never aborts the load of the remaining records. Unknown TOML keys are
//! ignored so records written by a newer version still load.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tradepost_shared::ShopId;

use crate::error::{TradeError, TradeResult};
use crate::shop::Shop;

/// Record format version. Bump on incompatible layout changes.
const RECORD_VERSION: u32 = 1;

/// Serialized form of one shop, as stored on disk.
///
/// The body is kept as the exact TOML text the writer produced and the
/// checksum covers those bytes, never a reserialization. A record written
/// by a newer version with extra keys in the body therefore still
/// verifies; serde ignores the keys it does not know.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShopRecord {
    /// Format version the record was written with.
    pub version: u32,
    /// crc32 of `body`, exactly as stored.
    pub checksum: u32,
    /// TOML-serialized shop state.
    pub body: String,
}

impl ShopRecord {
    /// Wraps a shop snapshot in a checksummed record.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the shop fails to serialize.
    pub fn seal(shop: &Shop) -> TradeResult<Self> {
        let body = toml::to_string(shop)
            .map_err(|e| TradeError::PersistenceFailure(format!("serialize shop: {e}")))?;
        Ok(Self {
            version: RECORD_VERSION,
            checksum: crc32fast::hash(body.as_bytes()),
            body,
        })
    }

    /// Verifies version and checksum, then parses the shop out of the body.
    ///
    /// # Errors
    ///
    /// Returns `CorruptRecord` on any mismatch.
    pub fn open(self, path: &Path) -> TradeResult<Shop> {
        if self.version > RECORD_VERSION {
            return Err(TradeError::CorruptRecord {
                path: path.display().to_string(),
                reason: format!(
                    "record version {} is newer than supported {RECORD_VERSION}",
                    self.version
                ),
            });
        }
        let computed = crc32fast::hash(self.body.as_bytes());
        if computed != self.checksum {
            return Err(TradeError::CorruptRecord {
                path: path.display().to_string(),
                reason: format!("checksum mismatch: stored {:08x}, computed {computed:08x}", self.checksum),
            });
        }
        let shop: Shop = toml::from_str(&self.body).map_err(|e| TradeError::CorruptRecord {
            path: path.display().to_string(),
            reason: format!("parse body: {e}"),
        })?;
        validate_shop(&shop, path)?;
        Ok(shop)
    }
}

/// Structural validation beyond what serde enforces.
fn validate_shop(shop: &Shop, path: &Path) -> TradeResult<()> {
    if shop.id == 0 {
        return Err(TradeError::CorruptRecord {
            path: path.display().to_string(),
            reason: "shop id 0 is reserved".to_string(),
        });
    }
    for offer in shop.offers.iter() {
        if offer.costs.is_empty() || offer.rewards.is_empty() {
            return Err(TradeError::CorruptRecord {
                path: path.display().to_string(),
                reason: format!("offer {} has an empty side", offer.id),
            });
        }
    }
    Ok(())
}

/// Result of loading the data directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Successfully loaded shops.
    pub shops: Vec<Shop>,
    /// Paths skipped as corrupt, with the reason.
    pub skipped: Vec<(PathBuf, TradeError)>,
}

/// File-per-shop store rooted at a data directory.
#[derive(Debug)]
pub struct ShopStore {
    dir: PathBuf,
}

impl ShopStore {
    /// Opens (creating if needed) the data directory.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> TradeResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| TradeError::PersistenceFailure(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// Path of the record file for a shop id.
    #[must_use]
    pub fn record_path(&self, shop_id: ShopId) -> PathBuf {
        self.dir.join(format!("shop_{shop_id:08}.toml"))
    }

    /// Writes one shop record atomically: temp file, fsync, rename.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` on any I/O error; the previous record
    /// version (if any) is untouched in that case.
    pub fn write(&self, shop: Shop) -> TradeResult<()> {
        let shop_id = shop.id;
        let record = ShopRecord::seal(&shop)?;
        let text = toml::to_string_pretty(&record)
            .map_err(|e| TradeError::PersistenceFailure(format!("serialize record: {e}")))?;

        let final_path = self.record_path(shop_id);
        let tmp_path = self.dir.join(format!("shop_{shop_id:08}.toml.tmp"));

        let io_err = |op: &str, e: std::io::Error| {
            TradeError::PersistenceFailure(format!("{op} {}: {e}", tmp_path.display()))
        };

        let mut file = fs::File::create(&tmp_path).map_err(|e| io_err("create", e))?;
        file.write_all(text.as_bytes()).map_err(|e| io_err("write", e))?;
        file.sync_all().map_err(|e| io_err("sync", e))?;
        drop(file);

        fs::rename(&tmp_path, &final_path).map_err(|e| {
            TradeError::PersistenceFailure(format!("rename to {}: {e}", final_path.display()))
        })?;
        Ok(())
    }

    /// Reads and verifies one shop record.
    ///
    /// # Errors
    ///
    /// Returns `CorruptRecord` on parse/checksum/validation failure or
    /// `PersistenceFailure` on I/O errors.
    pub fn read(&self, path: &Path) -> TradeResult<Shop> {
        let text = fs::read_to_string(path)
            .map_err(|e| TradeError::PersistenceFailure(format!("read {}: {e}", path.display())))?;
        let record: ShopRecord = toml::from_str(&text).map_err(|e| TradeError::CorruptRecord {
            path: path.display().to_string(),
            reason: format!("parse: {e}"),
        })?;
        record.open(path)
    }

    /// Deletes a shop's record (explicit teardown). Missing files are
    /// fine; the goal state is "no record".
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` on any other I/O error.
    pub fn delete(&self, shop_id: ShopId) -> TradeResult<()> {
        let path = self.record_path(shop_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TradeError::PersistenceFailure(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }

    /// Loads every record in the directory, skipping corrupt ones.
    ///
    /// Leftover `.tmp` files from an interrupted write are removed; their
    /// final-named predecessors are still intact.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` only if the directory itself cannot be
    /// read; individual bad records land in the report instead.
    pub fn load_all(&self) -> TradeResult<LoadReport> {
        let mut report = LoadReport::default();
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            TradeError::PersistenceFailure(format!("read_dir {}: {e}", self.dir.display()))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                TradeError::PersistenceFailure(format!("read_dir {}: {e}", self.dir.display()))
            })?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if name.ends_with(".tmp") {
                warn!(path = %path.display(), "removing leftover temp file from interrupted write");
                let _ = fs::remove_file(&path);
                continue;
            }
            if !name.starts_with("shop_") || !name.ends_with(".toml") {
                continue;
            }

            match self.read(&path) {
                Ok(shop) => report.shops.push(shop),
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping corrupt shop record");
                    report.skipped.push((path, err));
                }
            }
        }

        info!(
            loaded = report.shops.len(),
            skipped = report.skipped.len(),
            dir = %self.dir.display(),
            "shop records loaded"
        );
        Ok(report)
    }
}
