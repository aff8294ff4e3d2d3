//! # Calibration Store
//!
//! Persistent calibration tuples keyed by device identity and axis, kept in a
//! `sled` database.
//!
//! All rows live in the `calibration` tree. Writing a row whose
//! `(bus, vendor, product, axis)` key already exists replaces it.
//!
//! ```
//! use joycal::controller::calibration::{AxisCalibration, Calibration};
//! use joycal::controller::channel::DeviceIdentity;
//! use joycal::store::CalibrationStore;
//!
//! let store = CalibrationStore::temporary()?;
//! let pad = DeviceIdentity::new(3, 0x45e, 0x28e);
//!
//! store.write(&pad, &[AxisCalibration::new(0, Calibration::new(0, 255, 0, 15))])?;
//! assert_eq!(store.read_device(&pad)?.len(), 1);
//! # Ok::<(), joycal::error::JoycalError>(())
//! ```

mod record;

use std::io;
use std::ops::ControlFlow;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use tracing::{debug, info};

use crate::controller::calibration::{AxisCalibration, Calibration, CalibrationError};
use crate::controller::channel::DeviceIdentity;
use crate::error::Result;

/// Name of the tree holding calibration rows.
pub const TABLE_NAME: &str = "calibration";

/// How long [`CalibrationStore::open`] waits for a busy database.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const LOCK_BACKOFF_MIN: Duration = Duration::from_millis(10);
const LOCK_BACKOFF_MAX: Duration = Duration::from_millis(250);

/// Calibration database handle.
pub struct CalibrationStore {
    db: sled::Db,
    table: sled::Tree,
}

impl CalibrationStore {
    /// Opens the database at `path`, creating it and the calibration table
    /// if absent.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the database cannot be opened (e.g. not
    /// writable, or held by another session for longer than
    /// [`LOCK_TIMEOUT`]).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_timeout(path, LOCK_TIMEOUT)
    }

    /// Like [`CalibrationStore::open`], waiting at most `timeout` for another
    /// session to release the database.
    ///
    /// sled allows one process per database, so concurrent sessions take
    /// turns: the opener backs off and retries while the file lock is held.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the database cannot be opened, or is still locked
    /// once `timeout` has passed.
    pub fn open_with_timeout<P: AsRef<Path>>(path: P, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening calibration database {}", path.display());

        let deadline = Instant::now() + timeout;
        let mut backoff = LOCK_BACKOFF_MIN;
        loop {
            match sled::open(path) {
                Ok(db) => return Self::from_db(db),
                Err(e) if is_locked(&e) && Instant::now() < deadline => {
                    debug!("Database {} is busy, retrying in {:?}", path.display(), backoff);
                    thread::sleep(backoff.min(deadline.saturating_duration_since(Instant::now())));
                    backoff = (backoff * 2).min(LOCK_BACKOFF_MAX);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Opens a throwaway database removed when the handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the database cannot be created.
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let table = db.open_tree(TABLE_NAME)?;
        Ok(Self { db, table })
    }

    /// Upserts `entries` for `device` in one transaction.
    ///
    /// Entries are written in order. If any entry fails validation nothing is
    /// written. The commit is flushed to disk before returning.
    ///
    /// # Errors
    ///
    /// - `Calibration`: an entry violates the tuple invariants
    /// - `Storage`: the engine failed; the transaction was rolled back
    pub fn write(&self, device: &DeviceIdentity, entries: &[AxisCalibration]) -> Result<()> {
        let rows = entries
            .iter()
            .map(|entry| {
                Ok((
                    record::encode_key(device, entry.axis),
                    record::encode_value(&entry.calibration)?,
                    entry.calibration,
                ))
            })
            .collect::<Result<Vec<([u8; record::KEY_LEN], Vec<u8>, Calibration)>>>()?;

        let outcome: TransactionResult<(), CalibrationError> = self.table.transaction(|tx| {
            for (key, value, calibration) in &rows {
                calibration
                    .validate()
                    .map_err(ConflictableTransactionError::Abort)?;
                tx.insert(&key[..], value.as_slice())?;
            }
            Ok(())
        });

        match outcome {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e.into()),
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        }

        self.db.flush()?;
        info!("Stored {} calibration entries for {}", entries.len(), device);
        Ok(())
    }

    /// Visits stored rows in `(bus, vendor, product, axis)` order.
    ///
    /// With `Some(device)` only that device's rows are visited. The scan stops
    /// early, without error, when `visitor` returns `ControlFlow::Break`.
    ///
    /// # Errors
    ///
    /// - `Storage`: the engine failed
    /// - `Record`: a stored row could not be decoded
    pub fn read<F>(&self, device: Option<&DeviceIdentity>, mut visitor: F) -> Result<()>
    where
        F: FnMut(&DeviceIdentity, &AxisCalibration) -> ControlFlow<()>,
    {
        let rows = match device {
            Some(device) => self.table.scan_prefix(record::device_prefix(device)),
            None => self.table.iter(),
        };

        for row in rows {
            let (key, value) = row?;
            let (identity, axis) = record::decode_key(&key)?;
            let entry = AxisCalibration::new(axis, record::decode_value(&value)?);

            if visitor(&identity, &entry).is_break() {
                debug!("Calibration scan stopped at {} axis {}", identity, axis);
                break;
            }
        }

        Ok(())
    }

    /// All rows stored for `device`, ordered by axis id.
    ///
    /// # Errors
    ///
    /// Same as [`CalibrationStore::read`].
    pub fn read_device(&self, device: &DeviceIdentity) -> Result<Vec<AxisCalibration>> {
        let mut entries = Vec::new();
        self.read(Some(device), |_, entry| {
            entries.push(*entry);
            ControlFlow::Continue(())
        })?;
        Ok(entries)
    }

    /// Removes every row of `device` atomically and returns how many there were.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the engine fails.
    pub fn delete(&self, device: &DeviceIdentity) -> Result<usize> {
        let mut batch = sled::Batch::default();
        let mut removed = 0;
        for key in self.table.scan_prefix(record::device_prefix(device)).keys() {
            batch.remove(key?);
            removed += 1;
        }

        self.table.apply_batch(batch)?;
        self.db.flush()?;
        info!("Deleted {} calibration entries for {}", removed, device);
        Ok(removed)
    }

    /// Number of stored rows across all devices.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True when no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

// sled reports a held file lock as a plain IO error carrying this message
fn is_locked(error: &sled::Error) -> bool {
    match error {
        sled::Error::Io(e) => {
            e.kind() == io::ErrorKind::WouldBlock
                || e.to_string().starts_with("could not acquire lock")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JoycalError;

    fn pad() -> DeviceIdentity {
        DeviceIdentity::new(3, 0x45e, 0x28e)
    }

    fn entry(axis: u16, min: i32, max: i32, fuzz: i32, flat: i32) -> AxisCalibration {
        AxisCalibration::new(axis, Calibration::new(min, max, fuzz, flat))
    }

    fn collect_all(store: &CalibrationStore) -> Vec<(DeviceIdentity, AxisCalibration)> {
        let mut rows = Vec::new();
        store
            .read(None, |device, entry| {
                rows.push((*device, *entry));
                ControlFlow::Continue(())
            })
            .unwrap();
        rows
    }

    // ==================== Write / Read Tests ====================

    #[test]
    fn test_round_trip() {
        let store = CalibrationStore::temporary().unwrap();
        let row = entry(2, -255, 255, 10, 5);

        store.write(&pad(), &[row]).unwrap();
        assert_eq!(store.read_device(&pad()).unwrap(), vec![row]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_rewrite_replaces() {
        let store = CalibrationStore::temporary().unwrap();
        store.write(&pad(), &[entry(2, -255, 255, 10, 5)]).unwrap();
        store.write(&pad(), &[entry(2, 0, 1023, 0, 0)]).unwrap();

        assert_eq!(store.read_device(&pad()).unwrap(), vec![entry(2, 0, 1023, 0, 0)]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_axis_in_one_batch_last_wins() {
        let store = CalibrationStore::temporary().unwrap();
        store
            .write(&pad(), &[entry(0, 0, 10, 0, 0), entry(0, 0, 20, 0, 0)])
            .unwrap();

        assert_eq!(store.read_device(&pad()).unwrap(), vec![entry(0, 0, 20, 0, 0)]);
    }

    #[test]
    fn test_invalid_entry_rolls_back_batch() {
        let store = CalibrationStore::temporary().unwrap();
        store.write(&pad(), &[entry(0, 0, 255, 0, 0)]).unwrap();

        let err = store
            .write(&pad(), &[entry(0, 0, 100, 0, 0), entry(1, 0, 100, 0, 51)])
            .unwrap_err();

        assert!(matches!(
            err,
            JoycalError::Calibration(CalibrationError::FlatOutOfRange { .. })
        ));
        // first entry of the failed batch did not land
        assert_eq!(store.read_device(&pad()).unwrap(), vec![entry(0, 0, 255, 0, 0)]);
    }

    #[test]
    fn test_read_device_filters_and_orders_by_axis() {
        let store = CalibrationStore::temporary().unwrap();
        let other = DeviceIdentity::new(3, 0x45e, 0x28f);

        store
            .write(&pad(), &[entry(0x10, -1, 1, 0, 0), entry(0, 0, 255, 0, 15)])
            .unwrap();
        store.write(&other, &[entry(1, 0, 1023, 0, 0)]).unwrap();

        let axes: Vec<u16> = store.read_device(&pad()).unwrap().iter().map(|e| e.axis).collect();
        assert_eq!(axes, vec![0, 0x10]);
        assert_eq!(store.read_device(&other).unwrap().len(), 1);
    }

    #[test]
    fn test_read_all_in_tuple_order() {
        let store = CalibrationStore::temporary().unwrap();
        let later = DeviceIdentity::new(5, 0x054c, 0x0ce6);
        let earlier = DeviceIdentity::new(3, 0x8000, 0x0001);

        store.write(&later, &[entry(1, 0, 255, 0, 0)]).unwrap();
        store.write(&pad(), &[entry(1, 0, 255, 0, 0), entry(0, 0, 255, 0, 0)]).unwrap();
        store.write(&earlier, &[entry(0, 0, 255, 0, 0)]).unwrap();

        let order: Vec<(DeviceIdentity, u16)> = collect_all(&store)
            .into_iter()
            .map(|(device, entry)| (device, entry.axis))
            .collect();
        assert_eq!(
            order,
            vec![(pad(), 0), (pad(), 1), (earlier, 0), (later, 1)]
        );
    }

    #[test]
    fn test_visitor_break_stops_scan() {
        let store = CalibrationStore::temporary().unwrap();
        store
            .write(&pad(), &[entry(0, 0, 255, 0, 0), entry(1, 0, 255, 0, 0), entry(2, 0, 255, 0, 0)])
            .unwrap();

        let mut seen = 0;
        store
            .read(None, |_, _| {
                seen += 1;
                if seen == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_read_unknown_device_is_empty() {
        let store = CalibrationStore::temporary().unwrap();
        assert!(store.read_device(&pad()).unwrap().is_empty());
        assert!(store.is_empty());
    }

    // ==================== Delete Tests ====================

    #[test]
    fn test_delete_empties_device_only() {
        let store = CalibrationStore::temporary().unwrap();
        let other = DeviceIdentity::new(3, 0x45e, 0x28f);
        store
            .write(&pad(), &[entry(0, 0, 255, 0, 0), entry(1, 0, 255, 0, 0)])
            .unwrap();
        store.write(&other, &[entry(0, 0, 255, 0, 0)]).unwrap();

        assert_eq!(store.delete(&pad()).unwrap(), 2);
        assert!(store.read_device(&pad()).unwrap().is_empty());
        assert_eq!(store.read_device(&other).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_without_rows() {
        let store = CalibrationStore::temporary().unwrap();
        assert_eq!(store.delete(&pad()).unwrap(), 0);
    }

    #[test]
    fn test_second_session_waits_for_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.db");

        let first = CalibrationStore::open(&path).unwrap();
        first.write(&pad(), &[entry(0, 0, 255, 0, 15)]).unwrap();
        let holder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            drop(first);
        });

        let second = CalibrationStore::open(&path).unwrap();
        holder.join().unwrap();
        assert_eq!(second.read_device(&pad()).unwrap(), vec![entry(0, 0, 255, 0, 15)]);

        second.write(&pad(), &[entry(0, 0, 1023, 0, 0)]).unwrap();
        drop(second);
        let third = CalibrationStore::open(&path).unwrap();
        assert_eq!(third.read_device(&pad()).unwrap(), vec![entry(0, 0, 1023, 0, 0)]);
    }

    #[test]
    fn test_busy_database_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.db");

        let _first = CalibrationStore::open(&path).unwrap();
        let started = Instant::now();
        let err = CalibrationStore::open_with_timeout(&path, Duration::from_millis(100))
            .err()
            .unwrap();

        assert!(matches!(err, JoycalError::Storage(_)));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::open(dir.path().join("cal.db")).unwrap();

        store.write(&pad(), &[entry(2, -255, 255, 10, 5)]).unwrap();
        assert_eq!(store.read_device(&pad()).unwrap(), vec![entry(2, -255, 255, 10, 5)]);
        assert!(dir.path().join("cal.db").exists());
    }
}
