//! Main storage engine implementation
//!
//! A single keyspace of typed entries behind one process-wide RwLock.
//! Reads take the shared lock; mutations and expired-entry reaping take the
//! exclusive lock. Every operation is linearisable with respect to that
//! lock. Blocking reads park on per-key wait queues owned by the database so
//! enqueue and dequeue happen under the same lock as the data they watch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use crate::error::{CommandError, CuprousError, Result, StorageError};
use super::quicklist::QuickList;
use super::stream::{IdSpec, ReadStart, RangeBound, Stream, StreamEntry, StreamId};
use super::value::{StoredValue, Value};
use super::waiters::{PeerMonitor, WaitRegistry, WaitSignal};
use super::Key;

/// Parked waiters wake this often to check for a vanished peer
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Main storage engine
pub struct StorageEngine {
    db: RwLock<Database>,
    /// Identity stamps for stored entries; see StoredValue::version
    version_counter: AtomicU64,
}

/// The keyspace plus the wait queues it owns
struct Database {
    data: HashMap<Key, StoredValue>,
    list_waiters: WaitRegistry,
    stream_waiters: WaitRegistry,
}

impl Database {
    fn new() -> Self {
        Database {
            data: HashMap::new(),
            list_waiters: WaitRegistry::new(),
            stream_waiters: WaitRegistry::new(),
        }
    }

    /// Drop the entry if its deadline has passed. Callers hold the
    /// exclusive lock.
    fn reap_if_expired(&mut self, key: &[u8]) {
        if self.data.get(key).map(|sv| sv.is_expired()).unwrap_or(false) {
            self.data.remove(key);
        }
    }
}

impl StorageEngine {
    /// Create a new storage engine
    pub fn new() -> Arc<Self> {
        Arc::new(StorageEngine {
            db: RwLock::new(Database::new()),
            version_counter: AtomicU64::new(1),
        })
    }

    fn next_version(&self) -> u64 {
        self.version_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Set a string value, optionally with an expiry deadline.
    /// Fails with a wrong-type error if the key holds a list or stream.
    pub fn set_string(
        &self,
        key: Key,
        value: Vec<u8>,
        expires_in: Option<Duration>,
    ) -> Result<()> {
        let version = self.next_version();
        let mut db = self.db.write().unwrap();
        db.reap_if_expired(&key);

        match db.data.get(&key) {
            Some(sv) if !matches!(sv.value, Value::String(_)) => {
                return Err(StorageError::WrongType.into());
            }
            _ => {}
        }

        let stored = match expires_in {
            Some(ttl) => StoredValue::with_expiration(Value::String(value), Instant::now() + ttl, version),
            None => StoredValue::new(Value::String(value), version),
        };
        db.data.insert(key, stored);
        Ok(())
    }

    /// Get a string value. An expired entry is removed under the exclusive
    /// lock (re-checking its identity) and reported as absent.
    pub fn get_string(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        loop {
            let expired_version = {
                let db = self.db.read().unwrap();
                match db.data.get(key) {
                    None => return Ok(None),
                    Some(sv) if !sv.is_expired() => {
                        return match &sv.value {
                            Value::String(bytes) => Ok(Some(bytes.clone())),
                            _ => Err(StorageError::WrongType.into()),
                        };
                    }
                    Some(sv) => sv.version,
                }
            };

            let mut db = self.db.write().unwrap();
            match db.data.get(key) {
                None => return Ok(None),
                Some(sv) if sv.version == expired_version => {
                    db.data.remove(key);
                    return Ok(None);
                }
                // Replaced while we upgraded the lock; read again
                Some(_) => {}
            }
        }
    }

    /// Increment the integer stored at key, starting from 0 when absent
    pub fn incr(&self, key: Key) -> Result<i64> {
        let version = self.next_version();
        let mut db = self.db.write().unwrap();
        db.reap_if_expired(&key);

        let new_value = match db.data.get(&key) {
            Some(sv) => match &sv.value {
                Value::String(_) => match sv.value.as_integer() {
                    Some(current) => current
                        .checked_add(1)
                        .ok_or(CuprousError::Command(CommandError::NotInteger))?,
                    None => return Err(CommandError::NotInteger.into()),
                },
                _ => return Err(StorageError::WrongType.into()),
            },
            None => 1,
        };

        db.data.insert(key, StoredValue::new(Value::integer(new_value), version));
        Ok(new_value)
    }

    /// Delete a key. Returns whether a live entry was removed.
    pub fn del(&self, key: &[u8]) -> bool {
        let mut db = self.db.write().unwrap();
        db.reap_if_expired(key);
        db.data.remove(key).is_some()
    }

    /// Kind of the value at key: "string", "list", "stream", or "none"
    pub fn key_type(&self, key: &[u8]) -> &'static str {
        loop {
            let expired_version = {
                let db = self.db.read().unwrap();
                match db.data.get(key) {
                    None => return "none",
                    Some(sv) if !sv.is_expired() => return sv.value.value_type().name(),
                    Some(sv) => sv.version,
                }
            };

            let mut db = self.db.write().unwrap();
            match db.data.get(key) {
                None => return "none",
                Some(sv) if sv.version == expired_version => {
                    db.data.remove(key);
                    return "none";
                }
                Some(_) => {}
            }
        }
    }

    /// Append values at the tail of the list. Returns the new length.
    pub fn rpush(&self, key: Key, values: Vec<Vec<u8>>) -> Result<usize> {
        self.push(key, values, false)
    }

    /// Prepend values at the head of the list. Returns the new length.
    pub fn lpush(&self, key: Key, values: Vec<Vec<u8>>) -> Result<usize> {
        self.push(key, values, true)
    }

    fn push(&self, key: Key, values: Vec<Vec<u8>>, front: bool) -> Result<usize> {
        let version = self.next_version();
        let mut db = self.db.write().unwrap();
        db.reap_if_expired(&key);

        let len = match db.data.get_mut(&key) {
            Some(sv) => match &mut sv.value {
                Value::List(ql) => {
                    if front {
                        ql.lpush(&values)
                    } else {
                        ql.rpush(&values)
                    }
                }
                _ => return Err(StorageError::WrongType.into()),
            },
            None => {
                let mut ql = QuickList::new();
                let len = if front { ql.lpush(&values) } else { ql.rpush(&values) };
                db.data.insert(key.clone(), StoredValue::new(Value::List(ql), version));
                len
            }
        };

        // One wake per pushed value, in FIFO order; each woken reader
        // re-attempts its pop under the lock
        for _ in 0..values.len() {
            if !db.list_waiters.wake_one(&key) {
                break;
            }
        }

        Ok(len)
    }

    /// Pop up to `count` values from the head of the list
    pub fn lpop(&self, key: &[u8], count: usize) -> Result<Vec<Vec<u8>>> {
        let mut db = self.db.write().unwrap();
        Self::pop_locked(&mut db, key, count)
    }

    fn pop_locked(db: &mut Database, key: &[u8], count: usize) -> Result<Vec<Vec<u8>>> {
        db.reap_if_expired(key);
        match db.data.get_mut(key) {
            Some(sv) => match &mut sv.value {
                Value::List(ql) => {
                    let popped = ql.lpop(count);
                    if ql.is_empty() {
                        // A fully drained list key is removed; TYPE then
                        // reports none
                        db.data.remove(key);
                    }
                    Ok(popped)
                }
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// List length; absent keys count as empty
    pub fn llen(&self, key: &[u8]) -> Result<usize> {
        let mut db = self.db.write().unwrap();
        db.reap_if_expired(key);
        match db.data.get(key) {
            Some(sv) => match &sv.value {
                Value::List(ql) => Ok(ql.len()),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(0),
        }
    }

    /// Inclusive range with negative-index support
    pub fn lrange(&self, key: &[u8], start: i64, end: i64) -> Result<Vec<Vec<u8>>> {
        let mut db = self.db.write().unwrap();
        db.reap_if_expired(key);
        match db.data.get(key) {
            Some(sv) => match &sv.value {
                Value::List(ql) => Ok(ql.lrange(start, end)),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// Blocking head pop. `timeout` of None means wait forever.
    ///
    /// Fast path pops under the lock; otherwise a waiter joins the key's
    /// FIFO queue and parks. A woken waiter re-attempts the pop and, if a
    /// competing consumer won the race, re-enqueues at the front to keep its
    /// place in line. Timed-out waiters remove themselves before returning.
    ///
    /// The wait parks in short slices and checks `monitor` between them: a
    /// waiter whose connection has closed abandons its slot, forwards any
    /// wake that raced the disconnect to the next waiter, and a value popped
    /// for a peer that is already gone goes back to the head of the list
    /// instead of being dropped.
    pub fn blpop(
        &self,
        key: &[u8],
        timeout: Option<Duration>,
        monitor: &dyn PeerMonitor,
    ) -> Result<Option<Vec<u8>>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let waiter = WaitSignal::new();
        let mut first_wait = true;

        loop {
            {
                let mut db = self.db.write().unwrap();
                let mut popped = Self::pop_locked(&mut db, key, 1)?;
                if let Some(value) = popped.pop() {
                    if monitor.is_closed() {
                        self.requeue_front(&mut db, key, value);
                        db.list_waiters.wake_one(key);
                        return Ok(None);
                    }
                    return Ok(Some(value));
                }
                if first_wait {
                    db.list_waiters.enqueue_back(key, Arc::clone(&waiter));
                    first_wait = false;
                } else {
                    db.list_waiters.enqueue_front(key, Arc::clone(&waiter));
                }
            }

            loop {
                let mut slice = Instant::now() + WAIT_POLL_INTERVAL;
                if let Some(d) = deadline {
                    slice = slice.min(d);
                }
                if waiter.wait_until(Some(slice)) {
                    break; // woken: retry the pop
                }

                if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                    let mut db = self.db.write().unwrap();
                    db.list_waiters.remove(key, &waiter);
                    if waiter.consume() {
                        // A wake raced with the timeout; honour it so the
                        // value is not stranded
                        let mut popped = Self::pop_locked(&mut db, key, 1)?;
                        if let Some(value) = popped.pop() {
                            if monitor.is_closed() {
                                self.requeue_front(&mut db, key, value);
                                db.list_waiters.wake_one(key);
                                return Ok(None);
                            }
                            return Ok(Some(value));
                        }
                    }
                    return Ok(None);
                }

                if monitor.is_closed() {
                    // Connection gone: drop the wait slot; a wake that
                    // raced the disconnect moves on to the next waiter
                    let mut db = self.db.write().unwrap();
                    db.list_waiters.remove(key, &waiter);
                    if waiter.consume() {
                        db.list_waiters.wake_one(key);
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Return an undeliverable popped value to the head of its list.
    /// Runs in the same critical section as the pop, so the key is either
    /// still a list or was removed when the pop drained it.
    fn requeue_front(&self, db: &mut Database, key: &[u8], value: Vec<u8>) {
        match db.data.get_mut(key) {
            Some(sv) => {
                if let Value::List(ql) = &mut sv.value {
                    ql.lpush(&[value]);
                }
            }
            None => {
                let mut ql = QuickList::new();
                ql.lpush(&[value]);
                db.data.insert(
                    key.to_vec(),
                    StoredValue::new(Value::List(ql), self.next_version()),
                );
            }
        }
    }

    /// Append an entry to the stream at key, creating it if needed
    pub fn xadd(
        &self,
        key: Key,
        spec: IdSpec,
        fields: Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Result<StreamId> {
        let version = self.next_version();
        let mut db = self.db.write().unwrap();
        db.reap_if_expired(&key);

        let id = match db.data.get_mut(&key) {
            Some(sv) => match &mut sv.value {
                Value::Stream(stream) => stream.add(spec, fields)?,
                _ => return Err(StorageError::WrongType.into()),
            },
            None => {
                let mut stream = Stream::new();
                let id = stream.add(spec, fields)?;
                db.data.insert(key.clone(), StoredValue::new(Value::Stream(stream), version));
                id
            }
        };

        // XREAD does not consume, so every blocked reader gets to observe
        // the new entry
        db.stream_waiters.wake_all(&key);

        Ok(id)
    }

    /// Entries with `start <= id <= end`; absent keys yield nothing
    pub fn xrange(
        &self,
        key: &[u8],
        start: RangeBound,
        end: RangeBound,
    ) -> Result<Vec<StreamEntry>> {
        let mut db = self.db.write().unwrap();
        db.reap_if_expired(key);
        match db.data.get(key) {
            Some(sv) => match &sv.value {
                Value::Stream(stream) => Ok(stream.range(start, end)),
                _ => Err(StorageError::WrongType.into()),
            },
            None => Ok(Vec::new()),
        }
    }

    /// Read entries strictly after the given position from each stream.
    ///
    /// `block`: None is a plain read; Some(None) blocks without deadline;
    /// Some(Some(t)) blocks until the deadline. Returns None when every
    /// stream is empty at return time (for a blocking call, that means the
    /// deadline elapsed).
    ///
    /// `$` resolves to each stream's current last_id at the moment the call
    /// takes the lock, before the first collection pass.
    ///
    /// A blocked reader checks `monitor` between wait slices and abandons
    /// its slots once the connection is gone; stream wakes go to every
    /// waiter, so nothing needs forwarding.
    pub fn xread(
        &self,
        queries: &[(Key, ReadStart)],
        block: Option<Option<Duration>>,
        monitor: &dyn PeerMonitor,
    ) -> Result<Option<Vec<(Key, Vec<StreamEntry>)>>> {
        let deadline = match block {
            Some(Some(t)) => Some(Instant::now() + t),
            _ => None,
        };
        let waiter = WaitSignal::new();
        let mut resolved: Option<Vec<(Key, StreamId)>> = None;
        let mut registered = false;

        loop {
            {
                let mut db = self.db.write().unwrap();

                let positions = resolved.get_or_insert_with(|| {
                    queries
                        .iter()
                        .map(|(key, start)| {
                            let after = match start {
                                ReadStart::After(id) => *id,
                                ReadStart::Latest => match db.data.get(key) {
                                    Some(StoredValue { value: Value::Stream(s), .. }) => s.last_id(),
                                    _ => StreamId::min(),
                                },
                            };
                            (key.clone(), after)
                        })
                        .collect()
                });

                let collected = Self::collect_streams(&db, positions);
                if registered {
                    for (key, _) in positions.iter() {
                        db.stream_waiters.remove(key, &waiter);
                    }
                    registered = false;
                }
                let (results, any) = collected?;
                if any {
                    return Ok(Some(results));
                }
                if block.is_none() {
                    return Ok(None);
                }

                for (key, _) in positions.iter() {
                    db.stream_waiters.enqueue_back(key, Arc::clone(&waiter));
                }
                registered = true;
            }

            let woken = loop {
                let mut slice = Instant::now() + WAIT_POLL_INTERVAL;
                if let Some(d) = deadline {
                    slice = slice.min(d);
                }
                if waiter.wait_until(Some(slice)) {
                    break true;
                }
                if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                    break false;
                }
                if monitor.is_closed() {
                    let mut db = self.db.write().unwrap();
                    if let Some(positions) = &resolved {
                        for (key, _) in positions.iter() {
                            db.stream_waiters.remove(key, &waiter);
                        }
                    }
                    return Ok(None);
                }
            };

            if !woken {
                let mut db = self.db.write().unwrap();
                if let Some(positions) = &resolved {
                    for (key, _) in positions.iter() {
                        db.stream_waiters.remove(key, &waiter);
                    }
                    if waiter.consume() {
                        let (results, any) = Self::collect_streams(&db, positions)?;
                        if any {
                            return Ok(Some(results));
                        }
                    }
                }
                return Ok(None);
            }
        }
    }

    fn collect_streams(
        db: &Database,
        positions: &[(Key, StreamId)],
    ) -> Result<(Vec<(Key, Vec<StreamEntry>)>, bool)> {
        let mut results = Vec::with_capacity(positions.len());
        let mut any = false;
        for (key, after) in positions {
            match db.data.get(key) {
                Some(sv) if !sv.is_expired() => match &sv.value {
                    Value::Stream(stream) => {
                        let entries = stream.read_after(*after);
                        if !entries.is_empty() {
                            any = true;
                        }
                        results.push((key.clone(), entries));
                    }
                    _ => return Err(StorageError::WrongType.into()),
                },
                _ => results.push((key.clone(), Vec::new())),
            }
        }
        Ok((results, any))
    }
}
