use core::{
    hash::Hash,
    ops::{Deref, DerefMut},
    time::Duration,
};

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Instant,
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type Entries<K, C> = HashMap<K, (Arc<Semaphore>, VecDeque<PooledConn<C>>)>;

/// Exclusive connection pool. One destination key maps to one entry and an
/// entry hands out at most `cap` connections at a time. Callers beyond the
/// cap suspend on the entry semaphore and are served in arrival order.
pub(crate) struct Pool<K, C> {
    conns: Arc<Mutex<Entries<K, C>>>,
    // capacity for entry.
    // the pool can have unbounded entries with different keys but a single
    // entry can only have up to cap size of C inside it.
    cap: usize,
    keep_alive_idle: Duration,
    keep_alive_born: Duration,
    max_requests: usize,
}

impl<K, C> Clone for Pool<K, C> {
    fn clone(&self) -> Self {
        Self {
            conns: self.conns.clone(),
            cap: self.cap,
            keep_alive_idle: self.keep_alive_idle,
            keep_alive_born: self.keep_alive_born,
            max_requests: self.max_requests,
        }
    }
}

impl<K, C> Pool<K, C>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(cap: usize, keep_alive_idle: Duration, keep_alive_born: Duration, max_requests: usize) -> Self {
        Self {
            conns: Arc::new(Mutex::new(HashMap::new())),
            cap,
            keep_alive_idle,
            keep_alive_born,
            max_requests,
        }
    }

    // acquire a connection from pool. if a new connection needs to be made a spawner type
    // would be returned.
    pub(crate) async fn acquire(&self, key: impl Into<K>) -> AcquireOutput<'_, K, C> {
        let key = key.into();

        loop {
            let permits = {
                let mut conns = self.conns.lock().unwrap();
                match conns.get(&key) {
                    Some((permits, _)) => permits.clone(),
                    None => {
                        // no entry in pool. create new entry and return a spawner where a new
                        // connection can be leased from directly.
                        let permit = entry_new(&key, self.cap, &mut conns);
                        return AcquireOutput::Spawner(Spawner {
                            pool: self,
                            key,
                            permit: Some(permit),
                            is_new_entry: true,
                            fulfilled: false,
                        });
                    }
                }
            };

            if let Ok(permit) = permits.acquire_owned().await {
                let mut conns = self.conns.lock().unwrap();
                let queue = match conns.get_mut(&key) {
                    Some((_, queue)) => queue,
                    // the entry is gone right after a permit is reserved.
                    // in this case try again from the beginning.
                    None => continue,
                };

                // expired idle connections are dropped here rather than handed out.
                // the transport closes when PooledConn drops.
                while let Some(conn) = queue.pop_front() {
                    if !conn.state.is_expired() {
                        return AcquireOutput::Conn(Conn {
                            pool: self.clone(),
                            key,
                            conn: Some(conn),
                            permit,
                            reuse_on_drop: false,
                        });
                    }
                    tracing::debug!("dropping expired idle connection");
                }

                // all connections in entry are expired. in this case spawn a new connection
                // against the permit already held.
                return AcquireOutput::Spawner(Spawner {
                    pool: self,
                    key,
                    permit: Some(permit),
                    is_new_entry: false,
                    fulfilled: false,
                });
            }

            // the entry is gone when a permit is being reserved. in this case try again from the beginning.
        }
    }
}

// create new entry inside pool and reserve one permit immediately from the entry capacity.
fn entry_new<K, C>(key: &K, cap: usize, entries: &mut Entries<K, C>) -> OwnedSemaphorePermit
where
    K: Eq + Hash + Clone,
{
    let permits = Arc::new(Semaphore::new(cap));
    let permit = permits
        .clone()
        .try_acquire_owned()
        .expect("in place permit reservation must not fail");
    entries.insert(key.clone(), (permits, VecDeque::with_capacity(cap)));
    permit
}

pub(crate) enum AcquireOutput<'a, K, C>
where
    K: Eq + Hash + Clone,
{
    Conn(Conn<K, C>),
    Spawner(Spawner<'a, K, C>),
}

/// Exclusive lease of one pooled connection.
///
/// The lease is returned exactly once, on drop: a connection marked with
/// [`Conn::set_reuse_on_drop`] goes back to the idle queue unless expired,
/// anything else is discarded and its transport closed. An exchange left in
/// an indeterminate state (error, cancellation, unconsumed response body)
/// therefore never reaches the idle queue.
pub(crate) struct Conn<K, C>
where
    K: Eq + Hash + Clone,
{
    pool: Pool<K, C>,
    key: K,
    conn: Option<PooledConn<C>>,
    permit: OwnedSemaphorePermit,
    reuse_on_drop: bool,
}

impl<K, C> Deref for Conn<K, C>
where
    K: Eq + Hash + Clone,
{
    type Target = C;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_deref()
            .expect("Deref must not be called after the connection is returned")
    }
}

impl<K, C> DerefMut for Conn<K, C>
where
    K: Eq + Hash + Clone,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("DerefMut must not be called after the connection is returned")
    }
}

impl<K, C> Conn<K, C>
where
    K: Eq + Hash + Clone,
{
    /// mark the lease healthy so drop releases it to the idle queue.
    pub(crate) fn set_reuse_on_drop(&mut self) {
        self.reuse_on_drop = true;
    }

    /// revoke an earlier reuse mark. drop closes the transport instead.
    pub(crate) fn set_discard_on_drop(&mut self) {
        self.reuse_on_drop = false;
    }
}

impl<K, C> Drop for Conn<K, C>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if !self.reuse_on_drop || conn.state.is_expired() {
                return;
            }

            let mut conns = self.pool.conns.lock().unwrap();

            if let Some((_, queue)) = conns.get_mut(&self.key) {
                conn.state.update_for_reentry();
                queue.push_back(conn);
            }

            // the permit is released after the connection rejoined the queue so a
            // woken waiter always observes it.
            let _ = self.permit;
        }
    }
}

pub(crate) struct PooledConn<C> {
    conn: C,
    state: ConnState,
}

impl<C> Deref for PooledConn<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<C> DerefMut for PooledConn<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

#[derive(Clone, Copy)]
struct ConnState {
    born: Instant,
    idle_since: Instant,
    requests: usize,
    keep_alive_idle: Duration,
    keep_alive_born: Duration,
    max_requests: usize,
}

impl ConnState {
    fn new(keep_alive_idle: Duration, keep_alive_born: Duration, max_requests: usize) -> Self {
        let now = Instant::now();

        Self {
            born: now,
            idle_since: now,
            requests: 0,
            keep_alive_idle,
            keep_alive_born,
            max_requests,
        }
    }

    fn update_for_reentry(&mut self) {
        self.idle_since = Instant::now();
        self.requests += 1;
    }

    fn is_expired(&self) -> bool {
        self.born.elapsed() > self.keep_alive_born
            || self.idle_since.elapsed() > self.keep_alive_idle
            || self.requests >= self.max_requests
    }
}

/// Reserved pool slot for a destination with no reusable connection.
/// Dropping an unfulfilled spawner releases the slot so a failed connection
/// attempt never leaks capacity to waiting leasers.
pub(crate) struct Spawner<'a, K, C>
where
    K: Eq + Hash + Clone,
{
    pool: &'a Pool<K, C>,
    key: K,
    permit: Option<OwnedSemaphorePermit>,
    is_new_entry: bool,
    fulfilled: bool,
}

impl<K, C> Spawner<'_, K, C>
where
    K: Eq + Hash + Clone,
{
    /// turn a freshly opened connection into a lease against the slot this
    /// spawner reserved. the caller keeps its place in the arrival order.
    pub(crate) fn into_conn(mut self, conn: C) -> Conn<K, C> {
        self.fulfilled = true;

        let permit = self.permit.take().expect("permit is reserved until the spawner resolves");

        Conn {
            pool: self.pool.clone(),
            key: self.key.clone(),
            conn: Some(PooledConn {
                conn,
                state: ConnState::new(
                    self.pool.keep_alive_idle,
                    self.pool.keep_alive_born,
                    self.pool.max_requests,
                ),
            }),
            permit,
            reuse_on_drop: false,
        }
    }
}

impl<K, C> Drop for Spawner<'_, K, C>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        if self.is_new_entry && !self.fulfilled {
            self.pool.conns.lock().unwrap().remove(&self.key);
        }
    }
}
