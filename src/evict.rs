//! Memory-budget enforcement: sampled candidate eviction over the
//! configured policy, run before writes and on the server timer.

use crate::{bytes::lex, db::Db, db::LruKind};
use bytes::Bytes;
use logos::Logos;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// How many candidate keys one sampling round draws.
pub const DEFAULT_SAMPLES: usize = 5;

/// The free-at-least margin per cycle, as a divisor of `maxmemory` (5%).
const FREE_MARGIN_DIV: usize = 20;

#[derive(Clone, Copy, Debug, Eq, Hash, Logos, PartialEq)]
enum PolicyToken {
    #[regex(b"(?i:noeviction)")]
    NoEviction,

    #[regex(b"(?i:allkeys-lru)")]
    AllkeysLru,

    #[regex(b"(?i:allkeys-lfu)")]
    AllkeysLfu,

    #[regex(b"(?i:allkeys-random)")]
    AllkeysRandom,

    #[regex(b"(?i:volatile-lru)")]
    VolatileLru,

    #[regex(b"(?i:volatile-lfu)")]
    VolatileLfu,

    #[regex(b"(?i:volatile-ttl)")]
    VolatileTtl,

    #[regex(b"(?i:volatile-random)")]
    VolatileRandom,
}

/// What to evict when memory runs out.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Policy {
    #[default]
    NoEviction,
    AllkeysLru,
    AllkeysLfu,
    AllkeysRandom,
    VolatileLru,
    VolatileLfu,
    VolatileTtl,
    VolatileRandom,
}

impl Policy {
    pub fn parse(bytes: &[u8]) -> Option<Policy> {
        use PolicyToken as T;
        Some(match lex::<T>(bytes)? {
            T::NoEviction => Policy::NoEviction,
            T::AllkeysLru => Policy::AllkeysLru,
            T::AllkeysLfu => Policy::AllkeysLfu,
            T::AllkeysRandom => Policy::AllkeysRandom,
            T::VolatileLru => Policy::VolatileLru,
            T::VolatileLfu => Policy::VolatileLfu,
            T::VolatileTtl => Policy::VolatileTtl,
            T::VolatileRandom => Policy::VolatileRandom,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Policy::NoEviction => "noeviction",
            Policy::AllkeysLru => "allkeys-lru",
            Policy::AllkeysLfu => "allkeys-lfu",
            Policy::AllkeysRandom => "allkeys-random",
            Policy::VolatileLru => "volatile-lru",
            Policy::VolatileLfu => "volatile-lfu",
            Policy::VolatileTtl => "volatile-ttl",
            Policy::VolatileRandom => "volatile-random",
        }
    }

    /// Which clock objects keep for this policy.
    pub fn lru_kind(self) -> LruKind {
        match self {
            Policy::AllkeysLfu | Policy::VolatileLfu => LruKind::Lfu,
            _ => LruKind::Lru,
        }
    }

    /// Does this policy only consider keys with an expiry?
    fn volatile(self) -> bool {
        matches!(
            self,
            Policy::VolatileLru | Policy::VolatileLfu | Policy::VolatileTtl | Policy::VolatileRandom
        )
    }
}

/// A write was refused because nothing more could be evicted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OutOfMemory;

#[derive(Debug, Default)]
pub struct EvictionStats {
    pub evicted_keys: AtomicU64,
    pub freed_bytes: AtomicU64,
    pub oom_events: AtomicU64,
    pub cycles: AtomicU64,
}

/// The eviction manager: budget, policy, sample width and the
/// single-flight guard.
#[derive(Debug)]
pub struct Eviction {
    max_memory: AtomicUsize,
    policy: Policy,
    samples: usize,
    running: AtomicBool,
    pub stats: EvictionStats,
}

impl Eviction {
    pub fn new(max_memory: usize, policy: Policy, samples: usize) -> Self {
        Eviction {
            max_memory: AtomicUsize::new(max_memory),
            policy,
            samples: samples.max(1),
            running: AtomicBool::new(false),
            stats: EvictionStats::default(),
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn max_memory(&self) -> usize {
        self.max_memory.load(Ordering::Relaxed)
    }

    fn used(dbs: &[Db]) -> usize {
        dbs.iter().map(Db::mem_used).sum()
    }

    /// Is the keyspace at or over budget?
    pub fn should_evict(&self, dbs: &[Db]) -> bool {
        let max = self.max_memory();
        max > 0 && Self::used(dbs) >= max
    }

    /// Called before writes and from the timer: evict until under budget.
    /// Returns `Err` when the budget cannot be met (the write must fail).
    pub fn check(&self, dbs: &[Db]) -> Result<(), OutOfMemory> {
        if !self.should_evict(dbs) {
            return Ok(());
        }

        if self.policy == Policy::NoEviction {
            self.stats.oom_events.fetch_add(1, Ordering::Relaxed);
            return Err(OutOfMemory);
        }

        // Single flight: a concurrent cycle is already freeing memory, so
        // this write proceeds rather than stacking up evictors.
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = self.cycle(dbs);
        self.running.store(false, Ordering::Release);
        result
    }

    /// One eviction cycle: free memory until usage drops at least 5% of
    /// the budget below the limit, or no candidate remains.
    fn cycle(&self, dbs: &[Db]) -> Result<(), OutOfMemory> {
        let max = self.max_memory();
        let target = max.saturating_sub(max / FREE_MARGIN_DIV);
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        while Self::used(dbs) >= target {
            match self.pick(dbs) {
                Some((db, key)) => {
                    let freed = dbs[db].write().evict(&key);
                    tracing::debug!(db, key = %crate::bytes::Output(&key), freed, "evicted");
                    self.stats.evicted_keys.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .freed_bytes
                        .fetch_add(u64::try_from(freed).unwrap_or(0), Ordering::Relaxed);
                }
                None => {
                    if Self::used(dbs) >= max {
                        self.stats.oom_events.fetch_add(1, Ordering::Relaxed);
                        return Err(OutOfMemory);
                    }
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Draw `samples` random candidates and keep the one scoring worst
    /// under the policy.
    fn pick(&self, dbs: &[Db]) -> Option<(usize, Bytes)> {
        let mut rng = rand::thread_rng();
        let volatile = self.policy.volatile();
        let mut best: Option<(usize, Bytes, u64)> = None;

        for _ in 0..self.samples {
            let db = rng.gen_range(0..dbs.len());
            let inner = dbs[db].read();
            let Some((key, expires_at, object)) = inner.sample(volatile) else {
                continue;
            };

            let score = match self.policy {
                Policy::AllkeysLru | Policy::VolatileLru => u64::from(object.idle_seconds()),
                Policy::AllkeysLfu | Policy::VolatileLfu => u64::from(255 - object.frequency().min(255)),
                Policy::VolatileTtl => u64::MAX - expires_at,
                Policy::AllkeysRandom | Policy::VolatileRandom => rng.r#gen(),
                Policy::NoEviction => return None,
            };
            drop(inner);

            if best.as_ref().is_none_or(|(_, _, top)| score > *top) {
                best = Some((db, key, score));
            }
        }

        best.map(|(db, key, _)| (db, key))
    }
}
