use std::fmt;
use std::time::SystemTime;

use opentelemetry::{Context, KeyValue};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::data::Exemplar;

use super::{new_exemplar, ExemplarReservoir};

/// Keeps a uniformly random sample of at most `k` measurements per
/// collection cycle.
///
/// Sampling uses Algorithm L (Li, 1994): the first `k` measurements fill the
/// reservoir, after which a geometric skip decides which of the following
/// measurements replace a random slot.
#[derive(Debug)]
pub struct FixedSizeReservoir<T> {
    k: usize,
    store: Vec<Exemplar<T>>,
    /// Measurements offered since the last collection.
    count: u64,
    /// Index of the next measurement to sample once the store is full.
    next: u64,
    w: f64,
    rng: SmallRng,
}

impl<T> FixedSizeReservoir<T> {
    /// Creates a reservoir holding at most `k` exemplars.
    pub fn new(k: usize) -> Self {
        Self::with_rng(k, SmallRng::from_os_rng())
    }

    /// Creates a reservoir whose sampling decisions derive from `seed`.
    pub fn with_seed(k: usize, seed: u64) -> Self {
        Self::with_rng(k, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(k: usize, rng: SmallRng) -> Self {
        let mut reservoir = FixedSizeReservoir {
            k,
            store: Vec::with_capacity(k),
            count: 0,
            next: 0,
            w: 0.0,
            rng,
        };
        reservoir.reset();
        reservoir
    }

    /// Random value in the open interval (0, 1).
    fn random_f64(&mut self) -> f64 {
        loop {
            let f: f64 = self.rng.random();
            if f != 0.0 {
                return f;
            }
        }
    }

    fn skip(&mut self) -> u64 {
        let skip = self.random_f64().ln() / (1.0 - self.w).ln();
        // Saturating float to int cast; NaN maps to 0.
        skip as u64
    }

    fn reset(&mut self) {
        self.count = 0;
        self.w = (self.random_f64().ln() / self.k as f64).exp();
        let skip = self.skip();
        self.next = (self.k as u64).saturating_add(skip);
    }

    fn advance(&mut self) {
        self.w *= (self.random_f64().ln() / self.k as f64).exp();
        let skip = self.skip();
        self.next = self.next.saturating_add(skip).saturating_add(1);
    }
}

impl<T> ExemplarReservoir<T> for FixedSizeReservoir<T>
where
    T: fmt::Debug + Copy + Send + 'static,
{
    fn offer(&mut self, cx: &Context, time: SystemTime, value: T, dropped: &[KeyValue]) {
        if self.k == 0 {
            return;
        }

        if self.store.len() < self.k {
            self.store.push(new_exemplar(cx, time, value, dropped));
        } else if self.count == self.next {
            let idx = self.rng.random_range(0..self.k);
            self.store[idx] = new_exemplar(cx, time, value, dropped);
            self.advance();
        }
        self.count += 1;
    }

    fn collect(&mut self, dest: &mut Vec<Exemplar<T>>) {
        dest.clear();
        dest.append(&mut self.store);
        self.reset();
    }
}
