//! Uniform-grid spatial hash for near-constant-time neighbor queries.
//!
//! Positions map to integer bucket keys by dividing each coordinate by a
//! fixed bucket edge length and flooring. Point objects occupy exactly one
//! bucket; volume objects (obstacles) occupy every bucket their AABB
//! overlaps. Queries gather everything registered in the buckets that
//! intersect an axis-aligned box around a point, which over-approximates a
//! ball: callers get a guaranteed superset of the true radius-neighbors and
//! must apply an exact distance test afterwards.
//!
//! The bucket edge is fixed at construction. Too small relative to the
//! typical query radius and a query walks many buckets; too large and each
//! bucket holds most of the population. `2 * h` works well for the
//! simulation's `2h` neighbor boxes.

use std::hash::Hash;

use glam::Vec3;
use rustc_hash::FxHashMap;

use crate::error::SimError;

/// Integer bucket coordinates.
pub type CellKey = (i32, i32, i32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Registration {
    /// A point object and the single bucket holding it.
    Point(CellKey),
    /// A volume object and the inclusive bucket range of its AABB.
    Volume(CellKey, CellKey),
}

/// Uniform-grid hash from positions to sets of registered objects.
pub struct SpatialIndex<T> {
    cell: f32,
    buckets: FxHashMap<CellKey, Vec<T>>,
    registered: FxHashMap<T, Registration>,
}

impl<T: Copy + Eq + Hash> SpatialIndex<T> {
    /// Create an index with the given bucket edge length.
    pub fn new(cell: f32) -> Result<Self, SimError> {
        if !(cell > 0.0 && cell.is_finite()) {
            return Err(SimError::InvalidConfig {
                what: "spatial index bucket size must be positive and finite",
            });
        }
        Ok(Self {
            cell,
            buckets: FxHashMap::default(),
            registered: FxHashMap::default(),
        })
    }

    /// Bucket edge length this index was built with.
    pub fn cell_size(&self) -> f32 {
        self.cell
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    fn key_of(&self, p: Vec3) -> CellKey {
        (
            (p.x / self.cell).floor() as i32,
            (p.y / self.cell).floor() as i32,
            (p.z / self.cell).floor() as i32,
        )
    }

    /// Register a point object in the bucket its position maps to.
    pub fn insert_point(&mut self, item: T, pos: Vec3) {
        let key = self.key_of(pos);
        self.buckets.entry(key).or_default().push(item);
        self.registered.insert(item, Registration::Point(key));
    }

    /// Register a volume object in every bucket its AABB overlaps.
    pub fn insert_volume(&mut self, item: T, min: Vec3, max: Vec3) {
        let lo = self.key_of(min.min(max));
        let hi = self.key_of(min.max(max));
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                for z in lo.2..=hi.2 {
                    self.buckets.entry((x, y, z)).or_default().push(item);
                }
            }
        }
        self.registered.insert(item, Registration::Volume(lo, hi));
    }

    /// Remove an object from its current bucket(s).
    pub fn remove(&mut self, item: T) -> Result<(), SimError> {
        match self.registered.remove(&item) {
            Some(Registration::Point(key)) => {
                self.detach(item, key);
                Ok(())
            }
            Some(Registration::Volume(lo, hi)) => {
                for x in lo.0..=hi.0 {
                    for y in lo.1..=hi.1 {
                        for z in lo.2..=hi.2 {
                            self.detach(item, (x, y, z));
                        }
                    }
                }
                Ok(())
            }
            None => Err(SimError::NotIndexed),
        }
    }

    fn detach(&mut self, item: T, key: CellKey) {
        if let Some(bucket) = self.buckets.get_mut(&key) {
            if let Some(at) = bucket.iter().position(|&e| e == item) {
                bucket.swap_remove(at);
            }
            if bucket.is_empty() {
                self.buckets.remove(&key);
            }
        }
    }

    /// Rebucket a point object after its position changed.
    ///
    /// No-op while the object stays inside its current bucket. Must be
    /// called once per object per step after its position is updated, or
    /// the object's membership goes stale. Volume objects are static and
    /// keep their registration.
    pub fn update_point(&mut self, item: T, pos: Vec3) -> Result<(), SimError> {
        let old = match self.registered.get(&item) {
            Some(Registration::Point(key)) => *key,
            Some(Registration::Volume(..)) => return Ok(()),
            None => return Err(SimError::NotIndexed),
        };
        let new = self.key_of(pos);
        if old == new {
            return Ok(());
        }
        self.detach(item, old);
        self.buckets.entry(new).or_default().push(item);
        self.registered.insert(item, Registration::Point(new));
        Ok(())
    }

    /// Collect every object registered in a bucket intersecting the cube of
    /// half-extent `radius` around `point`, into `out` (cleared first).
    ///
    /// Superset guarantee: anything within true Euclidean distance `radius`
    /// of `point` is present; corner false-positives are the caller's to
    /// filter. Radius 0 visits only the point's own bucket.
    pub fn query_box(&self, point: Vec3, radius: f32, out: &mut Vec<T>) {
        let r = radius.max(0.0);
        let lo = self.key_of(point - Vec3::splat(r));
        let hi = self.key_of(point + Vec3::splat(r));
        self.collect(lo, hi, out);
    }

    /// 2D variant of [`query_box`](Self::query_box): scans a square in the
    /// XY plane at the point's own z bucket.
    pub fn query_box_xy(&self, point: Vec3, radius: f32, out: &mut Vec<T>) {
        let r = radius.max(0.0);
        let lo = self.key_of(point - Vec3::new(r, r, 0.0));
        let hi = self.key_of(point + Vec3::new(r, r, 0.0));
        self.collect(lo, hi, out);
    }

    fn collect(&self, lo: CellKey, hi: CellKey, out: &mut Vec<T>) {
        out.clear();
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                for z in lo.2..=hi.2 {
                    let Some(bucket) = self.buckets.get(&(x, y, z)) else {
                        continue;
                    };
                    for &item in bucket {
                        // A volume object spanning several visited buckets
                        // must still appear once.
                        if matches!(self.registered.get(&item), Some(Registration::Volume(..)))
                            && out.contains(&item)
                        {
                            continue;
                        }
                        out.push(item);
                    }
                }
            }
        }
    }

    /// The bucket(s) currently associated with an object, for membership
    /// checks in tests and assertions.
    pub fn contains_at(&self, item: T, pos: Vec3) -> bool {
        match self.registered.get(&item) {
            Some(Registration::Point(key)) => *key == self.key_of(pos),
            Some(Registration::Volume(lo, hi)) => {
                let k = self.key_of(pos);
                (lo.0..=hi.0).contains(&k.0)
                    && (lo.1..=hi.1).contains(&k.1)
                    && (lo.2..=hi.2).contains(&k.2)
            }
            None => false,
        }
    }
}
