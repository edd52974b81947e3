//! The ordered collection of translation entries for one container.
//!
//! A set is built once per container start, validated with
//! [`IdmapSet::usable`], and treated as immutable afterwards. Translation is
//! a linear scan in construction order; the non-overlap invariant makes the
//! result independent of that order.

use serde::{Deserialize, Serialize};

use nsshift_common::error::{Result, ShiftError};

use crate::entry::IdmapEntry;
use crate::range::{Axis, IdRange};

/// An ordered sequence of [`IdmapEntry`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdmapSet {
    /// Entries in construction order.
    pub idmap: Vec<IdmapEntry>,
}

impl IdmapSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.idmap.len()
    }

    /// Whether the set holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.idmap.is_empty()
    }

    /// Appends an entry without validation.
    ///
    /// The readers and the resolver use this to mirror the source databases
    /// verbatim; collisions are detected later by [`usable`](Self::usable).
    pub fn push(&mut self, entry: IdmapEntry) {
        self.idmap.push(entry);
    }

    /// Appends an entry, rejecting zero-length ranges and collisions with
    /// entries already in the set.
    ///
    /// # Errors
    ///
    /// Returns [`ShiftError::RangeInvariant`] when the entry is empty or
    /// overlaps an existing entry on either side of the translation.
    pub fn add(&mut self, entry: IdmapEntry) -> Result<()> {
        if entry.maprange < 1 {
            return Err(ShiftError::RangeInvariant {
                entry: entry.to_lxc_string(),
            });
        }

        for existing in &self.idmap {
            if entry.hostids_intersect(existing) || entry.nsids_intersect(existing) {
                return Err(ShiftError::RangeInvariant {
                    entry: entry.to_lxc_string(),
                });
            }
        }

        self.idmap.push(entry);
        Ok(())
    }

    /// Entries translating uids, in construction order.
    pub fn uid_entries(&self) -> impl Iterator<Item = &IdmapEntry> {
        self.idmap.iter().filter(|e| e.is_uid)
    }

    /// Entries translating gids, in construction order.
    pub fn gid_entries(&self) -> impl Iterator<Item = &IdmapEntry> {
        self.idmap.iter().filter(|e| e.is_gid)
    }

    /// Translates host ids into the container namespace.
    ///
    /// Returns `-1` on an axis with no covering entry.
    #[must_use]
    pub fn shift_into_ns(&self, uid: i64, gid: i64) -> (i64, i64) {
        let u = self
            .uid_entries()
            .find(|e| e.contains_host(uid))
            .map_or(-1, |e| e.to_ns(uid));
        let g = self
            .gid_entries()
            .find(|e| e.contains_host(gid))
            .map_or(-1, |e| e.to_ns(gid));
        (u, g)
    }

    /// Translates container ids back to the host.
    ///
    /// Returns `-1` on an axis with no covering entry.
    #[must_use]
    pub fn shift_from_ns(&self, uid: i64, gid: i64) -> (i64, i64) {
        let u = self
            .uid_entries()
            .find(|e| e.contains_ns(uid))
            .map_or(-1, |e| e.to_host(uid));
        let g = self
            .gid_entries()
            .find(|e| e.contains_ns(gid))
            .map_or(-1, |e| e.to_host(gid));
        (u, g)
    }

    /// Consolidates the entries into the minimal covering host-side ranges,
    /// uid ranges first. Touching entries merge; zero-length entries are
    /// dropped.
    #[must_use]
    pub fn valid_ranges(&self) -> Vec<IdRange> {
        let mut entry_ranges: Vec<IdRange> = self
            .idmap
            .iter()
            .flat_map(|e| {
                [Axis::Uid, Axis::Gid]
                    .into_iter()
                    .filter_map(move |axis| e.host_range(axis))
            })
            .collect();
        entry_ranges.sort();

        let mut ranges: Vec<IdRange> = Vec::new();
        for range in entry_ranges {
            match ranges
                .iter_mut()
                .find(|r| r.axis == range.axis && u64::from(r.end_id) + 1 == u64::from(range.start_id))
            {
                Some(adjacent) => adjacent.end_id = range.end_id,
                None => ranges.push(range),
            }
        }
        ranges
    }

    /// Validates the set against the calling process's namespace.
    ///
    /// # Errors
    ///
    /// Returns [`ShiftError::RangeInvariant`] for zero-length or colliding
    /// entries and [`ShiftError::Unusable`] for the first entry whose host
    /// ids are not delegated to the calling user.
    pub fn usable(&self) -> Result<()> {
        self.usable_with(&crate::resolver::current()?)
    }

    /// Validates the set against an explicit namespace snapshot.
    ///
    /// # Errors
    ///
    /// Same conditions as [`usable`](Self::usable).
    pub fn usable_with(&self, kernel: &IdmapSet) -> Result<()> {
        for entry in &self.idmap {
            if entry.maprange < 1 {
                return Err(ShiftError::RangeInvariant {
                    entry: entry.to_lxc_string(),
                });
            }
        }

        for (i, entry) in self.idmap.iter().enumerate() {
            for other in &self.idmap[i + 1..] {
                if entry.hostids_intersect(other) || entry.nsids_intersect(other) {
                    return Err(ShiftError::RangeInvariant {
                        entry: other.to_lxc_string(),
                    });
                }
            }
        }

        let delegated = kernel.valid_ranges();
        for entry in &self.idmap {
            for axis in [Axis::Uid, Axis::Gid] {
                let Some(host_range) = entry.host_range(axis) else {
                    continue;
                };

                let mut uncovered = vec![host_range];
                for range in delegated.iter().filter(|r| r.axis == axis) {
                    uncovered = uncovered
                        .into_iter()
                        .flat_map(|r| r.split_around(range))
                        .collect();
                }

                if !uncovered.is_empty() {
                    return Err(ShiftError::Unusable {
                        entry: entry.to_lxc_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Canonical textual form, one line per entry in construction order.
    #[must_use]
    pub fn to_lxc_strings(&self) -> Vec<String> {
        self.idmap.iter().map(IdmapEntry::to_lxc_string).collect()
    }

    /// Serializes the set to the persisted JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reads a set back from the persisted JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid serialized set.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: &str, nsid: i64, hostid: i64, maprange: i64) -> IdmapEntry {
        IdmapEntry {
            is_uid: tag.contains('u') || tag.contains('b'),
            is_gid: tag.contains('g') || tag.contains('b'),
            nsid,
            hostid,
            maprange,
        }
    }

    fn uid_only_set() -> IdmapSet {
        let mut set = IdmapSet::new();
        set.push(entry("u", 0, 100_000, 65_536));
        set
    }

    #[test]
    fn shift_into_ns_translates_covered_uid_and_flags_uncovered_gid() {
        let set = uid_only_set();
        assert_eq!(set.shift_into_ns(100_042, 100_042), (42, -1));
    }

    #[test]
    fn shift_into_ns_flags_ids_outside_every_entry() {
        let set = uid_only_set();
        assert_eq!(set.shift_into_ns(99_999, 0), (-1, -1));
        assert_eq!(set.shift_into_ns(165_536, 0), (-1, -1));
    }

    #[test]
    fn translation_round_trips_both_directions() {
        let mut set = uid_only_set();
        set.push(entry("g", 0, 200_000, 1_000));

        for host_uid in [100_000, 123_456, 165_535] {
            let (ns_uid, _) = set.shift_into_ns(host_uid, 200_500);
            let (back, _) = set.shift_from_ns(ns_uid, 0);
            assert_eq!(back, host_uid);
        }
        for ns_gid in [0, 500, 999] {
            let (_, host_gid) = set.shift_from_ns(0, ns_gid);
            let (_, back) = set.shift_into_ns(0, host_gid);
            assert_eq!(back, ns_gid);
        }
    }

    #[test]
    fn add_rejects_overlapping_entries() {
        let mut set = uid_only_set();
        let err = set
            .add(entry("u", 200_000, 150_000, 65_536))
            .expect_err("host ranges collide");
        assert!(matches!(err, ShiftError::RangeInvariant { .. }));

        let err = set
            .add(entry("u", 10, 500_000, 65_536))
            .expect_err("container ranges collide");
        assert!(matches!(err, ShiftError::RangeInvariant { .. }));

        set.add(entry("g", 0, 100_000, 65_536))
            .expect("other axis never collides");
    }

    #[test]
    fn valid_ranges_merges_touching_entries_per_axis() {
        let mut set = IdmapSet::new();
        set.push(entry("u", 0, 100_000, 65_536));
        set.push(entry("u", 65_536, 165_536, 1_000));
        set.push(entry("g", 0, 300_000, 10));

        assert_eq!(
            set.valid_ranges(),
            vec![
                IdRange::new(Axis::Uid, 100_000, 166_535),
                IdRange::new(Axis::Gid, 300_000, 300_009),
            ]
        );
    }

    #[test]
    fn valid_ranges_keeps_disjoint_ranges_apart_and_skips_empty_entries() {
        let mut set = IdmapSet::new();
        set.push(entry("u", 0, 50_000, 30_000));
        set.push(entry("u", 0, 100_000, 70_000));
        set.push(entry("g", 0, 0, 0));

        assert_eq!(
            set.valid_ranges(),
            vec![
                IdRange::new(Axis::Uid, 50_000, 79_999),
                IdRange::new(Axis::Uid, 100_000, 169_999),
            ]
        );
    }

    #[test]
    fn usable_with_accepts_delegated_entries() {
        let mut kernel = IdmapSet::new();
        kernel.push(entry("u", 0, 100_000, 165_536));
        kernel.push(entry("g", 0, 100_000, 165_536));

        let mut set = uid_only_set();
        set.push(entry("g", 0, 200_000, 1_000));
        set.usable_with(&kernel).expect("fully delegated");
    }

    #[test]
    fn usable_with_reports_first_undelegated_entry() {
        let mut kernel = IdmapSet::new();
        kernel.push(entry("u", 0, 100_000, 65_536));
        kernel.push(entry("g", 0, 100_000, 65_536));

        let mut set = uid_only_set();
        set.push(entry("g", 0, 150_000, 65_536));

        let err = set.usable_with(&kernel).expect_err("gid entry exceeds grant");
        match err {
            ShiftError::Unusable { entry } => assert_eq!(entry, "g 0 150000 65536"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn usable_with_rejects_zero_length_and_colliding_entries() {
        let kernel = {
            let mut k = IdmapSet::new();
            k.push(entry("u", 0, 0, 4_294_967_295));
            k.push(entry("g", 0, 0, 4_294_967_295));
            k
        };

        let mut zero = IdmapSet::new();
        zero.push(entry("u", 0, 100_000, 0));
        assert!(matches!(
            zero.usable_with(&kernel),
            Err(ShiftError::RangeInvariant { .. })
        ));

        let mut colliding = uid_only_set();
        colliding.push(entry("u", 500_000, 150_000, 65_536));
        assert!(matches!(
            colliding.usable_with(&kernel),
            Err(ShiftError::RangeInvariant { .. })
        ));
    }

    #[test]
    fn to_lxc_strings_preserves_construction_order() {
        let mut set = IdmapSet::new();
        set.push(entry("u", 0, 100_000, 65_536));
        set.push(entry("g", 0, 100_000, 65_536));
        assert_eq!(
            set.to_lxc_strings(),
            vec!["u 0 100000 65536", "g 0 100000 65536"]
        );
    }

    #[test]
    fn json_round_trip_preserves_entries() {
        let mut set = uid_only_set();
        set.push(entry("g", 0, 100_000, 65_536));

        let json = set.to_json().expect("serialize");
        let back = IdmapSet::from_json(&json).expect("deserialize");
        assert_eq!(back, set);
    }
}
