//! A single uid/gid translation segment.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use nsshift_common::error::ShiftError;

use crate::range::{Axis, IdRange};

/// One contiguous translation from a host-id range to a container-id range.
///
/// Exactly one of `is_uid`/`is_gid` is set for entries built by the readers
/// and the resolver; the textual descriptor form additionally allows `b`
/// entries covering both axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdmapEntry {
    /// Entry applies to uids.
    pub is_uid: bool,
    /// Entry applies to gids.
    pub is_gid: bool,
    /// Container-side start of the range.
    pub nsid: i64,
    /// Host-side start of the range.
    pub hostid: i64,
    /// Number of ids covered.
    pub maprange: i64,
}

impl IdmapEntry {
    /// Whether this entry translates ids on the given axis.
    #[must_use]
    pub fn covers_axis(&self, axis: Axis) -> bool {
        match axis {
            Axis::Uid => self.is_uid,
            Axis::Gid => self.is_gid,
        }
    }

    /// Whether `id` falls inside the host-side range.
    #[must_use]
    pub fn contains_host(&self, id: i64) -> bool {
        id >= self.hostid && id < self.hostid + self.maprange
    }

    /// Whether `id` falls inside the container-side range.
    #[must_use]
    pub fn contains_ns(&self, id: i64) -> bool {
        id >= self.nsid && id < self.nsid + self.maprange
    }

    /// Translates a host id into the container namespace. The caller must
    /// have checked [`contains_host`](Self::contains_host).
    #[must_use]
    pub fn to_ns(&self, host_id: i64) -> i64 {
        host_id - self.hostid + self.nsid
    }

    /// Translates a container id back to the host. The caller must have
    /// checked [`contains_ns`](Self::contains_ns).
    #[must_use]
    pub fn to_host(&self, ns_id: i64) -> i64 {
        ns_id - self.nsid + self.hostid
    }

    /// Host-side range of this entry on the given axis, if it covers the
    /// axis and is non-empty.
    #[must_use]
    pub fn host_range(&self, axis: Axis) -> Option<IdRange> {
        if !self.covers_axis(axis) || self.maprange < 1 {
            return None;
        }
        Some(IdRange::new(
            axis,
            id_to_u32(self.hostid),
            id_to_u32(self.hostid + self.maprange - 1),
        ))
    }

    /// Whether two entries share an axis and their host-side ranges overlap.
    #[must_use]
    pub fn hostids_intersect(&self, other: &IdmapEntry) -> bool {
        sides_intersect(self, other, |e| e.hostid)
    }

    /// Whether two entries share an axis and their container-side ranges
    /// overlap.
    #[must_use]
    pub fn nsids_intersect(&self, other: &IdmapEntry) -> bool {
        sides_intersect(self, other, |e| e.nsid)
    }

    /// Canonical textual form: `<b|u|g> <nsid> <hostid> <maprange>`.
    #[must_use]
    pub fn to_lxc_string(&self) -> String {
        let tag = if self.is_uid && self.is_gid {
            "b"
        } else if self.is_uid {
            "u"
        } else {
            "g"
        };
        format!("{tag} {} {} {}", self.nsid, self.hostid, self.maprange)
    }
}

fn sides_intersect(a: &IdmapEntry, b: &IdmapEntry, side: impl Fn(&IdmapEntry) -> i64) -> bool {
    let shared_axis = (a.is_uid && b.is_uid) || (a.is_gid && b.is_gid);
    if !shared_axis || a.maprange < 1 || b.maprange < 1 {
        return false;
    }
    side(a) < side(b) + b.maprange && side(b) < side(a) + a.maprange
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn id_to_u32(id: i64) -> u32 {
    id as u32
}

impl FromStr for IdmapEntry {
    type Err = ShiftError;

    /// Parses the colon descriptor form `<b|u|g>:<nsid>:<hostid>:<maprange>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ShiftError::RangeInvariant { entry: s.into() };

        let fields: Vec<&str> = s.split(':').collect();
        let [tag, nsid, hostid, maprange] = fields.as_slice() else {
            return Err(invalid());
        };

        let (is_uid, is_gid) = match *tag {
            "u" => (true, false),
            "g" => (false, true),
            "b" => (true, true),
            _ => return Err(invalid()),
        };

        let entry = IdmapEntry {
            is_uid,
            is_gid,
            nsid: i64::from(nsid.parse::<u32>().map_err(|_| invalid())?),
            hostid: i64::from(hostid.parse::<u32>().map_err(|_| invalid())?),
            maprange: i64::from(maprange.parse::<u32>().map_err(|_| invalid())?),
        };

        if entry.maprange < 1 {
            return Err(invalid());
        }

        Ok(entry)
    }
}
