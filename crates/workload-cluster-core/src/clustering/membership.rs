//! Template-to-cluster membership.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Cluster identifier. Issued in increasing order and never reused.
pub type ClusterId = u64;

/// Serialized cluster id meaning "not in any cluster".
pub const UNASSIGNED_CLUSTER_ID: i64 = -1;

/// A template's cluster membership at one checkpoint.
///
/// Serializes as a plain integer, with `-1` standing for [`Membership::Unassigned`].
///
/// # Example
///
/// ```
/// use workload_cluster_core::clustering::Membership;
///
/// let m = Membership::Assigned(4);
/// assert_eq!(m.cluster(), Some(4));
/// assert_eq!(i64::from(Membership::Unassigned), -1);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Membership {
    /// The template has not arrived yet, or was demoted and found no home.
    #[default]
    Unassigned,
    /// The template belongs to a live cluster.
    Assigned(ClusterId),
}

impl Membership {
    /// The cluster this membership points to, if any.
    #[inline]
    pub fn cluster(self) -> Option<ClusterId> {
        match self {
            Membership::Unassigned => None,
            Membership::Assigned(id) => Some(id),
        }
    }

    #[inline]
    pub fn is_unassigned(self) -> bool {
        matches!(self, Membership::Unassigned)
    }
}

impl From<Membership> for i64 {
    fn from(m: Membership) -> i64 {
        match m {
            Membership::Unassigned => UNASSIGNED_CLUSTER_ID,
            Membership::Assigned(id) => id as i64,
        }
    }
}

impl TryFrom<i64> for Membership {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            UNASSIGNED_CLUSTER_ID => Ok(Membership::Unassigned),
            id if id >= 0 => Ok(Membership::Assigned(id as ClusterId)),
            other => Err(format!(
                "cluster id {} is negative and not the unassigned sentinel {}",
                other, UNASSIGNED_CLUSTER_ID
            )),
        }
    }
}

/// Membership of every known template at one checkpoint, keyed by template text.
pub type Assignment = BTreeMap<String, Membership>;
