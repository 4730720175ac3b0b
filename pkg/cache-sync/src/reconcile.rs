use std::cmp::Ordering;

use schema::PhoenixDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Remote,
    Local,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Self::Remote => Self::Local,
            Self::Local => Self::Remote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// No usable local copy.
    LocalMissing,
    /// The remote copy could not be fetched or does not exist.
    RemoteMissing,
    /// One side has outlets and the other has none.
    NonEmptyPrecedence,
    NewerTimestamp,
    MoreOutlets,
    /// Same timestamp, same outlet count.
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub winner: Side,
    pub reason: Reason,
}

impl Decision {
    fn new(winner: Side, reason: Reason) -> Self {
        Self { winner, reason }
    }

    pub fn loser(&self) -> Side {
        self.winner.other()
    }
}

/// Picks the copy to treat as current. `None` for a side means it was absent,
/// unparsable or unreachable.
///
/// Order: a missing side loses; an empty document never beats a non-empty
/// one; then the lexically newer `lastUpdated` wins; then the larger outlet
/// count; a full tie keeps the remote copy. Returns `None` only when both
/// sides are missing.
pub fn choose(
    remote: Option<&PhoenixDocument>,
    local: Option<&PhoenixDocument>,
) -> Option<Decision> {
    let (remote, local) = match (remote, local) {
        (None, None) => return None,
        (Some(_), None) => return Some(Decision::new(Side::Remote, Reason::LocalMissing)),
        (None, Some(_)) => return Some(Decision::new(Side::Local, Reason::RemoteMissing)),
        (Some(remote), Some(local)) => (remote, local),
    };

    match (remote.is_empty(), local.is_empty()) {
        (false, true) => return Some(Decision::new(Side::Remote, Reason::NonEmptyPrecedence)),
        (true, false) => return Some(Decision::new(Side::Local, Reason::NonEmptyPrecedence)),
        _ => {}
    }

    // A missing stamp sorts before any stamp.
    match remote.last_updated().cmp(&local.last_updated()) {
        Ordering::Greater => return Some(Decision::new(Side::Remote, Reason::NewerTimestamp)),
        Ordering::Less => return Some(Decision::new(Side::Local, Reason::NewerTimestamp)),
        Ordering::Equal => {}
    }

    Some(match remote.outlet_count().cmp(&local.outlet_count()) {
        Ordering::Less => Decision::new(Side::Local, Reason::MoreOutlets),
        Ordering::Greater => Decision::new(Side::Remote, Reason::MoreOutlets),
        Ordering::Equal => Decision::new(Side::Remote, Reason::Tie),
    })
}
