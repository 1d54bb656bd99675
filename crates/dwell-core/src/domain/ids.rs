//! Domain identifiers (strongly-typed IDs).
//!
//! Every identifier is a ULID wrapped in `Id<T>`, where `T` is a zero-sized
//! marker. `TaskId` and `LeaseToken` share one implementation but cannot be
//! mixed up at compile time.
//!
//! ## ULID properties
//! - sortable by creation time (timestamp prefix)
//! - generated without coordination between scheduler instances
//! - 128-bit, same size as a UUID

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Marker trait supplying the display prefix of an id type.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed identifier.
///
/// Serialized as the bare ULID string so payloads stay compact and stable.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Accepts both the prefixed display form (`task-01H...`) and a bare ULID.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lease {}

impl IdMarker for Lease {
    fn prefix() -> &'static str {
        "lease-"
    }
}

/// Identifier of a scheduled task, assigned by the durable store.
pub type TaskId = Id<Task>;

/// Opaque value stored under the migration lock key.
pub type LeaseToken = Id<Lease>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_prefix() {
        let ulid = Ulid::new();
        let task = TaskId::from_ulid(ulid);
        let lease = LeaseToken::from_ulid(ulid);

        assert_eq!(task.to_string(), format!("task-{ulid}"));
        assert_eq!(lease.to_string(), format!("lease-{ulid}"));
        // let _: TaskId = lease; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_bare_ulid() {
        let ulid = Ulid::new();
        let task = TaskId::from_ulid(ulid);

        let json = serde_json::to_string(&task).unwrap();
        assert_eq!(json, format!("\"{ulid}\""));

        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn parse_accepts_prefixed_and_bare_forms() {
        let task = TaskId::from_ulid(Ulid::new());

        assert_eq!(task.to_string().parse::<TaskId>().unwrap(), task);
        assert_eq!(task.as_ulid().to_string().parse::<TaskId>().unwrap(), task);
        assert!("task-not-a-ulid".parse::<TaskId>().is_err());
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TaskId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }
}
