//! Provider instances owned by a router.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::SharedProvider;

/// One dispatch target: a provider handle plus its identity.
///
/// Several instances may share the same provider for load distribution.
#[derive(Clone)]
pub struct Instance {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub handle: SharedProvider,
}

impl Instance {
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        handle: SharedProvider,
    ) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            model: model.into(),
            handle,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Read-only view of an instance's routing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub available: bool,
    pub last_used: Option<DateTime<Utc>>,
}

/// Mutable routing state, guarded by the router's lock.
#[derive(Debug)]
pub(crate) struct RoutingState {
    pub(crate) status: Vec<InstanceStatus>,
    pub(crate) cursor: usize,
}

impl RoutingState {
    pub(crate) fn new(instances: &[Instance]) -> Self {
        Self {
            status: instances
                .iter()
                .map(|i| InstanceStatus {
                    id: i.id.clone(),
                    provider: i.provider.clone(),
                    model: i.model.clone(),
                    available: true,
                    last_used: None,
                })
                .collect(),
            cursor: 0,
        }
    }

    /// Scan once around the list from the cursor for an available instance.
    ///
    /// The cursor always moves past every inspected slot, so repeated calls
    /// rotate through the available instances.
    pub(crate) fn advance(&mut self) -> Option<usize> {
        let len = self.status.len();
        if len == 0 {
            return None;
        }
        let start = self.cursor;
        loop {
            let idx = self.cursor;
            self.cursor = (self.cursor + 1) % len;
            if self.status[idx].available {
                return Some(idx);
            }
            if self.cursor == start {
                return None;
            }
        }
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.status.iter().position(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(flags: &[bool]) -> RoutingState {
        RoutingState {
            status: flags
                .iter()
                .enumerate()
                .map(|(i, available)| InstanceStatus {
                    id: format!("p-{}", i + 1),
                    provider: "p".to_string(),
                    model: "m".to_string(),
                    available: *available,
                    last_used: None,
                })
                .collect(),
            cursor: 0,
        }
    }

    #[test]
    fn test_advance_round_robin() {
        let mut s = state(&[true, true, true]);
        assert_eq!(s.advance(), Some(0));
        assert_eq!(s.advance(), Some(1));
        assert_eq!(s.advance(), Some(2));
        assert_eq!(s.advance(), Some(0));
    }

    #[test]
    fn test_advance_skips_unavailable() {
        let mut s = state(&[false, true, false]);
        assert_eq!(s.advance(), Some(1));
        assert_eq!(s.advance(), Some(1));
    }

    #[test]
    fn test_advance_none_available() {
        let mut s = state(&[false, false]);
        assert_eq!(s.advance(), None);
        assert_eq!(state(&[]).advance(), None);
    }
}
