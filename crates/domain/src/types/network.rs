//! Connectivity state.

use serde::{Deserialize, Serialize};

/// Connectivity state delivered to network listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    Online,
    Offline,
}

crate::impl_domain_status_conversions!(ConnectivityStatus {
    Online => "online",
    Offline => "offline",
});

impl ConnectivityStatus {
    #[must_use]
    pub const fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }

    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_online() {
        assert_eq!(ConnectivityStatus::from_online(true), ConnectivityStatus::Online);
        assert!(!ConnectivityStatus::from_online(false).is_online());
        assert_eq!(ConnectivityStatus::Offline.to_string(), "offline");
    }
}
