//! Cache eviction policies

use serde::{Deserialize, Serialize};

use blobvault_db::EvictionOrder;

/// Eviction policy for cache management
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least Recently Used - evict items that haven't been accessed recently
    #[default]
    Lru,
    /// Least Frequently Used - evict items with the lowest access count
    Lfu,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lru" => Some(EvictionPolicy::Lru),
            "lfu" => Some(EvictionPolicy::Lfu),
            _ => None,
        }
    }

    pub(crate) fn order(&self) -> EvictionOrder {
        match self {
            EvictionPolicy::Lru => EvictionOrder::LastAccessed,
            EvictionPolicy::Lfu => EvictionOrder::Accesses,
        }
    }
}
