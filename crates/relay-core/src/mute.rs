//! Address-keyed mute flags.
//!
//! Entries outlive sessions: an address stays muted across reconnects until
//! an operator unmutes it. A missing entry means "not muted".

use std::collections::HashMap;
use std::net::IpAddr;

use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MuteTable {
    flags: RwLock<HashMap<IpAddr, bool>>,
}

impl MuteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag for `address`. Idempotent.
    pub async fn set_muted(&self, address: IpAddr, muted: bool) {
        self.flags.write().await.insert(address, muted);
    }

    pub async fn is_muted(&self, address: IpAddr) -> bool {
        matches!(self.flags.read().await.get(&address), Some(true))
    }
}
