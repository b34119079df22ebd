// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A namespace is a small integer tag partitioning the msg_type→handler
// map. Handlers are stored by value (as `Arc`-wrapped closures) in a
// plain table, never via subclassing or dynamic registration of types.

use std::sync::Arc;

use crate::endpoint::{Endpoint, SocketId};
use crate::error::{IvshmError, Result};
use crate::message::Message;

pub const MAX_MSG_TYPE: usize = 16;
pub const MAX_NAMESPACE: usize = 8;

pub const NS_SYS: u8 = 0;
pub const NS_NET: u8 = 1;
pub const NS_FS: u8 = 2;
pub const NS_VM: u8 = 3;
pub const NS_PROC: u8 = 4;

/// Context a handler runs with: the endpoint it was dispatched from and
/// the id of the socket the message arrived on.
pub struct HandlerContext<'a> {
    pub endpoint: &'a Endpoint,
    pub socket: SocketId,
}

pub type Handler = Arc<dyn Fn(&HandlerContext<'_>, &Message) -> Result<()> + Send + Sync>;

/// Fixed-capacity msg_type → handler table for one namespace. Slot 0 is
/// always empty; msg_type 0 is reserved and never dispatched.
pub struct NamespaceTable {
    handlers: Vec<Option<Handler>>,
}

impl NamespaceTable {
    pub fn new() -> Self {
        let mut handlers = Vec::with_capacity(MAX_MSG_TYPE + 1);
        handlers.resize_with(MAX_MSG_TYPE + 1, || None);
        Self { handlers }
    }

    pub fn register(&mut self, msg_type: u32, handler: Handler) -> Result<()> {
        let idx = msg_type as usize;
        if msg_type == 0 || idx >= self.handlers.len() {
            return Err(IvshmError::InvalidHandlerSlot {
                msg_type,
                max: MAX_MSG_TYPE,
            });
        }
        self.handlers[idx] = Some(handler);
        Ok(())
    }

    pub fn unregister(&mut self, msg_type: u32) {
        if let Some(slot) = self.handlers.get_mut(msg_type as usize) {
            *slot = None;
        }
    }

    pub fn get(&self, msg_type: u32) -> Option<Handler> {
        self.handlers.get(msg_type as usize).and_then(|s| s.clone())
    }
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_zero_is_always_reserved() {
        let mut t = NamespaceTable::new();
        let h: Handler = Arc::new(|_ctx, _m| Ok(()));
        assert!(t.register(0, h).is_err());
        assert!(t.get(0).is_none());
    }

    #[test]
    fn register_then_unregister_clears_the_slot() {
        let mut t = NamespaceTable::new();
        let h: Handler = Arc::new(|_ctx, _m| Ok(()));
        t.register(5, h).unwrap();
        assert!(t.get(5).is_some());
        t.unregister(5);
        assert!(t.get(5).is_none());
    }

    #[test]
    fn register_beyond_max_msg_type_is_rejected() {
        let mut t = NamespaceTable::new();
        let h: Handler = Arc::new(|_ctx, _m| Ok(()));
        assert!(t.register((MAX_MSG_TYPE + 1) as u32, h).is_err());
    }
}
