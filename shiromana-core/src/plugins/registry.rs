//! Trigger registry - which modules listen to which trigger token

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use super::module::{ModuleId, PluginModule};

struct Subscriber {
    id: ModuleId,
    module: Weak<PluginModule>,
}

/// Maps trigger tokens to subscribed modules in subscription order.
///
/// Holds only weak references: the host's module table owns every module,
/// and the registry never keeps one alive.
#[derive(Default)]
pub struct TriggerRegistry {
    by_token: HashMap<String, Vec<Subscriber>>,
    /// Reverse index so a module can be removed without scanning every token
    by_module: HashMap<ModuleId, Vec<String>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `module` to `token`. Returns false if it already was.
    pub fn subscribe(&mut self, module: &Arc<PluginModule>, token: &str) -> bool {
        let tokens = self.by_module.entry(module.id()).or_default();
        if tokens.iter().any(|t| t == token) {
            return false;
        }
        tokens.push(token.to_string());

        self.by_token
            .entry(token.to_string())
            .or_default()
            .push(Subscriber {
                id: module.id(),
                module: Arc::downgrade(module),
            });
        true
    }

    /// Remove `id` from every token it is subscribed to. Returns how many
    /// subscriptions were dropped.
    pub fn unsubscribe_all(&mut self, id: ModuleId) -> usize {
        let Some(tokens) = self.by_module.remove(&id) else {
            return 0;
        };

        for token in &tokens {
            if let Some(subscribers) = self.by_token.get_mut(token) {
                subscribers.retain(|s| s.id != id);
                if subscribers.is_empty() {
                    self.by_token.remove(token);
                }
            }
        }
        tokens.len()
    }

    /// Modules subscribed to `token`, in subscription order. Unknown tokens
    /// yield an empty list.
    pub fn lookup(&self, token: &str) -> Vec<Arc<PluginModule>> {
        self.by_token
            .get(token)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .filter_map(|s| s.module.upgrade())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tokens `id` is subscribed to, in declaration order.
    pub fn subscriptions(&self, id: ModuleId) -> &[String] {
        self.by_module.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every token with at least one subscriber.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.by_token.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}
