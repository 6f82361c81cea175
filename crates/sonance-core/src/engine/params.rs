//! Parameter slots
//!
//! Names are resolved to slot indices on the control side so the render
//! context only ever sees `(slot, value)` pairs.

use std::collections::HashMap;

/// Total number of parameter slots
pub const MAX_PARAMETERS: usize = 64;

/// Linear output gain
pub const MASTER_GAIN: usize = 0;
/// Gain applied to frames read from the transport
pub const TRANSPORT_GAIN: usize = 1;
/// Voice release ramp length in milliseconds
pub const RELEASE_MS: usize = 2;
/// Global pitch offset in semitones
pub const PITCH_BEND: usize = 3;

const BUILTIN: [(&str, usize, f32); 4] = [
    ("master_gain", MASTER_GAIN, 1.0),
    ("transport_gain", TRANSPORT_GAIN, 1.0),
    ("release_ms", RELEASE_MS, 5.0),
    ("pitch_bend", PITCH_BEND, 0.0),
];

/// Default value of every slot
pub fn default_values() -> [f32; MAX_PARAMETERS] {
    let mut values = [0.0; MAX_PARAMETERS];
    for (_, slot, default) in BUILTIN {
        values[slot] = default;
    }
    values
}

/// Name to slot mapping, owned by the control context
#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    slots: HashMap<String, usize>,
    next: usize,
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterRegistry {
    pub fn new() -> Self {
        let slots = BUILTIN
            .iter()
            .map(|(name, slot, _)| (name.to_string(), *slot))
            .collect();
        Self {
            slots,
            next: BUILTIN.len(),
        }
    }

    /// Slot for `name`, assigning the next free one on first use
    ///
    /// `None` once all slots are taken.
    pub fn resolve(&mut self, name: &str) -> Option<usize> {
        if let Some(&slot) = self.slots.get(name) {
            return Some(slot);
        }
        if self.next >= MAX_PARAMETERS {
            return None;
        }
        let slot = self.next;
        self.next += 1;
        self.slots.insert(name.to_string(), slot);
        log::debug!("Assigned parameter '{}' to slot {}", name, slot);
        Some(slot)
    }

    /// Slot for `name` without assigning one
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_have_fixed_slots() {
        let mut registry = ParameterRegistry::new();
        assert_eq!(registry.resolve("master_gain"), Some(MASTER_GAIN));
        assert_eq!(registry.resolve("pitch_bend"), Some(PITCH_BEND));
        assert_eq!(default_values()[MASTER_GAIN], 1.0);
    }

    #[test]
    fn test_custom_names_are_stable() {
        let mut registry = ParameterRegistry::new();
        let cutoff = registry.resolve("cutoff").unwrap();
        assert_eq!(cutoff, BUILTIN.len());
        assert_eq!(registry.resolve("cutoff"), Some(cutoff));
        assert_eq!(registry.lookup("cutoff"), Some(cutoff));
        assert_eq!(registry.lookup("unknown"), None);
    }

    #[test]
    fn test_slots_run_out() {
        let mut registry = ParameterRegistry::new();
        for i in 0..(MAX_PARAMETERS - BUILTIN.len()) {
            assert!(registry.resolve(&format!("p{i}")).is_some());
        }
        assert_eq!(registry.resolve("one_too_many"), None);
        assert_eq!(registry.len(), MAX_PARAMETERS);
    }
}
