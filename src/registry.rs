use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::validation::ValidationRule;
use crate::value::FieldValue;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(Arc<str>);

impl FieldKey {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FieldKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

#[derive(Clone, Debug)]
pub struct FieldState {
    pub value: FieldValue,
    pub initial_value: FieldValue,
    pub error: Option<String>,
    pub touched: bool,
    pub dirty: bool,
    pub validating: bool,
    pub(crate) sequence: u64,
}

impl FieldState {
    pub(crate) fn new(initial: FieldValue) -> Self {
        Self {
            value: initial.clone(),
            initial_value: initial,
            error: None,
            touched: false,
            dirty: false,
            validating: false,
            sequence: 0,
        }
    }

    pub(crate) fn recompute_dirty(&mut self) {
        self.dirty = self.value != self.initial_value;
    }
}

/// Insertion-ordered field storage. Unregistered fields leave their last
/// value parked so a re-registration of the same name picks it back up.
pub(crate) struct FieldRegistry {
    fields: IndexMap<FieldKey, FieldState>,
    rules: BTreeMap<FieldKey, Arc<ValidationRule>>,
    parked: BTreeMap<FieldKey, FieldValue>,
}

impl FieldRegistry {
    pub(crate) fn new() -> Self {
        Self {
            fields: IndexMap::new(),
            rules: BTreeMap::new(),
            parked: BTreeMap::new(),
        }
    }

    /// Idempotent per name: a second registration swaps the rule but leaves
    /// the current value and interaction state untouched.
    pub(crate) fn register(
        &mut self,
        key: FieldKey,
        initial: FieldValue,
        rule: Arc<ValidationRule>,
    ) -> bool {
        if self.fields.contains_key(&key) {
            self.rules.insert(key, rule);
            return false;
        }
        let mut state = FieldState::new(initial);
        if let Some(parked) = self.parked.remove(&key) {
            state.value = parked;
            state.recompute_dirty();
        }
        self.fields.insert(key.clone(), state);
        self.rules.insert(key, rule);
        true
    }

    pub(crate) fn unregister(&mut self, key: &FieldKey) -> bool {
        let Some(state) = self.fields.shift_remove(key) else {
            return false;
        };
        self.parked.insert(key.clone(), state.value);
        self.rules.remove(key);
        true
    }

    pub(crate) fn get(&self, key: &FieldKey) -> Option<&FieldState> {
        self.fields.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &FieldKey) -> Option<&mut FieldState> {
        self.fields.get_mut(key)
    }

    pub(crate) fn rule(&self, key: &FieldKey) -> Option<Arc<ValidationRule>> {
        self.rules.get(key).cloned()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&FieldKey, &FieldState)> {
        self.fields.iter()
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (&FieldKey, &mut FieldState)> {
        self.fields.iter_mut()
    }

    pub(crate) fn keys(&self) -> Vec<FieldKey> {
        self.fields.keys().cloned().collect()
    }

    pub(crate) fn clear_parked(&mut self) {
        self.parked.clear();
    }
}
