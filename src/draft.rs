use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};

use crate::controller::{
    FormController, FormError, FormId, FormResult, SubmitState, read_lock, write_lock,
};
use crate::subscribe::Scope;
use crate::value::FormValues;

pub trait FormDraftStore: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn save(&self, form_id: FormId, values: &FormValues) -> Result<(), Self::Error>;
    fn load(&self, form_id: FormId) -> Result<Option<FormValues>, Self::Error>;
    fn clear(&self, form_id: FormId) -> Result<(), Self::Error>;
}

#[derive(Clone, Default)]
pub struct InMemoryDraftStore {
    state: Arc<RwLock<BTreeMap<FormId, FormValues>>>,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FormDraftStore for InMemoryDraftStore {
    type Error = Infallible;

    fn save(&self, form_id: FormId, values: &FormValues) -> Result<(), Self::Error> {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.insert(form_id, values.clone());
        Ok(())
    }

    fn load(&self, form_id: FormId) -> Result<Option<FormValues>, Self::Error> {
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(state.get(&form_id).cloned())
    }

    fn clear(&self, form_id: FormId) -> Result<(), Self::Error> {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.remove(&form_id);
        Ok(())
    }
}

impl FormController {
    pub fn save_draft<S>(&self, store: &S) -> FormResult<()>
    where
        S: FormDraftStore,
    {
        let state = read_lock(&self.state, "saving draft")?;
        let values: FormValues = state
            .registry
            .entries()
            .map(|(key, field)| (key.clone(), field.value.clone()))
            .collect();
        store
            .save(state.id, &values)
            .map_err(|error| FormError::DraftSaveFailed(error.to_string()))
    }

    /// Loads a saved draft into the registered fields. Unknown draft keys are
    /// ignored; fields without a draft entry keep their current value.
    pub fn load_draft<S>(&self, store: &S) -> FormResult<bool>
    where
        S: FormDraftStore,
    {
        let form_id = self.form_id()?;
        let Some(draft) = store
            .load(form_id)
            .map_err(|error| FormError::DraftLoadFailed(error.to_string()))?
        else {
            return Ok(false);
        };

        let keys = {
            let mut state = write_lock(&self.state, "loading draft into form")?;
            state.submit_state = SubmitState::Idle;
            state.submit_count = 0;
            state.submit_error = None;
            let mut keys = Vec::new();
            for (key, field) in state.registry.entries_mut() {
                if let Some(value) = draft.get(key) {
                    field.value = value.clone();
                }
                field.recompute_dirty();
                field.error = None;
                field.validating = false;
                field.invalidate_in_flight();
                keys.push(key.clone());
            }
            keys
        };
        for key in &keys {
            self.bus.notify(&Scope::Field(key.clone()));
        }
        self.bus.notify(&Scope::Form);
        Ok(true)
    }

    pub fn clear_draft<S>(&self, store: &S) -> FormResult<()>
    where
        S: FormDraftStore,
    {
        let form_id = self.form_id()?;
        store
            .clear(form_id)
            .map_err(|error| FormError::DraftClearFailed(error.to_string()))
    }
}
