use crate::controller::{FormController, FormError, FormResult};
use crate::registry::{FieldKey, FieldState};
use crate::subscribe::{Scope, Subscription};
use crate::value::FieldValue;

/// Per-field handle returned by registration: state getters plus setters
/// bound to the owning controller. Cheap to clone; any UI layer can hold one
/// per input and subscribe to that field's scope only.
#[derive(Clone)]
pub struct FieldHandle {
    controller: FormController,
    key: FieldKey,
}

impl FieldHandle {
    pub(crate) fn new(controller: FormController, key: FieldKey) -> Self {
        Self { controller, key }
    }

    pub fn key(&self) -> &FieldKey {
        &self.key
    }

    pub fn state(&self) -> FormResult<FieldState> {
        self.controller
            .field(&self.key)?
            .ok_or_else(|| FormError::UnknownField(self.key.clone()))
    }

    pub fn value(&self) -> FormResult<FieldValue> {
        Ok(self.state()?.value)
    }

    pub fn error(&self) -> FormResult<Option<String>> {
        Ok(self.state()?.error)
    }

    /// Error gated for display: suppressed until the field was touched or
    /// the form submitted.
    pub fn error_for_display(&self) -> FormResult<Option<String>> {
        self.controller.error_for_display(&self.key)
    }

    pub fn touched(&self) -> FormResult<bool> {
        Ok(self.state()?.touched)
    }

    pub fn dirty(&self) -> FormResult<bool> {
        Ok(self.state()?.dirty)
    }

    pub fn validating(&self) -> FormResult<bool> {
        Ok(self.state()?.validating)
    }

    pub fn set_value(&self, value: impl Into<FieldValue>) -> FormResult<()> {
        self.controller.set_value(&self.key, value)
    }

    pub async fn set_value_async(&self, value: impl Into<FieldValue>) -> FormResult<()> {
        self.controller.set_value_async(&self.key, value).await
    }

    pub fn set_touched(&self, touched: bool) -> FormResult<()> {
        self.controller.set_touched(&self.key, touched)
    }

    pub async fn set_touched_async(&self, touched: bool) -> FormResult<()> {
        self.controller.set_touched_async(&self.key, touched).await
    }

    /// Subscribes to this field's scope only.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.controller
            .subscribe(Scope::Field(self.key.clone()), listener)
    }
}
