//! Reactive form state and validation engine: dynamic named fields, sync and
//! async validation rules with stale-result suppression, scoped change
//! subscriptions, and a submit/reset lifecycle. No rendering, no I/O.

mod binding;
mod controller;
mod draft;
mod registry;
mod stale;
mod subscribe;
mod validation;
mod value;

pub mod prelude;


pub use binding::FieldHandle;
pub use controller::{
    FormController, FormError, FormId, FormOptions, FormResult, FormSnapshot, SubmitResult,
    SubmitState, ValidationMode,
};
pub use draft::{FormDraftStore, InMemoryDraftStore};
pub use registry::{FieldKey, FieldState};
pub use stale::ValidationTicket;
pub use subscribe::{Scope, Subscription, SubscriptionBus};
pub use validation::{
    BoxedValidationFuture, CustomError, CustomResult, VALIDATOR_FAULT_MESSAGE, ValidationEngine,
    ValidationRule, ValidatorFault, Verdict,
};
pub use value::{FieldValue, FormValues};
