pub use crate::{
    CustomError, CustomResult, FieldHandle, FieldKey, FieldState, FieldValue, FormController,
    FormOptions, FormResult, FormValues, Scope, SubmitState, ValidationMode, ValidationRule,
};
