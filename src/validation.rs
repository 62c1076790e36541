use std::error::Error;
use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use crate::value::FieldValue;

/// Field error recorded when a custom validator faults instead of failing.
pub const VALIDATOR_FAULT_MESSAGE: &str = "Validation failed";

pub type ValidatorFault = Box<dyn Error + Send + Sync>;

/// A custom rule distinguishes a value that is invalid from a validator that
/// could not run at all. Faults are converted to [`VALIDATOR_FAULT_MESSAGE`]
/// at the controller boundary and reported to the validator-error hook.
#[derive(Debug)]
pub enum CustomError {
    Invalid(String),
    Fault(ValidatorFault),
}

pub type CustomResult = Result<(), CustomError>;

pub type BoxedValidationFuture = Pin<Box<dyn Future<Output = CustomResult> + Send + 'static>>;

type SyncCustomFn = Arc<dyn Fn(&FieldValue) -> CustomResult + Send + Sync>;
type AsyncCustomFn = Arc<dyn Fn(FieldValue) -> BoxedValidationFuture + Send + Sync>;

#[derive(Clone)]
pub(crate) enum CustomRule {
    Sync(SyncCustomFn),
    Async {
        debounce: Duration,
        validator: AsyncCustomFn,
    },
}

/// Declarative rule set for one field, evaluated with fixed precedence:
/// required, pattern, min_length, max_length, custom. First failure wins.
#[derive(Clone, Default)]
pub struct ValidationRule {
    pub(crate) required: Option<String>,
    pub(crate) min_length: Option<(usize, String)>,
    pub(crate) max_length: Option<(usize, String)>,
    pub(crate) pattern: Option<(Regex, String)>,
    pub(crate) custom: Option<CustomRule>,
}

impl ValidationRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, message: impl Into<String>) -> Self {
        self.required = Some(message.into());
        self
    }

    pub fn min_length(mut self, min: usize, message: impl Into<String>) -> Self {
        self.min_length = Some((min, message.into()));
        self
    }

    pub fn max_length(mut self, max: usize, message: impl Into<String>) -> Self {
        self.max_length = Some((max, message.into()));
        self
    }

    pub fn pattern(mut self, pattern: Regex, message: impl Into<String>) -> Self {
        self.pattern = Some((pattern, message.into()));
        self
    }

    pub fn custom<F>(mut self, validator: F) -> Self
    where
        F: Fn(&FieldValue) -> CustomResult + Send + Sync + 'static,
    {
        self.custom = Some(CustomRule::Sync(Arc::new(validator)));
        self
    }

    pub fn custom_async<F, Fut>(self, validator: F) -> Self
    where
        F: Fn(FieldValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CustomResult> + Send + 'static,
    {
        self.custom_async_debounced(0, validator)
    }

    pub fn custom_async_debounced<F, Fut>(mut self, debounce_ms: u64, validator: F) -> Self
    where
        F: Fn(FieldValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CustomResult> + Send + 'static,
    {
        let validator = Arc::new(validator);
        let wrapped: AsyncCustomFn = Arc::new(move |value| {
            let validator = Arc::clone(&validator);
            Box::pin(async move { validator(value).await })
        });
        self.custom = Some(CustomRule::Async {
            debounce: Duration::from_millis(debounce_ms),
            validator: wrapped,
        });
        self
    }

    pub(crate) fn has_async_custom(&self) -> bool {
        matches!(self.custom, Some(CustomRule::Async { .. }))
    }

    pub(crate) fn debounce(&self) -> Duration {
        match &self.custom {
            Some(CustomRule::Async { debounce, .. }) => *debounce,
            _ => Duration::ZERO,
        }
    }
}

impl Debug for ValidationRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("required", &self.required.is_some())
            .field("min_length", &self.min_length.as_ref().map(|(min, _)| min))
            .field("max_length", &self.max_length.as_ref().map(|(max, _)| max))
            .field(
                "pattern",
                &self.pattern.as_ref().map(|(regex, _)| regex.as_str()),
            )
            .field(
                "custom",
                &match &self.custom {
                    None => "none",
                    Some(CustomRule::Sync(_)) => "sync",
                    Some(CustomRule::Async { .. }) => "async",
                },
            )
            .finish()
    }
}

#[derive(Debug)]
pub enum Verdict {
    Pass,
    Fail(String),
    Fault(ValidatorFault),
}

/// Pure rule evaluator. All state mutation happens in the controller.
pub struct ValidationEngine;

impl ValidationEngine {
    /// Runs the structural checks only. Empty values of non-required fields
    /// pass the shape checks; use `required` to reject them.
    pub fn check_structural(value: &FieldValue, rule: &ValidationRule) -> Option<String> {
        if let Some(message) = &rule.required
            && value.is_empty()
        {
            return Some(message.clone());
        }
        if value.is_empty() {
            return None;
        }
        if let Some(text) = value.as_text() {
            if let Some((pattern, message)) = &rule.pattern
                && !pattern.is_match(text)
            {
                return Some(message.clone());
            }
            if let Some((min, message)) = &rule.min_length
                && text.chars().count() < *min
            {
                return Some(message.clone());
            }
            if let Some((max, message)) = &rule.max_length
                && text.chars().count() > *max
            {
                return Some(message.clone());
            }
        }
        None
    }

    /// Structural checks plus a synchronous custom rule. An asynchronous
    /// custom rule is not evaluated here; see [`ValidationEngine::run`].
    pub fn run_sync(value: &FieldValue, rule: &ValidationRule) -> Verdict {
        if let Some(message) = Self::check_structural(value, rule) {
            return Verdict::Fail(message);
        }
        if let Some(CustomRule::Sync(validator)) = &rule.custom {
            return match validator(value) {
                Ok(()) => Verdict::Pass,
                Err(CustomError::Invalid(message)) => Verdict::Fail(message),
                Err(CustomError::Fault(fault)) => Verdict::Fault(fault),
            };
        }
        Verdict::Pass
    }

    /// Full evaluation, awaiting an asynchronous custom rule when present.
    pub async fn run(value: &FieldValue, rule: &ValidationRule) -> Verdict {
        match Self::run_sync(value, rule) {
            Verdict::Pass => {}
            failed => return failed,
        }
        if let Some(CustomRule::Async { validator, .. }) = &rule.custom {
            return match validator(value.clone()).await {
                Ok(()) => Verdict::Pass,
                Err(CustomError::Invalid(message)) => Verdict::Fail(message),
                Err(CustomError::Fault(fault)) => Verdict::Fault(fault),
            };
        }
        Verdict::Pass
    }
}
