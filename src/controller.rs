use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::join_all;
use futures_timer::Delay;
use indexmap::IndexMap;
use log::{debug, warn};

use crate::binding::FieldHandle;
use crate::registry::{FieldKey, FieldRegistry, FieldState};
use crate::stale::ValidationTicket;
use crate::subscribe::{Scope, Subscription, SubscriptionBus};
use crate::validation::{
    VALIDATOR_FAULT_MESSAGE, ValidationEngine, ValidationRule, Verdict,
};
use crate::value::{FieldValue, FormValues};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

/// When a field (re)validates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    OnChange,
    OnBlur,
    OnSubmit,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormOptions {
    pub mode: ValidationMode,
    pub reset_on_submit: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            mode: ValidationMode::OnSubmit,
            reset_on_submit: false,
        }
    }
}

#[derive(Debug)]
pub enum FormError {
    StatePoisoned(&'static str),
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    UnknownField(FieldKey),
    DraftLoadFailed(String),
    DraftSaveFailed(String),
    DraftClearFailed(String),
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "form state lock poisoned while {context}")
            }
            FormError::InvalidStateTransition { from, to } => {
                write!(f, "invalid submit state transition: {from:?} -> {to:?}")
            }
            FormError::UnknownField(key) => write!(f, "field `{key}` is not registered"),
            FormError::DraftLoadFailed(error) => write!(f, "failed to load draft: {error}"),
            FormError::DraftSaveFailed(error) => write!(f, "failed to save draft: {error}"),
            FormError::DraftClearFailed(error) => write!(f, "failed to clear draft: {error}"),
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

/// Result the caller's submit handler resolves to. A rejection lands in
/// `submit_error`; it is never thrown back at the `submit` caller.
pub type SubmitResult = Result<(), Box<dyn Error + Send + Sync>>;

type ValidatorErrorHook = Arc<dyn Fn(&FieldKey, &(dyn Error + Send + Sync)) + Send + Sync>;

pub(crate) struct FormState {
    pub(crate) id: FormId,
    pub(crate) registry: FieldRegistry,
    pub(crate) initial_values: FormValues,
    pub(crate) preset_rules: BTreeMap<FieldKey, Arc<ValidationRule>>,
    pub(crate) submit_state: SubmitState,
    pub(crate) submit_count: u32,
    pub(crate) submit_error: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FormSnapshot {
    pub values: FormValues,
    pub fields: IndexMap<FieldKey, FieldState>,
    pub submit_state: SubmitState,
    pub submit_count: u32,
    pub submit_error: Option<String>,
    pub is_dirty: bool,
    pub is_valid: bool,
}

#[derive(Clone)]
pub struct FormController {
    pub(crate) options: FormOptions,
    pub(crate) state: Arc<RwLock<FormState>>,
    pub(crate) bus: SubscriptionBus,
    on_validator_error: Arc<RwLock<Option<ValidatorErrorHook>>>,
}

impl FormController {
    pub fn new(initial_values: FormValues, options: FormOptions) -> Self {
        Self::with_rules(initial_values, [], options)
    }

    /// Like [`FormController::new`], with rules a later `register` call can
    /// fall back to when it does not carry its own.
    pub fn with_rules(
        initial_values: FormValues,
        rules: impl IntoIterator<Item = (FieldKey, ValidationRule)>,
        options: FormOptions,
    ) -> Self {
        Self {
            options,
            state: Arc::new(RwLock::new(FormState {
                id: FormId::next(),
                registry: FieldRegistry::new(),
                initial_values,
                preset_rules: rules
                    .into_iter()
                    .map(|(key, rule)| (key, Arc::new(rule)))
                    .collect(),
                submit_state: SubmitState::Idle,
                submit_count: 0,
                submit_error: None,
            })),
            bus: SubscriptionBus::new(),
            on_validator_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    /// Receives the underlying cause whenever a custom validator faults.
    /// The fault never crashes the form; the field gets a generic error.
    pub fn set_validator_error_hook(
        &self,
        hook: impl Fn(&FieldKey, &(dyn Error + Send + Sync)) + Send + Sync + 'static,
    ) {
        if let Ok(mut slot) = self.on_validator_error.write() {
            *slot = Some(Arc::new(hook));
        }
    }

    pub fn subscribe(&self, scope: Scope, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.bus.subscribe(scope, listener)
    }

    /// Registers a field with the rule configured via
    /// [`FormController::with_rules`], if any. Idempotent per name: a second
    /// registration keeps the current value and interaction state.
    ///
    /// The initial value is the form's configured `initial_values[name]` when
    /// present, otherwise `default`. A value parked by a prior `unregister`
    /// of the same name takes priority over both.
    pub fn register(
        &self,
        name: impl Into<FieldKey>,
        default: impl Into<FieldValue>,
    ) -> FormResult<FieldHandle> {
        self.register_inner(name.into(), default.into(), None)
    }

    pub fn register_with_rule(
        &self,
        name: impl Into<FieldKey>,
        default: impl Into<FieldValue>,
        rule: ValidationRule,
    ) -> FormResult<FieldHandle> {
        self.register_inner(name.into(), default.into(), Some(Arc::new(rule)))
    }

    fn register_inner(
        &self,
        key: FieldKey,
        default: FieldValue,
        rule: Option<Arc<ValidationRule>>,
    ) -> FormResult<FieldHandle> {
        {
            let mut state = write_lock(&self.state, "registering field")?;
            let initial = state.initial_values.get(&key).cloned().unwrap_or(default);
            let rule = rule
                .or_else(|| state.preset_rules.get(&key).cloned())
                .unwrap_or_else(|| Arc::new(ValidationRule::new()));
            state.registry.register(key.clone(), initial, rule);
        }
        Ok(FieldHandle::new(self.clone(), key))
    }

    /// Drops the field from the registry and its scope's subscriptions. The
    /// last value is parked for a later re-registration of the same name.
    pub fn unregister(&self, key: &FieldKey) -> FormResult<bool> {
        let removed = {
            let mut state = write_lock(&self.state, "unregistering field")?;
            state.registry.unregister(key)
        };
        if removed {
            self.bus.clear_scope(&Scope::Field(key.clone()));
            self.bus.notify(&Scope::Form);
        }
        Ok(removed)
    }

    pub fn field(&self, key: &FieldKey) -> FormResult<Option<FieldState>> {
        Ok(read_lock(&self.state, "reading field state")?
            .registry
            .get(key)
            .cloned())
    }

    /// All registered fields in registration order.
    pub fn fields(&self) -> FormResult<Vec<(FieldKey, FieldState)>> {
        Ok(read_lock(&self.state, "listing fields")?
            .registry
            .entries()
            .map(|(key, state)| (key.clone(), state.clone()))
            .collect())
    }

    pub fn values(&self) -> FormResult<FormValues> {
        Ok(read_lock(&self.state, "reading form values")?
            .registry
            .entries()
            .map(|(key, state)| (key.clone(), state.value.clone()))
            .collect())
    }

    pub fn set_value(&self, key: &FieldKey, value: impl Into<FieldValue>) -> FormResult<()> {
        self.write_value(key, value.into())?;
        if self.options.mode == ValidationMode::OnChange {
            self.validate_field_sync(key)?;
        }
        Ok(())
    }

    /// Like [`FormController::set_value`], also running an async custom rule
    /// (with its debounce) when the mode calls for validation.
    pub async fn set_value_async(
        &self,
        key: &FieldKey,
        value: impl Into<FieldValue>,
    ) -> FormResult<()> {
        self.write_value(key, value.into())?;
        if self.options.mode == ValidationMode::OnChange {
            self.validate_field(key).await?;
        }
        Ok(())
    }

    /// Under `OnBlur`, every `touched = true` call revalidates, not just the
    /// first transition, so a corrected value is re-checked on the next blur.
    pub fn set_touched(&self, key: &FieldKey, touched: bool) -> FormResult<()> {
        self.write_touched(key, touched)?;
        if touched && self.options.mode == ValidationMode::OnBlur {
            self.validate_field_sync(key)?;
        }
        Ok(())
    }

    pub async fn set_touched_async(&self, key: &FieldKey, touched: bool) -> FormResult<()> {
        self.write_touched(key, touched)?;
        if touched && self.options.mode == ValidationMode::OnBlur {
            self.validate_field(key).await?;
        }
        Ok(())
    }

    fn write_value(&self, key: &FieldKey, value: FieldValue) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "writing field value")?;
            let field = state
                .registry
                .get_mut(key)
                .ok_or_else(|| FormError::UnknownField(key.clone()))?;
            field.value = value;
            field.recompute_dirty();
        }
        self.bus.notify(&Scope::Field(key.clone()));
        Ok(())
    }

    fn write_touched(&self, key: &FieldKey, touched: bool) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "touching field")?;
            let field = state
                .registry
                .get_mut(key)
                .ok_or_else(|| FormError::UnknownField(key.clone()))?;
            field.touched = touched;
        }
        self.bus.notify(&Scope::Field(key.clone()));
        Ok(())
    }

    /// Runs structural checks and a synchronous custom rule for one field.
    /// Starting the run supersedes any validation still in flight.
    pub fn validate_field_sync(&self, key: &FieldKey) -> FormResult<()> {
        let (ticket, value, rule) = self.begin_field_validation(key, false)?;
        let verdict = ValidationEngine::run_sync(&value, &rule);
        let error = self.resolve_verdict(key, verdict);
        self.finish_field_validation(key, ticket, error)
    }

    /// Full validation of one field, awaiting an async custom rule when the
    /// rule carries one. The result is discarded if a newer run started in
    /// the meantime.
    pub async fn validate_field(&self, key: &FieldKey) -> FormResult<()> {
        let (ticket, value, rule) = self.begin_field_validation(key, true)?;

        let debounce = rule.debounce();
        if !debounce.is_zero() {
            Delay::new(debounce).await;
            if !self.is_ticket_current(key, ticket)? {
                return Ok(());
            }
        }

        let verdict = ValidationEngine::run(&value, &rule).await;
        let error = self.resolve_verdict(key, verdict);
        self.finish_field_validation(key, ticket, error)
    }

    /// Validates every registered field concurrently and reports whether the
    /// form is valid afterwards. Fields registered while this runs are not
    /// part of the pass.
    pub async fn validate_all(&self) -> FormResult<bool> {
        let keys = read_lock(&self.state, "snapshotting fields for validation")?
            .registry
            .keys();
        self.validate_keys(&keys).await?;
        self.is_valid()
    }

    /// A field unregistered after the snapshot is skipped, not an error; a
    /// field-scope listener may unregister its neighbors mid-pass.
    async fn validate_keys(&self, keys: &[FieldKey]) -> FormResult<()> {
        for result in join_all(keys.iter().map(|key| self.validate_field(key))).await {
            match result {
                Ok(()) | Err(FormError::UnknownField(_)) => {}
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }

    fn begin_field_validation(
        &self,
        key: &FieldKey,
        may_suspend: bool,
    ) -> FormResult<(ValidationTicket, FieldValue, Arc<ValidationRule>)> {
        let (ticket, value, rule, marked) = {
            let mut state = write_lock(&self.state, "starting field validation")?;
            let rule = state
                .registry
                .rule(key)
                .ok_or_else(|| FormError::UnknownField(key.clone()))?;
            let field = state
                .registry
                .get_mut(key)
                .ok_or_else(|| FormError::UnknownField(key.clone()))?;
            let ticket = field.begin_validation();
            let marked = may_suspend && rule.has_async_custom();
            if marked {
                field.validating = true;
            }
            (ticket, field.value.clone(), rule, marked)
        };
        if marked {
            self.bus.notify(&Scope::Field(key.clone()));
        }
        Ok((ticket, value, rule))
    }

    fn finish_field_validation(
        &self,
        key: &FieldKey,
        ticket: ValidationTicket,
        error: Option<String>,
    ) -> FormResult<()> {
        let changed = {
            let mut state = write_lock(&self.state, "finishing field validation")?;
            match state.registry.get_mut(key) {
                Some(field) if field.is_current(ticket) => {
                    let changed = field.error != error || field.validating;
                    field.error = error;
                    field.validating = false;
                    changed
                }
                _ => false,
            }
        };
        if changed {
            self.bus.notify(&Scope::Field(key.clone()));
        }
        Ok(())
    }

    fn resolve_verdict(&self, key: &FieldKey, verdict: Verdict) -> Option<String> {
        match verdict {
            Verdict::Pass => None,
            Verdict::Fail(message) => Some(message),
            Verdict::Fault(fault) => {
                warn!("custom validator for field `{key}` faulted: {fault}");
                if let Ok(hook) = self.on_validator_error.read()
                    && let Some(hook) = hook.as_ref()
                {
                    hook(key, fault.as_ref());
                }
                Some(VALIDATOR_FAULT_MESSAGE.to_owned())
            }
        }
    }

    fn is_ticket_current(&self, key: &FieldKey, ticket: ValidationTicket) -> FormResult<bool> {
        Ok(read_lock(&self.state, "checking validation ticket")?
            .registry
            .get(key)
            .is_some_and(|field| field.is_current(ticket)))
    }

    /// Validates every field, then hands a detached values snapshot to the
    /// submit handler. A submit while one is in flight is silently dropped,
    /// so the handler runs at most once at a time; a `reset` while this
    /// submit is validating abandons it before the handler runs, and the
    /// abandoned `submit` still resolves `Ok(())`. Fields registered after
    /// the submit started are excluded from the snapshot. The handler's
    /// rejection is captured in `submit_error`; `submit` itself only errors
    /// on engine faults.
    pub async fn submit<F, Fut>(&self, on_submit: F) -> FormResult<()>
    where
        F: FnOnce(FormValues) -> Fut,
        Fut: Future<Output = SubmitResult>,
    {
        let keys = {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if matches!(
                state.submit_state,
                SubmitState::Validating | SubmitState::Submitting
            ) {
                debug!("submit ignored for {:?}: already submitting", state.id);
                return Ok(());
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
            state.submit_error = None;
            state.registry.keys()
        };
        self.bus.notify(&Scope::Form);

        if let Err(error) = self.validate_keys(&keys).await {
            // Unstick the machine before surfacing the engine fault.
            if let Ok(mut state) = write_lock(&self.state, "recording submit engine fault") {
                state.submit_state = SubmitState::Idle;
            }
            self.bus.notify(&Scope::Form);
            return Err(error);
        }

        if !self.is_valid()? {
            {
                let mut state = write_lock(&self.state, "recording submit validation failure")?;
                if state.submit_state != SubmitState::Validating {
                    return Ok(());
                }
                transition_submit_state(&mut state, SubmitState::Failed)?;
            }
            self.bus.notify(&Scope::Form);
            return Ok(());
        }

        let values = {
            let mut state = write_lock(&self.state, "moving submit to submitting")?;
            if state.submit_state != SubmitState::Validating {
                // A reset superseded this submit while its validators ran.
                return Ok(());
            }
            transition_submit_state(&mut state, SubmitState::Submitting)?;
            keys.iter()
                .filter_map(|key| {
                    state
                        .registry
                        .get(key)
                        .map(|field| (key.clone(), field.value.clone()))
                })
                .collect::<FormValues>()
        };
        self.bus.notify(&Scope::Form);

        let result = on_submit(values).await;
        {
            let mut state = write_lock(&self.state, "completing submit")?;
            if state.submit_state != SubmitState::Submitting {
                return Ok(());
            }
            match &result {
                Ok(()) => transition_submit_state(&mut state, SubmitState::Succeeded)?,
                Err(error) => {
                    state.submit_error = Some(error.to_string());
                    transition_submit_state(&mut state, SubmitState::Failed)?;
                }
            }
        }
        if result.is_ok() && self.options.reset_on_submit {
            self.reset(None)?;
        }
        self.bus.notify(&Scope::Form);
        Ok(())
    }

    /// Puts every field back to its initial value (or the override in
    /// `to_values`) in place, so existing subscriptions stay valid. Any
    /// in-flight validation is superseded and its late result discarded.
    pub fn reset(&self, to_values: Option<&FormValues>) -> FormResult<()> {
        let keys = {
            let mut state = write_lock(&self.state, "resetting form")?;
            state.submit_state = SubmitState::Idle;
            state.submit_error = None;
            state.registry.clear_parked();
            let mut keys = Vec::new();
            for (key, field) in state.registry.entries_mut() {
                field.value = to_values
                    .and_then(|values| values.get(key))
                    .cloned()
                    .unwrap_or_else(|| field.initial_value.clone());
                field.recompute_dirty();
                field.touched = false;
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
        Ok(())
    }

    pub fn is_valid(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading validity")?
            .registry
            .entries()
            .all(|(_, field)| field.error.is_none()))
    }

    pub fn is_dirty(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading dirtiness")?
            .registry
            .entries()
            .any(|(_, field)| field.dirty))
    }

    pub fn is_touched(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading touched state")?
            .registry
            .entries()
            .any(|(_, field)| field.touched))
    }

    pub fn is_validating(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading validating state")?
            .registry
            .entries()
            .any(|(_, field)| field.validating))
    }

    pub fn is_submitting(&self) -> FormResult<bool> {
        Ok(matches!(
            read_lock(&self.state, "reading submit state")?.submit_state,
            SubmitState::Validating | SubmitState::Submitting
        ))
    }

    pub fn submit_state(&self) -> FormResult<SubmitState> {
        Ok(read_lock(&self.state, "reading submit state")?.submit_state)
    }

    pub fn submit_count(&self) -> FormResult<u32> {
        Ok(read_lock(&self.state, "reading submit count")?.submit_count)
    }

    pub fn submit_error(&self) -> FormResult<Option<String>> {
        Ok(read_lock(&self.state, "reading submit error")?
            .submit_error
            .clone())
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        let fields: IndexMap<FieldKey, FieldState> = state
            .registry
            .entries()
            .map(|(key, field)| (key.clone(), field.clone()))
            .collect();
        Ok(FormSnapshot {
            values: fields
                .iter()
                .map(|(key, field)| (key.clone(), field.value.clone()))
                .collect(),
            is_dirty: fields.values().any(|field| field.dirty),
            is_valid: fields.values().all(|field| field.error.is_none()),
            submit_state: state.submit_state,
            submit_count: state.submit_count,
            submit_error: state.submit_error.clone(),
            fields,
        })
    }

    /// Error suitable for display next to an input: suppressed until the
    /// field is touched or the form has been submitted at least once.
    pub fn error_for_display(&self, key: &FieldKey) -> FormResult<Option<String>> {
        let state = read_lock(&self.state, "reading display error")?;
        let Some(field) = state.registry.get(key) else {
            return Ok(None);
        };
        if !field.touched && state.submit_count == 0 {
            return Ok(None);
        }
        Ok(field.error.clone())
    }
}

pub(crate) fn transition_submit_state(state: &mut FormState, next: SubmitState) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
