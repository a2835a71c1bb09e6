//! Health check outcomes and the builder checks fill in while evaluating

use crate::error::{HealthError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub type Details = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    Up,
    Down,
    Unknown,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Up => write!(f, "up"),
            State::Down => write!(f, "down"),
            State::Unknown => write!(f, "unknown"),
        }
    }
}

/// Immutable outcome of a single invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckResult {
    check_id: String,
    group: Option<String>,
    state: State,
    message: Option<String>,
    error: Option<String>,
    details: Details,
}

impl HealthCheckResult {
    pub fn check_id(&self) -> &str {
        &self.check_id
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn details(&self) -> &Details {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn is_up(&self) -> bool {
        self.state == State::Up
    }

    pub fn is_down(&self) -> bool {
        self.state == State::Down
    }
}

#[derive(Debug, Clone)]
pub struct ResultBuilder {
    check_id: String,
    group: Option<String>,
    state: Option<State>,
    message: Option<String>,
    error: Option<String>,
    details: Details,
}

impl ResultBuilder {
    pub fn new(check_id: impl Into<String>, group: Option<String>) -> Self {
        Self {
            check_id: check_id.into(),
            group,
            state: None,
            message: None,
            error: None,
            details: Details::new(),
        }
    }

    pub fn check_id(&self) -> &str {
        &self.check_id
    }

    pub fn up(&mut self) -> &mut Self {
        self.state(State::Up)
    }

    pub fn down(&mut self) -> &mut Self {
        self.state(State::Down)
    }

    pub fn unknown(&mut self) -> &mut Self {
        self.state(State::Unknown)
    }

    pub fn state(&mut self, state: State) -> &mut Self {
        self.state = Some(state);
        self
    }

    pub fn current_state(&self) -> Option<State> {
        self.state
    }

    pub fn message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = Some(message.into());
        self
    }

    pub fn current_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Records the rendered cause chain of `error`.
    pub fn error(&mut self, error: &(dyn std::error::Error + 'static)) -> &mut Self {
        let mut rendered = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            rendered.push_str(": ");
            rendered.push_str(&cause.to_string());
            source = cause.source();
        }
        self.error = Some(rendered);
        self
    }

    pub fn detail(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn details(&mut self, details: Details) -> &mut Self {
        self.details.extend(details);
        self
    }

    pub(crate) fn replay(&mut self, previous: &HealthCheckResult) -> &mut Self {
        self.state = Some(previous.state);
        self.message = previous.message.clone();
        self.error = previous.error.clone();
        self.details = previous.details.clone();
        self
    }

    pub fn build(&self) -> Result<HealthCheckResult> {
        let state = self.state.ok_or_else(|| HealthError::StateNotSet {
            check: self.check_id.clone(),
        })?;

        Ok(self.build_with_state(state))
    }

    /// Builds with `state`, ignoring whatever state was set before.
    pub fn build_with_state(&self, state: State) -> HealthCheckResult {
        HealthCheckResult {
            check_id: self.check_id.clone(),
            group: self.group.clone(),
            state,
            message: self.message.clone(),
            error: self.error.clone(),
            details: self.details.clone(),
        }
    }
}
