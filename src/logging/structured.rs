//! Structured logging utilities.
//!
//! Provides context-aware logging with the aggregation pass (or tracker)
//! id and the state file or resource being processed included in every
//! log message.

use std::fmt;

/// Logging context for an aggregation pass or a tracker instance.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub scope: &'static str,
    pub id: String,
    pub state_file: Option<String>,
    pub resource: Option<String>,
}

impl LogContext {
    /// Context for one aggregation pass.
    pub fn pass(pass_id: &str) -> Self {
        Self {
            scope: "pass",
            id: pass_id.to_string(),
            state_file: None,
            resource: None,
        }
    }

    /// Context for a history tracker instance.
    pub fn tracker(tracker_id: &str) -> Self {
        Self {
            scope: "tracker",
            id: tracker_id.to_string(),
            state_file: None,
            resource: None,
        }
    }

    pub fn with_state(&self, state_file: &str) -> Self {
        Self {
            state_file: Some(state_file.to_string()),
            ..self.clone()
        }
    }

    pub fn with_resource(&self, resource: &str) -> Self {
        Self {
            resource: Some(resource.to_string()),
            ..self.clone()
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}={}]", self.scope, self.id)?;
        if let Some(state) = &self.state_file {
            write!(f, " [state={}]", state)?;
        }
        if let Some(resource) = &self.resource {
            write!(f, " [resource={}]", resource)?;
        }
        Ok(())
    }
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),+ $(,)?) => {
        log::info!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),+), $($value),+)
        );
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),+ $(,)?) => {
        log::warn!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),+), $($value),+)
        );
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),+ $(,)?) => {
        log::debug!(
            "{} {} {}",
            $ctx,
            $event,
            format_args!(concat!($(stringify!($key), "={:?} "),+), $($value),+)
        );
    };
}
