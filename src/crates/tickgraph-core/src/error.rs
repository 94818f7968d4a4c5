//! Error types for graph construction and execution
//!
//! Every fallible operation in the crate returns [`Result<T>`], an alias over
//! [`GraphError`]. Errors fall into three groups that surface at different
//! times:
//!
//! ```text
//! GraphError
//! ├── Wiring (construction time, before any input is accepted)
//! │   ├── TypeMismatch        - edge or entry/result pin rejected
//! │   ├── UnknownState        - id does not belong to this graph
//! │   ├── MissingEntry        - run started without an entry state
//! │   └── MissingResult       - run started without a result state
//! ├── Execution (run time, the whole run fails)
//! │   ├── NodeExecution       - a state's computation returned an error
//! │   ├── EmptyDispatch       - scheduler invariant violated
//! │   ├── RoundLimitExceeded  - run kept ticking past `max_rounds`
//! │   ├── Cancelled           - only surfaced by `Run::run*` helpers
//! │   └── Execution           - task join failures and similar
//! └── Support
//!     ├── Property            - blackboard lookups
//!     └── Configuration       - invalid or unreadable engine config
//! ```
//!
//! # Example
//!
//! ```rust
//! use tickgraph_core::{GraphError, Result};
//!
//! fn parse(raw: &str) -> Result<i64> {
//!     raw.trim()
//!         .parse()
//!         .map_err(|e| GraphError::node_execution("parse", format!("{}", e)))
//! }
//!
//! assert!(parse("12").is_ok());
//! assert!(matches!(parse("x"), Err(GraphError::NodeExecution { .. })));
//! ```

use thiserror::Error;

/// Convenience result type using [`GraphError`]
pub type Result<T> = std::result::Result<T, GraphError>;

/// Error type for all graph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// A payload type did not line up with a declared state type
    ///
    /// Raised synchronously by edge registration and by `set_entry` /
    /// `set_result` on a typed run; never raised mid-run.
    #[error("Type mismatch at {context}: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        /// Where the check happened, e.g. `edge parse -> plus3`
        context: String,
        /// The type the receiving side declares
        expected: &'static str,
        /// The type the sending side provides
        found: &'static str,
    },

    /// A state id that was not produced by this graph
    #[error("Unknown state id {0}")]
    UnknownState(usize),

    /// A typed run was started before `set_entry`
    #[error("Run has no entry state")]
    MissingEntry,

    /// A typed run was started before `set_result`
    #[error("Run has no result state")]
    MissingResult,

    /// A state was invoked without any arrived process token
    ///
    /// This is a scheduler bug, not a user error, and is never tolerated.
    #[error("State '{0}' invoked with no arrived process tokens")]
    EmptyDispatch(String),

    /// A state's computation failed
    ///
    /// # Example
    ///
    /// ```rust
    /// use tickgraph_core::GraphError;
    ///
    /// let err = GraphError::node_execution("build", "exit status 2");
    /// assert_eq!(format!("{}", err), "State 'build' execution failed: exit status 2");
    /// ```
    #[error("State '{node}' execution failed: {error}")]
    NodeExecution {
        /// Name of the state that failed
        node: String,
        /// Error message from the computation
        error: String,
    },

    /// The run was cancelled through `stop()`
    #[error("Run cancelled")]
    Cancelled,

    /// The run ticked `limit` rounds without finishing or draining
    #[error("Round limit ({limit}) exceeded")]
    RoundLimitExceeded {
        /// Configured `max_rounds`
        limit: usize,
    },

    /// Blackboard lookup failed (missing key or wrong value type)
    #[error("Runtime property '{key}': {reason}")]
    Property {
        /// Key that was looked up
        key: String,
        /// What went wrong
        reason: String,
    },

    /// Engine configuration is invalid or could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic execution error without state context
    #[error("Execution failed: {0}")]
    Execution(String),
}

impl GraphError {
    /// Create a node execution error with context
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: &'static str,
        found: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }

    /// Whether this error was raised while wiring the graph
    pub fn is_wiring(&self) -> bool {
        matches!(
            self,
            Self::TypeMismatch { .. } | Self::UnknownState(_) | Self::MissingEntry | Self::MissingResult
        )
    }
}
