use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! unsupported_error {
    ($method:expr, $fmt:expr) => {
        crate::Error::Unsupported {
            method: $method.to_string(),
            message: $fmt.to_string(),
        }
    };

    ($method:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::Unsupported {
            method: $method.to_string(),
            message: format!($fmt, $($arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant except [`Error::Config`], [`Error::Json`] and [`Error::FileError`] is a fatal
/// invariant violation: the run that produced it must be abandoned, no partially transformed
/// method is ever handed back to the caller.
///
/// # Error Categories
///
/// ## Inference Errors
/// - [`Error::RuleConflict`] - Two different rules resolved onto one shared cell
/// - [`Error::UnsupportedInstruction`] - The interpreter cannot model an opcode
///
/// ## Rewrite Errors
/// - [`Error::Unsupported`] - A multi-component value reached a single-component position
/// - [`Error::MissingConstant`] - A classified constant has no per-component expansion
/// - [`Error::MixedRemoval`] - A value's producers are neither all removed nor all kept
/// - [`Error::VariableLayout`] - Local slots are not used in a stack discipline
/// - [`Error::Method`] - Any of the above, tagged with the method being processed
///
/// ## Input Errors
/// - [`Error::Malformed`] - Inconsistent bytecode or descriptor
/// - [`Error::NotFound`] - Referenced method/rule/field does not exist
/// - [`Error::Config`] - Invalid rule document
///
/// # Examples
///
/// ```rust
/// use typesplit::Error;
///
/// fn report(err: &Error) -> String {
///     match err {
///         Error::RuleConflict { existing, requested } => {
///             format!("value is both {existing} and {requested}")
///         }
///         Error::Method { method, source } => format!("{method}: {source}"),
///         other => other.to_string(),
///     }
/// }
/// # let _ = report;
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The bytecode or a descriptor is internally inconsistent.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A shared rule cell was asked to resolve to a second, different rule.
    ///
    /// Values that alias one cell must end up with the same split shape, so
    /// this means the evidence collected across the method is contradictory.
    #[error("Conflicting transform rules: value already classified as '{existing}', cannot become '{requested}'")]
    RuleConflict {
        /// Rule the cell already holds
        existing: String,
        /// Rule that was requested
        requested: String,
    },

    /// A classified value reached an instruction that can only carry it with
    /// a single component (or cannot carry a changed shape at all).
    #[error("Unsupported in {method}: {message}")]
    Unsupported {
        /// Method being processed
        method: String,
        /// What was encountered
        message: String,
    },

    /// A classified constant has no entry in its rule's constant table.
    #[error("No constant replacement found for {constant} in rule '{rule}'")]
    MissingConstant {
        /// Rule id
        rule: String,
        /// Printed constant literal
        constant: String,
    },

    /// A value is produced by instructions of which some were removed and some kept.
    #[error("Value consumed at instruction {index} has producers that are partially removed")]
    MixedRemoval {
        /// Consuming instruction
        index: usize,
    },

    /// The remapped local-variable layout is not consistent between a store and a load.
    #[error("Local variable {var} in {method} is not used in a stack discipline (instruction {index})")]
    VariableLayout {
        /// Method being processed
        method: String,
        /// Original slot index
        var: u16,
        /// Instruction where the mismatch was found
        index: usize,
    },

    /// The interpreter does not model this opcode.
    #[error("Unsupported instruction: {0}")]
    UnsupportedInstruction(String),

    /// A method, field or rule that was referenced does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The rule document is invalid.
    #[error("Invalid rule configuration: {0}")]
    Config(String),

    /// JSON error while loading a rule document.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error raised while processing a specific method.
    #[error("{method}: {source}")]
    Method {
        /// Method identity (`owner#name desc`)
        method: String,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Tags this error with the method it occurred in. Already tagged errors are left alone.
    #[must_use]
    pub fn in_method(self, method: impl Into<String>) -> Self {
        match self {
            Error::Method { .. } => self,
            other => Error::Method {
                method: method.into(),
                source: Box::new(other),
            },
        }
    }
}
