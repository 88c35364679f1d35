//! Error types for the extension runtime.
//!
//! Errors fall into four families:
//! - configuration errors, raised while discovering declarations or synthesizing
//!   an adaptive instance, which make an extension point unusable
//! - per-declaration failures, kept as [`Diagnostic`]s and only surfaced when the
//!   affected name is requested
//! - lookup and dispatch errors, returned to the caller of a single request
//! - instantiation errors from plugin constructors and lifecycle hooks

use std::fmt;

/// Result type for extension operations.
pub type Result<T> = std::result::Result<T, ExtensionError>;

/// A malformed declaration line and the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The declaration line, comment-stripped and trimmed.
    pub line: String,
    /// Why the line was rejected.
    pub cause: String,
}

impl Diagnostic {
    pub fn new(line: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            cause: cause.into(),
        }
    }

    /// Whether this diagnostic concerns `name`.
    ///
    /// Lines start with the declared name, so a case-insensitive prefix match
    /// catches both typos in the name and broken implementations behind it.
    pub fn concerns(&self, name: &str) -> bool {
        self.line
            .to_lowercase()
            .starts_with(&name.to_lowercase())
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line: {}, cause: {}", self.line, self.cause)
    }
}

/// Extension runtime errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtensionError {
    #[error("Invalid extension point {extension}: {reason}")]
    InvalidExtensionPoint { extension: String, reason: String },

    #[error("More than 1 default extension name on extension {extension}: {names}")]
    MultipleDefaults { extension: String, names: String },

    #[error("More than 1 adaptive class found for {extension}: {existing}, {incoming}")]
    MultipleAdaptive {
        extension: String,
        existing: String,
        incoming: String,
    },

    #[error("Duplicate extension {extension} name {name} on {existing} and {incoming}")]
    DuplicateExtension {
        extension: String,
        name: String,
        existing: String,
        incoming: String,
    },

    #[error("No adaptive method exist on extension {extension}, refuse to create the adaptive instance")]
    NoAdaptiveMethod { extension: String },

    #[error("Failed to create adaptive instance for {extension}: method {method} has no context parameter and no argument exposes one")]
    CannotAdapt { extension: String, method: String },

    #[error("{}", no_such_extension_message(.extension, .name, .causes))]
    NoSuchExtension {
        extension: String,
        name: String,
        causes: Vec<Diagnostic>,
    },

    #[error("No default extension configured for {extension}")]
    NoDefaultExtension { extension: String },

    #[error("Failed to get extension ({extension}) name from context ({context}) use keys [{}]", .keys.join(", "))]
    NameNotResolved {
        extension: String,
        method: String,
        keys: Vec<String>,
        context: String,
    },

    #[error("Context is missing when calling {method} on adaptive {extension}")]
    MissingContext { extension: String, method: String },

    #[error("Method {method} of extension {extension} is not adaptive")]
    Unsupported { extension: String, method: String },

    #[error("Extension instance (name: {name}, class: {class}) couldn't be instantiated: {reason}")]
    Instantiation {
        extension: String,
        name: String,
        class: String,
        reason: String,
    },

    #[error("Extension {name} of {extension} failed to initialize: {reason}")]
    Initialization {
        extension: String,
        name: String,
        reason: String,
    },

    #[error("Extension name {name} already exists on {extension}")]
    AlreadyExists { extension: String, name: String },

    #[error("Invalid argument: {0}")]
    IllegalArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extension system has been dropped")]
    SystemDropped,
}

impl ExtensionError {
    /// Whether the error is a fatal configuration error rather than a
    /// failure tied to a single request or declaration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExtensionError::InvalidExtensionPoint { .. }
                | ExtensionError::MultipleDefaults { .. }
                | ExtensionError::MultipleAdaptive { .. }
                | ExtensionError::DuplicateExtension { .. }
                | ExtensionError::NoAdaptiveMethod { .. }
                | ExtensionError::CannotAdapt { .. }
                | ExtensionError::Config(_)
        )
    }

    /// The extension point the error refers to, if any.
    pub fn extension(&self) -> Option<&str> {
        match self {
            ExtensionError::InvalidExtensionPoint { extension, .. }
            | ExtensionError::MultipleDefaults { extension, .. }
            | ExtensionError::MultipleAdaptive { extension, .. }
            | ExtensionError::DuplicateExtension { extension, .. }
            | ExtensionError::NoAdaptiveMethod { extension }
            | ExtensionError::CannotAdapt { extension, .. }
            | ExtensionError::NoSuchExtension { extension, .. }
            | ExtensionError::NoDefaultExtension { extension }
            | ExtensionError::NameNotResolved { extension, .. }
            | ExtensionError::MissingContext { extension, .. }
            | ExtensionError::Unsupported { extension, .. }
            | ExtensionError::Instantiation { extension, .. }
            | ExtensionError::Initialization { extension, .. }
            | ExtensionError::AlreadyExists { extension, .. } => Some(extension.as_str()),
            ExtensionError::IllegalArgument(_)
            | ExtensionError::Config(_)
            | ExtensionError::SystemDropped => None,
        }
    }
}

fn no_such_extension_message(extension: &str, name: &str, causes: &[Diagnostic]) -> String {
    let mut message = format!("No such extension {} by name {}", extension, name);
    if !causes.is_empty() {
        message.push_str(", possible causes: ");
        for (i, cause) in causes.iter().enumerate() {
            message.push_str(&format!("\r\n({}) {}", i + 1, cause));
        }
    }
    message
}
