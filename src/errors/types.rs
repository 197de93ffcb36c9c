//! # Error Types
//!
//! Error types for albsync using `thiserror`.

use std::fmt::Display;

use validator::{ValidationErrors, ValidationErrorsKind};

use super::gateway::{GatewayError, GatewayResult};
use crate::domain::ResourceKind;
use crate::gateway::Operation;

/// Custom result type for albsync operations
pub type Result<T> = std::result::Result<T, AlbError>;

/// Main error type for albsync
#[derive(thiserror::Error, Debug)]
pub enum AlbError {
    /// A desired entity is missing a required field or breaks a uniqueness rule
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// A symbolic target group reference could not be matched
    #[error("Unresolved target group '{target_group}' referenced by {owner}")]
    Resolution { target_group: String, owner: String },

    /// The cloud gateway rejected a call
    #[error("Gateway error during {operation} on {kind} '{resource}': {source}")]
    Gateway {
        kind: ResourceKind,
        resource: String,
        operation: Operation,
        #[source]
        source: GatewayError,
    },

    /// Target groups were still held by a deleted load balancer after the settle window
    #[error(
        "Load balancer '{load_balancer}' did not release its target groups within {waited_ms}ms"
    )]
    Settle { load_balancer: String, waited_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization { context: String },
}

impl AlbError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a reference resolution error
    pub fn resolution<T: Into<String>, O: Into<String>>(target_group: T, owner: O) -> Self {
        Self::Resolution { target_group: target_group.into(), owner: owner.into() }
    }

    /// Wrap a gateway failure with the resource and operation being attempted
    pub fn gateway<R: Display>(
        kind: ResourceKind,
        resource: R,
        operation: Operation,
        source: GatewayError,
    ) -> Self {
        Self::Gateway { kind, resource: resource.to_string(), operation, source }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(context: S) -> Self {
        Self::Serialization { context: context.into() }
    }

    /// Whether the error came from the desired/live data rather than from a mutation
    pub fn is_data_error(&self) -> bool {
        matches!(self, AlbError::Validation { .. } | AlbError::Resolution { .. })
    }
}

impl From<std::io::Error> for AlbError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for AlbError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(format!("JSON serialization failed: {}", error))
    }
}

impl From<ValidationErrors> for AlbError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages = Vec::new();
        flatten_validation_errors("", &errors, &mut messages);
        messages.sort();
        let field = messages.first().and_then(|m| m.split(':').next()).map(str::to_string);

        Self::Validation { message: messages.join("; "), field }
    }
}

/// Walks nested validator output so `load_balancers[0].subnets` style paths survive.
fn flatten_validation_errors(prefix: &str, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path =
            if prefix.is_empty() { field.to_string() } else { format!("{}.{}", prefix, field) };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or_else(|| e.code.to_string(), |m| m.to_string())
                    })
                    .collect();
                out.push(format!("{}: {}", path, messages.join(", ")));
            }
            ValidationErrorsKind::Struct(inner) => flatten_validation_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    flatten_validation_errors(&format!("{}[{}]", path, idx), inner, out);
                }
            }
        }
    }
}

/// Attaches resource context to a raw gateway result.
pub trait GatewayContext<T> {
    fn context<R: Display>(self, kind: ResourceKind, resource: R, operation: Operation)
        -> Result<T>;
}

impl<T> GatewayContext<T> for GatewayResult<T> {
    fn context<R: Display>(
        self,
        kind: ResourceKind,
        resource: R,
        operation: Operation,
    ) -> Result<T> {
        self.map_err(|source| AlbError::gateway(kind, resource, operation, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Inner {
        #[validate(length(min = 1, message = "`subnets' is required"))]
        subnets: Vec<String>,
    }

    #[derive(Validate)]
    struct Outer {
        #[validate(nested)]
        load_balancers: Vec<Inner>,
    }

    #[test]
    fn test_validation_error() {
        let error = AlbError::validation_field("`subnets' is required", "subnets");
        assert!(matches!(error, AlbError::Validation { .. }));
        if let AlbError::Validation { field, .. } = error {
            assert_eq!(field, Some("subnets".to_string()));
        }
    }

    #[test]
    fn test_nested_validation_paths() {
        let outer = Outer { load_balancers: vec![Inner { subnets: vec![] }] };
        let error: AlbError = outer.validate().unwrap_err().into();
        let message = error.to_string();
        assert!(message.contains("load_balancers[0].subnets"), "{}", message);
        assert!(message.contains("`subnets' is required"), "{}", message);
    }

    #[test]
    fn test_gateway_context() {
        let raw: GatewayResult<()> = Err(GatewayError::conflict("in use"));
        let error = raw
            .context(ResourceKind::TargetGroup, "web", Operation::DeleteTargetGroup)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Gateway error during delete_target_group on target group 'web': conflict: in use"
        );
        assert!(!error.is_data_error());
    }

    #[test]
    fn test_resolution_error() {
        let error = AlbError::resolution("missing", "listener 80 of 'a'");
        assert!(error.is_data_error());
        assert_eq!(
            error.to_string(),
            "Unresolved target group 'missing' referenced by listener 80 of 'a'"
        );
    }
}
