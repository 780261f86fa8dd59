//! Error types for docmodel operations.

use std::fmt;

/// The primary error type for all docmodel operations.
#[derive(Debug)]
pub enum Error {
    /// A class name did not resolve to a registered document class
    Resolution(ResolutionError),
    /// Relation declaration or relation operation errors
    Relation(RelationError),
    /// Validation failed on a strict persistence path
    Validation(ValidationError),
    /// Identity lookup found nothing
    NotFound(NotFoundError),
    /// Storage collaborator errors
    Store(StoreError),
    /// Type conversion errors
    Type(TypeError),
    /// Configuration errors
    Config(ConfigError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ResolutionError {
    /// The class name that failed to resolve
    pub class_name: String,
    /// Where the name was referenced from, e.g. `Person.posts`
    pub referenced_from: Option<String>,
}

#[derive(Debug)]
pub struct RelationError {
    pub kind: RelationErrorKind,
    /// Relation name, when the error concerns a single relation
    pub relation: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationErrorKind {
    /// No relation with that name is declared on the class
    UnknownRelation,
    /// The macro has metadata but no proxy or builder
    Unsupported,
    /// A derivation needs an option that was not supplied
    MissingOption,
    /// The relation macro has no foreign key (embedded relations)
    NoForeignKey,
    /// The document owning a proxy has been dropped
    BaseDropped,
    /// The assigned value does not fit the relation's cardinality
    InvalidTarget,
    /// Attribute not declared while dynamic fields are disabled
    UnknownField,
    /// An embedded document was saved before its root document
    ParentNotPersisted,
    /// Nested attributes exceeded the configured limit
    TooManyRecords,
}

#[derive(Debug)]
pub struct NotFoundError {
    pub class_name: String,
    pub id: String,
}

#[derive(Debug)]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub collection: String,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// A document with the same identity already exists
    Duplicate,
    /// The document to update does not exist
    Missing,
    /// The store rejected the operation
    Rejected,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub field: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Validation error for field-level and document-level validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationError {
    /// The errors in the order validators reported them
    pub errors: Vec<FieldValidationError>,
}

/// A single validation error for a field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValidationError {
    /// The field name that failed validation
    pub field: String,
    /// The kind of validation that failed
    pub kind: ValidationErrorKind,
    /// Human-readable error message
    pub message: String,
}

/// The type of validation constraint that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Required field is missing/null
    Required,
    /// Value doesn't match regex pattern
    Pattern,
    /// Custom validation failed
    Custom,
}

impl ValidationError {
    /// Create a new empty validation error container.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Check if there are any validation errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add a field validation error.
    pub fn add(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Add a pattern match error.
    pub fn add_pattern(&mut self, field: impl Into<String>, pattern: &str) {
        self.add(
            field,
            ValidationErrorKind::Pattern,
            format!("must match pattern '{pattern}'"),
        );
    }

    /// Add a required field error.
    pub fn add_required(&mut self, field: impl Into<String>) {
        self.add(
            field,
            ValidationErrorKind::Required,
            "can't be blank".to_string(),
        );
    }

    /// Add a custom validation error.
    pub fn add_custom(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.add(field, ValidationErrorKind::Custom, message);
    }

    /// Errors reported for one field.
    pub fn on(&self, field: &str) -> Vec<&FieldValidationError> {
        self.errors.iter().filter(|e| e.field == field).collect()
    }
}

impl RelationError {
    pub(crate) fn new(kind: RelationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            relation: None,
            message: message.into(),
        }
    }

    pub(crate) fn on(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }
}

impl Error {
    /// Shorthand for a relation error on a named relation.
    pub(crate) fn relation(
        kind: RelationErrorKind,
        relation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Relation(RelationError::new(kind, message).on(relation))
    }

    /// Is this a validation failure raised by a strict path?
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Kind of the relation error, if this is one.
    pub fn relation_kind(&self) -> Option<RelationErrorKind> {
        match self {
            Error::Relation(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Resolution(e) => write!(f, "Resolution error: {}", e),
            Error::Relation(e) => write!(f, "Relation error: {}", e),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::NotFound(e) => write!(f, "Not found: {}", e),
            Error::Store(e) => write!(f, "Store error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.referenced_from {
            Some(origin) => write!(
                f,
                "class '{}' referenced from {} is not registered",
                self.class_name, origin
            ),
            None => write!(f, "class '{}' is not registered", self.class_name),
        }
    }
}

impl fmt::Display for RelationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(relation) = &self.relation {
            write!(f, "{} (relation '{}')", self.message, relation)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with id {}", self.class_name, self.id)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (collection '{}')", self.message, self.collection)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(
                f,
                "expected {} for field '{}', found {}",
                self.expected, field, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "validation passed")
        } else if self.errors.len() == 1 {
            let err = &self.errors[0];
            write!(f, "validation error on '{}': {}", err.field, err.message)
        } else {
            writeln!(f, "validation errors:")?;
            for err in &self.errors {
                writeln!(f, "  - {}: {}", err.field, err.message)?;
            }
            Ok(())
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ResolutionError> for Error {
    fn from(err: ResolutionError) -> Self {
        Error::Resolution(err)
    }
}

impl From<RelationError> for Error {
    fn from(err: RelationError) -> Self {
        Error::Relation(err)
    }
}

impl From<NotFoundError> for Error {
    fn from(err: NotFoundError) -> Self {
        Error::NotFound(err)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

/// Result type alias for docmodel operations.
pub type Result<T> = std::result::Result<T, Error>;
