//! Error types and result types for document store operations.
//!
//! Every fallible operation in the crate returns [`DocumentStoreResult<T>`].
//! Driver failures are carried through unchanged so callers see the store's own
//! error text.

use bson::error::Error as BsonError;
use std::convert::Infallible;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store
/// through models, query builders or raw collections.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested document was not found in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document not found {0} in collection {1}")]
    DocumentNotFound(String, String),
    /// The document violates structural expectations (e.g. a non-numeric field was incremented).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A string could not be parsed as a store identifier.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// An operation that addresses a single stored document was called on a transient entity.
    /// The argument is the collection name.
    #[error("Entity in collection {0} has no identity")]
    MissingIdentity(String),
    /// A scope name was invoked that the model never registered.
    /// The first argument is the scope name, the second is the model name.
    #[error("Call to undeclared scope {0} on model {1}")]
    UndeclaredScope(String, String),
    /// A comparison operator token outside the supported vocabulary.
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
    /// A lifecycle hook aborted the operation.
    #[error("Hook error: {0}")]
    Hook(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<Infallible> for DocumentStoreError {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}
