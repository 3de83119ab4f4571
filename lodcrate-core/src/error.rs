//! Error types for lodcrate

use thiserror::Error;

/// Main error type for hierarchy construction
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameters or unusable input (bad triangle budgets, empty mesh).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The graph partitioner refused or failed to partition a graph.
    #[error("Graph partition failure: {0}")]
    GraphPartition(String),

    /// A structural invariant would be broken (empty cluster, empty micronode, bad index).
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// An external collaborator (simplifier, parametrizer, storage) failed.
    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("level {level}: {source}")]
    Level {
        level: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("level {level}, micronode {micronode}: {source}")]
    Micronode {
        level: usize,
        micronode: usize,
        #[source]
        source: Box<Error>,
    },
}

/// Coarse error category, independent of the context an error was wrapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationError,
    GraphPartitionFailure,
    IntegrityViolation,
    CollaboratorFailure,
}

impl Error {
    /// Category of the innermost error. Storage I/O counts as a collaborator failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::ConfigurationError,
            Error::GraphPartition(_) => ErrorKind::GraphPartitionFailure,
            Error::IntegrityViolation(_) => ErrorKind::IntegrityViolation,
            Error::Collaborator(_) | Error::Io(_) => ErrorKind::CollaboratorFailure,
            Error::Level { source, .. } | Error::Micronode { source, .. } => source.kind(),
        }
    }

    /// Attach the level being built.
    pub fn in_level(self, level: usize) -> Self {
        match self {
            // Already carries the level
            Error::Level { .. } | Error::Micronode { .. } => self,
            other => Error::Level {
                level,
                source: Box::new(other),
            },
        }
    }

    /// Attach the level and micronode being processed.
    pub fn in_micronode(self, level: usize, micronode: usize) -> Self {
        match self {
            Error::Micronode { .. } => self,
            other => Error::Micronode {
                level,
                micronode,
                source: Box::new(other),
            },
        }
    }
}
