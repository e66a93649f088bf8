use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! surrogate_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug,
        )]
        pub struct $name(pub i64);

        impl $name {
            pub fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
    };
}

surrogate_id!(
    /// Surrogate key of a `files` row. Assigned by the relational store.
    FileId
);
surrogate_id!(
    /// Surrogate key of a `file_chunks` row. Assigned by the relational store.
    ///
    /// The vector index and the full-text index reference chunks by this id;
    /// they never mint identifiers of their own.
    ChunkId
);
surrogate_id!(
    /// Surrogate key of an `index_jobs` row.
    JobId
);
