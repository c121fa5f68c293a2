pub mod database;
pub mod qdrant_config;
pub mod vector_db;

pub use database::{Database, DatabaseError, PaperRecord};
pub use vector_db::{point_id_for, ScoredVector, VectorDB, VectorDBError, VectorPoint};
