use sea_orm::DbErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("could not store entity: {0}")]
    StoreFailed(String),
    #[error("entity already exists: {0}")]
    AlreadyExists(String),
}
