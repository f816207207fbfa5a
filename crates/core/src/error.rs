use thiserror::Error;

use crate::model::{CatalogError, PercentOutOfRange};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Percent(#[from] PercentOutOfRange),
}
