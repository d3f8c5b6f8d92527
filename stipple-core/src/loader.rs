use std::future::Future;

use anyhow::Result;

use crate::ModelLike;

pub trait Loader: Send + Sync {
    type Model: ModelLike + 'static;

    /// Hub identifier of the model this loader produces.
    fn model_id(&self) -> &str;

    fn load(&self) -> impl Future<Output = Result<Self::Model>> + Send;
}
