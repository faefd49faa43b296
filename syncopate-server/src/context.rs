use std::sync::Arc;

use syncopate_core::Syncopate;

/// State shared with every request handler.
#[derive(Clone)]
pub struct ServerContext {
    pub syncopate: Arc<Syncopate>,
}
