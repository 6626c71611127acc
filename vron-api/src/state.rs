use std::sync::Arc;

use vron_core::dispatcher::Connector;

#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<Connector>,
}
