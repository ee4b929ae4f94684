use crate::app::context::AppContext;
use std::ops::Deref;
use std::sync::Arc;

/// 路由共享状态
#[derive(Clone)]
pub struct ProxyState {
    context: Arc<AppContext>,
}

impl ProxyState {
    #[must_use]
    pub const fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    #[must_use]
    pub fn context(&self) -> Arc<AppContext> {
        Arc::clone(&self.context)
    }
}

impl Deref for ProxyState {
    type Target = AppContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}
