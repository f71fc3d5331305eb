use std::sync::Arc;

use crate::config::Config;
use crate::engine::QuizService;
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QuizService>,
    pub config: Config,
}

impl FromRef<AppState> for Arc<QuizService> {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
