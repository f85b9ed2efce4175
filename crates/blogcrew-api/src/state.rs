use std::sync::Arc;

use anyhow::Result;
use blogcrew_core::{BlogCrew, CrewConfig};

/// Shared, read-only handler state.
#[derive(Clone)]
pub struct AppState {
    crew: Arc<BlogCrew>,
}

impl AppState {
    pub fn new(crew: BlogCrew) -> Self {
        Self {
            crew: Arc::new(crew),
        }
    }

    pub fn try_from_config(config: &CrewConfig) -> Result<Self> {
        Ok(Self::new(BlogCrew::from_config(config)?))
    }

    pub fn crew(&self) -> &BlogCrew {
        &self.crew
    }
}
