use crate::detect::Thresholds;
use crate::storage::Pool;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub thresholds: Thresholds,
    pub expected_packages: Vec<String>,
}
