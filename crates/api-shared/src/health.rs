use crate::schemas::HealthRes;

/// Simple health service shared by the REST API and the workspace binary.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static health check; does not touch the store.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "EMR API is alive".into(),
        }
    }
}
