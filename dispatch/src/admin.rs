use async_trait::async_trait;
use http::StatusCode;
use refdata::ReferenceData;
use shared::admin_service::AdminHooks;

/// Exposes reference data readiness and reloads on the admin listener.
pub struct ReferenceDataAdmin {
    refdata: ReferenceData,
}

impl ReferenceDataAdmin {
    pub fn new(refdata: ReferenceData) -> Self {
        ReferenceDataAdmin { refdata }
    }
}

#[async_trait]
impl AdminHooks for ReferenceDataAdmin {
    fn is_ready(&self) -> bool {
        self.refdata.is_ready()
    }

    async fn reload(&self, table: &str) -> (StatusCode, String) {
        match self.refdata.reload(table).await {
            Ok(rows) => {
                tracing::info!(table, rows, "Reloaded via admin trigger");
                (StatusCode::OK, format!("reloaded {table}: {rows} rows"))
            }
            Err(e) => {
                tracing::error!(table, error = %e, "Admin reload failed");
                (e.status_code(), e.to_string())
            }
        }
    }
}
