//! Single entry point for opening the on-disk store database and handing
//! out the three views over it (§6.3: one writer, one file).

use std::sync::Arc;

use amoskys_core::error::{codes, CoreError};
use libsql::Builder;

use crate::incident_store::IncidentStore;
use crate::schema;
use crate::telemetry_store::TelemetryStore;
use crate::wal::Wal;

pub struct Store {
    wal: Wal,
    telemetry: TelemetryStore,
    incidents: IncidentStore,
}

impl Store {
    pub async fn open(path: &str) -> Result<Self, CoreError> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CoreError::new(codes::STORE_SCHEMA, "failed to open store database").with_cause(e))?;
        let conn = db
            .connect()
            .map_err(|e| CoreError::new(codes::STORE_SCHEMA, "failed to open store connection").with_cause(e))?;
        schema::apply(&conn).await?;

        let db = Arc::new(db);
        Ok(Self {
            wal: Wal::new(Arc::clone(&db)),
            telemetry: TelemetryStore::new(Arc::clone(&db)),
            incidents: IncidentStore::new(db),
        })
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }

    pub fn incidents(&self) -> &IncidentStore {
        &self.incidents
    }
}
