use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db;
use crate::error::{LedgerError, Result};
use crate::ledger::Ledger;
use crate::transfer::Transfer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Ledger {
    pub fn create_organization(&mut self, name: &str) -> Result<Organization> {
        if name.trim().is_empty() {
            return Err(LedgerError::invalid("name can't be blank"));
        }
        let org = Organization {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            created_at: Utc::now(),
        };
        self.db.write(|tx| Ok(db::insert_organization(tx, &org)?))?;
        tracing::info!(organization_id = %org.id, name = %org.name, "organization created");
        Ok(org)
    }

    pub fn get_organization(&self, id: Uuid) -> Result<Organization> {
        db::get_organization(self.db.conn(), id)?
            .ok_or_else(|| LedgerError::not_found("organization", id))
    }

    pub fn find_organization(&self, name: &str) -> Result<Option<Organization>> {
        Ok(db::find_organization_by_name(self.db.conn(), name)?)
    }

    pub fn list_organizations(&self) -> Result<Vec<Organization>> {
        Ok(db::list_organizations(self.db.conn())?)
    }

    /// Transfers touching any account of the organization.
    pub fn organization_transfers(&self, id: Uuid) -> Result<Vec<Transfer>> {
        Ok(db::transfers_for_organization(self.db.conn(), id)?)
    }
}
