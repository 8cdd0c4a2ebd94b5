//! Customer directory lookups.
//!
//! The account system proper is another service; the pipeline only needs
//! the email address (and stored locale) to address outbound mail, read
//! through plain CRUD.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::Locale;

/// A customer row as the pipeline sees it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CustomerContact {
    pub id: String,
    pub email: Option<String>,
    pub locale: String,
}

#[derive(Clone)]
pub struct CustomerDirectory {
    pool: SqlitePool,
}

impl CustomerDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn contact_for(&self, customer_id: &str) -> Result<Option<CustomerContact>> {
        let contact = sqlx::query_as::<_, CustomerContact>(
            "SELECT id, email, locale FROM customers WHERE id = ?1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(contact)
    }

    /// Email address for a customer, if one is on file.
    pub async fn email_for(&self, customer_id: &str) -> Result<Option<String>> {
        Ok(self
            .contact_for(customer_id)
            .await?
            .and_then(|contact| contact.email))
    }

    /// Stored locale for a customer, defaulting to English.
    pub async fn locale_for(&self, customer_id: &str) -> Result<Locale> {
        Ok(self
            .contact_for(customer_id)
            .await?
            .map(|contact| Locale::from_tag(&contact.locale))
            .unwrap_or_default())
    }

    /// Upsert a customer contact. Used by account-sync and test fixtures.
    pub async fn upsert(&self, id: &str, email: Option<&str>, locale: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO customers (id, email, locale) VALUES (?1, ?2, ?3) \
             ON CONFLICT (id) DO UPDATE SET email = excluded.email, locale = excluded.locale",
        )
        .bind(id)
        .bind(email)
        .bind(locale)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
