use std::ops::Deref;

use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    api::admin::AdminCredentials,
    mongodb::{Coll, Id},
};

/// Core admin user data.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCore {
    /// Always trimmed and lower-case.
    pub email: String,
    pub password_hash: String,
}

impl AdminCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> Result<bool> {
        Ok(argon2::verify_encoded(
            &self.password_hash,
            password.as_ref(),
        )?)
    }
}

/// An admin without an ID.
pub type NewAdmin = AdminCore;

/// An admin user from the database, with its unique ID.
#[derive(Serialize, Deserialize)]
pub struct Admin {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub admin: AdminCore,
}

impl Admin {
    /// Find the admin with the given (already normalised) email.
    pub async fn find_by_email(admins: &Coll<Admin>, email: &str) -> Result<Option<Admin>> {
        Ok(admins.find_one(doc! { "email": email }, None).await?)
    }
}

impl Deref for Admin {
    type Target = AdminCore;

    fn deref(&self) -> &Self::Target {
        &self.admin
    }
}


/// If there are no admins, create one from the configured credentials.
pub async fn ensure_admin_exists(
    admins: &Coll<NewAdmin>,
    credentials: AdminCredentials,
) -> Result<()> {
    if admins.count_documents(None, None).await? > 0 {
        return Ok(());
    }

    let admin = NewAdmin::try_from(credentials)?;
    admins.insert_one(&admin, None).await?;
    warn!(
        "No admins found, created default admin {}. Change its password!",
        admin.email
    );
    Ok(())
}
