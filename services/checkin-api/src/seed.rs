//! Default admin account.

use tracing::{info, warn};

use crate::auth::PasswordHasher;
use crate::config::AdminSeed;
use crate::db::{DbError, NewUser, User, UserStore};
use crate::engine::normalize_email;

/// Create the configured admin unless an admin already exists.
///
/// Returns the created user, or `None` when nothing was done. Safe to run on
/// every start.
pub async fn seed_admin(
    users: &dyn UserStore,
    passwords: &dyn PasswordHasher,
    admin: &AdminSeed,
) -> Result<Option<User>, DbError> {
    if users.admin_exists().await? {
        return Ok(None);
    }

    let new_user = NewUser {
        name: admin.name.clone(),
        email: normalize_email(&admin.email),
        password_hash: passwords.hash(&admin.password),
        role: checkin_model::Role::Admin,
    };

    match users.insert(new_user).await {
        Ok(user) => {
            info!(user_id = %user.id, email = %user.email, "Seeded default admin");
            Ok(Some(user))
        }
        Err(DbError::Duplicate(_)) => {
            warn!(
                email = %admin.email,
                "Admin email is already registered as a keeper; not seeding"
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
