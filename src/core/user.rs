//! User business logic - registration, credential checks, and the caller identity.
//!
//! Every core operation that depends on who is calling takes a [`Principal`]
//! explicitly instead of reading ambient session state.

use crate::{
    entities::{Event, LoyaltyPoint, Role, Ticket, User, loyalty_point, user},
    errors::{Error, Result},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

/// Authenticated caller of a core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Id of the calling user
    pub user_id: i64,
    /// Role of the calling user
    pub role: Role,
}

impl Principal {
    /// Builds a principal from a stored user.
    #[must_use]
    pub const fn from_user(user: &user::Model) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
        }
    }

    /// Organizers and Admins may scan tickets at the door.
    #[must_use]
    pub const fn can_validate_tickets(&self) -> bool {
        matches!(self.role, Role::Organizer | Role::Admin)
    }

    /// Whether the caller is an Admin.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Whether the caller may publish events.
    #[must_use]
    pub const fn is_organizer(&self) -> bool {
        matches!(self.role, Role::Organizer | Role::Admin)
    }

    /// Fails with [`Error::Forbidden`] unless the caller is an Admin.
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::forbidden("admin role required"))
        }
    }
}

/// Hashes a password the way existing rows were written: base64 of SHA-256.
#[must_use]
pub fn hash_password(password: &str) -> String {
    STANDARD.encode(Sha256::digest(password.as_bytes()))
}

/// Input for [`register`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Display name
    pub user_name: String,
    /// Login email
    pub email: String,
    /// Clear-text password, hashed before storage
    pub password: String,
    /// Requested role, Customer or Organizer
    pub role: Role,
}

/// Admin form for creating (`user_id` unset) or editing an account.
#[derive(Debug, Clone, Deserialize)]
pub struct UserForm {
    /// Account to edit; `None` creates a new one
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Display name
    pub user_name: String,
    /// Login email
    pub email: String,
    /// New password; required on create, blank keeps the current one on edit
    #[serde(default)]
    pub password: Option<String>,
    /// Account role
    pub role: Role,
}

/// Changes a user makes to their own account.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    /// Display name
    pub user_name: String,
    /// Login email
    pub email: String,
    /// New password; blank keeps the current one
    #[serde(default)]
    pub password: Option<String>,
}

const MIN_PASSWORD_LEN: usize = 6;

/// Trims and checks a name/email pair, returning them normalised.
fn normalise_identity(user_name: &str, email: &str) -> Result<(String, String)> {
    let user_name = user_name.trim().to_string();
    let email = email.trim().to_lowercase();

    if user_name.is_empty() {
        return Err(Error::validation("User name cannot be empty"));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(Error::validation("A valid email is required"));
    }
    Ok((user_name, email))
}

/// A password that is set and non-blank, checked for length.
fn new_password(password: Option<&str>) -> Result<Option<String>> {
    match password.filter(|p| !p.trim().is_empty()) {
        None => Ok(None),
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => Err(Error::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        ))),
        Some(p) => Ok(Some(hash_password(p))),
    }
}

/// Fails if `email` belongs to an account other than `except`.
async fn ensure_email_free<C>(db: &C, email: &str, except: Option<i64>) -> Result<()>
where
    C: ConnectionTrait,
{
    let mut query = User::find().filter(user::Column::Email.eq(email));
    if let Some(user_id) = except {
        query = query.filter(user::Column::Id.ne(user_id));
    }
    if query.one(db).await?.is_some() {
        return Err(Error::validation("Email is already registered"));
    }
    Ok(())
}

async fn insert_user<C>(
    db: &C,
    user_name: String,
    email: String,
    password_hash: String,
    role: Role,
    now: DateTime<Utc>,
) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let created = user::ActiveModel {
        user_name: Set(user_name),
        email: Set(email),
        password_hash: Set(password_hash),
        role: Set(role),
        profile_image: Set(None),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    // Customers start with a zero balance so the row exists before the first purchase
    if created.role == Role::Customer {
        loyalty_point::ActiveModel {
            user_id: Set(created.id),
            points: Set(0),
            last_updated: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(created)
}

/// Creates a user account from the public sign-up form.
///
/// Only Customer and Organizer accounts can be self-registered; Admins are
/// created by another Admin through [`admin_save_user`].
///
/// # Errors
/// Returns an error if:
/// - The requested role is Admin
/// - The name or email is empty, or the password is shorter than 6 characters
/// - The email is already registered
/// - The database insert fails
#[instrument(skip(db, new_user), fields(email = %new_user.email))]
pub async fn register(
    db: &DatabaseConnection,
    new_user: NewUser,
    now: DateTime<Utc>,
) -> Result<user::Model> {
    if new_user.role == Role::Admin {
        return Err(Error::forbidden("Admin accounts cannot be self-registered"));
    }
    let (user_name, email) = normalise_identity(&new_user.user_name, &new_user.email)?;
    let password_hash = new_password(Some(new_user.password.as_str()))?
        .ok_or_else(|| Error::validation("Password is required"))?;

    let txn = db.begin().await?;
    ensure_email_free(&txn, &email, None).await?;
    let created = insert_user(&txn, user_name, email, password_hash, new_user.role, now).await?;
    txn.commit().await?;

    info!("Registered user {} as {:?}", created.id, created.role);
    Ok(created)
}

/// Creates or edits any account, role included. Admin only.
///
/// # Errors
/// Returns an error if:
/// - The caller is not an Admin
/// - The name, email or password is invalid, or a new account has no password
/// - The email belongs to another account
/// - The account being edited does not exist
#[instrument(skip(db, form), fields(user_id = ?form.user_id))]
pub async fn admin_save_user(
    db: &DatabaseConnection,
    principal: &Principal,
    form: UserForm,
    now: DateTime<Utc>,
) -> Result<user::Model> {
    principal.require_admin()?;
    let (user_name, email) = normalise_identity(&form.user_name, &form.email)?;
    let password_hash = new_password(form.password.as_deref())?;

    let txn = db.begin().await?;
    ensure_email_free(&txn, &email, form.user_id).await?;

    let saved = match form.user_id {
        None => {
            let password_hash = password_hash
                .ok_or_else(|| Error::validation("Password is required for new users"))?;
            insert_user(&txn, user_name, email, password_hash, form.role, now).await?
        }
        Some(user_id) => {
            let existing = get_user(&txn, user_id)
                .await?
                .ok_or(Error::UserNotFound { user_id })?;
            let mut active: user::ActiveModel = existing.into();
            active.user_name = Set(user_name);
            active.email = Set(email);
            active.role = Set(form.role);
            if let Some(hash) = password_hash {
                active.password_hash = Set(hash);
            }
            active.update(&txn).await?
        }
    };

    txn.commit().await?;
    info!("Admin {} saved user {} as {:?}", principal.user_id, saved.id, saved.role);
    Ok(saved)
}

/// Updates the caller's own name, email and optionally password.
///
/// The role cannot be changed here.
///
/// # Errors
/// Returns an error if the input is invalid, the email belongs to another
/// account, or the caller no longer exists.
#[instrument(skip(db, update))]
pub async fn update_profile(
    db: &DatabaseConnection,
    principal: &Principal,
    update: ProfileUpdate,
) -> Result<user::Model> {
    let (user_name, email) = normalise_identity(&update.user_name, &update.email)?;
    let password_hash = new_password(update.password.as_deref())?;

    let txn = db.begin().await?;
    ensure_email_free(&txn, &email, Some(principal.user_id)).await?;
    let existing = get_user(&txn, principal.user_id)
        .await?
        .ok_or(Error::UserNotFound {
            user_id: principal.user_id,
        })?;

    let mut active: user::ActiveModel = existing.into();
    active.user_name = Set(user_name);
    active.email = Set(email);
    if let Some(hash) = password_hash {
        active.password_hash = Set(hash);
    }
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    info!("User {} updated their profile", updated.id);
    Ok(updated)
}

/// Deletes an account and its loyalty balance. Admin only.
///
/// Accounts that organized events or hold tickets are kept so sales history
/// stays intact. Admins cannot delete themselves.
///
/// # Errors
/// Returns an error if:
/// - The caller is not an Admin, or targets their own account
/// - The user does not exist
/// - The user has events or tickets
#[instrument(skip(db))]
pub async fn delete_user(
    db: &DatabaseConnection,
    principal: &Principal,
    user_id: i64,
) -> Result<()> {
    principal.require_admin()?;
    if user_id == principal.user_id {
        return Err(Error::forbidden("Admins cannot delete their own account"));
    }

    let txn = db.begin().await?;
    let user = get_user(&txn, user_id)
        .await?
        .ok_or(Error::UserNotFound { user_id })?;

    let events = user.find_related(Event).count(&txn).await?;
    let tickets = user.find_related(Ticket).count(&txn).await?;
    if events > 0 || tickets > 0 {
        return Err(Error::validation(format!(
            "User has {events} event(s) and {tickets} ticket(s) and cannot be deleted"
        )));
    }

    LoyaltyPoint::delete_many()
        .filter(loyalty_point::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;
    User::delete_by_id(user_id).exec(&txn).await?;
    txn.commit().await?;

    info!("Admin {} deleted user {}", principal.user_id, user_id);
    Ok(())
}

/// Checks an email/password pair and returns the matching user.
///
/// # Errors
/// Returns [`Error::InvalidCredentials`] for an unknown email or wrong password.
pub async fn authenticate(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<user::Model> {
    let user = User::find()
        .filter(user::Column::Email.eq(email.trim().to_lowercase()))
        .one(db)
        .await?
        .ok_or(Error::InvalidCredentials)?;

    if user.password_hash == hash_password(password) {
        Ok(user)
    } else {
        Err(Error::InvalidCredentials)
    }
}

/// Retrieves a user by id, returning None if it does not exist.
pub async fn get_user<C>(db: &C, user_id: i64) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

/// Resolves the principal for a user id.
///
/// # Errors
/// Returns [`Error::UserNotFound`] if no such user exists.
pub async fn load_principal(db: &DatabaseConnection, user_id: i64) -> Result<Principal> {
    get_user(db, user_id)
        .await?
        .map(|user| Principal::from_user(&user))
        .ok_or(Error::UserNotFound { user_id })
}

/// Lists all users, newest first. Admin only.
pub async fn list_users(db: &DatabaseConnection, principal: &Principal) -> Result<Vec<user::Model>> {
    principal.require_admin()?;
    User::find()
        .order_by_desc(user::Column::CreatedAt)
        .all(db)
        .await
        .map_err(Into::into)
}
