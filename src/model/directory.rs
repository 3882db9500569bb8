//! The user directory: registration, login and administration of user records.

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::user::{fields, RegNum, Role, User, UserStatus};
use crate::store::{to_document, Batch, Collection, Filter, Storage, StoredRecord, Update};

/// Map a duplicate key error from the store to a conflict with `message`.
fn conflict_on_duplicate(message: &'static str) -> impl Fn(Error) -> Error {
    move |err| match err {
        Error::DuplicateKey { .. } => Error::conflict(message),
        err => err,
    }
}

/// Add a new user. Fails if the registration number is already taken.
pub async fn register(storage: &Storage, user: &User) -> Result<()> {
    storage
        .insert_record(user)
        .await
        .map_err(conflict_on_duplicate("Registration Number already exists."))?;
    info!("Registered {} {}", user.role, user.reg_num);
    Ok(())
}

/// Look up a user by registration number and check their password.
/// Returns `None` for a blank or unknown registration number or a wrong password.
pub async fn login(storage: &Storage, reg_num: &str, password: &str) -> Result<Option<User>> {
    let reg_num = match RegNum::parse(reg_num) {
        Some(reg_num) => reg_num,
        None => return Ok(None),
    };
    let user = storage
        .fetch::<User>(reg_num.as_str())
        .await?
        .filter(|user| user.verify_password(password));
    if user.is_none() {
        debug!("Failed login attempt for {reg_num}");
    }
    Ok(user)
}

pub async fn get_user(storage: &Storage, reg_num: &RegNum) -> Result<User> {
    storage
        .fetch::<User>(reg_num.as_str())
        .await?
        .ok_or_else(|| Error::not_found(format!("User {reg_num}")))
}

pub async fn list_users(storage: &Storage) -> Result<Vec<User>> {
    storage.fetch_all(&Filter::all()).await
}

/// Every contestant, for the ballot.
pub async fn list_candidates(storage: &Storage) -> Result<Vec<User>> {
    storage
        .fetch_all(&Filter::all().eq(fields::ROLE, Role::Contestant))
        .await
}

/// Mark a pending registration as active.
pub async fn approve(storage: &Storage, reg_num: &RegNum) -> Result<()> {
    storage
        .update(
            Collection::Users,
            reg_num.as_str(),
            Update::new().set(fields::STATUS, UserStatus::Active),
        )
        .await?;
    info!("Approved {reg_num}");
    Ok(())
}

/// Reject a registration by deleting it, so the same registration number can
/// register again.
pub async fn reject(storage: &Storage, reg_num: &RegNum) -> Result<()> {
    get_user(storage, reg_num).await?;
    storage.delete(Collection::Users, reg_num.as_str()).await?;
    info!("Rejected {reg_num}");
    Ok(())
}

pub async fn delete(storage: &Storage, reg_num: &RegNum) -> Result<()> {
    get_user(storage, reg_num).await?;
    storage.delete(Collection::Users, reg_num.as_str()).await?;
    info!("Deleted {reg_num}");
    Ok(())
}

/// Delete every user with the given role in one batch. Admins are never
/// deleted this way. Returns the number of users deleted.
pub async fn clear_by_role(storage: &Storage, role: Role) -> Result<usize> {
    if role == Role::Admin {
        warn!("Refusing to clear admin accounts");
        return Ok(0);
    }

    let users: Vec<User> = storage
        .fetch_all(&Filter::all().eq(fields::ROLE, role))
        .await?;
    let mut batch = Batch::new();
    for user in users.iter().filter(|user| user.role != Role::Admin) {
        batch.delete(Collection::Users, user.key());
    }

    let count = batch.len();
    if !batch.is_empty() {
        storage.commit(batch).await?;
    }
    info!("Cleared {count} users with role {role}");
    Ok(count)
}

pub async fn change_password(storage: &Storage, reg_num: &RegNum, password: &str) -> Result<()> {
    storage
        .update(
            Collection::Users,
            reg_num.as_str(),
            Update::new().set(fields::PASSWORD, password),
        )
        .await?;
    info!("Changed password of {reg_num}");
    Ok(())
}

/// Move an admin account to a new registration number: the record is
/// recreated under the new key and the old one deleted, in one batch.
///
/// Returns the moved record, or `None` if the numbers are the same.
pub async fn rename_admin(
    storage: &Storage,
    current: &RegNum,
    new: &RegNum,
) -> Result<Option<User>> {
    if current == new {
        return Ok(None);
    }

    if storage.fetch::<User>(new.as_str()).await?.is_some() {
        return Err(Error::conflict("New Admin ID already exists."));
    }
    let mut admin = storage
        .fetch::<User>(current.as_str())
        .await?
        .ok_or_else(|| Error::not_found("Current Admin info"))?;
    if admin.role != Role::Admin {
        return Err(Error::bad_request(format!("{current} is not an admin.")));
    }
    admin.reg_num = new.clone();

    let mut batch = Batch::new();
    batch.insert(Collection::Users, new.clone(), to_document(&admin)?);
    batch.delete(Collection::Users, current.clone());
    storage
        .commit(batch)
        .await
        .map_err(conflict_on_duplicate("New Admin ID already exists."))?;

    info!("Renamed admin {current} to {new}");
    Ok(Some(admin))
}

/// Create the given admin account if its registration number is free.
///
/// This operation is idempotent.
pub async fn ensure_admin_exists(storage: &Storage, admin: &User) -> Result<()> {
    match storage.insert_record(admin).await {
        Ok(()) => {
            info!("Created default admin {}", admin.reg_num);
            Ok(())
        }
        Err(Error::DuplicateKey { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;

    use super::*;
    use crate::store::MemoryStore;

    fn admin() -> User {
        User::new(
            RegNum::example("ADMIN001"),
            "System Administrator".to_string(),
            "admin123".to_string(),
            Role::Admin,
        )
    }

    #[rocket::async_test]
    async fn registration_is_case_insensitive() {
        let storage = Storage::new(MemoryStore::new());
        register(&storage, &User::example_voter("abc123"))
            .await
            .unwrap();
        let err = register(&storage, &User::example_voter("ABC123"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);
        assert_eq!(err.to_string(), "Registration Number already exists.");
        assert_eq!(list_users(&storage).await.unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn login_checks_credentials() {
        let storage = Storage::new(MemoryStore::new());
        register(&storage, &User::example_voter("V1")).await.unwrap();

        let user = login(&storage, " v1 ", "password").await.unwrap();
        assert_eq!(user.unwrap().reg_num, RegNum::example("V1"));
        assert!(login(&storage, "V1", "wrong").await.unwrap().is_none());
        assert!(login(&storage, "V2", "password").await.unwrap().is_none());
        assert!(login(&storage, "  ", "password").await.unwrap().is_none());
    }

    #[rocket::async_test]
    async fn candidates_are_contestants_only() {
        let storage = Storage::new(MemoryStore::new());
        for user in [
            User::example_contestant("C1"),
            User::example_voter("V1"),
            User::example_contestant("C2"),
            admin(),
        ] {
            register(&storage, &user).await.unwrap();
        }
        let candidates = list_candidates(&storage).await.unwrap();
        let regs: Vec<_> = candidates.iter().map(|c| c.reg_num.as_str()).collect();
        assert_eq!(regs, vec!["C1", "C2"]);
    }

    #[rocket::async_test]
    async fn approve_and_reject() {
        let storage = Storage::new(MemoryStore::new());
        let mut pending = User::example_voter("V1");
        pending.status = Some(UserStatus::Pending);
        register(&storage, &pending).await.unwrap();
        register(&storage, &User::example_voter("V2")).await.unwrap();

        approve(&storage, &RegNum::example("V1")).await.unwrap();
        let approved = get_user(&storage, &RegNum::example("V1")).await.unwrap();
        assert_eq!(approved.status, Some(UserStatus::Active));

        reject(&storage, &RegNum::example("V2")).await.unwrap();
        assert!(storage.fetch::<User>("V2").await.unwrap().is_none());
        // The number can be registered again.
        register(&storage, &User::example_voter("V2")).await.unwrap();

        let err = approve(&storage, &RegNum::example("NOBODY"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn clearing_protects_admins() {
        let storage = Storage::new(MemoryStore::new());
        for user in [
            admin(),
            User::example_contestant("C1"),
            User::example_voter("V1"),
            User::example_voter("V2"),
        ] {
            register(&storage, &user).await.unwrap();
        }

        assert_eq!(clear_by_role(&storage, Role::Admin).await.unwrap(), 0);
        assert_eq!(clear_by_role(&storage, Role::Voter).await.unwrap(), 2);
        assert_eq!(clear_by_role(&storage, Role::Voter).await.unwrap(), 0);

        let remaining: Vec<_> = list_users(&storage)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.reg_num.to_string())
            .collect();
        assert_eq!(remaining, vec!["ADMIN001", "C1"]);
    }

    #[rocket::async_test]
    async fn change_password_takes_effect() {
        let storage = Storage::new(MemoryStore::new());
        register(&storage, &admin()).await.unwrap();
        change_password(&storage, &RegNum::example("ADMIN001"), "n3w")
            .await
            .unwrap();
        assert!(login(&storage, "ADMIN001", "admin123")
            .await
            .unwrap()
            .is_none());
        assert!(login(&storage, "ADMIN001", "n3w").await.unwrap().is_some());
    }

    #[rocket::async_test]
    async fn rename_admin_moves_record() {
        let storage = Storage::new(MemoryStore::new());
        register(&storage, &admin()).await.unwrap();
        register(&storage, &User::example_voter("V1")).await.unwrap();
        let current = RegNum::example("ADMIN001");

        // Same ID after normalisation: nothing to do.
        let same = rename_admin(&storage, &current, &RegNum::example(" admin001"))
            .await
            .unwrap();
        assert!(same.is_none());

        // Collision.
        let err = rename_admin(&storage, &current, &RegNum::example("V1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "New Admin ID already exists.");

        // Missing current record.
        let err = rename_admin(
            &storage,
            &RegNum::example("GHOST"),
            &RegNum::example("ADMIN002"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), Status::NotFound);

        let moved = rename_admin(&storage, &current, &RegNum::example("ADMIN002"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.reg_num, RegNum::example("ADMIN002"));
        assert!(storage.fetch::<User>("ADMIN001").await.unwrap().is_none());
        let stored = get_user(&storage, &RegNum::example("ADMIN002"))
            .await
            .unwrap();
        assert_eq!(stored, moved);
        assert!(stored.verify_password("admin123"));
    }

    #[rocket::async_test]
    async fn default_admin_is_created_once() {
        let storage = Storage::new(MemoryStore::new());
        ensure_admin_exists(&storage, &admin()).await.unwrap();
        change_password(&storage, &RegNum::example("ADMIN001"), "changed")
            .await
            .unwrap();
        ensure_admin_exists(&storage, &admin()).await.unwrap();
        let stored = get_user(&storage, &RegNum::example("ADMIN001"))
            .await
            .unwrap();
        assert!(stored.verify_password("changed"));
    }
}
