use rocket::{http::CookieJar, serde::json::Json, Route, State};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::{
            admin::{AdminIdChange, AdminIdChanged, ClearRole, Cleared, PasswordChange},
            stats::StatsDescription,
            user::{Registration, UserProfile},
            Body, Empty, Success,
        },
        auth::{AdminSession, Session},
        directory,
        tally::TallySnapshot,
        user::{RegNum, UserStatus},
    },
    store::Storage,
};

pub fn routes() -> Vec<Route> {
    routes![
        stats,
        list_users,
        add_user,
        delete_user,
        approve_user,
        reject_user,
        clear_role,
        change_password,
        change_admin_id,
    ]
}

#[get("/stats")]
async fn stats(_admin: AdminSession, storage: Storage) -> Result<Json<StatsDescription>> {
    let users = directory::list_users(&storage).await?;
    Ok(Json(TallySnapshot::compute(users).into()))
}

#[get("/users")]
async fn list_users(_admin: AdminSession, storage: Storage) -> Result<Json<Vec<UserProfile>>> {
    let users = directory::list_users(&storage)
        .await?
        .into_iter()
        .map(UserProfile::from)
        .collect();
    Ok(Json(users))
}

/// Add a user directly, skipping approval.
#[post("/admin/users", data = "<registration>", format = "json")]
async fn add_user(
    _admin: AdminSession,
    registration: Body<Registration>,
    storage: Storage,
) -> Result<Json<Success<UserProfile>>> {
    let user = registration.into_inner().into_user(UserStatus::Active);
    directory::register(&storage, &user).await?;
    Ok(Success::new(user.into()))
}

#[delete("/admin/users/<reg_num>")]
async fn delete_user(
    _admin: AdminSession,
    reg_num: RegNum,
    storage: Storage,
) -> Result<Json<Success<Empty>>> {
    directory::delete(&storage, &reg_num).await?;
    Ok(Success::ok())
}

#[post("/admin/users/<reg_num>/approve")]
async fn approve_user(
    _admin: AdminSession,
    reg_num: RegNum,
    storage: Storage,
) -> Result<Json<Success<Empty>>> {
    directory::approve(&storage, &reg_num).await?;
    Ok(Success::ok())
}

#[post("/admin/users/<reg_num>/reject")]
async fn reject_user(
    _admin: AdminSession,
    reg_num: RegNum,
    storage: Storage,
) -> Result<Json<Success<Empty>>> {
    directory::reject(&storage, &reg_num).await?;
    Ok(Success::ok())
}

/// Delete every voter or every contestant. Admins are never cleared.
#[post("/admin/clear", data = "<request>", format = "json")]
async fn clear_role(
    _admin: AdminSession,
    request: Body<ClearRole>,
    storage: Storage,
) -> Result<Json<Success<Cleared>>> {
    let deleted = directory::clear_by_role(&storage, request.0.role).await?;
    Ok(Success::new(Cleared { deleted }))
}

#[post("/admin/password", data = "<request>", format = "json")]
async fn change_password(
    _admin: AdminSession,
    request: Body<PasswordChange>,
    storage: Storage,
) -> Result<Json<Success<Empty>>> {
    let PasswordChange {
        reg_num,
        new_password,
    } = request.into_inner();
    if new_password.is_empty() {
        return Err(Error::bad_request("New password must not be empty."));
    }

    directory::change_password(&storage, &reg_num, &new_password).await?;
    Ok(Success::ok())
}

#[post("/admin/id", data = "<request>", format = "json")]
async fn change_admin_id(
    admin: AdminSession,
    request: Body<AdminIdChange>,
    cookies: &CookieJar<'_>,
    storage: Storage,
    config: &State<Config>,
) -> Result<Json<Success<AdminIdChanged>>> {
    let AdminIdChange { current_id, new_id } = request.into_inner();

    let changed = match directory::rename_admin(&storage, &current_id, &new_id).await? {
        Some(renamed) => {
            Session::refresh_if_current(&admin.0, &current_id, cookies, config, &renamed);
            true
        }
        None => false,
    };

    Ok(Success::new(AdminIdChanged {
        changed,
        reg_num: new_id,
    }))
}
