// handlers/accounts.rs
use axum::{
    extract::{Multipart, State},
    response::Redirect,
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use serde_json::{json, Value};

use super::FormData;
use crate::{
    accounts::{self, ProfileUpdate, Registration, MAX_FULL_NAME_LEN, MAX_USERNAME_LEN, MIN_PASSWORD_LEN},
    error::AppResult,
    flash::{self, Flash, FlashMessage},
    models::{LoginForm, Profile, User},
    session::{self, CurrentUser},
    state::AppState,
};

pub const PROFILE_URL: &str = "/accounts/profile/";

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub user: User,
    pub display_name: String,
    pub profile: Profile,
    pub messages: Vec<FlashMessage>,
}

pub async fn register_form() -> Json<Value> {
    Json(json!({
        "fields": {
            "username": { "required": true, "max_length": MAX_USERNAME_LEN },
            "email": { "required": true },
            "password1": { "required": true, "min_length": MIN_PASSWORD_LEN },
            "password2": { "required": true },
            "photo": { "required": false, "type": "file" },
        }
    }))
}

/// Creates the account, logs it in and goes to the poll list.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> AppResult<(CookieJar, Redirect)> {
    let mut form = FormData::read(multipart).await?;
    let registration = Registration {
        username: form.text("username"),
        email: form.text("email"),
        password1: form.text("password1"),
        password2: form.text("password2"),
        photo: form.take_file("photo"),
    };

    let user = accounts::register(&state.pool, &state.media, registration).await?;
    let jar = state.sessions.login(jar, user.id)?;

    Ok((flash::push(jar, Flash::Registered), Redirect::to("/")))
}

pub async fn login_form() -> Json<Value> {
    Json(json!({
        "fields": {
            "username": { "required": true },
            "password": { "required": true },
        }
    }))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> AppResult<(CookieJar, Redirect)> {
    let user = accounts::authenticate(&state.pool, &form.username, &form.password).await?;
    let jar = state.sessions.login(jar, user.id)?;

    Ok((flash::push(jar, Flash::LoggedIn), Redirect::to("/")))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = session::logout(jar);
    (flash::push(jar, Flash::LoggedOut), Redirect::to("/"))
}

pub async fn profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<ProfileView>)> {
    let profile = accounts::get_or_create_profile(&state.pool, user.id).await?;
    let (jar, messages) = flash::take(jar);

    Ok((
        jar,
        Json(ProfileView {
            display_name: profile.display_name(&user.username).to_string(),
            user,
            profile,
            messages,
        }),
    ))
}

/// Current values for the edit form.
pub async fn profile_edit_form(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Value>> {
    let profile = accounts::get_or_create_profile(&state.pool, user.id).await?;

    Ok(Json(json!({
        "fields": {
            "full_name": { "value": profile.full_name, "max_length": MAX_FULL_NAME_LEN },
            "bio": { "value": profile.bio },
            "photo": { "value": profile.photo, "type": "file" },
            "photo-clear": { "type": "checkbox" },
        }
    })))
}

pub async fn profile_edit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    multipart: Multipart,
) -> AppResult<(CookieJar, Redirect)> {
    let mut form = FormData::read(multipart).await?;
    let update = ProfileUpdate {
        full_name: form.text("full_name"),
        bio: form.text("bio"),
        photo: form.take_file("photo"),
        clear_photo: form.checked("photo-clear"),
    };

    accounts::update_profile(&state.pool, &state.media, user.id, update).await?;

    Ok((flash::push(jar, Flash::ProfileUpdated), Redirect::to(PROFILE_URL)))
}

pub async fn profile_delete_form(CurrentUser(user): CurrentUser) -> Json<Value> {
    Json(json!({
        "confirm": format!("Delete the account {:?} and all of its votes?", user.username),
    }))
}

/// Deletes the account and ends the session.
pub async fn profile_delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    accounts::delete_account(&state.pool, &state.media, user.id).await?;
    let jar = session::logout(jar);

    Ok((flash::push(jar, Flash::AccountDeleted), Redirect::to("/")))
}
