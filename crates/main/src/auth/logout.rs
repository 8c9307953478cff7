use db::user::LOGIN_COOKIE;
use rocket::{
    http::CookieJar,
    response::{Flash, Redirect},
};

use crate::auth::signup::SIGNUP_COOKIE;

#[get("/logout")]
pub async fn logout(jar: &CookieJar<'_>) -> Flash<Redirect> {
    jar.remove_private(LOGIN_COOKIE);
    jar.remove_private(SIGNUP_COOKIE);
    Flash::success(Redirect::to("/login"), "You have been logged out.")
}
