use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            admin::AdminCredentials,
            response::Message,
            session::{AdminSession, ADMIN_SESSION_COOKIE},
        },
        db::admin::Admin,
        mongodb::Coll,
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![login, logout, session]
}

#[post("/admin/login", data = "<credentials>")]
pub async fn login(
    cookies: &CookieJar<'_>,
    credentials: Option<Json<AdminCredentials>>,
    admins: Coll<Admin>,
    config: &State<Config>,
) -> Result<Json<Message>> {
    let credentials = credentials.ok_or_else(|| Error::bad_request("Invalid payload."))?;
    credentials.validate()?;

    // Same answer for an unknown email and a wrong password.
    let email = credentials.normalized_email();
    let verified = match Admin::find_by_email(&admins, &email).await? {
        Some(admin) => admin.verify_password(&credentials.password)?,
        None => false,
    };
    if !verified {
        return Err(Error::Status(
            Status::Unauthorized,
            "Email or password is incorrect.".to_string(),
        ));
    }

    let session = AdminSession::new(&email, config.session_ttl());
    cookies.add(session.into_cookie(config));
    info!("Admin {email} signed in");

    Ok(Json(Message::success("Signed in.")))
}

#[post("/admin/logout")]
pub fn logout(cookies: &CookieJar<'_>) -> Json<Message> {
    cookies.remove(Cookie::build(ADMIN_SESSION_COOKIE).path("/"));
    Json(Message::success("Signed out."))
}

/// Whether the caller holds a valid admin session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub success: bool,
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[get("/admin/session")]
pub fn session(session: Option<AdminSession>) -> Json<SessionStatus> {
    Json(SessionStatus {
        success: true,
        authenticated: session.is_some(),
        email: session.map(|session| session.email),
    })
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::ContentType,
        local::asynchronous::{Client, LocalResponse},
        serde::json::{json, Value},
    };

    use super::*;
    use crate::model::db::admin::NewAdmin;

    async fn post_login<'c>(client: &'c Client, body: Value) -> LocalResponse<'c> {
        client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await
    }

    async fn session_status(client: &Client) -> SessionStatus {
        client
            .get(uri!(session))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap()
    }

    #[backend_test]
    async fn login_valid(client: Client, admins: Coll<NewAdmin>) {
        let credentials = AdminCredentials::example();
        admins
            .insert_one(NewAdmin::try_from(credentials.clone()).unwrap(), None)
            .await
            .unwrap();

        assert!(!session_status(&client).await.authenticated);

        let response = post_login(&client, json!(credentials)).await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(ADMIN_SESSION_COOKIE).is_some());

        let status = session_status(&client).await;
        assert!(status.authenticated);
        assert_eq!(status.email.as_deref(), Some("panitia@pemira.test"));

        let response = client.post(uri!(logout)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(ADMIN_SESSION_COOKIE).is_none());
        assert!(!session_status(&client).await.authenticated);
    }

    #[backend_test]
    async fn login_invalid(client: Client, admins: Coll<NewAdmin>) {
        admins
            .insert_one(NewAdmin::try_from(AdminCredentials::example()).unwrap(), None)
            .await
            .unwrap();

        // Empty credentials.
        let response = post_login(&client, json!(AdminCredentials::empty())).await;
        assert_eq!(Status::BadRequest, response.status());

        // Unknown email and wrong password get the same answer.
        let unknown = post_login(
            &client,
            json!({ "email": "nobody@pemira.test", "password": "pemira2024!" }),
        )
        .await;
        assert_eq!(Status::Unauthorized, unknown.status());
        let unknown: Message = unknown.into_json().await.unwrap();

        let wrong = post_login(
            &client,
            json!({ "email": "panitia@pemira.test", "password": "guess" }),
        )
        .await;
        assert_eq!(Status::Unauthorized, wrong.status());
        let wrong: Message = wrong.into_json().await.unwrap();

        assert_eq!(unknown, wrong);
        assert!(client.cookies().get(ADMIN_SESSION_COOKIE).is_none());
    }

    #[backend_test]
    async fn forged_cookie_is_not_a_session(client: Client) {
        let forged = AdminSession::new("intruder@pemira.test", chrono::Duration::hours(1))
            .sign(b"not-the-server-secret");
        let status: SessionStatus = client
            .get(uri!(session))
            .cookie(Cookie::new(ADMIN_SESSION_COOKIE, forged))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert!(!status.authenticated);
        assert_eq!(status.email, None);
    }
}
