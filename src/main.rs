#[macro_use]
extern crate rocket;

mod config;
mod db;
mod engine;
mod guards;
mod models;
mod routes;
mod services;
mod utils;

use dotenvy::dotenv;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::figment::Figment;
use rocket::http::Header;
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

#[catch(401)]
fn unauthorized() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": "Missing or invalid access token",
        "error_code": "unauthorized"
    })
}

#[catch(404)]
fn not_found() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": "Resource not found (check /api/v1 prefix)"
    })
}

#[catch(422)]
fn unprocessable() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": "Malformed request body",
        "error_code": "validation"
    })
}

#[catch(500)]
fn internal_error() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": "Internal server error"
    })
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- LAUNCH ----------------------------- */

fn build_rocket(figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .attach(db::init())
        .attach(CORS)
        .mount("/", routes![options_handler])
        .mount(
            "/api/v1",
            routes![
                // Auth
                routes::auth::register,
                routes::auth::refresh_token,
                // User
                routes::user::get_me,
                routes::user::create_assistant_profile,
                routes::user::get_assistant_profile,
                // Care requests
                routes::request::create_request,
                routes::request::list_requests,
                routes::request::get_request,
                routes::request::complete_request,
                routes::request::cancel_request,
                // Applications
                routes::application::apply,
                routes::application::list_request_applications,
                routes::application::my_applications,
                routes::application::accept_application,
                routes::application::reject_application,
                // Ratings
                routes::rating::submit_rating,
                routes::rating::get_user_ratings,
                // History
                routes::history::get_history,
            ],
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register("/", catchers![unauthorized, not_found, unprocessable, internal_error])
}

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    println!("🚀 Care API running");
    println!("📚 Swagger UI → http://localhost:8000/api/docs");

    build_rocket(rocket::Config::figment())
}

#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{json, Value};

    use super::build_rocket;

    async fn client() -> Client {
        let figment = rocket::Config::figment().merge(("store_backend", "memory"));
        Client::tracked(build_rocket(figment)).await.unwrap()
    }

    async fn post(client: &Client, uri: &str, token: Option<&str>, body: Value) -> (Status, Value) {
        let mut request = client.post(uri).header(ContentType::JSON).body(body.to_string());
        if let Some(token) = token {
            request = request.header(Header::new("Authorization", format!("Bearer {}", token)));
        }
        let response = request.dispatch().await;
        let status = response.status();
        (status, response.into_json::<Value>().await.unwrap_or(Value::Null))
    }

    async fn get(client: &Client, uri: &str, token: &str) -> (Status, Value) {
        let response = client
            .get(uri)
            .header(Header::new("Authorization", format!("Bearer {}", token)))
            .dispatch()
            .await;
        let status = response.status();
        (status, response.into_json::<Value>().await.unwrap_or(Value::Null))
    }

    async fn register(client: &Client, name: &str, role: &str) -> (String, String) {
        let (status, body) = post(
            client,
            "/api/v1/auth/register",
            None,
            json!({ "name": name, "role": role }),
        )
        .await;
        assert_eq!(status, Status::Ok);
        (
            body["data"]["user"]["id"].as_str().unwrap().to_string(),
            body["data"]["accessToken"].as_str().unwrap().to_string(),
        )
    }

    #[rocket::async_test]
    async fn full_request_lifecycle_over_http() {
        let client = client().await;
        let (_, owner) = register(&client, "Carmen", "user").await;
        let (assistant_id, assistant) = register(&client, "Ana", "assistant").await;

        let (status, _) = post(&client, "/api/v1/assistant/profile", Some(&assistant), json!({
            "bio": "Ten years with elderly care",
            "care_types": ["elderly", "companion"],
        }))
        .await;
        assert_eq!(status, Status::Ok);

        let (status, body) = post(&client, "/api/v1/requests", Some(&owner), json!({
            "title": "Evening companion",
            "care_type": "companion",
            "hourly_rate": 15.0,
            "total_hours": 40.0,
        }))
        .await;
        assert_eq!(status, Status::Ok);
        let request_id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["status"], "open");

        let uri = format!("/api/v1/requests/{}/applications", request_id);
        let (status, body) = post(&client, &uri, Some(&assistant), json!({ "note": "Free evenings" })).await;
        assert_eq!(status, Status::Ok);
        let application_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = post(&client, &uri, Some(&assistant), json!({})).await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(body["error_code"], "already_applied");

        let accept = format!("/api/v1/requests/{}/applications/{}/accept", request_id, application_id);
        let (status, _) = post(&client, &accept, Some(&assistant), json!({})).await;
        assert_eq!(status, Status::Forbidden);
        let (status, body) = post(&client, &accept, Some(&owner), json!({})).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"]["request"]["status"], "assigned");
        assert_eq!(body["data"]["engagement"]["assistant_id"], assistant_id.as_str());

        let (status, body) = get(&client, "/api/v1/history", &assistant).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"]["in_progress"].as_array().unwrap().len(), 1);

        let rate = format!("/api/v1/requests/{}/ratings", request_id);
        let (status, body) = post(&client, &rate, Some(&owner), json!({ "score": 5 })).await;
        assert_eq!(status, Status::Forbidden);
        assert_eq!(body["error_code"], "not_eligible");

        let complete = format!("/api/v1/requests/{}/complete", request_id);
        let (status, body) = post(&client, &complete, Some(&owner), json!({})).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"]["status"], "completed");

        let (status, body) = post(&client, &rate, Some(&owner), json!({ "score": 4 })).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"]["reputation"]["rating"], 4.0);
        assert_eq!(body["data"]["reputation"]["rating_count"], 1);

        let (status, body) = post(&client, &rate, Some(&owner), json!({ "score": 2 })).await;
        assert_eq!(status, Status::Conflict);
        assert_eq!(body["error_code"], "duplicate_rating");

        let ratings = format!("/api/v1/ratings/user/{}", assistant_id);
        let (status, body) = get(&client, &ratings, &owner).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["data"]["ratings"].as_array().unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn requests_need_a_bearer_token_and_valid_ids() {
        let client = client().await;

        let response = client.get("/api/v1/requests").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);

        let (_, token) = register(&client, "Carmen", "user").await;
        let (status, body) = get(&client, "/api/v1/requests/not-an-id", &token).await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["message"], "Invalid request ID");

        let (status, body) = get(&client, "/api/v1/requests?status=bogus", &token).await;
        assert_eq!(status, Status::BadRequest);
        assert_eq!(body["success"], false);
    }

    #[rocket::async_test]
    async fn ignition_fails_on_an_unparseable_setting() {
        let figment = rocket::Config::figment()
            .merge(("store_backend", "memory"))
            .merge(("completion_threshold", 300));
        assert!(build_rocket(figment).ignite().await.is_err());
    }

    #[rocket::async_test]
    async fn release_profile_requires_signing_keys() {
        let release = rocket::Config::figment()
            .select(rocket::Config::RELEASE_PROFILE)
            .merge(("store_backend", "memory"));
        assert!(build_rocket(release.clone()).ignite().await.is_err());

        let configured = release
            .merge(("jwt_secret", "access-signing-key"))
            .merge(("jwt_refresh_secret", "refresh-signing-key"));
        assert!(build_rocket(configured).ignite().await.is_ok());
    }
}
