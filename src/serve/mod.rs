mod error;

use crate::fetch::{fetch_tweets, FetchSettings, SessionPool};
use crate::twitter::{Authentication, ClientFactory};
use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::middleware::Logger;
use actix_web::web::{Data, Query, ServiceConfig};
use actix_web::{get, App, HttpResponse, HttpServer};
use anyhow::Context;
use error::{HttpError, IntoHttpError};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared by every worker; each request still gets its own client
pub struct AppState {
    pub auth: Authentication,
    pub pool: SessionPool,
    pub settings: FetchSettings,
    pub clients: Arc<dyn ClientFactory>,
}

#[derive(Deserialize)]
struct TweetsParams {
    query: Option<String>,
}

#[get("/get_tweets")]
async fn get_tweets(
    state: Data<AppState>,
    params: Query<TweetsParams>,
) -> Result<HttpResponse, HttpError> {
    let query = params
        .into_inner()
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| HttpError::bad_request("Query parameter is required"))?;
    let records = fetch_tweets(
        state.clients.as_ref(),
        &state.auth,
        &state.pool,
        &state.settings,
        &query,
    )
    .await
    .map_err(|e| {
        log::error!("Search for {:?} failed: {:#}", query, e);
        e
    })
    .map_500()?;
    Ok(HttpResponse::build(StatusCode::OK).json(records))
}

fn configure(cfg: &mut ServiceConfig) {
    cfg.service(get_tweets);
}

pub async fn serve(socket: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let state = Data::new(state);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(socket)?
    .run();
    log::info!("Listening on http://{}", socket);
    server.await.context("Unable to run HTTP server")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twitter::fake::{self, FakeClient, FakeFactory};
    use actix_web::test;
    use serde_json::{json, Value};

    fn state(client: FakeClient) -> Data<AppState> {
        Data::new(AppState {
            auth: fake::auth(),
            pool: SessionPool::default(),
            settings: FetchSettings::default(),
            clients: Arc::new(FakeFactory(client)),
        })
    }

    async fn get(client: FakeClient, uri: &str) -> (StatusCode, Value) {
        let app = test::init_service(
            App::new()
                .wrap(Cors::permissive())
                .app_data(state(client))
                .configure(configure),
        )
        .await;
        let request = test::TestRequest::get().uri(uri).to_request();
        let response = test::call_service(&app, request).await;
        let status = response.status();
        let body = test::read_body_json(response).await;
        (status, body)
    }

    #[actix_rt::test]
    async fn missing_query_is_rejected() {
        let (status, body) = get(FakeClient::default(), "/get_tweets").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Query parameter is required"}));
    }

    #[actix_rt::test]
    async fn blank_query_is_rejected() {
        let (status, body) = get(FakeClient::default(), "/get_tweets?query=%20%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Query parameter is required"}));
    }

    #[actix_rt::test]
    async fn returns_records() {
        let client = FakeClient {
            pages: vec![20, 20, 20],
            ..FakeClient::default()
        };
        let (status, body) = get(client, "/get_tweets?query=climate%20change").await;
        assert_eq!(status, StatusCode::OK);
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 50);
        assert_eq!(
            records[0],
            json!({
                "Username": "Author 0",
                "Tweet": "post number 0",
                "Created_At": "Tue May 14 09:30:00 +0000 2024",
                "Retweets": 100,
                "Favorites": 1000,
                "Tweet_Link": "https://twitter.com/author0/status/1000",
                "Media_URL": "https://pbs.twimg.com/media/0.jpg",
                "type": "tweet",
            })
        );
        assert_eq!(records[1]["Media_URL"], Value::Null);
    }

    #[actix_rt::test]
    async fn partial_results_are_still_ok() {
        let client = FakeClient {
            pages: vec![12],
            ..FakeClient::default()
        };
        let (status, body) = get(client, "/get_tweets?query=rust").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 12);
    }

    #[actix_rt::test]
    async fn login_failure_is_500() {
        let client = FakeClient {
            login_error: Some("Incorrect. Please try again.".to_string()),
            ..FakeClient::default()
        };
        let (status, body) = get(client, "/get_tweets?query=rust").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"error": "Unable to log in: Incorrect. Please try again."})
        );
    }

    #[actix_rt::test]
    async fn allows_any_origin() {
        let app = test::init_service(
            App::new()
                .wrap(Cors::permissive())
                .app_data(state(FakeClient::default()))
                .configure(configure),
        )
        .await;
        let request = test::TestRequest::get()
            .uri("/get_tweets?query=rust")
            .insert_header(("Origin", "https://app.example.com"))
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let allowed = response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok());
        assert!(matches!(allowed, Some("https://app.example.com") | Some("*")));
    }
}
