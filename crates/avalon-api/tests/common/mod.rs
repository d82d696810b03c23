//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use avalon_core::clock::Clock;
use avalon_core::rng::DeterministicRng;
use avalon_game::application::command_handlers::TransitionPolicy;
use avalon_test_support::{SequenceRng, SequentialIdGenerator, fixed_clock, identity_shuffle_draws};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use avalon_api::config::AppConfig;
use avalon_api::state::AppState;

/// Names seated by `seat_five`, in seating order.
pub const NAMES: [&str; 5] = ["ann", "bob", "cat", "dan", "eve"];

/// Roles for `seat_five`; the scripted deal hands them out in this order.
pub const ROLES: [&str; 5] = ["merlin", "percival", "loyal_servant", "morgana", "assassin"];

/// Build the full app over the default (in-memory, cached) store. The RNG
/// deals roles in list order and makes the first seat the leader.
pub async fn build_test_app() -> Router {
    let config = AppConfig::default();
    let event_repository = avalon_api::build_event_repository(&config).await.unwrap();

    let mut draws = identity_shuffle_draws(5);
    draws.push(0);
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(fixed_clock());
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> =
        Arc::new(Mutex::new(SequenceRng::new(draws)));
    let app_state = AppState::new(
        clock,
        rng,
        Arc::new(SequentialIdGenerator::new()),
        event_repository,
        TransitionPolicy::default(),
    );

    avalon_api::app(app_state)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// A started five-player game reached over HTTP.
pub struct Table {
    pub app: Router,
    pub game_id: String,
    /// Player tokens in `NAMES` order.
    pub players: Vec<String>,
}

impl Table {
    /// Creates a game as `ann`, seats the rest, and starts it with `ROLES`.
    pub async fn seat_five() -> Self {
        let app = build_test_app().await;

        let (_, created) =
            post_json(app.clone(), "/api/v1/games", &json!({ "player_name": NAMES[0] })).await;
        assert_eq!(created["success"], true);
        let game_id = created["game_id"].as_str().unwrap().to_owned();
        let mut players = vec![created["player_id"].as_str().unwrap().to_owned()];

        for name in &NAMES[1..] {
            let (_, joined) = post_json(
                app.clone(),
                &format!("/api/v1/games/{game_id}/join"),
                &json!({ "player_name": name }),
            )
            .await;
            assert_eq!(joined["success"], true, "join of {name} failed");
            players.push(joined["player_id"].as_str().unwrap().to_owned());
        }

        let (_, started) = post_json(
            app.clone(),
            &format!("/api/v1/games/{game_id}/start"),
            &json!({
                "player_id": players[0],
                "role_list": ROLES,
                "player_order": NAMES,
            }),
        )
        .await;
        assert_eq!(started["success"], true);

        Self {
            app,
            game_id,
            players,
        }
    }

    /// The token of the player called `name`.
    pub fn token(&self, name: &str) -> &str {
        let seat = NAMES.iter().position(|n| *n == name).unwrap();
        &self.players[seat]
    }

    /// Fetches `name`'s view of the game.
    pub async fn view(&self, name: &str) -> Value {
        let (status, view) = get_json(
            self.app.clone(),
            &format!(
                "/api/v1/games/{}/players/{}/state",
                self.game_id,
                self.token(name)
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        view
    }

    /// The id of the attempt that is currently open.
    pub async fn current_quest(&self) -> Value {
        let view = self.view(NAMES[0]).await;
        view["quests"].as_array().unwrap().last().unwrap().clone()
    }

    /// Posts a write to a path under the current game and returns its
    /// `success` flag.
    pub async fn write(&self, path: &str, body: &Value) -> bool {
        let (status, json) = post_json(
            self.app.clone(),
            &format!("/api/v1/games/{}/{path}", self.game_id),
            body,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        json["success"].as_bool().unwrap()
    }

    pub async fn propose(&self, quest_id: &str, leader: &str, members: &[&str]) -> bool {
        self.write(
            &format!("quests/{quest_id}/proposal"),
            &json!({ "player_id": self.token(leader), "members": members }),
        )
        .await
    }

    pub async fn vote_on_proposal(&self, quest_id: &str, name: &str, vote: &str) -> bool {
        self.write(
            &format!("quests/{quest_id}/proposal-votes"),
            &json!({ "player_id": self.token(name), "vote": vote }),
        )
        .await
    }

    pub async fn vote_in_quest(&self, quest_id: &str, name: &str, vote: &str) -> bool {
        self.write(
            &format!("quests/{quest_id}/quest-votes"),
            &json!({ "player_id": self.token(name), "vote": vote }),
        )
        .await
    }
}
