mod common;

use axum::http::{header, Method, StatusCode};
use chrono::{Duration, Utc};
use common::{read_json, spawn_app, spawn_app_with, PASSWORD};
use reading_practice_core::ports::DatabaseService;
use serde_json::json;

#[tokio::test]
async fn health_is_public() {
    let app = spawn_app();
    let (status, body) = read_json(app.send(Method::GET, "/health", None, None).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["environment"], "test");
}

#[tokio::test]
async fn openapi_document_lists_the_routes() {
    let app = spawn_app();
    let (status, body) =
        read_json(app.send(Method::GET, "/api-docs/openapi.json", None, None).await).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/auth/login"].is_object());
    assert!(body["paths"]["/api/progress/class"].is_object());
}

#[tokio::test]
async fn unknown_route_gets_the_error_envelope() {
    let app = spawn_app();
    let (status, body) =
        read_json(app.send(Method::GET, "/api/does-not-exist", None, None).await).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Route not found");
}

#[tokio::test]
async fn register_login_and_profile() {
    let app = spawn_app();
    let session = app.register("Ada@Example.com", "student", None).await;

    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    let user = &body["data"]["user"];
    assert_eq!(user["email"], "ada@example.com");
    assert_eq!(user["role"], "student");
    assert!(user.get("password").is_none());
    assert!(user.get("hashedPassword").is_none());
    assert!(user["lastLogin"].is_string());

    let (status, body) = app.get("/api/auth/profile", &session.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["user"]["id"], session.user_id.as_str());
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = spawn_app();
    app.register("bob@example.com", "student", None).await;
    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "bob@example.com", "password": "not-the-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");
}

#[tokio::test]
async fn duplicate_email_conflicts_regardless_of_case() {
    let app = spawn_app();
    app.register("carol@example.com", "student", None).await;
    let (status, body) = app
        .post(
            "/api/auth/register",
            None,
            json!({ "email": " CAROL@example.com ", "password": PASSWORD, "name": "Carol" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn invalid_registration_lists_field_errors() {
    let app = spawn_app();
    let (status, body) = app
        .post(
            "/api/auth/register",
            None,
            json!({ "email": "not-an-email", "password": "123", "name": "X", "role": "admin" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    for field in ["email", "password", "name", "role"] {
        assert!(fields.contains(&field), "missing error for {}", field);
    }
}

#[tokio::test]
async fn login_attempts_are_rate_limited() {
    let app = spawn_app();
    let attempt = json!({ "email": "nobody@example.com", "password": "whatever" });
    for _ in 0..5 {
        let (status, _) = app.post("/api/auth/login", None, attempt.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let response = app
        .send(Method::POST, "/api/auth/login", None, Some(attempt))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    let (_, body) = read_json(response).await;
    assert_eq!(
        body["message"],
        "Too many login attempts, please try again in 15 minutes"
    );
}

#[tokio::test]
async fn global_limit_applies_to_api_routes() {
    let app = spawn_app_with(&[("RATE_LIMIT_MAX_REQUESTS", "2")]);
    let session = app.admin("root@example.com").await;
    for _ in 0..2 {
        let (status, _) = app.get("/api/auth/profile", &session.token).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = app.get("/api/auth/profile", &session.token).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn tokens_are_bound_to_their_purpose() {
    let app = spawn_app();
    let session = app.register("dan@example.com", "student", None).await;

    let (status, _) = app.get("/api/auth/profile", &session.refresh_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/api/auth/refresh-token",
            None,
            json!({ "refreshToken": session.token }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .post(
            "/api/auth/refresh-token",
            None,
            json!({ "refreshToken": session.refresh_token }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let access = body["data"]["accessToken"].as_str().unwrap();
    let (status, _) = app.get("/api/auth/profile", access).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn expired_access_token_asks_to_sign_in_again() {
    let app = spawn_app();
    let session = app.register("erin@example.com", "student", None).await;
    let user = app
        .db
        .get_user_by_id(session.user_id.parse().unwrap())
        .await
        .unwrap();

    let credentials = &app.state.credentials;
    let expired = credentials
        .sign(
            &user,
            credentials.access_audience(),
            Utc::now() - Duration::hours(2),
            Duration::hours(1),
        )
        .unwrap();

    let (status, body) = app.get("/api/auth/profile", &expired).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Token expired, please sign in again");
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = spawn_app();
    let (status, body) = read_json(app.send(Method::GET, "/api/readings", None, None).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Authentication token required");

    let (status, _) = app.get("/api/readings", "garbage").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn students_cannot_manage_the_catalogue() {
    let app = spawn_app();
    let student = app.register("eve@example.com", "student", None).await;
    let (status, _) = app
        .post(
            "/api/poems",
            Some(&student.token),
            json!({ "title": "Mine", "author": "Eve", "content": "x", "theme": "t",
                    "level": "beginner", "difficulty": "easy", "duration": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let teacher = app.register("frank@example.com", "teacher", Some("CM2-A")).await;
    let poem_id = app.create_poem(&teacher.token, "Autumn").await;

    let (status, body) = app.get(&format!("/api/poems/{}", poem_id), &student.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Autumn");
    assert_eq!(body["data"]["duration"], 2);
}

#[tokio::test]
async fn only_the_creator_or_an_admin_edits_a_poem() {
    let app = spawn_app();
    let author = app.register("gina@example.com", "teacher", Some("CM2-A")).await;
    let other = app.register("hugo@example.com", "teacher", Some("CM2-B")).await;
    let admin = app.admin("root@example.com").await;
    let poem_id = app.create_poem(&author.token, "Winter").await;
    let uri = format!("/api/poems/{}", poem_id);

    let (status, _) = app.put(&uri, &other.token, json!({ "title": "Stolen" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.put(&uri, &admin.token, json!({ "title": "Deep Winter" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Deep Winter");

    let (status, _) =
        read_json(app.send(Method::DELETE, &uri, Some(&author.token), None).await).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get("/api/poems", &author.token).await;
    assert_eq!(body["data"]["pagination"]["totalItems"], 0);
}

#[tokio::test]
async fn toggling_a_favorite_twice_restores_the_original_state() {
    let app = spawn_app();
    let teacher = app.register("ines@example.com", "teacher", Some("CM2-A")).await;
    let student = app.register("jack@example.com", "student", Some("CM2-A")).await;
    let poem_id = app.create_poem(&teacher.token, "Spring").await;
    let check = format!("/api/favorites/check/{}", poem_id);

    let (_, body) = app.get(&check, &student.token).await;
    assert_eq!(body["data"]["isFavorite"], false);

    let toggle = json!({ "poemId": poem_id });
    let (status, body) = app.post("/api/favorites", Some(&student.token), toggle.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isFavorite"], true);
    let (_, body) = app.get("/api/favorites", &student.token).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let (_, body) = app.post("/api/favorites", Some(&student.token), toggle).await;
    assert_eq!(body["data"]["isFavorite"], false);
    let (_, body) = app.get(&check, &student.token).await;
    assert_eq!(body["data"]["isFavorite"], false);

    let (status, _) = read_json(
        app.send(
            Method::DELETE,
            &format!("/api/favorites/{}", poem_id),
            Some(&student.token),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completed_readings_update_weekly_progress() {
    let app = spawn_app();
    let teacher = app.register("kate@example.com", "teacher", Some("CM2-A")).await;
    let student = app.register("liam@example.com", "student", Some("CM2-A")).await;
    let poem_id = app.create_poem(&teacher.token, "Summer").await;

    let (status, body) = app
        .post(
            "/api/readings",
            Some(&student.token),
            json!({
                "poemId": poem_id,
                "score": 80.0,
                "duration": 120,
                "completed": true,
                "mistakes": [{ "word": "Roses", "position": 0, "type": "pronunciation" }],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["progress"]["readingsCompleted"], 1);
    assert_eq!(body["data"]["progress"]["averageScore"], 80.0);
    assert_eq!(body["data"]["progress"]["totalMistakes"], 1);
    let reading_id = body["data"]["reading"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            "/api/readings",
            Some(&student.token),
            json!({ "poemId": poem_id, "score": 90.0, "duration": 60, "completed": true }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["improvementPercentage"], 12.5);

    let (status, body) = app.get("/api/progress/current", &student.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["readingsCompleted"], 2);
    assert_eq!(body["data"]["averageScore"], 85.0);
    assert_eq!(body["data"]["bestScore"], 90.0);
    assert_eq!(body["data"]["totalTime"], 3.0);

    let (_, body) = app.get(&format!("/api/poems/{}", poem_id), &student.token).await;
    assert_eq!(body["data"]["readCount"], 2);
    assert_eq!(body["data"]["averageScore"], 85.0);

    let uri = format!("/api/readings/{}", reading_id);
    let (status, _) = app.put(&uri, &student.token, json!({ "score": 99.0 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = app
        .put(&uri, &student.token, json!({ "feedback": "Much smoother" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reading"]["feedback"], "Much smoother");
}

#[tokio::test]
async fn weekly_goal_is_validated_and_kept() {
    let app = spawn_app();
    let student = app.register("mia@example.com", "student", None).await;

    let (status, _) = app
        .put("/api/progress/goal", &student.token, json!({ "weeklyGoal": 0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .put("/api/progress/goal", &student.token, json!({ "weeklyGoal": 3 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["weeklyGoal"], 3);
    assert_eq!(body["data"]["goalAchieved"], false);

    let (_, body) = app.get("/api/progress/current", &student.token).await;
    assert_eq!(body["data"]["weeklyGoal"], 3);

    let (status, _) = app.get("/api/progress/monthly?month=13", &student.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get("/api/progress?weeks=0", &student.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn progress_of_another_user_needs_ownership_or_admin() {
    let app = spawn_app();
    let alice = app.register("nora@example.com", "student", None).await;
    let bob = app.register("oscar@example.com", "student", None).await;
    let admin = app.admin("root@example.com").await;
    let uri = format!("/api/progress/users/{}", bob.user_id);

    let (status, _) = app.get(&uri, &alice.token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get(&uri, &bob.token).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.get(&uri, &admin.token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_array());
}

#[tokio::test]
async fn teachers_see_only_their_class() {
    let app = spawn_app();
    let teacher = app.register("paul@example.com", "teacher", Some("CM2-A")).await;
    let classless = app.register("quinn@example.com", "teacher", None).await;
    let student = app.register("rose@example.com", "student", Some("CM2-A")).await;
    let outsider = app.register("sam@example.com", "student", Some("CM2-B")).await;

    let (status, _) = app.get("/api/progress/class", &student.token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/progress/class", &classless.token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/api/progress/class", &teacher.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["classId"], "CM2-A");
    assert_eq!(body["data"]["students"].as_array().unwrap().len(), 1);

    let (_, body) = app.get("/api/users/students", &teacher.token).await;
    assert_eq!(body["data"]["pagination"]["totalItems"], 1);

    let (status, _) = read_json(
        app.send(
            Method::DELETE,
            &format!("/api/users/students/{}", outsider.user_id),
            Some(&teacher.token),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = read_json(
        app.send(
            Method::DELETE,
            &format!("/api/users/students/{}", student.user_id),
            Some(&teacher.token),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);

    let (status, body) = app.get("/api/auth/profile", &student.token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User account is deactivated");
}

#[tokio::test]
async fn teachers_enroll_students_into_their_class() {
    let app = spawn_app();
    let teacher = app.register("tina@example.com", "teacher", Some("CM2-A")).await;
    let (status, body) = app
        .post(
            "/api/users/students",
            Some(&teacher.token),
            json!({ "email": "uma@example.com", "password": PASSWORD, "name": "Uma" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["role"], "student");
    assert_eq!(body["data"]["classId"], "CM2-A");

    let (status, _) = app
        .post(
            "/api/users/students",
            Some(&teacher.token),
            json!({ "email": "vic@example.com", "password": PASSWORD, "name": "Vic",
                    "classId": "CM2-B" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
