mod utils;
use utils::*;

use crud_load::{user_crud_with, Api, UPDATED_USERNAME};
use mock_service::prelude::*;
use mock_service::StatusCode;
use stampede::prelude::*;
use std::time::Duration;

async fn service(faults: Faults) -> (ServiceState, Api) {
    init();
    let state = ServiceState::new();
    state.set_faults(faults);
    let base_url = spawn_service(state.clone()).await;
    (state, Api::new(&base_url))
}

#[tokio::test]
async fn single_iteration_happy_path() {
    let (state, api) = service(Faults::default()).await;

    let stats = user_crud_with(api).iterations(1).await;

    assert!(stats.checks_passed(), "{stats}");
    assert_eq!(stats.iterations, 1);
    assert_eq!(stats.iteration_errors, 0);
    assert_eq!(stats.check("is status 200").unwrap().passes, 5);
    for name in [
        "is contains user with id",
        "is user with id",
        "is user with updated username",
        "user was deleted correctly",
        "does not contain user with id",
    ] {
        let check = stats.check(name).unwrap();
        assert_eq!((check.passes, check.fails), (1, 0), "{name}");
    }

    assert_eq!(
        state.requests(),
        RequestCounts {
            create: 1,
            list: 2,
            get: 1,
            update: 1,
            delete: 1,
        }
    );
    assert_eq!(state.user_count(), 0);

    for name in [
        "create_user",
        "get_all_users",
        "get_user",
        "update_user",
        "delete_user",
    ] {
        let transaction = stats.transaction(name).unwrap();
        assert_eq!(transaction.error, 0, "{name}");
    }
    assert_eq!(stats.transaction("get_all_users").unwrap().success, 2);
}

#[tokio::test]
async fn failed_create_ends_the_iteration() {
    let (state, api) = service(Faults {
        create: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..Default::default()
    })
    .await;

    let stats = user_crud_with(api).iterations(3).await;

    assert_eq!(stats.iterations, 3);
    assert_eq!(stats.iteration_errors, 0);
    assert_eq!(stats.check("is status 200").unwrap().fails, 3);
    assert!(stats.check("is contains user with id").is_none());
    assert_eq!(
        state.requests(),
        RequestCounts {
            create: 3,
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn failed_update_skips_delete() {
    let (state, api) = service(Faults {
        update: Some(StatusCode::BAD_REQUEST),
        ..Default::default()
    })
    .await;

    let stats = user_crud_with(api).iterations(1).await;

    assert!(!stats.checks_passed());
    let updated = stats.check("is user with updated username").unwrap();
    assert_eq!(updated.fails, 1);

    let requests = state.requests();
    assert_eq!(requests.update, 1);
    assert_eq!(requests.delete, 0);
    assert_eq!(requests.list, 1);
    assert_eq!(state.user_count(), 1);
}

#[tokio::test]
async fn failed_reads_do_not_end_the_iteration() {
    let (state, api) = service(Faults {
        list: Some(StatusCode::INTERNAL_SERVER_ERROR),
        get: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..Default::default()
    })
    .await;

    let stats = user_crud_with(api).iterations(1).await;

    assert_eq!(stats.iteration_errors, 0);
    for name in [
        "is contains user with id",
        "is user with id",
        "does not contain user with id",
    ] {
        let check = stats.check(name).unwrap();
        assert_eq!((check.passes, check.fails), (0, 1), "{name}");
    }
    assert_eq!(stats.check("is user with updated username").unwrap().passes, 1);
    assert_eq!(stats.check("user was deleted correctly").unwrap().passes, 1);

    assert_eq!(
        state.requests(),
        RequestCounts {
            create: 1,
            list: 2,
            get: 1,
            update: 1,
            delete: 1,
        }
    );
    assert_eq!(state.user_count(), 0);
}

#[tokio::test]
async fn stale_update_skips_delete() {
    let (state, api) = service(Faults {
        ignore_updates: true,
        ..Default::default()
    })
    .await;

    let stats = user_crud_with(api).iterations(1).await;

    // Status 200 passes; only the username check fails.
    assert_eq!(stats.check("is status 200").unwrap().fails, 0);
    let updated = stats.check("is user with updated username").unwrap();
    assert_eq!((updated.passes, updated.fails), (0, 1));
    assert!(stats.check("user was deleted correctly").is_none());

    let requests = state.requests();
    assert_eq!(requests.update, 1);
    assert_eq!(requests.delete, 0);
    assert_eq!(requests.list, 1);
    assert_eq!(state.user_count(), 1);
}

#[tokio::test]
async fn failed_delete_skips_verification() {
    let (state, api) = service(Faults {
        delete: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..Default::default()
    })
    .await;

    let stats = user_crud_with(api).iterations(1).await;

    let deleted = stats.check("user was deleted correctly").unwrap();
    assert_eq!((deleted.passes, deleted.fails), (0, 1));
    assert!(stats.check("does not contain user with id").is_none());

    let requests = state.requests();
    assert_eq!(requests.delete, 1);
    assert_eq!(requests.list, 1);
}

#[tokio::test]
async fn unreachable_service_counts_iteration_errors() {
    init();
    // Nothing listens on the discard port.
    let api = Api::new("http://127.0.0.1:9");

    let stats = user_crud_with(api).iterations(2).await;

    assert_eq!(stats.iterations, 2);
    assert_eq!(stats.iteration_errors, 2);
    assert_eq!(stats.transaction("create_user").unwrap().error, 2);
    assert!(stats.checks.is_empty());
}

#[tokio::test]
async fn created_id_flows_through_every_request() {
    let (state, api) = service(Faults::default()).await;

    let created = crud_load::api::create_user(&api, &Default::default())
        .await
        .unwrap();
    let id = created.json::<crud_load::api::User>().unwrap().id;
    assert!(!id.is_empty());

    let fetched = crud_load::api::get_user(&api, &id).await.unwrap();
    let again = crud_load::api::get_user(&api, &id).await.unwrap();
    assert!(fetched.is_ok());
    assert_eq!(fetched.body, again.body);

    let payload = crud_load::api::UpdateUserRequest {
        username: UPDATED_USERNAME.to_string(),
    };
    let updated = crud_load::api::update_user(&api, &id, &payload)
        .await
        .unwrap();
    let user: crud_load::api::User = updated.json().unwrap();
    assert_eq!(user.id, id);
    assert_eq!(user.username, UPDATED_USERNAME);
    assert_eq!(user.email, "email");

    let deleted = crud_load::api::delete_user(&api, &id).await.unwrap();
    assert!(deleted.is_ok());
    let gone = crud_load::api::get_user(&api, &id).await.unwrap();
    assert_eq!(gone.status.as_u16(), 404);
    assert_eq!(state.user_count(), 0);
}

#[tokio::test]
async fn short_ramp() {
    let (state, api) = service(Faults::default()).await;

    let stats = user_crud_with(api)
        .stages(&[
            RampStage::new(Duration::from_millis(300), 4),
            RampStage::new(Duration::from_millis(300), 4),
            RampStage::new(Duration::from_millis(300), 0),
        ])
        .graceful_stop(Duration::from_secs(5))
        .await;

    assert!(stats.checks_passed(), "{stats}");
    assert_eq!(stats.max_concurrency, 4);
    assert!(stats.iterations > 4, "iterations={}", stats.iterations);
    assert_eq!(stats.iteration_errors, 0);

    // Each completed iteration creates then deletes its own user.
    let requests = state.requests();
    assert_eq!(requests.create, stats.iterations);
    assert_eq!(requests.delete, stats.iterations);
    assert_eq!(state.user_count(), 0);
}
