use crate::api::{
    create_user, delete_user, get_all_users, get_user, update_user, Api, CreateUserRequest,
    UpdateUserRequest, User,
};
use reqwest::StatusCode;
use stampede::prelude::*;
use stampede::Scenario;
use std::sync::Arc;
use tracing::warn;

pub const UPDATED_USERNAME: &str = "newUsername";

/// One virtual user's CRUD pass: create, list, fetch, update, delete, verify.
///
/// Ids and payloads live only for the pass. Create, update and delete failures abandon the rest
/// of the iteration; list, fetch and verify failures are only recorded.
pub struct VirtualUserIteration<'a> {
    api: &'a Api,
    user_id: String,
}

impl<'a> VirtualUserIteration<'a> {
    pub fn new(api: &'a Api) -> Self {
        Self {
            api,
            user_id: String::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub async fn run(mut self) -> Result<(), reqwest::Error> {
        if !self.create().await? {
            return Ok(());
        }

        self.list().await?;
        self.fetch().await?;

        if !self.update().await? {
            return Ok(());
        }

        if !self.delete().await? {
            return Ok(());
        }

        self.verify().await
    }

    async fn create(&mut self) -> Result<bool, reqwest::Error> {
        let reply = create_user(self.api, &CreateUserRequest::default()).await?;

        if !check(&reply)
            .that("is status 200", |r| r.is_ok())
            .passed()
        {
            warn!(
                "Unable to create a user {} {}",
                reply.status.as_u16(),
                reply.body
            );
            return Ok(false);
        }

        // A 200 without an id leaves the id empty; later checks then fail.
        self.user_id = reply.json::<User>().map(|u| u.id).unwrap_or_default();
        Ok(true)
    }

    async fn list(&self) -> Result<(), reqwest::Error> {
        let reply = get_all_users(self.api).await?;
        check(&reply)
            .that("is status 200", |r| r.is_ok())
            .that("is contains user with id", |r| self.listed(r) == Some(true));
        Ok(())
    }

    async fn fetch(&self) -> Result<(), reqwest::Error> {
        let reply = get_user(self.api, &self.user_id).await?;
        check(&reply)
            .that("is status 200", |r| r.is_ok())
            .that("is user with id", |r| {
                r.json::<User>().is_some_and(|u| u.id == self.user_id)
            });
        Ok(())
    }

    async fn update(&self) -> Result<bool, reqwest::Error> {
        let payload = UpdateUserRequest {
            username: UPDATED_USERNAME.to_string(),
        };
        let reply = update_user(self.api, &self.user_id, &payload).await?;

        let updated = check(&reply)
            .that("is status 200", |r| r.is_ok())
            .that("is user with updated username", |r| {
                r.json::<User>()
                    .is_some_and(|u| u.username == UPDATED_USERNAME)
            })
            .passed();

        if !updated {
            warn!(
                "Unable to update the user {} {}",
                reply.status.as_u16(),
                reply.body
            );
        }
        Ok(updated)
    }

    async fn delete(&self) -> Result<bool, reqwest::Error> {
        let reply = delete_user(self.api, &self.user_id).await?;
        let status = reply.status;

        // Only the captured status is checked, never the response itself.
        let deleted = check(&())
            .that("user was deleted correctly", |_| status == StatusCode::OK)
            .passed();

        if !deleted {
            warn!("User was not deleted properly");
        }
        Ok(deleted)
    }

    async fn verify(&self) -> Result<(), reqwest::Error> {
        let reply = get_all_users(self.api).await?;
        check(&reply)
            .that("is status 200", |r| r.is_ok())
            .that("does not contain user with id", |r| {
                self.listed(r) == Some(false)
            });
        Ok(())
    }

    /// Whether a list reply contains the current user, `None` if the body is not a user list.
    fn listed(&self, reply: &crate::api::Reply) -> Option<bool> {
        reply
            .json::<Vec<User>>()
            .map(|users| users.iter().any(|u| u.id == self.user_id))
    }
}

/// The CRUD scenario against the process-wide [`Api`].
#[scenario]
pub async fn user_crud() -> Result<(), reqwest::Error> {
    VirtualUserIteration::new(Api::global()).run().await
}

/// The CRUD scenario against a specific [`Api`].
pub fn user_crud_with(api: Api) -> impl ConfigurableScenario<RunStatistics> {
    let api = Arc::new(api);
    Scenario::new("user_crud", move || {
        let api = api.clone();
        async move { VirtualUserIteration::new(&api).run().await }
    })
}
