use reqwest::{Method, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use url::Url;

use super::{check, decode, Supabase};
use crate::{
    access::{role::Role, session::Identity},
    backend::{
        BackendError, NewNotice, NewProfile, NoticeId, NoticeRecord, NoticeStore, NoticeUpdate,
        ProfileStore, SettingUpdate, SettingsStore,
    },
};

#[derive(Deserialize)]
struct RoleRow {
    role: String,
}

#[derive(Deserialize)]
struct IdRow {
    id: NoticeId,
}

#[derive(Serialize)]
struct NoticeInsert<'a> {
    #[serde(flatten)]
    notice: &'a NewNotice,
    user_id: &'a Identity,
}

impl Supabase {
    /// PostgREST URL for `table` with `column=eq.value` filters.
    fn table(&self, table: &str, query: &[(&str, String)]) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn select<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<Vec<T>, BackendError> {
        let request = self.inner.http.get(url);
        let response = self.authorized(request).await.send().await?;
        decode(check(response).await?).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        prefer: &'static str,
        body: Option<&B>,
    ) -> Result<Response, BackendError> {
        let mut request = self.inner.http.request(method, url).header("Prefer", prefer);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = self.authorized(request).await.send().await?;
        check(response).await
    }

    async fn write<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<(), BackendError> {
        self.send(method, url, "return=minimal", body).await?;
        Ok(())
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

impl ProfileStore for Supabase {
    #[instrument(skip(self))]
    async fn get_role(&self, identity: &Identity) -> Result<Option<Role>, BackendError> {
        let url = self.table(
            "profiles",
            &[("select", "role".to_string()), ("user_id", eq(identity))],
        )?;

        let rows: Vec<RoleRow> = self.select(url).await?;
        rows.into_iter()
            .next()
            .map(|row| row.role.parse::<Role>())
            .transpose()
            .map_err(|err| BackendError::Decode(err.to_string()))
    }

    #[instrument(skip(self, profile), fields(identity = %profile.user_id))]
    async fn create_profile(&self, profile: &NewProfile) -> Result<(), BackendError> {
        let url = self.table("profiles", &[])?;
        self.write(Method::POST, url, Some(profile)).await
    }

    #[instrument(skip(self))]
    async fn set_active(&self, identity: &Identity, active: bool) -> Result<(), BackendError> {
        let url = self.table("profiles", &[("user_id", eq(identity))])?;
        self.write(Method::PATCH, url, Some(&json!({ "is_active": active })))
            .await
    }
}

impl NoticeStore for Supabase {
    #[instrument(skip(self))]
    async fn notice(&self, id: NoticeId) -> Result<Option<NoticeRecord>, BackendError> {
        let url = self.table(
            "notices",
            &[
                ("select", "id,user_id,is_archived".to_string()),
                ("id", eq(id)),
            ],
        )?;

        let rows: Vec<NoticeRecord> = self.select(url).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self, update))]
    async fn update_notice(&self, id: NoticeId, update: &NoticeUpdate) -> Result<(), BackendError> {
        let url = self.table("notices", &[("id", eq(id))])?;
        self.write(Method::PATCH, url, Some(update)).await
    }

    #[instrument(skip(self))]
    async fn delete_notice(&self, id: NoticeId) -> Result<(), BackendError> {
        let url = self.table("notices", &[("id", eq(id))])?;
        self.write::<()>(Method::DELETE, url, None).await
    }

    #[instrument(skip(self))]
    async fn set_archived(&self, id: NoticeId, archived: bool) -> Result<(), BackendError> {
        let url = self.table("notices", &[("id", eq(id))])?;
        self.write(Method::PATCH, url, Some(&json!({ "is_archived": archived })))
            .await
    }

    #[instrument(skip(self, creator, notice), fields(creator = %creator))]
    async fn create_notice(
        &self,
        creator: &Identity,
        notice: &NewNotice,
    ) -> Result<NoticeId, BackendError> {
        let url = self.table("notices", &[("select", "id".to_string())])?;
        let insert = NoticeInsert {
            notice,
            user_id: creator,
        };

        let response = self
            .send(Method::POST, url, "return=representation", Some(&insert))
            .await?;
        let rows: Vec<IdRow> = decode(response).await?;
        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| BackendError::Decode("insert returned no row".to_string()))
    }
}

impl SettingsStore for Supabase {
    #[instrument(skip(self, update), fields(key = update.key.as_str()))]
    async fn upsert_setting(&self, update: &SettingUpdate) -> Result<(), BackendError> {
        let url = self.table("app_settings", &[("on_conflict", "key".to_string())])?;
        let row = json!({
            "key": update.key,
            "value": update.stored_value(),
            "description": update.key.description(),
        });

        self.send(
            Method::POST,
            url,
            "resolution=merge-duplicates,return=minimal",
            Some(&row),
        )
        .await?;
        Ok(())
    }
}
