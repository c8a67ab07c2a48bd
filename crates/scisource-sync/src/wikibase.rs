//! Wikibase client over the MediaWiki action API.

use std::collections::HashMap;

use async_trait::async_trait;
use scisource_core::{ClaimValue, ItemId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::kb::{Claim, KbError, KnowledgeBase};

/// HTTP client for a ScienceSource Wikibase instance.
pub struct WikibaseClient {
    client: reqwest::Client,
    api_url: String,
    access_token: Option<String>,
    /// CSRF token, fetched on first edit and shared by every pipeline.
    edit_token: OnceCell<String>,
}

#[derive(Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    query: TokenQuery,
}

#[derive(Deserialize)]
struct TokenQuery {
    tokens: Tokens,
}

#[derive(Deserialize)]
struct Tokens {
    csrftoken: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    query: SearchQuery,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    wbsearch: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
    #[serde(default)]
    displaytext: String,
}

#[derive(Deserialize)]
struct EntityResponse {
    entity: Entity,
}

#[derive(Deserialize)]
struct Entity {
    id: String,
}

#[derive(Deserialize)]
struct EditResponse {
    edit: EditResult,
}

#[derive(Deserialize)]
struct EditResult {
    result: String,
    pageid: Option<u64>,
}

#[derive(Deserialize)]
struct PagesResponse {
    query: PagesQuery,
}

#[derive(Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: HashMap<String, PageInfo>,
}

#[derive(Deserialize)]
struct PageInfo {
    pageid: Option<u64>,
}

#[derive(Deserialize)]
struct ClaimsResponse {
    #[serde(default)]
    claims: HashMap<String, Vec<ExistingClaim>>,
}

#[derive(Deserialize)]
struct ExistingClaim {
    id: String,
}

impl WikibaseClient {
    /// Create a client for the instance at `base_url`, e.g.
    /// `http://localhost:8181`. The API lives at `{base_url}/w/api.php`.
    pub fn new(base_url: &str, access_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: format!("{}/w/api.php", base_url.trim_end_matches('/')),
            access_token,
            edit_token: OnceCell::new(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, KbError> {
        let mut req = self
            .client
            .get(&self.api_url)
            .query(params)
            .query(&[("format", "json")]);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }
        decode(req.send().await?).await
    }

    async fn post<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, KbError> {
        let token = self.edit_token().await?;
        let mut form: Vec<(&str, &str)> = params.to_vec();
        form.push(("format", "json"));
        form.push(("token", token));

        let mut req = self.client.post(&self.api_url).form(&form);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }
        decode(req.send().await?).await
    }

    async fn edit_token(&self) -> Result<&str, KbError> {
        let token = self
            .edit_token
            .get_or_try_init(|| async {
                let resp: TokenResponse =
                    self.get(&[("action", "query"), ("meta", "tokens")]).await?;
                debug!("fetched edit token");
                Ok::<_, KbError>(resp.query.tokens.csrftoken)
            })
            .await?;
        Ok(token.as_str())
    }

    async fn search(&self, kind: &str, label: &str) -> Result<Vec<String>, KbError> {
        let resp: SearchResponse = self
            .get(&[
                ("action", "query"),
                ("list", "wbsearch"),
                ("wbssearch", label),
                ("wbstype", kind),
                ("wbslanguage", "en"),
            ])
            .await?;

        // wbsearch is a prefix search; only exact labels count.
        let ids: Vec<String> = resp
            .query
            .wbsearch
            .into_iter()
            .filter(|hit| hit.displaytext == label)
            .map(|hit| match hit.title.split_once(':') {
                Some((_, id)) => id.to_string(),
                None => hit.title,
            })
            .collect();
        debug!(kind, label, count = ids.len(), "searched labels");
        Ok(ids)
    }

    async fn existing_claims(&self, item: &ItemId) -> Result<HashMap<String, Vec<String>>, KbError> {
        let resp: ClaimsResponse = self
            .get(&[("action", "wbgetclaims"), ("entity", item.as_str())])
            .await?;
        Ok(resp
            .claims
            .into_iter()
            .map(|(property, claims)| (property, claims.into_iter().map(|c| c.id).collect()))
            .collect())
    }
}

#[async_trait]
impl KnowledgeBase for WikibaseClient {
    async fn search_properties(&self, label: &str) -> Result<Vec<String>, KbError> {
        self.search("property", label).await
    }

    async fn search_items(&self, label: &str) -> Result<Vec<ItemId>, KbError> {
        Ok(self
            .search("item", label)
            .await?
            .into_iter()
            .map(ItemId::new)
            .collect())
    }

    async fn create_item(&self, label: &str) -> Result<ItemId, KbError> {
        let data = json!({ "labels": { "en": { "language": "en", "value": label } } }).to_string();
        let resp: EntityResponse = self
            .post(&[("action", "wbeditentity"), ("new", "item"), ("data", data.as_str())])
            .await?;
        debug!(item = %resp.entity.id, label, "created item");
        Ok(ItemId::new(resp.entity.id))
    }

    async fn create_page(&self, title: &str, content: &str) -> Result<u64, KbError> {
        let resp: EditResponse = self
            .post(&[
                ("action", "edit"),
                ("title", title),
                ("text", content),
                ("createonly", "1"),
            ])
            .await
            .map_err(|e| match e {
                KbError::Api { code, .. } if code == "articleexists" => KbError::PageExists {
                    title: title.to_string(),
                },
                other => other,
            })?;
        if resp.edit.result != "Success" {
            return Err(KbError::Unexpected(format!(
                "edit of {title:?} returned {}",
                resp.edit.result
            )));
        }
        let page_id = resp
            .edit
            .pageid
            .ok_or_else(|| KbError::Unexpected(format!("edit of {title:?} returned no page id")))?;
        info!(page = title, page_id, "created page");
        Ok(page_id)
    }

    async fn page_id(&self, title: &str) -> Result<Option<u64>, KbError> {
        let resp: PagesResponse = self
            .get(&[("action", "query"), ("titles", title)])
            .await?;
        Ok(resp.query.pages.into_values().find_map(|p| p.pageid))
    }

    async fn upload_claims(&self, item: &ItemId, claims: &[Claim]) -> Result<(), KbError> {
        if claims.is_empty() {
            return Ok(());
        }
        let existing = self.existing_claims(item).await?;
        let data = claims_json(claims, &existing).to_string();
        let _: EntityResponse = self
            .post(&[("action", "wbeditentity"), ("id", item.as_str()), ("data", data.as_str())])
            .await?;
        debug!(item = %item, claims = claims.len(), "uploaded claims");
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, KbError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(KbError::Server {
            status: status.as_u16(),
            body,
        });
    }
    let body: Value = resp.json().await?;
    if let Some(error) = body.get("error") {
        let error: ApiError = serde_json::from_value(error.clone())?;
        return Err(KbError::Api {
            code: error.code,
            info: error.info,
        });
    }
    Ok(serde_json::from_value(body)?)
}

/// The `wbeditentity` payload setting `claims` on an item.
///
/// A property's first existing claim is overwritten in place and any
/// further ones are removed, so each property ends up with one value.
pub(crate) fn claims_json(claims: &[Claim], existing: &HashMap<String, Vec<String>>) -> Value {
    let mut out = Vec::with_capacity(claims.len());
    for claim in claims {
        let mut statement = json!({
            "mainsnak": {
                "snaktype": "value",
                "property": claim.property,
                "datavalue": datavalue(&claim.value),
            },
            "type": "statement",
            "rank": "normal",
        });
        let ids = existing.get(&claim.property).map(Vec::as_slice).unwrap_or(&[]);
        if let Some((first, rest)) = ids.split_first() {
            statement["id"] = json!(first);
            out.extend(rest.iter().map(|id| json!({ "id": id, "remove": "" })));
        }
        out.push(statement);
    }
    json!({ "claims": out })
}

fn datavalue(value: &ClaimValue) -> Value {
    match value {
        ClaimValue::String(s) => json!({ "value": s, "type": "string" }),
        ClaimValue::Quantity(n) => json!({
            "value": { "amount": format!("{n:+}"), "unit": "1" },
            "type": "quantity",
        }),
        ClaimValue::Item(id) => json!({
            "value": { "entity-type": "item", "id": id.as_str() },
            "type": "wikibase-entityid",
        }),
    }
}
