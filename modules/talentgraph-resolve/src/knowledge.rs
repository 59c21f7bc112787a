//! External knowledge-graph collaborator.
//!
//! `KnowledgeSource` is the seam the ingestion job depends on. `WikidataClient`
//! implements it over the public `wbsearchentities` / `wbgetentities` API.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use talentgraph_common::types::{ExternalId, OrgType};

use crate::error::{Result, ServiceError};

const USER_AGENT: &str = concat!("talentgraph/", env!("CARGO_PKG_VERSION"));
const LANGUAGE: &str = "en";
const COMMONS_FILE_PATH: &str = "https://commons.wikimedia.org/wiki/Special:FilePath/";

// Claim properties read from entity records.
const P_OCCUPATION: &str = "P106";
const P_EMPLOYER: &str = "P108";
const P_EDUCATED_AT: &str = "P69";
const P_OFFICIAL_WEBSITE: &str = "P856";
const P_IMAGE: &str = "P18";
const P_START_TIME: &str = "P580";
const P_END_TIME: &str = "P582";

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub external_id: ExternalId,
    pub label: String,
    pub description: Option<String>,
}

/// An organization listed on a person's record, with the tenure qualifiers
/// when the knowledge graph has them.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationRef {
    pub external_id: ExternalId,
    pub label: String,
    pub org_type: OrgType,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityRecord {
    pub external_id: Option<ExternalId>,
    pub label: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub image_url: Option<String>,
    pub occupations: Vec<String>,
    pub organizations: Vec<OrganizationRef>,
    pub official_links: Vec<String>,
}

#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>>;

    /// Fails with `ServiceError::NotFound` for unknown or deleted ids.
    async fn get_entity(&self, external_id: &ExternalId) -> Result<EntityRecord>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    #[serde(default)]
    entities: HashMap<String, WireEntity>,
}

#[derive(Debug, Default, Deserialize)]
struct WireEntity {
    #[serde(default)]
    missing: Option<String>,
    #[serde(default)]
    labels: HashMap<String, LangValue>,
    #[serde(default)]
    descriptions: HashMap<String, LangValue>,
    #[serde(default)]
    aliases: HashMap<String, Vec<LangValue>>,
    #[serde(default)]
    claims: HashMap<String, Vec<Claim>>,
}

#[derive(Debug, Deserialize)]
struct LangValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct Claim {
    mainsnak: Snak,
    #[serde(default)]
    qualifiers: HashMap<String, Vec<Snak>>,
}

#[derive(Debug, Deserialize)]
struct Snak {
    #[serde(default)]
    datavalue: Option<DataValue>,
}

#[derive(Debug, Deserialize)]
struct DataValue {
    value: serde_json::Value,
}

impl Snak {
    fn entity_id(&self) -> Option<&str> {
        self.datavalue.as_ref()?.value.get("id")?.as_str()
    }

    fn string(&self) -> Option<&str> {
        self.datavalue.as_ref()?.value.as_str()
    }

    fn time(&self) -> Option<NaiveDate> {
        let raw = self.datavalue.as_ref()?.value.get("time")?.as_str()?;
        parse_time(raw)
    }
}

impl WireEntity {
    fn label(&self) -> Option<String> {
        self.labels.get(LANGUAGE).map(|v| v.value.clone())
    }

    fn claims(&self, property: &str) -> &[Claim] {
        self.claims.get(property).map(Vec::as_slice).unwrap_or_default()
    }

    fn entity_ids(&self, property: &str) -> Vec<String> {
        self.claims(property)
            .iter()
            .filter_map(|c| c.mainsnak.entity_id())
            .map(str::to_string)
            .collect()
    }
}

/// Knowledge-graph timestamps look like `+2015-12-11T00:00:00Z`; year- and
/// month-precision values carry `00` for the unknown parts.
fn parse_time(raw: &str) -> Option<NaiveDate> {
    let date = raw.trim_start_matches('+').get(..10)?;
    let mut parts = date.splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month.max(1), day.max(1))
}

fn commons_image_url(file_name: &str) -> String {
    format!("{COMMONS_FILE_PATH}{}", file_name.replace(' ', "_"))
}

// ---------------------------------------------------------------------------
// WikidataClient
// ---------------------------------------------------------------------------

pub struct WikidataClient {
    client: reqwest::Client,
    api_url: String,
}

impl WikidataClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T> {
        let resp = self
            .client
            .get(&self.api_url)
            .query(params)
            .query(&[("format", "json")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_entities(
        &self,
        ids: &[String],
        props: &str,
    ) -> Result<HashMap<String, WireEntity>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = ids.join("|");
        let resp: EntitiesResponse = self
            .get(&[
                ("action", "wbgetentities"),
                ("ids", joined.as_str()),
                ("props", props),
                ("languages", LANGUAGE),
            ])
            .await?;
        Ok(resp.entities)
    }

    /// English labels for referenced entities. Ids without one are dropped.
    async fn resolve_labels(&self, ids: &[String]) -> Result<HashMap<String, String>> {
        let entities = self.fetch_entities(ids, "labels").await?;
        Ok(entities
            .into_iter()
            .filter_map(|(id, entity)| entity.label().map(|label| (id, label)))
            .collect())
    }
}

#[async_trait]
impl KnowledgeSource for WikidataClient {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>> {
        let limit = limit.to_string();
        let resp: SearchResponse = self
            .get(&[
                ("action", "wbsearchentities"),
                ("search", query),
                ("language", LANGUAGE),
                ("type", "item"),
                ("limit", limit.as_str()),
            ])
            .await?;

        debug!(query, hits = resp.search.len(), "Knowledge graph search");
        Ok(resp
            .search
            .into_iter()
            .map(|item| SearchHit {
                label: item.label.unwrap_or_else(|| item.id.clone()),
                external_id: ExternalId::new(item.id),
                description: item.description,
            })
            .collect())
    }

    async fn get_entity(&self, external_id: &ExternalId) -> Result<EntityRecord> {
        let ids = vec![external_id.as_str().to_string()];
        let mut entities = self
            .fetch_entities(&ids, "labels|descriptions|aliases|claims")
            .await?;
        let entity = entities
            .remove(external_id.as_str())
            .filter(|e| e.missing.is_none())
            .ok_or_else(|| ServiceError::NotFound(external_id.to_string()))?;

        let occupation_ids = entity.entity_ids(P_OCCUPATION);
        let mut referenced = occupation_ids.clone();
        referenced.extend(entity.entity_ids(P_EMPLOYER));
        referenced.extend(entity.entity_ids(P_EDUCATED_AT));
        referenced.sort();
        referenced.dedup();
        let labels = self.resolve_labels(&referenced).await?;

        let mut organizations = Vec::new();
        for (property, org_type) in [
            (P_EMPLOYER, OrgType::Company),
            (P_EDUCATED_AT, OrgType::University),
        ] {
            for claim in entity.claims(property) {
                let Some(id) = claim.mainsnak.entity_id() else {
                    continue;
                };
                let Some(label) = labels.get(id) else {
                    continue;
                };
                let qualifier = |p: &str| {
                    claim
                        .qualifiers
                        .get(p)
                        .and_then(|snaks| snaks.iter().find_map(Snak::time))
                };
                organizations.push(OrganizationRef {
                    external_id: ExternalId::new(id),
                    label: label.clone(),
                    org_type,
                    start_date: qualifier(P_START_TIME),
                    end_date: qualifier(P_END_TIME),
                });
            }
        }

        Ok(EntityRecord {
            external_id: Some(external_id.clone()),
            label: entity.label().unwrap_or_else(|| external_id.to_string()),
            description: entity.descriptions.get(LANGUAGE).map(|v| v.value.clone()),
            aliases: entity
                .aliases
                .get(LANGUAGE)
                .map(|vs| vs.iter().map(|v| v.value.clone()).collect())
                .unwrap_or_default(),
            image_url: entity
                .claims(P_IMAGE)
                .iter()
                .find_map(|c| c.mainsnak.string())
                .map(commons_image_url),
            occupations: occupation_ids
                .iter()
                .filter_map(|id| labels.get(id).cloned())
                .collect(),
            organizations,
            official_links: entity
                .claims(P_OFFICIAL_WEBSITE)
                .iter()
                .filter_map(|c| c.mainsnak.string())
                .map(str::to_string)
                .collect(),
        })
    }
}
